//! Tagged-binary ("NBT") codec.
//!
//! Reads and writes tag trees in three wire variants (big-endian,
//! little-endian, little-endian varint), wraps gzip/zlib compression and
//! auto-detects the variant of an unknown document.

pub mod compression;
pub mod error;
pub mod format;
pub mod reader;
pub mod tag;
pub mod writer;

pub use compression::{Compression, Parsed, parse};
pub use error::NbtError;
pub use format::NbtFormat;
pub use reader::{parse_uncompressed, read_root_at};
pub use tag::{
    Compound, NbtList, Root, Tag, TagType, equal, equal_compound, equal_root, simplify,
    simplify_compound,
};
pub use writer::write_uncompressed;
