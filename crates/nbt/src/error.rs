use std::io;

use thiserror::Error;

use crate::format::NbtFormat;
use crate::tag::TagType;

/// Malformed tag streams and codec failures. None of these are retried.
#[derive(Debug, Error)]
pub enum NbtError {
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("unknown tag type id {0}")]
    UnknownTagType(u8),
    #[error("invalid UTF-8 in string")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("negative length {0}")]
    NegativeLength(i64),
    #[error("length {0} does not fit the remaining data")]
    LengthOverflow(usize),
    #[error("string of {0} bytes is too long for the length prefix")]
    StringTooLong(usize),
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
    #[error("root tag must be a compound, found type id {0}")]
    RootNotCompound(u8),
    #[error("list mixes {expected:?} with {found:?}")]
    MixedList { expected: TagType, found: TagType },
    #[error("malformed varint")]
    BadVarint,
    #[error("{0} trailing bytes after root tag")]
    TrailingData(usize),
    #[error("data did not parse as any NBT format (last tried {last:?}: {source})")]
    NoFormatMatched {
        last: NbtFormat,
        #[source]
        source: Box<NbtError>,
    },
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for NbtError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            NbtError::UnexpectedEof
        } else {
            NbtError::Io(err)
        }
    }
}
