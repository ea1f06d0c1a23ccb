//! Anvil persistence for the strata engine: region files, the on-disk chunk
//! schema, the block/biome registry and a chunk provider tying them together.

pub mod anvil;
pub mod chunk_nbt;
pub mod region;
pub mod registry;
