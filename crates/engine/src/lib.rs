//! Game-agnostic voxel column storage.
//!
//! The engine stores numeric block-state and biome ids in bit-packed palette
//! containers, stacks them into chunk columns and serves them through the
//! [`world::World`] access layer. Block names and on-disk formats live in the
//! crates above it.

pub mod world;
