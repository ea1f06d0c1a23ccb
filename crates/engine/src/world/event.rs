//! World-change notifications.
//!
//! Every block write and every column load or unload publishes a
//! [`WorldEvent`] on a shared `tokio::sync::broadcast` channel. Subscribers
//! that fall more than [`EVENT_CAPACITY`] events behind see a `Lagged` error
//! and skip ahead; publishing never blocks the writer.

use super::block::StateId;
use super::position::{BlockPos, ChunkPos};

/// Capacity of the broadcast channel.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    /// A block changed from `old` to `new`.
    BlockUpdate {
        pos: BlockPos,
        old: StateId,
        new: StateId,
    },
    /// A column became resident, loaded from the provider, generated or set.
    ChunkColumnLoad(ChunkPos),
    /// A column was dropped from memory.
    ChunkColumnUnload(ChunkPos),
}
