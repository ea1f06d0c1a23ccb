use async_trait::async_trait;

use super::chunk::ChunkColumn;
use super::position::ChunkPos;

/// Persistent backing store for chunk columns.
///
/// `load` returns `Ok(None)` when nothing is stored for the position; errors
/// are reserved for I/O and format failures and reach the caller unretried.
#[async_trait]
pub trait ChunkProvider: Send + Sync {
    async fn load(&self, pos: ChunkPos) -> anyhow::Result<Option<ChunkColumn>>;

    async fn save(&self, pos: ChunkPos, column: &ChunkColumn) -> anyhow::Result<()>;
}

/// Fills a freshly created, all-air column for a position no provider knows.
pub type ChunkGenerator = Box<dyn Fn(ChunkPos, &mut ChunkColumn) + Send + Sync>;
