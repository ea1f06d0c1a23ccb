pub mod bit_array;
pub mod block;
pub mod chunk;
pub mod event;
pub mod palette;
pub mod position;
pub mod provider;
pub mod section;

use std::time::Instant;

use anyhow::{Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::{Ref, RefMut};
use dashmap::{DashMap, DashSet};
use strata_nbt::Compound;
use tokio::sync::broadcast;

use block::{BiomeId, StateId};
use chunk::{ChunkColumn, ColumnError, ColumnOptions};
use event::{EVENT_CAPACITY, WorldEvent};
use position::{BlockPos, ChunkPos};
use provider::{ChunkGenerator, ChunkProvider};

/// Shared borrow of a resident column. Do not hold it across an `.await`.
pub type ColumnRef<'a> = Ref<'a, ChunkPos, ChunkColumn>;
type ColumnRefMut<'a> = RefMut<'a, ChunkPos, ChunkColumn>;

/// The resident block world. Thread-safe, lock-sharded by column.
///
/// Columns are loaded on first access: from the provider if one is set,
/// otherwise from the generator. A column nobody can supply reads as air,
/// and the first write to it creates an empty column.
pub struct World {
    options: ColumnOptions,
    columns: DashMap<ChunkPos, ChunkColumn>,
    /// Columns modified since they were last saved.
    dirty: DashSet<ChunkPos>,
    provider: Option<Box<dyn ChunkProvider>>,
    generator: Option<ChunkGenerator>,
    events: broadcast::Sender<WorldEvent>,
}

impl World {
    pub fn new(options: ColumnOptions) -> Result<Self, ColumnError> {
        options.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            options,
            columns: DashMap::new(),
            dirty: DashSet::new(),
            provider: None,
            generator: None,
            events,
        })
    }

    pub fn with_provider(mut self, provider: impl ChunkProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub fn with_generator(
        mut self,
        generator: impl Fn(ChunkPos, &mut ChunkColumn) + Send + Sync + 'static,
    ) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn options(&self) -> ColumnOptions {
        self.options
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorldEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: WorldEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Column lifecycle ────────────────────────────────────────────────

    /// The column at `pos`, loading or generating it if it is not resident.
    /// `None` when neither the provider nor a generator can supply it.
    pub async fn get_column(&self, pos: ChunkPos) -> Result<Option<ColumnRef<'_>>> {
        self.ensure_loaded(pos).await?;
        Ok(self.columns.get(&pos))
    }

    /// The column at `pos` if it is already resident.
    pub fn get_loaded_column(&self, pos: ChunkPos) -> Option<ColumnRef<'_>> {
        self.columns.get(&pos)
    }

    /// Installs a column, replacing any resident one.
    pub fn set_column(&self, pos: ChunkPos, column: ChunkColumn, mark_dirty: bool) {
        self.columns.insert(pos, column);
        if mark_dirty {
            self.dirty.insert(pos);
        }
        self.emit(WorldEvent::ChunkColumnLoad(pos));
    }

    /// Drops a resident column, saving it first if it has unsaved changes.
    /// Returns whether a column was resident.
    pub async fn unload_column(&self, pos: ChunkPos) -> Result<bool> {
        if self.dirty.contains(&pos) && self.provider.is_some() {
            self.save_column(pos).await?;
        }
        self.dirty.remove(&pos);
        let removed = self.columns.remove(&pos).is_some();
        if removed {
            self.emit(WorldEvent::ChunkColumnUnload(pos));
        }
        Ok(removed)
    }

    /// Writes every dirty column through the provider. Returns how many were
    /// written. Without a provider nothing is written and the dirty set is
    /// kept.
    ///
    /// On failure the failed column and everything not yet written stay
    /// dirty, so a later save retries them.
    pub async fn save(&self) -> Result<usize> {
        if self.provider.is_none() {
            return Ok(0);
        }
        let dirty = self.take_dirty();
        if dirty.is_empty() {
            tracing::debug!("World save: nothing to save (no dirty columns)");
            return Ok(0);
        }

        let start = Instant::now();
        let mut saved = 0usize;
        for (i, pos) in dirty.iter().enumerate() {
            if let Err(err) = self.save_column(*pos).await {
                for pending in &dirty[i..] {
                    self.dirty.insert(*pending);
                }
                return Err(err);
            }
            saved += 1;
        }

        tracing::info!(
            "World saved: {} dirty columns ({:.2?})",
            saved,
            start.elapsed(),
        );
        Ok(saved)
    }

    pub fn loaded_count(&self) -> usize {
        self.columns.len()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn is_dirty(&self, pos: ChunkPos) -> bool {
        self.dirty.contains(&pos)
    }

    pub fn loaded_positions(&self) -> Vec<ChunkPos> {
        self.columns.iter().map(|entry| *entry.key()).collect()
    }

    fn take_dirty(&self) -> Vec<ChunkPos> {
        let dirty: Vec<ChunkPos> = self.dirty.iter().map(|entry| *entry).collect();
        for pos in &dirty {
            self.dirty.remove(pos);
        }
        dirty
    }

    async fn save_column(&self, pos: ChunkPos) -> Result<()> {
        let Some(provider) = &self.provider else {
            return Ok(());
        };
        // Clone out so no shard lock is held across the provider's I/O.
        let Some(column) = self.columns.get(&pos).map(|column| column.value().clone()) else {
            return Ok(());
        };
        provider
            .save(pos, &column)
            .await
            .with_context(|| format!("saving column {pos}"))
    }

    async fn ensure_loaded(&self, pos: ChunkPos) -> Result<()> {
        if self.columns.contains_key(&pos) {
            return Ok(());
        }

        if let Some(provider) = &self.provider {
            let loaded = provider
                .load(pos)
                .await
                .with_context(|| format!("loading column {pos}"))?;
            if let Some(column) = loaded {
                tracing::debug!("Loaded column {}", pos);
                self.insert_if_absent(pos, column, false);
                return Ok(());
            }
        }

        if let Some(generator) = &self.generator {
            let mut column = ChunkColumn::new(self.options)?;
            generator(pos, &mut column);
            tracing::debug!("Generated column {}", pos);
            // Generated columns exist nowhere else yet.
            self.insert_if_absent(pos, column, true);
        }
        Ok(())
    }

    /// Inserts unless another task got there first during a load.
    fn insert_if_absent(&self, pos: ChunkPos, column: ChunkColumn, mark_dirty: bool) {
        match self.columns.entry(pos) {
            Entry::Occupied(_) => return,
            Entry::Vacant(slot) => {
                slot.insert(column);
            }
        }
        if mark_dirty {
            self.dirty.insert(pos);
        }
        self.emit(WorldEvent::ChunkColumnLoad(pos));
    }

    /// Runs `f` on the resident column at `pos`, loading it first.
    pub async fn with_column<R>(
        &self,
        pos: ChunkPos,
        f: impl FnOnce(&ChunkColumn) -> R,
    ) -> Result<Option<R>> {
        self.ensure_loaded(pos).await?;
        Ok(self.columns.get(&pos).map(|column| f(column.value())))
    }

    /// Runs `f` on the column at `pos`, loading it or creating an empty one
    /// first, and marks it dirty.
    pub async fn with_column_mut<R>(
        &self,
        pos: ChunkPos,
        f: impl FnOnce(&mut ChunkColumn) -> R,
    ) -> Result<R> {
        let mut column = self.resident_mut(pos).await?;
        let result = f(column.value_mut());
        drop(column);
        self.dirty.insert(pos);
        Ok(result)
    }

    /// Exclusive borrow of the column at `pos`, loading it or creating an
    /// empty one first. Does not mark it dirty.
    async fn resident_mut(&self, pos: ChunkPos) -> Result<ColumnRefMut<'_>> {
        self.ensure_loaded(pos).await?;
        if !self.columns.contains_key(&pos) {
            self.insert_if_absent(pos, ChunkColumn::new(self.options)?, true);
        }
        self.columns
            .get_mut(&pos)
            .with_context(|| format!("column {pos} was unloaded during a write"))
    }

    // ── World-coordinate access ─────────────────────────────────────────

    pub async fn get_block_state_id(&self, pos: BlockPos) -> Result<StateId> {
        let local = pos.local();
        Ok(self
            .with_column(pos.chunk(), |column| column.get_block_state_id(local))
            .await?
            .unwrap_or(StateId::AIR))
    }

    /// Writes a block state. When the stored state changes the column is
    /// marked dirty and a `BlockUpdate` carrying the stored id is published.
    /// Writes outside the height range are ignored.
    pub async fn set_block_state_id(&self, pos: BlockPos, state: StateId) -> Result<()> {
        if !self.contains_y(pos.y) {
            return Ok(());
        }
        let local = pos.local();
        let (old, new) = {
            let mut column = self.resident_mut(pos.chunk()).await?;
            let old = column.set_block_state_id(local, state);
            (old, column.get_block_state_id(local))
        };
        if old == new {
            return Ok(());
        }
        self.dirty.insert(pos.chunk());
        self.emit(WorldEvent::BlockUpdate { pos, old, new });
        Ok(())
    }

    pub async fn get_biome_id(&self, pos: BlockPos) -> Result<BiomeId> {
        let local = pos.local();
        Ok(self
            .with_column(pos.chunk(), |column| column.get_biome_id(local))
            .await?
            .unwrap_or_default())
    }

    pub async fn set_biome_id(&self, pos: BlockPos, biome: BiomeId) -> Result<()> {
        if !self.contains_y(pos.y) {
            return Ok(());
        }
        let local = pos.local();
        self.with_column_mut(pos.chunk(), |column| column.set_biome_id(local, biome))
            .await
    }

    pub async fn get_block_light(&self, pos: BlockPos) -> Result<u8> {
        let local = pos.local();
        Ok(self
            .with_column(pos.chunk(), |column| column.get_block_light(local))
            .await?
            .unwrap_or(0))
    }

    pub async fn set_block_light(&self, pos: BlockPos, level: u8) -> Result<()> {
        let local = pos.local();
        self.with_column_mut(pos.chunk(), |column| column.set_block_light(local, level))
            .await
    }

    pub async fn get_sky_light(&self, pos: BlockPos) -> Result<u8> {
        let local = pos.local();
        Ok(self
            .with_column(pos.chunk(), |column| column.get_sky_light(local))
            .await?
            .unwrap_or(0))
    }

    pub async fn set_sky_light(&self, pos: BlockPos, level: u8) -> Result<()> {
        let local = pos.local();
        self.with_column_mut(pos.chunk(), |column| column.set_sky_light(local, level))
            .await
    }

    pub async fn get_block_entity(&self, pos: BlockPos) -> Result<Option<Compound>> {
        let local = pos.local();
        Ok(self
            .with_column(pos.chunk(), |column| column.get_block_entity(local).cloned())
            .await?
            .flatten())
    }

    /// Stores a block-entity payload, returning the one it replaced.
    pub async fn set_block_entity(&self, pos: BlockPos, tag: Compound) -> Result<Option<Compound>> {
        let local = pos.local();
        self.with_column_mut(pos.chunk(), |column| column.set_block_entity(local, tag))
            .await
    }

    pub async fn remove_block_entity(&self, pos: BlockPos) -> Result<Option<Compound>> {
        let local = pos.local();
        self.with_column_mut(pos.chunk(), |column| column.remove_block_entity(local))
            .await
    }

    fn contains_y(&self, y: i32) -> bool {
        y >= self.options.min_y && y < self.options.max_y()
    }
}
