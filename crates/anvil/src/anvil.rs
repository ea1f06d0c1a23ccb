//! Anvil world directories: `<world>/region/r.<x>.<z>.mca`.
//!
//! [`AnvilWorld`] caches open region files per file name and serialises all
//! access to them. [`AnvilProvider`] plugs it into the engine's
//! [`World`](strata_engine::world::World) through the chunk translator.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_engine::world::chunk::{ChunkColumn, ColumnOptions};
use strata_engine::world::position::ChunkPos;
use strata_engine::world::provider::ChunkProvider;
use strata_nbt::Root;
use tokio::sync::Mutex;

use crate::chunk_nbt::{column_to_nbt, nbt_to_column};
use crate::region::{RegionFile, parse_region_file_name, region_file_name};
use crate::registry::Registry;

/// DataVersion written into saved chunks unless configured otherwise.
pub const DEFAULT_DATA_VERSION: i32 = 3465;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnvilOptions {
    pub data_version: i32,
    pub column: ColumnOptions,
}

impl Default for AnvilOptions {
    fn default() -> Self {
        Self {
            data_version: DEFAULT_DATA_VERSION,
            column: ColumnOptions::default(),
        }
    }
}

impl AnvilOptions {
    /// Reads options from a JSON file; absent fields keep their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading options {}", path.display()))?;
        let options: Self = serde_json::from_str(&json)
            .with_context(|| format!("parsing options {}", path.display()))?;
        options
            .column
            .validate()
            .with_context(|| format!("invalid column options in {}", path.display()))?;
        Ok(options)
    }
}

/// A world directory's region files.
pub struct AnvilWorld {
    dir: PathBuf,
    regions: Mutex<HashMap<String, RegionFile>>,
}

impl AnvilWorld {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            regions: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn region_dir(&self) -> PathBuf {
        self.dir.join("region")
    }

    /// Reads the raw chunk compound. A missing region file reads as empty
    /// and is not created.
    pub async fn load_raw(&self, pos: ChunkPos) -> Result<Option<Root>> {
        let name = region_file_name(pos.x, pos.z);
        let path = self.region_dir().join(&name);
        let mut regions = self.regions.lock().await;

        let region = match regions.entry(name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let exists = tokio::fs::try_exists(&path)
                    .await
                    .with_context(|| format!("checking region {}", path.display()))?;
                if !exists {
                    return Ok(None);
                }
                let region = RegionFile::open(&path)
                    .await
                    .with_context(|| format!("opening region {}", path.display()))?;
                entry.insert(region)
            }
        };

        let (x, z) = pos.region_local();
        region
            .read_chunk(x, z)
            .await
            .with_context(|| format!("reading chunk {} from {}", pos, path.display()))
    }

    /// Writes the raw chunk compound, creating the region file if needed.
    pub async fn save_raw(&self, pos: ChunkPos, root: &Root) -> Result<()> {
        let name = region_file_name(pos.x, pos.z);
        let path = self.region_dir().join(&name);
        let mut regions = self.regions.lock().await;

        let region = match regions.entry(name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tokio::fs::create_dir_all(self.region_dir())
                    .await
                    .with_context(|| format!("creating {}", self.region_dir().display()))?;
                let region = RegionFile::open(&path)
                    .await
                    .with_context(|| format!("opening region {}", path.display()))?;
                entry.insert(region)
            }
        };

        let (x, z) = pos.region_local();
        region
            .write_chunk(x, z, root)
            .await
            .with_context(|| format!("writing chunk {} to {}", pos, path.display()))
    }

    /// Region files present on disk, as `(region x, region z, path)`.
    pub async fn region_files(&self) -> Result<Vec<(i32, i32, PathBuf)>> {
        let region_dir = self.region_dir();
        if !tokio::fs::try_exists(&region_dir).await? {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(&region_dir)
            .await
            .with_context(|| format!("listing {}", region_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match parse_region_file_name(name) {
                Some((x, z)) => found.push((x, z, path)),
                None => tracing::warn!("Skipping unexpected file in region dir: {}", name),
            }
        }
        found.sort_by_key(|(x, z, _)| (*x, *z));
        Ok(found)
    }

    /// Number of region files currently open.
    pub async fn open_regions(&self) -> usize {
        self.regions.lock().await.len()
    }

    /// Closes every cached region file.
    pub async fn close(&self) -> Result<()> {
        let regions: Vec<(String, RegionFile)> = self.regions.lock().await.drain().collect();
        for (name, region) in regions {
            region
                .close()
                .await
                .with_context(|| format!("closing region {}", name))?;
        }
        Ok(())
    }
}

/// Chunk provider backed by an Anvil world directory.
pub struct AnvilProvider {
    world: Arc<AnvilWorld>,
    registry: Arc<Registry>,
    options: AnvilOptions,
}

impl AnvilProvider {
    pub fn new(world: Arc<AnvilWorld>, registry: Arc<Registry>, options: AnvilOptions) -> Self {
        Self {
            world,
            registry,
            options,
        }
    }

    pub fn world(&self) -> &Arc<AnvilWorld> {
        &self.world
    }
}

#[async_trait]
impl ChunkProvider for AnvilProvider {
    async fn load(&self, pos: ChunkPos) -> Result<Option<ChunkColumn>> {
        let Some(root) = self.world.load_raw(pos).await? else {
            return Ok(None);
        };
        let (stored, column) = nbt_to_column(&root, &self.registry, &self.options.column)
            .with_context(|| format!("decoding chunk {}", pos))?;
        if stored != pos {
            tracing::warn!("Chunk {} is stored with position {}", pos, stored);
        }
        Ok(Some(column))
    }

    async fn save(&self, pos: ChunkPos, column: &ChunkColumn) -> Result<()> {
        let root = column_to_nbt(column, pos, &self.registry, self.options.data_version)
            .with_context(|| format!("encoding chunk {}", pos))?;
        self.world.save_raw(pos, &root).await
    }
}
