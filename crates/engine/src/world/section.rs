use super::block::{BiomeId, StateId};
use super::palette::{PaletteConfig, PalettedContainer};

/// Number of blocks along each axis of a chunk section.
pub const SECTION_SIZE: usize = 16;
/// Total block count in one section.
pub const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;
/// Biome cells along each axis of a section (one cell per 4x4x4 blocks).
pub const BIOME_SIZE: usize = 4;
pub const BIOME_VOLUME: usize = BIOME_SIZE * BIOME_SIZE * BIOME_SIZE;

/// A 16x16x16 cube of block states in YZX order (`y*256 + z*16 + x`), the
/// same order the disk format packs them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSection {
    blocks: PalettedContainer,
    /// Non-air positions, kept in step with every write.
    solid_block_count: u16,
}

impl ChunkSection {
    /// An all-air section whose direct shape stores `global_bits` per block.
    pub fn new(global_bits: u32) -> Self {
        Self {
            blocks: PalettedContainer::new(PaletteConfig::blocks(global_bits), StateId::AIR.0),
            solid_block_count: 0,
        }
    }

    /// Wraps a container built by a loader, counting its solid blocks once.
    pub fn from_container(blocks: PalettedContainer) -> Self {
        let solid = blocks.iter().filter(|&id| id != StateId::AIR.0).count();
        Self {
            blocks,
            solid_block_count: solid as u16,
        }
    }

    /// Flat index of local coordinates; each axis wraps into 0..16.
    #[inline]
    pub const fn index(x: u8, y: u8, z: u8) -> usize {
        ((y & 0xF) as usize) * SECTION_SIZE * SECTION_SIZE
            + ((z & 0xF) as usize) * SECTION_SIZE
            + ((x & 0xF) as usize)
    }

    #[inline]
    pub fn get(&self, x: u8, y: u8, z: u8) -> StateId {
        StateId(self.blocks.get(Self::index(x, y, z)))
    }

    /// Writes a state and returns the one it replaced.
    pub fn set(&mut self, x: u8, y: u8, z: u8, state: StateId) -> StateId {
        let index = Self::index(x, y, z);
        let old = StateId(self.blocks.get(index));
        if old == state {
            return old;
        }
        self.blocks.set(index, state.0);
        // A direct container masks ids wider than its global width.
        let stored = StateId(self.blocks.get(index));
        match (old == StateId::AIR, stored == StateId::AIR) {
            (true, false) => self.solid_block_count += 1,
            (false, true) => self.solid_block_count -= 1,
            _ => {}
        }
        old
    }

    /// Replaces every block with `state`.
    pub fn fill(&mut self, state: StateId) {
        self.blocks.fill(state.0);
        self.solid_block_count = if state == StateId::AIR {
            0
        } else {
            SECTION_VOLUME as u16
        };
    }

    pub fn is_empty(&self) -> bool {
        self.solid_block_count == 0
    }

    pub fn solid_block_count(&self) -> u16 {
        self.solid_block_count
    }

    pub fn blocks(&self) -> &PalettedContainer {
        &self.blocks
    }
}

/// Biomes of one section on a 4x4x4 grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiomeSection {
    biomes: PalettedContainer,
}

impl BiomeSection {
    pub fn new(global_bits: u32) -> Self {
        Self {
            biomes: PalettedContainer::new(PaletteConfig::biomes(global_bits), 0),
        }
    }

    pub fn from_container(biomes: PalettedContainer) -> Self {
        Self { biomes }
    }

    /// Cell index for block-local coordinates; each axis wraps into 0..16.
    #[inline]
    pub const fn index(x: u8, y: u8, z: u8) -> usize {
        ((((y & 0xF) >> 2) as usize) << 4) | ((((z & 0xF) >> 2) as usize) << 2) | (((x & 0xF) >> 2) as usize)
    }

    #[inline]
    pub fn get(&self, x: u8, y: u8, z: u8) -> BiomeId {
        BiomeId(self.biomes.get(Self::index(x, y, z)))
    }

    pub fn set(&mut self, x: u8, y: u8, z: u8, biome: BiomeId) {
        self.biomes.set(Self::index(x, y, z), biome.0);
    }

    pub fn fill(&mut self, biome: BiomeId) {
        self.biomes.fill(biome.0);
    }

    pub fn biomes(&self) -> &PalettedContainer {
        &self.biomes
    }
}
