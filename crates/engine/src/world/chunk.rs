use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_nbt::Compound;

use super::bit_array::BitArray;
use super::block::{BiomeId, StateId};
use super::position::LocalBlockPos;
use super::section::{BiomeSection, ChunkSection, SECTION_VOLUME};

/// Bytes in one section's nibble-packed light array.
pub const LIGHT_BYTES: usize = SECTION_VOLUME / 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ColumnError {
    #[error("world height {0} is not a positive multiple of 16")]
    InvalidHeight(i32),
    #[error("minimum y {0} is not a multiple of 16")]
    InvalidMinY(i32),
    #[error("column from y {min_y} spanning {world_height} blocks overflows")]
    OutOfRange { min_y: i32, world_height: i32 },
    #[error("{what} width {bits} is outside 1..=32")]
    InvalidBits { what: &'static str, bits: u32 },
}

/// Dimensions and id-space widths shared by every column of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOptions {
    pub min_y: i32,
    pub world_height: i32,
    pub max_bits_per_block: u32,
    pub max_bits_per_biome: u32,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        Self {
            min_y: -64,
            world_height: 384,
            max_bits_per_block: 15,
            max_bits_per_biome: 6,
        }
    }
}

impl ColumnOptions {
    pub fn validate(&self) -> Result<(), ColumnError> {
        if self.world_height <= 0 || self.world_height % 16 != 0 {
            return Err(ColumnError::InvalidHeight(self.world_height));
        }
        if self.min_y % 16 != 0 {
            return Err(ColumnError::InvalidMinY(self.min_y));
        }
        if self.min_y.checked_add(self.world_height).is_none() {
            return Err(ColumnError::OutOfRange {
                min_y: self.min_y,
                world_height: self.world_height,
            });
        }
        for (what, bits) in [
            ("block", self.max_bits_per_block),
            ("biome", self.max_bits_per_biome),
        ] {
            if !(1..=32).contains(&bits) {
                return Err(ColumnError::InvalidBits { what, bits });
            }
        }
        Ok(())
    }

    pub fn num_sections(&self) -> usize {
        (self.world_height / 16) as usize
    }

    /// One past the highest block Y.
    pub fn max_y(&self) -> i32 {
        self.min_y + self.world_height
    }
}

/// A vertical stack of sections covering the world's height range.
///
/// Light arrays have two more slots than there are sections: slot 0 sits
/// below the world and the last slot above it, so light slot `i + 1`
/// belongs to section `i`. Light slots are allocated lazily; an absent slot
/// reads as 0 everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkColumn {
    options: ColumnOptions,
    sections: Vec<ChunkSection>,
    biomes: Vec<BiomeSection>,
    block_light: Vec<Option<BitArray>>,
    sky_light: Vec<Option<BitArray>>,
    /// Keyed by [`ChunkColumn::block_entity_key`].
    block_entities: BTreeMap<u32, Compound>,
}

impl ChunkColumn {
    /// An all-air column with biome 0, no light and no block entities.
    pub fn new(options: ColumnOptions) -> Result<Self, ColumnError> {
        options.validate()?;
        let count = options.num_sections();
        Ok(Self {
            options,
            sections: vec![ChunkSection::new(options.max_bits_per_block); count],
            biomes: vec![BiomeSection::new(options.max_bits_per_biome); count],
            block_light: vec![None; count + 2],
            sky_light: vec![None; count + 2],
            block_entities: BTreeMap::new(),
        })
    }

    pub fn options(&self) -> ColumnOptions {
        self.options
    }

    pub fn min_y(&self) -> i32 {
        self.options.min_y
    }

    pub fn world_height(&self) -> i32 {
        self.options.world_height
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn contains_y(&self, y: i32) -> bool {
        y >= self.options.min_y && y < self.options.max_y()
    }

    /// Section holding world Y `y`, if it is inside the column.
    pub fn section_index(&self, y: i32) -> Option<usize> {
        self.contains_y(y)
            .then(|| ((y - self.options.min_y) >> 4) as usize)
    }

    /// Light slot holding world Y `y`; reaches one section past either end.
    fn light_index(&self, y: i32) -> Option<usize> {
        let index = ((i64::from(y) - i64::from(self.options.min_y)) >> 4) + 1;
        (0..self.block_light.len() as i64)
            .contains(&index)
            .then_some(index as usize)
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    pub fn get_block_state_id(&self, pos: LocalBlockPos) -> StateId {
        match self.section_index(pos.y) {
            Some(i) => self.sections[i].get(pos.x, pos.section_local_y(), pos.z),
            None => StateId::AIR,
        }
    }

    /// Writes a block state and returns the previous one. Writes outside the
    /// height range are dropped and report air.
    pub fn set_block_state_id(&mut self, pos: LocalBlockPos, state: StateId) -> StateId {
        match self.section_index(pos.y) {
            Some(i) => self.sections[i].set(pos.x, pos.section_local_y(), pos.z, state),
            None => StateId::AIR,
        }
    }

    // ── Biomes ──────────────────────────────────────────────────────────

    pub fn get_biome_id(&self, pos: LocalBlockPos) -> BiomeId {
        match self.section_index(pos.y) {
            Some(i) => self.biomes[i].get(pos.x, pos.section_local_y(), pos.z),
            None => BiomeId::default(),
        }
    }

    pub fn set_biome_id(&mut self, pos: LocalBlockPos, biome: BiomeId) {
        if let Some(i) = self.section_index(pos.y) {
            self.biomes[i].set(pos.x, pos.section_local_y(), pos.z, biome);
        }
    }

    // ── Light ───────────────────────────────────────────────────────────

    pub fn get_block_light(&self, pos: LocalBlockPos) -> u8 {
        self.read_light(LightKind::Block, pos)
    }

    pub fn set_block_light(&mut self, pos: LocalBlockPos, level: u8) {
        self.write_light(LightKind::Block, pos, level);
    }

    pub fn get_sky_light(&self, pos: LocalBlockPos) -> u8 {
        self.read_light(LightKind::Sky, pos)
    }

    pub fn set_sky_light(&mut self, pos: LocalBlockPos, level: u8) {
        self.write_light(LightKind::Sky, pos, level);
    }

    fn light(&self, kind: LightKind) -> &Vec<Option<BitArray>> {
        match kind {
            LightKind::Block => &self.block_light,
            LightKind::Sky => &self.sky_light,
        }
    }

    fn light_mut(&mut self, kind: LightKind) -> &mut Vec<Option<BitArray>> {
        match kind {
            LightKind::Block => &mut self.block_light,
            LightKind::Sky => &mut self.sky_light,
        }
    }

    fn read_light(&self, kind: LightKind, pos: LocalBlockPos) -> u8 {
        let Some(slot) = self.light_index(pos.y) else {
            return 0;
        };
        match &self.light(kind)[slot] {
            Some(light) => light.get(ChunkSection::index(pos.x, pos.section_local_y(), pos.z)) as u8,
            None => 0,
        }
    }

    fn write_light(&mut self, kind: LightKind, pos: LocalBlockPos, level: u8) {
        let Some(slot) = self.light_index(pos.y) else {
            return;
        };
        let entry = &mut self.light_mut(kind)[slot];
        // Writing 0 into an unallocated slot changes nothing observable.
        if entry.is_none() && level == 0 {
            return;
        }
        let light = entry.get_or_insert_with(|| BitArray::new(4, SECTION_VOLUME));
        light.set(
            ChunkSection::index(pos.x, pos.section_local_y(), pos.z),
            u32::from(level),
        );
    }

    // ── Block entities ──────────────────────────────────────────────────

    /// Packs a local position into `((y - min_y) << 8) | (z << 4) | x`.
    fn block_entity_key(&self, pos: LocalBlockPos) -> Option<u32> {
        self.contains_y(pos.y).then(|| {
            (((pos.y - self.options.min_y) as u32) << 8)
                | (u32::from(pos.z & 0xF) << 4)
                | u32::from(pos.x & 0xF)
        })
    }

    fn block_entity_pos(&self, key: u32) -> LocalBlockPos {
        LocalBlockPos {
            x: (key & 0xF) as u8,
            y: (key >> 8) as i32 + self.options.min_y,
            z: ((key >> 4) & 0xF) as u8,
        }
    }

    pub fn get_block_entity(&self, pos: LocalBlockPos) -> Option<&Compound> {
        self.block_entity_key(pos)
            .and_then(|key| self.block_entities.get(&key))
    }

    /// Stores an opaque block-entity payload, returning the one it replaced.
    /// Positions outside the height range are dropped.
    pub fn set_block_entity(&mut self, pos: LocalBlockPos, tag: Compound) -> Option<Compound> {
        let key = self.block_entity_key(pos)?;
        self.block_entities.insert(key, tag)
    }

    pub fn remove_block_entity(&mut self, pos: LocalBlockPos) -> Option<Compound> {
        let key = self.block_entity_key(pos)?;
        self.block_entities.remove(&key)
    }

    /// Block entities in ascending (y, z, x) order.
    pub fn block_entities(&self) -> impl Iterator<Item = (LocalBlockPos, &Compound)> + '_ {
        self.block_entities
            .iter()
            .map(|(&key, tag)| (self.block_entity_pos(key), tag))
    }

    pub fn block_entity_count(&self) -> usize {
        self.block_entities.len()
    }

    // ── Whole sections ──────────────────────────────────────────────────

    pub fn section(&self, index: usize) -> Option<&ChunkSection> {
        self.sections.get(index)
    }

    pub fn set_section(&mut self, index: usize, section: ChunkSection) {
        if let Some(slot) = self.sections.get_mut(index) {
            *slot = section;
        }
    }

    pub fn sections(&self) -> &[ChunkSection] {
        &self.sections
    }

    pub fn biome_section(&self, index: usize) -> Option<&BiomeSection> {
        self.biomes.get(index)
    }

    pub fn set_biome_section(&mut self, index: usize, biomes: BiomeSection) {
        if let Some(slot) = self.biomes.get_mut(index) {
            *slot = biomes;
        }
    }

    /// Number of light slots (`num_sections + 2`).
    pub fn num_light_sections(&self) -> usize {
        self.block_light.len()
    }

    pub fn block_light_section(&self, index: usize) -> Option<&BitArray> {
        self.block_light.get(index).and_then(Option::as_ref)
    }

    pub fn set_block_light_section(&mut self, index: usize, light: Option<BitArray>) {
        if let Some(slot) = self.block_light.get_mut(index) {
            *slot = light;
        }
    }

    pub fn sky_light_section(&self, index: usize) -> Option<&BitArray> {
        self.sky_light.get(index).and_then(Option::as_ref)
    }

    pub fn set_sky_light_section(&mut self, index: usize, light: Option<BitArray>) {
        if let Some(slot) = self.sky_light.get_mut(index) {
            *slot = light;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LightKind {
    Block,
    Sky,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_nbt::Tag;

    fn overworld() -> ChunkColumn {
        ChunkColumn::new(ColumnOptions::default()).unwrap()
    }

    #[test]
    fn test_dimensions() {
        let column = overworld();
        assert_eq!(column.num_sections(), 24);
        assert_eq!(column.num_light_sections(), 26);
        assert_eq!(column.section_index(-64), Some(0));
        assert_eq!(column.section_index(-49), Some(0));
        assert_eq!(column.section_index(-48), Some(1));
        assert_eq!(column.section_index(319), Some(23));
        assert_eq!(column.section_index(320), None);
        assert_eq!(column.section_index(-65), None);
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        let mut options = ColumnOptions::default();
        options.world_height = 100;
        assert_eq!(ChunkColumn::new(options).unwrap_err(), ColumnError::InvalidHeight(100));
        options.world_height = 0;
        assert!(ChunkColumn::new(options).is_err());
        options.world_height = 256;
        options.min_y = -5;
        assert_eq!(ChunkColumn::new(options).unwrap_err(), ColumnError::InvalidMinY(-5));
        options.min_y = i32::MAX - 15;
        options.world_height = 16;
        assert_eq!(
            ChunkColumn::new(options).unwrap_err(),
            ColumnError::OutOfRange {
                min_y: i32::MAX - 15,
                world_height: 16,
            }
        );
    }

    #[test]
    fn test_blocks_at_negative_y() {
        let mut column = overworld();
        let pos = LocalBlockPos::new(3, -60, 3);
        assert_eq!(column.set_block_state_id(pos, StateId(1)), StateId::AIR);
        assert_eq!(column.get_block_state_id(pos), StateId(1));
        assert!(!column.section(0).unwrap().is_empty());
        assert!(column.section(1).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_reads_and_writes() {
        let mut column = overworld();
        let above = LocalBlockPos::new(0, 320, 0);
        column.set_block_state_id(above, StateId(9));
        assert_eq!(column.get_block_state_id(above), StateId::AIR);
        column.set_biome_id(above, BiomeId(2));
        assert_eq!(column.get_biome_id(above), BiomeId(0));
        assert!(column.set_block_entity(above, Compound::new()).is_none());
        assert_eq!(column.block_entity_count(), 0);
    }

    #[test]
    fn test_biomes() {
        let mut column = overworld();
        column.set_biome_id(LocalBlockPos::new(0, 0, 0), BiomeId(4));
        assert_eq!(column.get_biome_id(LocalBlockPos::new(3, 3, 3)), BiomeId(4));
        assert_eq!(column.get_biome_id(LocalBlockPos::new(4, 0, 0)), BiomeId(0));
    }

    #[test]
    fn test_light_is_sparse() {
        let mut column = overworld();
        let pos = LocalBlockPos::new(1, 70, 2);
        column.set_sky_light(pos, 0);
        assert!(column.sky_light_section(column.section_index(70).unwrap() + 1).is_none());

        column.set_sky_light(pos, 15);
        column.set_block_light(pos, 7);
        assert_eq!(column.get_sky_light(pos), 15);
        assert_eq!(column.get_block_light(pos), 7);
        assert_eq!(column.get_block_light(LocalBlockPos::new(0, 70, 2)), 0);
    }

    #[test]
    fn test_light_beyond_world_edges() {
        let mut column = overworld();
        let below = LocalBlockPos::new(0, -65, 0);
        let above = LocalBlockPos::new(0, 330, 0);
        column.set_sky_light(below, 3);
        column.set_sky_light(above, 12);
        assert_eq!(column.get_sky_light(below), 3);
        assert_eq!(column.get_sky_light(above), 12);
        assert!(column.sky_light_section(0).is_some());
        assert!(column.sky_light_section(25).is_some());

        let far = LocalBlockPos::new(0, 400, 0);
        column.set_sky_light(far, 5);
        assert_eq!(column.get_sky_light(far), 0);
    }

    #[test]
    fn test_light_at_extreme_y() {
        let mut column = overworld();
        for y in [i32::MAX, i32::MIN] {
            let pos = LocalBlockPos::new(0, y, 0);
            column.set_sky_light(pos, 9);
            column.set_block_light(pos, 9);
            assert_eq!(column.get_sky_light(pos), 0);
            assert_eq!(column.get_block_light(pos), 0);
        }
        assert!((0..column.num_light_sections()).all(|i| column.sky_light_section(i).is_none()));
    }

    #[test]
    fn test_wide_local_coordinates_wrap() {
        let mut column = overworld();
        column.set_block_state_id(LocalBlockPos::new(17, 5, 34), StateId(3));
        assert_eq!(column.get_block_state_id(LocalBlockPos::new(1, 5, 2)), StateId(3));
        column.set_biome_id(LocalBlockPos::new(20, 5, 0), BiomeId(6));
        assert_eq!(column.get_biome_id(LocalBlockPos::new(4, 5, 0)), BiomeId(6));
        assert_eq!(column.get_biome_id(LocalBlockPos::new(0, 5, 4)), BiomeId(0));
        column.set_block_light(LocalBlockPos::new(255, 5, 0), 4);
        assert_eq!(column.get_block_light(LocalBlockPos::new(15, 5, 0)), 4);
    }

    #[test]
    fn test_block_entities() {
        let mut column = overworld();
        let mut chest = Compound::new();
        chest.insert("id".into(), Tag::from("minecraft:chest"));
        let mut sign = Compound::new();
        sign.insert("id".into(), Tag::from("minecraft:sign"));

        let low = LocalBlockPos::new(15, -64, 0);
        let high = LocalBlockPos::new(0, 100, 15);
        assert!(column.set_block_entity(high, sign.clone()).is_none());
        assert!(column.set_block_entity(low, chest.clone()).is_none());

        // Block writes never touch entities.
        column.set_block_state_id(low, StateId::AIR);
        assert_eq!(column.get_block_entity(low), Some(&chest));

        let listed: Vec<LocalBlockPos> = column.block_entities().map(|(pos, _)| pos).collect();
        assert_eq!(listed, [low, high]);

        assert_eq!(column.remove_block_entity(low), Some(chest));
        assert!(column.get_block_entity(low).is_none());
        assert_eq!(column.block_entity_count(), 1);
    }
}
