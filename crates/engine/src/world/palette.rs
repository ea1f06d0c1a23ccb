//! Paletted containers: a fixed-size grid of global ids stored in one of
//! three shapes.
//!
//! - `Single`: every position holds the same id; nothing is allocated.
//! - `Indirect`: a small palette of global ids plus packed indices into it.
//! - `Direct`: packed global ids.
//!
//! Writes promote `Single -> Indirect -> Direct` as the number of distinct
//! ids grows. Promotion never runs backwards; only [`PalettedContainer::fill`]
//! resets a container to `Single`.

use std::collections::HashMap;

use super::bit_array::BitArray;

/// Sizing rules for one kind of container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteConfig {
    /// Number of positions.
    pub volume: usize,
    /// Narrowest width an indirect palette is stored at.
    pub min_bits: u32,
    /// Widest indirect palette; more distinct ids switch to direct.
    pub max_indirect_bits: u32,
    /// Width of the direct shape, enough for the whole global id space.
    pub global_bits: u32,
}

impl PaletteConfig {
    /// 16x16x16 block states.
    pub const fn blocks(global_bits: u32) -> Self {
        Self {
            volume: 4096,
            min_bits: 4,
            max_indirect_bits: 8,
            global_bits,
        }
    }

    /// 4x4x4 biome cells.
    pub const fn biomes(global_bits: u32) -> Self {
        Self {
            volume: 64,
            min_bits: 1,
            max_indirect_bits: 3,
            global_bits,
        }
    }

    /// Width of an indirect palette holding `palette_len` entries, or `None`
    /// once the palette is too large to be worth the indirection.
    pub fn indirect_bits(&self, palette_len: usize) -> Option<u32> {
        let bits = bits_for_palette(palette_len).max(self.min_bits);
        (bits <= self.max_indirect_bits).then_some(bits)
    }
}

/// Bits needed to store the value `n`.
pub fn needed_bits(n: u32) -> u32 {
    u32::BITS - n.leading_zeros()
}

/// `ceil(log2(palette_len))`: bits needed to index a palette of that size.
pub fn bits_for_palette(palette_len: usize) -> u32 {
    needed_bits(palette_len.saturating_sub(1) as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteKind {
    Single,
    Indirect,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Storage {
    Single(u32),
    Indirect { palette: Vec<u32>, data: BitArray },
    Direct(BitArray),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalettedContainer {
    config: PaletteConfig,
    storage: Storage,
}

impl PalettedContainer {
    /// A container holding `value` everywhere.
    pub fn new(config: PaletteConfig, value: u32) -> Self {
        Self {
            config,
            storage: Storage::Single(value),
        }
    }

    /// Bulk constructor used by loaders: a local palette plus indices into
    /// it. No data, or a palette of one entry, yields the single shape;
    /// palettes too large for the indirect shape are materialised as direct.
    pub fn from_local_palette(config: PaletteConfig, palette: Vec<u32>, data: Option<BitArray>) -> Self {
        let storage = match (palette.len(), data) {
            (0, _) => Storage::Single(0),
            (1, _) | (_, None) => Storage::Single(palette[0]),
            (len, Some(mut data)) => {
                data.resize_capacity(config.volume);
                match config.indirect_bits(len) {
                    Some(bits) => {
                        data.resize(bits);
                        Storage::Indirect { palette, data }
                    }
                    None => {
                        let mut direct = BitArray::new(config.global_bits, config.volume);
                        for (i, local) in data.iter().enumerate() {
                            direct.set(i, palette.get(local as usize).copied().unwrap_or(0));
                        }
                        Storage::Direct(direct)
                    }
                }
            }
        };
        Self { config, storage }
    }

    pub fn config(&self) -> PaletteConfig {
        self.config
    }

    pub fn kind(&self) -> PaletteKind {
        match self.storage {
            Storage::Single(_) => PaletteKind::Single,
            Storage::Indirect { .. } => PaletteKind::Indirect,
            Storage::Direct(_) => PaletteKind::Direct,
        }
    }

    /// Width of the backing array; 0 for the single shape.
    pub fn bits_per_value(&self) -> u32 {
        match &self.storage {
            Storage::Single(_) => 0,
            Storage::Indirect { data, .. } | Storage::Direct(data) => data.bits_per_value(),
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        match &self.storage {
            Storage::Single(value) => *value,
            Storage::Indirect { palette, data } => {
                palette.get(data.get(index) as usize).copied().unwrap_or(0)
            }
            Storage::Direct(data) => data.get(index),
        }
    }

    pub fn set(&mut self, index: usize, value: u32) {
        let config = self.config;
        match &mut self.storage {
            Storage::Single(current) => {
                let previous = *current;
                if previous == value {
                    return;
                }
                let mut data = BitArray::new(config.min_bits.max(1), config.volume);
                data.set(index, 1);
                self.storage = Storage::Indirect {
                    palette: vec![previous, value],
                    data,
                };
                return;
            }
            Storage::Indirect { palette, data } => {
                if let Some(local) = palette.iter().position(|&id| id == value) {
                    data.set(index, local as u32);
                    return;
                }
                let local = palette.len() as u32;
                let bits = needed_bits(local);
                if bits <= config.max_indirect_bits {
                    if bits > data.bits_per_value() {
                        data.resize(bits.max(config.min_bits));
                    }
                    palette.push(value);
                    data.set(index, local);
                    return;
                }
            }
            Storage::Direct(data) => {
                data.set(index, value);
                return;
            }
        }

        // The indirect palette is full: switch to global ids.
        self.storage = Storage::Direct(self.to_direct());
        self.set(index, value);
    }

    /// Replaces every position with `value`, dropping any backing storage.
    pub fn fill(&mut self, value: u32) {
        self.storage = Storage::Single(value);
    }

    fn to_direct(&self) -> BitArray {
        let mut direct = BitArray::new(self.config.global_bits, self.config.volume);
        for i in 0..self.config.volume {
            direct.set(i, self.get(i));
        }
        direct
    }

    /// Extracts a local palette and indices from whichever shape is active.
    ///
    /// The direct shape synthesises its palette in order of first
    /// appearance. Indices are packed at `ceil(log2(len))` bits, at least the
    /// configured minimum. The single shape returns no indices.
    pub fn to_local_palette(&self) -> (Vec<u32>, Option<BitArray>) {
        match &self.storage {
            Storage::Single(value) => (vec![*value], None),
            Storage::Indirect { palette, data } => (palette.clone(), Some(data.clone())),
            Storage::Direct(data) => {
                let mut palette = Vec::new();
                let mut lookup: HashMap<u32, u32> = HashMap::new();
                let indices: Vec<u32> = data
                    .iter()
                    .map(|id| {
                        *lookup.entry(id).or_insert_with(|| {
                            palette.push(id);
                            palette.len() as u32 - 1
                        })
                    })
                    .collect();
                if palette.len() == 1 {
                    return (palette, None);
                }
                let bits = bits_for_palette(palette.len()).max(self.config.min_bits);
                let mut packed = BitArray::new(bits, self.config.volume);
                for (i, local) in indices.into_iter().enumerate() {
                    packed.set(i, local);
                }
                (palette, Some(packed))
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.config.volume).map(|i| self.get(i))
    }
}
