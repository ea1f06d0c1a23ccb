//! Block-state and biome registry.
//!
//! Each block type owns a contiguous range of global state ids. A state is
//! the block's minimum id plus a mixed-radix offset over its properties: the
//! last property is the least significant digit.
//!
//! The registry is loaded from a minecraft-data style JSON document:
//!
//! ```json
//! { "blocks": [ { "id": 6, "name": "oak_stairs", "minStateId": 9, "maxStateId": 88,
//!                 "states": [ { "name": "facing", "type": "enum", "num_values": 4,
//!                               "values": ["north", "south", "west", "east"] } ] } ],
//!   "biomes": [ { "id": 1, "name": "plains" } ] }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::Deserialize;
use strata_engine::world::block::{BiomeId, StateId};
use strata_engine::world::palette::needed_bits;

/// Property name to value, in the block's property order when produced by
/// the registry.
pub type Properties = IndexMap<String, String>;

const NAMESPACE: &str = "minecraft:";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("unknown block `{0}`")]
    UnknownBlock(String),
    #[error("unknown block state id {0}")]
    UnknownState(u32),
    #[error("unknown biome `{0}`")]
    UnknownBiome(String),
    #[error("unknown biome id {0}")]
    UnknownBiomeId(u32),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub num_values: u32,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: u32,
    pub name: String,
    pub min_state_id: u32,
    pub max_state_id: u32,
    #[serde(default)]
    pub default_state: Option<u32>,
    #[serde(default)]
    pub states: Vec<Property>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Biome {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    blocks: Vec<Block>,
    #[serde(default)]
    biomes: Vec<Biome>,
}

/// A decoded block state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockState<'a> {
    pub name: &'a str,
    pub properties: Properties,
}

#[derive(Debug, Clone)]
pub struct Registry {
    /// Sorted by `min_state_id`.
    blocks: Vec<Block>,
    block_by_name: HashMap<String, usize>,
    biomes: Vec<Biome>,
    biome_by_name: HashMap<String, usize>,
    biome_by_id: HashMap<u32, usize>,
}

impl Registry {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let file: RegistryFile = serde_json::from_str(json)?;
        Ok(Self::new(file.blocks, file.biomes))
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading registry {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parsing registry {}", path.display()))
    }

    pub fn new(mut blocks: Vec<Block>, biomes: Vec<Biome>) -> Self {
        for block in &mut blocks {
            for property in &mut block.states {
                if property.values.is_empty() {
                    property.values = default_values(property);
                }
            }
        }
        blocks.sort_by_key(|block| block.min_state_id);

        let block_by_name = blocks
            .iter()
            .enumerate()
            .map(|(i, block)| (block.name.clone(), i))
            .collect();
        let biome_by_name = biomes
            .iter()
            .enumerate()
            .map(|(i, biome)| (biome.name.clone(), i))
            .collect();
        let biome_by_id = biomes
            .iter()
            .enumerate()
            .map(|(i, biome)| (biome.id, i))
            .collect();

        Self {
            blocks,
            block_by_name,
            biomes,
            biome_by_name,
            biome_by_id,
        }
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.block_by_name
            .get(strip_namespace(name))
            .map(|&i| &self.blocks[i])
    }

    /// Block type owning the state id.
    pub fn block_for_state(&self, id: StateId) -> Option<&Block> {
        let i = self
            .blocks
            .partition_point(|block| block.min_state_id <= id.0)
            .checked_sub(1)?;
        let block = &self.blocks[i];
        (id.0 <= block.max_state_id).then_some(block)
    }

    /// Highest state id across all blocks.
    pub fn max_state_id(&self) -> u32 {
        self.blocks
            .iter()
            .map(|block| block.max_state_id)
            .max()
            .unwrap_or(0)
    }

    /// Width of a direct block palette covering every state id.
    pub fn bits_per_block(&self) -> u32 {
        needed_bits(self.max_state_id())
    }

    /// Width of a direct biome palette covering every biome id.
    pub fn bits_per_biome(&self) -> u32 {
        needed_bits(self.biomes.iter().map(|biome| biome.id).max().unwrap_or(0))
    }

    /// Encodes a block name and property map to a global state id.
    ///
    /// Properties missing from `properties`, or set to a value the property
    /// does not have, take their first value.
    pub fn block_to_state_id(&self, name: &str, properties: &Properties) -> Result<StateId, LookupError> {
        let block = self
            .block(name)
            .ok_or_else(|| LookupError::UnknownBlock(name.to_owned()))?;

        let mut offset = 0u32;
        let mut multiplier = 1u32;
        for property in block.states.iter().rev() {
            let index = properties
                .get(&property.name)
                .and_then(|value| property.values.iter().position(|v| v == value))
                .unwrap_or(0) as u32;
            offset += index * multiplier;
            multiplier *= property.num_values;
        }
        Ok(StateId(block.min_state_id + offset))
    }

    /// Decodes a global state id to its block name and full property map.
    pub fn state_id_to_block(&self, id: StateId) -> Result<BlockState<'_>, LookupError> {
        let block = self
            .block_for_state(id)
            .ok_or(LookupError::UnknownState(id.0))?;

        let mut remaining = id.0 - block.min_state_id;
        let mut multiplier: u32 = block.states.iter().map(|p| p.num_values).product();
        let mut properties = Properties::new();
        for property in &block.states {
            multiplier /= property.num_values.max(1);
            let index = remaining / multiplier.max(1);
            remaining %= multiplier.max(1);
            let value = property
                .values
                .get(index as usize)
                .ok_or(LookupError::UnknownState(id.0))?;
            properties.insert(property.name.clone(), value.clone());
        }
        Ok(BlockState {
            name: &block.name,
            properties,
        })
    }

    pub fn biome_id(&self, name: &str) -> Result<BiomeId, LookupError> {
        self.biome_by_name
            .get(strip_namespace(name))
            .map(|&i| BiomeId(self.biomes[i].id))
            .ok_or_else(|| LookupError::UnknownBiome(name.to_owned()))
    }

    pub fn biome_name(&self, id: BiomeId) -> Result<&str, LookupError> {
        self.biome_by_id
            .get(&id.0)
            .map(|&i| self.biomes[i].name.as_str())
            .ok_or(LookupError::UnknownBiomeId(id.0))
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

fn default_values(property: &Property) -> Vec<String> {
    match property.kind.as_str() {
        "bool" => vec!["true".into(), "false".into()],
        _ => (0..property.num_values).map(|i| i.to_string()).collect(),
    }
}

pub fn strip_namespace(name: &str) -> &str {
    name.strip_prefix(NAMESPACE).unwrap_or(name)
}

pub fn with_namespace(name: &str) -> String {
    if name.contains(':') {
        name.to_owned()
    } else {
        format!("{NAMESPACE}{name}")
    }
}
