//! Translation between [`ChunkColumn`] and the on-disk chunk compound.
//!
//! Layout of the root compound:
//!
//! ```text
//! DataVersion: int          Status: "full"
//! xPos, yPos, zPos: int     (yPos = lowest section Y)
//! sections: [ { Y: byte,
//!               block_states: { palette: [{Name, Properties?}], data?: long[] },
//!               biomes: { palette: [string], data?: long[] },
//!               BlockLight?: byte[2048], SkyLight?: byte[2048] } ]
//! block_entities: [compound]
//! ```
//!
//! plus empty `structures`, `Heightmaps`, `block_ticks`, `PostProcessing`
//! and `fluid_ticks`, and zeroed `LastUpdate`, `InhabitedTime` and
//! `isLightOn`, which are written for readers that expect them and ignored
//! on load.
//!
//! Light-only sections sit one Y below and one Y above the block sections.

use strata_engine::world::bit_array::BitArray;
use strata_engine::world::block::{BiomeId, StateId};
use strata_engine::world::chunk::{ChunkColumn, ColumnError, ColumnOptions, LIGHT_BYTES};
use strata_engine::world::palette::{PaletteConfig, PalettedContainer, bits_for_palette};
use strata_engine::world::position::{ChunkPos, LocalBlockPos};
use strata_engine::world::section::{BIOME_VOLUME, BiomeSection, ChunkSection, SECTION_VOLUME};
use strata_nbt::{Compound, NbtList, Root, Tag};

use crate::registry::{LookupError, Properties, Registry, strip_namespace, with_namespace};

/// Narrowest width block indices are packed at on disk.
const MIN_BLOCK_BITS: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum ChunkNbtError {
    #[error("chunk field `{0}` is missing or has the wrong type")]
    Field(&'static str),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("chunk dimensions: {0}")]
    Column(#[from] ColumnError),
}

/// Builds the disk compound for the column at `pos`.
pub fn column_to_nbt(
    column: &ChunkColumn,
    pos: ChunkPos,
    registry: &Registry,
    data_version: i32,
) -> Result<Root, ChunkNbtError> {
    let min_section = column.min_y() >> 4;
    let mut sections = Vec::with_capacity(column.num_light_sections());

    for light_index in 0..column.num_light_sections() {
        let mut section = Compound::new();
        section.insert("Y".into(), Tag::Byte((min_section + light_index as i32 - 1) as i8));

        let block_section = light_index
            .checked_sub(1)
            .and_then(|i| Some((column.section(i)?, column.biome_section(i)?)));
        if let Some((blocks, biomes)) = block_section {
            section.insert("block_states".into(), Tag::Compound(encode_blocks(blocks, registry)?));
            section.insert("biomes".into(), Tag::Compound(encode_biomes(biomes, registry)?));
        }

        if let Some(light) = column.block_light_section(light_index) {
            section.insert("BlockLight".into(), Tag::ByteArray(to_signed(light.to_nibbles())));
        }
        if let Some(light) = column.sky_light_section(light_index) {
            section.insert("SkyLight".into(), Tag::ByteArray(to_signed(light.to_nibbles())));
        }

        // Y alone: an edge slot without light.
        if section.len() > 1 {
            sections.push(section);
        }
    }

    let block_entities = column.block_entities().map(|(local, tag)| {
        let world = local.to_world(pos);
        let mut tag = tag.clone();
        tag.insert("x".into(), Tag::Int(world.x));
        tag.insert("y".into(), Tag::Int(world.y));
        tag.insert("z".into(), Tag::Int(world.z));
        tag
    });

    let mut root = Compound::new();
    root.insert("DataVersion".into(), Tag::Int(data_version));
    root.insert("Status".into(), Tag::from("full"));
    root.insert("xPos".into(), Tag::Int(pos.x));
    root.insert("yPos".into(), Tag::Int(min_section));
    root.insert("zPos".into(), Tag::Int(pos.z));
    root.insert("sections".into(), Tag::List(NbtList::compounds(sections)));
    root.insert("block_entities".into(), Tag::List(NbtList::compounds(block_entities)));
    root.insert("structures".into(), Tag::Compound(Compound::new()));
    root.insert("Heightmaps".into(), Tag::Compound(Compound::new()));
    root.insert("LastUpdate".into(), Tag::Long(0));
    root.insert("InhabitedTime".into(), Tag::Long(0));
    root.insert("isLightOn".into(), Tag::Byte(0));
    root.insert("block_ticks".into(), Tag::List(NbtList::empty()));
    root.insert("PostProcessing".into(), Tag::List(NbtList::empty()));
    root.insert("fluid_ticks".into(), Tag::List(NbtList::empty()));
    Ok(Root::unnamed(root))
}

fn encode_blocks(section: &ChunkSection, registry: &Registry) -> Result<Compound, ChunkNbtError> {
    let (ids, data) = section.blocks().to_local_palette();

    let mut palette = Vec::with_capacity(ids.len());
    for id in &ids {
        let state = registry.state_id_to_block(StateId(*id))?;
        let mut entry = Compound::new();
        entry.insert("Name".into(), Tag::String(with_namespace(state.name)));
        if !state.properties.is_empty() {
            let properties = state
                .properties
                .into_iter()
                .map(|(name, value)| (name, Tag::String(value)))
                .collect();
            entry.insert("Properties".into(), Tag::Compound(properties));
        }
        palette.push(entry);
    }

    let mut out = Compound::new();
    out.insert("palette".into(), Tag::List(NbtList::compounds(palette)));
    if let (true, Some(data)) = (ids.len() > 1, data) {
        let bits = bits_for_palette(ids.len()).max(MIN_BLOCK_BITS);
        out.insert("data".into(), Tag::LongArray(data.to_long_array(bits)));
    }
    Ok(out)
}

fn encode_biomes(section: &BiomeSection, registry: &Registry) -> Result<Compound, ChunkNbtError> {
    let (ids, data) = section.biomes().to_local_palette();

    let mut palette = Vec::with_capacity(ids.len());
    for id in &ids {
        palette.push(with_namespace(registry.biome_name(BiomeId(*id))?));
    }

    let mut out = Compound::new();
    out.insert("palette".into(), Tag::List(NbtList::strings(palette)));
    if let (true, Some(data)) = (ids.len() > 1, data) {
        out.insert(
            "data".into(),
            Tag::LongArray(data.to_long_array(bits_for_palette(ids.len()))),
        );
    }
    Ok(out)
}

/// Rebuilds a column from its disk compound.
///
/// The bottom of the column comes from `yPos`. The height spans up to the
/// highest section with block states, or `options.world_height` when there
/// are none. Id widths come from `options`.
pub fn nbt_to_column(
    root: &Root,
    registry: &Registry,
    options: &ColumnOptions,
) -> Result<(ChunkPos, ChunkColumn), ChunkNbtError> {
    let nbt = &root.compound;
    let pos = ChunkPos::new(int(nbt, "xPos")?, int(nbt, "zPos")?);
    let min_section = match nbt.get("yPos") {
        Some(tag) => tag.as_i32().ok_or(ChunkNbtError::Field("yPos"))?,
        None => options.min_y >> 4,
    };

    let empty = NbtList::empty();
    let sections = match nbt.get("sections") {
        Some(tag) => tag.as_list().ok_or(ChunkNbtError::Field("sections"))?,
        None => &empty,
    };

    let mut parsed = Vec::with_capacity(sections.len());
    for tag in sections {
        let section = tag.as_compound().ok_or(ChunkNbtError::Field("sections"))?;
        let y = section
            .get("Y")
            .and_then(|y| y.as_i8().map(i32::from).or_else(|| y.as_i32()))
            .ok_or(ChunkNbtError::Field("Y"))?;
        parsed.push((y, section));
    }

    let min_y = min_section
        .checked_mul(16)
        .ok_or(ChunkNbtError::Field("yPos"))?;
    let mut world_height = None;
    for (y, section) in &parsed {
        if !section.contains_key("block_states") {
            continue;
        }
        let height = y
            .checked_sub(min_section)
            .and_then(|above| above.checked_add(1))
            .and_then(|count| count.checked_mul(16))
            .ok_or(ChunkNbtError::Field("Y"))?;
        world_height = world_height.max(Some(height));
    }

    let mut column = ChunkColumn::new(ColumnOptions {
        min_y,
        world_height: world_height.unwrap_or(options.world_height),
        ..*options
    })?;

    for (y, section) in parsed {
        let light_index = i64::from(y) - i64::from(min_section) + 1;
        if light_index < 0 || light_index >= column.num_light_sections() as i64 {
            tracing::warn!("Chunk {}: section Y {} is outside the column, skipping", pos, y);
            continue;
        }
        let light_index = light_index as usize;

        if light_index >= 1 && light_index <= column.num_sections() {
            let index = light_index - 1;
            if let Some(states) = section.get("block_states") {
                let states = states.as_compound().ok_or(ChunkNbtError::Field("block_states"))?;
                let blocks = decode_blocks(states, registry, options.max_bits_per_block)?;
                column.set_section(index, ChunkSection::from_container(blocks));
            }
            if let Some(biomes) = section.get("biomes") {
                let biomes = biomes.as_compound().ok_or(ChunkNbtError::Field("biomes"))?;
                let biomes = decode_biomes(biomes, registry, options.max_bits_per_biome)?;
                column.set_biome_section(index, BiomeSection::from_container(biomes));
            }
        }

        if let Some(light) = light_array(section, "BlockLight")? {
            column.set_block_light_section(light_index, Some(light));
        }
        if let Some(light) = light_array(section, "SkyLight")? {
            column.set_sky_light_section(light_index, Some(light));
        }
    }

    if let Some(entities) = nbt.get("block_entities") {
        let entities = entities.as_list().ok_or(ChunkNbtError::Field("block_entities"))?;
        for entity in entities {
            let entity = entity.as_compound().ok_or(ChunkNbtError::Field("block_entities"))?;
            let local = LocalBlockPos::new(
                (int(entity, "x")? & 0xF) as u8,
                int(entity, "y")?,
                (int(entity, "z")? & 0xF) as u8,
            );
            column.set_block_entity(local, entity.clone());
        }
    }

    Ok((pos, column))
}

fn decode_blocks(
    states: &Compound,
    registry: &Registry,
    global_bits: u32,
) -> Result<PalettedContainer, ChunkNbtError> {
    let config = PaletteConfig::blocks(global_bits);
    let palette = states
        .get("palette")
        .and_then(Tag::as_list)
        .ok_or(ChunkNbtError::Field("block_states.palette"))?;

    let mut ids = Vec::with_capacity(palette.len());
    for entry in palette {
        let entry = entry
            .as_compound()
            .ok_or(ChunkNbtError::Field("block_states.palette"))?;
        let name = entry
            .get("Name")
            .and_then(Tag::as_str)
            .ok_or(ChunkNbtError::Field("Name"))?;
        let properties: Properties = match entry.get("Properties") {
            Some(tag) => tag
                .as_compound()
                .ok_or(ChunkNbtError::Field("Properties"))?
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_owned())))
                .collect(),
            None => Properties::new(),
        };
        ids.push(registry.block_to_state_id(strip_namespace(name), &properties)?.0);
    }

    let bits = bits_for_palette(ids.len()).max(MIN_BLOCK_BITS);
    let data = packed_data(states, "block_states.data", bits, SECTION_VOLUME)?;
    Ok(PalettedContainer::from_local_palette(config, ids, data))
}

fn decode_biomes(
    biomes: &Compound,
    registry: &Registry,
    global_bits: u32,
) -> Result<PalettedContainer, ChunkNbtError> {
    let config = PaletteConfig::biomes(global_bits);
    let palette = biomes
        .get("palette")
        .and_then(Tag::as_list)
        .ok_or(ChunkNbtError::Field("biomes.palette"))?;

    let mut ids = Vec::with_capacity(palette.len());
    for entry in palette {
        let name = entry.as_str().ok_or(ChunkNbtError::Field("biomes.palette"))?;
        ids.push(registry.biome_id(name)?.0);
    }

    let bits = bits_for_palette(ids.len()).max(1);
    let data = packed_data(biomes, "biomes.data", bits, BIOME_VOLUME)?;
    Ok(PalettedContainer::from_local_palette(config, ids, data))
}

fn packed_data(
    compound: &Compound,
    field: &'static str,
    bits: u32,
    capacity: usize,
) -> Result<Option<BitArray>, ChunkNbtError> {
    match compound.get("data") {
        Some(tag) => {
            let longs = tag.as_long_array().ok_or(ChunkNbtError::Field(field))?;
            Ok(Some(BitArray::from_long_array(longs, bits, capacity)))
        }
        None => Ok(None),
    }
}

fn light_array(section: &Compound, field: &'static str) -> Result<Option<BitArray>, ChunkNbtError> {
    match section.get(field) {
        Some(tag) => {
            let bytes = tag.as_byte_array().ok_or(ChunkNbtError::Field(field))?;
            if bytes.len() != LIGHT_BYTES {
                tracing::warn!("{} has {} bytes, expected {}, ignoring", field, bytes.len(), LIGHT_BYTES);
                return Ok(None);
            }
            let bytes: Vec<u8> = bytes.iter().map(|&b| b as u8).collect();
            Ok(Some(BitArray::from_nibbles(&bytes)))
        }
        None => Ok(None),
    }
}

fn int(compound: &Compound, field: &'static str) -> Result<i32, ChunkNbtError> {
    compound
        .get(field)
        .and_then(Tag::as_i32)
        .ok_or(ChunkNbtError::Field(field))
}

fn to_signed(bytes: Vec<u8>) -> Vec<i8> {
    bytes.into_iter().map(|b| b as i8).collect()
}
