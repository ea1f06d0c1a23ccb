//! Column <-> disk compound translation, including the full byte pipeline.

use serde::Deserialize;
use strata_anvil::chunk_nbt::{ChunkNbtError, column_to_nbt, nbt_to_column};
use strata_anvil::registry::{LookupError, Properties, Registry};
use strata_engine::world::block::{BiomeId, StateId};
use strata_engine::world::chunk::{ChunkColumn, ColumnOptions};
use strata_engine::world::palette::PaletteKind;
use strata_engine::world::position::{ChunkPos, LocalBlockPos};
use strata_nbt::{Compound, NbtFormat, NbtList, Root, Tag, parse_uncompressed, write_uncompressed};

const DATA_VERSION: i32 = 3465;

fn registry() -> Registry {
    Registry::from_json(include_str!("fixtures/registry.json")).unwrap()
}

fn state(registry: &Registry, name: &str, pairs: &[(&str, &str)]) -> StateId {
    let properties: Properties = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    registry.block_to_state_id(name, &properties).unwrap()
}

/// Encode, serialise, parse and decode.
fn roundtrip(column: &ChunkColumn, pos: ChunkPos, registry: &Registry) -> (ChunkPos, ChunkColumn) {
    let root = column_to_nbt(column, pos, registry, DATA_VERSION).unwrap();
    let bytes = write_uncompressed(&root, NbtFormat::Big).unwrap();
    let parsed = parse_uncompressed(&bytes, NbtFormat::Big).unwrap();
    nbt_to_column(&parsed, registry, &ColumnOptions::default()).unwrap()
}

fn sections(root: &Root) -> &NbtList {
    root.compound["sections"].as_list().unwrap()
}

#[test]
fn empty_column_roundtrip() {
    let registry = registry();
    let column = ChunkColumn::new(ColumnOptions::default()).unwrap();
    let (pos, back) = roundtrip(&column, ChunkPos::new(-3, 12), &registry);

    assert_eq!(pos, ChunkPos::new(-3, 12));
    assert_eq!(back.min_y(), -64);
    assert_eq!(back.world_height(), 384);
    for y in [-64, -1, 0, 100, 319] {
        for (x, z) in [(0, 0), (15, 15), (7, 3)] {
            let at = LocalBlockPos::new(x, y, z);
            assert_eq!(back.get_block_state_id(at), StateId::AIR);
            assert_eq!(back.get_biome_id(at), BiomeId(0));
        }
    }
    assert_eq!(back, column);
}

#[test]
fn blocks_and_biomes_roundtrip() {
    let registry = registry();
    let stone = state(&registry, "stone", &[]);
    let stairs = state(&registry, "oak_stairs", &[("facing", "west"), ("half", "top")]);
    let water = state(&registry, "water", &[("level", "7")]);

    let mut column = ChunkColumn::new(ColumnOptions::default()).unwrap();
    column.set_block_state_id(LocalBlockPos::new(0, 0, 0), stone);
    column.set_block_state_id(LocalBlockPos::new(5, 10, 5), stairs);
    column.set_block_state_id(LocalBlockPos::new(3, -60, 3), water);
    column.set_biome_id(LocalBlockPos::new(0, 0, 0), BiomeId(7));
    column.set_biome_id(LocalBlockPos::new(12, 200, 4), BiomeId(3));

    let (_, back) = roundtrip(&column, ChunkPos::new(0, 0), &registry);
    assert_eq!(back.get_block_state_id(LocalBlockPos::new(0, 0, 0)), stone);
    assert_eq!(back.get_block_state_id(LocalBlockPos::new(5, 10, 5)), stairs);
    assert_eq!(back.get_block_state_id(LocalBlockPos::new(3, -60, 3)), water);
    assert_eq!(back.get_block_state_id(LocalBlockPos::new(1, 0, 0)), StateId::AIR);
    assert_eq!(back.get_biome_id(LocalBlockPos::new(2, 1, 3)), BiomeId(7));
    assert_eq!(back.get_biome_id(LocalBlockPos::new(13, 201, 7)), BiomeId(3));
    assert_eq!(back.get_biome_id(LocalBlockPos::new(4, 0, 0)), BiomeId(0));
    assert_eq!(back, column);
}

#[test]
fn disk_schema_layout() {
    let registry = registry();
    let mut column = ChunkColumn::new(ColumnOptions::default()).unwrap();
    let dirt = state(&registry, "dirt", &[]);
    let log = state(&registry, "oak_log", &[("axis", "z")]);
    column.set_block_state_id(LocalBlockPos::new(1, -64, 1), dirt);
    column.set_block_state_id(LocalBlockPos::new(2, -64, 1), log);

    let root = column_to_nbt(&column, ChunkPos::new(4, -2), &registry, DATA_VERSION).unwrap();
    let nbt = &root.compound;
    assert_eq!(root.name, "");
    assert_eq!(nbt["DataVersion"], Tag::Int(DATA_VERSION));
    assert_eq!(nbt["Status"].as_str(), Some("full"));
    assert_eq!(nbt["xPos"], Tag::Int(4));
    assert_eq!(nbt["yPos"], Tag::Int(-4));
    assert_eq!(nbt["zPos"], Tag::Int(-2));
    assert_eq!(nbt["LastUpdate"], Tag::Long(0));
    assert_eq!(nbt["isLightOn"], Tag::Byte(0));
    for empty in ["structures", "Heightmaps"] {
        assert!(nbt[empty].as_compound().unwrap().is_empty());
    }
    for empty in ["block_ticks", "PostProcessing", "fluid_ticks", "block_entities"] {
        assert!(nbt[empty].as_list().unwrap().is_empty());
    }

    // No light anywhere: exactly one section per block section.
    let sections = sections(&root);
    assert_eq!(sections.len(), 24);
    let bottom = sections.items()[0].as_compound().unwrap();
    assert_eq!(bottom["Y"], Tag::Byte(-4));

    let states = bottom["block_states"].as_compound().unwrap();
    let palette = states["palette"].as_list().unwrap();
    assert_eq!(palette.len(), 3);
    let names: Vec<&str> = palette
        .iter()
        .map(|entry| entry.as_compound().unwrap()["Name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["minecraft:air", "minecraft:dirt", "minecraft:oak_log"]);
    let log_entry = palette.items()[2].as_compound().unwrap();
    assert_eq!(
        log_entry["Properties"].as_compound().unwrap()["axis"].as_str(),
        Some("z")
    );
    assert!(!palette.items()[1].as_compound().unwrap().contains_key("Properties"));
    // Three entries still pack at four bits: 16 per long.
    assert_eq!(states["data"].as_long_array().unwrap().len(), 256);

    // A uniform section has no data.
    let top = sections.items()[23].as_compound().unwrap();
    assert!(!top["block_states"].as_compound().unwrap().contains_key("data"));
    let biomes = top["biomes"].as_compound().unwrap();
    assert_eq!(biomes["palette"], Tag::List(NbtList::strings(["minecraft:the_void"])));
    assert!(!biomes.contains_key("data"));
}

#[test]
fn block_entities_roundtrip() {
    let registry = registry();
    let mut column = ChunkColumn::new(ColumnOptions::default()).unwrap();

    let mut item = Compound::new();
    item.insert("Slot".into(), Tag::Byte(3));
    item.insert("id".into(), Tag::from("minecraft:dirt"));
    item.insert("Count".into(), Tag::Byte(64));
    let mut chest = Compound::new();
    chest.insert("id".into(), Tag::from("minecraft:chest"));
    chest.insert("Items".into(), Tag::List(NbtList::compounds([item])));
    chest.insert("CustomName".into(), Tag::from("{\"text\":\"Loot\"}"));

    let mut sign = Compound::new();
    sign.insert("id".into(), Tag::from("minecraft:sign"));
    sign.insert("GlowingText".into(), Tag::Byte(1));
    sign.insert("Color".into(), Tag::Short(-2));

    let chest_at = LocalBlockPos::new(4, 70, 9);
    let sign_at = LocalBlockPos::new(15, -64, 0);
    column.set_block_entity(chest_at, chest.clone());
    column.set_block_entity(sign_at, sign.clone());

    let pos = ChunkPos::new(-2, 5);
    let root = column_to_nbt(&column, pos, &registry, DATA_VERSION).unwrap();
    let stored = root.compound["block_entities"].as_list().unwrap();
    assert_eq!(stored.len(), 2);
    // World coordinates are written alongside the payload.
    let first = stored.items()[0].as_compound().unwrap();
    assert_eq!(first["x"], Tag::Int(-32 + 15));
    assert_eq!(first["y"], Tag::Int(-64));
    assert_eq!(first["z"], Tag::Int(80));

    let (_, back) = roundtrip(&column, pos, &registry);
    assert_eq!(back.block_entity_count(), 2);
    let chest_back = back.get_block_entity(chest_at).unwrap();
    for (key, value) in &chest {
        assert_eq!(&chest_back[key], value, "chest field {key}");
    }
    assert_eq!(chest_back["x"], Tag::Int(-32 + 4));
    let sign_back = back.get_block_entity(sign_at).unwrap();
    // Exact tag types survive: a byte stays a byte, a short a short.
    assert_eq!(sign_back["GlowingText"], Tag::Byte(1));
    assert_eq!(sign_back["Color"], Tag::Short(-2));
}

#[test]
fn direct_section_roundtrip() {
    let registry = registry();
    let wire = registry.block("redstone_wire").unwrap().min_state_id;
    let mut column = ChunkColumn::new(ColumnOptions::default()).unwrap();
    for i in 0..4096u32 {
        let at = LocalBlockPos::new((i % 16) as u8, 64 + (i / 256) as i32, ((i / 16) % 16) as u8);
        column.set_block_state_id(at, StateId(wire + (i * 7) % 300));
    }
    let index = column.section_index(64).unwrap();
    assert_eq!(column.section(index).unwrap().blocks().kind(), PaletteKind::Direct);

    let root = column_to_nbt(&column, ChunkPos::new(0, 0), &registry, DATA_VERSION).unwrap();
    let section = sections(&root).items()[index].as_compound().unwrap();
    let states = section["block_states"].as_compound().unwrap();
    assert_eq!(states["palette"].as_list().unwrap().len(), 300);
    // 300 entries need nine bits: seven per long.
    assert_eq!(states["data"].as_long_array().unwrap().len(), 4096usize.div_ceil(7));

    let (_, back) = roundtrip(&column, ChunkPos::new(0, 0), &registry);
    let section = back.section(index).unwrap();
    assert_eq!(section.blocks().kind(), PaletteKind::Direct);
    assert_eq!(section.solid_block_count(), 4096);
    for i in 0..4096u32 {
        let at = LocalBlockPos::new((i % 16) as u8, 64 + (i / 256) as i32, ((i / 16) % 16) as u8);
        assert_eq!(back.get_block_state_id(at), StateId(wire + (i * 7) % 300));
    }
}

#[test]
fn light_roundtrip_including_edge_sections() {
    let registry = registry();
    let mut column = ChunkColumn::new(ColumnOptions::default()).unwrap();
    column.set_sky_light(LocalBlockPos::new(1, -70, 1), 15);
    column.set_sky_light(LocalBlockPos::new(2, 330, 2), 9);
    column.set_block_light(LocalBlockPos::new(3, 10, 3), 12);

    let root = column_to_nbt(&column, ChunkPos::new(0, 0), &registry, DATA_VERSION).unwrap();
    let sections = sections(&root);
    assert_eq!(sections.len(), 26);
    let below = sections.items()[0].as_compound().unwrap();
    assert_eq!(below["Y"], Tag::Byte(-5));
    assert!(!below.contains_key("block_states"));
    assert_eq!(below["SkyLight"].as_byte_array().unwrap().len(), 2048);
    assert_eq!(sections.items()[25].as_compound().unwrap()["Y"], Tag::Byte(20));

    let (_, back) = roundtrip(&column, ChunkPos::new(0, 0), &registry);
    assert_eq!(back.world_height(), 384);
    assert_eq!(back.get_sky_light(LocalBlockPos::new(1, -70, 1)), 15);
    assert_eq!(back.get_sky_light(LocalBlockPos::new(2, 330, 2)), 9);
    assert_eq!(back.get_block_light(LocalBlockPos::new(3, 10, 3)), 12);
    assert_eq!(back.get_block_light(LocalBlockPos::new(4, 10, 3)), 0);
    assert_eq!(back, column);
}

#[test]
fn palette_without_data_fills_section() {
    let registry = registry();
    let mut entry = Compound::new();
    entry.insert("Name".into(), Tag::from("minecraft:granite"));
    let mut states = Compound::new();
    states.insert("palette".into(), Tag::List(NbtList::compounds([entry])));
    let mut section = Compound::new();
    section.insert("Y".into(), Tag::Byte(0));
    section.insert("block_states".into(), Tag::Compound(states));

    let mut nbt = Compound::new();
    nbt.insert("xPos".into(), Tag::Int(1));
    nbt.insert("zPos".into(), Tag::Int(2));
    nbt.insert("yPos".into(), Tag::Int(0));
    nbt.insert("sections".into(), Tag::List(NbtList::compounds([section])));

    let (pos, column) = nbt_to_column(&Root::unnamed(nbt), &registry, &ColumnOptions::default()).unwrap();
    assert_eq!(pos, ChunkPos::new(1, 2));
    assert_eq!(column.min_y(), 0);
    assert_eq!(column.world_height(), 16);
    let granite = state(&registry, "granite", &[]);
    assert_eq!(column.get_block_state_id(LocalBlockPos::new(0, 0, 0)), granite);
    assert_eq!(column.get_block_state_id(LocalBlockPos::new(15, 15, 15)), granite);
    assert_eq!(column.section(0).unwrap().blocks().kind(), PaletteKind::Single);
    assert_eq!(column.get_biome_id(LocalBlockPos::new(0, 0, 0)), BiomeId(0));
}

#[test]
fn unknown_block_is_a_lookup_error() {
    let registry = registry();
    let mut entry = Compound::new();
    entry.insert("Name".into(), Tag::from("minecraft:copper_bulb"));
    let mut states = Compound::new();
    states.insert("palette".into(), Tag::List(NbtList::compounds([entry])));
    let mut section = Compound::new();
    section.insert("Y".into(), Tag::Byte(0));
    section.insert("block_states".into(), Tag::Compound(states));
    let mut nbt = Compound::new();
    nbt.insert("xPos".into(), Tag::Int(0));
    nbt.insert("zPos".into(), Tag::Int(0));
    nbt.insert("sections".into(), Tag::List(NbtList::compounds([section])));

    let err = nbt_to_column(&Root::unnamed(nbt), &registry, &ColumnOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        ChunkNbtError::Lookup(LookupError::UnknownBlock(name)) if name == "copper_bulb"
    ));
}

#[test]
fn missing_position_is_a_field_error() {
    let registry = registry();
    let err = nbt_to_column(&Root::unnamed(Compound::new()), &registry, &ColumnOptions::default())
        .unwrap_err();
    assert!(matches!(err, ChunkNbtError::Field("xPos")));
}

fn with_section_y(y_pos: i32, section_y: Option<Tag>) -> Root {
    let mut nbt = Compound::new();
    nbt.insert("xPos".into(), Tag::Int(0));
    nbt.insert("zPos".into(), Tag::Int(0));
    nbt.insert("yPos".into(), Tag::Int(y_pos));
    let sections = section_y.map(|y| {
        let mut entry = Compound::new();
        entry.insert("Name".into(), Tag::from("minecraft:stone"));
        let mut states = Compound::new();
        states.insert("palette".into(), Tag::List(NbtList::compounds([entry])));
        let mut section = Compound::new();
        section.insert("Y".into(), y);
        section.insert("block_states".into(), Tag::Compound(states));
        section
    });
    nbt.insert("sections".into(), Tag::List(NbtList::compounds(sections)));
    Root::unnamed(nbt)
}

#[test]
fn extreme_y_pos_is_a_field_error() {
    let registry = registry();
    let options = ColumnOptions::default();

    let err = nbt_to_column(&with_section_y(i32::MAX, None), &registry, &options).unwrap_err();
    assert!(matches!(err, ChunkNbtError::Field("yPos")));

    let err = nbt_to_column(&with_section_y(i32::MIN, Some(Tag::Byte(0))), &registry, &options)
        .unwrap_err();
    assert!(matches!(err, ChunkNbtError::Field("yPos")));

    // Fits in 32 bits, but the column top does not.
    let err = nbt_to_column(&with_section_y(i32::MAX / 16, None), &registry, &options).unwrap_err();
    assert!(matches!(err, ChunkNbtError::Column(_)));
}

#[test]
fn extreme_section_y_is_a_field_error() {
    let registry = registry();
    let options = ColumnOptions::default();

    let err = nbt_to_column(&with_section_y(-4, Some(Tag::Int(i32::MAX))), &registry, &options)
        .unwrap_err();
    assert!(matches!(err, ChunkNbtError::Field("Y")));

    let err = nbt_to_column(&with_section_y(4, Some(Tag::Int(i32::MIN))), &registry, &options)
        .unwrap_err();
    assert!(matches!(err, ChunkNbtError::Field("Y")));
}

#[derive(Deserialize)]
struct OracleSection {
    #[serde(rename = "Y")]
    y: i8,
}

#[derive(Deserialize)]
struct OracleChunk {
    #[serde(rename = "DataVersion")]
    data_version: i32,
    #[serde(rename = "xPos")]
    x_pos: i32,
    #[serde(rename = "Status")]
    status: String,
    sections: Vec<OracleSection>,
}

#[test]
fn fastnbt_reads_encoded_chunks() {
    let registry = registry();
    let mut column = ChunkColumn::new(ColumnOptions::default()).unwrap();
    column.set_block_state_id(LocalBlockPos::new(0, 0, 0), StateId(1));
    let root = column_to_nbt(&column, ChunkPos::new(9, 0), &registry, DATA_VERSION).unwrap();
    let bytes = write_uncompressed(&root, NbtFormat::Big).unwrap();

    let chunk: OracleChunk = fastnbt::from_bytes(&bytes).unwrap();
    assert_eq!(chunk.data_version, DATA_VERSION);
    assert_eq!(chunk.x_pos, 9);
    assert_eq!(chunk.status, "full");
    assert_eq!(chunk.sections.len(), 24);
    assert_eq!(chunk.sections[0].y, -4);
}
