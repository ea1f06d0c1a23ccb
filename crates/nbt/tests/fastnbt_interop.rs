//! The big-endian variant must agree with an independent implementation.

use fastnbt::Value;
use serde::Serialize;
use strata_nbt::{Compound, NbtFormat, NbtList, Root, Tag, parse_uncompressed, write_uncompressed};

#[derive(Serialize)]
struct Section {
    #[serde(rename = "Y")]
    y: i8,
    name: String,
}

#[derive(Serialize)]
struct Chunk {
    #[serde(rename = "DataVersion")]
    data_version: i32,
    heights: Vec<i32>,
    sections: Vec<Section>,
    scale: f64,
}

#[test]
fn reads_fastnbt_output() {
    let chunk = Chunk {
        data_version: 3465,
        heights: vec![64, 65, -3],
        sections: vec![
            Section { y: -4, name: "bottom".into() },
            Section { y: 19, name: "top".into() },
        ],
        scale: 0.25,
    };
    let bytes = fastnbt::to_bytes(&chunk).unwrap();
    let root = parse_uncompressed(&bytes, NbtFormat::Big).unwrap();

    assert_eq!(root.compound["DataVersion"], Tag::Int(3465));
    assert_eq!(root.compound["scale"], Tag::Double(0.25));

    let heights: Vec<i32> = root.compound["heights"]
        .as_list()
        .unwrap()
        .iter()
        .filter_map(Tag::as_i32)
        .collect();
    assert_eq!(heights, [64, 65, -3]);

    let sections = root.compound["sections"].as_list().unwrap();
    assert_eq!(sections.len(), 2);
    let top = sections.items()[1].as_compound().unwrap();
    assert_eq!(top["Y"], Tag::Byte(19));
    assert_eq!(top["name"].as_str(), Some("top"));
}

#[test]
fn fastnbt_reads_our_output() {
    let mut entry = Compound::new();
    entry.insert("Name".into(), Tag::from("minecraft:stone"));

    let mut compound = Compound::new();
    compound.insert("xPos".into(), Tag::Int(-7));
    compound.insert("LastUpdate".into(), Tag::Long(1 << 40));
    compound.insert("palette".into(), Tag::List(NbtList::compounds([entry])));
    compound.insert("data".into(), Tag::LongArray(vec![1, -1]));
    compound.insert("light".into(), Tag::ByteArray(vec![0x0f, -1]));

    let bytes = write_uncompressed(&Root::unnamed(compound), NbtFormat::Big).unwrap();
    let value: Value = fastnbt::from_bytes(&bytes).unwrap();

    let Value::Compound(map) = value else {
        panic!("root is not a compound");
    };
    assert_eq!(map.get("xPos"), Some(&Value::Int(-7)));
    assert_eq!(map.get("LastUpdate"), Some(&Value::Long(1 << 40)));
    match map.get("palette") {
        Some(Value::List(items)) => match &items[0] {
            Value::Compound(entry) => {
                assert_eq!(
                    entry.get("Name"),
                    Some(&Value::String("minecraft:stone".into()))
                );
            }
            other => panic!("unexpected palette entry {other:?}"),
        },
        other => panic!("unexpected palette {other:?}"),
    }
    match map.get("data") {
        Some(Value::LongArray(longs)) => assert_eq!(&longs[..], &[1, -1]),
        other => panic!("unexpected data {other:?}"),
    }
    match map.get("light") {
        Some(Value::ByteArray(bytes)) => assert_eq!(&bytes[..], &[0x0f, -1]),
        other => panic!("unexpected light {other:?}"),
    }
}
