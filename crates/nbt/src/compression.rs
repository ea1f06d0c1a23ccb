//! Compression helpers and format auto-detection.

use std::io::{Read, Write};

use flate2::Compression as Level;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

use crate::error::NbtError;
use crate::format::NbtFormat;
use crate::reader::Reader;
use crate::tag::Root;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Length of the Bedrock level-file header (version + payload length).
const BEDROCK_HEADER_LEN: usize = 8;

/// How the input to [`parse`] was wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zlib,
}

/// Result of [`parse`].
#[derive(Debug, Clone)]
pub struct Parsed {
    pub root: Root,
    pub format: NbtFormat,
    pub compression: Compression,
}

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, NbtError> {
    let mut encoder = GzEncoder::new(Vec::new(), Level::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, NbtError> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Zlib-wrapped deflate, the "deflate" scheme of region files.
pub fn zlib(data: &[u8]) -> Result<Vec<u8>, NbtError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>, NbtError> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Best-effort decoding of a document of unknown provenance.
///
/// Gzip is recognised by its magic bytes; otherwise a zlib inflate is
/// attempted and the raw bytes are used if it fails. A Bedrock level header
/// is always parsed as little-endian. Otherwise each format in
/// [`NbtFormat::ALL`] is tried in turn and the first one that decodes the
/// whole input is returned.
pub fn parse(data: &[u8]) -> Result<Parsed, NbtError> {
    let (payload, compression) = if data.starts_with(&GZIP_MAGIC) {
        (gunzip(data)?, Compression::Gzip)
    } else {
        match inflate(data) {
            Ok(inflated) => (inflated, Compression::Zlib),
            Err(_) => (data.to_vec(), Compression::None),
        }
    };

    if has_bedrock_header(&payload) {
        let root = parse_exact(&payload[BEDROCK_HEADER_LEN..], NbtFormat::Little)?;
        return Ok(Parsed {
            root,
            format: NbtFormat::Little,
            compression,
        });
    }

    let mut last_err = None;
    for format in NbtFormat::ALL {
        match parse_exact(&payload, format) {
            Ok(root) => {
                return Ok(Parsed {
                    root,
                    format,
                    compression,
                });
            }
            Err(err) => {
                tracing::trace!("NBT is not {:?}: {}", format, err);
                last_err = Some((format, err));
            }
        }
    }
    let (last, source) = last_err.unwrap_or((NbtFormat::LittleVarint, NbtError::UnexpectedEof));
    Err(NbtError::NoFormatMatched {
        last,
        source: Box::new(source),
    })
}

fn parse_exact(data: &[u8], format: NbtFormat) -> Result<Root, NbtError> {
    let mut reader = Reader::new(data, format);
    let root = reader.read_root()?;
    let trailing = data.len() - reader.position();
    if trailing > 0 {
        return Err(NbtError::TrailingData(trailing));
    }
    Ok(root)
}

/// `level.dat` on Bedrock starts with a little-endian storage version
/// (small, so its upper three bytes are zero) followed by the payload length.
fn has_bedrock_header(data: &[u8]) -> bool {
    if data.len() < BEDROCK_HEADER_LEN || data[1..4] != [0, 0, 0] {
        return false;
    }
    let declared = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    declared == data.len() - BEDROCK_HEADER_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Compound, Tag};
    use crate::writer::write_uncompressed;

    fn level() -> Root {
        let mut compound = Compound::new();
        compound.insert("LevelName".into(), Tag::from("Bedrock level"));
        compound.insert("StorageVersion".into(), Tag::Int(10));
        Root::unnamed(compound)
    }

    #[test]
    fn test_detects_gzip_and_zlib() {
        let raw = write_uncompressed(&level(), NbtFormat::Big).unwrap();

        let parsed = parse(&gzip(&raw).unwrap()).unwrap();
        assert_eq!(parsed.compression, Compression::Gzip);
        assert_eq!(parsed.format, NbtFormat::Big);
        assert_eq!(parsed.root, level());

        let parsed = parse(&zlib(&raw).unwrap()).unwrap();
        assert_eq!(parsed.compression, Compression::Zlib);
        assert_eq!(parsed.root, level());

        let parsed = parse(&raw).unwrap();
        assert_eq!(parsed.compression, Compression::None);
        assert_eq!(parsed.root, level());
    }

    #[test]
    fn test_detects_little_endian() {
        let raw = write_uncompressed(&level(), NbtFormat::Little).unwrap();
        let parsed = parse(&raw).unwrap();
        assert_eq!(parsed.format, NbtFormat::Little);
        assert_eq!(parsed.root, level());
    }

    #[test]
    fn test_bedrock_header() {
        let body = write_uncompressed(&level(), NbtFormat::Little).unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);

        let parsed = parse(&data).unwrap();
        assert_eq!(parsed.format, NbtFormat::Little);
        assert_eq!(parsed.root, level());
    }

    #[test]
    fn test_garbage_fails() {
        assert!(matches!(
            parse(&[0xde, 0xad, 0xbe, 0xef]),
            Err(NbtError::NoFormatMatched { .. })
        ));
    }
}
