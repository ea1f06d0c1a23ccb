use std::io::{Cursor, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::NbtError;
use crate::format::NbtFormat;
use crate::tag::{Compound, NbtList, Root, Tag, TagType};

/// Compounds and lists nested deeper than this are rejected.
pub const MAX_DEPTH: usize = 512;

/// Decodes one root tag from `data` starting at byte `offset`.
///
/// Returns the root and the offset just past it.
pub fn read_root_at(data: &[u8], offset: usize, format: NbtFormat) -> Result<(Root, usize), NbtError> {
    let slice = data.get(offset..).ok_or(NbtError::UnexpectedEof)?;
    let mut reader = Reader::new(slice, format);
    let root = reader.read_root()?;
    Ok((root, offset + reader.position()))
}

/// Decodes an uncompressed document. Trailing bytes after the root are
/// ignored.
pub fn parse_uncompressed(data: &[u8], format: NbtFormat) -> Result<Root, NbtError> {
    read_root_at(data, 0, format).map(|(root, _)| root)
}

pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
    format: NbtFormat,
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], format: NbtFormat) -> Self {
        Self {
            cursor: Cursor::new(data),
            format,
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    pub fn read_root(&mut self) -> Result<Root, NbtError> {
        let type_id = self.cursor.read_u8()?;
        if type_id != TagType::Compound as u8 {
            return Err(NbtError::RootNotCompound(type_id));
        }
        let name = self.read_string()?;
        let compound = self.read_compound()?;
        Ok(Root { name, compound })
    }

    fn read_payload(&mut self, ty: TagType) -> Result<Tag, NbtError> {
        Ok(match ty {
            TagType::End => return Err(NbtError::UnknownTagType(0)),
            TagType::Byte => Tag::Byte(self.cursor.read_i8()?),
            TagType::Short => Tag::Short(self.read_i16()?),
            TagType::Int => Tag::Int(self.read_i32()?),
            TagType::Long => Tag::Long(self.read_i64()?),
            TagType::Float => Tag::Float(self.read_f32()?),
            TagType::Double => Tag::Double(self.read_f64()?),
            TagType::ByteArray => {
                let len = self.read_len(1)?;
                let mut bytes = vec![0u8; len];
                self.cursor.read_exact(&mut bytes)?;
                Tag::ByteArray(bytes.into_iter().map(|b| b as i8).collect())
            }
            TagType::String => Tag::String(self.read_string()?),
            TagType::List => {
                let element = TagType::try_from(self.cursor.read_u8()?)?;
                let len = self.read_len(0)?;
                if element == TagType::End && len > 0 {
                    return Err(NbtError::UnknownTagType(0));
                }
                self.enter()?;
                let mut items = Vec::with_capacity(len.min(self.remaining()));
                for _ in 0..len {
                    items.push(self.read_payload(element)?);
                }
                self.depth -= 1;
                Tag::List(NbtList::from_raw(element, items))
            }
            TagType::Compound => Tag::Compound(self.read_compound()?),
            TagType::IntArray => {
                let len = self.read_len(self.int_width())?;
                let mut ints = Vec::with_capacity(len);
                for _ in 0..len {
                    ints.push(self.read_i32()?);
                }
                Tag::IntArray(ints)
            }
            TagType::LongArray => {
                let len = self.read_len(self.long_width())?;
                let mut longs = Vec::with_capacity(len);
                for _ in 0..len {
                    longs.push(self.read_i64()?);
                }
                Tag::LongArray(longs)
            }
        })
    }

    fn read_compound(&mut self) -> Result<Compound, NbtError> {
        self.enter()?;
        let mut compound = Compound::new();
        loop {
            let ty = TagType::try_from(self.cursor.read_u8()?)?;
            if ty == TagType::End {
                break;
            }
            let name = self.read_string()?;
            let tag = self.read_payload(ty)?;
            compound.insert(name, tag);
        }
        self.depth -= 1;
        Ok(compound)
    }

    fn enter(&mut self) -> Result<(), NbtError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(NbtError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    /// Minimum encoded width of one int, used to bound array allocations.
    fn int_width(&self) -> usize {
        match self.format {
            NbtFormat::LittleVarint => 1,
            _ => 4,
        }
    }

    fn long_width(&self) -> usize {
        match self.format {
            NbtFormat::LittleVarint => 1,
            _ => 8,
        }
    }

    /// Reads an array/list length and checks that `len * min_width` bytes
    /// can still follow.
    fn read_len(&mut self, min_width: usize) -> Result<usize, NbtError> {
        let len = match self.format {
            NbtFormat::Big => self.cursor.read_i32::<BigEndian>()?,
            NbtFormat::Little => self.cursor.read_i32::<LittleEndian>()?,
            NbtFormat::LittleVarint => zigzag32(self.read_varint32()?),
        };
        if len < 0 {
            return Err(NbtError::NegativeLength(len as i64));
        }
        let len = len as usize;
        if len.saturating_mul(min_width) > self.remaining() {
            return Err(NbtError::LengthOverflow(len));
        }
        Ok(len)
    }

    fn read_string(&mut self) -> Result<String, NbtError> {
        let len = match self.format {
            NbtFormat::Big => self.cursor.read_u16::<BigEndian>()? as usize,
            NbtFormat::Little => self.cursor.read_u16::<LittleEndian>()? as usize,
            NbtFormat::LittleVarint => self.read_varint32()? as usize,
        };
        if len > self.remaining() {
            return Err(NbtError::LengthOverflow(len));
        }
        let mut bytes = vec![0u8; len];
        self.cursor.read_exact(&mut bytes)?;
        Ok(String::from_utf8(bytes)?)
    }

    fn read_i16(&mut self) -> Result<i16, NbtError> {
        Ok(match self.format {
            NbtFormat::Big => self.cursor.read_i16::<BigEndian>()?,
            _ => self.cursor.read_i16::<LittleEndian>()?,
        })
    }

    fn read_i32(&mut self) -> Result<i32, NbtError> {
        Ok(match self.format {
            NbtFormat::Big => self.cursor.read_i32::<BigEndian>()?,
            NbtFormat::Little => self.cursor.read_i32::<LittleEndian>()?,
            NbtFormat::LittleVarint => zigzag32(self.read_varint32()?),
        })
    }

    fn read_i64(&mut self) -> Result<i64, NbtError> {
        Ok(match self.format {
            NbtFormat::Big => self.cursor.read_i64::<BigEndian>()?,
            NbtFormat::Little => self.cursor.read_i64::<LittleEndian>()?,
            NbtFormat::LittleVarint => zigzag64(self.read_varint64()?),
        })
    }

    fn read_f32(&mut self) -> Result<f32, NbtError> {
        Ok(match self.format {
            NbtFormat::Big => self.cursor.read_f32::<BigEndian>()?,
            _ => self.cursor.read_f32::<LittleEndian>()?,
        })
    }

    fn read_f64(&mut self) -> Result<f64, NbtError> {
        Ok(match self.format {
            NbtFormat::Big => self.cursor.read_f64::<BigEndian>()?,
            _ => self.cursor.read_f64::<LittleEndian>()?,
        })
    }

    fn read_varint32(&mut self) -> Result<u32, NbtError> {
        let mut value = 0u32;
        for i in 0..5 {
            let byte = self.cursor.read_u8()?;
            value |= u32::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(NbtError::BadVarint)
    }

    fn read_varint64(&mut self) -> Result<u64, NbtError> {
        let mut value = 0u64;
        for i in 0..10 {
            let byte = self.cursor.read_u8()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(NbtError::BadVarint)
    }
}

fn zigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

fn zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(1), -1);
        assert_eq!(zigzag32(2), 1);
        assert_eq!(zigzag32(u32::MAX), i32::MIN);
        assert_eq!(zigzag64(u64::MAX - 1), i64::MAX);
    }

    #[test]
    fn test_root_must_be_compound() {
        let data = [8u8, 0, 0, 0, 0];
        assert!(matches!(
            parse_uncompressed(&data, NbtFormat::Big),
            Err(NbtError::RootNotCompound(8))
        ));
    }

    #[test]
    fn test_truncated_input() {
        // Compound named "" holding an int "a" whose payload is cut short.
        let data = [10u8, 0, 0, 3, 0, 1, b'a', 0, 0];
        assert!(matches!(
            parse_uncompressed(&data, NbtFormat::Big),
            Err(NbtError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_unknown_field_type() {
        let data = [10u8, 0, 0, 42, 0, 0];
        assert!(matches!(
            parse_uncompressed(&data, NbtFormat::Big),
            Err(NbtError::UnknownTagType(42))
        ));
    }

    #[test]
    fn test_huge_array_length_rejected() {
        // Byte array claiming i32::MAX elements.
        let data = [10u8, 0, 0, 7, 0, 0, 0x7f, 0xff, 0xff, 0xff, 0];
        assert!(matches!(
            parse_uncompressed(&data, NbtFormat::Big),
            Err(NbtError::LengthOverflow(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        // Lists of lists nested past the limit.
        let mut data = vec![10u8, 0, 0, 9, 0, 0];
        for _ in 0..MAX_DEPTH + 1 {
            data.extend_from_slice(&[9, 0, 0, 0, 1]);
        }
        assert!(matches!(
            parse_uncompressed(&data, NbtFormat::Big),
            Err(NbtError::TooDeep(_))
        ));
    }

    #[test]
    fn test_read_at_offset() {
        let data = [0xAAu8, 0xBB, 10, 0, 0, 1, 0, 1, b'b', 7, 0];
        let (root, end) = read_root_at(&data, 2, NbtFormat::Big).unwrap();
        assert_eq!(root.compound.get("b"), Some(&Tag::Byte(7)));
        assert_eq!(end, data.len());
    }
}
