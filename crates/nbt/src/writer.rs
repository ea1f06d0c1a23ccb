use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::error::NbtError;
use crate::format::NbtFormat;
use crate::tag::{Compound, Root, Tag, TagType};

/// Encodes `root` without compression. Exact inverse of
/// [`crate::parse_uncompressed`].
pub fn write_uncompressed(root: &Root, format: NbtFormat) -> Result<Vec<u8>, NbtError> {
    let mut writer = Writer::new(format);
    writer.write_root(root)?;
    Ok(writer.into_inner())
}

pub struct Writer {
    buf: Vec<u8>,
    format: NbtFormat,
}

impl Writer {
    pub fn new(format: NbtFormat) -> Self {
        Self {
            buf: Vec::new(),
            format,
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_root(&mut self, root: &Root) -> Result<(), NbtError> {
        self.buf.write_u8(TagType::Compound as u8)?;
        self.write_string(&root.name)?;
        self.write_compound(&root.compound)
    }

    fn write_compound(&mut self, compound: &Compound) -> Result<(), NbtError> {
        for (name, tag) in compound {
            self.buf.write_u8(tag.tag_type() as u8)?;
            self.write_string(name)?;
            self.write_payload(tag)?;
        }
        self.buf.write_u8(TagType::End as u8)?;
        Ok(())
    }

    fn write_payload(&mut self, tag: &Tag) -> Result<(), NbtError> {
        match tag {
            Tag::Byte(v) => self.buf.write_i8(*v)?,
            Tag::Short(v) => self.write_i16(*v)?,
            Tag::Int(v) => self.write_i32(*v)?,
            Tag::Long(v) => self.write_i64(*v)?,
            Tag::Float(v) => self.write_f32(*v)?,
            Tag::Double(v) => self.write_f64(*v)?,
            Tag::ByteArray(v) => {
                self.write_len(v.len())?;
                self.buf.extend(v.iter().map(|b| *b as u8));
            }
            Tag::String(v) => self.write_string(v)?,
            Tag::List(list) => {
                self.buf.write_u8(list.element_type() as u8)?;
                self.write_len(list.len())?;
                for item in list {
                    self.write_payload(item)?;
                }
            }
            Tag::Compound(compound) => self.write_compound(compound)?,
            Tag::IntArray(v) => {
                self.write_len(v.len())?;
                for i in v {
                    self.write_i32(*i)?;
                }
            }
            Tag::LongArray(v) => {
                self.write_len(v.len())?;
                for l in v {
                    self.write_i64(*l)?;
                }
            }
        }
        Ok(())
    }

    fn write_len(&mut self, len: usize) -> Result<(), NbtError> {
        let len = i32::try_from(len).map_err(|_| NbtError::LengthOverflow(len))?;
        match self.format {
            NbtFormat::Big => self.buf.write_i32::<BigEndian>(len)?,
            NbtFormat::Little => self.buf.write_i32::<LittleEndian>(len)?,
            NbtFormat::LittleVarint => self.write_varint64(zigzag32(len) as u64),
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<(), NbtError> {
        let bytes = s.as_bytes();
        match self.format {
            NbtFormat::Big | NbtFormat::Little => {
                let len = u16::try_from(bytes.len()).map_err(|_| NbtError::StringTooLong(bytes.len()))?;
                if self.format == NbtFormat::Big {
                    self.buf.write_u16::<BigEndian>(len)?;
                } else {
                    self.buf.write_u16::<LittleEndian>(len)?;
                }
            }
            NbtFormat::LittleVarint => {
                let len = u32::try_from(bytes.len()).map_err(|_| NbtError::StringTooLong(bytes.len()))?;
                self.write_varint64(u64::from(len));
            }
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn write_i16(&mut self, v: i16) -> Result<(), NbtError> {
        match self.format {
            NbtFormat::Big => self.buf.write_i16::<BigEndian>(v)?,
            _ => self.buf.write_i16::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_i32(&mut self, v: i32) -> Result<(), NbtError> {
        match self.format {
            NbtFormat::Big => self.buf.write_i32::<BigEndian>(v)?,
            NbtFormat::Little => self.buf.write_i32::<LittleEndian>(v)?,
            NbtFormat::LittleVarint => self.write_varint64(zigzag32(v) as u64),
        }
        Ok(())
    }

    fn write_i64(&mut self, v: i64) -> Result<(), NbtError> {
        match self.format {
            NbtFormat::Big => self.buf.write_i64::<BigEndian>(v)?,
            NbtFormat::Little => self.buf.write_i64::<LittleEndian>(v)?,
            NbtFormat::LittleVarint => self.write_varint64(zigzag64(v)),
        }
        Ok(())
    }

    fn write_f32(&mut self, v: f32) -> Result<(), NbtError> {
        match self.format {
            NbtFormat::Big => self.buf.write_f32::<BigEndian>(v)?,
            _ => self.buf.write_f32::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_f64(&mut self, v: f64) -> Result<(), NbtError> {
        match self.format {
            NbtFormat::Big => self.buf.write_f64::<BigEndian>(v)?,
            _ => self.buf.write_f64::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn write_varint64(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }
}

fn zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

fn zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}
