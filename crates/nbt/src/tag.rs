//! The in-memory tag tree.
//!
//! A [`Tag`] is a closed union over the twelve payload kinds. Lists carry an
//! explicit element type so that a list read from disk is written back with
//! the same type byte; an empty list always reports [`TagType::End`].

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::NbtError;

/// Named fields of a compound, in insertion order.
pub type Compound = IndexMap<String, Tag>;

/// Wire type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagType {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

impl TryFrom<u8> for TagType {
    type Error = NbtError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Ok(match id {
            0 => TagType::End,
            1 => TagType::Byte,
            2 => TagType::Short,
            3 => TagType::Int,
            4 => TagType::Long,
            5 => TagType::Float,
            6 => TagType::Double,
            7 => TagType::ByteArray,
            8 => TagType::String,
            9 => TagType::List,
            10 => TagType::Compound,
            11 => TagType::IntArray,
            12 => TagType::LongArray,
            other => return Err(NbtError::UnknownTagType(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(NbtList),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    pub fn tag_type(&self) -> TagType {
        match self {
            Tag::Byte(_) => TagType::Byte,
            Tag::Short(_) => TagType::Short,
            Tag::Int(_) => TagType::Int,
            Tag::Long(_) => TagType::Long,
            Tag::Float(_) => TagType::Float,
            Tag::Double(_) => TagType::Double,
            Tag::ByteArray(_) => TagType::ByteArray,
            Tag::String(_) => TagType::String,
            Tag::List(_) => TagType::List,
            Tag::Compound(_) => TagType::Compound,
            Tag::IntArray(_) => TagType::IntArray,
            Tag::LongArray(_) => TagType::LongArray,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&NbtList> {
        match self {
            Tag::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<i8> {
        match self {
            Tag::Byte(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Tag::Short(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Tag::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Tag::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Tag::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Tag::Double(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_byte_array(&self) -> Option<&[i8]> {
        match self {
            Tag::ByteArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            Tag::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long_array(&self) -> Option<&[i64]> {
        match self {
            Tag::LongArray(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i8> for Tag {
    fn from(v: i8) -> Self {
        Tag::Byte(v)
    }
}

impl From<i16> for Tag {
    fn from(v: i16) -> Self {
        Tag::Short(v)
    }
}

impl From<i32> for Tag {
    fn from(v: i32) -> Self {
        Tag::Int(v)
    }
}

impl From<i64> for Tag {
    fn from(v: i64) -> Self {
        Tag::Long(v)
    }
}

impl From<f32> for Tag {
    fn from(v: f32) -> Self {
        Tag::Float(v)
    }
}

impl From<f64> for Tag {
    fn from(v: f64) -> Self {
        Tag::Double(v)
    }
}

impl From<&str> for Tag {
    fn from(v: &str) -> Self {
        Tag::String(v.to_owned())
    }
}

impl From<String> for Tag {
    fn from(v: String) -> Self {
        Tag::String(v)
    }
}

impl From<Compound> for Tag {
    fn from(v: Compound) -> Self {
        Tag::Compound(v)
    }
}

impl From<NbtList> for Tag {
    fn from(v: NbtList) -> Self {
        Tag::List(v)
    }
}

/// A homogeneous list. Every item has the type reported by
/// [`NbtList::element_type`].
#[derive(Debug, Clone, PartialEq)]
pub struct NbtList {
    element: TagType,
    items: Vec<Tag>,
}

impl NbtList {
    pub fn empty() -> Self {
        Self {
            element: TagType::End,
            items: Vec::new(),
        }
    }

    /// Builds a list, rejecting mixed element types.
    pub fn new(items: Vec<Tag>) -> Result<Self, NbtError> {
        let mut list = Self::empty();
        for item in items {
            list.push(item)?;
        }
        Ok(list)
    }

    /// A list of compounds. Infallible since every item shares one type.
    pub fn compounds(items: impl IntoIterator<Item = Compound>) -> Self {
        Self::from_raw(TagType::Compound, items.into_iter().map(Tag::Compound).collect())
    }

    /// A list of strings.
    pub fn strings<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        Self::from_raw(
            TagType::String,
            items.into_iter().map(|s| Tag::String(s.into())).collect(),
        )
    }

    pub(crate) fn from_raw(element: TagType, items: Vec<Tag>) -> Self {
        let element = if items.is_empty() { TagType::End } else { element };
        Self { element, items }
    }

    pub fn push(&mut self, item: Tag) -> Result<(), NbtError> {
        let ty = item.tag_type();
        if self.items.is_empty() {
            self.element = ty;
        } else if ty != self.element {
            return Err(NbtError::MixedList {
                expected: self.element,
                found: ty,
            });
        }
        self.items.push(item);
        Ok(())
    }

    pub fn element_type(&self) -> TagType {
        self.element
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.items.iter()
    }

    pub fn items(&self) -> &[Tag] {
        &self.items
    }
}

impl<'a> IntoIterator for &'a NbtList {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// The outermost tag of a document: always a compound, always named
/// (possibly with the empty string).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Root {
    pub name: String,
    pub compound: Compound,
}

impl Root {
    pub fn new(name: impl Into<String>, compound: Compound) -> Self {
        Self {
            name: name.into(),
            compound,
        }
    }

    pub fn unnamed(compound: Compound) -> Self {
        Self::new("", compound)
    }
}

/// Deep structural equality that ignores the root name and compound field
/// order. Floating point payloads compare by bit pattern, so `NaN` equals an
/// identical `NaN` and `0.0` differs from `-0.0`.
pub fn equal(a: &Tag, b: &Tag) -> bool {
    match (a, b) {
        (Tag::Byte(x), Tag::Byte(y)) => x == y,
        (Tag::Short(x), Tag::Short(y)) => x == y,
        (Tag::Int(x), Tag::Int(y)) => x == y,
        (Tag::Long(x), Tag::Long(y)) => x == y,
        (Tag::Float(x), Tag::Float(y)) => x.to_bits() == y.to_bits(),
        (Tag::Double(x), Tag::Double(y)) => x.to_bits() == y.to_bits(),
        (Tag::ByteArray(x), Tag::ByteArray(y)) => x == y,
        (Tag::String(x), Tag::String(y)) => x == y,
        (Tag::IntArray(x), Tag::IntArray(y)) => x == y,
        (Tag::LongArray(x), Tag::LongArray(y)) => x == y,
        (Tag::List(x), Tag::List(y)) => {
            x.element_type() == y.element_type()
                && x.len() == y.len()
                && x.iter().zip(y.iter()).all(|(a, b)| equal(a, b))
        }
        (Tag::Compound(x), Tag::Compound(y)) => equal_compound(x, y),
        _ => false,
    }
}

pub fn equal_compound(a: &Compound, b: &Compound) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| equal(value, other)))
}

pub fn equal_root(a: &Root, b: &Root) -> bool {
    equal_compound(&a.compound, &b.compound)
}

/// Strips type information, leaving plain nested values. Compounds become
/// JSON objects and lists/arrays become JSON arrays. Non-finite floats have
/// no JSON form and become `null`.
pub fn simplify(tag: &Tag) -> Value {
    match tag {
        Tag::Byte(v) => Value::from(*v),
        Tag::Short(v) => Value::from(*v),
        Tag::Int(v) => Value::from(*v),
        Tag::Long(v) => Value::from(*v),
        Tag::Float(v) => Value::from(f64::from(*v)),
        Tag::Double(v) => Value::from(*v),
        Tag::ByteArray(v) => Value::from(v.clone()),
        Tag::String(v) => Value::from(v.as_str()),
        Tag::IntArray(v) => Value::from(v.clone()),
        Tag::LongArray(v) => Value::from(v.clone()),
        Tag::List(list) => Value::Array(list.iter().map(simplify).collect()),
        Tag::Compound(map) => simplify_compound(map),
    }
}

pub fn simplify_compound(map: &Compound) -> Value {
    Value::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), simplify(value)))
            .collect(),
    )
}
