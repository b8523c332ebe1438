//! NBT tag tree data model and typed accessors.

use std::fmt;

pub(crate) const TAG_END_ID: u8 = 0x00;
pub(crate) const TAG_BYTE_ID: u8 = 0x01;
pub(crate) const TAG_SHORT_ID: u8 = 0x02;
pub(crate) const TAG_INT_ID: u8 = 0x03;
pub(crate) const TAG_LONG_ID: u8 = 0x04;
pub(crate) const TAG_FLOAT_ID: u8 = 0x05;
pub(crate) const TAG_DOUBLE_ID: u8 = 0x06;
pub(crate) const TAG_BYTE_ARRAY_ID: u8 = 0x07;
pub(crate) const TAG_STRING_ID: u8 = 0x08;
pub(crate) const TAG_LIST_ID: u8 = 0x09;
pub(crate) const TAG_COMPOUND_ID: u8 = 0x0A;
pub(crate) const TAG_INT_ARRAY_ID: u8 = 0x0B;
pub(crate) const TAG_LONG_ARRAY_ID: u8 = 0x0C;

/// Single NBT value.
///
/// A tag owns its payload; compounds own their children and lists own their
/// elements. List elements are unnamed, all other tags get their name from
/// the compound that contains them.
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
    List(Vec<Tag>),
    Compound(CompoundTag),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    /// Wire id of this tag kind.
    pub fn id(&self) -> u8 {
        match self {
            Tag::Byte(..) => TAG_BYTE_ID,
            Tag::Short(..) => TAG_SHORT_ID,
            Tag::Int(..) => TAG_INT_ID,
            Tag::Long(..) => TAG_LONG_ID,
            Tag::Float(..) => TAG_FLOAT_ID,
            Tag::Double(..) => TAG_DOUBLE_ID,
            Tag::ByteArray(..) => TAG_BYTE_ARRAY_ID,
            Tag::String(..) => TAG_STRING_ID,
            Tag::List(..) => TAG_LIST_ID,
            Tag::Compound(..) => TAG_COMPOUND_ID,
            Tag::IntArray(..) => TAG_INT_ARRAY_ID,
            Tag::LongArray(..) => TAG_LONG_ARRAY_ID,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Tag::Byte(..) => "Byte",
            Tag::Short(..) => "Short",
            Tag::Int(..) => "Int",
            Tag::Long(..) => "Long",
            Tag::Float(..) => "Float",
            Tag::Double(..) => "Double",
            Tag::ByteArray(..) => "ByteArray",
            Tag::String(..) => "String",
            Tag::List(..) => "List",
            Tag::Compound(..) => "Compound",
            Tag::IntArray(..) => "IntArray",
            Tag::LongArray(..) => "LongArray",
        }
    }
}

/// Possible errors while accessing compound tag children.
#[derive(Debug)]
pub enum CompoundTagError<'a> {
    /// Compound has no child with the specified name.
    TagNotFound {
        /// Name of the tag which was not found.
        name: &'a str,
    },
    /// Child tag kind differs from the requested one.
    TagWrongType {
        /// Name of the tag with the unexpected kind.
        name: &'a str,
        /// The tag that was actually found.
        actual_tag: &'a Tag,
    },
}

impl fmt::Display for CompoundTagError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompoundTagError::TagNotFound { name } => write!(f, "tag \"{}\" not found", name),
            CompoundTagError::TagWrongType { name, actual_tag } => write!(
                f,
                "tag \"{}\" has unexpected type {}",
                name,
                actual_tag.type_name()
            ),
        }
    }
}

impl std::error::Error for CompoundTagError<'_> {}

/// Ordered collection of named tags.
///
/// Insertion order is preserved and names are unique: inserting a tag with
/// an already present name replaces the previous child in place.
///
/// # Example
///
/// ```
/// use anvil_nbt::CompoundTag;
///
/// let mut compound_tag = CompoundTag::new();
/// compound_tag.insert_i32("x", 15);
/// compound_tag.insert_str("name", "mountains");
///
/// assert_eq!(compound_tag.get_i32("x").unwrap(), 15);
/// assert_eq!(compound_tag.get_str("name").unwrap(), "mountains");
/// assert!(compound_tag.get_i32("name").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompoundTag {
    entries: Vec<(String, Tag)>,
}

impl CompoundTag {
    pub fn new() -> Self {
        CompoundTag {
            entries: Vec::new(),
        }
    }

    /// Inserts a child tag, replacing any previous child with the same name.
    pub fn insert(&mut self, name: &str, tag: Tag) {
        for entry in self.entries.iter_mut() {
            if entry.0 == name {
                entry.1 = tag;
                return;
            }
        }

        self.entries.push((name.to_owned(), tag));
    }

    pub fn insert_i8(&mut self, name: &str, value: i8) {
        self.insert(name, Tag::Byte(value));
    }

    /// Booleans are stored as a byte tag with value zero or one.
    pub fn insert_bool(&mut self, name: &str, value: bool) {
        self.insert_i8(name, if value { 1 } else { 0 });
    }

    pub fn insert_i16(&mut self, name: &str, value: i16) {
        self.insert(name, Tag::Short(value));
    }

    pub fn insert_i32(&mut self, name: &str, value: i32) {
        self.insert(name, Tag::Int(value));
    }

    pub fn insert_i64(&mut self, name: &str, value: i64) {
        self.insert(name, Tag::Long(value));
    }

    pub fn insert_f32(&mut self, name: &str, value: f32) {
        self.insert(name, Tag::Float(value));
    }

    pub fn insert_f64(&mut self, name: &str, value: f64) {
        self.insert(name, Tag::Double(value));
    }

    pub fn insert_str(&mut self, name: &str, value: &str) {
        self.insert(name, Tag::String(value.to_owned()));
    }

    pub fn insert_i8_vec(&mut self, name: &str, vec: Vec<i8>) {
        self.insert(name, Tag::ByteArray(vec));
    }

    pub fn insert_i32_vec(&mut self, name: &str, vec: Vec<i32>) {
        self.insert(name, Tag::IntArray(vec));
    }

    pub fn insert_i64_vec(&mut self, name: &str, vec: Vec<i64>) {
        self.insert(name, Tag::LongArray(vec));
    }

    pub fn insert_str_vec(&mut self, name: &str, vec: Vec<String>) {
        self.insert(name, Tag::List(vec.into_iter().map(Tag::String).collect()));
    }

    pub fn insert_compound_tag(&mut self, name: &str, compound_tag: CompoundTag) {
        self.insert(name, Tag::Compound(compound_tag));
    }

    pub fn insert_compound_tag_vec(&mut self, name: &str, vec: Vec<CompoundTag>) {
        self.insert(name, Tag::List(vec.into_iter().map(Tag::Compound).collect()));
    }

    /// Looks up a child tag by name.
    pub fn get<'a>(&'a self, name: &'a str) -> Result<&'a Tag, CompoundTagError<'a>> {
        for (entry_name, tag) in self.entries.iter() {
            if entry_name == name {
                return Ok(tag);
            }
        }

        Err(CompoundTagError::TagNotFound { name })
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.iter().any(|(entry_name, _)| entry_name == name)
    }

    fn get_typed<'a, T>(
        &'a self,
        name: &'a str,
        extract: fn(&'a Tag) -> Option<T>,
    ) -> Result<T, CompoundTagError<'a>> {
        let tag = self.get(name)?;

        match extract(tag) {
            Some(value) => Ok(value),
            None => Err(CompoundTagError::TagWrongType {
                name,
                actual_tag: tag,
            }),
        }
    }

    pub fn get_i8<'a>(&'a self, name: &'a str) -> Result<i8, CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::Byte(value) => Some(*value),
            _ => None,
        })
    }

    pub fn get_bool<'a>(&'a self, name: &'a str) -> Result<bool, CompoundTagError<'a>> {
        Ok(self.get_i8(name)? != 0)
    }

    pub fn get_i16<'a>(&'a self, name: &'a str) -> Result<i16, CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::Short(value) => Some(*value),
            _ => None,
        })
    }

    pub fn get_i32<'a>(&'a self, name: &'a str) -> Result<i32, CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::Int(value) => Some(*value),
            _ => None,
        })
    }

    pub fn get_i64<'a>(&'a self, name: &'a str) -> Result<i64, CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::Long(value) => Some(*value),
            _ => None,
        })
    }

    pub fn get_f32<'a>(&'a self, name: &'a str) -> Result<f32, CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::Float(value) => Some(*value),
            _ => None,
        })
    }

    pub fn get_f64<'a>(&'a self, name: &'a str) -> Result<f64, CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::Double(value) => Some(*value),
            _ => None,
        })
    }

    pub fn get_str<'a>(&'a self, name: &'a str) -> Result<&'a str, CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::String(value) => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn get_i8_vec<'a>(&'a self, name: &'a str) -> Result<&'a [i8], CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::ByteArray(value) => Some(value.as_slice()),
            _ => None,
        })
    }

    pub fn get_i32_vec<'a>(&'a self, name: &'a str) -> Result<&'a [i32], CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::IntArray(value) => Some(value.as_slice()),
            _ => None,
        })
    }

    pub fn get_i64_vec<'a>(&'a self, name: &'a str) -> Result<&'a [i64], CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::LongArray(value) => Some(value.as_slice()),
            _ => None,
        })
    }

    pub fn get_compound_tag<'a>(
        &'a self,
        name: &'a str,
    ) -> Result<&'a CompoundTag, CompoundTagError<'a>> {
        self.get_typed(name, |tag| match tag {
            Tag::Compound(value) => Some(value),
            _ => None,
        })
    }

    /// Returns all elements of a list of strings.
    ///
    /// An empty list is accepted regardless of its recorded element kind.
    pub fn get_str_vec<'a>(&'a self, name: &'a str) -> Result<Vec<&'a str>, CompoundTagError<'a>> {
        let tag = self.get(name)?;

        let elements = match tag {
            Tag::List(elements) => elements,
            _ => {
                return Err(CompoundTagError::TagWrongType {
                    name,
                    actual_tag: tag,
                })
            }
        };

        let mut values = Vec::with_capacity(elements.len());

        for element in elements {
            match element {
                Tag::String(value) => values.push(value.as_str()),
                _ => {
                    return Err(CompoundTagError::TagWrongType {
                        name,
                        actual_tag: tag,
                    })
                }
            }
        }

        Ok(values)
    }

    /// Returns all elements of a list of compounds.
    pub fn get_compound_tag_vec<'a>(
        &'a self,
        name: &'a str,
    ) -> Result<Vec<&'a CompoundTag>, CompoundTagError<'a>> {
        let tag = self.get(name)?;

        let elements = match tag {
            Tag::List(elements) => elements,
            _ => {
                return Err(CompoundTagError::TagWrongType {
                    name,
                    actual_tag: tag,
                })
            }
        };

        let mut values = Vec::with_capacity(elements.len());

        for element in elements {
            match element {
                Tag::Compound(value) => values.push(value),
                _ => {
                    return Err(CompoundTagError::TagWrongType {
                        name,
                        actual_tag: tag,
                    })
                }
            }
        }

        Ok(values)
    }

    /// Iterates children in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.entries.iter().map(|(name, tag)| (name.as_str(), tag))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
