//! Decoding NBT binary data into a tag tree.
//!
//! The wire format is big-endian throughout. Scalars, arrays and strings
//! are length-checked before being materialized; any shortfall in the
//! underlying stream surfaces as [`TagDecodeError::Truncated`].

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::{GzDecoder, ZlibDecoder};
use std::fmt;
use std::io;
use std::io::Read;

use crate::tag::{CompoundTag, Tag};
use crate::tag::{
    TAG_BYTE_ARRAY_ID, TAG_BYTE_ID, TAG_COMPOUND_ID, TAG_DOUBLE_ID, TAG_END_ID, TAG_FLOAT_ID,
    TAG_INT_ARRAY_ID, TAG_INT_ID, TAG_LIST_ID, TAG_LONG_ARRAY_ID, TAG_LONG_ID, TAG_SHORT_ID,
    TAG_STRING_ID,
};

/// Possible errors while decoding binary data to NBT tags.
#[derive(Debug)]
pub enum TagDecodeError {
    /// Input ended before the tag tree was complete.
    Truncated,
    /// Tag id does not map to any tag kind.
    UnknownTagId {
        /// The id which was read.
        id: u8,
    },
    /// End tag found where a value tag was required.
    UnexpectedEndTag,
    /// Array or non-empty list declared a negative length.
    NegativeLength {
        /// The declared length.
        length: i32,
    },
    /// String payload is not valid UTF-8.
    NonUnicodeString {
        /// The raw payload bytes.
        bytes: Vec<u8>,
    },
    /// The root of the data was not a compound tag.
    RootMustBeCompoundTag {
        /// The id the root actually carried.
        actual_id: u8,
    },
    /// I/O Error which happened while reading tag data.
    ReadError { io_error: io::Error },
}

impl From<io::Error> for TagDecodeError {
    fn from(io_error: io::Error) -> Self {
        if io_error.kind() == io::ErrorKind::UnexpectedEof {
            TagDecodeError::Truncated
        } else {
            TagDecodeError::ReadError { io_error }
        }
    }
}

impl fmt::Display for TagDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagDecodeError::Truncated => f.write_str("unexpected end of input"),
            TagDecodeError::UnknownTagId { id } => write!(f, "unknown tag id: {:#04X}", id),
            TagDecodeError::UnexpectedEndTag => f.write_str("unexpected end tag"),
            TagDecodeError::NegativeLength { length } => {
                write!(f, "negative array or list length: {}", length)
            }
            TagDecodeError::NonUnicodeString { .. } => {
                f.write_str("string payload is not valid UTF-8")
            }
            TagDecodeError::RootMustBeCompoundTag { actual_id } => {
                write!(f, "root tag must be a compound, got id {:#04X}", actual_id)
            }
            TagDecodeError::ReadError { io_error } => write!(f, "read error: {}", io_error),
        }
    }
}

impl std::error::Error for TagDecodeError {}

/// Reads a named tag of any kind, returning its name and value.
pub fn read_tag<R: Read>(reader: &mut R) -> Result<(String, Tag), TagDecodeError> {
    let id = reader.read_u8()?;

    if id == TAG_END_ID {
        return Err(TagDecodeError::UnexpectedEndTag);
    }

    let name = read_string(reader)?;
    let tag = read_tag_payload(reader, id)?;

    Ok((name, tag))
}

/// Reads a compound tag root, discarding the root name.
///
/// # Example
///
/// ```
/// use anvil_nbt::decode::read_compound_tag;
/// use std::io::Cursor;
///
/// let bytes = [
///     0x0A, 0x00, 0x00, // compound root with empty name
///     0x03, 0x00, 0x01, 0x78, 0x00, 0x00, 0x00, 0x0F, // Int "x" = 15
///     0x00, // end
/// ];
/// let compound_tag = read_compound_tag(&mut Cursor::new(&bytes[..])).unwrap();
///
/// assert_eq!(compound_tag.get_i32("x").unwrap(), 15);
/// ```
pub fn read_compound_tag<R: Read>(reader: &mut R) -> Result<CompoundTag, TagDecodeError> {
    let id = reader.read_u8()?;

    if id != TAG_COMPOUND_ID {
        return Err(TagDecodeError::RootMustBeCompoundTag { actual_id: id });
    }

    read_string(reader)?;
    read_compound_payload(reader)
}

/// Reads a gzip compressed compound tag root.
pub fn read_gzip_compound_tag<R: Read>(reader: &mut R) -> Result<CompoundTag, TagDecodeError> {
    read_compound_tag(&mut GzDecoder::new(reader))
}

/// Reads a zlib compressed compound tag root.
pub fn read_zlib_compound_tag<R: Read>(reader: &mut R) -> Result<CompoundTag, TagDecodeError> {
    read_compound_tag(&mut ZlibDecoder::new(reader))
}

fn read_tag_payload<R: Read>(reader: &mut R, id: u8) -> Result<Tag, TagDecodeError> {
    match id {
        TAG_BYTE_ID => Ok(Tag::Byte(reader.read_i8()?)),
        TAG_SHORT_ID => Ok(Tag::Short(reader.read_i16::<BigEndian>()?)),
        TAG_INT_ID => Ok(Tag::Int(reader.read_i32::<BigEndian>()?)),
        TAG_LONG_ID => Ok(Tag::Long(reader.read_i64::<BigEndian>()?)),
        TAG_FLOAT_ID => Ok(Tag::Float(reader.read_f32::<BigEndian>()?)),
        TAG_DOUBLE_ID => Ok(Tag::Double(reader.read_f64::<BigEndian>()?)),
        TAG_BYTE_ARRAY_ID => {
            let length = read_array_length(reader)?;
            let mut bytes = vec![0u8; length];
            reader.read_exact(&mut bytes)?;

            Ok(Tag::ByteArray(bytes.into_iter().map(|b| b as i8).collect()))
        }
        TAG_STRING_ID => Ok(Tag::String(read_string(reader)?)),
        TAG_LIST_ID => {
            let element_id = reader.read_u8()?;
            let length = reader.read_i32::<BigEndian>()?;

            // Some producers emit element kind End with length zero (or a
            // non-positive length) for empty lists.
            if length <= 0 {
                return Ok(Tag::List(Vec::new()));
            }

            if element_id == TAG_END_ID {
                return Err(TagDecodeError::UnexpectedEndTag);
            }

            let mut elements = Vec::with_capacity(length as usize);

            for _ in 0..length {
                elements.push(read_tag_payload(reader, element_id)?);
            }

            Ok(Tag::List(elements))
        }
        TAG_COMPOUND_ID => Ok(Tag::Compound(read_compound_payload(reader)?)),
        TAG_INT_ARRAY_ID => {
            let length = read_array_length(reader)?;
            let mut values = Vec::with_capacity(length);

            for _ in 0..length {
                values.push(reader.read_i32::<BigEndian>()?);
            }

            Ok(Tag::IntArray(values))
        }
        TAG_LONG_ARRAY_ID => {
            let length = read_array_length(reader)?;
            let mut values = Vec::with_capacity(length);

            for _ in 0..length {
                values.push(reader.read_i64::<BigEndian>()?);
            }

            Ok(Tag::LongArray(values))
        }
        _ => Err(TagDecodeError::UnknownTagId { id }),
    }
}

fn read_compound_payload<R: Read>(reader: &mut R) -> Result<CompoundTag, TagDecodeError> {
    let mut compound_tag = CompoundTag::new();

    loop {
        let id = reader.read_u8()?;

        if id == TAG_END_ID {
            return Ok(compound_tag);
        }

        let name = read_string(reader)?;
        let tag = read_tag_payload(reader, id)?;

        compound_tag.insert(&name, tag);
    }
}

fn read_array_length<R: Read>(reader: &mut R) -> Result<usize, TagDecodeError> {
    let length = reader.read_i32::<BigEndian>()?;

    if length < 0 {
        return Err(TagDecodeError::NegativeLength { length });
    }

    Ok(length as usize)
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, TagDecodeError> {
    let length = reader.read_u16::<BigEndian>()? as usize;
    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes)?;

    String::from_utf8(bytes)
        .map_err(|error| TagDecodeError::NonUnicodeString {
            bytes: error.into_bytes(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{write_compound_tag, write_gzip_compound_tag, write_zlib_compound_tag};
    use std::io::Cursor;

    #[test]
    fn test_read_scalar_tag_exact_bytes() {
        // Int "x" = -1.
        let bytes = [0x03, 0x00, 0x01, 0x78, 0xFF, 0xFF, 0xFF, 0xFF];
        let (name, tag) = read_tag(&mut Cursor::new(&bytes[..])).unwrap();

        assert_eq!(name, "x");
        assert_eq!(tag, Tag::Int(-1));
    }

    #[test]
    fn test_read_compound_with_nested_list_exact_bytes() {
        // Compound "r" containing List "l" : Byte = [1, 2, 3].
        let bytes = [
            0x0A, 0x00, 0x01, 0x72, // compound "r"
            0x09, 0x00, 0x01, 0x6C, // list "l"
            0x01, 0x00, 0x00, 0x00, 0x03, // element kind Byte, length 3
            0x01, 0x02, 0x03, // elements
            0x00, // end
        ];
        let compound_tag = read_compound_tag(&mut Cursor::new(&bytes[..])).unwrap();

        let list = compound_tag.get("l").unwrap();
        assert_eq!(
            list,
            &Tag::List(vec![Tag::Byte(1), Tag::Byte(2), Tag::Byte(3)])
        );
    }

    #[test]
    fn test_read_empty_list_with_end_element_kind() {
        let bytes = [
            0x0A, 0x00, 0x00, // compound ""
            0x09, 0x00, 0x01, 0x6C, // list "l"
            0x00, 0x00, 0x00, 0x00, 0x00, // element kind End, length 0
            0x00, // end
        ];
        let compound_tag = read_compound_tag(&mut Cursor::new(&bytes[..])).unwrap();

        assert_eq!(compound_tag.get("l").unwrap(), &Tag::List(Vec::new()));
    }

    #[test]
    fn test_read_non_empty_list_with_end_element_kind() {
        let bytes = [
            0x0A, 0x00, 0x00, // compound ""
            0x09, 0x00, 0x01, 0x6C, // list "l"
            0x00, 0x00, 0x00, 0x00, 0x02, // element kind End, length 2
            0x00, 0x00, 0x00,
        ];
        let decode_error = read_compound_tag(&mut Cursor::new(&bytes[..])).err().unwrap();

        match decode_error {
            TagDecodeError::UnexpectedEndTag => {}
            other => panic!("Expected `UnexpectedEndTag` but got `{:?}`", other),
        }
    }

    #[test]
    fn test_read_unknown_tag_id() {
        let bytes = [
            0x0A, 0x00, 0x00, // compound ""
            0x0D, 0x00, 0x01, 0x78, // child with id 0x0D
        ];
        let decode_error = read_compound_tag(&mut Cursor::new(&bytes[..])).err().unwrap();

        match decode_error {
            TagDecodeError::UnknownTagId { id } => assert_eq!(id, 0x0D),
            other => panic!("Expected `UnknownTagId` but got `{:?}`", other),
        }
    }

    #[test]
    fn test_read_negative_array_length() {
        let bytes = [
            0x0A, 0x00, 0x00, // compound ""
            0x0B, 0x00, 0x01, 0x61, // int array "a"
            0xFF, 0xFF, 0xFF, 0xFF, // length -1
        ];
        let decode_error = read_compound_tag(&mut Cursor::new(&bytes[..])).err().unwrap();

        match decode_error {
            TagDecodeError::NegativeLength { length } => assert_eq!(length, -1),
            other => panic!("Expected `NegativeLength` but got `{:?}`", other),
        }
    }

    #[test]
    fn test_read_truncated_input() {
        let bytes = [0x03, 0x00, 0x01, 0x78, 0xFF, 0xFF];
        let decode_error = read_tag(&mut Cursor::new(&bytes[..])).err().unwrap();

        match decode_error {
            TagDecodeError::Truncated => {}
            other => panic!("Expected `Truncated` but got `{:?}`", other),
        }
    }

    #[test]
    fn test_read_root_must_be_compound() {
        let bytes = [0x03, 0x00, 0x01, 0x78, 0x00, 0x00, 0x00, 0x01];
        let decode_error = read_compound_tag(&mut Cursor::new(&bytes[..])).err().unwrap();

        match decode_error {
            TagDecodeError::RootMustBeCompoundTag { actual_id } => assert_eq!(actual_id, 0x03),
            other => panic!("Expected `RootMustBeCompoundTag` but got `{:?}`", other),
        }
    }

    #[test]
    fn test_read_end_tag_at_root() {
        let bytes = [0x00];
        let decode_error = read_tag(&mut Cursor::new(&bytes[..])).err().unwrap();

        match decode_error {
            TagDecodeError::UnexpectedEndTag => {}
            other => panic!("Expected `UnexpectedEndTag` but got `{:?}`", other),
        }
    }

    fn example_compound_tag() -> CompoundTag {
        let mut nested = CompoundTag::new();
        nested.insert_i64("seed", -4_423_851_167_411_741_117);
        nested.insert_f32("spawn_angle", 12.5);
        nested.insert_f64("difficulty_scale", 0.325);

        let mut compound_tag = CompoundTag::new();
        compound_tag.insert_i8("byte", -120);
        compound_tag.insert_i16("short", 25_565);
        compound_tag.insert_i32("int", -1_048_576);
        compound_tag.insert_str("string", "minecraft:overworld");
        compound_tag.insert_i8_vec("byte_array", vec![-1, 0, 1]);
        compound_tag.insert_i32_vec("int_array", vec![i32::min_value(), 0, i32::max_value()]);
        compound_tag.insert_i64_vec("long_array", vec![i64::min_value(), i64::max_value()]);
        compound_tag.insert_str_vec(
            "string_list",
            vec!["minecraft:plains".to_owned(), "minecraft:desert".to_owned()],
        );
        compound_tag.insert_compound_tag("nested", nested);

        compound_tag
    }

    #[test]
    fn test_round_trip_all_tag_kinds() {
        let compound_tag = example_compound_tag();

        let mut buffer = Vec::new();
        write_compound_tag(&mut buffer, &compound_tag).unwrap();
        let read_compound_tag = read_compound_tag(&mut Cursor::new(&buffer)).unwrap();

        assert_eq!(read_compound_tag, compound_tag);
    }

    #[test]
    fn test_round_trip_gzip() {
        let compound_tag = example_compound_tag();

        let mut buffer = Vec::new();
        write_gzip_compound_tag(&mut buffer, &compound_tag).unwrap();
        let read_compound_tag = read_gzip_compound_tag(&mut Cursor::new(&buffer)).unwrap();

        assert_eq!(read_compound_tag, compound_tag);
    }

    #[test]
    fn test_round_trip_zlib() {
        let compound_tag = example_compound_tag();

        let mut buffer = Vec::new();
        write_zlib_compound_tag(&mut buffer, &compound_tag).unwrap();
        let read_compound_tag = read_zlib_compound_tag(&mut Cursor::new(&buffer)).unwrap();

        assert_eq!(read_compound_tag, compound_tag);
    }
}
