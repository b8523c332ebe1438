//! Encoding a tag tree into NBT binary data.

use byteorder::{BigEndian, WriteBytesExt};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::fmt;
use std::io;
use std::io::Write;

use crate::tag::{CompoundTag, Tag};
use crate::tag::{TAG_COMPOUND_ID, TAG_END_ID};

/// Possible errors while encoding NBT tags to binary data.
#[derive(Debug)]
pub enum TagEncodeError {
    /// List contained elements of more than one tag kind.
    ///
    /// The wire format declares a single element kind per list, so such a
    /// list cannot be represented.
    HeterogeneousList {
        /// Kind declared by the first element.
        expected_id: u8,
        /// Kind of the offending element.
        actual_id: u8,
    },
    /// I/O Error which happened while writing tag data.
    WriteError { io_error: io::Error },
}

impl From<io::Error> for TagEncodeError {
    fn from(io_error: io::Error) -> Self {
        TagEncodeError::WriteError { io_error }
    }
}

impl fmt::Display for TagEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagEncodeError::HeterogeneousList {
                expected_id,
                actual_id,
            } => write!(
                f,
                "list elements must share one kind: expected id {:#04X}, got {:#04X}",
                expected_id, actual_id
            ),
            TagEncodeError::WriteError { io_error } => write!(f, "write error: {}", io_error),
        }
    }
}

impl std::error::Error for TagEncodeError {}

/// Writes a named tag of any kind.
pub fn write_tag<W: Write>(writer: &mut W, name: &str, tag: &Tag) -> Result<(), TagEncodeError> {
    writer.write_u8(tag.id())?;
    write_string(writer, name)?;
    write_tag_payload(writer, tag)
}

/// Writes a compound tag root with an empty root name.
pub fn write_compound_tag<W: Write>(
    writer: &mut W,
    compound_tag: &CompoundTag,
) -> Result<(), TagEncodeError> {
    writer.write_u8(TAG_COMPOUND_ID)?;
    write_string(writer, "")?;
    write_compound_payload(writer, compound_tag)
}

/// Writes a gzip compressed compound tag root.
pub fn write_gzip_compound_tag<W: Write>(
    writer: &mut W,
    compound_tag: &CompoundTag,
) -> Result<(), TagEncodeError> {
    let mut encoder = GzEncoder::new(writer, Compression::default());
    write_compound_tag(&mut encoder, compound_tag)?;
    encoder.finish()?;

    Ok(())
}

/// Writes a zlib compressed compound tag root.
pub fn write_zlib_compound_tag<W: Write>(
    writer: &mut W,
    compound_tag: &CompoundTag,
) -> Result<(), TagEncodeError> {
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    write_compound_tag(&mut encoder, compound_tag)?;
    encoder.finish()?;

    Ok(())
}

fn write_tag_payload<W: Write>(writer: &mut W, tag: &Tag) -> Result<(), TagEncodeError> {
    match tag {
        Tag::Byte(value) => writer.write_i8(*value)?,
        Tag::Short(value) => writer.write_i16::<BigEndian>(*value)?,
        Tag::Int(value) => writer.write_i32::<BigEndian>(*value)?,
        Tag::Long(value) => writer.write_i64::<BigEndian>(*value)?,
        Tag::Float(value) => writer.write_f32::<BigEndian>(*value)?,
        Tag::Double(value) => writer.write_f64::<BigEndian>(*value)?,
        Tag::ByteArray(values) => {
            writer.write_i32::<BigEndian>(values.len() as i32)?;

            for value in values {
                writer.write_i8(*value)?;
            }
        }
        Tag::String(value) => write_string(writer, value)?,
        Tag::List(elements) => {
            // An empty list has no elements to take a kind from and is
            // written with element kind End.
            let element_id = match elements.first() {
                Some(element) => element.id(),
                None => TAG_END_ID,
            };

            writer.write_u8(element_id)?;
            writer.write_i32::<BigEndian>(elements.len() as i32)?;

            for element in elements {
                if element.id() != element_id {
                    return Err(TagEncodeError::HeterogeneousList {
                        expected_id: element_id,
                        actual_id: element.id(),
                    });
                }

                write_tag_payload(writer, element)?;
            }
        }
        Tag::Compound(compound_tag) => write_compound_payload(writer, compound_tag)?,
        Tag::IntArray(values) => {
            writer.write_i32::<BigEndian>(values.len() as i32)?;

            for value in values {
                writer.write_i32::<BigEndian>(*value)?;
            }
        }
        Tag::LongArray(values) => {
            writer.write_i32::<BigEndian>(values.len() as i32)?;

            for value in values {
                writer.write_i64::<BigEndian>(*value)?;
            }
        }
    }

    Ok(())
}

fn write_compound_payload<W: Write>(
    writer: &mut W,
    compound_tag: &CompoundTag,
) -> Result<(), TagEncodeError> {
    for (name, tag) in compound_tag.iter() {
        write_tag(writer, name, tag)?;
    }

    writer.write_u8(TAG_END_ID)?;

    Ok(())
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<(), TagEncodeError> {
    writer.write_u16::<BigEndian>(value.len() as u16)?;
    writer.write_all(value.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_scalar_tag_exact_bytes() {
        let mut buffer = Vec::new();
        write_tag(&mut buffer, "x", &Tag::Int(-1)).unwrap();

        assert_eq!(buffer, vec![0x03, 0x00, 0x01, 0x78, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_write_compound_with_nested_list_exact_bytes() {
        let mut compound_tag = CompoundTag::new();
        compound_tag.insert(
            "l",
            Tag::List(vec![Tag::Byte(1), Tag::Byte(2), Tag::Byte(3)]),
        );

        let mut buffer = Vec::new();
        write_tag(&mut buffer, "r", &Tag::Compound(compound_tag)).unwrap();

        assert_eq!(
            buffer,
            vec![
                0x0A, 0x00, 0x01, 0x72, // compound "r"
                0x09, 0x00, 0x01, 0x6C, // list "l"
                0x01, 0x00, 0x00, 0x00, 0x03, // element kind Byte, length 3
                0x01, 0x02, 0x03, // elements
                0x00, // end
            ]
        );
    }

    #[test]
    fn test_write_empty_list_uses_end_element_kind() {
        let mut compound_tag = CompoundTag::new();
        compound_tag.insert("l", Tag::List(Vec::new()));

        let mut buffer = Vec::new();
        write_compound_tag(&mut buffer, &compound_tag).unwrap();

        assert_eq!(
            buffer,
            vec![
                0x0A, 0x00, 0x00, // compound ""
                0x09, 0x00, 0x01, 0x6C, // list "l"
                0x00, 0x00, 0x00, 0x00, 0x00, // element kind End, length 0
                0x00, // end
            ]
        );
    }

    #[test]
    fn test_write_heterogeneous_list() {
        let mut compound_tag = CompoundTag::new();
        compound_tag.insert("l", Tag::List(vec![Tag::Byte(1), Tag::Int(2)]));

        let mut buffer = Vec::new();
        let encode_error = write_compound_tag(&mut buffer, &compound_tag).err().unwrap();

        match encode_error {
            TagEncodeError::HeterogeneousList {
                expected_id,
                actual_id,
            } => {
                assert_eq!(expected_id, 0x01);
                assert_eq!(actual_id, 0x03);
            }
            other => panic!("Expected `HeterogeneousList` but got `{:?}`", other),
        }
    }

    #[test]
    fn test_write_string_no_terminator() {
        let mut buffer = Vec::new();
        write_tag(&mut buffer, "s", &Tag::String("ab".to_owned())).unwrap();

        assert_eq!(
            buffer,
            vec![0x08, 0x00, 0x01, 0x73, 0x00, 0x02, 0x61, 0x62]
        );
    }
}
