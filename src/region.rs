//! Anvil region file reading and writing.
//!
//! A region file packs up to 1024 chunks. The first 8KB are a header of
//! 1024 chunk locations and 1024 modification timestamps; the remainder is
//! partitioned into 4096 byte sectors holding length-prefixed compressed
//! chunk payloads.
//!
//! Saving never mutates a file in place: [`write_region`] always emits a
//! complete region, reserving the header first and finalising the
//! locations table only after every chunk was written.

use bitvec::prelude::*;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::warn;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::decode::{
    read_compound_tag, read_gzip_compound_tag, read_zlib_compound_tag, TagDecodeError,
};
use crate::encode::{
    write_compound_tag, write_gzip_compound_tag, write_zlib_compound_tag, TagEncodeError,
};
use crate::tag::CompoundTag;

/// Amount of chunks in region.
pub const REGION_CHUNKS: usize = 1024;
/// Length of chunks metadata in region.
const REGION_CHUNKS_METADATA_LENGTH: usize = 2 * REGION_CHUNKS;
/// Region header length in bytes.
const REGION_HEADER_BYTES_LENGTH: u64 = 8 * REGION_CHUNKS as u64;
/// Region sector length in bytes.
const REGION_SECTOR_BYTES_LENGTH: u16 = 4096;
/// Maximum chunk length in bytes.
const CHUNK_MAXIMUM_BYTES_LENGTH: u32 = REGION_SECTOR_BYTES_LENGTH as u32 * 256;
/// Gzip compression scheme value.
const GZIP_COMPRESSION_SCHEME: u8 = 1;
/// Zlib compression scheme value.
const ZLIB_COMPRESSION_SCHEME: u8 = 2;
/// Uncompressed scheme value.
const UNCOMPRESSED_SCHEME: u8 = 3;
/// LZ4 compression scheme value. Recognized but refused.
const LZ4_COMPRESSION_SCHEME: u8 = 4;
/// Custom compression scheme value. Recognized but refused.
const CUSTOM_COMPRESSION_SCHEME: u8 = 127;

/// How chunk payloads inside a region file are compressed.
///
/// The refused schemes (LZ4 and custom) are deliberately not representable
/// here; encountering them while reading surfaces
/// [`ChunkLoadError::UnsupportedCompressionScheme`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompressionScheme {
    Gzip,
    Zlib,
    Uncompressed,
}

impl CompressionScheme {
    pub fn id(self) -> u8 {
        match self {
            CompressionScheme::Gzip => GZIP_COMPRESSION_SCHEME,
            CompressionScheme::Zlib => ZLIB_COMPRESSION_SCHEME,
            CompressionScheme::Uncompressed => UNCOMPRESSED_SCHEME,
        }
    }

    fn from_id(id: u8) -> Result<Self, ChunkLoadError> {
        match id {
            GZIP_COMPRESSION_SCHEME => Ok(CompressionScheme::Gzip),
            ZLIB_COMPRESSION_SCHEME => Ok(CompressionScheme::Zlib),
            UNCOMPRESSED_SCHEME => Ok(CompressionScheme::Uncompressed),
            LZ4_COMPRESSION_SCHEME | CUSTOM_COMPRESSION_SCHEME => {
                Err(ChunkLoadError::UnsupportedCompressionScheme {
                    compression_scheme: id,
                })
            }
            _ => Err(ChunkLoadError::UnknownCompressionScheme {
                compression_scheme: id,
            }),
        }
    }
}

/// Possible errors while loading the chunk.
#[derive(Debug)]
pub enum ChunkLoadError {
    /// Region at specified coordinates not found.
    RegionNotFound { region_x: i32, region_z: i32 },
    /// Chunk at specified coordinates inside region not found.
    ChunkNotFound { chunk_x: u8, chunk_z: u8 },
    /// Chunk length overlaps declared maximum.
    ///
    /// This should not occur under normal conditions.
    ///
    /// Region file are corrupted.
    LengthExceedsMaximum {
        /// Chunk length.
        length: u32,
        /// Chunk maximum expected length.
        maximum_length: u32,
    },
    /// Chunk data is compressed with a scheme the format defines but this
    /// library refuses to read (LZ4 or custom).
    UnsupportedCompressionScheme {
        /// Compression scheme type id.
        compression_scheme: u8,
    },
    /// Chunk data declares a compression scheme the format does not define.
    ///
    /// Region file are corrupted.
    UnknownCompressionScheme {
        /// Compression scheme type id.
        compression_scheme: u8,
    },
    /// I/O Error which happened while were reading chunk data from region file.
    ReadError { io_error: io::Error },
    /// Error while decoding binary data to NBT tag.
    ///
    /// This should not occur under normal conditions.
    ///
    /// Region file are corrupted or a developer error in the NBT library.
    TagDecodeError { tag_decode_error: TagDecodeError },
}

impl From<io::Error> for ChunkLoadError {
    fn from(io_error: io::Error) -> Self {
        ChunkLoadError::ReadError { io_error }
    }
}

impl From<TagDecodeError> for ChunkLoadError {
    fn from(tag_decode_error: TagDecodeError) -> Self {
        ChunkLoadError::TagDecodeError { tag_decode_error }
    }
}

impl fmt::Display for ChunkLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkLoadError::RegionNotFound { region_x, region_z } => {
                write!(f, "region ({}, {}) not found", region_x, region_z)
            }
            ChunkLoadError::ChunkNotFound { chunk_x, chunk_z } => {
                write!(f, "chunk ({}, {}) not found", chunk_x, chunk_z)
            }
            ChunkLoadError::LengthExceedsMaximum {
                length,
                maximum_length,
            } => write!(
                f,
                "chunk length {} exceeds maximum {}",
                length, maximum_length
            ),
            ChunkLoadError::UnsupportedCompressionScheme { compression_scheme } => {
                write!(f, "refused compression scheme: {}", compression_scheme)
            }
            ChunkLoadError::UnknownCompressionScheme { compression_scheme } => {
                write!(f, "unknown compression scheme: {}", compression_scheme)
            }
            ChunkLoadError::ReadError { io_error } => write!(f, "read error: {}", io_error),
            ChunkLoadError::TagDecodeError { tag_decode_error } => {
                write!(f, "tag decode error: {}", tag_decode_error)
            }
        }
    }
}

impl std::error::Error for ChunkLoadError {}

/// Possible errors while saving the chunk.
#[derive(Debug)]
pub enum ChunkSaveError {
    /// Chunk payload does not fit the 255 sectors a location entry can
    /// describe.
    ///
    /// This should not occur under normal conditions.
    LengthExceedsMaximum {
        /// Chunk length.
        length: u32,
    },
    /// I/O Error which happened while were writing chunk data to region file.
    WriteError { io_error: io::Error },
    /// Error while encoding NBT tag to binary data.
    TagEncodeError { tag_encode_error: TagEncodeError },
    /// Saving rewrites the whole region file, so the chunks already stored
    /// in it must be readable first.
    ExistingRegionUnreadable {
        chunk_load_error: Box<ChunkLoadError>,
    },
}

impl From<io::Error> for ChunkSaveError {
    fn from(io_error: io::Error) -> Self {
        ChunkSaveError::WriteError { io_error }
    }
}

impl From<TagEncodeError> for ChunkSaveError {
    fn from(tag_encode_error: TagEncodeError) -> Self {
        ChunkSaveError::TagEncodeError { tag_encode_error }
    }
}

impl fmt::Display for ChunkSaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkSaveError::LengthExceedsMaximum { length } => {
                write!(f, "chunk length {} exceeds maximum", length)
            }
            ChunkSaveError::WriteError { io_error } => write!(f, "write error: {}", io_error),
            ChunkSaveError::TagEncodeError { tag_encode_error } => {
                write!(f, "tag encode error: {}", tag_encode_error)
            }
            ChunkSaveError::ExistingRegionUnreadable { chunk_load_error } => {
                write!(f, "existing region unreadable: {}", chunk_load_error)
            }
        }
    }
}

impl std::error::Error for ChunkSaveError {}

/// Chunk metadata are stored in header.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct AnvilChunkMetadata {
    /// Sector index from which starts chunk data.
    sector_index: u32,
    /// Amount of sectors used to store chunk.
    sectors: u8,
    /// Last time in seconds when chunk was modified.
    last_modified_timestamp: u32,
}

impl AnvilChunkMetadata {
    fn new(sector_index: u32, sectors: u8, last_modified_timestamp: u32) -> Self {
        AnvilChunkMetadata {
            sector_index,
            sectors,
            last_modified_timestamp,
        }
    }

    pub fn sector_index(&self) -> u32 {
        self.sector_index
    }

    pub fn sectors(&self) -> u8 {
        self.sectors
    }

    pub fn last_modified_timestamp(&self) -> u32 {
        self.last_modified_timestamp
    }

    pub fn is_empty(&self) -> bool {
        self.sectors == 0
    }
}

/// Index of a chunk's metadata inside the region header.
pub fn metadata_index(chunk_x: u8, chunk_z: u8) -> usize {
    assert!(32 > chunk_x, "Region chunk x coordinate out of bounds");
    assert!(32 > chunk_z, "Region chunk z coordinate out of bounds");

    chunk_x as usize + chunk_z as usize * 32
}

/// Calculates used sectors.
///
/// Entries pointing past the end of the file are skipped with a warning:
/// the chunks they describe cannot be read anyway.
fn used_sectors(total_sectors: u32, chunks_metadata: &[AnvilChunkMetadata]) -> BitVec {
    let mut used_sectors = bitvec![0; total_sectors as usize];
    let header_sectors = (total_sectors as usize).min(2);

    for index in 0..header_sectors {
        used_sectors.set(index, true);
    }

    for metadata in chunks_metadata {
        if metadata.is_empty() {
            continue;
        }

        let start_index = metadata.sector_index as usize;
        let end_index = start_index + metadata.sectors as usize;

        if end_index > total_sectors as usize {
            warn!(
                "Chunk sector range {}..{} lies past the region file end",
                start_index, end_index
            );
            continue;
        }

        for index in start_index..end_index {
            used_sectors.set(index, true);
        }
    }

    used_sectors
}

fn stream_len<S: Seek>(file: &mut S) -> Result<u64, io::Error> {
    let old_pos = file.seek(SeekFrom::Current(0))?;
    let len = file.seek(SeekFrom::End(0))?;

    // Avoid seeking a third time when we were already at the end of the
    // stream. The branch is usually way cheaper than a seek operation.
    if old_pos != len {
        file.seek(SeekFrom::Start(old_pos))?;
    }

    Ok(len)
}

/// Region represents a 32x32 group of chunks.
pub struct AnvilRegion<F> {
    /// File in which region are stored.
    file: F,
    /// Array of chunks metadata.
    chunks_metadata: [AnvilChunkMetadata; REGION_CHUNKS],
}

impl AnvilRegion<File> {
    /// Opens a region file for reading.
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self, io::Error> {
        let file = File::open(path)?;

        Self::new(file)
    }
}

impl<F: Seek + Read> AnvilRegion<F> {
    /// Reads the region header from the stream.
    ///
    /// A stream shorter than the header is an empty region with no chunks.
    pub fn new(mut file: F) -> Result<Self, io::Error> {
        let file_length = stream_len(&mut file)?;

        if file_length < REGION_HEADER_BYTES_LENGTH {
            return Ok(AnvilRegion {
                file,
                chunks_metadata: [Default::default(); REGION_CHUNKS],
            });
        }

        file.seek(SeekFrom::Start(0))?;
        let chunks_metadata = Self::read_header(&mut file)?;

        let total_sectors = (file_length / REGION_SECTOR_BYTES_LENGTH as u64) as u32;
        Self::validate_sectors(total_sectors, &chunks_metadata);

        Ok(AnvilRegion {
            file,
            chunks_metadata,
        })
    }

    /// First 8KB of file are header of 1024 offsets and 1024 timestamps.
    fn read_header(file: &mut F) -> Result<[AnvilChunkMetadata; REGION_CHUNKS], io::Error> {
        let mut chunks_metadata = [Default::default(); REGION_CHUNKS];
        let mut values = [0u32; REGION_CHUNKS_METADATA_LENGTH];

        for index in 0..REGION_CHUNKS_METADATA_LENGTH {
            values[index] = file.read_u32::<BigEndian>()?;
        }

        for index in 0..REGION_CHUNKS {
            let last_modified_timestamp = values[REGION_CHUNKS + index];
            let offset = values[index];

            let sector_index = offset >> 8;
            let sectors = (offset & 0xFF) as u8;

            let metadata = AnvilChunkMetadata::new(sector_index, sectors, last_modified_timestamp);
            chunks_metadata[index] = metadata;
        }

        Ok(chunks_metadata)
    }

    /// Chunk sector ranges must not overlap each other or the header.
    ///
    /// Overlap is tolerated because the overlapping chunks may still
    /// decode, but it is worth a warning.
    fn validate_sectors(total_sectors: u32, chunks_metadata: &[AnvilChunkMetadata]) {
        let used_sectors = used_sectors(total_sectors, chunks_metadata);

        let mut claimed_sectors = (total_sectors as usize).min(2);

        for metadata in chunks_metadata {
            if metadata.is_empty() {
                continue;
            }

            let end_index = metadata.sector_index as usize + metadata.sectors as usize;

            if end_index <= total_sectors as usize {
                claimed_sectors += metadata.sectors as usize;
            }
        }

        if used_sectors.count_ones() < claimed_sectors {
            warn!("Region header declares overlapping chunk sector ranges");
        }
    }

    /// Returns chunk metadata at specified coordinates.
    pub fn get_metadata(&self, chunk_x: u8, chunk_z: u8) -> AnvilChunkMetadata {
        self.chunks_metadata[metadata_index(chunk_x, chunk_z)]
    }

    /// Reads the chunk at the specified coordinates inside the region.
    pub fn read_chunk(&mut self, chunk_x: u8, chunk_z: u8) -> Result<CompoundTag, ChunkLoadError> {
        let metadata = self.get_metadata(chunk_x, chunk_z);

        if metadata.is_empty() {
            return Err(ChunkLoadError::ChunkNotFound { chunk_x, chunk_z });
        }

        self.read_chunk_at(metadata)
    }

    /// Reads all 1024 chunk slots.
    ///
    /// Absent chunks are `None`.
    pub fn read_all_chunks(&mut self) -> Result<Vec<Option<CompoundTag>>, ChunkLoadError> {
        let mut chunks = Vec::with_capacity(REGION_CHUNKS);

        for index in 0..REGION_CHUNKS {
            let metadata = self.chunks_metadata[index];

            if metadata.is_empty() {
                chunks.push(None);
            } else {
                chunks.push(Some(self.read_chunk_at(metadata)?));
            }
        }

        Ok(chunks)
    }

    fn read_chunk_at(&mut self, metadata: AnvilChunkMetadata) -> Result<CompoundTag, ChunkLoadError> {
        let seek_offset = metadata.sector_index as u64 * REGION_SECTOR_BYTES_LENGTH as u64;
        let maximum_length = (metadata.sectors as u32 * REGION_SECTOR_BYTES_LENGTH as u32)
            .min(CHUNK_MAXIMUM_BYTES_LENGTH);

        self.file.seek(SeekFrom::Start(seek_offset))?;
        let length = self.file.read_u32::<BigEndian>()?;

        if length == 0 || length > maximum_length {
            return Err(ChunkLoadError::LengthExceedsMaximum {
                length,
                maximum_length,
            });
        }

        let compression_scheme = CompressionScheme::from_id(self.file.read_u8()?)?;

        let mut compressed_buffer = vec![0u8; (length - 1) as usize];
        self.file.read_exact(&mut compressed_buffer)?;

        let mut cursor = Cursor::new(&compressed_buffer);

        match compression_scheme {
            CompressionScheme::Gzip => Ok(read_gzip_compound_tag(&mut cursor)?),
            CompressionScheme::Zlib => Ok(read_zlib_compound_tag(&mut cursor)?),
            CompressionScheme::Uncompressed => Ok(read_compound_tag(&mut cursor)?),
        }
    }
}

/// Writes a complete region file with the current wall clock as every
/// chunk's modification timestamp.
///
/// The sink is expected to be positioned over an empty file: saving always
/// rewrites the full region.
pub fn write_region<F: Seek + Write>(
    file: &mut F,
    chunks: &[Option<CompoundTag>],
    compression_scheme: CompressionScheme,
) -> Result<(), ChunkSaveError> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as u32)
        .unwrap_or(0);

    write_region_with_timestamp(file, chunks, compression_scheme, timestamp)
}

/// Writes a complete region file.
///
/// Chunks are laid out in index order starting at sector 2. The locations
/// and timestamps tables are written last, so the header is only finalised
/// once every chunk payload was emitted successfully.
///
/// # Panics
///
/// Panics if `chunks` does not contain exactly 1024 slots.
pub fn write_region_with_timestamp<F: Seek + Write>(
    file: &mut F,
    chunks: &[Option<CompoundTag>],
    compression_scheme: CompressionScheme,
    timestamp: u32,
) -> Result<(), ChunkSaveError> {
    assert_eq!(
        chunks.len(),
        REGION_CHUNKS,
        "Region must contain exactly {} chunk slots",
        REGION_CHUNKS
    );

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&[0u8; REGION_HEADER_BYTES_LENGTH as usize])?;

    let mut locations = [0u32; REGION_CHUNKS];
    let mut position = REGION_HEADER_BYTES_LENGTH;

    for (index, chunk) in chunks.iter().enumerate() {
        let chunk_compound_tag = match chunk {
            Some(chunk_compound_tag) => chunk_compound_tag,
            None => continue,
        };

        let sector_index = (position / REGION_SECTOR_BYTES_LENGTH as u64) as u32;

        let mut buffer = vec![compression_scheme.id()];

        match compression_scheme {
            CompressionScheme::Gzip => write_gzip_compound_tag(&mut buffer, chunk_compound_tag)?,
            CompressionScheme::Zlib => write_zlib_compound_tag(&mut buffer, chunk_compound_tag)?,
            CompressionScheme::Uncompressed => {
                write_compound_tag(&mut buffer, chunk_compound_tag)?
            }
        }

        // The length field counts the scheme byte and the compressed data.
        let length = buffer.len() as u32;

        let written = 4 + buffer.len() as u64;
        let sector_length = REGION_SECTOR_BYTES_LENGTH as u64;
        let padding = (sector_length - written % sector_length) % sector_length;
        let sectors = (written + padding) / sector_length;

        if sectors > u8::MAX as u64 {
            return Err(ChunkSaveError::LengthExceedsMaximum { length });
        }

        file.write_u32::<BigEndian>(length)?;
        file.write_all(&buffer)?;

        // Padding to align sector.
        for _ in 0..padding {
            file.write_u8(0)?;
        }

        locations[index] = (sector_index << 8) | sectors as u32;
        position += written + padding;
    }

    file.seek(SeekFrom::Start(0))?;

    for location in locations.iter() {
        file.write_u32::<BigEndian>(*location)?;
    }

    for _ in 0..REGION_CHUNKS {
        file.write_u32::<BigEndian>(timestamp)?;
    }

    Ok(())
}
