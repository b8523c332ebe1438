//! Reifying chunk compound tags into dense per-section index arrays.

use log::debug;
use std::collections::BTreeMap;
use std::fmt;

use crate::palette::{
    decode_biomes, decode_block_states, BlockProperties, PaletteDecodeError, RegionBiomeCache,
    RegionBlockCache,
};
use crate::region::REGION_CHUNKS;
use crate::tag::{CompoundTag, CompoundTagError, Tag};

/// Possible errors while decoding chunk tags into section arrays.
#[derive(Debug)]
pub enum ChunkDecodeError {
    /// Error while unpacking a paletted container.
    PaletteError { palette_error: PaletteDecodeError },
    /// A required tag was missing from the chunk.
    TagNotFound { name: String },
    /// A chunk tag had an unexpected kind.
    TagWrongType { name: String },
}

impl From<PaletteDecodeError> for ChunkDecodeError {
    fn from(palette_error: PaletteDecodeError) -> Self {
        ChunkDecodeError::PaletteError { palette_error }
    }
}

impl<'a> From<CompoundTagError<'a>> for ChunkDecodeError {
    fn from(error: CompoundTagError<'a>) -> Self {
        match error {
            CompoundTagError::TagNotFound { name } => ChunkDecodeError::TagNotFound {
                name: name.to_owned(),
            },
            CompoundTagError::TagWrongType { name, .. } => ChunkDecodeError::TagWrongType {
                name: name.to_owned(),
            },
        }
    }
}

impl fmt::Display for ChunkDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkDecodeError::PaletteError { palette_error } => {
                write!(f, "palette error: {}", palette_error)
            }
            ChunkDecodeError::TagNotFound { name } => write!(f, "tag \"{}\" not found", name),
            ChunkDecodeError::TagWrongType { name } => {
                write!(f, "tag \"{}\" has unexpected type", name)
            }
        }
    }
}

impl std::error::Error for ChunkDecodeError {}

/// Block and biome cache indices of one 16x16x16 section.
///
/// A missing `block_states` or `biomes` container leaves the matching
/// array empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedSection {
    /// 4096 indices into the region block cache.
    pub blocks: Vec<u32>,
    /// 64 indices into the region biome cache.
    pub biomes: Vec<u32>,
}

/// Decoded sections of one chunk, keyed by the section `Y` coordinate.
///
/// Chunks whose generation status is not full decode to no sections.
#[derive(Debug, Clone, Default)]
pub struct DecodedChunk {
    pub sections: BTreeMap<i8, DecodedSection>,
}

/// All decoded chunks of a region together with the region lifetime caches
/// their section arrays index into.
#[derive(Debug)]
pub struct DecodedRegion {
    chunks: Vec<Option<DecodedChunk>>,
    block_cache: RegionBlockCache,
    biome_cache: RegionBiomeCache,
}

impl DecodedRegion {
    /// Decodes the 1024 chunk slots of a region.
    ///
    /// Absent chunks stay absent; chunks still being generated decode to a
    /// chunk with no sections. Cache index assignment follows chunk index
    /// order and section list order.
    ///
    /// # Panics
    ///
    /// Panics if `chunks` does not contain exactly 1024 slots.
    pub fn decode(chunks: &[Option<CompoundTag>]) -> Result<DecodedRegion, ChunkDecodeError> {
        assert_eq!(
            chunks.len(),
            REGION_CHUNKS,
            "Region must contain exactly {} chunk slots",
            REGION_CHUNKS
        );

        let mut block_cache = RegionBlockCache::new();
        let mut biome_cache = RegionBiomeCache::new();
        let mut decoded_chunks = Vec::with_capacity(REGION_CHUNKS);

        for chunk in chunks {
            match chunk {
                Some(compound_tag) => decoded_chunks.push(Some(decode_chunk(
                    compound_tag,
                    &mut block_cache,
                    &mut biome_cache,
                )?)),
                None => decoded_chunks.push(None),
            }
        }

        Ok(DecodedRegion {
            chunks: decoded_chunks,
            block_cache,
            biome_cache,
        })
    }

    pub fn chunk(&self, index: usize) -> Option<&DecodedChunk> {
        self.chunks.get(index).and_then(|chunk| chunk.as_ref())
    }

    pub fn chunks(&self) -> &[Option<DecodedChunk>] {
        &self.chunks
    }

    pub fn block_cache(&self) -> &RegionBlockCache {
        &self.block_cache
    }

    pub fn biome_cache(&self) -> &RegionBiomeCache {
        &self.biome_cache
    }
}

fn decode_chunk(
    chunk_compound_tag: &CompoundTag,
    block_cache: &mut RegionBlockCache,
    biome_cache: &mut RegionBiomeCache,
) -> Result<DecodedChunk, ChunkDecodeError> {
    if !has_full_status(chunk_compound_tag) {
        debug!("Skipping sections of a chunk whose generation is not finished");
        return Ok(DecodedChunk::default());
    }

    let sections = chunk_compound_tag.get_compound_tag_vec("sections")?;
    let mut decoded_chunk = DecodedChunk::default();

    for section in sections {
        let y = section.get_i8("Y")?;
        let mut decoded_section = DecodedSection::default();

        if section.contains_key("block_states") {
            let block_states = section.get_compound_tag("block_states")?;
            let palette = read_block_palette(block_states)?;
            let data = read_packed_data(block_states)?;

            decoded_section.blocks = decode_block_states(&palette, data, block_cache)?;
        }

        if section.contains_key("biomes") {
            let biomes = section.get_compound_tag("biomes")?;
            let palette: Vec<String> = biomes
                .get_str_vec("palette")?
                .into_iter()
                .map(|name| name.to_owned())
                .collect();
            let data = read_packed_data(biomes)?;

            decoded_section.biomes = decode_biomes(&palette, data, biome_cache)?;
        }

        decoded_chunk.sections.insert(y, decoded_section);
    }

    Ok(decoded_chunk)
}

fn has_full_status(chunk_compound_tag: &CompoundTag) -> bool {
    match chunk_compound_tag.get_str("Status") {
        Ok(status) => status == "minecraft:full" || status == "full",
        Err(_) => false,
    }
}

fn read_block_palette(
    block_states: &CompoundTag,
) -> Result<Vec<BlockProperties>, ChunkDecodeError> {
    let entries = block_states.get_compound_tag_vec("palette")?;
    let mut palette = Vec::with_capacity(entries.len());

    for entry in entries {
        palette.push(read_block_properties(entry)?);
    }

    Ok(palette)
}

fn read_block_properties(entry: &CompoundTag) -> Result<BlockProperties, ChunkDecodeError> {
    let name = entry.get_str("Name")?.to_owned();
    let mut properties = Vec::new();

    if entry.contains_key("Properties") {
        let properties_tag = entry.get_compound_tag("Properties")?;

        for (key, value) in properties_tag.iter() {
            match value {
                Tag::String(value) => properties.push((key.to_owned(), value.clone())),
                _ => {
                    return Err(ChunkDecodeError::TagWrongType {
                        name: key.to_owned(),
                    })
                }
            }
        }
    }

    Ok(BlockProperties { name, properties })
}

fn read_packed_data(container: &CompoundTag) -> Result<Option<&[i64]>, ChunkDecodeError> {
    if container.contains_key("data") {
        Ok(Some(container.get_i64_vec("data")?))
    } else {
        Ok(None)
    }
}
