//! Paletted container decoding and the per-region deduplicating caches.
//!
//! Chunk sections store block states and biomes as a palette of unique
//! entries plus a `data` long array of packed palette indices. Block
//! indices never cross a long boundary (unused high bits are discarded at
//! the end of each long), while biome indices straddle the boundary once
//! the palette needs more than one bit per index.

use std::collections::HashMap;
use std::fmt;

/// Amount of block state indices in one section (16 * 16 * 16).
pub const SECTION_BLOCK_COUNT: usize = 4096;
/// Amount of biome indices in one section (4 * 4 * 4).
pub const SECTION_BIOME_COUNT: usize = 64;

/// Name and ordered state properties of one block palette entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockProperties {
    pub name: String,
    pub properties: Vec<(String, String)>,
}

impl BlockProperties {
    pub fn new(name: &str) -> Self {
        BlockProperties {
            name: name.to_owned(),
            properties: Vec::new(),
        }
    }
}

/// Append-only ordered set of block states seen in a region.
///
/// The first inserted entry gets index 0; indices never change once
/// assigned and looking up a present entry returns the index it was first
/// assigned.
#[derive(Debug, Default)]
pub struct RegionBlockCache {
    entries: Vec<BlockProperties>,
    index: HashMap<BlockProperties, usize>,
}

impl RegionBlockCache {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the index of the entry, inserting it at the end if absent.
    pub fn insert_or_lookup(&mut self, block: &BlockProperties) -> usize {
        if let Some(&index) = self.index.get(block) {
            return index;
        }

        let index = self.entries.len();
        self.entries.push(block.clone());
        self.index.insert(block.clone(), index);

        index
    }

    pub fn get(&self, index: usize) -> Option<&BlockProperties> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Append-only ordered set of biome names seen in a region.
#[derive(Debug, Default)]
pub struct RegionBiomeCache {
    entries: Vec<String>,
    index: HashMap<String, usize>,
}

impl RegionBiomeCache {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert_or_lookup(&mut self, biome: &str) -> usize {
        if let Some(&index) = self.index.get(biome) {
            return index;
        }

        let index = self.entries.len();
        self.entries.push(biome.to_owned());
        self.index.insert(biome.to_owned(), index);

        index
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Possible errors while unpacking a paletted container.
#[derive(Debug)]
pub enum PaletteDecodeError {
    /// Container palette has no entries.
    EmptyPalette,
    /// Palette has more than one entry but the container carries no data.
    MissingData,
    /// Packed index points past the end of the palette.
    IndexOutOfRange {
        /// The extracted index.
        index: usize,
        /// Amount of palette entries.
        palette_length: usize,
    },
    /// Data ran out before the expected amount of indices was produced.
    DataTooShort {
        /// Amount of indices the container must hold.
        expected: usize,
        /// Amount of indices actually produced.
        produced: usize,
    },
}

impl fmt::Display for PaletteDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaletteDecodeError::EmptyPalette => f.write_str("palette has no entries"),
            PaletteDecodeError::MissingData => {
                f.write_str("palette has multiple entries but no packed data")
            }
            PaletteDecodeError::IndexOutOfRange {
                index,
                palette_length,
            } => write!(
                f,
                "packed index {} out of range for palette of length {}",
                index, palette_length
            ),
            PaletteDecodeError::DataTooShort { expected, produced } => write!(
                f,
                "packed data exhausted after {} of {} indices",
                produced, expected
            ),
        }
    }
}

impl std::error::Error for PaletteDecodeError {}

/// Decodes a section's block states into cache indices.
///
/// Always produces exactly [`SECTION_BLOCK_COUNT`] values. When the
/// palette holds a single entry, `data` is not required and the whole
/// section maps to that entry.
pub fn decode_block_states(
    palette: &[BlockProperties],
    data: Option<&[i64]>,
    cache: &mut RegionBlockCache,
) -> Result<Vec<u32>, PaletteDecodeError> {
    if palette.is_empty() {
        return Err(PaletteDecodeError::EmptyPalette);
    }

    if palette.len() == 1 {
        let index = cache.insert_or_lookup(&palette[0]) as u32;
        return Ok(vec![index; SECTION_BLOCK_COUNT]);
    }

    let data = data.ok_or(PaletteDecodeError::MissingData)?;
    let bits = block_bit_width(palette.len());
    let indices = unpack_non_straddling(data, bits, SECTION_BLOCK_COUNT, palette.len())?;

    Ok(indices
        .into_iter()
        .map(|index| cache.insert_or_lookup(&palette[index]) as u32)
        .collect())
}

/// Decodes a section's biomes into cache indices.
///
/// Always produces exactly [`SECTION_BIOME_COUNT`] values.
pub fn decode_biomes(
    palette: &[String],
    data: Option<&[i64]>,
    cache: &mut RegionBiomeCache,
) -> Result<Vec<u32>, PaletteDecodeError> {
    if palette.is_empty() {
        return Err(PaletteDecodeError::EmptyPalette);
    }

    if palette.len() == 1 {
        let index = cache.insert_or_lookup(&palette[0]) as u32;
        return Ok(vec![index; SECTION_BIOME_COUNT]);
    }

    let data = data.ok_or(PaletteDecodeError::MissingData)?;
    let bits = biome_bit_width(palette.len());

    // Biome indices fit a single bit for palettes of two entries, and a
    // one bit index can never straddle a long boundary.
    let indices = if palette.len() < 3 {
        unpack_non_straddling(data, bits, SECTION_BIOME_COUNT, palette.len())?
    } else {
        unpack_straddling(data, bits, SECTION_BIOME_COUNT, palette.len())?
    };

    Ok(indices
        .into_iter()
        .map(|index| cache.insert_or_lookup(&palette[index]) as u32)
        .collect())
}

/// Bits per block state index: at least 4.
pub fn block_bit_width(palette_length: usize) -> u32 {
    ceil_log2(palette_length).max(4)
}

/// Bits per biome index: no floor.
pub fn biome_bit_width(palette_length: usize) -> u32 {
    ceil_log2(palette_length)
}

fn ceil_log2(value: usize) -> u32 {
    64 - ((value as u64) - 1).leading_zeros()
}

fn push_index(
    index: usize,
    palette_length: usize,
    indices: &mut Vec<usize>,
) -> Result<(), PaletteDecodeError> {
    if index >= palette_length {
        return Err(PaletteDecodeError::IndexOutOfRange {
            index,
            palette_length,
        });
    }

    indices.push(index);
    Ok(())
}

/// Extracts indices least significant first, never crossing a long
/// boundary: once fewer than `bits` bits remain in a long the remainder is
/// discarded and extraction restarts at the next long.
fn unpack_non_straddling(
    data: &[i64],
    bits: u32,
    count: usize,
    palette_length: usize,
) -> Result<Vec<usize>, PaletteDecodeError> {
    let mask = (1u64 << bits) - 1;
    let mut indices = Vec::with_capacity(count);

    for &word in data {
        let mut word = word as u64;
        let mut bits_left = 64;

        while bits_left >= bits {
            push_index((word & mask) as usize, palette_length, &mut indices)?;

            if indices.len() == count {
                return Ok(indices);
            }

            word >>= bits;
            bits_left -= bits;
        }
    }

    Err(PaletteDecodeError::DataTooShort {
        expected: count,
        produced: indices.len(),
    })
}

/// Extracts indices least significant first, letting an index span two
/// adjacent longs: the low bits left over in the exhausted long are
/// completed with bits from the low end of the next long.
fn unpack_straddling(
    data: &[i64],
    bits: u32,
    count: usize,
    palette_length: usize,
) -> Result<Vec<usize>, PaletteDecodeError> {
    let mask = (1u64 << bits) - 1;
    let mut indices = Vec::with_capacity(count);
    let mut words = data.iter();

    let mut word = match words.next() {
        Some(&word) => word as u64,
        None => {
            return Err(PaletteDecodeError::DataTooShort {
                expected: count,
                produced: 0,
            })
        }
    };
    let mut bits_left = 64;

    while indices.len() < count {
        if bits_left >= bits {
            push_index((word & mask) as usize, palette_length, &mut indices)?;
            word >>= bits;
            bits_left -= bits;
        } else {
            // `word` has been shifted down, so exactly the low `bits_left`
            // bits are still unconsumed.
            let low = word;
            let low_length = bits_left;

            word = match words.next() {
                Some(&word) => word as u64,
                None => {
                    return Err(PaletteDecodeError::DataTooShort {
                        expected: count,
                        produced: indices.len(),
                    })
                }
            };

            let high_length = bits - low_length;
            let high = word & ((1u64 << high_length) - 1);

            push_index(
                ((high << low_length) | low) as usize,
                palette_length,
                &mut indices,
            )?;

            word >>= high_length;
            bits_left = 64 - high_length;
        }
    }

    Ok(indices)
}
