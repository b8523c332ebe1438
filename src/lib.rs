//! NBT tag codec and Anvil region file storage for chunks.
//!
//! More information about the formats can be found at
//! https://wiki.vg/NBT and https://wiki.vg/Region_Files.
//!
//! # Example
//!
//! ## Tags
//!
//! ```
//! use anvil_nbt::decode::read_zlib_compound_tag;
//! use anvil_nbt::encode::write_zlib_compound_tag;
//! use anvil_nbt::CompoundTag;
//! use std::io::Cursor;
//!
//! let mut compound_tag = CompoundTag::new();
//! compound_tag.insert_i32("xPos", 31);
//! compound_tag.insert_i32("zPos", 16);
//!
//! let mut buffer = Vec::new();
//! write_zlib_compound_tag(&mut buffer, &compound_tag).unwrap();
//! let read_compound_tag = read_zlib_compound_tag(&mut Cursor::new(&buffer)).unwrap();
//!
//! assert_eq!(read_compound_tag.get_i32("xPos").unwrap(), 31);
//! ```
//!
//! ## Regions
//!
//! ```
//! use anvil_nbt::{write_region, AnvilRegion, CompoundTag, CompressionScheme, REGION_CHUNKS};
//! use std::io::Cursor;
//!
//! let mut chunk_compound_tag = CompoundTag::new();
//! chunk_compound_tag.insert_str("Status", "minecraft:full");
//!
//! let mut chunks = vec![None; REGION_CHUNKS];
//! chunks[0] = Some(chunk_compound_tag);
//!
//! let mut buffer = Cursor::new(Vec::new());
//! write_region(&mut buffer, &chunks, CompressionScheme::Zlib).unwrap();
//!
//! let mut region = AnvilRegion::new(buffer).unwrap();
//! let read_chunk_compound_tag = region.read_chunk(0, 0).unwrap();
//!
//! assert_eq!(read_chunk_compound_tag.get_str("Status").unwrap(), "minecraft:full");
//! ```
use std::fs;
use std::fs::OpenOptions;
use std::path::Path;

pub mod chunk;
pub mod decode;
pub mod encode;
pub mod fmt;
pub mod palette;
pub mod region;
mod strict_parse_int;
pub mod tag;

pub use crate::chunk::{ChunkDecodeError, DecodedChunk, DecodedRegion, DecodedSection};
pub use crate::fmt::to_pretty_string;
pub use crate::palette::{
    BlockProperties, PaletteDecodeError, RegionBiomeCache, RegionBlockCache, SECTION_BIOME_COUNT,
    SECTION_BLOCK_COUNT,
};
pub use crate::region::{
    metadata_index, write_region, write_region_with_timestamp, AnvilChunkMetadata, AnvilRegion,
    ChunkLoadError, ChunkSaveError, CompressionScheme, REGION_CHUNKS,
};
pub use crate::tag::{CompoundTag, CompoundTagError, Tag};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegionAndOffset {
    region_x: i32,
    region_z: i32,
    region_chunk_x: u8,
    region_chunk_z: u8,
}

pub fn chunk_coords_to_region_coords(chunk_x: i32, chunk_z: i32) -> (i32, i32) {
    (chunk_x >> 5, chunk_z >> 5)
}

pub fn chunk_coords_inside_region(chunk_x: i32, chunk_z: i32) -> (u8, u8) {
    ((chunk_x & 0x1F) as u8, (chunk_z & 0x1F) as u8)
}

impl RegionAndOffset {
    fn from_chunk(chunk_x: i32, chunk_z: i32) -> Self {
        let (region_x, region_z) = chunk_coords_to_region_coords(chunk_x, chunk_z);
        let (region_chunk_x, region_chunk_z) = chunk_coords_inside_region(chunk_x, chunk_z);

        Self {
            region_x,
            region_z,
            region_chunk_x,
            region_chunk_z,
        }
    }
}

pub trait AnvilChunkProvider {
    fn load_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Result<CompoundTag, ChunkLoadError>;
    fn save_chunk(
        &mut self,
        chunk_x: i32,
        chunk_z: i32,
        chunk_compound_tag: CompoundTag,
    ) -> Result<(), ChunkSaveError>;
    fn load_region(
        &mut self,
        region_x: i32,
        region_z: i32,
    ) -> Result<Vec<Option<CompoundTag>>, ChunkLoadError>;
    fn save_region(
        &mut self,
        region_x: i32,
        region_z: i32,
        chunks: &[Option<CompoundTag>],
        compression_scheme: CompressionScheme,
    ) -> Result<(), ChunkSaveError>;
    fn list_chunks(&mut self) -> Result<Vec<(i32, i32)>, ChunkLoadError>;
    fn list_regions(&mut self) -> Result<Vec<(i32, i32)>, ChunkLoadError>;
}

/// The chunks are saved in a folder (the default)
pub struct FolderChunkProvider<'a> {
    /// Folder where region files located.
    folder_path: &'a Path,
}

impl<'a> FolderChunkProvider<'a> {
    pub fn new(folder: &'a str) -> Self {
        let folder_path = Path::new(folder);

        FolderChunkProvider { folder_path }
    }

    pub fn region_name(region_x: i32, region_z: i32) -> String {
        format!("r.{}.{}.mca", region_x, region_z)
    }

    /// Loads a chunk from the specified coordinates.
    pub fn load_chunk(&self, chunk_x: i32, chunk_z: i32) -> Result<CompoundTag, ChunkLoadError> {
        let RegionAndOffset {
            region_x,
            region_z,
            region_chunk_x,
            region_chunk_z,
        } = RegionAndOffset::from_chunk(chunk_x, chunk_z);

        let region_name = Self::region_name(region_x, region_z);
        let region_path = self.folder_path.join(region_name);

        if !region_path.exists() {
            return Err(ChunkLoadError::RegionNotFound { region_x, region_z });
        }

        let mut region = AnvilRegion::file(region_path)?;

        region.read_chunk(region_chunk_x, region_chunk_z)
    }

    /// Saves chunk data to the specified coordinates.
    ///
    /// Saving rewrites the whole region file: any chunks already stored in
    /// it are read back and written out again next to the new chunk.
    pub fn save_chunk(
        &self,
        chunk_x: i32,
        chunk_z: i32,
        chunk_compound_tag: CompoundTag,
    ) -> Result<(), ChunkSaveError> {
        let RegionAndOffset {
            region_x,
            region_z,
            region_chunk_x,
            region_chunk_z,
        } = RegionAndOffset::from_chunk(chunk_x, chunk_z);

        let region_name = Self::region_name(region_x, region_z);
        let region_path = self.folder_path.join(region_name);

        let mut chunks = if region_path.exists() {
            let read_chunks = || -> Result<Vec<Option<CompoundTag>>, ChunkLoadError> {
                let mut region = AnvilRegion::file(&region_path)?;
                region.read_all_chunks()
            };

            read_chunks().map_err(|chunk_load_error| ChunkSaveError::ExistingRegionUnreadable {
                chunk_load_error: Box::new(chunk_load_error),
            })?
        } else {
            vec![None; REGION_CHUNKS]
        };

        chunks[metadata_index(region_chunk_x, region_chunk_z)] = Some(chunk_compound_tag);

        self.write_region_file(&region_path, &chunks, CompressionScheme::Zlib)
    }

    /// Loads all 1024 chunk slots of the specified region.
    pub fn load_region(
        &self,
        region_x: i32,
        region_z: i32,
    ) -> Result<Vec<Option<CompoundTag>>, ChunkLoadError> {
        let region_name = Self::region_name(region_x, region_z);
        let region_path = self.folder_path.join(region_name);

        if !region_path.exists() {
            return Err(ChunkLoadError::RegionNotFound { region_x, region_z });
        }

        let mut region = AnvilRegion::file(region_path)?;

        region.read_all_chunks()
    }

    /// Saves a complete region file.
    pub fn save_region(
        &self,
        region_x: i32,
        region_z: i32,
        chunks: &[Option<CompoundTag>],
        compression_scheme: CompressionScheme,
    ) -> Result<(), ChunkSaveError> {
        let region_name = Self::region_name(region_x, region_z);
        let region_path = self.folder_path.join(region_name);

        self.write_region_file(&region_path, chunks, compression_scheme)
    }

    fn write_region_file(
        &self,
        region_path: &Path,
        chunks: &[Option<CompoundTag>],
        compression_scheme: CompressionScheme,
    ) -> Result<(), ChunkSaveError> {
        if !self.folder_path.exists() {
            fs::create_dir_all(self.folder_path)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(region_path)?;

        write_region(&mut file, chunks, compression_scheme)
    }

    // Find all the region files in the current folder
    fn find_all_region_mca(&self) -> Result<Vec<(i32, i32)>, std::io::Error> {
        let mut r = vec![];

        for entry in fs::read_dir(self.folder_path)? {
            let entry = entry?;
            let path = entry.path();
            let filename = path.file_name().and_then(|x| x.to_str());

            if let Some(coords) = filename.and_then(parse_region_file_name) {
                r.push(coords);
            }
        }

        Ok(r)
    }

    pub fn list_chunks(&self) -> Result<Vec<(i32, i32)>, ChunkLoadError> {
        let regions = self
            .find_all_region_mca()
            .map_err(|io_error| ChunkLoadError::ReadError { io_error })?;

        let mut c = vec![];

        for (region_x, region_z) in regions {
            let region_name = Self::region_name(region_x, region_z);
            let region_path = self.folder_path.join(region_name);

            let region = AnvilRegion::file(region_path)?;

            // Insert all the non-empty chunks from this region
            for region_chunk_z in 0..32 {
                for region_chunk_x in 0..32 {
                    let metadata = region.get_metadata(region_chunk_x, region_chunk_z);

                    if !metadata.is_empty() {
                        let chunk_x = (region_x * 32) + i32::from(region_chunk_x);
                        let chunk_z = (region_z * 32) + i32::from(region_chunk_z);
                        c.push((chunk_x, chunk_z));
                    }
                }
            }
        }

        Ok(c)
    }

    pub fn list_regions(&self) -> Result<Vec<(i32, i32)>, ChunkLoadError> {
        self.find_all_region_mca()
            .map_err(|io_error| ChunkLoadError::ReadError { io_error })
    }
}

impl<'a> AnvilChunkProvider for FolderChunkProvider<'a> {
    fn load_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Result<CompoundTag, ChunkLoadError> {
        FolderChunkProvider::load_chunk(self, chunk_x, chunk_z)
    }

    fn save_chunk(
        &mut self,
        chunk_x: i32,
        chunk_z: i32,
        chunk_compound_tag: CompoundTag,
    ) -> Result<(), ChunkSaveError> {
        FolderChunkProvider::save_chunk(self, chunk_x, chunk_z, chunk_compound_tag)
    }

    fn load_region(
        &mut self,
        region_x: i32,
        region_z: i32,
    ) -> Result<Vec<Option<CompoundTag>>, ChunkLoadError> {
        FolderChunkProvider::load_region(self, region_x, region_z)
    }

    fn save_region(
        &mut self,
        region_x: i32,
        region_z: i32,
        chunks: &[Option<CompoundTag>],
        compression_scheme: CompressionScheme,
    ) -> Result<(), ChunkSaveError> {
        FolderChunkProvider::save_region(self, region_x, region_z, chunks, compression_scheme)
    }

    fn list_chunks(&mut self) -> Result<Vec<(i32, i32)>, ChunkLoadError> {
        FolderChunkProvider::list_chunks(self)
    }

    fn list_regions(&mut self) -> Result<Vec<(i32, i32)>, ChunkLoadError> {
        FolderChunkProvider::list_regions(self)
    }
}

/// Parse "r.1.2.mca" into (1, 2)
pub fn parse_region_file_name(s: &str) -> Option<(i32, i32)> {
    let mut iter = s.as_bytes().split(|x| *x == b'.');
    if iter.next() != Some(b"r") {
        return None;
    }
    let x = strict_parse_int::strict_parse_i32(iter.next()?)?;
    let z = strict_parse_int::strict_parse_i32(iter.next()?)?;
    if iter.next() != Some(b"mca") {
        return None;
    }

    if iter.next() != None {
        // Trailing dots
        return None;
    }

    Some((x, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_to_region() {
        // Chunk (0, 0) is in region (0, 0) at offset (0, 0)
        assert_eq!(
            RegionAndOffset::from_chunk(0, 0),
            RegionAndOffset {
                region_x: 0,
                region_z: 0,
                region_chunk_x: 0,
                region_chunk_z: 0,
            }
        );

        // Chunk (0, -1) is in region (0, -1) at offset (0, 31)
        assert_eq!(
            RegionAndOffset::from_chunk(0, -1),
            RegionAndOffset {
                region_x: 0,
                region_z: -1,
                region_chunk_x: 0,
                region_chunk_z: 31,
            }
        );

        // Chunk (30, -3) is in region (0, -1) at offset (30, 29)
        assert_eq!(
            RegionAndOffset::from_chunk(30, -3),
            RegionAndOffset {
                region_x: 0,
                region_z: -1,
                region_chunk_x: 30,
                region_chunk_z: 29,
            }
        );

        // Chunk (70, -30) is in region (2, -1) at offset (6, 2)
        assert_eq!(
            RegionAndOffset::from_chunk(70, -30),
            RegionAndOffset {
                region_x: 2,
                region_z: -1,
                region_chunk_x: 6,
                region_chunk_z: 2,
            }
        );
    }

    #[test]
    fn test_load_chunk_no_folder() {
        let chunk_provider = FolderChunkProvider::new("no-folder");
        let load_error = chunk_provider.load_chunk(4, 4).err().unwrap();

        match load_error {
            ChunkLoadError::RegionNotFound { region_x, region_z } => {
                assert_eq!(region_x, 0);
                assert_eq!(region_z, 0);
            }
            _ => panic!("Expected `RegionNotFound` but got `{:?}", load_error),
        }
    }

    #[test]
    fn test_save_and_load_chunk() {
        let folder = tempfile::tempdir().unwrap();
        let folder_str = folder.path().to_str().unwrap();
        let chunk_provider = FolderChunkProvider::new(folder_str);

        let mut chunk_compound_tag = CompoundTag::new();
        chunk_compound_tag.insert_bool("test_bool", true);
        chunk_compound_tag.insert_str("test_str", "test");

        chunk_provider
            .save_chunk(31, 16, chunk_compound_tag)
            .unwrap();

        let read_compound_tag = chunk_provider.load_chunk(31, 16).unwrap();

        assert!(read_compound_tag.get_bool("test_bool").unwrap());
        assert_eq!(read_compound_tag.get_str("test_str").unwrap(), "test");
    }

    #[test]
    fn test_save_chunk_keeps_existing_chunks() {
        let folder = tempfile::tempdir().unwrap();
        let folder_str = folder.path().to_str().unwrap();
        let chunk_provider = FolderChunkProvider::new(folder_str);

        let mut first = CompoundTag::new();
        first.insert_i32("xPos", 0);

        let mut second = CompoundTag::new();
        second.insert_i32("xPos", 1);

        chunk_provider.save_chunk(0, 0, first).unwrap();
        chunk_provider.save_chunk(1, 0, second).unwrap();

        let first_read = chunk_provider.load_chunk(0, 0).unwrap();
        let second_read = chunk_provider.load_chunk(1, 0).unwrap();

        assert_eq!(first_read.get_i32("xPos").unwrap(), 0);
        assert_eq!(second_read.get_i32("xPos").unwrap(), 1);
    }

    #[test]
    fn test_save_and_load_region() {
        let folder = tempfile::tempdir().unwrap();
        let folder_str = folder.path().to_str().unwrap();
        let chunk_provider = FolderChunkProvider::new(folder_str);

        let mut chunk_compound_tag = CompoundTag::new();
        chunk_compound_tag.insert_str("Status", "minecraft:full");

        let mut chunks = vec![None; REGION_CHUNKS];
        chunks[17] = Some(chunk_compound_tag);

        chunk_provider
            .save_region(-1, 2, &chunks, CompressionScheme::Zlib)
            .unwrap();

        let read_chunks = chunk_provider.load_region(-1, 2).unwrap();

        assert_eq!(read_chunks[17], chunks[17]);
        assert!(read_chunks[0].is_none());
    }

    #[test]
    fn test_list_chunks_and_regions() {
        let folder = tempfile::tempdir().unwrap();
        let folder_str = folder.path().to_str().unwrap();
        let chunk_provider = FolderChunkProvider::new(folder_str);

        let mut chunk_compound_tag = CompoundTag::new();
        chunk_compound_tag.insert_str("Status", "minecraft:full");

        chunk_provider
            .save_chunk(4, 2, chunk_compound_tag.clone())
            .unwrap();
        chunk_provider.save_chunk(-1, 0, chunk_compound_tag).unwrap();

        let mut regions = chunk_provider.list_regions().unwrap();
        regions.sort();
        assert_eq!(regions, vec![(-1, 0), (0, 0)]);

        let mut chunks = chunk_provider.list_chunks().unwrap();
        chunks.sort();
        assert_eq!(chunks, vec![(-1, 0), (4, 2)]);
    }

    #[test]
    fn test_parse_region_file_name() {
        // Valid examples
        assert_eq!(parse_region_file_name("r.0.0.mca"), Some((0, 0)));
        assert_eq!(parse_region_file_name("r.1.2.mca"), Some((1, 2)));
        assert_eq!(parse_region_file_name("r.1.-2.mca"), Some((1, -2)));
        assert_eq!(parse_region_file_name("r.-2.1.mca"), Some((-2, 1)));
        assert_eq!(parse_region_file_name("r.-1.-2.mca"), Some((-1, -2)));
        assert_eq!(
            parse_region_file_name("r.2147483647.2147483647.mca"),
            Some((i32::max_value(), i32::max_value()))
        );
        assert_eq!(
            parse_region_file_name("r.-2147483648.-2147483648.mca"),
            Some((i32::min_value(), i32::min_value()))
        );

        // Invalid examples
        // Extra dots
        assert_eq!(parse_region_file_name(".r.0.0.mca"), None);
        assert_eq!(parse_region_file_name("r..0.0.mca"), None);
        assert_eq!(parse_region_file_name("r.0..0.mca"), None);
        assert_eq!(parse_region_file_name("r.0.0..mca"), None);
        assert_eq!(parse_region_file_name("r.0.0.m.ca"), None);
        assert_eq!(parse_region_file_name("r.0.0.mc.a"), None);
        assert_eq!(parse_region_file_name("r.0.0.mca."), None);
        // Whitespace is always invalid
        assert_eq!(parse_region_file_name(" r.0.0.mca"), None);
        assert_eq!(parse_region_file_name("r .0.0.mca"), None);
        assert_eq!(parse_region_file_name("r. 0.0.mca"), None);
        assert_eq!(parse_region_file_name("r.0 .0.mca"), None);
        assert_eq!(parse_region_file_name("r.0. 0.mca"), None);
        assert_eq!(parse_region_file_name("r.0.0 .mca"), None);
        assert_eq!(parse_region_file_name("r.0.0. mca"), None);
        assert_eq!(parse_region_file_name("r.0.0.m ca"), None);
        assert_eq!(parse_region_file_name("r.0.0.mc a"), None);
        assert_eq!(parse_region_file_name("r.0.0.mca "), None);
        // Trailing data
        assert_eq!(parse_region_file_name("r.0.0.mca~"), None);
        assert_eq!(parse_region_file_name("r.0.0.mca_backup"), None);
        assert_eq!(parse_region_file_name("r.0.0.mca.backup"), None);
    }
}
