// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Resource id resolution against the on-disc segment layout
//!
//! Logical resource ids pack three fields plus a flag:
//!
//! ```text
//! Bit 31:    unused
//! Bit 30:    compression flag
//! Bit 28-29: region (selects a row of each segment table)
//! Bit 16-27: entry (selects a column within the region)
//! Bit 0-15:  displacement (8-byte records within the word directory)
//! ```
//!
//! Resolution walks two parallel per-region tables. The primary table
//! yields the resource number directly; when the compression flag is set,
//! the secondary table yields a base into the word directory where a
//! two-word control record lives at `base + displacement * 2`.
//!
//! The flat displacement table maps a resource number to its physical
//! `(start_sector, byte_len, kind_tag)` triple, three words per resource.
//!
//! Resolution is side-effect free and never touches drive state; it is
//! safe to call from any tick without synchronization.

use serde::Deserialize;

use super::error::{Result, StreamError};

/// Compression flag bit within a resource id
pub const COMPRESSED_FLAG: u32 = 0x4000_0000;

const REGION_SHIFT: u32 = 28;
const REGION_MASK: u32 = 0x3;
const DISPLACEMENT_MASK: u32 = 0xFFFF;

/// Number of words per displacement-table record
const TRIPLE_WORDS: usize = 3;

/// A resolved resource location
///
/// Derived from a resource id on every [`ResourceLocator::resolve`] call;
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Resource number, or the first control word for compressed resources
    pub physical_address: u32,
    /// Second control word with the compression flag folded back in;
    /// zero for uncompressed resources
    pub extra: u32,
    /// Whether the id carried the compression flag
    pub compressed: bool,
}

/// One record of the flat displacement table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEntry {
    /// First sector of the resource on the medium
    pub start_sector: u32,
    /// Resource length in bytes
    pub byte_len: u32,
    /// Raw resource kind tag (see `ResourceKind::from_tag`)
    pub kind_tag: u32,
}

/// Persisted segment layout consumed as read-only external data
///
/// The layout describes where each logical resource lives on the medium:
/// a per-region primary table, a per-region secondary table, the word
/// directory the secondary table points into, and the flat displacement
/// table of three-word records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentLayout {
    /// Primary per-region table of resource numbers
    pub segment_table_a: Vec<Vec<u32>>,
    /// Secondary per-region table of directory bases (word units)
    pub segment_table_b: Vec<Vec<u32>>,
    /// Word directory holding two-word control records
    #[serde(default)]
    pub directory: Vec<u32>,
    /// Flat displacement table, three words per resource
    #[serde(default)]
    pub displacement: Vec<u32>,
}

impl SegmentLayout {
    /// Parse a layout from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| StreamError::LayoutError(e.to_string()))
    }

    /// Load a layout from a TOML file
    pub fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Resolves logical resource ids into physical disc locations
///
/// # Example
///
/// ```
/// use cdstream::core::layout::{ResourceLocator, SegmentLayout};
///
/// let layout = SegmentLayout {
///     segment_table_a: vec![vec![0x1000]],
///     segment_table_b: vec![vec![0]],
///     directory: Vec::new(),
///     displacement: Vec::new(),
/// };
/// let locator = ResourceLocator::new(layout).unwrap();
///
/// let desc = locator.resolve(0).unwrap();
/// assert_eq!(desc.physical_address, 0x1000);
/// assert!(!desc.compressed);
/// ```
#[derive(Debug)]
pub struct ResourceLocator {
    layout: SegmentLayout,
}

impl ResourceLocator {
    /// Create a locator over a segment layout
    ///
    /// Fails with [`StreamError::LayoutError`] when the two segment tables
    /// disagree in shape or the displacement table is not a whole number
    /// of records.
    pub fn new(layout: SegmentLayout) -> Result<Self> {
        if layout.segment_table_a.len() != layout.segment_table_b.len() {
            return Err(StreamError::LayoutError(format!(
                "segment table region counts differ: {} vs {}",
                layout.segment_table_a.len(),
                layout.segment_table_b.len()
            )));
        }
        for (region, (a, b)) in layout
            .segment_table_a
            .iter()
            .zip(layout.segment_table_b.iter())
            .enumerate()
        {
            if a.len() != b.len() {
                return Err(StreamError::LayoutError(format!(
                    "region {} entry counts differ: {} vs {}",
                    region,
                    a.len(),
                    b.len()
                )));
            }
        }
        if layout.displacement.len() % TRIPLE_WORDS != 0 {
            return Err(StreamError::LayoutError(format!(
                "displacement table length {} is not a multiple of {}",
                layout.displacement.len(),
                TRIPLE_WORDS
            )));
        }
        Ok(Self { layout })
    }

    /// Load a locator from a TOML layout file
    pub fn load(path: &str) -> Result<Self> {
        Self::new(SegmentLayout::load(path)?)
    }

    /// Resolve a resource id into a descriptor
    ///
    /// Fails with [`StreamError::InvalidResourceId`] when the region or
    /// entry field addresses outside the configured tables, or when a
    /// compressed id points past the end of the word directory.
    pub fn resolve(&self, id: u32) -> Result<ResourceDescriptor> {
        let region = ((id >> REGION_SHIFT) & REGION_MASK) as usize;
        let entry = ((id << 4) >> 20) as usize;
        let displacement = id & DISPLACEMENT_MASK;

        let row_a = self
            .layout
            .segment_table_a
            .get(region)
            .ok_or(StreamError::InvalidResourceId { id })?;
        let base = *row_a
            .get(entry)
            .ok_or(StreamError::InvalidResourceId { id })?;

        if id & COMPRESSED_FLAG == 0 {
            log::trace!("resolve 0x{:08X} -> resource {}", id, base);
            return Ok(ResourceDescriptor {
                physical_address: base,
                extra: 0,
                compressed: false,
            });
        }

        // Secondary table points into the word directory; each displacement
        // step is one two-word control record.
        let dir_base = self.layout.segment_table_b[region][entry] as usize;
        let index = dir_base + ((displacement as usize) << 1);
        if index + 1 >= self.layout.directory.len() {
            return Err(StreamError::InvalidResourceId { id });
        }
        let first = self.layout.directory[index];
        let second = self.layout.directory[index + 1] | COMPRESSED_FLAG;

        log::trace!(
            "resolve 0x{:08X} -> compressed record {} (0x{:08X}, 0x{:08X})",
            id,
            index,
            first,
            second
        );
        Ok(ResourceDescriptor {
            physical_address: first,
            extra: second,
            compressed: true,
        })
    }

    /// Look up the displacement triple for a resource number
    pub fn entry(&self, resource_number: u32) -> Result<ResourceEntry> {
        let base = resource_number as usize * TRIPLE_WORDS;
        if base + TRIPLE_WORDS > self.layout.displacement.len() {
            return Err(StreamError::InvalidResourceId {
                id: resource_number,
            });
        }
        Ok(ResourceEntry {
            start_sector: self.layout.displacement[base],
            byte_len: self.layout.displacement[base + 1],
            kind_tag: self.layout.displacement[base + 2],
        })
    }

    /// Number of configured regions
    pub fn region_count(&self) -> usize {
        self.layout.segment_table_a.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> ResourceLocator {
        ResourceLocator::new(SegmentLayout {
            segment_table_a: vec![vec![0x1000, 0x2000], vec![0x3000]],
            segment_table_b: vec![vec![0, 2], vec![4]],
            directory: vec![0xAAAA, 0xBBBB, 0x1234, 0x5678, 0x9ABC, 0xDEF0],
            displacement: vec![16, 4096, 2, 400, 100, 1],
        })
        .unwrap()
    }

    #[test]
    fn test_resolve_uncompressed() {
        let locator = fixture();
        let desc = locator.resolve(0x0000_0000).unwrap();
        assert_eq!(desc.physical_address, 0x1000);
        assert_eq!(desc.extra, 0);
        assert!(!desc.compressed);
    }

    #[test]
    fn test_resolve_selects_region_and_entry() {
        let locator = fixture();
        // Region 0, entry 1.
        let desc = locator.resolve(0x0001_0000).unwrap();
        assert_eq!(desc.physical_address, 0x2000);
        // Region 1, entry 0.
        let desc = locator.resolve(0x1000_0000).unwrap();
        assert_eq!(desc.physical_address, 0x3000);
    }

    #[test]
    fn test_resolve_compressed_reads_directory_record() {
        let locator = fixture();
        // Region 0, entry 1 -> directory base 2, displacement 1 -> index 4.
        let desc = locator.resolve(COMPRESSED_FLAG | 0x0001_0001).unwrap();
        assert!(desc.compressed);
        assert_eq!(desc.physical_address, 0x9ABC);
        assert_eq!(desc.extra, 0xDEF0 | COMPRESSED_FLAG);
    }

    #[test]
    fn test_resolve_rejects_out_of_range_region() {
        let locator = fixture();
        let err = locator.resolve(0x2000_0000).unwrap_err();
        assert!(matches!(err, StreamError::InvalidResourceId { .. }));
    }

    #[test]
    fn test_resolve_rejects_out_of_range_entry() {
        let locator = fixture();
        let err = locator.resolve(0x0002_0000).unwrap_err();
        assert!(matches!(err, StreamError::InvalidResourceId { .. }));
    }

    #[test]
    fn test_resolve_rejects_directory_overrun() {
        let locator = fixture();
        let err = locator
            .resolve(COMPRESSED_FLAG | 0x0001_0002)
            .unwrap_err();
        assert!(matches!(err, StreamError::InvalidResourceId { .. }));
    }

    #[test]
    fn test_entry_triple() {
        let locator = fixture();
        let entry = locator.entry(1).unwrap();
        assert_eq!(entry.start_sector, 400);
        assert_eq!(entry.byte_len, 100);
        assert_eq!(entry.kind_tag, 1);
    }

    #[test]
    fn test_entry_out_of_range() {
        let locator = fixture();
        assert!(locator.entry(2).is_err());
    }

    #[test]
    fn test_mismatched_tables_rejected() {
        let err = ResourceLocator::new(SegmentLayout {
            segment_table_a: vec![vec![1, 2]],
            segment_table_b: vec![vec![1]],
            directory: Vec::new(),
            displacement: Vec::new(),
        })
        .unwrap_err();
        assert!(matches!(err, StreamError::LayoutError(_)));
    }

    #[test]
    fn test_layout_from_toml() {
        let layout = SegmentLayout::from_toml_str(
            r#"
            segment_table_a = [[4096]]
            segment_table_b = [[0]]
            displacement = [16, 2048, 2]
            "#,
        )
        .unwrap();
        let locator = ResourceLocator::new(layout).unwrap();
        assert_eq!(locator.resolve(0).unwrap().physical_address, 4096);
    }
}
