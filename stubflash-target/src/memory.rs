use crate::serialize::{hex_range, hex_u_int};
use serde::{Deserialize, Serialize};
use std::ops::Range;

fn default_true() -> bool {
    true
}

/// Represents a region in non-volatile memory (e.g. flash or OTP).
///
/// The region carries its own page and sector geometry and, optionally,
/// the name of the flash algorithm used to program it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NvmRegion {
    /// A name to describe the region
    #[serde(default)]
    pub name: Option<String>,
    /// Address range of the region
    #[serde(serialize_with = "hex_range")]
    pub range: Range<u64>,
    /// Size of a program page in bytes.
    #[serde(serialize_with = "hex_u_int")]
    pub page_size: u32,
    /// Size of an erase sector in bytes.
    #[serde(serialize_with = "hex_u_int")]
    pub sector_size: u64,
    /// True if the chip boots from this memory.
    #[serde(default)]
    pub is_boot_memory: bool,
    /// True if this region is picked when no region is requested explicitly.
    #[serde(default = "default_true")]
    pub is_default: bool,
    /// Name of the flash algorithm which programs this region.
    ///
    /// This refers to an entry in [`ChipFamily::flash_algorithms`].
    ///
    /// [`ChipFamily::flash_algorithms`]: crate::ChipFamily::flash_algorithms
    #[serde(default)]
    pub algorithm: Option<String>,
}

impl NvmRegion {
    /// Returns the length of the region in bytes.
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// Returns true if the region has a length of zero.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Information about the sector which contains `address`,
    /// or `None` if the address is not part of this region.
    pub fn sector_info(&self, address: u64) -> Option<SectorInfo> {
        if !self.range.contains(&address) || self.sector_size == 0 {
            return None;
        }

        let offset = address - self.range.start;
        let base_address = self.range.start + offset - offset % self.sector_size;

        Some(SectorInfo {
            base_address,
            size: self.sector_size,
        })
    }

    /// Information about the page which contains `address`,
    /// or `None` if the address is not part of this region.
    pub fn page_info(&self, address: u64) -> Option<PageInfo> {
        if !self.range.contains(&address) || self.page_size == 0 {
            return None;
        }

        let offset = address - self.range.start;

        Some(PageInfo {
            base_address: self.range.start + offset - offset % self.page_size as u64,
            size: self.page_size,
        })
    }

    /// Iterate over all sectors which intersect `range`.
    pub fn sectors_in(&self, range: Range<u64>) -> impl Iterator<Item = SectorInfo> + '_ {
        let mut next = if range.is_empty() {
            None
        } else {
            self.sector_info(range.start).map(|s| s.base_address)
        };
        std::iter::from_fn(move || {
            let address = next?;
            if address >= range.end {
                return None;
            }
            let sector = self.sector_info(address)?;
            next = Some(sector.base_address + sector.size);
            Some(sector)
        })
    }
}

/// Represents a region in RAM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RamRegion {
    /// A name to describe the region
    #[serde(default)]
    pub name: Option<String>,
    /// Address range of the region
    #[serde(serialize_with = "hex_range")]
    pub range: Range<u64>,
}

/// Holds information about a specific, individual flash
/// sector.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SectorInfo {
    /// Base address of the flash sector
    pub base_address: u64,
    /// Size of the flash sector
    pub size: u64,
}

impl SectorInfo {
    /// Returns the address range of the sector.
    pub fn address_range(&self) -> Range<u64> {
        self.base_address..self.base_address + self.size
    }
}

/// Holds information about a page in flash.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Base address of the page in flash.
    pub base_address: u64,
    /// Size of the page
    pub size: u32,
}

impl PageInfo {
    /// Returns the address range of the page.
    pub fn address_range(&self) -> Range<u64> {
        self.base_address..self.base_address + self.size as u64
    }
}

/// Enables the user to do range intersection testing.
pub trait MemoryRange {
    /// Returns true if `self` contains `range` fully.
    fn contains_range(&self, range: &Range<u64>) -> bool;

    /// Returns true if `self` intersects `range` partially.
    fn intersects_range(&self, range: &Range<u64>) -> bool;
}

impl MemoryRange for Range<u64> {
    fn contains_range(&self, range: &Range<u64>) -> bool {
        if range.end == 0 {
            false
        } else {
            self.contains(&range.start) && self.contains(&(range.end - 1))
        }
    }

    fn intersects_range(&self, range: &Range<u64>) -> bool {
        !self.is_empty() && !range.is_empty() && self.start < range.end && range.start < self.end
    }
}

/// Declares the type of a memory region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryRegion {
    /// Memory region describing RAM.
    Ram(RamRegion),
    /// Memory region describing flash, OTP or other non-volatile memory.
    #[serde(alias = "Flash")]
    Nvm(NvmRegion),
}

impl MemoryRegion {
    /// Returns the RAM region if this is a RAM region, otherwise None.
    pub fn as_ram_region(&self) -> Option<&RamRegion> {
        match self {
            MemoryRegion::Ram(region) => Some(region),
            _ => None,
        }
    }

    /// Returns the NVM region if this is a NVM region, otherwise None.
    pub fn as_nvm_region(&self) -> Option<&NvmRegion> {
        match self {
            MemoryRegion::Nvm(region) => Some(region),
            _ => None,
        }
    }

    /// Returns the address range of the memory region.
    pub fn address_range(&self) -> Range<u64> {
        match self {
            MemoryRegion::Ram(rr) => rr.range.clone(),
            MemoryRegion::Nvm(nr) => nr.range.clone(),
        }
    }

    /// Returns whether the memory region contains the given address.
    pub fn contains(&self, address: u64) -> bool {
        self.address_range().contains(&address)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn flash() -> NvmRegion {
        NvmRegion {
            name: Some("Flash".to_string()),
            range: 0x0..0x10_0000,
            page_size: 0x800,
            sector_size: 0x2000,
            is_boot_memory: true,
            is_default: true,
            algorithm: Some("main".to_string()),
        }
    }

    #[test]
    fn contains_range() {
        assert!((0..4).contains_range(&(0..1)));
        assert!((4..8).contains_range(&(6..8)));
        assert!(!(0..1).contains_range(&(0..2)));
        assert!(!(4..8).contains_range(&(3..9)));
        assert!(!(4..8).contains_range(&(0..0)));
    }

    #[test]
    fn intersects_range() {
        assert!((0..1).intersects_range(&(0..2)));
        assert!((4..8).intersects_range(&(3..9)));
        assert!((4..8).intersects_range(&(6..8)));
        assert!(!(4..8).intersects_range(&(3..4)));
        assert!(!(8..9).intersects_range(&(6..8)));
        assert!(!(2..4).intersects_range(&(6..8)));
    }

    #[test]
    fn sector_and_page_info() {
        let region = flash();

        assert_eq!(
            region.sector_info(0x2345),
            Some(SectorInfo {
                base_address: 0x2000,
                size: 0x2000
            })
        );
        assert_eq!(
            region.page_info(0x2345),
            Some(PageInfo {
                base_address: 0x2000,
                size: 0x800
            })
        );
        assert_eq!(region.sector_info(0x10_0000), None);
        assert_eq!(region.page_info(0x10_0000), None);
    }

    #[test]
    fn sectors_covering_a_range() {
        let region = flash();

        let sectors: Vec<u64> = region
            .sectors_in(0x1800..0x4001)
            .map(|s| s.base_address)
            .collect();

        assert_eq!(sectors, vec![0x0, 0x2000, 0x4000]);
    }

    #[test]
    fn sectors_stop_at_region_end() {
        let region = flash();

        let sectors: Vec<u64> = region
            .sectors_in(0xf_f000..0x20_0000)
            .map(|s| s.base_address)
            .collect();

        assert_eq!(sectors, vec![0xf_e000]);
    }

    #[test]
    fn empty_range_covers_no_sector() {
        let region = flash();

        assert_eq!(region.sectors_in(0x2100..0x2100).count(), 0);
        assert_eq!(region.sectors_in(0x2000..0x2000).count(), 0);
    }
}
