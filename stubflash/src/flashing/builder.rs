use std::fmt::{Debug, Formatter};
use std::ops::Range;

use super::{FlashAlgorithm, FlashError};
use crate::config::{MemoryRange, NvmRegion, PageInfo, SectorInfo};

/// The description of a page in flash.
///
/// The data handed to a single `ProgramPage()` call. Its length is a multiple
/// of the minimum program length and at most one page.
#[derive(Clone, PartialEq, Eq)]
pub struct FlashPage {
    address: u64,
    data: Vec<u8>,
}

impl Debug for FlashPage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashPage")
            .field("address", &format_args!("{:#010x}", self.address))
            .field("size", &format_args!("{:#x}", self.size()))
            .finish()
    }
}

impl FlashPage {
    /// Creates a page filled with `fill`.
    fn new(page_info: &PageInfo, fill: u8) -> Self {
        Self {
            address: page_info.base_address,
            data: vec![fill; page_info.size as usize],
        }
    }

    /// Returns the start address of the page.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the size of the page in bytes.
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Returns the data slice of the page.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the address range covered by the page.
    pub fn address_range(&self) -> Range<u64> {
        self.address..self.address + self.data.len() as u64
    }
}

/// The description of a sector in flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSector {
    address: u64,
    size: u64,
}

impl FlashSector {
    pub(super) fn new(sector_info: &SectorInfo) -> Self {
        Self {
            address: sector_info.base_address,
            size: sector_info.size,
        }
    }

    /// Returns the start address of the sector.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the size of the sector in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// The built layout of the data in flash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashLayout {
    pub(super) sectors: Vec<FlashSector>,
    pub(super) pages: Vec<FlashPage>,
}

impl FlashLayout {
    /// Get the sectors of the flash layout.
    pub fn sectors(&self) -> &[FlashSector] {
        &self.sectors
    }

    /// Get the pages of the flash layout.
    pub fn pages(&self) -> &[FlashPage] {
        &self.pages
    }
}

/// A block of data that is to be written to flash.
#[derive(Clone, PartialEq, Eq)]
pub(super) struct FlashDataBlock {
    address: u64,
    data: Vec<u8>,
}

impl FlashDataBlock {
    fn address_range(&self) -> Range<u64> {
        self.address..self.address + self.data.len() as u64
    }
}

/// A helper structure to build a flash layout from a set of data blocks.
///
/// The blocks are kept sorted by address and never overlap.
#[derive(Default)]
pub(super) struct FlashBuilder {
    data_blocks: Vec<FlashDataBlock>,
}

impl FlashBuilder {
    /// Creates a new `FlashBuilder` with empty data.
    pub(super) fn new() -> Self {
        Self {
            data_blocks: vec![],
        }
    }

    /// Add a block of data to be programmed.
    ///
    /// Programming does not start until the `program` method is called.
    pub(super) fn add_data(&mut self, address: u64, data: &[u8]) -> Result<(), FlashError> {
        let range = address..address + data.len() as u64;

        match self
            .data_blocks
            .binary_search_by_key(&address, |block| block.address)
        {
            Ok(_) => return Err(FlashError::DataOverlap(address)),
            Err(position) => {
                // Only the direct neighbours can overlap, the list is sorted.
                let previous = position.checked_sub(1).and_then(|p| self.data_blocks.get(p));
                let next = self.data_blocks.get(position);

                if [previous, next]
                    .into_iter()
                    .flatten()
                    .any(|block| block.address_range().intersects_range(&range))
                {
                    return Err(FlashError::DataOverlap(address));
                }

                self.data_blocks.insert(
                    position,
                    FlashDataBlock {
                        address,
                        data: data.to_vec(),
                    },
                );
            }
        }

        Ok(())
    }

    /// True if no data was added.
    pub(super) fn is_empty(&self) -> bool {
        self.data_blocks.is_empty()
    }

    /// Iterates over the parts of the data blocks which lie in `range`.
    pub(super) fn data_in_range<'s>(
        &'s self,
        range: &'s Range<u64>,
    ) -> impl Iterator<Item = (u64, &'s [u8])> + 's {
        self.data_blocks.iter().filter_map(move |block| {
            let start = block.address.max(range.start);
            let end = block.address_range().end.min(range.end);

            if start < end {
                let offset = (start - block.address) as usize;
                let len = (end - start) as usize;
                Some((start, &block.data[offset..offset + len]))
            } else {
                None
            }
        })
    }

    /// Lays out the data inside `region` as pages and the sectors they touch.
    ///
    /// Gaps inside a page are filled with `fill`, or the erased byte value of
    /// the algorithm. The last written byte of a page is rounded up to the
    /// minimum program length, the rest of the page is not programmed.
    pub(super) fn build_sectors_and_pages(
        &self,
        region: &NvmRegion,
        flash_algorithm: &FlashAlgorithm,
        fill: Option<u8>,
    ) -> Result<FlashLayout, FlashError> {
        let fill = fill.unwrap_or(flash_algorithm.flash_properties.erased_byte_value);
        let mut pages: Vec<FlashPage> = Vec::new();
        // Bytes of each page which have to be programmed.
        let mut used: Vec<u64> = Vec::new();

        for (address, data) in self.data_in_range(&region.range) {
            let mut pos = 0;

            while pos < data.len() {
                let flash_address = address + pos as u64;

                let in_last_page = pages
                    .last()
                    .is_some_and(|page| page.address_range().contains(&flash_address));

                if !in_last_page {
                    let page_info = region
                        .page_info(flash_address)
                        .ok_or(FlashError::NoRegion {
                            address: flash_address,
                        })?;

                    tracing::trace!(
                        "Added page {:#010x?}",
                        page_info.base_address..page_info.base_address + page_info.size as u64
                    );
                    pages.push(FlashPage::new(&page_info, fill));
                    used.push(0);
                }

                let (Some(page), Some(page_used)) = (pages.last_mut(), used.last_mut()) else {
                    return Err(FlashError::NoRegion {
                        address: flash_address,
                    });
                };

                let offset = (flash_address - page.address) as usize;
                let amount = usize::min(page.data.len() - offset, data.len() - pos);
                page.data[offset..offset + amount].copy_from_slice(&data[pos..pos + amount]);

                *page_used = (*page_used).max((offset + amount) as u64);

                pos += amount;
            }
        }

        let min_program_length = flash_algorithm.min_program_length as u64;
        for (page, used) in pages.iter_mut().zip(used) {
            let length = used.div_ceil(min_program_length) * min_program_length;
            page.data.truncate(length as usize);
        }

        let mut sectors: Vec<FlashSector> = Vec::new();
        for page in &pages {
            for sector in region.sectors_in(page.address_range()) {
                if sectors.last().map(|s| s.address) != Some(sector.base_address) {
                    sectors.push(FlashSector::new(&sector));
                }
            }
        }

        Ok(FlashLayout { sectors, pages })
    }
}
