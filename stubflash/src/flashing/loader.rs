use ihex::Record;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;

use super::builder::FlashBuilder;
use super::{BinOptions, DownloadOptions, FileDownloadError, FlashError, Flasher};
use crate::config::{MemoryRange, MemoryRegion, NvmRegion, RamRegion, TargetDescriptionSource};
use crate::core::CoreInterface;
use crate::session::Session;

/// `FlashLoader` is a struct which manages the flashing of any chunks of data onto any sections of flash.
///
/// Use [add_data()](FlashLoader::add_data) to add a chunk of data.
/// Once you are done adding all your data, use `commit()` to flash the data.
/// The flash loader will make sure to select the appropriate flash region for the right data chunks.
/// Region crossing data chunks are allowed as long as the regions are contiguous.
pub struct FlashLoader {
    memory_map: Vec<MemoryRegion>,
    builder: FlashBuilder,

    /// Source of the flash description,
    /// used for diagnostics.
    source: TargetDescriptionSource,
}

impl FlashLoader {
    /// Create a new flash loader.
    pub fn new(memory_map: Vec<MemoryRegion>, source: TargetDescriptionSource) -> Self {
        Self {
            memory_map,
            builder: FlashBuilder::new(),
            source,
        }
    }

    /// Check the given address range is completely covered by the memory map,
    /// possibly by multiple memory regions.
    fn check_data_in_memory_map(&self, range: Range<u64>) -> Result<(), FlashError> {
        let mut address = range.start;
        while address < range.end {
            match self.memory_map.iter().find(|region| region.contains(address)) {
                Some(region) => address = region.address_range().end,
                None => {
                    tracing::debug!(
                        "No region for {:#010x}, target description from {:?}",
                        address,
                        self.source
                    );
                    return Err(FlashError::NoRegion { address });
                }
            }
        }
        Ok(())
    }

    /// Stages a chunk of data to be programmed.
    ///
    /// The chunk can cross flash boundaries as long as one flash region connects to another flash region.
    pub fn add_data(&mut self, address: u64, data: &[u8]) -> Result<(), FlashError> {
        tracing::debug!(
            "Adding data at address {:#010x} with size {} bytes",
            address,
            data.len()
        );

        self.check_data_in_memory_map(address..address + data.len() as u64)?;
        self.builder.add_data(address, data)
    }

    /// True if no data was staged yet.
    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    /// Reads the data from the binary file and adds it to the loader without splitting it into flash instructions yet.
    pub fn load_bin_data<T: Read + Seek>(
        &mut self,
        file: &mut T,
        options: BinOptions,
    ) -> Result<(), FileDownloadError> {
        // Skip the specified bytes.
        file.seek(SeekFrom::Start(u64::from(options.skip)))?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let address = match options.base_address {
            Some(address) => address,
            // If no base address is specified use the start of the boot memory.
            None => self
                .memory_map
                .iter()
                .filter_map(MemoryRegion::as_nvm_region)
                .find(|region| region.is_boot_memory)
                .map(|region| region.range.start)
                .unwrap_or(0),
        };

        self.add_data(address, &buf)?;

        Ok(())
    }

    /// Reads the HEX data segments and adds them as loadable data blocks to the loader.
    /// This does not create and flash loader instructions yet.
    pub fn load_hex_data<T: Read + Seek>(&mut self, file: &mut T) -> Result<(), FileDownloadError> {
        let mut base_address = 0;

        let mut data = String::new();
        file.read_to_string(&mut data)?;

        for record in ihex::Reader::new(&data) {
            match record? {
                Record::Data { offset, value } => {
                    let offset = base_address + offset as u64;
                    self.add_data(offset, &value)?;
                }
                Record::EndOfFile => (),
                Record::ExtendedSegmentAddress(address) => {
                    base_address = (address as u64) * 16;
                }
                Record::StartSegmentAddress { .. } => (),
                Record::ExtendedLinearAddress(address) => {
                    base_address = (address as u64) << 16;
                }
                Record::StartLinearAddress(_) => (),
            };
        }
        Ok(())
    }

    /// Writes all the stored data chunks to flash.
    ///
    /// Every non-volatile region holding data is programmed with its own
    /// flash algorithm. RAM contents are written afterwards, since the flash
    /// algorithms use the RAM as well.
    pub fn commit<C: CoreInterface>(
        &self,
        session: &mut Session<C>,
        options: DownloadOptions,
    ) -> Result<(), FlashError> {
        tracing::debug!("committing flash!");

        if self.memory_map != session.target().memory_map {
            tracing::warn!("Memory map of flash loader does not match memory map of target!");
        }

        // Commit NVM first
        for region in self.memory_map.iter().filter_map(MemoryRegion::as_nvm_region) {
            self.commit_nvm(region, session, &options)?;
        }

        // Commit RAM last, because NVM flashing overwrites RAM
        for region in self.memory_map.iter().filter_map(MemoryRegion::as_ram_region) {
            self.commit_ram(region, session)?;
        }

        Ok(())
    }

    fn commit_ram<C: CoreInterface>(
        &self,
        region: &RamRegion,
        session: &mut Session<C>,
    ) -> Result<(), FlashError> {
        let core = session.core();

        for (address, data) in self.builder.data_in_range(&region.range) {
            tracing::info!(
                "Ram write program data @ {:X} {} bytes",
                address,
                data.len()
            );
            // Write data to memory.
            core.write_8(address, data)?;
        }

        core.flush()?;

        Ok(())
    }

    fn commit_nvm<C: CoreInterface>(
        &self,
        region: &NvmRegion,
        session: &mut Session<C>,
        options: &DownloadOptions,
    ) -> Result<(), FlashError> {
        if self.builder.data_in_range(&region.range).next().is_none() {
            return Ok(());
        }

        tracing::debug!(
            "Using builder for region (0x{:08x}..0x{:08x})",
            region.range.start,
            region.range.end
        );

        for (address, data) in self.builder.data_in_range(&region.range) {
            tracing::debug!(
                "     data: {:#010x?} ({} bytes)",
                address..address + data.len() as u64,
                data.len()
            );
        }

        let raw_flash_algorithm = session.target().flash_algorithm_for_region(region)?.clone();

        if !raw_flash_algorithm
            .flash_properties
            .address_range
            .contains_range(&region.range)
        {
            tracing::warn!(
                "Flash algorithm {} covers {:#010x?}, which does not contain the region {:#010x?}",
                raw_flash_algorithm.name,
                raw_flash_algorithm.flash_properties.address_range,
                region.range
            );
        }

        // Program the data.
        let mut flasher = Flasher::new(session, &raw_flash_algorithm, region, options)?;
        let layout = flasher.layout(&self.builder)?;
        flasher.program(&layout)?;

        Ok(())
    }
}
