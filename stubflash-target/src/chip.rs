use super::memory::MemoryRegion;
use serde::{Deserialize, Serialize};

/// A single chip variant.
///
/// This describes an exact chip variant, including its memory map. For
/// example, the `HC32F4A0` family has the variants `HC32F4A0xG` and
/// `HC32F4A0xI`, which differ in the size of their main flash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Chip {
    /// The name of the variant, e.g. `HC32F4A0xI`.
    pub name: String,
    /// The memory regions available on the chip.
    pub memory_map: Vec<MemoryRegion>,
    /// Names of all flash algorithms available for this chip.
    ///
    /// This can be used to look up the flash algorithm in the
    /// [`ChipFamily::flash_algorithms`] field.
    ///
    /// [`ChipFamily::flash_algorithms`]: crate::ChipFamily::flash_algorithms
    #[serde(default)]
    pub flash_algorithms: Vec<String>,
}

impl Chip {
    /// Iterates over the non-volatile regions of the chip.
    pub fn nvm_regions(&self) -> impl Iterator<Item = &crate::NvmRegion> {
        self.memory_map.iter().filter_map(MemoryRegion::as_nvm_region)
    }

    /// Iterates over the RAM regions of the chip.
    pub fn ram_regions(&self) -> impl Iterator<Item = &crate::RamRegion> {
        self.memory_map.iter().filter_map(MemoryRegion::as_ram_region)
    }
}
