use crate::flashing::{FlashError, FlashLoader};
use std::ops::Range;
use stubflash_target::{
    Chip, ChipFamily, InstructionSet, MemoryRange, MemoryRegion, NvmRegion, RawFlashAlgorithm,
    RegisterFixup, TargetDescriptionSource,
};

/// This describes a complete target with a fixed chip model and variant.
#[derive(Clone, Debug)]
pub struct Target {
    /// The name of the target.
    pub name: String,
    /// The name of the family the target belongs to.
    pub family: String,
    /// The memory map of the target.
    pub memory_map: Vec<MemoryRegion>,
    /// The flash algorithms available for the target.
    pub flash_algorithms: Vec<RawFlashAlgorithm>,
    /// Register writes applied right after attaching.
    pub post_connect: Vec<RegisterFixup>,
    /// Instruction set of the flash algorithms.
    pub instruction_set: InstructionSet,
    /// Source of the target description. Used for diagnostics.
    pub source: TargetDescriptionSource,
}

impl Target {
    /// Create a new target for the given details.
    ///
    /// Only the algorithms referenced by the variant or its regions are kept.
    pub fn new(family: &ChipFamily, chip: &Chip) -> Target {
        let flash_algorithms = family
            .flash_algorithms
            .iter()
            .filter(|algorithm| {
                chip.flash_algorithms.contains(&algorithm.name)
                    || chip
                        .nvm_regions()
                        .any(|region| region.algorithm.as_ref() == Some(&algorithm.name))
            })
            .cloned()
            .collect();

        Target {
            name: chip.name.clone(),
            family: family.name.clone(),
            memory_map: chip.memory_map.clone(),
            flash_algorithms,
            post_connect: family.post_connect.clone(),
            instruction_set: family.instruction_set,
            source: family.source.clone(),
        }
    }

    /// Iterates over the non-volatile regions of the target.
    pub fn nvm_regions(&self) -> impl Iterator<Item = &NvmRegion> {
        self.memory_map.iter().filter_map(MemoryRegion::as_nvm_region)
    }

    /// The region the chip boots from, if any.
    pub fn boot_region(&self) -> Option<&NvmRegion> {
        self.nvm_regions().find(|region| region.is_boot_memory)
    }

    /// Returns the non-volatile region containing `length` bytes starting at `address`.
    ///
    /// Fails with [`FlashError::NoRegion`] if no region contains `address`, and
    /// with [`FlashError::CrossesRegionBoundary`] if the range does not end in
    /// the same region.
    pub fn select_region(&self, address: u64, length: u64) -> Result<&NvmRegion, FlashError> {
        let region = self
            .nvm_regions()
            .find(|region| region.range.contains(&address))
            .ok_or(FlashError::NoRegion { address })?;

        let requested: Range<u64> = address..address.saturating_add(length);
        if length > 0 && !region.range.contains_range(&requested) {
            return Err(FlashError::CrossesRegionBoundary {
                start: requested.start,
                end: requested.end,
            });
        }

        Ok(region)
    }

    /// Returns the flash algorithm which programs `region`.
    pub fn flash_algorithm_for_region(
        &self,
        region: &NvmRegion,
    ) -> Result<&RawFlashAlgorithm, FlashError> {
        let name = region
            .algorithm
            .as_ref()
            .ok_or_else(|| FlashError::NoFlashAlgorithm {
                start: region.range.start,
                end: region.range.end,
            })?;

        self.flash_algorithm_by_name(name)
            .ok_or_else(|| FlashError::AlgorithmNotFound { name: name.clone() })
    }

    /// Gets a [RawFlashAlgorithm] by name.
    pub fn flash_algorithm_by_name(&self, name: &str) -> Option<&RawFlashAlgorithm> {
        self.flash_algorithms.iter().find(|a| a.name == name)
    }

    /// Create a [FlashLoader] for this target, which can be used
    /// to program its non-volatile memory.
    pub fn flash_loader(&self) -> FlashLoader {
        FlashLoader::new(self.memory_map.clone(), self.source.clone())
    }
}
