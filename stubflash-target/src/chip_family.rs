use crate::{Chip, MemoryRange, NvmRegion, RawFlashAlgorithm, RegisterFixup};

use serde::{Deserialize, Serialize};

/// Source of a target description.
///
/// This is used for diagnostics, when
/// an error related to a target description occurs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetDescriptionSource {
    /// The target description is compiled into the binary.
    BuiltIn,
    /// The target description was loaded at runtime.
    External,
}

/// Instruction set the flash algorithms of a family are written in.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionSet {
    /// ARM Thumb 2 instruction set
    #[default]
    Thumb2,
    /// ARM A32 (often just called ARM) instruction set
    A32,
}

impl InstructionSet {
    /// Returns the value written to LR so the stub returns onto `address`.
    ///
    /// Thumb code has to return to an address with the lowest bit set.
    pub fn return_address(&self, address: u64) -> u64 {
        match self {
            InstructionSet::Thumb2 => address | 1,
            InstructionSet::A32 => address,
        }
    }
}

/// This describes a chip family with all its variants.
///
/// This struct is either built into the binary or read from a YAML target
/// description file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChipFamily {
    /// This is the name of the chip family in base form.
    /// E.g. `HC32F4A0`.
    pub name: String,
    /// Name of the manufacturer.
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Instruction set of the flash algorithms.
    #[serde(default)]
    pub instruction_set: InstructionSet,
    /// This vector holds all the variants of the family.
    pub variants: Vec<Chip>,
    /// This vector holds all available algorithms.
    #[serde(default)]
    pub flash_algorithms: Vec<RawFlashAlgorithm>,
    /// Register writes applied once right after attaching.
    #[serde(default)]
    pub post_connect: Vec<RegisterFixup>,
    #[serde(skip, default = "default_source")]
    /// Source of the target description, used for diagnostics
    pub source: TargetDescriptionSource,
}

fn default_source() -> TargetDescriptionSource {
    TargetDescriptionSource::External
}

impl ChipFamily {
    /// Validates the [`ChipFamily`] so the flashing code can rely on its
    /// geometry without checking it again.
    ///
    /// This method should be called right after the [`ChipFamily`] is created!
    pub fn validate(&self) -> Result<(), String> {
        self.reject_duplicate_target_names()?;
        self.ensure_algorithms_exists()?;
        self.validate_algorithms()?;
        self.validate_nvm_regions()?;

        Ok(())
    }

    /// Get the different [Chip]s which are part of this
    /// family.
    pub fn variants(&self) -> &[Chip] {
        &self.variants
    }

    /// Get all flash algorithms for this family of chips.
    pub fn algorithms(&self) -> &[RawFlashAlgorithm] {
        &self.flash_algorithms
    }

    /// Try to find a [RawFlashAlgorithm] with a given name.
    pub fn get_algorithm(&self, name: impl AsRef<str>) -> Option<&RawFlashAlgorithm> {
        let name = name.as_ref();
        self.flash_algorithms.iter().find(|elem| elem.name == name)
    }

    /// Rejects target descriptions with duplicate target names. Only one of these targets can
    /// be selected, so having multiple is probably a mistake.
    fn reject_duplicate_target_names(&self) -> Result<(), String> {
        use std::collections::HashSet;

        let mut seen = HashSet::new();

        for chip in &self.variants {
            if !seen.insert(&chip.name) {
                return Err(format!(
                    "Target {} appears multiple times in {}",
                    chip.name, self.name,
                ));
            }
        }

        Ok(())
    }

    /// Make sure every algorithm referenced by a variant or region exists.
    fn ensure_algorithms_exists(&self) -> Result<(), String> {
        for variant in &self.variants {
            let region_algorithms = variant
                .nvm_regions()
                .filter_map(|region| region.algorithm.as_ref());

            for algorithm_name in variant.flash_algorithms.iter().chain(region_algorithms) {
                if self.get_algorithm(algorithm_name).is_none() {
                    return Err(format!(
                        "unknown flash algorithm `{}` for variant `{}`",
                        algorithm_name, variant.name
                    ));
                }
            }
        }

        Ok(())
    }

    fn validate_algorithms(&self) -> Result<(), String> {
        for algorithm in &self.flash_algorithms {
            if algorithm.pc_program_page == 0 {
                return Err(format!(
                    "flash algorithm `{}` has no ProgramPage entry point",
                    algorithm.name
                ));
            }

            if algorithm.page_buffers.len() > 2 {
                return Err(format!(
                    "flash algorithm `{}` declares {} page buffers, at most 2 are supported",
                    algorithm.name,
                    algorithm.page_buffers.len()
                ));
            }

            if algorithm.page_size == 0
                || algorithm.min_program_length == 0
                || algorithm.min_program_length > algorithm.page_size
            {
                return Err(format!(
                    "flash algorithm `{}`: page size {:#x} does not fit the minimum program length {:#x}",
                    algorithm.name, algorithm.page_size, algorithm.min_program_length
                ));
            }

            // Double buffering streams whole program units.
            if algorithm.page_buffers.len() == 2
                && algorithm.page_size % algorithm.min_program_length != 0
            {
                return Err(format!(
                    "flash algorithm `{}`: page size {:#x} is not a multiple of the minimum program length {:#x}",
                    algorithm.name, algorithm.page_size, algorithm.min_program_length
                ));
            }
        }

        Ok(())
    }

    /// Checks the geometry of all programmable regions.
    fn validate_nvm_regions(&self) -> Result<(), String> {
        for variant in &self.variants {
            let programmable: Vec<&NvmRegion> = variant
                .nvm_regions()
                .filter(|region| region.algorithm.is_some())
                .collect();

            for (index, region) in programmable.iter().enumerate() {
                let name = region.name.as_deref().unwrap_or("<unnamed>");

                if region.page_size == 0 || region.sector_size == 0 {
                    return Err(format!(
                        "Variant {}, region {} has an empty page or sector size",
                        variant.name, name
                    ));
                }

                if region.range.start % region.page_size as u64 != 0 {
                    return Err(format!(
                        "Variant {}, region {} starts at {:#x}, which is not page aligned",
                        variant.name, name, region.range.start
                    ));
                }

                if region.len() % region.sector_size != 0 {
                    return Err(format!(
                        "Variant {}, region {} has a length of {:#x}, which is not a multiple of the sector size",
                        variant.name,
                        name,
                        region.len()
                    ));
                }

                if let Some(algorithm) = region
                    .algorithm
                    .as_ref()
                    .and_then(|algorithm| self.get_algorithm(algorithm))
                {
                    if algorithm.page_size != region.page_size {
                        return Err(format!(
                            "Variant {}, region {} has page size {:#x}, but algorithm `{}` uses {:#x}",
                            variant.name, name, region.page_size, algorithm.name, algorithm.page_size
                        ));
                    }
                }

                if let Some(other) = programmable[index + 1..]
                    .iter()
                    .find(|other| other.range.intersects_range(&region.range))
                {
                    return Err(format!(
                        "Variant {}, regions {} and {} overlap",
                        variant.name,
                        name,
                        other.name.as_deref().unwrap_or("<unnamed>")
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{MemoryRegion, RamRegion};

    fn family() -> ChipFamily {
        ChipFamily {
            name: "TEST".to_string(),
            manufacturer: None,
            instruction_set: InstructionSet::Thumb2,
            variants: vec![Chip {
                name: "TESTxA".to_string(),
                memory_map: vec![
                    MemoryRegion::Ram(RamRegion {
                        name: None,
                        range: 0x2000_0000..0x2001_0000,
                    }),
                    MemoryRegion::Nvm(NvmRegion {
                        name: Some("Flash".to_string()),
                        range: 0x0..0x1_0000,
                        page_size: 0x800,
                        sector_size: 0x2000,
                        is_boot_memory: true,
                        is_default: true,
                        algorithm: Some("algo".to_string()),
                    }),
                ],
                flash_algorithms: vec!["algo".to_string()],
            }],
            flash_algorithms: vec![RawFlashAlgorithm {
                name: "algo".to_string(),
                pc_program_page: 0x21,
                page_size: 0x800,
                min_program_length: 0x800,
                ..Default::default()
            }],
            post_connect: vec![],
            source: TargetDescriptionSource::BuiltIn,
        }
    }

    fn flash_region(family: &mut ChipFamily) -> &mut NvmRegion {
        match &mut family.variants[0].memory_map[1] {
            MemoryRegion::Nvm(region) => region,
            MemoryRegion::Ram(_) => unreachable!(),
        }
    }

    #[test]
    fn valid_family() {
        assert_eq!(family().validate(), Ok(()));
    }

    #[test]
    fn unknown_algorithm() {
        let mut family = family();
        flash_region(&mut family).algorithm = Some("missing".to_string());

        assert!(family.validate().unwrap_err().contains("missing"));
    }

    #[test]
    fn duplicate_variant() {
        let mut family = family();
        let variant = family.variants[0].clone();
        family.variants.push(variant);

        assert!(family.validate().unwrap_err().contains("multiple times"));
    }

    #[test]
    fn unaligned_region_start() {
        let mut family = family();
        flash_region(&mut family).range = 0x400..0x2400;

        assert!(family.validate().unwrap_err().contains("page aligned"));
    }

    #[test]
    fn partial_sector() {
        let mut family = family();
        flash_region(&mut family).range = 0x0..0x3000;

        assert!(family.validate().unwrap_err().contains("sector size"));
    }

    #[test]
    fn overlapping_regions() {
        let mut family = family();
        let mut second = flash_region(&mut family).clone();
        second.name = Some("Alias".to_string());
        second.range = 0x8000..0x1_2000;
        family.variants[0]
            .memory_map
            .push(MemoryRegion::Nvm(second));

        assert!(family.validate().unwrap_err().contains("overlap"));
    }

    #[test]
    fn too_many_page_buffers() {
        let mut family = family();
        family.flash_algorithms[0].page_buffers = vec![0x2000_1000, 0x2000_1800, 0x2000_2000];

        assert!(family.validate().unwrap_err().contains("page buffers"));
    }

    #[test]
    fn page_size_not_multiple_of_program_length() {
        let mut family = family();
        family.flash_algorithms[0].min_program_length = 0x300;
        family.flash_algorithms[0].page_buffers = vec![0x2000_1000, 0x2000_1800];

        assert!(family.validate().unwrap_err().contains("not a multiple"));
    }

    #[test]
    fn single_buffer_allows_partial_program_units() {
        let mut family = family();
        family.flash_algorithms[0].min_program_length = 0x300;
        family.flash_algorithms[0].page_buffers = vec![0x2000_1000];

        assert_eq!(family.validate(), Ok(()));

        family.flash_algorithms[0].min_program_length = 0x1000;
        assert!(family.validate().unwrap_err().contains("does not fit"));
    }

    #[test]
    fn thumb_return_address() {
        assert_eq!(InstructionSet::Thumb2.return_address(0x2000_0000), 0x2000_0001);
        assert_eq!(InstructionSet::A32.return_address(0x2000_0000), 0x2000_0000);
    }
}
