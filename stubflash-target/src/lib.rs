//! Target description schema
//!
//! Flashing a chip through a flash algorithm needs target specific data: the
//! memory map of the chip, the address-fixed algorithm images that program
//! its non-volatile memory, and register writes that prepare the chip for
//! debugging.
//!
//! This crate contains the schema structs for that data. They can be built in
//! Rust or read from YAML target description files.
//!
#![warn(missing_docs)]

mod chip;
mod chip_family;
mod fixup;
mod flash_algorithm;
mod flash_properties;
mod memory;
pub(crate) mod serialize;

pub use chip::Chip;
pub use chip_family::{ChipFamily, InstructionSet, TargetDescriptionSource};
pub use fixup::RegisterFixup;
pub use flash_algorithm::RawFlashAlgorithm;
pub use flash_properties::FlashProperties;
pub use memory::{MemoryRange, MemoryRegion, NvmRegion, PageInfo, RamRegion, SectorInfo};
