//! Target configuration structures.
//!
//! Built-in targets are compiled into the crate, more can be added at
//! runtime from YAML target description files.

mod registry;
mod target;

pub use registry::{Registry, RegistryError};
pub use stubflash_target::{
    Chip, ChipFamily, FlashProperties, InstructionSet, MemoryRange, MemoryRegion, NvmRegion,
    PageInfo, RamRegion, RawFlashAlgorithm, RegisterFixup, SectorInfo, TargetDescriptionSource,
};
pub use target::Target;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::path::Path;

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::from_builtin_families()));

/// Returns all the families known to the global registry.
pub fn families() -> Vec<ChipFamily> {
    REGISTRY.lock().families().to_vec()
}

/// Fetches a [`Target`] from the global registry by its name.
pub fn get_target_by_name(name: impl AsRef<str>) -> Result<Target, RegistryError> {
    REGISTRY.lock().get_target_by_name(name)
}

/// Parses a YAML target description file and adds its family to the global registry.
///
/// Returns the name of the added family.
pub fn add_target_from_yaml(path_to_yaml: &Path) -> Result<String, RegistryError> {
    REGISTRY.lock().add_target_from_yaml(path_to_yaml)
}
