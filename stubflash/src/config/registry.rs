//! Internal target registry

use super::target::Target;
use stubflash_target::{ChipFamily, TargetDescriptionSource};

use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Error type for all errors which occur when working
/// with the internal registry of targets.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The requested chip was not found in the registry.
    #[error("The requested chip '{0}' was not found in the list of known targets.")]
    ChipNotFound(String),
    /// Multiple chips match the requested name.
    #[error("Found multiple chips matching '{0}', unable to select a single chip.")]
    ChipNotUnique(String),
    /// An IO error which occurred when trying to read a target description file.
    #[error("An IO error was encountered")]
    Io(#[from] std::io::Error),
    /// An error occurred while deserializing a YAML target description file.
    #[error("Deserializing the yaml encountered an error")]
    Yaml(#[from] serde_yaml::Error),
    /// Unable to use the given chip family, it fails validation.
    #[error("Invalid chip family definition ({}): {1}", .0.name)]
    InvalidChipFamilyDefinition(Box<ChipFamily>, String),
}

/// Registry of all available targets.
pub struct Registry {
    /// All the available chips.
    families: Vec<ChipFamily>,
}

impl Registry {
    /// Creates a registry holding the families compiled into the binary.
    #[cfg(feature = "builtin-targets")]
    pub fn from_builtin_families() -> Self {
        let families = crate::vendor::builtin_families();

        for family in &families {
            if let Err(error) = family.validate() {
                tracing::warn!("Built-in family {} failed validation: {}", family.name, error);
            }
        }

        Self { families }
    }

    /// Creates a registry holding the families compiled into the binary.
    #[cfg(not(feature = "builtin-targets"))]
    pub fn from_builtin_families() -> Self {
        Self::empty()
    }

    /// Creates a registry without any families.
    pub fn empty() -> Self {
        Self { families: vec![] }
    }

    /// All families known to the registry.
    pub fn families(&self) -> &[ChipFamily] {
        &self.families
    }

    /// Looks up a chip variant by name.
    ///
    /// An exact (case insensitive) match wins. Otherwise the name has to be
    /// the prefix of exactly one variant.
    pub fn get_target_by_name(&self, name: impl AsRef<str>) -> Result<Target, RegistryError> {
        let name = name.as_ref();
        tracing::debug!("Searching registry for chip with name {}", name);

        let lowercase = name.to_ascii_lowercase();
        let mut partial_matches = Vec::new();

        for family in &self.families {
            for variant in family.variants() {
                let variant_name = variant.name.to_ascii_lowercase();
                if variant_name == lowercase {
                    tracing::debug!("Exact match for chip name: {}", variant.name);
                    return Ok(Target::new(family, variant));
                }
                if variant_name.starts_with(&lowercase) {
                    partial_matches.push((family, variant));
                }
            }
        }

        match partial_matches.as_slice() {
            [] => Err(RegistryError::ChipNotFound(name.to_string())),
            [(family, variant)] => {
                tracing::warn!(
                    "Found chip {} which matches given partial name {}. Consider specifying its full name.",
                    variant.name,
                    name,
                );
                Ok(Target::new(family, variant))
            }
            _ => Err(RegistryError::ChipNotUnique(name.to_string())),
        }
    }

    /// Adds a family, replacing a known family of the same name.
    pub fn add_target_family(&mut self, family: ChipFamily) -> Result<String, RegistryError> {
        family
            .validate()
            .map_err(|e| RegistryError::InvalidChipFamilyDefinition(Box::new(family.clone()), e))?;

        let family_name = family.name.clone();

        self.families
            .retain(|old_family| !old_family.name.eq_ignore_ascii_case(&family_name));
        self.families.push(family);

        Ok(family_name)
    }

    /// Parses a family from a YAML string and adds it.
    pub fn add_target_family_from_yaml(&mut self, yaml: &str) -> Result<String, RegistryError> {
        let mut family: ChipFamily = serde_yaml::from_str(yaml)?;
        family.source = TargetDescriptionSource::External;
        self.add_target_family(family)
    }

    /// Reads a family from a YAML target description file and adds it.
    pub fn add_target_from_yaml(&mut self, path_to_yaml: &Path) -> Result<String, RegistryError> {
        let file = File::open(path_to_yaml)?;
        let mut family: ChipFamily = serde_yaml::from_reader(file)?;
        family.source = TargetDescriptionSource::External;
        self.add_target_family(family)
    }
}
