use crate::serialize::hex_u_int;
use serde::{Deserialize, Serialize};

/// A single 32-bit register write performed right after attaching to a chip.
///
/// Families use these to put the chip into a debug friendly state, e.g. by
/// freezing watchdogs and peripheral clocks while the core is halted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterFixup {
    /// Address of the register.
    #[serde(serialize_with = "hex_u_int")]
    pub address: u64,
    /// Value written to the register.
    #[serde(serialize_with = "hex_u_int")]
    pub value: u32,
    /// What the write does, for diagnostics.
    #[serde(default)]
    pub description: Option<String>,
}

impl RegisterFixup {
    /// Creates a fixup without a description.
    pub fn new(address: u64, value: u32) -> Self {
        Self {
            address,
            value,
            description: None,
        }
    }

    /// Attaches a description to the fixup.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl std::fmt::Display for RegisterFixup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x} <- {:#x}", self.address, self.value)?;
        if let Some(description) = &self.description {
            write!(f, " ({description})")?;
        }
        Ok(())
    }
}
