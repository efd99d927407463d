use crate::config::RegistryError;
use crate::memory::MemoryNotAlignedError;
use thiserror::Error;

/// Errors reported by the debug transport underneath the flashing engine.
#[derive(Error, Debug)]
pub enum Error {
    /// An operation on the target did not finish in time.
    #[error("The operation timed out")]
    Timeout,
    /// A memory access did not respect the required alignment.
    #[error(transparent)]
    MemoryNotAligned(#[from] MemoryNotAlignedError),
    /// A hardware breakpoint was requested, but all units are in use.
    #[error("All {units} hardware breakpoint units are in use")]
    BreakpointsExhausted {
        /// Number of units provided by the core.
        units: u32,
    },
    /// The core register with the given id does not exist.
    #[error("Core register {0:#x} does not exist")]
    UnknownRegister(u16),
    /// The requested chip description could not be loaded.
    #[error("Unable to load specification for chip")]
    ChipNotFound(#[from] RegistryError),
    /// Any other error reported by the probe.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
