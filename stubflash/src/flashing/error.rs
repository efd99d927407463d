#![allow(missing_docs)]

use std::ops::Range;
use std::time::Duration;

use thiserror::Error;

use crate::error;

/// Describes any error that happened during the or in preparation for the flashing procedure.
#[derive(Error, Debug)]
pub enum FlashError {
    // Target description and layout
    #[error("No non-volatile memory region contains the address {address:#010x}.")]
    NoRegion { address: u64 },
    #[error("The range {start:#010x}..{end:#010x} crosses the boundary of a flash region.")]
    CrossesRegionBoundary { start: u64, end: u64 },
    #[error("The flash region {start:#010x}..{end:#010x} has no flash algorithm.")]
    NoFlashAlgorithm { start: u64, end: u64 },
    #[error("The flash algorithm '{name}' is not part of the target description.")]
    AlgorithmNotFound { name: String },
    #[error("Data for address {0:#010x} overlaps with data added before.")]
    DataOverlap(u64),

    // Algorithm image does not fit the chip
    #[error("The flash algorithm '{name}' needs RAM at {required:#010x?}, which is not available.")]
    InsufficientRam { name: String, required: Range<u64> },
    #[error("The stack of flash algorithm '{name}' ends at {stack_top:#010x}, which leaves too little room above its image ending at {image_end:#010x}.")]
    InvalidStack {
        name: String,
        stack_top: u64,
        image_end: u64,
    },
    #[error("Invalid page buffers for flash algorithm '{name}': {reason}")]
    InvalidPageBuffers { name: String, reason: String },
    #[error("Page size {size:#x} can not be programmed in chunks of {min_program_length:#x} bytes.")]
    InvalidPageSize { size: u32, min_program_length: u32 },
    #[error("The value {0:#x} does not fit into a core register.")]
    RegisterValueNotSupported(u64),

    // Loading and calling the algorithm
    #[error("The RAM contents at {address:#010x} did not match the flash algorithm after loading it.")]
    AlgorithmNotLoaded { address: u64 },
    #[error("The flash algorithm '{resident}' is still initialized and can not be replaced.")]
    AlgorithmStillActive { resident: String },
    #[error("The '{0}' routine is not supported with the given flash algorithm.")]
    UnsupportedOperation(&'static str),
    #[error("The '{name}' routine was called before the flash algorithm was initialized.")]
    InvalidCallSequence { name: &'static str },
    #[error("The core has to be halted before a flash algorithm routine can be called.")]
    CoreNotHalted,
    #[error("The '{name}' routine did not return within {timeout:?}.")]
    StubTimeout { name: &'static str, timeout: Duration },
    #[error("The execution of '{name}' failed with code {code}.")]
    RoutineCallFailed { name: &'static str, code: u32 },

    // Stub reported a failure
    #[error("Erasing the sector at {sector_address:#010x} failed with code {code}. Perhaps your chip has write protected sectors?")]
    EraseFailed { sector_address: u64, code: u32 },
    #[error("The chip erase failed with code {code}.")]
    ChipEraseFailed { code: u32 },
    #[error("Programming page {page} at {address:#010x} failed with code {code}.")]
    ProgramFailed { page: usize, address: u64, code: u32 },
    #[error("The flash contents at {address:#010x} do not match the programmed data.")]
    VerifyFailed { address: u64 },

    #[error(transparent)]
    Core(#[from] error::Error),
}
