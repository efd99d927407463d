use crate::serialize::{hex_range, hex_u_int};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Properties of the memory programmed by a flash algorithm.
///
/// Timeouts are given in milliseconds and bound how long the host waits for a
/// single stub call to return.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct FlashProperties {
    /// The range of memory handled by the algorithm.
    #[serde(serialize_with = "hex_range")]
    pub address_range: Range<u64>,
    /// The value of a byte in flash that was just erased.
    #[serde(serialize_with = "hex_u_int")]
    pub erased_byte_value: u8,
    /// Upper bound for a single `ProgramPage()` call.
    pub program_page_timeout: u32,
    /// Upper bound for a single `EraseSector()` call.
    pub erase_sector_timeout: u32,
    /// Upper bound for the `EraseAll()` call.
    pub erase_all_timeout: u32,
}

impl Default for FlashProperties {
    fn default() -> Self {
        FlashProperties {
            address_range: 0..0,
            erased_byte_value: 0xff,
            program_page_timeout: 1000,
            erase_sector_timeout: 2000,
            erase_all_timeout: 30_000,
        }
    }
}
