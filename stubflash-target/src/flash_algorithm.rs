use super::flash_properties::FlashProperties;
use crate::serialize::{deserialize_words, hex_u_int, serialize_words};

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// The raw flash algorithm is the description of a flash algorithm,
/// as it is read from a target description.
///
/// The image is address-fixed: it must be placed at `load_address`, and all
/// other addresses (`static_base`, `begin_stack`, `begin_data`,
/// `page_buffers`) are absolute. Entry points are offsets relative to
/// `load_address`.
///
/// Before it can be used for flashing, it has to be checked against the RAM
/// of a specific chip, which happens when the engine assembles it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFlashAlgorithm {
    /// The name of the flash algorithm.
    pub name: String,
    /// The description of the algorithm.
    #[serde(default)]
    pub description: String,
    /// Whether this flash algorithm is the default one or not.
    #[serde(default)]
    pub default: bool,
    /// Address the image has to be loaded at.
    #[serde(serialize_with = "hex_u_int")]
    pub load_address: u64,
    /// The machine code of the algorithm, as little endian 32-bit words.
    #[serde(
        serialize_with = "serialize_words",
        deserialize_with = "deserialize_words"
    )]
    pub instructions: Vec<u32>,
    /// Number of bytes after the code which have to be zeroed before the first call.
    #[serde(default)]
    pub zero_init_size: u32,
    /// Offset of the `Init()` entry point. Optional.
    #[serde(default)]
    pub pc_init: Option<u32>,
    /// Offset of the `UnInit()` entry point. Optional.
    #[serde(default)]
    pub pc_uninit: Option<u32>,
    /// Offset of the `ProgramPage()` entry point.
    #[serde(serialize_with = "hex_u_int")]
    pub pc_program_page: u32,
    /// Offset of the `EraseSector()` entry point. Optional.
    #[serde(default)]
    pub pc_erase_sector: Option<u32>,
    /// Offset of the `EraseAll()` entry point. Optional.
    #[serde(default)]
    pub pc_erase_all: Option<u32>,
    /// Value loaded into R9 before each call.
    #[serde(serialize_with = "hex_u_int")]
    pub static_base: u64,
    /// Initial stack pointer.
    #[serde(serialize_with = "hex_u_int")]
    pub begin_stack: u64,
    /// Start of the data area, used as page buffer if none are declared.
    #[serde(serialize_with = "hex_u_int")]
    pub begin_data: u64,
    /// Size of a page handed to `ProgramPage()`.
    #[serde(serialize_with = "hex_u_int")]
    pub page_size: u32,
    /// Granularity of a single programming operation.
    #[serde(serialize_with = "hex_u_int")]
    pub min_program_length: u32,
    /// Addresses of the page buffers in RAM. Up to two.
    #[serde(default)]
    pub page_buffers: Vec<u64>,
    /// The properties of the flash on the device.
    #[serde(default)]
    pub flash_properties: FlashProperties,
}

impl RawFlashAlgorithm {
    /// Size of the code in bytes.
    pub fn code_size(&self) -> u64 {
        self.instructions.len() as u64 * 4
    }

    /// RAM occupied by the image, including the zero initialised tail.
    pub fn image_range(&self) -> Range<u64> {
        let end = self.load_address + self.code_size() + self.zero_init_size as u64;
        self.load_address..end
    }

    /// Returns the first instruction word, if any.
    pub fn header(&self) -> Option<u32> {
        self.instructions.first().copied()
    }

    /// Normalises an entry point: an offset of zero means the entry is absent.
    pub fn entry_point(offset: Option<u32>) -> Option<u32> {
        offset.filter(|&offset| offset != 0)
    }

    /// Absolute address of an entry point.
    pub fn entry_address(&self, offset: u32) -> u64 {
        self.load_address + offset as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn algorithm() -> RawFlashAlgorithm {
        RawFlashAlgorithm {
            name: "test".to_string(),
            load_address: 0x2000_0000,
            instructions: vec![0xe00a_be00, 0x0000_4770, 0x1234_5678],
            zero_init_size: 8,
            pc_program_page: 0x5,
            page_size: 0x800,
            min_program_length: 0x800,
            ..Default::default()
        }
    }

    #[test]
    fn image_range_includes_zero_init() {
        let algo = algorithm();

        assert_eq!(algo.code_size(), 12);
        assert_eq!(algo.image_range(), 0x2000_0000..0x2000_0014);
        assert_eq!(algo.header(), Some(0xe00a_be00));
        assert_eq!(algo.entry_address(0x19d), 0x2000_019d);
    }

    #[test]
    fn zero_entry_is_absent() {
        assert_eq!(RawFlashAlgorithm::entry_point(Some(0)), None);
        assert_eq!(RawFlashAlgorithm::entry_point(None), None);
        assert_eq!(RawFlashAlgorithm::entry_point(Some(0x2c1)), Some(0x2c1));
    }

    #[test]
    fn instructions_from_base64() {
        let yaml = r#"
name: blob
load_address: 0x20000000
instructions: AL4K4HBHAAA=
pc_program_page: 0x21
static_base: 0x20000100
begin_stack: 0x20000400
begin_data: 0x20001000
page_size: 0x800
min_program_length: 0x800
"#;

        let algo: RawFlashAlgorithm = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(algo.instructions, vec![0xe00a_be00, 0x0000_4770]);
        assert_eq!(algo.pc_init, None);
        assert_eq!(algo.flash_properties, FlashProperties::default());
    }

    #[test]
    fn truncated_instructions_are_rejected() {
        let yaml = r#"
name: blob
load_address: 0x20000000
instructions: AL4K
pc_program_page: 0x21
static_base: 0x20000100
begin_stack: 0x20000400
begin_data: 0x20001000
page_size: 0x800
min_program_length: 0x800
"#;

        let result: Result<RawFlashAlgorithm, _> = serde_yaml::from_str(yaml);

        assert!(result.is_err());
    }
}
