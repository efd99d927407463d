use super::FlashError;
use crate::config::{FlashProperties, MemoryRange, MemoryRegion, RawFlashAlgorithm};
use crate::core::InstructionSet;
use std::ops::Range;

/// A flash algorithm, which has been assembled for a specific
/// chip.
///
/// To create a [FlashAlgorithm], call the [`assemble`] function.
///
/// [`assemble`]: FlashAlgorithm::assemble
#[derive(Debug, Default, Clone)]
pub struct FlashAlgorithm {
    /// The name of the flash algorithm.
    pub name: String,
    /// Whether this flash algorithm is the default one or not.
    pub default: bool,
    /// Memory address where the flash algo instructions will be loaded to.
    pub load_address: u64,
    /// List of 32-bit words containing the code for the algo.
    pub instructions: Vec<u32>,
    /// Number of zero bytes written right after the instructions.
    pub zero_init_size: u32,
    /// Address of the `Init()` entry point. Optional.
    pub pc_init: Option<u64>,
    /// Address of the `UnInit()` entry point. Optional.
    pub pc_uninit: Option<u64>,
    /// Address of the `ProgramPage()` entry point.
    pub pc_program_page: u64,
    /// Address of the `EraseSector()` entry point. Optional.
    pub pc_erase_sector: Option<u64>,
    /// Address of the `EraseAll()` entry point. Optional.
    pub pc_erase_all: Option<u64>,
    /// Initial value of the R9 register for calling flash algo entry points, which
    /// determines where the position-independent data resides.
    pub static_base: u64,
    /// Initial value of the stack pointer when calling any flash algo API.
    pub begin_stack: u64,
    /// A list of base addresses for page buffers. The buffers are at
    /// least as large as `page_size`. If 2 buffers are included in
    /// the list, then double buffered programming will be enabled.
    pub page_buffers: Vec<u64>,
    /// Size of a page handed to `ProgramPage()`.
    pub page_size: u32,
    /// Granularity of a single programming operation.
    pub min_program_length: u32,
    /// The properties of the flash on the device.
    pub flash_properties: FlashProperties,
    /// Instruction set the algorithm is written in.
    pub instruction_set: InstructionSet,
    /// True if the image starts with a breakpoint instruction, so returning
    /// to `load_address` halts the core without a hardware breakpoint.
    pub has_return_breakpoint: bool,
}

impl FlashAlgorithm {
    /// Minimum room between the end of the image and the stack top.
    pub const FLASH_ALGO_MIN_STACK_SIZE: u64 = 512;

    /// Constructs a complete flash algorithm, tailored to the RAM of the chip.
    ///
    /// Fails if the image, its stack or its page buffers do not fit into
    /// `memory_map`, or if the page geometry can not be programmed.
    pub fn assemble(
        raw: &RawFlashAlgorithm,
        memory_map: &[MemoryRegion],
        instruction_set: InstructionSet,
    ) -> Result<Self, FlashError> {
        let image = raw.image_range();

        let ram = memory_map
            .iter()
            .filter_map(MemoryRegion::as_ram_region)
            .find(|ram| ram.range.contains(&raw.load_address))
            .filter(|ram| ram.range.contains_range(&image))
            .ok_or_else(|| FlashError::InsufficientRam {
                name: raw.name.clone(),
                required: image.clone(),
            })?;

        tracing::debug!(
            "Flash algorithm {} occupies {:#010x?} in RAM {:#010x?}",
            raw.name,
            image,
            ram.range
        );

        let stack_top = raw.begin_stack & !0x3;
        if stack_top < image.end + Self::FLASH_ALGO_MIN_STACK_SIZE || stack_top > ram.range.end {
            return Err(FlashError::InvalidStack {
                name: raw.name.clone(),
                stack_top,
                image_end: image.end,
            });
        }

        if raw.min_program_length == 0 || raw.page_size == 0 || raw.page_size % 4 != 0 {
            return Err(FlashError::InvalidPageSize {
                size: raw.page_size,
                min_program_length: raw.min_program_length,
            });
        }

        let page_buffers = if raw.page_buffers.is_empty() {
            vec![raw.begin_data]
        } else {
            raw.page_buffers.clone()
        };

        if page_buffers.len() > 1 {
            if raw.page_size % raw.min_program_length != 0 {
                return Err(FlashError::InvalidPageSize {
                    size: raw.page_size,
                    min_program_length: raw.min_program_length,
                });
            }
        } else if raw.min_program_length > raw.page_size {
            return Err(FlashError::InvalidPageSize {
                size: raw.page_size,
                min_program_length: raw.min_program_length,
            });
        }

        Self::check_page_buffers(
            &raw.name,
            &page_buffers,
            raw.page_size as u64,
            image.start..stack_top,
            memory_map,
        )?;

        let pc_program_page = RawFlashAlgorithm::entry_point(Some(raw.pc_program_page))
            .ok_or(FlashError::UnsupportedOperation("program_page"))?;

        let entry = |offset: Option<u32>| {
            RawFlashAlgorithm::entry_point(offset).map(|offset| raw.entry_address(offset))
        };

        Ok(FlashAlgorithm {
            name: raw.name.clone(),
            default: raw.default,
            load_address: raw.load_address,
            instructions: raw.instructions.clone(),
            zero_init_size: raw.zero_init_size,
            pc_init: entry(raw.pc_init),
            pc_uninit: entry(raw.pc_uninit),
            pc_program_page: raw.entry_address(pc_program_page),
            pc_erase_sector: entry(raw.pc_erase_sector),
            pc_erase_all: entry(raw.pc_erase_all),
            static_base: raw.static_base,
            begin_stack: stack_top,
            page_buffers,
            page_size: raw.page_size,
            min_program_length: raw.min_program_length,
            flash_properties: raw.flash_properties.clone(),
            instruction_set,
            has_return_breakpoint: raw
                .header()
                .map_or(false, |word| is_breakpoint(word, instruction_set)),
        })
    }

    /// Each buffer has to lie in RAM, outside of the image and stack, and
    /// must not overlap the other buffer.
    fn check_page_buffers(
        name: &str,
        page_buffers: &[u64],
        page_size: u64,
        reserved: Range<u64>,
        memory_map: &[MemoryRegion],
    ) -> Result<(), FlashError> {
        let invalid = |reason: String| FlashError::InvalidPageBuffers {
            name: name.to_string(),
            reason,
        };

        let ranges: Vec<Range<u64>> = page_buffers
            .iter()
            .map(|&address| address..address + page_size)
            .collect();

        for (index, buffer) in ranges.iter().enumerate() {
            let in_ram = memory_map
                .iter()
                .filter_map(MemoryRegion::as_ram_region)
                .any(|ram| ram.range.contains_range(buffer));
            if !in_ram {
                return Err(invalid(format!("buffer {buffer:#010x?} is not in RAM")));
            }

            if buffer.intersects_range(&reserved) {
                return Err(invalid(format!(
                    "buffer {buffer:#010x?} overlaps the code, data or stack at {reserved:#010x?}"
                )));
            }

            if let Some(other) = ranges[index + 1..]
                .iter()
                .find(|other| other.intersects_range(buffer))
            {
                return Err(invalid(format!(
                    "buffers {buffer:#010x?} and {other:#010x?} overlap"
                )));
            }
        }

        Ok(())
    }

    /// RAM occupied by the code and its zero initialised data.
    pub fn image_range(&self) -> Range<u64> {
        let end = self.load_address
            + self.instructions.len() as u64 * 4
            + self.zero_init_size as u64;
        self.load_address..end
    }

    /// Value for LR, so the stub returns onto the breakpoint at `load_address`.
    pub fn return_address(&self) -> u64 {
        self.instruction_set.return_address(self.load_address)
    }

    /// True if two page buffers are available.
    pub fn double_buffering_supported(&self) -> bool {
        self.page_buffers.len() > 1
    }
}

/// Checks for `BKPT` (Thumb, in the lower halfword) or its A32 encoding.
fn is_breakpoint(word: u32, instruction_set: InstructionSet) -> bool {
    match instruction_set {
        InstructionSet::Thumb2 => word & 0xff00 == 0xbe00,
        InstructionSet::A32 => word & 0xfff0_00f0 == 0xe120_0070,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::RamRegion;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn ram(range: Range<u64>) -> Vec<MemoryRegion> {
        vec![MemoryRegion::Ram(RamRegion { name: None, range })]
    }

    fn raw() -> RawFlashAlgorithm {
        RawFlashAlgorithm {
            name: "test".to_string(),
            load_address: 0x2000_0000,
            instructions: vec![0xe00a_be00; 0x40],
            pc_init: Some(0x11),
            pc_uninit: Some(0),
            pc_program_page: 0x21,
            pc_erase_sector: Some(0x31),
            static_base: 0x2000_0100,
            begin_stack: 0x2000_0400,
            begin_data: 0x2000_1000,
            page_size: 0x800,
            min_program_length: 0x800,
            page_buffers: vec![0x2000_1000, 0x2000_1800],
            ..Default::default()
        }
    }

    #[test]
    fn entry_points_become_absolute() {
        let algo = FlashAlgorithm::assemble(
            &raw(),
            &ram(0x2000_0000..0x2001_0000),
            InstructionSet::Thumb2,
        )
        .unwrap();

        assert_eq!(algo.pc_init, Some(0x2000_0011));
        assert_eq!(algo.pc_uninit, None);
        assert_eq!(algo.pc_program_page, 0x2000_0021);
        assert_eq!(algo.pc_erase_sector, Some(0x2000_0031));
        assert_eq!(algo.pc_erase_all, None);
        assert_eq!(algo.return_address(), 0x2000_0001);
        assert!(algo.has_return_breakpoint);
        assert!(algo.double_buffering_supported());
    }

    #[test]
    fn image_outside_ram() {
        let result = FlashAlgorithm::assemble(
            &raw(),
            &ram(0x2000_0000..0x2000_0080),
            InstructionSet::Thumb2,
        );

        assert!(matches!(
            result,
            Err(FlashError::InsufficientRam { required, .. }) if required == (0x2000_0000..0x2000_0100)
        ));
    }

    #[test]
    fn stack_too_small() {
        let mut raw = raw();
        raw.begin_stack = 0x2000_0200;

        let result =
            FlashAlgorithm::assemble(&raw, &ram(0x2000_0000..0x2001_0000), InstructionSet::Thumb2);

        assert!(matches!(
            result,
            Err(FlashError::InvalidStack {
                stack_top: 0x2000_0200,
                image_end: 0x2000_0100,
                ..
            })
        ));
    }

    #[test]
    fn stack_is_word_aligned() {
        let mut raw = raw();
        raw.begin_stack = 0x2000_0403;

        let algo =
            FlashAlgorithm::assemble(&raw, &ram(0x2000_0000..0x2001_0000), InstructionSet::Thumb2)
                .unwrap();

        assert_eq!(algo.begin_stack, 0x2000_0400);
    }

    #[test_case(vec![0x2000_1000, 0x2000_1400]; "buffers overlap each other")]
    #[test_case(vec![0x2000_0200, 0x2000_1800]; "buffer overlaps the stack")]
    #[test_case(vec![0x2000_1000, 0x2000_f800 + 0x400]; "buffer leaves RAM")]
    fn invalid_page_buffers(page_buffers: Vec<u64>) {
        let mut raw = raw();
        raw.page_buffers = page_buffers;

        let result =
            FlashAlgorithm::assemble(&raw, &ram(0x2000_0000..0x2001_0000), InstructionSet::Thumb2);

        assert!(matches!(result, Err(FlashError::InvalidPageBuffers { .. })));
    }

    #[test]
    fn begin_data_is_the_fallback_buffer() {
        let mut raw = raw();
        raw.page_buffers = vec![];

        let algo =
            FlashAlgorithm::assemble(&raw, &ram(0x2000_0000..0x2001_0000), InstructionSet::Thumb2)
                .unwrap();

        assert_eq!(algo.page_buffers, vec![0x2000_1000]);
        assert!(!algo.double_buffering_supported());
    }

    #[test]
    fn single_buffer_takes_partial_program_units() {
        let mut raw = raw();
        raw.min_program_length = 0x300;
        raw.page_buffers = vec![0x2000_1000];

        let algo =
            FlashAlgorithm::assemble(&raw, &ram(0x2000_0000..0x2001_0000), InstructionSet::Thumb2)
                .unwrap();

        assert_eq!(algo.min_program_length, 0x300);
        assert!(!algo.double_buffering_supported());
    }

    #[test]
    fn double_buffering_needs_whole_program_units() {
        let mut raw = raw();
        raw.min_program_length = 0x300;

        let result =
            FlashAlgorithm::assemble(&raw, &ram(0x2000_0000..0x2001_0000), InstructionSet::Thumb2);

        assert!(matches!(
            result,
            Err(FlashError::InvalidPageSize {
                size: 0x800,
                min_program_length: 0x300
            })
        ));
    }

    #[test_case(0xe00a_be00, InstructionSet::Thumb2, true; "thumb bkpt")]
    #[test_case(0x4770_4770, InstructionSet::Thumb2, false; "thumb bx lr")]
    #[test_case(0xe120_0070, InstructionSet::A32, true; "arm bkpt")]
    #[test_case(0xe12f_ff1e, InstructionSet::A32, false; "arm bx lr")]
    fn breakpoint_header(word: u32, instruction_set: InstructionSet, expected: bool) {
        assert_eq!(is_breakpoint(word, instruction_set), expected);
    }
}
