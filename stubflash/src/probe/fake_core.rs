//! A simulated Cortex-M core.
//!
//! [`FakeCore`] keeps a sparse memory, a register file and a set of hardware
//! breakpoints. Resuming the core "executes" the routine at the program
//! counter: a [`StubHandler`] decides what the routine does, and with
//! [`FakeCore::with_flash_emulation`] the flash algorithms of a target are
//! modelled on top of the memory. Every host access is recorded in a trace.
#![allow(missing_docs)] // Don't require docs for test code

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::ops::Range;
use std::time::Duration;

use crate::config::{MemoryRange, NvmRegion, Target};
use crate::core::{CoreInterface, InstructionSet, RegisterId, CORTEX_M_CORE_REGISTERS};
use crate::flashing::FlashAlgorithm;
use crate::memory::check_alignment;
use crate::{Error, MemoryInterface};

/// The FPB of a Cortex-M4 has six instruction comparators.
const DEFAULT_BREAKPOINT_UNITS: u32 = 6;

const REGISTER_COUNT: usize = 17;

/// A host operation, as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    MemoryWrite {
        address: u64,
        len: usize,
        /// True if a routine was executing while the write happened.
        core_running: bool,
    },
    RegisterWrite {
        register: RegisterId,
        value: u32,
    },
    Resume {
        pc: u32,
        args: [u32; 4],
    },
    StatusPolled {
        halted: bool,
    },
    Halt,
    BreakpointSet(u64),
    BreakpointCleared(u64),
}

/// A routine started by resuming the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubCall {
    /// Program counter at resume.
    pub pc: u32,
    /// R0 to R3 at resume.
    pub args: [u32; 4],
}

/// What a routine does once it was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubOutcome {
    /// Returns `result` in R0 after the status was polled `polls_until_halt` times.
    Return { result: u32, polls_until_halt: u32 },
    /// Never returns.
    Hang,
}

/// Decides the outcome of a routine call.
///
/// Returning `None` falls back to the flash emulation, or to an immediate
/// successful return if there is none.
pub type StubHandler = Box<dyn FnMut(&StubCall) -> Option<StubOutcome>>;

/// A flash algorithm modelled by the fake core.
struct EmulatedAlgorithm {
    algorithm: FlashAlgorithm,
    region: NvmRegion,
}

/// Side effect of an emulated routine on the flash contents.
enum FlashAction {
    None,
    Erase(Range<u64>),
    Program { address: u64, data: Vec<u8> },
}

/// This is a simulated core which can be used for mocking things in tests or for dry runs.
pub struct FakeCore {
    memory: BTreeMap<u64, u8>,
    /// Ranges which read as erased flash until written.
    erased: Vec<(Range<u64>, u8)>,
    registers: [u32; REGISTER_COUNT],
    instruction_set: InstructionSet,

    halted: bool,
    /// Remaining polls and result of the running routine. `None` while
    /// running means the routine never returns.
    completion: Option<(u32, u32)>,

    breakpoint_units: u32,
    breakpoints: BTreeSet<u64>,

    failing_writes: BTreeSet<u64>,
    failing_status: bool,

    handler: Option<StubHandler>,
    emulated: Vec<EmulatedAlgorithm>,
    resident: Option<usize>,

    trace: Vec<TraceEvent>,
    calls: Vec<StubCall>,
}

impl Debug for FakeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeCore")
            .field("halted", &self.halted)
            .field("registers", &self.registers)
            .field("breakpoints", &self.breakpoints)
            .field("calls", &self.calls.len())
            .finish_non_exhaustive()
    }
}

impl Default for FakeCore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCore {
    /// A halted core with zeroed memory, every routine returns 0 immediately.
    pub fn new() -> Self {
        FakeCore {
            memory: BTreeMap::new(),
            erased: Vec::new(),
            registers: [0; REGISTER_COUNT],
            instruction_set: InstructionSet::Thumb2,
            halted: true,
            completion: None,
            breakpoint_units: DEFAULT_BREAKPOINT_UNITS,
            breakpoints: BTreeSet::new(),
            failing_writes: BTreeSet::new(),
            failing_status: false,
            handler: None,
            emulated: Vec::new(),
            resident: None,
            trace: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// A core whose routines behave like the flash algorithms of `target`.
    ///
    /// Non-volatile regions read as erased. `EraseSector()` and `EraseAll()`
    /// erase the addressed sector or region, `ProgramPage()` clears bits
    /// like a NOR flash does. Calls with addresses outside the region of the
    /// algorithm return 1.
    pub fn with_flash_emulation(target: &Target) -> Self {
        let mut core = Self::new();
        core.instruction_set = target.instruction_set;

        for region in target.nvm_regions() {
            let Ok(raw) = target.flash_algorithm_for_region(region) else {
                continue;
            };

            match FlashAlgorithm::assemble(raw, &target.memory_map, target.instruction_set) {
                Ok(algorithm) => {
                    core.erased.push((
                        region.range.clone(),
                        algorithm.flash_properties.erased_byte_value,
                    ));
                    core.emulated.push(EmulatedAlgorithm {
                        algorithm,
                        region: region.clone(),
                    });
                }
                Err(error) => {
                    tracing::warn!("Not emulating flash algorithm {}: {}", raw.name, error)
                }
            }
        }

        core
    }

    /// Installs a handler which decides the outcome of every routine call.
    pub fn set_stub_handler(
        &mut self,
        handler: impl FnMut(&StubCall) -> Option<StubOutcome> + 'static,
    ) {
        self.handler = Some(Box::new(handler));
    }

    /// Limits the number of hardware breakpoints.
    pub fn set_breakpoint_units(&mut self, units: u32) {
        self.breakpoint_units = units;
    }

    /// Makes every host write touching `address` fail.
    pub fn fail_writes_to(&mut self, address: u64) {
        self.failing_writes.insert(address);
    }

    /// Makes every status poll fail while the core is running.
    pub fn fail_status_while_running(&mut self) {
        self.failing_status = true;
    }

    /// All host operations so far.
    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
        self.calls.clear();
    }

    /// All routine calls so far.
    pub fn calls(&self) -> &[StubCall] {
        &self.calls
    }

    /// Reads memory without going through the trace.
    pub fn memory(&self, address: u64, len: usize) -> Vec<u8> {
        (address..address + len as u64)
            .map(|address| self.byte(address))
            .collect()
    }

    /// Value of a register, without going through the trace.
    pub fn register(&self, id: RegisterId) -> u32 {
        self.registers
            .get(id.0 as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn breakpoints(&self) -> Vec<u64> {
        self.breakpoints.iter().copied().collect()
    }

    fn byte(&self, address: u64) -> u8 {
        if let Some(&value) = self.memory.get(&address) {
            return value;
        }

        self.erased
            .iter()
            .find(|(range, _)| range.contains(&address))
            .map_or(0, |(_, value)| *value)
    }

    fn store(&mut self, address: u64, data: &[u8]) -> Result<(), Error> {
        let range = address..address + data.len() as u64;
        if let Some(failing) = self.failing_writes.iter().find(|a| range.contains(a)) {
            return Err(anyhow::anyhow!("Write to {:#010x} failed", failing).into());
        }

        for (address, &value) in range.zip(data) {
            self.memory.insert(address, value);
        }

        self.trace.push(TraceEvent::MemoryWrite {
            address,
            len: data.len(),
            core_running: !self.halted,
        });

        Ok(())
    }

    fn register_index(id: RegisterId) -> Result<usize, Error> {
        let index = id.0 as usize;
        if index < REGISTER_COUNT {
            Ok(index)
        } else {
            Err(Error::UnknownRegister(id.0))
        }
    }

    /// True if returning from a routine stops the core.
    fn return_halts(&self) -> bool {
        let lr = CORTEX_M_CORE_REGISTERS.return_address().id;
        let address = self.register(lr) as u64 & !1;

        if self.breakpoints.contains(&address) {
            return true;
        }

        let word = u32::from_le_bytes([
            self.byte(address),
            self.byte(address + 1),
            self.byte(address + 2),
            self.byte(address + 3),
        ]);

        match self.instruction_set {
            InstructionSet::Thumb2 => word & 0xff00 == 0xbe00,
            InstructionSet::A32 => word & 0xfff0_00f0 == 0xe120_0070,
        }
    }

    fn finish(&mut self, result: u32) {
        let registers = &CORTEX_M_CORE_REGISTERS;
        let lr = self.register(registers.return_address().id);

        self.halted = true;
        self.completion = None;
        self.registers[0] = result;
        self.registers[registers.program_counter().id.0 as usize] = lr & !1;
    }

    fn emulate(&mut self, call: &StubCall) -> StubOutcome {
        if self.emulated.is_empty() {
            return StubOutcome::Return {
                result: 0,
                polls_until_halt: 0,
            };
        }

        let candidates = match self.resident {
            Some(index) => index..index + 1,
            None => 0..self.emulated.len(),
        };

        let pc = call.pc as u64;
        let [r0, r1, r2, _] = call.args;

        let mut outcome = None;
        for emulated in &self.emulated[candidates] {
            let algorithm = &emulated.algorithm;
            let region = &emulated.region;

            outcome = if Some(pc) == algorithm.pc_init || Some(pc) == algorithm.pc_uninit {
                Some((0, FlashAction::None))
            } else if Some(pc) == algorithm.pc_erase_all {
                Some((0, FlashAction::Erase(region.range.clone())))
            } else if Some(pc) == algorithm.pc_erase_sector {
                Some(match region.sector_info(r0 as u64) {
                    Some(sector) => (0, FlashAction::Erase(sector.address_range())),
                    None => (1, FlashAction::None),
                })
            } else if pc == algorithm.pc_program_page {
                let target = r0 as u64..r0 as u64 + r1 as u64;
                Some(
                    if region.range.contains_range(&target) && r1 <= algorithm.page_size {
                        let data = self.memory(r2 as u64, r1 as usize);
                        (
                            0,
                            FlashAction::Program {
                                address: target.start,
                                data,
                            },
                        )
                    } else {
                        (1, FlashAction::None)
                    },
                )
            } else {
                None
            };

            if outcome.is_some() {
                break;
            }
        }

        let (result, action) = outcome.unwrap_or_else(|| {
            tracing::warn!("No emulated routine at {:#010x}", pc);
            (1, FlashAction::None)
        });

        match action {
            FlashAction::None => {}
            FlashAction::Erase(range) => {
                let programmed: Vec<u64> = self.memory.range(range).map(|(a, _)| *a).collect();
                for address in programmed {
                    self.memory.remove(&address);
                }
            }
            FlashAction::Program { address, data } => {
                for (address, value) in (address..).zip(data) {
                    let old = self.byte(address);
                    self.memory.insert(address, old & value);
                }
            }
        }

        StubOutcome::Return {
            result,
            polls_until_halt: 1,
        }
    }
}

impl MemoryInterface for FakeCore {
    fn read_32(&mut self, address: u64, data: &mut [u32]) -> Result<(), Error> {
        check_alignment(address, 4)?;

        for (index, word) in data.iter_mut().enumerate() {
            let bytes = self.memory(address + index as u64 * 4, 4);
            *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }

        Ok(())
    }

    fn read_8(&mut self, address: u64, data: &mut [u8]) -> Result<(), Error> {
        data.copy_from_slice(&self.memory(address, data.len()));
        Ok(())
    }

    fn write_32(&mut self, address: u64, data: &[u32]) -> Result<(), Error> {
        check_alignment(address, 4)?;

        let bytes: Vec<u8> = data.iter().flat_map(|word| word.to_le_bytes()).collect();
        self.store(address, &bytes)?;

        if let Some(index) = self.emulated.iter().position(|emulated| {
            emulated.algorithm.load_address == address
                && emulated.algorithm.instructions.as_slice() == data
        }) {
            self.resident = Some(index);
        }

        Ok(())
    }

    fn write_8(&mut self, address: u64, data: &[u8]) -> Result<(), Error> {
        self.store(address, data)
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl CoreInterface for FakeCore {
    fn read_core_reg(&mut self, id: RegisterId) -> Result<u32, Error> {
        let index = Self::register_index(id)?;
        Ok(self.registers[index])
    }

    fn write_core_reg(&mut self, id: RegisterId, value: u32) -> Result<(), Error> {
        let index = Self::register_index(id)?;
        if !self.halted {
            return Err(anyhow::anyhow!("Core registers can only be written while halted").into());
        }

        self.registers[index] = value;
        self.trace.push(TraceEvent::RegisterWrite {
            register: id,
            value,
        });

        Ok(())
    }

    fn halt(&mut self, _timeout: Duration) -> Result<(), Error> {
        self.halted = true;
        self.completion = None;
        self.trace.push(TraceEvent::Halt);
        Ok(())
    }

    fn run(&mut self) -> Result<(), Error> {
        let call = StubCall {
            pc: self.registers[15],
            args: [
                self.registers[0],
                self.registers[1],
                self.registers[2],
                self.registers[3],
            ],
        };

        self.trace.push(TraceEvent::Resume {
            pc: call.pc,
            args: call.args,
        });
        self.calls.push(call);
        self.halted = false;

        let handled = self.handler.as_mut().and_then(|handler| handler(&call));
        let outcome = match handled {
            Some(outcome) => outcome,
            None => self.emulate(&call),
        };

        self.completion = match outcome {
            StubOutcome::Return {
                result,
                polls_until_halt,
            } if self.return_halts() => Some((polls_until_halt, result)),
            _ => None,
        };

        Ok(())
    }

    fn core_halted(&mut self) -> Result<bool, Error> {
        if !self.halted && self.failing_status {
            return Err(Error::Timeout);
        }

        if !self.halted {
            if let Some((polls, result)) = self.completion {
                if polls == 0 {
                    self.finish(result);
                } else {
                    self.completion = Some((polls - 1, result));
                }
            }
        }

        self.trace.push(TraceEvent::StatusPolled {
            halted: self.halted,
        });

        Ok(self.halted)
    }

    fn available_breakpoint_units(&mut self) -> Result<u32, Error> {
        Ok(self.breakpoint_units)
    }

    fn set_hw_breakpoint(&mut self, address: u64) -> Result<(), Error> {
        if !self.breakpoints.contains(&address)
            && self.breakpoints.len() as u32 >= self.breakpoint_units
        {
            return Err(Error::BreakpointsExhausted {
                units: self.breakpoint_units,
            });
        }

        self.breakpoints.insert(address);
        self.trace.push(TraceEvent::BreakpointSet(address));
        Ok(())
    }

    fn clear_hw_breakpoint(&mut self, address: u64) -> Result<(), Error> {
        self.breakpoints.remove(&address);
        self.trace.push(TraceEvent::BreakpointCleared(address));
        Ok(())
    }

    fn instruction_set(&mut self) -> Result<InstructionSet, Error> {
        Ok(self.instruction_set)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const PC: RegisterId = RegisterId(15);
    const LR: RegisterId = RegisterId(14);

    fn start(core: &mut FakeCore, pc: u32) {
        core.write_core_reg(PC, pc).unwrap();
        core.write_core_reg(LR, 0x2000_0001).unwrap();
        core.run().unwrap();
    }

    #[test]
    fn unaligned_word_access_is_rejected() {
        let mut core = FakeCore::new();

        assert!(matches!(
            core.write_word_32(0x2000_0002, 0),
            Err(Error::MemoryNotAligned(_))
        ));
    }

    #[test]
    fn routine_without_return_breakpoint_never_halts() {
        let mut core = FakeCore::new();
        start(&mut core, 0x2000_0100);

        assert!(!core.core_halted().unwrap());
        assert!(!core.core_halted().unwrap());

        core.halt(Duration::from_millis(1)).unwrap();
        assert!(core.is_halted());
    }

    #[test]
    fn routine_returns_onto_bkpt() {
        let mut core = FakeCore::new();
        core.write_word_32(0x2000_0000, 0xe00a_be00).unwrap();
        core.set_stub_handler(|_| {
            Some(StubOutcome::Return {
                result: 7,
                polls_until_halt: 2,
            })
        });

        start(&mut core, 0x2000_0100);

        assert!(!core.core_halted().unwrap());
        assert!(!core.core_halted().unwrap());
        assert!(core.core_halted().unwrap());
        assert_eq!(core.register(RegisterId(0)), 7);
        assert_eq!(core.register(PC), 0x2000_0000);
    }

    #[test]
    fn routine_returns_onto_hw_breakpoint() {
        let mut core = FakeCore::new();
        core.set_hw_breakpoint(0x2000_0000).unwrap();

        start(&mut core, 0x2000_0100);

        assert!(core.core_halted().unwrap());
    }

    #[test]
    fn breakpoint_units_are_limited() {
        let mut core = FakeCore::new();
        core.set_breakpoint_units(1);

        core.set_hw_breakpoint(0x100).unwrap();
        core.set_hw_breakpoint(0x100).unwrap();
        assert!(matches!(
            core.set_hw_breakpoint(0x200),
            Err(Error::BreakpointsExhausted { units: 1 })
        ));

        core.clear_hw_breakpoint(0x100).unwrap();
        core.set_hw_breakpoint(0x200).unwrap();
        assert_eq!(core.breakpoints(), vec![0x200]);
    }
}
