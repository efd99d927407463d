//! The core a flash algorithm runs on.

mod registers;

pub use registers::{
    CoreRegister, CoreRegisters, RegisterId, RegisterRole, CORTEX_M_CORE_REGISTERS,
};

use crate::{Error, MemoryInterface};
use std::time::Duration;
pub use stubflash_target::InstructionSet;

/// Run control of a single core, on top of its memory interface.
///
/// This is the part of the debug transport the flashing engine depends on.
/// Implementations wrap a real probe connection or, for dry runs and
/// tests, a [`FakeCore`](crate::probe::fake_core::FakeCore).
pub trait CoreInterface: MemoryInterface {
    /// Read the value of a core register.
    fn read_core_reg(&mut self, id: RegisterId) -> Result<u32, Error>;

    /// Write the value of a core register.
    ///
    /// The program counter is written through this as well.
    fn write_core_reg(&mut self, id: RegisterId, value: u32) -> Result<(), Error>;

    /// Halts the core and waits up to `timeout` for it to stop.
    fn halt(&mut self, timeout: Duration) -> Result<(), Error>;

    /// Resumes the core.
    fn run(&mut self) -> Result<(), Error>;

    /// Returns true if the core is currently halted.
    fn core_halted(&mut self) -> Result<bool, Error>;

    /// Number of hardware breakpoint units of the core.
    fn available_breakpoint_units(&mut self) -> Result<u32, Error>;

    /// Sets a hardware breakpoint at `address`.
    fn set_hw_breakpoint(&mut self, address: u64) -> Result<(), Error>;

    /// Clears the hardware breakpoint at `address`.
    fn clear_hw_breakpoint(&mut self, address: u64) -> Result<(), Error>;

    /// The instruction set the core is currently executing.
    fn instruction_set(&mut self) -> Result<InstructionSet, Error>;

    /// The register file of the core.
    fn registers(&self) -> &'static CoreRegisters {
        &CORTEX_M_CORE_REGISTERS
    }
}
