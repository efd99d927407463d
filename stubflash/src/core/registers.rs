//! Core registers used when calling into a flash algorithm.

/// The location of a CPU register. This is not an actual memory address, but a core specific
/// location that represents a specific core register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterId(pub u16);

impl From<RegisterId> for u32 {
    fn from(value: RegisterId) -> Self {
        u32::from(value.0)
    }
}

impl From<u16> for RegisterId {
    fn from(value: u16) -> Self {
        RegisterId(value)
    }
}

/// The role a register plays in the calling convention of a flash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRole {
    /// Argument register, also used for the result.
    Argument(&'static str),
    /// Holds the static base of position independent data.
    StaticBase,
    /// Stack pointer.
    StackPointer,
    /// Return address (LR).
    ReturnAddress,
    /// Program counter.
    ProgramCounter,
    /// Any other register.
    Core(&'static str),
}

/// Describes a core (or CPU / hardware) register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreRegister {
    /// Display name of the register.
    pub name: &'static str,
    /// Location of the register.
    pub id: RegisterId,
    /// Role in the stub calling convention.
    pub role: RegisterRole,
}

impl CoreRegister {
    const fn new(name: &'static str, id: u16, role: RegisterRole) -> Self {
        CoreRegister {
            name,
            id: RegisterId(id),
            role,
        }
    }
}

impl std::fmt::Display for CoreRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The register file of a core, as far as it matters for running a flash algorithm.
#[derive(Debug, PartialEq, Eq)]
pub struct CoreRegisters(&'static [CoreRegister]);

impl CoreRegisters {
    /// Returns all registers of the core.
    pub fn all(&self) -> impl Iterator<Item = &CoreRegister> {
        self.0.iter()
    }

    /// Returns the nth argument register, if it exists.
    pub fn argument_register(&self, index: usize) -> Option<&CoreRegister> {
        self.0
            .iter()
            .filter(|r| matches!(r.role, RegisterRole::Argument(_)))
            .nth(index)
    }

    /// Returns the nth result register, if it exists.
    ///
    /// Results are returned in the argument registers.
    pub fn result_register(&self, index: usize) -> Option<&CoreRegister> {
        self.argument_register(index)
    }

    /// Returns the register with the given id.
    pub fn core_register(&self, id: RegisterId) -> Option<&CoreRegister> {
        self.0.iter().find(|r| r.id == id)
    }

    /// The register holding the static base (R9).
    pub fn static_base(&self) -> &CoreRegister {
        &CORTEX_M_STATIC_BASE
    }

    /// The program counter.
    pub fn program_counter(&self) -> &CoreRegister {
        &CORTEX_M_PC
    }

    /// The stack pointer.
    pub fn stack_pointer(&self) -> &CoreRegister {
        &CORTEX_M_SP
    }

    /// The register holding the return address.
    pub fn return_address(&self) -> &CoreRegister {
        &CORTEX_M_LR
    }
}

const CORTEX_M_STATIC_BASE: CoreRegister = CoreRegister::new("R9", 9, RegisterRole::StaticBase);
const CORTEX_M_SP: CoreRegister = CoreRegister::new("SP", 13, RegisterRole::StackPointer);
const CORTEX_M_LR: CoreRegister = CoreRegister::new("LR", 14, RegisterRole::ReturnAddress);
const CORTEX_M_PC: CoreRegister = CoreRegister::new("PC", 15, RegisterRole::ProgramCounter);

const CORTEX_M_REGS_SET: &[CoreRegister] = &[
    CoreRegister::new("R0", 0, RegisterRole::Argument("a1")),
    CoreRegister::new("R1", 1, RegisterRole::Argument("a2")),
    CoreRegister::new("R2", 2, RegisterRole::Argument("a3")),
    CoreRegister::new("R3", 3, RegisterRole::Argument("a4")),
    CoreRegister::new("R4", 4, RegisterRole::Core("v1")),
    CoreRegister::new("R5", 5, RegisterRole::Core("v2")),
    CoreRegister::new("R6", 6, RegisterRole::Core("v3")),
    CoreRegister::new("R7", 7, RegisterRole::Core("v4")),
    CoreRegister::new("R8", 8, RegisterRole::Core("v5")),
    CORTEX_M_STATIC_BASE,
    CoreRegister::new("R10", 10, RegisterRole::Core("v7")),
    CoreRegister::new("R11", 11, RegisterRole::Core("v8")),
    CoreRegister::new("R12", 12, RegisterRole::Core("ip")),
    CORTEX_M_SP,
    CORTEX_M_LR,
    CORTEX_M_PC,
    CoreRegister::new("XPSR", 16, RegisterRole::Core("xpsr")),
];

/// The Cortex-M register file.
pub static CORTEX_M_CORE_REGISTERS: CoreRegisters = CoreRegisters(CORTEX_M_REGS_SET);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn argument_registers_are_r0_to_r3() {
        let regs = &CORTEX_M_CORE_REGISTERS;

        let ids: Vec<u16> = (0..4)
            .filter_map(|i| regs.argument_register(i))
            .map(|r| r.id.0)
            .collect();

        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(regs.argument_register(4).is_none());
        assert_eq!(regs.result_register(0).map(|r| r.id), Some(RegisterId(0)));
    }

    #[test]
    fn special_registers() {
        let regs = &CORTEX_M_CORE_REGISTERS;

        assert_eq!(regs.static_base().id, RegisterId(9));
        assert_eq!(regs.stack_pointer().id, RegisterId(13));
        assert_eq!(regs.return_address().id, RegisterId(14));
        assert_eq!(regs.program_counter().id, RegisterId(15));
        assert_eq!(regs.core_register(RegisterId(16)).map(|r| r.name), Some("XPSR"));
    }
}
