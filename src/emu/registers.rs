use std::fmt;

use crate::plat::{Register, Word};

bitflags::bitflags! {
    /// The CPU state register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        /// Interrupts are globally enabled.
        const ENABLE = 1 << 4;
        /// Set if the result of the last ALU operation was zero.
        const ZERO = 1 << 3;
        /// Set by the last arithmetic or shift operation that produced a carry (or borrow).
        const CARRY = 1 << 2;
        /// Bit 15 of the last ALU result.
        const NEGATIVE = 1 << 1;
        /// Set if the last signed arithmetic operation overflowed.
        const OVERFLOW = 1 << 0;
    }
}

impl Flags {
    pub fn zero(self) -> bool {
        self.contains(Self::ZERO)
    }

    pub fn carry(self) -> bool {
        self.contains(Self::CARRY)
    }

    pub fn negative(self) -> bool {
        self.contains(Self::NEGATIVE)
    }

    pub fn overflow(self) -> bool {
        self.contains(Self::OVERFLOW)
    }

    pub fn enabled(self) -> bool {
        self.contains(Self::ENABLE)
    }
}

/// Prints the flags as the `EZCNO` bit string.
impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05b}", self.bits())
    }
}

/// The eight general purpose registers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    regs: [Word; 8],
}

impl RegisterFile {
    pub fn read(&self, reg: Register) -> Word {
        self.regs[reg.index()]
    }

    /// Writes `value` to `reg`. Writes to `R0` are dropped.
    pub fn write(&mut self, reg: Register, value: Word) {
        if reg != Register::R0 {
            self.regs[reg.index()] = value;
        }
    }

    pub fn values(&self) -> [Word; 8] {
        self.regs
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for reg in Register::ALL {
            if reg != Register::R0 {
                write!(f, " ")?;
            }
            write!(f, "{}={:04X}", reg, self.read(reg))?;
        }
        Ok(())
    }
}
