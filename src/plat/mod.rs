//! Common platform code between P4's other modules: registers, condition codes,
//! ALU operation codes and the 16-bit instruction word encoding.

use std::fmt;

use thiserror::Error;

pub mod charset;

/// The unit of both program and data memory.
pub type Word = u16;

/// Number of words in each of the two memory spaces.
pub const MEMORY_WORDS: usize = 32768;

/// Addresses are 15 bits wide; bit 15 is ignored when indexing memory.
pub const ADDRESS_MASK: Word = 0x7FFF;

/// Base of the interrupt vector table.
pub const VECTOR_BASE: Word = 0x7F00;

/// An error for the core platform of P4.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    #[error("invalid register index: {0}")]
    InvalidRegister(u8),
    #[error("invalid condition code: {0}")]
    InvalidCondition(u8),
    #[error("could not disassemble: {0:016b}")]
    InvalidInstruction(Word),
}

/// Type alias for Result<T, [PlatformError]>.
pub type PResult<T> = Result<T, PlatformError>;

/// The eight registers of P4.
///
/// `R0` always reads as zero and silently drops writes. `R6` is used as the stack
/// pointer and `R7` as the link register by the assembler's convenience mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Register {
    /// Zero register
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    /// Stack pointer by convention
    R6,
    /// Link register by convention
    R7,
}

impl Register {
    pub const ALL: [Register; 8] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
    ];

    /// The stack pointer used by `PUSH`, `POP`, `CALL` and `RET`.
    pub const SP: Register = Register::R6;
    /// The link register used by `JAL` and the jump expansions.
    pub const LINK: Register = Register::R7;

    pub fn index(self) -> usize {
        self as usize
    }

    /// Extracts the 3-bit register field that starts at bit `shift`.
    fn field(word: Word, shift: u32) -> Self {
        Self::ALL[(word >> shift & 7) as usize]
    }
}

impl TryFrom<u8> for Register {
    type Error = PlatformError;

    fn try_from(value: u8) -> Result<Self, PlatformError> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(PlatformError::InvalidRegister(value))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", *self as u8)
    }
}

/// Branch conditions, as stored in bits 11-8 of a control instruction.
///
/// Bit 0 of the code negates the test; bits 3-1 select the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Condition {
    Always = 1,
    Zero,
    NotZero,
    Carry,
    NotCarry,
    Negative,
    NotNegative,
    Overflow,
    NotOverflow,
    /// Neither negative nor zero.
    Positive,
    NotPositive,
}

impl Condition {
    const ALL: [Condition; 11] = [
        Self::Always,
        Self::Zero,
        Self::NotZero,
        Self::Carry,
        Self::NotCarry,
        Self::Negative,
        Self::NotNegative,
        Self::Overflow,
        Self::NotOverflow,
        Self::Positive,
        Self::NotPositive,
    ];

    /// The mnemonic suffix, including the leading dot (empty for [`Condition::Always`]).
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Always => "",
            Self::Zero => ".Z",
            Self::NotZero => ".NZ",
            Self::Carry => ".C",
            Self::NotCarry => ".NC",
            Self::Negative => ".N",
            Self::NotNegative => ".NN",
            Self::Overflow => ".O",
            Self::NotOverflow => ".NO",
            Self::Positive => ".P",
            Self::NotPositive => ".NP",
        }
    }

    /// Parses a suffix without its dot, e.g. `nz`.
    pub fn from_suffix(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .skip(1)
            .find(|c| c.suffix()[1..].eq_ignore_ascii_case(s))
    }

    /// Evaluates the condition against the status flags.
    pub fn holds(self, zero: bool, carry: bool, negative: bool, overflow: bool) -> bool {
        let code = self as u8;
        if code == 1 {
            return true;
        }
        let flag = match code >> 1 {
            1 => zero,
            2 => carry,
            3 => negative,
            4 => overflow,
            _ => !(negative || zero),
        };
        flag ^ (code & 1 == 1)
    }
}

impl TryFrom<u8> for Condition {
    type Error = PlatformError;

    fn try_from(value: u8) -> Result<Self, PlatformError> {
        match value {
            1..=11 => Ok(Self::ALL[value as usize - 1]),
            _ => Err(PlatformError::InvalidCondition(value)),
        }
    }
}

/// Operations of the arithmetic unit (ALU unit 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Sub,
    Addc,
    Subb,
    Dec,
    Inc,
}

/// Operations of the logic unit (ALU unit 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogicOp {
    Com = 0,
    And,
    Or,
    Xor,
}

/// Operations of the shift unit (ALU unit 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShiftOp {
    Shr = 0,
    Shl,
    Shra,
    Shla,
    Ror,
    Rol,
    Rorc,
    Rolc,
}

/// A 5-bit ALU code: `unit << 3 | op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Arith(ArithOp),
    Logic(LogicOp),
    Shift(ShiftOp),
}

impl AluOp {
    pub fn code(self) -> u8 {
        match self {
            Self::Arith(op) => op as u8,
            Self::Logic(op) => 1 << 3 | op as u8,
            Self::Shift(op) => 2 << 3 | op as u8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use ArithOp::*;
        use LogicOp::*;
        use ShiftOp::*;
        let op = code & 7;
        Some(match code >> 3 {
            0 => Self::Arith(*[Add, Sub, Addc, Subb, Dec, Inc].get(op as usize)?),
            1 => Self::Logic(*[Com, And, Or, Xor].get(op as usize)?),
            2 => Self::Shift([Shr, Shl, Shra, Shla, Ror, Rol, Rorc, Rolc][op as usize]),
            _ => return None,
        })
    }

    /// Unary operations read their only operand from the destination register.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Self::Arith(ArithOp::Dec | ArithOp::Inc) | Self::Logic(LogicOp::Com) | Self::Shift(_)
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Arith(op) => match op {
                ArithOp::Add => "ADD",
                ArithOp::Sub => "SUB",
                ArithOp::Addc => "ADDC",
                ArithOp::Subb => "SUBB",
                ArithOp::Dec => "DEC",
                ArithOp::Inc => "INC",
            },
            Self::Logic(op) => match op {
                LogicOp::Com => "COM",
                LogicOp::And => "AND",
                LogicOp::Or => "OR",
                LogicOp::Xor => "XOR",
            },
            Self::Shift(op) => match op {
                ShiftOp::Shr => "SHR",
                ShiftOp::Shl => "SHL",
                ShiftOp::Shra => "SHRA",
                ShiftOp::Shla => "SHLA",
                ShiftOp::Ror => "ROR",
                ShiftOp::Rol => "ROL",
                ShiftOp::Rorc => "RORC",
                ShiftOp::Rolc => "ROLC",
            },
        }
    }

    /// Looks up an ALU mnemonic, case-insensitively.
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        (0..24u8)
            .filter_map(Self::from_code)
            .find(|op| op.mnemonic().eq_ignore_ascii_case(s))
    }
}

/// A decoded 16-bit P4 instruction word.
///
/// The top two bits select the format:
///
/// - `00` control: `NOP`, `BR`, `JMP`, `JAL`
/// - `01` transfer/system: `MOV`, `LOAD`, `STOR`, `ENI`, `DSI`, `RTI`, `INT`
/// - `10` ALU: `rc <- ra (op) rb`
/// - `11` immediate/system: `MVI`, `MVIH`, `MVIL`, `CLC`, `STC`, `CMC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Nop,
    /// `PC <- address_of_BR + offset` when the condition holds.
    Br { cond: Condition, offset: i8 },
    /// `PC <- rb` when the condition holds.
    Jmp { cond: Condition, rb: Register },
    /// `R7 <- address_of_JAL + 1; PC <- rb` when the condition holds.
    Jal { cond: Condition, rb: Register },
    /// `rc <- rb`
    Mov { rc: Register, rb: Register },
    /// `rc <- M[rb]`
    Load { rc: Register, rb: Register },
    /// `M[rb] <- ra`
    Stor { ra: Register, rb: Register },
    Eni,
    Dsi,
    Rti,
    /// Software interrupt to vector `7F00h | n`.
    Int(u8),
    Alu {
        op: AluOp,
        rc: Register,
        ra: Register,
        rb: Register,
    },
    /// `rc <- imm`
    Mvi { rc: Register, imm: u8 },
    /// `rc.HI <- imm`
    Mvih { rc: Register, imm: u8 },
    /// `rc.LO <- imm`
    Mvil { rc: Register, imm: u8 },
    Clc,
    Stc,
    Cmc,
}

impl Instruction {
    /// Generates the machine-code instruction word for this instruction.
    pub fn to_word(self) -> Word {
        let reg = |r: Register, shift: u32| (r as Word) << shift;
        match self {
            Self::Nop => 0,
            Self::Br { cond, offset } => 0x1000 | (cond as Word) << 8 | offset as u8 as Word,
            Self::Jmp { cond, rb } => 0x2000 | (cond as Word) << 8 | reg(rb, 0),
            Self::Jal { cond, rb } => 0x3000 | (cond as Word) << 8 | reg(rb, 0),
            Self::Mov { rc, rb } => 0x4000 | reg(rc, 11) | reg(rb, 0),
            Self::Load { rc, rb } => 0x4200 | reg(rc, 11) | reg(rb, 0),
            Self::Stor { ra, rb } => 0x4300 | reg(ra, 3) | reg(rb, 0),
            Self::Eni => 0x4400,
            Self::Dsi => 0x4500,
            Self::Rti => 0x4600,
            Self::Int(n) => 0x4700 | n as Word,
            Self::Alu { op, rc, ra, rb } => {
                0x8000 | reg(rc, 11) | (op.code() as Word) << 6 | reg(ra, 3) | reg(rb, 0)
            }
            Self::Mvi { rc, imm } => 0xC000 | reg(rc, 11) | imm as Word,
            Self::Mvih { rc, imm } => 0xC200 | reg(rc, 11) | imm as Word,
            Self::Mvil { rc, imm } => 0xC300 | reg(rc, 11) | imm as Word,
            Self::Clc => 0xC400,
            Self::Stc => 0xC500,
            Self::Cmc => 0xC600,
        }
    }

    /// Decodes an instruction word.
    ///
    /// # Errors
    ///
    /// This function will return an error if a sub-operation, condition or ALU code
    /// falls outside the defined ranges.
    pub fn from_word(word: Word) -> PResult<Self> {
        let invalid = PlatformError::InvalidInstruction(word);
        let rc = Register::field(word, 11);
        let ra = Register::field(word, 3);
        let rb = Register::field(word, 0);
        let sub_op = word >> 8 & 7;
        let imm = (word & 0xFF) as u8;
        let this = match word >> 14 {
            0 => {
                let op = word >> 12 & 3;
                if op == 0 {
                    return Ok(Self::Nop);
                }
                let cond = Condition::try_from((word >> 8 & 15) as u8).map_err(|_| invalid)?;
                match op {
                    1 => Self::Br {
                        cond,
                        offset: imm as i8,
                    },
                    2 => Self::Jmp { cond, rb },
                    _ => Self::Jal { cond, rb },
                }
            }
            1 => match sub_op {
                0 => Self::Mov { rc, rb },
                2 => Self::Load { rc, rb },
                3 => Self::Stor { ra, rb },
                4 => Self::Eni,
                5 => Self::Dsi,
                6 => Self::Rti,
                7 => Self::Int(imm),
                _ => return Err(invalid),
            },
            2 => {
                let op = AluOp::from_code((word >> 6 & 31) as u8).ok_or(invalid)?;
                Self::Alu { op, rc, ra, rb }
            }
            _ => match sub_op {
                0 => Self::Mvi { rc, imm },
                2 => Self::Mvih { rc, imm },
                3 => Self::Mvil { rc, imm },
                4 => Self::Clc,
                5 => Self::Stc,
                6 => Self::Cmc,
                _ => return Err(invalid),
            },
        };
        Ok(this)
    }

    /// Branches, jumps, software interrupts and interrupt returns are followed by a delay slot.
    pub fn has_delay_slot(self) -> bool {
        matches!(
            self,
            Self::Br { .. } | Self::Jmp { .. } | Self::Jal { .. } | Self::Int(_) | Self::Rti
        )
    }
}

/// Formats a constant the way the disassembler writes it: decimal below 10, hexadecimal otherwise.
pub fn format_constant(n: u32) -> String {
    if n < 10 {
        n.to_string()
    } else {
        format!("{:X}h", n)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Nop => write!(f, "NOP"),
            Self::Br { cond, offset } => write!(f, "BR{} {}", cond.suffix(), offset),
            Self::Jmp { cond, rb } => write!(f, "JMP{} {}", cond.suffix(), rb),
            Self::Jal { cond, rb } => write!(f, "JAL{} {}", cond.suffix(), rb),
            Self::Mov { rc, rb } => write!(f, "MOV {}, {}", rc, rb),
            Self::Load { rc, rb } => write!(f, "LOAD {}, M[{}]", rc, rb),
            Self::Stor { ra, rb } => write!(f, "STOR M[{}], {}", rb, ra),
            Self::Eni => write!(f, "ENI"),
            Self::Dsi => write!(f, "DSI"),
            Self::Rti => write!(f, "RTI"),
            Self::Int(n) => write!(f, "INT {}", n),
            Self::Alu { op, rc, ra, rb } => match op {
                AluOp::Arith(ArithOp::Sub) if rc == Register::R0 => write!(f, "CMP {}, {}", ra, rb),
                AluOp::Arith(ArithOp::Sub) if rc == rb && ra == Register::R0 => {
                    write!(f, "NEG {}", rc)
                }
                AluOp::Logic(LogicOp::And) if rc == Register::R0 => {
                    write!(f, "TEST {}, {}", ra, rb)
                }
                op if op.is_unary() => write!(f, "{} {}", op.mnemonic(), rc),
                op => write!(f, "{} {}, {}, {}", op.mnemonic(), rc, ra, rb),
            },
            Self::Mvi { rc, imm } => write!(f, "MVI {}, {}", rc, format_constant(imm as u32)),
            Self::Mvih { rc, imm } => write!(f, "MVIH {}, {}", rc, format_constant(imm as u32)),
            Self::Mvil { rc, imm } => write!(f, "MVIL {}, {}", rc, format_constant(imm as u32)),
            Self::Clc => write!(f, "CLC"),
            Self::Stc => write!(f, "STC"),
            Self::Cmc => write!(f, "CMC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_encode() {
        let instr = Instruction::Mvi {
            rc: Register::R1,
            imm: 5,
        };
        assert_eq!(instr.to_word(), 0xC805);
        let add = Instruction::Alu {
            op: AluOp::Arith(ArithOp::Add),
            rc: Register::R1,
            ra: Register::R1,
            rb: Register::R1,
        };
        assert_eq!(add.to_word(), 0x8809);
    }

    #[test]
    fn test_instruction_decode() {
        assert_eq!(
            Instruction::from_word(0x1AFE).unwrap(),
            Instruction::Br {
                cond: Condition::Positive,
                offset: -2,
            }
        );
        assert_eq!(
            Instruction::from_word(0x4316).unwrap(),
            Instruction::Stor {
                ra: Register::R2,
                rb: Register::R6,
            }
        );
        assert_eq!(Instruction::from_word(0x47FF).unwrap(), Instruction::Int(255));
    }

    #[test]
    fn test_decode_rejects_undefined_patterns() {
        // transfer sub-op 1
        assert!(Instruction::from_word(0x4100).is_err());
        // immediate sub-ops 1 and 7
        assert!(Instruction::from_word(0xC100).is_err());
        assert!(Instruction::from_word(0xC700).is_err());
        // arithmetic ops 6 and 7, logic ops 4 to 7, unit 3
        assert!(Instruction::from_word(0x8180).is_err());
        assert!(Instruction::from_word(0x8300).is_err());
        assert!(Instruction::from_word(0xB000).is_err());
        // condition 0 and 12
        assert!(Instruction::from_word(0x1000).is_err());
        assert!(Instruction::from_word(0x2C00).is_err());
    }

    #[test]
    fn test_every_defined_word_round_trips() {
        for word in 0..=Word::MAX {
            if let Ok(instr) = Instruction::from_word(word) {
                let again = Instruction::from_word(instr.to_word()).unwrap();
                assert_eq!(instr, again, "word {:04X}", word);
            }
        }
    }

    #[test]
    fn test_condition_rule() {
        assert!(Condition::Always.holds(false, false, false, false));
        assert!(Condition::Zero.holds(true, false, false, false));
        assert!(!Condition::NotZero.holds(true, false, false, false));
        assert!(Condition::Positive.holds(false, true, false, true));
        assert!(!Condition::Positive.holds(true, false, false, false));
        assert!(Condition::NotPositive.holds(false, false, true, false));
        assert_eq!(Condition::from_suffix("nc"), Some(Condition::NotCarry));
        assert_eq!(Condition::from_suffix("x"), None);
    }

    #[test]
    fn test_canonical_mnemonics() {
        let sub = |rc, ra, rb| Instruction::Alu {
            op: AluOp::Arith(ArithOp::Sub),
            rc,
            ra,
            rb,
        };
        use Register::*;
        assert_eq!(sub(R0, R3, R4).to_string(), "CMP R3, R4");
        assert_eq!(sub(R2, R0, R2).to_string(), "NEG R2");
        assert_eq!(sub(R2, R1, R3).to_string(), "SUB R2, R1, R3");
        let and = Instruction::Alu {
            op: AluOp::Logic(LogicOp::And),
            rc: R0,
            ra: R1,
            rb: R2,
        };
        assert_eq!(and.to_string(), "TEST R1, R2");
        assert_eq!(
            Instruction::Mvi { rc: R1, imm: 255 }.to_string(),
            "MVI R1, FFh"
        );
        assert_eq!(
            Instruction::Br {
                cond: Condition::NotZero,
                offset: -3
            }
            .to_string(),
            "BR.NZ -3"
        );
    }
}
