use crate::plat::{AluOp, ArithOp, LogicOp, ShiftOp, Word};

use super::registers::Flags;

/// The outcome of one ALU operation.
///
/// `carry` and `overflow` are `None` when the operation leaves that flag alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluOutput {
    pub result: Word,
    pub carry: Option<bool>,
    pub overflow: Option<bool>,
}

impl AluOutput {
    /// Applies the output to the state register. Zero and negative are always recomputed.
    pub fn update(&self, flags: &mut Flags) {
        if let Some(carry) = self.carry {
            flags.set(Flags::CARRY, carry);
        }
        if let Some(overflow) = self.overflow {
            flags.set(Flags::OVERFLOW, overflow);
        }
        flags.set(Flags::NEGATIVE, self.result & 0x8000 != 0);
        flags.set(Flags::ZERO, self.result == 0);
    }
}

fn sign(n: u32) -> bool {
    n >> 15 & 1 == 1
}

/// Computes `a (op) b` with the given carry-in.
///
/// Unary operations only read `a`.
pub fn compute(op: AluOp, a: Word, b: Word, carry_in: bool) -> AluOutput {
    let (a, b, c) = (a as u32, b as u32, carry_in as u32);
    match op {
        AluOp::Arith(op) => {
            let raw = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Addc => a + b + c,
                ArithOp::Subb => a.wrapping_sub(b).wrapping_sub(c ^ 1),
                ArithOp::Dec => a.wrapping_sub(1),
                ArithOp::Inc => a + 1,
            };
            let r = sign(raw);
            let overflow = match op {
                ArithOp::Add | ArithOp::Addc => sign(a) == sign(b) && r != sign(a),
                ArithOp::Sub | ArithOp::Subb => sign(a) != sign(b) && r != sign(a),
                ArithOp::Dec => sign(a) && !r,
                ArithOp::Inc => !sign(a) && r,
            };
            AluOutput {
                result: raw as Word,
                carry: Some(raw >> 16 & 1 == 1),
                overflow: Some(overflow),
            }
        }
        AluOp::Logic(op) => {
            let result = match op {
                LogicOp::Com => !a,
                LogicOp::And => a & b,
                LogicOp::Or => a | b,
                LogicOp::Xor => a ^ b,
            };
            AluOutput {
                result: result as Word,
                carry: None,
                overflow: None,
            }
        }
        AluOp::Shift(op) => {
            let left = op as u8 & 1 == 1;
            let carry = if left { sign(a) } else { a & 1 == 1 };
            let raw = match op {
                // SHRA does not carry the sign down
                ShiftOp::Shr | ShiftOp::Shra => a >> 1,
                ShiftOp::Shl | ShiftOp::Shla => a << 1,
                ShiftOp::Ror => (a & 1) << 15 | a >> 1,
                ShiftOp::Rol => a << 1 | a >> 15,
                ShiftOp::Rorc => c << 15 | a >> 1,
                ShiftOp::Rolc => a << 1 | c,
            };
            AluOutput {
                result: raw as Word,
                carry: Some(carry),
                overflow: (op == ShiftOp::Shla).then(|| sign(a) != sign(raw)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arith(op: ArithOp, a: Word, b: Word, carry_in: bool) -> AluOutput {
        compute(AluOp::Arith(op), a, b, carry_in)
    }

    fn shift(op: ShiftOp, a: Word, carry_in: bool) -> AluOutput {
        compute(AluOp::Shift(op), a, 0, carry_in)
    }

    #[test]
    fn test_signed_overflow() {
        let out = arith(ArithOp::Add, 0x7FFF, 0x0001, false);
        assert_eq!(out.result, 0x8000);
        assert_eq!(out.carry, Some(false));
        assert_eq!(out.overflow, Some(true));
        let mut flags = Flags::empty();
        out.update(&mut flags);
        assert_eq!(flags, Flags::NEGATIVE | Flags::OVERFLOW);
    }

    #[test]
    fn test_carry_and_borrow() {
        let out = arith(ArithOp::Add, 0xFFFF, 0x0001, false);
        assert_eq!((out.result, out.carry, out.overflow), (0, Some(true), Some(false)));
        let out = arith(ArithOp::Sub, 1, 2, false);
        assert_eq!((out.result, out.carry, out.overflow), (0xFFFF, Some(true), Some(false)));
        let out = arith(ArithOp::Sub, 0x8000, 1, false);
        assert_eq!((out.result, out.overflow), (0x7FFF, Some(true)));
        // borrow-in is the complement of carry
        assert_eq!(arith(ArithOp::Subb, 5, 2, true).result, 3);
        assert_eq!(arith(ArithOp::Subb, 5, 2, false).result, 2);
        assert_eq!(arith(ArithOp::Addc, 5, 2, true).result, 8);
    }

    #[test]
    fn test_inc_dec_overflow() {
        assert_eq!(arith(ArithOp::Inc, 0x7FFF, 0, false).overflow, Some(true));
        assert_eq!(arith(ArithOp::Inc, 0xFFFF, 0, false).carry, Some(true));
        assert_eq!(arith(ArithOp::Dec, 0x8000, 0, false).overflow, Some(true));
        assert_eq!(arith(ArithOp::Dec, 0, 0, false).result, 0xFFFF);
        assert_eq!(arith(ArithOp::Dec, 0, 0, false).overflow, Some(false));
    }

    #[test]
    fn test_logic_keeps_carry() {
        let out = compute(AluOp::Logic(LogicOp::Com), 0x00FF, 0, true);
        assert_eq!(out.result, 0xFF00);
        assert_eq!((out.carry, out.overflow), (None, None));
        let mut flags = Flags::CARRY | Flags::OVERFLOW;
        compute(AluOp::Logic(LogicOp::And), 0xF0, 0x0F, false).update(&mut flags);
        assert_eq!(flags, Flags::CARRY | Flags::OVERFLOW | Flags::ZERO);
    }

    #[test]
    fn test_shifts() {
        assert_eq!(shift(ShiftOp::Shr, 0x8001, false).result, 0x4000);
        assert_eq!(shift(ShiftOp::Shr, 0x8001, false).carry, Some(true));
        assert_eq!(shift(ShiftOp::Shra, 0x8002, false).result, 0x4001);
        assert_eq!(shift(ShiftOp::Shra, 0x8003, false).carry, Some(true));
        assert_eq!(shift(ShiftOp::Shl, 0x8001, false).result, 0x0002);
        assert_eq!(shift(ShiftOp::Shl, 0x8001, false).carry, Some(true));
        assert_eq!(shift(ShiftOp::Shla, 0x4000, false).overflow, Some(true));
        assert_eq!(shift(ShiftOp::Shl, 0x4000, false).overflow, None);
        assert_eq!(shift(ShiftOp::Ror, 0x0001, false).result, 0x8000);
        assert_eq!(shift(ShiftOp::Rol, 0x8000, false).result, 0x0001);
        assert_eq!(shift(ShiftOp::Rorc, 0x0002, true).result, 0x8001);
        assert_eq!(shift(ShiftOp::Rolc, 0x4000, true).result, 0x8001);
    }
}
