//! Mnemonics and directives, and the machine instructions each one expands to.

use std::iter;

use log::debug;

use crate::plat::{
    charset::Charset, AluOp, ArithOp, Condition, Instruction, LogicOp, Register, Word,
    ADDRESS_MASK,
};

use super::{
    assembler::{Encoder, Failure, ImmediateOp, LineResult, Part, Value},
    lexer, AsmError, AsmWarning, Assembler,
};

/// What a jump or call goes to.
enum Target {
    Register(Register),
    Label(Value),
}

/// The four operand shapes `MOV` accepts.
enum MoveForm {
    Registers(Register, Register),
    Load(Register, Register),
    Store { address: Register, source: Register },
    Constant(Register, Value),
}

fn alu(op: AluOp, rc: Register, ra: Register, rb: Register) -> Encoder {
    Encoder::Ready(Instruction::Alu { op, rc, ra, rb })
}

fn dec(rc: Register) -> Encoder {
    alu(AluOp::Arith(ArithOp::Dec), rc, rc, Register::R0)
}

fn inc(rc: Register) -> Encoder {
    alu(AluOp::Arith(ArithOp::Inc), rc, rc, Register::R0)
}

/// `MVIH rc, value>>8` followed by `MVIL rc, value&255`.
fn split_immediate(rc: Register, value: Value) -> [Encoder; 2] {
    [
        Encoder::Immediate {
            op: ImmediateOp::Mvih,
            rc,
            value: value.clone(),
            part: Part::High,
        },
        Encoder::Immediate {
            op: ImmediateOp::Mvil,
            rc,
            value,
            part: Part::Low,
        },
    ]
}

impl<'a> Assembler<'a> {
    /// Parses one mnemonic or directive and whatever operands it takes.
    pub(super) fn operation(&mut self) -> LineResult<()> {
        let Some(op) = self.search(lexer::mnemonic) else {
            if self.search(lexer::end_of_line).is_some() {
                return Ok(());
            }
            return Err(Failure::no_match(AsmError::BadName));
        };
        let op: &'a str = op.fragment();
        self.op_start = self.token().start;
        let pc = self.instruction_address as Word;
        let lower = op.to_ascii_lowercase();
        let (base, suffix) = match lower.split_once('.') {
            Some((base, suffix)) => (base, Some(suffix)),
            None => (lower.as_str(), None),
        };
        if let Some(cond) = suffix.map_or(Some(Condition::Always), Condition::from_suffix) {
            match base {
                "br" => return self.branch(cond, pc),
                "jmp" => return self.jump(cond, false),
                "jal" => return self.jump(cond, true),
                "call" => return self.call(cond, pc),
                _ => {}
            }
        }
        if suffix.is_none() {
            if let Some(result) = self.instruction(base) {
                return result;
            }
        }
        self.directive(op)
    }

    fn instruction(&mut self, name: &str) -> Option<LineResult<()>> {
        if let Some(op) = AluOp::from_mnemonic(name) {
            return Some(if op.is_unary() {
                self.repeated(op)
            } else {
                self.three_operand(op)
            });
        }
        let simple = |instr| Some(Encoder::Ready(instr));
        let result = match name {
            "cmp" => self.compare(AluOp::Arith(ArithOp::Sub)),
            "test" => self.compare(AluOp::Logic(LogicOp::And)),
            "neg" => self.negate(),
            "mov" => self.mov(),
            "load" => self.load(),
            "stor" => self.store(),
            "mvi" => self.move_immediate(ImmediateOp::Mvi),
            "mvih" => self.move_immediate(ImmediateOp::Mvih),
            "mvil" => self.move_immediate(ImmediateOp::Mvil),
            "nop" => self.emit(simple(Instruction::Nop)),
            "clc" => self.emit(simple(Instruction::Clc)),
            "stc" => self.emit(simple(Instruction::Stc)),
            "cmc" => self.emit(simple(Instruction::Cmc)),
            "eni" => self.emit(simple(Instruction::Eni)),
            "dsi" => self.emit(simple(Instruction::Dsi)),
            "rti" => {
                let delay = self.delay_slot();
                self.emit(simple(Instruction::Rti).into_iter().chain(delay))
            }
            "int" => self.interrupt(),
            "push" => self.push(),
            "pop" => self.pop(),
            "ret" => self.ret(),
            "retn" => self.retn(),
            _ => return None,
        };
        Some(result)
    }

    fn three_operand(&mut self, op: AluOp) -> LineResult<()> {
        let (rc, ra, rb) = self.first_match(2, |p, shape| {
            let rc = p.first_arg(Self::register)?;
            let ra = p.next_arg(Self::register)?;
            let rb = match shape {
                0 => Some(p.next_arg(Self::register)?),
                _ => None,
            };
            Ok((rc, ra, rb))
        })?;
        let (ra, rb) = match rb {
            Some(rb) => (ra, rb),
            None => {
                self.warn(AsmWarning::ImpliedOperand(format!(
                    "{} {}, {}, {}",
                    op.mnemonic(),
                    rc,
                    rc,
                    ra
                )));
                (rc, ra)
            }
        };
        self.emit([alu(op, rc, ra, rb)])
    }

    /// Single-register operations, optionally repeated with a count.
    fn repeated(&mut self, op: AluOp) -> LineResult<()> {
        let (rc, count) = self.first_match(2, |p, shape| {
            let rc = p.first_arg(Self::register)?;
            let count = match shape {
                0 => Some(p.next_arg(Self::constant_or_char)?),
                _ => None,
            };
            Ok((rc, count))
        })?;
        let instr = alu(op, rc, rc, Register::R0);
        let Some(count) = count else {
            return self.emit([instr]);
        };
        if count > 16 {
            return Err(Failure::constraint(AsmError::RepeatTooHigh));
        }
        if count < 1 {
            return Err(Failure::constraint(AsmError::RepeatTooLow));
        }
        self.warn(AsmWarning::Repeated(format!(
            "{} {} (x{})",
            op.mnemonic(),
            rc,
            count
        )));
        self.emit(iter::repeat(instr).take(count as usize))
    }

    fn compare(&mut self, op: AluOp) -> LineResult<()> {
        let ra = self.first_arg(Self::register)?;
        let rb = self.next_arg(Self::register)?;
        self.emit([alu(op, Register::R0, ra, rb)])
    }

    fn negate(&mut self) -> LineResult<()> {
        let rc = self.first_arg(Self::register)?;
        self.emit([alu(AluOp::Arith(ArithOp::Sub), rc, Register::R0, rc)])
    }

    fn mov(&mut self) -> LineResult<()> {
        let form = self.first_match(4, |p, shape| match shape {
            0 => {
                let rc = p.first_arg(Self::register)?;
                Ok(MoveForm::Registers(rc, p.next_arg(Self::register)?))
            }
            1 => {
                let rc = p.first_arg(Self::register)?;
                Ok(MoveForm::Load(rc, p.next_arg(Self::address)?))
            }
            2 => {
                let address = p.first_arg(Self::address)?;
                let source = p.next_arg(Self::register)?;
                Ok(MoveForm::Store { address, source })
            }
            _ => {
                let rc = p.first_arg(Self::register)?;
                Ok(MoveForm::Constant(rc, p.next_arg(Self::constant_or_label)?))
            }
        })?;
        match form {
            MoveForm::Registers(rc, rb) => self.emit([Encoder::Ready(Instruction::Mov { rc, rb })]),
            MoveForm::Load(rc, rb) => {
                self.warn(AsmWarning::Substituted(format!("LOAD {}, M[{}]", rc, rb)));
                self.emit([Encoder::Ready(Instruction::Load { rc, rb })])
            }
            MoveForm::Store { address, source } => {
                self.warn(AsmWarning::Substituted(format!(
                    "STOR M[{}], {}",
                    address, source
                )));
                self.emit([Encoder::Ready(Instruction::Stor {
                    ra: source,
                    rb: address,
                })])
            }
            MoveForm::Constant(rc, value) => {
                self.warn(AsmWarning::Substituted(format!("MVI {}, const", rc)));
                self.emit(split_immediate(rc, value))
            }
        }
    }

    fn load(&mut self) -> LineResult<()> {
        let rc = self.first_arg(Self::register)?;
        let rb = self.next_arg(Self::address)?;
        self.emit([Encoder::Ready(Instruction::Load { rc, rb })])
    }

    fn store(&mut self) -> LineResult<()> {
        let rb = self.first_arg(Self::address)?;
        let ra = self.next_arg(Self::register)?;
        self.emit([Encoder::Ready(Instruction::Stor { ra, rb })])
    }

    fn move_immediate(&mut self, op: ImmediateOp) -> LineResult<()> {
        let rc = self.first_arg(Self::register)?;
        let value = self.next_arg(Self::constant_or_label)?;
        let split = op == ImmediateOp::Mvi
            && match value {
                Value::Const(c) => !(0..=255).contains(&c),
                Value::Symbol(_) => true,
            };
        if split {
            self.emit(split_immediate(rc, value))
        } else {
            self.emit([Encoder::Immediate {
                op,
                rc,
                value,
                part: Part::Whole,
            }])
        }
    }

    fn interrupt(&mut self) -> LineResult<()> {
        let value = self.first_arg(Self::constant_or_label)?;
        let delay = self.delay_slot();
        self.emit(iter::once(Encoder::Interrupt(value)).chain(delay))
    }

    fn push(&mut self) -> LineResult<()> {
        let ra = self.first_arg(Self::register)?;
        self.warn(AsmWarning::Substituted(format!("STOR M[R6], {}; DEC R6", ra)));
        self.emit([
            Encoder::Ready(Instruction::Stor {
                ra,
                rb: Register::SP,
            }),
            dec(Register::SP),
        ])
    }

    fn pop(&mut self) -> LineResult<()> {
        let rc = self.first_arg(Self::register)?;
        self.warn(AsmWarning::Substituted(format!("INC R6; LOAD {}, M[R6]", rc)));
        self.emit([
            inc(Register::SP),
            Encoder::Ready(Instruction::Load {
                rc,
                rb: Register::SP,
            }),
        ])
    }

    fn ret(&mut self) -> LineResult<()> {
        self.warn(AsmWarning::Substituted(
            "INC R6; LOAD R7, M[R6]; JMP R7".to_owned(),
        ));
        let delay = self.delay_slot();
        self.emit(
            [
                inc(Register::SP),
                Encoder::Ready(Instruction::Load {
                    rc: Register::LINK,
                    rb: Register::SP,
                }),
                Encoder::Ready(Instruction::Jmp {
                    cond: Condition::Always,
                    rb: Register::LINK,
                }),
            ]
            .into_iter()
            .chain(delay),
        )
    }

    /// `RET` that also drops `n` words of arguments from the stack.
    fn retn(&mut self) -> LineResult<()> {
        let n = self.first_arg(Self::constant_or_char)?;
        self.warn(AsmWarning::Substituted(format!(
            "INC R6; LOAD R7, M[R6]; INC R6 (x{}); JMP R7",
            n
        )));
        let delay = self.delay_slot();
        let pops = iter::repeat(inc(Register::SP)).take(n.max(0) as usize);
        self.emit(
            [
                inc(Register::SP),
                Encoder::Ready(Instruction::Load {
                    rc: Register::LINK,
                    rb: Register::SP,
                }),
            ]
            .into_iter()
            .chain(pops)
            .chain(iter::once(Encoder::Ready(Instruction::Jmp {
                cond: Condition::Always,
                rb: Register::LINK,
            })))
            .chain(delay),
        )
    }

    fn branch(&mut self, cond: Condition, origin: Word) -> LineResult<()> {
        let dest = self.first_arg(Self::constant_or_label)?;
        let delay = self.delay_slot();
        self.emit(iter::once(Encoder::Branch { cond, dest, origin }).chain(delay))
    }

    fn target(&mut self) -> LineResult<Target> {
        self.first_arg(|p| {
            p.first_match(2, |p, i| match i {
                0 => p.register().map(Target::Register),
                _ => p.label().map(Target::Label),
            })
        })
    }

    /// `JMP`/`JAL` to a register, or through `R7` to a label.
    fn jump(&mut self, cond: Condition, link: bool) -> LineResult<()> {
        let target = self.target()?;
        let jump = |rb| {
            Encoder::Ready(if link {
                Instruction::Jal { cond, rb }
            } else {
                Instruction::Jmp { cond, rb }
            })
        };
        let delay = self.delay_slot();
        match target {
            Target::Register(rb) => self.emit(iter::once(jump(rb)).chain(delay)),
            Target::Label(value) => self.emit(
                split_immediate(Register::LINK, value)
                    .into_iter()
                    .chain([jump(Register::LINK)])
                    .chain(delay),
            ),
        }
    }

    /// Pushes the return address on the `R6` stack, then jumps.
    fn call(&mut self, cond: Condition, pc: Word) -> LineResult<()> {
        let target = self.target()?;
        self.warn(AsmWarning::Substituted(
            "MVI R7, PC; STOR M[R6], R7; DEC R6; JMP dest".to_owned(),
        ));
        let delay = self.delay_slot();
        let jump = Encoder::Ready(Instruction::Jmp {
            cond,
            rb: Register::LINK,
        });
        match target {
            Target::Register(rb) => self.emit(
                iter::once(Encoder::Ready(Instruction::Jmp { cond, rb })).chain(delay),
            ),
            Target::Label(value) => {
                // the expansion is 8 words long, delay slot included
                let return_address = Value::Const(pc as i64 + 8);
                self.emit(
                    split_immediate(Register::LINK, return_address)
                        .into_iter()
                        .chain([
                            Encoder::Ready(Instruction::Stor {
                                ra: Register::LINK,
                                rb: Register::SP,
                            }),
                            dec(Register::SP),
                        ])
                        .chain(split_immediate(Register::LINK, value))
                        .chain([jump])
                        .chain(delay),
                )
            }
        }
    }

    fn no_label(&self) -> LineResult<()> {
        match self.pending_label {
            Some(_) => Err(Failure::constraint(AsmError::LabelledDirective)),
            None => Ok(()),
        }
    }

    fn expect_whitespace(&mut self, what: &'static str) -> LineResult<()> {
        self.search(lexer::whitespace)
            .map(|_| ())
            .ok_or_else(|| Failure::constraint(AsmError::Expecting(what)))
    }

    fn define(&mut self, name: &str, value: i64) -> LineResult<()> {
        self.symbols
            .define(name, value)
            .map(|_| ())
            .map_err(Failure::constraint)
    }

    /// `ORIG`, `OPT` and the named data directives `EQU`, `WORD`, `TAB` and `STR`.
    fn directive(&mut self, name: &'a str) -> LineResult<()> {
        match name.to_ascii_lowercase().as_str() {
            "orig" => {
                self.stats.pseudo_instructions += 1;
                self.no_label()?;
                self.expect_whitespace("constant")?;
                let address = self.constant_or_char()?;
                if address < 0 {
                    return Err(Failure::constraint(AsmError::NegativeAddress));
                }
                if address > 65535 {
                    return Err(Failure::constraint(AsmError::AddressTooHigh));
                }
                let address = (address & ADDRESS_MASK as i64) as usize;
                debug!("ORIG {:04X}h", address);
                self.instruction_address = address;
                self.data_address = address;
                return Ok(());
            }
            "opt" => {
                self.stats.pseudo_instructions += 1;
                self.no_label()?;
                if self.search(lexer::whitespace).is_none() {
                    return Err(Failure::constraint(AsmError::NoOption));
                }
                let option = self
                    .search(lexer::option_name)
                    .ok_or_else(|| Failure::constraint(AsmError::NoOption))?;
                match option.fragment().to_ascii_uppercase().as_str() {
                    "ENABLE_DELAY_SLOTS" => self.options.delay_slots = true,
                    "DISABLE_DELAY_SLOTS" => self.options.delay_slots = false,
                    "ASCII" => self.options.charset = Charset::Native,
                    "UNICODE" | "UTF16" | "UTF-16" => self.options.charset = Charset::Unicode,
                    other => {
                        return Err(Failure::invalid(AsmError::UnknownOption(other.to_owned()))
                            .at(self.token()))
                    }
                }
                debug!("OPT {}", option.fragment());
                return Ok(());
            }
            _ => {}
        }
        let Some(directive) = self.search(lexer::directive) else {
            return Err(Failure::invalid(match self.pending_label {
                Some(_) => AsmError::UnknownOperation(name.to_uppercase()),
                None => AsmError::ExpectingDirective,
            }));
        };
        self.stats.pseudo_instructions += 1;
        match directive.fragment().to_ascii_lowercase().as_str() {
            "equ" => {
                self.no_label()?;
                self.expect_whitespace("constant")?;
                let c = self.constant_or_char()?;
                if !(-32768..=65536).contains(&c) {
                    return Err(
                        Failure::invalid(AsmError::ConstantRange(-32768, 65536)).at(self.token())
                    );
                }
                self.define(name, c)
            }
            kind @ ("word" | "tab") => {
                self.no_label()?;
                self.expect_whitespace("constant")?;
                let value = self.constant_or_label()?;
                let columns = self.token();
                self.define(name, self.data_address as i64)?;
                if kind == "word" {
                    return self.emit_data(value, columns);
                }
                let count = self.resolve_now(&value)?;
                for _ in 0..count.max(0) {
                    self.emit_data(Value::Const(0), columns.clone())?;
                }
                Ok(())
            }
            "str" => {
                self.no_label()?;
                self.define(name, self.data_address as i64)?;
                self.expect_whitespace("string or constant")?;
                let mut items = Vec::new();
                loop {
                    let values = self.string_item()?;
                    let columns = self.token();
                    items.extend(values.into_iter().map(|v| (v, columns.clone())));
                    if self.search(lexer::comma).is_none() {
                        break;
                    }
                }
                items
                    .into_iter()
                    .try_for_each(|(v, columns)| self.emit_data(v, columns))
            }
            _ => Err(Failure::invalid(AsmError::UnknownOperation(
                name.to_uppercase(),
            ))),
        }
    }

    /// One item of a `STR` list: a string, a constant or a label.
    fn string_item(&mut self) -> LineResult<Vec<Value>> {
        self.first_match(3, |p, i| match i {
            0 => Ok(p.string()?.into_iter().map(Value::Const).collect()),
            1 => Ok(vec![Value::Const(p.constant()?)]),
            _ => Ok(vec![p.label()?]),
        })
    }
}
