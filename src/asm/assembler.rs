use std::{collections::BTreeMap, ops::Range};

use log::{debug, trace};

use crate::plat::{Condition, Instruction, Register, Word, MEMORY_WORDS};

use super::{
    lexer::{self, LabelDef, RegisterToken},
    symbols::{SymbolId, SymbolTable},
    AsmError, AsmWarning, AssembleResult, AssemblerOptions, Diagnostic, DiagnosticKind, Severity,
    Span, Stats,
};

/// How a failed match interacts with the alternatives around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Class {
    /// Nothing recognisable at this position; the next alternative is tried.
    NoMatch,
    /// Recognised but not acceptable; the next alternative is still tried.
    Constraint,
    /// Recognised with an invalid value; ends the line immediately.
    Invalid,
}

#[derive(Debug)]
pub(super) struct Failure {
    pub class: Class,
    pub error: AsmError,
    pub columns: Option<Range<usize>>,
}

impl Failure {
    pub fn no_match(error: AsmError) -> Self {
        Self {
            class: Class::NoMatch,
            error,
            columns: None,
        }
    }

    pub fn constraint(error: AsmError) -> Self {
        Self {
            class: Class::Constraint,
            error,
            columns: None,
        }
    }

    pub fn invalid(error: AsmError) -> Self {
        Self {
            class: Class::Invalid,
            error,
            columns: None,
        }
    }

    pub fn at(mut self, columns: Range<usize>) -> Self {
        self.columns = Some(columns);
        self
    }

    fn backtracks(&self) -> bool {
        self.class != Class::Invalid
    }
}

pub(super) type LineResult<T> = Result<T, Failure>;

/// A use of a symbol, remembered for error reporting.
#[derive(Debug, Clone)]
pub(super) struct SymbolUse {
    id: SymbolId,
    columns: Range<usize>,
}

/// An operand value that may not be known until every label is defined.
#[derive(Debug, Clone)]
pub(super) enum Value {
    Const(i64),
    Symbol(SymbolUse),
}

/// Which byte of a value an immediate instruction takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Part {
    Whole,
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ImmediateOp {
    Mvi,
    Mvih,
    Mvil,
}

/// A program word whose final encoding is produced in the second pass.
#[derive(Debug, Clone)]
pub(super) enum Encoder {
    Ready(Instruction),
    /// `BR`, with a displacement or a label relative to `origin`.
    Branch {
        cond: Condition,
        dest: Value,
        origin: Word,
    },
    Immediate {
        op: ImmediateOp,
        rc: Register,
        value: Value,
        part: Part,
    },
    Interrupt(Value),
}

#[derive(Debug)]
struct Pending {
    line: usize,
    columns: Range<usize>,
    encoder: Encoder,
}

#[derive(Debug)]
struct DataEntry {
    line: usize,
    columns: Range<usize>,
    value: Value,
}

/// Position within the current line. `from..to` is the last token matched.
#[derive(Debug, Clone, Copy)]
struct Cursor<'a> {
    rest: Span<'a>,
    from: usize,
    to: usize,
}

fn column(span: Span) -> usize {
    span.get_utf8_column() - 1
}

/// An assembly context capable of translating a source file into program and data images.
///
/// The first pass reads the source line by line, recording [Encoder]s at program addresses
/// and [Value]s at data addresses. The second pass resolves them once every label is known.
#[derive(Debug)]
pub struct Assembler<'a> {
    pub(super) options: AssemblerOptions,
    pub(super) symbols: SymbolTable,
    program: BTreeMap<Word, Pending>,
    data: BTreeMap<Word, DataEntry>,
    pub(super) instruction_address: usize,
    pub(super) data_address: usize,
    /// The last non-local label, which scopes `.local` labels.
    pub(super) last_label: Option<String>,
    /// A label waiting for the instruction it marks.
    pub(super) pending_label: Option<String>,
    pub(super) stats: Stats,
    diagnostics: Vec<Diagnostic>,
    steps: BTreeMap<Word, usize>,
    line: usize,
    line_len: usize,
    /// Column where the current operation's mnemonic starts.
    pub(super) op_start: usize,
    cursor: Cursor<'a>,
    warnings: Vec<(AsmWarning, Range<usize>)>,
}

impl<'a> Assembler<'a> {
    pub fn new(options: AssemblerOptions) -> Self {
        Self {
            options,
            symbols: SymbolTable::default(),
            program: BTreeMap::new(),
            data: BTreeMap::new(),
            instruction_address: 0,
            data_address: 0,
            last_label: None,
            pending_label: None,
            stats: Stats::default(),
            diagnostics: Vec::new(),
            steps: BTreeMap::new(),
            line: 0,
            line_len: 0,
            op_start: 0,
            cursor: Cursor {
                rest: Span::new_extra("", ""),
                from: 0,
                to: 0,
            },
            warnings: Vec::new(),
        }
    }

    /// Generates program and data images from assembly source code.
    pub fn assemble(mut self, source: &'a str) -> AssembleResult {
        for (i, text) in source.split('\n').enumerate() {
            self.line = i + 1;
            self.line_len = text.chars().count();
            self.cursor = Cursor {
                rest: Span::new_extra(text, text),
                from: 0,
                to: 0,
            };
            let outcome = self.parse_line();
            for (warning, columns) in std::mem::take(&mut self.warnings) {
                self.push_diagnostic(DiagnosticKind::Warning, self.line, columns, warning.to_string());
            }
            if let Err(failure) = outcome {
                self.report(failure);
            }
        }
        self.finish()
    }

    fn parse_line(&mut self) -> LineResult<()> {
        self.search(lexer::whitespace);
        if self.search(lexer::comment).is_some() {
            return Ok(());
        }
        if let Some(def) = self.search(lexer::label_definition) {
            self.define_label(def)?;
            self.search(lexer::whitespace);
            if self.search(lexer::comment).is_some() {
                return Ok(());
            }
        }
        self.operation()?;
        self.search(lexer::whitespace);
        if self.search(lexer::comment).is_some() {
            return Ok(());
        }
        if self.search(lexer::remainder).is_some() {
            self.warn(AsmWarning::UnexpectedInput);
        }
        Ok(())
    }

    fn define_label(&mut self, def: LabelDef) -> LineResult<()> {
        if self.pending_label.is_some() {
            return Err(Failure::invalid(AsmError::UnexpectedLabel).at(self.token()));
        }
        let name = if def.local {
            let scope = self
                .last_label
                .as_ref()
                .ok_or_else(|| Failure::constraint(AsmError::OrphanLocalLabel))?;
            format!("{}.{}", scope, def.name)
        } else {
            def.name.to_owned()
        };
        if def.name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Failure::invalid(AsmError::LabelStartsWithDigit).at(self.token()));
        }
        if !def
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Failure::invalid(AsmError::LabelCharacters).at(self.token()));
        }
        let address = self.instruction_address as i64;
        self.symbols
            .define(&name, address)
            .map_err(Failure::constraint)?;
        debug!("line {}: label {} = {:04X}h", self.line, name, address);
        if !def.local {
            self.last_label = Some(name.clone());
        }
        self.pending_label = Some(name);
        Ok(())
    }

    /// Runs a token parser at the cursor, advancing past the match.
    pub(super) fn search<O>(
        &mut self,
        mut parser: impl FnMut(Span<'a>) -> nom::IResult<Span<'a>, O>,
    ) -> Option<O> {
        let (rest, out) = parser(self.cursor.rest).ok()?;
        self.cursor = Cursor {
            rest,
            from: self.cursor.to,
            to: column(rest),
        };
        Some(out)
    }

    /// Columns of the last matched token.
    pub(super) fn token(&self) -> Range<usize> {
        self.cursor.from..self.cursor.to
    }

    pub(super) fn warn(&mut self, warning: AsmWarning) {
        let columns = self.token();
        self.warnings.push((warning, columns));
    }

    /// Tries `count` alternatives in order, returning the first that matches.
    ///
    /// A failed alternative is rewound, together with any warnings it raised. If all of them
    /// fail, their messages are combined into one no-match failure.
    pub(super) fn first_match<O>(
        &mut self,
        count: usize,
        mut attempt: impl FnMut(&mut Self, usize) -> LineResult<O>,
    ) -> LineResult<O> {
        let cursor = self.cursor;
        let warnings = self.warnings.len();
        let mut messages = Vec::with_capacity(count);
        for i in 0..count {
            match attempt(self, i) {
                Ok(out) => return Ok(out),
                Err(failure) if failure.backtracks() => {
                    self.cursor = cursor;
                    self.warnings.truncate(warnings);
                    messages.push(failure.error.to_string());
                }
                Err(failure) => return Err(failure),
            }
        }
        Err(Failure::no_match(AsmError::NoAlternative(messages)))
    }

    /// Parses the first argument of an operation, after optional whitespace.
    pub(super) fn first_arg<O>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> LineResult<O>,
    ) -> LineResult<O> {
        self.search(lexer::whitespace);
        parse(self)
    }

    /// Parses a following argument. A missing comma is only a warning.
    pub(super) fn next_arg<O>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> LineResult<O>,
    ) -> LineResult<O> {
        let comma = self.search(lexer::separator).unwrap_or(false);
        let out = parse(self)?;
        if !comma {
            self.warn(AsmWarning::MissingComma);
        }
        Ok(out)
    }

    pub(super) fn register(&mut self) -> LineResult<Register> {
        let token = self
            .search(lexer::register)
            .ok_or_else(|| Failure::no_match(AsmError::Expecting("register")))?;
        match token {
            RegisterToken::Sp => {
                self.warn(AsmWarning::StackPointerAlias);
                Ok(Register::SP)
            }
            RegisterToken::Index(i) => u8::try_from(i)
                .ok()
                .and_then(|i| Register::try_from(i).ok())
                .ok_or_else(|| Failure::invalid(AsmError::InvalidRegister(i)).at(self.token())),
        }
    }

    pub(super) fn constant(&mut self) -> LineResult<i64> {
        let numeral = self
            .search(lexer::numeral)
            .ok_or_else(|| Failure::no_match(AsmError::Expecting("constant")))?;
        numeral
            .value()
            .map_err(|e| Failure::invalid(e).at(self.token()))
    }

    /// A quoted string, as the code of each character.
    pub(super) fn string(&mut self) -> LineResult<Vec<i64>> {
        if self.search(lexer::quote).is_none() {
            return Err(Failure::no_match(AsmError::Expecting("string")));
        }
        let mut codes = Vec::new();
        while let Some(c) = self.search(lexer::string_char) {
            let code = self.char_value(c);
            codes.push(code);
        }
        if self.search(lexer::quote).is_none() {
            return Err(Failure::no_match(AsmError::MissingQuote));
        }
        Ok(codes)
    }

    fn char_value(&mut self, c: char) -> i64 {
        match self.options.charset.encode(c) {
            Some(code) => code as i64,
            None => {
                self.warn(AsmWarning::InvalidCharacter(c));
                0x20
            }
        }
    }

    pub(super) fn character(&mut self) -> LineResult<i64> {
        match self.string()?[..] {
            [code] => Ok(code),
            _ => Err(Failure::no_match(AsmError::NotACharacter)),
        }
    }

    pub(super) fn constant_or_char(&mut self) -> LineResult<i64> {
        self.first_match(2, |p, i| match i {
            0 => p.character(),
            _ => p.constant(),
        })
    }

    /// `M[Rx]`
    pub(super) fn address(&mut self) -> LineResult<Register> {
        if self.search(lexer::memory_open).is_none() {
            return Err(Failure::no_match(AsmError::Expecting("M")));
        }
        if self.search(lexer::bracket_open).is_none() {
            return Err(Failure::no_match(AsmError::Expecting("[")));
        }
        let rx = self.register()?;
        if self.search(lexer::bracket_close).is_none() {
            return Err(Failure::no_match(AsmError::Expecting("]")));
        }
        Ok(rx)
    }

    pub(super) fn label(&mut self) -> LineResult<Value> {
        let reference = self
            .search(lexer::label_reference)
            .ok_or_else(|| Failure::constraint(AsmError::Expecting("label")))?;
        let name = match reference.scope {
            None => reference.name.to_owned(),
            Some(Some(scope)) => format!("{}.{}", scope, reference.name),
            Some(None) => format!(
                "{}.{}",
                self.last_label.as_deref().unwrap_or_default(),
                reference.name
            ),
        };
        Ok(Value::Symbol(SymbolUse {
            id: self.symbols.intern(&name),
            columns: self.token(),
        }))
    }

    pub(super) fn constant_or_label(&mut self) -> LineResult<Value> {
        self.first_match(2, |p, i| match i {
            0 => p.constant_or_char().map(Value::Const),
            _ => p.label(),
        })
    }

    /// Resolves a value during the first pass, for directives whose size depends on it.
    pub(super) fn resolve_now(&self, value: &Value) -> LineResult<i64> {
        self.resolve(value).map_err(|mut failure| {
            failure.class = Class::Constraint;
            failure
        })
    }

    /// The filler after a branch, unless the programmer supplies delay slots.
    pub(super) fn delay_slot(&self) -> Option<Encoder> {
        (!self.options.delay_slots).then_some(Encoder::Ready(Instruction::Nop))
    }

    /// Places instructions at consecutive program addresses, then releases the pending label.
    pub(super) fn emit(&mut self, encoders: impl IntoIterator<Item = Encoder>) -> LineResult<()> {
        let columns = self.op_start..self.cursor.to;
        for encoder in encoders {
            if self.instruction_address >= MEMORY_WORDS {
                return Err(Failure::constraint(AsmError::EndOfMemory));
            }
            let addr = self.instruction_address as Word;
            if self.program.contains_key(&addr) {
                return Err(Failure::constraint(AsmError::Overlap));
            }
            trace!("line {}: {:04X}h {:?}", self.line, addr, encoder);
            self.program.insert(
                addr,
                Pending {
                    line: self.line,
                    columns: columns.clone(),
                    encoder,
                },
            );
            self.steps.insert(addr, self.line);
            self.instruction_address += 1;
        }
        self.pending_label = None;
        Ok(())
    }

    /// Places a word at the next data address. `columns` locate the item it came from.
    pub(super) fn emit_data(&mut self, value: Value, columns: Range<usize>) -> LineResult<()> {
        if self.data_address >= MEMORY_WORDS {
            return Err(Failure::constraint(AsmError::EndOfMemory));
        }
        let addr = self.data_address as Word;
        if self.data.contains_key(&addr) {
            return Err(Failure::constraint(AsmError::DataOverlap));
        }
        self.data.insert(
            addr,
            DataEntry {
                line: self.line,
                columns,
                value,
            },
        );
        self.data_address += 1;
        Ok(())
    }

    fn report(&mut self, failure: Failure) {
        let (kind, columns) = match failure.class {
            Class::NoMatch => (DiagnosticKind::Syntax, self.cursor.to..self.line_len),
            Class::Constraint => (
                DiagnosticKind::Syntax,
                failure.columns.unwrap_or_else(|| self.token()),
            ),
            Class::Invalid => (
                DiagnosticKind::InvalidMatch,
                failure.columns.unwrap_or_else(|| self.token()),
            ),
        };
        debug!("line {}: {}", self.line, failure.error);
        self.push_diagnostic(kind, self.line, columns, failure.error.to_string());
    }

    fn push_diagnostic(
        &mut self,
        kind: DiagnosticKind,
        line: usize,
        columns: Range<usize>,
        message: String,
    ) {
        let severity = if kind == DiagnosticKind::Warning {
            self.stats.warnings += 1;
            Severity::Warning
        } else {
            self.stats.errors += 1;
            Severity::Error
        };
        self.diagnostics.push(Diagnostic {
            severity,
            kind,
            line,
            columns,
            message,
        });
    }

    fn resolve(&self, value: &Value) -> LineResult<i64> {
        match value {
            Value::Const(c) => Ok(*c),
            Value::Symbol(usage) => self.symbols.value(usage.id).ok_or_else(|| {
                Failure::invalid(AsmError::UndefinedLabel(
                    self.symbols.name(usage.id).to_owned(),
                ))
                .at(usage.columns.clone())
            }),
        }
    }

    fn encode(&self, encoder: &Encoder) -> LineResult<Instruction> {
        Ok(match *encoder {
            Encoder::Ready(instr) => instr,
            Encoder::Branch {
                cond,
                ref dest,
                origin,
            } => {
                let disp = match dest {
                    Value::Const(c) => *c,
                    Value::Symbol(usage) => {
                        let offset = self.resolve(dest)? - origin as i64;
                        if !(-128..=255).contains(&offset) {
                            return Err(Failure::invalid(AsmError::BranchOutOfReach(offset))
                                .at(usage.columns.clone()));
                        }
                        offset
                    }
                };
                Instruction::Br {
                    cond,
                    offset: to_unsigned8(disp)? as i8,
                }
            }
            Encoder::Immediate {
                op,
                rc,
                ref value,
                part,
            } => {
                let value = self.resolve(value)?;
                let imm = to_unsigned8(match part {
                    Part::Whole => value,
                    Part::High => value >> 8,
                    Part::Low => value & 0xFF,
                })?;
                match op {
                    ImmediateOp::Mvi => Instruction::Mvi { rc, imm },
                    ImmediateOp::Mvih => Instruction::Mvih { rc, imm },
                    ImmediateOp::Mvil => Instruction::Mvil { rc, imm },
                }
            }
            Encoder::Interrupt(ref value) => Instruction::Int(to_unsigned8(self.resolve(value)?)?),
        })
    }

    /// Second pass: resolve every deferred value now that all labels are known.
    fn finish(mut self) -> AssembleResult {
        let mut program = vec![0; MEMORY_WORDS];
        let mut data = vec![0; MEMORY_WORDS];
        let pending = std::mem::take(&mut self.program);
        for (&addr, p) in pending.iter() {
            match self.encode(&p.encoder) {
                Ok(instr) => program[addr as usize] = instr.to_word(),
                Err(failure) => {
                    let columns = failure.columns.unwrap_or_else(|| p.columns.clone());
                    self.push_diagnostic(
                        DiagnosticKind::Semantic,
                        p.line,
                        columns,
                        failure.error.to_string(),
                    );
                }
            }
        }
        let entries = std::mem::take(&mut self.data);
        for (&addr, entry) in entries.iter() {
            match self.resolve(&entry.value).and_then(to_data_word) {
                Ok(word) => data[addr as usize] = word,
                Err(failure) => {
                    let columns = failure.columns.unwrap_or_else(|| entry.columns.clone());
                    self.push_diagnostic(
                        DiagnosticKind::Semantic,
                        entry.line,
                        columns,
                        failure.error.to_string(),
                    );
                }
            }
        }
        self.stats.instructions = pending.len();
        self.stats.data_usage = entries.len();
        debug!(
            "assembled {} instructions, {} data words, {} errors",
            self.stats.instructions, self.stats.data_usage, self.stats.errors
        );
        AssembleResult {
            program,
            data,
            labels: self
                .symbols
                .defined()
                .map(|(name, value)| (name.to_owned(), value))
                .collect(),
            diagnostics: self.diagnostics,
            stats: self.stats,
            steps: self.steps,
        }
    }
}

/// Checks that `n` fits a data word, as either a signed or an unsigned value.
fn to_data_word(n: i64) -> LineResult<Word> {
    if !(-32768..=65535).contains(&n) {
        return Err(Failure::constraint(AsmError::ConstantOverflow));
    }
    Ok((n & 0xFFFF) as Word)
}

/// Checks that `n` fits an 8-bit field, as either a signed or an unsigned byte.
fn to_unsigned8(n: i64) -> LineResult<u8> {
    if !(-128..=255).contains(&n) {
        return Err(Failure::invalid(AsmError::ConstantRange(-128, 255)));
    }
    Ok((n & 0xFF) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    fn messages(result: &AssembleResult) -> Vec<String> {
        result.diagnostics.iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn test_assemble() {
        let result = assemble("MVI R1, 5\nADD R1, R1, R1\n");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(result.stats.instructions, 2);
        assert_eq!(result.program[..3], [0xC805, 0x8809, 0]);
    }

    #[test]
    fn test_forward_and_backward_labels() {
        let program = "
        JMP     Fwd
Back:   NOP
Fwd:    MVI     R1, Back
        MVI     R2, Fwd
";
        let result = assemble(program);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(result.label("Back"), Some(4));
        assert_eq!(result.label("Fwd"), Some(5));
        assert_eq!(result.program[..4], [0xFA00, 0xFB05, 0x2107, 0]);
        assert_eq!(result.program[5..9], [0xCA00, 0xCB04, 0xD200, 0xD305]);
    }

    #[test]
    fn test_duplicate_label() {
        let result = assemble("A: NOP\nA: NOP");
        assert_eq!(result.stats.errors, 1);
        assert_eq!(result.diagnostics[0].line, 2);
        assert_eq!(result.diagnostics[0].message, "Label A already defined.");
    }

    #[test]
    fn test_rejected_label_binds_nothing() {
        let program = "
Main:   NOP
1bad:
.l:     NOP
Good:   NOP
A:      NOP
A:
B:      NOP
";
        let result = assemble(program);
        assert_eq!(
            messages(&result),
            ["Labels may not begin with a number.", "Label A already defined."]
        );
        // `.l` is scoped under the last label that was accepted
        assert_eq!(result.label("Main.l"), Some(1));
        assert_eq!(result.label("Good"), Some(2));
        assert_eq!(result.label("B"), Some(4));
    }

    #[test]
    fn test_branch_reach() {
        let far = |gap: u32| assemble(&format!("BR Far\nORIG {}\nFar: NOP", gap));
        let ok = far(255);
        assert!(ok.diagnostics.is_empty(), "{:?}", ok.diagnostics);
        assert_eq!(ok.program[0], 0x11FF);
        let err = far(256);
        assert_eq!(messages(&err), ["Relative branch out of reach, offset: 256."]);
        assert_eq!(err.diagnostics[0].kind, DiagnosticKind::Semantic);

        let back = |gap: u32| assemble(&format!("Back: NOP\nORIG {}\nBR Back", gap));
        let ok = back(128);
        assert!(ok.diagnostics.is_empty(), "{:?}", ok.diagnostics);
        assert_eq!(ok.program[128], 0x1180);
        assert_eq!(
            messages(&back(129)),
            ["Relative branch out of reach, offset: -129."]
        );
    }

    #[test]
    fn test_local_labels() {
        let program = "
Main:   NOP
.loop:  BR      .loop
        BR.NZ   Main.loop
";
        let result = assemble(program);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(result.label("Main.loop"), Some(1));
        assert_eq!(result.program[1..5], [0x1100, 0, 0x13FE, 0]);

        let orphan = assemble(".x: NOP");
        assert_eq!(
            messages(&orphan),
            ["Local labels must be under a non-local label."]
        );
    }

    #[test]
    fn test_delay_slots() {
        let filled = assemble("BR 3\nINC R1");
        assert_eq!(filled.stats.instructions, 3);
        assert_eq!(filled.program[..3], [0x1103, 0, 0x8948]);

        let exposed = assemble("OPT ENABLE_DELAY_SLOTS\nBR 3\nINC R1");
        assert_eq!(exposed.stats.instructions, 2);
        assert_eq!(exposed.stats.pseudo_instructions, 1);
        assert_eq!(exposed.program[..2], [0x1103, 0x8948]);
    }

    #[test]
    fn test_convenience_expansions() {
        let push = assemble("PUSH R1\nPOP R2");
        assert_eq!(push.stats.warnings, 2);
        assert_eq!(push.program[..4], [0x430E, 0xB130, 0xB170, 0x5206]);

        let implied = assemble("ADD R1, R2");
        assert_eq!(
            messages(&implied),
            ["This instruction must have 3 parameters, replaced with: ADD R1, R1, R2."]
        );
        assert_eq!(implied.program[0], 0x880A);

        let shifts = assemble("SHL R2, 3");
        assert_eq!(shifts.stats.instructions, 3);
        assert_eq!(shifts.program[..3], [0x9450; 3]);
        assert_eq!(
            messages(&assemble("SHL R2, 17")),
            ["Constant cannot be higher than 16."]
        );
    }

    #[test]
    fn test_call_and_return() {
        let result = assemble("CALL Sub\nSub: RET");
        assert_eq!(result.label("Sub"), Some(8));
        assert_eq!(
            result.program[..12],
            [0xFA00, 0xFB08, 0x433E, 0xB130, 0xFA00, 0xFB08, 0x2107, 0, 0xB170, 0x7A06, 0x2107, 0]
        );
    }

    #[test]
    fn test_registers() {
        let bad = assemble("MOV R8, R1");
        assert_eq!(bad.diagnostics[0].kind, DiagnosticKind::InvalidMatch);
        assert_eq!(
            bad.diagnostics[0].message,
            "Invalid register index: 8. Only indexes from 0 to 7 are allowed."
        );
        let sp = assemble("MOV SP, R1");
        assert_eq!(sp.stats.warnings, 1);
        assert_eq!(sp.program[0], 0x7001);
        let comma = assemble("MOV R1 R2");
        assert_eq!(messages(&comma), ["Arguments must be separated by a: ,"]);
        assert_eq!(comma.program[0], 0x4802);
    }

    #[test]
    fn test_move_forms() {
        let result = assemble("MOV R1, M[R2]\nMOV M[R3], R4\nMOV R5, 1234h\nMVI R1, -1\nMVI R1, 'A'");
        assert_eq!(result.stats.warnings, 3);
        assert_eq!(
            result.program[..7],
            [0x4A02, 0x4323, 0xEA12, 0xEB34, 0xCAFF, 0xCBFF, 0xC841]
        );
    }

    #[test]
    fn test_data_directives() {
        let program = "
N       EQU     10
Msg     STR     'Hi', 0
Tab     TAB     3
Ptr     WORD    Tab
        MVI     R1, N
";
        let result = assemble(program);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(result.data[..7], [72, 105, 0, 0, 0, 0, 3]);
        assert_eq!(result.label("N"), Some(10));
        assert_eq!(result.label("Ptr"), Some(6));
        // a symbol operand always takes the two-word form
        assert_eq!(result.program[..2], [0xCA00, 0xCB0A]);
        assert_eq!(result.stats.pseudo_instructions, 4);
        assert_eq!(result.stats.data_usage, 7);

        let quoted = assemble("S STR 'It''s'");
        assert_eq!(quoted.data[..4], [73, 116, 39, 115]);
    }

    #[test]
    fn test_data_word_range() {
        let result = assemble("A WORD -32768
B WORD 65535
C STR -1, 1000");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(result.data[..4], [0x8000, 0xFFFF, 0xFFFF, 1000]);

        let result = assemble("N EQU 65536
X WORD N
Y STR 0, -32769");
        assert_eq!(
            messages(&result),
            ["Constant is too large.", "Constant is too large."]
        );
        assert_eq!(result.diagnostics[0].line, 2);
        assert_eq!(result.diagnostics[0].columns, 7..8);
        assert_eq!(result.diagnostics[1].line, 3);
        assert_eq!(result.diagnostics[1].columns, 9..15);
        assert_eq!(result.diagnostics[1].kind, DiagnosticKind::Semantic);
        // the bad words are left clear
        assert_eq!(result.data[..3], [0, 0, 0]);
    }

    #[test]
    fn test_charset_switch() {
        let native = assemble("S STR '€'");
        assert_eq!(native.stats.warnings, 1);
        assert_eq!(native.data[0], 0x20);
        let unicode = assemble("OPT UNICODE\nS STR '€'");
        assert_eq!(unicode.stats.warnings, 0);
        assert_eq!(unicode.data[0], 0x20AC);
    }

    #[test]
    fn test_directive_errors() {
        assert_eq!(
            messages(&assemble("L:\nX EQU 3")),
            ["Pseudo-instructions cannot have labels."]
        );
        assert_eq!(messages(&assemble("FOO R1")), ["FOO isn't an operation."]);
        assert_eq!(
            messages(&assemble("FOO")),
            ["Expecting: EQU, WORD, STR or TAB"]
        );
        assert_eq!(messages(&assemble("ORIG -1")), ["Address must be positive."]);
        assert_eq!(messages(&assemble("OPT FAST")), ["FAST isn't a recognized option."]);
        assert_eq!(
            messages(&assemble("NOP\nORIG 0\nNOP")),
            ["This instruction overlaps another instruction."]
        );
    }

    #[test]
    fn test_lenient_lines() {
        let result = assemble("NOP junk ; comment\n  ; only a comment\n\nCLC");
        assert_eq!(messages(&result), ["Unexpected input."]);
        assert_eq!(result.diagnostics[0].columns, 4..18);
        assert_eq!(result.stats.instructions, 2);
        assert_eq!(result.steps.get(&1), Some(&4));
    }

    #[test]
    fn test_undefined_label() {
        let result = assemble("JMP Nowhere");
        assert!(result.has_errors());
        assert!(result
            .errors()
            .all(|d| d.message == "Undefined label: Nowhere" && d.columns == (4..11)));
    }

    #[test]
    fn test_errors_do_not_stop_assembly() {
        let result = assemble("MOV R1\nBAD R9, R9\nMVI R2, 7");
        assert_eq!(result.stats.errors, 2);
        assert_eq!(result.program[0], 0xD007);
    }
}
