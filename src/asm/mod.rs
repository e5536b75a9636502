//! The assembler module for P4.
//!
//! Assembly never fails as a whole: every problem becomes a [Diagnostic] attached to the
//! line it was found on, and the returned [AssembleResult] always covers the full source.

use std::{collections::BTreeMap, fmt, ops::Range};

use nom_locate::LocatedSpan;
use thiserror::Error;

use crate::plat::{charset::Charset, Word, MEMORY_WORDS};

pub mod assembler;
pub mod lexer;
mod operations;
pub mod symbols;

pub use assembler::Assembler;

pub type Span<'a> = LocatedSpan<&'a str, &'a str>;

/// An error for the assembler module of P4.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("Expecting: {0}")]
    Expecting(&'static str),
    #[error("{}", .0.join(" or "))]
    NoAlternative(Vec<String>),
    #[error("Missing closing quote.")]
    MissingQuote,
    #[error("Constant must have exactly one character.")]
    NotACharacter,
    #[error("Names must begin with a letter or underscore.")]
    BadName,
    #[error("Constant cannot be higher than 16.")]
    RepeatTooHigh,
    #[error("Constant cannot be less than 1.")]
    RepeatTooLow,
    #[error("Address must be positive.")]
    NegativeAddress,
    #[error("Address must be below 65535.")]
    AddressTooHigh,
    #[error("No option.")]
    NoOption,
    #[error("Pseudo-instructions cannot have labels.")]
    LabelledDirective,
    #[error("Local labels must be under a non-local label.")]
    OrphanLocalLabel,
    #[error("Label {0} already defined.")]
    DuplicateLabel(String),
    #[error("End of memory reached.")]
    EndOfMemory,
    #[error("This instruction overlaps another instruction.")]
    Overlap,
    #[error("Memory location already used.")]
    DataOverlap,
    #[error("Invalid register index: {0}. Only indexes from 0 to 7 are allowed.")]
    InvalidRegister(u64),
    #[error("Binary constant can only contain 0 or 1.")]
    BadBinary,
    #[error("Decimal constant can only contain digits from 0 to 9.")]
    BadDecimal,
    #[error("Octal constant can only contain digits from 0 to 7.")]
    BadOctal,
    #[error("Constant is too large.")]
    ConstantOverflow,
    #[error("Constant value must be between {0} and {1}.")]
    ConstantRange(i64, i64),
    #[error("{0} isn't a recognized option.")]
    UnknownOption(String),
    #[error("{0} isn't an operation.")]
    UnknownOperation(String),
    #[error("Expecting: EQU, WORD, STR or TAB")]
    ExpectingDirective,
    #[error("Unexpected label, expecting instruction for previous label.")]
    UnexpectedLabel,
    #[error("Labels may not begin with a number.")]
    LabelStartsWithDigit,
    #[error("Labels may only contain letters, numbers and underscores.")]
    LabelCharacters,
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),
    #[error("Relative branch out of reach, offset: {0}.")]
    BranchOutOfReach(i64),
}

/// A non-fatal assembler finding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmWarning {
    #[error("P4 doesn't have an SP register, replaced with R6.")]
    StackPointerAlias,
    #[error("'{0}' is not a valid character in the current encoding.")]
    InvalidCharacter(char),
    #[error("Arguments must be separated by a: ,")]
    MissingComma,
    #[error("Unexpected input.")]
    UnexpectedInput,
    #[error("This instruction must have 3 parameters, replaced with: {0}.")]
    ImpliedOperand(String),
    #[error("This instruction doesn't accept a second parameter, replaced with: {0}.")]
    Repeated(String),
    #[error("This is not a P4 operation, replaced with: {0}.")]
    Substituted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Where in the assembly process a diagnostic was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// No applicable pattern matched.
    Syntax,
    /// A pattern matched but its value violates a constraint.
    InvalidMatch,
    /// Found while resolving labels after the whole source was read.
    Semantic,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// 1-based source line.
    pub line: usize,
    /// 0-based character columns.
    pub columns: Range<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        write!(
            f,
            "[{}] {}:{}-{} {}",
            severity, self.line, self.columns.start, self.columns.end, self.message
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub errors: usize,
    pub warnings: usize,
    /// Machine instructions emitted, which is also the program memory in use.
    pub instructions: usize,
    pub pseudo_instructions: usize,
    pub data_usage: usize,
}

impl Stats {
    pub fn program_usage(&self) -> usize {
        self.instructions
    }
}

/// The initial state of the switches that `OPT` changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerOptions {
    /// When set, the instruction written after a branch is its delay slot.
    /// Otherwise a `NOP` is inserted there.
    pub delay_slots: bool,
    pub charset: Charset,
}

/// Everything produced by assembling one source text.
#[derive(Debug, Clone)]
pub struct AssembleResult {
    pub program: Vec<Word>,
    pub data: Vec<Word>,
    /// Labels and constants in definition order.
    pub labels: Vec<(String, i64)>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: Stats,
    /// Source line (1-based) of every assembled program address.
    pub steps: BTreeMap<Word, usize>,
}

impl AssembleResult {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.stats.errors > 0
    }

    pub fn label(&self, name: &str) -> Option<i64> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, value)| value)
    }

    /// Percentage of a memory space in use.
    pub fn usage_percent(words: usize) -> f64 {
        words as f64 * 100.0 / MEMORY_WORDS as f64
    }
}

/// Assembles `source` with the default options.
pub fn assemble(source: &str) -> AssembleResult {
    Assembler::new(AssemblerOptions::default()).assemble(source)
}
