//! Token parsers for P4 assembly source.
//!
//! Every parser here is anchored at the start of its input and never skips leading
//! whitespace on its own; the assembler decides where whitespace is allowed.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take, take_till1, take_while, take_while1},
    character::complete::{char, digit1, hex_digit1, multispace0, multispace1, none_of, one_of, satisfy},
    combinator::{eof, map, map_res, not, opt, peek, recognize, value},
    error::{Error, ErrorKind},
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

use super::{AsmError, Span};

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn word_boundary(inp: Span) -> IResult<Span, ()> {
    not(peek(satisfy(is_word_char)))(inp)
}

/// `[a-z_]\w*`
pub fn identifier(inp: Span) -> IResult<Span, Span> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_word_char),
    ))(inp)
}

/// `\s+`
pub fn whitespace(inp: Span) -> IResult<Span, Span> {
    multispace1(inp)
}

/// The start of a comment, which runs to the end of the line.
pub fn comment(inp: Span) -> IResult<Span, Span> {
    tag(";")(inp)
}

pub fn end_of_line(inp: Span) -> IResult<Span, Span> {
    eof(inp)
}

/// Everything left on the line.
pub fn remainder(inp: Span) -> IResult<Span, Span> {
    take_while1(|_: char| true)(inp)
}

/// A label definition as written at the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelDef<'a> {
    /// Written with a leading `.`, scoped under the last non-local label.
    pub local: bool,
    pub name: &'a str,
}

/// `(\.)?name:` where `name` is everything up to the last `:` of the first non-blank run.
///
/// The name is not validated here, so that malformed names can be reported precisely.
pub fn label_definition<'a>(inp: Span<'a>) -> IResult<Span<'a>, LabelDef<'a>> {
    let (_, run) = take_till1(|c: char| c.is_whitespace())(inp)?;
    let run: &'a str = run.fragment();
    let colon = run
        .rfind(':')
        .ok_or_else(|| nom::Err::Error(Error::new(inp, ErrorKind::Char)))?;
    let text = &run[..colon];
    let (rest, _) = take(text.chars().count() + 1)(inp)?;
    let def = match text.strip_prefix('.') {
        Some(name) if !name.is_empty() => LabelDef { local: true, name },
        _ => LabelDef {
            local: false,
            name: text,
        },
    };
    if def.name.is_empty() {
        return Err(nom::Err::Error(Error::new(inp, ErrorKind::Char)));
    }
    Ok((rest, def))
}

/// `[a-z_][\w.]*`, an operation name with an optional condition suffix.
pub fn mnemonic(inp: Span) -> IResult<Span, Span> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c| is_word_char(c) || c == '.'),
    ))(inp)
}

/// `\s+name`, the directive following a symbol name.
pub fn directive(inp: Span) -> IResult<Span, Span> {
    preceded(multispace1, identifier)(inp)
}

/// `[\w-]+`, the argument of `OPT`.
pub fn option_name(inp: Span) -> IResult<Span, Span> {
    take_while1(|c| is_word_char(c) || c == '-')(inp)
}

/// A register as written in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterToken {
    /// `R<n>`, not yet range checked.
    Index(u64),
    /// `SP`, an alias for `R6`.
    Sp,
}

pub fn register(inp: Span) -> IResult<Span, RegisterToken> {
    terminated(
        alt((
            map(
                preceded(
                    tag_no_case("r"),
                    map_res(digit1, |d: Span| d.fragment().parse::<u64>()),
                ),
                RegisterToken::Index,
            ),
            value(RegisterToken::Sp, tag_no_case("sp")),
        )),
        word_boundary,
    )(inp)
}

/// A numeric literal with its radix suffix, not yet converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Numeral<'a> {
    pub negative: bool,
    pub digits: &'a str,
    pub radix: u32,
}

impl<'a> Numeral<'a> {
    /// Converts the digits, checking that they are valid in the literal's radix.
    pub fn value(&self) -> Result<i64, AsmError> {
        let valid = match self.radix {
            2 => self.digits.chars().all(|c| matches!(c, '0' | '1')),
            8 => self.digits.chars().all(|c| matches!(c, '0'..='7')),
            10 => self.digits.chars().all(|c| c.is_ascii_digit()),
            _ => true,
        };
        if !valid {
            return Err(match self.radix {
                2 => AsmError::BadBinary,
                8 => AsmError::BadOctal,
                _ => AsmError::BadDecimal,
            });
        }
        let n = i64::from_str_radix(self.digits, self.radix)
            .map_err(|_| AsmError::ConstantOverflow)?;
        Ok(if self.negative { -n } else { n })
    }
}

/// `-?([0-9a-f]+h|[0-9]+[bdo]?)` not followed by a word character.
///
/// Note that a word made only of hex letters and ending in `h` (like `addh`) is a constant.
pub fn numeral<'a>(inp: Span<'a>) -> IResult<Span<'a>, Numeral<'a>> {
    let (rest, (negative, body)) = pair(
        opt(char('-')),
        alt((
            terminated(recognize(pair(hex_digit1, one_of("hH"))), word_boundary),
            terminated(recognize(pair(digit1, opt(one_of("bdoBDO")))), word_boundary),
        )),
    )(inp)?;
    let text: &'a str = body.fragment();
    let (digits, radix) = match text.chars().last().map(|c| c.to_ascii_lowercase()) {
        Some('h') => (&text[..text.len() - 1], 16),
        Some('b') => (&text[..text.len() - 1], 2),
        Some('o') => (&text[..text.len() - 1], 8),
        Some('d') => (&text[..text.len() - 1], 10),
        _ => (text, 10),
    };
    Ok((
        rest,
        Numeral {
            negative: negative.is_some(),
            digits,
            radix,
        },
    ))
}

pub fn quote(inp: Span) -> IResult<Span, char> {
    char('\'')(inp)
}

/// One character inside a quoted string; `''` is an escaped quote.
pub fn string_char(inp: Span) -> IResult<Span, char> {
    alt((value('\'', tag("''")), none_of("'")))(inp)
}

/// A reference to a label, optionally scoped as `Scope.name` or `.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRef<'a> {
    /// `None` when unscoped, `Some(None)` for `.name`, `Some(Some(scope))` for `Scope.name`.
    pub scope: Option<Option<&'a str>>,
    pub name: &'a str,
}

pub fn label_reference<'a>(inp: Span<'a>) -> IResult<Span<'a>, LabelRef<'a>> {
    alt((
        map(
            tuple((opt(identifier), char('.'), identifier)),
            |(scope, _, name): (Option<Span<'a>>, char, Span<'a>)| LabelRef {
                scope: Some(scope.map(|s| *s.fragment())),
                name: *name.fragment(),
            },
        ),
        map(identifier, |name: Span<'a>| LabelRef {
            scope: None,
            name: *name.fragment(),
        }),
    ))(inp)
}

/// `\s*,\s*|\s+`, returning whether a comma was present.
pub fn separator(inp: Span) -> IResult<Span, bool> {
    alt((
        value(true, tuple((multispace0, char(','), multispace0))),
        value(false, multispace1),
    ))(inp)
}

/// `\s*,\s*`
pub fn comma(inp: Span) -> IResult<Span, bool> {
    value(true, tuple((multispace0, char(','), multispace0)))(inp)
}

pub fn memory_open(inp: Span) -> IResult<Span, Span> {
    tag_no_case("m")(inp)
}

pub fn bracket_open(inp: Span) -> IResult<Span, Span> {
    tag("[")(inp)
}

pub fn bracket_close(inp: Span) -> IResult<Span, Span> {
    tag("]")(inp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(s: &str) -> Span {
        Span::new_extra(s, s)
    }

    #[test]
    fn test_label_definition() {
        let (rest, def) = label_definition(span("loop: MOV R1, R2")).unwrap();
        assert_eq!(def, LabelDef { local: false, name: "loop" });
        assert_eq!(*rest.fragment(), " MOV R1, R2");

        let (_, def) = label_definition(span(".again:")).unwrap();
        assert_eq!(def, LabelDef { local: true, name: "again" });

        assert!(label_definition(span("MOV R1, x:")).is_err());
    }

    #[test]
    fn test_register() {
        assert_eq!(register(span("r3, r4")).unwrap().1, RegisterToken::Index(3));
        assert_eq!(register(span("SP")).unwrap().1, RegisterToken::Sp);
        assert_eq!(register(span("R12")).unwrap().1, RegisterToken::Index(12));
        assert!(register(span("r1x")).is_err());
        assert!(register(span("rx")).is_err());
    }

    #[test]
    fn test_numeral() {
        let value = |s| numeral(span(s)).unwrap().1.value().unwrap();
        assert_eq!(value("42"), 42);
        assert_eq!(value("-42d"), -42);
        assert_eq!(value("FFh"), 255);
        assert_eq!(value("1010b"), 10);
        assert_eq!(value("17o"), 15);
        assert_eq!(value("abch"), 0xABC);
        assert!(numeral(span("12x")).is_err());
        assert!(numeral(span("ab")).is_err());
        assert_eq!(numeral(span("12b")).unwrap().1.value(), Err(AsmError::BadBinary));
        assert_eq!(numeral(span("9o")).unwrap().1.value(), Err(AsmError::BadOctal));
    }

    #[test]
    fn test_label_reference() {
        let (_, r) = label_reference(span("Main.loop")).unwrap();
        assert_eq!(r, LabelRef { scope: Some(Some("Main")), name: "loop" });
        let (_, r) = label_reference(span(".loop")).unwrap();
        assert_eq!(r, LabelRef { scope: Some(None), name: "loop" });
        let (rest, r) = label_reference(span("end.")).unwrap();
        assert_eq!(r, LabelRef { scope: None, name: "end" });
        assert_eq!(*rest.fragment(), ".");
    }

    #[test]
    fn test_separator() {
        assert!(separator(span(" , R1")).unwrap().1);
        assert!(!separator(span("  R1")).unwrap().1);
        assert!(separator(span("R1")).is_err());
    }

    #[test]
    fn test_string_char() {
        assert_eq!(string_char(span("''x")).unwrap().1, '\'');
        assert_eq!(string_char(span("ab")).unwrap().1, 'a');
        assert!(string_char(span("'")).is_err());
    }
}
