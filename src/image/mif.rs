//! Memory Initialization Files: a textual, run-length encoded memory dump.
//!
//! ```text
//! WIDTH=16;
//! DEPTH=32768;
//!
//! ADDRESS_RADIX=HEX;
//! DATA_RADIX=HEX;
//!
//! CONTENT BEGIN
//!             0 : C805;
//!     [1..7FFF] : 0000;
//! END;
//! ```

use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_till, take_while1},
    character::complete::{char, multispace0, space0},
    combinator::{map, opt, value},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use thiserror::Error;

use crate::plat::{Word, MEMORY_WORDS};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MifError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("unknown radix: {0}")]
    UnknownRadix(String),
    #[error("invalid depth: {0}")]
    InvalidDepth(String),
    #[error("depth {0} is not between 1 and {}", MEMORY_WORDS)]
    DepthOutOfRange(usize),
    #[error("unsupported word width: {0}")]
    UnsupportedWidth(String),
    #[error("malformed content line: {0}")]
    Malformed(String),
    #[error("address {0:X} outside of declared depth")]
    AddressOutOfRange(usize),
    #[error("value does not fit in a word: {0}")]
    ValueOverflow(String),
    #[error("missing END")]
    MissingEnd,
}

/// Number base for addresses or values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Radix {
    Bin,
    Dec,
    #[default]
    Hex,
}

impl Radix {
    pub fn base(self) -> u32 {
        match self {
            Self::Bin => 2,
            Self::Dec => 10,
            Self::Hex => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bin => "BIN",
            Self::Dec => "DEC",
            Self::Hex => "HEX",
        }
    }

    /// Digits needed to print a full 16-bit word.
    fn word_digits(self) -> usize {
        match self {
            Self::Bin => 16,
            Self::Dec | Self::Hex => 4,
        }
    }

    fn format(self, n: usize) -> String {
        match self {
            Self::Bin => format!("{:b}", n),
            Self::Dec => n.to_string(),
            Self::Hex => format!("{:X}", n),
        }
    }

    fn parse(self, digits: &str) -> Option<usize> {
        usize::from_str_radix(digits, self.base()).ok()
    }
}

impl FromStr for Radix {
    type Err = MifError;

    fn from_str(s: &str) -> Result<Self, MifError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BIN" => Ok(Self::Bin),
            "DEC" | "UNS" => Ok(Self::Dec),
            "HEX" => Ok(Self::Hex),
            _ => Err(MifError::UnknownRadix(s.trim().to_owned())),
        }
    }
}

/// Renders `words` as a 16-bit wide MIF with one line per run of equal values.
pub fn generate(words: &[Word], address_radix: Radix, data_radix: Radix) -> String {
    let mut out = format!(
        "WIDTH=16;\nDEPTH={};\n\nADDRESS_RADIX={};\nDATA_RADIX={};\n\nCONTENT BEGIN\n",
        words.len(),
        address_radix.name(),
        data_radix.name()
    );
    let mut start = 0;
    while start < words.len() {
        let word = words[start];
        let run = words[start..].iter().take_while(|&&w| w == word).count();
        let end = start + run - 1;
        let addr = if run == 1 {
            address_radix.format(start)
        } else {
            format!(
                "[{}..{}]",
                address_radix.format(start),
                address_radix.format(end)
            )
        };
        let value = data_radix.format(word as usize);
        out.push_str(&format!(
            "{:>13} : {:0>width$};\n",
            addr,
            value,
            width = data_radix.word_digits()
        ));
        start = end + 1;
    }
    out.push_str("END;\n");
    out
}

fn header(input: &str) -> IResult<&str, (&str, &str)> {
    terminated(
        separated_pair(
            delimited(
                multispace0,
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
                space0,
            ),
            char('='),
            delimited(space0, take_till(|c| c == ';' || c == '\n'), char(';')),
        ),
        space0,
    )(input)
}

fn comment(input: &str) -> IResult<&str, ()> {
    value((), pair(tag("--"), take_till(|c| c == '\n')))(input)
}

fn content_begin(input: &str) -> IResult<&str, ()> {
    value(
        (),
        tuple((
            multispace0,
            tag_no_case("CONTENT"),
            multispace0,
            tag_no_case("BEGIN"),
        )),
    )(input)
}

fn digits(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_hexdigit())(input)
}

/// Either `addr` or `[from..to]`.
fn address(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    alt((
        delimited(
            char('['),
            map(
                separated_pair(
                    delimited(space0, digits, space0),
                    tag(".."),
                    delimited(space0, digits, space0),
                ),
                |(from, to)| (from, Some(to)),
            ),
            char(']'),
        ),
        map(digits, |addr| (addr, None)),
    ))(input)
}

/// One `address : value;` line of the content block.
fn entry(input: &str) -> IResult<&str, ((&str, Option<&str>), &str)> {
    terminated(
        separated_pair(
            address,
            delimited(space0, char(':'), space0),
            digits,
        ),
        preceded(space0, char(';')),
    )(input)
}

fn end(input: &str) -> IResult<&str, ()> {
    value((), pair(tag_no_case("END"), opt(preceded(space0, char(';')))))(input)
}

/// Parses a MIF into a memory image of the declared depth.
///
/// Addresses not covered by any content line are zero.
///
/// # Errors
///
/// This function will return an error if a required header is missing, a radix is unknown,
/// or a content line is malformed or out of range.
pub fn parse(content: &str) -> Result<Vec<Word>, MifError> {
    let mut depth = None;
    let mut address_radix = None;
    let mut data_radix = None;
    let mut rest = content;
    loop {
        rest = rest.trim_start();
        if let Ok((r, ())) = comment(rest) {
            rest = r;
        } else if let Ok((r, ())) = content_begin(rest) {
            rest = r;
            break;
        } else if let Ok((r, (key, val))) = header(rest) {
            match key.to_ascii_uppercase().as_str() {
                "DEPTH" => {
                    let parsed = val
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| MifError::InvalidDepth(val.trim().to_owned()))?;
                    depth = Some(parsed);
                }
                "WIDTH" if val.trim().parse::<u32>().map_or(true, |w| w > 16) => {
                    return Err(MifError::UnsupportedWidth(val.trim().to_owned()));
                }
                "ADDRESS_RADIX" => address_radix = Some(val.parse::<Radix>()?),
                "DATA_RADIX" => data_radix = Some(val.parse::<Radix>()?),
                _ => {}
            }
            rest = r;
        } else {
            return Err(MifError::MissingHeader("CONTENT BEGIN"));
        }
    }
    let depth = depth.ok_or(MifError::MissingHeader("DEPTH"))?;
    if !(1..=MEMORY_WORDS).contains(&depth) {
        return Err(MifError::DepthOutOfRange(depth));
    }
    let address_radix = address_radix.ok_or(MifError::MissingHeader("ADDRESS_RADIX"))?;
    let data_radix = data_radix.ok_or(MifError::MissingHeader("DATA_RADIX"))?;

    let mut words = vec![0; depth];
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Err(MifError::MissingEnd);
        }
        if let Ok((r, ())) = comment(rest) {
            rest = r;
            continue;
        }
        if let Ok((_, ())) = end(rest) {
            return Ok(words);
        }
        let line = rest.lines().next().unwrap_or_default();
        let (r, ((from, to), val)) =
            entry(rest).map_err(|_| MifError::Malformed(line.trim().to_owned()))?;
        let parse_address = |digits: &str| {
            address_radix
                .parse(digits)
                .ok_or_else(|| MifError::Malformed(line.trim().to_owned()))
        };
        let from = parse_address(from)?;
        let to = match to {
            Some(to) => parse_address(to)?,
            None => from,
        };
        let word = data_radix
            .parse(val)
            .and_then(|v| Word::try_from(v).ok())
            .ok_or_else(|| MifError::ValueOverflow(val.to_owned()))?;
        if to >= depth {
            return Err(MifError::AddressOutOfRange(to));
        }
        if from <= to {
            words[from..=to].fill(word);
        }
        rest = r;
    }
}
