//! Character encodings for string and character literals, and for the terminal and LCD peripherals.

/// Code page 437 glyphs. Index 0 has no printable glyph.
const CP437: [char; 256] = [
    '\0', '☺', '☻', '♥', '♦', '♣', '♠', '•', '◘', '○', '◙', '♂', '♀', '♪', '♫', '☼', //
    '►', '◄', '↕', '‼', '¶', '§', '▬', '↨', '↑', '↓', '→', '←', '∟', '↔', '▲', '▼', //
    ' ', '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '@', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '[', '\\', ']', '^', '_', //
    '`', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '{', '|', '}', '~', '⌂', //
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// How character literals are turned into data words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// The 8-bit native code page (CP437).
    #[default]
    Native,
    /// The first UTF-16 code unit of the character.
    Unicode,
}

impl Charset {
    /// Encodes a character, or returns `None` if it has no code in this charset.
    pub fn encode(self, c: char) -> Option<u16> {
        match self {
            Self::Native => from_char(c).map(u16::from),
            Self::Unicode => {
                let mut buf = [0u16; 2];
                c.encode_utf16(&mut buf).first().copied()
            }
        }
    }
}

/// Looks up the code page index of a glyph. The unprintable index 0 is never returned.
pub fn from_char(c: char) -> Option<u8> {
    if c == '\0' {
        return None;
    }
    if (' '..='~').contains(&c) {
        return Some(c as u8);
    }
    CP437.iter().position(|&g| g == c).map(|i| i as u8)
}

/// The glyph drawn for a code page index.
pub fn to_char(code: u8) -> char {
    CP437[code as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_is_identity() {
        for c in ' '..='~' {
            assert_eq!(to_char(from_char(c).unwrap()), c);
        }
    }

    #[test]
    fn test_extended_glyphs() {
        assert_eq!(from_char('☺'), Some(1));
        assert_eq!(from_char('⌂'), Some(127));
        assert_eq!(from_char('Ç'), Some(128));
        assert_eq!(from_char('\u{a0}'), Some(255));
        assert_eq!(from_char('€'), None);
        assert_eq!(from_char('\0'), None);
    }

    #[test]
    fn test_charset_encode() {
        assert_eq!(Charset::Native.encode('A'), Some(65));
        assert_eq!(Charset::Native.encode('€'), None);
        assert_eq!(Charset::Unicode.encode('€'), Some(0x20AC));
    }
}
