//! The disassembler module for P4: single instructions, and whole memory images back to source.

use crate::plat::{charset, format_constant, Instruction, PResult, Word};

/// Disassembles a single instruction word into its canonical mnemonic line.
///
/// # Errors
///
/// This function will return an error if the word does not decode.
pub fn decode(word: Word) -> PResult<String> {
    Ok(Instruction::from_word(word)?.to_string())
}

/// Lays a line out in columns: 16 spaces, the mnemonic padded to 8, then the operands.
fn indent(line: &str) -> String {
    match line.split_once(' ') {
        Some((mnemonic, operands)) if !operands.is_empty() => {
            format!("{:16}{:<8}{}", "", mnemonic, operands)
        }
        _ => format!("{:16}{}", "", line),
    }
}

/// Reconstructs source for a program memory image.
///
/// Zero words become `NOP`s when isolated and `ORIG` directives when they form longer runs;
/// trailing zeros are dropped. A zero right after a branch is its delay slot. Those are left
/// for the assembler to insert again, unless some branch has a non-zero word in its delay
/// slot, in which case delay slots are enabled and every one is written out.
///
/// # Errors
///
/// This function will return an error if a non-zero word does not decode.
pub fn decode_program(words: &[Word]) -> PResult<String> {
    let mut lines = vec!["ORIG 0000h".to_owned()];
    let mut delay_slots = vec![false];
    let mut zeros = 0;
    let mut after_branch = false;
    let mut use_delay_slots = false;
    for (i, &word) in words.iter().enumerate() {
        if word == 0 {
            if after_branch {
                after_branch = false;
                lines.push("NOP".to_owned());
                delay_slots.push(true);
            } else {
                zeros += 1;
            }
            continue;
        }
        if after_branch {
            use_delay_slots = true;
        }
        match zeros {
            0 => {}
            1 => {
                lines.push("NOP".to_owned());
                delay_slots.push(false);
            }
            _ => {
                lines.push(format!("ORIG {}", format_constant(i as u32)));
                delay_slots.push(false);
            }
        }
        zeros = 0;
        let instr = Instruction::from_word(word)?;
        lines.push(instr.to_string());
        delay_slots.push(false);
        after_branch = instr.has_delay_slot();
    }
    let lines: Vec<String> = if use_delay_slots {
        std::iter::once("OPT ENABLE_DELAY_SLOTS".to_owned())
            .chain(lines)
            .collect()
    } else {
        lines
            .into_iter()
            .zip(delay_slots)
            .filter_map(|(line, slot)| (!slot).then_some(line))
            .collect()
    };
    Ok(lines
        .iter()
        .map(|l| indent(l))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Accumulates `STR` directives for [decode_data].
#[derive(Debug, Default)]
struct DataWriter {
    lines: Vec<String>,
    tokens: Vec<String>,
    text: Option<String>,
    directives: usize,
}

impl DataWriter {
    fn push(&mut self, word: Word) {
        if (1..256).contains(&word) {
            let glyph = charset::to_char(word as u8);
            let text = self.text.get_or_insert_with(String::new);
            text.push(glyph);
            if glyph == '\'' {
                text.push(glyph);
            }
        } else {
            self.flush_text();
            self.tokens.push(word.to_string());
        }
    }

    fn flush_text(&mut self) {
        if let Some(text) = self.text.take() {
            self.tokens.push(format!("'{}'", text));
        }
    }

    fn flush_directive(&mut self) {
        self.flush_text();
        if self.tokens.is_empty() {
            return;
        }
        let name = format!("_D{}", self.directives);
        self.lines
            .push(format!("{:<16}STR     {}", name, self.tokens.join(",")));
        self.tokens.clear();
        self.directives += 1;
    }
}

/// Reconstructs source for a data memory image as `STR` directives.
///
/// Words from 1 to 255 are written as code page characters, anything else as a decimal
/// constant. A single zero stays inline; longer zero runs start a new directive after `ORIG`.
pub fn decode_data(words: &[Word]) -> String {
    let mut writer = DataWriter {
        lines: vec![indent("ORIG 0000h")],
        ..Default::default()
    };
    let mut zeros = 0;
    for (i, &word) in words.iter().enumerate() {
        if word == 0 {
            zeros += 1;
            continue;
        }
        match zeros {
            0 => {}
            1 => writer.push(0),
            _ => {
                writer.flush_directive();
                writer
                    .lines
                    .push(indent(&format!("ORIG {}", format_constant(i as u32))));
            }
        }
        zeros = 0;
        writer.push(word);
    }
    writer.flush_directive();
    writer.lines.join("\n")
}

/// Reconstructs assembler source for a program and data image pair, data section first.
///
/// # Errors
///
/// This function will return an error if a program word does not decode.
pub fn decode_image(program: &[Word], data: &[Word]) -> PResult<String> {
    Ok(format!("{}\n{}", decode_data(data), decode_program(program)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(line: &str) -> String {
        indent(line)
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode(0xC805).unwrap(), "MVI R1, 5");
        assert_eq!(decode(0x4A02).unwrap(), "LOAD R1, M[R2]");
        assert_eq!(decode(0x0000).unwrap(), "NOP");
        assert_eq!(decode(0x0FFF).unwrap(), "NOP");
        assert!(decode(0x4100).is_err());
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("MOV R1, R2"), format!("{}MOV     R1, R2", " ".repeat(16)));
        assert_eq!(indent("RTI"), format!("{}RTI", " ".repeat(16)));
    }

    #[test]
    fn test_program_hides_default_delay_slots() {
        // BR 3; NOP; INC R1; (two zeros); CLC
        let words = [0x1103, 0, 0x8948, 0, 0, 0xC400];
        let expected = [
            pad("ORIG 0000h"),
            pad("BR 3"),
            pad("INC R1"),
            pad("ORIG 5"),
            pad("CLC"),
        ]
        .join("\n");
        assert_eq!(decode_program(&words).unwrap(), expected);
    }

    #[test]
    fn test_program_with_used_delay_slot() {
        // BR 3; INC R1; JMP R7; NOP; then a lone zero before STC
        let words = [0x1103, 0x8948, 0x2107, 0, 0, 0xC500];
        let expected = [
            pad("OPT ENABLE_DELAY_SLOTS"),
            pad("ORIG 0000h"),
            pad("BR 3"),
            pad("INC R1"),
            pad("JMP R7"),
            pad("NOP"),
            pad("NOP"),
            pad("STC"),
        ]
        .join("\n");
        assert_eq!(decode_program(&words).unwrap(), expected);
    }

    #[test]
    fn test_rti_has_delay_slot() {
        let words = [0x4600, 0, 0x4400];
        let expected = [pad("ORIG 0000h"), pad("RTI"), pad("ENI")].join("\n");
        assert_eq!(decode_program(&words).unwrap(), expected);
    }

    #[test]
    fn test_data() {
        let mut words = vec![72, 105, 0, 39, 1000, 0, 0, 0, 65];
        words.resize(32768, 0);
        let expected = [
            pad("ORIG 0000h"),
            "_D0             STR     'Hi',0,'''',1000".to_owned(),
            pad("ORIG 8"),
            "_D1             STR     'A'".to_owned(),
        ]
        .join("\n");
        assert_eq!(decode_data(&words), expected);
    }

    #[test]
    fn test_data_leading_zeros() {
        let words = [0, 0, 0, 7];
        let expected = [
            pad("ORIG 0000h"),
            pad("ORIG 3"),
            "_D0             STR     '•'".to_owned(),
        ]
        .join("\n");
        assert_eq!(decode_data(&words), expected);
    }
}
