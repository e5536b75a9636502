use std::io::Cursor;

use p4::{
    asm::{assemble, AssembleResult},
    disasm,
    image::{
        mif::{self, Radix},
        package, Image,
    },
    plat::MEMORY_WORDS,
};

fn assemble_clean(source: &str) -> AssembleResult {
    let result = assemble(source);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    result
}

const PROGRAM: &str = "\
Msg             STR     'Hi', 0, 1000
                MVI     R1, 5
                ADD     R1, R1, R1
                BR      3
                INC     R2
                CLC
";

#[test]
fn test_assemble_counts_words() {
    let result = assemble_clean("MVI R1, 5\nADD R1, R1, R1\n");
    assert_eq!(result.stats.instructions, 2);
    assert_eq!(result.stats.program_usage(), 2);
    assert_eq!(result.program.len(), MEMORY_WORDS);
    assert_eq!(result.program[0], 0xC805);
    assert_eq!(disasm::decode(result.program[1]).unwrap(), "ADD R1, R1, R1");
    assert_eq!(result.program[2], 0);
}

#[test]
fn test_disassembly_reassembles() {
    let first = assemble_clean(PROGRAM);
    assert_eq!(first.label("Msg"), Some(0));
    assert_eq!(&first.data[..4], &[72, 105, 0, 1000]);

    let source = disasm::decode_image(&first.program, &first.data).unwrap();
    let second = assemble_clean(&source);
    assert_eq!(second.program, first.program);
    assert_eq!(second.data, first.data);
}

#[test]
fn test_sparse_mif() {
    let mut words = vec![0; MEMORY_WORDS];
    words[0] = 0xC805;
    words[0x4000] = 0xBEEF;
    words[MEMORY_WORDS - 1] = 1;
    let text = mif::generate(&words, Radix::Hex, Radix::Hex);
    // zero runs collapse into ranges
    assert!(text.lines().count() < 20);
    assert_eq!(mif::parse(&text).unwrap(), words);
}

#[test]
fn test_package_in_memory() {
    let image = Image::from(&assemble_clean(PROGRAM));
    let mut buffer = Cursor::new(Vec::new());
    package::write(&mut buffer, &image).unwrap();
    buffer.set_position(0);
    assert_eq!(package::read(buffer).unwrap(), image);
}

#[test]
fn test_package_file() {
    let image = Image::from(&assemble_clean(PROGRAM));
    let path = std::env::temp_dir().join(format!("p4-toolchain-{}.p4z", std::process::id()));
    package::save(&path, &image).unwrap();
    let loaded = package::load(&path);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded.unwrap(), image);
}

#[test]
fn test_oversized_data_constants() {
    let result = assemble("X WORD 70000\nY STR 65537");
    assert_eq!(result.stats.errors, 2);
    let lines: Vec<_> = result.errors().map(|d| (d.line, d.message.as_str())).collect();
    assert_eq!(
        lines,
        [(1, "Constant is too large."), (2, "Constant is too large.")]
    );
    assert_eq!(&result.data[..2], &[0, 0]);
}
