use std::cell::{Cell, RefCell};

use anyhow::{anyhow, Result};
use easy_repl::{command, repl::LoopStatus, CommandStatus, Repl};

use crate::plat::Word;

use super::{
    emulator::Emulator,
    scheduler::{Scheduler, StopReason},
};

/// Parses `1234` as decimal and `7F00h` as hexadecimal.
pub fn parse_address(s: &str) -> Result<Word> {
    let parsed = match s.strip_suffix(['h', 'H']) {
        Some(hex) => Word::from_str_radix(hex, 16),
        None => s.parse::<Word>(),
    };
    parsed.map_err(|_| anyhow!("not an address: {}", s))
}

pub struct Debugger<'a> {
    pub emu: RefCell<&'a mut Emulator>,
    pub scheduler: RefCell<Scheduler>,
    halted: Cell<bool>,
}

impl<'a> Debugger<'a> {
    pub fn new(emu: &'a mut Emulator, scheduler: Scheduler) -> Self {
        Self {
            emu: RefCell::new(emu),
            scheduler: RefCell::new(scheduler),
            halted: Cell::new(false),
        }
    }

    fn step(&self, count: usize) -> Result<()> {
        let mut emu = self.emu.borrow_mut();
        for _ in 0..count {
            emu.clock()?;
        }
        Ok(())
    }

    fn report(&self, reason: StopReason) {
        match reason {
            StopReason::Breakpoint(addr) => eprintln!("Breakpoint at {:04X}h", addr),
            StopReason::Fault(err) => eprintln!("Fault: {}", err),
            StopReason::Stopped | StopReason::StepsExhausted => eprintln!("Stopped"),
        }
    }

    fn print_current(&self) {
        let emu = self.emu.borrow();
        match emu.instruction_at(emu.pc()) {
            Some(instr) => eprintln!("[pc={:04X}] --> {}", emu.pc(), instr),
            None => eprintln!("[pc={:04X}] --> ???", emu.pc()),
        }
    }

    pub fn repl(&self) -> Result<()> {
        let mut repl = Repl::builder()
            .description("P4 Debug REPL")
            .add(
                "c",
                command! {
                    "Continue execution until a breakpoint",
                    () => || {
                        let mut emu = self.emu.borrow_mut();
                        let reason = self.scheduler.borrow_mut().run(&mut emu, None);
                        drop(emu);
                        self.report(reason);
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "s",
                command! {
                    "Step one instruction",
                    () => || {
                        self.step(1)?;
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "s",
                command! {
                    "Step N instructions",
                    (n:usize) => |n| {
                        self.step(n)?;
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "bt",
                command! {
                    "Print last N instructions executed",
                    (n:usize) => |n| {
                        let emu = self.emu.borrow();
                        let skip = emu.history.len().saturating_sub(n);
                        for (addr, instr) in emu.history.iter().skip(skip) {
                            eprintln!("{:04X}: {}", addr, instr);
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "pr",
                command! {
                    "Print the registers and flags",
                    () => || {
                        eprintln!("{}", self.emu.borrow().snapshot());
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "peek",
                command! {
                    "Read a word from the data bus (decimal, or hex with an h suffix)",
                    (addr:String) => |addr: String| {
                        let addr = parse_address(&addr)?;
                        let value = self.emu.borrow().peek(addr);
                        eprintln!("{:04X}={:04X}", addr, value);
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "b",
                command! {
                    "Toggle a breakpoint",
                    (addr:String) => |addr: String| {
                        let addr = parse_address(&addr)?;
                        if self.scheduler.borrow_mut().toggle_breakpoint(addr) {
                            eprintln!("Breakpoint set at {:04X}h", addr);
                        } else {
                            eprintln!("Breakpoint cleared at {:04X}h", addr);
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "term",
                command! {
                    "Print the terminal and LCD",
                    () => || {
                        let emu = self.emu.borrow();
                        eprintln!("{}", emu.io.terminal.text());
                        let [top, bottom] = emu.io.lcd.lines();
                        eprintln!("+----------------+");
                        eprintln!("|{}|", top);
                        eprintln!("|{}|", bottom);
                        eprintln!("+----------------+");
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "reset",
                command! {
                    "Reset the machine",
                    () => || {
                        self.emu.borrow_mut().reset();
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "halt",
                command! {
                    "Halt execution",
                    () => || {
                        self.halted.set(true);
                        Ok(CommandStatus::Quit)
                    }
                },
            )
            .build()?;
        eprintln!("P4 Debug REPL");
        'repl: loop {
            eprintln!();
            self.print_current();

            let status = repl.next()?;
            if let LoopStatus::Break = status {
                break 'repl;
            }
            if self.halted.get() {
                break 'repl;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("1234").unwrap(), 1234);
        assert_eq!(parse_address("7F00h").unwrap(), 0x7F00);
        assert_eq!(parse_address("ffH").unwrap(), 0xFF);
        assert!(parse_address("zz").is_err());
        assert!(parse_address("70000").is_err());
    }
}
