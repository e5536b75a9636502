use std::{collections::VecDeque, fmt};

use tokio::{
    runtime::{Builder, Handle, Runtime},
    sync::mpsc::UnboundedReceiver,
};

use crate::{
    image::Image,
    plat::{Condition, Instruction, Register, Word, ADDRESS_MASK, MEMORY_WORDS},
};

use super::{
    alu,
    interrupts::{self, InterruptController, InterruptLine, BUTTONS, KEYBOARD},
    io::{self, Io},
    registers::{Flags, RegisterFile},
    timer::Timer,
    EmuError,
};

/// Number of executed instructions kept for backtraces.
pub const HISTORY_LEN: usize = 1024;

/// The architectural state visible after a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub pc: Word,
    pub registers: [Word; 8],
    pub flags: Flags,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.registers.iter().enumerate() {
            writeln!(f, "R{}={:04X}", i, value)?;
        }
        writeln!(f, "PC={:04X}", self.pc)?;
        write!(f, "EZCNO={}", self.flags)
    }
}

/// The main emulation context for P4.
pub struct Emulator {
    pub registers: RegisterFile,
    pub flags: Flags,
    pub interrupts: InterruptController,
    pub io: Io,
    /// Executed instructions with their addresses, oldest first.
    pub history: VecDeque<(Word, Instruction)>,
    pc: Word,
    /// Branch target taking effect after the delay slot.
    jump: Option<Word>,
    program: Box<[Word]>,
    /// Data image restored on reset.
    data: Box<[Word]>,
    cache: Vec<Option<Instruction>>,
    line: InterruptLine,
    requests: UnboundedReceiver<u8>,
    rt: Runtime,
}

fn check_size(space: &'static str, words: &[Word]) -> Result<(), EmuError> {
    if words.len() > MEMORY_WORDS {
        return Err(EmuError::ImageTooLarge {
            space,
            len: words.len(),
        });
    }
    Ok(())
}

impl Emulator {
    /// Loads a program and data image into a new [Emulator] instance.
    ///
    /// Words that do not decode are left out of the instruction cache; executing one is a fault.
    ///
    /// # Errors
    ///
    /// This function will return an error if an image is larger than its memory space or if
    /// the Tokio runtime fails to initialize.
    pub fn new(program: &[Word], data: &[Word]) -> Result<Self, EmuError> {
        check_size("program", program)?;
        check_size("data", data)?;
        let rt = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("p4-timer")
            .enable_time()
            .build()?;
        let (line, requests) = interrupts::line();
        let timer = Timer::new(rt.handle().clone(), line.clone());

        let mut memory = vec![0; MEMORY_WORDS];
        memory[..program.len()].copy_from_slice(program);
        let cache: Vec<_> = memory
            .iter()
            .map(|&word| Instruction::from_word(word).ok())
            .collect();
        let invalid: Vec<usize> = (0..MEMORY_WORDS).filter(|&a| cache[a].is_none()).collect();
        if let Some(&first) = invalid.first() {
            log::warn!(
                "{} program words do not decode, the first at {:04X}h",
                invalid.len(),
                first
            );
        }

        Ok(Self {
            registers: RegisterFile::default(),
            flags: Flags::empty(),
            interrupts: InterruptController::default(),
            io: Io::new(data, timer),
            history: VecDeque::new(),
            pc: 0,
            jump: None,
            program: memory.into_boxed_slice(),
            data: data.into(),
            cache,
            line,
            requests,
            rt,
        })
    }

    pub fn from_image(image: &Image) -> Result<Self, EmuError> {
        Self::new(&image.program, &image.data)
    }

    /// Address of the next instruction to execute.
    pub fn pc(&self) -> Word {
        self.pc
    }

    pub fn jump_pending(&self) -> bool {
        self.jump.is_some()
    }

    pub fn program(&self) -> &[Word] {
        &self.program
    }

    pub fn instruction_at(&self, addr: Word) -> Option<Instruction> {
        self.cache[(addr & ADDRESS_MASK) as usize]
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            pc: self.pc,
            registers: self.registers.values(),
            flags: self.flags,
        }
    }

    /// A handle for raising hardware interrupts from other threads.
    pub fn interrupt_line(&self) -> InterruptLine {
        self.line.clone()
    }

    /// The runtime the timer and scheduler run on.
    pub fn handle(&self) -> Handle {
        self.rt.handle().clone()
    }

    /// Executes one instruction.
    ///
    /// The program counter first moves to the target of a jump taken by the previous
    /// instruction, or else to the next address. A latched interrupt is then serviced, unless
    /// the instruction just executed took a jump of its own.
    ///
    /// # Errors
    ///
    /// This function will return an error if the word at the program counter does not decode.
    pub fn clock(&mut self) -> Result<(), EmuError> {
        for source in interrupts::drain(&mut self.requests) {
            self.interrupts.raise(source, false, self.flags.enabled());
        }
        let fetch = self.pc;
        let instr = self.cache[fetch as usize].ok_or(EmuError::InvalidInstruction {
            address: fetch,
            word: self.program[fetch as usize],
        })?;
        self.pc = match self.jump.take() {
            Some(dest) => dest,
            None => fetch.wrapping_add(1) & ADDRESS_MASK,
        };
        log::trace!("{:04X}: {}", fetch, instr);
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back((fetch, instr));

        self.execute(fetch, instr);

        if self.jump.is_none() {
            if let Some(vector) = self.interrupts.take_request() {
                self.attend(vector);
            }
        }
        Ok(())
    }

    fn holds(&self, cond: Condition) -> bool {
        let f = self.flags;
        cond.holds(f.zero(), f.carry(), f.negative(), f.overflow())
    }

    fn execute(&mut self, fetch: Word, instr: Instruction) {
        match instr {
            Instruction::Nop => {}
            Instruction::Br { cond, offset } => {
                if self.holds(cond) {
                    self.jump = Some(fetch.wrapping_add(offset as i16 as Word) & ADDRESS_MASK);
                }
            }
            Instruction::Jmp { cond, rb } => {
                if self.holds(cond) {
                    self.jump = Some(self.registers.read(rb) & ADDRESS_MASK);
                }
            }
            Instruction::Jal { cond, rb } => {
                if self.holds(cond) {
                    self.jump = Some(self.registers.read(rb) & ADDRESS_MASK);
                    self.registers.write(Register::LINK, fetch.wrapping_add(1));
                }
            }
            Instruction::Mov { rc, rb } => {
                let value = self.registers.read(rb);
                self.registers.write(rc, value);
            }
            Instruction::Load { rc, rb } => {
                let addr = self.registers.read(rb);
                let value = self.load(addr);
                self.registers.write(rc, value);
            }
            Instruction::Stor { ra, rb } => {
                let (addr, value) = (self.registers.read(rb), self.registers.read(ra));
                self.store(addr, value);
            }
            Instruction::Eni => {
                self.flags.insert(Flags::ENABLE);
                self.interrupts.rescan(true);
            }
            Instruction::Dsi => self.flags.remove(Flags::ENABLE),
            Instruction::Rti => {
                self.flags.set(Flags::ENABLE, self.interrupts.saved_enable);
                self.pc = self.interrupts.return_address;
                self.interrupts.rescan(self.flags.enabled());
            }
            Instruction::Int(n) => self.interrupts.raise(n, true, self.flags.enabled()),
            Instruction::Alu { op, rc, ra, rb } => {
                let a = if op.is_unary() { rc } else { ra };
                let (a, b) = (self.registers.read(a), self.registers.read(rb));
                let out = alu::compute(op, a, b, self.flags.carry());
                out.update(&mut self.flags);
                self.registers.write(rc, out.result);
            }
            Instruction::Mvi { rc, imm } => self.registers.write(rc, imm as Word),
            Instruction::Mvih { rc, imm } => {
                let low = self.registers.read(rc) & 0x00FF;
                self.registers.write(rc, (imm as Word) << 8 | low);
            }
            Instruction::Mvil { rc, imm } => {
                let high = self.registers.read(rc) & 0xFF00;
                self.registers.write(rc, high | imm as Word);
            }
            Instruction::Clc => self.flags.remove(Flags::CARRY),
            Instruction::Stc => self.flags.insert(Flags::CARRY),
            Instruction::Cmc => self.flags.toggle(Flags::CARRY),
        }
    }

    fn attend(&mut self, vector: Word) {
        log::debug!(
            "servicing interrupt at {:04X}, returning to {:04X}",
            vector,
            self.pc
        );
        self.interrupts.saved_enable = self.flags.enabled();
        self.flags.remove(Flags::ENABLE);
        self.interrupts.return_address = self.pc;
        self.pc = vector;
    }

    /// Reads the data bus as a `LOAD` would.
    pub fn load(&mut self, addr: Word) -> Word {
        match addr {
            io::INTERRUPT_MASK => self.interrupts.mask,
            _ => self.io.read(addr),
        }
    }

    /// Reads the data bus without acknowledging the terminal key.
    pub fn peek(&self, addr: Word) -> Word {
        match addr {
            io::INTERRUPT_MASK => self.interrupts.mask,
            _ => self.io.peek(addr),
        }
    }

    /// Writes the data bus as a `STOR` would.
    pub fn store(&mut self, addr: Word, value: Word) {
        match addr {
            io::INTERRUPT_MASK => self.interrupts.mask = value,
            _ => self.io.write(addr, value),
        }
    }

    /// Returns the machine to its power-on state with the loaded images.
    pub fn reset(&mut self) {
        log::debug!("reset");
        self.registers = RegisterFile::default();
        self.flags = Flags::empty();
        self.interrupts = InterruptController::default();
        self.io.reset(&self.data);
        self.history.clear();
        self.pc = 0;
        self.jump = None;
        interrupts::drain(&mut self.requests);
    }

    /// A key typed on the terminal keyboard.
    pub fn key_press(&mut self, code: Word) {
        self.io.terminal.key_press(code);
        self.interrupts
            .raise(KEYBOARD, false, self.flags.enabled());
    }

    /// # Errors
    ///
    /// This function will return an error if there is no such button.
    pub fn press_button(&mut self, button: u8) -> Result<(), EmuError> {
        if button >= BUTTONS {
            return Err(EmuError::NoSuchButton(button));
        }
        self.interrupts.raise(button, false, self.flags.enabled());
        Ok(())
    }

    pub fn set_switches(&mut self, switches: Word) {
        self.io.switches = switches & 0x3FF;
    }

    pub fn set_accelerometer(&mut self, x: Word, y: Word, z: Word) {
        self.io.accelerometer = [x, y, z];
    }
}
