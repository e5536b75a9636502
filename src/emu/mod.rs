//! The emulator/debugger module for P4.

use thiserror::Error;

use crate::plat::Word;

pub mod alu;
pub mod debugger;
pub mod emulator;
pub mod interrupts;
pub mod io;
pub mod registers;
pub mod scheduler;
pub mod timer;

pub use emulator::Emulator;

#[derive(Debug, Error)]
pub enum EmuError {
    #[error("could not start the timer runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("{space} image has {len} words, more than fit in memory")]
    ImageTooLarge { space: &'static str, len: usize },
    #[error("invalid instruction {word:04X}h at {address:04X}h")]
    InvalidInstruction { address: Word, word: Word },
    #[error("no push button {0}")]
    NoSuchButton(u8),
}
