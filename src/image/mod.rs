//! Memory images and the files they are exchanged in.

use crate::{
    asm::AssembleResult,
    plat::{Word, MEMORY_WORDS},
};

pub mod mif;
pub mod package;

/// The two memory spaces of a P4 program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub program: Vec<Word>,
    pub data: Vec<Word>,
}

impl Default for Image {
    fn default() -> Self {
        Self {
            program: vec![0; MEMORY_WORDS],
            data: vec![0; MEMORY_WORDS],
        }
    }
}

impl From<&AssembleResult> for Image {
    fn from(result: &AssembleResult) -> Self {
        Self {
            program: result.program.clone(),
            data: result.data.clone(),
        }
    }
}
