//! The interrupt controller and the lines peripherals raise it through.

use std::collections::BTreeSet;

use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::plat::{Word, VECTOR_BASE};

/// Source index of the terminal keyboard.
pub const KEYBOARD: u8 = 7;
/// Source index of the timer. Its vector is `7FF0h`.
pub const TIMER: u8 = 15;
/// Number of push buttons, which raise sources `0..BUTTONS`.
pub const BUTTONS: u8 = 7;

/// Vector of an interrupt: software interrupts index the table directly, hardware sources
/// are spaced 16 words apart.
pub fn vector(source: u8, software: bool) -> Word {
    let offset = if software {
        source as Word
    } else {
        (source as Word) << 4
    };
    VECTOR_BASE | (offset & 0xFF)
}

/// A handle to raise hardware interrupts from outside the emulator, possibly from another thread.
#[derive(Debug, Clone)]
pub struct InterruptLine(UnboundedSender<u8>);

impl InterruptLine {
    /// Requests service for `source`. The request is picked up at the next clock.
    pub fn raise(&self, source: u8) {
        if self.0.send(source).is_err() {
            log::warn!("interrupt {} raised after the emulator was dropped", source);
        }
    }
}

/// Creates a connected line and receiver.
pub fn line() -> (InterruptLine, UnboundedReceiver<u8>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (InterruptLine(tx), rx)
}

/// Drains every request waiting on `rx`.
pub fn drain(rx: &mut UnboundedReceiver<u8>) -> Vec<u8> {
    let mut sources = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(source) => sources.push(source),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return sources,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterruptController {
    /// One enable bit per hardware source, as written to the mask register.
    pub mask: Word,
    /// Sources that asked for service while they could not get it.
    pub pending: BTreeSet<u8>,
    /// Vector latched for service at the end of the current clock.
    request: Option<Word>,
    /// Enable flag saved when entering the current service routine.
    pub saved_enable: bool,
    /// Where `RTI` returns to.
    pub return_address: Word,
}

impl InterruptController {
    /// Whether the mask register lets `source` through.
    pub fn unmasked(&self, source: u8) -> bool {
        source < 16 && self.mask >> source & 1 == 1
    }

    /// Latches `source` for service, or adds it to the pending set if it cannot be served now.
    ///
    /// Software interrupts are never masked. A timer raise ignores the mask, but once pending
    /// it waits for its mask bit like any other source.
    pub fn raise(&mut self, source: u8, software: bool, enabled: bool) {
        if software || (enabled && (source == TIMER || self.unmasked(source))) {
            let vector = vector(source, software);
            log::debug!("interrupt {} latched, vector {:04X}", source, vector);
            self.request = Some(vector);
        } else {
            log::debug!("interrupt {} pending", source);
            self.pending.insert(source);
        }
    }

    /// Raises the lowest pending source that is now unmasked, if any.
    pub fn rescan(&mut self, enabled: bool) {
        let next = self.pending.iter().copied().find(|&s| self.unmasked(s));
        if let Some(source) = next {
            self.pending.remove(&source);
            self.raise(source, false, enabled);
        }
    }

    pub fn request(&self) -> Option<Word> {
        self.request
    }

    /// Takes the latched vector, clearing the request.
    pub fn take_request(&mut self) -> Option<Word> {
        self.request.take()
    }
}
