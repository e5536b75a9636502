//! Drives an [Emulator] at a target clock rate.
//!
//! Clocks run in batches. After each batch the batch size is recomputed from how long the
//! batch took and how much time passed since the previous one, so that slow rates are paced
//! by sleeping and fast rates stay within a per-batch compute budget.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{sleep, Instant},
};

use crate::plat::Word;

use super::{EmuError, Emulator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Target clocks per second; must be positive. Infinity runs as fast as possible.
    pub clock_hz: f64,
    /// Wall-clock time a batch may take.
    pub max_compute: Duration,
    /// Least time slept between batches.
    pub min_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            clock_hz: f64::INFINITY,
            max_compute: Duration::from_millis(25),
            min_delay: Duration::ZERO,
        }
    }
}

impl SchedulerConfig {
    pub fn with_rate(clock_hz: f64) -> Self {
        Self {
            clock_hz,
            ..Default::default()
        }
    }

    fn period(&self) -> f64 {
        self.clock_hz.recip()
    }

    /// The next batch size and the delay before running it.
    fn next_batch(&self, batch: u64, compute: Duration, since_last: Duration) -> (u64, Duration) {
        let per_clock = compute.as_secs_f64() / batch as f64;
        let max = (batch.saturating_mul(16) as f64)
            .min(self.max_compute.as_secs_f64() / per_clock);
        let delay = Duration::try_from_secs_f64(self.period() - compute.as_secs_f64())
            .unwrap_or(Duration::ZERO)
            .max(self.min_delay);
        // NaN when no time passed at an infinite rate; `min` then keeps `max`
        let wanted = since_last.as_secs_f64() * self.clock_hz;
        let next = max.min(wanted).round().max(1.0) as u64;
        (next, delay)
    }
}

/// Why [Scheduler::run] returned.
#[derive(Debug)]
pub enum StopReason {
    /// [StopHandle::stop] was called.
    Stopped,
    /// The requested number of clocks ran.
    StepsExhausted,
    /// The program counter reached a breakpoint.
    Breakpoint(Word),
    Fault(EmuError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerStats {
    /// Clocks run since the scheduler was created.
    pub clocks: u64,
    /// Measured rate of the last run.
    pub clocks_per_second: f64,
}

/// Stops a running [Scheduler] from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

pub struct Scheduler {
    pub config: SchedulerConfig,
    pub breakpoints: BTreeSet<Word>,
    pub stats: SchedulerStats,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            config,
            breakpoints: BTreeSet::new(),
            stats: SchedulerStats::default(),
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop_tx))
    }

    /// Sets or clears a breakpoint, returning whether it is now set.
    pub fn toggle_breakpoint(&mut self, addr: Word) -> bool {
        if self.breakpoints.remove(&addr) {
            false
        } else {
            self.breakpoints.insert(addr);
            true
        }
    }

    /// Clocks `emu` until it is stopped, faults, hits a breakpoint or has run `max_steps` clocks.
    ///
    /// Breakpoints are checked against the program counter after every clock. While any are
    /// set, a stop request is also seen after every clock rather than between batches.
    pub fn run(&mut self, emu: &mut Emulator, max_steps: Option<u64>) -> StopReason {
        self.stop_tx.send_replace(false);
        self.stop_rx.borrow_and_update();
        log::info!(
            "running from {:04X} at {} Hz",
            emu.pc(),
            self.config.clock_hz
        );
        let started = Instant::now();
        let clocks = self.stats.clocks;
        let reason = emu.handle().block_on(self.run_batches(emu, max_steps));
        let elapsed = started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.stats.clocks_per_second = (self.stats.clocks - clocks) as f64 / elapsed;
        }
        log::info!(
            "stopped at {:04X}: {:?} ({} clocks, {:.0} clocks/s)",
            emu.pc(),
            reason,
            self.stats.clocks - clocks,
            self.stats.clocks_per_second
        );
        reason
    }

    /// Runs one batch of `count` clocks, returning early with the reason it ended.
    fn run_clocks(&mut self, emu: &mut Emulator, count: u64) -> Option<StopReason> {
        for _ in 0..count {
            if let Err(err) = emu.clock() {
                return Some(StopReason::Fault(err));
            }
            self.stats.clocks += 1;
            if self.breakpoints.is_empty() {
                continue;
            }
            if self.breakpoints.contains(&emu.pc()) {
                return Some(StopReason::Breakpoint(emu.pc()));
            }
            if *self.stop_rx.borrow() {
                return Some(StopReason::Stopped);
            }
        }
        None
    }

    async fn run_batches(&mut self, emu: &mut Emulator, max_steps: Option<u64>) -> StopReason {
        let mut remaining = max_steps;
        let mut batch = 1;
        let mut last = Instant::now();
        loop {
            if *self.stop_rx.borrow_and_update() {
                return StopReason::Stopped;
            }
            let count = remaining.map_or(batch, |r| batch.min(r));
            let before = Instant::now();
            if let Some(reason) = self.run_clocks(emu, count) {
                return reason;
            }
            if let Some(r) = remaining.as_mut() {
                *r -= count;
                if *r == 0 {
                    return StopReason::StepsExhausted;
                }
            }

            let now = Instant::now();
            let (next, delay) = self.config.next_batch(count, now - before, now - last);
            last = now;
            batch = next;
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.stop_rx.changed() => {}
            }
        }
    }
}
