//! The wall-clock timer peripheral.
//!
//! The timer counts real time, not simulated clocks: arming it spawns a one-shot task on the
//! emulator's runtime that raises the timer interrupt once its delay has elapsed.

use std::time::Duration;

use tokio::{runtime::Handle, task::JoinHandle};

use super::interrupts::{InterruptLine, TIMER};

pub struct Timer {
    /// Delay in tenths of a second.
    pub tenths: u16,
    task: Option<JoinHandle<()>>,
    runtime: Handle,
    line: InterruptLine,
}

impl Timer {
    pub fn new(runtime: Handle, line: InterruptLine) -> Self {
        Self {
            tenths: 0,
            task: None,
            runtime,
            line,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.tenths as u64 * 100)
    }

    /// Whether a countdown is running.
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts a countdown. Does nothing if one is already running.
    pub fn arm(&mut self) {
        if self.is_armed() {
            return;
        }
        let delay = self.delay();
        let line = self.line.clone();
        log::debug!("timer armed for {:?}", delay);
        self.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            line.raise(TIMER);
        }));
    }

    /// Cancels a running countdown.
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            if task.is_finished() {
                log::warn!("timer disarmed after it had already fired");
            }
            task.abort();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use tokio::runtime::Builder;

    use super::*;
    use crate::emu::interrupts::{drain, line};

    #[test]
    fn test_fires_once() {
        let rt = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let (line, mut rx) = line();
        let mut timer = Timer::new(rt.handle().clone(), line);
        timer.tenths = 1;
        timer.arm();
        assert!(timer.is_armed());
        // arming again does not restart the countdown
        timer.arm();
        std::thread::sleep(Duration::from_millis(400));
        assert!(!timer.is_armed());
        assert_eq!(drain(&mut rx), vec![TIMER]);
    }

    #[test]
    fn test_disarm_cancels() {
        let rt = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let (line, mut rx) = line();
        let mut timer = Timer::new(rt.handle().clone(), line);
        timer.tenths = 2;
        timer.arm();
        timer.disarm();
        std::thread::sleep(Duration::from_millis(400));
        assert!(drain(&mut rx).is_empty());
    }
}
