//! Watchdog timer.
//!
//! A single long-lived task waits on [`WatchdogTicks`] while the controller
//! flips the timer through [`Watchdog`]. Every `arm` starts a fresh period
//! under a new epoch; a tick reports the epoch it was armed with so the
//! controller can drop ticks that raced a disarm or a rearm.

use std::time::Duration;

use tokio::sync::watch;

/// Controller side: arm and disarm.
#[derive(Debug)]
pub struct Watchdog {
    period: Duration,
    epoch: u64,
    armed: watch::Sender<Option<u64>>,
}

/// Timer side: yields one tick per armed period.
#[derive(Debug)]
pub struct WatchdogTicks {
    period: Duration,
    armed: watch::Receiver<Option<u64>>,
}

impl Watchdog {
    pub fn new(period: Duration) -> (Self, WatchdogTicks) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                period,
                epoch: 0,
                armed: tx,
            },
            WatchdogTicks { period, armed: rx },
        )
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Reset and arm. Returns the new epoch.
    pub fn arm(&mut self) -> u64 {
        self.epoch += 1;
        self.armed.send_replace(Some(self.epoch));
        self.epoch
    }

    pub fn disarm(&mut self) {
        if self.is_armed() {
            self.armed.send_replace(None);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.borrow().is_some()
    }

    /// Whether a tick from `epoch` still counts.
    pub fn is_current(&self, epoch: u64) -> bool {
        *self.armed.borrow() == Some(epoch)
    }
}

impl WatchdogTicks {
    /// Wait out one full armed period. Rearming restarts the wait; `None`
    /// once the [`Watchdog`] is gone.
    pub async fn next(&mut self) -> Option<u64> {
        loop {
            let armed = *self.armed.borrow_and_update();
            match armed {
                None => self.armed.changed().await.ok()?,
                Some(epoch) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.period) => return Some(epoch),
                        changed = self.armed.changed() => changed.ok()?,
                    }
                }
            }
        }
    }
}
