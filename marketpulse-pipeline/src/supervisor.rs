//! Thread supervisor: launches long-running units, propagates shutdown,
//! reports crashes.
//!
//! Supervision is for coordinated shutdown only. A unit that returns an
//! error or panics is reported and left dead; nothing is restarted. On
//! shutdown every unit sees the shared cancellation flag, gets a bounded
//! grace period to exit, and stragglers are reported as stuck (the process
//! exits regardless).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shared cooperative cancellation flag.
///
/// Every unit checks this at the top of its loop body and inside its
/// sleeps; mid-iteration work is allowed to finish.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `false` if cancelled (before or during the sleep).
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            if self.is_cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(remaining.min(Duration::from_millis(100)));
        }
        !self.is_cancelled()
    }
}

struct Unit {
    name: String,
    handle: JoinHandle<anyhow::Result<()>>,
}

/// Outcome of supervising a set of units to completion.
#[derive(Debug, Default)]
pub struct SupervisorReport {
    /// Units that returned an error or panicked, with the failure text.
    pub crashed: Vec<(String, String)>,
    /// Units still running when the grace period expired.
    pub stuck: Vec<String>,
}

impl SupervisorReport {
    pub fn clean(&self) -> bool {
        self.crashed.is_empty() && self.stuck.is_empty()
    }
}

/// Launches units as named threads sharing one shutdown flag.
pub struct Supervisor {
    flag: ShutdownFlag,
    units: Vec<Unit>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            flag: ShutdownFlag::new(),
            units: Vec::new(),
        }
    }

    /// The flag handed to every spawned unit; clone it for signal handlers.
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.flag.clone()
    }

    /// Spawn one long-running unit.
    pub fn spawn<F>(&mut self, name: &str, unit: F)
    where
        F: FnOnce(ShutdownFlag) -> anyhow::Result<()> + Send + 'static,
    {
        let flag = self.flag.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || unit(flag))
            .expect("failed to spawn unit thread");
        log::info!("started unit '{name}'");
        self.units.push(Unit {
            name: name.to_string(),
            handle,
        });
    }

    /// Request graceful termination of every unit.
    pub fn request_shutdown(&self) {
        log::info!("shutdown requested");
        self.flag.trigger();
    }

    /// Block until the caller's shutdown condition: either the flag is
    /// triggered externally (signal handler) or every unit has finished on
    /// its own.
    pub fn wait_for_shutdown(&self) {
        loop {
            if self.flag.is_cancelled() {
                return;
            }
            if self.units.iter().all(|u| u.handle.is_finished()) {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }
    }

    /// Join every unit, waiting up to `grace` for stragglers.
    ///
    /// Consumes the supervisor; call after `request_shutdown`.
    pub fn join(self, grace: Duration) -> SupervisorReport {
        let deadline = Instant::now() + grace;
        let mut report = SupervisorReport::default();
        let mut pending = self.units;

        loop {
            let (finished, still_running): (Vec<Unit>, Vec<Unit>) =
                pending.into_iter().partition(|u| u.handle.is_finished());

            for unit in finished {
                match unit.handle.join() {
                    Ok(Ok(())) => log::info!("unit '{}' exited cleanly", unit.name),
                    Ok(Err(e)) => {
                        log::error!("unit '{}' crashed: {e:#}", unit.name);
                        report.crashed.push((unit.name, format!("{e:#}")));
                    }
                    Err(_) => {
                        log::error!("unit '{}' panicked", unit.name);
                        report.crashed.push((unit.name, "panicked".into()));
                    }
                }
            }

            if still_running.is_empty() {
                return report;
            }
            if Instant::now() >= deadline {
                for unit in still_running {
                    log::error!("unit '{}' did not stop within grace period", unit.name);
                    report.stuck.push(unit.name);
                }
                return report;
            }
            pending = still_running;
            thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_observe_shutdown_and_join_cleanly() {
        let mut sup = Supervisor::new();
        for i in 0..3 {
            sup.spawn(&format!("loop-{i}"), |flag| {
                while flag.sleep(Duration::from_millis(10)) {}
                Ok(())
            });
        }

        sup.request_shutdown();
        let report = sup.join(Duration::from_secs(2));
        assert!(report.clean(), "{report:?}");
    }

    #[test]
    fn crashed_unit_is_reported_others_unaffected() {
        let mut sup = Supervisor::new();
        sup.spawn("healthy", |flag| {
            while flag.sleep(Duration::from_millis(10)) {}
            Ok(())
        });
        sup.spawn("broken", |_flag| anyhow::bail!("disk on fire"));

        // Give the broken unit time to die; nothing restarts it.
        thread::sleep(Duration::from_millis(100));
        sup.request_shutdown();
        let report = sup.join(Duration::from_secs(2));

        assert_eq!(report.crashed.len(), 1);
        assert_eq!(report.crashed[0].0, "broken");
        assert!(report.crashed[0].1.contains("disk on fire"));
        assert!(report.stuck.is_empty());
    }

    #[test]
    fn stuck_unit_reported_after_grace() {
        let mut sup = Supervisor::new();
        sup.spawn("stubborn", |_flag| {
            // Ignores the flag entirely.
            thread::sleep(Duration::from_secs(5));
            Ok(())
        });

        sup.request_shutdown();
        let report = sup.join(Duration::from_millis(200));
        assert_eq!(report.stuck, vec!["stubborn".to_string()]);
    }

    #[test]
    fn sleep_returns_false_when_cancelled() {
        let flag = ShutdownFlag::new();
        flag.trigger();
        assert!(!flag.sleep(Duration::from_millis(50)));

        let flag = ShutdownFlag::new();
        assert!(flag.sleep(Duration::from_millis(1)));
    }

    #[test]
    fn wait_for_shutdown_returns_when_all_units_finish() {
        let mut sup = Supervisor::new();
        sup.spawn("short", |_flag| Ok(()));
        sup.wait_for_shutdown();
        let report = sup.join(Duration::from_secs(1));
        assert!(report.clean());
    }
}
