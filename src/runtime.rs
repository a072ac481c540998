//! Fixed-period tasks on dedicated threads.
//!
//! The board logic itself never sleeps or schedules anything; a
//! [`RecurringTask`] wraps it and [`spawn_recurring`] drives it.

use crate::board::BoardEngine;
use crate::clock::TimeSource;
use crate::error::AppError;
use crate::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tracing::{info, warn};

const STOP_POLL: Duration = Duration::from_millis(100);

pub trait RecurringTask: Send + 'static {
    fn name(&self) -> &'static str;
    fn period(&self) -> Duration;
    fn run_once(&mut self) -> Result<(), AppError>;
}

pub fn spawn_recurring<T: RecurringTask>(
    mut task: T,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        info!(
            task = task.name(),
            period_ms = task.period().as_millis(),
            "Recurring task started"
        );
        while !stop.load(Ordering::Relaxed) {
            let run_start = Instant::now();

            if let Err(e) = task.run_once() {
                warn!("Error running {}: {}", task.name(), e);
            }

            sleep_with_stop(task.period(), &stop, run_start);
        }
        info!(task = task.name(), "Recurring task stopped");
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let step = STOP_POLL.min(remaining - slept);
        std::thread::sleep(step);
        slept += step;
    }
}

/// One board tick per period: resolve time, compute, publish.
pub struct TickTask<C: TimeSource> {
    engine: BoardEngine,
    clock: C,
    state: Arc<RwLock<AppState>>,
    period: Duration,
}

impl<C: TimeSource> TickTask<C> {
    pub fn new(
        engine: BoardEngine,
        clock: C,
        state: Arc<RwLock<AppState>>,
        period: Duration,
    ) -> Self {
        Self {
            engine,
            clock,
            state,
            period,
        }
    }
}

impl<C: TimeSource + 'static> RecurringTask for TickTask<C> {
    fn name(&self) -> &'static str {
        "board-tick"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn run_once(&mut self) -> Result<(), AppError> {
        let now = self.clock.now();
        let remote = {
            let guard = self.state.read().map_err(|_| AppError::StateLock)?;
            guard.remote_advisories()
        };

        let snapshot = self.engine.tick(&now, remote.as_deref());

        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_snapshot(snapshot, SystemTime::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ZonedTime;
    use chrono::Weekday;
    use std::sync::Mutex;

    struct SteppingClock {
        next: Mutex<ZonedTime>,
    }

    impl TimeSource for SteppingClock {
        fn now(&self) -> ZonedTime {
            match self.next.lock() {
                Ok(mut guard) => {
                    let current = *guard;
                    guard.second = (guard.second + 1) % 60;
                    guard.epoch_millis += 1_000;
                    current
                }
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }

    struct CountingTask {
        runs: Arc<Mutex<u32>>,
    }

    impl RecurringTask for CountingTask {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn period(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn run_once(&mut self) -> Result<(), AppError> {
            let mut runs = self.runs.lock().map_err(|_| AppError::StateLock)?;
            *runs += 1;
            Ok(())
        }
    }

    #[test]
    fn spawned_task_runs_until_stopped() -> Result<(), AppError> {
        let runs = Arc::new(Mutex::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_recurring(
            CountingTask {
                runs: Arc::clone(&runs),
            },
            Arc::clone(&stop),
        );

        std::thread::sleep(Duration::from_millis(100));
        stop.store(true, Ordering::Relaxed);
        let _ = handle.join();

        let count = *runs.lock().map_err(|_| AppError::StateLock)?;
        assert!(count >= 2, "expected several runs, got {count}");
        Ok(())
    }

    #[test]
    fn tick_task_publishes_snapshot() -> Result<(), Box<dyn std::error::Error>> {
        let config = crate::config::load_default()?.board_config()?;
        let engine = BoardEngine::new(Arc::new(config));
        let clock = SteppingClock {
            next: Mutex::new(ZonedTime {
                hour: 12,
                minute: 0,
                second: 0,
                weekday: Weekday::Tue,
                month: 4,
                epoch_millis: 0,
            }),
        };
        let state = Arc::new(RwLock::new(AppState::new()));
        let receiver = {
            let guard = state.read().map_err(|_| AppError::StateLock)?;
            guard.subscribe_snapshot()
        };
        let mut task = TickTask::new(engine, clock, Arc::clone(&state), Duration::from_secs(1));

        task.run_once()?;
        task.run_once()?;

        let published = receiver.borrow().clone().ok_or("no snapshot published")?;
        assert_eq!(published.snapshot.clock_text, "Time Now 12:00:01");
        assert!(published.snapshot.service_running);
        Ok(())
    }

    #[test]
    fn tick_task_prefers_cached_remote_messages() -> Result<(), Box<dyn std::error::Error>> {
        let config = crate::config::load_default()?.board_config()?;
        let engine = BoardEngine::new(Arc::new(config));
        let clock = SteppingClock {
            next: Mutex::new(ZonedTime {
                hour: 12,
                minute: 0,
                second: 0,
                weekday: Weekday::Tue,
                month: 4,
                epoch_millis: 0,
            }),
        };
        let state = Arc::new(RwLock::new(AppState::new()));
        {
            let mut guard = state.write().map_err(|_| AppError::StateLock)?;
            guard.set_remote_advisories(
                vec!["Remote first".to_string(), "Remote second".to_string()],
                SystemTime::now(),
            );
        }
        let mut task = TickTask::new(engine, clock, Arc::clone(&state), Duration::from_secs(1));

        task.run_once()?;

        let guard = state.read().map_err(|_| AppError::StateLock)?;
        let published = guard.snapshot().ok_or("no snapshot")?;
        assert_eq!(published.snapshot.advisory_a, "Remote first");
        assert_eq!(published.snapshot.advisory_b, "Remote second");
        Ok(())
    }
}
