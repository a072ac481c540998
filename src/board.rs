//! The tick orchestrator.
//!
//! [`BoardEngine::tick`] is a plain synchronous function of the current
//! [`ZonedTime`] and the optional remote advisory list. It owns all runtime
//! state (line trackers and the advisory rotator); configuration is shared and
//! never mutated.

use crate::advisory::{
    AdvisoryRotator, AdvisorySlot, ConditionalAdvisory, TriggerContext, assemble_pool,
};
use crate::clock::{ZonedTime, format_clock};
use crate::line::{AfterClose, Headline, LineId, LineParams, LineTracker, headline_state};
use crate::schedule::Timetable;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Validated board configuration. Built once by [`crate::config`].
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub timezone: Tz,
    pub timetable: Timetable,
    pub inner: LineParams,
    pub outer: LineParams,
    pub approaching_threshold_secs: u32,
    pub after_close: AfterClose,
    pub advisory_cycle: Duration,
    pub base_advisories: Vec<String>,
    pub conditional_advisories: Vec<ConditionalAdvisory>,
}

impl BoardConfig {
    pub fn line(&self, id: LineId) -> &LineParams {
        match id {
            LineId::Inner => &self.inner,
            LineId::Outer => &self.outer,
        }
    }
}

/// Everything the renderer needs for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub inner: Headline,
    pub outer: Headline,
    pub advisory_a: String,
    pub advisory_b: String,
    pub clock_text: String,
    pub service_running: bool,
}

#[derive(Debug)]
pub struct BoardEngine {
    config: Arc<BoardConfig>,
    inner: LineTracker,
    outer: LineTracker,
    rotator: AdvisoryRotator,
    advisories_active: Option<bool>,
}

impl BoardEngine {
    pub fn new(config: Arc<BoardConfig>) -> Self {
        let inner = LineTracker::new(LineId::Inner, &config.inner);
        let outer = LineTracker::new(LineId::Outer, &config.outer);
        let rotator = AdvisoryRotator::new(config.advisory_cycle);
        Self {
            config,
            inner,
            outer,
            rotator,
            advisories_active: None,
        }
    }

    pub fn tracker(&self, id: LineId) -> &LineTracker {
        match id {
            LineId::Inner => &self.inner,
            LineId::Outer => &self.outer,
        }
    }

    /// Compute one snapshot. `remote_base` replaces the configured base
    /// messages when present and non-empty.
    pub fn tick(&mut self, now: &ZonedTime, remote_base: Option<&[String]>) -> BoardSnapshot {
        let config = Arc::clone(&self.config);
        let timetable = &config.timetable;

        let inner = self.update_line(LineId::Inner, now);
        let outer = self.update_line(LineId::Outer, now);

        let active = timetable.is_service_active(now);
        if self.advisories_active != Some(active) {
            info!(
                active,
                minute_of_day = now.minute_of_day(),
                weekday = %now.weekday,
                "Advisory display {}",
                if active { "resumed" } else { "suspended" }
            );
            self.advisories_active = Some(active);
        }

        let (advisory_a, advisory_b) = if active {
            let base = match remote_base {
                Some(messages) if !messages.is_empty() => messages,
                _ => config.base_advisories.as_slice(),
            };
            let ctx = TriggerContext {
                seasonal_event_active: timetable.is_seasonal_event_active(now),
                termination_window_open: timetable.is_in_termination_window(now),
                inner_cycles: self.inner.cycle_count(),
                outer_cycles: self.outer.cycle_count(),
            };
            let pool_a = assemble_pool(AdvisorySlot::A, base, &config.conditional_advisories, &ctx);
            let pool_b = assemble_pool(AdvisorySlot::B, base, &config.conditional_advisories, &ctx);
            self.rotator.advance(now.epoch_millis, &pool_a, &pool_b);
            (
                self.rotator.current(AdvisorySlot::A, &pool_a).to_string(),
                self.rotator.current(AdvisorySlot::B, &pool_b).to_string(),
            )
        } else {
            self.rotator.suspend();
            (String::new(), String::new())
        };

        BoardSnapshot {
            inner,
            outer,
            advisory_a,
            advisory_b,
            clock_text: format_clock(now),
            service_running: timetable.is_service_running(now),
        }
    }

    fn update_line(&mut self, id: LineId, now: &ZonedTime) -> Headline {
        let config = &self.config;
        let params = config.line(id);
        let state = headline_state(
            params,
            &config.timetable,
            now,
            config.approaching_threshold_secs,
            config.after_close,
        );
        let tracker = match id {
            LineId::Inner => &mut self.inner,
            LineId::Outer => &mut self.outer,
        };
        tracker.update(params, state, now)
    }
}
