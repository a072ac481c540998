//! Two rotating advisory slots over a per-tick message pool.
//!
//! The pool for a slot is the base messages followed by every conditional
//! advisory whose trigger currently holds and whose target includes the slot.
//! Rotation timing uses [`ZonedTime::epoch_millis`](crate::clock::ZonedTime)
//! so tests can drive it with any clock they like.

use crate::line::LineId;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub mod source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorySlot {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotTarget {
    A,
    B,
    Both,
}

impl SlotTarget {
    pub fn includes(self, slot: AdvisorySlot) -> bool {
        matches!(
            (self, slot),
            (SlotTarget::Both, _) | (SlotTarget::A, AdvisorySlot::A) | (SlotTarget::B, AdvisorySlot::B)
        )
    }
}

fn every_cycle() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum AdvisoryTrigger {
    SeasonalEvent,
    /// Open termination window, shown on every `every_nth_cycle`-th cycle of `line`.
    TerminationWindow {
        line: LineId,
        #[serde(default = "every_cycle")]
        every_nth_cycle: u32,
    },
}

/// Inputs a trigger is evaluated against on one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerContext {
    pub seasonal_event_active: bool,
    pub termination_window_open: bool,
    pub inner_cycles: u64,
    pub outer_cycles: u64,
}

impl TriggerContext {
    fn cycle_count(&self, line: LineId) -> u64 {
        match line {
            LineId::Inner => self.inner_cycles,
            LineId::Outer => self.outer_cycles,
        }
    }
}

impl AdvisoryTrigger {
    pub fn is_active(&self, ctx: &TriggerContext) -> bool {
        match self {
            AdvisoryTrigger::SeasonalEvent => ctx.seasonal_event_active,
            AdvisoryTrigger::TerminationWindow {
                line,
                every_nth_cycle,
            } => {
                let every = u64::from((*every_nth_cycle).max(1));
                ctx.termination_window_open && ctx.cycle_count(*line) % every == every - 1
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConditionalAdvisory {
    pub text: String,
    pub slot: SlotTarget,
    pub trigger: AdvisoryTrigger,
}

pub fn assemble_pool<'a>(
    slot: AdvisorySlot,
    base: &'a [String],
    conditionals: &'a [ConditionalAdvisory],
    ctx: &TriggerContext,
) -> Vec<&'a str> {
    base.iter()
        .map(String::as_str)
        .chain(
            conditionals
                .iter()
                .filter(|advisory| advisory.slot.includes(slot) && advisory.trigger.is_active(ctx))
                .map(|advisory| advisory.text.as_str()),
        )
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct SlotState {
    index: usize,
    last_change_ms: Option<i64>,
}

impl SlotState {
    fn due(&self, now_ms: i64, cycle_ms: i64) -> bool {
        self.last_change_ms
            .is_some_and(|last| now_ms.saturating_sub(last) >= cycle_ms)
    }
}

/// Which slots moved on a given tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rotation {
    pub a: bool,
    pub b: bool,
}

#[derive(Debug, Clone)]
pub struct AdvisoryRotator {
    cycle_ms: i64,
    a: SlotState,
    b: SlotState,
}

impl AdvisoryRotator {
    pub fn new(cycle: Duration) -> Self {
        Self {
            cycle_ms: i64::try_from(cycle.as_millis()).unwrap_or(i64::MAX).max(1),
            a: SlotState {
                index: 0,
                last_change_ms: None,
            },
            b: SlotState {
                index: 1,
                last_change_ms: None,
            },
        }
    }

    pub fn index(&self, slot: AdvisorySlot) -> usize {
        match slot {
            AdvisorySlot::A => self.a.index,
            AdvisorySlot::B => self.b.index,
        }
    }

    /// Drop the dwell timers but keep indices; they re-anchor on the next advance.
    pub fn suspend(&mut self) {
        self.a.last_change_ms = None;
        self.b.last_change_ms = None;
    }

    /// Apply any rotation that is due at `now_ms`.
    pub fn advance(&mut self, now_ms: i64, pool_a: &[&str], pool_b: &[&str]) -> Rotation {
        let mut rotation = Rotation::default();

        let anchored = self.a.last_change_ms.is_some();
        if !anchored
            || self.a.last_change_ms.is_some_and(|last| now_ms < last)
            || self.b.last_change_ms.is_some_and(|last| now_ms < last)
        {
            self.a.last_change_ms = Some(now_ms);
            // Slot B runs half a cycle out of phase with A.
            self.b.last_change_ms = Some(now_ms.saturating_sub(self.cycle_ms / 2));
            self.resolve_collision(pool_a, pool_b);
            return rotation;
        }

        if self.a.due(now_ms, self.cycle_ms) && !pool_a.is_empty() {
            self.a.index = (self.a.index % pool_a.len() + 1) % pool_a.len();
            self.a.last_change_ms = Some(now_ms);
            rotation.a = true;
            self.resolve_collision(pool_a, pool_b);
        }

        if self.b.due(now_ms, self.cycle_ms) && !pool_b.is_empty() {
            let avoid = current_in(pool_a, self.a.index);
            self.b.index = step_past(pool_b, self.b.index, avoid);
            self.b.last_change_ms = Some(now_ms);
            rotation.b = true;
        }

        if rotation.a || rotation.b {
            debug!(
                index_a = self.a.index,
                index_b = self.b.index,
                rotated_a = rotation.a,
                rotated_b = rotation.b,
                "Advisory rotation"
            );
        }
        rotation
    }

    pub fn current<'a>(&self, slot: AdvisorySlot, pool: &[&'a str]) -> &'a str {
        current_in(pool, self.index(slot)).unwrap_or("")
    }

    fn resolve_collision(&mut self, pool_a: &[&str], pool_b: &[&str]) {
        let shown_a = current_in(pool_a, self.a.index);
        if shown_a.is_some() && current_in(pool_b, self.b.index) == shown_a {
            self.b.index = step_past(pool_b, self.b.index, shown_a);
        }
    }
}

fn current_in<'a>(pool: &[&'a str], index: usize) -> Option<&'a str> {
    if pool.is_empty() {
        None
    } else {
        Some(pool[index % pool.len()])
    }
}

/// Next index after `from` whose text differs from `avoid`, wrapping at most
/// once around the pool.
fn step_past(pool: &[&str], from: usize, avoid: Option<&str>) -> usize {
    let len = pool.len();
    if len == 0 {
        return 0;
    }
    let mut index = (from % len + 1) % len;
    for _ in 0..len {
        if Some(pool[index]) != avoid {
            return index;
        }
        index = (index + 1) % len;
    }
    index
}
