//! Timer slots owned by the game engine.
//!
//! The engine has exactly three sources of scheduled work: the phase timer,
//! the race tick and the bot tick. Each lives in its own [`TimerSlot`]; arming
//! a slot replaces (and thereby cancels) whatever it held before, so two
//! timers can never be pending for the same purpose.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Phase,
    RaceTick,
    BotTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer {
    due: u64,
    period: Option<u64>,
    /// Arming order, used to break ties between timers due at the same instant.
    token: u64,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<TimerSlot, Timer>,
    next_token: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot timer firing `delay_ms` after `now`.
    pub fn arm_once(&mut self, slot: TimerSlot, now: u64, delay_ms: u64) -> u64 {
        self.arm(slot, now + delay_ms, None)
    }

    /// Arms a repeating timer firing every `period_ms` starting one period after `now`.
    pub fn arm_interval(&mut self, slot: TimerSlot, now: u64, period_ms: u64) -> u64 {
        let period_ms = period_ms.max(1);
        self.arm(slot, now + period_ms, Some(period_ms))
    }

    fn arm(&mut self, slot: TimerSlot, due: u64, period: Option<u64>) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.timers.insert(slot, Timer { due, period, token });
        token
    }

    /// Cancels the timer in `slot`. Returns true if one was pending.
    pub fn cancel(&mut self, slot: TimerSlot) -> bool {
        self.timers.remove(&slot).is_some()
    }

    pub fn is_armed(&self, slot: TimerSlot) -> bool {
        self.timers.contains_key(&slot)
    }

    pub fn due_at(&self, slot: TimerSlot) -> Option<u64> {
        self.timers.get(&slot).map(|timer| timer.due)
    }

    /// Earliest pending deadline across all slots.
    pub fn next_due(&self) -> Option<u64> {
        self.timers.values().map(|timer| timer.due).min()
    }

    /// Removes and returns the earliest timer due at or before `now`.
    ///
    /// Interval timers are re-armed at their next period after `now` before
    /// being returned, so a handler that cancels its own slot stops the
    /// interval for good.
    pub fn pop_due(&mut self, now: u64) -> Option<TimerSlot> {
        let (slot, timer) = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .min_by_key(|(_, timer)| (timer.due, timer.token))
            .map(|(slot, timer)| (*slot, *timer))?;

        match timer.period {
            Some(period) => {
                // Missed periods are skipped rather than replayed back to back.
                let mut due = timer.due + period;
                if due <= now {
                    due += (now - due) / period * period + period;
                }
                self.timers.insert(slot, Timer { due, ..timer });
            }
            None => {
                self.timers.remove(&slot);
            }
        }

        Some(slot)
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
