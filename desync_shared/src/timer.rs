//! Tick-counted interval timers.
//!
//! Timers compare against the host's tick counter rather than wall time, so a
//! controller behaves identically under a slowed or sped-up tick rate.

/// Host simulation rate used to convert second-based settings.
pub const TICKS_PER_SECOND: f64 = 20.0;

/// Offset that puts the trigger base far enough in the past that any
/// reasonable interval has already elapsed.
pub const PRE_ARM_OFFSET: i64 = -6_969_420;

/// Unit a duration setting is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Ticks,
    Seconds,
}

impl TimeUnit {
    /// Converts `amount` of this unit to whole ticks (rounded to nearest).
    pub fn to_ticks(self, amount: f64) -> i64 {
        match self {
            TimeUnit::Ticks => amount.round() as i64,
            TimeUnit::Seconds => (amount * TICKS_PER_SECOND).round() as i64,
        }
    }
}

pub fn seconds_to_ticks(seconds: f64) -> i64 {
    TimeUnit::Seconds.to_ticks(seconds)
}

/// Debounce/interval gate keyed on a tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickTimer {
    last_trigger_tick: i64,
}

impl TickTimer {
    /// Timer whose cooldown starts at `now`.
    pub fn new(now: u64) -> Self {
        Self {
            last_trigger_tick: now as i64,
        }
    }

    pub fn last_trigger_tick(&self) -> i64 {
        self.last_trigger_tick
    }

    pub fn elapsed(&self, now: u64) -> i64 {
        now as i64 - self.last_trigger_tick
    }

    /// True once `interval` ticks have passed. Never resets.
    pub fn tick(&self, now: u64, interval: i64) -> bool {
        self.elapsed(now) >= interval
    }

    /// Same predicate as [`tick`](Self::tick), restarting the cooldown when it fires.
    pub fn tick_and_reset(&mut self, now: u64, interval: i64) -> bool {
        if self.tick(now, interval) {
            self.reset(now);
            true
        } else {
            false
        }
    }

    /// Starts a fresh cooldown at `now`.
    pub fn reset(&mut self, now: u64) {
        self.reset_with_offset(now, 0);
    }

    /// Moves the trigger base to `now + offset`. Negative offsets make the
    /// timer available sooner; see [`PRE_ARM_OFFSET`].
    pub fn reset_with_offset(&mut self, now: u64, offset: i64) {
        self.last_trigger_tick = (now as i64).saturating_add(offset);
    }
}
