//! Once-a-day callbacks.

use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use tracing::info;

type Callback = Box<dyn FnMut() + Send>;

/// Runs a callback once a day at a fixed time of day.
///
/// The event remembers the time of day of the previous update and fires
/// when the trigger falls in `(last, now]`. A time of day that moves
/// backwards is a pass through midnight, so a trigger in `(last, 24:00)` or
/// `[00:00, now]` fires. The very first update only records the time.
pub struct GenericEvent {
    name: String,
    trigger: NaiveTime,
    last: Option<NaiveTime>,
    callback: Callback,
}

impl GenericEvent {
    pub fn new(
        name: impl Into<String>,
        trigger: NaiveTime,
        callback: impl FnMut() + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            trigger,
            last: None,
            callback: Box::new(callback),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger(&self) -> NaiveTime {
        self.trigger
    }

    /// Advance to `now`, running the callback if the trigger was crossed.
    /// Returns whether it ran.
    pub fn update(&mut self, now: NaiveDateTime) -> bool {
        let current = now.time();
        let fire = self.last.is_some_and(|last| self.crossed(last, current));
        self.last = Some(current);
        if fire {
            info!(event = %self.name, trigger = %self.trigger, "Firing event");
            (self.callback)();
        }
        fire
    }

    fn crossed(&self, last: NaiveTime, current: NaiveTime) -> bool {
        if current >= last {
            last < self.trigger && self.trigger <= current
        } else {
            self.trigger > last || self.trigger <= current
        }
    }
}

impl fmt::Debug for GenericEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericEvent")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
