//! Scheduling engine for the tidepool aquarium controller.
//!
//! Timers turn wall-clock time into light colors:
//!
//! - [`LightTimer`] runs the day / night / eclipse state machine for a
//!   group of lights.
//! - [`OutletTimer`] is a light timer for a single on/off outlet, without
//!   eclipses, optionally pinned on or off.
//! - [`GenericEvent`] fires a callback once a day at a fixed time.
//!
//! The [`Scheduler`] owns all of them and is stepped by an external driver
//! calling [`Scheduler::update`] every 30 seconds. Hardware is reached only
//! through [`tidepool_core::HardwareControl`], so the same scheduler runs
//! against the in-process service or a remote one.
//!
//! The [`dispense`] module drives the fertilizer pump for dosing events.

pub mod dispense;
pub mod event;
pub mod scheduler;
pub mod timer;

#[cfg(test)]
mod test_support;

pub use dispense::{DispenseOutcome, Dispenser};
pub use event::GenericEvent;
pub use scheduler::{Scheduler, Timer};
pub use tidepool_core::{hhmm_to_time, time_to_hhmm};
pub use timer::{LightTimer, OutletTimer, ScheduledLight, TimerState, Transition, time_of_day_to_state};
