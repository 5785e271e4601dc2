//! Shared domain types for the tidepool aquarium controller.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: light colors and ids, relay channels, scope tokens, sensor
//! readings, stepper commands, the error taxonomy and its wire status
//! codes, and the serde configuration model loaded at start-up.
//!
//! The [`HardwareControl`] trait is the client-side view of the hardware
//! control service. The in-process service and the TCP client both
//! implement it, so the scheduling engine can drive either one.

pub mod clock;
pub mod config;
pub mod constants;
pub mod control;
pub mod error;
pub mod types;

pub use clock::{hhmm_to_time, time_to_hhmm};
pub use control::HardwareControl;
pub use error::{Error, Result, StatusCode};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
