//! Device layer and hardware control service for the tidepool aquarium
//! controller.
//!
//! # Layers
//!
//! - **Capabilities** ([`traits`]): [`DigitalOutput`] for relay, light and
//!   stepper lines; [`SensorDevice`] for polled instruments.
//! - **Devices**: Raspberry Pi GPIO pins ([`gpio`]), the 1-Wire
//!   thermometer ([`w1`]), the I2C pH circuit ([`atlas`]), and in-memory or
//!   simulated stand-ins ([`mock`]).
//! - **Actuators**: [`Relay`](relay::Relay) with polarity, and the tri-state
//!   [`Light`](light::Light) grouped in a scope-arbitrated
//!   [`LightBank`](light::LightBank).
//! - **Background workers**: one [`SensorPoller`](poller::SensorPoller) per
//!   instrument feeding a single-slot [`LatestReading`](reading::LatestReading),
//!   and the dosing-pump [`StepperExecutor`](stepper::StepperExecutor).
//! - **Service** ([`service`]): the [`HardwareControlService`] façade that
//!   owns all of the above and implements
//!   [`tidepool_core::HardwareControl`].
//!
//! # Error Handling
//!
//! Device operations return [`HardwareError`]. Service operations return
//! [`tidepool_core::Error`]; the conversion maps instrument faults to
//! `InstrumentFault` and pin failures to `Hardware`.
//!
//! Sensor faults never reach readers: pollers absorb them and keep serving
//! the last good value, a one-cycle fallback, or a sentinel.

pub mod atlas;
pub mod devices;
pub mod error;
pub mod gpio;
pub mod light;
pub mod mock;
pub mod poller;
pub mod reading;
pub mod relay;
pub mod service;
pub mod stepper;
pub mod traits;
pub mod w1;

pub use error::{HardwareError, Result};
pub use service::{HardwareControlService, ServiceBuilder};
pub use traits::{DigitalOutput, SensorDevice};
