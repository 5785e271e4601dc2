//! Actuator and sensor capability traits.
//!
//! [`DigitalOutput`] is synchronous and object-safe: pins are shared between
//! relays, lights and the stepper as `Arc<dyn DigitalOutput>`.
//!
//! [`SensorDevice`] uses native `async fn` methods (Rust 1.90 + Edition 2024
//! RPITIT). It is not object-safe, so pollers hold concrete devices through
//! the [`AnySensor`](crate::devices::AnySensor) enum.

#![allow(async_fn_in_trait)]

use std::fmt::Debug;

use crate::error::{HardwareError, Result};

/// A single digital output line.
///
/// `write(true)` drives the line high. Polarity (active-high or active-low
/// relays, the active-low stepper enable) is applied by the caller.
pub trait DigitalOutput: Debug + Send + Sync {
    /// Drive the line.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying driver rejects the write. The
    /// level reported by [`is_high`](Self::is_high) is unchanged in that case.
    fn write(&self, high: bool) -> Result<()>;

    /// Last level successfully written.
    fn is_high(&self) -> bool;

    /// Human-readable name used in logs.
    fn label(&self) -> String;
}

/// A polled instrument (thermometer, pH probe, simulated generator).
pub trait SensorDevice: Send {
    /// Take one measurement.
    ///
    /// # Errors
    ///
    /// [`HardwareError::InvalidData`] when the instrument answers with
    /// something that is not a number, other variants when it cannot be
    /// reached at all.
    async fn read(&mut self) -> Result<f64>;

    /// Send a raw command to the instrument and return its raw answer.
    ///
    /// Instruments without a command channel keep the default, which
    /// reports the operation as unsupported.
    async fn query(&mut self, command: &str) -> Result<String> {
        Err(HardwareError::unsupported(format!("query({command})")))
    }

    /// Device name used in logs.
    fn name(&self) -> &str;
}
