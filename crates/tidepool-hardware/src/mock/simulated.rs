//! Random-value sensor used when running without real hardware.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::{Result, traits::SensorDevice};

/// Simulated instrument answering uniform random values in `[min, max]`.
///
/// Queries take [`SimulatedSensor::COMMAND_DELAY`] and answer `"1"` or `"0"`.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    name: String,
    min: f64,
    max: f64,
    command_delay: Duration,
}

impl SimulatedSensor {
    pub const COMMAND_DELAY: Duration = Duration::from_millis(1500);

    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            name: name.into(),
            min,
            max,
            command_delay: Self::COMMAND_DELAY,
        }
    }

    /// Water thermometer, -10..100 °C.
    pub fn thermometer() -> Self {
        Self::new("simulated thermometer", -10.0, 100.0)
    }

    /// pH probe, 0..10.
    pub fn ph_probe() -> Self {
        Self::new("simulated pH probe", 0.0, 10.0)
    }

    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = delay;
        self
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

impl SensorDevice for SimulatedSensor {
    async fn read(&mut self) -> Result<f64> {
        let value = rand::rng().random_range(self.min..=self.max);
        debug!(sensor = %self.name, value, "Simulated reading");
        Ok(value)
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        debug!(sensor = %self.name, command, "Simulated command");
        tokio::time::sleep(self.command_delay).await;
        let answer = if rand::random::<bool>() { "1" } else { "0" };
        Ok(answer.to_string())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
