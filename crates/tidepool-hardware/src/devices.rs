//! Enum wrapper for sensor dispatch.
//!
//! [`SensorDevice`] uses native `async fn` and cannot be boxed, so pollers
//! hold an [`AnySensor`] and dispatch by variant.
//!
//! # Examples
//!
//! ```
//! use tidepool_hardware::devices::AnySensor;
//! use tidepool_hardware::mock::SimulatedSensor;
//! use tidepool_hardware::traits::SensorDevice;
//!
//! #[tokio::main]
//! async fn main() -> tidepool_hardware::Result<()> {
//!     let mut sensor = AnySensor::Simulated(SimulatedSensor::thermometer());
//!     let celsius = sensor.read().await?;
//!     assert!((-10.0..=100.0).contains(&celsius));
//!     Ok(())
//! }
//! ```

use crate::Result;
use crate::atlas::AtlasPhProbe;
use crate::mock::{MockProbe, SimulatedSensor};
use crate::traits::SensorDevice;
use crate::w1::W1Thermometer;

#[derive(Debug)]
#[non_exhaustive]
pub enum AnySensor {
    /// Random values, used with `use_mock_hw`.
    Simulated(SimulatedSensor),
    /// DS18B20 on the 1-Wire bus.
    W1Thermometer(W1Thermometer),
    /// EZO pH circuit on the I2C bus.
    AtlasPh(AtlasPhProbe),
    /// Scripted instrument for tests.
    Mock(MockProbe),
}

impl SensorDevice for AnySensor {
    async fn read(&mut self) -> Result<f64> {
        match self {
            Self::Simulated(device) => device.read().await,
            Self::W1Thermometer(device) => device.read().await,
            Self::AtlasPh(device) => device.read().await,
            Self::Mock(device) => device.read().await,
        }
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        match self {
            Self::Simulated(device) => device.query(command).await,
            Self::W1Thermometer(device) => device.query(command).await,
            Self::AtlasPh(device) => device.query(command).await,
            Self::Mock(device) => device.query(command).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Simulated(device) => device.name(),
            Self::W1Thermometer(device) => device.name(),
            Self::AtlasPh(device) => device.name(),
            Self::Mock(device) => device.name(),
        }
    }
}

impl From<SimulatedSensor> for AnySensor {
    fn from(device: SimulatedSensor) -> Self {
        Self::Simulated(device)
    }
}

impl From<W1Thermometer> for AnySensor {
    fn from(device: W1Thermometer) -> Self {
        Self::W1Thermometer(device)
    }
}

impl From<AtlasPhProbe> for AnySensor {
    fn from(device: AtlasPhProbe) -> Self {
        Self::AtlasPh(device)
    }
}

impl From<MockProbe> for AnySensor {
    fn from(device: MockProbe) -> Self {
        Self::Mock(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HardwareError;

    #[tokio::test]
    async fn test_thermometer_has_no_command_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut sensor = AnySensor::from(W1Thermometer::new(dir.path()));

        let err = sensor.query("R").await.unwrap_err();
        assert!(matches!(err, HardwareError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_mock_dispatch() {
        let (probe, handle) = MockProbe::new("pH", 7.2);
        let mut sensor = AnySensor::from(probe);

        assert_eq!(sensor.name(), "pH");
        assert_eq!(sensor.read().await.unwrap(), 7.2);
        assert_eq!(handle.reads(), 1);
    }
}
