//! Mock and simulated devices.
//!
//! [`MockPin`] and [`MockProbe`] come with a controlling handle for tests.
//! [`SimulatedSensor`] stands in for real instruments when the service runs
//! with `use_mock_hw`.

pub mod pin;
pub mod probe;
pub mod simulated;

pub use pin::{MockPin, MockPinHandle};
pub use probe::{MockProbe, MockProbeHandle, ProbeResponse};
pub use simulated::SimulatedSensor;
