//! Error types for device operations.
//!
//! Device faults stay local to this crate as [`HardwareError`]. When they
//! cross into the service API they become [`tidepool_core::Error`] values:
//! instrument problems map to `InstrumentFault`, everything else to
//! `Hardware`.

/// Result type alias for device operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to a pin or an instrument.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Operation is not supported by this device.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Instrument answered with something that is not a reading.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Writing a digital output failed.
    #[error("Pin {pin} write failed: {message}")]
    PinWrite { pin: String, message: String },

    /// The GPIO controller refused a request.
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn pin_write(pin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PinWrite {
            pin: pin.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the instrument rather than from wiring
    /// or the operating system.
    pub fn is_instrument_fault(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. } | Self::Timeout { .. } | Self::InvalidData { .. }
        )
    }
}

impl From<HardwareError> for tidepool_core::Error {
    fn from(error: HardwareError) -> Self {
        if error.is_instrument_fault() {
            tidepool_core::Error::InstrumentFault(error.to_string())
        } else {
            tidepool_core::Error::Hardware(error.to_string())
        }
    }
}
