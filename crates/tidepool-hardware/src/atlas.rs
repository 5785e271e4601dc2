//! Atlas Scientific EZO pH circuit on the I2C bus.
//!
//! Commands are ASCII followed by a NUL. The circuit needs time to process
//! a command before its answer can be read back as a fixed-size frame:
//!
//! ```text
//!  write "R\0" ──► wait 1.5 s ──► read 31 bytes
//!                                 [status][answer ... NUL padding]
//! ```
//!
//! Status 1 is success, 2 a syntax error, 254 still processing and 255 no
//! data. Answer bytes can arrive with the high bit set.

use std::time::Duration;

use rppal::i2c::I2c;
use tracing::{debug, info};

use crate::{HardwareError, Result, traits::SensorDevice};

const RESPONSE_LEN: usize = 31;
/// Reads and calibration.
const LONG_DELAY: Duration = Duration::from_millis(1500);
const SHORT_DELAY: Duration = Duration::from_millis(300);

const STATUS_SUCCESS: u8 = 1;
const STATUS_SYNTAX_ERROR: u8 = 2;
const STATUS_PENDING: u8 = 254;
const STATUS_NO_DATA: u8 = 255;

/// How long the circuit needs before the answer to `command` can be read.
///
/// `None` for `Sleep`, which the circuit never answers.
pub fn processing_delay(command: &str) -> Option<Duration> {
    let command = command.to_ascii_uppercase();
    if command.starts_with('R') || command.starts_with("CAL") {
        Some(LONG_DELAY)
    } else if command.starts_with("SLEEP") {
        None
    } else {
        Some(SHORT_DELAY)
    }
}

/// Decode one response frame into the circuit's ASCII answer.
///
/// # Errors
///
/// `InvalidData` for an empty frame or any status other than success.
pub fn decode_response(frame: &[u8]) -> Result<String> {
    let Some((&status, body)) = frame.split_first() else {
        return Err(HardwareError::invalid_data("empty response frame"));
    };
    match status {
        STATUS_SUCCESS => Ok(body
            .iter()
            .map(|b| b & 0x7f)
            .filter(|&b| b != 0)
            .map(char::from)
            .collect()),
        STATUS_SYNTAX_ERROR => Err(HardwareError::invalid_data("syntax error")),
        STATUS_PENDING => Err(HardwareError::invalid_data("still processing")),
        STATUS_NO_DATA => Err(HardwareError::invalid_data("no data")),
        code => Err(HardwareError::invalid_data(format!("unknown status {code}"))),
    }
}

/// Parse the answer to `R` as a pH value.
///
/// # Errors
///
/// `InvalidData` when the answer is not a finite number.
pub fn parse_reading(answer: &str) -> Result<f64> {
    answer
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|ph| ph.is_finite())
        .ok_or_else(|| HardwareError::invalid_data(format!("not a pH reading: {answer:?}")))
}

fn bus_fault(name: &str, error: rppal::i2c::Error) -> HardwareError {
    HardwareError::disconnected(format!("{name}: {error}"))
}

/// EZO pH circuit at a fixed bus address.
#[derive(Debug)]
pub struct AtlasPhProbe {
    name: String,
    i2c: I2c,
}

impl AtlasPhProbe {
    /// Open `bus` and address the circuit at `address`.
    ///
    /// # Errors
    ///
    /// `Disconnected` when the bus cannot be opened or addressed.
    pub fn open(bus: u8, address: u16) -> Result<Self> {
        let name = format!("ezo-ph@i2c-{bus}:{address}");
        let mut i2c = I2c::with_bus(bus).map_err(|e| bus_fault(&name, e))?;
        i2c.set_slave_address(address).map_err(|e| bus_fault(&name, e))?;
        info!(bus, address, "Opened pH circuit");
        Ok(Self { name, i2c })
    }
}

impl SensorDevice for AtlasPhProbe {
    async fn read(&mut self) -> Result<f64> {
        let answer = self.query("R").await?;
        parse_reading(&answer)
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        let mut request = Vec::with_capacity(command.len() + 1);
        request.extend_from_slice(command.as_bytes());
        request.push(0);
        self.i2c
            .write(&request)
            .map_err(|e| bus_fault(&self.name, e))?;

        let Some(delay) = processing_delay(command) else {
            debug!(sensor = %self.name, "Circuit put to sleep");
            return Ok("sleep mode".to_string());
        };
        tokio::time::sleep(delay).await;

        let mut frame = [0u8; RESPONSE_LEN];
        self.i2c
            .read(&mut frame)
            .map_err(|e| bus_fault(&self.name, e))?;
        decode_response(&frame)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn frame(status: u8, answer: &[u8]) -> [u8; RESPONSE_LEN] {
        let mut frame = [0u8; RESPONSE_LEN];
        frame[0] = status;
        frame[1..=answer.len()].copy_from_slice(answer);
        frame
    }

    #[test]
    fn test_successful_frame_strips_padding() {
        assert_eq!(decode_response(&frame(1, b"7.012")).unwrap(), "7.012");
    }

    #[test]
    fn test_high_bits_are_cleared() {
        let answer = [b'?' | 0x80, b'C', b'a', b'l', b',', b'3' | 0x80];
        assert_eq!(decode_response(&frame(1, &answer)).unwrap(), "?Cal,3");
    }

    #[rstest]
    #[case(2)]
    #[case(254)]
    #[case(255)]
    #[case(17)]
    fn test_error_status_is_invalid_data(#[case] status: u8) {
        let err = decode_response(&frame(status, b"7.0")).unwrap_err();
        assert!(matches!(err, HardwareError::InvalidData { .. }));
    }

    #[test]
    fn test_empty_frame_is_invalid_data() {
        assert!(matches!(decode_response(&[]), Err(HardwareError::InvalidData { .. })));
    }

    #[rstest]
    #[case("7.012", 7.012)]
    #[case(" 4.00 ", 4.0)]
    #[case("14", 14.0)]
    fn test_parse_reading(#[case] answer: &str, #[case] ph: f64) {
        assert_eq!(parse_reading(answer).unwrap(), ph);
    }

    #[rstest]
    #[case("")]
    #[case("*ER")]
    #[case("?I,pH,2.1")]
    #[case("NaN")]
    fn test_non_numeric_answer_is_invalid_data(#[case] answer: &str) {
        let err = parse_reading(answer).unwrap_err();
        assert!(err.is_instrument_fault());
        assert!(matches!(err, HardwareError::InvalidData { .. }));
    }

    #[rstest]
    #[case("R", Some(LONG_DELAY))]
    #[case("Cal,mid,7.00", Some(LONG_DELAY))]
    #[case("cal,?", Some(LONG_DELAY))]
    #[case("i", Some(SHORT_DELAY))]
    #[case("Status", Some(SHORT_DELAY))]
    #[case("Sleep", None)]
    fn test_processing_delay(#[case] command: &str, #[case] delay: Option<Duration>) {
        assert_eq!(processing_delay(command), delay);
    }
}
