//! DS18B20 thermometer on the Linux 1-Wire bus.
//!
//! The kernel exposes each probe as `<devices>/28-xxxxxxxxxxxx/w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line ends in `YES` once the CRC check passed; `t=` is in
//! thousandths of a degree Celsius.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info};

use crate::{HardwareError, Result, traits::SensorDevice};

/// 1-Wire family code of the DS18B20.
const FAMILY_PREFIX: &str = "28";
const CRC_RETRY_DELAY: Duration = Duration::from_millis(200);
const MAX_CRC_RETRIES: u32 = 10;

#[derive(Debug, Clone)]
pub struct W1Thermometer {
    name: String,
    device_file: PathBuf,
    retry_delay: Duration,
}

impl W1Thermometer {
    /// Use the probe whose sysfs directory is `device_dir`.
    pub fn new(device_dir: impl AsRef<Path>) -> Self {
        let device_dir = device_dir.as_ref();
        let name = device_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "w1 thermometer".to_string());
        Self {
            name,
            device_file: device_dir.join("w1_slave"),
            retry_delay: CRC_RETRY_DELAY,
        }
    }

    /// Find the first DS18B20 under `devices_dir`.
    ///
    /// Returns `None` when the directory is missing or holds no probe.
    pub fn discover(devices_dir: impl AsRef<Path>) -> Option<Self> {
        let devices_dir = devices_dir.as_ref();
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(devices_dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(FAMILY_PREFIX))
            .map(|entry| entry.path())
            .collect();
        candidates.sort();

        let device_dir = candidates.into_iter().next()?;
        info!(device = %device_dir.display(), "Found temperature sensor");
        Some(Self::new(device_dir))
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Parse a `w1_slave` dump.
///
/// Returns `Ok(None)` while the CRC line does not end in `YES`.
fn parse_w1_slave(contents: &str) -> Result<Option<f64>> {
    let mut lines = contents.lines();
    let crc_ok = lines
        .next()
        .is_some_and(|line| line.trim_end().ends_with("YES"));
    if !crc_ok {
        return Ok(None);
    }

    let data = lines
        .next()
        .ok_or_else(|| HardwareError::invalid_data("w1_slave has no data line"))?;
    let (_, raw) = data
        .split_once("t=")
        .ok_or_else(|| HardwareError::invalid_data(format!("No t= field in {data:?}")))?;
    let milli: f64 = raw
        .trim()
        .parse()
        .map_err(|_| HardwareError::invalid_data(format!("Bad temperature {raw:?}")))?;

    Ok(Some(milli / 1000.0))
}

impl SensorDevice for W1Thermometer {
    async fn read(&mut self) -> Result<f64> {
        for attempt in 0..MAX_CRC_RETRIES {
            let contents = tokio::fs::read_to_string(&self.device_file).await?;
            if let Some(celsius) = parse_w1_slave(&contents)? {
                return Ok(celsius);
            }
            debug!(sensor = %self.name, attempt, "CRC not ready, retrying");
            tokio::time::sleep(self.retry_delay).await;
        }
        Err(HardwareError::timeout(
            self.retry_delay.as_millis() as u64 * u64::from(MAX_CRC_RETRIES),
        ))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
