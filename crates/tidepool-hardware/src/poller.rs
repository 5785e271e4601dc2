//! Background sensor polling.
//!
//! Each [`SensorPoller`] owns one instrument and one [`LatestReading`]
//! slot. A tokio task reads the instrument, publishes `(now, value)`,
//! sleeps, and repeats for the lifetime of the poller.
//!
//! ```text
//!  poll task ──lock──► instrument ◄──lock── send_command()
//!      │
//!      └─publish──► LatestReading ──peek──► latest()
//! ```
//!
//! The instrument sits behind a `tokio::sync::Mutex`. The poll task holds
//! it for one read cycle and releases it before sleeping, so an
//! interactive command waits for at most one in-flight read.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tidepool_core::{
    Error, SensorReading,
    constants::{MIN_POLL_SLEEP, PH_MALFORMED_FALLBACK, PH_SENTINEL, TEMPERATURE_SENTINEL},
};
use tokio::{
    sync::{Mutex, Notify, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, trace, warn};

use crate::{HardwareError, devices::AnySensor, reading::LatestReading, traits::SensorDevice};

/// What a poller measures. Decides the sentinel and fault policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Thermometer,
    Ph,
}

impl SensorKind {
    /// Value published once when the instrument is absent at start-up.
    pub fn sentinel(&self) -> f64 {
        match self {
            SensorKind::Thermometer => TEMPERATURE_SENTINEL,
            SensorKind::Ph => PH_SENTINEL,
        }
    }

    /// Value to publish for one cycle after a read failed, or `None` to keep
    /// the previous reading.
    fn fallback(&self, error: &HardwareError) -> Option<f64> {
        match (self, error) {
            (SensorKind::Ph, HardwareError::InvalidData { .. }) => Some(PH_MALFORMED_FALLBACK),
            _ => None,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Thermometer => write!(f, "thermometer"),
            SensorKind::Ph => write!(f, "pH sensor"),
        }
    }
}

/// Periodic reader of one instrument.
///
/// Dropping the poller stops its task.
#[derive(Debug)]
pub struct SensorPoller {
    kind: SensorKind,
    latest: Arc<LatestReading>,
    device: Option<Arc<Mutex<AnySensor>>>,
    interval_ms: Arc<AtomicU64>,
    default_interval: Duration,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl SensorPoller {
    /// Start polling `device` every `interval`.
    ///
    /// The first read happens before this returns, so the slot always holds
    /// a value. Without a device the sentinel is published once and no task
    /// is spawned.
    pub async fn start(kind: SensorKind, device: Option<AnySensor>, interval: Duration) -> Self {
        let interval_ms = Arc::new(AtomicU64::new(interval.as_millis() as u64));
        let wake = Arc::new(Notify::new());

        let Some(mut device) = device else {
            warn!(sensor = %kind, sentinel = kind.sentinel(), "Sensor not found, publishing sentinel");
            return Self {
                kind,
                latest: Arc::new(LatestReading::new(SensorReading::now(kind.sentinel()))),
                device: None,
                interval_ms,
                default_interval: interval,
                wake,
                task: None,
            };
        };

        info!(sensor = %kind, device = device.name(), ?interval, "Starting sensor polling");
        let started = Instant::now();
        let result = device.read().await;
        let latency = started.elapsed();
        let initial = match result {
            Ok(value) => value,
            Err(error) => {
                warn!(sensor = %kind, %error, "Initial read failed");
                kind.fallback(&error).unwrap_or(kind.sentinel())
            }
        };

        let latest = Arc::new(LatestReading::new(SensorReading::now(initial)));
        let device = Arc::new(Mutex::new(device));
        let task = tokio::spawn(poll_loop(
            kind,
            Arc::clone(&device),
            Arc::clone(&latest),
            Arc::clone(&interval_ms),
            Arc::clone(&wake),
            latency,
        ));

        Self {
            kind,
            latest,
            device: Some(device),
            interval_ms,
            default_interval: interval,
            wake,
            task: Some(task),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Whether an instrument was found at start-up.
    pub fn is_present(&self) -> bool {
        self.device.is_some()
    }

    /// Newest reading. Never waits on the instrument.
    pub fn latest(&self) -> SensorReading {
        self.latest.peek()
    }

    pub fn subscribe(&self) -> watch::Receiver<SensorReading> {
        self.latest.subscribe()
    }

    pub fn sample_time(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }

    /// Change the poll interval. `0` restores the configured default.
    ///
    /// A poll task sleeping on the old interval is woken so the new one
    /// applies from the next cycle. A task that is mid-read is not woken
    /// and picks the new interval up when it next sleeps.
    pub fn set_sample_time(&self, ms: u64) {
        let ms = if ms == 0 {
            self.default_interval.as_millis() as u64
        } else {
            ms
        };
        self.interval_ms.store(ms, Ordering::SeqCst);
        self.wake.notify_waiters();
        info!(sensor = %self.kind, interval_ms = ms, "Sample time changed");
    }

    /// Forward a raw command to the instrument and return its raw answer.
    ///
    /// Waits for any in-flight poll cycle to finish first.
    ///
    /// # Errors
    ///
    /// `InstrumentFault` when the instrument is absent or does not answer,
    /// `Hardware` when it does not support commands.
    pub async fn send_command(&self, command: &str) -> tidepool_core::Result<String> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| Error::InstrumentFault(format!("{} not present", self.kind)))?;

        debug!(sensor = %self.kind, command, "Waiting for poll cycle to finish");
        let mut device = device.lock().await;
        let answer = device.query(command).await?;
        debug!(sensor = %self.kind, command, answer = %answer, "Instrument answered");
        Ok(answer)
    }
}

impl Drop for SensorPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_loop(
    kind: SensorKind,
    device: Arc<Mutex<AnySensor>>,
    latest: Arc<LatestReading>,
    interval_ms: Arc<AtomicU64>,
    wake: Arc<Notify>,
    mut latency: Duration,
) {
    loop {
        let interval = Duration::from_millis(interval_ms.load(Ordering::SeqCst));
        let pause = interval.saturating_sub(latency).max(MIN_POLL_SLEEP);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = wake.notified() => {}
        }

        let result = {
            let mut device = device.lock().await;
            let started = Instant::now();
            let result = device.read().await;
            latency = started.elapsed();
            result
        };

        let value = match result {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(sensor = %kind, %error, "Problem with reading");
                kind.fallback(&error)
            }
        };
        if let Some(value) = value {
            trace!(sensor = %kind, value, "Publishing reading");
            latest.publish(SensorReading::now(value));
        }
    }
}
