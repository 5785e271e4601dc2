//! Scriptable instrument for tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{HardwareError, Result, traits::SensorDevice};

/// One scripted answer to a `read()`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResponse {
    Value(f64),
    /// The instrument answers, but not with a number.
    Garbage(String),
    /// The instrument does not answer.
    Fault,
}

#[derive(Debug)]
struct ProbeState {
    value: f64,
    script: VecDeque<ProbeResponse>,
    query_answer: String,
    commands: Vec<String>,
    delay: Duration,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ProbeState>,
    busy: AtomicBool,
    overlaps: AtomicU64,
    reads: AtomicU64,
}

impl Shared {
    fn state(&self) -> std::sync::MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mock instrument whose answers are controlled through a
/// [`MockProbeHandle`].
///
/// Every `read` and `query` marks the probe busy for the configured delay.
/// A second transaction starting while the first is in flight is counted
/// as an overlap, which lets tests check that callers serialize access.
///
/// # Examples
///
/// ```
/// use tidepool_hardware::mock::MockProbe;
/// use tidepool_hardware::traits::SensorDevice;
///
/// #[tokio::main]
/// async fn main() -> tidepool_hardware::Result<()> {
///     let (mut probe, handle) = MockProbe::new("pH", 7.0);
///     assert_eq!(probe.read().await?, 7.0);
///
///     handle.set_value(6.5);
///     assert_eq!(probe.read().await?, 6.5);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockProbe {
    name: String,
    shared: Arc<Shared>,
}

impl MockProbe {
    /// Create a probe that steadily reads `value`.
    pub fn new(name: impl Into<String>, value: f64) -> (Self, MockProbeHandle) {
        let shared = Arc::new(Shared {
            state: Mutex::new(ProbeState {
                value,
                script: VecDeque::new(),
                query_answer: "OK".to_string(),
                commands: Vec::new(),
                delay: Duration::ZERO,
            }),
            busy: AtomicBool::new(false),
            overlaps: AtomicU64::new(0),
            reads: AtomicU64::new(0),
        });
        let probe = Self {
            name: name.into(),
            shared: Arc::clone(&shared),
        };
        (probe, MockProbeHandle { shared })
    }

    async fn transaction(&self) {
        if self.shared.busy.swap(true, Ordering::SeqCst) {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = self.shared.state().delay;
        tokio::time::sleep(delay).await;
        self.shared.busy.store(false, Ordering::SeqCst);
    }
}

impl SensorDevice for MockProbe {
    async fn read(&mut self) -> Result<f64> {
        self.transaction().await;
        self.shared.reads.fetch_add(1, Ordering::SeqCst);

        let response = {
            let mut state = self.shared.state();
            let steady = ProbeResponse::Value(state.value);
            state.script.pop_front().unwrap_or(steady)
        };
        match response {
            ProbeResponse::Value(value) => Ok(value),
            ProbeResponse::Garbage(raw) => Err(HardwareError::invalid_data(format!(
                "{} answered {raw:?}",
                self.name
            ))),
            ProbeResponse::Fault => Err(HardwareError::disconnected(&self.name)),
        }
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.transaction().await;

        let mut state = self.shared.state();
        state.commands.push(command.to_string());
        Ok(state.query_answer.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Controls the answers of a [`MockProbe`] and observes its traffic.
#[derive(Debug, Clone)]
pub struct MockProbeHandle {
    shared: Arc<Shared>,
}

impl MockProbeHandle {
    /// Change the steady value returned when no script is queued.
    pub fn set_value(&self, value: f64) {
        self.shared.state().value = value;
    }

    /// Queue answers consumed by the following reads, in order.
    pub fn script(&self, responses: impl IntoIterator<Item = ProbeResponse>) {
        self.shared.state().script.extend(responses);
    }

    /// Time each transaction keeps the instrument busy.
    pub fn set_delay(&self, delay: Duration) {
        self.shared.state().delay = delay;
    }

    pub fn set_query_answer(&self, answer: impl Into<String>) {
        self.shared.state().query_answer = answer.into();
    }

    /// Commands received through `query`, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.shared.state().commands.clone()
    }

    pub fn reads(&self) -> u64 {
        self.shared.reads.load(Ordering::SeqCst)
    }

    /// Transactions that started while another was still in flight.
    pub fn overlaps(&self) -> u64 {
        self.shared.overlaps.load(Ordering::SeqCst)
    }
}
