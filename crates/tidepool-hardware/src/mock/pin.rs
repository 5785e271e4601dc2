//! In-memory digital output.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use crate::{HardwareError, Result, traits::DigitalOutput};

#[derive(Debug, Default)]
struct PinState {
    high: AtomicBool,
    fail: AtomicBool,
    writes: AtomicU64,
    rising_edges: AtomicU64,
}

/// Mock digital output that records every write.
///
/// # Examples
///
/// ```
/// use tidepool_hardware::mock::MockPin;
/// use tidepool_hardware::traits::DigitalOutput;
///
/// let (pin, handle) = MockPin::new("gpio5");
/// pin.write(true).unwrap();
/// pin.write(false).unwrap();
///
/// assert_eq!(handle.rising_edges(), 1);
/// assert!(!handle.is_high());
/// ```
#[derive(Debug)]
pub struct MockPin {
    label: String,
    state: Arc<PinState>,
}

impl MockPin {
    /// Create a pin that starts low.
    pub fn new(label: impl Into<String>) -> (Self, MockPinHandle) {
        let state = Arc::new(PinState::default());
        let pin = Self {
            label: label.into(),
            state: Arc::clone(&state),
        };
        (pin, MockPinHandle { state })
    }

    /// Create a pin nobody observes.
    pub fn detached(label: impl Into<String>) -> Self {
        Self::new(label).0
    }
}

impl DigitalOutput for MockPin {
    fn write(&self, high: bool) -> Result<()> {
        if self.state.fail.load(Ordering::SeqCst) {
            return Err(HardwareError::pin_write(&self.label, "injected fault"));
        }
        let was_high = self.state.high.swap(high, Ordering::SeqCst);
        if high && !was_high {
            self.state.rising_edges.fetch_add(1, Ordering::SeqCst);
        }
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_high(&self) -> bool {
        self.state.high.load(Ordering::SeqCst)
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// Observer and fault injector for a [`MockPin`].
#[derive(Debug, Clone)]
pub struct MockPinHandle {
    state: Arc<PinState>,
}

impl MockPinHandle {
    pub fn is_high(&self) -> bool {
        self.state.high.load(Ordering::SeqCst)
    }

    /// Number of low-to-high transitions; for the step line this is the
    /// number of pulses emitted.
    pub fn rising_edges(&self) -> u64 {
        self.state.rising_edges.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.state.writes.load(Ordering::SeqCst)
    }

    /// Make every following write fail until cleared.
    pub fn set_fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::SeqCst);
    }
}
