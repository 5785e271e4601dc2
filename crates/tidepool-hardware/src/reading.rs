//! Single-slot handoff of the newest sensor reading.

use tidepool_core::SensorReading;
use tokio::sync::watch;

/// Holds exactly one [`SensorReading`].
///
/// The producer overwrites the slot with [`publish`](Self::publish);
/// readers [`peek`](Self::peek) without consuming, so any number of readers
/// see the same value until the next publish.
#[derive(Debug)]
pub struct LatestReading {
    slot: watch::Sender<SensorReading>,
}

impl LatestReading {
    pub fn new(initial: SensorReading) -> Self {
        Self {
            slot: watch::Sender::new(initial),
        }
    }

    /// Replace the held reading.
    pub fn publish(&self, reading: SensorReading) {
        self.slot.send_replace(reading);
    }

    /// Copy of the held reading. Never blocks on the producer.
    pub fn peek(&self) -> SensorReading {
        *self.slot.borrow()
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<SensorReading> {
        self.slot.subscribe()
    }
}
