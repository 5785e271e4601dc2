use std::sync::Arc;

use tracing::debug;

use crate::{Result, traits::DigitalOutput};

/// A named relay on one digital output.
///
/// `active_high` decides which pin level energizes the relay. A new relay
/// starts released.
#[derive(Debug)]
pub struct Relay {
    name: String,
    output: Arc<dyn DigitalOutput>,
    active_high: bool,
}

impl Relay {
    pub fn new(
        name: impl Into<String>,
        output: Arc<dyn DigitalOutput>,
        active_high: bool,
    ) -> Result<Self> {
        let relay = Self {
            name: name.into(),
            output,
            active_high,
        };
        relay.off()?;
        Ok(relay)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self, engaged: bool) -> Result<()> {
        debug!(relay = %self.name, engaged, "Switching relay");
        self.output.write(engaged == self.active_high)
    }

    pub fn on(&self) -> Result<()> {
        self.set(true)
    }

    pub fn off(&self) -> Result<()> {
        self.set(false)
    }

    /// Whether the relay is energized.
    pub fn is_active(&self) -> bool {
        self.output.is_high() == self.active_high
    }
}
