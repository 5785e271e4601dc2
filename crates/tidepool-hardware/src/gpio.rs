//! Digital outputs on the Raspberry Pi GPIO header.
//!
//! Pins are addressed by BCM number and claimed through one shared
//! [`Gpio`] controller opened at start-up.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use rppal::gpio::{Gpio, OutputPin};
use tracing::debug;

use crate::{Result, traits::DigitalOutput};

/// Open the GPIO controller.
///
/// # Errors
///
/// `Gpio` when the board is not a Raspberry Pi or `/dev/gpiomem` is not
/// accessible.
pub fn controller() -> Result<Gpio> {
    Ok(Gpio::new()?)
}

/// A GPIO line claimed as an output.
#[derive(Debug)]
pub struct RpiPin {
    pin: u8,
    output: Mutex<OutputPin>,
    high: AtomicBool,
}

impl RpiPin {
    /// Claim `pin` as an output, driven low.
    ///
    /// # Errors
    ///
    /// `Gpio` when the pin does not exist or is already claimed.
    pub fn claim(gpio: &Gpio, pin: u8) -> Result<Self> {
        let output = gpio.get(pin)?.into_output_low();
        debug!(pin, "Claimed GPIO output");
        Ok(Self {
            pin,
            output: Mutex::new(output),
            high: AtomicBool::new(false),
        })
    }
}

impl DigitalOutput for RpiPin {
    fn write(&self, high: bool) -> Result<()> {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        if high {
            output.set_high();
        } else {
            output.set_low();
        }
        self.high.store(high, Ordering::SeqCst);
        Ok(())
    }

    fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }

    fn label(&self) -> String {
        format!("gpio{}", self.pin)
    }
}
