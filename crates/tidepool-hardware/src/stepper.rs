//! Dosing-pump stepper executor.
//!
//! One tokio task consumes a FIFO of [`StepperCommand`]s. For each command
//! it sets the microstep mode and direction, enables the driver, waits for
//! it to settle, and emits one pulse at a time. A stop request cancels the
//! command in progress at the next pulse boundary; commands still queued
//! run afterwards.
//!
//! The driver enable line (`nEN`) is active-low: it is driven high at
//! start-up and after every command.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tidepool_core::{
    Error, StepMode, StepperCommand,
    constants::{DEFAULT_PULSE_HALF_PERIOD, DEFAULT_SETTLE_TIME},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{Result, traits::DigitalOutput};

/// Output lines of the stepper driver.
#[derive(Debug, Clone)]
pub struct StepperPins {
    pub step: Arc<dyn DigitalOutput>,
    pub dir: Arc<dyn DigitalOutput>,
    /// Active-low driver enable.
    pub nen: Arc<dyn DigitalOutput>,
    /// MS1..MS3, absent lines are skipped.
    pub ms: [Option<Arc<dyn DigitalOutput>>; 3],
}

impl StepperPins {
    fn enable_driver(&self) -> Result<()> {
        debug!("Enabling stepper driver");
        self.nen.write(false)
    }

    fn disable_driver(&self) -> Result<()> {
        debug!("Disabling stepper driver");
        self.nen.write(true)
    }

    fn set_mode(&self, mode: StepMode) -> Result<()> {
        for (bit, pin) in self.ms.iter().enumerate() {
            if let Some(pin) = pin {
                pin.write(mode.ms_bit(bit))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperTiming {
    /// High time and low time of one step pulse.
    pub pulse_half_period: Duration,
    /// Wait after enabling and before disabling the driver.
    pub settle: Duration,
}

impl Default for StepperTiming {
    fn default() -> Self {
        Self {
            pulse_half_period: DEFAULT_PULSE_HALF_PERIOD,
            settle: DEFAULT_SETTLE_TIME,
        }
    }
}

/// Cancellation token and activity, guarded together.
#[derive(Debug)]
struct StepperStatus {
    running: bool,
    queued: usize,
    cancel: CancellationToken,
}

fn lock(status: &Mutex<StepperStatus>) -> MutexGuard<'_, StepperStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the pins until [`start`](Self::start) moves them into the task.
#[derive(Debug)]
pub struct StepperExecutor {
    pins: StepperPins,
    timing: StepperTiming,
}

impl StepperExecutor {
    pub fn new(pins: StepperPins, timing: StepperTiming) -> Self {
        Self { pins, timing }
    }

    /// Disable the driver and spawn the executor task.
    ///
    /// # Errors
    ///
    /// Fails if the enable line cannot be driven.
    pub fn start(self) -> Result<StepperHandle> {
        self.pins.disable_driver()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(StepperStatus {
            running: false,
            queued: 0,
            cancel: CancellationToken::new(),
        }));
        let task = tokio::spawn(self.run(rx, Arc::clone(&status)));

        Ok(StepperHandle { tx, status, task })
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<StepperCommand>, status: Arc<Mutex<StepperStatus>>) {
        info!("Running stepper command executor");

        while let Some(command) = rx.recv().await {
            let cancel = {
                let mut status = lock(&status);
                status.queued = status.queued.saturating_sub(1);
                status.running = true;
                // a stop sent while idle must not cancel this command
                status.cancel = CancellationToken::new();
                status.cancel.clone()
            };
            debug!(?command, "Dequeued stepper command");

            match self.execute(command, &cancel).await {
                Ok(taken) => info!(taken, requested = command.steps, "Done with stepper command"),
                Err(e) => error!(error = %e, ?command, "Stepper command failed"),
            }
            if let Err(e) = self.pins.disable_driver() {
                error!(error = %e, "Failed to disable stepper driver");
            }

            lock(&status).running = false;
        }

        info!("Stepper executor exiting");
    }

    /// Run one command, returning the number of pulses emitted.
    async fn execute(&self, command: StepperCommand, cancel: &CancellationToken) -> Result<u32> {
        self.pins.set_mode(command.mode)?;
        self.pins.dir.write(command.reverse)?;
        self.pins.enable_driver()?;
        tokio::time::sleep(self.timing.settle).await;

        let mut taken = 0;
        for _ in 0..command.steps {
            self.pulse().await?;
            taken += 1;
            if cancel.is_cancelled() {
                info!(taken, "Stepper got stop command");
                break;
            }
        }

        tokio::time::sleep(self.timing.settle).await;
        Ok(taken)
    }

    async fn pulse(&self) -> Result<()> {
        self.pins.step.write(true)?;
        tokio::time::sleep(self.timing.pulse_half_period).await;
        self.pins.step.write(false)?;
        tokio::time::sleep(self.timing.pulse_half_period).await;
        Ok(())
    }
}

/// Non-blocking control of a running executor.
///
/// Dropping the handle stops the executor task.
#[derive(Debug)]
pub struct StepperHandle {
    tx: mpsc::UnboundedSender<StepperCommand>,
    status: Arc<Mutex<StepperStatus>>,
    task: JoinHandle<()>,
}

impl StepperHandle {
    /// Enqueue a command. Returns without waiting for it to run.
    pub fn send(&self, command: StepperCommand) -> tidepool_core::Result<()> {
        let mut status = lock(&self.status);
        self.tx
            .send(command)
            .map_err(|_| Error::Hardware("Stepper executor is not running".into()))?;
        status.queued += 1;
        debug!(?command, queued = status.queued, "Enqueued stepper command");
        Ok(())
    }

    /// Cancel the command in progress, if any.
    pub fn stop(&self) {
        let status = lock(&self.status);
        info!(running = status.running, "Stopping stepper");
        status.cancel.cancel();
    }

    /// Whether a command is running or waiting to run.
    pub fn is_active(&self) -> bool {
        let status = lock(&self.status);
        status.running || status.queued > 0
    }
}

impl Drop for StepperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
