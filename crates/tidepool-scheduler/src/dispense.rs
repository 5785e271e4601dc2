//! Fertilizer dosing with the stepper pump.
//!
//! A dose switches the tank lights off, runs the pump for
//! `volume_ml * steps_per_ml` steps, waits for the executor to go idle and
//! then switches the lights back on. A [`CancellationToken`] cuts the dose
//! short; the lights are restored either way.

use std::{sync::Arc, time::Duration};

use chrono::NaiveTime;
use tidepool_core::{
    Error, HardwareControl, RelayChannel, Result, StepperCommand,
    config::{DispenseConfig, HardwareConfig},
    constants::{DISPENSE_POLL_INTERVAL, MAX_STEPS},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::event::GenericEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenseOutcome {
    /// The pump ran every step.
    Completed,
    /// The dose was cancelled part way.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Dispenser {
    steps_per_ml: u32,
    light_relays: Vec<RelayChannel>,
    poll_interval: Duration,
    lights_off_settle: Duration,
    tail: Duration,
}

impl Dispenser {
    pub fn new(steps_per_ml: u32, light_relays: Vec<RelayChannel>) -> Self {
        Self {
            steps_per_ml,
            light_relays,
            poll_interval: DISPENSE_POLL_INTERVAL,
            lights_off_settle: Duration::from_millis(500),
            tail: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &DispenseConfig, hardware: &HardwareConfig) -> Result<Self> {
        let relays = config
            .light_relays
            .iter()
            .map(|name| {
                hardware.relay_channel(name).ok_or_else(|| {
                    Error::Config(format!("Dispense refers to undefined relay \"{name}\""))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(config.steps_per_ml, relays))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn steps_per_ml(&self) -> u32 {
        self.steps_per_ml
    }

    /// Stepper steps needed for `volume_ml`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the volume needs more than `MAX_STEPS` steps.
    pub fn ml_to_steps(&self, volume_ml: u32) -> Result<u32> {
        let steps = i64::from(volume_ml) * i64::from(self.steps_per_ml);
        if steps > MAX_STEPS {
            return Err(Error::InvalidArgument(format!(
                "{volume_ml} mL needs {steps} steps, more than {MAX_STEPS}"
            )));
        }
        u32::try_from(steps).map_err(|_| Error::InvalidArgument(format!("Step count {steps} out of range")))
    }

    /// Dose `volume_ml`, returning once the pump is idle again.
    pub async fn dispense<C: HardwareControl>(
        &self,
        control: &C,
        volume_ml: u32,
        stop: &CancellationToken,
    ) -> Result<DispenseOutcome> {
        let steps = self.ml_to_steps(volume_ml)?;
        let command = StepperCommand::new(i64::from(steps), false)?;

        info!(relays = ?self.light_relays, "Turning off tank lights for pump");
        let pumped = match self.switch_lights(control, false).await {
            Ok(()) => {
                tokio::time::sleep(self.lights_off_settle).await;
                self.pump(control, command, volume_ml, stop).await
            }
            Err(e) => {
                warn!(error = %e, "Not dosing, tank lights could not be switched off");
                Err(e)
            }
        };

        // Lights come back even when the pump failed.
        tokio::time::sleep(self.tail).await;
        info!("Re-enabling tank lights");
        let restored = self.switch_lights(control, true).await;

        let outcome = pumped?;
        restored?;
        Ok(outcome)
    }

    async fn pump<C: HardwareControl>(
        &self,
        control: &C,
        command: StepperCommand,
        volume_ml: u32,
        stop: &CancellationToken,
    ) -> Result<DispenseOutcome> {
        info!(steps = command.steps, volume_ml, "Starting dose");
        control.move_stepper(command).await?;

        let mut stopped = false;
        while control.is_stepper_active().await? {
            if stop.is_cancelled() {
                if !stopped {
                    info!("Dose stopped early");
                }
                // Repeated until idle: a stop sent before the move starts is dropped.
                control.stop_stepper().await?;
                stopped = true;
            }
            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                () = stop.cancelled(), if !stopped => {}
            }
        }

        info!(stopped, "Dose complete");
        Ok(if stopped || stop.is_cancelled() {
            DispenseOutcome::Stopped
        } else {
            DispenseOutcome::Completed
        })
    }

    async fn switch_lights<C: HardwareControl>(&self, control: &C, on: bool) -> Result<()> {
        let mut result = Ok(());
        for &relay in &self.light_relays {
            if let Err(e) = control.set_relay(relay, on).await {
                warn!(%relay, on, error = %e, "Failed to switch light relay");
                result = Err(e);
            }
        }
        result
    }

    /// A daily event that doses `volume_ml` at `trigger` on a spawned task.
    ///
    /// Must be updated from inside a Tokio runtime.
    pub fn event<C>(
        &self,
        name: impl Into<String>,
        trigger: NaiveTime,
        control: Arc<C>,
        volume_ml: u32,
        stop: CancellationToken,
    ) -> GenericEvent
    where
        C: HardwareControl + 'static,
    {
        let name = name.into();
        let dispenser = self.clone();
        let event_name = name.clone();
        GenericEvent::new(name, trigger, move || {
            let dispenser = dispenser.clone();
            let control = Arc::clone(&control);
            let stop = stop.clone();
            let event = event_name.clone();
            tokio::spawn(async move {
                match dispenser.dispense(control.as_ref(), volume_ml, &stop).await {
                    Ok(outcome) => info!(%event, volume_ml, ?outcome, "Dose finished"),
                    Err(e) => error!(%event, volume_ml, error = %e, "Dose failed"),
                }
            });
        })
    }
}
