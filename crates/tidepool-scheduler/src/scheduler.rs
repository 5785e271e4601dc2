//! Owner of every timer and event.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tidepool_core::{
    Error, HardwareControl, Result, config::DaemonConfig, hhmm_to_time,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    dispense::Dispenser,
    event::GenericEvent,
    timer::{LightTimer, OutletTimer, TimerState, Transition},
};

/// Any timer the scheduler can run.
#[derive(Debug, Clone)]
pub enum Timer {
    Light(LightTimer),
    Outlet(OutletTimer),
}

impl Timer {
    pub fn name(&self) -> &str {
        match self {
            Timer::Light(t) => t.name(),
            Timer::Outlet(t) => t.name(),
        }
    }

    pub fn state(&self) -> TimerState {
        match self {
            Timer::Light(t) => t.state(),
            Timer::Outlet(t) => t.state(),
        }
    }

    pub fn history(&self) -> Box<dyn Iterator<Item = &Transition> + '_> {
        match self {
            Timer::Light(t) => Box::new(t.history()),
            Timer::Outlet(t) => Box::new(t.history()),
        }
    }

    pub async fn update<C: HardwareControl>(&mut self, now: NaiveDateTime, control: &C) {
        match self {
            Timer::Light(t) => t.update(now, control).await,
            Timer::Outlet(t) => t.update(now, control).await,
        }
    }

    pub fn disable(&mut self, now: NaiveDateTime) {
        match self {
            Timer::Light(t) => t.disable(now),
            Timer::Outlet(t) => t.disable(now),
        }
    }

    pub async fn resume<C: HardwareControl>(&mut self, now: NaiveDateTime, control: &C) {
        match self {
            Timer::Light(t) => t.resume(now, control).await,
            Timer::Outlet(t) => t.resume(now, control).await,
        }
    }
}

impl From<LightTimer> for Timer {
    fn from(timer: LightTimer) -> Self {
        Timer::Light(timer)
    }
}

impl From<OutletTimer> for Timer {
    fn from(timer: OutletTimer) -> Self {
        Timer::Outlet(timer)
    }
}

/// Steps timers and events in registration order.
///
/// Driven by an external tick; nothing here sleeps.
#[derive(Debug)]
pub struct Scheduler<C> {
    control: Arc<C>,
    timers: Vec<Timer>,
    events: Vec<GenericEvent>,
}

impl<C: HardwareControl> Scheduler<C> {
    pub fn new(control: Arc<C>) -> Self {
        Self {
            control,
            timers: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn add_timer(&mut self, timer: impl Into<Timer>) {
        let timer = timer.into();
        info!(timer = %timer.name(), "Adding timer");
        self.timers.push(timer);
    }

    pub fn add_event(&mut self, event: GenericEvent) {
        info!(event = %event.name(), trigger = %event.trigger(), "Adding event");
        self.events.push(event);
    }

    pub fn control(&self) -> &Arc<C> {
        &self.control
    }

    pub fn timers(&self) -> &[Timer] {
        &self.timers
    }

    pub fn timer_state(&self, name: &str) -> Option<TimerState> {
        self.timers.iter().find(|t| t.name() == name).map(Timer::state)
    }

    /// Step every timer, then every event, to `now`.
    pub async fn update(&mut self, now: NaiveDateTime) {
        for timer in &mut self.timers {
            timer.update(now, self.control.as_ref()).await;
        }
        for event in &mut self.events {
            event.update(now);
        }
    }

    /// Freeze every timer carrying one of `names`.
    ///
    /// # Errors
    ///
    /// `NotFound` naming every unknown timer; the known ones are still
    /// disabled.
    pub fn disable_timers(&mut self, names: &[&str], now: NaiveDateTime) -> Result<()> {
        let mut missing = Vec::new();
        for name in names {
            let mut found = false;
            for timer in self.timers.iter_mut().filter(|t| t.name() == *name) {
                timer.disable(now);
                found = true;
            }
            if !found {
                error!(timer = %name, "Cannot disable unknown timer");
                missing.push(*name);
            }
        }
        not_found(&missing)
    }

    /// Resume every timer carrying one of `names` at the state for `now`.
    ///
    /// # Errors
    ///
    /// `NotFound` naming every unknown timer; the known ones are still
    /// resumed.
    pub async fn resume_timers(&mut self, names: &[&str], now: NaiveDateTime) -> Result<()> {
        let mut missing = Vec::new();
        for name in names {
            let mut found = false;
            for timer in self.timers.iter_mut().filter(|t| t.name() == *name) {
                timer.resume(now, self.control.as_ref()).await;
                found = true;
            }
            if !found {
                error!(timer = %name, "Cannot resume unknown timer");
                missing.push(*name);
            }
        }
        not_found(&missing)
    }
}

impl<C: HardwareControl + 'static> Scheduler<C> {
    /// Build every timer and dosing event in `config`.
    ///
    /// Cancelling `stop` cuts short any dose in progress.
    pub fn from_config(
        config: &DaemonConfig,
        control: Arc<C>,
        stop: CancellationToken,
    ) -> Result<Self> {
        let hardware = &config.hardware;
        let mut scheduler = Self::new(control);

        for (name, schedule) in &config.schedule.light_schedules {
            scheduler.add_timer(LightTimer::from_config(name, schedule, hardware)?);
        }
        for (name, schedule) in &config.schedule.outlet_schedules {
            scheduler.add_timer(OutletTimer::from_config(name, schedule, hardware)?);
        }

        if !config.schedule.events.is_empty() {
            let dispenser = Dispenser::from_config(&config.dispense, hardware)?;
            for event in &config.schedule.events {
                let volume_ml = event.volume_ml.unwrap_or(config.dispense.default_volume_ml);
                scheduler.add_event(dispenser.event(
                    event.name.as_str(),
                    hhmm_to_time(event.trigger_time_hhmm)?,
                    Arc::clone(&scheduler.control),
                    volume_ml,
                    stop.clone(),
                ));
            }
        }

        Ok(scheduler)
    }
}

fn not_found(missing: &[&str]) -> Result<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::NotFound(format!("Unknown timers: {}", missing.join(", "))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingControl, at};
    use chrono::NaiveTime;
    use tidepool_core::{LightColor, LightId, config::LightMask};

    use crate::timer::ScheduledLight;

    fn light_timer(name: &str, id: u8) -> LightTimer {
        LightTimer::new(
            name,
            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
            vec![ScheduledLight {
                id: LightId::new(id).unwrap(),
                mask: LightMask {
                    white_enabled: true,
                    blue_enabled: true,
                },
            }],
        )
        .unwrap()
    }

    fn scheduler() -> Scheduler<RecordingControl> {
        let mut scheduler = Scheduler::new(Arc::new(RecordingControl::new(2, 0)));
        scheduler.add_timer(light_timer("tank1", 1));
        scheduler.add_timer(light_timer("tank2", 2));
        scheduler
    }

    #[tokio::test]
    async fn test_update_steps_every_timer() {
        let mut scheduler = scheduler();
        scheduler.update(at(9, 0)).await;
        assert_eq!(scheduler.timer_state("tank1"), Some(TimerState::Day));
        assert_eq!(scheduler.timer_state("tank2"), Some(TimerState::Day));
        assert_eq!(scheduler.control().color(2), LightColor::White);
    }

    #[tokio::test]
    async fn test_disable_and_resume_by_name() {
        let mut scheduler = scheduler();
        scheduler.update(at(9, 0)).await;

        scheduler.disable_timers(&["tank1"], at(9, 0)).unwrap();
        scheduler.update(at(18, 0)).await;
        assert_eq!(scheduler.control().color(1), LightColor::White);
        assert_eq!(scheduler.control().color(2), LightColor::Off);

        scheduler.resume_timers(&["tank1"], at(18, 30)).await.unwrap();
        assert_eq!(scheduler.timer_state("tank1"), Some(TimerState::Night));
        assert_eq!(scheduler.control().color(1), LightColor::Off);
    }

    #[tokio::test]
    async fn test_unknown_names_do_not_abort_batch() {
        let mut scheduler = scheduler();
        scheduler.update(at(9, 0)).await;

        let err = scheduler
            .disable_timers(&["ghost", "tank2", "phantom"], at(9, 0))
            .unwrap_err();
        assert!(matches!(&err, Error::NotFound(d) if d.contains("ghost") && d.contains("phantom")));
        assert_eq!(scheduler.timer_state("tank2"), Some(TimerState::Disabled));

        let err = scheduler
            .resume_timers(&["tank2", "ghost"], at(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(scheduler.timer_state("tank2"), Some(TimerState::Day));
    }

    #[tokio::test]
    async fn test_shared_name_reaches_every_timer() {
        let mut scheduler = Scheduler::new(Arc::new(RecordingControl::new(2, 0)));
        scheduler.add_timer(light_timer("tanks", 1));
        scheduler.add_timer(light_timer("tanks", 2));
        scheduler.update(at(9, 0)).await;

        scheduler.disable_timers(&["tanks"], at(9, 0)).unwrap();
        assert!(scheduler.timers().iter().all(|t| t.state() == TimerState::Disabled));

        scheduler.resume_timers(&["tanks"], at(18, 0)).await.unwrap();
        assert!(scheduler.timers().iter().all(|t| t.state() == TimerState::Night));
        assert_eq!(scheduler.control().color(1), LightColor::Off);
        assert_eq!(scheduler.control().color(2), LightColor::Off);
    }

    #[test]
    fn test_timer_state_of_unknown_name() {
        assert_eq!(scheduler().timer_state("ghost"), None);
    }
}
