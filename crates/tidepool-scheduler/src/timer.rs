//! Day / night / eclipse timers.
//!
//! A [`LightTimer`] is stepped with [`update`](LightTimer::update). Each step
//! consults a pure transition table ([`LightTimer::next_state`]) and, on a
//! transition, runs the entry action of the new state:
//!
//! | State    | Exit condition                       | Next state         |
//! |----------|--------------------------------------|--------------------|
//! | Init     | always                               | time of day        |
//! | Disabled | explicit resume only                 | time of day        |
//! | Day      | `now >= sunset`                      | Night              |
//! | Day      | eclipse enabled, `now >= start`      | Eclipse            |
//! | Night    | `sunrise <= now < sunset`            | Day                |
//! | Eclipse  | `now >= sunset`                      | Night              |
//! | Eclipse  | `now >= end`                         | time of day        |
//!
//! Entry actions: Day sets white-enabled lights `White` and schedules the
//! next eclipse; Night sets blue-enabled lights `Blue` when blue night
//! lighting is on; Eclipse sets blue-enabled lights `Blue` until the end
//! time. Every other light is set `Off`. Disabled leaves lights untouched.

use std::{collections::VecDeque, fmt};

use chrono::{Duration, NaiveDateTime, NaiveTime};
use tidepool_core::{
    Error, HardwareControl, LightColor, LightId, Result, Scope,
    config::{HardwareConfig, LightMask, LightScheduleConfig, OutletMode, OutletScheduleConfig},
};
use tracing::{error, info};

/// Transitions kept per timer.
pub const HISTORY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerState {
    Init,
    Disabled,
    Day,
    Night,
    Eclipse,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerState::Init => "init",
            TimerState::Disabled => "disabled",
            TimerState::Day => "day",
            TimerState::Night => "night",
            TimerState::Eclipse => "eclipse",
        };
        f.write_str(name)
    }
}

/// One recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TimerState,
    pub to: TimerState,
    pub at: NaiveDateTime,
}

/// State implied by the time of day alone.
pub fn time_of_day_to_state(t: NaiveTime, sunrise: NaiveTime, sunset: NaiveTime) -> TimerState {
    if t < sunrise || t >= sunset {
        TimerState::Night
    } else {
        TimerState::Day
    }
}

/// A light driven by a timer, with the colors it may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledLight {
    pub id: LightId,
    pub mask: LightMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EclipseCycle {
    white: Duration,
    blue: Duration,
}

#[derive(Debug, Clone)]
pub struct LightTimer {
    name: String,
    sunrise: NaiveTime,
    sunset: NaiveTime,
    blue_at_night: bool,
    eclipse: Option<EclipseCycle>,
    lights: Vec<ScheduledLight>,
    state: TimerState,
    eclipse_start: Option<NaiveDateTime>,
    eclipse_end: Option<NaiveDateTime>,
    history: VecDeque<Transition>,
}

impl LightTimer {
    /// Create a timer in `Init`. No eclipses, lights off at night.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `sunrise < sunset`.
    pub fn new(
        name: impl Into<String>,
        sunrise: NaiveTime,
        sunset: NaiveTime,
        lights: Vec<ScheduledLight>,
    ) -> Result<Self> {
        let name = name.into();
        if sunrise >= sunset {
            return Err(Error::InvalidArgument(format!(
                "Timer \"{name}\": sunrise {sunrise} must precede sunset {sunset}"
            )));
        }
        Ok(Self {
            name,
            sunrise,
            sunset,
            blue_at_night: false,
            eclipse: None,
            lights,
            state: TimerState::Init,
            eclipse_start: None,
            eclipse_end: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
        })
    }

    pub fn with_blue_at_night(mut self, enabled: bool) -> Self {
        self.blue_at_night = enabled;
        self
    }

    /// Enable eclipses: `white` of daylight, then `blue` of eclipse, repeating.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if either duration is not positive.
    pub fn with_eclipse(mut self, white: Duration, blue: Duration) -> Result<Self> {
        if white <= Duration::zero() || blue <= Duration::zero() {
            return Err(Error::InvalidArgument(format!(
                "Timer \"{}\": eclipse durations must be positive",
                self.name
            )));
        }
        self.eclipse = Some(EclipseCycle { white, blue });
        Ok(self)
    }

    /// Build a timer from its schedule, resolving light names to ids.
    pub fn from_config(
        name: &str,
        config: &LightScheduleConfig,
        hardware: &HardwareConfig,
    ) -> Result<Self> {
        let lights = config
            .lights
            .iter()
            .map(|(light, mask)| -> Result<ScheduledLight> {
                let id = hardware.light_id(light).ok_or_else(|| {
                    Error::Config(format!("Schedule \"{name}\" refers to undefined light \"{light}\""))
                })?;
                info!(timer = name, light = %light, light_id = %id, "Found light");
                Ok(ScheduledLight { id, mask: *mask })
            })
            .collect::<Result<Vec<_>>>()?;

        let timer = Self::new(name, config.sunrise()?, config.sunset()?, lights)?
            .with_blue_at_night(config.blue_lights_at_night);
        if config.eclipse_enabled {
            timer.with_eclipse(
                Duration::minutes(i64::from(config.eclipse_white_duration_min)),
                Duration::minutes(i64::from(config.eclipse_blue_duration_min)),
            )
        } else {
            Ok(timer)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn lights(&self) -> &[ScheduledLight] {
        &self.lights
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Transition> {
        self.history.iter()
    }

    /// When the next eclipse starts, while in `Day` with eclipses enabled.
    pub fn eclipse_start(&self) -> Option<NaiveDateTime> {
        self.eclipse_start
    }

    /// When the running eclipse ends.
    pub fn eclipse_end(&self) -> Option<NaiveDateTime> {
        self.eclipse_end
    }

    fn time_of_day_state(&self, t: NaiveTime) -> TimerState {
        time_of_day_to_state(t, self.sunrise, self.sunset)
    }

    /// The state `update(now)` would move to, or `None` to stay.
    pub fn next_state(&self, now: NaiveDateTime) -> Option<TimerState> {
        let t = now.time();
        match self.state {
            TimerState::Init => Some(self.time_of_day_state(t)),
            TimerState::Disabled => None,
            TimerState::Day => {
                if t >= self.sunset {
                    Some(TimerState::Night)
                } else if self.eclipse.is_some() && self.eclipse_start.is_some_and(|s| now >= s) {
                    Some(TimerState::Eclipse)
                } else {
                    None
                }
            }
            TimerState::Night => {
                (self.sunrise <= t && t < self.sunset).then_some(TimerState::Day)
            }
            TimerState::Eclipse => {
                if t >= self.sunset {
                    Some(TimerState::Night)
                } else if self.eclipse_end.is_none_or(|end| now >= end) {
                    Some(self.time_of_day_state(t))
                } else {
                    None
                }
            }
        }
    }

    /// Step the state machine to `now`.
    pub async fn update<C: HardwareControl>(&mut self, now: NaiveDateTime, control: &C) {
        if let Some(next) = self.next_state(now) {
            self.enter(next, now, control).await;
        }
    }

    /// Freeze the timer. Lights keep their current color.
    pub fn disable(&mut self, now: NaiveDateTime) {
        if self.state != TimerState::Disabled {
            self.record(TimerState::Disabled, now);
        }
    }

    /// Jump straight to the state for `now`, without replaying missed ones.
    pub async fn resume<C: HardwareControl>(&mut self, now: NaiveDateTime, control: &C) {
        let next = self.time_of_day_state(now.time());
        self.enter(next, now, control).await;
    }

    async fn enter<C: HardwareControl>(&mut self, next: TimerState, now: NaiveDateTime, control: &C) {
        match next {
            TimerState::Day => {
                self.eclipse_start = self.eclipse.map(|cycle| now + cycle.white);
                self.eclipse_end = None;
            }
            TimerState::Eclipse => {
                self.eclipse_start = None;
                self.eclipse_end = self.eclipse.map(|cycle| now + cycle.blue);
                info!(timer = %self.name, ends = ?self.eclipse_end, "Starting eclipse");
            }
            TimerState::Night => {
                self.eclipse_start = None;
                self.eclipse_end = None;
            }
            TimerState::Init | TimerState::Disabled => {}
        }

        for light in &self.lights {
            let Some(color) = self.color_for(next, light.mask) else {
                continue;
            };
            if let Err(e) = control.set_light_color(light.id, color, &Scope::NONE).await {
                error!(timer = %self.name, light_id = %light.id, %color, error = %e, "Failed to set light color");
            }
        }

        self.record(next, now);
    }

    /// Color a light takes on entering `state`, `None` to leave it alone.
    fn color_for(&self, state: TimerState, mask: LightMask) -> Option<LightColor> {
        let on = |enabled: bool, color: LightColor| if enabled { color } else { LightColor::Off };
        match state {
            TimerState::Day => Some(on(mask.white_enabled, LightColor::White)),
            TimerState::Night => Some(on(self.blue_at_night && mask.blue_enabled, LightColor::Blue)),
            TimerState::Eclipse => Some(on(mask.blue_enabled, LightColor::Blue)),
            TimerState::Init | TimerState::Disabled => None,
        }
    }

    fn record(&mut self, to: TimerState, at: NaiveDateTime) {
        info!(timer = %self.name, from = %self.state, %to, "Timer transition");
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(Transition {
            from: self.state,
            to,
            at,
        });
        self.state = to;
    }
}

/// Timer for a single on/off outlet.
///
/// In [`OutletMode::Timer`] the outlet is on from sunrise to sunset. In
/// `On`/`Off` mode the timer starts disabled and pins the outlet on its
/// first update; an explicit resume hands it back to the sunrise/sunset
/// schedule.
#[derive(Debug, Clone)]
pub struct OutletTimer {
    timer: LightTimer,
    mode: OutletMode,
    pinned: Option<LightColor>,
}

impl OutletTimer {
    pub fn new(
        name: impl Into<String>,
        outlet: LightId,
        sunrise: NaiveTime,
        sunset: NaiveTime,
        mode: OutletMode,
    ) -> Result<Self> {
        let mask = LightMask {
            white_enabled: true,
            blue_enabled: false,
        };
        let mut timer = LightTimer::new(name, sunrise, sunset, vec![ScheduledLight { id: outlet, mask }])?;
        let pinned = match mode {
            OutletMode::Timer => None,
            OutletMode::On => Some(LightColor::White),
            OutletMode::Off => Some(LightColor::Off),
        };
        if pinned.is_some() {
            timer.state = TimerState::Disabled;
        }
        Ok(Self { timer, mode, pinned })
    }

    /// The schedule name is the outlet's light name.
    pub fn from_config(
        name: &str,
        config: &OutletScheduleConfig,
        hardware: &HardwareConfig,
    ) -> Result<Self> {
        let outlet = hardware
            .light_id(name)
            .ok_or_else(|| Error::Config(format!("Outlet schedule \"{name}\" does not match any light")))?;
        let sunrise = tidepool_core::hhmm_to_time(config.sunrise_hhmm)?;
        let sunset = tidepool_core::hhmm_to_time(config.sunset_hhmm)?;
        Self::new(name, outlet, sunrise, sunset, config.mode)
    }

    pub fn name(&self) -> &str {
        self.timer.name()
    }

    pub fn state(&self) -> TimerState {
        self.timer.state()
    }

    pub fn mode(&self) -> OutletMode {
        self.mode
    }

    pub fn history(&self) -> impl Iterator<Item = &Transition> {
        self.timer.history()
    }

    pub async fn update<C: HardwareControl>(&mut self, now: NaiveDateTime, control: &C) {
        if let Some(color) = self.pinned.take() {
            info!(outlet = %self.name(), mode = ?self.mode, %color, "Pinning outlet");
            for light in self.timer.lights() {
                if let Err(e) = control.set_light_color(light.id, color, &Scope::NONE).await {
                    error!(outlet = %self.timer.name(), error = %e, "Failed to pin outlet");
                }
            }
        }
        self.timer.update(now, control).await;
    }

    pub fn disable(&mut self, now: NaiveDateTime) {
        self.timer.disable(now);
    }

    pub async fn resume<C: HardwareControl>(&mut self, now: NaiveDateTime, control: &C) {
        self.pinned = None;
        self.timer.resume(now, control).await;
    }
}
