//! In-memory `HardwareControl` that records every call.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tidepool_core::{
    Error, HardwareControl, LightColor, LightId, RelayChannel, Result, Scope, StepperCommand,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Relay(u8, bool),
    Color(u8, LightColor),
    Move(u32),
    Stop,
}

#[derive(Debug)]
pub struct RecordingControl {
    colors: Mutex<Vec<LightColor>>,
    relays: Mutex<Vec<bool>>,
    calls: Mutex<Vec<Call>>,
    /// `is_stepper_active` answers true this many more times.
    active_polls: AtomicU32,
    stopped: AtomicBool,
}

impl RecordingControl {
    pub fn new(lights: usize, relays: usize) -> Self {
        Self {
            colors: Mutex::new(vec![LightColor::Off; lights]),
            relays: Mutex::new(vec![false; relays]),
            calls: Mutex::new(Vec::new()),
            active_polls: AtomicU32::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn color(&self, id: u8) -> LightColor {
        self.colors.lock().unwrap()[usize::from(id) - 1]
    }

    pub fn relay(&self, channel: u8) -> bool {
        self.relays.lock().unwrap()[usize::from(channel) - 1]
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make the stepper report active for `polls` polls after each move.
    pub fn set_active_polls(&self, polls: u32) {
        self.active_polls.store(polls, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl HardwareControl for RecordingControl {
    async fn set_relay(&self, channel: RelayChannel, engaged: bool) -> Result<()> {
        let mut relays = self.relays.lock().unwrap();
        let slot = relays
            .get_mut(channel.index())
            .ok_or_else(|| Error::InvalidArgument(format!("Invalid relay channel ({channel})")))?;
        *slot = engaged;
        self.record(Call::Relay(channel.as_u8(), engaged));
        Ok(())
    }

    async fn relay_states(&self) -> Result<Vec<(RelayChannel, bool)>> {
        let relays = self.relays.lock().unwrap();
        Ok(relays
            .iter()
            .enumerate()
            .map(|(i, on)| (RelayChannel::from_index(i), *on))
            .collect())
    }

    async fn set_light_color(&self, id: LightId, color: LightColor, _scope: &Scope) -> Result<()> {
        let mut colors = self.colors.lock().unwrap();
        let slot = colors
            .get_mut(id.index())
            .ok_or_else(|| Error::InvalidArgument(format!("Invalid light channel ({id})")))?;
        *slot = color;
        self.record(Call::Color(id.as_u8(), color));
        Ok(())
    }

    async fn light_colors(&self) -> Result<Vec<LightColor>> {
        Ok(self.colors.lock().unwrap().clone())
    }

    async fn move_stepper(&self, command: StepperCommand) -> Result<()> {
        self.stopped.store(false, Ordering::SeqCst);
        self.record(Call::Move(command.steps));
        Ok(())
    }

    async fn stop_stepper(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.record(Call::Stop);
        Ok(())
    }

    async fn is_stepper_active(&self) -> Result<bool> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let remaining = self.active_polls.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(false);
        }
        self.active_polls.store(remaining - 1, Ordering::SeqCst);
        Ok(true)
    }
}

pub fn at(hh: u32, mm: u32) -> NaiveDateTime {
    at_secs(hh, mm, 0)
}

pub fn at_secs(hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(hh, mm, ss).unwrap())
}
