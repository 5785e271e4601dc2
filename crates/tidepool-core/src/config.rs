//! Startup configuration.
//!
//! One JSON document describes the hardware map, the RPC endpoint, the
//! light/outlet schedules and the dosing pump. Everything is read once at
//! start-up and validated before any device is touched.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::{
    LightId, RelayChannel, Result,
    clock::hhmm_to_time,
    constants::{
        DEFAULT_BIND_ADDR, DEFAULT_MAX_CONNECTIONS, DEFAULT_POLL_INTERVAL,
        DEFAULT_PULSE_HALF_PERIOD, DEFAULT_SETTLE_TIME,
    },
    error::Error,
};

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_pulse_half_period_ms() -> u64 {
    DEFAULT_PULSE_HALF_PERIOD.as_millis() as u64
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_TIME.as_millis() as u64
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

/// A single relay output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub name: String,
    pub pin: u8,
    /// Whether "engaged" drives the pin high.
    #[serde(default = "default_true")]
    pub active_high: bool,
}

/// A light fixture built from one or two relays.
///
/// Outlets are lights without a mode relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightConfig {
    pub name: String,
    pub enable_relay: String,
    #[serde(default)]
    pub mode_relay: Option<String>,
}

/// Pin assignment and timing of the dosing pump driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepperConfig {
    pub step_pin: u8,
    pub dir_pin: u8,
    /// Active-low driver enable.
    pub nen_pin: u8,
    #[serde(default)]
    pub ms1_pin: Option<u8>,
    #[serde(default)]
    pub ms2_pin: Option<u8>,
    #[serde(default)]
    pub ms3_pin: Option<u8>,
    #[serde(default = "default_pulse_half_period_ms")]
    pub pulse_half_period_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl StepperConfig {
    pub fn pulse_half_period(&self) -> Duration {
        Duration::from_millis(self.pulse_half_period_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            step_pin: 20,
            dir_pin: 21,
            nen_pin: 16,
            ms1_pin: None,
            ms2_pin: None,
            ms3_pin: None,
            pulse_half_period_ms: default_pulse_half_period_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

/// Polling parameters of one sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Override for the 1-Wire device directory (thermometer only).
    #[serde(default)]
    pub device_dir: Option<PathBuf>,
    /// I2C bus of the pH circuit.
    #[serde(default)]
    pub i2c_bus: Option<u8>,
    /// I2C address of the pH circuit.
    #[serde(default)]
    pub i2c_address: Option<u16>,
}

impl SensorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            device_dir: None,
            i2c_bus: None,
            i2c_address: None,
        }
    }
}

/// The hardware map: every actuator and sensor the service owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareConfig {
    #[serde(default)]
    pub relays: Vec<RelayConfig>,
    #[serde(default)]
    pub lights: Vec<LightConfig>,
    #[serde(default)]
    pub stepper: StepperConfig,
    #[serde(default)]
    pub thermometer: SensorConfig,
    #[serde(default)]
    pub ph_sensor: SensorConfig,
    /// Use in-memory pins and simulated sensors instead of real devices.
    #[serde(default)]
    pub use_mock_hw: bool,
}

impl HardwareConfig {
    /// 1-based channel of the relay named `name`.
    pub fn relay_channel(&self, name: &str) -> Option<RelayChannel> {
        self.relays
            .iter()
            .position(|r| r.name == name)
            .map(RelayChannel::from_index)
    }

    /// 1-based id of the light named `name`.
    pub fn light_id(&self, name: &str) -> Option<LightId> {
        self.lights
            .iter()
            .position(|l| l.name == name)
            .map(LightId::from_index)
    }

    /// Check relay references and name uniqueness.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.relays.len() > usize::from(u8::MAX) || self.lights.len() > usize::from(u8::MAX) {
            return Err(Error::Config("At most 255 relays and 255 lights are supported".into()));
        }
        check_unique("relay", self.relays.iter().map(|r| r.name.as_str()))?;
        check_unique("light", self.lights.iter().map(|l| l.name.as_str()))?;

        for light in &self.lights {
            let relays = std::iter::once(&light.enable_relay).chain(light.mode_relay.as_ref());
            for relay in relays {
                if self.relay_channel(relay).is_none() {
                    return Err(Error::Config(format!(
                        "Light \"{}\" refers to undefined relay \"{relay}\"",
                        light.name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::Config(format!("Duplicate {kind} name \"{name}\"")));
        }
    }
    Ok(())
}

/// Which colors a light may take in a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightMask {
    #[serde(default)]
    pub white_enabled: bool,
    #[serde(default)]
    pub blue_enabled: bool,
}

/// Day/night/eclipse schedule for a group of lights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightScheduleConfig {
    pub sunrise_hhmm: u32,
    pub sunset_hhmm: u32,
    #[serde(default)]
    pub blue_lights_at_night: bool,
    #[serde(default)]
    pub eclipse_enabled: bool,
    #[serde(default)]
    pub eclipse_white_duration_min: u32,
    #[serde(default)]
    pub eclipse_blue_duration_min: u32,
    /// Light name to allowed colors.
    #[serde(default)]
    pub lights: BTreeMap<String, LightMask>,
}

impl LightScheduleConfig {
    pub fn sunrise(&self) -> Result<NaiveTime> {
        hhmm_to_time(self.sunrise_hhmm)
    }

    pub fn sunset(&self) -> Result<NaiveTime> {
        hhmm_to_time(self.sunset_hhmm)
    }

    fn validate(&self, name: &str, hardware: &HardwareConfig) -> Result<()> {
        check_day(name, self.sunrise_hhmm, self.sunset_hhmm)?;
        if self.eclipse_enabled
            && (self.eclipse_white_duration_min == 0 || self.eclipse_blue_duration_min == 0)
        {
            return Err(Error::Config(format!(
                "Schedule \"{name}\" enables eclipse with a zero duration"
            )));
        }
        for light in self.lights.keys() {
            if hardware.light_id(light).is_none() {
                return Err(Error::Config(format!(
                    "Schedule \"{name}\" refers to undefined light \"{light}\""
                )));
            }
        }
        Ok(())
    }
}

/// How an outlet timer drives its outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutletMode {
    /// Follow sunrise/sunset.
    #[default]
    Timer,
    /// Always on.
    On,
    /// Always off.
    Off,
}

/// Schedule for one outlet. The schedule name is the outlet's light name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutletScheduleConfig {
    pub sunrise_hhmm: u32,
    pub sunset_hhmm: u32,
    #[serde(default)]
    pub mode: OutletMode,
}

impl OutletScheduleConfig {
    fn validate(&self, name: &str, hardware: &HardwareConfig) -> Result<()> {
        check_day(name, self.sunrise_hhmm, self.sunset_hhmm)?;
        if hardware.light_id(name).is_none() {
            return Err(Error::Config(format!(
                "Outlet schedule \"{name}\" does not match any light"
            )));
        }
        Ok(())
    }
}

fn check_day(name: &str, sunrise_hhmm: u32, sunset_hhmm: u32) -> Result<()> {
    let sunrise = hhmm_to_time(sunrise_hhmm)
        .map_err(|e| Error::Config(format!("Schedule \"{name}\": {}", e.detail())))?;
    let sunset = hhmm_to_time(sunset_hhmm)
        .map_err(|e| Error::Config(format!("Schedule \"{name}\": {}", e.detail())))?;
    if sunrise >= sunset {
        return Err(Error::Config(format!(
            "Schedule \"{name}\": sunrise ({sunrise_hhmm}) must precede sunset ({sunset_hhmm})"
        )));
    }
    Ok(())
}

/// A once-a-day dosing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    pub name: String,
    pub trigger_time_hhmm: u32,
    /// Falls back to `DispenseConfig::default_volume_ml`.
    #[serde(default)]
    pub volume_ml: Option<u32>,
}

/// All timers and events run by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub light_schedules: BTreeMap<String, LightScheduleConfig>,
    #[serde(default)]
    pub outlet_schedules: BTreeMap<String, OutletScheduleConfig>,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

impl ScheduleConfig {
    /// Check times and light references against `hardware`.
    ///
    /// Light and outlet timers share one namespace.
    pub fn validate(&self, hardware: &HardwareConfig) -> Result<()> {
        check_unique(
            "timer",
            self.light_schedules
                .keys()
                .chain(self.outlet_schedules.keys())
                .map(String::as_str),
        )?;
        for (name, schedule) in &self.light_schedules {
            schedule.validate(name, hardware)?;
        }
        for (name, schedule) in &self.outlet_schedules {
            schedule.validate(name, hardware)?;
        }
        for event in &self.events {
            hhmm_to_time(event.trigger_time_hhmm).map_err(|e| {
                Error::Config(format!("Event \"{}\": {}", event.name, e.detail()))
            })?;
        }
        Ok(())
    }
}

/// Dosing pump calibration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenseConfig {
    pub steps_per_ml: u32,
    pub default_volume_ml: u32,
    /// Relays switched off while the pump runs.
    #[serde(default)]
    pub light_relays: Vec<String>,
}

impl Default for DispenseConfig {
    fn default() -> Self {
        Self {
            steps_per_ml: 1000,
            default_volume_ml: 5,
            light_relays: Vec::new(),
        }
    }
}

/// RPC endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_connections: default_max_connections(),
        }
    }
}

/// Complete configuration of the controller daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub dispense: DispenseConfig,
}

impl DaemonConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DaemonConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Malformed configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.hardware.validate()?;
        self.schedule.validate(&self.hardware)?;
        for relay in &self.dispense.light_relays {
            if self.hardware.relay_channel(relay).is_none() {
                return Err(Error::Config(format!(
                    "Dispense refers to undefined relay \"{relay}\""
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "server": { "bind_addr": "0.0.0.0:50051" },
        "hardware": {
            "relays": [
                { "name": "tank1_enable", "pin": 5 },
                { "name": "tank1_mode", "pin": 6 },
                { "name": "heater", "pin": 13, "active_high": false }
            ],
            "lights": [
                { "name": "TankLight1", "enable_relay": "tank1_enable", "mode_relay": "tank1_mode" },
                { "name": "outlet1", "enable_relay": "heater" }
            ],
            "stepper": { "step_pin": 20, "dir_pin": 21, "nen_pin": 16, "ms1_pin": 26 },
            "thermometer": { "poll_interval_ms": 10000 },
            "use_mock_hw": true
        },
        "schedule": {
            "light_schedules": {
                "main": {
                    "sunrise_hhmm": 830,
                    "sunset_hhmm": 1730,
                    "blue_lights_at_night": true,
                    "eclipse_enabled": true,
                    "eclipse_white_duration_min": 6,
                    "eclipse_blue_duration_min": 4,
                    "lights": { "TankLight1": { "white_enabled": true, "blue_enabled": true } }
                }
            },
            "outlet_schedules": {
                "outlet1": { "sunrise_hhmm": 700, "sunset_hhmm": 2100, "mode": "on" }
            },
            "events": [ { "name": "fertilizer", "trigger_time_hhmm": 900 } ]
        },
        "dispense": { "steps_per_ml": 2000, "default_volume_ml": 3, "light_relays": ["tank1_enable"] }
    }"#;

    #[test]
    fn test_parse_sample_config() {
        let config = DaemonConfig::from_json(SAMPLE).unwrap();

        assert_eq!(config.server.bind_addr, "0.0.0.0:50051");
        assert_eq!(config.server.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(config.hardware.relays[0].active_high);
        assert!(!config.hardware.relays[2].active_high);
        assert_eq!(config.hardware.stepper.ms1_pin, Some(26));
        assert_eq!(config.hardware.stepper.pulse_half_period(), DEFAULT_PULSE_HALF_PERIOD);
        assert_eq!(config.hardware.thermometer.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.hardware.ph_sensor.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(config.schedule.outlet_schedules["outlet1"].mode, OutletMode::On);
        assert_eq!(config.schedule.events[0].volume_ml, None);
    }

    #[test]
    fn test_name_lookups_are_one_based() {
        let config = DaemonConfig::from_json(SAMPLE).unwrap();

        assert_eq!(config.hardware.light_id("outlet1").unwrap().as_u8(), 2);
        assert_eq!(config.hardware.relay_channel("heater").unwrap().as_u8(), 3);
        assert!(config.hardware.light_id("nope").is_none());
    }

    #[test]
    fn test_undefined_relay_is_rejected() {
        let json = SAMPLE.replace(r#""mode_relay": "tank1_mode""#, r#""mode_relay": "missing""#);
        let err = DaemonConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, Error::Config(ref d) if d.contains("missing")));
    }

    #[test]
    fn test_sunrise_after_sunset_is_rejected() {
        let json = SAMPLE.replace(r#""sunrise_hhmm": 830"#, r#""sunrise_hhmm": 1800"#);
        assert!(matches!(DaemonConfig::from_json(&json), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_hhmm_is_rejected() {
        let json = SAMPLE.replace(r#""trigger_time_hhmm": 900"#, r#""trigger_time_hhmm": 1267"#);
        assert!(matches!(DaemonConfig::from_json(&json), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_schedule_light_is_rejected() {
        let json = SAMPLE.replace(r#""lights": { "TankLight1""#, r#""lights": { "TankLight9""#);
        assert!(matches!(DaemonConfig::from_json(&json), Err(Error::Config(_))));
    }

    #[test]
    fn test_light_and_outlet_timers_share_names() {
        let json = SAMPLE.replace(r#""main": {"#, r#""outlet1": {"#);
        let err = DaemonConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, Error::Config(ref d) if d.contains("Duplicate timer name")));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(DaemonConfig::from_json("{ not json"), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = DaemonConfig::from_file(file.path()).unwrap();
        assert_eq!(config.dispense.steps_per_ml, 2000);

        assert!(DaemonConfig::from_file("/nonexistent/tidepool.json").is_err());
    }
}
