//! The hardware control service.
//!
//! [`HardwareControlService`] is the only thing in the process that mutates
//! actuators. It owns the relays, the light bank with its scope token, the
//! stepper executor handle and both sensor pollers. One instance is built
//! at start-up and shared by reference with every RPC connection.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tidepool_core::{LightColor, LightId, Scope};
//! use tidepool_hardware::mock::{MockPin, SimulatedSensor};
//! use tidepool_hardware::relay::Relay;
//! use tidepool_hardware::service::ServiceBuilder;
//!
//! #[tokio::main]
//! async fn main() -> tidepool_core::Result<()> {
//!     let enable = Relay::new("tank_enable", Arc::new(MockPin::detached("gpio5")), true)?;
//!     let service = ServiceBuilder::new()
//!         .relay(enable)
//!         .light("tank", "tank_enable", None)
//!         .mock_stepper()
//!         .thermometer(Some(SimulatedSensor::thermometer().into()), Duration::from_secs(5))
//!         .build()
//!         .await?;
//!
//!     let tank = LightId::new(1)?;
//!     service.set_light_color(tank, LightColor::White, &Scope::NONE)?;
//!     assert_eq!(service.light_colors(), vec![LightColor::White]);
//!     Ok(())
//! }
//! ```

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tidepool_core::{
    Error, HardwareControl, LightColor, LightId, RelayChannel, Result, Scope, SensorReading,
    StepperCommand,
    config::HardwareConfig,
    constants::{DEFAULT_I2C_BUS, DEFAULT_POLL_INTERVAL, PH_I2C_ADDRESS, W1_DEVICES_DIR},
};
use rppal::gpio::Gpio;
use tracing::{debug, info, warn};

use crate::{
    atlas::AtlasPhProbe,
    devices::AnySensor,
    gpio::RpiPin,
    light::{Light, LightBank},
    mock::{MockPin, SimulatedSensor},
    poller::{SensorKind, SensorPoller},
    relay::Relay,
    stepper::{StepperExecutor, StepperHandle, StepperPins, StepperTiming},
    traits::DigitalOutput,
    w1::W1Thermometer,
};

struct LightSpec {
    name: String,
    enable: String,
    mode: Option<String>,
}

/// Assembles a [`HardwareControlService`] from individual devices.
///
/// Lights refer to relays by name; names are resolved in
/// [`build`](Self::build).
#[derive(Default)]
pub struct ServiceBuilder {
    relays: Vec<Relay>,
    lights: Vec<LightSpec>,
    stepper: Option<(StepperPins, StepperTiming)>,
    thermometer: Option<(Option<AnySensor>, Duration)>,
    ph_sensor: Option<(Option<AnySensor>, Duration)>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relay. Channels are assigned in insertion order from 1.
    pub fn relay(mut self, relay: Relay) -> Self {
        self.relays.push(relay);
        self
    }

    /// Add a light built from the named relays. Ids are assigned in
    /// insertion order from 1.
    pub fn light(mut self, name: impl Into<String>, enable: &str, mode: Option<&str>) -> Self {
        self.lights.push(LightSpec {
            name: name.into(),
            enable: enable.to_string(),
            mode: mode.map(str::to_string),
        });
        self
    }

    pub fn stepper(mut self, pins: StepperPins, timing: StepperTiming) -> Self {
        self.stepper = Some((pins, timing));
        self
    }

    /// Stepper on detached in-memory pins.
    pub fn mock_stepper(self) -> Self {
        let pin = |label: &str| -> Arc<dyn DigitalOutput> { Arc::new(MockPin::detached(label)) };
        let pins = StepperPins {
            step: pin("step"),
            dir: pin("dir"),
            nen: pin("nen"),
            ms: [None, None, None],
        };
        self.stepper(pins, StepperTiming::default())
    }

    /// `None` means the thermometer is absent and the sentinel is served.
    pub fn thermometer(mut self, device: Option<AnySensor>, interval: Duration) -> Self {
        self.thermometer = Some((device, interval));
        self
    }

    /// `None` means the probe is absent and the sentinel is served.
    pub fn ph_sensor(mut self, device: Option<AnySensor>, interval: Duration) -> Self {
        self.ph_sensor = Some((device, interval));
        self
    }

    /// Resolve light relays, start the stepper executor and both pollers.
    ///
    /// # Errors
    ///
    /// - `Config` if a light names an unknown relay or no stepper was given.
    /// - `Hardware` if the stepper enable line cannot be driven.
    pub async fn build(self) -> Result<HardwareControlService> {
        let relays: Vec<Arc<Relay>> = self.relays.into_iter().map(Arc::new).collect();
        let find = |light: &str, relay: &str| {
            relays
                .iter()
                .find(|r| r.name() == relay)
                .cloned()
                .ok_or_else(|| {
                    Error::Config(format!("Light \"{light}\" refers to undefined relay \"{relay}\""))
                })
        };

        let mut lights = Vec::with_capacity(self.lights.len());
        for spec in self.lights {
            let enable = find(&spec.name, &spec.enable)?;
            let mode = match &spec.mode {
                Some(mode) => Some(find(&spec.name, mode)?),
                None => None,
            };
            lights.push(Light::new(spec.name, enable, mode));
        }

        let (pins, timing) = self
            .stepper
            .ok_or_else(|| Error::Config("No stepper configured".into()))?;
        let stepper = StepperExecutor::new(pins, timing).start()?;

        let (device, interval) = self.thermometer.unwrap_or((None, DEFAULT_POLL_INTERVAL));
        let thermometer = SensorPoller::start(SensorKind::Thermometer, device, interval).await;
        let (device, interval) = self.ph_sensor.unwrap_or((None, DEFAULT_POLL_INTERVAL));
        let ph = SensorPoller::start(SensorKind::Ph, device, interval).await;

        info!(
            relays = relays.len(),
            lights = lights.len(),
            thermometer = thermometer.is_present(),
            ph = ph.is_present(),
            "Hardware control service ready"
        );

        Ok(HardwareControlService {
            relays,
            lights: Mutex::new(LightBank::new(lights)),
            stepper,
            thermometer,
            ph,
        })
    }
}

/// Claim `pin` on `gpio`, or a detached [`MockPin`] without a controller.
fn open_pin(pin: u8, label: &str, gpio: Option<&Gpio>) -> Result<Arc<dyn DigitalOutput>> {
    let Some(gpio) = gpio else {
        return Ok(Arc::new(MockPin::detached(format!("{label}@gpio{pin}"))));
    };
    let output = RpiPin::claim(gpio, pin)?;
    debug!(pin, label, "Opened GPIO output");
    Ok(Arc::new(output))
}

fn stepper_pins(config: &HardwareConfig, gpio: Option<&Gpio>) -> Result<StepperPins> {
    let stepper = &config.stepper;
    let optional = |pin: Option<u8>, label: &str| pin.map(|p| open_pin(p, label, gpio)).transpose();

    Ok(StepperPins {
        step: open_pin(stepper.step_pin, "step", gpio)?,
        dir: open_pin(stepper.dir_pin, "dir", gpio)?,
        nen: open_pin(stepper.nen_pin, "nen", gpio)?,
        ms: [
            optional(stepper.ms1_pin, "ms1")?,
            optional(stepper.ms2_pin, "ms2")?,
            optional(stepper.ms3_pin, "ms3")?,
        ],
    })
}

fn open_ph_probe(config: &HardwareConfig) -> Option<AnySensor> {
    let bus = config.ph_sensor.i2c_bus.unwrap_or(DEFAULT_I2C_BUS);
    let address = config.ph_sensor.i2c_address.unwrap_or(PH_I2C_ADDRESS);
    match AtlasPhProbe::open(bus, address) {
        Ok(probe) => Some(probe.into()),
        Err(error) => {
            warn!(bus, address, %error, "pH circuit not available");
            None
        }
    }
}

/// Single authority over relays, lights, the dosing pump and sensors.
#[derive(Debug)]
pub struct HardwareControlService {
    relays: Vec<Arc<Relay>>,
    lights: Mutex<LightBank>,
    stepper: StepperHandle,
    thermometer: SensorPoller,
    ph: SensorPoller,
}

impl HardwareControlService {
    /// Build the service from the hardware map.
    ///
    /// With `use_mock_hw` every pin is an in-memory [`MockPin`] and both
    /// sensors are [`SimulatedSensor`]s. Otherwise pins are claimed on the
    /// Raspberry Pi GPIO header, the thermometer is discovered on the 1-Wire
    /// bus and the pH circuit is addressed on I2C. A sensor that cannot be
    /// found leaves its poller serving the sentinel.
    ///
    /// # Errors
    ///
    /// `Config` for an inconsistent hardware map, `Hardware` when the GPIO
    /// controller or a pin cannot be opened.
    pub async fn from_config(config: &HardwareConfig) -> Result<Self> {
        config.validate()?;
        let mock = config.use_mock_hw;
        info!(mock, "Initializing hardware");
        let controller = if mock { None } else { Some(crate::gpio::controller()?) };
        let gpio = controller.as_ref();

        let mut builder = ServiceBuilder::new();
        for relay in &config.relays {
            let output = open_pin(relay.pin, &relay.name, gpio)?;
            builder = builder.relay(Relay::new(&relay.name, output, relay.active_high)?);
        }
        for light in &config.lights {
            builder = builder.light(&light.name, &light.enable_relay, light.mode_relay.as_deref());
        }

        let timing = StepperTiming {
            pulse_half_period: config.stepper.pulse_half_period(),
            settle: config.stepper.settle(),
        };
        builder = builder.stepper(stepper_pins(config, gpio)?, timing);

        let (thermometer, ph): (Option<AnySensor>, Option<AnySensor>) = if mock {
            (
                Some(SimulatedSensor::thermometer().into()),
                Some(SimulatedSensor::ph_probe().into()),
            )
        } else {
            let dir = config
                .thermometer
                .device_dir
                .as_deref()
                .unwrap_or(Path::new(W1_DEVICES_DIR));
            (W1Thermometer::discover(dir).map(Into::into), open_ph_probe(config))
        };

        builder
            .thermometer(thermometer, config.thermometer.poll_interval())
            .ph_sensor(ph, config.ph_sensor.poll_interval())
            .build()
            .await
    }

    fn bank(&self) -> MutexGuard<'_, LightBank> {
        self.lights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn relay(&self, channel: RelayChannel) -> Result<&Arc<Relay>> {
        self.relays
            .get(channel.index())
            .ok_or_else(|| Error::InvalidArgument(format!("Invalid relay channel ({channel})")))
    }

    pub fn set_relay(&self, channel: RelayChannel, engaged: bool) -> Result<()> {
        let relay = self.relay(channel)?;
        info!(%channel, relay = relay.name(), engaged, "Setting relay state");
        relay.set(engaged)?;
        Ok(())
    }

    pub fn relay_states(&self) -> Vec<(RelayChannel, bool)> {
        self.relays
            .iter()
            .enumerate()
            .map(|(i, relay)| (RelayChannel::from_index(i), relay.is_active()))
            .collect()
    }

    /// Apply, buffer or reject a color request according to the scope rules.
    pub fn set_light_color(&self, id: LightId, color: LightColor, scope: &Scope) -> Result<()> {
        self.bank().set_color(id, color, scope)
    }

    pub fn light_colors(&self) -> Vec<LightColor> {
        self.bank().colors()
    }

    pub fn set_scope(&self, scope: Scope) -> Result<()> {
        self.bank().set_scope(scope)
    }

    pub fn scope(&self) -> Scope {
        self.bank().scope().clone()
    }

    /// 1-based id of the light called `name`.
    pub fn light_id(&self, name: &str) -> Option<LightId> {
        self.bank().light_id(name)
    }

    pub fn move_stepper(&self, command: StepperCommand) -> Result<()> {
        info!(steps = command.steps, reverse = command.reverse, mode = ?command.mode, "Queueing stepper command");
        self.stepper.send(command)
    }

    pub fn stop_stepper(&self) {
        self.stepper.stop();
    }

    pub fn is_stepper_active(&self) -> bool {
        self.stepper.is_active()
    }

    pub fn temperature(&self) -> SensorReading {
        self.thermometer.latest()
    }

    pub fn ph(&self) -> SensorReading {
        self.ph.latest()
    }

    pub fn set_ph_sample_time(&self, ms: u64) {
        self.ph.set_sample_time(ms);
    }

    pub fn ph_sample_time(&self) -> Duration {
        self.ph.sample_time()
    }

    /// Forward `command` to the pH probe, serialized with the poll loop.
    pub async fn send_ph_command(&self, command: &str) -> Result<String> {
        info!(command, "Sending pH command");
        let answer = self.ph.send_command(command).await;
        if let Err(e) = &answer {
            warn!(command, error = %e, "pH command failed");
        }
        answer
    }
}

impl HardwareControl for HardwareControlService {
    async fn set_relay(&self, channel: RelayChannel, engaged: bool) -> Result<()> {
        HardwareControlService::set_relay(self, channel, engaged)
    }

    async fn relay_states(&self) -> Result<Vec<(RelayChannel, bool)>> {
        Ok(HardwareControlService::relay_states(self))
    }

    async fn set_light_color(&self, id: LightId, color: LightColor, scope: &Scope) -> Result<()> {
        HardwareControlService::set_light_color(self, id, color, scope)
    }

    async fn light_colors(&self) -> Result<Vec<LightColor>> {
        Ok(HardwareControlService::light_colors(self))
    }

    async fn move_stepper(&self, command: StepperCommand) -> Result<()> {
        HardwareControlService::move_stepper(self, command)
    }

    async fn stop_stepper(&self) -> Result<()> {
        HardwareControlService::stop_stepper(self);
        Ok(())
    }

    async fn is_stepper_active(&self) -> Result<bool> {
        Ok(HardwareControlService::is_stepper_active(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPinHandle, MockProbe};
    use tidepool_core::{
        StatusCode,
        config::{LightConfig, RelayConfig},
        constants::TEMPERATURE_SENTINEL,
    };

    fn mock_relay(name: &str, active_high: bool) -> (Relay, MockPinHandle) {
        let (pin, handle) = MockPin::new(name);
        (Relay::new(name, Arc::new(pin), active_high).unwrap(), handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_rejects_unknown_light_relay() {
        let err = ServiceBuilder::new()
            .light("tank", "missing", None)
            .mock_stepper()
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_relay_and_states() {
        let (heater, heater_pin) = mock_relay("heater", false);
        let (pump, _) = mock_relay("pump", true);
        let service = ServiceBuilder::new()
            .relay(heater)
            .relay(pump)
            .mock_stepper()
            .build()
            .await
            .unwrap();

        let channel = RelayChannel::new(1).unwrap();
        service.set_relay(channel, true).unwrap();
        assert!(!heater_pin.is_high());

        let states = service.relay_states();
        assert_eq!(states[0], (channel, true));
        assert_eq!(states[1], (RelayChannel::new(2).unwrap(), false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_relay_out_of_range() {
        let service = ServiceBuilder::new().mock_stepper().build().await.unwrap();

        let err = service
            .set_relay(RelayChannel::new(3).unwrap(), true)
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
        assert_eq!(err.detail(), "Invalid relay channel (3)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_sensors_serve_sentinels() {
        let service = ServiceBuilder::new().mock_stepper().build().await.unwrap();

        assert_eq!(service.temperature().value, TEMPERATURE_SENTINEL);
        assert_eq!(service.ph().value, 0.0);
        let err = service.send_ph_command("R").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ph_command_and_sample_time() {
        let (probe, handle) = MockProbe::new("pH", 7.1);
        handle.set_query_answer("?Cal,2");
        let service = ServiceBuilder::new()
            .mock_stepper()
            .ph_sensor(Some(probe.into()), Duration::from_secs(5))
            .build()
            .await
            .unwrap();

        assert_eq!(service.ph().value, 7.1);
        assert_eq!(service.send_ph_command("Cal,?").await.unwrap(), "?Cal,2");
        assert_eq!(handle.commands(), vec!["Cal,?".to_string()]);

        service.set_ph_sample_time(500);
        assert_eq!(service.ph_sample_time(), Duration::from_millis(500));
        service.set_ph_sample_time(0);
        assert_eq!(service.ph_sample_time(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config_with_mock_hardware() {
        let config = HardwareConfig {
            relays: vec![
                RelayConfig { name: "enable".into(), pin: 5, active_high: true },
                RelayConfig { name: "mode".into(), pin: 6, active_high: true },
            ],
            lights: vec![LightConfig {
                name: "tank".into(),
                enable_relay: "enable".into(),
                mode_relay: Some("mode".into()),
            }],
            use_mock_hw: true,
            ..Default::default()
        };
        let service = HardwareControlService::from_config(&config).await.unwrap();

        let tank = service.light_id("tank").unwrap();
        service.set_light_color(tank, LightColor::Blue, &Scope::NONE).unwrap();
        assert_eq!(service.light_colors(), vec![LightColor::Blue]);
        assert_eq!(
            service.relay_states().iter().map(|(_, on)| *on).collect::<Vec<_>>(),
            vec![true, false]
        );

        let temperature = service.temperature().value;
        assert!((-10.0..=100.0).contains(&temperature));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stepper_through_trait() {
        let service = ServiceBuilder::new().mock_stepper().build().await.unwrap();
        assert!(!service.is_stepper_active());

        HardwareControl::move_stepper(&service, StepperCommand::new(10, false).unwrap())
            .await
            .unwrap();
        assert!(HardwareControl::is_stepper_active(&service).await.unwrap());

        HardwareControl::stop_stepper(&service).await.unwrap();
        while service.is_stepper_active() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
