//! Constants shared across the controller.

use std::time::Duration;

// RPC
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:50051";
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(3000);
/// Largest accepted RPC frame. Requests are tiny; this only guards the decoder.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

// Sensors
/// Published once when the thermometer is absent at start-up.
pub const TEMPERATURE_SENTINEL: f64 = -273.0;
/// Published once when the pH probe is absent at start-up.
pub const PH_SENTINEL: f64 = 0.0;
/// Value used for a single cycle when the pH probe answers with garbage.
pub const PH_MALFORMED_FALLBACK: f64 = 0.0;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Floor for the sleep between two poll cycles.
pub const MIN_POLL_SLEEP: Duration = Duration::from_millis(100);
pub const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";
pub const DEFAULT_I2C_BUS: u8 = 1;
/// Factory I2C address of the EZO pH circuit.
pub const PH_I2C_ADDRESS: u16 = 99;

// Stepper
pub const MAX_STEPS: i64 = 1_000_000;
pub const DEFAULT_PULSE_HALF_PERIOD: Duration = Duration::from_millis(5);
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(100);

// Scheduler
pub const SCHEDULER_TICK: Duration = Duration::from_secs(30);
pub const DISPENSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

// Lights and relays are numbered from 1 on the wire.
pub const MIN_LIGHT_ID: u8 = 1;
pub const MIN_RELAY_CHANNEL: u8 = 1;
