use crate::{
    Result,
    constants::{MAX_STEPS, MIN_LIGHT_ID, MIN_RELAY_CHANNEL},
    error::Error,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Color of a tri-state aquarium light.
///
/// On the wire the color is its numeric value: `Off=0`, `White=1`, `Blue=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LightColor {
    #[default]
    Off = 0,
    White = 1,
    Blue = 2,
}

impl LightColor {
    /// Lower-case name used in logs and configuration (`off`, `white`, `blue`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            LightColor::Off => "off",
            LightColor::White => "white",
            LightColor::Blue => "blue",
        }
    }
}

impl TryFrom<u8> for LightColor {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LightColor::Off),
            1 => Ok(LightColor::White),
            2 => Ok(LightColor::Blue),
            other => Err(Error::InvalidArgument(format!(
                "Invalid light color ({other})"
            ))),
        }
    }
}

impl From<LightColor> for u8 {
    fn from(color: LightColor) -> Self {
        color as u8
    }
}

impl fmt::Display for LightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for LightColor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LightColor::Off),
            "white" => Ok(LightColor::White),
            "blue" => Ok(LightColor::Blue),
            _ => Err(Error::InvalidArgument(format!("Invalid light color: {s}"))),
        }
    }
}

/// 1-based light identifier as used on the wire.
///
/// Only the lower bound is checked here; the upper bound depends on how
/// many lights are configured and is checked by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct LightId(u8);

impl LightId {
    /// Create a new light id.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` for id 0.
    pub fn new(id: u8) -> Result<Self> {
        if id < MIN_LIGHT_ID {
            return Err(Error::InvalidArgument(format!("Invalid light channel ({id})")));
        }
        Ok(LightId(id))
    }

    /// Build the id of the light stored at `index` in a zero-based list.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        LightId(u8::try_from(index + 1).unwrap_or(u8::MAX))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Zero-based position of this light in the service's light list.
    #[must_use]
    pub fn index(&self) -> usize {
        usize::from(self.0) - 1
    }
}

impl TryFrom<u8> for LightId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        LightId::new(id)
    }
}

impl From<LightId> for u8 {
    fn from(id: LightId) -> u8 {
        id.0
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based relay channel as used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RelayChannel(u8);

impl RelayChannel {
    /// Create a new relay channel.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` for channel 0.
    pub fn new(channel: u8) -> Result<Self> {
        if channel < MIN_RELAY_CHANNEL {
            return Err(Error::InvalidArgument(format!(
                "Invalid relay channel ({channel})"
            )));
        }
        Ok(RelayChannel(channel))
    }

    #[must_use]
    pub fn from_index(index: usize) -> Self {
        RelayChannel(u8::try_from(index + 1).unwrap_or(u8::MAX))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn index(&self) -> usize {
        usize::from(self.0) - 1
    }
}

impl TryFrom<u8> for RelayChannel {
    type Error = Error;

    fn try_from(channel: u8) -> Result<Self> {
        RelayChannel::new(channel)
    }
}

impl From<RelayChannel> for u8 {
    fn from(channel: RelayChannel) -> u8 {
        channel.0
    }
}

impl fmt::Display for RelayChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exclusive-ownership token for light color commands.
///
/// The empty token means nobody owns the lights.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// The "no scope" token.
    pub const NONE: Scope = Scope(String::new());

    pub fn new(name: impl Into<String>) -> Self {
        Scope(name.into())
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        Scope::new(name)
    }
}

impl From<String> for Scope {
    fn from(name: String) -> Self {
        Scope(name)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// A timestamped sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: DateTime<Local>,
    pub value: f64,
}

impl SensorReading {
    pub fn new(timestamp: DateTime<Local>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Reading stamped with the current local time.
    pub fn now(value: f64) -> Self {
        Self::new(Local::now(), value)
    }
}

/// Microstepping resolution of the dosing pump driver.
///
/// Bits 0..2 of the numeric value drive the MS1..MS3 pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    #[default]
    Full = 0,
    Half = 1,
    Quarter = 2,
    Eighth = 3,
    Sixteenth = 4,
}

impl StepMode {
    /// Whether the MSx pin at `bit` (0 = MS1) is driven high for this mode.
    #[must_use]
    pub fn ms_bit(&self, bit: usize) -> bool {
        (*self as u8 >> bit) & 0x1 == 1
    }
}

/// One dosing-pump move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepperCommand {
    pub steps: u32,
    pub reverse: bool,
    #[serde(default)]
    pub mode: StepMode,
}

impl StepperCommand {
    /// Create a full-step command.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if `steps` is negative or above
    /// [`MAX_STEPS`].
    pub fn new(steps: i64, reverse: bool) -> Result<Self> {
        if !(0..=MAX_STEPS).contains(&steps) {
            return Err(Error::InvalidArgument(format!(
                "Step count must be 0-{MAX_STEPS}, got {steps}"
            )));
        }
        Ok(Self {
            steps: steps as u32,
            reverse,
            mode: StepMode::Full,
        })
    }

    #[must_use]
    pub fn with_mode(mut self, mode: StepMode) -> Self {
        self.mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, LightColor::Off)]
    #[case(1, LightColor::White)]
    #[case(2, LightColor::Blue)]
    fn test_light_color_wire_values(#[case] raw: u8, #[case] color: LightColor) {
        assert_eq!(LightColor::try_from(raw).unwrap(), color);
        assert_eq!(u8::from(color), raw);
    }

    #[test]
    fn test_light_color_rejects_unknown_value() {
        let err = LightColor::try_from(3).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_light_color_serializes_as_number() {
        assert_eq!(serde_json::to_string(&LightColor::Blue).unwrap(), "2");
        let color: LightColor = serde_json::from_str("1").unwrap();
        assert_eq!(color, LightColor::White);
        assert!(serde_json::from_str::<LightColor>("7").is_err());
    }

    #[test]
    fn test_light_color_from_str() {
        assert_eq!("White".parse::<LightColor>().unwrap(), LightColor::White);
        assert_eq!(" blue ".parse::<LightColor>().unwrap(), LightColor::Blue);
        assert!("purple".parse::<LightColor>().is_err());
    }

    #[test]
    fn test_light_id_is_one_based() {
        assert!(LightId::new(0).is_err());
        let id = LightId::new(3).unwrap();
        assert_eq!(id.index(), 2);
        assert_eq!(LightId::from_index(2), id);
    }

    #[test]
    fn test_relay_channel_is_one_based() {
        assert!(RelayChannel::new(0).is_err());
        assert_eq!(RelayChannel::new(8).unwrap().index(), 7);
    }

    #[test]
    fn test_deserialized_ids_are_validated() {
        assert!(serde_json::from_str::<LightId>("0").is_err());
        assert!(serde_json::from_str::<RelayChannel>("0").is_err());

        let id: LightId = serde_json::from_str("3").unwrap();
        assert_eq!(id.index(), 2);
        let channel: RelayChannel = serde_json::from_str("1").unwrap();
        assert_eq!(channel.index(), 0);
        assert_eq!(serde_json::to_string(&channel).unwrap(), "1");
    }

    #[test]
    fn test_scope_none() {
        assert!(Scope::NONE.is_none());
        assert!(Scope::default().is_none());
        assert!(!Scope::from("calibration").is_none());
        assert_eq!(Scope::from("a").to_string(), "\"a\"");
    }

    #[rstest]
    #[case(StepMode::Full, [false, false, false])]
    #[case(StepMode::Half, [true, false, false])]
    #[case(StepMode::Quarter, [false, true, false])]
    #[case(StepMode::Eighth, [true, true, false])]
    #[case(StepMode::Sixteenth, [false, false, true])]
    fn test_step_mode_bits(#[case] mode: StepMode, #[case] bits: [bool; 3]) {
        for (bit, expected) in bits.iter().enumerate() {
            assert_eq!(mode.ms_bit(bit), *expected, "{mode:?} bit {bit}");
        }
    }

    #[test]
    fn test_stepper_command_range() {
        assert!(StepperCommand::new(-1, false).is_err());
        assert!(StepperCommand::new(MAX_STEPS + 1, false).is_err());

        let cmd = StepperCommand::new(1000, true).unwrap();
        assert_eq!(cmd.steps, 1000);
        assert!(cmd.reverse);
        assert_eq!(cmd.mode, StepMode::Full);
    }
}
