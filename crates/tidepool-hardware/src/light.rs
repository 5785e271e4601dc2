//! Tri-state lights and scope arbitration.
//!
//! A [`Light`] drives an enable relay and an optional mode relay:
//!
//! | Color | enable | mode |
//! |-------|--------|------|
//! | Off   | off    | off  |
//! | White | on     | on   |
//! | Blue  | on     | off  |
//!
//! A [`LightBank`] owns every light plus the scope token. While a scope is
//! held, unscoped color requests are parked in a per-light pending slot
//! and applied when the scope is released.

use std::sync::Arc;

use tidepool_core::{Error, LightColor, LightId, Scope};
use tracing::{error, info};

use crate::{relay::Relay, Result};

#[derive(Debug)]
pub struct Light {
    name: String,
    enable: Arc<Relay>,
    mode: Option<Arc<Relay>>,
    color: LightColor,
}

impl Light {
    /// Create a light. Relays start released, which is `Off`.
    pub fn new(name: impl Into<String>, enable: Arc<Relay>, mode: Option<Arc<Relay>>) -> Self {
        Self {
            name: name.into(),
            enable,
            mode,
            color: LightColor::Off,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last color whose relay combination was fully applied.
    pub fn color(&self) -> LightColor {
        self.color
    }

    /// Switch both relays, then record the color.
    ///
    /// # Errors
    ///
    /// Returns the first relay failure. The recorded color is left unchanged.
    pub fn apply(&mut self, color: LightColor) -> Result<()> {
        info!(light = %self.name, %color, "Changing light color");
        let (enable, mode) = match color {
            LightColor::Off => (false, false),
            LightColor::White => (true, true),
            LightColor::Blue => (true, false),
        };

        if let Some(mode_relay) = &self.mode {
            mode_relay.set(mode)?;
        }
        self.enable.set(enable)?;

        self.color = color;
        Ok(())
    }
}

/// Every light plus the scope that gates who may change them.
#[derive(Debug)]
pub struct LightBank {
    lights: Vec<Light>,
    scope: Scope,
    pending: Vec<LightColor>,
}

impl LightBank {
    pub fn new(lights: Vec<Light>) -> Self {
        Self {
            lights,
            scope: Scope::NONE,
            pending: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Applied colors, indexed by `LightId::index`.
    pub fn colors(&self) -> Vec<LightColor> {
        self.lights.iter().map(Light::color).collect()
    }

    /// Colors that will be applied when the scope is released. Empty while
    /// no scope is held.
    pub fn pending(&self) -> &[LightColor] {
        &self.pending
    }

    pub fn light_id(&self, name: &str) -> Option<LightId> {
        self.lights
            .iter()
            .position(|light| light.name() == name)
            .map(LightId::from_index)
    }

    /// Request `color` for light `id` on behalf of `scope`.
    ///
    /// The id is validated before any scope decision.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `id` is not a configured light.
    /// - `PermissionDenied` if another non-empty scope is held.
    /// - `Hardware` if a relay write fails.
    pub fn set_color(
        &mut self,
        id: LightId,
        color: LightColor,
        scope: &Scope,
    ) -> tidepool_core::Result<()> {
        let index = id.index();
        if index >= self.lights.len() {
            return Err(Error::InvalidArgument(format!("Invalid light channel ({id})")));
        }

        if self.scope.is_none() || self.scope == *scope {
            self.lights[index].apply(color)?;
            Ok(())
        } else if scope.is_none() {
            info!(light_id = %id, %color, scope = %self.scope, "Buffering command until scope released");
            self.pending[index] = color;
            Ok(())
        } else {
            info!(requested = %scope, scope = %self.scope, "Rejecting command from foreign scope");
            Err(Error::PermissionDenied(format!(
                "Scope is already set to {}",
                self.scope
            )))
        }
    }

    /// Acquire, keep, or release the scope.
    ///
    /// Acquiring snapshots every light's color into the pending buffer.
    /// Releasing applies the whole buffer in ascending light order and
    /// clears it, even if one of the lights fails.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied` when a different non-empty scope is held.
    /// - `Hardware` with the first relay failure during release.
    pub fn set_scope(&mut self, scope: Scope) -> tidepool_core::Result<()> {
        match (self.scope.is_none(), scope.is_none()) {
            (true, true) => Ok(()),
            (true, false) => {
                self.pending = self.colors();
                info!(%scope, pending = ?self.pending, "Scope acquired");
                self.scope = scope;
                Ok(())
            }
            (false, true) => {
                info!(scope = %self.scope, pending = ?self.pending, "Scope released");
                let pending = std::mem::take(&mut self.pending);
                self.scope = Scope::NONE;

                let mut first_error = None;
                for (light, color) in self.lights.iter_mut().zip(pending) {
                    if let Err(e) = light.apply(color) {
                        error!(light = %light.name(), %color, error = %e, "Failed to apply buffered color");
                        first_error.get_or_insert(e);
                    }
                }
                match first_error {
                    Some(e) => Err(e.into()),
                    None => Ok(()),
                }
            }
            (false, false) if self.scope == scope => Ok(()),
            (false, false) => {
                info!(requested = %scope, scope = %self.scope, "Ignoring request to change scope");
                Err(Error::PermissionDenied(format!(
                    "Scope is already set to {}",
                    self.scope
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPin, MockPinHandle};
    use rstest::rstest;

    fn relay(name: &str) -> (Arc<Relay>, MockPinHandle) {
        let (pin, handle) = MockPin::new(name);
        (Arc::new(Relay::new(name, Arc::new(pin), true).unwrap()), handle)
    }

    fn bank(n: usize) -> LightBank {
        let lights = (0..n)
            .map(|i| {
                let (enable, _) = relay(&format!("enable{i}"));
                let (mode, _) = relay(&format!("mode{i}"));
                Light::new(format!("light{i}"), enable, Some(mode))
            })
            .collect();
        LightBank::new(lights)
    }

    fn id(n: u8) -> LightId {
        LightId::new(n).unwrap()
    }

    #[rstest]
    #[case(LightColor::Off, false, false)]
    #[case(LightColor::White, true, true)]
    #[case(LightColor::Blue, true, false)]
    fn test_relay_combination(#[case] color: LightColor, #[case] enable: bool, #[case] mode: bool) {
        let (enable_relay, enable_pin) = relay("enable");
        let (mode_relay, mode_pin) = relay("mode");
        let mut light = Light::new("tank", enable_relay, Some(mode_relay));

        light.apply(color).unwrap();
        assert_eq!(light.color(), color);
        assert_eq!(enable_pin.is_high(), enable);
        assert_eq!(mode_pin.is_high(), mode);
    }

    #[test]
    fn test_outlet_without_mode_relay() {
        let (enable_relay, enable_pin) = relay("outlet");
        let mut outlet = Light::new("outlet1", enable_relay, None);

        outlet.apply(LightColor::White).unwrap();
        assert!(enable_pin.is_high());
        outlet.apply(LightColor::Off).unwrap();
        assert!(!enable_pin.is_high());
    }

    #[test]
    fn test_failed_relay_keeps_color() {
        let (enable_relay, enable_pin) = relay("enable");
        let mut light = Light::new("tank", enable_relay, None);

        enable_pin.set_fail(true);
        assert!(light.apply(LightColor::White).is_err());
        assert_eq!(light.color(), LightColor::Off);
    }

    #[test]
    fn test_invalid_id_checked_before_scope() {
        let mut bank = bank(2);
        bank.set_scope(Scope::from("A")).unwrap();

        let err = bank.set_color(id(3), LightColor::Blue, &Scope::NONE).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(bank.pending(), &[LightColor::Off, LightColor::Off]);
    }

    #[test]
    fn test_unscoped_command_is_buffered_last_write_wins() {
        let mut bank = bank(3);
        bank.set_color(id(1), LightColor::White, &Scope::NONE).unwrap();
        bank.set_scope(Scope::from("calibration")).unwrap();

        bank.set_color(id(2), LightColor::White, &Scope::NONE).unwrap();
        bank.set_color(id(2), LightColor::Blue, &Scope::NONE).unwrap();
        assert_eq!(bank.colors(), vec![LightColor::White, LightColor::Off, LightColor::Off]);

        bank.set_scope(Scope::NONE).unwrap();
        assert_eq!(bank.colors(), vec![LightColor::White, LightColor::Blue, LightColor::Off]);
        assert!(bank.pending().is_empty());
    }

    #[test]
    fn test_scoped_command_applies_and_is_reverted_on_release() {
        let mut bank = bank(1);
        let scope = Scope::from("calibration");
        bank.set_scope(scope.clone()).unwrap();

        bank.set_color(id(1), LightColor::Blue, &scope).unwrap();
        assert_eq!(bank.colors(), vec![LightColor::Blue]);

        bank.set_scope(Scope::NONE).unwrap();
        assert_eq!(bank.colors(), vec![LightColor::Off]);
    }

    #[test]
    fn test_foreign_scope_is_rejected() {
        let mut bank = bank(1);
        bank.set_scope(Scope::from("A")).unwrap();

        let err = bank.set_color(id(1), LightColor::Blue, &Scope::from("B")).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        let err = bank.set_scope(Scope::from("B")).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert_eq!(bank.scope(), &Scope::from("A"));
    }

    #[test]
    fn test_reacquiring_same_scope_does_not_resnapshot() {
        let mut bank = bank(1);
        let scope = Scope::from("A");
        bank.set_scope(scope.clone()).unwrap();
        bank.set_color(id(1), LightColor::White, &Scope::NONE).unwrap();

        bank.set_scope(scope).unwrap();
        assert_eq!(bank.pending(), &[LightColor::White]);
    }

    #[test]
    fn test_light_id_lookup() {
        let bank = bank(2);
        assert_eq!(bank.light_id("light1"), Some(id(2)));
        assert_eq!(bank.light_id("nope"), None);
    }
}
