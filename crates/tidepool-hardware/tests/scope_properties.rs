//! Property-based tests for scope arbitration in the light bank.
//!
//! A random sequence of color requests is replayed against a bank of mock
//! lights while a scope is held, and the observable colors are checked
//! against a simple model.

use std::sync::Arc;

use proptest::prelude::*;
use tidepool_core::{Error, LightColor, LightId, Scope};
use tidepool_hardware::{
    light::{Light, LightBank},
    mock::MockPin,
    relay::Relay,
};

const LIGHTS: u8 = 4;

fn bank() -> LightBank {
    let relay = |name: String| Arc::new(Relay::new(name.clone(), Arc::new(MockPin::detached(name)), true).unwrap());
    let lights = (0..LIGHTS)
        .map(|i| Light::new(format!("light{i}"), relay(format!("enable{i}")), Some(relay(format!("mode{i}")))))
        .collect();
    LightBank::new(lights)
}

fn color() -> impl Strategy<Value = LightColor> {
    prop_oneof![Just(LightColor::Off), Just(LightColor::White), Just(LightColor::Blue)]
}

/// Light ids including some outside `1..=LIGHTS`.
fn any_light() -> impl Strategy<Value = u8> {
    1u8..=LIGHTS + 3
}

proptest! {
    /// Unscoped writes while a scope is held are invisible until release,
    /// then the last write per light wins.
    #[test]
    fn prop_buffered_writes_last_write_wins(
        initial in prop::collection::vec(color(), LIGHTS as usize),
        writes in prop::collection::vec((1u8..=LIGHTS, color()), 0..40),
    ) {
        let mut bank = bank();
        for (i, c) in initial.iter().enumerate() {
            bank.set_color(LightId::from_index(i), *c, &Scope::NONE).unwrap();
        }

        bank.set_scope(Scope::from("calibration")).unwrap();
        let mut expected = initial.clone();
        for (id, c) in &writes {
            bank.set_color(LightId::new(*id).unwrap(), *c, &Scope::NONE).unwrap();
            expected[usize::from(*id) - 1] = *c;
            prop_assert_eq!(bank.colors(), initial.clone());
        }

        bank.set_scope(Scope::NONE).unwrap();
        prop_assert_eq!(bank.colors(), expected);
        prop_assert!(bank.pending().is_empty());
    }

    /// Out-of-range ids are rejected and never change applied or pending state.
    #[test]
    fn prop_invalid_id_changes_nothing(
        held in any::<bool>(),
        id in any_light(),
        c in color(),
    ) {
        let mut bank = bank();
        if held {
            bank.set_scope(Scope::from("A")).unwrap();
        }
        let colors = bank.colors();
        let pending = bank.pending().to_vec();

        let result = bank.set_color(LightId::new(id).unwrap(), c, &Scope::NONE);
        if id > LIGHTS {
            prop_assert!(matches!(result, Err(Error::InvalidArgument(_))));
            prop_assert_eq!(bank.colors(), colors);
            prop_assert_eq!(bank.pending().to_vec(), pending);
        } else {
            prop_assert!(result.is_ok());
        }
    }

    /// A second scope can never displace the holder, whatever its name.
    #[test]
    fn prop_foreign_scope_is_rejected(
        holder in "[a-z]{1,8}",
        other in "[A-Z]{1,8}",
        c in color(),
    ) {
        let mut bank = bank();
        bank.set_scope(Scope::new(holder.clone())).unwrap();

        let denied = bank.set_scope(Scope::new(other.clone()));
        prop_assert!(matches!(denied, Err(Error::PermissionDenied(_))));
        let denied = bank.set_color(LightId::new(1).unwrap(), c, &Scope::new(other));
        prop_assert!(matches!(denied, Err(Error::PermissionDenied(_))));
        prop_assert_eq!(bank.scope(), &Scope::new(holder.clone()));

        // Re-acquiring is a no-op.
        let pending = bank.pending().to_vec();
        bank.set_scope(Scope::new(holder)).unwrap();
        prop_assert_eq!(bank.pending().to_vec(), pending);
    }
}
