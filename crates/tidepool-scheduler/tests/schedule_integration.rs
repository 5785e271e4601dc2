//! Scheduler and dosing against the in-process hardware service.

use std::{sync::Arc, time::Duration};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tidepool_core::{
    LightColor, RelayChannel, Scope,
    config::{HardwareConfig, LightMask, LightScheduleConfig},
};
use tidepool_hardware::{
    HardwareControlService, ServiceBuilder,
    mock::{MockPin, MockPinHandle},
    relay::Relay,
    stepper::{StepperPins, StepperTiming},
};
use tidepool_scheduler::{
    DispenseOutcome, Dispenser, LightTimer, Scheduler, ScheduledLight, TimerState,
};
use tokio_util::sync::CancellationToken;

fn at(hh: u32, mm: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 14)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(hh, mm, 0).unwrap())
}

async fn service() -> (Arc<HardwareControlService>, MockPinHandle) {
    let mut builder = ServiceBuilder::new();
    for i in 1..=2 {
        for role in ["enable", "mode"] {
            let name = format!("{role}{i}");
            let pin = MockPin::detached(name.clone());
            builder = builder.relay(Relay::new(name, Arc::new(pin), true).unwrap());
        }
        builder = builder.light(
            format!("tank{i}"),
            &format!("enable{i}"),
            Some(format!("mode{i}").as_str()),
        );
    }

    let (step, step_handle) = MockPin::new("step");
    let pins = StepperPins {
        step: Arc::new(step),
        dir: Arc::new(MockPin::detached("dir")),
        nen: Arc::new(MockPin::detached("nen")),
        ms: [None, None, None],
    };
    let service = builder
        .stepper(pins, StepperTiming::default())
        .build()
        .await
        .unwrap();
    (Arc::new(service), step_handle)
}

fn timer(service: &HardwareControlService) -> LightTimer {
    let mask = LightMask {
        white_enabled: true,
        blue_enabled: true,
    };
    let lights = ["tank1", "tank2"]
        .into_iter()
        .map(|name| ScheduledLight {
            id: service.light_id(name).unwrap(),
            mask,
        })
        .collect();
    LightTimer::new(
        "tanks",
        NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
        NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
        lights,
    )
    .unwrap()
    .with_blue_at_night(true)
}

#[tokio::test(start_paused = true)]
async fn test_day_and_night_drive_the_lights() {
    let (service, _) = service().await;
    let mut scheduler = Scheduler::new(Arc::clone(&service));
    scheduler.add_timer(timer(&service));

    scheduler.update(at(6, 0)).await;
    assert_eq!(service.light_colors(), vec![LightColor::Blue; 2]);

    scheduler.update(at(8, 30)).await;
    assert_eq!(service.light_colors(), vec![LightColor::White; 2]);
    assert_eq!(scheduler.timer_state("tanks"), Some(TimerState::Day));

    scheduler.update(at(17, 30)).await;
    assert_eq!(service.light_colors(), vec![LightColor::Blue; 2]);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_is_buffered_while_scope_held() {
    let (service, _) = service().await;
    let mut scheduler = Scheduler::new(Arc::clone(&service));
    scheduler.add_timer(timer(&service));
    scheduler.update(at(6, 0)).await;

    let scope = Scope::from("ph_calibration");
    service.set_scope(scope.clone()).unwrap();
    service
        .set_light_color(service.light_id("tank1").unwrap(), LightColor::Off, &scope)
        .unwrap();

    scheduler.update(at(9, 0)).await;
    assert_eq!(service.light_colors(), vec![LightColor::Off, LightColor::Blue]);

    service.set_scope(Scope::NONE).unwrap();
    assert_eq!(service.light_colors(), vec![LightColor::White; 2]);
}

#[tokio::test(start_paused = true)]
async fn test_timers_built_from_config() {
    let (service, _) = service().await;
    let hardware: HardwareConfig = serde_json::from_str(
        r#"{
            "relays": [
                {"name": "enable1", "pin": 5, "active_high": true},
                {"name": "mode1", "pin": 6, "active_high": true},
                {"name": "enable2", "pin": 13, "active_high": true},
                {"name": "mode2", "pin": 19, "active_high": true}
            ],
            "lights": [
                {"name": "tank1", "enable_relay": "enable1", "mode_relay": "mode1"},
                {"name": "tank2", "enable_relay": "enable2", "mode_relay": "mode2"}
            ]
        }"#,
    )
    .unwrap();
    let schedule = LightScheduleConfig {
        sunrise_hhmm: 900,
        sunset_hhmm: 2100,
        blue_lights_at_night: false,
        eclipse_enabled: false,
        eclipse_white_duration_min: 0,
        eclipse_blue_duration_min: 0,
        lights: [(
            "tank2".to_string(),
            LightMask {
                white_enabled: true,
                blue_enabled: false,
            },
        )]
        .into(),
    };

    let mut scheduler = Scheduler::new(Arc::clone(&service));
    scheduler.add_timer(LightTimer::from_config("tank2_only", &schedule, &hardware).unwrap());
    scheduler.update(at(12, 0)).await;

    assert_eq!(service.light_colors(), vec![LightColor::Off, LightColor::White]);
}

#[tokio::test(start_paused = true)]
async fn test_dose_on_the_real_stepper() {
    let (service, step) = service().await;
    let enable1 = RelayChannel::new(1).unwrap();
    let enable2 = RelayChannel::new(3).unwrap();
    service.set_relay(enable1, true).unwrap();
    service.set_relay(enable2, true).unwrap();

    let dispenser = Dispenser::new(100, vec![enable1, enable2]);
    let outcome = dispenser
        .dispense(service.as_ref(), 3, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, DispenseOutcome::Completed);
    assert_eq!(step.rising_edges(), 300);
    assert!(!service.is_stepper_active());
    let states = service.relay_states();
    assert!(states.contains(&(enable1, true)));
    assert!(states.contains(&(enable2, true)));
}

#[tokio::test(start_paused = true)]
async fn test_dose_cancelled_part_way() {
    let (service, step) = service().await;
    let stop = CancellationToken::new();
    let dispenser = Dispenser::new(1000, vec![RelayChannel::new(1).unwrap()]);

    let task = {
        let service = Arc::clone(&service);
        let stop = stop.clone();
        tokio::spawn(async move { dispenser.dispense(service.as_ref(), 5, &stop).await })
    };

    while step.rising_edges() < 10 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    stop.cancel();

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, DispenseOutcome::Stopped);
    assert!(step.rising_edges() < 5000);
    assert!(!service.is_stepper_active());
    assert_eq!(service.relay_states()[0], (RelayChannel::new(1).unwrap(), true));
}
