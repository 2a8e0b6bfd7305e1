use std::collections::BTreeMap;

use aircon_advisor::{
    DayRule, FanSpeed, HvacMode, MainUnitState, OptimizationResult, Provider, Recommendations,
    RoomState, Temperature,
};
use chrono::{Utc, Weekday};
use serde_json::json;

#[test]
fn from_celsius() {
    let t = Temperature::from_celsius(22.0);
    assert_eq!(t.celsius(), 22.0);
    assert!((t.fahrenheit() - 71.6).abs() < 0.01);
}

#[test]
fn from_fahrenheit() {
    let t = Temperature::from_fahrenheit(72.0);
    assert!((t.celsius() - 22.222).abs() < 0.01);
    assert!((t.fahrenheit() - 72.0).abs() < 0.01);
}

#[test]
fn display() {
    let t = Temperature::from_celsius(22.5);
    assert_eq!(format!("{t}"), "22.5\u{00b0}C");
}

#[test]
fn reading_sentinels_are_no_reading() {
    for raw in ["unknown", "unavailable", "none", ""] {
        assert!(Temperature::from_reading(raw, None).is_none(), "{raw}");
    }
}

#[test]
fn reading_non_numeric_is_no_reading() {
    assert!(Temperature::from_reading("warm-ish", None).is_none());
}

#[test]
fn reading_fahrenheit_units_convert() {
    for unit in ["\u{00b0}F", "fahrenheit", "F"] {
        let t = Temperature::from_reading("71.6", Some(unit)).unwrap();
        assert!((t.celsius() - 22.0).abs() < 0.05, "{unit}");
    }
}

#[test]
fn reading_celsius_and_unknown_units_pass_through() {
    for unit in [Some("\u{00b0}C"), Some("celsius"), Some("C"), Some("K"), None] {
        let t = Temperature::from_reading("22.0", unit).unwrap();
        assert_eq!(t.celsius(), 22.0, "{unit:?}");
    }
}

#[test]
fn hvac_mode_roundtrip() {
    for mode in [
        HvacMode::Off,
        HvacMode::Cool,
        HvacMode::Heat,
        HvacMode::Dry,
        HvacMode::Auto,
    ] {
        assert_eq!(HvacMode::from_str(mode.as_str()), Some(mode));
    }
    assert_eq!(HvacMode::from_str("turbo"), None);
}

#[test]
fn fan_speed_strings() {
    assert_eq!(FanSpeed::Low.as_str(), "low");
    assert_eq!(FanSpeed::Medium.as_str(), "medium");
    assert_eq!(FanSpeed::High.as_str(), "high");
}

#[test]
fn provider_roundtrip() {
    for provider in [Provider::Claude, Provider::ChatGpt] {
        assert_eq!(Provider::from_str(provider.as_str()), Some(provider));
    }
    assert_eq!(Provider::from_str("bard"), None);
}

#[test]
fn day_rules_match_expected_weekdays() {
    assert!(DayRule::All.matches(Weekday::Sun));
    assert!(DayRule::Weekdays.matches(Weekday::Mon));
    assert!(!DayRule::Weekdays.matches(Weekday::Sat));
    assert!(DayRule::Weekends.matches(Weekday::Sat));
    assert!(!DayRule::Weekends.matches(Weekday::Wed));
    assert!(DayRule::Friday.matches(Weekday::Fri));
    assert!(!DayRule::Friday.matches(Weekday::Thu));
}

#[test]
fn recommendations_emptiness() {
    let mut recs = Recommendations::default();
    assert!(recs.is_empty());
    recs.ac_temperature = Some(24.0);
    assert!(!recs.is_empty());
}

#[test]
fn main_unit_running_detection() {
    let unit = |mode: &str, action: &str| MainUnitState {
        state: mode.to_string(),
        setpoint: None,
        current_temperature: None,
        mode: Some(mode.to_string()),
        action: Some(action.to_string()),
        supported_modes: vec![],
    };
    assert!(unit("cool", "cooling").is_running());
    assert!(unit("heat", "idle").is_running());
    assert!(!unit("off", "off").is_running());
    assert!(!unit("unavailable", "off").is_running());
}

fn result_with(temps: &[(&str, Option<f64>)], target: f64) -> OptimizationResult {
    let room_states: BTreeMap<String, RoomState> = temps
        .iter()
        .map(|(name, temp)| {
            (
                name.to_string(),
                RoomState {
                    current_temperature: temp.map(Temperature::from_celsius),
                    current_humidity: None,
                    cover_position: 100,
                    target_temperature: Temperature::from_celsius(target),
                    temperature_sensor: format!("sensor.{name}"),
                    cover_entity: format!("cover.{name}"),
                },
            )
        })
        .collect();
    OptimizationResult {
        cycle_id: "test".to_string(),
        completed_at: Utc::now(),
        room_states,
        recommendations: Recommendations::default(),
        advisory_text: None,
        main_unit: None,
        main_fan_speed: None,
        main_unit_running: false,
        needs_unit: false,
        last_error: None,
        error_count: 0,
        active_schedule: None,
        effective_target: Temperature::from_celsius(target),
        base_target: Temperature::from_celsius(target),
        weather_adjustment: 0.0,
        outdoor_temperature: None,
    }
}

#[test]
fn result_summary_statistics() {
    let result = result_with(&[("a", Some(21.0)), ("b", Some(24.0)), ("c", None)], 22.0);
    assert_eq!(result.average_temperature(), Some(22.5));
    assert_eq!(result.min_temperature(), Some(21.0));
    assert_eq!(result.max_temperature(), Some(24.0));
    assert_eq!(result.temperature_spread(), Some(3.0));
}

#[test]
fn result_status_labels() {
    assert_eq!(
        result_with(&[("a", Some(22.1)), ("b", Some(21.9))], 22.0).status(),
        "maintaining"
    );
    assert_eq!(
        result_with(&[("a", Some(23.0)), ("b", Some(21.0))], 22.0).status(),
        "equalizing"
    );
    assert_eq!(
        result_with(&[("a", Some(23.5))], 22.0).status(),
        "cooling"
    );
    assert_eq!(
        result_with(&[("a", Some(20.5))], 22.0).status(),
        "heating"
    );
    assert_eq!(result_with(&[("a", None)], 22.0).status(), "no_data");
}

#[test]
fn result_serializes_for_telemetry() {
    let result = result_with(&[("a", Some(22.0))], 22.0);
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["room_states"]["a"]["current_temperature"], json!(22.0));
    assert_eq!(value["effective_target"], json!(22.0));
}
