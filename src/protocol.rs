//! The advisory wire contract: how a cycle's state becomes a prompt, and how
//! the free-text reply becomes a validated set of recommendations.
//!
//! The backing service is not guaranteed to return pure JSON, so response
//! handling goes through a single tolerant extraction primitive that pulls
//! the first brace-delimited object out of the text and fails soft.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::types::{HvacMode, Recommendations, RoomState, Temperature};

pub const AC_TEMPERATURE_MIN: f64 = 16.0;
pub const AC_TEMPERATURE_MAX: f64 = 30.0;

/// Deviation boundaries (deg C) for the airflow strategy tiers quoted to the
/// advisory service. Near-zero airflow is only suggested beyond `severe`.
#[derive(Debug, Clone, Copy)]
pub struct OvershootTiers {
    pub moderate: f64,
    pub high: f64,
    pub severe: f64,
}

impl Default for OvershootTiers {
    fn default() -> Self {
        Self {
            moderate: 1.0,
            high: 2.0,
            severe: 3.0,
        }
    }
}

fn room_status(deviation: f64, deadband: f64) -> &'static str {
    if deviation.abs() <= deadband {
        "AT TARGET"
    } else if deviation > 0.0 {
        "TOO HOT"
    } else {
        "TOO COLD"
    }
}

/// Build the instruction block sent to the advisory service.
pub fn build_prompt(
    mode: HvacMode,
    target: Temperature,
    deadband: f64,
    rooms: &BTreeMap<String, RoomState>,
    tiers: OvershootTiers,
    include_humidity: bool,
    include_setpoint: bool,
) -> String {
    let heating = mode == HvacMode::Heat;
    let target_c = target.celsius();
    let mut p = String::new();

    p.push_str(&format!(
        "You are managing a central HVAC system in {} mode with an individually \
         controllable airflow cover per room.\n\n\
         Target temperature for all rooms: {target_c:.1}C\n\
         Temperature deadband: {deadband:.1}C (rooms within this range are at target)\n\n",
        if heating { "HEATING" } else { "COOLING" },
    ));

    if heating {
        p.push_str(
            "The system supplies WARM air: a higher cover position heats the room \
             faster. Rooms BELOW target need HIGH airflow; rooms ABOVE target need \
             LOW airflow so they can drift back naturally.\n",
        );
    } else {
        p.push_str(
            "The system supplies COOL air: a higher cover position cools the room \
             faster. Rooms ABOVE target need HIGH airflow; rooms BELOW target need \
             LOW airflow so they can drift back naturally.\n",
        );
    }

    p.push_str("\nCurrent room states:\n");
    for (name, room) in rooms {
        match (room.current_temperature, room.deviation()) {
            (Some(temp), Some(diff)) => {
                p.push_str(&format!(
                    "- {name}: {:.1}C (difference {diff:+.1}C, {}), cover at {}%\n",
                    temp.celsius(),
                    room_status(diff, deadband),
                    room.cover_position,
                ));
            }
            _ => {
                p.push_str(&format!(
                    "- {name}: no temperature reading, cover at {}%\n",
                    room.cover_position
                ));
            }
        }
        if include_humidity && let Some(h) = room.current_humidity {
            p.push_str(&format!("  humidity: {h:.0}%\n"));
        }
    }

    let (needs_more, overshot) = if heating {
        ("BELOW", "ABOVE")
    } else {
        ("ABOVE", "BELOW")
    };
    p.push_str(&format!(
        "\nStrategy:\n\
         1. Rooms {needs_more} target (need conditioning):\n\
            - {:.0}C or more away: cover 75-100% (aggressive)\n\
            - {:.0}-{:.0}C away: cover 50-75% (moderate)\n\
            - under {:.0}C away: cover 40-60% (gentle)\n\
         2. Rooms {overshot} target (overshot; keep some circulation):\n\
            - {:.0}C or more past target: cover 0-5% (near shutdown, extreme only)\n\
            - {:.0}-{:.0}C past: cover 5-15% (minimal airflow)\n\
            - {:.0}-{:.0}C past: cover 15-25% (reduced)\n\
            - under {:.0}C past: cover 25-35% (gentle reduction)\n\
         3. Rooms at target: cover 50-70% (hold equilibrium with circulation)\n\
         \n\
         The further a room overshoots, the lower its cover, but keep minimal \
         airflow below the {:.0}C tier for air quality. Direction matters: weigh \
         whether a room is above or below target, not just the magnitude. Prefer \
         gradual changes (10-25%) and aim for whole-home equilibrium at target.\n",
        tiers.severe,
        tiers.moderate,
        tiers.severe,
        tiers.moderate,
        tiers.severe,
        tiers.high,
        tiers.severe,
        tiers.moderate,
        tiers.high,
        tiers.moderate,
        tiers.severe,
    ));

    if include_humidity {
        p.push_str(
            "\nHumidity: prefer temperature control over humidity control. Only \
             suggest switching the unit to dry mode when all temperatures are \
             already stable at target.\n",
        );
    }

    if include_setpoint {
        p.push_str(&format!(
            "\nAlso recommend the central unit setpoint as \"ac_temperature\": \
             {} aggressively when rooms are far from target, conservatively near \
             target. Integer Celsius.\n",
            if heating { "warmer" } else { "cooler" },
        ));
    }

    p.push_str(
        "\nRespond ONLY with a JSON object mapping each room name to an integer \
         cover position 0-100",
    );
    if include_setpoint {
        p.push_str(", optionally \"ac_temperature\" (integer 16-30)");
    }
    if include_humidity {
        p.push_str(", optionally \"hvac_mode\" (one of cool, heat, dry, auto)");
    }
    p.push_str(". No other text.\n");

    p
}

/// Extract the first complete brace-delimited JSON object from free text.
///
/// Brace matching is string- and escape-aware so nested objects survive.
/// Returns `None` when no balanced object exists; never fails otherwise.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse and validate an advisory reply against the configured rooms.
///
/// Positions are clamped into [0, 100], `ac_temperature` into [16, 30], and
/// `hvac_mode` is accepted only as one of cool/heat/dry/auto. Keys that are
/// not configured rooms are dropped silently. `None` means the reply held no
/// parsable JSON object at all.
pub fn parse_recommendations(
    text: &str,
    rooms: &BTreeMap<String, RoomState>,
) -> Option<Recommendations> {
    let raw = extract_json_object(text)?;
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "advisory reply JSON did not parse");
            return None;
        }
    };
    let obj = parsed.as_object()?;

    let mut recs = Recommendations::default();
    for name in rooms.keys() {
        if let Some(v) = obj.get(name)
            && let Some(pos) = numeric(v)
        {
            recs.rooms.insert(name.clone(), (pos as i64).clamp(0, 100) as u8);
        }
    }

    if let Some(v) = obj.get("ac_temperature")
        && let Some(t) = numeric(v)
    {
        recs.ac_temperature = Some(t.clamp(AC_TEMPERATURE_MIN, AC_TEMPERATURE_MAX));
    }

    if let Some(m) = obj.get("hvac_mode").and_then(|v| v.as_str()) {
        match HvacMode::from_str(m) {
            Some(HvacMode::Off) | None => {
                warn!(mode = m, "ignoring invalid recommended hvac mode")
            }
            Some(mode) => recs.hvac_mode = Some(mode),
        }
    }

    Some(recs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rooms(names: &[&str]) -> BTreeMap<String, RoomState> {
        names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    RoomState {
                        current_temperature: Some(Temperature::from_celsius(23.5)),
                        current_humidity: Some(55.0),
                        cover_position: 60,
                        target_temperature: Temperature::from_celsius(22.0),
                        temperature_sensor: format!("sensor.{name}"),
                        cover_entity: format!("cover.{name}"),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn extract_plain_object() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn extract_ignores_surrounding_prose() {
        let text = "Here you go:\n```json\n{\"Bedroom\": 70}\n```\nHope that helps!";
        assert_eq!(extract_json_object(text), Some(r#"{"Bedroom": 70}"#));
    }

    #[test]
    fn extract_handles_nested_objects_and_braces_in_strings() {
        let text = r#"note {"a": {"b": 2}, "c": "}{"} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": {"b": 2}, "c": "}{"}"#)
        );
    }

    #[test]
    fn extract_unbalanced_returns_none() {
        assert_eq!(extract_json_object(r#"{"a": 1"#), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn parse_clamps_positions_and_setpoint() {
        let r = rooms(&["Living Room", "Bedroom"]);
        let recs = parse_recommendations(
            r#"{"Living Room": 150, "Bedroom": -10, "ac_temperature": 40}"#,
            &r,
        )
        .unwrap();
        assert_eq!(recs.rooms["Living Room"], 100);
        assert_eq!(recs.rooms["Bedroom"], 0);
        assert_eq!(recs.ac_temperature, Some(30.0));
    }

    #[test]
    fn parse_drops_unconfigured_rooms() {
        let r = rooms(&["Bedroom"]);
        let recs =
            parse_recommendations(r#"{"Bedroom": 55, "Garage": 80, "note": "hi"}"#, &r).unwrap();
        assert_eq!(recs.rooms.len(), 1);
        assert_eq!(recs.rooms["Bedroom"], 55);
    }

    #[test]
    fn parse_accepts_only_valid_hvac_modes() {
        let r = rooms(&["Bedroom"]);
        let recs =
            parse_recommendations(r#"{"Bedroom": 50, "hvac_mode": "dry"}"#, &r).unwrap();
        assert_eq!(recs.hvac_mode, Some(HvacMode::Dry));

        let recs =
            parse_recommendations(r#"{"Bedroom": 50, "hvac_mode": "off"}"#, &r).unwrap();
        assert_eq!(recs.hvac_mode, None);

        let recs =
            parse_recommendations(r#"{"Bedroom": 50, "hvac_mode": "turbo"}"#, &r).unwrap();
        assert_eq!(recs.hvac_mode, None);
    }

    #[test]
    fn parse_accepts_numeric_strings() {
        let r = rooms(&["Bedroom"]);
        let recs = parse_recommendations(r#"{"Bedroom": "75"}"#, &r).unwrap();
        assert_eq!(recs.rooms["Bedroom"], 75);
    }

    #[test]
    fn parse_no_json_is_none() {
        let r = rooms(&["Bedroom"]);
        assert!(parse_recommendations("sorry, I cannot help", &r).is_none());
    }

    #[test]
    fn prompt_carries_room_status_and_format_instruction() {
        let r = rooms(&["Bedroom"]);
        let prompt = build_prompt(
            HvacMode::Cool,
            Temperature::from_celsius(22.0),
            0.5,
            &r,
            OvershootTiers::default(),
            false,
            false,
        );
        assert!(prompt.contains("COOLING"));
        assert!(prompt.contains("Bedroom"));
        assert!(prompt.contains("TOO HOT"));
        assert!(prompt.contains("+1.5"));
        assert!(prompt.contains("Respond ONLY with a JSON object"));
        assert!(!prompt.contains("ac_temperature"));
        assert!(!prompt.contains("hvac_mode"));
    }

    #[test]
    fn prompt_optional_sections_toggle() {
        let r = rooms(&["Bedroom"]);
        let prompt = build_prompt(
            HvacMode::Heat,
            Temperature::from_celsius(21.0),
            0.5,
            &r,
            OvershootTiers::default(),
            true,
            true,
        );
        assert!(prompt.contains("HEATING"));
        assert!(prompt.contains("humidity: 55%"));
        assert!(prompt.contains("dry mode"));
        assert!(prompt.contains("ac_temperature"));
        assert!(prompt.contains("hvac_mode"));
    }

    #[test]
    fn prompt_notes_missing_readings() {
        let mut r = rooms(&["Bedroom"]);
        r.get_mut("Bedroom").unwrap().current_temperature = None;
        let prompt = build_prompt(
            HvacMode::Cool,
            Temperature::from_celsius(22.0),
            0.5,
            &r,
            OvershootTiers::default(),
            false,
            false,
        );
        assert!(prompt.contains("no temperature reading"));
    }
}
