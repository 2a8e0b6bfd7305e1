//! Pure decision logic for a cycle: stability, unit-need hysteresis, and
//! central fan tier. All functions work over the per-cycle room snapshots
//! and keep no state of their own.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::types::{FanSpeed, HvacMode, RoomState, Temperature};

fn valid_temps(rooms: &BTreeMap<String, RoomState>) -> Vec<f64> {
    rooms
        .values()
        .filter_map(|r| r.current_temperature.map(|t| t.celsius()))
        .collect()
}

/// All rooms have a reading and sit within the deadband of their target.
/// Used as a cost gate for advisory calls, not as a correctness gate.
pub fn rooms_stable(rooms: &BTreeMap<String, RoomState>, deadband: f64) -> bool {
    if rooms.is_empty() {
        return false;
    }
    for (name, room) in rooms {
        let Some(diff) = room.deviation() else {
            debug!(room = %name, "no reading, system not stable");
            return false;
        };
        if diff.abs() > deadband {
            debug!(room = %name, deviation = diff, "room outside deadband");
            return false;
        }
    }
    true
}

/// Whether the central unit should run, with asymmetric on/off hysteresis.
///
/// In cool mode a running unit keeps going until the average has dropped
/// `off_threshold` below target AND every room has reached target; an idle
/// unit starts once the average exceeds target by `on_threshold`. Heat mode
/// mirrors this. Auto mode uses the plain deadband with no hysteresis.
/// No valid readings means the unit is not needed.
pub fn needs_unit(
    rooms: &BTreeMap<String, RoomState>,
    mode: HvacMode,
    target: Temperature,
    deadband: f64,
    on_threshold: f64,
    off_threshold: f64,
    currently_on: bool,
) -> bool {
    let temps = valid_temps(rooms);
    if temps.is_empty() {
        return false;
    }
    let target = target.celsius();
    let avg = temps.iter().sum::<f64>() / temps.len() as f64;
    let diff = avg - target;

    match mode {
        HvacMode::Cool => {
            if currently_on {
                let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let turn_off = diff <= -off_threshold && max <= target;
                if turn_off {
                    info!(avg, max, off_threshold, "all rooms cooled, unit no longer needed");
                }
                !turn_off
            } else {
                let turn_on = diff >= on_threshold;
                if turn_on {
                    info!(avg, on_threshold, "average above target, unit needed");
                }
                turn_on
            }
        }
        HvacMode::Heat => {
            if currently_on {
                let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
                let turn_off = diff >= off_threshold && min >= target;
                if turn_off {
                    info!(avg, min, off_threshold, "all rooms warmed, unit no longer needed");
                }
                !turn_off
            } else {
                let turn_on = diff <= -on_threshold;
                if turn_on {
                    info!(avg, on_threshold, "average below target, unit needed");
                }
                turn_on
            }
        }
        _ => diff.abs() > deadband,
    }
}

/// Mean-deviation boundaries for the high and medium fan tiers.
#[derive(Debug, Clone, Copy)]
pub struct FanThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for FanThresholds {
    fn default() -> Self {
        Self {
            high: 2.5,
            medium: 1.0,
        }
    }
}

/// Derive the central fan tier from aggregate deviation statistics.
///
/// Equilibrium (spread <= 1.0 and |mean deviation| <= 0.5) is low regardless
/// of mode. Otherwise cool mode pushes high only when rooms are above target,
/// heat mode only when below; auto mode goes by magnitude alone.
pub fn determine_fan_tier(
    rooms: &BTreeMap<String, RoomState>,
    mode: HvacMode,
    target: Temperature,
    thresholds: FanThresholds,
) -> FanSpeed {
    let temps = valid_temps(rooms);
    if temps.is_empty() {
        return FanSpeed::Medium;
    }
    let target = target.celsius();
    let avg = temps.iter().sum::<f64>() / temps.len() as f64;
    let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
    let spread = max - min;
    let avg_diff = avg - target;
    let max_diff = max - target;
    let min_diff = min - target;
    let max_deviation = max_diff.abs().max(min_diff.abs());

    if spread <= 1.0 && avg_diff.abs() <= 0.5 {
        debug!(spread, avg_diff, "fan low: maintaining equilibrium");
        return FanSpeed::Low;
    }

    match mode {
        HvacMode::Cool => {
            if avg_diff >= thresholds.high || (max_diff >= 3.0 && spread >= 2.0) {
                debug!(avg_diff, max_diff, "fan high: aggressive cooling needed");
                FanSpeed::High
            } else if avg_diff <= -0.5 || (avg_diff < thresholds.medium && max_diff < 2.0) {
                debug!(avg_diff, max_diff, "fan low: at or below target in cool mode");
                FanSpeed::Low
            } else {
                FanSpeed::Medium
            }
        }
        HvacMode::Heat => {
            if avg_diff <= -thresholds.high || (min_diff <= -3.0 && spread >= 2.0) {
                debug!(avg_diff, min_diff, "fan high: aggressive heating needed");
                FanSpeed::High
            } else if avg_diff >= 0.5 || (avg_diff > -thresholds.medium && min_diff > -2.0) {
                debug!(avg_diff, min_diff, "fan low: at or above target in heat mode");
                FanSpeed::Low
            } else {
                FanSpeed::Medium
            }
        }
        _ => {
            if max_deviation >= 3.0 || spread >= 3.0 {
                debug!(max_deviation, spread, "fan high: large deviation");
                FanSpeed::High
            } else {
                FanSpeed::Medium
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rooms(temps: &[(&str, Option<f64>)], target: f64) -> BTreeMap<String, RoomState> {
        temps
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
            .collect()
    }

    #[test]
    fn stable_within_deadband() {
        let r = rooms(&[("a", Some(21.8)), ("b", Some(22.3))], 22.0);
        assert!(rooms_stable(&r, 0.5));
    }

    #[test]
    fn one_room_outside_deadband_breaks_stability() {
        let r = rooms(&[("a", Some(21.8)), ("b", Some(23.0))], 22.0);
        assert!(!rooms_stable(&r, 0.5));
    }

    #[test]
    fn missing_reading_breaks_stability() {
        let r = rooms(&[("a", Some(22.0)), ("b", None)], 22.0);
        assert!(!rooms_stable(&r, 0.5));
    }

    #[test]
    fn no_rooms_is_not_stable() {
        assert!(!rooms_stable(&BTreeMap::new(), 0.5));
    }

    fn cool_needs(temps: &[f64], on: bool) -> bool {
        let entries: Vec<(String, Option<f64>)> = temps
            .iter()
            .enumerate()
            .map(|(i, t)| (format!("r{i}"), Some(*t)))
            .collect();
        let refs: Vec<(&str, Option<f64>)> =
            entries.iter().map(|(n, t)| (n.as_str(), *t)).collect();
        needs_unit(
            &rooms(&refs, 22.0),
            HvacMode::Cool,
            Temperature::from_celsius(22.0),
            0.5,
            1.0,
            2.0,
            on,
        )
    }

    #[test]
    fn cool_off_unit_stays_off_below_on_threshold() {
        assert!(!cool_needs(&[22.9], false));
    }

    #[test]
    fn cool_off_unit_turns_on_above_threshold() {
        assert!(cool_needs(&[23.1], false));
    }

    #[test]
    fn cool_running_unit_stays_on_while_a_room_is_warm() {
        // avg 20.5 is past the off threshold but one room is still above target
        assert!(cool_needs(&[18.5, 22.5], true));
    }

    #[test]
    fn cool_running_unit_turns_off_when_all_rooms_cooled() {
        assert!(!cool_needs(&[18.8, 21.0], true));
    }

    #[test]
    fn heat_mode_mirrors_hysteresis() {
        let r = rooms(&[("a", Some(21.1))], 22.0);
        let t = Temperature::from_celsius(22.0);
        assert!(!needs_unit(&r, HvacMode::Heat, t, 0.5, 1.0, 2.0, false));
        let r = rooms(&[("a", Some(20.5))], 22.0);
        assert!(needs_unit(&r, HvacMode::Heat, t, 0.5, 1.0, 2.0, false));
        // warm on average, but one room still cold: stay on
        let r = rooms(&[("a", Some(25.5)), ("b", Some(21.5))], 22.0);
        assert!(needs_unit(&r, HvacMode::Heat, t, 0.5, 1.0, 2.0, true));
        let r = rooms(&[("a", Some(25.5)), ("b", Some(23.0))], 22.0);
        assert!(!needs_unit(&r, HvacMode::Heat, t, 0.5, 1.0, 2.0, true));
    }

    #[test]
    fn auto_mode_uses_plain_deadband() {
        let t = Temperature::from_celsius(22.0);
        let r = rooms(&[("a", Some(22.4))], 22.0);
        assert!(!needs_unit(&r, HvacMode::Auto, t, 0.5, 1.0, 2.0, false));
        let r = rooms(&[("a", Some(22.6))], 22.0);
        assert!(needs_unit(&r, HvacMode::Auto, t, 0.5, 1.0, 2.0, false));
    }

    #[test]
    fn no_readings_means_unit_not_needed() {
        let r = rooms(&[("a", None)], 22.0);
        let t = Temperature::from_celsius(22.0);
        assert!(!needs_unit(&r, HvacMode::Cool, t, 0.5, 1.0, 2.0, true));
    }

    #[test]
    fn fan_low_at_equilibrium_boundary() {
        // spread exactly 1.0, mean deviation exactly 0.5
        let r = rooms(&[("a", Some(22.0)), ("b", Some(23.0))], 22.0);
        let tier = determine_fan_tier(
            &r,
            HvacMode::Cool,
            Temperature::from_celsius(22.0),
            FanThresholds::default(),
        );
        assert_eq!(tier, FanSpeed::Low);
    }

    #[test]
    fn fan_high_at_exact_high_threshold() {
        // mean deviation exactly 2.5, spread wide enough to skip equilibrium
        let r = rooms(&[("a", Some(23.5)), ("b", Some(25.5))], 22.0);
        let tier = determine_fan_tier(
            &r,
            HvacMode::Cool,
            Temperature::from_celsius(22.0),
            FanThresholds::default(),
        );
        assert_eq!(tier, FanSpeed::High);
    }

    #[test]
    fn fan_low_on_cool_overshoot() {
        let r = rooms(&[("a", Some(20.0)), ("b", Some(21.8))], 22.0);
        let tier = determine_fan_tier(
            &r,
            HvacMode::Cool,
            Temperature::from_celsius(22.0),
            FanThresholds::default(),
        );
        assert_eq!(tier, FanSpeed::Low);
    }

    #[test]
    fn fan_medium_on_moderate_cooling() {
        let r = rooms(&[("a", Some(23.0)), ("b", Some(24.5))], 22.0);
        let tier = determine_fan_tier(
            &r,
            HvacMode::Cool,
            Temperature::from_celsius(22.0),
            FanThresholds::default(),
        );
        assert_eq!(tier, FanSpeed::Medium);
    }

    #[test]
    fn fan_high_in_auto_on_large_spread() {
        let r = rooms(&[("a", Some(20.0)), ("b", Some(23.5))], 22.0);
        let tier = determine_fan_tier(
            &r,
            HvacMode::Auto,
            Temperature::from_celsius(22.0),
            FanThresholds::default(),
        );
        assert_eq!(tier, FanSpeed::High);
    }

    #[test]
    fn fan_defaults_to_medium_without_readings() {
        let r = rooms(&[("a", None)], 22.0);
        let tier = determine_fan_tier(
            &r,
            HvacMode::Cool,
            Temperature::from_celsius(22.0),
            FanThresholds::default(),
        );
        assert_eq!(tier, FanSpeed::Medium);
    }
}
