use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sentinel states the host registry reports for entities with no usable
/// reading. Treated uniformly as "no reading", never as an error.
pub(crate) fn is_no_reading(raw: &str) -> bool {
    raw.is_empty() || matches!(raw, "unknown" | "unavailable" | "none")
}

/// Temperature stored as Celsius internally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f - 32.0) * (5.0 / 9.0))
    }

    /// Normalize a raw sensor reading into Celsius.
    ///
    /// Sentinel states and non-numeric values yield `None`. A unit that is
    /// neither Celsius nor Fahrenheit is warned about and assumed Celsius.
    pub fn from_reading(raw: &str, unit: Option<&str>) -> Option<Self> {
        if is_no_reading(raw) {
            return None;
        }
        let value: f64 = match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(raw, "temperature reading is not numeric");
                return None;
            }
        };
        match unit {
            Some("\u{00b0}F" | "fahrenheit" | "F") => Some(Self::from_fahrenheit(value)),
            Some("\u{00b0}C" | "celsius" | "C") | None => Some(Self::from_celsius(value)),
            Some(other) => {
                warn!(unit = other, "unrecognised temperature unit, assuming Celsius");
                Some(Self::from_celsius(value))
            }
        }
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    pub fn fahrenheit(&self) -> f64 {
        self.0 * (9.0 / 5.0) + 32.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Normalize a raw humidity reading (relative %, no unit conversion).
pub(crate) fn humidity_from_reading(raw: &str) -> Option<f64> {
    if is_no_reading(raw) {
        return None;
    }
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(raw, "humidity reading is not numeric");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Off,
    Cool,
    Heat,
    Dry,
    Auto,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Cool => "cool",
            HvacMode::Heat => "heat",
            HvacMode::Dry => "dry",
            HvacMode::Auto => "auto",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "off" => Some(HvacMode::Off),
            "cool" => Some(HvacMode::Cool),
            "heat" => Some(HvacMode::Heat),
            "dry" => Some(HvacMode::Dry),
            "auto" => Some(HvacMode::Auto),
            _ => None,
        }
    }
}

/// Central-unit fan tier derived from aggregate deviation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanSpeed::Low => "low",
            FanSpeed::Medium => "medium",
            FanSpeed::High => "high",
        }
    }
}

/// Advisory backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Claude,
    ChatGpt,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::ChatGpt => "chatgpt",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "claude" => Some(Provider::Claude),
            "chatgpt" => Some(Provider::ChatGpt),
            _ => None,
        }
    }
}

/// One entry of a schedule's day set: an explicit weekday or a symbolic group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayRule {
    All,
    Weekdays,
    Weekends,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayRule {
    pub fn matches(self, day: Weekday) -> bool {
        match self {
            DayRule::All => true,
            DayRule::Weekdays => !matches!(day, Weekday::Sat | Weekday::Sun),
            DayRule::Weekends => matches!(day, Weekday::Sat | Weekday::Sun),
            DayRule::Monday => day == Weekday::Mon,
            DayRule::Tuesday => day == Weekday::Tue,
            DayRule::Wednesday => day == Weekday::Wed,
            DayRule::Thursday => day == Weekday::Thu,
            DayRule::Friday => day == Weekday::Fri,
            DayRule::Saturday => day == Weekday::Sat,
            DayRule::Sunday => day == Weekday::Sun,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A named target-temperature override window.
///
/// `start` and `end` are wall-clock `"HH:MM"` strings, parsed at resolve time
/// so a malformed window skips that schedule without failing the cycle. A
/// window with `start > end` crosses midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    pub days: Vec<DayRule>,
    pub start: String,
    pub end: String,
    pub target_temperature: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Static per-room configuration, produced by the host's config store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    pub temperature_sensor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_sensor: Option<String>,
    pub cover_entity: String,
}

/// Default cover position when the actuator reports nothing usable.
pub const COVER_FULLY_OPEN: u8 = 100;

/// Per-room snapshot, rebuilt every cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RoomState {
    pub current_temperature: Option<Temperature>,
    pub current_humidity: Option<f64>,
    pub cover_position: u8,
    pub target_temperature: Temperature,
    pub temperature_sensor: String,
    pub cover_entity: String,
}

impl RoomState {
    /// Signed deviation from this cycle's target, if the room has a reading.
    pub fn deviation(&self) -> Option<f64> {
        self.current_temperature
            .map(|t| t.celsius() - self.target_temperature.celsius())
    }
}

/// Validated advisory output: clamped per-room cover positions plus the
/// optional central-unit setpoint and mode suggestions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recommendations {
    pub rooms: BTreeMap<String, u8>,
    pub ac_temperature: Option<f64>,
    pub hvac_mode: Option<HvacMode>,
}

impl Recommendations {
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty() && self.ac_temperature.is_none() && self.hvac_mode.is_none()
    }
}

/// Telemetry snapshot of the central climate unit.
#[derive(Debug, Clone, Serialize)]
pub struct MainUnitState {
    pub state: String,
    pub setpoint: Option<f64>,
    pub current_temperature: Option<f64>,
    pub mode: Option<String>,
    pub action: Option<String>,
    pub supported_modes: Vec<String>,
}

impl MainUnitState {
    /// Whether the unit is actually running: actively conditioning, or in any
    /// mode other than off/unavailable.
    pub fn is_running(&self) -> bool {
        if matches!(self.action.as_deref(), Some("cooling" | "heating")) {
            return true;
        }
        self.mode
            .as_deref()
            .is_some_and(|m| !matches!(m, "off" | "unavailable"))
    }
}

/// The record one optimization cycle produces, consumed by the host's
/// read-only telemetry adapters.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub cycle_id: String,
    pub completed_at: DateTime<Utc>,
    pub room_states: BTreeMap<String, RoomState>,
    pub recommendations: Recommendations,
    pub advisory_text: Option<String>,
    pub main_unit: Option<MainUnitState>,
    pub main_fan_speed: Option<FanSpeed>,
    pub main_unit_running: bool,
    pub needs_unit: bool,
    pub last_error: Option<String>,
    pub error_count: u32,
    pub active_schedule: Option<String>,
    pub effective_target: Temperature,
    pub base_target: Temperature,
    pub weather_adjustment: f64,
    pub outdoor_temperature: Option<Temperature>,
}

impl OptimizationResult {
    fn valid_temperatures(&self) -> impl Iterator<Item = f64> + '_ {
        self.room_states
            .values()
            .filter_map(|r| r.current_temperature.map(|t| t.celsius()))
    }

    pub fn average_temperature(&self) -> Option<f64> {
        let temps: Vec<f64> = self.valid_temperatures().collect();
        if temps.is_empty() {
            return None;
        }
        Some(temps.iter().sum::<f64>() / temps.len() as f64)
    }

    pub fn min_temperature(&self) -> Option<f64> {
        self.valid_temperatures().reduce(f64::min)
    }

    pub fn max_temperature(&self) -> Option<f64> {
        self.valid_temperatures().reduce(f64::max)
    }

    /// Max minus min across rooms with a reading.
    pub fn temperature_spread(&self) -> Option<f64> {
        Some(self.max_temperature()? - self.min_temperature()?)
    }

    /// Coarse status label for telemetry: which direction the system is
    /// working in, judged per room against a 0.5 deg C band.
    pub fn status(&self) -> &'static str {
        let mut any_hot = false;
        let mut any_cold = false;
        let mut any_reading = false;
        for room in self.room_states.values() {
            let Some(diff) = room.deviation() else { continue };
            any_reading = true;
            if diff > 0.5 {
                any_hot = true;
            } else if diff < -0.5 {
                any_cold = true;
            }
        }
        if !any_reading {
            return "no_data";
        }
        match (any_hot, any_cold) {
            (false, false) => "maintaining",
            (true, true) => "equalizing",
            (true, false) => "cooling",
            (false, true) => "heating",
        }
    }
}
