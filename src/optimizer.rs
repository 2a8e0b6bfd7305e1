use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::advisor::{AdvisoryModel, advisor_for};
use crate::control::{self, FanThresholds};
use crate::host::{CommandDispatcher, StateStore};
use crate::logger::{TranscriptLogger, TranscriptMode};
use crate::protocol::{self, OvershootTiers};
use crate::schedule::resolve_schedule;
use crate::types::{
    COVER_FULLY_OPEN, FanSpeed, HvacMode, MainUnitState, OptimizationResult, Provider,
    Recommendations, RoomConfig, RoomState, Schedule, Temperature, humidity_from_reading,
};
use crate::weather;
use crate::{Error, Result};

pub const DEFAULT_TARGET_TEMPERATURE: f64 = 22.0;
pub const DEFAULT_DEADBAND: f64 = 0.5;
pub const DEFAULT_TURN_ON_THRESHOLD: f64 = 1.0;
pub const DEFAULT_TURN_OFF_THRESHOLD: f64 = 2.0;
pub const DEFAULT_ADVISORY_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(120);

/// Setpoint changes smaller than this are ignored to avoid actuator chatter.
const SETPOINT_EPSILON: f64 = 0.5;

pub struct OptimizerBuilder {
    store: Arc<dyn StateStore>,
    dispatcher: Arc<dyn CommandDispatcher>,
    advisor: Option<Box<dyn AdvisoryModel>>,
    provider: Option<(Provider, String)>,
    model: Option<String>,
    rooms: Vec<RoomConfig>,
    target_temperature: f64,
    hvac_mode: HvacMode,
    deadband: f64,
    turn_on_threshold: f64,
    turn_off_threshold: f64,
    fan_thresholds: FanThresholds,
    overshoot_tiers: OvershootTiers,
    main_climate_entity: Option<String>,
    main_fan_entity: Option<String>,
    auto_control_main_unit: bool,
    auto_control_setpoint: bool,
    humidity_control: bool,
    notifications: bool,
    room_overrides: HashMap<String, bool>,
    weather_adjustment: bool,
    weather_entity: Option<String>,
    outdoor_sensor: Option<String>,
    weather_influence: f64,
    scheduling: bool,
    schedules: Vec<Schedule>,
    advisory_interval: Duration,
    startup_grace: Duration,
    transcript: Option<(TranscriptMode, String)>,
}

impl OptimizerBuilder {
    pub fn new(store: Arc<dyn StateStore>, dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            advisor: None,
            provider: None,
            model: None,
            rooms: Vec::new(),
            target_temperature: DEFAULT_TARGET_TEMPERATURE,
            hvac_mode: HvacMode::Cool,
            deadband: DEFAULT_DEADBAND,
            turn_on_threshold: DEFAULT_TURN_ON_THRESHOLD,
            turn_off_threshold: DEFAULT_TURN_OFF_THRESHOLD,
            fan_thresholds: FanThresholds::default(),
            overshoot_tiers: OvershootTiers::default(),
            main_climate_entity: None,
            main_fan_entity: None,
            auto_control_main_unit: false,
            auto_control_setpoint: false,
            humidity_control: false,
            notifications: true,
            room_overrides: HashMap::new(),
            weather_adjustment: false,
            weather_entity: None,
            outdoor_sensor: None,
            weather_influence: 1.0,
            scheduling: false,
            schedules: Vec::new(),
            advisory_interval: DEFAULT_ADVISORY_INTERVAL,
            startup_grace: DEFAULT_STARTUP_GRACE,
            transcript: None,
        }
    }

    /// Select an advisory backend by provider and API key.
    pub fn provider(mut self, provider: Provider, api_key: impl Into<String>) -> Self {
        self.provider = Some((provider, api_key.into()));
        self
    }

    /// Override the provider's default model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Supply a prebuilt advisory client instead of provider credentials.
    pub fn advisor(mut self, advisor: Box<dyn AdvisoryModel>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn room(mut self, room: RoomConfig) -> Self {
        self.rooms.push(room);
        self
    }

    pub fn rooms(mut self, rooms: impl IntoIterator<Item = RoomConfig>) -> Self {
        self.rooms.extend(rooms);
        self
    }

    pub fn target_temperature(mut self, celsius: f64) -> Self {
        self.target_temperature = celsius;
        self
    }

    pub fn hvac_mode(mut self, mode: HvacMode) -> Self {
        self.hvac_mode = mode;
        self
    }

    pub fn deadband(mut self, celsius: f64) -> Self {
        self.deadband = celsius;
        self
    }

    pub fn turn_on_threshold(mut self, celsius: f64) -> Self {
        self.turn_on_threshold = celsius;
        self
    }

    pub fn turn_off_threshold(mut self, celsius: f64) -> Self {
        self.turn_off_threshold = celsius;
        self
    }

    pub fn fan_thresholds(mut self, thresholds: FanThresholds) -> Self {
        self.fan_thresholds = thresholds;
        self
    }

    pub fn overshoot_tiers(mut self, tiers: OvershootTiers) -> Self {
        self.overshoot_tiers = tiers;
        self
    }

    pub fn main_climate_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.main_climate_entity = Some(entity_id.into());
        self
    }

    pub fn main_fan_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.main_fan_entity = Some(entity_id.into());
        self
    }

    /// Let the optimizer switch the main unit on and off (4.8).
    pub fn auto_control_main_unit(mut self, enabled: bool) -> Self {
        self.auto_control_main_unit = enabled;
        self
    }

    /// Let the advisory service recommend the main unit setpoint.
    pub fn auto_control_setpoint(mut self, enabled: bool) -> Self {
        self.auto_control_setpoint = enabled;
        self
    }

    /// Include humidity in prompts and allow dehumidify-mode suggestions.
    pub fn humidity_control(mut self, enabled: bool) -> Self {
        self.humidity_control = enabled;
        self
    }

    pub fn notifications(mut self, enabled: bool) -> Self {
        self.notifications = enabled;
        self
    }

    /// Per-room advisory-control override; `false` excludes the room from
    /// actuation. Keys are validated against the room list at build time.
    pub fn room_override(mut self, room: impl Into<String>, enabled: bool) -> Self {
        self.room_overrides.insert(room.into(), enabled);
        self
    }

    pub fn enable_weather_adjustment(mut self, enabled: bool) -> Self {
        self.weather_adjustment = enabled;
        self
    }

    pub fn weather_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.weather_entity = Some(entity_id.into());
        self
    }

    pub fn outdoor_sensor(mut self, entity_id: impl Into<String>) -> Self {
        self.outdoor_sensor = Some(entity_id.into());
        self
    }

    pub fn weather_influence(mut self, influence: f64) -> Self {
        self.weather_influence = influence;
        self
    }

    pub fn enable_scheduling(mut self, enabled: bool) -> Self {
        self.scheduling = enabled;
        self
    }

    pub fn schedules(mut self, schedules: impl IntoIterator<Item = Schedule>) -> Self {
        self.schedules.extend(schedules);
        self
    }

    /// Minimum interval between advisory calls, independent of how often the
    /// host polls `optimize`.
    pub fn advisory_interval(mut self, interval: Duration) -> Self {
        self.advisory_interval = interval;
        self
    }

    /// Window after startup during which no-data notifications are suppressed.
    pub fn startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn transcript_log(mut self, mode: TranscriptMode, path: impl Into<String>) -> Self {
        self.transcript = Some((mode, path.into()));
        self
    }

    pub fn build(self) -> Result<Optimizer> {
        if !matches!(
            self.hvac_mode,
            HvacMode::Cool | HvacMode::Heat | HvacMode::Auto
        ) {
            return Err(Error::InvalidConfig(
                "operating mode must be cool, heat or auto".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for room in &self.rooms {
            if !seen.insert(room.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate room name: {}",
                    room.name
                )));
            }
        }
        for name in self.room_overrides.keys() {
            if !seen.contains(name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "override references unknown room: {name}"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.weather_influence) {
            return Err(Error::InvalidConfig(format!(
                "weather influence must be within [0, 1], got {}",
                self.weather_influence
            )));
        }

        if self.turn_off_threshold <= self.turn_on_threshold {
            warn!(
                on = self.turn_on_threshold,
                off = self.turn_off_threshold,
                "turn-off threshold does not exceed turn-on threshold; the unit may cycle rapidly"
            );
        }

        let advisor = match (self.advisor, &self.provider) {
            (Some(advisor), _) => advisor,
            (None, Some((provider, api_key))) => {
                advisor_for(*provider, api_key, self.model.as_deref())
            }
            (None, None) => {
                return Err(Error::InvalidConfig(
                    "an advisory provider or client is required".to_string(),
                ));
            }
        };

        let logger = match self.transcript {
            Some((mode, path)) => Some(TranscriptLogger::new(mode, &path)?),
            None => None,
        };

        Ok(Optimizer {
            store: self.store,
            dispatcher: self.dispatcher,
            advisor,
            rooms: self.rooms,
            target_temperature: self.target_temperature,
            hvac_mode: self.hvac_mode,
            deadband: self.deadband,
            turn_on_threshold: self.turn_on_threshold,
            turn_off_threshold: self.turn_off_threshold,
            fan_thresholds: self.fan_thresholds,
            overshoot_tiers: self.overshoot_tiers,
            main_climate_entity: self.main_climate_entity,
            main_fan_entity: self.main_fan_entity,
            auto_control_main_unit: self.auto_control_main_unit,
            auto_control_setpoint: self.auto_control_setpoint,
            humidity_control: self.humidity_control,
            notifications: self.notifications,
            room_overrides: self.room_overrides,
            weather_adjustment: self.weather_adjustment,
            weather_entity: self.weather_entity,
            outdoor_sensor: self.outdoor_sensor,
            weather_influence: self.weather_influence,
            scheduling: self.scheduling,
            schedules: self.schedules,
            advisory_interval: self.advisory_interval,
            startup_grace: self.startup_grace,
            logger,
            started: Instant::now(),
            last_error: None,
            error_count: 0,
            last_recommendations: None,
            last_fan_speed: None,
            last_advisory: None,
            last_advisory_text: None,
            last_schedule: None,
        })
    }
}

/// The cycle orchestrator. Owns all cross-cycle state; the host invokes
/// [`Optimizer::optimize`] on a timer and reads the returned record.
pub struct Optimizer {
    store: Arc<dyn StateStore>,
    dispatcher: Arc<dyn CommandDispatcher>,
    advisor: Box<dyn AdvisoryModel>,
    rooms: Vec<RoomConfig>,
    target_temperature: f64,
    hvac_mode: HvacMode,
    deadband: f64,
    turn_on_threshold: f64,
    turn_off_threshold: f64,
    fan_thresholds: FanThresholds,
    overshoot_tiers: OvershootTiers,
    main_climate_entity: Option<String>,
    main_fan_entity: Option<String>,
    auto_control_main_unit: bool,
    auto_control_setpoint: bool,
    humidity_control: bool,
    notifications: bool,
    room_overrides: HashMap<String, bool>,
    weather_adjustment: bool,
    weather_entity: Option<String>,
    outdoor_sensor: Option<String>,
    weather_influence: f64,
    scheduling: bool,
    schedules: Vec<Schedule>,
    advisory_interval: Duration,
    startup_grace: Duration,
    logger: Option<TranscriptLogger>,

    started: Instant,
    last_error: Option<String>,
    error_count: u32,
    last_recommendations: Option<Recommendations>,
    last_fan_speed: Option<FanSpeed>,
    last_advisory: Option<Instant>,
    last_advisory_text: Option<String>,
    last_schedule: Option<String>,
}

impl Optimizer {
    pub fn builder(
        store: Arc<dyn StateStore>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> OptimizerBuilder {
        OptimizerBuilder::new(store, dispatcher)
    }

    /// Name of the schedule that was active on the most recent cycle.
    pub fn active_schedule(&self) -> Option<&str> {
        self.last_schedule.as_deref()
    }

    /// Run one optimization cycle.
    ///
    /// Never fails: sensor problems degrade to missing readings, advisory
    /// problems fall back to the cached recommendations, actuation problems
    /// are recorded and notified. The worst outcome is a degraded result
    /// with an elevated `error_count`.
    pub async fn optimize(&mut self) -> OptimizationResult {
        let cycle_id = Uuid::new_v4().to_string();
        let now = Local::now().naive_local();

        // Effective target: schedule override first, weather nudge on top.
        let mut effective = Temperature::from_celsius(self.target_temperature);
        let mut active_schedule = None;
        if self.scheduling {
            if let Some(schedule) = resolve_schedule(&self.schedules, now) {
                info!(
                    schedule = %schedule.name,
                    schedule_target = schedule.target_temperature,
                    "schedule override active"
                );
                effective = Temperature::from_celsius(schedule.target_temperature);
                active_schedule = Some(schedule.name.clone());
            }
            self.last_schedule = active_schedule.clone();
        }

        let mut weather_adjustment = 0.0;
        let mut outdoor = None;
        if self.weather_adjustment {
            outdoor = weather::outdoor_temperature(
                self.store.as_ref(),
                self.outdoor_sensor.as_deref(),
                self.weather_entity.as_deref(),
            );
            if let Some(o) = outdoor {
                let adjusted = weather::adjusted_target(effective, o, self.weather_influence);
                weather_adjustment = adjusted.celsius() - effective.celsius();
                if weather_adjustment != 0.0 {
                    info!(
                        outdoor = o.celsius(),
                        adjustment = weather_adjustment,
                        adjusted_target = adjusted.celsius(),
                        "weather-adjusted target"
                    );
                }
                effective = adjusted;
            }
        }

        let room_states = self.collect_room_states(effective);

        let main_unit = match self.main_climate_entity.as_deref() {
            Some(entity_id) => self.read_main_unit(entity_id),
            None => None,
        };
        let running = main_unit.as_ref().is_some_and(MainUnitState::is_running);

        let needs = control::needs_unit(
            &room_states,
            self.hvac_mode,
            effective,
            self.deadband,
            self.turn_on_threshold,
            self.turn_off_threshold,
            running,
        );
        if self.auto_control_main_unit && self.main_climate_entity.is_some() {
            self.control_main_unit(needs, main_unit.as_ref()).await;
        }

        let have_reading = room_states
            .values()
            .any(|r| r.current_temperature.is_some());
        if !have_reading {
            let in_grace = self.started.elapsed() < self.startup_grace;
            if in_grace {
                info!(
                    "no valid temperature readings during startup grace, sensors may still be initializing"
                );
            } else {
                warn!("no valid temperature readings available, skipping optimization");
                self.notify(
                    "No Temperature Data",
                    "No valid temperature readings from any room sensor. Check sensor availability.",
                )
                .await;
            }
            return OptimizationResult {
                cycle_id,
                completed_at: Utc::now(),
                room_states,
                recommendations: Recommendations::default(),
                advisory_text: None,
                main_unit,
                main_fan_speed: None,
                main_unit_running: running,
                needs_unit: needs,
                last_error: (!in_grace).then(|| "no valid temperature data".to_string()),
                error_count: if in_grace { 0 } else { self.error_count },
                active_schedule,
                effective_target: effective,
                base_target: Temperature::from_celsius(self.target_temperature),
                weather_adjustment,
                outdoor_temperature: outdoor,
            };
        }

        // Advisory gate: stable rooms, a not-yet-elapsed interval, or a
        // configured-but-idle unit all reuse the cache instead of paying for
        // a fresh call.
        let stable = control::rooms_stable(&room_states, self.deadband);
        let mut should_run = self
            .last_advisory
            .is_none_or(|t| t.elapsed() >= self.advisory_interval);
        if stable && self.last_recommendations.is_some() {
            info!(
                deadband = self.deadband,
                "all rooms stable, reusing cached recommendations"
            );
            should_run = false;
        }

        let mut recommendations = self.last_recommendations.clone().unwrap_or_default();
        let mut fan_speed = self.last_fan_speed;
        let mut fresh = false;

        if self.main_climate_entity.is_none() || running {
            if should_run {
                info!(
                    first_run = self.last_advisory.is_none(),
                    "running advisory optimization"
                );
                let (recs, was_fresh) = self
                    .fetch_recommendations(&room_states, effective, &cycle_id)
                    .await;
                recommendations = recs;
                fresh = was_fresh;

                // Successful advisory call clears the sticky error state;
                // actuation failures below then accumulate on a clean slate.
                if fresh && !recommendations.is_empty() {
                    self.last_error = None;
                    self.error_count = 0;
                }

                self.apply_recommendations(&recommendations, &cycle_id).await;
                if self.main_fan_entity.is_some() {
                    fan_speed = Some(self.set_main_fan(&room_states, effective, &cycle_id).await);
                }

                if !recommendations.is_empty() {
                    self.last_recommendations = Some(recommendations.clone());
                }
                self.last_fan_speed = fan_speed;
                self.last_advisory = Some(Instant::now());
            } else {
                debug!(
                    cached = self.last_recommendations.is_some(),
                    "data collection only, advisory not due"
                );
            }
        } else {
            info!("main unit not running, reusing cached recommendations");
        }

        if let Some(logger) = self.logger.as_mut() {
            logger.log_cycle(&cycle_id, room_states.len(), fresh, self.error_count);
        }

        info!(
            rooms = room_states.len(),
            recommendations = recommendations.rooms.len(),
            fan = fan_speed.map(|f| f.as_str()),
            running,
            "optimization cycle complete"
        );

        OptimizationResult {
            cycle_id,
            completed_at: Utc::now(),
            room_states,
            recommendations,
            advisory_text: self.last_advisory_text.clone(),
            main_unit,
            main_fan_speed: fan_speed,
            main_unit_running: running,
            needs_unit: needs,
            last_error: self.last_error.clone(),
            error_count: self.error_count,
            active_schedule,
            effective_target: effective,
            base_target: Temperature::from_celsius(self.target_temperature),
            weather_adjustment,
            outdoor_temperature: outdoor,
        }
    }

    /// Build the per-room snapshots. Never fails: missing or invalid sensors
    /// degrade the affected fields only.
    fn collect_room_states(&self, target: Temperature) -> BTreeMap<String, RoomState> {
        let mut states = BTreeMap::new();
        for room in &self.rooms {
            let current_temperature = match self.store.get(&room.temperature_sensor) {
                Some(state) => Temperature::from_reading(&state.state, state.unit()),
                None => {
                    warn!(
                        room = %room.name,
                        sensor = %room.temperature_sensor,
                        "temperature sensor not found"
                    );
                    None
                }
            };

            let current_humidity = room.humidity_sensor.as_deref().and_then(|sensor| {
                self.store
                    .get(sensor)
                    .and_then(|s| humidity_from_reading(&s.state))
            });

            let cover_position = self
                .store
                .get(&room.cover_entity)
                .and_then(|s| s.attr_f64("current_position"))
                .map(|p| (p as i64).clamp(0, 100) as u8)
                .unwrap_or(COVER_FULLY_OPEN);

            states.insert(
                room.name.clone(),
                RoomState {
                    current_temperature,
                    current_humidity,
                    cover_position,
                    target_temperature: target,
                    temperature_sensor: room.temperature_sensor.clone(),
                    cover_entity: room.cover_entity.clone(),
                },
            );
        }
        states
    }

    fn read_main_unit(&self, entity_id: &str) -> Option<MainUnitState> {
        let state = self.store.get(entity_id)?;
        Some(MainUnitState {
            setpoint: state.attr_f64("temperature"),
            current_temperature: state.attr_f64("current_temperature"),
            mode: state.attr_str("hvac_mode").map(str::to_string),
            action: state.attr_str("hvac_action").map(str::to_string),
            supported_modes: state.attr_str_list("hvac_modes"),
            state: state.state,
        })
    }

    /// Call the advisory service and validate its reply. Returns the
    /// recommendations to use this cycle plus whether they are fresh; on any
    /// failure the cached set comes back instead (empty only if there has
    /// never been a successful call).
    async fn fetch_recommendations(
        &mut self,
        rooms: &BTreeMap<String, RoomState>,
        target: Temperature,
        cycle_id: &str,
    ) -> (Recommendations, bool) {
        let prompt = protocol::build_prompt(
            self.hvac_mode,
            target,
            self.deadband,
            rooms,
            self.overshoot_tiers,
            self.humidity_control,
            self.auto_control_setpoint && self.main_climate_entity.is_some(),
        );

        match self.advisor.generate(&prompt).await {
            Ok(text) => {
                if let Some(logger) = self.logger.as_mut() {
                    logger.log_exchange(cycle_id, &prompt, &text);
                }
                self.last_advisory_text = Some(text.clone());
                match protocol::parse_recommendations(&text, rooms) {
                    Some(recs) => {
                        debug!(rooms = recs.rooms.len(), "validated advisory recommendations");
                        (recs, true)
                    }
                    None => {
                        self.record_advisory_error(
                            "advisory reply held no parsable JSON object".to_string(),
                        );
                        (self.last_recommendations.clone().unwrap_or_default(), false)
                    }
                }
            }
            Err(e) => {
                let message = format!("advisory call failed: {e}");
                if let Some(logger) = self.logger.as_mut() {
                    logger.log_failure(cycle_id, &message);
                }
                self.record_advisory_error(message);
                (self.last_recommendations.clone().unwrap_or_default(), false)
            }
        }
    }

    fn record_advisory_error(&mut self, message: String) {
        error!("{message}");
        self.last_error = Some(message);
        self.error_count += 1;
        if self.last_recommendations.is_some() {
            warn!(
                error_count = self.error_count,
                "reusing last known recommendations"
            );
        }
    }

    /// Apply a validated recommendation set: setpoint first, then unit mode,
    /// then per-room cover positions.
    async fn apply_recommendations(&mut self, recs: &Recommendations, cycle_id: &str) {
        if let Some(setpoint) = recs.ac_temperature
            && self.auto_control_setpoint
            && self.main_climate_entity.is_some()
        {
            self.set_unit_setpoint(setpoint, cycle_id).await;
        }

        if let Some(mode) = recs.hvac_mode
            && self.humidity_control
            && self.main_climate_entity.is_some()
        {
            self.set_unit_mode(mode, cycle_id).await;
        }

        let positions: Vec<(String, u8)> =
            recs.rooms.iter().map(|(n, p)| (n.clone(), *p)).collect();
        for (room, position) in positions {
            if self.room_overrides.get(&room) == Some(&false) {
                info!(room = %room, "advisory control disabled for room, skipping");
                continue;
            }
            let Some(cover_entity) = self
                .rooms
                .iter()
                .find(|r| r.name == room)
                .map(|r| r.cover_entity.clone())
            else {
                continue;
            };

            match self.store.get(&cover_entity) {
                None => {
                    warn!(room = %room, entity = %cover_entity, "cover entity not found, skipping");
                    continue;
                }
                Some(state) if state.is_unavailable() => {
                    warn!(
                        room = %room,
                        entity = %cover_entity,
                        state = %state.state,
                        "cover entity unavailable, skipping"
                    );
                    continue;
                }
                Some(_) => {}
            }

            let data = json!({"entity_id": cover_entity.as_str(), "position": position});
            match self
                .dispatcher
                .call("cover", "set_cover_position", data.clone(), true)
                .await
            {
                Ok(()) => {
                    info!(room = %room, entity = %cover_entity, position, "set cover position");
                    if let Some(logger) = self.logger.as_mut() {
                        logger.log_command(cycle_id, "cover", "set_cover_position", &data);
                    }
                }
                Err(e) => {
                    let message = format!("cover control failed for {room}: {e}");
                    error!("{message}");
                    self.last_error = Some(message);
                    self.error_count += 1;
                    self.notify(
                        "Cover Control Error",
                        &format!("Failed to set cover position for {room}: {e}"),
                    )
                    .await;
                }
            }
        }
    }

    async fn set_unit_setpoint(&mut self, setpoint: f64, cycle_id: &str) {
        let Some(entity) = self.main_climate_entity.clone() else {
            return;
        };
        let Some(state) = self.store.get(&entity) else {
            warn!(entity = %entity, "main climate entity not found");
            return;
        };
        if let Some(current) = state.attr_f64("temperature")
            && (current - setpoint).abs() < SETPOINT_EPSILON
        {
            debug!(current, setpoint, "setpoint change below threshold, skipping");
            return;
        }

        info!(entity = %entity, setpoint, "setting main unit setpoint");
        let data = json!({"entity_id": entity.as_str(), "temperature": setpoint});
        match self
            .dispatcher
            .call("climate", "set_temperature", data.clone(), true)
            .await
        {
            Ok(()) => {
                if let Some(logger) = self.logger.as_mut() {
                    logger.log_command(cycle_id, "climate", "set_temperature", &data);
                }
            }
            Err(e) => {
                let message = format!("setpoint control failed: {e}");
                error!("{message}");
                self.last_error = Some(message);
                self.error_count += 1;
            }
        }
    }

    async fn set_unit_mode(&mut self, mode: HvacMode, cycle_id: &str) {
        let Some(entity) = self.main_climate_entity.clone() else {
            return;
        };
        let Some(state) = self.store.get(&entity) else {
            warn!(entity = %entity, "main climate entity not found");
            return;
        };
        let supported = state.attr_str_list("hvac_modes");
        if !supported.iter().any(|m| m == mode.as_str()) {
            warn!(
                entity = %entity,
                mode = mode.as_str(),
                "recommended mode not advertised by unit, skipping"
            );
            return;
        }
        if state.attr_str("hvac_mode") == Some(mode.as_str()) {
            debug!(mode = mode.as_str(), "unit already in recommended mode");
            return;
        }

        info!(entity = %entity, mode = mode.as_str(), "switching main unit mode");
        let data = json!({"entity_id": entity.as_str(), "hvac_mode": mode.as_str()});
        match self
            .dispatcher
            .call("climate", "set_hvac_mode", data.clone(), true)
            .await
        {
            Ok(()) => {
                if let Some(logger) = self.logger.as_mut() {
                    logger.log_command(cycle_id, "climate", "set_hvac_mode", &data);
                }
            }
            Err(e) => {
                let message = format!("mode control failed: {e}");
                error!("{message}");
                self.last_error = Some(message);
                self.error_count += 1;
                self.notify(
                    "Mode Control Error",
                    &format!("Failed to switch main unit mode: {e}"),
                )
                .await;
            }
        }
    }

    /// Derive the fan tier and push it to the main fan entity. The tier is
    /// returned even when the entity is missing or the command fails, so the
    /// cycle record reflects the decision that was made.
    async fn set_main_fan(
        &mut self,
        rooms: &BTreeMap<String, RoomState>,
        target: Temperature,
        cycle_id: &str,
    ) -> FanSpeed {
        let tier = control::determine_fan_tier(rooms, self.hvac_mode, target, self.fan_thresholds);
        let Some(entity) = self.main_fan_entity.clone() else {
            return tier;
        };

        match self.store.get(&entity) {
            None => {
                warn!(entity = %entity, "main fan entity not found");
                return tier;
            }
            Some(state) if state.is_unavailable() => {
                warn!(
                    entity = %entity,
                    state = %state.state,
                    "main fan entity unavailable, skipping control"
                );
                return tier;
            }
            Some(_) => {}
        }

        let (domain, service, data) = if entity.starts_with("climate.") {
            (
                "climate",
                "set_fan_mode",
                json!({"entity_id": entity.as_str(), "fan_mode": tier.as_str()}),
            )
        } else {
            (
                "fan",
                "set_preset_mode",
                json!({"entity_id": entity.as_str(), "preset_mode": tier.as_str()}),
            )
        };
        match self.dispatcher.call(domain, service, data.clone(), true).await {
            Ok(()) => {
                info!(entity = %entity, tier = tier.as_str(), "set main fan speed");
                if let Some(logger) = self.logger.as_mut() {
                    logger.log_command(cycle_id, domain, service, &data);
                }
            }
            Err(e) => {
                error!("failed to set main fan speed: {e}");
                self.notify("Main Fan Error", &format!("Failed to set main fan speed: {e}"))
                    .await;
            }
        }
        tier
    }

    /// Toggle the main unit per the hysteresis decision. `auto` maps to
    /// `cool` for the actual turn-on command.
    async fn control_main_unit(&mut self, needs: bool, unit: Option<&MainUnitState>) {
        let Some(unit) = unit else { return };
        let Some(entity) = self.main_climate_entity.clone() else {
            return;
        };
        let current = unit.mode.clone();

        if needs {
            if current.as_deref() == Some("off") {
                let mode = if self.hvac_mode == HvacMode::Auto {
                    HvacMode::Cool
                } else {
                    self.hvac_mode
                };
                info!(mode = mode.as_str(), "turning on main unit");
                let data = json!({"entity_id": entity.as_str(), "hvac_mode": mode.as_str()});
                match self
                    .dispatcher
                    .call("climate", "set_hvac_mode", data, true)
                    .await
                {
                    Ok(()) => {
                        self.notify(
                            "Main Unit On",
                            &format!("Turned on the main unit in {} mode", mode.as_str()),
                        )
                        .await;
                    }
                    Err(e) => {
                        let message = format!("main unit control failed: {e}");
                        error!("{message}");
                        self.last_error = Some(message);
                        self.error_count += 1;
                        self.notify(
                            "Main Unit Control Error",
                            &format!("Failed to control main unit: {e}"),
                        )
                        .await;
                    }
                }
            }
        } else if let Some(mode) = current.as_deref()
            && mode != "off"
        {
            info!("turning off main unit, all rooms at target");
            let data = json!({"entity_id": entity.as_str(), "hvac_mode": "off"});
            match self
                .dispatcher
                .call("climate", "set_hvac_mode", data, true)
                .await
            {
                Ok(()) => {
                    self.notify(
                        "Main Unit Off",
                        "Turned off the main unit (rooms at target temperature)",
                    )
                    .await;
                }
                Err(e) => {
                    let message = format!("main unit control failed: {e}");
                    error!("{message}");
                    self.last_error = Some(message);
                    self.error_count += 1;
                    self.notify(
                        "Main Unit Control Error",
                        &format!("Failed to control main unit: {e}"),
                    )
                    .await;
                }
            }
        }
    }

    async fn notify(&self, title: &str, message: &str) {
        if !self.notifications {
            return;
        }
        let data = json!({
            "title": format!("Aircon Advisor: {title}"),
            "message": message,
            "notification_id": format!(
                "aircon_advisor_{}",
                title.to_lowercase().replace(' ', "_")
            ),
        });
        if let Err(e) = self
            .dispatcher
            .call("persistent_notification", "create", data, false)
            .await
        {
            error!("failed to send notification: {e}");
        }
    }
}
