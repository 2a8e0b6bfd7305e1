//! Run one optimization cycle against a scripted in-memory host.
//!
//! Usage: cargo run --example cycle -- <api-key> [--chatgpt]
//!
//! Commands the cycle would issue are printed instead of being dispatched to
//! real actuators.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use aircon_advisor::{
    CommandDispatcher, EntityState, HvacMode, Optimizer, Provider, RoomConfig, StateStore,
};
use async_trait::async_trait;
use serde_json::{Value, json};

struct DemoHost {
    states: HashMap<String, (String, Value)>,
}

impl DemoHost {
    fn new() -> Self {
        let mut states = HashMap::new();
        states.insert(
            "sensor.living_temp".to_string(),
            ("24.6".to_string(), json!({"unit_of_measurement": "\u{00b0}C"})),
        );
        states.insert(
            "sensor.bedroom_temp".to_string(),
            ("21.2".to_string(), json!({"unit_of_measurement": "\u{00b0}C"})),
        );
        states.insert(
            "cover.living".to_string(),
            ("open".to_string(), json!({"current_position": 60})),
        );
        states.insert(
            "cover.bedroom".to_string(),
            ("open".to_string(), json!({"current_position": 40})),
        );
        states.insert(
            "climate.main".to_string(),
            (
                "cool".to_string(),
                json!({
                    "hvac_mode": "cool",
                    "hvac_action": "cooling",
                    "temperature": 22.0,
                    "hvac_modes": ["off", "cool", "heat", "dry"]
                }),
            ),
        );
        Self { states }
    }
}

impl StateStore for DemoHost {
    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.get(entity_id).map(|(state, attributes)| EntityState {
            state: state.clone(),
            attributes: attributes.clone(),
        })
    }
}

#[async_trait]
impl CommandDispatcher for DemoHost {
    async fn call(
        &self,
        domain: &str,
        service: &str,
        data: Value,
        _wait: bool,
    ) -> aircon_advisor::Result<()> {
        println!("-> {domain}.{service} {data}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> aircon_advisor::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let api_key = args.get(1).expect("usage: cycle <api-key> [--chatgpt]");
    let provider = if args.iter().any(|a| a == "--chatgpt") {
        Provider::ChatGpt
    } else {
        Provider::Claude
    };

    let host = Arc::new(DemoHost::new());

    let mut optimizer = Optimizer::builder(host.clone(), host.clone())
        .provider(provider, api_key.as_str())
        .room(RoomConfig {
            name: "Living Room".to_string(),
            temperature_sensor: "sensor.living_temp".to_string(),
            humidity_sensor: None,
            cover_entity: "cover.living".to_string(),
        })
        .room(RoomConfig {
            name: "Bedroom".to_string(),
            temperature_sensor: "sensor.bedroom_temp".to_string(),
            humidity_sensor: None,
            cover_entity: "cover.bedroom".to_string(),
        })
        .main_climate_entity("climate.main")
        .auto_control_setpoint(true)
        .hvac_mode(HvacMode::Cool)
        .target_temperature(22.0)
        .build()?;

    let result = optimizer.optimize().await;

    println!("\ncycle {} complete: {}", result.cycle_id, result.status());
    for (name, room) in &result.room_states {
        let reading = room
            .current_temperature
            .map(|t| t.to_string())
            .unwrap_or_else(|| "no reading".to_string());
        match result.recommendations.rooms.get(name) {
            Some(position) => println!("[{name}] {reading} -> cover {position}%"),
            None => println!("[{name}] {reading} -> no recommendation"),
        }
    }
    if let Some(avg) = result.average_temperature() {
        println!(
            "average {avg:.1}\u{00b0}C, spread {:.1}\u{00b0}C, unit running: {}",
            result.temperature_spread().unwrap_or(0.0),
            result.main_unit_running,
        );
    }
    if let Some(error) = result.last_error {
        eprintln!("cycle error: {error} (count {})", result.error_count);
    }

    Ok(())
}
