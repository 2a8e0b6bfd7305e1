#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use aircon_advisor::{CommandDispatcher, EntityState, Error, Result, StateStore};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub domain: String,
    pub service: String,
    pub data: Value,
    pub wait: bool,
}

/// In-memory stand-in for the host runtime: a state registry plus a command
/// bus that records every call and can be told to fail specific services.
#[derive(Default)]
pub struct TestHost {
    states: Mutex<HashMap<String, (String, Value)>>,
    calls: Mutex<Vec<RecordedCall>>,
    fail_services: Mutex<HashSet<String>>,
}

impl TestHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_state(&self, entity_id: &str, state: &str, attributes: Value) {
        self.states.lock().unwrap().insert(
            entity_id.to_string(),
            (state.to_string(), attributes),
        );
    }

    pub fn remove_state(&self, entity_id: &str) {
        self.states.lock().unwrap().remove(entity_id);
    }

    pub fn fail_service(&self, domain: &str, service: &str) {
        self.fail_services
            .lock()
            .unwrap()
            .insert(format!("{domain}.{service}"));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, domain: &str, service: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.domain == domain && c.service == service)
            .collect()
    }
}

impl StateStore for TestHost {
    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states
            .lock()
            .unwrap()
            .get(entity_id)
            .map(|(state, attributes)| EntityState {
                state: state.clone(),
                attributes: attributes.clone(),
            })
    }
}

#[async_trait]
impl CommandDispatcher for TestHost {
    async fn call(&self, domain: &str, service: &str, data: Value, wait: bool) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedCall {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
            wait,
        });
        if self
            .fail_services
            .lock()
            .unwrap()
            .contains(&format!("{domain}.{service}"))
        {
            return Err(Error::Command {
                domain: domain.to_string(),
                service: service.to_string(),
                message: "simulated dispatch failure".to_string(),
            });
        }
        Ok(())
    }
}
