//! Interface boundary to the host home-automation runtime.
//!
//! The optimizer never talks to devices directly: it reads entity state from
//! the host's live registry and issues service calls through its dispatch
//! bus. Both are modelled as traits so tests (and other runtimes) can supply
//! in-memory implementations.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::types::is_no_reading;

/// A point-in-time view of one entity: its state string plus attributes.
#[derive(Debug, Clone)]
pub struct EntityState {
    pub state: String,
    pub attributes: Value,
}

impl EntityState {
    pub fn is_unavailable(&self) -> bool {
        is_no_reading(&self.state)
    }

    /// The entity's reported unit of measurement, if any.
    pub fn unit(&self) -> Option<&str> {
        self.attr_str("unit_of_measurement")
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// Numeric attribute, tolerating values the host reports as strings.
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if !is_no_reading(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String-array attribute (e.g. a climate unit's advertised modes).
    pub fn attr_str_list(&self, key: &str) -> Vec<String> {
        self.attributes
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Read access to the host's entity registry. Lookups are in-memory and
/// non-blocking; `None` means the entity is not known at all.
pub trait StateStore: Send + Sync {
    fn get(&self, entity_id: &str) -> Option<EntityState>;
}

/// The host's service-call bus: `(domain, service, data)` plus whether to
/// wait for completion.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn call(&self, domain: &str, service: &str, data: Value, wait: bool) -> Result<()>;
}
