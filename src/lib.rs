mod advisor;
mod control;
mod error;
mod host;
mod logger;
mod optimizer;
mod protocol;
mod schedule;
mod types;
mod weather;

pub use advisor::{AdvisoryModel, ChatGptAdvisor, ClaudeAdvisor, advisor_for};
pub use control::FanThresholds;
pub use error::{Error, Result};
pub use host::{CommandDispatcher, EntityState, StateStore};
pub use logger::TranscriptMode;
pub use optimizer::{Optimizer, OptimizerBuilder};
pub use protocol::OvershootTiers;
pub use types::*;
