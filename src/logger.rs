use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

/// How much of the advisory traffic lands in the transcript.
pub enum TranscriptMode {
    /// Prompts and raw replies inline.
    Full,
    /// Lengths only; keeps long-running transcripts small.
    Compact,
}

/// Appends one NDJSON line per advisory exchange, issued command, and cycle
/// summary. Write failures are warned about, never fatal.
pub(crate) struct TranscriptLogger {
    mode: TranscriptMode,
    file: File,
}

impl TranscriptLogger {
    pub fn new(mode: TranscriptMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { mode, file })
    }

    pub fn log_exchange(&mut self, cycle_id: &str, prompt: &str, response: &str) {
        let entry = match self.mode {
            TranscriptMode::Full => json!({
                "ts": Utc::now().to_rfc3339(),
                "cycle": cycle_id,
                "dir": "advisory",
                "prompt": prompt,
                "response": response,
            }),
            TranscriptMode::Compact => json!({
                "ts": Utc::now().to_rfc3339(),
                "cycle": cycle_id,
                "dir": "advisory",
                "prompt_chars": prompt.len(),
                "response_chars": response.len(),
            }),
        };
        self.write_line(&entry);
    }

    pub fn log_failure(&mut self, cycle_id: &str, error: &str) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "cycle": cycle_id,
            "dir": "advisory",
            "error": error,
        });
        self.write_line(&entry);
    }

    pub fn log_command(&mut self, cycle_id: &str, domain: &str, service: &str, data: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "cycle": cycle_id,
            "dir": "cmd",
            "domain": domain,
            "service": service,
            "data": data,
        });
        self.write_line(&entry);
    }

    pub fn log_cycle(&mut self, cycle_id: &str, rooms: usize, fresh: bool, error_count: u32) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "cycle": cycle_id,
            "dir": "cycle",
            "rooms": rooms,
            "fresh_recommendations": fresh,
            "error_count": error_count,
        });
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write transcript entry: {e}");
        }
    }
}
