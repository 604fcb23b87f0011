//! Build-loop event types for NDJSON output

/// Loop events emitted by the continuous build host, one JSON object per
/// line when `--json` is set.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    BuildStarted {
        command: String,
    },
    BuildFinished {
        success: bool,
        exit_code: Option<i32>,
    },
    WaitingForChanges {
        roots: Vec<String>,
    },
    Cancelled,
    Error {
        message: String,
    },
}

impl LoopEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
