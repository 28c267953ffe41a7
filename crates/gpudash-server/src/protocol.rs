use gpudash_core::{BenchmarkComparison, SystemSnapshot};
use serde::{Deserialize, Serialize};

use crate::dto::BenchmarkRequest;

pub const GREETING: &str = "Connected to GPU dashboard server";

/// Server to client frames: `{"event": ..., "data": ...}`.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { data: String },
    SystemStats(SystemSnapshot),
    BenchmarkResult(BenchmarkComparison),
    BenchmarkError { error: String },
}

impl ServerEvent {
    pub fn connected() -> Self {
        ServerEvent::Connected {
            data: GREETING.to_string(),
        }
    }

    pub fn benchmark_error(error: impl Into<String>) -> Self {
        ServerEvent::BenchmarkError {
            error: error.into(),
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Client to server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    RequestBenchmark(BenchmarkRequest),
}
