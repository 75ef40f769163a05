//! Message protocol between a caller and the batch processor.
//!
//! Both directions are serde enums tagged by `type`, so the same values travel over an
//! in-process channel or as JSON.

use crate::error::{AmcError, Result};
use crate::schema::{Configuration, ContractRecord, ScheduleResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CAPABILITIES: [&str; 2] = ["process-batch", "process-single"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Command {
    ProcessBatch {
        records: Vec<ContractRecord>,
        #[serde(default)]
        config: Configuration,
        #[serde(default)]
        chunk_id: usize,
        #[serde(default = "default_chunk_total")]
        chunk_total: usize,
        /// Dataset position of the first record. Records without an id are named from it.
        #[serde(default)]
        record_offset: usize,
        /// Caller-chosen tag echoed on every event of this batch.
        #[serde(default)]
        run_id: u64,
    },
    ProcessSingle {
        record: ContractRecord,
        #[serde(default)]
        config: Configuration,
    },
}

fn default_chunk_total() -> usize {
    1
}

impl Command {
    pub fn chunk_id(&self) -> Option<usize> {
        match self {
            Command::ProcessBatch { chunk_id, .. } => Some(*chunk_id),
            Command::ProcessSingle { .. } => None,
        }
    }

    pub fn run_id(&self) -> Option<u64> {
        match self {
            Command::ProcessBatch { run_id, .. } => Some(*run_id),
            Command::ProcessSingle { .. } => None,
        }
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Command)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    Ready {
        capabilities: Vec<String>,
        version: String,
    },
    BatchStarted {
        chunk_id: usize,
        record_count: usize,
        #[serde(default)]
        run_id: u64,
    },
    Progress {
        chunk_id: usize,
        processed: usize,
        total: usize,
        elapsed_ms: u64,
        #[serde(default)]
        run_id: u64,
    },
    BatchComplete {
        chunk_id: usize,
        chunk_total: usize,
        #[serde(default)]
        run_id: u64,
        results: Vec<ScheduleResult>,
        summary: BatchSummary,
    },
    SingleComplete {
        result: ScheduleResult,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_id: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<u64>,
    },
}

impl Event {
    pub fn ready() -> Self {
        Event::Ready {
            capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn error(error: &AmcError, chunk_id: Option<usize>, run_id: Option<u64>) -> Self {
        Event::Error {
            message: error.to_string(),
            chunk_id,
            run_id,
        }
    }

    /// The run tag of a batch event, `None` for events outside any batch.
    pub fn run_id(&self) -> Option<u64> {
        match self {
            Event::BatchStarted { run_id, .. }
            | Event::Progress { run_id, .. }
            | Event::BatchComplete { run_id, .. } => Some(*run_id),
            Event::Error { run_id, .. } => *run_id,
            Event::Ready { .. } | Event::SingleComplete { .. } => None,
        }
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Event)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Sum of contract-level totals including tax.
    pub total_value: f64,
}

impl BatchSummary {
    pub fn from_results(results: &[ScheduleResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            processed: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            total_value: results.iter().map(|r| r.total_with_tax()).sum(),
        }
    }

    /// Folds another chunk's summary into this one.
    pub fn absorb(&mut self, other: &BatchSummary) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.total_value += other.total_value;
    }
}

/// Decodes a raw JSON command.
pub fn decode_command(raw: &str) -> Result<Command> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AmcError::ProtocolError(format!("Invalid message format: {}", e)))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AmcError::ProtocolError("Message has no 'type' field".to_string()))?;

    if !CAPABILITIES.contains(&kind.as_str()) {
        return Err(AmcError::ProtocolError(format!(
            "Unknown message type: {}",
            kind
        )));
    }

    serde_json::from_value(value)
        .map_err(|e| AmcError::ProtocolError(format!("Invalid {} payload: {}", kind, e)))
}

/// Best-effort chunk id of a raw message, for error reporting.
pub fn chunk_id_hint(raw: &str) -> Option<usize> {
    number_hint(raw, "chunk_id").and_then(|id| usize::try_from(id).ok())
}

/// Best-effort run tag of a raw message, for error reporting.
pub fn run_id_hint(raw: &str) -> Option<u64> {
    number_hint(raw, "run_id")
}

fn number_hint(raw: &str, field: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value.get(field).and_then(Value::as_u64)
}
