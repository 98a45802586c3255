use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

pub const ANONYMOUS_STUDENT: &str = "anonymous";

/// One research record per answered chat request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub student_id: String,
    pub faculty_id: Option<String>,
    pub class_id: Option<String>,
    pub session_id: Option<String>,
    pub bot_type: String,
    pub bot_name: Option<String>,
    pub layer: String,
    pub model: String,
    pub tier: &'static str,
    pub is_thinking: bool,
    pub thinking_budget: i32,
    pub message_length: usize,
    pub reply_length: usize,
    pub history_length: usize,
    pub pre_guard: Option<&'static str>,
    pub post_guard: Option<&'static str>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

/// Fire-and-forget destination for research records. Errors are reported
/// to the caller for logging and never change the response.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: &TelemetryRecord) -> Result<()>;
}

/// Emits each record as a single structured `tracing` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record(&self, record: &TelemetryRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        info!(
            event_name = "chat.research_log",
            correlation_id = %record.correlation_id,
            bot_type = %record.bot_type,
            model = %record.model,
            record = %payload,
            "research log"
        );
        Ok(())
    }
}
