pub mod compose;
pub mod config;
pub mod doctor;

use std::sync::Arc;
use std::time::Duration;

use miled_agent::{ConfigSource, FileConfigSource, HttpConfigSource};
use miled_agent::store::ConfigSourceError;
use miled_core::config::AppConfig;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Same source selection as the server: URL when configured, else the local file.
pub(crate) fn document_source(config: &AppConfig) -> Result<Arc<dyn ConfigSource>, ConfigSourceError> {
    match &config.catalog.url {
        Some(url) => Ok(Arc::new(HttpConfigSource::new(
            url.clone(),
            Duration::from_secs(config.catalog.timeout_secs),
        )?)),
        None => Ok(Arc::new(FileConfigSource::new(config.catalog.path.clone()))),
    }
}

pub(crate) fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(|runtime| runtime.block_on(future))
        .map_err(|error| format!("failed to initialize async runtime: {error}"))
}
