use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use miled_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Effective config, one line per field, in section order.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources = Sources { doc: config_file_doc.as_ref(), path: config_file_path.as_deref() };

    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let kernel_path = config
        .prompt
        .kernel_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());

    let fields: Vec<(&str, String, &[&str])> = vec![
        ("server.bind_address", config.server.bind_address.clone(), &["MILED_SERVER_BIND_ADDRESS"]),
        ("server.port", config.server.port.to_string(), &["MILED_SERVER_PORT"]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["MILED_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        (
            "catalog.url",
            config.catalog.url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["MILED_CATALOG_URL"],
        ),
        ("catalog.path", config.catalog.path.display().to_string(), &["MILED_CATALOG_PATH"]),
        ("catalog.ttl_secs", config.catalog.ttl_secs.to_string(), &["MILED_CATALOG_TTL_SECS"]),
        (
            "catalog.timeout_secs",
            config.catalog.timeout_secs.to_string(),
            &["MILED_CATALOG_TIMEOUT_SECS"],
        ),
        ("llm.api_key", api_key.to_string(), &["MILED_LLM_API_KEY", "GEMINI_API_KEY"]),
        ("llm.base_url", config.llm.base_url.clone(), &["MILED_LLM_BASE_URL"]),
        ("llm.fast_model", config.llm.fast_model.clone(), &["MILED_LLM_FAST_MODEL"]),
        ("llm.thinking_model", config.llm.thinking_model.clone(), &["MILED_LLM_THINKING_MODEL"]),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["MILED_LLM_TIMEOUT_SECS"]),
        ("llm.max_retries", config.llm.max_retries.to_string(), &["MILED_LLM_MAX_RETRIES"]),
        ("prompt.kernel_path", kernel_path, &["MILED_PROMPT_KERNEL_PATH"]),
        ("logging.level", config.logging.level.clone(), &["MILED_LOGGING_LEVEL", "MILED_LOG_LEVEL"]),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["MILED_LOGGING_FORMAT", "MILED_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, sources.field_source(key, env_keys))),
    );
    lines.join("\n")
}

struct Sources<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

impl Sources<'_> {
    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("miled.toml"), PathBuf::from("config/miled.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
