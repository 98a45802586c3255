use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use miled_agent::store::ConfigSourceError;
use miled_agent::{
    AgentRuntime, ConfigSource, ConfigStore, FileConfigSource, HttpConfigSource, ModelRoster,
};
use miled_core::config::{AppConfig, ConfigError};
use miled_core::SystemClock;
use thiserror::Error;
use tracing::info;

use crate::gemini::GeminiClient;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("config source setup failed: {0}")]
    ConfigSource(#[from] ConfigSourceError),
    #[error("could not read kernel text `{path}`: {source}")]
    KernelText { path: PathBuf, source: std::io::Error },
    #[error("model client setup failed: {0}")]
    ModelClient(String),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let source = config_source(&config)?;
    info!(
        event_name = "system.bootstrap.config_source",
        correlation_id = "bootstrap",
        source = %source.describe(),
        ttl_secs = config.catalog.ttl_secs,
        "config document source selected"
    );
    let store = ConfigStore::new(
        source,
        Arc::new(SystemClock),
        Duration::from_secs(config.catalog.ttl_secs),
    );

    let kernel_text = match &config.prompt.kernel_path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|source| BootstrapError::KernelText { path: path.clone(), source })?,
        None => String::new(),
    };

    let api_key = config.llm.api_key.clone().ok_or_else(|| {
        ConfigError::Validation("llm.api_key is required (set MILED_LLM_API_KEY or GEMINI_API_KEY)".to_string())
    })?;
    let llm = GeminiClient::new(
        api_key,
        &config.llm.base_url,
        Duration::from_secs(config.llm.timeout_secs),
        config.llm.max_retries,
    )
    .map_err(|error| BootstrapError::ModelClient(error.to_string()))?;

    let roster = ModelRoster::new(config.llm.fast_model.clone(), config.llm.thinking_model.clone());
    let runtime = AgentRuntime::new(Arc::new(store), Arc::new(llm), roster).with_kernel_text(kernel_text);

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        fast_model = %config.llm.fast_model,
        thinking_model = %config.llm.thinking_model,
        "agent runtime initialized"
    );

    Ok(Application { config, runtime: Arc::new(runtime) })
}

fn config_source(config: &AppConfig) -> Result<Arc<dyn ConfigSource>, BootstrapError> {
    match &config.catalog.url {
        Some(url) => Ok(Arc::new(HttpConfigSource::new(
            url.clone(),
            Duration::from_secs(config.catalog.timeout_secs),
        )?)),
        None => Ok(Arc::new(FileConfigSource::new(config.catalog.path.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use miled_agent::spi::CreateSpRequest;
    use miled_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn overrides(catalog_url: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                catalog_url: catalog_url.map(ToString::to_string),
                llm_api_key: Some("test-key".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_non_http_catalog_url() {
        let result = bootstrap(overrides(Some("ftp://configs.example/config.json"))).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("catalog.url"));
    }

    #[tokio::test]
    async fn bootstrap_reports_unreadable_kernel_text() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let mut config = AppConfig::load(overrides(Some("https://configs.example/config.json")))
            .expect("config loads");
        config.prompt.kernel_path = Some(dir.path().join("kernel.txt"));

        let result = bootstrap_with_config(config).await;

        assert!(matches!(result, Err(BootstrapError::KernelText { .. })));
    }

    #[tokio::test]
    async fn bootstrap_wires_runtime_with_kernel_text() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let kernel = dir.path().join("kernel.txt");
        std::fs::write(&kernel, "CONSTITUTION OF THE TUTOR").expect("write kernel");
        let document = dir.path().join("config.json");
        std::fs::write(&document, r#"{"universal": {"items": {}}}"#).expect("write document");
        let mut options = overrides(None);
        options.overrides.catalog_path = Some(document);
        let mut config = AppConfig::load(options).expect("config loads");
        config.prompt.kernel_path = Some(kernel);

        let app = bootstrap_with_config(config).await.expect("bootstrap succeeds");
        let response = app
            .runtime
            .create_system_prompt(CreateSpRequest::default())
            .await
            .expect("system prompt builds");

        assert_eq!(app.config.llm.fast_model, "gemini-2.0-flash");
        assert!(response.system_prompt.starts_with("CONSTITUTION OF THE TUTOR"));
    }
}
