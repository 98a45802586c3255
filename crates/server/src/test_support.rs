use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miled_agent::store::ConfigSourceError;
use miled_agent::{
    AgentRuntime, CompletionRequest, ConfigSource, ConfigStore, LlmClient, ModelRoster,
};
use miled_core::{ConfigRoot, SystemClock};

use crate::api::AppState;

pub const DOCUMENT: &str = r#"{
    "universal": {"items": {
        "tutor": {"botType": "tutor", "name": "Tutor", "systemPrompt": "You tutor physics."}
    }},
    "engine": {"kernel": {"public": {"preserveAgency": true}}},
    "functionPolicies": {"learning": {"allowFullSolution": false}}
}"#;

pub struct DocumentSource;

#[async_trait]
impl ConfigSource for DocumentSource {
    async fn fetch(&self) -> Result<ConfigRoot, ConfigSourceError> {
        serde_json::from_str(DOCUMENT).map_err(|error| ConfigSourceError::Parse(error.to_string()))
    }

    fn describe(&self) -> String {
        "fixture".to_string()
    }
}

pub struct FailingSource;

#[async_trait]
impl ConfigSource for FailingSource {
    async fn fetch(&self) -> Result<ConfigRoot, ConfigSourceError> {
        Err(ConfigSourceError::Transport("connection refused".to_string()))
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

pub struct FixedLlm {
    reply: String,
    calls: AtomicUsize,
}

impl FixedLlm {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FixedLlm {
    async fn complete(&self, _request: CompletionRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

fn state(source: impl ConfigSource + 'static, reply: &str) -> (AppState, Arc<FixedLlm>) {
    let llm = Arc::new(FixedLlm { reply: reply.to_string(), calls: AtomicUsize::new(0) });
    let store = ConfigStore::new(Arc::new(source), Arc::new(SystemClock), Duration::from_secs(60));
    let runtime =
        AgentRuntime::new(Arc::new(store), llm.clone(), ModelRoster::new("flash", "pro"));
    (AppState { runtime: Arc::new(runtime) }, llm)
}

pub fn app_state(reply: &str) -> (AppState, Arc<FixedLlm>) {
    state(DocumentSource, reply)
}

pub fn app_state_with_source(source: impl ConfigSource + 'static, reply: &str) -> AppState {
    state(source, reply).0
}
