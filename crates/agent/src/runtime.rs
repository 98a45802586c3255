//! Per-request orchestration: config, resolution, then either the export
//! branch or guards around a single model call.

use std::sync::Arc;

use miled_core::{
    ApplicationError, Clock, ConfigRoot, EngineConfig, HistoryEntry, RequestContext, SystemClock,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::conversation::build_message_stack;
use crate::guardrails::{GuardDecision, GuardEngine};
use crate::kernel::{effective_flags, ComposeMode, KernelComposer};
use crate::llm::{CompletionRequest, LlmClient};
use crate::resolver::{BotResolver, ResolvedAgent};
use crate::router::{select_model, ModelRoster, ModelTier};
use crate::spi::{build_spi, function_key, CreateSpRequest, CreateSpResponse};
use crate::store::{ConfigStore, StoreError};
use crate::telemetry::{TelemetryRecord, TelemetrySink, TracingTelemetrySink, ANONYMOUS_STUDENT};

/// Model field of replies produced by the pre-call guard.
pub const PRE_GUARD_MODEL: &str = "guard/pre-block";
pub const DEFAULT_THINKING_BUDGET: i32 = 512;
pub const MODEL_APOLOGY_MESSAGE: &str =
    "Sorry, I couldn't generate a reply right now. Please try again in a moment.";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub bot_type: Option<String>,
    #[serde(flatten)]
    pub context: RequestContext,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub bot_type: String,
    pub bot_name: Option<String>,
    pub model: String,
    pub is_thinking: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedPrompt {
    pub bot_type: String,
    pub bot_name: Option<String>,
    pub scope: String,
    pub owner: Option<String>,
    pub full_system_prompt: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatOutcome {
    Reply(ChatReply),
    Export(ExportedPrompt),
}

pub struct AgentRuntime {
    store: Arc<ConfigStore>,
    llm: Arc<dyn LlmClient>,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    roster: ModelRoster,
    resolver: BotResolver,
    composer: KernelComposer,
    guards: GuardEngine,
    kernel_text: String,
}

impl AgentRuntime {
    pub fn new(store: Arc<ConfigStore>, llm: Arc<dyn LlmClient>, roster: ModelRoster) -> Self {
        Self {
            store,
            llm,
            telemetry: Arc::new(TracingTelemetrySink),
            clock: Arc::new(SystemClock),
            roster,
            resolver: BotResolver::new(),
            composer: KernelComposer::new(),
            guards: GuardEngine::default(),
            kernel_text: String::new(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_guards(mut self, guards: GuardEngine) -> Self {
        self.guards = guards;
        self
    }

    /// Constitution text prepended to SPI-built prompts.
    pub fn with_kernel_text(mut self, kernel_text: impl Into<String>) -> Self {
        self.kernel_text = kernel_text.into();
        self
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub async fn handle(
        &self,
        request: ChatRequest,
        export: bool,
        correlation_id: &str,
    ) -> Result<ChatOutcome, ApplicationError> {
        let bot_type = non_blank(request.bot_type.as_deref())
            .ok_or_else(|| ApplicationError::InvalidInput("botType is required".to_string()))?
            .to_string();

        if export {
            let config = self.load_config().await?;
            let resolved = self.resolve(&config, &bot_type, &request.context)?;
            return Ok(ChatOutcome::Export(self.export(&config.engine, &bot_type, resolved)));
        }

        let message = non_blank(request.message.as_deref())
            .ok_or_else(|| ApplicationError::InvalidInput("message is required".to_string()))?
            .to_string();

        let config = self.load_config().await?;
        let resolved = self.resolve(&config, &bot_type, &request.context)?;
        let reply = self
            .converse(&config, &bot_type, resolved, &message, &request, correlation_id)
            .await;
        Ok(ChatOutcome::Reply(reply))
    }

    /// Builds an SPI and its system prompt from questionnaire answers.
    pub async fn create_system_prompt(
        &self,
        request: CreateSpRequest,
    ) -> Result<CreateSpResponse, ApplicationError> {
        let config = self.load_config().await?;

        let function_key = function_key(&request.answers);
        let policy = config.policy_for(&function_key).cloned().unwrap_or_default();
        let mode = if request.export_public_only { ComposeMode::Export } else { ComposeMode::Full };
        let kernel = effective_flags(&config.engine.kernel, mode);

        let built = build_spi(&request.answers, &kernel, &policy, &self.kernel_text, self.clock.now());
        info!(
            event_name = "spi.created",
            function_key = %function_key,
            channel = built.meta.channel.as_str(),
            export_public_only = request.export_public_only,
            "system prompt instance built"
        );

        Ok(CreateSpResponse {
            ok: true,
            function_key,
            meta: built.meta,
            spi: built.spi,
            system_prompt: built.system_prompt,
        })
    }

    async fn load_config(&self) -> Result<Arc<ConfigRoot>, ApplicationError> {
        self.store.load().await.map_err(|error| match error {
            StoreError::Unavailable(source) => {
                ApplicationError::ConfigurationUnavailable(source.to_string())
            }
            poisoned @ StoreError::CachePoisoned => ApplicationError::Internal(poisoned.to_string()),
        })
    }

    fn resolve<'a>(
        &self,
        config: &'a ConfigRoot,
        bot_type: &str,
        context: &RequestContext,
    ) -> Result<ResolvedAgent<'a>, ApplicationError> {
        self.resolver
            .resolve(config, bot_type, context)
            .map_err(|_| ApplicationError::AccessDenied)
    }

    fn export(&self, engine: &EngineConfig, bot_type: &str, resolved: ResolvedAgent<'_>) -> ExportedPrompt {
        let agent = resolved.agent;
        ExportedPrompt {
            bot_type: bot_type.to_string(),
            bot_name: agent.name.clone(),
            scope: agent.effective_scope().as_str().to_string(),
            owner: agent.owner.clone(),
            full_system_prompt: self.composer.compose(engine, agent, ComposeMode::Export),
        }
    }

    async fn converse(
        &self,
        config: &ConfigRoot,
        bot_type: &str,
        resolved: ResolvedAgent<'_>,
        message: &str,
        request: &ChatRequest,
        correlation_id: &str,
    ) -> ChatReply {
        let engine = &config.engine;
        let agent = resolved.agent;
        let flags = effective_flags(&engine.kernel, ComposeMode::Full);
        let tier = select_model(bot_type);
        let thinking_budget = agent
            .thinking_budget
            .or(engine.default_thinking_budget)
            .unwrap_or(DEFAULT_THINKING_BUDGET);

        let mut outcome = Exchange { tier, thinking_budget, ..Exchange::default() };

        let pre_guard = self.guards.pre_guard(&flags, message);
        if let GuardDecision::Block { reason_code, user_message } = pre_guard {
            info!(
                event_name = "chat.guard.pre_blocked",
                correlation_id = %correlation_id,
                bot_type = %bot_type,
                reason_code,
                "request answered by pre-call guard"
            );
            outcome.pre_guard = Some(reason_code);
            outcome.model = PRE_GUARD_MODEL.to_string();
            outcome.is_thinking = false;
            outcome.reply = user_message;
        } else {
            let system_prompt = self.composer.compose(engine, agent, ComposeMode::Full);
            let messages = build_message_stack(&system_prompt, &request.history, message, &flags);
            let model = self.roster.model_for(tier).to_string();
            outcome.model = model.clone();
            outcome.is_thinking = tier.is_thinking();

            let completion = self
                .llm
                .complete(CompletionRequest {
                    messages,
                    temperature: engine.temperature,
                    max_output_tokens: engine.max_output_tokens,
                    tier,
                    model,
                    thinking_budget,
                })
                .await;

            match completion {
                Ok(text) if !text.trim().is_empty() => {
                    match self.guards.post_guard(&flags, &text) {
                        GuardDecision::Allow => outcome.reply = text,
                        GuardDecision::Block { reason_code, user_message }
                        | GuardDecision::Rewrite { reason_code, user_message } => {
                            outcome.post_guard = Some(reason_code);
                            outcome.reply = user_message;
                        }
                    }
                }
                Ok(_) => {
                    warn!(
                        event_name = "chat.model.empty_reply",
                        correlation_id = %correlation_id,
                        bot_type = %bot_type,
                        "model returned no usable text"
                    );
                    outcome.degrade();
                }
                Err(error) => {
                    warn!(
                        event_name = "chat.model.failed",
                        correlation_id = %correlation_id,
                        bot_type = %bot_type,
                        error = %error,
                        "model invocation failed"
                    );
                    outcome.degrade();
                }
            }
        }

        if engine.log_metadata {
            self.emit_research_log(engine, bot_type, &resolved, message, request, &outcome, correlation_id);
        }

        ChatReply {
            reply: outcome.reply,
            bot_type: bot_type.to_string(),
            bot_name: agent.name.clone(),
            model: outcome.model,
            is_thinking: outcome.is_thinking,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_research_log(
        &self,
        engine: &EngineConfig,
        bot_type: &str,
        resolved: &ResolvedAgent<'_>,
        message: &str,
        request: &ChatRequest,
        outcome: &Exchange,
        correlation_id: &str,
    ) {
        let context = &request.context;
        let record = TelemetryRecord {
            timestamp: self.clock.now(),
            correlation_id: correlation_id.to_string(),
            student_id: non_blank(context.student_id.as_deref())
                .unwrap_or(ANONYMOUS_STUDENT)
                .to_string(),
            faculty_id: context.faculty_id.clone(),
            class_id: context.class_id.clone(),
            session_id: context.session_id.clone(),
            bot_type: bot_type.to_string(),
            bot_name: resolved.agent.name.clone(),
            layer: resolved.layer.to_string(),
            model: outcome.model.clone(),
            tier: outcome.tier.as_str(),
            is_thinking: outcome.is_thinking,
            thinking_budget: outcome.thinking_budget,
            message_length: message.chars().count(),
            reply_length: outcome.reply.chars().count(),
            history_length: request.history.len(),
            pre_guard: outcome.pre_guard,
            post_guard: outcome.post_guard,
            degraded: outcome.degraded,
            message: engine.log_content.then(|| message.to_string()),
            reply: engine.log_content.then(|| outcome.reply.clone()),
        };

        if let Err(error) = self.telemetry.record(&record) {
            warn!(
                event_name = "chat.telemetry.failed",
                correlation_id = %correlation_id,
                error = %error,
                "research log could not be recorded"
            );
        }
    }
}

/// What happened on the normal branch, for the reply and the research log.
struct Exchange {
    reply: String,
    model: String,
    tier: ModelTier,
    is_thinking: bool,
    thinking_budget: i32,
    pre_guard: Option<&'static str>,
    post_guard: Option<&'static str>,
    degraded: bool,
}

impl Default for Exchange {
    fn default() -> Self {
        Self {
            reply: String::new(),
            model: String::new(),
            tier: ModelTier::Fast,
            is_thinking: false,
            thinking_budget: DEFAULT_THINKING_BUDGET,
            pre_guard: None,
            post_guard: None,
            degraded: false,
        }
    }
}

impl Exchange {
    fn degrade(&mut self) {
        self.reply = MODEL_APOLOGY_MESSAGE.to_string();
        self.degraded = true;
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<HistoryEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<HistoryEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::{ChatOutcome, ChatReply, ChatRequest, ExportedPrompt};

    #[test]
    fn chat_request_reads_camel_case_fields() {
        let request: ChatRequest = serde_json::from_str(
            r#"{
                "message": "hi",
                "botType": "tutor",
                "history": null,
                "studentId": "s-1",
                "facultyId": "fac1",
                "sessionId": "sess-9"
            }"#,
        )
        .expect("request parses");

        assert_eq!(request.bot_type.as_deref(), Some("tutor"));
        assert!(request.history.is_empty());
        assert_eq!(request.context.faculty_id(), Some("fac1"));
        assert_eq!(request.context.session_id.as_deref(), Some("sess-9"));
        assert_eq!(request.context.class_id, None);
    }

    #[test]
    fn outcomes_serialize_without_a_tag() {
        let reply = serde_json::to_value(ChatOutcome::Reply(ChatReply {
            reply: "ok".to_string(),
            bot_type: "tutor".to_string(),
            bot_name: None,
            model: "gemini-2.0-flash".to_string(),
            is_thinking: false,
        }))
        .expect("serializes");
        assert_eq!(reply["isThinking"], false);
        assert!(reply["botName"].is_null());

        let export = serde_json::to_value(ChatOutcome::Export(ExportedPrompt {
            bot_type: "tutor".to_string(),
            bot_name: Some("Tutor".to_string()),
            scope: "global".to_string(),
            owner: None,
            full_system_prompt: "prompt".to_string(),
        }))
        .expect("serializes");
        assert_eq!(export["fullSystemPrompt"], "prompt");
        assert_eq!(export["scope"], "global");
    }
}
