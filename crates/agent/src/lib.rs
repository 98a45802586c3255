//! Agent runtime - resolution, prompt composition and guarded model calls
//!
//! This crate is the request path behind the chat surface:
//! - Caches the layered config document (`store`)
//! - Finds the agent a caller may use (`resolver`)
//! - Composes system prompts from kernel flags and agent text (`kernel`)
//! - Routes bot types to a model tier (`router`)
//! - Checks requests and replies against the full-solution policy (`guardrails`)
//! - Builds System Prompt Instances from questionnaire answers (`spi`)
//!
//! # Request flow
//!
//! `AgentRuntime::handle` loads the config, resolves the agent, then either
//! returns the public-only prompt (export) or runs pre-guard, composition,
//! the model call and post-guard.
//!
//! # Failure model
//!
//! Config, input and access failures abort the request with an
//! `ApplicationError`. A failed or empty model call degrades to a fixed
//! apology reply instead.

pub mod conversation;
pub mod guardrails;
pub mod kernel;
pub mod llm;
pub mod resolver;
pub mod router;
pub mod runtime;
pub mod spi;
pub mod store;
pub mod telemetry;

pub use llm::{CompletionRequest, LlmClient};
pub use router::{ModelRoster, ModelTier};
pub use runtime::{AgentRuntime, ChatOutcome, ChatReply, ChatRequest, ExportedPrompt};
pub use store::{ConfigSource, ConfigStore, FileConfigSource, HttpConfigSource};
