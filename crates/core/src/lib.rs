pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::agent::{AgentDefinition, Scope};
pub use domain::catalog::{
    AgentLayer, Candidate, ConfigRoot, EngineConfig, FunctionPolicy, KernelConfig, KernelFlags,
    SkippedEntry,
};
pub use domain::message::{HistoryEntry, Message, RequestContext, Role};
pub use errors::{ApplicationError, InterfaceError};
