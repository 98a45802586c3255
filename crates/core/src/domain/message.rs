use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// History item exactly as the caller sent it. The role is free text until
/// the conversation builder normalizes it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

/// Caller identifiers. Used for access checks and telemetry only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, deserialize_with = "lenient_id")]
    pub student_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub faculty_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub class_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub session_id: Option<String>,
}

/// Identifiers arrive as strings or numbers; any non-null value is kept as text.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

impl RequestContext {
    pub fn with_faculty(faculty_id: impl Into<String>) -> Self {
        Self { faculty_id: Some(faculty_id.into()), ..Self::default() }
    }

    /// Faculty identifier when present and non-empty.
    pub fn faculty_id(&self) -> Option<&str> {
        self.faculty_id.as_deref().filter(|id| !id.is_empty())
    }
}
