use serde::{Deserialize, Serialize};

/// Access-control class of an agent definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Institution,
    FacultyPrivate,
    CourseSpecific,
    /// Any scope string this build does not know. Never granted.
    #[serde(other)]
    Unrecognized,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Institution => "institution",
            Self::FacultyPrivate => "faculty_private",
            Self::CourseSpecific => "course_specific",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// A configured conversational persona as it appears in the config document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub bot_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default, rename = "_layer")]
    pub layer: Option<String>,
    #[serde(default)]
    pub thinking_budget: Option<i32>,
}

impl AgentDefinition {
    /// Declared scope, `global` when the document leaves it out.
    pub fn effective_scope(&self) -> Scope {
        self.scope.unwrap_or(Scope::Global)
    }

    /// Owner identifier, ignoring blank values.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref().filter(|owner| !owner.is_empty())
    }

    /// Agent prompt text, ignoring blank values.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref().filter(|prompt| !prompt.trim().is_empty())
    }
}
