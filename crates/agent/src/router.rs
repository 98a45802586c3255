use serde::Serialize;

/// Faculty-facing planning and diagnostic bot types routed to the thinking tier.
pub const DEEP_REASONING_BOT_TYPES: [&str; 5] = [
    "course_designer",
    "lesson_planner",
    "assessment_builder",
    "learning_diagnostics",
    "curriculum_mapper",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Thinking,
    Fast,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Fast => "fast",
        }
    }

    pub fn is_thinking(&self) -> bool {
        matches!(self, Self::Thinking)
    }
}

pub fn select_model(bot_type: &str) -> ModelTier {
    if DEEP_REASONING_BOT_TYPES.contains(&bot_type) {
        ModelTier::Thinking
    } else {
        ModelTier::Fast
    }
}

/// Concrete model name per tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelRoster {
    pub fast: String,
    pub thinking: String,
}

impl ModelRoster {
    pub fn new(fast: impl Into<String>, thinking: impl Into<String>) -> Self {
        Self { fast: fast.into(), thinking: thinking.into() }
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Thinking => &self.thinking,
            ModelTier::Fast => &self.fast,
        }
    }
}
