//! Pre-call and post-call content checks. Both are active only while the
//! effective kernel flags carry `noFullSolutionForStudent`; the triggering
//! heuristics sit behind [`Classifier`] so they can be swapped or probed
//! independently of the orchestrator.

use miled_core::KernelFlags;

use crate::kernel::KernelFlag;

pub const LONG_REPLY_THRESHOLD: usize = 1200;

pub const SOLUTION_REFUSAL_MESSAGE: &str = "I can't hand over a complete solution, but we can work \
through it together. Which part have you already tried, and where did you get stuck?";

pub const SOCRATIC_FOLLOW_UP_MESSAGE: &str =
    "Let's take this one step at a time. What do you think the first step should be, and why?";

/// Phrases (English and Hebrew) that ask for a finished solution.
pub const SOLUTION_REQUEST_MARKERS: [&str; 11] = [
    "solve it for me",
    "give me the full solution",
    "full answer",
    "do my homework",
    "write the whole",
    "תפתור לי",
    "פתור לי",
    "תן לי את הפתרון",
    "פתרון מלא",
    "תכתוב לי את כל",
    "תעשה לי את המטלה",
];

pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> bool;
}

/// Case-insensitive substring match against a marker list.
#[derive(Clone, Debug)]
pub struct SolutionRequestClassifier {
    markers: Vec<String>,
}

impl SolutionRequestClassifier {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { markers: markers.into_iter().map(|marker| marker.as_ref().to_lowercase()).collect() }
    }
}

impl Default for SolutionRequestClassifier {
    fn default() -> Self {
        Self::new(SOLUTION_REQUEST_MARKERS)
    }
}

impl Classifier for SolutionRequestClassifier {
    fn classify(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.markers.iter().any(|marker| text.contains(marker.as_str()))
    }
}

/// Flags text longer than `threshold` characters.
#[derive(Clone, Copy, Debug)]
pub struct LongReplyClassifier {
    threshold: usize,
}

impl LongReplyClassifier {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl Default for LongReplyClassifier {
    fn default() -> Self {
        Self::new(LONG_REPLY_THRESHOLD)
    }
}

impl Classifier for LongReplyClassifier {
    fn classify(&self, text: &str) -> bool {
        text.chars().count() > self.threshold
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Skip the model call and answer with `user_message`.
    Block { reason_code: &'static str, user_message: String },
    /// Discard the model reply and answer with `user_message`.
    Rewrite { reason_code: &'static str, user_message: String },
}

impl GuardDecision {
    pub fn is_triggered(&self) -> bool {
        !matches!(self, Self::Allow)
    }

    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Allow => None,
            Self::Block { reason_code, .. } | Self::Rewrite { reason_code, .. } => Some(reason_code),
        }
    }
}

pub struct GuardEngine {
    solution_request: Box<dyn Classifier>,
    long_reply: Box<dyn Classifier>,
}

impl Default for GuardEngine {
    fn default() -> Self {
        Self::new(SolutionRequestClassifier::default(), LongReplyClassifier::default())
    }
}

impl GuardEngine {
    pub fn new(
        solution_request: impl Classifier + 'static,
        long_reply: impl Classifier + 'static,
    ) -> Self {
        Self { solution_request: Box::new(solution_request), long_reply: Box::new(long_reply) }
    }

    pub fn pre_guard(&self, flags: &KernelFlags, message: &str) -> GuardDecision {
        if KernelFlag::NoFullSolutionForStudent.is_set(flags)
            && self.solution_request.classify(message)
        {
            return GuardDecision::Block {
                reason_code: "full_solution_requested",
                user_message: SOLUTION_REFUSAL_MESSAGE.to_string(),
            };
        }
        GuardDecision::Allow
    }

    pub fn post_guard(&self, flags: &KernelFlags, reply: &str) -> GuardDecision {
        if KernelFlag::NoFullSolutionForStudent.is_set(flags) && self.long_reply.classify(reply) {
            return GuardDecision::Rewrite {
                reason_code: "reply_looks_like_full_solution",
                user_message: SOCRATIC_FOLLOW_UP_MESSAGE.to_string(),
            };
        }
        GuardDecision::Allow
    }
}
