//! System Prompt Instance builder: turns questionnaire answers into an SPI
//! record and a ready-to-use system prompt, without any model call.

use chrono::{DateTime, Utc};
use miled_core::{FunctionPolicy, KernelFlags};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::kernel::KernelFlag;

pub const SPI_VERSION: &str = "0.1";
pub const DEFAULT_FUNCTION_KEY: &str = "teaching";
const PROMPT_TITLE: &str = "=== MilEd.One - System Prompt ===";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpRequest {
    #[serde(default, deserialize_with = "object_or_empty")]
    pub answers: Map<String, Value>,
    /// Only a literal `true` turns export on.
    #[serde(default, deserialize_with = "literal_true")]
    pub export_public_only: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpResponse {
    pub ok: bool,
    pub function_key: String,
    pub meta: SpiMeta,
    pub spi: Spi,
    pub system_prompt: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    He,
    Ar,
    En,
}

impl Language {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "ar" | "arabic" | "ערבית" => Self::Ar,
            "en" | "english" | "אנגלית" => Self::En,
            _ => Self::He,
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::He => "Answer in Hebrew. Put any English terms in parentheses.",
            Self::Ar => "Answer in Arabic. Put any English terms in parentheses.",
            Self::En => "Answer in English. Put any Hebrew terms in parentheses.",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Teaching,
    Learning,
    Admin,
}

impl Channel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "admin" | "management" | "הנהלה" | "ניהול" => Self::Admin,
            "learning" | "student" | "לומד" | "סטודנט" | "למידה" => Self::Learning,
            _ => Self::Teaching,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teaching => "teaching",
            Self::Learning => "learning",
            Self::Admin => "admin",
        }
    }

    fn role_line(&self) -> &'static str {
        match self {
            Self::Admin => {
                "You are an administrative and analytical assistant for an academic institution. \
                 You support decisions, policy drafting, prioritisation, measurement and insight."
            }
            Self::Learning => {
                "You are a personal learning assistant for a learner. The goal is to build \
                 understanding, thinking process, effort regulation and independence."
            }
            Self::Teaching => {
                "You are a teaching assistant for a lecturer. The goal is to plan teaching and \
                 build lesson plans, tasks, assessment and pedagogical sequences."
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Warm,
    Direct,
    Socratic,
    WarmSocratic,
}

impl Tone {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "warm" | "חם" | "מכיל" => Self::Warm,
            "direct" | "חד" | "אסרטיבי" => Self::Direct,
            "socratic" | "סוקרטי" => Self::Socratic,
            _ => Self::WarmSocratic,
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::Direct => {
                "Style: sharp, clear and concise. Ask questions only when information is \
                 missing; otherwise give a practical suggestion."
            }
            Self::Socratic => {
                "Style: Socratic. Move the user forward with questions, decomposition and \
                 guidance instead of an immediate solution."
            }
            Self::Warm => "Style: warm, accepting and encouraging. Give a sense of progress and confidence.",
            Self::WarmSocratic => {
                "Style: warm and Socratic. Offer guidance and questions in humane, encouraging wording."
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiIdentity {
    pub faculty_name: String,
    pub faculty_id: String,
    pub course_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiGovernance {
    pub allow_full_solution: bool,
    pub no_full_solution: bool,
    pub require_criteria_for_evaluation: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiTimestamps {
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Spi {
    pub version: &'static str,
    pub channel: Channel,
    pub function: String,
    pub language: Language,
    pub tone: Tone,
    pub identity: SpiIdentity,
    pub governance: SpiGovernance,
    pub timestamps: SpiTimestamps,
    pub raw_answers: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiMeta {
    pub effective_no_full_solution: bool,
    pub channel: Channel,
    pub function: String,
    pub language: Language,
    pub tone: Tone,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpiBuild {
    pub spi: Spi,
    pub system_prompt: String,
    pub meta: SpiMeta,
}

/// First non-blank string among `keys`.
fn pick(answers: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| answers.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Policy lookup key: explicit `function`, else the raw `channel`, else teaching.
pub fn function_key(answers: &Map<String, Value>) -> String {
    pick(answers, &["function"])
        .or_else(|| pick(answers, &["channel"]))
        .unwrap_or_else(|| DEFAULT_FUNCTION_KEY.to_string())
}

/// `kernel` is the already merged flag set for the requested visibility.
pub fn build_spi(
    answers: &Map<String, Value>,
    kernel: &KernelFlags,
    policy: &FunctionPolicy,
    kernel_text: &str,
    created_at: DateTime<Utc>,
) -> SpiBuild {
    let identity = SpiIdentity {
        faculty_name: pick(answers, &["facultyName", "name", "fullName", "מרצה"]).unwrap_or_default(),
        faculty_id: pick(answers, &["facultyId", "email", "mail"]).unwrap_or_default(),
        course_name: pick(answers, &["courseName", "course", "קורס"]).unwrap_or_default(),
    };
    let channel = pick(answers, &["channel", "audienceChannel", "mode"])
        .map_or(Channel::Teaching, |raw| Channel::parse(&raw));
    let language = pick(answers, &["language", "lang"]).map_or(Language::He, |raw| Language::parse(&raw));
    let tone = pick(answers, &["tone", "styleTone"]).map_or(Tone::WarmSocratic, |raw| Tone::parse(&raw));
    let function = pick(answers, &["function", "botFunction"])
        .unwrap_or_else(|| channel.as_str().to_string());

    let allow_full_solution = policy.allow_full_solution.unwrap_or(true);
    let require_criteria_for_evaluation = policy
        .require_criteria_for_evaluation
        .or_else(|| kernel.get(KernelFlag::EvaluationRequiresExplicitCriteria.name()))
        .unwrap_or(false);
    let no_full_solution =
        !allow_full_solution || KernelFlag::NoFullSolutionForStudent.is_set(kernel);
    let governance =
        SpiGovernance { allow_full_solution, no_full_solution, require_criteria_for_evaluation };

    let system_prompt = render_prompt(&identity, channel, language, tone, &governance, kernel, kernel_text);

    SpiBuild {
        meta: SpiMeta {
            effective_no_full_solution: no_full_solution,
            channel,
            function: function.clone(),
            language,
            tone,
        },
        spi: Spi {
            version: SPI_VERSION,
            channel,
            function,
            language,
            tone,
            identity,
            governance,
            timestamps: SpiTimestamps { created_at },
            raw_answers: answers.clone(),
        },
        system_prompt,
    }
}

fn governance_lines(channel: Channel, governance: &SpiGovernance, kernel: &KernelFlags) -> Vec<&'static str> {
    let mut lines = Vec::new();
    if governance.no_full_solution && channel == Channel::Learning {
        lines.push(
            "Core rule: do not fully solve tasks for a learner. Give guidance, questions, \
             decomposition and thinking steps.",
        );
    }
    if governance.require_criteria_for_evaluation {
        lines.push(
            "Core rule: do not evaluate or judge without explicit criteria. If there are none, \
             ask for them or propose a possible set of criteria.",
        );
    }
    if KernelFlag::NoSkipStructuralSteps.is_set(kernel) {
        lines.push("Core rule: do not skip structural steps; build a gradual process.");
    }
    if KernelFlag::PreserveAgency.is_set(kernel) {
        lines.push("Core rule: preserve the user's agency. Prefer empowerment over replacement.");
    }
    lines
}

fn render_prompt(
    identity: &SpiIdentity,
    channel: Channel,
    language: Language,
    tone: Tone,
    governance: &SpiGovernance,
    kernel: &KernelFlags,
    kernel_text: &str,
) -> String {
    let mut header = vec![PROMPT_TITLE.to_string()];
    if !identity.faculty_name.is_empty() {
        header.push(format!("Lecturer/user: {}", identity.faculty_name));
    }
    if !identity.faculty_id.is_empty() {
        header.push(format!("Identifier: {}", identity.faculty_id));
    }
    header.push(if identity.course_name.is_empty() {
        "Context: general work within an academic setting.".to_string()
    } else {
        format!("Context: the course \"{}\".", identity.course_name)
    });

    let mut core = vec![
        channel.role_line().to_string(),
        language.instruction().to_string(),
        tone.instruction().to_string(),
    ];
    let lines = governance_lines(channel, governance, kernel);
    if !lines.is_empty() {
        let bullets: Vec<String> = lines.iter().map(|line| format!("- {line}")).collect();
        core.push(format!("\n{}", bullets.join("\n")));
    }

    [kernel_text.trim().to_string(), header.join("\n"), core.join("\n\n")]
        .into_iter()
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

fn literal_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)? == Value::Bool(true))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use miled_core::{FunctionPolicy, KernelFlags};
    use serde_json::{json, Map, Value};

    use super::{build_spi, function_key, Channel, CreateSpRequest, Language, Tone};

    fn answers(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn build(answers: &Map<String, Value>, kernel: &KernelFlags, policy: &FunctionPolicy) -> super::SpiBuild {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).single().expect("valid timestamp");
        build_spi(answers, kernel, policy, "", created_at)
    }

    #[test]
    fn aliases_and_normalisation() {
        let answers = answers(json!({
            "name": "  ",
            "fullName": "Dana Levi",
            "mail": "dana@uni.example",
            "קורס": "Linear Algebra",
            "audienceChannel": "סטודנט",
            "lang": "English",
            "styleTone": "חד"
        }));

        let built = build(&answers, &KernelFlags::default(), &FunctionPolicy::default());

        assert_eq!(built.spi.identity.faculty_name, "Dana Levi");
        assert_eq!(built.spi.identity.faculty_id, "dana@uni.example");
        assert_eq!(built.spi.identity.course_name, "Linear Algebra");
        assert_eq!(built.spi.channel, Channel::Learning);
        assert_eq!(built.spi.language, Language::En);
        assert_eq!(built.spi.tone, Tone::Direct);
        assert_eq!(built.spi.function, "learning");
        assert!(built.system_prompt.contains("Lecturer/user: Dana Levi"));
        assert!(built.system_prompt.contains("Context: the course \"Linear Algebra\"."));
    }

    #[test]
    fn unknown_values_fall_back_to_defaults() {
        let built = build(
            &answers(json!({"channel": "space", "language": "klingon", "tone": 4})),
            &KernelFlags::default(),
            &FunctionPolicy::default(),
        );

        assert_eq!(built.spi.channel, Channel::Teaching);
        assert_eq!(built.spi.language, Language::He);
        assert_eq!(built.spi.tone, Tone::WarmSocratic);
        assert!(built.system_prompt.contains("Context: general work within an academic setting."));
        assert!(!built.system_prompt.contains("Core rule"));
    }

    #[test]
    fn function_key_prefers_function_then_raw_channel() {
        assert_eq!(function_key(&answers(json!({"function": "grading", "channel": "learning"}))), "grading");
        assert_eq!(function_key(&answers(json!({"channel": " student "}))), "student");
        assert_eq!(function_key(&answers(json!({"botFunction": "x"}))), "teaching");
    }

    #[test]
    fn governance_lines_follow_policy_and_kernel_in_order() {
        let kernel: KernelFlags = [
            ("preserveAgency", true),
            ("noSkipStructuralSteps", true),
            ("evaluationRequiresExplicitCriteria", true),
        ]
        .into_iter()
        .collect();
        let policy = FunctionPolicy { allow_full_solution: Some(false), require_criteria_for_evaluation: None };

        let built = build(&answers(json!({"channel": "learning"})), &kernel, &policy);

        assert!(built.meta.effective_no_full_solution);
        assert!(built.spi.governance.require_criteria_for_evaluation);
        let rules: Vec<&str> =
            built.system_prompt.lines().filter(|line| line.starts_with("- Core rule")).collect();
        assert_eq!(rules.len(), 4);
        assert!(rules[0].contains("do not fully solve tasks"));
        assert!(rules[1].contains("explicit criteria"));
        assert!(rules[2].contains("structural steps"));
        assert!(rules[3].contains("agency"));
    }

    #[test]
    fn no_full_solution_line_is_learning_only() {
        let kernel: KernelFlags = [("noFullSolutionForStudent", true)].into_iter().collect();

        let built = build(&answers(json!({"channel": "teaching"})), &kernel, &FunctionPolicy::default());

        assert!(built.spi.governance.no_full_solution);
        assert!(!built.system_prompt.contains("do not fully solve tasks"));
    }

    #[test]
    fn policy_criteria_overrides_kernel() {
        let kernel: KernelFlags = [("evaluationRequiresExplicitCriteria", true)].into_iter().collect();
        let policy = FunctionPolicy { allow_full_solution: None, require_criteria_for_evaluation: Some(false) };

        let built = build(&answers(json!({})), &kernel, &policy);

        assert!(!built.spi.governance.require_criteria_for_evaluation);
        assert!(built.spi.governance.allow_full_solution);
    }

    #[test]
    fn kernel_text_leads_the_prompt() {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).single().expect("valid timestamp");
        let built = build_spi(
            &Map::new(),
            &KernelFlags::default(),
            &FunctionPolicy::default(),
            "  CONSTITUTION  \n",
            created_at,
        );

        assert!(built.system_prompt.starts_with("CONSTITUTION\n\n=== MilEd.One - System Prompt ==="));
    }

    #[test]
    fn request_tolerates_odd_shapes() {
        let request: CreateSpRequest =
            serde_json::from_str(r#"{"answers": "nope", "exportPublicOnly": "true"}"#).expect("parses");
        assert!(request.answers.is_empty());
        assert!(!request.export_public_only);

        let request: CreateSpRequest =
            serde_json::from_str(r#"{"exportPublicOnly": true}"#).expect("parses");
        assert!(request.export_public_only);
    }
}
