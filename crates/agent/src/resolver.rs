use miled_core::{AgentDefinition, Candidate, ConfigRoot, RequestContext, Scope};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Empty bot type, no agent of that type, or no matching agent the caller may use.
    #[error("agent not found")]
    NotFound,
}

/// An agent picked for a request, with where it came from.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedAgent<'a> {
    pub id: &'a str,
    pub layer: &'a str,
    pub agent: &'a AgentDefinition,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BotResolver;

impl BotResolver {
    pub fn new() -> Self {
        Self
    }

    /// First agent in search order whose bot type matches and that the
    /// caller may access. Earlier entries win even when a later one would
    /// also qualify.
    pub fn resolve<'a>(
        &self,
        config: &'a ConfigRoot,
        bot_type: &str,
        context: &RequestContext,
    ) -> Result<ResolvedAgent<'a>, ResolveError> {
        if bot_type.is_empty() {
            return Err(ResolveError::NotFound);
        }

        config
            .candidates()
            .into_iter()
            .find(|candidate| {
                candidate.agent.bot_type == bot_type && has_access(candidate.agent, context)
            })
            .map(resolved)
            .ok_or(ResolveError::NotFound)
    }
}

fn resolved(candidate: Candidate<'_>) -> ResolvedAgent<'_> {
    ResolvedAgent { id: candidate.id(), layer: candidate.layer_tag(), agent: candidate.agent }
}

pub fn has_access(agent: &AgentDefinition, context: &RequestContext) -> bool {
    match agent.effective_scope() {
        Scope::Global => true,
        Scope::Institution => context.faculty_id().is_some(),
        Scope::FacultyPrivate => match (agent.owner(), context.faculty_id()) {
            (Some(owner), Some(faculty_id)) => owner == faculty_id,
            _ => false,
        },
        // Narrower course enforcement is not modelled yet.
        Scope::CourseSpecific => true,
        Scope::Unrecognized => false,
    }
}

#[cfg(test)]
mod tests {
    use miled_core::{AgentDefinition, ConfigRoot, RequestContext, Scope};

    use super::{has_access, BotResolver, ResolveError};

    fn config() -> ConfigRoot {
        serde_json::from_str(
            r#"{
                "universal": {"items": {
                    "private-tutor": {
                        "botType": "tutor", "name": "Private Tutor",
                        "scope": "faculty_private", "owner": "fac1"
                    },
                    "open-tutor": {"botType": "tutor", "name": "Open Tutor"},
                    "staff-room": {"botType": "staff", "scope": "institution"}
                }},
                "branches": {
                    "science": {"items": {
                        "lab": {"botType": "lab", "name": "Lab Partner", "scope": "course_specific"},
                        "late-tutor": {"botType": "tutor", "name": "Late Tutor"},
                        "odd": {"botType": "odd", "scope": "department"}
                    }}
                }
            }"#,
        )
        .expect("config parses")
    }

    fn agent(scope: Option<Scope>, owner: Option<&str>) -> AgentDefinition {
        AgentDefinition {
            bot_type: "tutor".to_string(),
            scope,
            owner: owner.map(ToString::to_string),
            ..AgentDefinition::default()
        }
    }

    #[test]
    fn first_accessible_match_wins() {
        let config = config();
        let resolver = BotResolver::new();

        let owner = resolver
            .resolve(&config, "tutor", &RequestContext::with_faculty("fac1"))
            .expect("owner resolves");
        assert_eq!(owner.agent.name.as_deref(), Some("Private Tutor"));

        let stranger = resolver
            .resolve(&config, "tutor", &RequestContext::with_faculty("fac2"))
            .expect("stranger resolves");
        assert_eq!(stranger.agent.name.as_deref(), Some("Open Tutor"));
        assert_eq!(stranger.id, "open-tutor");
        assert_eq!(stranger.layer, "universal");
    }

    #[test]
    fn branch_entries_are_searched_after_universal() {
        let config = config();
        let found = BotResolver::new()
            .resolve(&config, "lab", &RequestContext::default())
            .expect("lab resolves");

        assert_eq!(found.layer, "science");
        assert_eq!(found.agent.name.as_deref(), Some("Lab Partner"));
    }

    #[test]
    fn unknown_or_empty_bot_type_is_not_found() {
        let config = config();
        let resolver = BotResolver::new();

        assert_eq!(
            resolver.resolve(&config, "astronomy", &RequestContext::default()).err(),
            Some(ResolveError::NotFound)
        );
        assert_eq!(
            resolver.resolve(&config, "", &RequestContext::default()).err(),
            Some(ResolveError::NotFound)
        );
    }

    #[test]
    fn denied_access_looks_the_same_as_missing() {
        let config = config();
        let resolver = BotResolver::new();

        assert_eq!(
            resolver.resolve(&config, "staff", &RequestContext::default()).err(),
            Some(ResolveError::NotFound)
        );
        assert_eq!(
            resolver.resolve(&config, "odd", &RequestContext::with_faculty("fac1")).err(),
            Some(ResolveError::NotFound)
        );
    }

    #[test]
    fn faculty_private_requires_matching_owner() {
        let private = agent(Some(Scope::FacultyPrivate), Some("fac1"));

        assert!(has_access(&private, &RequestContext::with_faculty("fac1")));
        assert!(!has_access(&private, &RequestContext::with_faculty("fac2")));
        assert!(!has_access(&private, &RequestContext::default()));
        assert!(!has_access(&private, &RequestContext::with_faculty("")));
        let ownerless = agent(Some(Scope::FacultyPrivate), None);
        assert!(!has_access(&ownerless, &RequestContext::with_faculty("fac1")));
    }

    #[test]
    fn institution_requires_a_faculty_id() {
        let institution = agent(Some(Scope::Institution), None);

        assert!(has_access(&institution, &RequestContext::with_faculty("fac9")));
        assert!(!has_access(&institution, &RequestContext::with_faculty("")));
        assert!(!has_access(&institution, &RequestContext::default()));
    }

    #[test]
    fn open_scopes_and_unknown_scopes() {
        let context = RequestContext::default();

        assert!(has_access(&agent(None, None), &context));
        assert!(has_access(&agent(Some(Scope::Global), None), &context));
        assert!(has_access(&agent(Some(Scope::CourseSpecific), None), &context));
        assert!(!has_access(&agent(Some(Scope::Unrecognized), None), &context));
    }
}
