use std::collections::HashMap;

use miled_agent::kernel::KernelFlag;
use miled_core::config::{AppConfig, LoadOptions};
use miled_core::{ConfigRoot, Scope};
use serde::Serialize;

use crate::commands::{block_on, document_source, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            match fetch_document(&config) {
                Ok((described, document)) => {
                    checks.push(DoctorCheck {
                        name: "config_document",
                        status: CheckStatus::Pass,
                        details: format!(
                            "loaded {described} ({} agents)",
                            document.candidates().len()
                        ),
                    });
                    checks.push(lint_check(&document));
                }
                Err(details) => {
                    checks.push(DoctorCheck {
                        name: "config_document",
                        status: CheckStatus::Fail,
                        details,
                    });
                    checks.push(skipped("document_lint", "config document did not load"));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("config_document", "configuration did not load"));
            checks.push(skipped("document_lint", "configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, reason: &str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: format!("skipped because {reason}"),
    }
}

fn fetch_document(config: &AppConfig) -> Result<(String, ConfigRoot), String> {
    let source = document_source(config).map_err(|error| error.to_string())?;
    let document = block_on(source.fetch())?.map_err(|error| error.to_string())?;
    Ok((source.describe(), document))
}

fn lint_check(document: &ConfigRoot) -> DoctorCheck {
    let findings = lint_document(document);
    if findings.is_empty() {
        DoctorCheck {
            name: "document_lint",
            status: CheckStatus::Pass,
            details: "no findings".to_string(),
        }
    } else {
        DoctorCheck { name: "document_lint", status: CheckStatus::Fail, details: findings.join("; ") }
    }
}

/// Problems in a config document that parse fine but change what callers get.
pub fn lint_document(document: &ConfigRoot) -> Vec<String> {
    let mut findings = Vec::new();
    // botType -> id of the first entry every caller can reach.
    let mut open_entries: HashMap<&str, &str> = HashMap::new();

    for candidate in document.candidates() {
        let agent = candidate.agent;
        let id = candidate.id();

        if let Some(earlier) = open_entries.get(agent.bot_type.as_str()) {
            findings.push(format!(
                "agent `{id}` is unreachable: botType `{}` is already served by `{earlier}`",
                agent.bot_type
            ));
        }

        match agent.effective_scope() {
            Scope::Global | Scope::CourseSpecific => {
                open_entries.entry(agent.bot_type.as_str()).or_insert(id);
            }
            Scope::Unrecognized => {
                findings.push(format!("agent `{id}` has an unrecognised scope and is never served"));
            }
            Scope::FacultyPrivate if agent.owner().is_none() => {
                findings.push(format!("agent `{id}` is faculty_private but has no owner"));
            }
            Scope::FacultyPrivate | Scope::Institution => {}
        }
    }

    for (layer, entry) in document.skipped_entries() {
        findings.push(format!(
            "entry `{}` in {layer} is not a readable agent and is ignored: {}",
            entry.key, entry.reason
        ));
    }

    let kernel = &document.engine.kernel;
    for (set, flags) in [("public", &kernel.public), ("private", &kernel.private)] {
        for name in flags.names().filter(|name| KernelFlag::from_name(name).is_none()) {
            findings.push(format!("unknown kernel flag `{name}` in {set} set"));
        }
    }

    findings
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use miled_core::ConfigRoot;

    use super::lint_document;

    fn document(raw: &str) -> ConfigRoot {
        serde_json::from_str(raw).expect("document parses")
    }

    #[test]
    fn clean_document_has_no_findings() {
        let doc = document(
            r#"{
                "universal": {"items": {
                    "tutor": {"botType": "tutor", "scope": "global"},
                    "mine": {"botType": "planner", "scope": "faculty_private", "owner": "f-1"}
                }},
                "engine": {"kernel": {"public": {"preserveAgency": true}}}
            }"#,
        );

        assert!(lint_document(&doc).is_empty());
    }

    #[test]
    fn later_entry_behind_open_entry_is_reported() {
        let doc = document(
            r#"{
                "universal": {"items": {"first": {"botType": "tutor", "scope": "global"}}},
                "branches": {
                    "math": {"items": {"second": {"botType": "tutor", "scope": "institution"}}}
                }
            }"#,
        );

        let findings = lint_document(&doc);

        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("already served by"));
    }

    #[test]
    fn private_entry_first_does_not_shadow() {
        let doc = document(
            r#"{
                "universal": {"items": {
                    "mine": {"botType": "tutor", "scope": "faculty_private", "owner": "f-1"},
                    "shared": {"botType": "tutor", "scope": "global"}
                }}
            }"#,
        );

        assert!(lint_document(&doc).is_empty());
    }

    #[test]
    fn scope_owner_and_flag_problems_are_reported() {
        let doc = document(
            r#"{
                "universal": {"items": {
                    "odd": {"botType": "a", "scope": "department"},
                    "orphan": {"botType": "b", "scope": "faculty_private"}
                }},
                "engine": {"kernel": {"private": {"beKind": true}}}
            }"#,
        );

        let findings = lint_document(&doc);

        assert_eq!(findings.len(), 3);
        assert!(findings.iter().any(|f| f.contains("unrecognised scope")));
        assert!(findings.iter().any(|f| f.contains("no owner")));
        assert!(findings.iter().any(|f| f.contains("`beKind` in private")));
    }

    #[test]
    fn unreadable_entries_are_reported() {
        let doc = document(
            r#"{"universal": {"items": {
                "_comment": "agents below",
                "tutor": {"botType": "tutor"}
            }}}"#,
        );

        let findings = lint_document(&doc);

        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("`_comment` in universal is not a readable agent"));
    }
}
