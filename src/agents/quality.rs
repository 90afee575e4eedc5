//! Quality gate: review → auto-fix → QA for code-producing tasks.
//!
//! Triggered only by results from the `code` agent that changed files. A
//! pure predicate over the change set and the task description decides
//! whether the gate runs at all; the gate then loops review → fix → review
//! up to a fixed iteration bound and finishes with a QA pass. Review and QA
//! agents run through the scheduler's single-task path, sharing its timeout
//! and cancellation semantics.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agents::executor::{AgentResult, SessionContext};
use crate::agents::planner::extract_json_object;
use crate::agents::profiles::AgentKind;
use crate::agents::scheduler::TaskScheduler;

/// Substrings that mark a change as risky regardless of size.
const RISK_TERMS: &[&str] = &[
    "auth",
    "security",
    "payment",
    "credential",
    "login",
    "token",
    "secret",
    "password",
];

/// Changes touching more than this many files always get a review.
const FILE_COUNT_THRESHOLD: usize = 2;

// ─── Structured agent outputs ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Security,
    Performance,
    Correctness,
    Maintenance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewIssue {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub severity: Severity,
    pub category: IssueCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    #[serde(default)]
    pub files_reviewed: Vec<String>,
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
    pub overall_score: f64,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaCheck {
    pub name: String,
    pub command: String,
    pub passed: bool,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaReport {
    #[serde(default)]
    pub checks: Vec<QaCheck>,
    pub passed: bool,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Parse a review agent's reply. The reply may wrap the JSON in prose.
pub fn parse_review(output: &str) -> Option<ReviewReport> {
    let candidate = extract_json_object(output)?;
    serde_json::from_str(candidate).ok()
}

/// Parse a QA agent's reply.
pub fn parse_qa(output: &str) -> Option<QaReport> {
    let candidate = extract_json_object(output)?;
    serde_json::from_str(candidate).ok()
}

// ─── Predicate ─────────────────────────────────────────────────────────────

/// Whether a change set needs review (and, symmetrically, QA): more than
/// two files touched, or any path or the task description matches the risk
/// heuristics.
pub fn requires_review(files: &[String], description: &str) -> bool {
    if files.len() > FILE_COUNT_THRESHOLD {
        return true;
    }
    let description = description.to_lowercase();
    if RISK_TERMS.iter().any(|term| description.contains(term)) {
        return true;
    }
    files.iter().any(|file| {
        let file = file.to_lowercase();
        RISK_TERMS.iter().any(|term| file.contains(term))
    })
}

// ─── Gate ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Auto-fix iterations before the gate gives up on approval.
    pub max_fix_iterations: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_fix_iterations: 2,
        }
    }
}

/// What the gate did for one code result.
#[derive(Debug, Clone, Default)]
pub struct GateReport {
    pub triggered: bool,
    pub review_runs: usize,
    pub fix_runs: usize,
    pub approved: bool,
    pub issues_found: usize,
    pub qa: Option<QaReport>,
    pub warnings: Vec<String>,
}

pub struct QualityGate {
    scheduler: Arc<TaskScheduler>,
    config: GateConfig,
}

impl QualityGate {
    pub fn new(scheduler: Arc<TaskScheduler>, config: GateConfig) -> Self {
        Self { scheduler, config }
    }

    /// Run the gate for one agent result.
    #[tracing::instrument(name = "quality.gate", skip_all, fields(agent = %result.agent))]
    pub async fn run(
        &self,
        result: &AgentResult,
        user_input: &str,
        session: &SessionContext,
        cancel: &CancellationToken,
    ) -> GateReport {
        let mut report = GateReport::default();

        let files = result.changed_files();
        if result.agent != AgentKind::Code || files.is_empty() {
            return report;
        }
        if !requires_review(&files, user_input) {
            log::debug!("change below review threshold ({} files)", files.len());
            return report;
        }
        report.triggered = true;

        // review → (fix → review) up to the iteration bound
        let mut approved = false;
        loop {
            let review_result = self
                .scheduler
                .run_single(
                    AgentKind::Review,
                    &review_description(&files, user_input),
                    session,
                    cancel,
                )
                .await;
            report.review_runs += 1;

            let Some(review) = parse_review(&review_result.output) else {
                log::warn!("review output was not parseable; treating as pass");
                approved = true;
                break;
            };
            report.issues_found += review.issues.len();

            if review.approved {
                approved = true;
                break;
            }
            if report.fix_runs >= self.config.max_fix_iterations {
                report.warnings.push(format!(
                    "review not approved after {} fix iteration(s)",
                    report.fix_runs
                ));
                break;
            }

            let fix = self
                .scheduler
                .run_single(
                    AgentKind::Code,
                    &fix_description(&review.issues),
                    session,
                    cancel,
                )
                .await;
            report.fix_runs += 1;
            if !fix.success {
                report
                    .warnings
                    .push(format!("auto-fix attempt failed: {}", fix.summary));
                break;
            }
        }
        report.approved = approved;

        // requires_qa is the same predicate that triggered the gate.
        if approved {
            let qa_result = self
                .scheduler
                .run_single(
                    AgentKind::Qa,
                    &qa_description(&files, user_input),
                    session,
                    cancel,
                )
                .await;
            match parse_qa(&qa_result.output) {
                Some(qa) => {
                    if !qa.passed {
                        report.warnings.push(format!(
                            "QA did not pass: {}",
                            qa.blockers.join("; ")
                        ));
                    }
                    report.qa = Some(qa);
                }
                None => {
                    log::warn!("QA output was not parseable; treating as pass");
                }
            }
        }

        report
    }
}

fn review_description(files: &[String], user_input: &str) -> String {
    format!(
        "Review the following changed files against the original request.\n\
         Original request: {user_input}\n\
         Changed files:\n{}",
        files
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

fn fix_description(issues: &[ReviewIssue]) -> String {
    let rendered = issues
        .iter()
        .map(|issue| {
            let location = match issue.line {
                Some(line) => format!("{}:{line}", issue.file),
                None => issue.file.clone(),
            };
            let suggestion = issue
                .suggestion
                .as_deref()
                .map(|s| format!(" Suggestion: {s}"))
                .unwrap_or_default();
            format!(
                "- [{:?}/{:?}] {location}: {}{suggestion}",
                issue.severity, issue.category, issue.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Fix the following review issues:\n{rendered}")
}

fn qa_description(files: &[String], user_input: &str) -> String {
    format!(
        "Run the project's quality checks for this change.\n\
         Original request: {user_input}\n\
         Files changed: {}",
        files.join(", ")
    )
}
