//! Response synthesis
//!
//! A static table maps every (action kind, success) pair to a template
//! function. Templates read only the payload fields relevant to their action
//! and never echo raw error text.

use crate::response::errors::normalize_error;
use crate::results::{ActionKind, Payload, TaskResult};
use crate::speech::text::{count_phrase, format_duration_ms};
use serde_json::Value;

/// Template turning a result into speech-ready text
pub type ResponseTemplate = fn(&TaskResult) -> String;

const FILE_KEYS: &[&str] = &["file", "filePath", "file_path", "path", "testFile"];
const FEATURE_KEYS: &[&str] = &["feature", "featureName", "feature_name", "name"];
const TEST_NAME_KEYS: &[&str] = &["testName", "test_name", "test", "name"];

/// Select the template for a result
pub fn template_for(action_kind: ActionKind, success: bool) -> ResponseTemplate {
    if !success {
        return error_response;
    }

    match action_kind {
        ActionKind::TestCreated => test_created,
        ActionKind::TestExecuted => test_executed,
        ActionKind::DefectFixed => defect_fixed,
        ActionKind::TestValidated => test_validated,
        ActionKind::StatusReport => status_report,
        ActionKind::PipelineRun => pipeline_run,
        ActionKind::Unknown => acknowledgement,
    }
}

/// Generate the natural-language response for a result
pub fn generate_response(result: &TaskResult) -> String {
    template_for(result.action_kind, result.success)(result)
}

/// What the agent was doing, phrased for "while ..."
fn activity(action_kind: ActionKind) -> &'static str {
    match action_kind {
        ActionKind::TestCreated => "creating your test",
        ActionKind::TestExecuted => "running the test",
        ActionKind::DefectFixed => "fixing the bug",
        ActionKind::TestValidated => "validating the test",
        ActionKind::StatusReport => "checking the status",
        ActionKind::PipelineRun => "running the pipeline",
        ActionKind::Unknown => "working on that",
    }
}

fn error_response(result: &TaskResult) -> String {
    let phrase = normalize_error(result.error_text.as_deref().unwrap_or_default());
    format!(
        "Sorry, I ran into a problem while {}: {}. Want me to try again?",
        activity(result.action_kind),
        phrase
    )
}

fn acknowledgement(_result: &TaskResult) -> String {
    "Done. That task finished successfully.".to_string()
}

fn subject<'a>(payload: &'a Payload, fallback: &'a str) -> &'a str {
    payload
        .get_str(FILE_KEYS)
        .or_else(|| payload.get_str(TEST_NAME_KEYS))
        .unwrap_or(fallback)
}

fn complexity_phrase(payload: &Payload) -> Option<&'static str> {
    if let Some(label) = payload.get_str(&["complexity", "difficulty"]) {
        return match label.to_lowercase().as_str() {
            "simple" | "low" | "easy" | "trivial" => Some("simple"),
            "moderate" | "medium" | "normal" => Some("moderately complex"),
            "complex" | "high" | "hard" => Some("complex"),
            _ => None,
        };
    }

    payload
        .get_f64(&["complexity", "complexityScore"])
        .map(|score| match score {
            s if s <= 3.0 => "simple",
            s if s <= 6.0 => "moderately complex",
            _ => "complex",
        })
}

fn test_created(result: &TaskResult) -> String {
    let payload = &result.payload;
    let feature = payload.get_str(FEATURE_KEYS).unwrap_or("your feature");

    let mut text = match payload.get_str(FILE_KEYS) {
        Some(file) => format!("I've created a test for {} and saved it to {}.", feature, file),
        None => format!("I've created a test for {}.", feature),
    };

    let steps = payload.get_u64(&["steps", "stepCount", "step_count"]);
    match (complexity_phrase(payload), steps) {
        (Some(c), Some(n)) => text.push_str(&format!(
            " It's a {} test with {}.",
            c,
            count_phrase(n, "step", "steps")
        )),
        (Some(c), None) => text.push_str(&format!(" It's a {} test.", c)),
        (None, Some(n)) => text.push_str(&format!(" It has {}.", count_phrase(n, "step", "steps"))),
        (None, None) => {}
    }

    text.push_str(" Would you like me to run it now?");
    text
}

fn test_executed(result: &TaskResult) -> String {
    let payload = &result.payload;
    let name = subject(payload, "the test");
    let assertions = payload.get_u64(&["assertions", "assertionCount", "assertion_count"]);
    let failures = payload.get_u64(&["failures", "failed", "failedAssertions"]);
    let passed = payload
        .get_bool(&["passed", "pass", "status"])
        .unwrap_or_else(|| failures.map_or(true, |f| f == 0));
    let duration_ms = result.effective_duration_ms();

    let took = if duration_ms > 0 {
        format!(" in {}", format_duration_ms(duration_ms))
    } else {
        String::new()
    };

    if passed {
        return match assertions {
            Some(n) => format!(
                "Good news: {} passed with {}{}.",
                name,
                count_phrase(n, "assertion", "assertions"),
                took
            ),
            None => format!("Good news: {} passed{}.", name, took),
        };
    }

    let detail = match (failures, assertions) {
        (Some(f), Some(n)) => format!(" {} of {} assertions failed.", f, n),
        (Some(f), None) => format!(" {} failed.", count_phrase(f, "assertion", "assertions")),
        (None, Some(n)) => format!(" It ran {}.", count_phrase(n, "assertion", "assertions")),
        (None, None) => String::new(),
    };

    format!(
        "{} failed{}.{} Want me to try to fix it?",
        name, took, detail
    )
}

/// Lines added or removed in a unified diff
fn changed_lines(diff: &str) -> u64 {
    diff.lines()
        .filter(|l| {
            (l.starts_with('+') && !l.starts_with("+++"))
                || (l.starts_with('-') && !l.starts_with("---"))
        })
        .count() as u64
}

fn defect_fixed(result: &TaskResult) -> String {
    let payload = &result.payload;

    let mut text = match payload.get_str(FILE_KEYS) {
        Some(file) => format!("I fixed the bug in {}", file),
        None => "I fixed the bug".to_string(),
    };

    match payload.get_str(&["description", "summary", "fix", "rootCause"]) {
        Some(description) => text.push_str(&format!(": {}.", description.trim_end_matches('.'))),
        None => text.push('.'),
    }

    let lines = payload
        .get_str(&["diff", "patch"])
        .map(changed_lines)
        .or_else(|| payload.get_u64(&["linesChanged", "lines_changed"]));
    if let Some(n) = lines.filter(|n| *n > 0) {
        text.push_str(&format!(" The change touches {}.", count_phrase(n, "line", "lines")));
    }

    if let Some(attempts) = payload.get_u64(&["attempts", "attempt"]).filter(|a| *a > 1) {
        text.push_str(&format!(" It took {} attempts.", attempts));
    }

    text.push_str(" Should I re-run the test to confirm?");
    text
}

fn test_validated(result: &TaskResult) -> String {
    let payload = &result.payload;
    let name = subject(payload, "the test");
    let issues = payload.get_u64(&["issues", "issueCount", "issue_count"]).or_else(|| {
        payload
            .get_array(&["issues", "problems"])
            .map(|a| a.len() as u64)
    });
    let valid = payload
        .get_bool(&["valid", "isValid", "passed"])
        .unwrap_or_else(|| issues.map_or(true, |n| n == 0));
    let screenshots = payload.get_u64(&["screenshots", "screenshotCount", "screenshot_count"]);

    let evidence = match screenshots {
        Some(n) if n > 0 => format!(" across {}", count_phrase(n, "screenshot", "screenshots")),
        _ => String::new(),
    };

    if valid {
        format!("I validated {}. Everything checks out{}.", name, evidence)
    } else {
        match issues.filter(|n| *n > 0) {
            Some(n) => format!(
                "I validated {} and found {} that need attention{}.",
                name,
                count_phrase(n, "issue", "issues"),
                evidence
            ),
            None => format!(
                "I validated {} and it doesn't look right yet{}.",
                name, evidence
            ),
        }
    }
}

fn status_report(result: &TaskResult) -> String {
    let payload = &result.payload;
    let total = payload.get_u64(&["total", "totalTests", "tests"]);
    let passing = payload.get_u64(&["passing", "passed"]);
    let failing = payload.get_u64(&["failing", "failed"]);
    let running = payload.get_u64(&["running", "inProgress", "pending"]);

    let mut text = "Here's where things stand:".to_string();
    let mut parts = Vec::new();
    if let Some(n) = total {
        parts.push(count_phrase(n, "test", "tests"));
    }
    if let Some(n) = passing {
        parts.push(format!("{} passing", n));
    }
    if let Some(n) = failing {
        parts.push(format!("{} failing", n));
    }
    if let Some(n) = running.filter(|n| *n > 0) {
        parts.push(format!("{} still running", n));
    }

    if parts.is_empty() {
        text.push_str(" nothing is running right now.");
    } else {
        text.push(' ');
        text.push_str(&parts.join(", "));
        text.push('.');
    }

    if let Some(summary) = payload.get_str(&["summary", "message"]) {
        text.push(' ');
        text.push_str(summary);
        if !summary.ends_with(&['.', '!', '?'][..]) {
            text.push('.');
        }
    }

    text
}

fn stage_succeeded(status: &str) -> bool {
    matches!(
        status.to_lowercase().as_str(),
        "passed" | "pass" | "completed" | "complete" | "success" | "succeeded" | "done" | "ok"
    )
}

fn stage_failed(status: &str) -> bool {
    matches!(
        status.to_lowercase().as_str(),
        "failed" | "fail" | "error" | "errored" | "cancelled" | "aborted"
    )
}

fn pipeline_run(result: &TaskResult) -> String {
    let payload = &result.payload;

    let (completed, total, failed_stage) = match payload.get_array(&["stages"]) {
        Some(stages) => {
            let status_of = |stage: &Value| {
                stage
                    .get("status")
                    .or_else(|| stage.get("state"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let completed = stages.iter().filter(|s| stage_succeeded(&status_of(*s))).count() as u64;
            let failed = stages
                .iter()
                .find(|s| stage_failed(&status_of(*s)))
                .and_then(|s| s.get("name").and_then(Value::as_str))
                .map(str::to_string);
            (Some(completed), Some(stages.len() as u64), failed)
        }
        None => (
            payload.get_u64(&["completedStages", "stagesCompleted", "completed"]),
            payload.get_u64(&["totalStages", "stageCount", "total"]),
            payload.get_str(&["failedStage", "failed_stage"]).map(str::to_string),
        ),
    };

    let mut text = match (completed, total) {
        (Some(c), Some(t)) => format!("The pipeline completed {} of {}", c, count_phrase(t, "stage", "stages")),
        (Some(c), None) => format!("The pipeline completed {}", count_phrase(c, "stage", "stages")),
        _ => "The pipeline run is finished".to_string(),
    };

    match failed_stage {
        Some(stage) => text.push_str(&format!(" and stopped at {}.", stage)),
        None => text.push('.'),
    }

    if let Some(state) = payload.get_str(&["state", "status", "finalState"]) {
        text.push_str(&format!(" Final state: {}.", state.trim_end_matches('.')));
    }

    let duration_ms = result.effective_duration_ms();
    if duration_ms > 0 {
        text.push_str(&format!(" It took {}.", format_duration_ms(duration_ms)));
    }

    text
}
