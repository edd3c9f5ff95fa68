//! Escalation questions for failures the loop cannot resolve on its own.
//!
//! The output is markdown-style text meant for a human or an upstream agent.
//! It is never parsed back.

use std::fmt::Write;

use crate::types::{EscalationReason, IterationResult, TestResult};

/// How many trailing fix attempts are listed
const ATTEMPT_WINDOW: usize = 3;

/// How many trailing console entries are included
const CONSOLE_WINDOW: usize = 5;

/// Build the escalation question for a reason tag.
///
/// Unknown tags produce a one-line `Test failed: {error}` question.
pub fn build_escalation_question(
    test_result: &TestResult,
    iterations: &[IterationResult],
    reason: &str,
) -> String {
    match EscalationReason::parse(reason) {
        Some(reason) => build_question(test_result, iterations, reason),
        None => format!("Test failed: {}", error_text(test_result)),
    }
}

/// Build the escalation question for a known reason
pub fn build_question(
    test_result: &TestResult,
    iterations: &[IterationResult],
    reason: EscalationReason,
) -> String {
    let error = error_text(test_result);
    let mut out = String::new();

    let _ = writeln!(out, "## Issue");
    match reason {
        EscalationReason::RepeatedError => {
            let previous = iterations
                .iter()
                .filter(|it| it.test_result.error == test_result.error)
                .count();
            let _ = writeln!(out, "Same error persisting after {} fix attempts.", previous);
        }
        EscalationReason::CannotDiagnose => {
            let _ = writeln!(out, "Test failing but unable to determine root cause.");
        }
        EscalationReason::MaxIterations => {
            let _ = writeln!(out, "Unable to fix after {} iterations.", iterations.len());
        }
    }

    if reason != EscalationReason::CannotDiagnose {
        let heading = match reason {
            EscalationReason::RepeatedError => "What I Tried",
            _ => "Attempt History",
        };
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", heading);
        out.push_str(&attempt_lines(iterations));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Error");
    let _ = writeln!(out, "{}", error);

    let _ = writeln!(out);
    let _ = writeln!(out, "## Console Output");
    let start = test_result.console_logs.len().saturating_sub(CONSOLE_WINDOW);
    let _ = writeln!(out, "{}", pretty_or_none(&test_result.console_logs[start..]));

    let _ = writeln!(out);
    let _ = writeln!(out, "## Network Failures");
    let _ = writeln!(out, "{}", pretty_or_none(&test_result.network_failures));

    let _ = writeln!(out);
    let _ = writeln!(out, "## Screenshot");
    let screenshot = test_result
        .screenshot
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "None".to_string());
    let _ = writeln!(out, "{}", screenshot);

    let _ = writeln!(out);
    let _ = writeln!(out, "## Specific Question");
    out.push_str(closing_question(reason));
    out.push('\n');

    out
}

fn error_text(test_result: &TestResult) -> &str {
    test_result.error.as_deref().unwrap_or("Unknown error")
}

/// `  {n}. {fix} → {error}` for the last few iterations, numbered within the window
fn attempt_lines(iterations: &[IterationResult]) -> String {
    if iterations.is_empty() {
        return "  (no fixes attempted)\n".to_string();
    }

    let start = iterations.len().saturating_sub(ATTEMPT_WINDOW);
    iterations[start..]
        .iter()
        .enumerate()
        .map(|(index, it)| {
            format!(
                "  {}. {} → {}\n",
                index + 1,
                it.fix_applied.as_deref().unwrap_or("No fix"),
                it.test_result.error.as_deref().unwrap_or("Unknown error")
            )
        })
        .collect()
}

fn pretty_or_none<T: serde::Serialize>(items: &[T]) -> String {
    if items.is_empty() {
        return "None".to_string();
    }
    serde_json::to_string_pretty(items).unwrap_or_else(|_| "None".to_string())
}

fn closing_question(reason: EscalationReason) -> &'static str {
    match reason {
        EscalationReason::RepeatedError => {
            "What am I missing about why this error keeps occurring? \
             Is there external state, configuration, or a dependency I should check?"
        }
        EscalationReason::CannotDiagnose => {
            "Can you help identify what is causing this failure? \
             The error message does not point to an obvious fix."
        }
        EscalationReason::MaxIterations => {
            "Several approaches have failed. Should I:\n\
             1. Try a completely different approach?\n\
             2. Revisit a fundamental misunderstanding about how this feature should work?\n\
             3. Consider external factors (other components, state, timing)?"
        }
    }
}
