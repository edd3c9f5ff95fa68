//! Markdown summary of a fix-loop run.

use chrono::{DateTime, Local, SecondsFormat};
use std::fmt::Write;

use crate::types::{FixLoopResult, TestResult};

/// Render `result`, stamped with the current local time
pub fn render_report(result: &FixLoopResult) -> String {
    render_report_at(result, Local::now())
}

/// Render `result` stamped with `rendered_at`
pub fn render_report_at(result: &FixLoopResult, rendered_at: DateTime<Local>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Live App Test Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Status:** {}", status(result.success));
    let _ = writeln!(out, "**Iterations:** {}", result.total_iterations);
    let _ = writeln!(out, "**Elapsed:** {:.2}s", result.elapsed_time);
    let _ = writeln!(
        out,
        "**Generated:** {}",
        rendered_at.to_rfc3339_opts(SecondsFormat::Secs, false)
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "## Final Test");
    let _ = writeln!(out);
    final_test_section(&mut out, &result.final_test);

    if !result.iterations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Iterations");
        for it in &result.iterations {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "### Iteration {} {}",
                it.iteration,
                glyph(it.test_result.success)
            );
            let _ = writeln!(
                out,
                "- **Result:** {}",
                it.test_result.error.as_deref().unwrap_or("Passed")
            );
            let _ = writeln!(
                out,
                "- **Diagnosis:** {}",
                it.diagnosis.as_deref().unwrap_or("-")
            );
            let _ = writeln!(
                out,
                "- **Fix Applied:** {}",
                it.fix_applied.as_deref().unwrap_or("-")
            );
            let _ = writeln!(out, "- **Confidence:** {}", it.confidence);
        }
    }

    if result.escalation_needed {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Escalation Required");
        if let Some(reason) = result.escalation_reason {
            let _ = writeln!(out);
            let _ = writeln!(out, "**Reason:** {}", reason);
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{}",
            result.escalation_question.as_deref().unwrap_or("").trim_end()
        );
    }

    out
}

fn final_test_section(out: &mut String, test: &TestResult) {
    let _ = writeln!(out, "- **Name:** {}", test.name);
    let _ = writeln!(out, "- **Result:** {}", glyph(test.success));
    let _ = writeln!(out, "- **Duration:** {:.2}s", test.duration);
    if let Some(error) = &test.error {
        let _ = writeln!(out, "- **Error:** {}", error);
    }
    if let Some(path) = &test.screenshot {
        let _ = writeln!(out, "- **Screenshot:** {}", path.display());
    }
    if let Some(data) = &test.data_verification {
        let verdict = match data.get("success").and_then(|v| v.as_bool()) {
            Some(true) => "matched",
            Some(false) => "mismatch",
            None => "attached",
        };
        let _ = writeln!(out, "- **Data Verification:** {}", verdict);
    }
    if !test.console_logs.is_empty() {
        let _ = writeln!(out, "- **Console Messages:** {}", test.console_logs.len());
    }
    if !test.network_failures.is_empty() {
        let _ = writeln!(out, "- **Failed Requests:** {}", test.network_failures.len());
    }
}

fn status(success: bool) -> &'static str {
    if success { "✅ PASSED" } else { "❌ FAILED" }
}

fn glyph(success: bool) -> &'static str {
    if success { "✅" } else { "❌" }
}
