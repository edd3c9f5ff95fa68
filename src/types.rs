//! Result types shared by the executor, the fix loop and the report renderers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// A console message emitted by the page during one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// Message level as reported by the browser ("log", "error", "warning", ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Rendered message text
    pub text: String,
}

impl ConsoleEntry {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }
}

/// A network request that failed during one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFailure {
    /// Request URL
    pub url: String,

    /// Failure reason reported by the browser
    pub failure: String,
}

impl NetworkFailure {
    pub fn new(url: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            failure: failure.into(),
        }
    }
}

/// Outcome of a single test attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Attempt name (e.g. "modal_open_test_iter2")
    pub name: String,

    /// Whether the attempt passed
    pub success: bool,

    /// Elapsed seconds for the attempt
    pub duration: f64,

    /// Error message if failed
    pub error: Option<String>,

    /// Screenshot taken on failure
    pub screenshot: Option<PathBuf>,

    /// Structured data attached by the test procedure (typically a serialized verification)
    pub data_verification: Option<Value>,

    /// Console output in emission order
    #[serde(default)]
    pub console_logs: Vec<ConsoleEntry>,

    /// Failed requests in emission order
    #[serde(default)]
    pub network_failures: Vec<NetworkFailure>,
}

impl TestResult {
    /// Key used to count repeated errors. Attempts without a message share "unknown".
    pub fn error_key(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown")
    }
}

/// Caller-reported certainty that a fix addressed the root cause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::Unknown => "unknown",
        }
    }

    /// Parse a caller-supplied confidence string. Unrecognised values map to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            "low" => Confidence::Low,
            _ => Confidence::Unknown,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of an iteration where a fix was attempted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    /// 1-based iteration number
    pub iteration: usize,

    /// The failed attempt that triggered the fix
    pub test_result: TestResult,

    /// Explanation of the failure, if the fix procedure gave one
    pub diagnosis: Option<String>,

    /// Description of the remedy that was applied
    pub fix_applied: Option<String>,

    pub confidence: Confidence,
}

/// Why the loop handed the failure upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// The same error text reached the repeated-error ceiling
    RepeatedError,
    /// The fix procedure could not diagnose the failure
    CannotDiagnose,
    /// The iteration ceiling was reached and the final recheck still failed
    MaxIterations,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::RepeatedError => "repeated_error",
            EscalationReason::CannotDiagnose => "cannot_diagnose",
            EscalationReason::MaxIterations => "max_iterations",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "repeated_error" => Some(EscalationReason::RepeatedError),
            "cannot_diagnose" => Some(EscalationReason::CannotDiagnose),
            "max_iterations" => Some(EscalationReason::MaxIterations),
            _ => None,
        }
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final report of an entire fix-loop run
///
/// `success` and `escalation_needed` are never both true, and
/// `escalation_question` is present exactly when `escalation_needed` is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixLoopResult {
    pub success: bool,

    /// Test attempts made, counting the final one
    pub total_iterations: usize,

    /// Wall-clock seconds from loop start to return
    pub elapsed_time: f64,

    /// Fix attempts in chronological order
    pub iterations: Vec<IterationResult>,

    /// The last attempt produced
    pub final_test: TestResult,

    pub escalation_needed: bool,

    pub escalation_question: Option<String>,

    /// Termination reason when escalated
    #[serde(default)]
    pub escalation_reason: Option<EscalationReason>,
}

impl FixLoopResult {
    /// Terminal value for a run whose last attempt passed
    pub fn passed(
        total_iterations: usize,
        elapsed_time: f64,
        iterations: Vec<IterationResult>,
        final_test: TestResult,
    ) -> Self {
        Self {
            success: true,
            total_iterations,
            elapsed_time,
            iterations,
            final_test,
            escalation_needed: false,
            escalation_question: None,
            escalation_reason: None,
        }
    }

    /// Terminal value for a run that gave up and asks for help
    pub fn escalated(
        total_iterations: usize,
        elapsed_time: f64,
        iterations: Vec<IterationResult>,
        final_test: TestResult,
        reason: EscalationReason,
        question: String,
    ) -> Self {
        Self {
            success: false,
            total_iterations,
            elapsed_time,
            iterations,
            final_test,
            escalation_needed: true,
            escalation_question: Some(question),
            escalation_reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(error: Option<&str>) -> TestResult {
        TestResult {
            name: "t".into(),
            success: false,
            duration: 0.0,
            error: error.map(str::to_string),
            screenshot: None,
            data_verification: None,
            console_logs: vec![],
            network_failures: vec![],
        }
    }

    #[test]
    fn test_error_key_defaults_to_unknown() {
        assert_eq!(failed(None).error_key(), "unknown");
        assert_eq!(failed(Some("boom")).error_key(), "boom");
    }

    #[test]
    fn test_confidence_parse_is_lenient() {
        assert_eq!(Confidence::parse("HIGH"), Confidence::High);
        assert_eq!(Confidence::parse(" low "), Confidence::Low);
        assert_eq!(Confidence::parse("certain"), Confidence::Unknown);
    }

    #[test]
    fn test_confidence_deserializes_unknown_variants() {
        let c: Confidence = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(c, Confidence::Medium);
        let c: Confidence = serde_json::from_str("\"maybe\"").unwrap();
        assert_eq!(c, Confidence::Unknown);
    }

    #[test]
    fn test_console_entry_serializes_type_field() {
        let json = serde_json::to_value(ConsoleEntry::new("error", "x")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "text": "x"}));
    }

    #[test]
    fn test_escalation_reason_tags() {
        for reason in [
            EscalationReason::RepeatedError,
            EscalationReason::CannotDiagnose,
            EscalationReason::MaxIterations,
        ] {
            assert_eq!(EscalationReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(EscalationReason::parse("bored"), None);
    }

    #[test]
    fn test_escalated_result_never_succeeds() {
        let result = FixLoopResult::escalated(
            1,
            0.1,
            vec![],
            failed(Some("x")),
            EscalationReason::CannotDiagnose,
            "help".into(),
        );
        assert!(!result.success);
        assert!(result.escalation_needed);
        assert_eq!(result.escalation_question.as_deref(), Some("help"));
    }
}
