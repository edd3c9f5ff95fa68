//! The fix-retry loop.
//!
//! Each iteration runs one attempt. A failed attempt is classified by its
//! error text and handed to the fix procedure, and the loop goes around again
//! until one of these happens:
//!
//! - an attempt passes
//! - the same error key reaches `max_same_error` occurrences
//! - the fix procedure cannot diagnose the failure
//! - `max_iterations` fixes have been applied, after which one final
//!   unconditional recheck decides the outcome
//!
//! ```text
//! Running(1) -> Running(2) -> ... -> Running(max) -> recheck -> Success | Exhausted
//!      |             |                    |
//!      +-------------+--------------------+--> Success | Escalated(reason)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;

use crate::config::{DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_SAME_ERROR};
use crate::escalation::build_question;
use crate::executor::{TestExecutor, TestProcedure};
use crate::types::{Confidence, EscalationReason, FixLoopResult, IterationResult, TestResult};

/// Result type for fix procedures that can fail outright
pub type FixResult<T> = Result<T, FixError>;

/// Fix procedure failures; messages embed the underlying cause
#[derive(Debug, Error)]
pub enum FixError {
    #[error("fix result must be an object or null, got {0}")]
    NotAnObject(String),

    #[error("malformed fix result: {0}")]
    Malformed(serde_json::Error),

    #[error("failed to run fix command `{program}`: {reason}")]
    Spawn {
        program: String,
        reason: std::io::Error,
    },

    #[error("fix command exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("I/O error talking to fix command: {0}")]
    Io(std::io::Error),
}

impl From<serde_json::Error> for FixError {
    fn from(err: serde_json::Error) -> Self {
        FixError::Malformed(err)
    }
}

impl From<std::io::Error> for FixError {
    fn from(err: std::io::Error) -> Self {
        FixError::Io(err)
    }
}

/// Ceilings for one loop run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopLimits {
    /// Fix iterations before the final recheck
    pub max_iterations: usize,
    /// Occurrences of one error key that trigger escalation
    pub max_same_error: usize,
}

impl LoopLimits {
    pub fn new(max_iterations: usize, max_same_error: usize) -> Self {
        Self {
            max_iterations,
            max_same_error,
        }
    }
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_SAME_ERROR)
    }
}

/// What a fix procedure reports after applying a remedy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixDescriptor {
    #[serde(default)]
    pub diagnosis: Option<String>,

    #[serde(default)]
    pub applied: Option<String>,

    /// Defaults to medium when absent
    #[serde(default)]
    pub confidence: Option<Confidence>,
}

impl FixDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnosis(mut self, diagnosis: impl Into<String>) -> Self {
        self.diagnosis = Some(diagnosis.into());
        self
    }

    pub fn applied(mut self, applied: impl Into<String>) -> Self {
        self.applied = Some(applied.into());
        self
    }

    pub fn confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Parse a loose fix payload: `null` means the failure could not be diagnosed.
    pub fn from_value(value: Value) -> FixResult<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Object(_) => Ok(Some(serde_json::from_value(value)?)),
            other => Err(FixError::NotAnObject(other.to_string())),
        }
    }
}

/// A fix procedure: inspect a failure and try to remedy it.
///
/// Returning `None` signals that the failure cannot be diagnosed.
pub trait FixProcedure {
    fn attempt_fix(&mut self, result: &TestResult, iteration: usize) -> Option<FixDescriptor>;
}

impl<F> FixProcedure for F
where
    F: FnMut(&TestResult, usize) -> Option<FixDescriptor>,
{
    fn attempt_fix(&mut self, result: &TestResult, iteration: usize) -> Option<FixDescriptor> {
        self(result, iteration)
    }
}

/// Runs one named attempt
pub trait AttemptRunner {
    fn run_attempt(&mut self, name: &str) -> TestResult;
}

impl<F> AttemptRunner for F
where
    F: FnMut(&str) -> TestResult,
{
    fn run_attempt(&mut self, name: &str) -> TestResult {
        self(name)
    }
}

/// Runs attempts of one test procedure through a [`TestExecutor`]
pub struct ExecutorRunner<'a> {
    executor: &'a TestExecutor,
    test: &'a mut dyn TestProcedure,
}

impl<'a> ExecutorRunner<'a> {
    pub fn new(executor: &'a TestExecutor, test: &'a mut dyn TestProcedure) -> Self {
        Self { executor, test }
    }
}

impl AttemptRunner for ExecutorRunner<'_> {
    fn run_attempt(&mut self, name: &str) -> TestResult {
        self.executor.execute(self.test, name)
    }
}

/// Where a loop run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// About to run iteration `n` (1-based)
    Running(usize),
    Success,
    Escalated(EscalationReason),
    /// Final recheck failed after all iterations were used
    Exhausted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopState::Running(_))
    }
}

/// The fix-retry state machine
#[derive(Debug)]
pub struct FixLoop {
    limits: LoopLimits,
    state: LoopState,
}

impl FixLoop {
    pub fn new(limits: LoopLimits) -> Self {
        Self {
            limits,
            state: LoopState::Running(1),
        }
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    /// State after the last transition
    pub fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, "fix loop transition");
        self.state = next;
    }

    /// Drive `runner` and `fix` until success, escalation or exhaustion.
    ///
    /// Attempts are named `{test_name}_iter{n}`; the recheck after the last
    /// iteration is named `{test_name}_final`.
    pub fn run(
        &mut self,
        runner: &mut dyn AttemptRunner,
        fix: &mut dyn FixProcedure,
        test_name: &str,
    ) -> FixLoopResult {
        let started = Instant::now();
        let mut history: Vec<IterationResult> = Vec::new();
        let mut error_counts: HashMap<String, usize> = HashMap::new();
        self.state = LoopState::Running(1);

        for iteration in 1..=self.limits.max_iterations {
            self.transition(LoopState::Running(iteration));
            tracing::info!(test = test_name, iteration, "fix loop iteration");

            let result = runner.run_attempt(&format!("{}_iter{}", test_name, iteration));
            if result.success {
                self.transition(LoopState::Success);
                tracing::info!(test = test_name, iteration, "test passed");
                return FixLoopResult::passed(
                    iteration,
                    started.elapsed().as_secs_f64(),
                    history,
                    result,
                );
            }

            let key = result.error_key().to_string();
            let count = error_counts.entry(key).or_insert(0);
            *count += 1;
            tracing::debug!(error = result.error_key(), count = *count, "error occurrence");

            if *count >= self.limits.max_same_error {
                return self.escalate(
                    EscalationReason::RepeatedError,
                    iteration,
                    started,
                    history,
                    result,
                );
            }

            let Some(fix_result) = fix.attempt_fix(&result, iteration) else {
                return self.escalate(
                    EscalationReason::CannotDiagnose,
                    iteration,
                    started,
                    history,
                    result,
                );
            };

            let confidence = fix_result.confidence.unwrap_or(Confidence::Medium);
            tracing::info!(
                iteration,
                applied = fix_result.applied.as_deref().unwrap_or("-"),
                %confidence,
                "fix applied"
            );
            history.push(IterationResult {
                iteration,
                test_result: result,
                diagnosis: fix_result.diagnosis,
                fix_applied: fix_result.applied,
                confidence,
            });
        }

        tracing::info!(
            test = test_name,
            iterations = self.limits.max_iterations,
            "iterations exhausted, running final check"
        );
        let final_test = runner.run_attempt(&format!("{}_final", test_name));
        let total = self.limits.max_iterations;

        if final_test.success {
            self.transition(LoopState::Success);
            return FixLoopResult::passed(total, started.elapsed().as_secs_f64(), history, final_test);
        }

        let question = build_question(&final_test, &history, EscalationReason::MaxIterations);
        self.transition(LoopState::Exhausted);
        tracing::warn!(
            test = test_name,
            reason = %EscalationReason::MaxIterations,
            "escalating"
        );
        FixLoopResult::escalated(
            total,
            started.elapsed().as_secs_f64(),
            history,
            final_test,
            EscalationReason::MaxIterations,
            question,
        )
    }

    fn escalate(
        &mut self,
        reason: EscalationReason,
        iteration: usize,
        started: Instant,
        history: Vec<IterationResult>,
        result: TestResult,
    ) -> FixLoopResult {
        tracing::warn!(iteration, %reason, error = result.error_key(), "escalating");
        let question = build_question(&result, &history, reason);
        self.transition(LoopState::Escalated(reason));
        FixLoopResult::escalated(
            iteration,
            started.elapsed().as_secs_f64(),
            history,
            result,
            reason,
            question,
        )
    }
}

impl Default for FixLoop {
    fn default() -> Self {
        Self::new(LoopLimits::default())
    }
}
