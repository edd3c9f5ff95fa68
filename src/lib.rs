//! Live App Tester - autonomous test-fix-retry loop for running web applications.
//!
//! This crate provides:
//! - A test executor that runs one attempt in a fresh browser session,
//!   capturing console output, failed requests and failure screenshots
//! - A data verifier that diffs persisted records (Supabase / PostgREST)
//!   against expected values
//! - The fix-retry loop with repeated-error and iteration ceilings
//! - Escalation questions and markdown reports for unresolved failures
//! - Declarative JSON scenarios and command-backed fix procedures
//!
//! # Example
//!
//! ```rust,no_run
//! use live_app_tester::browser::{MockBrowser, MockPage, Page};
//! use live_app_tester::{FixDescriptor, LiveAppTester, TestOutcome, TestResult, TesterConfig};
//!
//! let browser = MockBrowser::new();
//! browser.route("http://localhost:3000", MockPage::new("Home").element("#app"));
//!
//! let tester = LiveAppTester::new(TesterConfig::defaults(), Box::new(browser)).unwrap();
//! let mut test = |page: &mut dyn Page, url: &str| -> anyhow::Result<TestOutcome> {
//!     page.goto(url)?;
//!     Ok(TestOutcome::passed())
//! };
//! let mut fix = |_: &TestResult, _: usize| -> Option<FixDescriptor> { None };
//!
//! let result = tester.run_with_fix_loop(&mut test, &mut fix, "home");
//! println!("{}", tester.generate_report(&result));
//! ```

pub mod browser;
pub mod command_fix;
pub mod config;
pub mod escalation;
pub mod executor;
pub mod fix_loop;
pub mod logging;
pub mod report;
pub mod scenario;
pub mod session;
pub mod store;
pub mod tester;
pub mod types;
pub mod verify;

// Re-export result types
pub use types::{
    Confidence, ConsoleEntry, EscalationReason, FixLoopResult, IterationResult, NetworkFailure,
    TestResult,
};

// Re-export the loop and its collaborators
pub use command_fix::CommandFix;
pub use escalation::{build_escalation_question, build_question};
pub use executor::{JsonProcedure, OutcomeError, TestExecutor, TestOutcome, TestProcedure};
pub use fix_loop::{
    AttemptRunner, ExecutorRunner, FixDescriptor, FixError, FixLoop, FixProcedure, LoopLimits,
    LoopState,
};
pub use report::{render_report, render_report_at};

// Re-export verification
pub use store::{LazyStore, MemoryStore, PostgrestClient, Record, StoreClient, StoreError};
pub use verify::{DataVerifier, FieldDiff, Verification};

pub use config::TesterConfig;
pub use scenario::{Scenario, ScenarioError, Step};
pub use session::{DiagnosticCollector, Diagnostics, ScopedSession};
pub use tester::LiveAppTester;
