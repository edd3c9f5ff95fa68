//! Scoped browser sessions with diagnostic capture.
//!
//! A [`ScopedSession`] is opened once per attempt:
//! - subscribes a [`DiagnosticCollector`] to console and failed-request events at open
//! - hands the page to the test procedure
//! - drains and unsubscribes the collector, then tears the session down at close
//!
//! Teardown also runs from `Drop`, so the browser is released on every exit
//! path, including a panicking test procedure.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::browser::{
    BrowserDriver, BrowserResult, BrowserSession, EventSubscription, Page, PageEvent,
    SessionOptions,
};
use crate::types::{ConsoleEntry, NetworkFailure};

/// Console messages and failed requests captured during one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub console_logs: Vec<ConsoleEntry>,
    pub network_failures: Vec<NetworkFailure>,
}

/// Append-only collector fed by an event subscription
#[derive(Debug)]
pub struct DiagnosticCollector {
    subscription: EventSubscription,
    collected: Diagnostics,
}

impl DiagnosticCollector {
    pub fn new(subscription: EventSubscription) -> Self {
        Self {
            subscription,
            collected: Diagnostics::default(),
        }
    }

    /// Move pending events into the collected lists, keeping arrival order
    pub fn drain(&mut self) {
        for event in self.subscription.drain() {
            match event {
                PageEvent::Console(entry) => self.collected.console_logs.push(entry),
                PageEvent::RequestFailed(failure) => self.collected.network_failures.push(failure),
            }
        }
    }

    /// Events collected so far (call [`drain`](Self::drain) first for the latest)
    pub fn collected(&self) -> &Diagnostics {
        &self.collected
    }

    /// Drain once more and unsubscribe
    pub fn finish(mut self) -> Diagnostics {
        self.drain();
        self.collected
    }
}

/// A browser session that is torn down exactly once
pub struct ScopedSession {
    session: Box<dyn BrowserSession>,
    collector: Option<DiagnosticCollector>,
    closed: bool,
}

impl ScopedSession {
    /// Launch a session and subscribe the diagnostic collector
    pub fn open(driver: &dyn BrowserDriver, options: &SessionOptions) -> BrowserResult<Self> {
        let mut session = driver.open_session(options)?;
        let subscription = match session.subscribe() {
            Ok(subscription) => subscription,
            Err(err) => {
                let _ = session.close();
                return Err(err);
            }
        };
        tracing::debug!(driver = driver.name(), "browser session opened");

        Ok(Self {
            session,
            collector: Some(DiagnosticCollector::new(subscription)),
            closed: false,
        })
    }

    pub fn page(&mut self) -> &mut dyn Page {
        self.session.page()
    }

    /// Collect remaining diagnostics, unsubscribe and tear the session down
    pub fn close(mut self) -> Diagnostics {
        let diagnostics = self
            .collector
            .take()
            .map(DiagnosticCollector::finish)
            .unwrap_or_default();
        self.teardown();
        diagnostics
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.session.close() {
            tracing::debug!(error = %err, "browser session teardown failed");
        } else {
            tracing::debug!("browser session closed");
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        self.collector.take();
        self.teardown();
    }
}

/// Which kind of failure a screenshot documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotKind {
    /// The procedure returned a failed outcome
    Failure,
    /// The procedure faulted
    Fault,
}

/// Path for a failure screenshot: `{dir}/{name}-{unix}.png` or `{dir}/{name}-error-{unix}.png`
pub fn screenshot_path(dir: &Path, test_name: &str, kind: ScreenshotKind) -> PathBuf {
    screenshot_path_at(dir, test_name, kind, unix_timestamp())
}

/// Same as [`screenshot_path`] with an explicit timestamp
pub fn screenshot_path_at(
    dir: &Path,
    test_name: &str,
    kind: ScreenshotKind,
    timestamp: u64,
) -> PathBuf {
    let name = sanitize_name(test_name);
    let filename = match kind {
        ScreenshotKind::Failure => format!("{}-{}.png", name, timestamp),
        ScreenshotKind::Fault => format!("{}-error-{}.png", name, timestamp),
    };
    dir.join(filename)
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Sanitize a name for use in filenames
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}
