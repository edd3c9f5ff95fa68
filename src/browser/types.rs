// Core types for browser sessions

use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;

use crate::config;
use crate::types::{ConsoleEntry, NetworkFailure};

/// Browser viewport in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse a "WxH" string (e.g. "1280x720")
    pub fn parse(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        let (w, h) = lower.split_once('x')?;
        let width: u32 = w.trim().parse().ok()?;
        let height: u32 = h.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: config::DEFAULT_VIEWPORT_WIDTH,
            height: config::DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

/// Options for launching one isolated browser session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Run without a visible window
    pub headless: bool,

    /// Fixed viewport for the page
    pub viewport: Viewport,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
        }
    }
}

/// A passive event observed on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// A console message
    Console(ConsoleEntry),

    /// A request that failed
    RequestFailed(NetworkFailure),
}

/// Sending half of an event subscription, held by the driver
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<PageEvent>,
}

impl EventSender {
    /// Forward an event. Returns false once the subscriber is gone.
    pub fn emit(&self, event: PageEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Receiving half of an event subscription
///
/// Dropping the subscription unsubscribes: later `emit` calls on the paired
/// [`EventSender`] return false.
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::Receiver<PageEvent>,
}

impl EventSubscription {
    /// Create a connected sender/subscription pair
    pub fn channel() -> (EventSender, EventSubscription) {
        let (tx, rx) = mpsc::channel();
        (EventSender { tx }, EventSubscription { rx })
    }

    /// Take every event delivered so far, in arrival order
    pub fn drain(&self) -> Vec<PageEvent> {
        self.rx.try_iter().collect()
    }
}

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Errors raised by browser drivers. Messages embed the underlying cause.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Failed to navigate to {url}: {details}")]
    Navigation { url: String, details: String },

    #[error("No element matches selector '{0}'")]
    ElementNotFound(String),

    #[error("Timed out after {timeout:?} waiting for '{selector}'")]
    Timeout { selector: String, timeout: Duration },

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Event subscription failed: {0}")]
    Subscription(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Browser session already closed")]
    Closed,

    #[error("Failed to close browser: {0}")]
    Teardown(String),

    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for BrowserError {
    fn from(err: std::io::Error) -> Self {
        BrowserError::Io(err)
    }
}
