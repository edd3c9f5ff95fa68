//! Configuration management with environment variable support.
//!
//! Every value has a default, can be sourced from the environment and can be
//! overridden with the builder methods on [`TesterConfig`]. The library core
//! never reads the environment on its own: callers pass a `TesterConfig`
//! explicitly, typically built with [`TesterConfig::from_env`].
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LOCAL_APP_URL` | Base URL of the application under test | `http://localhost:3000` |
//! | `SUPABASE_URL` | Store endpoint URL | unset |
//! | `SUPABASE_SERVICE_KEY` | Store credential | unset |
//! | `LIVE_TEST_HEADLESS` | Run the browser headless | `true` |
//! | `LIVE_TEST_SCREENSHOT_DIR` | Directory for failure screenshots | `/tmp/test-screenshots` |
//! | `LIVE_TEST_VIEWPORT` | Browser viewport as `WxH` | `1280x720` |
//! | `LIVE_TEST_MAX_ITERATIONS` | Fix-loop iteration ceiling | `5` |
//! | `LIVE_TEST_MAX_SAME_ERROR` | Repeated-error ceiling | `3` |

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::browser::{SessionOptions, Viewport};
use crate::fix_loop::LoopLimits;

// ============================================================================
// Default Values
// ============================================================================

/// Default application base URL
pub const DEFAULT_APP_URL: &str = "http://localhost:3000";

/// Default screenshot directory
pub const DEFAULT_SCREENSHOT_DIR: &str = "/tmp/test-screenshots";

/// Default viewport width (CSS pixels)
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height (CSS pixels)
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

/// Default fix-loop iteration ceiling
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Default repeated-error ceiling
pub const DEFAULT_MAX_SAME_ERROR: usize = 3;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_APP_URL: &str = "LOCAL_APP_URL";
pub const ENV_STORE_URL: &str = "SUPABASE_URL";
pub const ENV_STORE_KEY: &str = "SUPABASE_SERVICE_KEY";
pub const ENV_HEADLESS: &str = "LIVE_TEST_HEADLESS";
pub const ENV_SCREENSHOT_DIR: &str = "LIVE_TEST_SCREENSHOT_DIR";
pub const ENV_VIEWPORT: &str = "LIVE_TEST_VIEWPORT";
pub const ENV_MAX_ITERATIONS: &str = "LIVE_TEST_MAX_ITERATIONS";
pub const ENV_MAX_SAME_ERROR: &str = "LIVE_TEST_MAX_SAME_ERROR";

static CONFIG: OnceLock<TesterConfig> = OnceLock::new();

/// Get the process configuration (initialized from environment on first access)
pub fn get() -> &'static TesterConfig {
    CONFIG.get_or_init(TesterConfig::from_env)
}

/// Settings for the tester
#[derive(Debug, Clone, PartialEq)]
pub struct TesterConfig {
    /// Base URL handed to test procedures
    pub app_url: String,
    /// Store endpoint, if verification against persisted data is wanted
    pub store_url: Option<String>,
    /// Store credential
    pub store_key: Option<String>,
    /// Run the browser without a window
    pub headless: bool,
    /// Where failure screenshots go (created if absent)
    pub screenshot_dir: PathBuf,
    pub viewport: Viewport,
    pub limits: LoopLimits,
}

impl TesterConfig {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            app_url: DEFAULT_APP_URL.to_string(),
            store_url: None,
            store_key: None,
            headless: true,
            screenshot_dir: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
            viewport: Viewport::default(),
            limits: LoopLimits::default(),
        }
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::defaults();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            app_url: non_empty(ENV_APP_URL).unwrap_or(defaults.app_url),
            store_url: non_empty(ENV_STORE_URL),
            store_key: non_empty(ENV_STORE_KEY),
            headless: non_empty(ENV_HEADLESS)
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.headless),
            screenshot_dir: non_empty(ENV_SCREENSHOT_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.screenshot_dir),
            viewport: non_empty(ENV_VIEWPORT)
                .and_then(|v| Viewport::parse(&v))
                .unwrap_or(defaults.viewport),
            limits: LoopLimits {
                max_iterations: non_empty(ENV_MAX_ITERATIONS)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(defaults.limits.max_iterations),
                max_same_error: non_empty(ENV_MAX_SAME_ERROR)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(defaults.limits.max_same_error),
            },
        }
    }

    pub fn app_url(mut self, url: impl Into<String>) -> Self {
        self.app_url = url.into();
        self
    }

    /// Configure the persistent store endpoint and credential
    pub fn store(mut self, url: impl Into<String>, key: impl Into<String>) -> Self {
        self.store_url = Some(url.into());
        self.store_key = Some(key.into());
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport::new(width, height);
        self
    }

    pub fn limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Whether both store settings are present
    pub fn store_configured(&self) -> bool {
        self.store_url.is_some() && self.store_key.is_some()
    }

    /// Browser launch options derived from this configuration
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            headless: self.headless,
            viewport: self.viewport,
        }
    }
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a boolean flag: 1/true/yes/on and 0/false/no/off
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
