use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;

use live_app_tester::browser::BrowserDriver;
use live_app_tester::config::{self, TesterConfig};
use live_app_tester::store::{LazyStore, Record};
use live_app_tester::{
    CommandFix, DataVerifier, FixDescriptor, FixLoopResult, FixProcedure, LiveAppTester,
    Scenario, TestResult, logging, render_report,
};

/// Live App Tester - test-fix-retry loop for running web applications
#[derive(Parser, Debug)]
#[command(
    name = "live-app-tester",
    about = "Run browser tests against a live app, retry with fixes and escalate what cannot be fixed",
    after_help = "ENVIRONMENT VARIABLES:\n\
        LOCAL_APP_URL               Application base URL\n\
        SUPABASE_URL                Store endpoint URL\n\
        SUPABASE_SERVICE_KEY        Store credential\n\
        LIVE_TEST_HEADLESS          Run the browser headless (default: true)\n\
        LIVE_TEST_SCREENSHOT_DIR    Failure screenshot directory\n\
        LIVE_TEST_VIEWPORT          Viewport as WxH\n\
        LIVE_TEST_MAX_ITERATIONS    Fix-loop iteration ceiling\n\
        LIVE_TEST_MAX_SAME_ERROR    Repeated-error ceiling"
)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Application base URL (overrides LOCAL_APP_URL)
    #[arg(long, global = true)]
    app_url: Option<String>,

    /// Screenshot directory (overrides LIVE_TEST_SCREENSHOT_DIR)
    #[arg(long, global = true)]
    screenshot_dir: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario through the fix loop
    Run {
        /// Scenario JSON file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Program invoked with each failure on stdin; without it every failure escalates
        #[arg(long)]
        fix_command: Option<String>,

        /// Argument for the fix command (repeatable)
        #[arg(long = "fix-arg", allow_hyphen_values = true)]
        fix_args: Vec<String>,

        /// Fix iterations before the final recheck
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Occurrences of one error that trigger escalation
        #[arg(long)]
        max_same_error: Option<usize>,

        /// Print the loop result as JSON instead of a report
        #[arg(long)]
        json: bool,

        /// Also write the markdown report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Compare a stored record with expected values
    Verify {
        /// Table to query
        #[arg(short, long)]
        table: String,

        /// Equality condition as key=value (repeatable)
        #[arg(long = "where", value_parser = parse_pair)]
        conditions: Vec<(String, Value)>,

        /// Expected column value as key=value (repeatable)
        #[arg(long = "expect", value_parser = parse_pair)]
        expected: Vec<(String, Value)>,

        /// Print the verification as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a saved loop result (JSON) as a markdown report
    Report {
        /// File written by `run --json`
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Parse `key=value`; the value is JSON when it parses, a plain string otherwise
fn parse_pair(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn to_record(pairs: Vec<(String, Value)>) -> Record {
    pairs.into_iter().collect()
}

#[cfg(feature = "chromium")]
fn browser_driver() -> anyhow::Result<Box<dyn BrowserDriver>> {
    let driver = live_app_tester::browser::ChromiumDriver::new()?;
    Ok(Box::new(driver))
}

#[cfg(not(feature = "chromium"))]
fn browser_driver() -> anyhow::Result<Box<dyn BrowserDriver>> {
    anyhow::bail!("no browser driver available: rebuild with `--features chromium`")
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut config = TesterConfig::from_env();
    if let Some(url) = args.app_url {
        config = config.app_url(url);
    }
    if let Some(dir) = args.screenshot_dir {
        config = config.screenshot_dir(dir);
    }
    if args.headed {
        config = config.headless(false);
    }

    match args.command {
        Commands::Run {
            scenario,
            fix_command,
            fix_args,
            max_iterations,
            max_same_error,
            json,
            report,
        } => {
            let mut scenario = Scenario::load(&scenario)
                .with_context(|| format!("loading scenario {}", scenario.display()))?;

            let mut limits = config.limits;
            if let Some(n) = max_iterations {
                limits.max_iterations = n;
            }
            if let Some(n) = max_same_error {
                limits.max_same_error = n;
            }

            let tester = LiveAppTester::new(config, browser_driver()?)
                .context("creating screenshot directory")?;

            let mut fix: Box<dyn FixProcedure> = match fix_command {
                Some(program) => Box::new(CommandFix::new(program).args(fix_args)),
                None => Box::new(|_: &TestResult, _: usize| -> Option<FixDescriptor> { None }),
            };

            let name = scenario.name.clone();
            let result = tester.run_with_limits(&mut scenario, fix.as_mut(), &name, limits);
            let rendered = tester.generate_report(&result);

            if let Some(path) = report {
                std::fs::write(&path, &rendered)
                    .with_context(|| format!("writing report {}", path.display()))?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", rendered);
            }

            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Verify {
            table,
            conditions,
            expected,
            json,
        } => {
            let store =
                LazyStore::postgrest(config.store_url.as_deref(), config.store_key.as_deref());
            let verification =
                DataVerifier::new(store).verify(&table, &to_record(conditions), &to_record(expected));

            if json {
                println!("{}", serde_json::to_string_pretty(&verification)?);
            } else if verification.success {
                println!("✅ {} matches", table);
            } else {
                println!("❌ {} verification failed", table);
                if let Some(error) = &verification.error {
                    println!("  Error: {}", error);
                }
                for (column, diff) in verification.diff.iter().flatten() {
                    let actual = diff
                        .actual
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_else(|| "(missing)".to_string());
                    println!("  {}: expected {}, got {}", column, diff.expected, actual);
                }
            }

            Ok(if verification.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Report { input } => {
            let json = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let result: FixLoopResult = serde_json::from_str(&json)
                .with_context(|| format!("parsing loop result {}", input.display()))?;
            println!("{}", render_report(&result));
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config => {
            println!("Live App Tester configuration");
            println!("  {:<26} {}", config::ENV_APP_URL, config.app_url);
            println!(
                "  {:<26} {}",
                config::ENV_STORE_URL,
                config.store_url.as_deref().unwrap_or("(unset)")
            );
            println!(
                "  {:<26} {}",
                config::ENV_STORE_KEY,
                if config.store_key.is_some() { "(set)" } else { "(unset)" }
            );
            println!("  {:<26} {}", config::ENV_HEADLESS, config.headless);
            println!(
                "  {:<26} {}",
                config::ENV_SCREENSHOT_DIR,
                config.screenshot_dir.display()
            );
            println!(
                "  {:<26} {}x{}",
                config::ENV_VIEWPORT,
                config.viewport.width,
                config.viewport.height
            );
            println!(
                "  {:<26} {}",
                config::ENV_MAX_ITERATIONS,
                config.limits.max_iterations
            );
            println!(
                "  {:<26} {}",
                config::ENV_MAX_SAME_ERROR,
                config.limits.max_same_error
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pair_values() {
        assert_eq!(parse_pair("id=7").unwrap(), ("id".to_string(), json!(7)));
        assert_eq!(parse_pair("paid=true").unwrap(), ("paid".to_string(), json!(true)));
        assert_eq!(
            parse_pair("name=Desk lamp").unwrap(),
            ("name".to_string(), json!("Desk lamp"))
        );
        assert_eq!(parse_pair("note=null").unwrap(), ("note".to_string(), Value::Null));
        assert_eq!(
            parse_pair("eq=a=b").unwrap(),
            ("eq".to_string(), json!("a=b"))
        );
    }

    #[test]
    fn test_parse_pair_rejects_malformed() {
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=1").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "live-app-tester",
            "--headed",
            "verify",
            "--table",
            "orders",
            "--where",
            "id=3",
            "--expect",
            "status=paid",
        ])
        .unwrap();
        assert!(args.headed);
        match args.command {
            Commands::Verify {
                table, conditions, ..
            } => {
                assert_eq!(table, "orders");
                assert_eq!(conditions, vec![("id".to_string(), json!(3))]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
