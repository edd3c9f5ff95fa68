//! Fix procedure backed by an external command.
//!
//! The command receives `{"test_result": ..., "iteration": n}` as JSON on
//! stdin and answers on stdout with either `null` (cannot diagnose) or
//! `{"diagnosis": ..., "applied": ..., "confidence": ...}`. Anything else,
//! including a non-zero exit, is treated as "cannot diagnose".

use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::fix_loop::{FixDescriptor, FixError, FixProcedure, FixResult};
use crate::types::TestResult;

#[derive(Serialize)]
struct FixRequest<'a> {
    test_result: &'a TestResult,
    iteration: usize,
}

/// Runs a program for every failed attempt
#[derive(Debug, Clone)]
pub struct CommandFix {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandFix {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Run the command once and parse its answer
    pub fn invoke(&self, result: &TestResult, iteration: usize) -> FixResult<Option<FixDescriptor>> {
        let request = serde_json::to_vec(&FixRequest {
            test_result: result,
            iteration,
        })?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|reason| FixError::Spawn {
            program: self.program.clone(),
            reason,
        })?;

        // stdin is fed from its own thread so a chatty command cannot fill its
        // output pipes while we are still writing the request
        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                let request = &request;
                scope.spawn(move || {
                    // A command that ignores its input may close stdin early
                    if let Err(err) = stdin.write_all(request) {
                        tracing::debug!(error = %err, "fix command closed stdin");
                    }
                });
            }
            child.wait_with_output()
        })?;
        if !output.status.success() {
            return Err(FixError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(None);
        }
        FixDescriptor::from_value(serde_json::from_str(stdout)?)
    }
}

impl FixProcedure for CommandFix {
    fn attempt_fix(&mut self, result: &TestResult, iteration: usize) -> Option<FixDescriptor> {
        match self.invoke(result, iteration) {
            Ok(fix) => fix,
            Err(err) => {
                tracing::warn!(program = %self.program, iteration, error = %err, "fix command failed");
                None
            }
        }
    }
}
