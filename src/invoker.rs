//! External converter invocation.
//!
//! The actual document conversion is done by an external program, normally
//! LibreOffice in headless mode:
//!
//! ```text
//! libreoffice --headless --convert-to <token> --outdir <dir> <input>
//! ```
//!
//! [`ConverterInvoker`] is the seam: one capability, "convert file X to token
//! T in directory D". [`LibreOfficeInvoker`] implements it with
//! `tokio::process`, so the calling task suspends until the child exits
//! without blocking a runtime worker. Tests substitute their own invoker and
//! never spawn a process.
//!
//! An invoker only reports what the process did. Whether the artifact exists
//! is checked by the job, because a zero exit status is not proof of output.

use crate::config::ServiceConfig;
use crate::error::ConvertError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Convert a file by running an external tool.
#[async_trait]
pub trait ConverterInvoker: Send + Sync {
    /// Convert `input` to `token`, writing the artifact into `out_dir`.
    ///
    /// Returns `Ok(())` when the tool exits successfully, regardless of
    /// whether it wrote anything.
    async fn convert(&self, input: &Path, token: &str, out_dir: &Path) -> Result<(), ConvertError>;
}

/// Runs LibreOffice (or any CLI with the same flags) once per call.
#[derive(Debug, Clone)]
pub struct LibreOfficeInvoker {
    program: String,
    leading_args: Vec<String>,
    timeout: Option<Duration>,
}

impl LibreOfficeInvoker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: None,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            program: config.converter_program.clone(),
            leading_args: config.converter_args.clone(),
            timeout: config.conversion_timeout(),
        }
    }

    /// Arguments inserted before `--headless`.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill the converter if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The full argument vector passed to the program.
    pub fn args_for(&self, input: &Path, token: &str, out_dir: &Path) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> =
            self.leading_args.iter().map(Into::into).collect();
        args.push("--headless".into());
        args.push("--convert-to".into());
        args.push(token.into());
        args.push("--outdir".into());
        args.push(out_dir.as_os_str().to_owned());
        args.push(input.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl ConverterInvoker for LibreOfficeInvoker {
    async fn convert(&self, input: &Path, token: &str, out_dir: &Path) -> Result<(), ConvertError> {
        check_preconditions(input, token, out_dir).await?;

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args_for(input, token, out_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must take the child with it.
            .kill_on_drop(true);

        debug!(program = %self.program, token, input = %input.display(), "spawning converter");
        let started = Instant::now();

        let child = cmd
            .spawn()
            .map_err(|source| ConvertError::ConverterUnavailable {
                program: self.program.clone(),
                source,
            })?;

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        program = %self.program,
                        secs = limit.as_secs(),
                        "converter exceeded deadline, killed"
                    );
                    return Err(ConvertError::ConversionTimeout {
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| ConvertError::Internal(format!("waiting for converter: {e}")))?;

        let elapsed_ms = started.elapsed().as_millis() as u64;

        if output.status.success() {
            info!(token, elapsed_ms, "converter finished");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(status = %output.status, elapsed_ms, stderr = %stderr.trim_end(), "converter failed");
            Err(ConvertError::ConversionExecution {
                status: output.status.to_string(),
                stderr,
            })
        }
    }
}

async fn check_preconditions(input: &Path, token: &str, out_dir: &Path) -> Result<(), ConvertError> {
    if token.trim().is_empty() {
        return Err(ConvertError::Internal("empty output token".into()));
    }
    if !tokio::fs::try_exists(input).await.unwrap_or(false) {
        return Err(ConvertError::Internal(format!(
            "input '{}' does not exist",
            input.display()
        )));
    }
    if !tokio::fs::metadata(out_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Err(ConvertError::Internal(format!(
            "output directory '{}' does not exist",
            out_dir.display()
        )));
    }
    Ok(())
}
