// src/exec/command.rs

//! Shell-command operators, used by config-defined pipelines.

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::{debug, info};

use crate::asset::{Compute, Operator, OperatorKind, PipelineContext, UpstreamResults};

/// Runs a shell command as an asset computation.
///
/// The command gets `ASSETFLOW_PIPELINE_ID`, `ASSETFLOW_RUN_ID` and
/// `ASSETFLOW_ASSET` in its environment and the upstream data map as JSON
/// on stdin. Stdout is parsed as JSON when possible and kept as a string
/// otherwise. A non-zero exit status is an error.
#[derive(Debug, Clone)]
pub struct CommandOperator {
    asset: String,
    cmd: String,
}

impl CommandOperator {
    pub fn new(asset: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            cmd: cmd.into(),
        }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Wrap into an [`Operator`] named after the asset.
    pub fn into_operator(self, kind: OperatorKind) -> crate::errors::Result<Operator> {
        let name = self.asset.clone();
        Operator::new(name, kind, self)
    }

    fn shell(&self) -> Command {
        // Build a shell command appropriate for the platform.
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        }
    }
}

impl Compute for CommandOperator {
    fn apply(&self, inputs: &UpstreamResults, ctx: &PipelineContext) -> Result<Value> {
        info!(
            asset = %self.asset,
            run_id = %ctx.run_id,
            cmd = %self.cmd,
            "starting asset process"
        );

        let mut cmd = self.shell();
        cmd.env("ASSETFLOW_PIPELINE_ID", &ctx.pipeline_id)
            .env("ASSETFLOW_RUN_ID", &ctx.run_id)
            .env("ASSETFLOW_ASSET", &self.asset)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for asset '{}'", self.asset))?;

        // Feed stdin from a separate thread so a chatty child cannot block on
        // a full stdout pipe while we are still writing.
        let payload = serde_json::to_vec(&inputs.to_json())?;
        let writer = child.stdin.take().map(|mut stdin| {
            let asset = self.asset.clone();
            std::thread::spawn(move || {
                // A command that ignores stdin may close it early.
                if let Err(e) = stdin.write_all(&payload) {
                    debug!(asset = %asset, error = %e, "stdin closed before upstream data was written");
                }
            })
        });

        let output = child
            .wait_with_output()
            .with_context(|| format!("waiting for process of asset '{}'", self.asset))?;

        if let Some(writer) = writer {
            let _ = writer.join();
        }

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(asset = %self.asset, "stderr: {}", line);
        }

        let code = output.status.code().unwrap_or(-1);
        info!(
            asset = %self.asset,
            exit_code = code,
            success = output.status.success(),
            "asset process exited"
        );

        if !output.status.success() {
            bail!("command `{}` exited with code {}", self.cmd, code);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        Ok(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string())))
    }
}
