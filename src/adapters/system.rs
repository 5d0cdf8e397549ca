//! Host-level actions
//!
//! `poweroff` runs a configured command (by default `systemctl poweroff`).
//! The request is fire-and-forget: the dispatcher only learns whether the
//! command could be started, the exit status is logged when it arrives.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::adapters::traits::SystemAction;

pub const DEFAULT_POWEROFF_COMMAND: [&str; 2] = ["systemctl", "poweroff"];

/// A program plus arguments run for a host action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    program: String,
    args: Vec<String>,
}

impl HostCommand {
    /// Build from an argv-style list; the first element is the program
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            bail!("empty host command");
        };
        if program.trim().is_empty() {
            bail!("empty host command");
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for HostCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_POWEROFF_COMMAND[0].to_string(),
            args: DEFAULT_POWEROFF_COMMAND[1..]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl SystemAction for HostCommand {
    async fn poweroff(&self) -> Result<()> {
        let description = self.describe();
        tracing::info!("Running host command: {}", description);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {}", description))?;

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::debug!("{} finished", description)
                }
                Ok(status) => tracing::warn!("{} exited with {}", description, status),
                Err(e) => tracing::warn!("{} could not be awaited: {}", description, e),
            }
        });
        Ok(())
    }
}
