//! Resolver reload signals.
//!
//! After every successful hosts-file write the resolver must be told to
//! re-read it. Production sends SIGHUP to dnsmasq via a configured command;
//! tests swap in a recording stub.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Tells the external resolver to reload its hosts files.
#[async_trait]
pub trait ReloadSignal: Send + Sync {
    async fn reload(&self) -> Result<()>;
}

/// Pick the signal for a configured reload command. An empty command means
/// there is no resolver to poke, e.g. a dry run on a dev machine.
pub fn reload_signal_for(command: Vec<String>) -> Arc<dyn ReloadSignal> {
    if command.is_empty() {
        Arc::new(NoopReload)
    } else {
        Arc::new(CommandReload::new(command))
    }
}

/// Runs a configured command, e.g. `pkill -HUP dnsmasq`.
pub struct CommandReload {
    command: Vec<String>,
}

impl CommandReload {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ReloadSignal for CommandReload {
    async fn reload(&self) -> Result<()> {
        let (program, args) = match self.command.split_first() {
            Some(split) => split,
            None => bail!("Reload command is empty"),
        };

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            bail!(
                "Reload command {:?} failed: {}",
                self.command,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        tracing::debug!("Resolver reload signal sent");
        Ok(())
    }
}

/// Does nothing. Selected when the configured reload command is empty.
pub struct NoopReload;

#[async_trait]
impl ReloadSignal for NoopReload {
    async fn reload(&self) -> Result<()> {
        Ok(())
    }
}

/// Counts reloads and optionally fails them. Used by tests to observe the
/// signal path and to exercise the store-failure contract.
#[derive(Default)]
pub struct RecordingReload {
    reloads: Mutex<usize>,
    fail: Mutex<bool>,
}

impl RecordingReload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reload_count(&self) -> usize {
        *self.reloads.lock().unwrap()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl ReloadSignal for RecordingReload {
    async fn reload(&self) -> Result<()> {
        if *self.fail.lock().unwrap() {
            bail!("Simulated reload failure");
        }
        *self.reloads.lock().unwrap() += 1;
        Ok(())
    }
}
