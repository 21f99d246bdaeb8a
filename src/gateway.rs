//! Download client gateway.
//!
//! After a file has been pulled, its torrent is removed from the download
//! client on the satellite. The client is optional: when it is disabled or
//! cannot be reached the engine simply skips removal.

use crate::config::DownloadClientConfig;
use crate::error::{Error, Result};
use crate::exec::{CommandSpec, Runner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Outcome of a removal request that reached the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// The client has no item with that name.
    NotFound,
}

#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn remove_by_name(&self, name: &str) -> Result<Removal>;
}

/// Deluge driven through a helper script: `<interpreter> <script> rm <name>`.
///
/// The script reports "not found" by printing `None`, `False`, or a line
/// containing `not found`. Anything on stderr or a non-zero exit is a
/// failure.
pub struct DelugeScript {
    interpreter: PathBuf,
    script: PathBuf,
    runner: Arc<dyn Runner>,
}

impl DelugeScript {
    pub fn new(interpreter: impl Into<PathBuf>, script: impl Into<PathBuf>, runner: Arc<dyn Runner>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            runner,
        }
    }

    /// Build the client, checking that the interpreter and script exist.
    pub async fn connect(config: &DownloadClientConfig, runner: Arc<dyn Runner>) -> Result<Self> {
        let script = config
            .script
            .clone()
            .ok_or_else(|| Error::GatewayUnavailable("no script configured".to_string()))?;

        if !path_exists(&script).await {
            return Err(Error::GatewayUnavailable(format!(
                "script {} does not exist",
                script.display()
            )));
        }

        // Bare program names are resolved through PATH at spawn time.
        if config.interpreter.components().count() > 1 && !path_exists(&config.interpreter).await {
            return Err(Error::GatewayUnavailable(format!(
                "interpreter {} does not exist",
                config.interpreter.display()
            )));
        }

        Ok(Self::new(config.interpreter.clone(), script, runner))
    }

    fn command(&self, name: &str) -> CommandSpec {
        CommandSpec::new(self.interpreter.to_string_lossy())
            .arg(self.script.to_string_lossy())
            .arg("rm")
            .arg(name)
    }
}

#[async_trait]
impl DownloadClient for DelugeScript {
    fn name(&self) -> &str {
        "deluge"
    }

    async fn remove_by_name(&self, name: &str) -> Result<Removal> {
        let output = self
            .runner
            .run(&self.command(name))
            .await
            .map_err(|e| Error::Removal {
                file: name.to_string(),
                message: e.to_string(),
            })?;

        let stderr = output.stderr_lossy();
        if !output.success || !stderr.is_empty() {
            return Err(Error::Removal {
                file: name.to_string(),
                message: output.diagnostic(),
            });
        }

        let stdout = output.stdout_lossy();
        tracing::debug!(file = name, output = %stdout.trim(), "Deluge output");

        Ok(parse_removal(&stdout))
    }
}

fn parse_removal(stdout: &str) -> Removal {
    let text = stdout.trim().to_ascii_lowercase();
    if text == "none" || text == "false" || text.contains("not found") {
        Removal::NotFound
    } else {
        Removal::Removed
    }
}

async fn path_exists(path: &std::path::Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// The engine's handle on the download client; may be disabled.
pub struct Gateway {
    client: Option<Box<dyn DownloadClient>>,
}

impl Gateway {
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn with_client(client: impl DownloadClient + 'static) -> Self {
        Self {
            client: Some(Box::new(client)),
        }
    }

    /// Build from config. Failures disable the gateway instead of erroring.
    pub async fn connect(config: &DownloadClientConfig, runner: Arc<dyn Runner>) -> Self {
        if !config.enabled {
            tracing::info!("Download client disabled in config");
            return Self::disabled();
        }

        match DelugeScript::connect(config, runner).await {
            Ok(client) => Self::with_client(client),
            Err(e) => {
                tracing::warn!(error = %e, "Removal disabled for this run");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn remove(&self, name: &str) -> Result<Removal> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::GatewayUnavailable("gateway is disabled".to_string()))?;

        tracing::info!(file = name, client = client.name(), "Removing from download client");
        client.remove_by_name(name).await
    }
}
