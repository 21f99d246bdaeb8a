//! Tracing setup.
//!
//! Two sinks:
//! - a log file, append-only, text or JSON lines (the latter is what gets
//!   shipped to an external index), at the configured level
//! - stderr, errors only unless `-v` is given
//!
//! Events carry their context as tracing fields (`file`, `speed`, ...)
//! rather than interpolated into the message.

use serde::Deserialize;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::error::{Error, Result};

/// Log file output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output, one object per line.
    Json,
}

/// Map `-v` count to a console level (0=error, 1=warn, 2=info, 3=debug, 4+=trace).
pub fn console_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

fn crate_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("transatlantic={}", level))
}

/// Initialize the logging system.
///
/// `RUST_LOG`, when set, overrides the console filter. The log file's parent
/// directory is created if needed.
pub fn init_logging(
    verbosity: u8,
    log_file: Option<&Path>,
    file_level: &str,
    format: LogFormat,
) -> Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| crate_filter(console_level(verbosity)));
    layers.push(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_file(verbosity >= 3)
            .with_line_number(verbosity >= 3)
            .with_filter(console_filter)
            .boxed(),
    );

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                eprintln!("Log directory does not exist yet, creating {}", parent.display());
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = Mutex::new(file);

        let layer = match format {
            LogFormat::Text => fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(crate_filter(file_level))
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_current_span(false)
                .with_filter(crate_filter(file_level))
                .boxed(),
        };
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

    Ok(())
}
