use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to list {location}: {message}")]
    Listing { location: String, message: String },

    #[error("Unrecognized size '{input}': {reason}")]
    SizeParse { input: String, reason: String },

    #[error("Could not measure {path}: {message}")]
    DiskUsage { path: String, message: String },

    #[error("Transfer of {file} failed: {message}")]
    Transfer { file: String, message: String },

    #[error("Failed to remove {file} from download client: {message}")]
    Removal { file: String, message: String },

    #[error("Download client unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found: {path}\nCopy config.example.toml to this location and fill it out.")]
    ConfigNotFound { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn listing(location: impl ToString, message: impl Into<String>) -> Self {
        Error::Listing {
            location: location.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn size_parse(input: &str, reason: impl Into<String>) -> Self {
        Error::SizeParse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
