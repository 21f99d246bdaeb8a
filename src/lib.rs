//! transatlantic: pull finished downloads from a satellite host.
//!
//! A pass lists the satellite and local directories, copies whatever is
//! missing locally with rsync, keeps a running average of the transfer
//! speed, and asks the download client to drop each item once it has
//! landed.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod gateway;
pub mod inventory;
pub mod location;
pub mod logging;
pub mod speed;

pub use config::Config;
pub use engine::{Diff, EngineOptions, PassReport, TransferEngine, TransferRecord, TransferState};
pub use error::{Error, Result};
pub use gateway::{DownloadClient, Gateway, Removal};
pub use inventory::{FileInventory, FileRecord, Size};
pub use location::Location;
pub use speed::SpeedTracker;
