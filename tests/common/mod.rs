//! Shared fixtures: a fake satellite reachable over "ssh" and a recording
//! download client.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use transatlantic::exec::{CommandOutput, CommandSpec, Runner};
use transatlantic::{
    DownloadClient, EngineOptions, FileInventory, Gateway, Location, Removal, SpeedTracker,
    TransferEngine,
};

pub const HOST: &str = "satellite";
pub const USER: &str = "media";
pub const REMOTE_ROOT: &str = "/data/complete";

/// Plays the part of `ssh`, `ls`, `du` and `rsync`.
///
/// Remote files exist only in memory; the local side is a real directory,
/// and a successful rsync writes the file into it.
#[derive(Default)]
pub struct FakeSatellite {
    files: Vec<(String, String)>,
    failing: HashSet<String>,
    listing_error: Option<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeSatellite {
    /// `files` are `(name, du size)` pairs in listing order.
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(n, s)| (n.to_string(), s.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    /// rsync of `name` prints to stderr.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Remote listing fails with `message`.
    pub fn unreachable(mut self, message: &str) -> Self {
        self.listing_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rsync_calls(&self) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == "rsync")
            .collect()
    }

    fn remote(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        match program {
            "ls" => match &self.listing_error {
                Some(message) => Ok(CommandOutput::failed(255, message.as_str())),
                None => {
                    let names: Vec<&str> = self.files.iter().map(|(n, _)| n.as_str()).collect();
                    Ok(CommandOutput::ok(format!("{}\n", names.join("\n"))))
                }
            },
            "du" => {
                let path = unquote(args.last().map(String::as_str).unwrap_or(""));
                let name = basename(&path);
                match self.files.iter().find(|(n, _)| n == name) {
                    Some((_, size)) => Ok(CommandOutput::ok(format!("{}\t{}\n", size, path))),
                    None => Ok(CommandOutput::failed(
                        1,
                        format!("du: cannot access '{}': No such file or directory", path),
                    )),
                }
            }
            other => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("remote program {} not faked", other),
            )),
        }
    }

    fn local_ls(&self, args: &[String]) -> io::Result<CommandOutput> {
        let dir = args.last().map(PathBuf::from).unwrap_or_default();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                return Ok(CommandOutput::failed(
                    2,
                    format!("ls: cannot access '{}': {}", dir.display(), e),
                ))
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let mut out = names.join("\n");
        out.push('\n');
        Ok(CommandOutput::ok(out))
    }

    fn rsync(&self, args: &[String]) -> io::Result<CommandOutput> {
        let source = &args[args.len() - 2];
        let dest = Path::new(&args[args.len() - 1]);
        let name = basename(source);

        if self.failing.contains(name) {
            let mut out = CommandOutput::ok("");
            out.stderr = format!(
                "rsync: [sender] read errors mapping \"{}\": Input/output error (5)\n",
                source
            )
            .into_bytes();
            return Ok(out);
        }

        fs::write(dest.join(name), b"payload")?;
        Ok(CommandOutput::ok(""))
    }
}

#[async_trait]
impl Runner for FakeSatellite {
    async fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        match command.program.as_str() {
            "ssh" => {
                // ssh -l USER HOST -- <program> <args...>
                assert_eq!(command.args[0..4], ["-l", USER, HOST, "--"]);
                self.remote(&command.args[4], &command.args[5..])
            }
            "ls" => self.local_ls(&command.args),
            "rsync" => self.rsync(&command.args),
            other => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not faked", other),
            )),
        }
    }
}

fn unquote(arg: &str) -> String {
    arg.trim_matches('\'').to_string()
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Download client that answers every request the same way.
#[derive(Clone)]
pub struct RecordingClient {
    outcome: Option<Removal>,
    pub removed: Arc<Mutex<Vec<String>>>,
}

impl RecordingClient {
    pub fn answering(outcome: Removal) -> Self {
        Self {
            outcome: Some(outcome),
            removed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request fails.
    pub fn broken() -> Self {
        Self {
            outcome: None,
            removed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadClient for RecordingClient {
    fn name(&self) -> &str {
        "recording"
    }

    async fn remove_by_name(&self, name: &str) -> transatlantic::Result<Removal> {
        self.removed.lock().unwrap().push(name.to_string());
        self.outcome.ok_or_else(|| transatlantic::Error::Removal {
            file: name.to_string(),
            message: "daemon not responding".to_string(),
        })
    }
}

/// Temp directories for one test: local destination and speed state.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("local")).unwrap();
        Self { dir }
    }

    pub fn local(&self) -> PathBuf {
        self.dir.path().join("local")
    }

    pub fn speed_file(&self) -> PathBuf {
        self.dir.path().join("state").join("speed")
    }

    pub fn touch(&self, name: &str) {
        let path = self.local().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"already here").unwrap();
    }

    pub fn engine(
        &self,
        satellite: Arc<FakeSatellite>,
        gateway: Gateway,
        options: EngineOptions,
    ) -> TransferEngine {
        let runner: Arc<dyn Runner> = satellite;
        TransferEngine::new(
            FileInventory::new(Location::remote(HOST, USER, REMOTE_ROOT), runner.clone()),
            FileInventory::new(Location::local(self.local()), runner.clone()),
            SpeedTracker::load(self.speed_file()),
            gateway,
            runner,
        )
        .with_options(options)
    }
}

pub fn video_options() -> EngineOptions {
    EngineOptions::new(true, ["mkv", "mp4", "avi"])
}

pub fn flat_options() -> EngineOptions {
    EngineOptions::new(false, ["mkv", "mp4", "avi"])
}

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}
