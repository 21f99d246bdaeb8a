//! File inventories: what exists in one location, and how big it is.

use crate::error::{Error, Result};
use crate::exec::Runner;
use crate::location::Location;
use regex::Regex;
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, OnceLock};

const KIB: f64 = 1024.0;

/// Size as reported by `du -h`, plus the byte count it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct Size {
    pub human: String,
    pub bytes: u64,
}

impl Size {
    pub fn parse(token: &str) -> Result<Self> {
        Ok(Self {
            human: token.trim().to_string(),
            bytes: parse_human_size(token)?,
        })
    }
}

/// Parse `<number><K|M|G>[B]` into bytes using 1024-based multipliers.
///
/// `"1.5G"` is 1.5 * 1024^3, `"2K"` is 2048. Bare numbers and other
/// suffixes are rejected.
pub fn parse_human_size(token: &str) -> Result<u64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+(?:[.,]\d+)?)([A-Za-z]*)$").expect("size pattern is valid")
    });

    let trimmed = token.trim();
    let caps = pattern
        .captures(trimmed)
        .ok_or_else(|| Error::size_parse(token, "expected <number><unit>"))?;

    let number: f64 = caps[1]
        .replace(',', ".")
        .parse()
        .map_err(|e| Error::size_parse(token, format!("{}", e)))?;

    let multiplier = match caps[2].to_ascii_uppercase().as_str() {
        "K" | "KB" => KIB,
        "M" | "MB" => KIB * KIB,
        "G" | "GB" => KIB * KIB * KIB,
        "" => return Err(Error::size_parse(token, "missing unit suffix")),
        other => {
            return Err(Error::size_parse(
                token,
                format!("unrecognized unit '{}'", other),
            ))
        }
    };

    Ok((number * multiplier).round() as u64)
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub name: String,
    pub size: Option<Size>,
}

impl FileRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    pub fn with_size(self, size: Size) -> Self {
        Self {
            size: Some(size),
            ..self
        }
    }

    pub fn bytes(&self) -> Option<u64> {
        self.size.as_ref().map(|s| s.bytes)
    }
}

/// Snapshot of the top-level entries of one location.
pub struct FileInventory {
    location: Location,
    runner: Arc<dyn Runner>,
    records: Vec<FileRecord>,
}

impl FileInventory {
    pub fn new(location: Location, runner: Arc<dyn Runner>) -> Self {
        Self {
            location,
            runner,
            records: Vec::new(),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Populate the inventory from `ls -1` on the root.
    ///
    /// Each call replaces the whole snapshot, so an engine that lists again
    /// at the start of a pass sees exactly what a fresh inventory would.
    /// Any failure leaves the previous snapshot untouched; a partial listing
    /// is never accepted.
    pub async fn list(&mut self) -> Result<&[FileRecord]> {
        let root = self.location.root_str();
        let cmd = self.location.command("ls", ["-1", "--", root.as_str()]);

        tracing::debug!(location = %self.location, "Getting filenames");

        let output = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| Error::listing(&self.location, format!("{}: {}", cmd.program, e)))?;

        if !output.success {
            return Err(Error::listing(&self.location, output.diagnostic()));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|_| Error::listing(&self.location, "listing is not valid UTF-8"))?;

        self.records = parse_listing(&text);

        tracing::info!(
            location = %self.location,
            count = self.records.len(),
            "Listing done"
        );

        Ok(&self.records)
    }

    /// Size on disk of `name`, via `du -sh`.
    pub async fn size_of(&self, name: &str) -> Result<Size> {
        let path = self.location.path_of(name);
        let cmd = self.location.command("du", ["-sh", "--", path.as_str()]);

        let output = self.runner.run(&cmd).await?;
        if !output.success {
            return Err(Error::DiskUsage {
                path,
                message: output.diagnostic(),
            });
        }

        let stdout = output.stdout_lossy();
        let token = stdout.split_whitespace().next().unwrap_or("");
        Size::parse(token)
    }

    /// Whether `name` exists under the root right now.
    ///
    /// This does not consult the snapshot. Local inventories ask the
    /// filesystem; remote ones run `find` with the name as an escaped glob,
    /// which copes with names that trip up plain string matching.
    pub async fn contains(&self, name: &str) -> Result<bool> {
        match &self.location {
            Location::Local { root } => match tokio::fs::symlink_metadata(root.join(name)).await {
                Ok(_) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            },
            Location::Remote { .. } => {
                let (dir, base) = match name.rsplit_once('/') {
                    Some((parent, base)) => (self.location.path_of(parent), base),
                    None => (self.location.root_str(), name),
                };
                let pattern = escape_glob(base);
                let cmd = self.location.command(
                    "find",
                    [
                        dir.as_str(),
                        "-mindepth",
                        "1",
                        "-maxdepth",
                        "1",
                        "-name",
                        pattern.as_str(),
                    ],
                );

                let output = self.runner.run(&cmd).await?;
                if output.success {
                    return Ok(!output.stdout_lossy().trim().is_empty());
                }

                let diagnostic = output.diagnostic();
                if diagnostic.contains("No such file or directory") {
                    Ok(false)
                } else {
                    Err(Error::listing(&self.location, diagnostic))
                }
            }
        }
    }
}

fn parse_listing(text: &str) -> Vec<FileRecord> {
    let mut seen = HashSet::new();
    text.lines()
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(*line))
        .map(FileRecord::new)
        .collect()
}

/// Escape glob metacharacters so `find -name` matches literally.
fn escape_glob(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
