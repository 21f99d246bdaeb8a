//! Where an inventory lives: a local directory or a directory on the satellite.

use crate::exec::CommandSpec;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local {
        root: PathBuf,
    },
    Remote {
        host: String,
        user: String,
        /// Path on the satellite; may start with `~/`.
        root: String,
    },
}

impl Location {
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Location::Local { root: root.into() }
    }

    pub fn remote(host: impl Into<String>, user: impl Into<String>, root: impl Into<String>) -> Self {
        Location::Remote {
            host: host.into(),
            user: user.into(),
            root: root.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Remote { .. })
    }

    /// Path of `name` inside this location's root, as the target host sees it.
    pub fn path_of(&self, name: &str) -> String {
        match self {
            Location::Local { root } => root.join(name).to_string_lossy().into_owned(),
            Location::Remote { root, .. } => join_remote(root, name),
        }
    }

    /// Root directory as the target host sees it.
    pub fn root_str(&self) -> String {
        match self {
            Location::Local { root } => root.to_string_lossy().into_owned(),
            Location::Remote { root, .. } => root.clone(),
        }
    }

    /// Reference to `name` usable as an rsync source or destination.
    ///
    /// Remote references rely on `--protect-args`, so the path part is not
    /// quoted here.
    pub fn rsync_ref(&self, name: &str) -> String {
        match self {
            Location::Local { .. } => self.path_of(name),
            Location::Remote { host, user, .. } => {
                format!("{}@{}:{}", user, host, self.path_of(name))
            }
        }
    }

    /// Build a command that runs `program args...` on this location's host.
    ///
    /// Local commands are executed directly. Remote commands go through
    /// `ssh`, whose far end joins its arguments and hands them to a shell,
    /// so every argument is quoted individually.
    pub fn command<I, S>(&self, program: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Location::Local { .. } => CommandSpec::new(program).args(args),
            Location::Remote { host, user, .. } => {
                let mut cmd = CommandSpec::new("ssh")
                    .arg("-l")
                    .arg(user.as_str())
                    .arg(host.as_str())
                    .arg("--")
                    .arg(program);
                for arg in args {
                    let arg: String = arg.into();
                    cmd = cmd.arg(shell_quote(&arg));
                }
                cmd
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local { root } => write!(f, "{}", root.display()),
            Location::Remote { host, user, root } => write!(f, "{}@{}:{}", user, host, root),
        }
    }
}

fn join_remote(root: &str, name: &str) -> String {
    if root.is_empty() {
        name.to_string()
    } else if root.ends_with('/') {
        format!("{}{}", root, name)
    } else {
        format!("{}/{}", root, name)
    }
}

/// Quote one argument for a POSIX shell.
///
/// A leading `~/` is left outside the quotes so the remote shell still
/// expands it to the login user's home directory.
pub fn shell_quote(arg: &str) -> String {
    match arg.strip_prefix("~/") {
        Some(rest) => format!("~/{}", shell_escape::unix::escape(Cow::Borrowed(rest))),
        None if arg == "~" => arg.to_string(),
        None => shell_escape::unix::escape(Cow::Borrowed(arg)).into_owned(),
    }
}

/// Resolve a leading `~` against the home directory of the local user.
///
/// Paths without one, or a `~` with no known home, come back unchanged.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) if rest.as_os_str().is_empty() => home,
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
