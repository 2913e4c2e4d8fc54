//! Typed invocations of the external tools the harness drives.
//!
//! Every interaction with the database or a workload generator is an
//! [`Invocation`]: a program plus an argument list, optionally with its
//! output redirected to a log file. Nothing is ever interpolated into a
//! shell string; the shell rendering produced by `Display` is only used for
//! the `--debug` echo and for saved startup scripts.
//!
//! [`CommandRunner`] is the seam between the harness and the operating
//! system. [`SystemRunner`] spawns real processes; tests mock the trait.

mod process;
pub mod tools;

pub use process::*;


use std::fmt;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::file_io::create_file;
use crate::file_io::open_file_for_append;
use crate::CommandError;
use crate::Result;

/// Where a command's stdout and stderr end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Captured in memory and returned in [`CommandOutput`]
    Capture,
    /// Written to a file that is truncated first
    Truncate(PathBuf),
    /// Appended to a file
    Append(PathBuf),
}

/// One external program with its argument list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    redirect: Redirect,
    current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            redirect: Redirect::Capture,
            current_dir: None,
        }
    }

    pub fn arg(
        mut self,
        arg: impl Into<String>,
    ) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(
        mut self,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `--name=value` style option
    pub fn opt(
        self,
        name: &str,
        value: impl fmt::Display,
    ) -> Self {
        self.arg(format!("--{}={}", name, value))
    }

    pub fn redirect_to(
        mut self,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.redirect = Redirect::Truncate(path.into());
        self
    }

    pub fn append_to(
        mut self,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.redirect = Redirect::Append(path.into());
        self
    }

    pub fn current_dir(
        mut self,
        dir: impl Into<PathBuf>,
    ) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn redirect(&self) -> &Redirect {
        &self.redirect
    }

    pub fn has_arg(
        &self,
        arg: &str,
    ) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Log file receiving the output, if any
    pub fn log_path(&self) -> Option<&Path> {
        match &self.redirect {
            Redirect::Capture => None,
            Redirect::Truncate(p) | Redirect::Append(p) => Some(p),
        }
    }

    fn build(&self) -> Result<tokio::process::Command> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let file: Option<File> = match &self.redirect {
            Redirect::Capture => None,
            Redirect::Truncate(path) => Some(create_file(path)?),
            Redirect::Append(path) => Some(open_file_for_append(path.clone())?),
        };
        match file {
            Some(f) => {
                let err = f.try_clone().map_err(CommandError::IoError)?;
                cmd.stdout(Stdio::from(f)).stderr(Stdio::from(err));
            }
            None => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }
        Ok(cmd)
    }
}

/// Quote one word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

impl fmt::Display for Invocation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if let Some(dir) = &self.current_dir {
            write!(f, "cd {} && ", shell_quote(&dir.to_string_lossy()))?;
        }
        write!(f, "{}", shell_quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        match &self.redirect {
            Redirect::Capture => Ok(()),
            Redirect::Truncate(p) => write!(f, " > {} 2>&1", shell_quote(&p.to_string_lossy())),
            Redirect::Append(p) => write!(f, " >> {} 2>&1", shell_quote(&p.to_string_lossy())),
        }
    }
}

/// Exit status plus captured output of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            status: Some(0),
            ..Default::default()
        }
    }

    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a nonzero exit into [`CommandError::NonZeroExit`]
    pub fn check(
        self,
        program: &str,
    ) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CommandError::NonZeroExit {
                program: program.to_string(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            }
            .into())
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Run to completion and report the exit status.
    ///
    /// A nonzero exit is not an error at this level; only failing to start
    /// the program is.
    async fn run(
        &self,
        invocation: &Invocation,
    ) -> Result<CommandOutput>;

    /// Launch detached; the returned handle owns the process identity.
    fn spawn(
        &self,
        invocation: &Invocation,
    ) -> Result<ProcessHandle>;
}

/// Runs invocations as real OS processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    /// Echo every command line to stdout before running it
    echo: bool,
}

impl SystemRunner {
    pub fn new(echo: bool) -> Self {
        Self { echo }
    }

    fn announce(
        &self,
        invocation: &Invocation,
    ) {
        if self.echo {
            println!("{}", invocation);
        }
        debug!("exec: {}", invocation);
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        invocation: &Invocation,
    ) -> Result<CommandOutput> {
        self.announce(invocation);
        let program = invocation.program_name();
        let mut cmd = invocation.build()?;

        let spawn_err = |source| CommandError::Spawn {
            program: program.clone(),
            source,
        };

        if invocation.log_path().is_some() {
            let status = cmd.spawn().map_err(spawn_err)?.wait().await.map_err(CommandError::IoError)?;
            return Ok(CommandOutput {
                status: status.code(),
                ..Default::default()
            });
        }

        let output = cmd.output().await.map_err(spawn_err)?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn(
        &self,
        invocation: &Invocation,
    ) -> Result<ProcessHandle> {
        self.announce(invocation);
        let mut cmd = invocation.build()?;
        if invocation.log_path().is_none() {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: invocation.program_name(),
            source,
        })?;
        Ok(ProcessHandle::from_child(invocation.program_name(), child))
    }
}
