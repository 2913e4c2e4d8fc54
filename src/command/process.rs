use tokio::process::Child;
use tracing::debug;
use tracing::warn;

use crate::CommandError;
use crate::Result;

/// A process launched detached by the harness.
///
/// The identity is captured at spawn time, so terminating it can never hit
/// an unrelated process that happens to match a name or pattern.
#[derive(Debug)]
pub struct ProcessHandle {
    program: String,
    pid: Option<u32>,
    child: Option<Child>,
}

impl ProcessHandle {
    pub(crate) fn from_child(
        program: String,
        child: Child,
    ) -> Self {
        Self {
            program,
            pid: child.id(),
            child: Some(child),
        }
    }

    /// Handle for a process the harness does not own a child for
    pub fn detached(
        program: impl Into<String>,
        pid: Option<u32>,
    ) -> Self {
        Self {
            program: program.into(),
            pid,
            child: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Exit code if the process already finished
    pub fn try_status(&mut self) -> Result<Option<Option<i32>>> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait().map_err(CommandError::IoError)?.map(|s| s.code())),
            None => Ok(None),
        }
    }

    /// Block until the process exits
    pub async fn wait(&mut self) -> Result<Option<i32>> {
        match self.child.as_mut() {
            Some(child) => {
                let status = child.wait().await.map_err(CommandError::IoError)?;
                Ok(status.code())
            }
            None => Ok(None),
        }
    }

    /// Forcibly kill the process and reap it.
    ///
    /// Returns whether a live process was actually killed.
    pub async fn terminate(&mut self) -> Result<bool> {
        let Some(child) = self.child.as_mut() else {
            debug!("{} (pid {:?}) has no owned child to terminate", self.program, self.pid);
            return Ok(false);
        };

        if let Some(status) = child.try_wait().map_err(CommandError::IoError)? {
            debug!("{} (pid {:?}) already exited with {:?}", self.program, self.pid, status);
            return Ok(false);
        }

        if let Err(e) = child.kill().await {
            warn!("failed to kill {} (pid {:?}): {:?}", self.program, self.pid, e);
            return Err(CommandError::IoError(e).into());
        }
        debug!("terminated {} (pid {:?})", self.program, self.pid);
        Ok(true)
    }
}
