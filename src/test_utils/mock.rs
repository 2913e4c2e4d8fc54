use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use crate::CommandOutput;
use crate::Invocation;
use crate::MockCommandRunner;
use crate::ProcessHandle;

pub const VERSION_OUTPUT: &str = "mysqld  Ver 10.6.12-MariaDB-log for Linux on x86_64 (MariaDB Server)";

/// Every invocation a scripted runner saw, in order
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl CallLog {
    pub fn push(
        &self,
        inv: &Invocation,
    ) {
        self.calls.lock().unwrap().push(inv.clone());
    }

    pub fn all(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations of one program, matched by file name
    pub fn of(
        &self,
        program: &str,
    ) -> Vec<Invocation> {
        self.all()
            .into_iter()
            .filter(|i| i.program_name() == program)
            .collect()
    }

    /// Rendered command lines, handy for substring assertions
    pub fn lines(&self) -> Vec<String> {
        self.all().iter().map(|i| i.to_string()).collect()
    }
}

/// Answers a healthy server would give to each tool
pub fn healthy_response(inv: &Invocation) -> CommandOutput {
    match inv.program_name().as_str() {
        "mysqld" if inv.has_arg("--version") => CommandOutput::with_stdout(VERSION_OUTPUT),
        // nothing stale to kill
        "pkill" => CommandOutput::failure(1),
        "sysbench" if inv.has_arg("--version") => CommandOutput::with_stdout("sysbench 1.0.20"),
        _ => CommandOutput::success(),
    }
}

/// Whether any argument of `inv` mentions `needle`
pub fn mentions(
    inv: &Invocation,
    needle: &str,
) -> bool {
    inv.get_args().iter().any(|a| a.contains(needle))
}

/// Mock runner answering `run` through `respond` and handing out detached
/// handles with increasing fake pids from `spawn`.
pub fn scripted_runner<F>(respond: F) -> (MockCommandRunner, CallLog)
where
    F: Fn(&Invocation) -> CommandOutput + Send + Sync + 'static,
{
    let log = CallLog::default();
    let mut runner = MockCommandRunner::new();

    let run_log = log.clone();
    runner.expect_run().returning(move |inv| {
        run_log.push(inv);
        Ok(respond(inv))
    });

    let spawn_log = log.clone();
    let next_pid = AtomicU32::new(4000);
    runner.expect_spawn().returning(move |inv| {
        spawn_log.push(inv);
        let pid = next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessHandle::detached(inv.program_name(), Some(pid)))
    });

    (runner, log)
}

pub fn healthy_runner() -> (Arc<MockCommandRunner>, CallLog) {
    let (runner, log) = scripted_runner(healthy_response);
    (Arc::new(runner), log)
}
