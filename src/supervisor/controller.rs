use std::io;
use std::sync::Arc;

use tokio::process::{Child, Command};

/// Platform capability for terminating a backend together with everything it spawned.
pub trait ProcessController: Send + Sync + 'static {
    /// Configure `command` before spawning so its tree can be killed as a unit.
    fn prepare(&self, command: &mut Command);

    /// Terminate the tree rooted at `pid`, the recorded id of `child`. Does not reap.
    ///
    /// Descendants are reached even when `child` itself has already exited.
    fn kill_tree(&self, pid: u32, child: &mut Child) -> io::Result<()>;
}

/// POSIX: the backend leads its own process group; the whole group gets `SIGKILL`.
#[cfg(unix)]
pub struct ProcessGroupController;

#[cfg(unix)]
impl ProcessController for ProcessGroupController {
    fn prepare(&self, command: &mut Command) {
        command.process_group(0);
    }

    fn kill_tree(&self, pid: u32, child: &mut Child) -> io::Result<()> {
        let Ok(pgid) = i32::try_from(pid) else {
            return child.start_kill();
        };

        // SAFETY: kill(2) with a negative pid signals the process group; no memory is shared.
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        tracing::debug!(pid, error = %err, "group kill failed, killing leader directly");
        child.start_kill()
    }
}

/// Windows: `taskkill /T` walks and terminates the tree.
#[cfg(windows)]
pub struct TaskkillController;

#[cfg(windows)]
impl ProcessController for TaskkillController {
    fn prepare(&self, _command: &mut Command) {}

    fn kill_tree(&self, pid: u32, child: &mut Child) -> io::Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();

        match status {
            Ok(s) if s.success() => Ok(()),
            other => {
                tracing::debug!(pid, status = ?other, "taskkill failed, killing leader directly");
                child.start_kill()
            }
        }
    }
}

/// The controller for the platform this binary was built for.
pub fn platform_controller() -> Arc<dyn ProcessController> {
    #[cfg(unix)]
    {
        Arc::new(ProcessGroupController)
    }
    #[cfg(windows)]
    {
        Arc::new(TaskkillController)
    }
}
