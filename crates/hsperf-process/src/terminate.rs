//! Process termination primitives.

use hsperf_common::Result;
use std::time::Duration;

/// How long to wait for exit after a force kill.
pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// Ask a process to stop (SIGTERM).
pub fn send_terminate(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        signal(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(unsupported())
    }
}

/// Force kill a process (SIGKILL).
pub fn force_kill(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        signal(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(unsupported())
    }
}

#[cfg(unix)]
fn signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), signal) {
        // Already gone.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(std::io::Error::from(e).into()),
    }
}

#[cfg(not(unix))]
fn unsupported() -> hsperf_common::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "signal delivery requires a Unix platform",
    )
    .into()
}
