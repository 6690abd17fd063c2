//! Domain types providing compile-time safety and self-documentation

use std::fmt;

/// Process ID (TGID) of the monitored process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl TryFrom<i32> for Pid {
    type Error = super::ConfigError;

    fn try_from(pid: i32) -> Result<Self, Self::Error> {
        match u32::try_from(pid) {
            Ok(0) | Err(_) => Err(super::ConfigError::InvalidPid(pid)),
            Ok(pid) => Ok(Pid(pid)),
        }
    }
}

impl Pid {
    /// `/proc/<pid>` for liveness checks
    #[must_use]
    pub fn proc_path(self) -> String {
        format!("/proc/{}", self.0)
    }
}

/// Why the capture loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Interrupted,
    DurationReached,
    ProcessExited,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitReason::Interrupted => "interrupted",
            ExitReason::DurationReached => "duration limit reached",
            ExitReason::ProcessExited => "process exited",
        })
    }
}
