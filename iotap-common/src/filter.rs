//! Target filter: the first and cheapest check of every handler.

/// Process whose operations are measured.
///
/// Holds a TGID (the userspace notion of PID). Zero means "no target" and
/// admits nothing, so an unconfigured probe object is inert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TargetFilter {
    tgid: u32,
}

impl TargetFilter {
    #[must_use]
    pub const fn new(tgid: u32) -> Self {
        Self { tgid }
    }

    #[must_use]
    pub const fn tgid(&self) -> u32 {
        self.tgid
    }

    /// Whether the caller identified by `bpf_get_current_pid_tgid()` output
    /// belongs to the monitored process. Any thread of the process matches.
    #[must_use]
    pub const fn admits(&self, pid_tgid: u64) -> bool {
        self.tgid != 0 && (pid_tgid >> 32) as u32 == self.tgid
    }
}

/// Pack a process and thread id the way `bpf_get_current_pid_tgid` does
#[must_use]
pub const fn pid_tgid(tgid: u32, tid: u32) -> u64 {
    ((tgid as u64) << 32) | tid as u64
}
