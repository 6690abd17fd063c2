//! # Operation Kinds and Dispatch Table
//!
//! Every instrumented syscall maps to exactly one [`OperationKind`]. The kind
//! decides three things, all answered from this table instead of per-handler
//! code:
//!
//! - the wire tag carried in each event ([`OperationKind::tag`])
//! - the `syscalls/sys_enter_*` tracepoint the probe attaches to
//! - the argument-extraction strategy ([`ArgShape`])
//!
//! ## Tracepoint Argument Slots
//!
//! `sys_enter_*` tracepoints expose syscall arguments as consecutive `u64`
//! fields after the common header and `__syscall_nr`:
//!
//! ```text
//! offset 0   common fields (8 bytes)
//! offset 8   __syscall_nr (int + padding)
//! offset 16  arg0
//! offset 24  arg1
//! ...
//! ```
//!
//! [`ArgShape`] refers to arguments by slot index; [`arg_offset`] turns a
//! slot into a byte offset.

/// Byte offset of argument slot 0 in a `sys_enter_*` tracepoint record
pub const SYSCALL_ARGS_OFFSET: usize = 16;

/// Number of operation kinds (size of the counter table)
pub const KIND_COUNT: usize = 12;

/// Byte offset of syscall argument `slot` within a `sys_enter_*` record
#[must_use]
pub const fn arg_offset(slot: usize) -> usize {
    SYSCALL_ARGS_OFFSET + slot * 8
}

/// Closed set of instrumented I/O operations.
///
/// Discriminants are the wire tags. Tag 0 is deliberately unused so a zeroed
/// record never decodes to a valid event.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Write = 1,
    Read = 2,
    Writev = 3,
    Readv = 4,
    Recv = 5,
    RecvFrom = 6,
    RecvMsg = 7,
    RecvMmsg = 8,
    Send = 9,
    SendTo = 10,
    SendMsg = 11,
    SendMmsg = 12,
}

/// How a handler turns raw syscall arguments into a byte length.
///
/// Each variant names the argument slots it reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgShape {
    /// Length is an argument (`write(fd, buf, count)`)
    Scalar { len: usize },
    /// `iovec` array plus count (`writev(fd, iov, iovcnt)`)
    Vectored { iov: usize, count: usize },
    /// One `msghdr` (`sendmsg(fd, msg, flags)`)
    Message { msg: usize },
    /// `mmsghdr` array plus count (`sendmmsg(fd, msgvec, vlen, flags)`)
    Batch { msgvec: usize, count: usize },
}

impl OperationKind {
    /// All kinds in tag order
    pub const ALL: [OperationKind; KIND_COUNT] = [
        OperationKind::Write,
        OperationKind::Read,
        OperationKind::Writev,
        OperationKind::Readv,
        OperationKind::Recv,
        OperationKind::RecvFrom,
        OperationKind::RecvMsg,
        OperationKind::RecvMmsg,
        OperationKind::Send,
        OperationKind::SendTo,
        OperationKind::SendMsg,
        OperationKind::SendMmsg,
    ];

    /// Wire tag
    #[must_use]
    pub const fn tag(self) -> u16 {
        self as u16
    }

    /// Reverse of [`tag`](Self::tag); `None` for unknown tags
    #[must_use]
    pub const fn from_tag(tag: u16) -> Option<Self> {
        Some(match tag {
            1 => OperationKind::Write,
            2 => OperationKind::Read,
            3 => OperationKind::Writev,
            4 => OperationKind::Readv,
            5 => OperationKind::Recv,
            6 => OperationKind::RecvFrom,
            7 => OperationKind::RecvMsg,
            8 => OperationKind::RecvMmsg,
            9 => OperationKind::Send,
            10 => OperationKind::SendTo,
            11 => OperationKind::SendMsg,
            12 => OperationKind::SendMmsg,
            _ => return None,
        })
    }

    /// Zero-based slot in per-kind tables (`COUNTERS` map, aggregators)
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    /// Argument-extraction strategy for this kind
    #[must_use]
    pub const fn shape(self) -> ArgShape {
        match self {
            OperationKind::Write
            | OperationKind::Read
            | OperationKind::Recv
            | OperationKind::RecvFrom
            | OperationKind::Send
            | OperationKind::SendTo => ArgShape::Scalar { len: 2 },
            OperationKind::Writev | OperationKind::Readv => ArgShape::Vectored { iov: 1, count: 2 },
            OperationKind::RecvMsg | OperationKind::SendMsg => ArgShape::Message { msg: 1 },
            OperationKind::RecvMmsg | OperationKind::SendMmsg => {
                ArgShape::Batch { msgvec: 1, count: 2 }
            }
        }
    }

    /// Tracepoint name under the `syscalls` category
    #[must_use]
    pub const fn tracepoint(self) -> &'static str {
        match self {
            OperationKind::Write => "sys_enter_write",
            OperationKind::Read => "sys_enter_read",
            OperationKind::Writev => "sys_enter_writev",
            OperationKind::Readv => "sys_enter_readv",
            OperationKind::Recv => "sys_enter_recv",
            OperationKind::RecvFrom => "sys_enter_recvfrom",
            OperationKind::RecvMsg => "sys_enter_recvmsg",
            OperationKind::RecvMmsg => "sys_enter_recvmmsg",
            OperationKind::Send => "sys_enter_send",
            OperationKind::SendTo => "sys_enter_sendto",
            OperationKind::SendMsg => "sys_enter_sendmsg",
            OperationKind::SendMmsg => "sys_enter_sendmmsg",
        }
    }

    /// Name of the eBPF program handling this kind
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            OperationKind::Write => "tap_write",
            OperationKind::Read => "tap_read",
            OperationKind::Writev => "tap_writev",
            OperationKind::Readv => "tap_readv",
            OperationKind::Recv => "tap_recv",
            OperationKind::RecvFrom => "tap_recvfrom",
            OperationKind::RecvMsg => "tap_recvmsg",
            OperationKind::RecvMmsg => "tap_recvmmsg",
            OperationKind::Send => "tap_send",
            OperationKind::SendTo => "tap_sendto",
            OperationKind::SendMsg => "tap_sendmsg",
            OperationKind::SendMmsg => "tap_sendmmsg",
        }
    }

    /// Short display name (`WRITEV`, `SENDMSG`, ...)
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OperationKind::Write => "WRITE",
            OperationKind::Read => "READ",
            OperationKind::Writev => "WRITEV",
            OperationKind::Readv => "READV",
            OperationKind::Recv => "RECV",
            OperationKind::RecvFrom => "RECVFROM",
            OperationKind::RecvMsg => "RECVMSG",
            OperationKind::RecvMmsg => "RECVMMSG",
            OperationKind::Send => "SEND",
            OperationKind::SendTo => "SENDTO",
            OperationKind::SendMsg => "SENDMSG",
            OperationKind::SendMmsg => "SENDMMSG",
        }
    }

    /// Whether the tracepoint exists on every architecture.
    ///
    /// `recv` and `send` have no dedicated syscall on x86_64 and arm64; libc
    /// routes them through `recvfrom`/`sendto`.
    #[must_use]
    pub const fn is_portable(self) -> bool {
        !matches!(self, OperationKind::Recv | OperationKind::Send)
    }
}

impl core::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
