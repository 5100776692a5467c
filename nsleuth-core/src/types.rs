//! Identifier and record types for namespace discovery

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kernel-assigned namespace identity.
///
/// A live namespace is identified by the inode number of its nsfs entry;
/// the kernel does not reuse the number while the namespace exists, so two
/// observations with the same inode are the same namespace no matter how
/// they were found.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct NsInode(u64);

impl NsInode {
    /// Create from a raw inode number
    #[must_use]
    pub const fn from_raw(ino: u64) -> Self {
        Self(ino)
    }

    /// Get the raw inode number
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NsInode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::LowerHex for NsInode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for NsInode {
    fn from(ino: u64) -> Self {
        Self(ino)
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Pid 1, the init process
    pub const INIT: Self = Self(1);

    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    #[must_use]
    pub fn current() -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let pid = std::process::id() as i32;
        Self(pid)
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        nix::unistd::Pid::from_raw(pid.0)
    }
}

/// The namespace kinds the discovery engine works with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NsKind {
    /// Network namespace
    Net,
    /// Mount namespace
    Mount,
}

impl NsKind {
    /// File name of this kind under `/proc/<pid>/ns/`
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Net => "net",
            Self::Mount => "mnt",
        }
    }

    /// The `setns(2)` flag selecting this namespace kind
    #[must_use]
    pub fn clone_flags(self) -> CloneFlags {
        match self {
            Self::Net => CloneFlags::CLONE_NEWNET,
            Self::Mount => CloneFlags::CLONE_NEWNS,
        }
    }
}

impl fmt::Display for NsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

/// One discovered network namespace and everything known to keep it alive.
///
/// A record accumulates holders from independent observations: the process
/// scan can supply the pid, the mount scan the bind-mount path, and a
/// recursive scan the mount namespace the path was seen through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetnsRecord {
    /// Namespace identity
    pub inode: NsInode,

    /// A process observed holding the namespace open, if any
    pub pid: Option<ProcessId>,

    /// An nsfs bind-mount pinning the namespace, if any
    pub mount_path: Option<PathBuf>,

    /// The mount namespace whose view of the filesystem the bind-mount was
    /// discovered through; absent when it was visible from the caller's own
    /// mount table
    pub via_mount_ns: Option<PathBuf>,
}

impl NetnsRecord {
    /// Create an empty record for `inode`
    #[must_use]
    pub const fn new(inode: NsInode) -> Self {
        Self {
            inode,
            pid: None,
            mount_path: None,
            via_mount_ns: None,
        }
    }
}

/// A mount namespace observed during the process scan.
///
/// Kept only for the duration of a run, to drive one level of re-scanning
/// from inside the namespace it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountNsRecord {
    /// Namespace identity
    pub inode: NsInode,

    /// The process whose `/proc` entry the namespace was found through
    pub pid: ProcessId,

    /// The `/proc/<pid>/ns/mnt` path used to enter the namespace
    pub ns_path: PathBuf,
}
