//! Host backend: the kernel surface behind the discovery engine
//!
//! Everything the engine asks of the system - listing pids, stating
//! namespace files, reading the mount table, probing and switching
//! namespaces - goes through [`HostBackend`]. [`LinuxHost`] is the
//! production implementation; [`MemoryHost`] is a scripted double for
//! exercising the engine without a live kernel or root.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Cursor};
use std::os::fd::OwnedFd;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{OFlag, open};
use nix::sched::setns;
use nix::sys::stat::Mode;
use tracing::debug;

use nsleuth_core::{Error, NsInode, NsKind, ProcessId, Result};

/// The system operations namespace discovery is built on.
///
/// The engine is strictly single-threaded: namespace membership is
/// per-thread kernel state, so implementations may assume every call comes
/// from the one thread that owns the run.
pub trait HostBackend {
    /// List the numeric entries of the process table.
    fn list_pids(&self) -> io::Result<Vec<ProcessId>>;

    /// Namespace identity of `pid` for `kind`, from its `/proc` ns file.
    fn pid_ns_inode(&self, pid: ProcessId, kind: NsKind) -> io::Result<NsInode>;

    /// The path used to re-enter `pid`'s mount namespace later in the run.
    fn mount_ns_path(&self, pid: ProcessId) -> PathBuf;

    /// Identity of the mount namespace the run started in.
    fn origin_mount_ns(&self) -> NsInode;

    /// Open the mount table as seen from the current mount namespace.
    fn open_mount_table(&self) -> io::Result<Box<dyn BufRead>>;

    /// Probe whether `mountpoint` pins a network namespace.
    ///
    /// Returns the mountpoint's inode when it does, and `Ok(None)` when the
    /// mount holds a namespace of some other kind - that case is routine
    /// and callers skip it without a diagnostic.
    ///
    /// A successful probe leaves the calling thread inside the probed
    /// network namespace. The discovery run depends on that staying
    /// harmless: membership only affects future socket syscalls, none are
    /// made, and the process exits right after reporting. Restoring the
    /// previous network namespace here would add a failure mode for no
    /// benefit - do not add one.
    fn probe_netns(&self, mountpoint: &Path) -> io::Result<Option<NsInode>>;

    /// Switch the calling thread into the mount namespace at `target`.
    ///
    /// Unlike the network-namespace probe, a mount-namespace switch must
    /// always be paired with [`restore_mount_ns`](Self::restore_mount_ns):
    /// every path lookup after the switch resolves in the entered
    /// namespace.
    fn enter_mount_ns(&self, target: &Path) -> io::Result<()>;

    /// Switch the calling thread back to the namespace the run started in.
    fn restore_mount_ns(&self) -> io::Result<()>;
}

fn errno_to_io(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

/// Production host over the live `/proc` and the namespace syscalls.
///
/// Construction captures a handle to the caller's own mount namespace;
/// every scoped switch restores through that handle, and it stays open for
/// the whole run. Failing to capture it is fatal up front: without it no
/// switch could ever be undone.
#[derive(Debug)]
pub struct LinuxHost {
    proc_root: PathBuf,
    origin: OwnedFd,
    origin_inode: NsInode,
}

impl LinuxHost {
    /// Create a host over `/proc`.
    pub fn new() -> Result<Self> {
        Self::with_proc_root("/proc")
    }

    /// Create a host over an alternate procfs mountpoint.
    pub fn with_proc_root(root: impl Into<PathBuf>) -> Result<Self> {
        let proc_root = root.into();
        let self_mnt = proc_root.join("self/ns/mnt");

        let origin = open(
            &self_mnt,
            OFlag::O_RDONLY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| Error::MountNamespace {
            message: format!(
                "cannot capture the original mount namespace via {}: {e}",
                self_mnt.display()
            ),
        })?;

        let origin_inode = fs::metadata(&self_mnt)
            .map_err(|e| Error::MountNamespace {
                message: format!(
                    "cannot resolve the original mount namespace identity: {e}"
                ),
            })?
            .ino();
        let origin_inode = NsInode::from_raw(origin_inode);

        debug!(origin = %origin_inode, "Captured original mount namespace");

        Ok(Self {
            proc_root,
            origin,
            origin_inode,
        })
    }

    fn ns_file(&self, pid: ProcessId, kind: NsKind) -> PathBuf {
        self.proc_root
            .join(pid.to_string())
            .join("ns")
            .join(kind.proc_name())
    }
}

impl HostBackend for LinuxHost {
    fn list_pids(&self) -> io::Result<Vec<ProcessId>> {
        let mut pids = Vec::new();
        for entry in fs::read_dir(&self.proc_root)? {
            // entries vanishing mid-listing are /proc business as usual
            let Ok(entry) = entry else { continue };
            if let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i32>().ok())
            {
                pids.push(ProcessId::from_raw(pid));
            }
        }
        Ok(pids)
    }

    fn pid_ns_inode(&self, pid: ProcessId, kind: NsKind) -> io::Result<NsInode> {
        let meta = fs::metadata(self.ns_file(pid, kind))?;
        Ok(NsInode::from_raw(meta.ino()))
    }

    fn mount_ns_path(&self, pid: ProcessId) -> PathBuf {
        self.ns_file(pid, NsKind::Mount)
    }

    fn origin_mount_ns(&self) -> NsInode {
        self.origin_inode
    }

    fn open_mount_table(&self) -> io::Result<Box<dyn BufRead>> {
        let file = File::open(self.proc_root.join("mounts"))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn probe_netns(&self, mountpoint: &Path) -> io::Result<Option<NsInode>> {
        let inode = fs::metadata(mountpoint)?.ino();

        let fd = open(
            mountpoint,
            OFlag::O_RDONLY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(errno_to_io)?;

        match setns(&fd, NsKind::Net.clone_flags()) {
            Ok(()) => Ok(Some(NsInode::from_raw(inode))),
            // EINVAL: the fd is a namespace, just not a network one
            Err(nix::errno::Errno::EINVAL) => Ok(None),
            Err(e) => Err(errno_to_io(e)),
        }
    }

    fn enter_mount_ns(&self, target: &Path) -> io::Result<()> {
        let fd = open(target, OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
            .map_err(errno_to_io)?;
        setns(&fd, NsKind::Mount.clone_flags()).map_err(errno_to_io)
    }

    fn restore_mount_ns(&self) -> io::Result<()> {
        setns(&self.origin, NsKind::Mount.clone_flags()).map_err(errno_to_io)
    }
}

/// Scripted outcome of a netns probe in [`MemoryHost`]
#[derive(Debug, Clone)]
pub enum ProbeScript {
    /// The mount pins a network namespace with this identity
    Netns(NsInode),
    /// The mount pins a namespace of another kind
    OtherKind,
    /// The probe fails with an error of this kind
    Fail(io::ErrorKind),
}

/// In-memory host for tests: scripted processes, mount tables, and probe
/// outcomes, with no kernel behind them.
///
/// The per-thread mount namespace is modeled as a current-namespace
/// register: [`enter_mount_ns`](HostBackend::enter_mount_ns) moves it,
/// [`open_mount_table`](HostBackend::open_mount_table) serves the table
/// registered for wherever the register points, and counters record the
/// switching traffic so tests can assert the enter/restore discipline.
///
/// # Example
/// ```
/// use nsleuth_core::{NsInode, ProcessId};
/// use nsleuth_discover::MemoryHost;
///
/// let host = MemoryHost::new(NsInode::from_raw(0x100));
/// host.add_process(
///     ProcessId::INIT,
///     NsInode::from_raw(0x1),
///     NsInode::from_raw(0x100),
/// );
/// host.set_mount_table(NsInode::from_raw(0x100), "proc /proc proc rw 0 0\n");
///
/// let table = nsleuth_discover::run(&host).unwrap();
/// assert_eq!(table.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: RefCell<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    pids: Vec<ProcessId>,
    net_inodes: HashMap<ProcessId, NsInode>,
    mnt_inodes: HashMap<ProcessId, NsInode>,
    mount_ns_paths: HashMap<PathBuf, NsInode>,
    mount_tables: HashMap<NsInode, String>,
    probes: HashMap<PathBuf, ProbeScript>,
    deny_enter: HashSet<PathBuf>,
    origin_mount_ns: NsInode,
    current_mount_ns: NsInode,
    fail_pid_listing: bool,
    fail_restore: bool,
    enter_count: usize,
    restore_count: usize,
    probe_count: usize,
}

impl MemoryHost {
    /// Create a host whose run starts in the mount namespace `origin`
    #[must_use]
    pub fn new(origin: NsInode) -> Self {
        let host = Self::default();
        {
            let mut state = host.state.borrow_mut();
            state.origin_mount_ns = origin;
            state.current_mount_ns = origin;
        }
        host
    }

    /// Register a process with its network and mount namespace identities
    pub fn add_process(&self, pid: ProcessId, net: NsInode, mnt: NsInode) {
        let mut state = self.state.borrow_mut();
        state.pids.push(pid);
        state.net_inodes.insert(pid, net);
        state.mnt_inodes.insert(pid, mnt);
        state
            .mount_ns_paths
            .insert(PathBuf::from(format!("/proc/{pid}/ns/mnt")), mnt);
    }

    /// Register a pid that shows up in the listing but whose ns files are
    /// gone, like a process that exited between listing and stat
    pub fn add_vanished_process(&self, pid: ProcessId) {
        self.state.borrow_mut().pids.push(pid);
    }

    /// Set the mount table text served while inside the namespace `ns`
    pub fn set_mount_table(&self, ns: NsInode, text: &str) {
        self.state
            .borrow_mut()
            .mount_tables
            .insert(ns, text.to_string());
    }

    /// Script the probe outcome for a mountpoint
    pub fn script_probe(&self, mountpoint: impl Into<PathBuf>, outcome: ProbeScript) {
        self.state
            .borrow_mut()
            .probes
            .insert(mountpoint.into(), outcome);
    }

    /// Make entering the mount namespace at `path` fail
    pub fn deny_enter(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().deny_enter.insert(path.into());
    }

    /// Make the process-table listing fail
    pub fn fail_pid_listing(&self) {
        self.state.borrow_mut().fail_pid_listing = true;
    }

    /// Make every restore of the original mount namespace fail
    pub fn fail_restore(&self) {
        self.state.borrow_mut().fail_restore = true;
    }

    /// Mount namespace the host currently considers the thread to be in
    #[must_use]
    pub fn current_mount_ns(&self) -> NsInode {
        self.state.borrow().current_mount_ns
    }

    /// Number of mount-namespace entries performed
    #[must_use]
    pub fn enter_count(&self) -> usize {
        self.state.borrow().enter_count
    }

    /// Number of mount-namespace restores performed
    #[must_use]
    pub fn restore_count(&self) -> usize {
        self.state.borrow().restore_count
    }

    /// Number of netns probes performed
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.state.borrow().probe_count
    }
}

impl HostBackend for MemoryHost {
    fn list_pids(&self) -> io::Result<Vec<ProcessId>> {
        let state = self.state.borrow();
        if state.fail_pid_listing {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "process table unavailable",
            ));
        }
        Ok(state.pids.clone())
    }

    fn pid_ns_inode(&self, pid: ProcessId, kind: NsKind) -> io::Result<NsInode> {
        let state = self.state.borrow();
        let map = match kind {
            NsKind::Net => &state.net_inodes,
            NsKind::Mount => &state.mnt_inodes,
        };
        map.get(&pid).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such process: {pid}"))
        })
    }

    fn mount_ns_path(&self, pid: ProcessId) -> PathBuf {
        PathBuf::from(format!("/proc/{pid}/ns/mnt"))
    }

    fn origin_mount_ns(&self) -> NsInode {
        self.state.borrow().origin_mount_ns
    }

    fn open_mount_table(&self) -> io::Result<Box<dyn BufRead>> {
        let state = self.state.borrow();
        let text = state
            .mount_tables
            .get(&state.current_mount_ns)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no mount table here")
            })?;
        Ok(Box::new(Cursor::new(text)))
    }

    fn probe_netns(&self, mountpoint: &Path) -> io::Result<Option<NsInode>> {
        let mut state = self.state.borrow_mut();
        state.probe_count += 1;
        match state.probes.get(mountpoint) {
            Some(ProbeScript::Netns(inode)) => Ok(Some(*inode)),
            Some(ProbeScript::OtherKind) => Ok(None),
            Some(ProbeScript::Fail(kind)) => Err(io::Error::from(*kind)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such mount: {}", mountpoint.display()),
            )),
        }
    }

    fn enter_mount_ns(&self, target: &Path) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.enter_count += 1;
        if state.deny_enter.contains(target) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot enter {}", target.display()),
            ));
        }
        let ns = state.mount_ns_paths.get(target).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no mount namespace at {}", target.display()),
            )
        })?;
        state.current_mount_ns = ns;
        Ok(())
    }

    fn restore_mount_ns(&self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.restore_count += 1;
        if state.fail_restore {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "setns back refused",
            ));
        }
        state.current_mount_ns = state.origin_mount_ns;
        Ok(())
    }
}
