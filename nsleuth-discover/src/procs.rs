//! Process-table scanning

use tracing::debug;

use nsleuth_core::{Error, MountNsSet, NetnsTable, NsKind, Result};

use crate::host::HostBackend;

/// Sweep the process table for namespace holders.
///
/// Every listed pid contributes two observations: its network namespace
/// goes into `netns` with the pid as holder, and its mount namespace goes
/// into `mount_ns` as a candidate for re-entry later in the run.
///
/// Pids that vanish between listing and stat are an inherent `/proc` race
/// and are skipped quietly. Failing to list the table at all is fatal -
/// there is no namespace data to be had without it.
pub fn scan<H: HostBackend + ?Sized>(
    host: &H,
    netns: &mut NetnsTable,
    mount_ns: &mut MountNsSet,
) -> Result<()> {
    let pids = host.list_pids().map_err(|e| Error::ProcessTable {
        message: format!("cannot list processes: {e}"),
    })?;

    debug!(count = pids.len(), "Scanning process table");

    for pid in pids {
        match host.pid_ns_inode(pid, NsKind::Net) {
            Ok(inode) => netns.upsert(inode, Some(pid), None, None),
            Err(e) => debug!(%pid, error = %e, "Skipping net namespace of vanished process"),
        }

        match host.pid_ns_inode(pid, NsKind::Mount) {
            Ok(inode) => mount_ns.insert(inode, pid, host.mount_ns_path(pid)),
            Err(e) => debug!(%pid, error = %e, "Skipping mount namespace of vanished process"),
        }
    }

    Ok(())
}
