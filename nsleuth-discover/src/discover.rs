//! Discovery orchestration

use tracing::{debug, info};

use nsleuth_core::{Error, MountNsSet, NetnsTable, NsKind, ProcessId, Result};

use crate::host::HostBackend;
use crate::mounts::MountScanner;
use crate::{procs, switch};

/// Run a full discovery pass against `host`.
///
/// The sequence: seed pid 1's network namespace, sweep the process table,
/// sweep the caller's own mount table, then enter each foreign mount
/// namespace found along the way and sweep its mount table too, tagging
/// those discoveries with the path used to get there.
///
/// Recursion goes exactly one level deep: a mount namespace that is only
/// visible from inside another mount namespace is not descended into.
/// Records come back in first-discovery order.
pub fn run<H: HostBackend + ?Sized>(host: &H) -> Result<NetnsTable> {
    let mut netns = NetnsTable::new();
    let mut mount_ns = MountNsSet::new();

    let root = host
        .pid_ns_inode(ProcessId::INIT, NsKind::Net)
        .map_err(|e| Error::RootNamespace {
            message: format!("cannot read pid 1's network namespace: {e}"),
        })?;
    netns.upsert(root, Some(ProcessId::INIT), None, None);
    debug!(inode = %root, "Seeded root network namespace");

    procs::scan(host, &mut netns, &mut mount_ns)?;

    let scanner = MountScanner::new();
    scanner.scan(host, None, &mut netns);

    // One level of recursion into every mount namespace other than the one
    // this run started in. Pid 1's namespace is taken as equivalent to the
    // caller's and already covered by the scan above; re-entering our own
    // namespace would only re-find the same mounts and mislabel them as
    // having been reached through somewhere else.
    let origin = host.origin_mount_ns();
    for candidate in &mount_ns {
        if candidate.pid == ProcessId::INIT || candidate.inode == origin {
            continue;
        }
        debug!(pid = %candidate.pid, inode = %candidate.inode, "Visiting foreign mount namespace");
        switch::with_mount_ns(host, &candidate.ns_path, || {
            scanner.scan(host, Some(&candidate.ns_path), &mut netns);
            Ok(())
        })?;
    }

    info!(
        namespaces = netns.len(),
        mount_namespaces = mount_ns.len(),
        "Discovery complete"
    );

    Ok(netns)
}
