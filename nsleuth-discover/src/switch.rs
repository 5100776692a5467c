//! Scoped mount-namespace switching
//!
//! Entering another process's mount namespace redirects every subsequent
//! path lookup on the thread, so a switch that is not undone corrupts the
//! rest of the run. This module brackets a body between the switch in and
//! the switch back, restoring on every exit path.

use std::path::Path;

use tracing::{debug, warn};

use nsleuth_core::{Error, Result};

use crate::host::HostBackend;

/// Run `body` inside the mount namespace at `target`.
///
/// When the namespace cannot be entered the candidate is logged and
/// skipped: the body never runs and `Ok(None)` comes back, leaving the
/// caller free to move on to the next one.
///
/// Once entry succeeds the origin namespace is restored whether `body`
/// succeeds or fails. A restore failure is fatal and takes precedence over
/// the body's own result: with the thread stuck in a foreign mount
/// namespace, every later filesystem operation would resolve against the
/// wrong view of the world.
pub fn with_mount_ns<H, T, F>(host: &H, target: &Path, body: F) -> Result<Option<T>>
where
    H: HostBackend + ?Sized,
    F: FnOnce() -> Result<T>,
{
    if let Err(e) = host.enter_mount_ns(target) {
        warn!(target = %target.display(), error = %e, "Cannot enter mount namespace");
        return Ok(None);
    }
    debug!(target = %target.display(), "Entered mount namespace");

    let outcome = body();

    if let Err(e) = host.restore_mount_ns() {
        return Err(Error::MountNamespace {
            message: format!(
                "cannot return to the original mount namespace after visiting {}: {e}",
                target.display()
            ),
        });
    }

    outcome.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use nsleuth_core::{NsInode, ProcessId};

    fn ino(n: u64) -> NsInode {
        NsInode::from_raw(n)
    }

    fn host_with_foreign_ns() -> MemoryHost {
        let host = MemoryHost::new(ino(100));
        host.add_process(ProcessId::from_raw(7), ino(1), ino(200));
        host
    }

    #[test]
    fn test_body_runs_inside_target_and_origin_is_restored() {
        let host = host_with_foreign_ns();

        let seen = with_mount_ns(&host, Path::new("/proc/7/ns/mnt"), || {
            Ok(host.current_mount_ns())
        })
        .unwrap();

        assert_eq!(seen, Some(ino(200)));
        assert_eq!(host.current_mount_ns(), ino(100));
        assert_eq!(host.restore_count(), 1);
    }

    #[test]
    fn test_unenterable_namespace_is_skipped() {
        let host = host_with_foreign_ns();
        host.deny_enter("/proc/7/ns/mnt");

        let result: Option<()> = with_mount_ns(&host, Path::new("/proc/7/ns/mnt"), || {
            panic!("body must not run");
        })
        .unwrap();

        assert_eq!(result, None);
        assert_eq!(host.restore_count(), 0);
        assert_eq!(host.current_mount_ns(), ino(100));
    }

    #[test]
    fn test_restore_runs_even_when_body_fails() {
        let host = host_with_foreign_ns();

        let result: Result<Option<()>> = with_mount_ns(&host, Path::new("/proc/7/ns/mnt"), || {
            Err(Error::RootNamespace {
                message: "injected".to_string(),
            })
        });

        assert!(matches!(result, Err(Error::RootNamespace { .. })));
        assert_eq!(host.restore_count(), 1);
        assert_eq!(host.current_mount_ns(), ino(100));
    }

    #[test]
    fn test_restore_failure_is_fatal_and_wins_over_body_success() {
        let host = host_with_foreign_ns();
        host.fail_restore();

        let result = with_mount_ns(&host, Path::new("/proc/7/ns/mnt"), || Ok(42));

        assert!(matches!(result, Err(Error::MountNamespace { .. })));
    }
}
