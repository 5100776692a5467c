//! Network-namespace discovery engine
//!
//! Finds every network namespace reachable from the current process and
//! works out what keeps each one alive:
//! - Process scan - every pid's `/proc/<pid>/ns/net` identity
//! - Mount scan - `nsfs` bind-mounts that pin a namespace open
//! - Mount-namespace recursion - re-runs the mount scan from inside other
//!   processes' mount namespaces to find pins the caller cannot see
//!
//! All kernel access goes through the [`HostBackend`] seam, so the engine
//! runs unchanged against the live system ([`LinuxHost`]) or a scripted
//! in-memory double ([`MemoryHost`]).

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod discover;
pub mod host;
pub mod mounts;
pub mod procs;
pub mod switch;

pub use discover::run;
pub use host::{HostBackend, LinuxHost, MemoryHost, ProbeScript};
pub use mounts::MountScanner;
pub use switch::with_mount_ns;
