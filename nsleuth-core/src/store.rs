//! Deduplicating record stores keyed by namespace identity
//!
//! Both stores are owned, insertion-ordered maps: iteration order is the
//! order namespaces were first seen, which keeps reports reproducible.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::types::{MountNsRecord, NetnsRecord, NsInode, ProcessId};

/// Insertion-ordered set of [`NetnsRecord`]s, at most one per inode.
#[derive(Debug, Clone, Default)]
pub struct NetnsTable {
    records: Vec<NetnsRecord>,
    index: HashMap<NsInode, usize>,
}

impl NetnsTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of `inode`.
    ///
    /// On first sight a record is created with the given fields. On later
    /// sightings only fields that are still empty are filled in; a populated
    /// field is never replaced, so for each field the first observation
    /// wins. A record can therefore end up combining holders from
    /// independent scans, e.g. a pid from the process table and a mount
    /// path from the mount table.
    pub fn upsert(
        &mut self,
        inode: NsInode,
        pid: Option<ProcessId>,
        mount_path: Option<&Path>,
        via_mount_ns: Option<&Path>,
    ) {
        if let Some(&slot) = self.index.get(&inode) {
            let record = &mut self.records[slot];
            if record.pid.is_none() {
                record.pid = pid;
            }
            if record.mount_path.is_none() {
                record.mount_path = mount_path.map(Path::to_path_buf);
            }
            if record.via_mount_ns.is_none() {
                record.via_mount_ns = via_mount_ns.map(Path::to_path_buf);
            }
        } else {
            self.index.insert(inode, self.records.len());
            self.records.push(NetnsRecord {
                inode,
                pid,
                mount_path: mount_path.map(Path::to_path_buf),
                via_mount_ns: via_mount_ns.map(Path::to_path_buf),
            });
        }
    }

    /// Look up the record for `inode`, if one exists
    #[must_use]
    pub fn get(&self, inode: NsInode) -> Option<&NetnsRecord> {
        self.index.get(&inode).map(|&slot| &self.records[slot])
    }

    /// Iterate records in first-discovery order
    pub fn iter(&self) -> std::slice::Iter<'_, NetnsRecord> {
        self.records.iter()
    }

    /// Number of distinct namespaces recorded
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a NetnsTable {
    type Item = &'a NetnsRecord;
    type IntoIter = std::slice::Iter<'a, NetnsRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Insertion-ordered set of mount namespaces to re-scan, at most one per
/// inode.
///
/// The first process seen in a namespace claims its record; later sightings
/// of the same inode are dropped. Any process in a namespace is as good an
/// entry point as any other, and keeping the first makes iteration order
/// follow the process scan.
#[derive(Debug, Clone, Default)]
pub struct MountNsSet {
    records: Vec<MountNsRecord>,
    seen: HashSet<NsInode>,
}

impl MountNsSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate namespace unless its inode is already present
    pub fn insert(&mut self, inode: NsInode, pid: ProcessId, ns_path: PathBuf) {
        if self.seen.insert(inode) {
            self.records.push(MountNsRecord {
                inode,
                pid,
                ns_path,
            });
        }
    }

    /// Iterate candidates in first-discovery order
    pub fn iter(&self) -> std::slice::Iter<'_, MountNsRecord> {
        self.records.iter()
    }

    /// Number of distinct mount namespaces recorded
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a MountNsSet {
    type Item = &'a MountNsRecord;
    type IntoIter = std::slice::Iter<'a, MountNsRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
