//! Mount-table scanning
//!
//! Walks a mount table in the `/proc/mounts` line format, keeps the `nsfs`
//! entries, asks the host whether each one pins a network namespace, and
//! records the ones that do. The scan is fail-soft end to end: an
//! unopenable table yields nothing, and a bad entry never stops the walk.

use std::ffi::OsString;
use std::io::{self, BufRead};
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use nsleuth_core::NetnsTable;

use crate::host::HostBackend;

/// Default cap on a single mount-table line, in bytes.
pub const DEFAULT_MAX_LINE: usize = 4096;

/// Scanner over a mount table in the `/proc/mounts` format: whitespace
/// separated `source mountpoint fstype options dump fsck` fields.
#[derive(Debug, Clone)]
pub struct MountScanner {
    max_line: usize,
}

impl Default for MountScanner {
    fn default() -> Self {
        Self {
            max_line: DEFAULT_MAX_LINE,
        }
    }
}

impl MountScanner {
    /// Create a scanner with the default line cap
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the maximum accepted line length
    #[must_use]
    pub const fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Scan the mount table of the host's current mount namespace.
    ///
    /// Discoveries are merged into `table`, tagged with `via` when the scan
    /// runs inside a mount namespace that was entered through that path.
    pub fn scan<H: HostBackend + ?Sized>(
        &self,
        host: &H,
        via: Option<&Path>,
        table: &mut NetnsTable,
    ) {
        match host.open_mount_table() {
            Ok(reader) => self.scan_reader(host, reader, via, table),
            Err(e) => warn!(error = %e, "Cannot open mount table"),
        }
    }

    fn scan_reader<H: HostBackend + ?Sized>(
        &self,
        host: &H,
        mut reader: impl BufRead,
        via: Option<&Path>,
        table: &mut NetnsTable,
    ) {
        loop {
            match read_bounded_line(&mut reader, self.max_line) {
                Ok(None) => break,
                Ok(Some(LineRead::Oversized(len))) => {
                    warn!(len, max = self.max_line, "Skipping oversized mount table line");
                }
                Ok(Some(LineRead::Line(line))) => scan_entry(host, &line, via, table),
                Err(e) => {
                    warn!(error = %e, "Error reading mount table");
                    break;
                }
            }
        }
    }
}

fn scan_entry<H: HostBackend + ?Sized>(
    host: &H,
    line: &str,
    via: Option<&Path>,
    table: &mut NetnsTable,
) {
    let mut fields = line.split_whitespace();
    let (Some(_source), Some(mountpoint), Some(fstype)) =
        (fields.next(), fields.next(), fields.next())
    else {
        if !line.trim().is_empty() {
            warn!(line, "Malformed mount table line");
        }
        return;
    };

    if fstype != "nsfs" {
        return;
    }

    let mountpoint = unescape_mount_path(mountpoint);
    match host.probe_netns(&mountpoint) {
        Ok(Some(inode)) => {
            debug!(inode = %inode, mountpoint = %mountpoint.display(), "Found pinned network namespace");
            table.upsert(inode, None, Some(&mountpoint), via);
        }
        // a namespace of another kind; routine, not worth a diagnostic
        Ok(None) => {}
        Err(e) => {
            warn!(mountpoint = %mountpoint.display(), error = %e, "Cannot check namespace mount");
        }
    }
}

enum LineRead {
    Line(String),
    Oversized(usize),
}

/// Read one newline-terminated line, growing as needed up to `max` bytes.
///
/// Lines over the cap are not truncated into bogus entries: the whole line
/// is drained and reported back as [`LineRead::Oversized`] with its length,
/// so the next read starts cleanly on the following line.
fn read_bounded_line(reader: &mut impl BufRead, max: usize) -> io::Result<Option<LineRead>> {
    let mut buf = Vec::new();
    let n = reader
        .by_ref()
        .take(max as u64 + 1)
        .read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        return Ok(Some(LineRead::Line(
            String::from_utf8_lossy(&buf).into_owned(),
        )));
    }

    if buf.len() <= max {
        // final line without a trailing newline
        return Ok(Some(LineRead::Line(
            String::from_utf8_lossy(&buf).into_owned(),
        )));
    }

    // over the cap: swallow the rest of the line so the reader stays aligned
    let mut total = buf.len();
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            total += pos;
            reader.consume(pos + 1);
            break;
        }
        total += chunk.len();
        let len = chunk.len();
        reader.consume(len);
    }
    Ok(Some(LineRead::Oversized(total)))
}

/// Decode the octal escapes the kernel uses in mount table fields.
///
/// Whitespace and backslashes inside a mountpoint are rendered as `\NNN`
/// octal sequences, so `/a b` arrives as `/a\040b`. Decoding goes through
/// raw bytes so mountpoints that are not valid UTF-8 survive. Sequences
/// that are not three octal digits (or name a value over 255) are kept
/// literally.
#[must_use]
pub fn unescape_mount_path(field: &str) -> PathBuf {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..=i + 3];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(OsString::from_vec(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, ProbeScript};
    use nsleuth_core::NsInode;
    use std::io::Cursor;

    fn ino(n: u64) -> NsInode {
        NsInode::from_raw(n)
    }

    #[test]
    fn test_unescape_spaces() {
        assert_eq!(
            unescape_mount_path("/a\\040b\\040c"),
            PathBuf::from("/a b c")
        );
    }

    #[test]
    fn test_unescape_passthrough() {
        assert_eq!(
            unescape_mount_path("/run/netns/foo"),
            PathBuf::from("/run/netns/foo")
        );
    }

    #[test]
    fn test_unescape_backslash() {
        assert_eq!(unescape_mount_path("/a\\134b"), PathBuf::from("/a\\b"));
    }

    #[test]
    fn test_unescape_keeps_malformed_sequences() {
        // too short, non-octal, and over 255 all stay literal
        assert_eq!(unescape_mount_path("/a\\04"), PathBuf::from("/a\\04"));
        assert_eq!(unescape_mount_path("/a\\0x9b"), PathBuf::from("/a\\0x9b"));
        assert_eq!(unescape_mount_path("/a\\777b"), PathBuf::from("/a\\777b"));
    }

    #[test]
    fn test_bounded_line_reader() {
        let mut reader = Cursor::new(b"short line\nlast without newline".to_vec());

        let Some(LineRead::Line(first)) = read_bounded_line(&mut reader, 64).unwrap() else {
            panic!("expected a line");
        };
        assert_eq!(first, "short line");

        let Some(LineRead::Line(last)) = read_bounded_line(&mut reader, 64).unwrap() else {
            panic!("expected a line");
        };
        assert_eq!(last, "last without newline");

        assert!(read_bounded_line(&mut reader, 64).unwrap().is_none());
    }

    #[test]
    fn test_bounded_line_reader_reports_oversized() {
        let long = "x".repeat(100);
        let data = format!("{long}\nnext\n");
        let mut reader = Cursor::new(data.into_bytes());

        let Some(LineRead::Oversized(len)) = read_bounded_line(&mut reader, 16).unwrap() else {
            panic!("expected an oversized report");
        };
        assert_eq!(len, 100);

        // the reader realigns on the following line
        let Some(LineRead::Line(next)) = read_bounded_line(&mut reader, 16).unwrap() else {
            panic!("expected a line");
        };
        assert_eq!(next, "next");
    }

    #[test]
    fn test_line_exactly_at_cap_is_accepted() {
        let mut reader = Cursor::new(b"abcd\n".to_vec());
        let Some(LineRead::Line(line)) = read_bounded_line(&mut reader, 4).unwrap() else {
            panic!("expected a line");
        };
        assert_eq!(line, "abcd");
    }

    #[test]
    fn test_scan_filters_to_nsfs() {
        let host = MemoryHost::new(ino(100));
        let mounts = "proc /proc proc rw,nosuid 0 0\n\
                      tmpfs /run tmpfs rw,mode=755 0 0\n";
        let mut table = NetnsTable::new();

        MountScanner::new().scan_reader(&host, Cursor::new(mounts), None, &mut table);

        assert!(table.is_empty());
        assert_eq!(host.probe_count(), 0);
    }

    #[test]
    fn test_scan_records_network_namespace_mount() {
        let host = MemoryHost::new(ino(100));
        host.script_probe("/run/netns/blue", ProbeScript::Netns(ino(2)));
        let mounts = "nsfs /run/netns/blue nsfs rw 0 0\n";
        let mut table = NetnsTable::new();

        MountScanner::new().scan_reader(&host, Cursor::new(mounts), None, &mut table);

        let rec = table.get(ino(2)).unwrap();
        assert_eq!(rec.mount_path.as_deref(), Some(Path::new("/run/netns/blue")));
        assert_eq!(rec.pid, None);
        assert_eq!(rec.via_mount_ns, None);
    }

    #[test]
    fn test_scan_skips_other_namespace_kinds() {
        let host = MemoryHost::new(ino(100));
        host.script_probe("/run/utsns/host", ProbeScript::OtherKind);
        let mounts = "nsfs /run/utsns/host nsfs rw 0 0\n";
        let mut table = NetnsTable::new();

        MountScanner::new().scan_reader(&host, Cursor::new(mounts), None, &mut table);

        assert!(table.is_empty());
        assert_eq!(host.probe_count(), 1);
    }

    #[test]
    fn test_scan_survives_probe_failure() {
        let host = MemoryHost::new(ino(100));
        host.script_probe("/run/netns/gone", ProbeScript::Fail(io::ErrorKind::NotFound));
        host.script_probe("/run/netns/ok", ProbeScript::Netns(ino(9)));
        let mounts = "nsfs /run/netns/gone nsfs rw 0 0\n\
                      nsfs /run/netns/ok nsfs rw 0 0\n";
        let mut table = NetnsTable::new();

        MountScanner::new().scan_reader(&host, Cursor::new(mounts), None, &mut table);

        assert_eq!(table.len(), 1);
        assert!(table.get(ino(9)).is_some());
    }

    #[test]
    fn test_scan_decodes_escaped_mountpoint() {
        let host = MemoryHost::new(ino(100));
        host.script_probe("/run/netns/with space", ProbeScript::Netns(ino(4)));
        let mounts = "nsfs /run/netns/with\\040space nsfs rw 0 0\n";
        let mut table = NetnsTable::new();

        MountScanner::new().scan_reader(&host, Cursor::new(mounts), None, &mut table);

        let rec = table.get(ino(4)).unwrap();
        assert_eq!(
            rec.mount_path.as_deref(),
            Some(Path::new("/run/netns/with space"))
        );
    }

    #[test]
    fn test_scan_tags_discoveries_with_via_path() {
        let host = MemoryHost::new(ino(100));
        host.script_probe("/run/netns/deep", ProbeScript::Netns(ino(8)));
        let mounts = "nsfs /run/netns/deep nsfs rw 0 0\n";
        let mut table = NetnsTable::new();

        MountScanner::new().scan_reader(
            &host,
            Cursor::new(mounts),
            Some(Path::new("/proc/42/ns/mnt")),
            &mut table,
        );

        let rec = table.get(ino(8)).unwrap();
        assert_eq!(
            rec.via_mount_ns.as_deref(),
            Some(Path::new("/proc/42/ns/mnt"))
        );
    }

    #[test]
    fn test_scan_skips_malformed_lines() {
        let host = MemoryHost::new(ino(100));
        host.script_probe("/run/netns/ok", ProbeScript::Netns(ino(5)));
        let mounts = "too few\n\
                      \n\
                      nsfs /run/netns/ok nsfs rw 0 0\n";
        let mut table = NetnsTable::new();

        MountScanner::new().scan_reader(&host, Cursor::new(mounts), None, &mut table);

        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_scan_skips_oversized_line_and_recovers() {
        let host = MemoryHost::new(ino(100));
        host.script_probe("/run/netns/ok", ProbeScript::Netns(ino(6)));
        let padding = "x".repeat(64);
        let mounts = format!(
            "nsfs /run/netns/{padding} nsfs rw 0 0\n\
             nsfs /run/netns/ok nsfs rw 0 0\n"
        );
        let mut table = NetnsTable::new();

        MountScanner::new().with_max_line(40).scan_reader(
            &host,
            Cursor::new(mounts.into_bytes()),
            None,
            &mut table,
        );

        // the oversized entry is dropped whole; the next line still parses
        assert_eq!(table.len(), 1);
        assert!(table.get(ino(6)).is_some());
        assert_eq!(host.probe_count(), 1);
    }

    #[test]
    fn test_scan_with_unreadable_table_yields_nothing() {
        // no table registered for the current namespace
        let host = MemoryHost::new(ino(100));
        let mut table = NetnsTable::new();

        MountScanner::new().scan(&host, None, &mut table);

        assert!(table.is_empty());
    }
}
