//! Report rendering
//!
//! One line per discovered namespace on stdout; all diagnostics go to
//! stderr, so the report stays machine-friendly even on a noisy run.

use std::io::{self, Write};

use nsleuth_core::{NetnsRecord, NetnsTable};

/// Render one record as its report line.
///
/// `<inode-hex> (<inode-decimal>) via <holder>`, where the holder is the
/// pid, the pinning mount path, `<pid> or <path>` when both are known, or
/// `<unknown>` as a last resort. Namespaces found through another mount
/// namespace get a ` (via <mount-ns-path>)` suffix naming the way in.
pub fn render(record: &NetnsRecord) -> String {
    let holder = match (record.pid, record.mount_path.as_deref()) {
        (Some(pid), Some(path)) => format!("{pid} or {}", path.display()),
        (Some(pid), None) => pid.to_string(),
        (None, Some(path)) => path.display().to_string(),
        (None, None) => "<unknown>".to_string(),
    };

    match record.via_mount_ns.as_deref() {
        Some(via) => format!(
            "{:x} ({}) via {holder} (via {})",
            record.inode,
            record.inode,
            via.display()
        ),
        None => format!("{:x} ({}) via {holder}", record.inode, record.inode),
    }
}

/// Write the full report, one line per namespace, in discovery order.
pub fn print(table: &NetnsTable, mut out: impl Write) -> io::Result<()> {
    for record in table {
        writeln!(out, "{}", render(record))?;
    }
    Ok(())
}
