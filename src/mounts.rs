//! Work unit discovery from the host mount table.
//!
//! The mount table is read in `/proc/self/mounts` format: one mount per line,
//! whitespace-separated `device path fstype options dump pass`, with spaces
//! and other special bytes in fields written as three-digit octal escapes.

use std::collections::{BTreeSet, HashSet};
use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::WorkUnit;

/// Filesystem types relabeled when none are configured.
pub const DEFAULT_FS_TYPES: &[&str] = &["xfs", "ext4", "btrfs", "ext3", "ext2"];

/// One row of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub path: PathBuf,
    pub fs_type: String,
}

/// Parse raw mount table bytes. Lines with fewer than three fields are
/// skipped.
///
/// Paths stay bytes end to end; only the filesystem type is read as text.
pub fn parse_mount_table(content: &[u8]) -> Vec<MountEntry> {
    content
        .split(|&b| b == b'\n')
        .enumerate()
        .filter_map(|(n, line)| {
            let mut fields = line
                .split(|b| b.is_ascii_whitespace())
                .filter(|f| !f.is_empty());
            let (Some(_device), Some(path), Some(fs_type)) =
                (fields.next(), fields.next(), fields.next())
            else {
                if !line.trim_ascii().is_empty() {
                    debug!(line = n + 1, "skipping malformed mount table line");
                }
                return None;
            };
            Some(MountEntry {
                path: PathBuf::from(unescape(path)),
                fs_type: unescape(fs_type).to_string_lossy().into_owned(),
            })
        })
        .collect()
}

/// Decode `\NNN` octal escapes.
fn unescape(bytes: &[u8]) -> OsString {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
            if let Ok(b) = u8::try_from(value) {
                out.push(b);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    OsString::from_vec(out)
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

/// Read and parse the mount table at `path`.
///
/// # Errors
///
/// Returns [`Error::Discovery`] if the file cannot be read.
pub fn read_mount_table(path: &Path) -> Result<Vec<MountEntry>> {
    let content = std::fs::read(path).map_err(|source| Error::Discovery {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_mount_table(&content))
}

/// Select work units from mount entries.
///
/// Keeps entries whose type is in `fs_types`, one unit per distinct path,
/// ordered deepest-first: by path length descending, then by path bytes.
pub fn discover<S: AsRef<str>>(entries: &[MountEntry], fs_types: &[S]) -> Vec<WorkUnit> {
    let wanted: HashSet<&str> = fs_types.iter().map(AsRef::as_ref).collect();
    let paths: BTreeSet<&Path> = entries
        .iter()
        .filter(|e| wanted.contains(e.fs_type.as_str()))
        .map(|e| e.path.as_path())
        .collect();

    let mut units: Vec<WorkUnit> = paths.into_iter().map(WorkUnit::new).collect();
    units.sort_by(|a, b| {
        let (a, b) = (a.path.as_os_str().as_bytes(), b.path.as_os_str().as_bytes());
        b.len().cmp(&a.len()).then_with(|| a.cmp(b))
    });
    units
}

/// Read the mount table and discover work units in one step.
pub fn discover_from_table<S: AsRef<str>>(table: &Path, fs_types: &[S]) -> Result<Vec<WorkUnit>> {
    let entries = read_mount_table(table)?;
    let units = discover(&entries, fs_types);
    info!(
        mounts = entries.len(),
        units = units.len(),
        table = %table.display(),
        "work units discovered"
    );
    for mount in uncovered_mounts(&entries, &units) {
        warn!(
            path = %mount.path.display(),
            fs_type = %mount.fs_type,
            "nested mount has an unrecognized type and will not be relabeled"
        );
    }
    Ok(units)
}

/// Mounts nested beneath a work unit that are not work units themselves.
///
/// Jobs never cross into these, so no job relabels them.
pub fn uncovered_mounts(entries: &[MountEntry], units: &[WorkUnit]) -> Vec<MountEntry> {
    let unit_paths: HashSet<&Path> = units.iter().map(|u| u.path.as_path()).collect();
    let mut seen = HashSet::new();
    let mut uncovered: Vec<MountEntry> = entries
        .iter()
        .filter(|e| !unit_paths.contains(e.path.as_path()))
        .filter(|e| {
            units
                .iter()
                .any(|u| e.path != u.path && e.path.starts_with(&u.path))
        })
        .filter(|e| seen.insert(e.path.clone()))
        .cloned()
        .collect();
    uncovered.sort_by(|a, b| a.path.cmp(&b.path));
    uncovered
}
