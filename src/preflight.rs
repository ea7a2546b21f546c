//! Host checks that must pass before any relabel job starts.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};

/// Default selinuxfs mount point.
pub const DEFAULT_SELINUXFS: &str = "/sys/fs/selinux";

/// SELinux mode reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelinuxMode {
    Enforcing,
    Permissive,
    Disabled,
}

impl std::fmt::Display for SelinuxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SelinuxMode::Enforcing => "Enforcing",
            SelinuxMode::Permissive => "Permissive",
            SelinuxMode::Disabled => "Disabled",
        };
        write!(f, "{s}")
    }
}

/// Read the SELinux mode from `<selinuxfs>/enforce`.
///
/// A missing selinuxfs means SELinux is disabled.
pub fn selinux_mode(selinuxfs: &Path) -> Result<SelinuxMode> {
    let enforce = selinuxfs.join("enforce");
    match std::fs::read_to_string(&enforce) {
        Ok(content) => match content.trim() {
            "1" => Ok(SelinuxMode::Enforcing),
            "0" => Ok(SelinuxMode::Permissive),
            other => Err(Error::Preflight(format!(
                "unexpected value {other:?} in {}",
                enforce.display()
            ))),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SelinuxMode::Disabled),
        Err(e) => Err(e.into()),
    }
}

/// Is the effective user root?
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Fail unless running as root.
pub fn check_root() -> Result<()> {
    if is_root() {
        Ok(())
    } else {
        Err(Error::Preflight("relabeling requires root".to_string()))
    }
}

/// Run every preflight check. Returns the SELinux mode on success.
pub fn run_preflight(selinuxfs: &Path) -> Result<SelinuxMode> {
    check_root()?;
    let mode = selinux_mode(selinuxfs)?;
    if mode == SelinuxMode::Disabled {
        return Err(Error::Preflight(
            "SELinux is disabled, nothing to relabel".to_string(),
        ));
    }
    info!(%mode, "preflight passed");
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_enforce_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("enforce"), "1").unwrap();
        assert_eq!(selinux_mode(dir.path()).unwrap(), SelinuxMode::Enforcing);
        std::fs::write(dir.path().join("enforce"), "0\n").unwrap();
        assert_eq!(selinux_mode(dir.path()).unwrap(), SelinuxMode::Permissive);
    }

    #[test]
    fn missing_selinuxfs_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mode = selinux_mode(&dir.path().join("absent")).unwrap();
        assert_eq!(mode, SelinuxMode::Disabled);
    }

    #[test]
    fn garbage_enforce_value_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("enforce"), "maybe").unwrap();
        assert!(matches!(
            selinux_mode(dir.path()),
            Err(Error::Preflight(_))
        ));
    }

    #[test]
    fn disabled_selinux_fails_preflight_for_root() {
        if !is_root() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = run_preflight(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, Error::Preflight(_)));
    }

    #[test]
    fn root_check_matches_euid() {
        assert_eq!(check_root().is_ok(), is_root());
    }
}
