//! End-to-end: mount table on disk -> work units -> job pool -> report.

use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use relabel_rs::budget::ResourceBudget;
use relabel_rs::error::Error;
use relabel_rs::launcher::{JobLauncher, RelabelCommand};
use relabel_rs::mounts::{self, DEFAULT_FS_TYPES};
use relabel_rs::scheduler::JobPool;

const MOUNTS: &str = "\
/dev/mapper/rhel-root / xfs rw,seclabel,relatime,attr2,inode64 0 0
sysfs /sys sysfs rw,seclabel,nosuid,nodev,noexec,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/mapper/rhel-var /var xfs rw,seclabel,relatime 0 0
/dev/sdb1 /var/lib/containers xfs rw,seclabel,relatime 0 0
tmpfs /run tmpfs rw,seclabel,nosuid,nodev 0 0
/dev/sda1 /boot ext4 rw,seclabel,relatime 0 0
";

#[test]
fn discovers_recognized_mounts_deepest_first() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("mounts");
    std::fs::write(&table, MOUNTS).unwrap();

    let units = mounts::discover_from_table(&table, &["xfs"]).unwrap();
    let paths: Vec<_> = units.iter().map(|u| u.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("/var/lib/containers"),
            PathBuf::from("/var"),
            PathBuf::from("/"),
        ]
    );
}

#[test]
fn non_utf8_mount_paths_are_discovered_byte_exact() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("mounts");
    std::fs::write(&table, b"/dev/sda1 /mnt/caf\xe9 xfs rw 0 0\n").unwrap();

    let units = mounts::discover_from_table(&table, DEFAULT_FS_TYPES).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].path.as_os_str().as_bytes(), b"/mnt/caf\xe9");
    assert_eq!(units[0].log_sink_id, "-mnt-caf_E9");
}

#[test]
fn unreadable_mount_table_aborts_discovery() {
    let err = mounts::discover_from_table(
        std::path::Path::new("/nonexistent/proc/mounts"),
        DEFAULT_FS_TYPES,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Discovery { .. }));
}

#[tokio::test]
async fn full_run_over_discovered_units() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("mounts");
    std::fs::write(&table, MOUNTS).unwrap();
    let log_dir = dir.path().join("logs");
    std::fs::create_dir(&log_dir).unwrap();

    let units = mounts::discover_from_table(&table, DEFAULT_FS_TYPES).unwrap();
    assert_eq!(units.len(), 4);

    let budget = ResourceBudget::from_query(|| Ok(4), 2);
    assert_eq!(budget.max_jobs, 2);

    let command = RelabelCommand {
        program: PathBuf::from("sh"),
        args: vec![
            "-c".to_string(),
            r#"echo "restorecon $1 $2"; [ "$2" != /boot ]"#.to_string(),
            "relabel".to_string(),
        ],
        one_filesystem_flag: "-x".to_string(),
    };
    let pool = JobPool::new(JobLauncher::new(command, &log_dir), budget.max_jobs);
    let report = pool.run(units).await;

    assert_eq!(report.jobs.len(), 4);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.max_jobs, 2);
    assert!(pool.snapshot().peak_running() <= 2);

    let boot = report.failures().next().unwrap();
    assert_eq!(boot.unit.path, PathBuf::from("/boot"));
    assert_eq!(boot.log_path, log_dir.join("-boot.log"));

    let root_log = std::fs::read_to_string(log_dir.join("-.log")).unwrap();
    assert_eq!(root_log, "restorecon -x /\n");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["jobs"].as_array().unwrap().len(), 4);
}
