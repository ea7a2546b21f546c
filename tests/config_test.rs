use std::collections::HashMap;
use std::path::PathBuf;

use relabel_rs::config::Config;
use relabel_rs::error::Error;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn defaults_match_a_stock_host() {
    let config = Config::default();
    assert_eq!(config.reserved_cores, 2);
    assert_eq!(config.max_jobs, None);
    assert_eq!(config.fs_types, vec!["xfs", "ext4", "btrfs", "ext3", "ext2"]);
    assert_eq!(config.mount_table, PathBuf::from("/proc/self/mounts"));
    assert_eq!(config.command.program, PathBuf::from("restorecon"));
    assert_eq!(config.command.one_filesystem_flag, "-x");
}

#[test]
fn env_overrides_defaults() {
    let mut config = Config::default();
    config
        .apply_env(lookup(&[
            ("RELABEL_RESERVED_CORES", "4"),
            ("RELABEL_MAX_JOBS", "3"),
            ("RELABEL_FS_TYPES", "xfs, ext4,,"),
            ("RELABEL_LOG_DIR", "/tmp/relabel-logs"),
            ("RELABEL_COMMAND", "/usr/sbin/restorecon"),
        ]))
        .unwrap();

    assert_eq!(config.reserved_cores, 4);
    assert_eq!(config.max_jobs, Some(3));
    assert_eq!(config.fs_types, vec!["xfs", "ext4"]);
    assert_eq!(config.log_dir, PathBuf::from("/tmp/relabel-logs"));
    assert_eq!(config.command.program, PathBuf::from("/usr/sbin/restorecon"));
}

#[test]
fn malformed_numbers_are_config_errors() {
    let mut config = Config::default();
    let err = config
        .apply_env(lookup(&[("RELABEL_RESERVED_CORES", "two")]))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn empty_fs_type_list_is_rejected() {
    let mut config = Config::default();
    let err = config
        .apply_env(lookup(&[("RELABEL_FS_TYPES", " , ")]))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn toml_file_overrides_defaults() {
    let config = Config::from_toml_str(
        r#"
        reserved_cores = 1
        fs_types = ["xfs"]
        log_dir = "/srv/logs"

        [command]
        program = "/usr/sbin/setfiles-wrapper"
        "#,
    )
    .unwrap();

    assert_eq!(config.reserved_cores, 1);
    assert_eq!(config.fs_types, vec!["xfs"]);
    assert_eq!(config.log_dir, PathBuf::from("/srv/logs"));
    assert_eq!(config.command.program, PathBuf::from("/usr/sbin/setfiles-wrapper"));
    assert_eq!(config.command.args, vec!["-R", "-v"]);
    assert_eq!(config.command.one_filesystem_flag, "-x");
    assert_eq!(config.mount_table, PathBuf::from("/proc/self/mounts"));
}

#[test]
fn unknown_toml_keys_are_rejected() {
    assert!(Config::from_toml_str("max_job = 3").is_err());
}

#[test]
fn load_reads_file_then_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relabel.toml");
    std::fs::write(&path, "max_jobs = 5\nreserved_cores = 0\n").unwrap();

    unsafe {
        std::env::set_var("RELABEL_MAX_JOBS", "7");
    }
    let config = Config::load(Some(&path)).unwrap();
    unsafe {
        std::env::remove_var("RELABEL_MAX_JOBS");
    }

    assert_eq!(config.max_jobs, Some(7));
    assert_eq!(config.reserved_cores, 0);
}

#[test]
fn missing_config_file_is_an_error() {
    let err = Config::load(Some(std::path::Path::new("/nonexistent/relabel.toml"))).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
