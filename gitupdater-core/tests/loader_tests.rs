//! Loader integration tests: primary + fragments merging, recovery, fatal errors.

use std::fs;
use std::path::PathBuf;

use assert_fs::prelude::*;
use gitupdater_core::{loader, ConfigError, ConfigSources, TargetName};
use predicates::prelude::*;
use rstest::rstest;

fn sources(home: &assert_fs::TempDir) -> ConfigSources {
    ConfigSources::default_at(home.path())
}

// ---------------------------------------------------------------------------
// 1. Absent sources
// ---------------------------------------------------------------------------

#[test]
fn missing_everything_is_an_empty_config() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let loaded = loader::load_at(home.path(), &sources(&home)).expect("load");
    assert!(loaded.config.is_empty());
    assert!(loaded.warnings.is_empty());
    assert!(loaded.sources.is_empty());
}

#[test]
fn disabled_sources_are_not_read() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".config/gitupdater").write_str("/a\n").expect("write");
    let loaded = loader::load_at(
        home.path(),
        &ConfigSources {
            primary: None,
            fragments: None,
        },
    )
    .expect("load");
    assert!(loaded.config.is_empty());
}

// ---------------------------------------------------------------------------
// 2. Merge
// ---------------------------------------------------------------------------

#[test]
fn primary_and_fragments_are_unioned_in_file_name_order() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".config/gitupdater")
        .write_str("jobs = 2\n/a\n/b\n")
        .expect("write");
    home.child(".config/gitupdater.d/20-late")
        .write_str("jobs = 7\n/d\n")
        .expect("write");
    home.child(".config/gitupdater.d/10-early")
        .write_str("[c]\npath = /c\n")
        .expect("write");
    home.child(".config/gitupdater.d/.hidden")
        .write_str("/hidden\n")
        .expect("write");

    let loaded = loader::load_at(home.path(), &sources(&home)).expect("load");
    let paths: Vec<_> = loaded.config.targets.iter().map(|t| t.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("/a"),
            PathBuf::from("/b"),
            PathBuf::from("/c"),
            PathBuf::from("/d"),
        ]
    );
    assert_eq!(loaded.config.options.jobs, 7, "later scalar wins");
    assert_eq!(loaded.sources.len(), 3);
    assert!(loaded.sources[1].ends_with("10-early"));
}

#[test]
fn duplicate_paths_across_sources_are_one_target() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".config/gitupdater")
        .write_str("[app]\npath = ~/app\n")
        .expect("write");
    home.child(".config/gitupdater.d/app")
        .write_str("[app-again]\npath = ~/app\nremote = upstream\nbranch = stable\n")
        .expect("write");

    let loaded = loader::load_at(home.path(), &sources(&home)).expect("load");
    assert_eq!(loaded.config.targets.len(), 1);
    let target = &loaded.config.targets[0];
    assert_eq!(target.name, TargetName::from("app"));
    assert_eq!(target.path, home.path().join("app"));
    assert_eq!(target.remote.as_deref(), Some("upstream"));
    assert_eq!(target.branch.as_deref(), Some("stable"));
}

#[test]
fn explicit_config_reads_sibling_fragments() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let cfg = dir.child("repos.ini");
    cfg.write_str("/a\n").expect("write");
    dir.child("repos.ini.d/extra").write_str("/b\n").expect("write");

    let sources = ConfigSources::resolve_at(dir.path(), Some(cfg.path().to_path_buf()), None);
    let loaded = loader::load_at(dir.path(), &sources).expect("load");
    assert_eq!(loaded.config.targets.len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Local recovery
// ---------------------------------------------------------------------------

#[rstest]
#[case("[x]\nremote = origin\n")]
#[case("[x\npath = /x\n")]
#[case("[x]\npath = /x\nflavour = mint\n")]
#[case("timeout_secs = soon\n")]
#[case("[]\n")]
fn malformed_entry_never_blocks_valid_ones(#[case] bad: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".config/gitupdater")
        .write_str(&format!("/before\n{bad}[after]\npath = /after\n"))
        .expect("write");

    let loaded = loader::load_at(home.path(), &sources(&home)).expect("load");
    let paths: Vec<_> = loaded.config.targets.iter().map(|t| t.path.clone()).collect();
    assert!(paths.contains(&PathBuf::from("/before")));
    assert!(paths.contains(&PathBuf::from("/after")));
    assert!(!loaded.warnings.is_empty());
    assert!(loaded
        .warnings
        .iter()
        .all(|w| matches!(w, ConfigError::Malformed { .. })));
}

#[test]
fn malformed_warning_names_file_and_line() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".config/gitupdater")
        .write_str("/ok\n[nopath]\n")
        .expect("write");
    let loaded = loader::load_at(home.path(), &sources(&home)).expect("load");
    let msg = loaded.warnings[0].to_string();
    assert!(predicate::str::contains("gitupdater:2:").eval(&msg), "got: {msg}");
    assert!(predicate::str::contains("no `path`").eval(&msg), "got: {msg}");
}

// ---------------------------------------------------------------------------
// 4. Source-level failures
// ---------------------------------------------------------------------------

#[test]
fn fragments_path_that_is_a_file_is_fatal() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".config/gitupdater").write_str("/a\n").expect("write");
    home.child(".config/gitupdater.d")
        .write_str("not a directory")
        .expect("write");

    let err = loader::load_at(home.path(), &sources(&home)).unwrap_err();
    assert!(
        matches!(err, ConfigError::DirectoryEnumerationFailed { .. }),
        "got: {err}"
    );
    assert!(err.to_string().contains("gitupdater.d"));
}

#[test]
fn unreadable_fragment_is_skipped_when_others_load() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".config/gitupdater").write_str("/a\n").expect("write");
    // Invalid UTF-8 fails `read_to_string` regardless of the user running the tests.
    let bad = home.child(".config/gitupdater.d/binary");
    bad.write_binary(&[0xff, 0xfe, 0x00, 0x80]).expect("write");

    let loaded = loader::load_at(home.path(), &sources(&home)).expect("load");
    assert_eq!(loaded.config.targets.len(), 1);
    assert_eq!(loaded.warnings.len(), 1);
    assert!(matches!(loaded.warnings[0], ConfigError::Unreadable { .. }));
}

#[test]
fn every_source_unreadable_is_fatal() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let primary = home.child(".config/gitupdater");
    primary.write_binary(&[0xc3, 0x28]).expect("write");

    let err = loader::load_at(home.path(), &sources(&home)).unwrap_err();
    assert!(matches!(err, ConfigError::Unreadable { .. }), "got: {err}");
    assert!(err.to_string().contains("cannot read config source"));
}

#[test]
fn subdirectories_in_fragments_dir_are_ignored() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    fs::create_dir_all(home.path().join(".config/gitupdater.d/nested")).expect("mkdir");
    home.child(".config/gitupdater.d/one").write_str("/one\n").expect("write");

    let files = loader::list_fragments(&home.path().join(".config/gitupdater.d")).expect("list");
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("one"));
}

// ---------------------------------------------------------------------------
// Shipped example
// ---------------------------------------------------------------------------

#[test]
fn shipped_example_config_loads_cleanly() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".config/gitupdater")
        .write_str(include_str!("../../gitupdater.example"))
        .expect("write");

    let loaded = loader::load_at(home.path(), &sources(&home)).expect("load");
    assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
    assert_eq!(loaded.config.targets.len(), 4);
    assert_eq!(loaded.config.options.jobs, 4);

    let linux = &loaded.config.targets[2];
    assert_eq!(linux.name, TargetName::from("linux"));
    assert_eq!(linux.path, home.path().join("src/linux"));
    assert_eq!(linux.branch.as_deref(), Some("master"));
    assert!(linux.url.is_some());
}
