use bundle_abi::{EntryType, NameError};
use bundler::{Manifest, ManifestError, encode, load_entries};
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

fn write(dir: &Path, rel: &str, bytes: &[u8]) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create dirs");
    }
    fs::write(path, bytes).expect("write file");
}

fn fixture(manifest: &str) -> TempDir {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), "init.bin", &[1; 10]);
    write(dir.path(), "drivers/drv0.bin", &[2; 5000]);
    write(dir.path(), "svc0.bin", &[]);
    write(dir.path(), "manifest.json", manifest.as_bytes());
    dir
}

#[test]
fn loads_entries_in_manifest_order() {
    let dir = fixture(
        r#"[
            {"name": "init", "path": "init.bin", "type": "init", "required": true},
            {"name": "drv0", "path": "drivers/drv0.bin", "type": "Driver"},
            {"name": "svc0", "path": "svc0.bin", "type": "SERVICE", "required": false}
        ]"#,
    );

    let entries = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap();
    let summary: Vec<_> = entries
        .iter()
        .map(|e| (e.name.as_str(), e.entry_type, e.required, e.payload.len()))
        .collect();
    assert_eq!(
        summary,
        [
            ("init", EntryType::Init, true, 10),
            ("drv0", EntryType::Driver, false, 5000),
            ("svc0", EntryType::Service, false, 0),
        ]
    );

    let bytes = encode(&entries).unwrap();
    assert_eq!(bytes.len(), 16384);
}

#[test]
fn unknown_or_missing_type_is_tolerated() {
    let dir = fixture(
        r#"[
            {"name": "a", "path": "init.bin", "type": "firmware"},
            {"name": "b", "path": "svc0.bin"}
        ]"#,
    );

    let entries = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap();
    assert_eq!(entries[0].entry_type, EntryType::Unknown);
    assert_eq!(entries[1].entry_type, EntryType::Unknown);
    assert!(!entries[1].required);
}

#[test]
fn required_flag_is_read_loosely() {
    let dir = fixture(
        r#"[
            {"name": "init", "path": "init.bin", "type": "init", "required": 1},
            {"name": "svc0", "path": "svc0.bin", "required": "no"},
            {"name": "svc1", "path": "svc0.bin", "required": 0}
        ]"#,
    );

    let entries = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap();
    let required: Vec<_> = entries.iter().map(|e| e.required).collect();
    assert_eq!(required, [true, true, false]);
}

#[test]
fn absolute_paths_ignore_base() {
    let dir = fixture("[]");
    let abs = dir.path().join("init.bin");
    let json = format!(r#"[{{"name": "init", "path": {:?}}}]"#, abs.to_str().unwrap());

    let entries = Manifest::from_json(&json)
        .unwrap()
        .load_entries("/definitely/not/here")
        .unwrap();
    assert_eq!(entries[0].payload, [1u8; 10]);
}

#[test]
fn missing_payload_file() {
    let dir = fixture(
        r#"[
            {"name": "init", "path": "init.bin"},
            {"name": "gone", "path": "gone.bin"}
        ]"#,
    );

    let err = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap_err();
    match err {
        ManifestError::MissingInput { index, path } => {
            assert_eq!(index, 1);
            assert_eq!(path, dir.path().join("gone.bin"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn directory_is_not_a_payload() {
    let dir = fixture(r#"[{"name": "drivers", "path": "drivers"}]"#);
    let err = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap_err();
    assert!(matches!(err, ManifestError::MissingInput { index: 0, .. }));
}

#[test]
fn duplicate_names_are_rejected() {
    let dir = fixture(
        r#"[
            {"name": "svc", "path": "init.bin"},
            {"name": "other", "path": "init.bin"},
            {"name": "svc", "path": "svc0.bin"}
        ]"#,
    );

    let err = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap_err();
    assert!(matches!(
        err,
        ManifestError::DuplicateName { index: 2, first: 0, ref name } if name == "svc"
    ));
}

#[test]
fn invalid_names_are_rejected() {
    let long = "x".repeat(32);
    let dir = fixture(&format!(r#"[{{"name": "{long}", "path": "init.bin"}}]"#));
    let err = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap_err();
    assert!(matches!(
        err,
        ManifestError::InvalidName {
            index: 0,
            source: NameError::TooLong { len: 32 },
            ..
        }
    ));

    let dir = fixture(r#"[{"name": "café", "path": "init.bin"}]"#);
    let err = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap_err();
    assert!(matches!(
        err,
        ManifestError::InvalidName {
            source: NameError::NonAscii,
            ..
        }
    ));
}

#[test]
fn missing_or_malformed_manifest() {
    let dir = fixture("not json");

    let err = load_entries(dir.path().join("absent.json"), dir.path()).unwrap_err();
    assert!(matches!(err, ManifestError::Io { .. }));

    let err = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap_err();
    assert!(matches!(err, ManifestError::Parse(_)));
}

#[test]
fn empty_manifest_is_an_error() {
    let dir = fixture("[]");
    let err = load_entries(dir.path().join("manifest.json"), dir.path()).unwrap_err();
    assert!(matches!(err, ManifestError::Empty));
}
