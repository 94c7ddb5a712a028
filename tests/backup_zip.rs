#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn bundle_export_and_restore() {
    let src = temp_dir("conduct-backup-src");
    let dst = temp_dir("conduct-backup-dst");
    let out = temp_dir("conduct-backup-out");

    let payload = b"sqlite-test-payload";
    std::fs::write(src.join("conduct.sqlite3"), payload).expect("write db");
    std::fs::write(dst.join("conduct.sqlite3"), b"stale").expect("write stale db");

    let bundle = out.join("workspace.conduct.zip");
    let export = backup::export_workspace_bundle(&src, &bundle).expect("export");
    assert_eq!(export.format, backup::BUNDLE_FORMAT);
    assert_eq!(export.bytes, payload.len() as u64);

    let mut archive = zip::ZipArchive::new(File::open(&bundle).expect("open")).expect("zip");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT));

    let import = backup::import_workspace_bundle(&bundle, &dst).expect("import");
    assert_eq!(import.format, backup::BUNDLE_FORMAT);
    assert_eq!(std::fs::read(dst.join("conduct.sqlite3")).expect("read"), payload);
    assert!(!dst.join("conduct.sqlite3.importing").exists());

    for d in [src, dst, out] {
        let _ = std::fs::remove_dir_all(d);
    }
}

#[test]
fn bare_sqlite_file_is_copied_in() {
    let out = temp_dir("conduct-backup-bare");
    let dst = temp_dir("conduct-backup-bare-dst");

    let file = out.join("old.sqlite3");
    std::fs::write(&file, b"bare-sqlite").expect("write");

    let import = backup::import_workspace_bundle(&file, &dst).expect("import");
    assert_eq!(import.format, backup::BARE_SQLITE_FORMAT);
    assert_eq!(std::fs::read(dst.join("conduct.sqlite3")).expect("read"), b"bare-sqlite");

    let _ = std::fs::remove_dir_all(out);
    let _ = std::fs::remove_dir_all(dst);
}

#[test]
fn export_without_database_fails() {
    let empty = temp_dir("conduct-backup-empty");
    let res = backup::export_workspace_bundle(&empty, &empty.join("x.zip"));
    assert!(res.is_err());
    let _ = std::fs::remove_dir_all(empty);
}

#[test]
fn failed_restore_keeps_live_database_and_leaves_no_temp_file() {
    let out = temp_dir("conduct-backup-fail");
    let dst = temp_dir("conduct-backup-fail-dst");

    let bad_bundle = out.join("other.zip");
    {
        let mut zw = zip::ZipWriter::new(File::create(&bad_bundle).expect("create"));
        zw.start_file("manifest.json", zip::write::FileOptions::default())
            .expect("start manifest");
        std::io::Write::write_all(&mut zw, br#"{"format":"something-else"}"#).expect("write");
        zw.finish().expect("finish");
    }
    std::fs::write(dst.join("conduct.sqlite3"), b"live").expect("write live db");
    assert!(backup::import_workspace_bundle(&bad_bundle, &dst).is_err());
    assert_eq!(std::fs::read(dst.join("conduct.sqlite3")).expect("read"), b"live");

    // The rename target cannot be replaced, so the staged copy must be cleaned up.
    let blocked = temp_dir("conduct-backup-fail-blocked");
    std::fs::create_dir_all(blocked.join("conduct.sqlite3").join("inner")).expect("dir");
    let bare = out.join("old.sqlite3");
    std::fs::write(&bare, b"bare-sqlite").expect("write");
    assert!(backup::import_workspace_bundle(&bare, &blocked).is_err());
    assert!(!blocked.join("conduct.sqlite3.importing").exists());
    assert!(blocked.join("conduct.sqlite3").join("inner").is_dir());

    for d in [out, dst, blocked] {
        let _ = std::fs::remove_dir_all(d);
    }
}
