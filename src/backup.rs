use anyhow::{anyhow, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DB_FILE: &str = "conduct.sqlite3";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/conduct.sqlite3";
pub const BUNDLE_FORMAT: &str = "conduct-workspace-v1";
pub const BARE_SQLITE_FORMAT: &str = "sqlite3";

#[derive(Debug, Clone)]
pub struct BundleSummary {
    pub format: String,
    pub bytes: u64,
}

pub fn export_workspace_bundle(workspace: &Path, out_path: &Path) -> anyhow::Result<BundleSummary> {
    let db_path = workspace.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!("no database in workspace {}", workspace.to_string_lossy()));
    }
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
    });
    zip.start_file(MANIFEST_ENTRY, opts)?;
    zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())
        .context("failed to write manifest")?;

    zip.start_file(DB_ENTRY, opts)?;
    let mut db = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    let bytes = std::io::copy(&mut db, &mut zip).context("failed to write database entry")?;

    zip.finish().context("failed to finalize bundle")?;
    Ok(BundleSummary {
        format: BUNDLE_FORMAT.to_string(),
        bytes,
    })
}

/// Restores a bundle, or copies a bare sqlite file in as the workspace database.
/// The database is staged in a temp file and renamed over the live one, so a bad
/// bundle leaves the old database intact and no temp file behind.
pub fn import_workspace_bundle(in_path: &Path, workspace: &Path) -> anyhow::Result<BundleSummary> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let dst = workspace.join(DB_FILE);
    let tmp = workspace.join(format!("{DB_FILE}.importing"));

    let restored = stage_database(in_path, &tmp).and_then(|staged| {
        std::fs::rename(&tmp, &dst).with_context(|| {
            format!("failed to move restored database to {}", dst.to_string_lossy())
        })?;
        Ok(staged)
    });
    if restored.is_err() && tmp.exists() {
        let _ = std::fs::remove_file(&tmp);
    }
    let (format, bytes) = restored?;

    Ok(BundleSummary {
        format: format.to_string(),
        bytes,
    })
}

fn stage_database(in_path: &Path, tmp: &Path) -> anyhow::Result<(&'static str, u64)> {
    if !looks_like_zip(in_path)? {
        let bytes = std::fs::copy(in_path, tmp)
            .with_context(|| format!("failed to copy {}", in_path.to_string_lossy()))?;
        return Ok((BARE_SQLITE_FORMAT, bytes));
    }

    let file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest.get("format").and_then(|v| v.as_str()).unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut entry = archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {DB_ENTRY}"))?;
    let mut out = File::create(tmp)
        .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;
    let bytes = std::io::copy(&mut entry, &mut out).context("failed to extract database entry")?;
    out.flush()?;
    Ok((BUNDLE_FORMAT, bytes))
}

fn looks_like_zip(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig)?;
    Ok(read == 4 && sig == [0x50, 0x4B, 0x03, 0x04])
}
