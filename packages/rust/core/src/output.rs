//! Persist run artifacts into the output directory.
//!
//! Every file is written to a hidden temp file next to its target and then
//! renamed into place, so a crash never leaves a half-written report.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use newsdigest_shared::{NewsDigestError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// Metadata for a single written file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactMeta {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Writes `<kind>_<YYYYMMDD_HHMMSS>.*` files for one run.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    stamp: String,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, generated_at: DateTime<Utc>) -> Self {
        Self {
            dir: dir.into(),
            stamp: generated_at.format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File stem shared by every artifact of this run, e.g. `newsletter_20261015_093000`.
    pub fn stem(&self, kind: &str) -> String {
        format!("{kind}_{}", self.stamp)
    }

    pub fn write_text(&self, file_name: &str, content: &str) -> Result<ArtifactMeta> {
        self.write_bytes(Path::new(file_name), content.as_bytes())
    }

    /// Write `bytes` to `relative` under the output directory, creating parents.
    #[instrument(skip_all, fields(file = %relative.display()))]
    pub fn write_bytes(&self, relative: &Path, bytes: &[u8]) -> Result<ArtifactMeta> {
        write_atomic(&self.dir.join(relative), bytes)
    }
}

/// Write `bytes` to `target` via a temp file and rename.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<ArtifactMeta> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| NewsDigestError::io(parent, e))?;

    let file_name = target
        .file_name()
        .ok_or_else(|| NewsDigestError::validation(format!("not a file path: {}", target.display())))?
        .to_string_lossy();
    let temp = parent.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| NewsDigestError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, target) {
        let _ = std::fs::remove_file(&temp);
        return Err(NewsDigestError::io(target, e));
    }

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hash = format!("{:x}", hasher.finalize());

    debug!(path = %target.display(), size = bytes.len(), "wrote artifact");

    Ok(ArtifactMeta {
        path: target.to_path_buf(),
        sha256: hash,
        size_bytes: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn writer(dir: &Path) -> OutputWriter {
        OutputWriter::new(dir, Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 5).unwrap())
    }

    #[test]
    fn stem_uses_timestamp() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(writer(tmp.path()).stem("newsletter"), "newsletter_20261015_093005");
    }

    #[test]
    fn writes_text_and_hashes() {
        let tmp = tempfile::tempdir().unwrap();
        let meta = writer(tmp.path()).write_text("report.md", "hello").unwrap();

        assert_eq!(std::fs::read_to_string(&meta.path).unwrap(), "hello");
        assert_eq!(meta.size_bytes, 5);
        assert_eq!(
            meta.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(!tmp.path().join(".report.md.tmp").exists());
    }

    #[test]
    fn creates_nested_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let meta = writer(tmp.path())
            .write_bytes(Path::new("audio/a.mp3"), &[1, 2, 3])
            .unwrap();
        assert_eq!(meta.path, tmp.path().join("audio/a.mp3"));
        assert_eq!(std::fs::read(&meta.path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let blocked = tmp.path().join("report.md");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep.txt"), "x").unwrap();

        let err = write_atomic(&blocked, b"hello").unwrap_err();

        assert!(matches!(err, NewsDigestError::Io { .. }));
        assert!(!tmp.path().join(".report.md.tmp").exists());
    }

    #[test]
    fn overwrites_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let w = writer(tmp.path());
        w.write_text("r.md", "first").unwrap();
        w.write_text("r.md", "second").unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("r.md")).unwrap(), "second");
    }
}
