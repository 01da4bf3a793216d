//! Discovery and selection of a server's backups.
//!
//! The catalog is a view over the backup root, rebuilt by a directory scan on
//! every call. Nothing is cached, so it always reflects what is on disk.

use crate::codec;
use crate::record::BackupRecord;
use crate::utils::errors::{InfoError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const OLDEST: &str = "oldest";
pub const LATEST: &str = "latest";
pub const NEWEST: &str = "newest";

/// One backup directory together with its loaded record.
#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    pub directory: PathBuf,
    pub record: BackupRecord,
}

impl BackupEntry {
    pub fn label(&self) -> &str {
        &self.record.label
    }
}

/// Load every backup under `root`, ordered by directory name.
///
/// Labels are time-derived, so name order is chronological order. A backup
/// whose record fails to load fails the whole listing; silently skipping it
/// would hide a backup from retention and reporting.
pub fn list(root: &Path) -> Result<Vec<BackupEntry>> {
    let metadata = std::fs::metadata(root).map_err(|e| InfoError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(InfoError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "backup root is not a directory"),
        ));
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            InfoError::io(path, e.into())
        })?;

        if !entry.file_type().is_dir() {
            continue;
        }

        let record = codec::load(entry.path())?;
        entries.push(BackupEntry {
            directory: entry.into_path(),
            record,
        });
    }

    tracing::debug!(root = %root.display(), backups = entries.len(), "Scanned backup catalog");
    Ok(entries)
}

/// Resolve `oldest`, `latest`/`newest` or an exact label.
///
/// The empty selector matches nothing, so a directory without a record (and
/// therefore without a label) is never picked by label.
pub fn select<'a>(entries: &'a [BackupEntry], selector: &str) -> Result<&'a BackupEntry> {
    let found = match selector {
        "" => None,
        OLDEST => entries.first(),
        LATEST | NEWEST => entries.last(),
        label => entries.iter().find(|e| e.record.label == label),
    };
    found.ok_or_else(|| InfoError::BackupNotFound(selector.to_string()))
}

/// List `root` and resolve `selector` in one step.
pub fn find(root: &Path, selector: &str) -> Result<BackupEntry> {
    let entries = list(root)?;
    select(&entries, selector).cloned()
}

/// Number of backups under `root` marked valid.
///
/// This feeds reporting only, so a listing failure counts as zero instead of
/// failing the caller.
pub fn count_valid(root: &Path) -> usize {
    match list(root) {
        Ok(entries) => entries.iter().filter(|e| e.record.is_valid()).count(),
        Err(e) => {
            tracing::warn!(root = %root.display(), error = %e, "Unable to count valid backups");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Validity;
    use crate::utils::errors::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn entry(label: &str) -> BackupEntry {
        BackupEntry {
            directory: PathBuf::from("/backups").join(label),
            record: BackupRecord {
                label: label.to_string(),
                ..Default::default()
            },
        }
    }

    fn make_backup(root: &Path, label: &str, validity: Validity) {
        let dir = root.join(label);
        fs::create_dir_all(&dir).unwrap();
        codec::create(&dir, label, validity).unwrap();
    }

    #[test]
    fn test_select() {
        let entries = vec![entry("20240101"), entry("20240115"), entry("20240201")];

        assert_eq!(select(&entries, "oldest").unwrap().label(), "20240101");
        assert_eq!(select(&entries, "latest").unwrap().label(), "20240201");
        assert_eq!(select(&entries, "newest").unwrap().label(), "20240201");
        assert_eq!(select(&entries, "20240115").unwrap().label(), "20240115");

        let err = select(&entries, "nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_select_on_empty_list() {
        for selector in ["oldest", "latest", "20240101"] {
            let err = select(&[], selector).unwrap_err();
            assert!(matches!(err, InfoError::BackupNotFound(_)));
        }
    }

    #[test]
    fn test_empty_selector_does_not_match_unlabelled_backup() {
        let entries = vec![entry(""), entry("20240101")];
        let err = select(&entries, "").unwrap_err();
        assert!(matches!(err, InfoError::BackupNotFound(_)));
    }

    #[test]
    fn test_list_orders_by_name_and_skips_files() -> Result<()> {
        let dir = TempDir::new().unwrap();
        make_backup(dir.path(), "20240201", Validity::Valid);
        make_backup(dir.path(), "20240101", Validity::Valid);
        make_backup(dir.path(), "20240115", Validity::Invalid);
        fs::write(dir.path().join("stray.txt"), "not a backup").unwrap();

        let entries = list(dir.path())?;
        let labels: Vec<&str> = entries.iter().map(|e| e.label()).collect();
        assert_eq!(labels, vec!["20240101", "20240115", "20240201"]);
        assert_eq!(entries[1].directory, dir.path().join("20240115"));
        Ok(())
    }

    #[test]
    fn test_list_fails_on_corrupt_record() {
        let dir = TempDir::new().unwrap();
        make_backup(dir.path(), "20240101", Validity::Valid);
        let broken = dir.path().join("20240102");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(codec::INFO_FILE), "LABEL=20240102\nBROKEN\n").unwrap();

        let err = list(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_list_missing_root_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = list(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_directory_without_record_loads_defaults() -> Result<()> {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("20240301")).unwrap();

        let entries = list(dir.path())?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.validity, Validity::Unknown);
        assert_eq!(entries[0].record.label, "");
        Ok(())
    }

    #[test]
    fn test_count_valid_counts_only_valid() {
        let dir = TempDir::new().unwrap();
        make_backup(dir.path(), "20240101", Validity::Valid);
        make_backup(dir.path(), "20240102", Validity::Invalid);
        make_backup(dir.path(), "20240103", Validity::Valid);
        fs::create_dir_all(dir.path().join("20240104")).unwrap();

        assert_eq!(count_valid(dir.path()), 2);
    }

    #[test]
    fn test_count_valid_degrades_to_zero() {
        let dir = TempDir::new().unwrap();
        make_backup(dir.path(), "20240101", Validity::Valid);
        let broken = dir.path().join("20240102");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(codec::INFO_FILE), "STATUS=1").unwrap();

        assert_eq!(count_valid(dir.path()), 0);
        assert_eq!(count_valid(&dir.path().join("missing")), 0);
    }

    #[test]
    fn test_find() -> Result<()> {
        let dir = TempDir::new().unwrap();
        make_backup(dir.path(), "20240101", Validity::Valid);
        make_backup(dir.path(), "20240102", Validity::Valid);

        assert_eq!(find(dir.path(), "latest")?.label(), "20240102");
        assert!(find(dir.path(), "20240103").is_err());
        Ok(())
    }
}
