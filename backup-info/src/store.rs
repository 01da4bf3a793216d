//! Entry points used by collaborators.
//!
//! [`InfoStore`] resolves servers through the injected lookup and wraps every
//! mutation in the directory lock. Reads go straight to disk.

use crate::annotation::{self, AnnotationFailure, AnnotationReport, AnnotationRequest, Comments};
use crate::catalog::{self, BackupEntry};
use crate::codec;
use crate::lock::DirectoryLocks;
use crate::record::{keys, parse_tablespace_key, Lsn, Validity};
use crate::server::ServerLookup;
use crate::updater::{self, InfoValue};
use crate::utils::errors::{InfoError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A value for [`InfoStore::set_field`], tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Unsigned(u64),
    Text(String),
}

impl InfoValue for FieldValue {
    fn render(&self) -> String {
        match self {
            FieldValue::Bool(value) => value.render(),
            FieldValue::Unsigned(value) => value.render(),
            FieldValue::Text(value) => value.clone(),
        }
    }
}

const U64_KEYS: &[&str] = &[keys::BACKUP, keys::RESTORE, keys::ELAPSED];
const U32_KEYS: &[&str] = &[
    keys::VERSION,
    keys::MINOR_VERSION,
    keys::START_TIMELINE,
    keys::END_TIMELINE,
    keys::HASH_ALGORITHM,
];

/// Refuse values that would leave `backup.info` unparsable.
fn check_field(key: &str, value: &FieldValue) -> Result<()> {
    let mismatch = |expected: &str| {
        Err(InfoError::Validation(format!(
            "{} expects {}, got {:?}",
            key, expected, value
        )))
    };

    if key == keys::TABLESPACES || parse_tablespace_key(key).is_some() {
        return Err(InfoError::Validation(format!(
            "{} is structural and cannot be set on its own",
            key
        )));
    }

    match key {
        keys::KEEP | keys::STATUS => match value {
            FieldValue::Bool(_) => Ok(()),
            _ => mismatch("a boolean"),
        },
        k if U64_KEYS.contains(&k) => match value {
            FieldValue::Unsigned(_) => Ok(()),
            _ => mismatch("an unsigned integer"),
        },
        k if U32_KEYS.contains(&k) => match value {
            FieldValue::Unsigned(n) if u32::try_from(*n).is_ok() => Ok(()),
            _ => mismatch("a 32-bit unsigned integer"),
        },
        keys::START_WALPOS | keys::END_WALPOS | keys::CHKPT_WALPOS => match value {
            FieldValue::Text(text) if text.parse::<Lsn>().is_ok() => Ok(()),
            _ => mismatch("a HEX/HEX position"),
        },
        keys::COMMENTS => match value {
            FieldValue::Text(text) => Comments::decode(text).map(|_| ()),
            _ => mismatch("an encoded annotation list"),
        },
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct InfoStore {
    lookup: Arc<dyn ServerLookup>,
    locks: DirectoryLocks,
}

impl InfoStore {
    pub fn new(lookup: Arc<dyn ServerLookup>) -> Self {
        Self {
            lookup,
            locks: DirectoryLocks::new(),
        }
    }

    pub fn servers(&self) -> Vec<String> {
        self.lookup.server_names()
    }

    pub fn backup_root(&self, server: &str) -> Result<PathBuf> {
        self.lookup
            .backup_root(server)
            .ok_or_else(|| InfoError::ServerNotFound(server.to_string()))
    }

    pub fn list(&self, server: &str) -> Result<Vec<BackupEntry>> {
        catalog::list(&self.backup_root(server)?)
    }

    pub fn find(&self, server: &str, selector: &str) -> Result<BackupEntry> {
        catalog::find(&self.backup_root(server)?, selector)
    }

    /// Valid backups for `server`; zero for unknown servers or scan failures.
    pub fn count_valid(&self, server: &str) -> usize {
        match self.backup_root(server) {
            Ok(root) => catalog::count_valid(&root),
            Err(e) => {
                tracing::warn!(server, error = %e, "Unable to count valid backups");
                0
            }
        }
    }

    pub fn field(&self, server: &str, selector: &str, key: &str) -> Result<String> {
        self.find(server, selector)?.record.field(key)
    }

    /// Write the initial record into an existing backup directory.
    pub fn create_record(&self, directory: &Path, label: &str, validity: Validity) -> Result<()> {
        self.locks
            .with_lock(directory, || codec::create(directory, label, validity))
    }

    /// Create `<backup root>/<label>/` and its initial record.
    pub fn create(&self, server: &str, label: &str, validity: Validity) -> Result<PathBuf> {
        if label.is_empty() || label.contains(['/', '\\']) || label == "." || label == ".." {
            return Err(InfoError::Validation(format!("invalid backup label '{}'", label)));
        }
        let directory = self.backup_root(server)?.join(label);
        std::fs::create_dir_all(&directory).map_err(|e| InfoError::io(&directory, e))?;
        self.create_record(&directory, label, validity)?;
        tracing::info!(server, label, ?validity, "Created backup record");
        Ok(directory)
    }

    /// Update one field of the record in `directory` under its lock.
    pub fn update_field<V: InfoValue + ?Sized>(&self, directory: &Path, key: &str, value: &V) -> Result<()> {
        self.locks
            .with_lock(directory, || updater::update_field(directory, key, value))
    }

    pub fn update_unsigned(&self, directory: &Path, key: &str, value: u64) -> Result<()> {
        self.update_field(directory, key, &value)
    }

    pub fn update_string(&self, directory: &Path, key: &str, value: &str) -> Result<()> {
        self.update_field(directory, key, value)
    }

    pub fn update_bool(&self, directory: &Path, key: &str, value: bool) -> Result<()> {
        self.update_field(directory, key, &value)
    }

    /// Resolve a backup and set one field after checking the value fits the key.
    pub fn set_field(&self, server: &str, selector: &str, key: &str, value: &FieldValue) -> Result<BackupEntry> {
        check_field(key, value)?;
        let entry = self.find(server, selector)?;
        self.update_field(&entry.directory, key, value)?;
        Ok(BackupEntry {
            record: codec::load(&entry.directory)?,
            directory: entry.directory,
        })
    }

    pub fn annotate(&self, request: &AnnotationRequest) -> std::result::Result<AnnotationReport, AnnotationFailure> {
        annotation::annotate(self.lookup.as_ref(), &self.locks, request)
    }
}
