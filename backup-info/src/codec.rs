//! Reading and writing the `backup.info` text format.
//!
//! Every line is `KEY=VALUE\n`. The key ends at the first `=`; everything up
//! to the newline is the value. Unknown keys are skipped so that files written
//! by newer tools still load, but anything that does not fit the line grammar
//! is rejected instead of guessed at.

use crate::annotation::Comments;
use crate::record::{keys, parse_tablespace_key, BackupRecord, HashAlgorithm, Lsn, TablespaceField, Validity};
use crate::updater;
use crate::utils::errors::{InfoError, Result};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the metadata file inside each backup directory.
pub const INFO_FILE: &str = "backup.info";

/// Version stamped into `PGMONETA_VERSION` by [`create`].
pub const FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn info_path(directory: &Path) -> PathBuf {
    directory.join(INFO_FILE)
}

/// Split one line (without its newline) into key and value.
pub(crate) fn split_line(line: &str) -> Option<(&str, &str)> {
    match line.split_once('=') {
        Some((key, value)) if !key.is_empty() => Some((key, value)),
        _ => None,
    }
}

fn number<T: FromStr>(key: &str, value: &str, context: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| InfoError::parse(context, format!("{} has non-numeric value '{}'", key, value)))
}

/// Parse the full contents of a `backup.info` file.
pub fn parse(contents: &str) -> Result<BackupRecord> {
    let mut record = BackupRecord::default();
    let mut seen = HashSet::new();
    let mut declared_tablespaces = 0usize;
    let mut pending = crate::record::Tablespace::default();
    let mut pending_used = false;

    for (index, raw) in contents.split_inclusive('\n').enumerate() {
        let context = format!("line {}", index + 1);
        let line = raw
            .strip_suffix('\n')
            .ok_or_else(|| InfoError::parse(&context, "missing trailing newline"))?;
        let (key, value) = split_line(line)
            .ok_or_else(|| InfoError::parse(&context, format!("expected KEY=VALUE, got '{}'", line)))?;

        if keys::is_known(key) && !seen.insert(key) {
            return Err(InfoError::parse(&context, format!("duplicate key {}", key)));
        }

        match key {
            keys::STATUS => record.validity = Validity::from_status(value),
            keys::LABEL => record.label = value.to_string(),
            keys::WAL => record.wal_start_file = value.to_string(),
            keys::TABLESPACES => declared_tablespaces = number(key, value, &context)?,
            keys::VERSION => record.server_version = number(key, value, &context)?,
            keys::MINOR_VERSION => record.server_minor_version = number(key, value, &context)?,
            keys::BACKUP => record.backup_size_bytes = number(key, value, &context)?,
            keys::RESTORE => record.restore_size_bytes = number(key, value, &context)?,
            keys::ELAPSED => record.elapsed_seconds = number(key, value, &context)?,
            keys::KEEP => {
                record.keep = match value {
                    "1" => true,
                    "0" => false,
                    other => {
                        return Err(InfoError::parse(&context, format!("KEEP must be 0 or 1, got '{}'", other)))
                    }
                }
            }
            keys::START_WALPOS | keys::END_WALPOS | keys::CHKPT_WALPOS => {
                let lsn: Lsn = value.parse().map_err(|e: String| InfoError::parse(&context, e))?;
                match key {
                    keys::START_WALPOS => record.start_lsn = lsn,
                    keys::END_WALPOS => record.end_lsn = lsn,
                    _ => record.checkpoint_lsn = lsn,
                }
            }
            keys::START_TIMELINE => record.start_timeline = number(key, value, &context)?,
            keys::END_TIMELINE => record.end_timeline = number(key, value, &context)?,
            keys::HASH_ALGORITHM => {
                record.hash_algorithm = HashAlgorithm::from_code(number(key, value, &context)?)
            }
            keys::COMMENTS => {
                record.comments = Comments::decode(value)
                    .map_err(|e| InfoError::parse(&context, format!("COMMENTS: {}", e)))?
            }
            keys::PGMONETA_VERSION => record.version = value.to_string(),
            keys::EXTRA => record.extra = value.to_string(),
            _ => match parse_tablespace_key(key) {
                // The path key closes a tablespace; its oid and name come first.
                Some((TablespaceField::Path, _)) => {
                    pending.path = value.to_string();
                    record.tablespaces.push(std::mem::take(&mut pending));
                    pending_used = false;
                }
                Some((TablespaceField::Oid, _)) => {
                    pending.oid = value.to_string();
                    pending_used = true;
                }
                Some((TablespaceField::Name, _)) => {
                    pending.name = value.to_string();
                    pending_used = true;
                }
                None => {}
            },
        }
    }

    if pending_used {
        return Err(InfoError::Validation(format!(
            "tablespace {} has no {} entry",
            record.tablespaces.len() + 1,
            keys::TABLESPACE_PATH
        )));
    }

    if declared_tablespaces != record.tablespaces.len() {
        return Err(InfoError::Validation(format!(
            "{}={} but {} tablespaces are listed",
            keys::TABLESPACES,
            declared_tablespaces,
            record.tablespaces.len()
        )));
    }

    Ok(record)
}

/// Render a record in the fixed key order.
pub fn serialize(record: &BackupRecord) -> String {
    let mut out = String::new();
    let mut line = |key: &str, value: &dyn std::fmt::Display| {
        let _ = writeln!(out, "{}={}", key, value);
    };

    if let Some(status) = record.validity.as_status() {
        line(keys::STATUS, &status);
    }
    if !record.label.is_empty() {
        line(keys::LABEL, &record.label);
    }
    if !record.wal_start_file.is_empty() {
        line(keys::WAL, &record.wal_start_file);
    }
    line(keys::TABLESPACES, &record.tablespaces.len());
    for (i, tablespace) in record.tablespaces.iter().enumerate() {
        let n = i + 1;
        line(&TablespaceField::Oid.key(n), &tablespace.oid);
        line(&TablespaceField::Name.key(n), &tablespace.name);
        line(&TablespaceField::Path.key(n), &tablespace.path);
    }
    line(keys::VERSION, &record.server_version);
    line(keys::MINOR_VERSION, &record.server_minor_version);
    line(keys::BACKUP, &record.backup_size_bytes);
    line(keys::RESTORE, &record.restore_size_bytes);
    line(keys::ELAPSED, &record.elapsed_seconds);
    line(keys::KEEP, &u8::from(record.keep));
    line(keys::START_WALPOS, &record.start_lsn);
    line(keys::END_WALPOS, &record.end_lsn);
    line(keys::CHKPT_WALPOS, &record.checkpoint_lsn);
    line(keys::START_TIMELINE, &record.start_timeline);
    line(keys::END_TIMELINE, &record.end_timeline);
    line(keys::HASH_ALGORITHM, &record.hash_algorithm.code());
    line(keys::COMMENTS, &record.comments.encode());
    if !record.version.is_empty() {
        line(keys::PGMONETA_VERSION, &record.version);
    }
    if !record.extra.is_empty() {
        line(keys::EXTRA, &record.extra);
    }

    out
}

/// Load the record stored in `directory`.
///
/// A directory without a `backup.info` yields an all-defaults record with
/// [`Validity::Unknown`]; callers that care must check the directory itself.
pub fn load(directory: &Path) -> Result<BackupRecord> {
    let path = info_path(directory);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BackupRecord::default()),
        Err(e) => return Err(InfoError::io(&path, e)),
    };

    parse(&contents).map_err(|e| match e {
        InfoError::Parse { context, reason } => InfoError::Parse {
            context: format!("{} {}", path.display(), context),
            reason,
        },
        InfoError::Validation(reason) => InfoError::Validation(format!("{}: {}", path.display(), reason)),
        other => other,
    })
}

/// Write the initial record for a freshly completed backup.
pub fn create(directory: &Path, label: &str, validity: Validity) -> Result<()> {
    if label.is_empty() || label.contains(['\n', '\r']) {
        return Err(InfoError::Validation(format!("invalid backup label '{}'", label.escape_debug())));
    }

    let mut contents = String::new();
    if let Some(status) = validity.as_status() {
        let _ = writeln!(contents, "{}={}", keys::STATUS, status);
    }
    let _ = writeln!(contents, "{}={}", keys::LABEL, label);
    let _ = writeln!(contents, "{}=0", keys::TABLESPACES);
    let _ = writeln!(contents, "{}={}", keys::PGMONETA_VERSION, FORMAT_VERSION);
    let _ = writeln!(contents, "{}=", keys::COMMENTS);

    tracing::trace!(directory = %directory.display(), label, ?validity, "Creating backup.info");
    updater::replace_contents(directory, &contents)
}
