//! Crash-safe single-field updates of `backup.info`.
//!
//! The new contents are written to `backup.info.tmp`, synced, and renamed over
//! the original. A reader opening `backup.info` sees either the old file or the
//! new one. The temporary file never outlives the call.

use crate::codec::{info_path, split_line};
use crate::utils::errors::{InfoError, Result};
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Sibling file used while an update is in flight.
pub const INFO_TMP_FILE: &str = "backup.info.tmp";

/// Values that can be stored in a `backup.info` field.
pub trait InfoValue {
    fn render(&self) -> String;
}

impl InfoValue for u64 {
    fn render(&self) -> String {
        self.to_string()
    }
}

impl InfoValue for bool {
    fn render(&self) -> String {
        u8::from(*self).to_string()
    }
}

impl InfoValue for str {
    fn render(&self) -> String {
        self.to_string()
    }
}

impl InfoValue for String {
    fn render(&self) -> String {
        self.clone()
    }
}

/// Replace the first `key=` line in `directory/backup.info`, or append one.
///
/// Every other line is copied byte for byte and in order. A line without `=`
/// or a final line without a newline aborts the update before anything is
/// written.
pub fn update_field<V: InfoValue + ?Sized>(directory: &Path, key: &str, value: &V) -> Result<()> {
    update_field_with(directory, key, &value.render(), rename_into_place)
}

pub fn update_unsigned(directory: &Path, key: &str, value: u64) -> Result<()> {
    update_field(directory, key, &value)
}

pub fn update_string(directory: &Path, key: &str, value: &str) -> Result<()> {
    update_field(directory, key, value)
}

pub fn update_bool(directory: &Path, key: &str, value: bool) -> Result<()> {
    update_field(directory, key, &value)
}

fn update_field_with<F>(directory: &Path, key: &str, value: &str, rename: F) -> Result<()>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    if key.is_empty() || key.contains(['=', '\n', '\r']) {
        return Err(InfoError::Validation(format!("invalid field name '{}'", key.escape_debug())));
    }
    if value.contains(['\n', '\r']) {
        return Err(InfoError::Validation(format!("value for {} contains a line break", key)));
    }

    let path = info_path(directory);
    let existing = fs::read_to_string(&path).map_err(|e| InfoError::io(&path, e))?;

    let mut contents = String::with_capacity(existing.len() + key.len() + value.len() + 2);
    let mut found = false;
    for (index, raw) in existing.split_inclusive('\n').enumerate() {
        let context = || format!("{} line {}", path.display(), index + 1);
        let line = raw
            .strip_suffix('\n')
            .ok_or_else(|| InfoError::parse(context(), "missing trailing newline"))?;
        let (current, _) = split_line(line).ok_or_else(|| {
            InfoError::parse(context(), format!("expected KEY=VALUE, got '{}'", line.escape_debug()))
        })?;

        if !found && current == key {
            let _ = writeln!(contents, "{}={}", key, value);
            found = true;
        } else {
            contents.push_str(raw);
        }
    }

    if !found {
        let _ = writeln!(contents, "{}={}", key, value);
    }

    tracing::trace!(directory = %directory.display(), key, value, appended = !found, "Updating backup.info");

    replace_contents_with(directory, &contents, rename)
}

/// Atomically replace `directory/backup.info` with `contents`.
pub(crate) fn replace_contents(directory: &Path, contents: &str) -> Result<()> {
    replace_contents_with(directory, contents, rename_into_place)
}

fn rename_into_place(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

fn replace_contents_with<F>(directory: &Path, contents: &str, rename: F) -> Result<()>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    let target = info_path(directory);
    let tmp = TempFile::new(directory.join(INFO_TMP_FILE));

    let mut file = open_owner_only(tmp.path()).map_err(|e| InfoError::io(tmp.path(), e))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| InfoError::io(tmp.path(), e))?;
    drop(file);

    rename(tmp.path(), &target).map_err(|e| InfoError::io(&target, e))?;
    tmp.persisted();

    restrict_permissions(&target).map_err(|e| InfoError::io(&target, e))?;
    sync_directory(directory);
    Ok(())
}

/// Removes the temporary file on drop unless it was renamed into place.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persisted(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove temporary file");
                }
            }
        }
    }
}

#[cfg(unix)]
fn open_owner_only(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn sync_directory(directory: &Path) {
    // Makes the rename itself durable; failure only weakens durability.
    if let Err(e) = File::open(directory).and_then(|d| d.sync_all()) {
        tracing::debug!(directory = %directory.display(), error = %e, "Directory fsync failed");
    }
}

#[cfg(not(unix))]
fn sync_directory(_directory: &Path) {}
