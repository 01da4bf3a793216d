//! Annotations: an ordered key/text map stored in the `COMMENTS` field.
//!
//! The encoding is `key1|text1,key2|text2`. Neither part may contain `,` or
//! `|`, so user input carrying them is refused up front instead of producing a
//! field that decodes differently.

use crate::catalog;
use crate::codec;
use crate::lock::DirectoryLocks;
use crate::record::keys;
use crate::server::ServerLookup;
use crate::updater;
use crate::utils::errors::{InfoError, Result};
use serde::Serialize;
use thiserror::Error;

const PAIR_SEPARATOR: char = ',';
const KEY_SEPARATOR: char = '|';

/// Placeholder reported for a server or backup that could not be resolved.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Comments(Vec<Annotation>);

fn check_part(what: &str, value: &str) -> Result<()> {
    if value.contains([PAIR_SEPARATOR, KEY_SEPARATOR, '\n', '\r']) {
        return Err(InfoError::Validation(format!(
            "annotation {} '{}' must not contain ',', '|' or line breaks",
            what,
            value.escape_debug()
        )));
    }
    Ok(())
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(InfoError::Validation("annotation key must not be empty".into()));
    }
    check_part("key", key)
}

impl Comments {
    /// Decode the stored form. The empty string is the empty map.
    pub fn decode(encoded: &str) -> Result<Self> {
        let mut comments = Comments::default();
        if encoded.is_empty() {
            return Ok(comments);
        }

        for (index, pair) in encoded.split(PAIR_SEPARATOR).enumerate() {
            let context = format!("annotation {}", index + 1);
            if pair.is_empty() {
                return Err(InfoError::parse(context, "empty annotation"));
            }
            let (key, text) = pair
                .split_once(KEY_SEPARATOR)
                .ok_or_else(|| InfoError::parse(&context, format!("'{}' has no '|'", pair)))?;
            if key.is_empty() {
                return Err(InfoError::parse(&context, "empty key"));
            }
            if text.contains(KEY_SEPARATOR) {
                return Err(InfoError::parse(&context, format!("'{}' has more than one '|'", pair)));
            }
            if comments.get(key).is_some() {
                return Err(InfoError::parse(&context, format!("duplicate key '{}'", key)));
            }
            comments.0.push(Annotation {
                key: key.to_string(),
                text: text.to_string(),
            });
        }

        Ok(comments)
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (i, annotation) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(PAIR_SEPARATOR);
            }
            out.push_str(&annotation.key);
            out.push(KEY_SEPARATOR);
            out.push_str(&annotation.text);
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|a| a.key == key).map(|a| a.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.0.iter()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.0.iter().position(|a| a.key == key)
    }

    /// Append a new annotation; the key must not exist yet.
    pub fn add(&mut self, key: &str, text: &str) -> Result<()> {
        check_key(key)?;
        check_part("text", text)?;
        if self.position(key).is_some() {
            return Err(InfoError::AnnotationConflict(format!("key '{}' already exists", key)));
        }
        self.0.push(Annotation {
            key: key.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    /// Replace the text of an existing annotation, keeping its position.
    pub fn update(&mut self, key: &str, text: &str) -> Result<()> {
        check_key(key)?;
        check_part("text", text)?;
        let index = self
            .position(key)
            .ok_or_else(|| InfoError::AnnotationConflict(format!("key '{}' does not exist", key)))?;
        self.0[index].text = text.to_string();
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        check_key(key)?;
        let index = self
            .position(key)
            .ok_or_else(|| InfoError::AnnotationConflict(format!("key '{}' does not exist", key)))?;
        self.0.remove(index);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationCommand {
    Add { key: String, text: String },
    Update { key: String, text: String },
    Remove { key: String },
}

impl AnnotationCommand {
    /// Build a command from its protocol name (`add`, `update`, `remove`).
    pub fn parse(command: &str, key: &str, text: Option<&str>) -> Result<Self> {
        let need_text = || {
            text.map(str::to_string)
                .ok_or_else(|| InfoError::Validation(format!("'{}' needs a comment", command)))
        };
        match command {
            "add" => Ok(AnnotationCommand::Add {
                key: key.to_string(),
                text: need_text()?,
            }),
            "update" => Ok(AnnotationCommand::Update {
                key: key.to_string(),
                text: need_text()?,
            }),
            "remove" => Ok(AnnotationCommand::Remove { key: key.to_string() }),
            other => Err(InfoError::Validation(format!("unknown annotation command '{}'", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnnotationCommand::Add { .. } => "add",
            AnnotationCommand::Update { .. } => "update",
            AnnotationCommand::Remove { .. } => "remove",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            AnnotationCommand::Add { key, .. }
            | AnnotationCommand::Update { key, .. }
            | AnnotationCommand::Remove { key } => key,
        }
    }

    pub fn apply(&self, comments: &mut Comments) -> Result<()> {
        match self {
            AnnotationCommand::Add { key, text } => comments.add(key, text),
            AnnotationCommand::Update { key, text } => comments.update(key, text),
            AnnotationCommand::Remove { key } => comments.remove(key),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationRequest {
    pub server: String,
    /// `oldest`, `latest`/`newest`, or an exact label.
    pub backup: String,
    pub command: AnnotationCommand,
}

/// The triple handed back to the management layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationReport {
    pub server: String,
    pub label: String,
    pub comments: String,
}

impl AnnotationReport {
    pub fn failed(server: Option<&str>, label: Option<&str>) -> Self {
        Self {
            server: server.unwrap_or(UNKNOWN).to_string(),
            label: label.unwrap_or(UNKNOWN).to_string(),
            comments: String::new(),
        }
    }
}

#[derive(Debug, Error)]
#[error("annotate failed for {}/{}: {source}", report.server, report.label)]
pub struct AnnotationFailure {
    pub report: AnnotationReport,
    #[source]
    pub source: InfoError,
}

/// Resolve the target backup and apply one annotation command to it.
///
/// The new `COMMENTS` value is computed in full before the single atomic write;
/// on any error the stored field is left as it was.
pub fn annotate(
    lookup: &dyn ServerLookup,
    locks: &DirectoryLocks,
    request: &AnnotationRequest,
) -> std::result::Result<AnnotationReport, AnnotationFailure> {
    let fail = |server: Option<&str>, label: Option<&str>, source: InfoError| {
        tracing::error!(
            server = %request.server,
            backup = %request.backup,
            command = request.command.name(),
            error = %source,
            "Annotate failed"
        );
        AnnotationFailure {
            report: AnnotationReport::failed(server, label),
            source,
        }
    };

    let root = lookup
        .backup_root(&request.server)
        .ok_or_else(|| fail(None, None, InfoError::ServerNotFound(request.server.clone())))?;

    let entries = catalog::list(&root).map_err(|e| fail(Some(&request.server), None, e))?;
    let entry = catalog::select(&entries, &request.backup).map_err(|e| fail(Some(&request.server), None, e))?;
    let label = entry.record.label.as_str();

    let result = locks.with_lock(&entry.directory, || -> Result<String> {
        let mut comments = codec::load(&entry.directory)?.comments;
        request.command.apply(&mut comments)?;
        let encoded = comments.encode();
        updater::update_string(&entry.directory, keys::COMMENTS, &encoded)?;
        Ok(encoded)
    });

    match result {
        Ok(comments) => {
            tracing::info!(
                server = %request.server,
                label,
                command = request.command.name(),
                key = request.command.key(),
                "Annotation applied"
            );
            Ok(AnnotationReport {
                server: request.server.clone(),
                label: label.to_string(),
                comments,
            })
        }
        Err(e) => Err(fail(Some(&request.server), Some(label), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Validity;
    use crate::utils::errors::ErrorKind;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn decoded(encoded: &str) -> Comments {
        Comments::decode(encoded).unwrap()
    }

    #[test]
    fn test_add_to_empty_then_second() -> Result<()> {
        let mut comments = Comments::default();
        comments.add("k1", "hello")?;
        assert_eq!(comments.encode(), "k1|hello");
        comments.add("k2", "world")?;
        assert_eq!(comments.encode(), "k1|hello,k2|world");
        Ok(())
    }

    #[test]
    fn test_add_existing_key_conflicts() {
        let mut comments = decoded("k1|hello,k2|world");
        let err = comments.add("k1", "again").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AnnotationConflict);
        assert_eq!(comments.encode(), "k1|hello,k2|world");
    }

    #[test]
    fn test_update_keeps_position() -> Result<()> {
        let mut comments = decoded("k1|hello,k2|world");
        comments.update("k1", "bye")?;
        assert_eq!(comments.encode(), "k1|bye,k2|world");
        Ok(())
    }

    #[test]
    fn test_update_missing_key_conflicts() {
        let mut comments = Comments::default();
        assert_eq!(comments.update("k1", "x").unwrap_err().kind(), ErrorKind::AnnotationConflict);
    }

    #[test]
    fn test_remove() -> Result<()> {
        let mut comments = decoded("k1|hello,k2|world,k3|!");
        comments.remove("k2")?;
        assert_eq!(comments.encode(), "k1|hello,k3|!");
        comments.remove("k1")?;
        comments.remove("k3")?;
        assert_eq!(comments.encode(), "");
        Ok(())
    }

    #[test]
    fn test_remove_missing_key_conflicts() {
        let mut comments = decoded("k1|hello");
        assert_eq!(comments.remove("k2").unwrap_err().kind(), ErrorKind::AnnotationConflict);
        assert_eq!(comments.encode(), "k1|hello");
    }

    #[test]
    fn test_separators_rejected_before_encoding() {
        let mut comments = decoded("k1|hello");
        for (key, text) in [("a,b", "x"), ("a|b", "x"), ("k", "x,y"), ("k", "x|y"), ("", "x"), ("k", "a\nb")] {
            let err = comments.add(key, text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "accepted {:?}/{:?}", key, text);
        }
        assert_eq!(comments.encode(), "k1|hello");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for bad in [",", "k|v,", ",k|v", "k|v,,j|w", "novalue", "|v", "k|v|w", "k|a,k|b"] {
            let err = Comments::decode(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_decode_allows_empty_text() {
        let comments = decoded("k|");
        assert_eq!(comments.get("k"), Some(""));
        assert_eq!(comments.encode(), "k|");
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(
            AnnotationCommand::parse("remove", "k", None).unwrap(),
            AnnotationCommand::Remove { key: "k".into() }
        );
        assert_eq!(
            AnnotationCommand::parse("add", "k", None).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AnnotationCommand::parse("append", "k", Some("x")).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    struct Fixture {
        _dir: TempDir,
        servers: HashMap<String, PathBuf>,
        root: PathBuf,
    }

    fn fixture(labels: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("primary").join("backup");
        for label in labels {
            let backup = root.join(label);
            std::fs::create_dir_all(&backup).unwrap();
            codec::create(&backup, label, Validity::Valid).unwrap();
        }
        let mut servers = HashMap::new();
        servers.insert("primary".to_string(), root.clone());
        Fixture { _dir: dir, servers, root }
    }

    fn request(backup: &str, command: AnnotationCommand) -> AnnotationRequest {
        AnnotationRequest {
            server: "primary".into(),
            backup: backup.into(),
            command,
        }
    }

    fn add(key: &str, text: &str) -> AnnotationCommand {
        AnnotationCommand::Add {
            key: key.into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_annotate_latest_persists_comments() {
        let fx = fixture(&["20240101", "20240115", "20240201"]);
        let locks = DirectoryLocks::new();

        let report = annotate(&fx.servers, &locks, &request("latest", add("k1", "hello"))).unwrap();
        assert_eq!(report.label, "20240201");
        assert_eq!(report.comments, "k1|hello");

        let report = annotate(&fx.servers, &locks, &request("newest", add("k2", "world"))).unwrap();
        assert_eq!(report.comments, "k1|hello,k2|world");

        let stored = codec::load(&fx.root.join("20240201")).unwrap();
        assert_eq!(stored.comments.encode(), "k1|hello,k2|world");
        let untouched = codec::load(&fx.root.join("20240101")).unwrap();
        assert!(untouched.comments.is_empty());
    }

    #[test]
    fn test_annotate_conflict_leaves_file_unchanged() {
        let fx = fixture(&["20240101"]);
        let locks = DirectoryLocks::new();
        annotate(&fx.servers, &locks, &request("oldest", add("k1", "hello"))).unwrap();
        let before = std::fs::read(fx.root.join("20240101").join(codec::INFO_FILE)).unwrap();

        let failure = annotate(&fx.servers, &locks, &request("20240101", add("k1", "again"))).unwrap_err();
        assert_eq!(failure.source.kind(), ErrorKind::AnnotationConflict);
        assert_eq!(failure.report.server, "primary");
        assert_eq!(failure.report.label, "20240101");
        assert_eq!(failure.report.comments, "");

        let after = std::fs::read(fx.root.join("20240101").join(codec::INFO_FILE)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_annotate_unknown_server() {
        let fx = fixture(&["20240101"]);
        let locks = DirectoryLocks::new();
        let mut req = request("latest", add("k", "v"));
        req.server = "replica".into();

        let failure = annotate(&fx.servers, &locks, &req).unwrap_err();
        assert!(matches!(failure.source, InfoError::ServerNotFound(_)));
        assert_eq!(failure.report.server, UNKNOWN);
        assert_eq!(failure.report.label, UNKNOWN);
    }

    #[test]
    fn test_annotate_unknown_backup() {
        let fx = fixture(&["20240101"]);
        let locks = DirectoryLocks::new();

        let failure = annotate(&fx.servers, &locks, &request("nope", add("k", "v"))).unwrap_err();
        assert!(matches!(failure.source, InfoError::BackupNotFound(_)));
        assert_eq!(failure.report.server, "primary");
        assert_eq!(failure.report.label, UNKNOWN);
    }

    #[test]
    fn test_annotate_empty_selector_never_reaches_unlabelled_directory() {
        let fx = fixture(&[]);
        let bare = fx.root.join("20240101");
        std::fs::create_dir_all(&bare).unwrap();
        let locks = DirectoryLocks::new();

        let failure = annotate(&fx.servers, &locks, &request("", add("k", "v"))).unwrap_err();
        assert!(matches!(failure.source, InfoError::BackupNotFound(_)));
        assert_eq!(failure.report.label, UNKNOWN);
        assert!(!bare.join(codec::INFO_FILE).exists());
    }

    #[test]
    fn test_annotate_empty_catalog() {
        let fx = fixture(&[]);
        std::fs::create_dir_all(&fx.root).unwrap();
        let locks = DirectoryLocks::new();

        let failure = annotate(&fx.servers, &locks, &request("oldest", add("k", "v"))).unwrap_err();
        assert!(matches!(failure.source, InfoError::BackupNotFound(_)));
    }

    #[test]
    fn test_annotate_update_then_remove() {
        let fx = fixture(&["20240101"]);
        let locks = DirectoryLocks::new();
        annotate(&fx.servers, &locks, &request("oldest", add("k1", "hello"))).unwrap();
        annotate(&fx.servers, &locks, &request("oldest", add("k2", "world"))).unwrap();

        let update = AnnotationCommand::Update {
            key: "k1".into(),
            text: "bye".into(),
        };
        let report = annotate(&fx.servers, &locks, &request("oldest", update)).unwrap();
        assert_eq!(report.comments, "k1|bye,k2|world");

        let remove = AnnotationCommand::Remove { key: "k2".into() };
        let report = annotate(&fx.servers, &locks, &request("oldest", remove)).unwrap();
        assert_eq!(report.comments, "k1|bye");

        let remove = AnnotationCommand::Remove { key: "k2".into() };
        let failure = annotate(&fx.servers, &locks, &request("oldest", remove)).unwrap_err();
        assert_eq!(failure.source.kind(), ErrorKind::AnnotationConflict);
        let stored = codec::load(&fx.root.join("20240101")).unwrap();
        assert_eq!(stored.comments.encode(), "k1|bye");
    }
}
