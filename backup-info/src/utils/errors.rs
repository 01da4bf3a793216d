//! Error types for the backup metadata store.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfoError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("No server named {0}")]
    ServerNotFound(String),

    #[error("No backup matching {0}")]
    BackupNotFound(String),

    #[error("Unknown field: {0}")]
    FieldNotFound(String),

    #[error("Annotation conflict: {0}")]
    AnnotationConflict(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Coarse classification used by callers that report outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    AnnotationConflict,
    Validation,
}

impl InfoError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        InfoError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(context: impl Into<String>, reason: impl Into<String>) -> Self {
        InfoError::Parse {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            InfoError::Io { .. } => ErrorKind::Io,
            InfoError::Parse { .. } => ErrorKind::Parse,
            InfoError::ServerNotFound(_)
            | InfoError::BackupNotFound(_)
            | InfoError::FieldNotFound(_) => ErrorKind::NotFound,
            InfoError::AnnotationConflict(_) => ErrorKind::AnnotationConflict,
            InfoError::Validation(_) => ErrorKind::Validation,
        }
    }
}

pub type Result<T> = std::result::Result<T, InfoError>;
