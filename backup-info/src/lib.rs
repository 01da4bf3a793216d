//! Backup metadata store.
//!
//! Reads and writes the per-backup `backup.info` file, applies single-field
//! updates atomically, maintains the annotation list kept in `COMMENTS`, and
//! enumerates the backups of a server.

pub mod annotation;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod lock;
pub mod record;
pub mod server;
pub mod store;
pub mod updater;
pub mod utils;

// Re-export commonly used types
pub use annotation::{AnnotationCommand, AnnotationFailure, AnnotationReport, AnnotationRequest, Comments};
pub use catalog::BackupEntry;
pub use config::Config;
pub use record::{BackupRecord, HashAlgorithm, Lsn, Tablespace, Validity};
pub use server::ServerLookup;
pub use store::{FieldValue, InfoStore};
pub use utils::errors::{ErrorKind, InfoError};
pub type Result<T> = std::result::Result<T, InfoError>;
