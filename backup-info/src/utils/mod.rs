//! Utility modules for the metadata store.

pub mod errors;
pub mod logger;

pub use errors::{ErrorKind, InfoError, Result};
