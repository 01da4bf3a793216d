//! Server name to backup-root resolution.
//!
//! The store never reads a global server table; callers hand it something that
//! implements [`ServerLookup`] (the loaded configuration, or a plain map).

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

pub trait ServerLookup: Send + Sync {
    /// Directory holding one subdirectory per backup of `server`.
    fn backup_root(&self, server: &str) -> Option<PathBuf>;

    /// Names of all known servers.
    fn server_names(&self) -> Vec<String>;
}

impl ServerLookup for HashMap<String, PathBuf> {
    fn backup_root(&self, server: &str) -> Option<PathBuf> {
        self.get(server).cloned()
    }

    fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ServerLookup for BTreeMap<String, PathBuf> {
    fn backup_root(&self, server: &str) -> Option<PathBuf> {
        self.get(server).cloned()
    }

    fn server_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}
