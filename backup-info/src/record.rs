//! The structured form of one `backup.info` file.
//!
//! A [`BackupRecord`] is always a fresh copy loaded from disk. Nothing in this
//! crate keeps records around between operations; mutations go through the
//! updater and the next load sees the result.

use crate::annotation::Comments;
use crate::utils::errors::{InfoError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Key vocabulary of the `backup.info` file.
pub mod keys {
    pub const STATUS: &str = "STATUS";
    pub const LABEL: &str = "LABEL";
    pub const WAL: &str = "WAL";
    pub const TABLESPACES: &str = "TABLESPACES";
    pub const TABLESPACE: &str = "TABLESPACE";
    pub const TABLESPACE_OID: &str = "TABLESPACE_OID";
    pub const TABLESPACE_PATH: &str = "TABLESPACE_PATH";
    pub const VERSION: &str = "VERSION";
    pub const MINOR_VERSION: &str = "MINOR_VERSION";
    pub const BACKUP: &str = "BACKUP";
    pub const RESTORE: &str = "RESTORE";
    pub const ELAPSED: &str = "ELAPSED";
    pub const KEEP: &str = "KEEP";
    pub const START_WALPOS: &str = "START_WALPOS";
    pub const END_WALPOS: &str = "END_WALPOS";
    pub const CHKPT_WALPOS: &str = "CHKPT_WALPOS";
    pub const START_TIMELINE: &str = "START_TIMELINE";
    pub const END_TIMELINE: &str = "END_TIMELINE";
    pub const HASH_ALGORITHM: &str = "HASH_ALGORITHM";
    pub const COMMENTS: &str = "COMMENTS";
    pub const PGMONETA_VERSION: &str = "PGMONETA_VERSION";
    pub const EXTRA: &str = "EXTRA";

    /// Every fixed key; numbered tablespace keys are matched separately.
    pub const ALL: &[&str] = &[
        STATUS,
        LABEL,
        WAL,
        TABLESPACES,
        VERSION,
        MINOR_VERSION,
        BACKUP,
        RESTORE,
        ELAPSED,
        KEEP,
        START_WALPOS,
        END_WALPOS,
        CHKPT_WALPOS,
        START_TIMELINE,
        END_TIMELINE,
        HASH_ALGORITHM,
        COMMENTS,
        PGMONETA_VERSION,
        EXTRA,
    ];

    /// True for keys this crate reads, including `TABLESPACE_OID<n>` and friends.
    pub fn is_known(key: &str) -> bool {
        ALL.contains(&key) || super::parse_tablespace_key(key).is_some()
    }
}

/// Trust signal recorded when the backup finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

impl Validity {
    /// Value written for `STATUS`, `None` when the status was never recorded.
    pub fn as_status(self) -> Option<&'static str> {
        match self {
            Validity::Unknown => None,
            Validity::Valid => Some("1"),
            Validity::Invalid => Some("0"),
        }
    }

    pub fn from_status(value: &str) -> Self {
        if value == "1" {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }
}

/// A WAL position split into its high and low 32 bits, printed as `HEX/HEX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Lsn {
    pub hi: u32,
    pub lo: u32,
}

impl Lsn {
    pub fn new(hi: u32, lo: u32) -> Self {
        Self { hi, lo }
    }

    pub fn as_u64(self) -> u64 {
        (u64::from(self.hi) << 32) | u64::from(self.lo)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.hi, self.lo)
    }
}

impl FromStr for Lsn {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| format!("expected HEX/HEX, got '{}'", s))?;
        Ok(Lsn {
            hi: parse_hex32(hi)?,
            lo: parse_hex32(lo)?,
        })
    }
}

fn parse_hex32(part: &str) -> std::result::Result<u32, String> {
    if part.is_empty() || part.len() > 8 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("'{}' is not a 32-bit hex number", part));
    }
    u32::from_str_radix(part, 16).map_err(|e| e.to_string())
}

impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Checksum algorithm used for backup integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Default,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Crc32c,
    /// A value written by a newer tool; kept so it survives a rewrite.
    Other(u32),
}

impl HashAlgorithm {
    pub fn code(self) -> u32 {
        match self {
            HashAlgorithm::Default => 0,
            HashAlgorithm::Sha224 => 1,
            HashAlgorithm::Sha256 => 2,
            HashAlgorithm::Sha384 => 3,
            HashAlgorithm::Sha512 => 4,
            HashAlgorithm::Crc32c => 5,
            HashAlgorithm::Other(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => HashAlgorithm::Default,
            1 => HashAlgorithm::Sha224,
            2 => HashAlgorithm::Sha256,
            3 => HashAlgorithm::Sha384,
            4 => HashAlgorithm::Sha512,
            5 => HashAlgorithm::Crc32c,
            other => HashAlgorithm::Other(other),
        }
    }
}

impl Serialize for HashAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Tablespace {
    pub oid: String,
    pub path: String,
    pub name: String,
}

/// Metadata for a single backup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BackupRecord {
    pub label: String,
    pub validity: Validity,
    pub wal_start_file: String,
    pub backup_size_bytes: u64,
    pub restore_size_bytes: u64,
    pub elapsed_seconds: u64,
    pub server_version: u32,
    pub server_minor_version: u32,
    pub keep: bool,
    pub tablespaces: Vec<Tablespace>,
    pub start_lsn: Lsn,
    pub end_lsn: Lsn,
    pub checkpoint_lsn: Lsn,
    pub start_timeline: u32,
    pub end_timeline: u32,
    pub hash_algorithm: HashAlgorithm,
    pub comments: Comments,
    pub extra: String,
    pub version: String,
}

/// Which member of a tablespace triple a numbered key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablespaceField {
    Oid,
    Path,
    Name,
}

impl TablespaceField {
    pub fn key(self, index: usize) -> String {
        let prefix = match self {
            TablespaceField::Oid => keys::TABLESPACE_OID,
            TablespaceField::Path => keys::TABLESPACE_PATH,
            TablespaceField::Name => keys::TABLESPACE,
        };
        format!("{}{}", prefix, index)
    }
}

/// Recognize `TABLESPACE_OID<n>`, `TABLESPACE_PATH<n>` and `TABLESPACE<n>`.
pub fn parse_tablespace_key(key: &str) -> Option<(TablespaceField, usize)> {
    let (field, digits) = if let Some(rest) = key.strip_prefix(keys::TABLESPACE_OID) {
        (TablespaceField::Oid, rest)
    } else if let Some(rest) = key.strip_prefix(keys::TABLESPACE_PATH) {
        (TablespaceField::Path, rest)
    } else if let Some(rest) = key.strip_prefix(keys::TABLESPACE) {
        (TablespaceField::Name, rest)
    } else {
        return None;
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|index| (field, index))
}

impl BackupRecord {
    pub fn tablespace_count(&self) -> usize {
        self.tablespaces.len()
    }

    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    /// Return the textual value of `key` as it would appear in `backup.info`.
    ///
    /// Tablespace keys are 1-based. An index outside `1..=tablespace_count`
    /// is a validation error.
    pub fn field(&self, key: &str) -> Result<String> {
        if let Some((field, index)) = parse_tablespace_key(key) {
            let tablespace = index
                .checked_sub(1)
                .and_then(|i| self.tablespaces.get(i))
                .ok_or_else(|| {
                    InfoError::Validation(format!(
                        "tablespace index {} out of range (1..={})",
                        index,
                        self.tablespaces.len()
                    ))
                })?;
            return Ok(match field {
                TablespaceField::Oid => tablespace.oid.clone(),
                TablespaceField::Path => tablespace.path.clone(),
                TablespaceField::Name => tablespace.name.clone(),
            });
        }

        let value = match key {
            keys::STATUS => self
                .validity
                .as_status()
                .ok_or_else(|| InfoError::FieldNotFound(key.to_string()))?
                .to_string(),
            keys::LABEL => self.label.clone(),
            keys::WAL => self.wal_start_file.clone(),
            keys::TABLESPACES => self.tablespaces.len().to_string(),
            keys::VERSION => self.server_version.to_string(),
            keys::MINOR_VERSION => self.server_minor_version.to_string(),
            keys::BACKUP => self.backup_size_bytes.to_string(),
            keys::RESTORE => self.restore_size_bytes.to_string(),
            keys::ELAPSED => self.elapsed_seconds.to_string(),
            keys::KEEP => u8::from(self.keep).to_string(),
            keys::START_WALPOS => self.start_lsn.to_string(),
            keys::END_WALPOS => self.end_lsn.to_string(),
            keys::CHKPT_WALPOS => self.checkpoint_lsn.to_string(),
            keys::START_TIMELINE => self.start_timeline.to_string(),
            keys::END_TIMELINE => self.end_timeline.to_string(),
            keys::HASH_ALGORITHM => self.hash_algorithm.code().to_string(),
            keys::COMMENTS => self.comments.encode(),
            keys::PGMONETA_VERSION => self.version.clone(),
            keys::EXTRA => self.extra.clone(),
            _ => return Err(InfoError::FieldNotFound(key.to_string())),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::ErrorKind;

    fn sample() -> BackupRecord {
        BackupRecord {
            label: "20240101120000".into(),
            validity: Validity::Valid,
            tablespaces: vec![
                Tablespace {
                    oid: "16384".into(),
                    path: "/mnt/fast".into(),
                    name: "fast".into(),
                },
                Tablespace {
                    oid: "16385".into(),
                    path: "/mnt/slow".into(),
                    name: "slow".into(),
                },
            ],
            start_lsn: Lsn::new(0x1, 0x2A000028),
            ..Default::default()
        }
    }

    #[test]
    fn test_lsn_display_and_parse() {
        let lsn: Lsn = "16/B374D848".parse().unwrap();
        assert_eq!(lsn, Lsn::new(0x16, 0xB374D848));
        assert_eq!(lsn.to_string(), "16/B374D848");
        assert_eq!(lsn.as_u64(), 0x16_B374_D848);
    }

    #[test]
    fn test_lsn_rejects_bad_shapes() {
        for bad in ["", "16", "16/", "/1", "G/1", "1/2/3", "123456789/0", " 1/2"] {
            assert!(bad.parse::<Lsn>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_tablespace_key_recognition() {
        assert_eq!(parse_tablespace_key("TABLESPACE_OID2"), Some((TablespaceField::Oid, 2)));
        assert_eq!(parse_tablespace_key("TABLESPACE_PATH10"), Some((TablespaceField::Path, 10)));
        assert_eq!(parse_tablespace_key("TABLESPACE1"), Some((TablespaceField::Name, 1)));
        assert_eq!(parse_tablespace_key("TABLESPACES"), None);
        assert_eq!(parse_tablespace_key("TABLESPACE"), None);
        assert_eq!(parse_tablespace_key("TABLESPACE_OID"), None);
    }

    #[test]
    fn test_field_by_dynamic_tablespace_key() {
        let record = sample();
        assert_eq!(record.field("TABLESPACE_OID1").unwrap(), "16384");
        assert_eq!(record.field("TABLESPACE_PATH2").unwrap(), "/mnt/slow");
        assert_eq!(record.field("TABLESPACE2").unwrap(), "slow");
        assert_eq!(record.field("TABLESPACES").unwrap(), "2");
        assert_eq!(record.field("START_WALPOS").unwrap(), "1/2A000028");
    }

    #[test]
    fn test_field_index_out_of_range() {
        let record = sample();
        assert_eq!(record.field("TABLESPACE0").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(record.field("TABLESPACE_OID3").unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_field_unknown_key() {
        let record = sample();
        assert_eq!(record.field("NOPE").unwrap_err().kind(), ErrorKind::NotFound);
        let unknown = BackupRecord::default();
        assert_eq!(unknown.field("STATUS").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_hash_algorithm_codes_round_trip() {
        for code in 0..8 {
            assert_eq!(HashAlgorithm::from_code(code).code(), code);
        }
        assert_eq!(HashAlgorithm::from_code(42), HashAlgorithm::Other(42));
    }
}
