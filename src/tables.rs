//! Static code tables used to label archive records.
//!
//! * **T56**: the archive's 6-bit character code.  Unassigned slots are
//!   blanks so that every 6-bit value indexes a character.
//! * **CO-59**: a two-byte coordinate code identifying the character a
//!   sample depicts.  The mapping to Unicode ships as a companion text file
//!   of whitespace-separated `TEXT:CODE1,CODE2` entries.
//!
//! Both tables are immutable once loaded.  [`CodeTables`] is built once per
//! run and borrowed by every decoder.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub const T56_ALPHABET: &str =
    "0123456789[#@:>? ABCDEFGHI&.](<  JKLMNOPQR-$*);'|/STUVWXYZ ,%=\"!";

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Required code table {} does not exist", path.display())]
    MissingResource { path: PathBuf },
    #[error("Malformed code table entry {token:?}")]
    Malformed { token: String },
    #[error("Coordinate code ({}, {}) is not in the CO-59 table", code.0, code.1)]
    UnknownCode { code: (u8, u8) },
    #[error("T56 code {code} is out of range")]
    UnknownSymbol { code: u8 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Translate one 6-bit T56 code.
pub fn t56(code: u8) -> Result<char, TableError> {
    T56_ALPHABET
        .as_bytes()
        .get(code as usize)
        .map(|&b| b as char)
        .ok_or(TableError::UnknownSymbol { code })
}

/// Translate a run of T56 codes and concatenate them in order.
pub fn t56_string(codes: &[u8]) -> Result<String, TableError> {
    codes.iter().map(|&c| t56(c)).collect()
}

// ── CO-59 ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Co59Table {
    map: HashMap<(u8, u8), String>,
}

impl Co59Table {
    /// Load the table from disk.  Fails with `MissingResource` when the file
    /// is absent so callers can abort before any decoding starts.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TableError::MissingResource { path: path.to_owned() });
        }
        let text  = fs::read_to_string(path)?;
        let table = Self::parse(&text)?;
        debug!(path = %path.display(), entries = table.len(), "loaded CO-59 table");
        Ok(table)
    }

    /// Parse `TEXT:CODE1,CODE2` tokens.  A repeated code pair keeps the last
    /// text seen.
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut map = HashMap::new();
        for token in text.split_whitespace() {
            let malformed = || TableError::Malformed { token: token.to_owned() };
            // The label itself may be ':', so split on the last colon.
            let (label, codes) = token.rsplit_once(':').ok_or_else(malformed)?;
            let (first, second) = codes.split_once(',').ok_or_else(malformed)?;
            let first:  u8 = first.trim().parse().map_err(|_| malformed())?;
            let second: u8 = second.trim().parse().map_err(|_| malformed())?;
            if label.is_empty() {
                return Err(malformed());
            }
            map.insert((first, second), label.to_owned());
        }
        Ok(Self { map })
    }

    pub fn lookup(&self, code: (u8, u8)) -> Result<&str, TableError> {
        self.map
            .get(&code)
            .map(String::as_str)
            .ok_or(TableError::UnknownCode { code })
    }

    pub fn len(&self) -> usize { self.map.len() }

    pub fn is_empty(&self) -> bool { self.map.is_empty() }
}

/// Every lookup table a record decoder needs.
#[derive(Debug, Clone, Default)]
pub struct CodeTables {
    pub co59: Co59Table,
}

impl CodeTables {
    pub fn load<P: AsRef<Path>>(co59_path: P) -> Result<Self, TableError> {
        Ok(Self { co59: Co59Table::load(co59_path)? })
    }

    pub fn from_co59(co59: Co59Table) -> Self {
        Self { co59 }
    }

    pub fn t56(&self, code: u8) -> Result<char, TableError> { t56(code) }

    pub fn t56_string(&self, codes: &[u8]) -> Result<String, TableError> { t56_string(codes) }

    pub fn co59(&self, code: (u8, u8)) -> Result<&str, TableError> { self.co59.lookup(code) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t56_covers_every_six_bit_code() {
        assert_eq!(T56_ALPHABET.len(), 64);
        assert_eq!(t56(0).unwrap(), '0');
        assert_eq!(t56(17).unwrap(), 'A');
        assert_eq!(t56(63).unwrap(), '!');
        assert!(matches!(t56(64), Err(TableError::UnknownSymbol { code: 64 })));
    }

    #[test]
    fn t56_string_concatenates_in_order() {
        // K A N J I and a trailing blank.
        assert_eq!(t56_string(&[34, 17, 37, 33, 25, 16]).unwrap(), "KANJI ");
    }

    #[test]
    fn parses_co59_entries() {
        let table = Co59Table::parse("あ:4,1 い:4,3\n::1,10\tア:5,1").unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.lookup((4, 1)).unwrap(), "あ");
        assert_eq!(table.lookup((1, 10)).unwrap(), ":");
        assert!(matches!(table.lookup((9, 9)), Err(TableError::UnknownCode { code: (9, 9) })));
    }

    #[test]
    fn last_duplicate_wins() {
        let table = Co59Table::parse("x:1,1 y:1,1").unwrap();
        assert_eq!(table.lookup((1, 1)).unwrap(), "y");
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(matches!(Co59Table::parse("bad"), Err(TableError::Malformed { .. })));
        assert!(matches!(Co59Table::parse("x:1"), Err(TableError::Malformed { .. })));
        assert!(matches!(Co59Table::parse("x:1,300"), Err(TableError::Malformed { .. })));
        assert!(matches!(Co59Table::parse(":1,2"), Err(TableError::Malformed { .. })));
    }

    #[test]
    fn missing_file_is_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        let err = Co59Table::load(dir.path().join("co59-utf8.txt")).unwrap_err();
        assert!(matches!(err, TableError::MissingResource { .. }));
    }
}
