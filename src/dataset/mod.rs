//! Dataset conversion: archive files in, packed PNG blob plus a JSON
//! metadata document out.
//!
//! ```no_run
//! use etlpack::dataset::{convert, ConvertOptions, DatasetReader};
//!
//! let meta = convert(&ConvertOptions::default())?;
//! println!("{} records, md5 {}", meta.records.len(), meta.packed_checksum);
//!
//! let mut ds = DatasetReader::open("etl2-metadata.json")?;
//! ds.verify_checksum()?;
//! let image = ds.read_image(0)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod assembler;
mod reader;

pub use assembler::convert;
pub use reader::DatasetReader;

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pack::Span;
use crate::raster::RasterError;
use crate::record::{RecordError, SampleLabel, IMAGE_HEIGHT, IMAGE_WIDTH};
use crate::tables::TableError;

/// Channel count of every stored image (grayscale).
pub const IMAGE_DEPTH: u32 = 1;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("{} already exists (pass --force to overwrite)", path.display())]
    OutputAlreadyExists { path: PathBuf },
    #[error("Source archive {} does not exist", path.display())]
    MissingSource { path: PathBuf },
    #[error("{}: {source}", path.display())]
    Record { path: PathBuf, #[source] source: RecordError },
    #[error("{}: record {ordinal} could not be appended to the blob: {source}", path.display())]
    Append { path: PathBuf, ordinal: usize, #[source] source: io::Error },
    #[error("Code table error: {0}")]
    Table(#[from] TableError),
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),
    #[error("Record {index} not found ({len} records)")]
    NoSuchRecord { index: usize, len: usize },
    #[error("Record {index} span {start}..{end} is invalid for a {blob_len}-byte blob")]
    SpanOutOfRange { index: usize, start: u64, end: u64, blob_len: u64 },
    #[error("Checksum mismatch: metadata says {expected}, blob hashes to {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── ConvertOptions ───────────────────────────────────────────────────────────

/// Run controls for [`convert`].
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Archive files, processed strictly in this order.
    pub sources:       Vec<PathBuf>,
    /// CO-59 → Unicode table (`TEXT:CODE1,CODE2` entries).
    pub code_table:    PathBuf,
    pub metadata_path: PathBuf,
    pub packed_path:   PathBuf,
    /// Written into every entry as `original_dataset_name`.
    pub dataset_name:  String,
    /// Overwrite existing outputs instead of refusing.
    pub force:         bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            sources:       (1..=5).map(|i| PathBuf::from(format!("ETL2/ETL2_{i}"))).collect(),
            code_table:    PathBuf::from("co59-utf8.txt"),
            metadata_path: PathBuf::from("etl2-metadata.json"),
            packed_path:   PathBuf::from("etl2-png-images.pack.bin"),
            dataset_name:  "ETL2".to_owned(),
            force:         false,
        }
    }
}

// ── Metadata document ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub unicode_char:              String,
    pub width:                     u32,
    pub height:                    u32,
    pub depth:                     u32,
    /// Byte span of the PNG inside the packed blob.
    pub start:                     u64,
    pub end:                       u64,
    pub original_dataset_name:     String,
    pub index_in_original_dataset: i64,
    pub scan_source_material_id:   String,
    pub symbol_type_id:            String,
    pub font_name:                 String,
}

impl DatasetEntry {
    pub fn new(label: SampleLabel, span: Span, dataset_name: &str) -> Self {
        Self {
            unicode_char:              label.unicode_char,
            width:                     IMAGE_WIDTH,
            height:                    IMAGE_HEIGHT,
            depth:                     IMAGE_DEPTH,
            start:                     span.start,
            end:                       span.end,
            original_dataset_name:     dataset_name.to_owned(),
            index_in_original_dataset: label.index,
            scan_source_material_id:   label.source_material,
            symbol_type_id:            label.symbol_type,
            font_name:                 label.font_name,
        }
    }

    pub fn span(&self) -> Span {
        Span { start: self.start, end: self.end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Blob file name, relative to the metadata document's directory.
    pub packed_filename: String,
    /// Lowercase hex MD5 of the whole blob.
    pub packed_checksum: String,
    pub records:         Vec<DatasetEntry>,
}

impl DatasetMetadata {
    /// Tab-indented JSON with non-ASCII text kept verbatim.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = Vec::new();
        let fmt     = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, fmt);
        self.serialize(&mut ser)?;
        Ok(out)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Check that spans are non-empty, contiguous from offset 0 in record
    /// order, and end inside a blob of `blob_len` bytes.
    pub fn validate_spans(&self, blob_len: u64) -> Result<(), DatasetError> {
        let mut expected_start = 0u64;
        for (index, e) in self.records.iter().enumerate() {
            if e.start != expected_start || e.start >= e.end || e.end > blob_len {
                return Err(DatasetError::SpanOutOfRange {
                    index,
                    start: e.start,
                    end: e.end,
                    blob_len,
                });
            }
            expected_start = e.end;
        }
        Ok(())
    }

    /// Path of the blob given where the metadata document lives.
    pub fn packed_path(&self, metadata_path: &Path) -> PathBuf {
        match metadata_path.parent() {
            Some(dir) => dir.join(&self.packed_filename),
            None      => PathBuf::from(&self.packed_filename),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(start: u64, end: u64) -> DatasetEntry {
        DatasetEntry::new(
            SampleLabel {
                index:           3,
                unicode_char:    "亜".into(),
                source_material: "A".into(),
                symbol_type:     "KANJI ".into(),
                font_name:       "MINCHO".into(),
            },
            Span { start, end },
            "ETL2",
        )
    }

    #[test]
    fn json_is_tab_indented_utf8() {
        let meta = DatasetMetadata {
            packed_filename: "p.bin".into(),
            packed_checksum: "00".into(),
            records:         vec![entry(0, 10)],
        };
        let text = String::from_utf8(meta.to_json().unwrap()).unwrap();
        assert!(text.contains("\n\t\"packed_filename\": \"p.bin\""));
        assert!(text.contains("\"unicode_char\": \"亜\""));
        assert!(text.contains("\"index_in_original_dataset\": 3"));
        assert_eq!(DatasetMetadata::from_json(text.as_bytes()).unwrap(), meta);
    }

    #[test]
    fn span_validation() {
        let mut meta = DatasetMetadata {
            packed_filename: "p.bin".into(),
            packed_checksum: String::new(),
            records:         vec![entry(0, 10), entry(10, 25)],
        };
        assert!(meta.validate_spans(25).is_ok());
        assert!(matches!(meta.validate_spans(24), Err(DatasetError::SpanOutOfRange { index: 1, .. })));

        meta.records[1] = entry(12, 25);
        assert!(matches!(meta.validate_spans(25), Err(DatasetError::SpanOutOfRange { index: 1, .. })));

        meta.records[1] = entry(10, 10);
        assert!(meta.validate_spans(25).is_err());
    }

    #[test]
    fn packed_path_is_relative_to_metadata() {
        let meta = DatasetMetadata {
            packed_filename: "p.bin".into(),
            packed_checksum: String::new(),
            records:         Vec::new(),
        };
        assert_eq!(meta.packed_path(Path::new("/data/m.json")), PathBuf::from("/data/p.bin"));
        assert_eq!(meta.packed_path(Path::new("m.json")), PathBuf::from("p.bin"));
    }
}
