use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{DatasetEntry, DatasetError, DatasetMetadata};
use crate::pack::md5_file;
use crate::raster::GrayImage;

/// Read access to a converted dataset: the metadata document plus the blob
/// it indexes.
pub struct DatasetReader {
    metadata:    DatasetMetadata,
    packed_path: PathBuf,
    blob:        File,
}

impl DatasetReader {
    pub fn open<P: AsRef<Path>>(metadata_path: P) -> Result<Self, DatasetError> {
        let metadata_path = metadata_path.as_ref();
        let metadata      = DatasetMetadata::from_json(&fs::read(metadata_path)?)?;
        let packed_path   = metadata.packed_path(metadata_path);
        let blob          = File::open(&packed_path)?;
        debug!(
            metadata = %metadata_path.display(),
            blob = %packed_path.display(),
            records = metadata.records.len(),
            "opened dataset"
        );
        Ok(Self { metadata, packed_path, blob })
    }

    pub fn metadata(&self) -> &DatasetMetadata { &self.metadata }

    pub fn entries(&self) -> &[DatasetEntry] { &self.metadata.records }

    pub fn len(&self) -> usize { self.metadata.records.len() }

    pub fn is_empty(&self) -> bool { self.metadata.records.is_empty() }

    pub fn packed_path(&self) -> &Path { &self.packed_path }

    pub fn blob_len(&self) -> Result<u64, DatasetError> {
        Ok(self.blob.metadata()?.len())
    }

    /// Recompute the blob's MD5 and compare it with the recorded checksum.
    pub fn verify_checksum(&self) -> Result<(), DatasetError> {
        let actual = md5_file(&self.packed_path)?;
        if !actual.eq_ignore_ascii_case(&self.metadata.packed_checksum) {
            return Err(DatasetError::ChecksumMismatch {
                expected: self.metadata.packed_checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn validate_spans(&self) -> Result<(), DatasetError> {
        self.metadata.validate_spans(self.blob_len()?)
    }

    /// Raw PNG bytes of record `index`.
    pub fn read_png(&mut self, index: usize) -> Result<Vec<u8>, DatasetError> {
        let len   = self.len();
        let entry = self.metadata.records
            .get(index)
            .ok_or(DatasetError::NoSuchRecord { index, len })?;
        let span  = entry.span();

        let blob_len = self.blob.metadata()?.len();
        if span.is_empty() || span.end > blob_len {
            return Err(DatasetError::SpanOutOfRange { index, start: span.start, end: span.end, blob_len });
        }

        let mut buf = vec![0u8; span.len() as usize];
        self.blob.seek(SeekFrom::Start(span.start))?;
        self.blob.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_image(&mut self, index: usize) -> Result<GrayImage, DatasetError> {
        let png = self.read_png(index)?;
        Ok(GrayImage::decode_png(&png)?)
    }
}
