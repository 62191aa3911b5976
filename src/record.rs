//! Fixed-layout ETL archive records.
//!
//! # Wire layout (MSB-first, 21 960 bits = 2 745 bytes per record)
//!
//! | Bits | Field |
//! |------|-------|
//! | 36   | serial index (signed) |
//! | 6    | scan source material (T56) |
//! | 30   | padding |
//! | 6×6  | symbol type (T56) |
//! | 6×6  | font name (T56) |
//! | 24   | padding |
//! | 2×6  | CO-59 coordinate code |
//! | 180  | padding |
//! | 21 600 | 60×60 image, 6 bits per pixel |
//!
//! Field order is part of the format.  Running out of input on the first
//! field is the normal end of a file; running out anywhere later means the
//! file is truncated or corrupt.

use thiserror::Error;
use tracing::{debug, warn};

use crate::bits::{BitReadError, BitReader};
use crate::raster::{GrayImage, RasterError};
use crate::tables::{CodeTables, TableError};

pub const INDEX_BITS:         u32   = 36;
pub const CODE_BITS:          u32   = 6;
pub const PAD_AFTER_SOURCE:   u32   = 30;
pub const PAD_AFTER_FONT:     u32   = 24;
pub const PAD_AFTER_CO59:     u32   = 180;
pub const SYMBOL_TYPE_CODES:  usize = 6;
pub const FONT_NAME_CODES:    usize = 6;

pub const IMAGE_WIDTH:        u32   = 60;
pub const IMAGE_HEIGHT:       u32   = 60;
pub const PIXEL_BITS:         u32   = 6;
pub const IMAGE_PIXELS:       usize = (IMAGE_WIDTH * IMAGE_HEIGHT) as usize;
/// Size of the packed image payload in bytes.
pub const RAW_IMAGE_BYTES:    usize = IMAGE_PIXELS * PIXEL_BITS as usize / 8;
/// 6-bit samples are widened to 8 bits by this factor, so the brightest
/// sample becomes 252.
pub const PIXEL_SCALE:        u8    = 4;

pub const RECORD_BITS: u64 = INDEX_BITS as u64
    + CODE_BITS as u64
    + PAD_AFTER_SOURCE as u64
    + (SYMBOL_TYPE_CODES + FONT_NAME_CODES) as u64 * CODE_BITS as u64
    + PAD_AFTER_FONT as u64
    + 2 * CODE_BITS as u64
    + PAD_AFTER_CO59 as u64
    + IMAGE_PIXELS as u64 * PIXEL_BITS as u64;
pub const RECORD_BYTES: usize = (RECORD_BITS / 8) as usize;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record {ordinal} at byte {byte_offset} is truncated: {source}")]
    Truncated { ordinal: usize, byte_offset: u64, #[source] source: BitReadError },
    #[error("Record {ordinal} at byte {byte_offset}: {source}")]
    Table { ordinal: usize, byte_offset: u64, #[source] source: TableError },
    #[error("Record {ordinal} at byte {byte_offset}: {source}")]
    Raster { ordinal: usize, byte_offset: u64, #[source] source: RasterError },
    #[error("Bit read error: {0}")]
    Bits(#[from] BitReadError),
}

/// Raw field values of one record, before any table lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub index:           i64,
    pub source_material: u8,
    pub symbol_type:     [u8; SYMBOL_TYPE_CODES],
    pub font_name:       [u8; FONT_NAME_CODES],
    pub co59:            (u8, u8),
    /// One 6-bit sample per pixel, row-major.
    pub samples:         Vec<u8>,
}

impl ArchiveRecord {
    /// Read the next record.  Returns `Ok(None)` when the stream ends before
    /// the first field; any later shortfall is an error.
    pub fn read(reader: &mut BitReader<'_>) -> Result<Option<Self>, BitReadError> {
        let index = match reader.read_int(INDEX_BITS) {
            Ok(v) => v,
            Err(e) if e.is_end_of_stream() => {
                if !reader.is_at_end() {
                    warn!(bits = reader.remaining(), "ignoring trailing bits after last record");
                }
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let source_material = reader.read_uint(CODE_BITS)? as u8;
        reader.skip(PAD_AFTER_SOURCE)?;

        let mut symbol_type = [0u8; SYMBOL_TYPE_CODES];
        for code in symbol_type.iter_mut() {
            *code = reader.read_uint(CODE_BITS)? as u8;
        }
        let mut font_name = [0u8; FONT_NAME_CODES];
        for code in font_name.iter_mut() {
            *code = reader.read_uint(CODE_BITS)? as u8;
        }
        reader.skip(PAD_AFTER_FONT)?;

        let co59 = (reader.read_uint(CODE_BITS)? as u8, reader.read_uint(CODE_BITS)? as u8);
        reader.skip(PAD_AFTER_CO59)?;

        let samples = reader.read_bytes_bitpacked(IMAGE_PIXELS, PIXEL_BITS)?;

        Ok(Some(Self { index, source_material, symbol_type, font_name, co59, samples }))
    }

    /// Widen the 6-bit samples into an 8-bit grayscale image.
    pub fn image(&self) -> Result<GrayImage, RasterError> {
        GrayImage::from_samples(IMAGE_WIDTH, IMAGE_HEIGHT, &self.samples, PIXEL_SCALE)
    }
}

/// Text fields of a decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLabel {
    pub index:           i64,
    pub unicode_char:    String,
    pub source_material: String,
    pub symbol_type:     String,
    pub font_name:       String,
}

impl SampleLabel {
    pub fn resolve(record: &ArchiveRecord, tables: &CodeTables) -> Result<Self, TableError> {
        Ok(Self {
            index:           record.index,
            unicode_char:    tables.co59(record.co59)?.to_owned(),
            source_material: tables.t56(record.source_material)?.to_string(),
            symbol_type:     tables.t56_string(&record.symbol_type)?,
            font_name:       tables.t56_string(&record.font_name)?,
        })
    }
}

/// One fully decoded character sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSample {
    pub label: SampleLabel,
    pub image: GrayImage,
}

/// Iterates the records of one archive file.
///
/// Yields `Err` at most once; iteration stops after the first error.
pub struct RecordDecoder<'a> {
    reader:  BitReader<'a>,
    tables:  &'a CodeTables,
    ordinal: usize,
    done:    bool,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(data: &'a [u8], tables: &'a CodeTables) -> Self {
        Self { reader: BitReader::new(data), tables, ordinal: 0, done: false }
    }

    /// Number of records decoded so far.
    pub fn decoded(&self) -> usize { self.ordinal }

    fn decode_next(&mut self) -> Result<Option<CharacterSample>, RecordError> {
        let ordinal     = self.ordinal;
        let byte_offset = self.reader.byte_offset();

        let record = match ArchiveRecord::read(&mut self.reader) {
            Ok(Some(r)) => r,
            Ok(None)    => return Ok(None),
            Err(source) if source.is_end_of_stream() => {
                return Err(RecordError::Truncated { ordinal, byte_offset, source });
            }
            Err(e) => return Err(e.into()),
        };

        let label = SampleLabel::resolve(&record, self.tables)
            .map_err(|source| RecordError::Table { ordinal, byte_offset, source })?;
        let image = record.image()
            .map_err(|source| RecordError::Raster { ordinal, byte_offset, source })?;

        debug!(ordinal, index = label.index, char = %label.unicode_char, "decoded record");
        self.ordinal += 1;
        Ok(Some(CharacterSample { label, image }))
    }
}

impl Iterator for RecordDecoder<'_> {
    type Item = Result<CharacterSample, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.decode_next() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::Co59Table;
    use bitstream_io::{BigEndian, BitWrite, BitWriter};

    fn encode(index: i64, co59: (u8, u8), sample: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::endian(&mut buf, BigEndian);
            w.write_signed(INDEX_BITS, index).unwrap();
            w.write(CODE_BITS, 17u8).unwrap();
            w.write(PAD_AFTER_SOURCE, 0u32).unwrap();
            for c in [34u8, 17, 37, 33, 25, 16] {
                w.write(CODE_BITS, c).unwrap();
            }
            for c in [36u8, 25, 37, 19, 24, 38] {
                w.write(CODE_BITS, c).unwrap();
            }
            w.write(PAD_AFTER_FONT, 0u32).unwrap();
            w.write(CODE_BITS, co59.0).unwrap();
            w.write(CODE_BITS, co59.1).unwrap();
            for _ in 0..(PAD_AFTER_CO59 / 30) {
                w.write(30, 0u32).unwrap();
            }
            for _ in 0..IMAGE_PIXELS {
                w.write(PIXEL_BITS, sample).unwrap();
            }
            w.byte_align().unwrap();
        }
        buf
    }

    fn tables() -> CodeTables {
        CodeTables::from_co59(Co59Table::parse("亜:16,33 あ:4,1").unwrap())
    }

    #[test]
    fn layout_constants() {
        assert_eq!(RECORD_BITS, 21_960);
        assert_eq!(RECORD_BYTES, 2_745);
        assert_eq!(RAW_IMAGE_BYTES, 2_700);
    }

    #[test]
    fn decodes_fields_in_order() {
        let data = encode(-5, (16, 33), 63);
        assert_eq!(data.len(), RECORD_BYTES);
        let mut r = BitReader::new(&data);
        let rec = ArchiveRecord::read(&mut r).unwrap().unwrap();
        assert_eq!(rec.index, -5);
        assert_eq!(rec.source_material, 17);
        assert_eq!(rec.symbol_type, [34, 17, 37, 33, 25, 16]);
        assert_eq!(rec.co59, (16, 33));
        assert!(rec.samples.iter().all(|&s| s == 63));
        assert!(r.is_at_end());
        assert!(ArchiveRecord::read(&mut r).unwrap().is_none());
    }

    #[test]
    fn resolves_labels() {
        let data   = encode(1, (16, 33), 0);
        let tables = tables();
        let sample = RecordDecoder::new(&data, &tables).next().unwrap().unwrap();
        assert_eq!(sample.label.unicode_char, "亜");
        assert_eq!(sample.label.source_material, "A");
        assert_eq!(sample.label.symbol_type, "KANJI ");
        assert_eq!(sample.label.font_name, "MINCHO");
    }

    #[test]
    fn zero_payload_is_black() {
        let data   = encode(1, (4, 1), 0);
        let tables = tables();
        let sample = RecordDecoder::new(&data, &tables).next().unwrap().unwrap();
        assert_eq!(sample.image.pixels.len(), IMAGE_PIXELS);
        assert!(sample.image.pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn brightest_sample_scales_to_252() {
        let data   = encode(1, (4, 1), 63);
        let tables = tables();
        let sample = RecordDecoder::new(&data, &tables).next().unwrap().unwrap();
        assert!(sample.image.pixels.iter().all(|&p| p == 252));
    }

    #[test]
    fn empty_input_yields_nothing() {
        let tables = tables();
        assert!(RecordDecoder::new(&[], &tables).next().is_none());
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut data = encode(1, (4, 1), 0);
        data.extend(encode(2, (4, 1), 0));
        data.truncate(RECORD_BYTES + 100);
        let tables  = tables();
        let results: Vec<_> = RecordDecoder::new(&data, &tables).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(RecordError::Truncated { ordinal, byte_offset, .. }) => {
                assert_eq!(*ordinal, 1);
                assert_eq!(*byte_offset, RECORD_BYTES as u64);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn unknown_coordinate_code_is_an_error() {
        let data   = encode(1, (9, 9), 0);
        let tables = tables();
        let err    = RecordDecoder::new(&data, &tables).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            RecordError::Table { ordinal: 0, source: TableError::UnknownCode { code: (9, 9) }, .. }
        ));
    }

    #[test]
    fn decoding_is_deterministic() {
        let data   = encode(7, (4, 1), 21);
        let tables = tables();
        let a = RecordDecoder::new(&data, &tables).next().unwrap().unwrap();
        let b = RecordDecoder::new(&data, &tables).next().unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.image.encode_png().unwrap(), b.image.encode_png().unwrap());
    }
}
