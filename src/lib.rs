pub mod bits;
pub mod tables;
pub mod record;
pub mod raster;
pub mod pack;
pub mod dataset;
pub mod xformat;

pub use bits::{BitReader, BitReadError};
pub use tables::{CodeTables, Co59Table, TableError};
pub use record::{ArchiveRecord, CharacterSample, RecordDecoder, RecordError};
pub use raster::GrayImage;
pub use pack::{PackWriter, Span};
pub use dataset::{convert, ConvertOptions, DatasetEntry, DatasetError, DatasetMetadata, DatasetReader};
pub use xformat::{Value, XFormatError};
