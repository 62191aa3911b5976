use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info, warn};

use super::{ConvertOptions, DatasetEntry, DatasetError, DatasetMetadata};
use crate::pack::{md5_file, PackWriter};
use crate::record::{CharacterSample, RecordDecoder, RecordError, SampleLabel, RECORD_BYTES};
use crate::tables::CodeTables;

/// A decoded record with its image already PNG-encoded.
struct EncodedSample {
    ordinal: usize,
    label:   SampleLabel,
    png:     Vec<u8>,
}

/// Convert every source archive into one packed blob and a metadata
/// document.
///
/// The metadata document is only written once every record of every source
/// has been packed.  On error the blob may be left half-written; the run is
/// incomplete and must be repeated with `force`.
pub fn convert(opts: &ConvertOptions) -> Result<DatasetMetadata, DatasetError> {
    for path in &opts.sources {
        if !path.exists() {
            return Err(DatasetError::MissingSource { path: path.clone() });
        }
    }
    for path in [&opts.metadata_path, &opts.packed_path] {
        if path.exists() {
            if !opts.force {
                return Err(DatasetError::OutputAlreadyExists { path: path.clone() });
            }
            warn!(path = %path.display(), "overwriting existing output");
        }
    }

    let tables = CodeTables::load(&opts.code_table)?;

    let mut pack    = PackWriter::create(&opts.packed_path)?;
    let mut records = Vec::new();

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        // Decode and encode concurrently; append strictly in source order.
        let decoded: Vec<Vec<EncodedSample>> = opts.sources
            .par_iter()
            .map(|path| -> Result<Vec<EncodedSample>, DatasetError> {
                let mut out = Vec::new();
                encode_source(path, &tables, |s| { out.push(s); Ok(()) })?;
                Ok(out)
            })
            .collect::<Result<_, DatasetError>>()?;

        for (path, samples) in opts.sources.iter().zip(decoded) {
            for sample in samples {
                records.push(append_sample(&mut pack, path, sample, &opts.dataset_name)?);
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        for path in &opts.sources {
            encode_source(path, &tables, |sample| {
                records.push(append_sample(&mut pack, path, sample, &opts.dataset_name)?);
                Ok(())
            })?;
        }
    }

    let blob_len = pack.position();
    pack.finish()?;

    let packed_checksum = md5_file(&opts.packed_path)?;
    let packed_filename = opts.packed_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let metadata = DatasetMetadata { packed_filename, packed_checksum, records };
    fs::write(&opts.metadata_path, metadata.to_json()?)?;

    info!(
        records  = metadata.records.len(),
        bytes    = blob_len,
        checksum = %metadata.packed_checksum,
        metadata = %opts.metadata_path.display(),
        "conversion complete"
    );
    Ok(metadata)
}

/// Decode one archive file and hand each PNG-encoded sample to `sink` in
/// file order.
fn encode_source<F>(path: &Path, tables: &CodeTables, mut sink: F) -> Result<(), DatasetError>
where
    F: FnMut(EncodedSample) -> Result<(), DatasetError>,
{
    let data = fs::read(path)?;
    info!(path = %path.display(), bytes = data.len(), "decoding source archive");

    let mut decoder = RecordDecoder::new(&data, tables);
    for (ordinal, sample) in decoder.by_ref().enumerate() {
        let sample = sample.map_err(|source| DatasetError::Record { path: path.to_owned(), source })?;
        sink(encode_sample(path, ordinal, sample)?)?;
    }

    info!(path = %path.display(), records = decoder.decoded(), "finished source archive");
    Ok(())
}

fn encode_sample(path: &Path, ordinal: usize, sample: CharacterSample) -> Result<EncodedSample, DatasetError> {
    let png = sample.image.encode_png().map_err(|source| DatasetError::Record {
        path:   path.to_owned(),
        source: RecordError::Raster {
            ordinal,
            byte_offset: (ordinal * RECORD_BYTES) as u64,
            source,
        },
    })?;
    debug!(ordinal, index = sample.label.index, char = %sample.label.unicode_char, png_bytes = png.len(), "encoded sample");
    Ok(EncodedSample { ordinal, label: sample.label, png })
}

/// Append one sample's PNG to the blob and build its metadata entry.
fn append_sample<W: Write>(
    pack:         &mut PackWriter<W>,
    path:         &Path,
    sample:       EncodedSample,
    dataset_name: &str,
) -> Result<DatasetEntry, DatasetError> {
    let span = pack.append(&sample.png).map_err(|source| DatasetError::Append {
        path:    path.to_owned(),
        ordinal: sample.ordinal,
        source,
    })?;
    Ok(DatasetEntry::new(sample.label, span, dataset_name))
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use super::*;
    use crate::raster::{GrayImage, RasterError};

    fn label() -> SampleLabel {
        SampleLabel {
            index:           12,
            unicode_char:    "亜".into(),
            source_material: "B".into(),
            symbol_type:     ".CHAPA".into(),
            font_name:       "GOTHIC".into(),
        }
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left"))
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    #[test]
    fn png_failure_names_source_and_record() {
        let sample = CharacterSample {
            label: label(),
            image: GrayImage { width: 60, height: 60, pixels: vec![0; 10] },
        };
        let path = PathBuf::from("ETL2/ETL2_3");
        match encode_sample(&path, 2, sample) {
            Err(DatasetError::Record {
                path: p,
                source: RecordError::Raster { ordinal: 2, byte_offset, source: RasterError::Encode(_) },
            }) => {
                assert_eq!(p, path);
                assert_eq!(byte_offset, 2 * RECORD_BYTES as u64);
            }
            Err(other) => panic!("expected a PNG error with context, got {other:?}"),
            Ok(_) => panic!("short pixel buffer must not encode"),
        }
    }

    #[test]
    fn append_failure_names_source_and_record() {
        let mut pack = PackWriter::new(FullDisk);
        let sample   = EncodedSample { ordinal: 4, label: label(), png: vec![0x89, b'P', b'N', b'G'] };
        let path     = PathBuf::from("ETL2/ETL2_1");
        let err = append_sample(&mut pack, &path, sample, "ETL2").unwrap_err();
        assert!(matches!(&err, DatasetError::Append { ordinal: 4, .. }));
        assert!(err.to_string().contains("ETL2/ETL2_1"), "{err}");
        assert_eq!(pack.position(), 0);

        let mut pack = PackWriter::new(Vec::new());
        let sample   = EncodedSample { ordinal: 0, label: label(), png: vec![1, 2, 3] };
        let entry    = append_sample(&mut pack, &path, sample, "ETL2").unwrap();
        assert_eq!((entry.start, entry.end), (0, 3));
        assert_eq!(entry.index_in_original_dataset, 12);
    }
}
