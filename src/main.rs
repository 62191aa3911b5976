use clap::{Parser, Subcommand};
use etlpack::dataset::{convert, ConvertOptions, DatasetReader};
use etlpack::xformat::{self, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "etlpack", about = "Convert ETL character archives into packed PNG datasets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode archive files into a packed PNG blob and a metadata document
    Convert {
        /// Overwrite existing metadata / blob files
        #[arg(short, long)]
        force: bool,
        /// CO-59 to Unicode table
        #[arg(long, default_value = "co59-utf8.txt")]
        code_table: PathBuf,
        #[arg(short, long, default_value = "etl2-metadata.json")]
        metadata: PathBuf,
        #[arg(short, long, default_value = "etl2-png-images.pack.bin")]
        packed: PathBuf,
        /// Origin label written into every record
        #[arg(long, default_value = "ETL2")]
        dataset_name: String,
        /// Archive files in processing order (default: ETL2/ETL2_1 .. ETL2/ETL2_5)
        sources: Vec<PathBuf>,
    },
    /// Recompute the blob checksum and check every record span
    Verify {
        metadata: PathBuf,
    },
    /// List the records of a converted dataset
    List {
        metadata: PathBuf,
    },
    /// Write one record's PNG to a file
    Extract {
        metadata: PathBuf,
        #[arg(short, long)]
        index: usize,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Convert between JSON and the xformat binary encoding
    Xformat {
        #[command(subcommand)]
        command: XformatCommands,
    },
}

#[derive(Subcommand)]
enum XformatCommands {
    /// Encode a JSON document as xformat
    Encode {
        input:  PathBuf,
        output: PathBuf,
    },
    /// Decode an xformat file and print it as JSON
    Decode {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,etlpack=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { force, code_table, metadata, packed, dataset_name, sources } => {
            let defaults = ConvertOptions::default();
            let opts = ConvertOptions {
                sources: if sources.is_empty() { defaults.sources } else { sources },
                code_table,
                metadata_path: metadata,
                packed_path: packed,
                dataset_name,
                force,
            };
            let meta = convert(&opts)?;
            println!("Records:  {}", meta.records.len());
            println!("Packed:   {} (md5 {})", opts.packed_path.display(), meta.packed_checksum);
            println!("Metadata: {}", opts.metadata_path.display());
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { metadata } => {
            let ds = DatasetReader::open(&metadata)?;
            ds.validate_spans()?;
            ds.verify_checksum()?;
            println!("OK: {} records, {} B, md5 {}",
                ds.len(), ds.blob_len()?, ds.metadata().packed_checksum);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { metadata } => {
            let ds = DatasetReader::open(&metadata)?;
            println!("Dataset: {} ({})", metadata.display(), ds.packed_path().display());
            println!("{:>7} {:>8} {:<4} {:<6} {:<6} {:>12} {:>12}",
                     "#", "Index", "Char", "Type", "Font", "Start", "End");
            for (i, e) in ds.entries().iter().enumerate() {
                println!("{:>7} {:>8} {:<4} {:<6} {:<6} {:>12} {:>12}",
                    i, e.index_in_original_dataset, e.unicode_char,
                    e.symbol_type_id, e.font_name, e.start, e.end);
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { metadata, index, output } => {
            let mut ds = DatasetReader::open(&metadata)?;
            let png = ds.read_png(index)?;
            std::fs::write(&output, &png)?;
            println!("Wrote record {} ({}) → {}",
                index, ds.entries()[index].unicode_char, output.display());
        }

        // ── Xformat ──────────────────────────────────────────────────────────
        Commands::Xformat { command } => match command {
            XformatCommands::Encode { input, output } => {
                let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&input)?)?;
                let value = Value::try_from(&json)?;
                xformat::write_file(&output, &value)?;
                println!("Encoded {} → {}", input.display(), output.display());
            }
            XformatCommands::Decode { input } => {
                let value = xformat::read_file(&input)?;
                println!("{}", serde_json::to_string_pretty(&value.to_json()?)?);
            }
        },
    }

    Ok(())
}
