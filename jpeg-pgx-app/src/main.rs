use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rust_jpeg_pgx::{extract_to_pgx, pgx::SampleByteOrder, ExtractOptions};
use tracing::level_filters::LevelFilter;

/// Writes every component of a JPEG image, at its native resolution, as a PGX file set.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// JPEG file to read.
    input: PathBuf,
    /// Output manifest (.pgx); components are written next to it as `<output>_<i>.h` and
    /// `<output>_<i>.raw`.
    output: PathBuf,
    /// Byte order of 12-bit samples.
    #[arg(long, value_enum, default_value_t = ByteOrderArg::Big)]
    byte_order: ByteOrderArg,
    /// Print debug information; can be repeated.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only print errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ByteOrderArg {
    /// Most significant byte first (`PG ML`)
    Big,
    /// Least significant byte first (`PG LM`)
    Little,
}

impl From<ByteOrderArg> for SampleByteOrder {
    fn from(value: ByteOrderArg) -> Self {
        match value {
            ByteOrderArg::Big => SampleByteOrder::BigEndian,
            ByteOrderArg::Little => SampleByteOrder::LittleEndian,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = match (args.quiet, args.verbose) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::INFO,
        (false, 1) => LevelFilter::DEBUG,
        (false, 2..) => LevelFilter::TRACE,
    };
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(filter.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(env_filter)
        .init();

    let options = ExtractOptions {
        byte_order: args.byte_order.into(),
    };
    match extract_to_pgx(&args.input, &args.output, options) {
        Ok(summary) => {
            for component in &summary.components {
                tracing::debug!(
                    index = component.index,
                    header = %component.header_path.display(),
                    raw = %component.raw_path.display(),
                    "component written"
                );
            }
            tracing::info!(
                "Wrote {} components to {}",
                summary.components.len(),
                summary.manifest.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
