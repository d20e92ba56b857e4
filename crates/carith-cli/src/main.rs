#![allow(clippy::print_stdout)]

//! `carith`: block-parallel file compressor over the RLE/LZSS/AC pipeline.

use std::path::PathBuf;

use anyhow::Context as _;
use carith_archive::{compress_file, extract_file, tell_file, ArchiveOptions, ArchiveReport};
use carith_codec::block::SchemeRequest;
use carith_codec::scheme::{Chain, Scheme};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "carith", version, about = "Lossless file compressor (RLE + LZSS + arithmetic coding)")]
struct Cli {
    #[command(flatten)]
    command: CommandFlags,

    /// Segment size in bytes (32768..=16777216).
    #[arg(short = 'g', long, value_name = "BYTES", default_value_t = 524_288)]
    segsize: u32,

    /// Worker threads (default: CPU count, capped at 48).
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Never try the RLE stage.
    #[arg(long)]
    norle: bool,

    /// Use the RLE stage alone (no LZSS, no arithmetic coding).
    #[arg(long, conflicts_with = "norle")]
    rleonly: bool,

    /// Delete the source file on success; extraction writes the bare
    /// original name instead of adding .plain.
    #[arg(long)]
    nokeep: bool,

    /// Info-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Debug-level logging.
    #[arg(long)]
    debug: bool,

    /// Disable ANSI colour in log output.
    #[arg(long)]
    nocolor: bool,

    /// File to operate on.
    file: PathBuf,
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct CommandFlags {
    /// Compress FILE into FILE.carith.
    #[arg(short = 'c', long)]
    compress: bool,

    /// Extract FILE (must carry the .carith suffix).
    #[arg(short = 'x', long)]
    extract: bool,

    /// Inspect an archive without extracting.
    #[arg(short = 't', long)]
    tell: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli).context("unable to initialize logging")?;

    let options = ArchiveOptions {
        segsize: cli.segsize,
        threads: cli.threads.unwrap_or(ArchiveOptions::default().threads),
        request: scheme_request(&cli),
        keep_source: !cli.nokeep,
    };

    if cli.command.compress {
        let summary = compress_file(&cli.file, &options)
            .with_context(|| format!("compressing {}", cli.file.display()))?;
        let ratio = if summary.plain_len > 0 {
            summary.compressed_len as f64 / summary.plain_len as f64 * 100.0
        } else {
            100.0
        };
        println!(
            "{}: {} -> {} bytes ({ratio:.1}%), {} block(s), wrote {}",
            cli.file.display(),
            summary.plain_len,
            summary.compressed_len,
            summary.blocks,
            summary.output.display(),
        );
    } else if cli.command.extract {
        let summary = extract_file(&cli.file, &options)
            .with_context(|| format!("extracting {}", cli.file.display()))?;
        println!(
            "{}: {} bytes, {} block(s), wrote {}",
            cli.file.display(),
            summary.plain_len,
            summary.blocks,
            summary.output.display(),
        );
        if !summary.crc_ok {
            println!("warning: CRC mismatch, the extracted data may be corrupt");
        }
    } else {
        let report = tell_file(&cli.file).with_context(|| format!("inspecting {}", cli.file.display()))?;
        print_report(&cli.file, &report);
    }

    Ok(())
}

fn scheme_request(cli: &Cli) -> SchemeRequest {
    if cli.rleonly {
        SchemeRequest::Chain(Chain::Rle)
    } else {
        SchemeRequest::Roulette { use_rle: !cli.norle }
    }
}

fn print_report(path: &std::path::Path, report: &ArchiveReport) {
    let header = &report.header;
    println!("{}:", path.display());
    println!("  scheme      {:#04x} ({})", header.scheme, scheme_name(header.scheme));
    println!("  mode        {:o}", header.mode);
    println!("  plain crc   {:#010x}", header.plain_crc);
    println!("  plain len   {}", header.total_plain_len);
    println!("  rle len     {}", header.total_rle_len);
    println!("  segsize     {}", header.segsize);
    println!("  blocks      {}", report.blocks.len());
    for (index, block) in report.blocks.iter().enumerate() {
        println!(
            "  block {index:>4}  {:#04x} {:<14} plain {:>8}  payload {:>8}  rle {:>8}",
            block.scheme,
            scheme_name(block.scheme),
            block.plain_len,
            block.payload_len,
            block.rle_intermediate_len,
        );
    }
}

/// Human name for a scheme byte, e.g. `RLE+LZSS32+AC` or `stored`.
fn scheme_name(byte: u8) -> String {
    let scheme = Scheme::from_bits_retain(byte);
    if scheme.contains(Scheme::STORED) {
        return "stored".to_owned();
    }
    if scheme.contains(Scheme::ROULETTE) {
        return "roulette".to_owned();
    }
    let mut stages = Vec::new();
    if scheme.contains(Scheme::RLE) {
        stages.push("RLE");
    }
    if scheme.contains(Scheme::LZSS_4K) {
        stages.push("LZSS4");
    }
    if scheme.contains(Scheme::LZSS_32K) {
        stages.push("LZSS32");
    }
    if scheme.contains(Scheme::AC) {
        stages.push("AC");
    }
    if stages.is_empty() {
        "none".to_owned()
    } else {
        stages.join("+")
    }
}

fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    use tracing::metadata::LevelFilter;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let default_level = if cli.debug {
        LevelFilter::DEBUG
    } else if cli.verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(!cli.nocolor)
        .with_writer(std::io::stderr);

    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("CARITH_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}
