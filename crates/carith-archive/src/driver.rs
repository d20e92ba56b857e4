//! Block I/O loop and worker dispatch.
//!
//! The driver works in rounds: read up to one segment per worker, fan the
//! segments out under `std::thread::scope`, join the round, write the
//! results in input order. The round join is the barrier that keeps the
//! archive a strict in-order concatenation of block frames no matter how
//! workers finish.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;

use carith_codec::block::{BlockCodec, CompressedBlock, SchemeRequest};
use carith_codec::scheme::{Chain, Scheme};
use carith_container::{BlockFrame, FileHeader, DEFAULT_SEGMENT_SIZE, MAX_SEGMENT_SIZE, MIN_SEGMENT_SIZE};
use carith_core::Crc32;
use tracing::{debug, info, warn};

use crate::ArchiveError;

const ARCHIVE_SUFFIX: &str = ".carith";
const PLAIN_SUFFIX: &str = ".plain";

/// Hard ceiling on the worker pool, whatever the machine reports.
const MAX_THREADS: usize = 48;

/// Driver configuration, filled in from the command line.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveOptions {
    /// Segment size in bytes, within the container's legal range.
    pub segsize: u32,
    /// Worker pool size.
    pub threads: usize,
    /// What to ask of the encoder for every block.
    pub request: SchemeRequest,
    /// When false, delete the source file on success; on extract also
    /// write the bare original name instead of adding `.plain`.
    pub keep_source: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            segsize: DEFAULT_SEGMENT_SIZE,
            threads: default_thread_count(),
            request: SchemeRequest::Roulette { use_rle: true },
            keep_source: true,
        }
    }
}

fn default_thread_count() -> usize {
    thread::available_parallelism().map_or(1, usize::from).min(MAX_THREADS)
}

/// Outcome of a compress run.
#[derive(Debug)]
pub struct CompressSummary {
    pub output: PathBuf,
    pub plain_len: u64,
    pub compressed_len: u64,
    pub blocks: usize,
}

/// Outcome of an extract run.
#[derive(Debug)]
pub struct ExtractSummary {
    pub output: PathBuf,
    pub plain_len: u64,
    pub blocks: usize,
    /// Whether the recomputed CRC matched the header. A mismatch is
    /// reported, not corrected: the output is written either way.
    pub crc_ok: bool,
}

/// Archive inspection result (`tell`). Pure: reads, never writes.
#[derive(Debug)]
pub struct ArchiveReport {
    pub header: FileHeader,
    pub blocks: Vec<BlockReport>,
}

/// Per-block line of an [`ArchiveReport`].
#[derive(Debug)]
pub struct BlockReport {
    pub scheme: u8,
    pub plain_len: u32,
    pub payload_len: u32,
    pub rle_intermediate_len: u32,
}

/// Compresses `input` into `input.carith`.
pub fn compress_file(input: &Path, options: &ArchiveOptions) -> Result<CompressSummary, ArchiveError> {
    if options.segsize < MIN_SEGMENT_SIZE || options.segsize > MAX_SEGMENT_SIZE {
        return Err(ArchiveError::BadSegmentSize(options.segsize));
    }

    let metadata = fs::metadata(input)?;
    if metadata.len() > u64::from(u32::MAX) {
        return Err(ArchiveError::InputTooLarge(input.to_path_buf()));
    }

    let output = compressed_path(input);
    let mut reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(&output)?);

    // Header totals are unknown until the last block; reserve the slot and
    // seek back to rewrite it at the end.
    let mut header = FileHeader {
        scheme: master_scheme_byte(options.request),
        mode: file_mode(&metadata),
        plain_crc: 0,
        total_plain_len: 0,
        total_rle_len: 0,
        segsize: options.segsize,
    };
    header.write_to(&mut writer)?;

    let mut crc = Crc32::new();
    let mut plain_len = 0u64;
    let mut total_rle_len = 0u64;
    let mut blocks = 0usize;

    loop {
        let segments = read_round(&mut reader, options.segsize as usize, options.threads.max(1))?;
        if segments.is_empty() {
            break;
        }
        debug!(round_blocks = segments.len(), first_block = blocks, "dispatching compress round");

        for segment in &segments {
            crc.update(segment);
            plain_len += segment.len() as u64;
        }

        let compressed = compress_round(&segments, options.request, blocks)?;
        for block in compressed {
            total_rle_len += block.rle_intermediate_len as u64;
            block_to_frame(block).write_to(&mut writer)?;
            blocks += 1;
        }
    }

    header.plain_crc = crc.finalize();
    header.total_plain_len = plain_len as u32;
    header.total_rle_len = total_rle_len.min(u64::from(u32::MAX)) as u32;

    writer.flush()?;
    writer.seek(SeekFrom::Start(0))?;
    header.write_to(&mut writer)?;
    writer.flush()?;
    let compressed_len = writer.get_ref().metadata()?.len();

    if !options.keep_source {
        fs::remove_file(input)?;
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        plain_len,
        compressed_len,
        blocks,
        "compress finished"
    );

    Ok(CompressSummary {
        output,
        plain_len,
        compressed_len,
        blocks,
    })
}

/// Extracts `input` (which must carry the `.carith` suffix).
///
/// A CRC mismatch is reported through the summary and a warning; matching
/// the source behaviour, the decompressed output is still written and it is
/// the caller's decision whether to trust it.
pub fn extract_file(input: &Path, options: &ArchiveOptions) -> Result<ExtractSummary, ArchiveError> {
    let output = extracted_path(input, options.keep_source)?;

    let mut reader = BufReader::new(File::open(input)?);
    let header = FileHeader::read_from(&mut reader)?;
    let mut writer = BufWriter::new(File::create(&output)?);

    let mut crc = Crc32::new();
    let mut plain_len = 0u64;
    let mut blocks = 0usize;

    loop {
        let mut round = Vec::new();
        while round.len() < options.threads.max(1) {
            match BlockFrame::read_from(&mut reader, header.segsize)? {
                Some(frame) => round.push(frame_to_block(frame, blocks + round.len())?),
                None => break,
            }
        }
        if round.is_empty() {
            break;
        }
        debug!(round_blocks = round.len(), first_block = blocks, "dispatching extract round");

        let plains = extract_round(&round, blocks)?;
        for plain in plains {
            crc.update(&plain);
            plain_len += plain.len() as u64;
            writer.write_all(&plain)?;
            blocks += 1;
        }
    }

    writer.flush()?;

    let crc_ok = crc.finalize() == header.plain_crc;
    if !crc_ok {
        warn!(
            input = %input.display(),
            expected = header.plain_crc,
            actual = crc.finalize(),
            "CRC mismatch: the extracted data may be corrupt"
        );
    }
    if plain_len != u64::from(header.total_plain_len) {
        warn!(
            declared = header.total_plain_len,
            actual = plain_len,
            "extracted length differs from the header"
        );
    }

    restore_mode(&output, header.mode)?;

    if !options.keep_source {
        fs::remove_file(input)?;
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        plain_len,
        blocks,
        crc_ok,
        "extract finished"
    );

    Ok(ExtractSummary {
        output,
        plain_len,
        blocks,
        crc_ok,
    })
}

/// Reads the header and walks the frames of an archive without decoding.
pub fn tell_file(input: &Path) -> Result<ArchiveReport, ArchiveError> {
    let mut reader = BufReader::new(File::open(input)?);
    let header = FileHeader::read_from(&mut reader)?;

    let mut blocks = Vec::new();
    while let Some(frame) = BlockFrame::read_from(&mut reader, header.segsize)? {
        blocks.push(BlockReport {
            scheme: frame.scheme,
            plain_len: frame.block_plain_len,
            payload_len: frame.total_payload_len(),
            rle_intermediate_len: frame.rle_intermediate_len,
        });
    }

    Ok(ArchiveReport { header, blocks })
}

/// Compresses one round of segments, one scoped worker per segment.
fn compress_round(
    segments: &[Vec<u8>],
    request: SchemeRequest,
    first_block: usize,
) -> Result<Vec<CompressedBlock>, ArchiveError> {
    thread::scope(|scope| {
        let workers: Vec<_> = segments
            .iter()
            .map(|segment| scope.spawn(move || BlockCodec::new().compress(segment, request)))
            .collect();

        workers
            .into_iter()
            .enumerate()
            .map(|(offset, worker)| {
                worker
                    .join()
                    .expect("codec worker panicked")
                    .map_err(|source| ArchiveError::Codec {
                        index: first_block + offset,
                        source,
                    })
            })
            .collect()
    })
}

/// Decompresses one round of blocks, one scoped worker per block.
fn extract_round(blocks: &[CompressedBlock], first_block: usize) -> Result<Vec<Vec<u8>>, ArchiveError> {
    thread::scope(|scope| {
        let workers: Vec<_> = blocks
            .iter()
            .map(|block| scope.spawn(move || BlockCodec::new().extract(block)))
            .collect();

        workers
            .into_iter()
            .enumerate()
            .map(|(offset, worker)| {
                worker
                    .join()
                    .expect("codec worker panicked")
                    .map_err(|source| ArchiveError::Codec {
                        index: first_block + offset,
                        source,
                    })
            })
            .collect()
    })
}

/// Reads up to `max_segments` segments for one dispatch round. Stops early
/// at the final, possibly short, segment.
fn read_round(reader: &mut impl Read, segsize: usize, max_segments: usize) -> io::Result<Vec<Vec<u8>>> {
    let mut segments = Vec::new();
    for _ in 0..max_segments {
        let segment = read_segment(reader, segsize)?;
        if segment.is_empty() {
            break;
        }
        let short = segment.len() < segsize;
        segments.push(segment);
        if short {
            break;
        }
    }
    Ok(segments)
}

fn read_segment(reader: &mut impl Read, segsize: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; segsize];
    let mut filled = 0;
    while filled < segsize {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

fn master_scheme_byte(request: SchemeRequest) -> u8 {
    match request {
        SchemeRequest::Chain(chain) => chain.scheme().bits(),
        SchemeRequest::Roulette { .. } => Scheme::ROULETTE.bits(),
    }
}

fn block_to_frame(block: CompressedBlock) -> BlockFrame {
    BlockFrame {
        scheme: block.chain.scheme().bits(),
        rle_intermediate_len: block.rle_intermediate_len as u32,
        block_plain_len: block.plain_len as u32,
        freq_comp: block.freq_table,
        comp: block.payload,
    }
}

fn frame_to_block(frame: BlockFrame, index: usize) -> Result<CompressedBlock, ArchiveError> {
    let chain =
        Chain::from_scheme_byte(frame.scheme).map_err(|source| ArchiveError::Codec { index, source })?;
    Ok(CompressedBlock {
        chain,
        plain_len: frame.block_plain_len as usize,
        rle_intermediate_len: frame.rle_intermediate_len as usize,
        freq_table: frame.freq_comp,
        payload: frame.comp,
    })
}

/// `input` + `.carith`.
fn compressed_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(ARCHIVE_SUFFIX);
    PathBuf::from(name)
}

/// `input` minus `.carith`, plus `.plain` unless the source is being
/// replaced.
fn extracted_path(input: &Path, keep_source: bool) -> Result<PathBuf, ArchiveError> {
    if input.extension().and_then(|ext| ext.to_str()) != Some("carith") {
        return Err(ArchiveError::NotAnArchiveName(input.to_path_buf()));
    }
    let base = input.with_extension("");
    if keep_source {
        let mut name = base.into_os_string();
        name.push(PLAIN_SUFFIX);
        Ok(PathBuf::from(name))
    } else {
        Ok(base)
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt as _;
    metadata.mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o644
}

#[cfg(unix)]
fn restore_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn restore_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
