use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use memmap2::Mmap;
use rebrotli::{BrotliWriter, EncoderMode, EncoderParams, EncoderStats, Error};

#[derive(Parser, Debug)]
#[command(name = "rebrotli")]
#[command(about = "Compress files to the Brotli format")]
#[command(version)]
struct Args {
    /// Input file (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Output file (use - for stdout)
    #[arg(short, long)]
    output: PathBuf,

    /// Compression quality (0-11)
    #[arg(short, long, default_value = "11")]
    quality: u32,

    /// Base-2 logarithm of the sliding window (10-24, up to 30 with --large-window)
    #[arg(short = 'w', long = "window", default_value = "22")]
    window: u32,

    /// Allow windows above 16 MiB (non-standard stream)
    #[arg(long)]
    large_window: bool,

    /// Input type hint
    #[arg(long, value_enum, default_value = "generic")]
    mode: Mode,

    /// Decompress instead of compressing
    #[arg(short, long)]
    decompress: bool,

    /// Show verbose statistics
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Generic,
    Text,
    Font,
}

impl From<Mode> for EncoderMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Generic => EncoderMode::Generic,
            Mode::Text => EncoderMode::Text,
            Mode::Font => EncoderMode::Font,
        }
    }
}

const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 2;

/// Decoder read buffer
const DECOMPRESS_BUFFER_SIZE: usize = 64 * 1024;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn is_stdio(path: &Path) -> bool {
    path.to_str() == Some("-")
}

fn open_output(path: &Path) -> io::Result<Box<dyn Write>> {
    Ok(if is_stdio(path) {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(File::create(path)?))
    })
}

fn run() -> Result<u8, Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.decompress {
        return run_decompress(&args);
    }

    let mut params = EncoderParams::default()
        .with_quality(args.quality)
        .with_window_bits(args.window)
        .with_large_window(args.large_window)
        .with_mode(args.mode.into());
    params.validate()?;

    let output = open_output(&args.output)?;
    let start = std::time::Instant::now();

    let stats = if is_stdio(&args.input) {
        let mut writer = BrotliWriter::new(output, params)?;
        io::copy(&mut io::stdin().lock(), &mut writer)?;
        writer.try_finish()?;
        writer.stats().clone()
    } else {
        let file = File::open(&args.input)?;
        let len = file.metadata()?.len() as usize;
        params = params.with_size_hint(len);
        let mut writer = BrotliWriter::new(output, params)?;
        if len > 0 {
            // SAFETY: the file is opened read-only and only read while mapped
            let mmap = unsafe { Mmap::map(&file)? };
            writer.write_all(&mmap)?;
        }
        writer.try_finish()?;
        writer.stats().clone()
    };

    let elapsed = start.elapsed();

    if args.verbose {
        print_stats(&stats, elapsed);
    }

    Ok(EXIT_OK)
}

fn print_stats(stats: &EncoderStats, elapsed: std::time::Duration) {
    eprintln!("Compression complete:");
    eprintln!("  Input bytes:      {}", stats.input_bytes);
    eprintln!("  Output bytes:     {}", stats.output_bytes);
    eprintln!(
        "  Ratio:            {:.3}",
        stats.output_bytes as f64 / stats.input_bytes.max(1) as f64
    );
    eprintln!("  Meta-blocks:      {}", stats.meta_blocks);
    eprintln!("  Stored blocks:    {}", stats.uncompressed_meta_blocks);
    eprintln!("  Time:             {:.2?}", elapsed);
    eprintln!(
        "  Throughput:       {:.1} MB/s",
        stats.input_bytes as f64 / elapsed.as_secs_f64() / 1_000_000.0
    );
}

fn run_decompress(args: &Args) -> Result<u8, Box<dyn std::error::Error>> {
    let input: Box<dyn Read> = if is_stdio(&args.input) {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(&args.input)?))
    };
    let mut output = open_output(&args.output)?;

    let start = std::time::Instant::now();
    let mut decoder = brotli_decompressor::Decompressor::new(input, DECOMPRESS_BUFFER_SIZE);
    let mut buf = vec![0u8; DECOMPRESS_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::CorruptStream(e.to_string()).into()),
        };
        output.write_all(&buf[..n])?;
        total += n as u64;
    }
    output.flush()?;
    let elapsed = start.elapsed();

    if args.verbose {
        eprintln!("Decompression complete:");
        eprintln!("  Output bytes:     {}", total);
        eprintln!("  Time:             {:.2?}", elapsed);
        eprintln!("  Throughput:       {:.1} MB/s", total as f64 / elapsed.as_secs_f64() / 1_000_000.0);
    }

    Ok(EXIT_OK)
}
