//! bfb - command line driver for the bfbridge execution bridge
//!
//! Runs programs on the native engine, packs and unpacks stored programs,
//! and demonstrates the free handshake with a memory check.

use anyhow::{bail, Context, Result};
use bfbridge::adapter::{programs, U8Adder};
use bfbridge::codec;
use bfbridge::diagnostics::{self, MemoryReport};
use bfbridge::{Bridge, BridgeConfig, BridgeError, CancelToken};
use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Tripped by SIGINT so an in-flight wait can be abandoned
static INTERRUPT: Lazy<CancelToken> = Lazy::new(CancelToken::new);

#[derive(Parser)]
#[command(name = "bfb")]
#[command(version)]
#[command(about = "Run tape-machine programs on a dynamically loaded native engine", long_about = None)]
struct Cli {
    /// Path to bfbridge.toml (searched upward from the working directory by default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add two numbers in 0..=255 on the engine
    Add {
        a: u32,
        b: u32,
    },

    /// Run the program many times with and without freeing, report memory
    Memcheck {
        /// Calls per batch
        #[arg(short, long, default_value = "2048")]
        iterations: usize,
    },

    /// Compress a program file
    Pack {
        /// Plain program file
        source: PathBuf,

        /// Output file (default: SOURCE with a .gif extension)
        target: Option<PathBuf>,
    },

    /// Execute a program
    Run {
        /// Program text
        #[arg(conflicts_with = "file")]
        program: Option<String>,

        /// Read the program from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// The program file is packed (see `bfb pack`)
        #[arg(long, requires = "file")]
        compressed: bool,

        /// Input bytes, given as text
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read input bytes from a file
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Stop waiting after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Show timing and worker statistics
        #[arg(short, long)]
        stats: bool,
    },

    /// Decompress a packed program file
    Unpack {
        /// Packed program file
        source: PathBuf,

        /// Output file (default: SOURCE with a .bf extension)
        target: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Add { a, b } => cmd_add(cli.config.as_deref(), a, b),
        Commands::Memcheck { iterations } => cmd_memcheck(cli.config.as_deref(), iterations),
        Commands::Pack { source, target } => cmd_pack(&source, target.as_deref()),
        Commands::Run {
            program,
            file,
            compressed,
            input,
            input_file,
            timeout_ms,
            stats,
        } => {
            let program = read_program(program, file, compressed)?;
            let input = read_input(input, input_file)?;
            cmd_run(
                cli.config.as_deref(),
                &program,
                &input,
                timeout_ms.map(Duration::from_millis),
                stats,
            )
        }
        Commands::Unpack { source, target } => cmd_unpack(&source, target.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "bfbridge=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => BridgeConfig::load_from_cwd().context("Failed to load bfbridge.toml"),
    }
}

fn open_bridge(config: Option<&Path>) -> Result<Bridge> {
    let config = load_config(config)?;
    Ok(Bridge::from_config(&config)?)
}

fn read_program(
    inline: Option<String>,
    file: Option<PathBuf>,
    compressed: bool,
) -> Result<Vec<u8>> {
    match (inline, file) {
        (Some(program), None) => Ok(program.into_bytes()),
        (None, Some(path)) if compressed => codec::load_program(&path)
            .with_context(|| format!("Failed to unpack {}", path.display())),
        (None, Some(path)) => {
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
        }
        _ => bail!("Provide a program or --file"),
    }
}

fn read_input(inline: Option<String>, file: Option<PathBuf>) -> Result<Vec<u8>> {
    match (inline, file) {
        (Some(text), _) => Ok(text.into_bytes()),
        (None, Some(path)) => {
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
        }
        (None, None) => Ok(Vec::new()),
    }
}

fn cmd_run(
    config: Option<&Path>,
    program: &[u8],
    input: &[u8],
    timeout: Option<Duration>,
    show_stats: bool,
) -> Result<()> {
    // Only `run` hands SIGINT to the token; other commands keep the default
    install_interrupt_handler()?;
    let bridge = open_bridge(config)?;
    let start = Instant::now();

    let pending = bridge.submit(program, input)?;
    let poll = Duration::from_millis(50);
    let result = match timeout {
        Some(timeout) => pending.wait_cancellable_timeout(&INTERRUPT, poll, timeout),
        None => pending.wait_cancellable(&INTERRUPT, poll),
    };
    let elapsed = start.elapsed();

    let result = match result {
        Ok(result) => result,
        Err(BridgeError::Cancelled) => {
            // The worker may still be inside the engine; don't wait for it
            eprintln!("Cancelled after {:?}", elapsed);
            std::process::exit(130);
        }
        Err(e) => return Err(e.into()),
    };

    let output = result.into_output().context("Program failed")?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&output)?;
    stdout.flush()?;

    if show_stats {
        let stats = bridge.worker_stats();
        eprintln!("\nStatistics:");
        eprintln!("  Output: {} bytes", output.len());
        eprintln!("  Time: {:?}", elapsed);
        eprintln!(
            "  Worker: {} submitted, {} completed",
            stats.submitted, stats.completed
        );
    }
    Ok(())
}

fn cmd_add(config: Option<&Path>, a: u32, b: u32) -> Result<()> {
    let bridge = open_bridge(config)?;
    let sum = U8Adder::new(&bridge).add(a, b)?;
    println!("{:3} + {:3} = {:3}", a, b, sum);
    Ok(())
}

fn cmd_memcheck(config: Option<&Path>, iterations: usize) -> Result<()> {
    let bridge = open_bridge(config)?;
    let check = diagnostics::memory_check(&bridge, programs::COUNTDOWN, iterations)?;

    println!("Demonstration of the free handshake");
    println!("{}", "=".repeat(60));
    println!(
        "{} calls, {} bytes of output per call",
        check.iterations, check.output_len
    );
    print_report("with freeing", &check.freed, 0);
    print_report("without freeing", &check.leaked, check.leaked.expected_kb);
    Ok(())
}

fn print_report(label: &str, report: &MemoryReport, expected_kb: u64) {
    println!("\nPeak resident memory {} (KB)", label);
    println!("{}", "=".repeat(60));
    println!("before:   {}", report.before_kb);
    println!("after:    {}", report.after_kb);
    println!("diff:     {}", report.growth_kb());
    println!("expected: ~{}", expected_kb);
}

fn cmd_pack(source: &Path, target: Option<&Path>) -> Result<()> {
    let written = codec::compress_file(source, target)
        .with_context(|| format!("Failed to pack {}", source.display()))?;
    println!("Wrote {}", written.display());
    Ok(())
}

fn cmd_unpack(source: &Path, target: Option<&Path>) -> Result<()> {
    let written = codec::decompress_file(source, target)
        .with_context(|| format!("Failed to unpack {}", source.display()))?;
    println!("Wrote {}", written.display());
    Ok(())
}

#[cfg(unix)]
fn install_interrupt_handler() -> Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    extern "C" fn on_sigint(_: libc::c_int) {
        INTERRUPT.cancel();
    }

    // Initialise before the handler can run; the handler only stores a flag
    Lazy::force(&INTERRUPT);
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // Safety: the handler does a single atomic store
    unsafe { sigaction(Signal::SIGINT, &action) }.context("Failed to install SIGINT handler")?;
    Ok(())
}

#[cfg(not(unix))]
fn install_interrupt_handler() -> Result<()> {
    Ok(())
}
