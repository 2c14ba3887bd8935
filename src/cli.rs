//! `sdc-unpack` command line

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use crate::error::{ErrorKind, SdcError};
use crate::logging;
use crate::sdc::{self, EntryStatus, Policy, Progress, UnpackOptions, PROGRESS_STEPS};

/// Exit status for command line usage errors (sysexits EX_USAGE)
pub const EXIT_USAGE: u8 = 64;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "sdc-unpack",
    version = env!("CARGO_PKG_VERSION"),
    about = "Unpack an encrypted SDC download container",
    long_about = None
)]
pub struct Cli {
    /// Container to unpack; its keys are read from CONTAINER.key
    pub container: PathBuf,

    /// Continue past structure and checksum mismatches
    #[arg(short, long)]
    pub force: bool,

    /// Log header, checksum and per-entry details
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write the decoded header to FILE
    #[arg(short = 'H', long = "header-out", value_name = "FILE")]
    pub header_out: Option<PathBuf>,

    /// Key file (default: CONTAINER.key)
    #[arg(short, long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// Output directory (default: the container's directory)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Skip entries that are truncated or cannot be written
    #[arg(long)]
    pub skip_bad_entries: bool,

    /// Extract entries in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Do not restore file access and modification times
    #[arg(long)]
    pub no_times: bool,

    /// List entries without extracting
    #[arg(long)]
    pub list: bool,

    /// Print the listing or unpack report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn options(&self) -> UnpackOptions {
        let mut policy = if self.force {
            Policy::forced()
        } else {
            Policy::strict()
        };
        if self.skip_bad_entries {
            policy = policy.skipping_bad_entries();
        }
        UnpackOptions {
            policy,
            verbose: self.verbose,
            key_path: self.key.clone(),
            output_dir: self.output.clone(),
            header_sink: self.header_out.clone(),
            parallel: self.parallel,
            preserve_times: !self.no_times,
        }
    }
}

/// Process exit status for a failed run.
///
/// Each kind owns one status; the OS error code of an I/O failure is logged
/// with the error instead, so it never aliases another kind.
pub fn exit_code(err: &SdcError) -> u8 {
    match err.kind() {
        ErrorKind::Format => 2,
        ErrorKind::Decrypt => 3,
        ErrorKind::Integrity => 4,
        ErrorKind::Io => 5,
        ErrorKind::TruncatedStream => 6,
    }
}

/// Parse arguments, set up logging and run
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    logging::init(cli.verbose);

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.os_error() {
                Some(os_error) => error!(os_error, "{e}"),
                None => error!("{e}"),
            }
            ExitCode::from(exit_code(&e))
        }
    }
}

fn execute(cli: &Cli) -> Result<(), SdcError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.list {
        let info = sdc::inspect(&cli.container, cli.key.as_deref())?;
        if cli.json {
            print_json(&mut out, &info)?;
        } else {
            for entry in &info.entries {
                writeln!(
                    out,
                    "{:>12}  {:>19}  {}",
                    entry.uncompressed_size,
                    entry.modified.as_deref().unwrap_or("-"),
                    entry.name
                )
                .map_err(stdout_error)?;
            }
            if !info.checksum.matches {
                writeln!(
                    out,
                    "warning: checksum mismatch (expected 0x{:08X}, computed 0x{:08X})",
                    info.checksum.expected, info.checksum.computed
                )
                .map_err(stdout_error)?;
            }
        }
        return Ok(());
    }

    let options = cli.options();
    let show_progress = !cli.json;
    let report = sdc::unpack_with_progress(&cli.container, &options, |progress| {
        if show_progress {
            draw_progress(progress);
        }
    })?;

    if cli.json {
        print_json(&mut out, &report)?;
    } else {
        for entry in &report.entries {
            match &entry.status {
                EntryStatus::Extracted { bytes } => {
                    writeln!(out, "extracted  {} ({bytes} bytes)", entry.path)
                }
                EntryStatus::Skipped { reason } => {
                    writeln!(out, "skipped    {}: {reason}", entry.name)
                }
            }
            .map_err(stdout_error)?;
        }
    }
    Ok(())
}

/// One line per entry on stderr, a dot per progress step
fn draw_progress(progress: &Progress) {
    let mut err = io::stderr().lock();
    let _ = match progress.step {
        0 => write!(err, "[{}/{}] ", progress.entry_index + 1, progress.entry_count),
        PROGRESS_STEPS => writeln!(err, "."),
        _ => write!(err, "."),
    };
}

fn print_json<T: serde::Serialize>(out: &mut impl Write, value: &T) -> Result<(), SdcError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| SdcError::io("serializing report", io::Error::other(e)))?;
    writeln!(out, "{text}").map_err(stdout_error)
}

fn stdout_error(e: io::Error) -> SdcError {
    SdcError::io("writing to stdout", e)
}
