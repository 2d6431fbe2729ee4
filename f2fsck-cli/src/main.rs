// SPDX-License-Identifier: MIT

mod config;
mod console;
mod info;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use f2fsck::core::report::ReportDisplayOpts;
use f2fsck::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{FileOptions, preen_mode};
use crate::console::LogLevel;

#[derive(Parser)]
#[command(name = "f2fsck", version, about = "Offline F2FS checker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check an image and optionally repair it
    Check(CheckArgs),
    /// Print the superblock and checkpoint summary
    Info {
        /// Image or block device
        image: PathBuf,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Image or block device
    image: PathBuf,

    /// Repair what the check finds
    #[arg(short, long)]
    fix: bool,

    /// Repair only when the image carries an error mark
    #[arg(short = 'a', long = "auto")]
    auto_fix: bool,

    /// Preen level: 0 regular, 1 quick metadata check, 2 full
    #[arg(short, long, value_name = "0|1|2")]
    preen: Option<u8>,

    /// Check even if the image looks clean
    #[arg(long)]
    force: bool,

    /// Compute repairs, don't write them
    #[arg(long)]
    dry_run: bool,

    /// Options file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl CheckArgs {
    /// File options first, then the flags given on the command line.
    fn options(&self) -> anyhow::Result<CheckOptions> {
        let mut opts = match &self.config {
            Some(path) => FileOptions::from_file(path)?.to_options()?,
            None => CheckOptions::default(),
        };
        opts.fix |= self.fix || self.auto_fix;
        opts.auto_fix |= self.auto_fix;
        opts.force |= self.force;
        opts.dry_run |= self.dry_run;
        if let Some(level) = self.preen {
            opts.preen = preen_mode(level)?;
        }
        Ok(opts)
    }
}

fn walk_spinner() -> ProgressBar {
    if console::log_level() != LogLevel::Normal {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message("checking");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn check(args: &CheckArgs) -> anyhow::Result<ExitCode> {
    let opts = args.options()?;
    let writes = opts.writes_enabled();
    log_verbose!("options: {opts:?}");

    let mut file = OpenOptions::new()
        .read(true)
        .write(writes)
        .open(&args.image)?;
    let mut io = StdF2IO::new(&mut file);

    log_info!("checking {}{}", args.image.display(), if writes { "" } else { " (read-only)" });
    let mut sess = CheckSession::open(&mut io, opts)?;
    if sess.run.skip {
        log_info!("{}", "clean image, nothing to do".green());
    }

    let pb = walk_spinner();
    let rep = sess.run();
    pb.finish_and_clear();
    let rep = rep?;

    let min_level = match console::log_level() {
        LogLevel::Verbose => Severity::Info,
        LogLevel::Normal => Severity::Warn,
        LogLevel::Quiet => Severity::Error,
    };
    print!(
        "{}",
        rep.display_with(ReportDisplayOpts {
            min_level,
            prefix: "[f2fsck] ",
            show_summary: console::log_level() != LogLevel::Quiet,
            ..ReportDisplayOpts::default()
        })
    );

    let verdict = if rep.exit.contains(ExitCode::UNCORRECTED) {
        "errors left uncorrected".red().bold()
    } else if rep.exit.contains(ExitCode::ERRORS_CORRECTED) {
        "errors corrected".yellow().bold()
    } else {
        "clean".green().bold()
    };
    log_info!("{}: {verdict}", args.image.display());
    Ok(rep.exit)
}

fn info(image: &Path) -> anyhow::Result<ExitCode> {
    let mut file = OpenOptions::new().read(true).open(image)?;
    let mut io = StdF2IO::new(&mut file);
    info::print_info(&mut io)?;
    Ok(ExitCode::SUCCESS)
}

fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::USAGE } else { ExitCode::SUCCESS };
        }
    };

    let result = match &cli.command {
        Commands::Check(args) => {
            console::init(LogLevel::from_flags(args.verbose, args.quiet));
            check(args)
        }
        Commands::Info { image } => {
            console::init(LogLevel::Normal);
            info(image)
        }
    };

    result.unwrap_or_else(|e| {
        eprintln!("[f2fsck] {}: {e:#}", "error".red().bold());
        ExitCode::OPERATIONAL
    })
}

fn main() {
    std::process::exit(run().bits() as i32);
}
