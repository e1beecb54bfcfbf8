use std::path::PathBuf;
use std::process;

use clap::Parser;
use dwarfck_core::loader;
use dwarfck_core::verifier::{Verifier, VerifierOptions};
use dwarfck_utils::{error, info, init_logging, LogConfig, LogFormat, LogLevel};

/// Exit status when the debug information has errors
const EXIT_ERRORS: i32 = 1;
/// Exit status when the file could not be loaded
const EXIT_LOAD_FAILED: i32 = 2;

/// Checks that the DWARF debug information in a binary is well-formed.
#[derive(Parser, Debug)]
#[command(name = "dwarfck")]
#[command(version)]
#[command(about = "Checks that the DWARF debug information in a binary is well-formed", long_about = None)]
struct Cli
{
    /// Object file, executable or shared library to verify
    file: PathBuf,

    /// Print a detail line for every error
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Print per-category error counts
    #[arg(long, default_value_t = false)]
    summary: bool,

    /// Write the error summary as JSON to this path
    #[arg(long, value_name = "PATH")]
    json_summary: Option<PathBuf>,

    /// Verify units one at a time
    #[arg(long, default_value_t = false)]
    no_parallel: bool,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Log format (pretty or json); overrides DWARFCK_LOG_FORMAT
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli
{
    fn verifier_options(&self) -> VerifierOptions
    {
        VerifierOptions {
            show_detail: self.verbose,
            show_aggregate_errors: self.summary,
            json_summary: self.json_summary.clone(),
            parallel: !self.no_parallel,
        }
    }
}

fn main()
{
    let cli = Cli::parse();

    let config = LogConfig::from_env()
        .with_level(cli.log_level)
        .with_format(cli.log_format);
    let log_guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(EXIT_LOAD_FAILED);
        }
    };

    let code = run(&cli);
    // Flush the log file before exiting
    drop(log_guard);
    process::exit(code);
}

fn run(cli: &Cli) -> i32
{
    let data = match loader::load_file(&cli.file) {
        Ok(data) => data,
        Err(e) => {
            error!(path = %cli.file.display(), error = %e, "cannot load debug information");
            eprintln!("error: {}: {e}", cli.file.display());
            return EXIT_LOAD_FAILED;
        }
    };
    info!(path = %cli.file.display(), units = data.units.len(), "verifying");

    let verifier = Verifier::new(&data, cli.verifier_options());
    println!("Verifying {}", cli.file.display());

    println!("Verifying .debug_abbrev...");
    verifier.handle_debug_abbrev();
    println!("Verifying .debug_info Unit Header Chain...");
    verifier.handle_debug_info();
    println!("Verifying .debug_cu_index...");
    verifier.handle_debug_cu_index();
    println!("Verifying .debug_tu_index...");
    verifier.handle_debug_tu_index();
    println!("Verifying .debug_line...");
    verifier.handle_debug_line();
    println!("Verifying accelerator tables...");
    verifier.handle_accel_tables();
    println!("Verifying .debug_str_offsets...");
    verifier.handle_debug_str_offsets();

    match verifier.summarize() {
        Ok(summary) => {
            println!("{summary}");
            if summary.is_clean() {
                0
            } else {
                EXIT_ERRORS
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_LOAD_FAILED
        }
    }
}
