//! Garnet class-file decompiler command-line interface
//!
//! Takes a `.class` file or a directory tree of them, decompiles each class,
//! and writes the result to an output directory (or stdout).

use clap::Parser;
use garnet_codegen::{BraceStyle, CodeGenOptions, OutputFormat};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

/// Exit code for malformed input classes
const EXIT_BAD_INPUT: u8 = 3;
/// Exit code for internal failures
const EXIT_INTERNAL: u8 = 4;

/// Decompile JVM class files back to source
#[derive(Parser)]
#[command(name = "garnet")]
#[command(about = "A class-file decompiler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// A .class file or a directory scanned recursively for class files
    input: PathBuf,

    /// Directory for the decompiled output; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "java", value_parser = ["java", "pseudocode", "json-ast"])]
    format: String,

    /// Skip the optimization passes
    #[arg(long)]
    no_optimize: bool,

    /// Spaces per indent level
    #[arg(long, default_value_t = 4)]
    indent: usize,

    /// Indent with tabs instead of spaces
    #[arg(long)]
    tabs: bool,

    /// Brace placement
    #[arg(long, default_value = "same-line", value_parser = ["same-line", "next-line"])]
    brace_style: String,

    /// Print aggregate statistics after decompilation
    #[arg(long)]
    stats: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let options = CodeGenOptions {
        indent_size: cli.indent,
        use_tabs: cli.tabs,
        max_line_length: 120,
        brace_style: match cli.brace_style.as_str() {
            "next-line" => BraceStyle::NextLine,
            _ => BraceStyle::SameLine,
        },
        format: match cli.format.as_str() {
            "pseudocode" => OutputFormat::Pseudocode,
            "json-ast" => OutputFormat::JsonAst,
            _ => OutputFormat::Java,
        },
    };

    match commands::decompile::execute(
        &cli.input,
        cli.output.as_deref(),
        options,
        !cli.no_optimize,
        cli.stats,
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{:#}", error);
            match error.downcast_ref::<garnet_common::GarnetError>() {
                Some(garnet_common::GarnetError::Internal { .. })
                | Some(garnet_common::GarnetError::Unimplemented { .. }) => {
                    ExitCode::from(EXIT_INTERNAL)
                }
                _ => ExitCode::from(EXIT_BAD_INPUT),
            }
        }
    }
}
