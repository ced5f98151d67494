//! The decompile command: file and directory handling around the core

use anyhow::{Context, Result};
use garnet_codegen::{CodeGenOptions, OutputFormat};
use garnet_common::DecompileStats;
use garnet_decompiler::Decompiler;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Decompile one file or every class file under a directory
pub fn execute(
    input: &Path,
    output: Option<&Path>,
    options: CodeGenOptions,
    optimize: bool,
    print_stats: bool,
) -> Result<()> {
    let inputs = collect_inputs(input)?;
    if inputs.is_empty() {
        anyhow::bail!("no class files found under {}", input.display());
    }

    if let Some(output) = output {
        fs::create_dir_all(output)
            .with_context(|| format!("creating output directory {}", output.display()))?;
    }

    let extension = match options.format {
        OutputFormat::Java => "java",
        OutputFormat::Pseudocode => "txt",
        OutputFormat::JsonAst => "json",
    };

    // Each class gets its own Decompiler instance; the core stays
    // single-threaded per class
    let mut totals = DecompileStats::new();
    let mut first_error = None;
    for path in &inputs {
        log::info!("decompiling {}", path.display());
        let bytes =
            fs::read(path).with_context(|| format!("reading {}", path.display()))?;

        let decompiler = Decompiler::with_options(options.clone(), optimize);
        let result = match decompiler.decompile_class(&bytes) {
            Ok(result) => result,
            Err(error) => {
                log::error!("{}: {}", path.display(), error);
                if first_error.is_none() {
                    first_error = Some(error);
                }
                continue;
            }
        };

        for diagnostic in result.diagnostics.iter() {
            log::warn!("{}: {}", path.display(), diagnostic);
        }

        match output {
            Some(output) => {
                let file_name = format!("{}.{}", result.ast.simple_name(), extension);
                let target = output.join(file_name);
                fs::write(&target, &result.source)
                    .with_context(|| format!("writing {}", target.display()))?;
                log::info!("wrote {}", target.display());
            }
            None => println!("{}", result.source),
        }
        totals.merge(&result.stats);
    }

    if print_stats {
        eprintln!("{}", totals);
    }
    match first_error {
        // A single bad input fails the run; in a directory sweep, one
        // decompiled class is enough for a zero exit
        Some(error) if inputs.len() == 1 || totals.methods_processed == 0 => Err(error.into()),
        _ => Ok(()),
    }
}

fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("input {} does not exist", input.display());
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(input) {
        let entry = entry.context("walking input directory")?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|e| e == "class")
        {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}
