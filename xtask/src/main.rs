use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use zsm_console::cli::Cli;

#[derive(Parser)]
#[command(name = "xtask")]
struct Xtask {
    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Regenerate docs/cli.md from the clap definitions
    GenDocs {
        /// Where to write the reference
        #[arg(long, default_value = "docs/cli.md")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    match Xtask::parse().command {
        Task::GenDocs { out } => gen_docs(&out),
    }
}

fn gen_docs(out: &Path) -> Result<()> {
    let markdown = clap_markdown::help_markdown::<Cli>();
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(out, markdown).with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Wrote {}", out.display());
    Ok(())
}
