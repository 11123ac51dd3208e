//! Tunebay study runner
//!
//! Runs the Bayesian optimization study described by a TOML file and
//! prints a one-line JSON summary on stdout. Logs go to stderr.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tb-optimize")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Bayesian hyperparameter optimization with parallel trial evaluation",
    long_about = None
)]
struct Cli {
    /// Study file (TOML) with [study], [runner] and [space.*] tables
    #[arg(short, long)]
    config: PathBuf,

    /// Artifact path, overriding study.output_path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tb_optimize=info,tb_optimizer=info,tb_runner=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if !cli.config.exists() {
        anyhow::bail!("config not found: {}", cli.config.display());
    }

    let run = tb_runner::run_study_file(&cli.config, cli.output.as_deref())?;
    println!("{}", run.summary());
    Ok(())
}
