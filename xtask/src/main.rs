// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::path::PathBuf;
use std::process::Command as Process;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Repo maintenance tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the test suite, optionally under coverage.
    Test {
        /// Restrict to tests matching these filters.
        filters: Vec<String>,

        /// Collect line coverage and write an HTML report.
        #[arg(long)]
        coverage: bool,

        /// Coverage without the workspace-only restriction.
        #[arg(long)]
        coverall: bool,
    },
    /// Generate the JSON Schema for the server configuration.
    Schema {
        /// Output directory.
        #[arg(long, default_value = "contracts/schemas")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Test {
            filters,
            coverage,
            coverall,
        } => test(filters, coverage, coverall),
        Command::Schema { out_dir } => schema(out_dir),
    }
}

fn test(filters: Vec<String>, coverage: bool, coverall: bool) -> Result<()> {
    let mut cmd = Process::new("cargo");

    if coverage || coverall {
        cmd.args(["llvm-cov", "--html"]);
        if !coverall {
            cmd.arg("--workspace");
        }
    } else {
        cmd.args(["test", "--workspace"]);
    }

    for filter in &filters {
        cmd.arg(filter);
    }

    let status = cmd.status().context("run cargo")?;
    if !status.success() {
        bail!("test run failed: {status}");
    }
    Ok(())
}

fn schema(out_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&out_dir).context("create schema output dir")?;

    let config = schema_for!(mt_config::ServerConfig);
    let path = out_dir.join("server_config.schema.json");
    let s = serde_json::to_string_pretty(&config)?;
    std::fs::write(&path, s).with_context(|| format!("write {}", path.display()))?;

    eprintln!("wrote schema to {}", path.display());
    Ok(())
}
