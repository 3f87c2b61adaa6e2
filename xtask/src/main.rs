use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use fs_err as fs;
use std::process::Command as ProcessCommand;

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Workspace helper tasks")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print schema identifiers used by sapstate output.
    PrintSchemas,
    /// Write a sapstate.toml with every setting at its default.
    InitConfig {
        #[arg(long, default_value = sapstate_cli::config::CONFIG_FILE_NAME)]
        path: Utf8PathBuf,
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Run the cucumber acceptance suite.
    Acceptance,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::PrintSchemas => {
            println!("{}", sapstate_types::schema::SAPSTATE_RESULT_V1);
            println!("{}", sapstate_types::schema::SAPSTATE_CONTROL_V1);
        }
        Command::InitConfig { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{path} already exists (use --force to replace it)");
            }
            let text = sapstate_cli::config::sample_config()?;
            fs::write(&path, text).with_context(|| format!("write {path}"))?;
            println!("wrote {path}");
        }
        Command::Acceptance => {
            let status = ProcessCommand::new("cargo")
                .args(["test", "-p", "sapstate-bdd", "--test", "cucumber"])
                .status()
                .context("run cucumber suite")?;
            if !status.success() {
                anyhow::bail!("acceptance suite failed");
            }
        }
    }
    Ok(())
}
