//! CLI command implementations

pub mod args;
pub mod serve;
pub mod status;

use crate::cli::args::{Cli, Command, ConfigArgs, ConfigCommand};
use crate::config::{ConfigManager, ConfigValidator};
use clap::CommandFactory;
use clap_complete::Shell;
use std::io::Write;

/// Expand tilde in path
pub fn expand_path(path: &str) -> String {
    shellexpand::tilde(path).to_string()
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.into_command() {
        Command::Serve(args) => serve::run(args).await,
        Command::Status(args) => status::run(args).await,
        Command::Config(args) => config_command(args).await,
        Command::Completions { shell } => {
            write_completions(shell, &mut std::io::stdout());
            Ok(())
        }
    }
}

pub fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, out);
}

async fn config_command(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = ConfigManager::new(args.config.as_deref()).load()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommand::Schema => {
            println!("{}", ConfigValidator::new().export_schema());
        }
        ConfigCommand::Validate { path } => {
            let content = tokio::fs::read_to_string(expand_path(&path)).await?;
            match ConfigValidator::new().validate_toml(&content) {
                Ok(()) => println!("{}: OK", path),
                Err(errors) => {
                    for error in &errors {
                        eprintln!("{}", error);
                    }
                    anyhow::bail!("{} has {} problem(s)", path, errors.len());
                }
            }
        }
    }
    Ok(())
}
