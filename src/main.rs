use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use shelfwatch::cli::{Cli, Command};
use shelfwatch::commands;

#[tokio::main]
async fn main() -> ExitCode {
    match try_main().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn try_main() -> anyhow::Result<ExitCode> {
    shelfwatch::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let database = cli.database.as_path();
    match cli.command {
        Command::Serve(args) => {
            commands::serve(database, args).await.context("serve")?;
        }
        Command::RunOnce(args) => {
            return commands::run_once(database, args).await.context("run once");
        }
        Command::User { command } => {
            commands::user(database, command).await.context("user")?;
        }
        Command::ResetUsers => {
            commands::reset_users(database).await.context("reset users")?;
        }
        Command::Source { command } => {
            commands::source(database, command).await.context("source")?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
