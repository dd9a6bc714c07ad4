use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::model::DataSourceCode;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// SQLite database holding users, books and run config.
    #[arg(long, global = true, env = "SHELFWATCH_DATABASE", default_value = "shelfwatch.db")]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scrape on a fixed interval until interrupted.
    Serve(ServeArgs),
    /// Run a single scrape and print its summary.
    RunOnce(RunArgs),
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Forget every tracked book and put every user back into onboarding.
    ResetUsers,
    Source {
        #[command(subcommand)]
        command: SourceCommand,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Log messages instead of sending them to Discord.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Seconds between the start of consecutive runs.
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_secs: u64,
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Start tracking a chat user.
    Add(UserSourceArgs),
    /// Stop tracking a chat user and drop their books.
    Remove(ChatUserArgs),
    /// Point a user at a different source account; they go through onboarding again.
    ChangeSource(UserSourceArgs),
    /// Drop a user's tracked books.
    Reset(ChatUserArgs),
    /// Print every user with their currently tracked books.
    List,
}

#[derive(Debug, Args)]
pub struct ChatUserArgs {
    /// Discord user id.
    pub chat_user_id: String,
}

#[derive(Debug, Args)]
pub struct UserSourceArgs {
    /// Discord user id.
    pub chat_user_id: String,

    /// goodreads or storygraph.
    #[arg(value_parser = parse_source)]
    pub source: DataSourceCode,

    /// Account id on the source site.
    pub source_user_id: String,
}

#[derive(Debug, Subcommand)]
pub enum SourceCommand {
    Enable(SourceArgs),
    Disable(SourceArgs),
    /// Flip the enabled flag and print the new value.
    Toggle(SourceArgs),
    /// Print whether each source is enabled.
    Status,
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    #[arg(value_parser = parse_source)]
    pub source: DataSourceCode,
}

fn parse_source(raw: &str) -> Result<DataSourceCode, String> {
    DataSourceCode::parse(raw).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_user_add() {
        let cli = Cli::try_parse_from([
            "shelfwatch",
            "--database",
            "books.db",
            "user",
            "add",
            "42",
            "Goodreads",
            "1234",
        ])
        .unwrap();
        assert_eq!(cli.database, PathBuf::from("books.db"));
        match cli.command {
            Command::User {
                command: UserCommand::Add(args),
            } => {
                assert_eq!(args.source, DataSourceCode::Goodreads);
                assert_eq!(args.source_user_id, "1234");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_source_and_zero_interval() {
        assert!(Cli::try_parse_from(["shelfwatch", "source", "toggle", "librarything"]).is_err());
        assert!(Cli::try_parse_from(["shelfwatch", "serve", "--interval-secs", "0"]).is_err());
    }
}
