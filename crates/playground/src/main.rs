//! `playground`: spin up Ethereum testbeds from recipes.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use playground_manifest::LogLevel;
use std::path::PathBuf;

mod commands;
mod logging;
mod signals;
mod tables;

#[derive(Parser)]
#[command(name = "playground")]
#[command(about = "Builder Playground - local Ethereum testbeds")]
#[command(version)]
struct Cli {
    /// Log level of the CLI and of the launched services
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate artifacts and run a recipe until interrupted
    Start(StartArgs),

    /// Tear down a session from its output directory
    Stop {
        /// Session directory holding manifest.json
        dir: PathBuf,

        /// Keep compose volumes
        #[arg(long)]
        keep_volumes: bool,
    },

    /// Apply a recipe and validate the manifest without running it
    Validate {
        /// Built-in recipe name or YAML recipe file
        recipe: String,

        /// Recipe flag as key=value
        #[arg(long = "flag", value_name = "KEY=VALUE")]
        flags: Vec<String>,
    },

    /// List the built-in recipes
    List,
}

/// Options of `playground start`
#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Built-in recipe name or YAML recipe file
    pub recipe: String,

    /// Session directory (defaults to <home>/devnet)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Recipe flag as key=value
    #[arg(long = "flag", value_name = "KEY=VALUE")]
    pub flags: Vec<String>,

    /// Seconds between now and L1 genesis
    #[arg(long)]
    pub genesis_delay: Option<u64>,

    /// L1 block time in seconds
    #[arg(long)]
    pub block_time: Option<u64>,

    /// Activate the newest L1 fork at genesis
    #[arg(long)]
    pub latest_fork: bool,

    /// Publish ports on 127.0.0.1 only
    #[arg(long)]
    pub bind_locally: bool,

    /// Keep compose volumes on teardown
    #[arg(long)]
    pub keep_volumes: bool,

    /// Stop after writing the manifest and the compose file
    #[arg(long)]
    pub dry_run: bool,

    /// Extra hex private key to prefund
    #[arg(long = "prefund", value_name = "HEX_KEY")]
    pub prefund: Vec<String>,

    /// Add a transaction injector targeting the execution client
    #[arg(long)]
    pub contender: bool,

    /// Extra argument passed to the transaction injector
    #[arg(long = "contender-arg", value_name = "ARG")]
    pub contender_args: Vec<String>,

    /// Image platform, e.g. linux/amd64
    #[arg(long)]
    pub platform: Option<String>,

    /// Run service watchdogs once the session is ready
    #[arg(long)]
    pub watchdog: bool,
}

fn main() -> Result<()> {
    let Cli { log_level, command } = Cli::parse();
    logging::init(log_level);

    smol::block_on(async move {
        match command {
            Commands::Start(args) => commands::start::run(args, log_level).await,
            Commands::Stop { dir, keep_volumes } => commands::stop::run(&dir, keep_volumes).await,
            Commands::Validate { recipe, flags } => commands::validate::run(&recipe, &flags).await,
            Commands::List => commands::list::run(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        let cli = Cli::try_parse_from([
            "playground",
            "start",
            "opstack",
            "--flag",
            "block-time=1",
            "--flag",
            "external-builder=http://host.docker.internal:4444",
            "--bind-locally",
            "--prefund",
            "0xabc",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.log_level, LogLevel::Debug);
        let Commands::Start(args) = cli.command else {
            panic!("expected start");
        };
        assert_eq!(args.recipe, "opstack");
        assert_eq!(args.flags, vec!["block-time=1", "external-builder=http://host.docker.internal:4444"]);
        assert!(args.bind_locally);
        assert!(!args.dry_run);
        assert_eq!(args.prefund, vec!["0xabc"]);
    }

    #[test]
    fn test_parse_stop() {
        let cli = Cli::try_parse_from(["playground", "stop", "/tmp/devnet", "--keep-volumes"]).unwrap();
        assert!(matches!(cli.command, Commands::Stop { ref dir, keep_volumes: true } if dir == &PathBuf::from("/tmp/devnet")));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["playground", "--log-level", "loud", "list"]).is_err());
    }
}
