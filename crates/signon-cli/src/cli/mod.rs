//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use signon_core::config;
use signon_core::state::{ChannelKind, FlowIntent};
use signon_core::{interrupt, logging};

mod commands;

#[derive(Parser)]
#[command(name = "signon")]
#[command(version = "0.2")]
#[command(about = "Sign-in and account CLI for the signon identity service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Common channel argument for commands that run the credential flow.
#[derive(clap::Args, Debug, Clone, Default)]
struct ChannelArgs {
    /// Credential channel to sign in over
    #[arg(long, value_enum, default_value_t = ChannelArg::Email)]
    channel: ChannelArg,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default)]
enum ChannelArg {
    #[default]
    Email,
    Phone,
}

impl From<ChannelArg> for ChannelKind {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Email => ChannelKind::Email,
            ChannelArg::Phone => ChannelKind::Phone,
        }
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in to an existing account
    Login {
        #[command(flatten)]
        channel_args: ChannelArgs,

        /// Sign in through the federated browser flow instead
        #[arg(long, conflicts_with = "channel")]
        federated: bool,
    },

    /// Create a new account
    Signup {
        #[command(flatten)]
        channel_args: ChannelArgs,
    },

    /// Link an email address to the signed-in account
    LinkEmail {
        /// Address to link
        #[arg(value_name = "ADDRESS")]
        address: String,
    },

    /// Sign out (clear the cached session)
    Logout,

    /// Show the current session state
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Write the config template (preserves existing values)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    interrupt::init();

    let _log_guard = logging::init().context("init logging")?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    // default to interactive login
    let Some(command) = cli.command else {
        return commands::auth::interactive(&config, FlowIntent::Login, ChannelKind::Email).await;
    };

    match command {
        Commands::Login {
            channel_args,
            federated,
        } => {
            if federated {
                commands::auth::federated(&config).await
            } else {
                commands::auth::interactive(&config, FlowIntent::Login, channel_args.channel.into())
                    .await
            }
        }

        Commands::Signup { channel_args } => {
            commands::auth::interactive(&config, FlowIntent::SignUp, channel_args.channel.into())
                .await
        }

        Commands::LinkEmail { address } => commands::link::run(&config, &address).await,

        Commands::Logout => commands::auth::logout(),

        Commands::Status => commands::status::run(&config).await,

        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
