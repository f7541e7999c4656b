//! pamgate CLI - inspect configuration and exercise the authentication gateway.

mod commands;
mod ui;

use std::net::IpAddr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "pamgate")]
#[command(about = "pamgate - PAM-backed authentication gateway")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the configuration file
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },

    /// Check whether an address may attempt to log in
    Whitelist {
        #[command(subcommand)]
        action: WhitelistCommands,
    },

    /// Run one authentication attempt through the gateway
    Login {
        /// Username to authenticate
        #[arg(short, long)]
        username: String,

        /// Origin address the attempt comes from
        #[arg(long, default_value = "127.0.0.1")]
        origin: IpAddr,

        /// Use the key-management gateway instead of form login
        #[arg(long)]
        key_management: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show effective configuration
    Show,

    /// Validate configuration
    Validate,

    /// Print the config file path
    Path,
}

#[derive(Subcommand)]
enum WhitelistCommands {
    /// Check an address against a whitelist
    Check {
        /// Address to check
        addr: IpAddr,

        /// Use the key-management whitelist instead of form login
        #[arg(long)]
        key_management: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Config { action } => {
            let action = match action {
                Some(ConfigCommands::Show) | None => commands::config::ConfigAction::Show,
                Some(ConfigCommands::Validate) => commands::config::ConfigAction::Validate,
                Some(ConfigCommands::Path) => commands::config::ConfigAction::Path,
            };
            commands::run_config(commands::config::ConfigArgs { action })?;
        }

        Commands::Whitelist { action } => match action {
            WhitelistCommands::Check {
                addr,
                key_management,
            } => {
                let args = commands::whitelist::WhitelistArgs {
                    addr,
                    key_management,
                };
                if !commands::run_whitelist(&args)? {
                    std::process::exit(1);
                }
            }
        },

        Commands::Login {
            username,
            origin,
            key_management,
        } => {
            let args = commands::login::LoginArgs {
                username,
                origin,
                key_management,
            };
            if !commands::run_login(args).await? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
