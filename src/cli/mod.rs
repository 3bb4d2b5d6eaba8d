pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::client::TransportFactory;
use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(version)]
#[command(about = "Run commands anywhere through one interface")]
#[command(long_about = "Connect to a local shell, SSH host, Docker container or Kubernetes pod, \
run code or named actions, and get one normalized reply back.\n\n\
CONN is a named connection from the config file, inline JSON such as \
'{\"type\":\"docker\",\"container\":\"web\"}', or a URI: local, ssh://[user@]host[:port], \
docker://container, kubectl://[namespace/]pod[/container].")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer JSON-lines requests on stdin/stdout
    Serve,

    /// Test a connection, optionally running setup
    Connect {
        /// Connection name, JSON descriptor or URI
        conn: String,

        /// Prepare the environment after connecting
        #[arg(long)]
        setup: bool,

        /// Extra JSON data echoed back in the reply
        #[arg(long)]
        data: Option<String>,
    },

    /// Execute code in the target environment
    Exec {
        /// Connection name, JSON descriptor or URI
        conn: String,

        /// Code to run through the target's shell
        code: String,
    },

    /// Run a named action (ping, status, read_file, ...)
    Action {
        /// Connection name, JSON descriptor or URI
        conn: String,

        /// Action type
        #[arg(value_name = "TYPE")]
        action: String,

        /// Action data as JSON
        #[arg(long)]
        data: Option<String>,
    },

    /// Show environment information
    Info {
        /// Connection name, JSON descriptor or URI
        conn: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Print the configuration file path
    Path,
}

impl Cli {
    pub async fn execute(self) -> Result<ExitCode> {
        if let Commands::Config { command } = self.command {
            return match command {
                ConfigCommands::Show => commands::config::show().await,
                ConfigCommands::Set { key, value } => commands::config::set(key, value).await,
                ConfigCommands::Path => commands::config::path().await,
            }
            .map(|_| ExitCode::SUCCESS);
        }

        let config = AppConfig::load()?;
        let dispatcher = Dispatcher::new(TransportFactory::new(config.to_transport_defaults()));

        match self.command {
            Commands::Serve => commands::serve::execute(dispatcher)
                .await
                .map(|_| ExitCode::SUCCESS),
            Commands::Connect { conn, setup, data } => {
                commands::request::connect(&config, &dispatcher, &conn, setup, data).await
            }
            Commands::Exec { conn, code } => {
                commands::request::exec(&config, &dispatcher, &conn, code).await
            }
            Commands::Action { conn, action, data } => {
                commands::request::action(&config, &dispatcher, &conn, action, data).await
            }
            Commands::Info { conn } => commands::request::info(&config, &dispatcher, &conn).await,
            Commands::Config { .. } => Ok(ExitCode::SUCCESS),
        }
    }
}
