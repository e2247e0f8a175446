mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stx")]
#[command(about = "OAuth 2.0 token exchange (RFC 8693) with trusted issuer federation")]
#[command(version)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human readable
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Exchange a subject token and print the result
    Exchange {
        /// Gateway configuration file (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Tenant the exchange runs for
        #[arg(short, long)]
        domain: String,

        /// Calling client id
        #[arg(long, default_value = "stx-cli")]
        client: String,

        /// Token to exchange
        #[arg(long)]
        subject_token: String,

        /// Subject token type URN
        #[arg(long, default_value = "urn:ietf:params:oauth:token-type:access_token")]
        subject_token_type: String,

        /// Requested token type URN
        #[arg(long)]
        requested_token_type: Option<String>,
    },
    /// Validate a configuration file and load every PEM trusted issuer
    CheckConfig {
        /// Gateway configuration file (TOML)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    match cli.command {
        Commands::Exchange {
            config,
            domain,
            client,
            subject_token,
            subject_token_type,
            requested_token_type,
        } => {
            let args = commands::ExchangeArgs {
                config,
                domain,
                client,
                subject_token,
                subject_token_type,
                requested_token_type,
            };
            let succeeded = commands::execute_exchange(args).await?;
            if !succeeded {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::CheckConfig { config } => {
            let healthy = commands::execute_check_config(config).await?;
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
