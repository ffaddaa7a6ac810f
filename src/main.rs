// lmstudio CLI - command line entry point

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lmstudio_client::commands::{self, chat::ChatArgs};
use lmstudio_client::inference::config::expand_tilde;
use lmstudio_client::{LmStudioClient, LmStudioConfig};

/// Talk to a local LM Studio server
#[derive(Parser, Debug)]
#[command(name = "lmstudio")]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML configuration file (defaults to LMSTUDIO_* environment variables)
    #[arg(short = 'c', long = "config", global = true, value_name = "PATH")]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long = "json-logs", global = true)]
    json_logs: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a chat message
    Chat {
        /// The message to send
        message: String,

        /// The model to use
        #[arg(short = 'm', long = "model")]
        model: Option<String>,

        /// Temperature (0-2)
        #[arg(short = 't', long = "temperature")]
        temperature: Option<f32>,

        /// Maximum tokens to generate
        #[arg(long = "max-tokens")]
        max_tokens: Option<u32>,

        /// Stream the response
        #[arg(short = 's', long = "stream")]
        stream: bool,
    },

    /// List available models
    Models,

    /// Load a model (LM Studio only supports this through its UI)
    Load {
        /// The model ID to load
        model: String,
    },

    /// Test the connection to the server
    Test,

    /// Generate an embedding vector
    Embed {
        /// Text to embed
        text: String,

        /// Embedding model to use
        #[arg(short = 'm', long = "model")]
        model: Option<String>,
    },

    /// Estimate the token count of a text
    Tokens {
        /// Text to measure
        text: String,

        /// Fail when the estimate exceeds this many tokens
        #[arg(short = 'l', long = "limit")]
        limit: Option<usize>,
    },
}

fn load_config(path: Option<&str>) -> Result<LmStudioConfig> {
    match path {
        Some(path) => {
            let path = PathBuf::from(expand_tilde(path));
            LmStudioConfig::load(&path)
                .with_context(|| format!("loading configuration from {}", path.display()))
        }
        None => Ok(LmStudioConfig::from_env()),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let level = if config.logging.enabled {
        config.logging.level.clone()
    } else {
        "warn".to_string()
    };
    lmstudio_client::init_tracing(&level, cli.json_logs);

    tracing::debug!(base_url = %config.base_url, model = %config.default_model, "configuration loaded");
    let client = LmStudioClient::new(config).context("creating LM Studio client")?;

    let mut stdout = std::io::stdout().lock();
    let ok = match cli.command {
        Commands::Chat {
            message,
            model,
            temperature,
            max_tokens,
            stream,
        } => {
            let args = ChatArgs {
                message,
                model,
                temperature,
                max_tokens,
                stream,
            };
            commands::chat::run(&client, &args, &mut stdout).await?
        }
        Commands::Models => commands::models::list(&client, &mut stdout).await?,
        Commands::Load { model } => commands::models::load(&client, &model, &mut stdout).await?,
        Commands::Test => commands::health::run(&client, &mut stdout).await?,
        Commands::Embed { text, model } => {
            commands::embed::embed(&client, &text, model, &mut stdout).await?
        }
        Commands::Tokens { text, limit } => {
            commands::embed::tokens(&client, &text, limit, &mut stdout)?
        }
    };
    stdout.flush()?;

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
