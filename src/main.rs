#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{bail, Result};
use campinova::{config::Config, gateway, providers};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// `Campinova` - campus wellness chat gateway.
#[derive(Parser, Debug)]
#[command(name = "campinova")]
#[command(version)]
#[command(about = "Chat gateway with rolling per-session memory.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (overrides CAMPINOVA_CONFIG_DIR)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the chat gateway (POST /api/chat)
    #[command(long_about = "\
Start the chat gateway.

Serves POST /api/chat and GET /health. Bind address defaults to the \
values in your config file (gateway.host / gateway.port).

Examples:
  campinova gateway                  # use config defaults
  campinova gateway -p 8080          # listen on port 8080
  campinova gateway --host 127.0.0.1 # loopback only
  campinova gateway -p 0             # random available port")]
    Gateway {
        /// Port to listen on (use 0 for random available port); defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Show effective configuration (secrets redacted)
    Status,

    /// List supported completion providers
    Providers,

    /// Manage configuration
    #[command(long_about = "\
Manage Campinova configuration.

Use 'schema' to dump the full JSON Schema for the config file, which \
documents every available key, type, and default value.

Examples:
  campinova config schema              # print JSON Schema to stdout
  campinova config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("CAMPINOVA_CONFIG_DIR", config_dir);
    }

    // Schema output stays stdout-only: no config load, no logging.
    if let Commands::Config {
        config_command: ConfigCommands::Schema,
    } = &cli.command
    {
        let schema = schemars::schema_for!(Config);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    // Respects RUST_LOG, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Config { .. } => Ok(()),

        Commands::Gateway { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            if port == 0 {
                info!("Starting Campinova gateway on {host} (random port)");
            } else {
                info!("Starting Campinova gateway on {host}:{port}");
            }
            gateway::run_gateway(&host, port, config).await
        }

        Commands::Status => {
            print_status(&config);
            Ok(())
        }

        Commands::Providers => {
            print_providers(&config.provider);
            Ok(())
        }
    }
}

fn print_status(config: &Config) {
    println!("Campinova Status");
    println!();
    println!("Version:      {}", env!("CARGO_PKG_VERSION"));
    println!("Config:       {}", config.config_path.display());
    println!();
    println!("Provider:     {}", config.provider);
    println!(
        "  API URL:    {}",
        config.api_url.as_deref().unwrap_or("(provider default)")
    );
    println!(
        "  API key:    {}",
        if config.api_key.is_some() {
            "set"
        } else {
            "not set (provider-specific env var, if any)"
        }
    );
    println!("  Model:      {}", config.model);
    println!(
        "  Sampling:   temperature={} top_p={} max_tokens={}",
        config.temperature, config.top_p, config.max_tokens
    );
    println!();
    println!("Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  CORS:       {}", if config.gateway.cors { "on" } else { "off" });
    println!("  Body limit: {} bytes", config.gateway.max_body_bytes);
    println!();
    println!(
        "Sessions:     in-memory, {} turns per session (default id: {:?})",
        config.session.history_capacity, config.session.default_session_id
    );
}

fn print_providers(current: &str) {
    let providers = providers::list_providers();
    let current = current.trim().to_ascii_lowercase();

    println!("Supported providers ({} total):\n", providers.len());
    println!("  ID (use in config)  DESCRIPTION");
    println!("  ------------------- -----------");
    for p in &providers {
        let is_active = p.name.eq_ignore_ascii_case(&current)
            || p.aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(&current));
        let marker = if is_active { " (active)" } else { "" };
        let aliases = if p.aliases.is_empty() {
            String::new()
        } else {
            format!("  (aliases: {})", p.aliases.join(", "))
        };
        println!(
            "  {:<19} {} <{}>{}{}",
            p.name, p.display_name, p.base_url, marker, aliases
        );
    }
    println!("\n  custom:<URL>        Any OpenAI-compatible endpoint");
}
