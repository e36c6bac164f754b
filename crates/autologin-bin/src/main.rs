// ============================
// crates/autologin-bin/src/main.rs
// ============================
//! `autologin` command line: HTTP server plus maintenance tools.
mod server;

use anyhow::Context;
use autologin_lib::{
    auth::{generate_key, CredentialVerifier},
    config::DEFAULT_CONFIG_FILE,
    Settings,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use std::{io::BufRead, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use server::{create_router, spawn_maintenance, AppState};

/// How often expired sessions and tokens are swept while serving
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

#[derive(Debug, Parser)]
#[command(name = "autologin", version, about = "Remember-me authentication server")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Hash a password for the user file; reads stdin when no password is given
    HashPassword {
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete expired remember-me tokens once and exit
    Sweep,
    /// Print a fresh base64 cookie encryption key
    GenerateKey,
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.server.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::GenerateKey) = cli.command {
        println!("{}", STANDARD.encode(generate_key()));
        return Ok(());
    }

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    init_tracing(&settings);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::HashPassword { password } => {
            let mut password = match password {
                Some(password) => password,
                None => {
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    line.trim_end_matches(['\r', '\n']).to_string()
                },
            };
            anyhow::ensure!(!password.is_empty(), "password must not be empty");
            let hash = CredentialVerifier::new(settings.password.algorithm)
                .hash_password_secure(&mut password)?;
            println!("{hash}");
            Ok(())
        },
        Command::Sweep => {
            let state = AppState::from_settings(settings).await?;
            let removed = state.auth.clean_expired().await?;
            println!("removed {removed} expired autologin tokens");
            Ok(())
        },
        Command::GenerateKey => Ok(()),
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("invalid server.host / server.port")?;

    let state = Arc::new(AppState::from_settings(settings).await?);
    let _maintenance = spawn_maintenance(state.clone(), MAINTENANCE_INTERVAL);

    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
