pub mod seed;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::services::{Mailer, SmtpMailer, TracingMailer};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "devcamper-api")]
#[command(about = "DevCamper API - bootcamp directory backend")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port override")]
        port: Option<u16>,
    },

    #[command(about = "Load or remove seed data")]
    Seed {
        #[command(subcommand)]
        cmd: seed::SeedCommands,
    },
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Seed { cmd } => seed::handle(cmd, &config).await,
    }
}

async fn serve(mut config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate().context("invalid configuration")?;

    let stores = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to the data store")?;
    let mailer: Arc<dyn Mailer> = if config.mail.has_transport() {
        Arc::new(SmtpMailer::new(&config.mail).context("failed to configure mail transport")?)
    } else {
        tracing::warn!("No SMTP_HOST configured; mail is written to the log");
        Arc::new(TracingMailer::new())
    };

    tracing::info!("Starting DevCamper API in {:?} mode", config.environment);
    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let state = AppState::new(config, stores, mailer)?;
    let app = crate::app::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
