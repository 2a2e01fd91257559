use std::sync::Arc;

use anyhow::Context;

use campaign_mailer::api::api_routes;
use campaign_mailer::config::ServerConfig;
use campaign_mailer::dispatch::{DispatchEngine, Dispatcher, EventLog, FixedInterval};
use campaign_mailer::mailer::SmtpRelay;
use campaign_mailer::store::{CursorStore, SettingsStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Warning: rustls crypto provider was already installed");
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(ServerConfig::from_env());

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating {}", config.upload_dir.display()))?;

    eprintln!("📬 Campaign Mailer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data: {}", config.data_dir.display());
    eprintln!("   Uploads: {}", config.upload_dir.display());
    eprintln!("   Relay: {}:{}", config.smtp_host, config.smtp_port);
    eprintln!("   Delay between sends: {:?}", config.send_delay);
    eprintln!("   API: http://0.0.0.0:{}/api/status\n", config.port);

    // ── Dispatch ─────────────────────────────────────────────────────────
    let engine = DispatchEngine::new(
        Arc::new(SmtpRelay::new(config.smtp_host.clone(), config.smtp_port)),
        CursorStore::new(config.cursor_path()),
        Arc::new(FixedInterval::new(config.send_delay)),
        EventLog::new(config.event_log_capacity),
    );
    let dispatcher = Dispatcher::new(engine);
    let settings = Arc::new(SettingsStore::new(config.settings_path()));

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = api_routes(dispatcher, settings, Arc::clone(&config));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
