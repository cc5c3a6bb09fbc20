use std::sync::Arc;

use survey_bot::channels::{Channel, CliChannel, TelegramChannel};
use survey_bot::config::{BotConfig, ChannelKind};
use survey_bot::discount::HttpDiscountClient;
use survey_bot::error::Error;
use survey_bot::server::{ServerState, routes};
use survey_bot::survey::{SessionStore, SurveyBot};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting survey bot v{}", env!("CARGO_PKG_VERSION"));

    let config = BotConfig::from_env().map_err(Error::from)?;

    tracing::info!(
        channel = ?config.channel,
        bot_token = if config.telegram.is_some() { "set" } else { "not set" },
        target_group = if config.has_target_group() { "set" } else { "not set" },
        port = config.port,
        discount_url = %config.discount.api_url,
        "Environment loaded"
    );

    // ── Channel ─────────────────────────────────────────────────────────
    let telegram = match (config.channel, config.telegram.as_ref()) {
        (ChannelKind::Telegram, Some(tg)) => Some(Arc::new(TelegramChannel::new(tg))),
        _ => None,
    };
    let channel: Arc<dyn Channel> = match &telegram {
        Some(tg) => Arc::clone(tg) as Arc<dyn Channel>,
        None => Arc::new(CliChannel::new()),
    };

    // Unreachable platform or bad credentials at launch are fatal.
    channel.health_check().await.map_err(Error::from)?;
    if let Some(tg) = &telegram {
        tg.check_bot_status().await;
    }

    // ── HTTP server ─────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(Error::from)?;
    let app = routes(ServerState {
        telegram: telegram.clone(),
    });
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server stopped");
        }
    });
    tracing::info!(port = config.port, "HTTP server listening");

    // ── Survey ──────────────────────────────────────────────────────────
    let verifier = Arc::new(HttpDiscountClient::new(&config.discount));
    let bot = Arc::new(SurveyBot::new(
        Arc::clone(&channel),
        verifier,
        SessionStore::new(),
    ));

    let messages = channel.start().await.map_err(Error::from)?;
    tracing::info!("Survey bot started");

    bot.run(messages, shutdown_signal()).await;

    if let Err(e) = channel.shutdown().await {
        tracing::warn!(error = %e, "Channel shutdown failed");
    }
    tracing::info!("Survey bot stopped");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down..."),
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received SIGINT, shutting down..."),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    }
}
