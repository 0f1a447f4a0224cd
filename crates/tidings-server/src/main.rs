mod config;

use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tidings_api::AppStateInner;
use tidings_gateway::channels::{BotApiChannel, SmsGatewayChannel, WebhookChannel};
use tidings_gateway::{EnvelopeFeed, Notifier, RecentDeliveries, TracingObserver, run_notify_loop};
use tidings_store::{ChainHeadFile, ChannelStore};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidings=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Channel store: replay the durable log before anything can look up
    let store = Arc::new(
        ChannelStore::open_file(&config.channel_log)
            .with_context(|| format!("opening channel log {}", config.channel_log.display()))?,
    );
    info!(
        path = %config.channel_log.display(),
        identities = store.len()?,
        "Channel store ready"
    );

    // Delivery channels
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let feed = EnvelopeFeed::default();
    let deliveries = Arc::new(RecentDeliveries::new(config.recent_reports).with_next(Arc::new(TracingObserver)));

    let mut builder = Notifier::builder(store.clone(), config.writer_id.clone())
        .enabled(config.notifications_enabled)
        .feed(feed)
        .observer(deliveries.clone());

    if let Some(webhook) = &config.webhook {
        warn_if_unrouted("webhook", &webhook.destinations);
        builder = builder.route(
            Arc::new(WebhookChannel::new(client.clone(), webhook.url.clone())),
            webhook.destinations.clone(),
        );
    }
    if let Some(bot) = &config.bot {
        warn_if_unrouted("bot", &bot.destinations);
        builder = builder.route(
            Arc::new(BotApiChannel::new(client.clone(), bot.api_url.clone(), bot.token.clone())),
            bot.destinations.clone(),
        );
    }
    if let Some(sms) = &config.sms {
        warn_if_unrouted("sms", &sms.destinations);
        builder = builder.route(
            Arc::new(SmsGatewayChannel::new(client.clone(), sms.url.clone())),
            sms.destinations.clone(),
        );
    }
    if let Some(path) = &config.chain_head_path {
        builder = builder.chain_head_file(ChainHeadFile::new(path));
    }

    let notifier = Arc::new(builder.build()?);

    // Timer task; stopped after the HTTP server drains so queued payloads
    // from the last requests still go out.
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let notify_task = tokio::spawn(run_notify_loop(
        notifier.clone(),
        config.notify_interval,
        async move {
            let _ = stop_rx.await;
        },
    ));

    let app = tidings_api::router(Arc::new(AppStateInner {
        notifier: notifier.clone(),
        store,
        deliveries,
    }))
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http());

    info!("Tidings server listening on {}", config.http_addr);
    info!(
        writer = %config.writer_id,
        interval_secs = config.notify_interval.as_secs(),
        enabled = config.notifications_enabled,
        "Notifications configured"
    );

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(());
    if let Err(e) = notify_task.await {
        warn!("Notification loop ended abnormally: {}", e);
    }

    Ok(())
}

fn warn_if_unrouted(channel: &str, destinations: &[String]) {
    if destinations.is_empty() {
        warn!(channel, "Delivery channel configured without destinations");
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
