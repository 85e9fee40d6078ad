use std::error::Error;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use view_counter::blob::{BlobStore, DiscordChannel};
use view_counter::config::NotifyTarget;
use view_counter::enrich::{Enrichment, IpApiClient};
use view_counter::notify::{DiscordSink, LogSink, NotificationSink, Notifier, NotifyPolicy};
use view_counter::{http, AppState, Config, CounterStore, ReferrerGate, Tracker};

// The Discord and ip-api clients are blocking, so everything is built and torn
// down outside the async runtime.
fn main() -> Result<(), Box<dyn Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading configuration...");
    let config = Config::from_env()?;
    let (token, channel_id) = config.discord_credentials()?;

    let blobs = BlobStore::new(DiscordChannel::new(token, channel_id)?)
        .with_filename(config.artifact_filename.clone())
        .with_scan_window(config.scan_window);
    let counter = CounterStore::new(blobs)
        .with_retry(config.retry)
        .with_lock_wait(config.lock_wait);

    let geo = IpApiClient::new(config.geo_endpoint.clone(), config.enrich_timeout)?;
    let mut tracker = Tracker::new(counter)
        .with_enrichment(Enrichment::new(Arc::new(geo), config.enrich_timeout))
        .with_identity(config.identity);

    if config.notify_policy != NotifyPolicy::Off {
        let sink: Arc<dyn NotificationSink> = match config.notify_target {
            NotifyTarget::Discord => {
                let notify_channel = config.notify_channel_id.as_deref().unwrap_or(channel_id);
                Arc::new(DiscordSink::new(DiscordChannel::new(token, notify_channel)?))
            }
            NotifyTarget::Log => Arc::new(LogSink),
        };
        let notifier = Notifier::spawn(sink, config.notify_workers, config.notify_queue)?;
        tracker = tracker.with_notifier(Arc::new(notifier), config.notify_policy);
    }

    info!(
        identity = %config.identity,
        notify = %config.notify_policy,
        referrer = config.allowed_referrer.as_deref().unwrap_or("any"),
        "Initialized tracker"
    );
    let state = Arc::new(AppState::new(
        tracker,
        ReferrerGate::new(config.allowed_referrer.clone()),
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        info!("Binding to {}", config.bind_addr);
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Server running on {}", config.bind_addr);
        http::serve(Arc::clone(&state), listener, shutdown_signal()).await?;
        Ok::<_, std::io::Error>(())
    })?;
    drop(runtime);

    if let Some(notifier) = state.tracker.notifier() {
        info!("Draining notifications...");
        let stats = notifier.shutdown();
        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            "Notifier stopped"
        );
    }
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
