use std::sync::Arc;

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::alert::{Alerter, WebhookSender};
use crate::config::Config;
use crate::database::{Database, DatabaseImpl};
use crate::monitoring::{DefaultCheckerFactory, MonitoringScheduler};

/// Run the scheduler until SIGINT or SIGTERM, then drain every loop
pub async fn serve(config: Config) -> Result<()> {
    let database: Arc<dyn Database> = Arc::new(DatabaseImpl::open(&config.storage.path).await?);
    info!(path = %config.storage.path.display(), "Opened check store");

    let factory = Arc::new(DefaultCheckerFactory::new(config.container.socket.clone()));
    let mut scheduler = MonitoringScheduler::new(config.services.clone(), database, factory);

    if let Some(webhook) = config.webhook() {
        let alerter = Alerter::new(Arc::new(WebhookSender::new(webhook.url.clone())?), webhook.cooldown);
        scheduler.set_on_result(move |result, previous| {
            alerter.notify(result, previous);
        });
        info!(cooldown = ?webhook.cooldown, "Webhook alerts enabled");
    }

    let cancel = CancellationToken::new();
    let started = scheduler.start(cancel.clone());
    if started == 0 {
        bail!("none of the {} configured services could be scheduled", config.services.len());
    }
    info!(services = started, "Monitoring started");

    if let Err(e) = shutdown_signal().await {
        error!(error = %e, "Failed to listen for shutdown signals, stopping");
    }

    info!("Shutting down");
    cancel.cancel();
    scheduler.wait().await;
    info!("All service monitors stopped");

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        outcome = tokio::signal::ctrl_c() => outcome,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
