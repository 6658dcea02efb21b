use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cdl_notifier::config::{AppConfig, StoreConfig, duration_to_millis};
use cdl_notifier::database::{self, JsonFileStore};
use cdl_notifier::database::repositories::{
    DocumentNotificationRepository, NotificationRepository, SqlxNotificationRepository,
};
use cdl_notifier::logging;
use cdl_notifier::notification::channels::{EmailChannel, SmsChannel};
use cdl_notifier::notification::{Channels, DispatchWorker, EmailSender, SmsSender};
use cdl_notifier::utils::http_client::install_rustls_provider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();

    let (logging_config, _log_guard) =
        logging::init_logging(&config.log_dir).context("initializing logging")?;
    let cancel = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel.clone());
    info!(
        log_dir = %logging_config.log_dir().display(),
        filter = %logging_config.get_filter(),
        "Logging initialized"
    );

    install_rustls_provider();

    let repo = open_repository(&config.store).await?;

    let email = EmailChannel::new(config.email.clone());
    if !email.is_enabled() {
        warn!("Email channel is not configured; email jobs will fail until EMAIL_HOST and DEFAULT_FROM_EMAIL are set");
    }
    let sms = SmsChannel::new(config.sms.clone());
    if !sms.is_enabled() {
        warn!("SMS channel is not configured; SMS jobs will fail until the TWILIO_* variables are set");
    }

    let worker = Arc::new(DispatchWorker::new(
        repo,
        Channels::new(Arc::new(email), Arc::new(sms)),
        config.worker_config(),
    ));
    worker.start(config.poll_interval);

    info!(
        poll_interval_ms = duration_to_millis(config.poll_interval),
        "cdl-notifier running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutdown signal received");
    worker.shutdown().await;
    cancel.cancel();

    let stats = worker.stats();
    info!(
        cycles = stats.cycles,
        sent = stats.sent,
        failed = stats.failed,
        retried = stats.retried,
        cycle_errors = stats.cycle_errors,
        "cdl-notifier stopped"
    );

    Ok(())
}

async fn open_repository(store: &StoreConfig) -> anyhow::Result<Arc<dyn NotificationRepository>> {
    match store {
        StoreConfig::Json { path } => {
            info!(path = %path.display(), "Using JSON data file store");
            Ok(Arc::new(DocumentNotificationRepository::new(
                JsonFileStore::new(path.clone()),
            )))
        }
        StoreConfig::Sqlite { url } => {
            info!(url = %url, "Using SQLite store");
            let pool = database::init_pool(url)
                .await
                .context("opening SQLite database")?;
            database::run_migrations(&pool)
                .await
                .context("running database migrations")?;
            Ok(Arc::new(SqlxNotificationRepository::new(pool)))
        }
    }
}
