use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use eventcast_common::Config;
use eventcast_dispatcher::{
    notify::{fcm::FcmGateway, noop::NoopGateway},
    Dispatcher, DispatcherSettings, PushGateway,
};
use eventcast_store::PgDocumentStore;
use fcm_client::{FcmCredentials, FcmOptions, ServiceAccountKey};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("eventcast=info".parse()?))
        .init();

    info!("Eventcast dispatcher starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    // Store bootstrap failures are fatal.
    let store = PgDocumentStore::connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    store
        .migrate()
        .await
        .context("failed to migrate documents schema")?;

    // Build push gateway: FCM if configured, otherwise Noop
    let gateway: Arc<dyn PushGateway> = match fcm_options(&config) {
        Some(options) => {
            info!(project_id = options.project_id.as_str(), "FCM push delivery enabled");
            Arc::new(FcmGateway::new(options).context("failed to load FCM credentials")?)
        }
        None => {
            info!("No FCM credentials set, push delivery disabled");
            Arc::new(NoopGateway)
        }
    };

    let dispatcher = Dispatcher::new(
        Arc::new(store),
        gateway,
        DispatcherSettings::from(&config),
    );
    let mut handle = dispatcher.start().await?;

    let finished = tokio::select! {
        report = handle.join() => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };

    let report = match finished {
        Some(report) => {
            warn!("Every stream ended unexpectedly");
            report
        }
        None => {
            info!("Shutdown requested");
            handle.shutdown().await
        }
    };

    info!("Dispatcher stopped. {report}");
    Ok(())
}

/// Service account when configured, else a fixed access token.
fn fcm_options(config: &Config) -> Option<FcmOptions> {
    let project_id = config.fcm_project_id.clone()?;
    let credentials = match (
        &config.fcm_client_email,
        &config.fcm_private_key,
        &config.fcm_access_token,
    ) {
        (Some(client_email), Some(private_key), _) => {
            FcmCredentials::ServiceAccount(ServiceAccountKey {
                client_email: client_email.clone(),
                private_key: private_key.clone(),
                token_uri: None,
            })
        }
        (_, _, Some(token)) => {
            warn!("Using FCM_ACCESS_TOKEN as a fixed bearer token; it will not be refreshed");
            FcmCredentials::AccessToken(token.clone())
        }
        _ => return None,
    };

    Some(FcmOptions {
        project_id,
        credentials,
        endpoint: config.fcm_endpoint.clone(),
    })
}
