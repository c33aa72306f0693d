//! orgsync service entry point.

use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use orgsync::config::ConfigLoader;
use orgsync::provider::HttpIdentityProvider;
use orgsync::{db, server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;

    telemetry::init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "starting orgsync");
    if let Ok(rendered) = config.redacted_json() {
        tracing::debug!("effective configuration: {}", rendered);
    }

    let db = db::init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    let api_key = config.provider_api_key.clone().unwrap_or_default();
    let provider = Arc::new(HttpIdentityProvider::new(
        &config.provider_api_base,
        &api_key,
    ));

    server::run_server(config, db, provider).await
}
