// Serves the cached output of the engine-version command over HTTP.

use anyhow::Result;
use cloud_price_sync::api::VersionServer;
use cloud_price_sync::util::{env as env_util, logging};

#[actix_web::main]
async fn main() -> Result<()> {
    env_util::init_env();
    logging::init_tracing("info,actix_web=info")?;

    tracing::info!("Initializing version cache server");
    env_util::preflight_check(
        "version_cache",
        &[],
        &[
            "VERSION_CACHE_HOST",
            "VERSION_CACHE_PORT",
            "VERSION_CACHE_RESOURCE",
            "VERSION_CACHE_COMMAND",
            "VERSION_CACHE_REFRESH_AT",
        ],
    )?;

    let server = VersionServer::from_env()?;
    server.run().await
}
