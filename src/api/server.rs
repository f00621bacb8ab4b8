// Version-cache server built on actix-web

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use chrono::NaiveTime;

use crate::api::cache::{spawn_daily_refresh, VersionCache, DEFAULT_COMMAND};
use crate::api::{middleware, routes};
use crate::util::env::{env_opt, env_parse};

pub struct VersionServer {
    pub host: String,
    pub port: u16,
    pub resource: String,
    pub command: Vec<String>,
    pub refresh_at: NaiveTime,
}

impl VersionServer {
    /// `VERSION_CACHE_HOST`, `VERSION_CACHE_PORT`, `VERSION_CACHE_RESOURCE`,
    /// `VERSION_CACHE_COMMAND` (whitespace separated) and
    /// `VERSION_CACHE_REFRESH_AT` (`HH:MM`, local time).
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = env_opt("VERSION_CACHE_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = env_parse("VERSION_CACHE_PORT", 8080u16);
        let resource =
            env_opt("VERSION_CACHE_RESOURCE").unwrap_or_else(|| "aws_rds_version".to_string());
        let command = match env_opt("VERSION_CACHE_COMMAND") {
            Some(raw) => raw.split_whitespace().map(str::to_string).collect(),
            None => DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect(),
        };
        let refresh_raw = env_opt("VERSION_CACHE_REFRESH_AT").unwrap_or_else(|| "00:00".into());
        let refresh_at = NaiveTime::parse_from_str(&refresh_raw, "%H:%M")
            .with_context(|| format!("Invalid VERSION_CACHE_REFRESH_AT {refresh_raw:?}"))?;

        Ok(Self {
            host,
            port,
            resource,
            command,
            refresh_at,
        })
    }

    /// Fills the cache, schedules the daily refresh and serves until shutdown.
    pub async fn run(self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);
        let cache = Arc::new(VersionCache::new(self.resource.clone(), self.command.clone()));

        // a failed first refresh still serves an empty list
        let _ = cache.refresh().await;
        let refresher = spawn_daily_refresh(cache.clone(), self.refresh_at);

        tracing::info!(
            addr = %bind_addr,
            resource = %cache.resource(),
            refresh_at = %self.refresh_at.format("%H:%M"),
            "Starting version cache server"
        );

        let data = web::Data::from(cache);
        let served = HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            App::new()
                .app_data(data.clone())
                .wrap(logger)
                .wrap(compress)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error");

        refresher.abort();
        served
    }
}
