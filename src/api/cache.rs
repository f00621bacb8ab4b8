//! In-memory copy of a command's JSON output, refreshed on a daily schedule.

use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Default refresh command: the RDS engine/version pairs as a JSON array.
pub const DEFAULT_COMMAND: [&str; 7] = [
    "aws",
    "rds",
    "describe-db-engine-versions",
    "--query",
    "DBEngineVersions[].{Engine:Engine,EngineVersion:EngineVersion}",
    "--output",
    "json",
];

#[derive(Debug, Default)]
struct CacheState {
    data: Option<Value>,
    refreshed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub resource: String,
    pub entries: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct VersionCache {
    resource: String,
    command: Vec<String>,
    state: RwLock<CacheState>,
}

impl VersionCache {
    pub fn new(resource: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            resource: resource.into().trim_matches('/').to_string(),
            command,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Latest successful output; an empty array before the first success.
    pub fn snapshot(&self) -> Value {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .data
            .clone()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }

    pub fn status(&self) -> CacheStatus {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let entries = match &state.data {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        };
        CacheStatus {
            resource: self.resource.clone(),
            entries,
            refreshed_at: state.refreshed_at,
            last_error: state.last_error.clone(),
        }
    }

    async fn run_command(&self) -> Result<Value> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("refresh command is empty"))?;
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawn {program}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{program} exited with {}: {}", output.status, stderr.trim());
        }
        serde_json::from_slice(&output.stdout).context("command output is not JSON")
    }

    /// Runs the command and replaces the cached value. On failure the
    /// previous value is kept and the error recorded.
    pub async fn refresh(&self) -> Result<usize> {
        match self.run_command().await {
            Ok(value) => {
                let entries = value.as_array().map(Vec::len).unwrap_or(1);
                let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                state.data = Some(value);
                state.refreshed_at = Some(Utc::now());
                state.last_error = None;
                info!(resource = %self.resource, entries, "version cache refreshed");
                Ok(entries)
            }
            Err(err) => {
                error!(resource = %self.resource, error = %format!("{err:#}"), "version cache refresh failed");
                let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                state.last_error = Some(format!("{err:#}"));
                Err(err)
            }
        }
    }
}

/// First occurrence of `at` strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Refreshes `cache` every day at `at` local time.
pub fn spawn_daily_refresh(cache: Arc<VersionCache>, at: NaiveTime) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Local::now().naive_local();
            let next = next_run_after(now, at);
            let wait = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            info!(next = %next, "next version cache refresh scheduled");
            tokio::time::sleep(wait).await;
            // failure is recorded in the cache state
            let _ = cache.refresh().await;
        }
    })
}
