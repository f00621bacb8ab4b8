//! Time-window gated approval of pending requests on the destination.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::http::{build_client, send_json, HttpFailure, HttpOptions};
use crate::util::env::{env_flag, env_opt, env_parse};

/// Local `[start, end)` window at a fixed UTC offset. `start > end` wraps
/// past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub offset: FixedOffset,
}

impl ApprovalWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.offset).time()
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.contains(self.local_time(now))
    }
}

pub fn parse_clock(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .with_context(|| format!("invalid clock time {raw:?}, expected HH:MM"))
}

/// `+05:30`, `-08:00`, `+0530` or `Z`.
pub fn parse_offset(raw: &str) -> Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("zero offset");
    }
    let (sign, rest) = if let Some(rest) = raw.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = raw.strip_prefix('-') {
        (-1, rest)
    } else {
        bail!("invalid UTC offset {raw:?}, expected +HH:MM");
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        bail!("invalid UTC offset {raw:?}, expected +HH:MM");
    }
    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = digits[2..].parse()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("UTC offset {raw:?} out of range"))
}

#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub verify_tls: bool,
    pub window: ApprovalWindow,
    pub http_timeout_secs: u64,
}

impl ApprovalConfig {
    /// `APPROVAL_URL`/`APPROVAL_TOKEN` fall back to the destination keys.
    pub fn from_env() -> Result<Self> {
        let base_url = env_opt("APPROVAL_URL")
            .or_else(|| env_opt("DESTINATION_URL"))
            .context("APPROVAL_URL (or DESTINATION_URL) is not set")?;
        let window = ApprovalWindow {
            start: parse_clock(&env_opt("APPROVAL_START").unwrap_or_else(|| "18:00".into()))?,
            end: parse_clock(&env_opt("APPROVAL_END").unwrap_or_else(|| "22:00".into()))?,
            offset: parse_offset(
                &env_opt("APPROVAL_UTC_OFFSET").unwrap_or_else(|| "+05:30".into()),
            )?,
        };
        Ok(Self {
            base_url,
            token: env_opt("APPROVAL_TOKEN").or_else(|| env_opt("DESTINATION_TOKEN")),
            verify_tls: !env_flag("SKIP_SSL_VERIFY", false),
            window,
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", 30u64),
        })
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: std::time::Duration::from_secs(self.http_timeout_secs.max(1)),
            verify_tls: self.verify_tls,
            bearer: self.token.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Approval {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalItem {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
}

impl ApprovalItem {
    pub fn is_requested(&self) -> bool {
        self.status.as_deref() == Some("requested")
    }
}

#[derive(Debug, Clone)]
pub struct ApprovalClient {
    http: Client,
    base_url: String,
}

fn decode<T: serde::de::DeserializeOwned>(body: &Value, field: &str) -> Result<T> {
    let value = body.get(field).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).with_context(|| format!("unexpected `{field}` in response"))
}

fn http_err(err: HttpFailure) -> anyhow::Error {
    anyhow::anyhow!("{err}")
}

impl ApprovalClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(cfg: &ApprovalConfig) -> Result<Self> {
        let http = build_client(&cfg.http_options())?;
        Ok(Self::new(http, cfg.base_url.clone()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    pub async fn pending(&self) -> Result<Vec<Approval>> {
        let body = send_json(
            self.http
                .get(self.url("approvals"))
                .query(&[("status", "requested")]),
        )
        .await
        .map_err(http_err)
        .context("list pending approvals")?;
        let approvals: Option<Vec<Approval>> = decode(&body, "approvals")?;
        Ok(approvals.unwrap_or_default())
    }

    pub async fn items(&self, approval_id: i64) -> Result<Vec<ApprovalItem>> {
        let body = send_json(self.http.get(self.url(&format!("approvals/{approval_id}"))))
            .await
            .map_err(http_err)
            .with_context(|| format!("fetch approval {approval_id}"))?;
        let items = body
            .get("approval")
            .map(|a| decode::<Option<Vec<ApprovalItem>>>(a, "approvalItems"))
            .transpose()?
            .flatten()
            .unwrap_or_default();
        Ok(items)
    }

    pub async fn approve(&self, item_id: i64) -> Result<()> {
        let body = send_json(
            self.http
                .put(self.url(&format!("approval-items/{item_id}/approve"))),
        )
        .await
        .map_err(http_err)
        .with_context(|| format!("approve item {item_id}"))?;
        if body.get("success").and_then(Value::as_bool) != Some(true) {
            bail!("approve item {item_id}: unexpected response {body}");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApprovalReport {
    pub in_window: bool,
    pub local_time: String,
    pub approvals: usize,
    pub details_failed: usize,
    pub approved: usize,
    pub approve_failed: usize,
    pub skipped: usize,
}

/// One poll: outside the window nothing is requested.
pub async fn run_once(
    client: &ApprovalClient,
    window: &ApprovalWindow,
    now: DateTime<Utc>,
) -> Result<ApprovalReport> {
    let local = window.local_time(now);
    let mut report = ApprovalReport {
        in_window: window.contains(local),
        local_time: local.format("%H:%M").to_string(),
        ..Default::default()
    };
    if !report.in_window {
        info!(local_time = %report.local_time, "outside approval window; nothing to do");
        return Ok(report);
    }

    let approvals = client.pending().await?;
    report.approvals = approvals.len();
    info!(count = approvals.len(), "pending approvals");

    for approval in &approvals {
        let name = approval.name.as_deref().unwrap_or("-");
        let items = match client.items(approval.id).await {
            Ok(items) => items,
            Err(err) => {
                warn!(approval = approval.id, name, error = %format!("{err:#}"), "could not fetch approval details");
                report.details_failed += 1;
                continue;
            }
        };
        for item in items {
            if !item.is_requested() {
                report.skipped += 1;
                continue;
            }
            match client.approve(item.id).await {
                Ok(()) => {
                    info!(approval = approval.id, item = item.id, "item approved");
                    report.approved += 1;
                }
                Err(err) => {
                    warn!(approval = approval.id, item = item.id, error = %format!("{err:#}"), "approval failed");
                    report.approve_failed += 1;
                }
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(start: &str, end: &str) -> ApprovalWindow {
        ApprovalWindow {
            start: parse_clock(start).unwrap(),
            end: parse_clock(end).unwrap(),
            offset: parse_offset("+05:30").unwrap(),
        }
    }

    #[test]
    fn plain_window_is_half_open() {
        let w = window("18:00", "22:00");
        assert!(w.contains(parse_clock("18:00").unwrap()));
        assert!(w.contains(parse_clock("21:59").unwrap()));
        assert!(!w.contains(parse_clock("22:00").unwrap()));
        assert!(!w.contains(parse_clock("09:00").unwrap()));
    }

    #[test]
    fn window_wraps_midnight() {
        let w = window("22:00", "02:00");
        assert!(w.contains(parse_clock("23:30").unwrap()));
        assert!(w.contains(parse_clock("01:00").unwrap()));
        assert!(!w.contains(parse_clock("02:00").unwrap()));
        assert!(!w.contains(parse_clock("12:00").unwrap()));
    }

    #[test]
    fn open_is_evaluated_at_the_offset() {
        let w = window("18:00", "22:00");
        // 13:00 UTC is 18:30 at +05:30
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        assert!(w.is_open(now));
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap();
        assert!(!w.is_open(later));
    }

    #[test]
    fn offsets_parse() {
        assert_eq!(parse_offset("+05:30").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_offset("-0800").unwrap().local_minus_utc(), -28_800);
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_offset("0530").is_err());
        assert!(parse_offset("+5:3").is_err());
        assert!(parse_clock("25:00").is_err());
    }

    #[test]
    fn only_requested_items_qualify() {
        let item: ApprovalItem =
            serde_json::from_value(serde_json::json!({"id": 4, "status": "requested"})).unwrap();
        assert!(item.is_requested());
        let done: ApprovalItem = serde_json::from_value(serde_json::json!({"id": 5})).unwrap();
        assert!(!done.is_requested());
    }
}
