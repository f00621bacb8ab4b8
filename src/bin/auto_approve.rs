// Approves pending requests when invoked inside the configured time window.

use anyhow::Result;
use chrono::Utc;
use cloud_price_sync::approval::{run_once, ApprovalClient, ApprovalConfig};
use cloud_price_sync::util::{env as env_util, logging};

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    logging::init_tracing("info")?;

    env_util::preflight_check(
        "auto_approve",
        &[],
        &[
            "APPROVAL_URL",
            "APPROVAL_TOKEN",
            "DESTINATION_URL",
            "APPROVAL_START",
            "APPROVAL_END",
            "APPROVAL_UTC_OFFSET",
            "SKIP_SSL_VERIFY",
        ],
    )?;

    let cfg = ApprovalConfig::from_env()?;
    let client = ApprovalClient::from_config(&cfg)?;
    let report = run_once(&client, &cfg.window, Utc::now()).await?;

    tracing::info!(
        in_window = report.in_window,
        local_time = %report.local_time,
        approvals = report.approvals,
        approved = report.approved,
        approve_failed = report.approve_failed,
        details_failed = report.details_failed,
        skipped = report.skipped,
        "auto-approve finished"
    );
    Ok(())
}
