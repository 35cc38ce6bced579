//! Marks onboarding as completed for founders whose profile is already at 100%.
//!
//! Usage: `fix_onboarding_flags [--apply]`. Without `--apply` nothing is written.

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::Config;
use rust_founder_probes::models::FounderProfile;
use rust_founder_probes::rest_client::patch;
use rust_founder_probes::schema::{founders, FOUNDERS_TABLE};
use rust_founder_probes::{obs, report};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing();

    let apply = match std::env::args().nth(1).as_deref() {
        None => false,
        Some("--apply") => true,
        Some(other) => {
            eprintln!("unknown argument: {}", other);
            eprintln!("usage: fix_onboarding_flags [--apply]");
            std::process::exit(2);
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let service = match BackendClient::service(&config) {
        Ok(client) => client,
        Err(e) => {
            report::fail(format!("This script needs the service role: {}", e));
            std::process::exit(1);
        }
    };

    report::section("Founders with stale onboarding flags");
    let stale: Vec<FounderProfile> = match service
        .from(FOUNDERS_TABLE)
        .gte(founders::PROFILE_PROGRESS, 100)
        .eq(founders::ONBOARDING_COMPLETED, false)
        .order(founders::CREATED_AT, true)
        .execute()
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            report::fail(format!("Query failed: {}", e));
            std::process::exit(1);
        }
    };

    if stale.is_empty() {
        report::pass("Nothing to fix");
        return Ok(());
    }

    for row in &stale {
        report::info(format!(
            "{} ({}) progress {}%",
            row.id,
            row.name.as_deref().unwrap_or("unnamed"),
            row.profile_progress
        ));
    }

    if !apply {
        report::warn(format!(
            "Dry run: {} row(s) would be updated. Re-run with --apply",
            stale.len()
        ));
        return Ok(());
    }

    report::section("Applying");
    let body = patch(&[(founders::ONBOARDING_COMPLETED, json!(true))]);
    let mut failed = 0;
    for row in &stale {
        match service
            .from(FOUNDERS_TABLE)
            .eq(founders::ID, row.id)
            .update::<FounderProfile, _>(&body)
            .await
        {
            Ok(updated) if !updated.is_empty() => report::pass(format!("Fixed {}", row.id)),
            Ok(_) => {
                failed += 1;
                report::fail(format!("{}: no row updated", row.id));
            }
            Err(e) => {
                failed += 1;
                report::fail(format!("{}: {}", row.id, e));
            }
        }
    }

    tracing::info!("Fixed {}/{} founder row(s)", stale.len() - failed, stale.len());
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
