//! Checks that the backend is reachable with the configured keys.

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::{redact, Config};
use rust_founder_probes::schema::{CONNECTIONS_TABLE, FOUNDERS_TABLE};
use rust_founder_probes::{obs, report};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    report::section("Configuration");
    report::info(format!("Backend URL: {}", config.supabase_url));
    report::info(format!("Anon key: {}", redact(&config.anon_key)));
    match config.service_role_key {
        Some(ref key) => report::info(format!("Service role key: {}", redact(key))),
        None => report::warn("No service role key: admin setup and cleanup unavailable"),
    }

    let anon = BackendClient::anon(&config)?;

    report::section("Auth");
    match anon.auth().health().await {
        Ok(health) => {
            let version = health
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            report::pass(format!("Auth service healthy (version {})", version));
        }
        Err(e) => report::fail(format!("Auth service unreachable: {}", e)),
    }

    report::section("Tables (anonymous)");
    for table in [FOUNDERS_TABLE, CONNECTIONS_TABLE] {
        match anon.from(table).count().await {
            Ok(n) => report::pass(format!("{}: {} row(s) visible", table, n)),
            Err(e) => report::fail(format!("{}: {}", table, e)),
        }
    }

    if let Ok(service) = BackendClient::service(&config) {
        report::section("Tables (service role)");
        for table in [FOUNDERS_TABLE, CONNECTIONS_TABLE] {
            match service.from(table).count().await {
                Ok(n) => report::pass(format!("{}: {} row(s) total", table, n)),
                Err(e) => report::fail(format!("{}: {}", table, e)),
            }
        }
    }

    report::section("Storage");
    match anon.storage().list(&config.avatar_bucket, "").await {
        Ok(objects) => report::pass(format!(
            "Bucket '{}' listable ({} top-level entries)",
            config.avatar_bucket,
            objects.len()
        )),
        Err(e) => report::fail(format!("Bucket '{}': {}", config.avatar_bucket, e)),
    }

    Ok(())
}
