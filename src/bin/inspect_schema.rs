//! Compares the live `founders` and `connections` tables with the pinned column lists and
//! prints their row-level-security setup.

use rust_founder_probes::config::Config;
use rust_founder_probes::data::db::Database;
use rust_founder_probes::data::schema::{self, connections, diff_columns, founders};
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

    let database_url = match config.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            report::fail(e.to_string());
            std::process::exit(1);
        }
    };

    let db = Database::new(database_url).await?;
    tracing::info!("✓ Connected to database");

    let mut drifted = false;
    for (table, expected, legacy) in [
        (schema::FOUNDERS_TABLE, founders::ALL, founders::LEGACY_NAMES),
        (
            schema::CONNECTIONS_TABLE,
            connections::ALL,
            connections::LEGACY_NAMES,
        ),
    ] {
        report::section(table);

        let columns = db.table_columns(table).await?;
        if columns.is_empty() {
            report::fail("Table not found");
            drifted = true;
            continue;
        }
        for (name, data_type) in &columns {
            report::info(format!("{}: {}", name, data_type));
        }

        let names: Vec<String> = columns.into_iter().map(|(name, _)| name).collect();
        let drift = diff_columns(expected, legacy, &names);
        if drift.is_clean() {
            report::pass("Columns match");
        } else {
            drifted = true;
            for column in &drift.missing {
                report::fail(format!("Missing column: {}", column));
            }
            for column in &drift.unexpected {
                report::warn(format!("Unexpected column: {}", column));
            }
            for (old, current) in &drift.legacy {
                report::fail(format!("Legacy column {} (now {})", old, current));
            }
        }

        match db.rls_enabled(table).await? {
            Some(true) => report::pass("Row-level security enabled"),
            Some(false) => {
                drifted = true;
                report::fail("Row-level security disabled");
            }
            None => report::warn("Could not read RLS flag"),
        }

        let policies = db.policies(table).await?;
        if policies.is_empty() {
            report::warn("No policies defined");
        }
        for (name, command) in policies {
            report::info(format!("policy {} ({})", name, command));
        }
    }

    if drifted {
        std::process::exit(1);
    }
    Ok(())
}
