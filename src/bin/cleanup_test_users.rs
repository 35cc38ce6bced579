//! Deletes every probe identity left behind by interrupted runs, with its founder rows and
//! their connections.

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::Config;
use rust_founder_probes::errors::AppError;
use rust_founder_probes::fixtures::is_probe_email;
use rust_founder_probes::models::{AuthUser, Connection, FounderProfile};
use rust_founder_probes::schema::{connections, founders, CONNECTIONS_TABLE, FOUNDERS_TABLE};
use rust_founder_probes::{obs, report};

const PAGE_SIZE: u32 = 200;

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

    let service = match BackendClient::service(&config) {
        Ok(client) => client,
        Err(e) => {
            report::fail(format!("This script needs the service role: {}", e));
            std::process::exit(1);
        }
    };

    report::section("Finding probe users");
    let probes = match find_probe_users(&service).await {
        Ok(users) => users,
        Err(e) => {
            report::fail(format!("Listing users failed: {}", e));
            std::process::exit(1);
        }
    };

    if probes.is_empty() {
        report::pass("No probe users found");
        return Ok(());
    }
    report::info(format!("{} probe user(s) found", probes.len()));

    report::section("Deleting");
    let mut removed = 0;
    let mut failed = 0;
    for user in &probes {
        match remove_user(&service, user).await {
            Ok(rows) => {
                removed += 1;
                report::pass(format!("{} ({} row(s))", user.email_or_id(), rows));
            }
            Err(e) => {
                failed += 1;
                report::fail(format!("{}: {}", user.email_or_id(), e));
            }
        }
    }

    report::section("Summary");
    report::info(format!("Deleted {} user(s), {} failure(s)", removed, failed));
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn find_probe_users(service: &BackendClient) -> Result<Vec<AuthUser>, AppError> {
    let auth = service.auth();
    let mut probes = Vec::new();
    let mut page = 1;

    loop {
        let users = auth.admin_list_users(page, PAGE_SIZE).await?;
        let fetched = users.len();
        probes.extend(
            users
                .into_iter()
                .filter(|u| u.email.as_deref().is_some_and(is_probe_email)),
        );
        tracing::debug!("Page {}: {} user(s)", page, fetched);

        if fetched < PAGE_SIZE as usize {
            break;
        }
        page += 1;
    }

    Ok(probes)
}

/// Deletes the user's connections, founder rows and account. Returns the number of rows removed.
async fn remove_user(service: &BackendClient, user: &AuthUser) -> Result<usize, AppError> {
    let rows: Vec<FounderProfile> = service
        .from(FOUNDERS_TABLE)
        .eq(founders::USER_ID, user.id)
        .execute()
        .await?;

    let mut removed = 0;
    for row in &rows {
        for column in [connections::INITIATOR_ID, connections::RECEIVER_ID] {
            let deleted: Vec<Connection> = service
                .from(CONNECTIONS_TABLE)
                .eq(column, row.id)
                .delete()
                .await?;
            removed += deleted.len();
        }
    }

    if !rows.is_empty() {
        let deleted: Vec<FounderProfile> = service
            .from(FOUNDERS_TABLE)
            .eq(founders::USER_ID, user.id)
            .delete()
            .await?;
        removed += deleted.len();
    }

    service.auth().admin_delete_user(user.id).await?;
    Ok(removed)
}
