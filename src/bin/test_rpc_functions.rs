//! Exercises the backend-defined functions the app relies on.

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::Config;
use rust_founder_probes::errors::AppError;
use rust_founder_probes::fixtures::Fixtures;
use rust_founder_probes::models::{FounderProfile, NewFounderProfile};
use rust_founder_probes::polling::poll_until;
use rust_founder_probes::schema::{founders, FOUNDERS_TABLE};
use rust_founder_probes::{obs, report};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

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

    let anon = BackendClient::anon(&config)?;
    let service = BackendClient::service(&config).ok();
    let mut fixtures = Fixtures::new(service.clone());

    let outcome = run(&config, &anon, service.as_ref(), &mut fixtures).await;

    report::section("Cleanup");
    let leftovers = fixtures.cleanup().await;
    if leftovers > 0 {
        report::warn(format!("{} item(s) could not be cleaned up", leftovers));
    }

    match outcome {
        Ok(0) => {
            report::pass("All RPC checks passed");
            Ok(())
        }
        Ok(failures) => {
            report::fail(format!("{} RPC check(s) failed", failures));
            std::process::exit(1);
        }
        Err(e) => {
            report::fail(format!("Setup failed: {}", e));
            std::process::exit(1);
        }
    }
}

/// Returns the number of failed checks.
async fn run(
    config: &Config,
    anon: &BackendClient,
    service: Option<&BackendClient>,
    fixtures: &mut Fixtures,
) -> Result<usize, AppError> {
    let mut failures = 0;
    let mut check = |ok: bool, message: String| {
        if !report::check(ok, message) {
            failures += 1;
        }
    };

    report::section("is_valid_uuid");
    for (input, expected) in [
        (Uuid::new_v4().to_string(), true),
        ("not-a-uuid".to_string(), false),
    ] {
        match anon
            .rpc::<bool>("is_valid_uuid", &json!({ "input": input }))
            .await
        {
            Ok(valid) => check(valid == expected, format!("is_valid_uuid({}) = {}", input, valid)),
            Err(e) => check(false, format!("is_valid_uuid({}): {}", input, e)),
        }
    }

    report::section("reload_schema_cache");
    match service {
        Some(service) => match service.rpc::<Value>("reload_schema_cache", &json!({})).await {
            Ok(_) => check(true, "Schema cache reload requested".to_string()),
            Err(e) => check(false, format!("reload_schema_cache: {}", e)),
        },
        None => report::warn("No service role key: skipping"),
    }

    report::section("upsert_founder_profile");
    let user = fixtures.create_user(anon, &config.probe_email_domain).await?;
    let client = anon.as_user(&user.session);
    let user_id = user.id();

    let called = client
        .rpc::<Value>(
            "upsert_founder_profile",
            &json!({
                "p_name": "RPC Founder",
                "p_bio": "Created through upsert_founder_profile",
                "p_company": "Probe Labs",
            }),
        )
        .await;
    check(
        called.is_ok(),
        match &called {
            Ok(_) => "upsert_founder_profile accepted".to_string(),
            Err(e) => format!("upsert_founder_profile: {}", e),
        },
    );

    let row = poll_until(5, Duration::from_millis(500), || {
        let client = client.clone();
        async move {
            client
                .from(FOUNDERS_TABLE)
                .eq(founders::USER_ID, user_id)
                .maybe_single::<FounderProfile>()
                .await
        }
    })
    .await;
    if let Some(ref row) = row {
        fixtures.track_founder(row.id, &client);
    }
    check(row.is_some(), "Founder row readable after RPC".to_string());

    report::section("Table upsert on user_id");
    let mut profile = NewFounderProfile::probe(user_id, "Upserted Founder", true);
    profile.profile_progress = 40;
    let upserted = client
        .from(FOUNDERS_TABLE)
        .upsert::<FounderProfile, _>(&profile, Some(founders::USER_ID))
        .await;
    match &upserted {
        Ok(rows) => {
            if row.is_none() {
                for r in rows {
                    fixtures.track_founder(r.id, &client);
                }
            }
            check(!rows.is_empty(), format!("Upsert returned {} row(s)", rows.len()));
        }
        Err(e) => check(false, format!("Upsert failed: {}", e)),
    }

    match client
        .from(FOUNDERS_TABLE)
        .eq(founders::USER_ID, user_id)
        .count()
        .await
    {
        Ok(n) => check(n == 1, format!("{} founder row(s) for the user after upsert", n)),
        Err(e) => check(false, format!("Count after upsert: {}", e)),
    }

    Ok(failures)
}
