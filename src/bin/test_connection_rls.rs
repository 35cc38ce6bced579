//! Row-level-security checks on connection requests.
//!
//! A sends B a request; A must not be able to forge one from B; B (the receiver) can
//! read and accept it; an unrelated user C can neither read nor change it.

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::Config;
use rust_founder_probes::errors::AppError;
use rust_founder_probes::fixtures::Fixtures;
use rust_founder_probes::models::{Connection, ConnectionStatus, NewConnection, NewFounderProfile};
use rust_founder_probes::polling::poll_until;
use rust_founder_probes::probe::{Expectation, Observation, Operation, ProbeCase, ProbeReport, Target};
use rust_founder_probes::rest_client::patch;
use rust_founder_probes::schema::{connections, CONNECTIONS_TABLE};
use rust_founder_probes::{obs, report};
use serde_json::json;
use std::time::Duration;

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
    let admin = BackendClient::service(&config).ok();
    if admin.is_none() {
        report::warn("No service role key: users come from sign-up and will be left behind");
    }
    let mut fixtures = Fixtures::new(admin);

    let outcome = run(&config, &anon, &mut fixtures).await;

    report::section("Cleanup");
    let leftovers = fixtures.cleanup().await;
    if leftovers == 0 {
        report::pass("All test users and rows removed");
    } else {
        report::warn(format!("{} item(s) could not be cleaned up", leftovers));
    }

    match outcome {
        Ok(report) => {
            report.print_summary();
            std::process::exit(report.exit_code());
        }
        Err(e) => {
            report::fail(format!("Setup failed: {}", e));
            std::process::exit(1);
        }
    }
}

async fn run(
    config: &Config,
    anon: &BackendClient,
    fixtures: &mut Fixtures,
) -> Result<ProbeReport, AppError> {
    report::section("Setup");
    let user_a = fixtures.create_user(anon, &config.probe_email_domain).await?;
    let user_b = fixtures.create_user(anon, &config.probe_email_domain).await?;
    let user_c = fixtures.create_user(anon, &config.probe_email_domain).await?;

    let client_a = anon.as_user(&user_a.session);
    let client_b = anon.as_user(&user_b.session);
    let client_c = anon.as_user(&user_c.session);

    let founder_a = fixtures
        .create_founder(&client_a, &NewFounderProfile::probe(user_a.id(), "Founder A", true))
        .await?;
    let founder_b = fixtures
        .create_founder(&client_b, &NewFounderProfile::probe(user_b.id(), "Founder B", true))
        .await?;
    fixtures
        .create_founder(&client_c, &NewFounderProfile::probe(user_c.id(), "Founder C", true))
        .await?;
    report::pass("Created three users with visible founder rows");

    let mut report = ProbeReport::new("Connection row-level security");

    // A → B as A: the legitimate request
    let request = NewConnection {
        initiator_id: founder_a.id,
        receiver_id: founder_b.id,
        status: ConnectionStatus::Pending,
    };
    let created = client_a
        .from(CONNECTIONS_TABLE)
        .insert::<Connection, _>(&request)
        .await;
    if let Ok(rows) = &created {
        for row in rows {
            fixtures.track_connection(row.id, &client_a);
        }
    }
    report.record(
        ProbeCase::new("user A", Operation::Insert, Target::Own, Expectation::Allowed),
        Observation::from_insert(&created),
    );
    let connection = match created {
        Ok(mut rows) if !rows.is_empty() => rows.remove(0),
        _ => return Ok(report),
    };

    // B → A forged by A: A names B's founder as the initiator
    let forged = NewConnection {
        initiator_id: founder_b.id,
        receiver_id: founder_a.id,
        status: ConnectionStatus::Pending,
    };
    let forged_result = client_a
        .from(CONNECTIONS_TABLE)
        .insert::<Connection, _>(&forged)
        .await;
    if let Ok(rows) = &forged_result {
        for row in rows {
            fixtures.track_connection(row.id, &client_a);
        }
    }
    report.record(
        ProbeCase::new("user A", Operation::Insert, Target::Other, Expectation::Denied),
        Observation::from_insert(&forged_result),
    );

    for (actor, client, target, expected) in [
        ("user A", &client_a, Target::Own, Expectation::Allowed),
        ("user B", &client_b, Target::Own, Expectation::Allowed),
        ("user C", &client_c, Target::Other, Expectation::Denied),
    ] {
        let result = client
            .from(CONNECTIONS_TABLE)
            .eq(connections::ID, connection.id)
            .execute::<Connection>()
            .await;
        report.record(
            ProbeCase::new(actor, Operation::Select, target, expected),
            Observation::from_rows(&result),
        );
    }

    let accept = patch(&[(connections::STATUS, json!(ConnectionStatus::Accepted))]);

    let hijack = client_c
        .from(CONNECTIONS_TABLE)
        .eq(connections::ID, connection.id)
        .update::<Connection, _>(&accept)
        .await;
    report.record(
        ProbeCase::new("user C", Operation::Update, Target::Other, Expectation::Denied),
        Observation::from_rows(&hijack),
    );

    let accepted = client_b
        .from(CONNECTIONS_TABLE)
        .eq(connections::ID, connection.id)
        .update::<Connection, _>(&accept)
        .await;
    report.record(
        ProbeCase::new("user B", Operation::Update, Target::Own, Expectation::Allowed),
        Observation::from_rows(&accepted),
    );

    // The initiator should see the new status once it has propagated
    let connection_id = connection.id;
    let seen = poll_until(5, Duration::from_millis(500), || {
        let client = client_a.clone();
        async move {
            let row = client
                .from(CONNECTIONS_TABLE)
                .eq(connections::ID, connection_id)
                .maybe_single::<Connection>()
                .await?;
            Ok(row.filter(|c| c.status == ConnectionStatus::Accepted))
        }
    })
    .await;
    report.record(
        ProbeCase::new(
            "user A (after accept)",
            Operation::Select,
            Target::Own,
            Expectation::Allowed,
        ),
        match seen {
            Some(_) => Observation::allowed("status accepted"),
            None => Observation::denied("status never became accepted"),
        },
    );

    Ok(report)
}
