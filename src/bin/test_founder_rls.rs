//! Two-user row-level-security matrix on the founders table.
//!
//! Users A and B own visible rows; user C owns a hidden row. A and B each try to read,
//! impersonate, edit and delete their own row, the other's row and C's hidden row.

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::Config;
use rust_founder_probes::errors::AppError;
use rust_founder_probes::core::fixtures::Fixtures;
use rust_founder_probes::models::{FounderProfile, NewFounderProfile};
use rust_founder_probes::polling::poll_until;
use rust_founder_probes::core::probe::{
    founder_delete_cases, founder_matrix, Expectation, FounderProbe, Observation, Operation,
    ProbeCase, ProbeReport, Target,
};
use rust_founder_probes::schema::{founders, FOUNDERS_TABLE};
use rust_founder_probes::{obs, report};
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
    report::pass(format!(
        "Created users A={} B={} C={}",
        user_a.id(),
        user_b.id(),
        user_c.id()
    ));

    let client_a = anon.as_user(&user_a.session);
    let client_b = anon.as_user(&user_b.session);
    let client_c = anon.as_user(&user_c.session);

    let row_a = fixtures
        .create_founder(&client_a, &NewFounderProfile::probe(user_a.id(), "Founder A", true))
        .await?;
    let row_b = fixtures
        .create_founder(&client_b, &NewFounderProfile::probe(user_b.id(), "Founder B", true))
        .await?;
    let row_c = fixtures
        .create_founder(&client_c, &NewFounderProfile::probe(user_c.id(), "Founder C", false))
        .await?;
    report::pass("Created founder rows (A, B visible; C hidden)");

    let other_id = row_b.id;
    let readable = poll_until(5, Duration::from_millis(500), || {
        let client = client_a.clone();
        async move {
            client
                .from(FOUNDERS_TABLE)
                .eq(founders::ID, other_id)
                .maybe_single::<FounderProfile>()
                .await
        }
    })
    .await;
    if readable.is_none() {
        report::warn("B's row never became readable to A; SELECT cases may fail");
    }

    let mut report = ProbeReport::new("Founder row-level security");
    let mut probe_a = FounderProbe::new(
        client_a.clone(),
        Some(row_a.clone()),
        row_b.clone(),
        row_c.clone(),
    );
    let mut probe_b = FounderProbe::new(
        client_b.clone(),
        Some(row_b.clone()),
        row_a.clone(),
        row_c.clone(),
    );

    probe_a.run(&mut report, founder_matrix("user A")).await;
    probe_b.run(&mut report, founder_matrix("user B")).await;

    // Hidden rows stay readable to their owner
    let own_hidden = client_c
        .from(FOUNDERS_TABLE)
        .eq(founders::ID, row_c.id)
        .execute::<FounderProfile>()
        .await;
    report.record(
        ProbeCase::new("user C", Operation::Select, Target::Own, Expectation::Allowed),
        Observation::from_rows(&own_hidden),
    );

    // Foreign deletes first, so neither own row is gone before the other user tries it
    let (own_a, foreign_a): (Vec<_>, Vec<_>) = founder_delete_cases("user A")
        .into_iter()
        .partition(|c| c.target == Target::Own);
    let (own_b, foreign_b): (Vec<_>, Vec<_>) = founder_delete_cases("user B")
        .into_iter()
        .partition(|c| c.target == Target::Own);
    probe_a.run(&mut report, foreign_a).await;
    probe_b.run(&mut report, foreign_b).await;
    probe_a.run(&mut report, own_a).await;
    probe_b.run(&mut report, own_b).await;

    for probe in [&mut probe_a, &mut probe_b] {
        for id in probe.take_deleted() {
            fixtures.forget_founder(id);
        }
        for id in probe.take_leaked() {
            report::warn(format!(
                "Impersonated row {} was created by {}",
                id,
                probe.client().identity()
            ));
            fixtures.track_founder(id, probe.client());
        }
    }

    Ok(report)
}
