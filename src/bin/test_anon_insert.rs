//! Verifies that the anonymous role cannot write founder rows.
//!
//! With a service-role key it also seeds a visible and a hidden row and runs the
//! anonymous read/update/delete cases against them.

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::Config;
use rust_founder_probes::errors::AppError;
use rust_founder_probes::fixtures::Fixtures;
use rust_founder_probes::models::{FounderProfile, NewFounderProfile};
use rust_founder_probes::probe::{
    anonymous_founder_matrix, Expectation, FounderProbe, Observation, Operation, ProbeCase,
    ProbeReport, Target,
};
use rust_founder_probes::schema::FOUNDERS_TABLE;
use rust_founder_probes::{obs, report};
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
    let admin = BackendClient::service(&config).ok();
    let mut fixtures = Fixtures::new(admin.clone());
    let mut report = ProbeReport::new("Anonymous access to founders");

    // Plain insert with a random owner: must be refused before any constraint is checked
    let payload = NewFounderProfile::probe(Uuid::new_v4(), "Anonymous intruder", true);
    let result = anon
        .from(FOUNDERS_TABLE)
        .insert::<FounderProfile, _>(&payload)
        .await;
    if let Ok(rows) = &result {
        for row in rows {
            fixtures.track_founder(row.id, &anon);
        }
    }
    report.record(
        ProbeCase::new("anonymous", Operation::Insert, Target::Other, Expectation::Denied),
        Observation::from_insert(&result),
    );
    let rls_refusal = matches!(&result, Err(e) if e.is_permission_denied());
    report.record(
        ProbeCase::new(
            "anonymous (error code)",
            Operation::Insert,
            Target::Other,
            Expectation::Denied,
        ),
        if rls_refusal {
            Observation::denied("permission denied (not a constraint error)")
        } else {
            Observation::allowed("insert was not refused by row-level security")
        },
    );

    if admin.is_some() {
        if let Err(e) = run_seeded_cases(&config, &anon, &mut fixtures, &mut report).await {
            report::fail(format!("Seeded setup failed: {}", e));
        }
    } else {
        report::warn("No service role key: skipping seeded anonymous cases");
    }

    let leftovers = fixtures.cleanup().await;
    if leftovers > 0 {
        report::warn(format!("{} item(s) could not be cleaned up", leftovers));
    }

    report.print_summary();
    std::process::exit(report.exit_code());
}

async fn run_seeded_cases(
    config: &Config,
    anon: &BackendClient,
    fixtures: &mut Fixtures,
    report: &mut ProbeReport,
) -> Result<(), AppError> {
    let visible_owner = fixtures.create_user(anon, &config.probe_email_domain).await?;
    let hidden_owner = fixtures.create_user(anon, &config.probe_email_domain).await?;

    let visible = fixtures
        .create_founder(
            &anon.as_user(&visible_owner.session),
            &NewFounderProfile::probe(visible_owner.id(), "Visible Founder", true),
        )
        .await?;
    let hidden = fixtures
        .create_founder(
            &anon.as_user(&hidden_owner.session),
            &NewFounderProfile::probe(hidden_owner.id(), "Hidden Founder", false),
        )
        .await?;

    let mut probe = FounderProbe::new(anon.clone(), None, visible, hidden);
    probe.run(report, anonymous_founder_matrix()).await;
    for id in probe.take_deleted() {
        fixtures.forget_founder(id);
    }
    for id in probe.take_leaked() {
        report::warn(format!("Anonymous insert created row {}", id));
        fixtures.track_founder(id, probe.client());
    }

    Ok(())
}
