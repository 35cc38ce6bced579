//! Uploads an avatar as a signed-in user and checks it can be listed, downloaded and
//! served publicly, and that uploads into another user's folder are refused.

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::Config;
use rust_founder_probes::errors::AppError;
use rust_founder_probes::fixtures::Fixtures;
use rust_founder_probes::probe::{Expectation, Observation, Operation, ProbeCase, ProbeReport, Target};
use rust_founder_probes::{obs, report};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A 1x1 transparent PNG.
const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

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
    let mut fixtures = Fixtures::new(admin);

    let outcome = run(&config, &anon, &mut fixtures).await;

    report::section("Cleanup");
    let leftovers = fixtures.cleanup().await;
    if leftovers == 0 {
        report::pass("All test users and objects removed");
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
    let bucket = config.avatar_bucket.as_str();

    report::section("Setup");
    let owner = fixtures.create_user(anon, &config.probe_email_domain).await?;
    let stranger = fixtures.create_user(anon, &config.probe_email_domain).await?;
    let client = anon.as_user(&owner.session);
    let storage = client.storage();
    report::pass(format!("Uploading as {}", owner.email));

    let mut report = ProbeReport::new("Avatar storage");

    let folder = owner.id().to_string();
    let file_name = format!("avatar-{}.png", Uuid::new_v4().simple());
    let path = format!("{}/{}", folder, file_name);

    let uploaded = storage
        .upload(bucket, &path, TINY_PNG.to_vec(), "image/png", false)
        .await;
    if uploaded.is_ok() {
        fixtures.track_object(bucket, &path, &client);
    }
    let upload_ok = report.record(
        ProbeCase::new("owner", Operation::Insert, Target::Own, Expectation::Allowed),
        Observation::from_unit(&uploaded),
    );
    if !upload_ok {
        return Ok(report);
    }

    let listing = storage.list(bucket, &folder).await;
    let listed = matches!(&listing, Ok(objects) if objects.iter().any(|o| o.name == file_name));
    report::check(listed, format!("{} listed under {}/", file_name, folder));
    if let Ok(objects) = &listing {
        if let Some(size) = objects
            .iter()
            .find(|o| o.name == file_name)
            .and_then(|o| o.size())
        {
            report::info(format!("Reported size: {} bytes", size));
        }
    }

    let expected_digest = sha256_hex(TINY_PNG);
    let downloaded = storage.download(bucket, &path).await;
    report.record(
        ProbeCase::new("owner", Operation::Select, Target::Own, Expectation::Allowed),
        Observation::from_unit(&downloaded),
    );
    if let Ok(bytes) = &downloaded {
        report::check(
            sha256_hex(bytes) == expected_digest,
            format!("Downloaded content matches (sha256 {})", &expected_digest[..12]),
        );
    }

    let public_url = storage.public_url(bucket, &path);
    report::info(format!("Public URL: {}", public_url));
    match reqwest::get(&public_url).await {
        Ok(response) if response.status().is_success() => {
            report::pass("Public URL serves the object")
        }
        Ok(response) => report::warn(format!(
            "Public URL returned {} (bucket may be private)",
            response.status()
        )),
        Err(e) => report::warn(format!("Public URL unreachable: {}", e)),
    }

    // Writing into someone else's folder
    let foreign_path = format!("{}/intruder-{}.png", stranger.id(), Uuid::new_v4().simple());
    let intrusion = storage
        .upload(bucket, &foreign_path, TINY_PNG.to_vec(), "image/png", false)
        .await;
    if intrusion.is_ok() {
        fixtures.track_object(bucket, &foreign_path, &client);
    }
    report.record(
        ProbeCase::new("owner", Operation::Insert, Target::Other, Expectation::Denied),
        Observation::from_unit(&intrusion),
    );

    let removed = storage.remove(bucket, &[path.as_str()]).await;
    if matches!(&removed, Ok(objects) if !objects.is_empty()) {
        fixtures.forget_object(bucket, &path);
    }
    report.record(
        ProbeCase::new("owner", Operation::Delete, Target::Own, Expectation::Allowed),
        Observation::from_rows(&removed),
    );

    Ok(report)
}
