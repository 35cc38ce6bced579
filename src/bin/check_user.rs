//! Signs in as an existing user and prints what that user can see of their own data.
//!
//! Usage: `check_user <email> <password>`

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::Config;
use rust_founder_probes::credentials;
use rust_founder_probes::models::FounderProfile;
use rust_founder_probes::schema::{connections, founders, CONNECTIONS_TABLE, FOUNDERS_TABLE};
use rust_founder_probes::{obs, report};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (email, password) = match credentials::email_and_password(&args) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: check_user <email> <password>");
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

    let mut client = BackendClient::anon(&config)?;

    report::section("Sign in");
    let session = match client.sign_in(&email, &password).await {
        Ok(session) => {
            report::pass(format!("Signed in as {}", session.user.id));
            session
        }
        Err(e) => {
            report::fail(format!("Sign-in failed: {}", e));
            std::process::exit(1);
        }
    };
    report::info(format!(
        "Email confirmed: {}",
        session
            .user
            .email_confirmed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "no".to_string())
    ));

    match client.auth().get_user(&session.access_token).await {
        Ok(user) => {
            report::check(user.id == session.user.id, "Session resolves to the same user");
        }
        Err(e) => report::fail(format!("Could not read session user: {}", e)),
    }

    report::section("Founder profile");
    let profile = match client
        .from(FOUNDERS_TABLE)
        .eq(founders::USER_ID, session.user.id)
        .maybe_single::<FounderProfile>()
        .await
    {
        Ok(Some(profile)) => {
            report::pass(format!("Founder row {}", profile.id));
            report::info(format!("Name: {}", profile.name.as_deref().unwrap_or("-")));
            report::info(format!("Company: {}", profile.company.as_deref().unwrap_or("-")));
            report::info(format!("Visible: {}", profile.is_visible));
            report::info(format!(
                "Onboarding completed: {} ({}%)",
                profile.onboarding_completed, profile.profile_progress
            ));
            Some(profile)
        }
        Ok(None) => {
            report::warn("No founder row for this user");
            None
        }
        Err(e) => {
            report::fail(format!("Founder lookup failed: {}", e));
            None
        }
    };

    if let Some(profile) = profile {
        report::section("Connections");
        for (label, column) in [
            ("Sent", connections::INITIATOR_ID),
            ("Received", connections::RECEIVER_ID),
        ] {
            match client
                .from(CONNECTIONS_TABLE)
                .eq(column, profile.id)
                .count()
                .await
            {
                Ok(n) => report::info(format!("{}: {}", label, n)),
                Err(e) => report::fail(format!("{} connections: {}", label, e)),
            }
        }
    }

    match client.sign_out().await {
        Ok(()) => report::pass("Signed out"),
        Err(e) => report::warn(format!("Sign-out failed: {}", e)),
    }

    Ok(())
}
