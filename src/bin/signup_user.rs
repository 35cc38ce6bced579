//! Signs up a new user and, when a session comes back, creates their founder row.
//!
//! Usage: `signup_user <email> <password>`

use rust_founder_probes::client::BackendClient;
use rust_founder_probes::config::Config;
use rust_founder_probes::credentials;
use rust_founder_probes::models::{FounderProfile, NewFounderProfile};
use rust_founder_probes::polling::poll_until;
use rust_founder_probes::schema::{founders, FOUNDERS_TABLE};
use rust_founder_probes::{obs, report};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (email, password) = match credentials::email_and_password(&args) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: signup_user <email> <password>");
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

    let anon = BackendClient::anon(&config)?;

    report::section("Sign up");
    let outcome = match anon.auth().sign_up(&email, &password).await {
        Ok(outcome) => {
            report::pass(format!("Signed up {} as {}", email, outcome.user.id));
            outcome
        }
        Err(e) => {
            report::fail(format!("Sign-up failed: {}", e));
            std::process::exit(1);
        }
    };

    let Some(session) = outcome.session else {
        report::warn("No session returned: confirm the email before signing in");
        return Ok(());
    };

    let client = anon.as_user(&session);
    let user_id = session.user.id;

    report::section("Founder profile");
    let profile = NewFounderProfile {
        user_id,
        name: email.split('@').next().map(str::to_string),
        is_visible: false,
        profile_progress: 0,
        ..Default::default()
    };
    match client
        .from(FOUNDERS_TABLE)
        .insert::<FounderProfile, _>(&profile)
        .await
    {
        Ok(rows) if !rows.is_empty() => report::pass("Founder row inserted"),
        Ok(_) => report::warn("Insert accepted but returned no row"),
        Err(e) => {
            report::fail(format!("Founder insert failed: {}", e));
            return Ok(());
        }
    }

    let stored = poll_until(5, Duration::from_millis(500), || {
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

    match stored {
        Some(row) => {
            report::pass(format!("Founder row {} readable", row.id));
            println!("{}", serde_json::to_string_pretty(&row)?);
        }
        None => report::fail("Founder row never became readable"),
    }

    Ok(())
}
