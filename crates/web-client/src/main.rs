//! Blastfurnace Web Client
//!
//! Reports whether a session is active, then fetches the protected secrets
//! once and prints the outcome.

use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use web_client::config::ClientConfig;
use web_client::fetch_coordinator::{FetchCoordinator, FetchError, FetchOutcome, FetchState};
use web_client::session::{session_summary, StaticSessionProvider};
use web_client::token_supplier::TokenSupplier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "web_client=info".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let config = ClientConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let session = StaticSessionProvider::new(config.access_token.clone());
    let auth_state = session.auth_state();

    let supplier = TokenSupplier::new(Arc::new(session));
    let session_error = supplier.on_auth_state_change(auth_state).await.err();
    if let Some(e) = &session_error {
        error!("Failed to obtain access token: {}", e);
    }

    for line in session_summary(auth_state, session_error.as_ref()) {
        println!("{line}");
    }

    let coordinator = FetchCoordinator::new(
        config.secrets_url(),
        supplier.receiver(),
        config.missing_token_policy,
        config.http_timeout,
    );

    match coordinator.request_fetch().await {
        Ok(FetchOutcome::Completed(FetchState::Completed { status, payload })) => {
            println!("Status: {status}");
            for secret in payload {
                println!("  - {secret}");
            }
        }
        Ok(outcome) => println!("Fetch outcome: {outcome:?}"),
        Err(FetchError::NoToken) => println!("Not fetching: no access token"),
        Err(FetchError::TransportFailure(reason)) => {
            println!("Status: unreachable ({reason})");
        }
    }

    Ok(())
}
