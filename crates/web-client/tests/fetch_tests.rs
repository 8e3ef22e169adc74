//! Fetch coordinator integration tests.
//!
//! Drives the token supplier and fetch coordinator against a wiremock stand-in
//! for the protected endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use common::secret::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use web_client::fetch_coordinator::{
    FetchCoordinator, FetchError, FetchOutcome, FetchState, MissingTokenPolicy,
    TRANSPORT_FAILURE_STATUS,
};
use web_client::session::{AuthState, StaticSessionProvider};
use web_client::token_supplier::TokenSupplier;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TOKEN: &str = "header.payload.signature";

async fn signed_in_supplier() -> TokenSupplier {
    let supplier = TokenSupplier::new(Arc::new(StaticSessionProvider::new(Some(
        SecretString::from(TOKEN),
    ))));
    supplier
        .on_auth_state_change(AuthState::Authenticated)
        .await
        .unwrap();
    supplier
}

fn signed_out_supplier() -> TokenSupplier {
    TokenSupplier::new(Arc::new(StaticSessionProvider::new(None)))
}

fn coordinator(
    server: &MockServer,
    supplier: &TokenSupplier,
    policy: MissingTokenPolicy,
) -> FetchCoordinator {
    FetchCoordinator::new(
        format!("{}/private", server.uri()),
        supplier.receiver(),
        policy,
        Duration::from_secs(5),
    )
}

// =============================================================================
// Outcomes
// =============================================================================

#[tokio::test]
async fn test_success_parses_secrets() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"secrets": ["one", "two"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let supplier = signed_in_supplier().await;
    let coordinator = coordinator(&server, &supplier, MissingTokenPolicy::default());
    assert_eq!(coordinator.state(), FetchState::Idle);

    let outcome = coordinator.request_fetch().await?;

    let expected = FetchState::Completed {
        status: 200,
        payload: vec!["one".to_string(), "two".to_string()],
    };
    assert_eq!(outcome, FetchOutcome::Completed(expected.clone()));
    assert_eq!(coordinator.state(), expected);
    assert!(coordinator.can_request());
    Ok(())
}

#[tokio::test]
async fn test_rejection_discards_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"secrets": ["should-not-leak"]})),
        )
        .mount(&server)
        .await;

    let supplier = signed_in_supplier().await;
    let coordinator = coordinator(&server, &supplier, MissingTokenPolicy::default());

    coordinator.request_fetch().await?;

    assert_eq!(
        coordinator.state(),
        FetchState::Completed {
            status: 403,
            payload: vec![]
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_transport_failure_uses_sentinel() {
    let supplier = signed_in_supplier().await;
    // Port 1 on loopback refuses connections.
    let coordinator = FetchCoordinator::new(
        "http://127.0.0.1:1/private".to_string(),
        supplier.receiver(),
        MissingTokenPolicy::default(),
        Duration::from_secs(2),
    );

    let result = coordinator.request_fetch().await;

    assert!(matches!(result, Err(FetchError::TransportFailure(_))));
    assert_eq!(
        coordinator.state(),
        FetchState::Completed {
            status: TRANSPORT_FAILURE_STATUS,
            payload: vec![]
        }
    );
    assert!(coordinator.state().is_transport_failure());
    assert!(coordinator.can_request());
}

#[tokio::test]
async fn test_timeout_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let supplier = signed_in_supplier().await;
    let coordinator = FetchCoordinator::new(
        format!("{}/private", server.uri()),
        supplier.receiver(),
        MissingTokenPolicy::default(),
        Duration::from_millis(200),
    );

    assert!(matches!(
        coordinator.request_fetch().await,
        Err(FetchError::TransportFailure(_))
    ));
    assert!(coordinator.state().is_transport_failure());
}

// =============================================================================
// Single flight
// =============================================================================

#[tokio::test]
async fn test_rapid_triggers_issue_one_request() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"secrets": ["only-once"]}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let supplier = signed_in_supplier().await;
    let coordinator = coordinator(&server, &supplier, MissingTokenPolicy::default());

    let (first, second) = tokio::join!(coordinator.request_fetch(), coordinator.request_fetch());

    let expected = FetchState::Completed {
        status: 200,
        payload: vec!["only-once".to_string()],
    };
    assert_eq!(first?, FetchOutcome::Completed(expected.clone()));
    assert_eq!(second?, FetchOutcome::Suppressed);
    assert_eq!(coordinator.state(), expected);
    Ok(())
}

#[tokio::test]
async fn test_trigger_disabled_while_pending() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"secrets": []}))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let supplier = signed_in_supplier().await;
    let coordinator = coordinator(&server, &supplier, MissingTokenPolicy::default());
    let mut states = coordinator.subscribe();

    let observer = async {
        states.changed().await.unwrap();
        let pending = states.borrow_and_update().clone();
        (pending, coordinator.can_request())
    };

    let (result, (observed, can_request)) = tokio::join!(coordinator.request_fetch(), observer);
    result?;

    assert_eq!(observed, FetchState::Pending);
    assert!(!can_request);
    assert!(coordinator.can_request());
    Ok(())
}

#[tokio::test]
async fn test_abandoned_fetch_does_not_stay_pending() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"secrets": ["eventually"]}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let supplier = signed_in_supplier().await;
    let coordinator = coordinator(&server, &supplier, MissingTokenPolicy::default());

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), coordinator.request_fetch()).await;
    assert!(abandoned.is_err());

    assert!(coordinator.state().is_transport_failure());
    assert!(coordinator.can_request());

    let outcome = coordinator.request_fetch().await?;
    assert_eq!(
        outcome,
        FetchOutcome::Completed(FetchState::Completed {
            status: 200,
            payload: vec!["eventually".to_string()]
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_refetch_after_completion() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"secrets": ["s"]})))
        .expect(2)
        .mount(&server)
        .await;

    let supplier = signed_in_supplier().await;
    let coordinator = coordinator(&server, &supplier, MissingTokenPolicy::default());

    coordinator.request_fetch().await?;
    coordinator.request_fetch().await?;
    Ok(())
}

// =============================================================================
// Missing token policy
// =============================================================================

#[tokio::test]
async fn test_no_token_sends_unauthenticated_and_records_401() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(|request: &Request| {
            // Never an empty bearer: the header is simply absent.
            if request.headers.contains_key("authorization") {
                ResponseTemplate::new(400)
            } else {
                ResponseTemplate::new(401)
            }
        })
        .expect(1)
        .mount(&server)
        .await;

    let supplier = signed_out_supplier();
    supplier
        .on_auth_state_change(AuthState::Unauthenticated)
        .await?;
    let coordinator = coordinator(&server, &supplier, MissingTokenPolicy::SendUnauthenticated);

    coordinator.request_fetch().await?;

    assert_eq!(
        coordinator.state(),
        FetchState::Completed {
            status: 401,
            payload: vec![]
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_no_token_fail_fast_leaves_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let supplier = signed_out_supplier();
    let coordinator = coordinator(&server, &supplier, MissingTokenPolicy::FailFast);

    assert!(matches!(
        coordinator.request_fetch().await,
        Err(FetchError::NoToken)
    ));
    assert_eq!(coordinator.state(), FetchState::Idle);
}

#[tokio::test]
async fn test_token_picked_up_after_sign_in() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"secrets": ["late"]})))
        .expect(1)
        .mount(&server)
        .await;

    let supplier = TokenSupplier::new(Arc::new(StaticSessionProvider::new(Some(
        SecretString::from(TOKEN),
    ))));
    let coordinator = coordinator(&server, &supplier, MissingTokenPolicy::FailFast);

    assert!(matches!(
        coordinator.request_fetch().await,
        Err(FetchError::NoToken)
    ));

    supplier
        .on_auth_state_change(AuthState::Authenticated)
        .await?;

    let outcome = coordinator.request_fetch().await?;
    assert_eq!(
        outcome,
        FetchOutcome::Completed(FetchState::Completed {
            status: 200,
            payload: vec!["late".to_string()]
        })
    );
    Ok(())
}
