//! End-to-end membership tests.
//!
//! Each test starts a disposable Postgres container, applies the crate's
//! migrations, and drives the Axum router with real requests. Identity
//! is stubbed with a static token-to-claims provider, so the full
//! bearer-token path (context resolution, membership sets) is exercised
//! without an external OIDC server.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::{Body, to_bytes},
    http::{
        Request, Response, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tower::ServiceExt;

use presence::{
    api::{self, AppContext},
    auth::{IdentityClaims, StaticIdentityProvider},
    crypto::EmailCodec,
};

const MASTER_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

struct TestApp {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
    app: Router,
    identity: Arc<StaticIdentityProvider>,
}

impl TestApp {
    /// Boots Postgres, applies migrations, and wires the router exactly
    /// as `api::new` does, minus the listener. Returns an error when no
    /// container runtime is available so callers can skip cleanly.
    async fn new() -> Result<Self> {
        let container = Postgres::default()
            .start()
            .await
            .context("failed to start postgres container")?;
        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;
        let dsn = format!("postgres://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&dsn)
            .await
            .context("failed to connect test pool")?;
        sqlx::migrate!().run(&pool).await?;

        let codec = Arc::new(EmailCodec::new(MASTER_KEY)?);
        let identity = Arc::new(StaticIdentityProvider::new());
        let state = Arc::new(AppContext::new(pool.clone(), codec, identity.clone()));

        let (router, _openapi) = api::router().split_for_parts();
        let app = router
            .layer(Extension(state))
            .layer(Extension(pool.clone()));

        Ok(Self {
            _container: container,
            pool,
            app,
            identity,
        })
    }

    fn login(&self, token: &str, email: &str, name: &str) {
        self.identity.insert(
            token,
            IdentityClaims {
                email: email.to_string(),
                name: Some(name.to_string()),
                email_verified: true,
            },
        );
    }

    /// Registers claims for `token` and bootstraps the local user via
    /// `POST /v1/session`, returning the user id.
    async fn signup(&self, token: &str, email: &str, name: &str) -> Result<i64> {
        self.login(token, email, name);
        let response = self.post(token, "/v1/session", &json!({})).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        body["id"].as_i64().context("session response missing id")
    }

    async fn post(&self, token: &str, uri: &str, payload: &Value) -> Result<Response<Body>> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))?;
        Ok(self.app.clone().oneshot(request).await?)
    }

    async fn get(&self, token: &str, uri: &str) -> Result<Response<Body>> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())?;
        Ok(self.app.clone().oneshot(request).await?)
    }

    async fn create_org(&self, token: &str, name: &str) -> Result<i64> {
        let payload = json!({ "name": name, "description": format!("{name} workspace") });
        let response = self.post(token, "/v1/orgs", &payload).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await?;
        body["id"].as_i64().context("org response missing id")
    }

    async fn invite(&self, token: &str, org_id: i64, target_email: &str) -> Result<Value> {
        let payload = json!({ "target_email": target_email, "organization_id": org_id });
        let response = self.post(token, "/v1/invitations", &payload).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    async fn invitation_status(&self, invitation_id: i64) -> Result<String> {
        let row = sqlx::query("SELECT status FROM invitations WHERE id = $1")
            .bind(invitation_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("status"))
    }
}

async fn body_json(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn session_bootstrap_is_idempotent() -> Result<()> {
    let Ok(app) = TestApp::new().await else {
        return Ok(());
    };

    let first = app.signup("tok-a", "Alice@Example.com", "Alice").await?;
    // Same identity, different casing: must converge on the same row.
    let second = app.signup("tok-a2", "alice@example.com", "Alice").await?;
    assert_eq!(first, second);

    // No token at all is a 401, not an anonymous user.
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/session")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A token the provider rejects is also a 401.
    let response = app.post("tok-unknown", "/v1/session", &json!({})).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn org_creation_assigns_admin_and_member() -> Result<()> {
    let Ok(app) = TestApp::new().await else {
        return Ok(());
    };

    let alice = app.signup("tok-a", "a@example.com", "Alice").await?;
    let org_id = app.create_org("tok-a", "Acme").await?;

    // The creator holds both roles, written in the same transaction.
    for table in ["organization_admins", "organization_members"] {
        let query = format!(
            "SELECT COUNT(*) AS n FROM {table} WHERE organization_id = $1 AND user_id = $2"
        );
        let row = sqlx::query(&query)
            .bind(org_id)
            .bind(alice)
            .fetch_one(&app.pool)
            .await?;
        assert_eq!(row.get::<i64, _>("n"), 1, "{table} row missing");
    }

    // Validation failures never reach the service.
    let response = app
        .post("tok-a", "/v1/orgs", &json!({ "name": " ", "description": "d" }))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post("tok-none", "/v1/orgs", &json!({ "name": "n", "description": "d" }))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn create_and_accept_invitation_flow() -> Result<()> {
    let Ok(app) = TestApp::new().await else {
        return Ok(());
    };

    app.signup("tok-a", "a@example.com", "Alice").await?;
    let bob = app.signup("tok-b", "b@x.com", "Bob").await?;
    let org_id = app.create_org("tok-a", "Acme").await?;

    let invitation = app.invite("tok-a", org_id, "b@x.com").await?;
    let invitation_id = invitation["id"].as_i64().context("missing id")?;
    assert_eq!(invitation["status"], "pending");
    assert_eq!(invitation["intended_for_id"].as_i64(), Some(bob));

    // Fresh invitations expire two weeks out.
    let expires_at: DateTime<Utc> = invitation["expires_at"]
        .as_str()
        .context("missing expires_at")?
        .parse()?;
    assert!(expires_at > Utc::now() + Duration::days(13));
    assert!(expires_at < Utc::now() + Duration::days(15));

    // Inviting again while pending converges on the same row.
    let repeat = app.invite("tok-a", org_id, "b@x.com").await?;
    assert_eq!(repeat["id"].as_i64(), Some(invitation_id));
    assert_eq!(repeat["status"], "pending");

    // Bob sees it in his inbox.
    let response = app.get("tok-b", "/v1/invitations").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["count"].as_u64(), Some(1));
    assert_eq!(body["invitations"][0]["organization_name"], "Acme");

    // Accepting creates the membership and flips the status, together.
    let response = app
        .post("tok-b", "/v1/invitations/accept", &json!({ "invitation_id": invitation_id }))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let member = body_json(response).await?;
    assert_eq!(member["organization_id"].as_i64(), Some(org_id));
    assert_eq!(member["user_id"].as_i64(), Some(bob));
    assert_eq!(app.invitation_status(invitation_id).await?, "accepted");

    // Accepted invitations are sticky: re-inviting returns them as-is.
    let sticky = app.invite("tok-a", org_id, "b@x.com").await?;
    assert_eq!(sticky["id"].as_i64(), Some(invitation_id));
    assert_eq!(sticky["status"], "accepted");

    // And a second accept is an invalid transition.
    let response = app
        .post("tok-b", "/v1/invitations/accept", &json!({ "invitation_id": invitation_id }))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn reject_and_reopen_flow() -> Result<()> {
    let Ok(app) = TestApp::new().await else {
        return Ok(());
    };

    app.signup("tok-a", "a@example.com", "Alice").await?;
    app.signup("tok-b", "b@x.com", "Bob").await?;
    let org_id = app.create_org("tok-a", "Acme").await?;

    let invitation = app.invite("tok-a", org_id, "b@x.com").await?;
    let invitation_id = invitation["id"].as_i64().context("missing id")?;

    let response = app
        .post("tok-b", "/v1/invitations/reject", &json!({ "invitation_id": invitation_id }))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.invitation_status(invitation_id).await?, "rejected");

    // Rejecting twice is an idempotent no-op.
    let response = app
        .post("tok-b", "/v1/invitations/reject", &json!({ "invitation_id": invitation_id }))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Re-inviting reopens the same row back to pending.
    let reopened = app.invite("tok-a", org_id, "b@x.com").await?;
    assert_eq!(reopened["id"].as_i64(), Some(invitation_id));
    assert_eq!(reopened["status"], "pending");

    // Admin cancels; cancelling again stays 200.
    let response = app
        .post("tok-a", "/v1/invitations/cancel", &json!({ "invitation_id": invitation_id }))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.invitation_status(invitation_id).await?, "cancelled");

    let response = app
        .post("tok-a", "/v1/invitations/cancel", &json!({ "invitation_id": invitation_id }))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // A cancelled invitation refuses accept and reject.
    for action in ["accept", "reject"] {
        let response = app
            .post(
                "tok-b",
                &format!("/v1/invitations/{action}"),
                &json!({ "invitation_id": invitation_id }),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{action}");
    }

    // But re-inviting reopens it once more.
    let reopened = app.invite("tok-a", org_id, "b@x.com").await?;
    assert_eq!(reopened["id"].as_i64(), Some(invitation_id));
    assert_eq!(reopened["status"], "pending");
    Ok(())
}

#[tokio::test]
async fn invitation_authorization_rules() -> Result<()> {
    let Ok(app) = TestApp::new().await else {
        return Ok(());
    };

    app.signup("tok-a", "a@example.com", "Alice").await?;
    app.signup("tok-b", "b@x.com", "Bob").await?;
    app.signup("tok-c", "c@x.com", "Carol").await?;
    let org_id = app.create_org("tok-a", "Acme").await?;

    // Bob joins as a plain member.
    let invitation = app.invite("tok-a", org_id, "b@x.com").await?;
    let invitation_id = invitation["id"].as_i64().context("missing id")?;
    app.post("tok-b", "/v1/invitations/accept", &json!({ "invitation_id": invitation_id }))
        .await?;

    // Members are not admins: Bob cannot invite Carol.
    let payload = json!({ "target_email": "c@x.com", "organization_id": org_id });
    let response = app.post("tok-b", "/v1/invitations", &payload).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Only the intended recipient may accept or reject.
    let carol_invitation = app.invite("tok-a", org_id, "c@x.com").await?;
    let carol_invitation_id = carol_invitation["id"].as_i64().context("missing id")?;
    for action in ["accept", "reject"] {
        let response = app
            .post(
                "tok-b",
                &format!("/v1/invitations/{action}"),
                &json!({ "invitation_id": carol_invitation_id }),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{action}");
    }

    // Only an admin of the organization may cancel.
    let response = app
        .post("tok-c", "/v1/invitations/cancel", &json!({ "invitation_id": carol_invitation_id }))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Inviting an email with no account is a 404.
    let payload = json!({ "target_email": "nobody@x.com", "organization_id": org_id });
    let response = app.post("tok-a", "/v1/invitations", &payload).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Malformed email never reaches the lookup.
    let payload = json!({ "target_email": "not-an-email", "organization_id": org_id });
    let response = app.post("tok-a", "/v1/invitations", &payload).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // No token at all.
    let payload = json!({ "target_email": "c@x.com", "organization_id": org_id });
    let response = app.post("tok-none", "/v1/invitations", &payload).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Unknown invitation ids are 404 for every action.
    for action in ["accept", "reject", "cancel"] {
        let response = app
            .post(
                "tok-a",
                &format!("/v1/invitations/{action}"),
                &json!({ "invitation_id": 999_999 }),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{action}");
    }
    Ok(())
}

#[tokio::test]
async fn expired_invitation_cannot_be_accepted() -> Result<()> {
    let Ok(app) = TestApp::new().await else {
        return Ok(());
    };

    app.signup("tok-a", "a@example.com", "Alice").await?;
    app.signup("tok-b", "b@x.com", "Bob").await?;
    let org_id = app.create_org("tok-a", "Acme").await?;

    let invitation = app.invite("tok-a", org_id, "b@x.com").await?;
    let invitation_id = invitation["id"].as_i64().context("missing id")?;

    sqlx::query("UPDATE invitations SET expires_at = NOW() - INTERVAL '1 day' WHERE id = $1")
        .bind(invitation_id)
        .execute(&app.pool)
        .await?;

    let response = app
        .post("tok-b", "/v1/invitations/accept", &json!({ "invitation_id": invitation_id }))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await?;
    assert_eq!(body["message"], "Invitation has expired");

    // The failed accept changed nothing.
    assert_eq!(app.invitation_status(invitation_id).await?, "pending");
    Ok(())
}

#[tokio::test]
async fn accept_rolls_back_on_membership_conflict() -> Result<()> {
    let Ok(app) = TestApp::new().await else {
        return Ok(());
    };

    app.signup("tok-a", "a@example.com", "Alice").await?;
    let bob = app.signup("tok-b", "b@x.com", "Bob").await?;
    let org_id = app.create_org("tok-a", "Acme").await?;

    let invitation = app.invite("tok-a", org_id, "b@x.com").await?;
    let invitation_id = invitation["id"].as_i64().context("missing id")?;

    // Force the member insert inside accept to hit the unique
    // constraint, so the transaction has to roll back the status update.
    sqlx::query("INSERT INTO organization_members (organization_id, user_id) VALUES ($1, $2)")
        .bind(org_id)
        .bind(bob)
        .execute(&app.pool)
        .await?;

    let response = app
        .post("tok-b", "/v1/invitations/accept", &json!({ "invitation_id": invitation_id }))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.invitation_status(invitation_id).await?, "pending");
    Ok(())
}

#[tokio::test]
async fn admin_search_with_filters() -> Result<()> {
    let Ok(app) = TestApp::new().await else {
        return Ok(());
    };

    app.signup("tok-a", "a@example.com", "Alice").await?;
    app.signup("tok-b", "b@x.com", "Bob").await?;
    app.signup("tok-c", "c@x.com", "Carol").await?;
    let org_id = app.create_org("tok-a", "Acme").await?;

    app.invite("tok-a", org_id, "b@x.com").await?;
    let carol_invitation = app.invite("tok-a", org_id, "c@x.com").await?;
    let carol_invitation_id = carol_invitation["id"].as_i64().context("missing id")?;
    app.post("tok-c", "/v1/invitations/reject", &json!({ "invitation_id": carol_invitation_id }))
        .await?;

    let response = app
        .get("tok-a", &format!("/v1/invitations/search?organization_id={org_id}"))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["count"].as_u64(), Some(2));

    let response = app
        .get(
            "tok-a",
            &format!("/v1/invitations/search?organization_id={org_id}&statuses=rejected"),
        )
        .await?;
    let body = body_json(response).await?;
    assert_eq!(body["count"].as_u64(), Some(1));
    assert_eq!(body["invitations"][0]["invitee_name"], "Carol");

    // Unknown statuses fall back to the every-status default.
    let response = app
        .get(
            "tok-a",
            &format!("/v1/invitations/search?organization_id={org_id}&statuses=expired"),
        )
        .await?;
    let body = body_json(response).await?;
    assert_eq!(body["count"].as_u64(), Some(2));

    let response = app
        .get(
            "tok-a",
            &format!("/v1/invitations/search?organization_id={org_id}&target_email=b@x.com"),
        )
        .await?;
    let body = body_json(response).await?;
    assert_eq!(body["count"].as_u64(), Some(1));
    assert_eq!(body["invitations"][0]["invitee_name"], "Bob");

    // Nothing pending for an email outside the organization: 404.
    let response = app
        .get(
            "tok-a",
            &format!(
                "/v1/invitations/search?organization_id={org_id}&target_email=b@x.com&statuses=accepted"
            ),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Non-admins may not search.
    let response = app
        .get("tok-b", &format!("/v1/invitations/search?organization_id={org_id}"))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // organization_id is validated before anything else runs.
    for uri in [
        "/v1/invitations/search",
        "/v1/invitations/search?organization_id=0",
        "/v1/invitations/search?organization_id=abc",
    ] {
        let response = app.get("tok-a", uri).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
    Ok(())
}

#[tokio::test]
async fn list_pagination_validation() -> Result<()> {
    let Ok(app) = TestApp::new().await else {
        return Ok(());
    };

    app.signup("tok-a", "a@example.com", "Alice").await?;

    // Nothing addressed to Alice yet.
    let response = app.get("tok-a", "/v1/invitations").await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    for uri in [
        "/v1/invitations?limit=-1",
        "/v1/invitations?offset=-5",
        "/v1/invitations?limit=abc",
    ] {
        let response = app.get("tok-a", uri).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
    Ok(())
}
