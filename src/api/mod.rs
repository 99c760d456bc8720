//! HTTP surface: router construction, shared handler state, and the
//! server entry point.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    auth::IdentityProvider,
    crypto::EmailCodec,
    invitations::{InvitationQuery, InvitationService},
    orgs::OrganizationService,
    storage,
    users::{UserRepo, UserService},
};

pub mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

/// Shared handler state: the identity collaborator plus the wired
/// services. Constructed once at startup and cloned into every request
/// via an `Extension` layer.
pub struct AppContext {
    pub identity: Arc<dyn IdentityProvider>,
    pub user_repo: UserRepo,
    pub users: UserService,
    pub orgs: OrganizationService,
    pub invitations: InvitationService,
}

impl AppContext {
    #[must_use]
    pub fn new(pool: PgPool, codec: Arc<EmailCodec>, identity: Arc<dyn IdentityProvider>) -> Self {
        let user_repo = UserRepo::new(codec.clone());
        let query = InvitationQuery::new(codec);

        Self {
            identity,
            users: UserService::new(pool.clone(), user_repo.clone()),
            orgs: OrganizationService::new(pool.clone()),
            invitations: InvitationService::new(pool, user_repo.clone(), query),
            user_repo,
        }
    }
}

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Start the server.
///
/// Connects the pool, applies pending migrations, wires the handler
/// state, and serves until interrupted.
///
/// # Errors
/// Returns an error if the database is unreachable, migrations fail, or
/// the listener cannot bind.
pub async fn new(
    port: u16,
    dsn: &str,
    frontend_base_url: &str,
    codec: Arc<EmailCodec>,
    identity: Arc<dyn IdentityProvider>,
) -> Result<()> {
    let pool = storage::connect(dsn).await?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to apply database migrations")?;

    let state = Arc::new(AppContext::new(pool.clone(), codec, identity));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin(frontend_base_url)?))
        .allow_credentials(true);

    // Build the router from OpenAPI-wired routes. The spec stays in
    // openapi.rs for the `openapi` binary.
    let (router, _openapi) = router().split_for_parts();
    let app = router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state))
                .layer(Extension(pool.clone())),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontend_origin_strips_path() -> Result<()> {
        let origin = frontend_origin("https://app.example.com/login?next=/")?;
        assert_eq!(origin, HeaderValue::from_static("https://app.example.com"));

        let with_port = frontend_origin("http://localhost:3000")?;
        assert_eq!(with_port, HeaderValue::from_static("http://localhost:3000"));
        Ok(())
    }

    #[test]
    fn test_frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
        assert!(frontend_origin("file:///etc/passwd").is_err());
    }
}
