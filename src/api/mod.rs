use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

use crate::store::{spawn_purge_task, PurgeSchedule};
use crate::tokens::{SessionService, SystemClock};

pub mod email;
pub mod handlers;
mod openapi;

pub use openapi::openapi;

use email::EmailSender;
use handlers::{health, password, session, verification};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Shared handler state.
pub struct AppState {
    sessions: Arc<SessionService>,
    email: Arc<dyn EmailSender>,
}

impl AppState {
    #[must_use]
    pub fn new(sessions: Arc<SessionService>, email: Arc<dyn EmailSender>) -> Self {
        Self { sessions, email }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    #[must_use]
    pub fn email(&self) -> &dyn EmailSender {
        self.email.as_ref()
    }
}

/// Build the router with every route and layer, without binding a socket.
///
/// # Errors
/// Returns an error if the frontend origin cannot be derived for CORS.
pub fn router(state: Arc<AppState>) -> Result<Router> {
    let frontend_origin = frontend_origin(state.sessions().config().frontend_origin())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = Router::new()
        .route("/v1/auth/login", post(session::login))
        .route("/v1/auth/refresh", post(session::refresh))
        .route("/v1/auth/logout", post(session::logout))
        .route(
            "/v1/auth/verify-email/request",
            post(verification::request_verification),
        )
        .route("/v1/auth/verify-email", post(verification::verify_email))
        .route(
            "/v1/auth/password-reset/request",
            post(password::request_reset),
        )
        .route("/v1/auth/password-reset/check", post(password::check_reset))
        .route("/v1/auth/password-reset", post(password::confirm_reset))
        .route("/health", get(health::health).options(health::health))
        .route("/openapi.json", get(openapi_json))
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
                .layer(Extension(state)),
        );

    Ok(app)
}

/// Start the server and the expired-token purge task.
///
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<AppState>, purge: PurgeSchedule) -> Result<()> {
    let purge = spawn_purge_task(
        state.sessions().store().clone(),
        Arc::new(SystemClock),
        purge,
    );

    let app = router(state)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    purge.abort();

    Ok(())
}

async fn openapi_json() -> impl IntoResponse {
    Json(openapi())
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

fn frontend_origin(origin: Option<String>) -> Result<HeaderValue> {
    let origin = origin.ok_or_else(|| anyhow!("Frontend base URL must include a valid host"))?;
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
