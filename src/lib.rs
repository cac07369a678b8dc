//! Session and invitation authority: self-issued signed-token sessions with
//! refresh rotation, a request gate, route guards, and transactional invite
//! acceptance against the member registry.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod services;

#[cfg(test)]
pub mod test_keys;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::services::database::{MemberDirectory, MongoDb};
use crate::services::invite::InviteService;
use crate::services::jwt::TokenCodec;
use crate::services::registry::RefreshStore;
use crate::services::session::SessionService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: MongoDb,
    pub codec: TokenCodec,
    pub sessions: SessionService,
    pub registry: Arc<dyn RefreshStore>,
    pub members: Arc<dyn MemberDirectory>,
    pub invites: InviteService,
}

pub fn build_router(state: AppState) -> Router {
    let cors = build_cors(&state.config);

    // Routes that require a resolved member, not just a valid token.
    let member_routes = Router::new()
        .route("/api/invites", post(handlers::invite::create_invite))
        .route(
            "/api/invites/:token/revoke",
            post(handlers::invite::revoke_invite),
        )
        .route("/api/auth/me", get(handlers::session::me))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::guard::member_guard,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::guard::user_guard,
        ));

    let open_routes = Router::new()
        .route("/api/auth/refresh", post(handlers::session::refresh))
        .route("/api/auth/logout", post(handlers::session::logout))
        .route("/api/invites/:token", get(handlers::invite::get_invite))
        .route(
            "/api/invites/:token/accept",
            post(handlers::invite::accept_invite),
        )
        .route(
            "/api/invites/:token/verify",
            get(handlers::invite::verify_signup),
        )
        .route("/api/signup", post(handlers::invite::signup))
        .route("/auth/gate", get(handlers::session::auth_gate))
        .route("/health", get(health_check));

    // The gate wraps every route and the 404 fallback; it answers before
    // routing outcome matters (placeholder, 401, redirect) or passes the
    // request on with claims attached.
    let gated = Router::new()
        .merge(member_routes)
        .merge(open_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::gate::request_gate,
        ))
        .with_state(state.clone());

    // The locale stage rewrites the URI, so it must run before routing:
    // the outer router sends everything to the inner one, which matches
    // against the de-localized path.
    Router::new()
        .fallback_service(gated)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::locale::locale_middleware,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(middleware::trace::REQUEST_ID_HEADER)
                    .and_then(|h| h.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(axum::middleware::from_fn(
            middleware::trace::request_id_middleware,
        ))
        .layer(axum::middleware::from_fn(
            middleware::headers::security_headers_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

fn build_cors(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mongo_ok = state.db.health_check().await.is_ok();
    let registry_ok = state.registry.health_check().await.is_ok();

    let status = if mongo_ok && registry_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if mongo_ok && registry_ok { "healthy" } else { "degraded" },
            "service": state.config.service_name,
            "version": state.config.service_version,
            "mongodb": if mongo_ok { "up" } else { "down" },
            "registry": if registry_ok { "up" } else { "down" },
        })),
    )
}
