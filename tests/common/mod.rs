#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use hearth_auth::config::{
    AppConfig, Environment, GateConfig, InviteConfig, JwtConfig, MongoConfig, RedisConfig,
    SecurityConfig,
};
use hearth_auth::models::{Member, Role, SessionClaims};
use hearth_auth::services::database::{MemoryDirectory, MongoDb};
use hearth_auth::services::invite::InviteService;
use hearth_auth::services::jwt::TokenCodec;
use hearth_auth::services::registry::{MemoryRefreshStore, RefreshStore};
use hearth_auth::services::session::SessionService;
use hearth_auth::{build_router, AppState};

pub const TEST_PRIVATE_KEY: &str = include_str!("../keys/test_private.pem");
pub const TEST_PUBLIC_KEY: &str = include_str!("../keys/test_public.pem");

pub struct TestApp {
    pub state: AppState,
    pub directory: Arc<MemoryDirectory>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        environment: Environment::Dev,
        service_name: "hearth-auth".to_string(),
        service_version: "0.0.0-test".to_string(),
        log_level: "warn".to_string(),
        port: 0,
        mongodb: MongoConfig {
            uri: "mongodb://localhost:27017".to_string(),
            database: "hearth_test".to_string(),
        },
        redis: RedisConfig {
            url: "redis://localhost:6379".to_string(),
        },
        jwt: JwtConfig {
            private_key_pem: TEST_PRIVATE_KEY.to_string(),
            public_key_pem: TEST_PUBLIC_KEY.to_string(),
            issuer: "hearth-auth".to_string(),
            audience: "hearth".to_string(),
            leeway_secs: 5,
            access_ttl_minutes: 5,
            refresh_ttl_days: 30,
            invite_access_minutes: 10,
            invite_refresh_minutes: 30,
        },
        gate: GateConfig {
            public_paths: vec![
                "/login".to_string(),
                "/invite".to_string(),
                "/health".to_string(),
                "/auth/gate".to_string(),
                "/api/auth/refresh".to_string(),
                "/api/auth/logout".to_string(),
                "/api/invites".to_string(),
                "/api/signup".to_string(),
            ],
            api_prefix: "/api".to_string(),
            gate_path: "/auth/gate".to_string(),
            landing_path: "/home".to_string(),
            setup_page: "/account/setup".to_string(),
            setup_api: "/api/account/setup".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            entry_points: vec!["/".to_string(), "/login".to_string()],
            locales: vec!["en".to_string(), "de".to_string(), "fr".to_string()],
        },
        invites: InviteConfig {
            ttl_hours: 24,
            signup_ttl_hours: 48,
            base_url: "http://localhost:8080".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            secure_cookies: false,
        },
    }
}

/// Full application state wired onto in-memory stores. Connecting the Mongo
/// client is lazy, so no database needs to be running for routes that never
/// touch it.
pub async fn spawn() -> TestApp {
    let config = test_config();
    let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database)
        .await
        .expect("mongo client");

    let registry: Arc<dyn RefreshStore> = Arc::new(MemoryRefreshStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let codec = TokenCodec::from_pem(
        &config.jwt.private_key_pem,
        &config.jwt.public_key_pem,
        &config.jwt.issuer,
        &config.jwt.audience,
    )
    .expect("codec");
    let sessions = SessionService::new(codec.clone(), registry.clone(), &config.jwt);
    let invites = InviteService::new(db.clone(), &config.invites);

    let state = AppState {
        config: Arc::new(config),
        db,
        codec,
        sessions,
        registry,
        members: directory.clone(),
        invites,
    };

    TestApp { state, directory }
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn member(&self, uid: &str, role: Role) -> Member {
        let member = Member::new("site-1", uid, format!("{}@example.com", uid), role);
        self.directory.insert(member.clone());
        member
    }

    pub fn claims(&self, uid: &str) -> SessionClaims {
        SessionClaims::new(uid, "site-1", Role::Member, format!("{}@example.com", uid))
    }

    pub fn access_token(&self, claims: &SessionClaims) -> String {
        self.state
            .sessions
            .sign_access_token(claims)
            .expect("access token")
    }

    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router().oneshot(req).await.expect("router response")
    }
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

pub fn get_with_cookie(path: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .expect("request")
}

pub fn post_with_cookie(path: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .expect("request")
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

/// Pull a named cookie value out of the response's `set-cookie` headers.
pub fn set_cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .find_map(|raw| {
            let (pair, _) = raw.split_once(';').unwrap_or((raw, ""));
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}
