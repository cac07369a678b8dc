use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde_json::json;

use crate::handlers::session::ACCESS_COOKIE;
use crate::AppState;

/// Marks a placeholder response serving in place of a gated page, so the
/// client knows it is looking at an auth wall rather than a real page.
pub const GATE_MARKER_HEADER: &str = "x-auth-gate";
/// Original path-and-query the gated request was headed for.
pub const GATE_FROM_HEADER: &str = "x-auth-gate-from";

/// The request gate: classifies every request and either lets it through
/// (with verified claims attached), rejects it, redirects it, or answers
/// with the gate placeholder in place.
///
/// Page requests are never hard-redirected to a login URL on auth failure;
/// the placeholder body is served under the original address so it stays in
/// the browser bar for a post-refresh retry.
pub async fn request_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let gate = &state.config.gate;
    let path = req.uri().path().to_string();
    let is_api = path_matches_prefix(&path, &gate.api_prefix);
    let is_public = gate.public_paths.iter().any(|p| path_matches_prefix(&path, p));

    let claims = jar
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .and_then(|token| state.codec.verify(&token).ok());

    match claims {
        Some(claims) => {
            let session = claims.session.clone();

            // Entry points bounce authenticated callers inward, to setup or
            // the landing area depending on the flag.
            if gate.entry_points.iter().any(|p| p == &path) {
                let target = if session.needs_setup {
                    &gate.setup_page
                } else {
                    &gate.landing_path
                };
                return Redirect::temporary(target).into_response();
            }

            if session.needs_setup && !is_setup_surface(&path, &state) && !is_public {
                if is_api {
                    return (
                        StatusCode::FORBIDDEN,
                        Json(json!({ "error": "gate/needs-setup" })),
                    )
                        .into_response();
                }
                return Redirect::temporary(&gate.setup_page).into_response();
            }

            // Setup already complete: bounce off the setup page.
            if !session.needs_setup && path == gate.setup_page {
                return Redirect::temporary(&gate.landing_path).into_response();
            }

            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => {
            if is_public {
                return next.run(req).await;
            }
            if is_api {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "gate/unauthenticated" })),
                )
                    .into_response();
            }
            let from = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());
            gate_placeholder(&from)
        }
    }
}

/// The neutral "session required" surface served in place of a gated page.
pub fn gate_placeholder(from: &str) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "status": "session-required",
            "from": from,
        })),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(GATE_MARKER_HEADER, HeaderValue::from_static("1"));
    if let Ok(value) = HeaderValue::from_str(from) {
        headers.insert(GATE_FROM_HEADER, value);
    }
    response
}

fn is_setup_surface(path: &str, state: &AppState) -> bool {
    let gate = &state.config.gate;
    path == gate.setup_page || path == gate.setup_api || path == gate.logout_path
}

/// Segment-aware prefix match: `/invite` covers `/invite` and `/invite/abc`
/// but not `/invitees`.
fn path_matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return path == "/";
    }
    path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_is_segment_aware() {
        assert!(path_matches_prefix("/invite", "/invite"));
        assert!(path_matches_prefix("/invite/abc123", "/invite"));
        assert!(!path_matches_prefix("/invitees", "/invite"));
        assert!(!path_matches_prefix("/inv", "/invite"));
    }

    #[test]
    fn root_prefix_only_matches_root() {
        assert!(path_matches_prefix("/", "/"));
        assert!(!path_matches_prefix("/home", "/"));
    }

    #[test]
    fn placeholder_carries_marker_headers() {
        let response = gate_placeholder("/dashboard?tab=2");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(GATE_MARKER_HEADER).unwrap(), "1");
        assert_eq!(
            response.headers().get(GATE_FROM_HEADER).unwrap(),
            "/dashboard?tab=2"
        );
    }
}
