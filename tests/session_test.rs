mod common;

use axum::http::StatusCode;
use common::{get_with_cookie, json_body, post_with_cookie, set_cookie_value, spawn};
use hearth_auth::handlers::session::{ACCESS_COOKIE, REFRESH_COOKIE};
use hearth_auth::models::Role;

#[tokio::test]
async fn refresh_rotates_the_refresh_token() {
    let app = spawn().await;
    let member = app.member("uid-1", Role::Member);
    let claims = member.session_claims(false);
    let old_refresh = app
        .state
        .sessions
        .sign_refresh_token(&claims)
        .await
        .unwrap();

    let response = app
        .request(post_with_cookie(
            "/api/auth/refresh",
            &format!("{}={}", REFRESH_COOKIE, old_refresh),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let new_refresh = set_cookie_value(&response, REFRESH_COOKIE).expect("refresh cookie set");
    assert!(set_cookie_value(&response, ACCESS_COOKIE).is_some());
    assert_ne!(new_refresh, old_refresh);

    let body = json_body(response).await;
    assert_eq!(body["token_type"], "Bearer");

    // The superseded token no longer refreshes.
    let replay = app
        .request(post_with_cookie(
            "/api/auth/refresh",
            &format!("{}={}", REFRESH_COOKIE, old_refresh),
        ))
        .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    // The rotated one does.
    let current = app
        .request(post_with_cookie(
            "/api/auth/refresh",
            &format!("{}={}", REFRESH_COOKIE, new_refresh),
        ))
        .await;
    assert_eq!(current.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_rederives_claims_from_the_member_record() {
    let app = spawn().await;
    let member = app.member("uid-1", Role::Admin);
    // The stale session still carries the old role.
    let mut stale = member.session_claims(false);
    stale.role = Role::Member;
    let refresh = app
        .state
        .sessions
        .sign_refresh_token(&stale)
        .await
        .unwrap();

    let response = app
        .request(post_with_cookie(
            "/api/auth/refresh",
            &format!("{}={}", REFRESH_COOKIE, refresh),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let access = set_cookie_value(&response, ACCESS_COOKIE).expect("access cookie set");
    let claims = app.state.codec.verify(&access).unwrap();
    assert_eq!(claims.session.role, Role::Admin);
}

#[tokio::test]
async fn refresh_without_cookie_is_unauthorized() {
    let app = spawn().await;
    let response = app
        .request(post_with_cookie("/api/auth/refresh", ""))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "auth/no-token");
}

#[tokio::test]
async fn access_token_does_not_refresh() {
    let app = spawn().await;
    let claims = app.claims("uid-1");
    let access = app.access_token(&claims);

    let response = app
        .request(post_with_cookie(
            "/api/auth/refresh",
            &format!("{}={}", REFRESH_COOKIE, access),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "session/stale-refresh");
}

#[tokio::test]
async fn logout_revokes_and_clears_cookies() {
    let app = spawn().await;
    let claims = app.claims("uid-1");
    let access = app.access_token(&claims);
    let refresh = app
        .state
        .sessions
        .sign_refresh_token(&claims)
        .await
        .unwrap();

    let response = app
        .request(post_with_cookie(
            "/api/auth/logout",
            &format!("{}={}; {}={}", ACCESS_COOKIE, access, REFRESH_COOKIE, refresh),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookie_value(&response, ACCESS_COOKIE).as_deref(), Some(""));
    assert_eq!(set_cookie_value(&response, REFRESH_COOKIE).as_deref(), Some(""));

    let replay = app
        .request(post_with_cookie(
            "/api/auth/refresh",
            &format!("{}={}", REFRESH_COOKIE, refresh),
        ))
        .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_with_a_dead_session_still_clears_cookies() {
    let app = spawn().await;
    let claims = app.claims("uid-1");
    let expired = app
        .state
        .sessions
        .sign_access_token_with_ttl(&claims, -30)
        .unwrap();

    let response = app
        .request(post_with_cookie(
            "/api/auth/logout",
            &format!("{}={}", ACCESS_COOKIE, expired),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookie_value(&response, ACCESS_COOKIE).as_deref(), Some(""));
    assert_eq!(set_cookie_value(&response, REFRESH_COOKIE).as_deref(), Some(""));
}

#[tokio::test]
async fn me_resolves_the_member_record() {
    let app = spawn().await;
    let member = app.member("uid-1", Role::Member);
    let token = app.access_token(&member.session_claims(false));

    let response = app
        .request(get_with_cookie(
            "/api/auth/me",
            &format!("{}={}", ACCESS_COOKIE, token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["claims"]["sub"], "uid-1");
    assert_eq!(body["member"]["email"], "uid-1@example.com");
}

#[tokio::test]
async fn valid_session_without_membership_is_not_found() {
    let app = spawn().await;
    // A verified external identity that never joined this site.
    let token = app.access_token(&app.claims("stranger"));

    let response = app
        .request(get_with_cookie(
            "/api/auth/me",
            &format!("{}={}", ACCESS_COOKIE, token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "member/not-found");
}
