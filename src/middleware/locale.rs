use axum::{
    extract::{Request, State},
    http::{uri::PathAndQuery, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};

use crate::AppState;

pub const LOCALE_HEADER: &str = "x-locale";

/// Resolve the request locale and forward it as a header.
///
/// Priority: explicit `?lang=` query parameter, then a leading locale path
/// segment (which is stripped so routing below sees locale-free paths), then
/// the first configured locale.
pub async fn locale_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let locales = &state.config.gate.locales;
    let default = locales.first().cloned().unwrap_or_else(|| "en".to_string());

    let query_lang = req
        .uri()
        .query()
        .and_then(|q| {
            q.split('&')
                .find_map(|pair| pair.strip_prefix("lang="))
                .map(|v| v.to_string())
        })
        .filter(|lang| locales.iter().any(|l| l == lang));

    let locale = match query_lang {
        Some(lang) => lang,
        None => match leading_locale_segment(req.uri().path(), locales) {
            Some(lang) => {
                if let Some(stripped) = strip_locale_segment(req.uri(), &lang) {
                    *req.uri_mut() = stripped;
                }
                lang
            }
            None => default,
        },
    };

    if let Ok(value) = HeaderValue::from_str(&locale) {
        req.headers_mut().insert(LOCALE_HEADER, value);
    }
    next.run(req).await
}

fn leading_locale_segment(path: &str, locales: &[String]) -> Option<String> {
    let first = path.strip_prefix('/')?.split('/').next()?;
    locales.iter().find(|l| l.as_str() == first).cloned()
}

/// Rebuild the URI without its leading `/{locale}` segment, keeping the
/// query string.
fn strip_locale_segment(uri: &Uri, locale: &str) -> Option<Uri> {
    let path = uri.path();
    let rest = path.strip_prefix(&format!("/{}", locale))?;
    let new_path = if rest.is_empty() { "/" } else { rest };

    let path_and_query = match uri.query() {
        Some(q) => format!("{}?{}", new_path, q),
        None => new_path.to_string(),
    };
    let pq: PathAndQuery = path_and_query.parse().ok()?;

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(pq);
    Uri::from_parts(parts).ok()
}
