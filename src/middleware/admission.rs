//! Structural request validation: header allow-list, query and body policy,
//! and route/method resolution. Every rejection is terminal.

use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, TRANSFER_ENCODING},
        HeaderMap, Method, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{error::AppError, state::AppState};

pub const VERIFY_EMAIL_PATH: &str = "/v1/verify-email";

/// Lower-case header names accepted from any client.
pub const ALLOWED_HEADERS: [&str; 10] = [
    "authorization",
    "host",
    "accept",
    "connection",
    "user-agent",
    "accept-encoding",
    "cache-control",
    "postman-token",
    "content-type",
    "content-length",
];

/// Injected by a load balancer; accepted only when proxy headers are trusted.
const PROXY_HEADERS: [&str; 6] = [
    "forwarded",
    "via",
    "x-amzn-trace-id",
    "x-request-id",
    "traceparent",
    "tracestate",
];
const PROXY_HEADER_PREFIX: &str = "x-forwarded-";

/// Known paths and the methods each one serves.
pub static ROUTES: &[(&str, &[Method])] = &[
    ("/healthz", &[Method::GET]),
    ("/v1/user", &[Method::POST]),
    (VERIFY_EMAIL_PATH, &[Method::GET]),
    ("/v1/user/self", &[Method::GET, Method::PUT]),
    ("/v1/user/self/pic", &[Method::GET, Method::POST, Method::DELETE]),
];

/// Per-route query exceptions: the only keys the route may carry.
static QUERY_KEYS: &[(&str, &[&str])] = &[(VERIFY_EMAIL_PATH, &["token"])];

pub async fn admit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Err(rejection) = check(&req, state.config.trust_proxy_headers) {
        warn!(
            method = %req.method(),
            path = %req.uri().path(),
            reason = %rejection,
            "request rejected"
        );
        return rejection.into_response();
    }
    next.run(req).await
}

pub fn check(req: &Request, trust_proxy_headers: bool) -> Result<(), AppError> {
    check_headers(req.headers(), trust_proxy_headers)?;
    check_query(req.uri())?;
    if is_read_only(req.method()) && has_body(req) {
        return Err(AppError::BadRequest("GET requests must not carry a body".into()));
    }
    check_route(req.method(), req.uri().path())
}

fn check_headers(headers: &HeaderMap, trust_proxy_headers: bool) -> Result<(), AppError> {
    for name in headers.keys() {
        let name = name.as_str();
        let allowed = ALLOWED_HEADERS.contains(&name)
            || (trust_proxy_headers
                && (PROXY_HEADERS.contains(&name) || name.starts_with(PROXY_HEADER_PREFIX)));
        if !allowed {
            return Err(AppError::BadRequest(format!("header '{name}' is not allowed")));
        }
    }
    Ok(())
}

fn check_query(uri: &Uri) -> Result<(), AppError> {
    let Some(query) = uri.query().filter(|q| !q.is_empty()) else {
        return Ok(());
    };
    let permitted = QUERY_KEYS
        .iter()
        .find(|(path, _)| *path == uri.path())
        .map(|(_, keys)| *keys)
        .unwrap_or_default();

    let all_permitted = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').map_or(pair, |(key, _)| key))
        .all(|key| permitted.contains(&key));
    if all_permitted {
        Ok(())
    } else {
        Err(AppError::BadRequest("query parameters are not allowed".into()))
    }
}

fn is_read_only(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn has_body(req: &Request) -> bool {
    let declared = match req.headers().get(CONTENT_LENGTH) {
        Some(v) => v
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(true, |len| len > 0),
        None => false,
    };
    declared || req.headers().contains_key(TRANSFER_ENCODING) || req.body().size_hint().lower() > 0
}

fn check_route(method: &Method, path: &str) -> Result<(), AppError> {
    match ROUTES.iter().find(|(p, _)| *p == path) {
        None => Err(AppError::NotFound),
        Some((_, methods)) if methods.contains(method) => Ok(()),
        Some(_) => Err(AppError::MethodNotAllowed),
    }
}
