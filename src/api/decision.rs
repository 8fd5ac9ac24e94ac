//! Decision endpoints for external proxies (forward-auth).
//!
//! `/decisions/<path>` evaluates the request as if `<path>` had been asked
//! for directly. `X-Forwarded-Method`, `-Proto`, `-Host` and `-Uri`
//! override the corresponding parts of the evaluated request.
//! `/decisions/traefik` takes the whole request from those headers.
//!
//! A granted request answers 200 with the mutated headers; a denied one
//! answers with whatever the selected error handler renders.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::http::request::request_id;
use crate::http::response::error_response;
use crate::http::AppState;
use crate::pipeline::{AccessRequest, PipelineError};

pub const DECISIONS_PATH: &str = "/decisions";

const X_FORWARDED_METHOD: &str = "x-forwarded-method";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_URI: &str = "x-forwarded-uri";

fn forwarded<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

pub(crate) fn remote_addr(request: &Request<Body>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

pub(crate) fn inbound_host(request: &Request<Body>) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// The request a `/decisions/<path>` call asks about.
pub fn decision_request(request: &Request<Body>) -> Result<AccessRequest, PipelineError> {
    let headers = request.headers();
    let real_scheme = match forwarded(headers, X_FORWARDED_PROTO) {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    };
    let real_host = inbound_host(request);
    let path = request.uri().path();
    let stripped = path.strip_prefix(DECISIONS_PATH).unwrap_or(path);
    let stripped = if stripped.is_empty() { "/" } else { stripped };
    let real_uri = match request.uri().query() {
        Some(query) => format!("{}?{}", stripped, query),
        None => stripped.to_string(),
    };

    let method = match forwarded(headers, X_FORWARDED_METHOD) {
        Some(m) => Method::from_bytes(m.as_bytes())
            .map_err(|_| PipelineError::BadRequest(format!("invalid forwarded method \"{}\"", m)))?,
        None => request.method().clone(),
    };
    let scheme = forwarded(headers, X_FORWARDED_PROTO).unwrap_or(real_scheme);
    let host = forwarded(headers, X_FORWARDED_HOST).unwrap_or(&real_host);
    let uri = forwarded(headers, X_FORWARDED_URI).unwrap_or(&real_uri);

    let url = match Url::parse(&format!("{}://{}{}", scheme, host, uri)) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(
                forwarded_uri = %uri,
                error = %e,
                "Unable to parse the forwarded request url, falling back to the request path"
            );
            Url::parse(&format!("{}://{}{}", real_scheme, real_host, real_uri))
                .map_err(|e| PipelineError::BadRequest(format!("unable to parse request url: {}", e)))?
        }
    };

    Ok(AccessRequest::new(method, url)
        .with_headers(headers.clone())
        .with_remote_addr(remote_addr(request)))
}

/// The request a Traefik forward-auth call asks about; every part comes
/// from the forwarded headers.
pub fn traefik_request(request: &Request<Body>) -> Result<AccessRequest, PipelineError> {
    let headers = request.headers();
    let method = forwarded(headers, X_FORWARDED_METHOD)
        .ok_or_else(|| PipelineError::BadRequest("missing X-Forwarded-Method header".to_string()))?;
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| PipelineError::BadRequest(format!("invalid forwarded method \"{}\"", method)))?;
    let scheme = forwarded(headers, X_FORWARDED_PROTO).unwrap_or("http");
    let host = forwarded(headers, X_FORWARDED_HOST)
        .ok_or_else(|| PipelineError::BadRequest("missing X-Forwarded-Host header".to_string()))?;
    let uri = forwarded(headers, X_FORWARDED_URI).unwrap_or("/");
    let url = Url::parse(&format!("{}://{}{}", scheme, host, uri))
        .map_err(|e| PipelineError::BadRequest(format!("unable to parse forwarded url: {}", e)))?;

    Ok(AccessRequest::new(method, url)
        .with_headers(headers.clone())
        .with_remote_addr(remote_addr(request)))
}

pub async fn decisions(State(state): State<AppState>, request: Request<Body>) -> Response {
    let built = decision_request(&request).map_err(|e| rejected(&request, e));
    decide(&state, built).await
}

pub async fn traefik(State(state): State<AppState>, request: Request<Body>) -> Response {
    let built = traefik_request(&request).map_err(|e| rejected(&request, e));
    decide(&state, built).await
}

/// A malformed decision request, with as much of the request as could be
/// recovered for the error handlers.
fn rejected(request: &Request<Body>, err: PipelineError) -> (PipelineError, Option<AccessRequest>) {
    tracing::warn!(request_id = %request_id(request.headers()), error = %err, "Malformed decision request");
    let access = Url::parse(&format!("http://{}/", inbound_host(request)))
        .ok()
        .map(|url| {
            AccessRequest::new(request.method().clone(), url)
                .with_headers(request.headers().clone())
                .with_remote_addr(remote_addr(request))
        });
    (err, access)
}

async fn decide(state: &AppState, built: Result<AccessRequest, (PipelineError, Option<AccessRequest>)>) -> Response {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let inner = state.load();

    let access = match built {
        Ok(access) => access,
        Err((e, Some(partial))) => return inner.handler.handle_error(&cancel, &partial, None, &e).await,
        Err((e, None)) => return error_response(&e, false),
    };

    match inner.handler.evaluate(&cancel, inner.rules.as_ref(), &access).await {
        Ok((_, session)) => {
            let mut response = StatusCode::OK.into_response();
            let headers = response.headers_mut();
            for name in session.header.keys() {
                if name == header::CONTENT_LENGTH {
                    continue;
                }
                if let Some(value) = session.header.get(name) {
                    headers.insert(name.clone(), value.clone());
                }
            }
            response
        }
        Err(response) => response,
    }
}
