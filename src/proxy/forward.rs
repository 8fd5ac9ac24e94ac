//! Reverse-proxy entry point.
//!
//! Evaluates the inbound request against the rules and, when granted,
//! forwards it to the matched rule's upstream with the mutated headers.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::decision::{inbound_host, remote_addr};
use crate::http::request::request_id;
use crate::http::response::{error_response, status_response, strip_hop_by_hop};
use crate::http::AppState;
use crate::pipeline::{AccessRequest, PipelineError};
use crate::proxy::upstream::configure_backend_url;

/// The request as the client sent it. The scheme is `https` only when
/// forwarded headers are trusted and say so.
fn access_request(request: &Request<Body>, trust_forwarded_headers: bool) -> Result<AccessRequest, PipelineError> {
    let scheme = match request.headers().get("x-forwarded-proto").and_then(|v| v.to_str().ok()) {
        Some(proto) if trust_forwarded_headers && proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    };
    let path_and_query = request.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = Url::parse(&format!("{}://{}{}", scheme, inbound_host(request), path_and_query))
        .map_err(|e| PipelineError::BadRequest(format!("unable to parse request url: {}", e)))?;
    Ok(AccessRequest::new(request.method().clone(), url)
        .with_headers(request.headers().clone())
        .with_remote_addr(remote_addr(request)))
}

pub async fn forward(State(state): State<AppState>, request: Request<Body>) -> Response {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let inner = state.load();
    let request_id = request_id(request.headers()).to_string();

    let access = match access_request(&request, inner.config.serve.proxy.trust_forwarded_headers) {
        Ok(access) => access,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Unable to build the access request");
            return error_response(&e, false);
        }
    };

    let (rule, session) = match inner.handler.evaluate(&cancel, inner.rules.as_ref(), &access).await {
        Ok(granted) => granted,
        Err(response) => return response,
    };

    let (mut parts, body) = request.into_parts();
    let target = match configure_backend_url(&rule.upstream, &parts.uri, &access.host()) {
        Ok(target) => target,
        Err(e) => {
            tracing::error!(request_id = %request_id, rule_id = %rule.id, error = %e, "Unable to route the request upstream");
            return inner.handler.handle_error(&cancel, &access, Some(rule.as_ref()), &e).await;
        }
    };

    // Content-Length always describes the body actually sent, never a session value.
    for name in session.header.keys().filter(|name| *name != header::CONTENT_LENGTH) {
        parts.headers.remove(name);
    }
    for (name, value) in session.header.iter().filter(|(name, _)| *name != header::CONTENT_LENGTH) {
        parts.headers.append(name.clone(), value.clone());
    }
    strip_hop_by_hop(&mut parts.headers);
    match HeaderValue::from_str(&target.host) {
        Ok(host) => {
            parts.headers.insert(header::HOST, host);
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, host = %target.host, error = %e, "Invalid upstream host");
            return status_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    parts.uri = target.uri.clone();
    parts.version = axum::http::Version::HTTP_11;
    let upstream_request = Request::from_parts(parts, body);

    tracing::debug!(request_id = %request_id, rule_id = %rule.id, upstream = %target.uri, "Forwarding request");

    match state.client.request(upstream_request).await {
        Ok(response) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::new(body)).into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, rule_id = %rule.id, upstream = %target.uri, error = %e, "Upstream error");
            status_response(StatusCode::BAD_GATEWAY)
        }
    }
}
