//! Response helpers.
//!
//! # Responsibilities
//! - Render failures as the JSON error envelope
//!   `{"error": {"code", "status", "message", "reason"?}}`
//! - Strip hop-by-hop headers from forwarded responses
//!
//! # Design Decisions
//! - Non-verbose bodies carry a generic message per status so internal
//!   failure details never leak to clients
//! - Content-Length is always computed by the server from the real body

use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::PipelineError;

/// Connection-scoped headers never forwarded between hops.
pub static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn generic_message(code: StatusCode) -> &'static str {
    match code {
        StatusCode::BAD_REQUEST => "The request was malformed or contained invalid parameters",
        StatusCode::UNAUTHORIZED => "The request could not be authorized",
        StatusCode::FORBIDDEN => "The requested action was forbidden",
        StatusCode::NOT_FOUND => "The requested resource could not be found",
        _ => "An internal server error occurred, please contact the system administrator",
    }
}

/// A bare JSON error with a generic message for `code`.
pub fn status_response(code: StatusCode) -> Response {
    let body = ErrorEnvelope {
        error: ErrorBody {
            code: code.as_u16(),
            status: code.canonical_reason().unwrap_or_default().to_string(),
            message: generic_message(code).to_string(),
            reason: None,
        },
    };
    (code, Json(body)).into_response()
}

/// Render `err` as JSON. `verbose` exposes the error message and reason id.
pub fn error_response(err: &PipelineError, verbose: bool) -> Response {
    let code = err.status_code();
    let (message, reason) = if verbose {
        (err.to_string(), Some(err.reason_id()))
    } else {
        (generic_message(code).to_string(), None)
    };
    let body = ErrorEnvelope {
        error: ErrorBody {
            code: code.as_u16(),
            status: code.canonical_reason().unwrap_or_default().to_string(),
            message,
            reason,
        },
    };
    (code, Json(body)).into_response()
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
