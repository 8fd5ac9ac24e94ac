//! `when` predicates deciding whether an error handler is eligible.
//!
//! A handler is eligible when ANY of its `when` entries matches. An entry
//! matches when its `error` list contains the failure's status text (or is
//! empty) and every present request condition holds.

use std::net::IpAddr;

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use ipnet::IpNet;
use mime::Mime;
use serde::{Deserialize, Serialize};

use crate::pipeline::{AccessRequest, PipelineError};

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct When {
    /// Status texts such as `unauthorized` or `not_found`.
    #[serde(default)]
    pub error: Vec<String>,

    #[serde(default)]
    pub request: Option<WhenRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WhenRequest {
    #[serde(default)]
    pub remote_ip: Option<WhenRemoteIp>,

    #[serde(default)]
    pub header: Option<WhenHeader>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WhenRemoteIp {
    /// CIDR ranges.
    #[serde(default, rename = "match")]
    pub match_: Vec<String>,

    #[serde(default)]
    pub respect_forwarded_for_header: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WhenHeader {
    #[serde(default)]
    pub content_type: Vec<String>,

    #[serde(default)]
    pub accept: Vec<String>,
}

/// Whether `err` raised for `req` satisfies the predicates. An empty list
/// always matches. Malformed predicates are reported as errors.
pub fn matches(whens: &[When], req: &AccessRequest, err: &PipelineError) -> Result<bool, PipelineError> {
    if whens.is_empty() {
        return Ok(true);
    }

    let code = err.error_code();
    for when in whens {
        if !when.error.is_empty() && !when.error.iter().any(|e| *e == code) {
            continue;
        }
        if matches_request(when.request.as_ref(), req)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn matches_request(request: Option<&WhenRequest>, req: &AccessRequest) -> Result<bool, PipelineError> {
    let Some(request) = request else {
        return Ok(true);
    };

    if let Some(header) = &request.header {
        if !header.content_type.is_empty() {
            let actual = req.header(CONTENT_TYPE.as_str()).filter(|v| !v.is_empty()).unwrap_or(OCTET_STREAM);
            if !matches_mime(actual, &header.content_type)? {
                return Ok(false);
            }
        }
        if !header.accept.is_empty() {
            let actual = req.header(ACCEPT.as_str()).filter(|v| !v.is_empty()).unwrap_or(OCTET_STREAM);
            if !matches_mime(actual, &header.accept)? {
                return Ok(false);
            }
        }
    }

    match &request.remote_ip {
        Some(remote_ip) if !remote_ip.match_.is_empty() => matches_remote_ip(remote_ip, req),
        _ => Ok(true),
    }
}

/// `actual` is a request header value listing media ranges, parameters
/// allowed. Handler-side wildcards match broadly; request-side wildcards
/// only match the identical handler value.
fn matches_mime(actual: &str, handler: &[String]) -> Result<bool, PipelineError> {
    let wanted = handler
        .iter()
        .map(|m| {
            m.parse::<Mime>()
                .map(|m| m.essence_str().to_string())
                .map_err(|e| PipelineError::Internal(format!("invalid media type \"{}\" in error handler predicate: {}", m, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let requested = actual
        .split(',')
        .filter_map(|part| part.trim().parse::<Mime>().ok())
        .map(|m| m.essence_str().to_string());

    for a in requested {
        let a_type = a.split('/').next().unwrap_or_default();
        for m in &wanted {
            let hit = m == "*/*"
                || m.strip_suffix("/*").is_some_and(|t| t == a_type)
                || *m == a;
            if hit {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn matches_remote_ip(remote_ip: &WhenRemoteIp, req: &AccessRequest) -> Result<bool, PipelineError> {
    let mut candidates: Vec<IpAddr> = req.remote_addr.map(|a| a.ip()).into_iter().collect();
    if remote_ip.respect_forwarded_for_header {
        if let Some(forwarded) = req.header("x-forwarded-for") {
            candidates.extend(forwarded.split(',').filter_map(|ip| ip.trim().parse::<IpAddr>().ok()));
        }
    }

    for range in &remote_ip.match_ {
        let net: IpNet = range
            .parse()
            .map_err(|e| PipelineError::Internal(format!("invalid CIDR \"{}\" in error handler predicate: {}", range, e)))?;
        if candidates.iter().any(|ip| net.contains(ip)) {
            return Ok(true);
        }
    }
    Ok(false)
}
