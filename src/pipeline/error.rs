//! Failure taxonomy of the access decision pipeline.
//!
//! # Error Classes
//! - Routing: no rule or more than one rule matched the request
//! - Configuration: unknown, disabled or misconfigured handlers, missing
//!   mandatory stages, ambiguous error handlers
//! - Domain: failures reported by the handlers themselves
//! - Dispatch: no error handler was eligible to render a failure
//! - Cancelled: the caller went away before a decision was made
//!
//! # Design Decisions
//! - One enum for every stage so entry points can log and dispatch uniformly
//! - Each variant maps to exactly one HTTP status
//! - `error_code()` is the stable, snake-cased status text used by the
//!   `when.error` predicates of error handlers

use std::fmt;

use axum::http::StatusCode;
use thiserror::Error;

/// The four pluggable handler kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Authenticator,
    Authorizer,
    Mutator,
    ErrorHandler,
}

impl HandlerKind {
    /// Short stage name used in reason identifiers (`unknown_<stage>_handler`).
    pub fn stage(&self) -> &'static str {
        match self {
            HandlerKind::Authenticator => "authentication",
            HandlerKind::Authorizer => "authorization",
            HandlerKind::Mutator => "mutation",
            HandlerKind::ErrorHandler => "error",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandlerKind::Authenticator => "authenticator",
            HandlerKind::Authorizer => "authorizer",
            HandlerKind::Mutator => "mutator",
            HandlerKind::ErrorHandler => "error handler",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Routing,
    Configuration,
    Domain,
    Dispatch,
    Cancelled,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Routing => "routing",
            ErrorClass::Configuration => "configuration",
            ErrorClass::Domain => "domain",
            ErrorClass::Dispatch => "dispatch",
            ErrorClass::Cancelled => "cancelled",
        }
    }
}

/// Every way an access decision can fail.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("requested url does not match any rules")]
    NoRuleMatch,

    #[error("expected exactly one rule but found {} matching rules: {}", ids.len(), ids.join(", "))]
    AmbiguousMatch { ids: Vec<String> },

    #[error("unable to compile url pattern of rule \"{rule_id}\": {reason}")]
    InvalidRulePattern { rule_id: String, reason: String },

    #[error("no authentication handler was set in the rule")]
    AuthenticationHandlerMissing,

    #[error("no mutation handler was set in the rule")]
    MutationHandlerMissing,

    #[error("unknown {kind} \"{id}\" requested")]
    UnknownHandler { kind: HandlerKind, id: String },

    #[error("{kind} \"{id}\" is disabled per configuration")]
    HandlerDisabled { kind: HandlerKind, id: String },

    #[error("configuration for {kind} \"{id}\" could not be validated: {reason}")]
    HandlerMisconfigured {
        kind: HandlerKind,
        id: String,
        reason: String,
    },

    /// Returned by an authenticator that does not handle this kind of request.
    /// The executor moves on to the next authenticator.
    #[error("authenticator not responsible")]
    NotResponsible,

    #[error("no authentication handler was responsible for handling the authentication request")]
    AuthenticationHandlerNoMatch,

    #[error("access credentials are invalid: {0}")]
    Unauthorized(String),

    #[error("access credentials are not sufficient to access this resource: {0}")]
    Forbidden(String),

    #[error("the request is malformed: {0}")]
    BadRequest(String),

    #[error("found more than one error handler matching the failure: {}", ids.join(", "))]
    AmbiguousErrorHandler { ids: Vec<String> },

    #[error("no error handler is eligible to handle the failure")]
    NoErrorHandler,

    #[error("the request was cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    /// HTTP status used when this failure is rendered.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::NoRuleMatch => StatusCode::NOT_FOUND,
            PipelineError::NotResponsible
            | PipelineError::AuthenticationHandlerNoMatch
            | PipelineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PipelineError::Forbidden(_) => StatusCode::FORBIDDEN,
            PipelineError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Snake-cased status text, e.g. `unauthorized` or `internal_server_error`.
    pub fn error_code(&self) -> String {
        status_text(self.status_code())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::NoRuleMatch | PipelineError::AmbiguousMatch { .. } => ErrorClass::Routing,
            PipelineError::InvalidRulePattern { .. }
            | PipelineError::AuthenticationHandlerMissing
            | PipelineError::MutationHandlerMissing
            | PipelineError::UnknownHandler { .. }
            | PipelineError::HandlerDisabled { .. }
            | PipelineError::HandlerMisconfigured { .. }
            | PipelineError::AmbiguousErrorHandler { .. } => ErrorClass::Configuration,
            PipelineError::NoErrorHandler => ErrorClass::Dispatch,
            PipelineError::Cancelled => ErrorClass::Cancelled,
            _ => ErrorClass::Domain,
        }
    }

    /// Stable identifier logged as `reason_id`.
    pub fn reason_id(&self) -> String {
        match self {
            PipelineError::NoRuleMatch => "no_rule_match".to_string(),
            PipelineError::AmbiguousMatch { .. } => "ambiguous_rule_match".to_string(),
            PipelineError::InvalidRulePattern { .. } => "invalid_rule_pattern".to_string(),
            PipelineError::AuthenticationHandlerMissing => "authentication_handler_missing".to_string(),
            PipelineError::MutationHandlerMissing => "mutation_handler_missing".to_string(),
            PipelineError::UnknownHandler { kind, .. } => format!("unknown_{}_handler", kind.stage()),
            PipelineError::HandlerDisabled { kind, .. }
            | PipelineError::HandlerMisconfigured { kind, .. } => {
                format!("invalid_{}_handler", kind.stage())
            }
            PipelineError::NotResponsible => "authentication_handler_not_responsible".to_string(),
            PipelineError::AuthenticationHandlerNoMatch => "authentication_handler_no_match".to_string(),
            PipelineError::Unauthorized(_) => "unauthorized".to_string(),
            PipelineError::Forbidden(_) => "forbidden".to_string(),
            PipelineError::BadRequest(_) => "bad_request".to_string(),
            PipelineError::AmbiguousErrorHandler { .. } => "ambiguous_error_handler".to_string(),
            PipelineError::NoErrorHandler => "error_handler_no_match".to_string(),
            PipelineError::Cancelled => "cancelled".to_string(),
            PipelineError::Internal(_) => "internal_error".to_string(),
        }
    }
}

/// Lower-cased, underscore-separated reason phrase of a status code.
pub fn status_text(code: StatusCode) -> String {
    code.canonical_reason()
        .unwrap_or("unknown")
        .to_lowercase()
        .replace(' ', "_")
        .replace('\'', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(PipelineError::NoRuleMatch.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            PipelineError::AmbiguousMatch { ids: vec!["a".into(), "b".into()] }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(PipelineError::AuthenticationHandlerNoMatch.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(PipelineError::Forbidden("no".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(PipelineError::MutationHandlerMissing.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(PipelineError::Unauthorized("x".into()).error_code(), "unauthorized");
        assert_eq!(PipelineError::NoRuleMatch.error_code(), "not_found");
        assert_eq!(PipelineError::Internal("x".into()).error_code(), "internal_server_error");
    }

    #[test]
    fn test_unknown_and_disabled_are_worded_differently() {
        let unknown = PipelineError::UnknownHandler {
            kind: HandlerKind::Authenticator,
            id: "jwt".into(),
        };
        let disabled = PipelineError::HandlerDisabled {
            kind: HandlerKind::Authenticator,
            id: "jwt".into(),
        };
        assert_ne!(unknown.to_string(), disabled.to_string());
        assert_eq!(unknown.reason_id(), "unknown_authentication_handler");
        assert_eq!(disabled.reason_id(), "invalid_authentication_handler");
        assert_eq!(unknown.class(), ErrorClass::Configuration);
    }

    #[test]
    fn test_cancellation_is_not_a_domain_error() {
        assert_eq!(PipelineError::Cancelled.class(), ErrorClass::Cancelled);
        assert_eq!(PipelineError::Forbidden("x".into()).class(), ErrorClass::Domain);
    }
}
