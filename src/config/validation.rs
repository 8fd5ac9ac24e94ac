//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that handler tables only name known handlers
//! - Check the redirect status code
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatekeeperConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{GatekeeperConfig, HandlerSettings};
use crate::pipeline::registry::builtin_names;
use crate::pipeline::HandlerKind;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatekeeperConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, address, timeout) in [
        ("serve.proxy", &config.serve.proxy.bind_address, config.serve.proxy.timeout_secs),
        ("serve.api", &config.serve.api.bind_address, config.serve.api.timeout_secs),
    ] {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                format!("{}.bind_address", field),
                format!("\"{}\" is not a valid socket address", address),
            ));
        }
        if timeout == 0 {
            errors.push(ValidationError::new(format!("{}.timeout_secs", field), "must be greater than 0"));
        }
    }

    if config.serve.proxy.bind_address == config.serve.api.bind_address {
        errors.push(ValidationError::new(
            "serve",
            "the proxy and the API can not listen on the same address",
        ));
    }

    check_handlers(&mut errors, "authenticators", HandlerKind::Authenticator, &config.authenticators);
    check_handlers(&mut errors, "authorizers", HandlerKind::Authorizer, &config.authorizers);
    check_handlers(&mut errors, "mutators", HandlerKind::Mutator, &config.mutators);
    check_handlers(&mut errors, "errors.handlers", HandlerKind::ErrorHandler, &config.errors.handlers);

    if let Some(code) = config
        .errors
        .handlers
        .get("redirect")
        .and_then(|redirect| redirect.config.get("code"))
    {
        if !matches!(code.as_u64(), Some(301) | Some(302)) {
            errors.push(ValidationError::new(
                "errors.handlers.redirect.config.code",
                format!("must be 301 or 302, got {}", code),
            ));
        }
    }

    for (i, id) in config.errors.fallback.iter().enumerate() {
        if !builtin_names(HandlerKind::ErrorHandler).contains(&id.as_str()) {
            errors.push(ValidationError::new(
                format!("errors.fallback[{}]", i),
                format!("unknown error handler \"{}\"", id),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_handlers(
    errors: &mut Vec<ValidationError>,
    table: &str,
    kind: HandlerKind,
    handlers: &HashMap<String, HandlerSettings>,
) {
    let known = builtin_names(kind);
    for id in handlers.keys() {
        if !known.contains(&id.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.{}", table, id),
                format!("unknown {}, expected one of {}", kind, known.join(", ")),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatekeeperConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatekeeperConfig::default();
        config.serve.proxy.bind_address = "not-an-address".into();
        config.serve.api.timeout_secs = 0;
        config.authenticators.insert("jwt".into(), HandlerSettings::enabled());
        config.errors.fallback.push("html".into());

        let fields: Vec<String> = validate_config(&config).unwrap_err().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "serve.proxy.bind_address",
                "serve.api.timeout_secs",
                "authenticators.jwt",
                "errors.fallback[1]"
            ]
        );
    }

    #[test]
    fn test_redirect_code() {
        let mut config = GatekeeperConfig::default();
        config.errors.handlers.insert(
            "redirect".into(),
            HandlerSettings::enabled_with(serde_json::json!({"to": "http://login.test", "code": 307})),
        );
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "errors.handlers.redirect.config.code");
    }

    #[test]
    fn test_shared_address_is_rejected() {
        let mut config = GatekeeperConfig::default();
        config.serve.api.bind_address = config.serve.proxy.bind_address.clone();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "serve");
    }
}
