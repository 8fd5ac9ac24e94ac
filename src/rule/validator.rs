//! Rule validation.
//!
//! # Responsibilities
//! - Check rules against the handler registry before they go live
//! - Report every problem of every rule, not just the first
//!
//! # Design Decisions
//! - Invalid rules are logged and still loaded; the pipeline then fails
//!   them with a configuration error at evaluation time
//! - Validation is a pure function of the rules, the registry and the
//!   matching strategy

use std::collections::HashSet;
use std::fmt;

use axum::http::Method;
use url::Url;

use crate::pipeline::HandlerRegistry;
use crate::rule::engine::{CompiledPattern, MatchingStrategy};
use crate::rule::model::Rule;

/// One problem found in one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleViolation {
    pub rule_id: String,
    pub field: String,
    pub message: String,
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule \"{}\": {}: {}", self.rule_id, self.field, self.message)
    }
}

/// Validate every rule; returns all violations found.
pub fn validate_rules(rules: &[Rule], registry: &HandlerRegistry, strategy: MatchingStrategy) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    let mut seen = HashSet::new();

    for rule in rules {
        let mut report = |field: &str, message: String| {
            violations.push(RuleViolation {
                rule_id: rule.id.clone(),
                field: field.to_string(),
                message,
            });
        };

        if rule.id.is_empty() {
            report("id", "must be set".to_string());
        } else if !seen.insert(rule.id.as_str()) {
            report("id", "is used by more than one rule".to_string());
        }

        if rule.match_.url.is_empty() {
            report("match.url", "must be set".to_string());
        } else if let Err(e) = CompiledPattern::compile(strategy, &rule.match_.url) {
            report("match.url", format!("\"{}\" does not compile: {}", rule.match_.url, e));
        }

        if rule.match_.methods.is_empty() {
            report("match.methods", "must contain at least one method".to_string());
        }
        for method in &rule.match_.methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                report("match.methods", format!("\"{}\" is not a valid HTTP method", method));
            }
        }

        if !rule.upstream.url.is_empty() {
            if let Err(e) = Url::parse(&rule.upstream.url) {
                report("upstream.url", format!("\"{}\" is not a valid url: {}", rule.upstream.url, e));
            }
        }

        if rule.authenticators.is_empty() {
            report("authenticators", "must be set and can not be an empty array".to_string());
        }
        for (i, handler) in rule.authenticators.iter().enumerate() {
            if let Err(e) = registry
                .authenticator(&handler.handler)
                .and_then(|a| a.validate(&handler.config))
            {
                report(&format!("authenticators[{}]", i), e.to_string());
            }
        }

        if rule.authorizer.handler.is_empty() {
            report("authorizer.handler", "can not be empty".to_string());
        } else if let Err(e) = registry
            .authorizer(&rule.authorizer.handler)
            .and_then(|a| a.validate(&rule.authorizer.config))
        {
            report("authorizer", e.to_string());
        }

        if rule.mutators.is_empty() {
            report("mutators", "must be set and can not be an empty array".to_string());
        }
        for (i, handler) in rule.mutators.iter().enumerate() {
            if let Err(e) = registry.mutator(&handler.handler).and_then(|m| m.validate(&handler.config)) {
                report(&format!("mutators[{}]", i), e.to_string());
            }
        }

        for (i, handler) in rule.errors.iter().enumerate() {
            if let Err(e) = registry
                .error_handler(&handler.handler)
                .and_then(|h| h.validate(&handler.config))
            {
                report(&format!("errors[{}]", i), e.to_string());
            }
        }
    }

    violations
}

/// Validate and log; never rejects the rule set.
pub fn log_violations(rules: &[Rule], registry: &HandlerRegistry, strategy: MatchingStrategy) -> usize {
    let violations = validate_rules(rules, registry, strategy);
    for v in &violations {
        tracing::error!(
            rule_id = %v.rule_id,
            field = %v.field,
            error = %v.message,
            "Access rule is misconfigured and will fail at evaluation time"
        );
    }
    violations.len()
}
