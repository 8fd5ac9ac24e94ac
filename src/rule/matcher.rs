//! Rule lookup for an inbound request.
//!
//! # Responsibilities
//! - Filter rules by protocol, method and URL pattern
//! - Enforce that exactly one rule matches
//!
//! # Design Decisions
//! - Ambiguity is never resolved by order or priority; two matching rules
//!   are always an error
//! - A rule whose pattern does not compile fails the lookup instead of being
//!   skipped, so a broken rule cannot silently fall through to a broader one

use std::sync::Arc;

use axum::http::Method;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::pipeline::PipelineError;
use crate::rule::engine::MatchingStrategy;
use crate::rule::model::{Protocol, Rule};
use crate::rule::repository::RuleRepository;

/// Finds the rule responsible for a request.
pub trait Matcher: Send + Sync {
    /// Strategy the rules are matched with. Capture groups use the same one.
    fn matching_strategy(&self) -> MatchingStrategy;

    fn match_rule(
        &self,
        cancel: &CancellationToken,
        method: &Method,
        url: &Url,
        protocol: Protocol,
    ) -> Result<Arc<Rule>, PipelineError>;
}

impl Matcher for RuleRepository {
    fn matching_strategy(&self) -> MatchingStrategy {
        RuleRepository::matching_strategy(self)
    }

    fn match_rule(
        &self,
        cancel: &CancellationToken,
        method: &Method,
        url: &Url,
        protocol: Protocol,
    ) -> Result<Arc<Rule>, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let strategy = RuleRepository::matching_strategy(self);
        let mut matched: Vec<&Arc<Rule>> = Vec::new();
        for rule in self.rules() {
            let hit = rule
                .is_matching(strategy, method, url, protocol)
                .map_err(|e| PipelineError::InvalidRulePattern {
                    rule_id: rule.id.clone(),
                    reason: e.to_string(),
                })?;
            if hit {
                matched.push(rule);
            }
        }

        match matched.as_slice() {
            [] => Err(PipelineError::NoRuleMatch),
            [rule] => Ok(Arc::clone(rule)),
            many => Err(PipelineError::AmbiguousMatch {
                ids: many.iter().map(|r| r.id.clone()).collect(),
            }),
        }
    }
}
