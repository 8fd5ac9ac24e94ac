//! In-memory rule store.
//!
//! # Responsibilities
//! - Hold the active rule set and the strategy used to match it
//! - Listing and lookup for the rules API
//! - Readiness: whether a rule set was ever loaded
//!
//! # Design Decisions
//! - A repository is an immutable value. A reload builds a new one and the
//!   server swaps it together with the handlers, so a request never sees
//!   rules and handlers from two different configurations
//! - Rules are shared as `Arc<Rule>` so a strategy switch keeps every rule's
//!   compiled patterns

use std::sync::Arc;

use crate::rule::engine::MatchingStrategy;
use crate::rule::model::Rule;

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct RuleRepository {
    strategy: MatchingStrategy,
    rules: Vec<Arc<Rule>>,
    loaded: bool,
}

impl RuleRepository {
    /// An empty repository that has not been loaded yet.
    pub fn new(strategy: MatchingStrategy) -> Self {
        Self {
            strategy,
            rules: Vec::new(),
            loaded: false,
        }
    }

    /// A loaded repository holding `rules`. Compiled patterns start empty.
    pub fn with_rules(strategy: MatchingStrategy, rules: Vec<Rule>) -> Self {
        tracing::info!(strategy = %strategy, rules = rules.len(), "Access rules loaded");
        Self {
            strategy,
            rules: rules.into_iter().map(Arc::new).collect(),
            loaded: true,
        }
    }

    /// The same rules (and their compiled patterns) under `strategy`.
    pub fn with_matching_strategy(&self, strategy: MatchingStrategy) -> Self {
        Self {
            strategy,
            rules: self.rules.clone(),
            loaded: self.loaded,
        }
    }

    pub fn matching_strategy(&self) -> MatchingStrategy {
        self.strategy
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn count(&self) -> usize {
        self.rules.len()
    }

    /// A page of rules. `limit` is clamped to [`MAX_PAGE_LIMIT`].
    pub fn list(&self, limit: usize, offset: usize) -> Vec<Arc<Rule>> {
        let limit = limit.min(MAX_PAGE_LIMIT);
        let start = offset.min(self.rules.len());
        let end = start.saturating_add(limit).min(self.rules.len());
        self.rules[start..end].to_vec()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Rule>> {
        self.rules.iter().find(|r| r.id == id).cloned()
    }

    /// Whether rules have been loaded at least once.
    pub fn is_ready(&self) -> bool {
        self.loaded
    }
}
