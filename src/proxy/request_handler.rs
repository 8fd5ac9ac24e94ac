//! Pipeline executor and error dispatcher.
//!
//! # Responsibilities
//! - Run a matched rule's authenticators, authorizer and mutators
//! - Select and invoke the error handler for a failure
//! - Log every denial with its stage, handler and rule
//!
//! # Design Decisions
//! - Stages run strictly in order on one task; the session is never shared
//! - Every handler call races the request's cancellation token
//! - Nothing is retried here; retries belong to the handlers themselves

use std::future::Future;
use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::http::response::error_response;
use crate::pipeline::errors::when;
use crate::pipeline::{
    AccessRequest, AuthenticationSession, ErrorClass, ErrorHandler, HandlerKind, HandlerRegistry, MatchContext,
    PipelineError,
};
use crate::rule::{Matcher, MatchingStrategy, Protocol, Rule};

/// Await `fut` unless the request is cancelled first.
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = fut => result,
    }
}

#[derive(Debug, Clone)]
pub struct RequestHandler {
    registry: Arc<HandlerRegistry>,
    fallback: Vec<String>,
}

impl RequestHandler {
    pub fn new(registry: Arc<HandlerRegistry>, fallback: Vec<String>) -> Self {
        Self { registry, fallback }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Evaluate `rule` for `req`. `strategy` must be the one `rule` was
    /// matched with. On success the session carries the headers to hand on
    /// to the upstream.
    pub async fn handle_request(
        &self,
        cancel: &CancellationToken,
        req: &AccessRequest,
        rule: &Rule,
        strategy: MatchingStrategy,
    ) -> Result<AuthenticationSession, PipelineError> {
        let capture_groups = match rule.capture_groups(strategy, &req.url) {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(
                    rule_id = %rule.id,
                    http_url = %req.url,
                    error = %e,
                    "Unable to extract capture groups from rule pattern"
                );
                Vec::new()
            }
        };
        let mut session = AuthenticationSession::new(MatchContext::from_request(req, capture_groups));

        if let Err((handler, e)) = self.authenticate(cancel, req, &mut session, rule).await {
            return Err(denied(req, rule, &session, HandlerKind::Authenticator, &handler, e));
        }
        if let Err((handler, e)) = self.authorize(cancel, req, &mut session, rule).await {
            return Err(denied(req, rule, &session, HandlerKind::Authorizer, &handler, e));
        }
        if let Err((handler, e)) = self.mutate(cancel, req, &mut session, rule).await {
            return Err(denied(req, rule, &session, HandlerKind::Mutator, &handler, e));
        }

        Ok(session)
    }

    /// Match `req` against `rules` and run the matched rule. Failures are
    /// rendered through the error handlers.
    pub async fn evaluate(
        &self,
        cancel: &CancellationToken,
        rules: &dyn Matcher,
        req: &AccessRequest,
    ) -> Result<(Arc<Rule>, AuthenticationSession), Response> {
        let rule = match rules.match_rule(cancel, &req.method, &req.url, Protocol::Http) {
            Ok(rule) => rule,
            Err(e) if e.class() == ErrorClass::Cancelled => {
                tracing::debug!(http_method = %req.method, http_url = %req.url, "Access request cancelled");
                return Err(self.handle_error(cancel, req, None, &e).await);
            }
            Err(e) => {
                tracing::warn!(
                    http_method = %req.method,
                    http_url = %req.url,
                    http_host = %req.host(),
                    http_user_agent = %req.user_agent(),
                    granted = false,
                    reason_id = %e.reason_id(),
                    error_class = e.class().as_str(),
                    error = %e,
                    "No access rule could be matched"
                );
                return Err(self.handle_error(cancel, req, None, &e).await);
            }
        };

        match self.handle_request(cancel, req, &rule, rules.matching_strategy()).await {
            Ok(session) => {
                tracing::info!(
                    http_method = %req.method,
                    http_url = %req.url,
                    http_host = %req.host(),
                    http_user_agent = %req.user_agent(),
                    subject = %session.subject,
                    rule_id = %rule.id,
                    granted = true,
                    "Access request granted"
                );
                Ok((rule, session))
            }
            Err(e) => Err(self.handle_error(cancel, req, Some(rule.as_ref()), &e).await),
        }
    }

    /// Ordered OR-chain: the first responsible authenticator decides.
    async fn authenticate(
        &self,
        cancel: &CancellationToken,
        req: &AccessRequest,
        session: &mut AuthenticationSession,
        rule: &Rule,
    ) -> Result<(), (String, PipelineError)> {
        if rule.authenticators.is_empty() {
            return Err((String::new(), PipelineError::AuthenticationHandlerMissing));
        }

        for entry in &rule.authenticators {
            let fail = |e| (entry.handler.clone(), e);
            let authenticator = self.registry.authenticator(&entry.handler).map_err(fail)?;
            authenticator.validate(&entry.config).map_err(fail)?;

            let result = until_cancelled(
                cancel,
                authenticator.authenticate(cancel, req, session, &entry.config, rule),
            )
            .await;
            match result {
                Ok(()) => return Ok(()),
                Err(PipelineError::NotResponsible) => {
                    tracing::debug!(
                        rule_id = %rule.id,
                        handler = %entry.handler,
                        "Authenticator not responsible, trying next"
                    );
                }
                Err(e) => return Err(fail(e)),
            }
        }

        Err((String::new(), PipelineError::AuthenticationHandlerNoMatch))
    }

    async fn authorize(
        &self,
        cancel: &CancellationToken,
        req: &AccessRequest,
        session: &mut AuthenticationSession,
        rule: &Rule,
    ) -> Result<(), (String, PipelineError)> {
        let entry = &rule.authorizer;
        let fail = |e| (entry.handler.clone(), e);
        let authorizer = self.registry.authorizer(&entry.handler).map_err(fail)?;
        authorizer.validate(&entry.config).map_err(fail)?;
        until_cancelled(cancel, authorizer.authorize(cancel, req, session, &entry.config, rule))
            .await
            .map_err(fail)
    }

    /// Ordered AND-chain: every mutator must succeed.
    async fn mutate(
        &self,
        cancel: &CancellationToken,
        req: &AccessRequest,
        session: &mut AuthenticationSession,
        rule: &Rule,
    ) -> Result<(), (String, PipelineError)> {
        if rule.mutators.is_empty() {
            return Err((String::new(), PipelineError::MutationHandlerMissing));
        }

        for entry in &rule.mutators {
            let fail = |e| (entry.handler.clone(), e);
            let mutator = self.registry.mutator(&entry.handler).map_err(fail)?;
            mutator.validate(&entry.config).map_err(fail)?;
            until_cancelled(cancel, mutator.mutate(cancel, req, session, &entry.config, rule))
                .await
                .map_err(fail)?;
        }
        Ok(())
    }

    /// Render `err` through the eligible error handler. `rule` is `None`
    /// when the failure happened before a rule matched.
    pub async fn handle_error(
        &self,
        cancel: &CancellationToken,
        req: &AccessRequest,
        rule: Option<&Rule>,
        err: &PipelineError,
    ) -> Response {
        let empty = Rule::default();
        let rule = rule.unwrap_or(&empty);

        let (handler, config) = match self.select_error_handler(req, rule, err) {
            Ok(Some(selected)) => selected,
            Ok(None) => {
                tracing::error!(
                    rule_id = %rule.id,
                    error = %err,
                    "No error handler is eligible, responding with a generic error"
                );
                return error_response(&PipelineError::NoErrorHandler, false);
            }
            Err(e) => {
                tracing::error!(rule_id = %rule.id, error = %e, original_error = %err, "Unable to select error handler");
                return error_response(&e, false);
            }
        };

        if let Err(e) = handler.validate(&config) {
            tracing::error!(handler = %handler.id(), error = %e, original_error = %err, "Error handler is misconfigured");
            return error_response(&e, false);
        }

        match until_cancelled(cancel, handler.handle(cancel, req, &config, rule, err)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(handler = %handler.id(), error = %e, original_error = %err, "Error handler failed");
                error_response(
                    &PipelineError::Internal(format!("error handler \"{}\" failed: {}", handler.id(), e)),
                    false,
                )
            }
        }
    }

    /// At most one rule-level handler may be eligible; with none, the first
    /// enabled and eligible fallback handler wins.
    fn select_error_handler(
        &self,
        req: &AccessRequest,
        rule: &Rule,
        err: &PipelineError,
    ) -> Result<Option<(Arc<dyn ErrorHandler>, Value)>, PipelineError> {
        let mut eligible = Vec::new();
        for entry in &rule.errors {
            let handler = self.registry.error_handler(&entry.handler)?;
            let whens = handler.when(&entry.config)?;
            if when::matches(&whens, req, err)? {
                eligible.push((handler, entry.config.clone()));
            }
        }

        if eligible.len() > 1 {
            return Err(PipelineError::AmbiguousErrorHandler {
                ids: eligible.iter().map(|(h, _)| h.id().to_string()).collect(),
            });
        }
        if let Some(selected) = eligible.pop() {
            return Ok(Some(selected));
        }

        for id in &self.fallback {
            let handler = match self.registry.error_handler(id) {
                Ok(handler) => handler,
                Err(e) => {
                    tracing::warn!(handler = %id, error = %e, "Skipping unknown fallback error handler");
                    continue;
                }
            };
            if !handler.is_enabled() {
                tracing::debug!(handler = %id, "Skipping disabled fallback error handler");
                continue;
            }
            let whens = handler.when(&Value::Null)?;
            if when::matches(&whens, req, err)? {
                return Ok(Some((handler, Value::Null)));
            }
        }

        Ok(None)
    }
}

/// Log a denied request and hand the error back. Cancellations are not
/// denials and are only logged at debug level.
fn denied(
    req: &AccessRequest,
    rule: &Rule,
    session: &AuthenticationSession,
    kind: HandlerKind,
    handler: &str,
    err: PipelineError,
) -> PipelineError {
    if err.class() == ErrorClass::Cancelled {
        tracing::debug!(
            http_method = %req.method,
            http_url = %req.url,
            rule_id = %rule.id,
            stage = kind.stage(),
            handler = handler,
            "Access request cancelled"
        );
        return err;
    }
    tracing::warn!(
        http_method = %req.method,
        http_url = %req.url,
        http_host = %req.host(),
        http_user_agent = %req.user_agent(),
        subject = %session.subject,
        rule_id = %rule.id,
        granted = false,
        stage = kind.stage(),
        handler = handler,
        reason_id = %err.reason_id(),
        error_class = err.class().as_str(),
        error = %err,
        "Access request denied"
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::http::{header, HeaderValue, Method, StatusCode};
    use serde_json::json;
    use url::Url;

    use crate::config::{GatekeeperConfig, HandlerSettings};
    use crate::pipeline::{Authenticator, Mutator};
    use crate::rule::{RuleHandler, RuleMatch};

    /// Authenticator with a scripted outcome that counts its invocations.
    struct Scripted {
        id: &'static str,
        outcome: fn() -> Result<(), PipelineError>,
        subject: &'static str,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(id: &'static str, subject: &'static str, outcome: fn() -> Result<(), PipelineError>) -> Arc<Self> {
            Arc::new(Self {
                id,
                outcome,
                subject,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Authenticator for Scripted {
        fn id(&self) -> &str {
            self.id
        }

        fn validate(&self, _config: &Value) -> Result<(), PipelineError> {
            Ok(())
        }

        async fn authenticate(
            &self,
            _cancel: &CancellationToken,
            _req: &AccessRequest,
            session: &mut AuthenticationSession,
            _config: &Value,
            _rule: &Rule,
        ) -> Result<(), PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()?;
            session.subject = self.subject.to_string();
            Ok(())
        }
    }

    #[async_trait]
    impl Mutator for Scripted {
        fn id(&self) -> &str {
            self.id
        }

        fn validate(&self, _config: &Value) -> Result<(), PipelineError> {
            Ok(())
        }

        async fn mutate(
            &self,
            _cancel: &CancellationToken,
            _req: &AccessRequest,
            session: &mut AuthenticationSession,
            _config: &Value,
            _rule: &Rule,
        ) -> Result<(), PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()?;
            session.set_header(&format!("x-{}", self.id), self.subject)
        }
    }

    fn not_responsible() -> Result<(), PipelineError> {
        Err(PipelineError::NotResponsible)
    }

    fn deny() -> Result<(), PipelineError> {
        Err(PipelineError::Unauthorized("bad token".into()))
    }

    fn ok() -> Result<(), PipelineError> {
        Ok(())
    }

    fn config() -> GatekeeperConfig {
        let mut config = GatekeeperConfig::default();
        config.authenticators.insert("noop".into(), HandlerSettings::enabled());
        config.authorizers.insert("allow".into(), HandlerSettings::enabled());
        config.authorizers.insert("deny".into(), HandlerSettings::enabled());
        config.mutators.insert("noop".into(), HandlerSettings::enabled());
        config
            .errors
            .handlers
            .insert("redirect".into(), HandlerSettings::enabled_with(json!({"to": "http://auth.test/login"})));
        config
            .errors
            .handlers
            .insert("www_authenticate".into(), HandlerSettings::enabled());
        config
    }

    fn handler_with(registry: HandlerRegistry) -> RequestHandler {
        RequestHandler::new(Arc::new(registry), vec!["json".into()])
    }

    fn rule(authenticators: &[&str], authorizer: &str, mutators: &[&str]) -> Rule {
        Rule {
            id: "rule".into(),
            match_: RuleMatch::new(&["GET"], "/items/<[0-9]+>"),
            authenticators: authenticators.iter().map(|h| RuleHandler::new(*h)).collect(),
            authorizer: RuleHandler::new(authorizer),
            mutators: mutators.iter().map(|h| RuleHandler::new(*h)).collect(),
            ..Default::default()
        }
    }

    fn request() -> AccessRequest {
        AccessRequest::new(Method::GET, Url::parse("http://localhost/items/42").unwrap())
    }

    async fn run(handler: &RequestHandler, rule: &Rule) -> Result<AuthenticationSession, PipelineError> {
        handler
            .handle_request(&CancellationToken::new(), &request(), rule, MatchingStrategy::Regexp)
            .await
    }

    #[tokio::test]
    async fn test_authenticator_chain_continues_past_not_responsible() {
        let (a, b, c) = (
            Scripted::new("a", "first", not_responsible),
            Scripted::new("b", "second", not_responsible),
            Scripted::new("c", "third", ok),
        );
        let mut registry = HandlerRegistry::from_config(&config());
        registry.register_authenticator(a.clone());
        registry.register_authenticator(b.clone());
        registry.register_authenticator(c.clone());

        let session = run(&handler_with(registry), &rule(&["a", "b", "c"], "allow", &["noop"]))
            .await
            .unwrap();
        assert_eq!(session.subject, "third");
        assert_eq!(session.match_context.capture_groups, vec!["42"]);
        assert_eq!(c.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authenticator_chain_stops_at_deny() {
        let (a, b, c) = (
            Scripted::new("a", "first", not_responsible),
            Scripted::new("b", "second", deny),
            Scripted::new("c", "third", ok),
        );
        let mut registry = HandlerRegistry::from_config(&config());
        registry.register_authenticator(a.clone());
        registry.register_authenticator(b.clone());
        registry.register_authenticator(c.clone());

        let result = run(&handler_with(registry), &rule(&["a", "b", "c"], "allow", &["noop"])).await;
        assert!(matches!(result, Err(PipelineError::Unauthorized(_))));
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_authenticator_responsible() {
        let mut registry = HandlerRegistry::from_config(&config());
        registry.register_authenticator(Scripted::new("a", "first", not_responsible));
        let result = run(&handler_with(registry), &rule(&["a"], "allow", &["noop"])).await;
        assert!(matches!(result, Err(PipelineError::AuthenticationHandlerNoMatch)));
    }

    #[tokio::test]
    async fn test_mutator_chain_is_all_or_nothing() {
        let (first, failing, never) = (
            Scripted::new("first", "one", ok),
            Scripted::new("failing", "two", deny),
            Scripted::new("never", "three", ok),
        );
        let mut registry = HandlerRegistry::from_config(&config());
        registry.register_mutator(first.clone());
        registry.register_mutator(failing.clone());
        registry.register_mutator(never.clone());

        let result = run(&handler_with(registry), &rule(&["noop"], "allow", &["first", "failing", "never"])).await;
        assert!(result.is_err());
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(never.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mandatory_stages() {
        let handler = handler_with(HandlerRegistry::from_config(&config()));
        assert!(matches!(
            run(&handler, &rule(&[], "allow", &["noop"])).await,
            Err(PipelineError::AuthenticationHandlerMissing)
        ));
        assert!(matches!(
            run(&handler, &rule(&["noop"], "allow", &[])).await,
            Err(PipelineError::MutationHandlerMissing)
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_handlers() {
        let handler = handler_with(HandlerRegistry::from_config(&config()));
        match run(&handler, &rule(&["jwt"], "allow", &["noop"])).await {
            Err(e @ PipelineError::UnknownHandler { .. }) => assert_eq!(e.reason_id(), "unknown_authentication_handler"),
            other => panic!("unexpected {:?}", other.map(|s| s.subject)),
        }
        match run(&handler, &rule(&["anonymous"], "allow", &["noop"])).await {
            Err(e @ PipelineError::HandlerDisabled { .. }) => assert_eq!(e.reason_id(), "invalid_authentication_handler"),
            other => panic!("unexpected {:?}", other.map(|s| s.subject)),
        }
        assert!(matches!(
            run(&handler, &rule(&["noop"], "", &["noop"])).await,
            Err(PipelineError::UnknownHandler { kind: HandlerKind::Authorizer, .. })
        ));
    }

    #[tokio::test]
    async fn test_authorizer_decision_is_final() {
        let handler = handler_with(HandlerRegistry::from_config(&config()));
        assert!(matches!(
            run(&handler, &rule(&["noop"], "deny", &["noop"])).await,
            Err(PipelineError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let handler = handler_with(HandlerRegistry::from_config(&config()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = handler
            .handle_request(
                &cancel,
                &request(),
                &rule(&["noop"], "allow", &["noop"]),
                MatchingStrategy::Regexp,
            )
            .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    fn error_rule() -> Rule {
        let mut rule = rule(&["noop"], "allow", &["noop"]);
        rule.errors = vec![
            RuleHandler::with_config(
                "json",
                json!({"when": [{"error": ["unauthorized"], "request": {"header": {"accept": ["application/json"]}}}]}),
            ),
            RuleHandler::with_config(
                "redirect",
                json!({"when": [{"error": ["unauthorized"], "request": {"header": {"accept": ["application/xml"]}}}]}),
            ),
        ];
        rule
    }

    fn request_accepting(accept: &'static str) -> AccessRequest {
        let mut req = request();
        req.headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        req
    }

    async fn dispatch(handler: &RequestHandler, req: &AccessRequest, rule: Option<&Rule>, err: PipelineError) -> Response {
        handler.handle_error(&CancellationToken::new(), req, rule, &err).await
    }

    #[tokio::test]
    async fn test_error_handler_selection() {
        let handler = handler_with(HandlerRegistry::from_config(&config()));
        let rule = error_rule();
        let unauthorized = || PipelineError::Unauthorized("x".into());

        let xml = dispatch(&handler, &request_accepting("application/xml"), Some(&rule), unauthorized()).await;
        assert_eq!(xml.status(), StatusCode::FOUND);
        assert_eq!(xml.headers()[header::LOCATION], "http://auth.test/login");

        let json = dispatch(&handler, &request_accepting("application/json"), Some(&rule), unauthorized()).await;
        assert_eq!(json.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json.headers()[header::CONTENT_TYPE], "application/json");

        // Neither matches: the fallback chain renders JSON.
        let text = dispatch(&handler, &request_accepting("text/plain"), Some(&rule), unauthorized()).await;
        assert_eq!(text.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(text.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_fallback_order_skips_disabled() {
        let registry = HandlerRegistry::from_config(&config());
        let handler = RequestHandler::new(
            Arc::new(registry),
            vec!["missing".into(), "www_authenticate".into(), "json".into()],
        );
        let response = dispatch(&handler, &request(), None, PipelineError::NoRuleMatch).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let mut disabled = config();
        disabled.errors.handlers.remove("www_authenticate");
        let handler = RequestHandler::new(
            Arc::new(HandlerRegistry::from_config(&disabled)),
            vec!["www_authenticate".into(), "json".into()],
        );
        let response = dispatch(&handler, &request(), None, PipelineError::NoRuleMatch).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ambiguous_error_handlers() {
        let handler = handler_with(HandlerRegistry::from_config(&config()));
        let mut rule = rule(&["noop"], "allow", &["noop"]);
        rule.errors = vec![RuleHandler::new("json"), RuleHandler::new("www_authenticate")];
        let response = dispatch(&handler, &request(), Some(&rule), PipelineError::Forbidden("x".into())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_no_eligible_handler() {
        let mut config = config();
        config.errors.handlers.clear();
        let handler = RequestHandler::new(
            Arc::new(HandlerRegistry::from_config(&config)),
            vec!["json".into()],
        );
        let response = dispatch(&handler, &request(), None, PipelineError::NoRuleMatch).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
