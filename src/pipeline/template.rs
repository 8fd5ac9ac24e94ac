//! Session templating for handler configuration values.
//!
//! Supported expressions:
//! - `{{ subject }}`
//! - `{{ extra.<key>[.<key>...] }}`
//! - `{{ match.captures[N] }}`, `{{ match.method }}`, `{{ match.url }}`
//! - `{{ match.header.<Name> }}`
//!
//! Missing values render as the empty string; unknown expressions are errors.

use serde_json::Value;
use thiserror::Error;

use crate::pipeline::AuthenticationSession;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("unknown template expression \"{0}\"")]
    UnknownExpression(String),
}

/// Render `template` against the session.
pub fn render(template: &str, session: &AuthenticationSession) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let expr = rest[start + 2..start + 2 + len].trim();
        let value = resolve(expr, session).ok_or_else(|| TemplateError::UnknownExpression(expr.to_string()))?;
        out.push_str(&rest[..start]);
        out.push_str(&value);
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// `None` only for expressions outside the supported grammar.
fn resolve(expr: &str, session: &AuthenticationSession) -> Option<String> {
    if expr == "subject" {
        return Some(session.subject.clone());
    }
    if let Some(path) = expr.strip_prefix("extra.") {
        let mut current = session.extra.get(path.split('.').next()?);
        for key in path.split('.').skip(1) {
            current = current.and_then(|v| v.get(key));
        }
        return Some(current.map(value_to_string).unwrap_or_default());
    }

    let ctx = &session.match_context;
    match expr {
        "match.method" => return Some(ctx.method.to_string()),
        "match.url" => return Some(ctx.url.to_string()),
        _ => {}
    }
    if let Some(name) = expr.strip_prefix("match.header.") {
        return Some(
            ctx.header
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        );
    }
    let index = expr
        .strip_prefix("match.captures[")?
        .strip_suffix(']')?
        .trim()
        .parse::<usize>()
        .ok()?;
    Some(ctx.capture_groups.get(index).cloned().unwrap_or_default())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AccessRequest, MatchContext};
    use axum::http::{HeaderMap, HeaderValue, Method};
    use serde_json::json;
    use url::Url;

    fn session() -> AuthenticationSession {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant", HeaderValue::from_static("acme"));
        let req = AccessRequest::new(Method::POST, Url::parse("http://localhost/items/42").unwrap())
            .with_headers(headers);
        let mut session = AuthenticationSession::new(MatchContext::from_request(&req, vec!["42".into()]));
        session.subject = "alice".into();
        session.extra.insert("org".into(), json!({"id": 7, "name": "acme"}));
        session.extra.insert("role".into(), json!("admin"));
        session
    }

    #[test]
    fn test_render() {
        let s = session();
        assert_eq!(render("{{ subject }}", &s).unwrap(), "alice");
        assert_eq!(render("{{subject}}:{{ extra.role }}", &s).unwrap(), "alice:admin");
        assert_eq!(render("{{ extra.org.id }}", &s).unwrap(), "7");
        assert_eq!(render("{{ extra.missing }}", &s).unwrap(), "");
        assert_eq!(render("item-{{ match.captures[0] }}", &s).unwrap(), "item-42");
        assert_eq!(render("{{ match.captures[3] }}", &s).unwrap(), "");
        assert_eq!(render("{{ match.method }} {{ match.url }}", &s).unwrap(), "POST http://localhost/items/42");
        assert_eq!(render("{{ match.header.X-Tenant }}", &s).unwrap(), "acme");
        assert_eq!(render("plain", &s).unwrap(), "plain");
    }

    #[test]
    fn test_unknown_expression() {
        assert_eq!(
            render("{{ password }}", &session()).unwrap_err(),
            TemplateError::UnknownExpression("password".into())
        );
    }
}
