//! Upstream URL rewriting for forwarded requests.

use axum::http::Uri;
use url::Url;

use crate::pipeline::PipelineError;
use crate::rule::Upstream;

/// Where and how a granted request is forwarded.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamTarget {
    pub uri: Uri,
    /// Value for the forwarded `Host` header.
    pub host: String,
}

/// Rewrite the inbound request target onto the rule's upstream.
///
/// The upstream base path is prefixed to the inbound path, then
/// `strip_path` is removed once. The query string is kept as is.
pub fn configure_backend_url(
    upstream: &Upstream,
    request_uri: &Uri,
    inbound_host: &str,
) -> Result<UpstreamTarget, PipelineError> {
    if upstream.url.is_empty() {
        return Err(PipelineError::Internal(
            "unable to forward the request because the matched rule does not define an upstream url".to_string(),
        ));
    }

    let backend = Url::parse(&upstream.url)
        .map_err(|e| PipelineError::Internal(format!("invalid upstream url \"{}\": {}", upstream.url, e)))?;
    let backend_host = match (backend.host_str(), backend.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(PipelineError::Internal(format!(
                "upstream url \"{}\" has no host",
                upstream.url
            )))
        }
    };

    let joined = format!(
        "/{}/{}",
        backend.path().trim_matches('/'),
        request_uri.path().trim_start_matches('/')
    );
    let mut path = format!("/{}", joined.trim_start_matches('/'));

    if !upstream.strip_path.is_empty() {
        let prefix = format!("/{}", upstream.strip_path.trim_matches('/'));
        path = path.replacen(&prefix, "", 1);
    }
    if path.is_empty() {
        path.push('/');
    }

    let target = match request_uri.query() {
        Some(query) => format!("{}://{}{}?{}", backend.scheme(), backend_host, path, query),
        None => format!("{}://{}{}", backend.scheme(), backend_host, path),
    };
    let uri = target
        .parse::<Uri>()
        .map_err(|e| PipelineError::Internal(format!("unable to build upstream uri \"{}\": {}", target, e)))?;

    let host = if upstream.preserve_host {
        inbound_host.to_string()
    } else {
        backend_host
    };

    Ok(UpstreamTarget { uri, host })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(url: &str, strip_path: &str, preserve_host: bool) -> Upstream {
        Upstream {
            url: url.into(),
            strip_path: strip_path.into(),
            preserve_host,
        }
    }

    fn target(up: &Upstream, uri: &str) -> UpstreamTarget {
        configure_backend_url(up, &uri.parse().unwrap(), "gateway.test").unwrap()
    }

    #[test]
    fn test_joins_paths() {
        let t = target(&upstream("http://backend:8080", "", false), "/users/1?expand=true");
        assert_eq!(t.uri.to_string(), "http://backend:8080/users/1?expand=true");
        assert_eq!(t.host, "backend:8080");

        let t = target(&upstream("https://backend/api/", "", false), "/users");
        assert_eq!(t.uri.to_string(), "https://backend/api/users");

        let t = target(&upstream("http://backend", "", false), "/");
        assert_eq!(t.uri.path(), "/");
    }

    #[test]
    fn test_strip_path_once() {
        let t = target(&upstream("http://backend", "/api/", false), "/api/users/api");
        assert_eq!(t.uri.path(), "/users/api");

        let t = target(&upstream("http://backend", "/api", false), "/api");
        assert_eq!(t.uri.path(), "/");
    }

    #[test]
    fn test_preserve_host() {
        let t = target(&upstream("http://backend", "", true), "/x");
        assert_eq!(t.host, "gateway.test");
    }

    #[test]
    fn test_missing_upstream() {
        assert!(matches!(
            configure_backend_url(&Upstream::default(), &"/x".parse().unwrap(), "gateway.test"),
            Err(PipelineError::Internal(_))
        ));
    }
}
