//! Rule file loading.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::rule::model::Rule;

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("unable to read rules from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse rules from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Filesystem path of a repository location (`file://` prefix accepted).
pub fn repository_path(location: &str) -> PathBuf {
    PathBuf::from(location.strip_prefix("file://").unwrap_or(location))
}

/// Load one JSON array of rules.
pub fn load_rules_file(path: &Path) -> Result<Vec<Rule>, RuleLoadError> {
    let content = fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| RuleLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and concatenate every repository, in order.
pub fn load_rules(locations: &[String]) -> Result<Vec<Rule>, RuleLoadError> {
    let mut rules = Vec::new();
    for location in locations {
        let path = repository_path(location);
        let loaded = load_rules_file(&path)?;
        tracing::debug!(path = %path.display(), count = loaded.len(), "Rules file loaded");
        rules.extend(loaded);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("gatekeeper-{}-{}.json", name, std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_concatenates() {
        let a = write_temp("rules-a", r#"[{"id": "a", "match": {"methods": ["GET"], "url": "/a"}}]"#);
        let b = write_temp("rules-b", r#"[{"id": "b", "match": {"methods": ["GET"], "url": "/b"}}]"#);
        let locations = vec![format!("file://{}", a.display()), b.display().to_string()];

        let rules = load_rules(&locations).unwrap();
        assert_eq!(rules.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        fs::remove_file(a).ok();
        fs::remove_file(b).ok();
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            load_rules(&["/definitely/not/here.json".to_string()]),
            Err(RuleLoadError::Io { .. })
        ));
        let bad = write_temp("rules-bad", "{not json");
        assert!(matches!(load_rules_file(&bad), Err(RuleLoadError::Parse { .. })));
        fs::remove_file(bad).ok();
    }
}
