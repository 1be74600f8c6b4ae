//! Rule matching logic.
//!
//! # Responsibilities
//! - Match a raw request path against a literal relay prefix
//! - Apply a regex rewrite rule and expand its replacement template
//!
//! # Design Decisions
//! - Relay matching is a case-sensitive `starts_with` on path and query
//! - Rewrite templates use `$1` / `${name}` capture references
//! - A rewrite produces only the expanded template, not the input with the match replaced

use regex::Regex;

use crate::config::ConfigError;

/// Matches the raw request path against a literal prefix and names the target host.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
    host_id: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            host_id: host_id.into(),
        }
    }

    pub fn matches(&self, raw_path: &str) -> bool {
        raw_path.starts_with(&self.prefix)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }
}

/// A compiled regex pattern and its replacement template.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    template: String,
}

impl RewriteRule {
    /// Compile `pattern`. An invalid pattern is a configuration error.
    pub fn new(pattern: &str, template: impl Into<String>) -> Result<Self, ConfigError> {
        let compiled = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: compiled,
            template: template.into(),
        })
    }

    /// Compile an ordered list of `(pattern, template)` pairs.
    pub fn compile_all(pairs: &[(String, String)]) -> Result<Vec<Self>, ConfigError> {
        pairs
            .iter()
            .map(|(pattern, template)| Self::new(pattern, template.as_str()))
            .collect()
    }

    /// Expand the template if `input` matches.
    pub fn apply(&self, input: &str) -> Option<String> {
        let captures = self.pattern.captures(input)?;
        let mut expanded = String::new();
        captures.expand(&self.template, &mut expanded);
        Some(expanded)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api", "backend");
        assert!(matcher.matches("/api/v1"));
        assert!(matcher.matches("/api?x=1"));
        assert!(matcher.matches("/apiary"));
        assert!(!matcher.matches("/images"));
        assert!(!matcher.matches("/API/v1"));
        assert_eq!(matcher.host_id(), "backend");
    }

    #[test]
    fn rewrite_expands_captures() {
        let rule = RewriteRule::new(r"^/js/(.*)\.js$", "/js/${1}.min.js").unwrap();
        assert_eq!(rule.apply("/js/app.js").as_deref(), Some("/js/app.min.js"));
        assert_eq!(rule.apply("/css/app.css"), None);
    }

    #[test]
    fn rewrite_yields_template_only() {
        let rule = RewriteRule::new("^/$", "/subfolder/").unwrap();
        assert_eq!(rule.apply("/").as_deref(), Some("/subfolder/"));

        let partial = RewriteRule::new("old", "new").unwrap();
        assert_eq!(partial.apply("/path/old/x").as_deref(), Some("new"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = RewriteRule::new("(unclosed", "x").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
