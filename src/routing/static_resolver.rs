//! Static content resolution.
//!
//! # State machine
//! ```text
//! START ─ redirect rule matches ─▶ Redirect(location)      (no file I/O)
//!   │
//!   ▼
//! resolving: subPath = path (+ "index.html" for "" or ".../")
//!   ├─ root/subPath is a file                 ─▶ File
//!   ├─ first mapping whose result is a file   ─▶ File
//!   └─ otherwise                              ─▶ NotFound
//! ```
//!
//! # Design Decisions
//! - Redirect and mapping tables are walked in configured order
//! - A mapping that matches but names a missing file does not stop the walk
//! - Candidates must stay inside the served root after canonicalization

use std::path::{Component, Path, PathBuf};

use crate::config::{ConfigError, RouteConfig};
use crate::routing::matcher::RewriteRule;

/// Outcome of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Permanent redirect to the expanded location.
    Redirect(String),
    /// An existing file under the served root.
    File(PathBuf),
    NotFound,
}

/// Resolves request paths to files under the served root.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    root: PathBuf,
    redirect: Vec<RewriteRule>,
    mapping: Vec<RewriteRule>,
}

impl StaticResolver {
    /// Compile the redirect and mapping tables for `root`.
    pub fn compile(root: &Path, routes: &RouteConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            redirect: RewriteRule::compile_all(&routes.redirect)?,
            mapping: RewriteRule::compile_all(&routes.mapping)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the first redirect rule matching `path`.
    pub fn redirect_for(&self, path: &str) -> Option<String> {
        self.redirect.iter().find_map(|rule| rule.apply(path))
    }

    /// Resolve an absolute request path.
    pub async fn resolve(&self, path: &str) -> Resolution {
        if let Some(location) = self.redirect_for(path) {
            return Resolution::Redirect(location);
        }

        let sub_path = if path.is_empty() {
            "/index.html".to_string()
        } else if path.ends_with('/') {
            format!("{path}index.html")
        } else {
            path.to_string()
        };

        if let Some(file) = self.locate(&sub_path).await {
            return Resolution::File(file);
        }

        for rule in &self.mapping {
            let Some(mapped) = rule.apply(&sub_path) else {
                continue;
            };
            if let Some(file) = self.locate(&mapped).await {
                tracing::trace!(pattern = rule.pattern(), from = %sub_path, to = %mapped, "Mapped static path");
                return Resolution::File(file);
            }
        }

        Resolution::NotFound
    }

    /// Existing regular file for `sub_path`, contained in the root.
    async fn locate(&self, sub_path: &str) -> Option<PathBuf> {
        let relative = Path::new(sub_path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            tracing::warn!(path = %sub_path, "Rejected static path escaping the served directory");
            return None;
        }

        let candidate = tokio::fs::canonicalize(self.root.join(relative)).await.ok()?;
        if !candidate.starts_with(&self.root) {
            tracing::warn!(path = %sub_path, "Rejected static path escaping the served directory");
            return None;
        }

        let metadata = tokio::fs::metadata(&candidate).await.ok()?;
        metadata.is_file().then_some(candidate)
    }
}
