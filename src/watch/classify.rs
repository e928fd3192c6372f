// src/watch/classify.rs

//! Decides whether a file the child required should be watched.
//!
//! Two independent filters:
//! - ignore rules, each tried as a literal prefix and as a regex;
//! - dependency depth, i.e. how many package-boundary directories
//!   (`node_modules` by default) the path is nested in.
//!
//! Everything here is pure; the same filter always gives the same answer for
//! the same path.

use std::fmt;
use std::path::Path;

use regex::Regex;
use tracing::warn;

use crate::config::WatchSection;
use crate::types::DepthLimit;

/// A single ignore rule from `[watch].ignore`.
#[derive(Clone)]
pub struct IgnoreRule {
    raw: String,
    pattern: Option<Regex>,
}

impl fmt::Debug for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreRule")
            .field("raw", &self.raw)
            .field("is_regex", &self.pattern.is_some())
            .finish()
    }
}

impl IgnoreRule {
    /// Build a rule. Strings that don't compile as a regex still work as
    /// literal prefixes.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let pattern = match Regex::new(&raw) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(
                    rule = %raw,
                    error = %err,
                    "ignore rule is not a valid regex; using it as a prefix only"
                );
                None
            }
        };
        Self { raw, pattern }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.raw) || self.pattern.as_ref().is_some_and(|re| re.is_match(path))
    }
}

/// Compiled watch filter for required files.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    rules: Vec<IgnoreRule>,
    max_depth: DepthLimit,
    boundary: String,
}

impl WatchFilter {
    pub fn new(rules: Vec<IgnoreRule>, max_depth: DepthLimit, boundary: impl Into<String>) -> Self {
        Self {
            rules,
            max_depth,
            boundary: boundary.into(),
        }
    }

    pub fn from_config(watch: &WatchSection) -> Self {
        let rules = watch.ignore.iter().map(IgnoreRule::new).collect();
        Self::new(rules, watch.deps, watch.boundary.clone())
    }

    pub fn max_depth(&self) -> DepthLimit {
        self.max_depth
    }

    /// True if any ignore rule matches `path`.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.rules.iter().any(|rule| rule.matches(&path))
    }

    pub fn dependency_depth(&self, path: &Path) -> usize {
        dependency_depth(path, &self.boundary)
    }

    /// Whether `path` belongs in the watch set.
    pub fn should_watch(&self, path: &Path) -> bool {
        !self.is_ignored(path) && self.max_depth.allows(self.dependency_depth(path))
    }
}

/// Number of `boundary` directory segments in `path`, up to and including
/// the last one. Zero means a first-party file.
///
/// `node_modules/a/node_modules/b/index.js` has depth 2 and
/// `node_modules/a/index.js` depth 1.
pub fn dependency_depth(path: &Path, boundary: &str) -> usize {
    path.components()
        .filter(|component| component.as_os_str() == boundary)
        .count()
}
