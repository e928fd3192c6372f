#![allow(dead_code)]

pub use devloop_test_utils::builders;
pub use devloop_test_utils::{init_tracing, with_timeout};

use std::path::PathBuf;

use devloop::engine::{Orchestrator, RuntimeOptions};
use devloop::types::DepthLimit;
use devloop::watch::{IgnoreRule, WatchFilter};

/// Filter with the default boundary and no ignore rules.
pub fn filter_with_depth(max: DepthLimit) -> WatchFilter {
    WatchFilter::new(Vec::new(), max, "node_modules")
}

pub fn filter_with_rules(rules: &[&str], max: DepthLimit) -> WatchFilter {
    let rules = rules.iter().map(|r| IgnoreRule::new(*r)).collect();
    WatchFilter::new(rules, max, "node_modules")
}

/// Orchestrator with permissive filtering.
pub fn orchestrator(options: RuntimeOptions) -> Orchestrator {
    Orchestrator::new(filter_with_depth(DepthLimit::Unlimited), options)
}

pub fn p(path: &str) -> PathBuf {
    PathBuf::from(path)
}
