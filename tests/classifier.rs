// tests/classifier.rs

mod common;
use crate::common::{filter_with_depth, filter_with_rules, p};

use proptest::prelude::*;

use devloop::types::DepthLimit;
use devloop::watch::{dependency_depth, IgnoreRule};

#[test]
fn nested_dependency_excluded_at_depth_one() {
    let filter = filter_with_depth(DepthLimit::Max(1));

    assert!(!filter.should_watch(&p("/app/node_modules/a/node_modules/b/index.js")));
    assert!(filter.should_watch(&p("/app/node_modules/a/index.js")));
    assert!(filter.should_watch(&p("/app/src/index.js")));
}

#[test]
fn depth_counts_boundary_segments_up_to_the_last_one() {
    assert_eq!(dependency_depth(&p("/app/src/main.ts"), "node_modules"), 0);
    assert_eq!(dependency_depth(&p("/app/node_modules/a/index.js"), "node_modules"), 1);
    assert_eq!(
        dependency_depth(&p("/app/node_modules/a/node_modules/b/lib/x.js"), "node_modules"),
        2
    );
    // A segment merely containing the name is not a boundary.
    assert_eq!(dependency_depth(&p("/app/my_node_modules/x.js"), "node_modules"), 0);
}

#[test]
fn depth_boundary_is_inclusive() {
    let at_two = p("/r/node_modules/a/node_modules/b/i.js");
    let at_three = p("/r/node_modules/a/node_modules/b/node_modules/c/i.js");

    let filter = filter_with_depth(DepthLimit::Max(2));
    assert!(filter.should_watch(&at_two));
    assert!(!filter.should_watch(&at_three));
}

#[test]
fn depth_zero_watches_first_party_only() {
    let filter = filter_with_depth(DepthLimit::Max(0));
    assert!(filter.should_watch(&p("/app/src/a.ts")));
    assert!(!filter.should_watch(&p("/app/node_modules/a/index.js")));
}

#[test]
fn unlimited_depth_watches_everything_not_ignored() {
    let filter = filter_with_depth(DepthLimit::Unlimited);
    assert!(filter.should_watch(&p(
        "/r/node_modules/a/node_modules/b/node_modules/c/node_modules/d/i.js"
    )));
}

#[test]
fn ignore_rule_matches_as_prefix() {
    let filter = filter_with_rules(&["/usr/lib/"], DepthLimit::Unlimited);
    assert!(filter.is_ignored(&p("/usr/lib/node/x.js")));
    assert!(!filter.should_watch(&p("/usr/lib/node/x.js")));
    assert!(filter.should_watch(&p("/usr/local/x.js")));
    // The same string also compiles as a regex, which matches anywhere.
    assert!(filter.is_ignored(&p("/home/me/usr/lib/x.js")));
}

#[test]
fn ignore_rule_matches_as_regex() {
    let filter = filter_with_rules(&[r"\.test\.ts$"], DepthLimit::Unlimited);
    assert!(filter.is_ignored(&p("/app/src/a.test.ts")));
    assert!(!filter.is_ignored(&p("/app/src/a.ts")));
}

#[test]
fn invalid_regex_still_works_as_prefix() {
    let rule = IgnoreRule::new("/app/gen[");
    assert!(rule.matches("/app/gen[1]/x.js"));
    assert!(!rule.matches("/app/src/x.js"));
}

#[test]
fn ignored_file_is_excluded_regardless_of_depth() {
    let filter = filter_with_rules(&["/app/dist"], DepthLimit::Unlimited);
    assert!(!filter.should_watch(&p("/app/dist/server.js")));
}

#[test]
fn custom_boundary_name() {
    assert_eq!(dependency_depth(&p("/app/vendor/a/vendor/b/x.rb"), "vendor"), 2);
    assert_eq!(dependency_depth(&p("/app/node_modules/a/x.js"), "vendor"), 0);
}

fn path_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            Just("node_modules".to_string()),
            Just("src".to_string()),
            "[a-z]{1,6}".prop_map(|s| s),
        ],
        1..8,
    )
    .prop_map(|segments| format!("/{}", segments.join("/")))
}

proptest! {
    #[test]
    fn should_watch_is_deterministic(path in path_strategy(), max in 0usize..4) {
        let filter = filter_with_rules(&["/tmp/", r"\.map$"], DepthLimit::Max(max));
        let path = p(&path);

        let first = filter.should_watch(&path);
        let second = filter.should_watch(&path);
        prop_assert_eq!(first, second);

        // Equivalent to the two independent filters combined.
        let expected = !filter.is_ignored(&path)
            && filter.dependency_depth(&path) <= max;
        prop_assert_eq!(first, expected);
    }

    #[test]
    fn depth_equals_number_of_boundary_segments(path in path_strategy()) {
        let expected = path.split('/').filter(|s| *s == "node_modules").count();
        prop_assert_eq!(dependency_depth(&p(&path), "node_modules"), expected);
    }
}
