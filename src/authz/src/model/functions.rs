//! Built-in matching functions available to matchers and role managers
//!
//! All functions take the concrete value first and the pattern second.

use regex::Regex;
use std::sync::OnceLock;

/// Signature shared by matcher built-ins and role-manager name matching.
pub type MatchFn = fn(&str, &str) -> bool;

/// Names and implementations registered into every matcher context.
pub const BUILTINS: &[(&str, MatchFn)] = &[
    ("keyMatch", key_match),
    ("keyMatch2", key_match2),
    ("keyMatchCu", key_match_cu),
    ("regexMatch", regex_match),
    ("globMatch", glob_match),
];

/// `/foo/*` matches `/foo/bar`; without `*` the keys must be equal.
pub fn key_match(key: &str, pattern: &str) -> bool {
    match pattern.find('*') {
        None => key == pattern,
        Some(star) if key.len() > star => key.get(..star) == pattern.get(..star),
        Some(star) => Some(key) == pattern.get(..star),
    }
}

/// Like [`key_match`] but also supports `:param` path segments.
pub fn key_match2(key: &str, pattern: &str) -> bool {
    static PARAM: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(param) = PARAM.get_or_init(|| Regex::new(r":[^/]+").ok()) else {
        return false;
    };
    let pattern = pattern.replace("/*", "/.*");
    let pattern = param.replace_all(&pattern, "[^/]+");
    regex_match(key, &format!("^{pattern}$"))
}

/// `*` matches anything, everything else defers to [`key_match2`].
pub fn key_match_cu(key: &str, pattern: &str) -> bool {
    pattern == "*" || key_match2(key, pattern)
}

/// An invalid pattern never matches.
pub fn regex_match(key: &str, pattern: &str) -> bool {
    Regex::new(pattern).map(|re| re.is_match(key)).unwrap_or(false)
}

/// Shell-style glob; `*` also crosses `/`.
pub fn glob_match(key: &str, pattern: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(key))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_match_prefix() {
        assert!(key_match("/foo/bar", "/foo/*"));
        assert!(key_match("/foo", "/foo"));
        assert!(!key_match("/bar/foo", "/foo/*"));
        assert!(key_match("/foo/", "/foo/*"));
    }

    #[test]
    fn key_match2_params() {
        assert!(key_match2("/v3/projects/p1/clusters", "/v3/projects/:project/clusters"));
        assert!(key_match2("/v3/projects/p1/clusters/c1", "/v3/projects/*"));
        assert!(!key_match2("/v3/projects/p1/apps", "/v3/projects/:project/clusters"));
        assert!(!key_match2("/v3/projects", "/v3/projects/:project"));
    }

    #[test]
    fn key_match2_several_params() {
        let pattern = "/v3/projects/:project/clusters/:cluster";
        for _ in 0..3 {
            assert!(key_match2("/v3/projects/p1/clusters/c1", pattern));
            assert!(!key_match2("/v3/projects/p1/clusters/c1/nodes", pattern));
        }
        assert!(key_match2("/v3/orgs/acme/users/u1", "/v3/orgs/:org/users/:id"));
    }

    #[test]
    fn key_match_cu_star() {
        assert!(key_match_cu("anything", "*"));
        assert!(key_match_cu("/v3/users/u1", "/v3/users/:id"));
        assert!(!key_match_cu("/v3/users", "/v3/groups"));
    }

    #[test]
    fn regex_invalid_pattern_is_false() {
        assert!(regex_match("GET", "^(GET|POST)$"));
        assert!(!regex_match("GET", "("));
    }

    #[test]
    fn glob_hierarchical_subjects() {
        assert!(glob_match("partner/org/alice", "partner/org/*"));
        assert!(glob_match("team-a", "*"));
        assert!(!glob_match("team-b", "team-a"));
        assert!(!glob_match("*", "team-a"));
    }
}
