//! Core types: registry handles, policy rules and the enforcement tuple

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rule row without its ptype, e.g. `["alice", "data1", "read"]`.
pub type Rule = Vec<String>;

/// Handle of an adapter registered in a [`PolicyRegistry`](crate::PolicyRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterHandle(pub i32);

impl AdapterHandle {
    /// Raw value used on the wire to mean "no adapter".
    pub const NONE: i32 = -1;

    /// Map a wire handle to an optional adapter; any negative value means none.
    pub fn from_raw(raw: i32) -> Option<Self> {
        (raw >= 0).then_some(Self(raw))
    }
}

impl fmt::Display for AdapterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adapter#{}", self.0)
    }
}

/// Handle of an enforcer registered in a [`PolicyRegistry`](crate::PolicyRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnforcerHandle(pub i32);

impl fmt::Display for EnforcerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enforcer#{}", self.0)
    }
}

/// A stored rule together with its section type (`p`, `g`, `g2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub ptype: String,
    pub values: Rule,
}

impl PolicyRule {
    pub fn new(ptype: impl Into<String>, values: Rule) -> Self {
        Self {
            ptype: ptype.into(),
            values,
        }
    }
}

/// Filter semantics shared by queries and bulk removal: every non-empty
/// `filter[i]` must equal `rule[field_index + i]`; empty entries match anything.
pub fn matches_filter(rule: &[String], field_index: usize, filter: &[String]) -> bool {
    filter.iter().enumerate().all(|(i, want)| {
        want.is_empty() || rule.get(field_index + i).is_some_and(|have| have == want)
    })
}

/// The six request fields the domain model expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementTuple {
    pub subject: String,
    pub namespace: String,
    pub project: String,
    pub organization: String,
    pub object: String,
    pub action: String,
}

impl EnforcementTuple {
    /// Wildcard used for unscoped namespace, project or organization.
    pub const WILDCARD: &'static str = "*";

    /// Builder entry point; scope fields default to the wildcard.
    pub fn new(subject: impl Into<String>, object: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            namespace: Self::WILDCARD.to_string(),
            project: Self::WILDCARD.to_string(),
            organization: Self::WILDCARD.to_string(),
            object: object.into(),
            action: action.into(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = or_wildcard(namespace.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = or_wildcard(project.into());
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = or_wildcard(organization.into());
        self
    }

    /// Positional request values in model order `(sub, ns, proj, org, obj, act)`.
    pub fn to_params(&self) -> Vec<String> {
        vec![
            self.subject.clone(),
            self.namespace.clone(),
            self.project.clone(),
            self.organization.clone(),
            self.object.clone(),
            self.action.clone(),
        ]
    }
}

fn or_wildcard(value: String) -> String {
    if value.is_empty() {
        EnforcementTuple::WILDCARD.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_adapter_handle_means_none() {
        assert_eq!(AdapterHandle::from_raw(AdapterHandle::NONE), None);
        assert_eq!(AdapterHandle::from_raw(2), Some(AdapterHandle(2)));
    }

    #[test]
    fn tuple_builder_normalizes_empty_scope() {
        let tuple = EnforcementTuple::new("u:alice", "/v3/projects", "GET")
            .with_organization("")
            .with_project("prod");

        assert_eq!(tuple.organization, "*");
        assert_eq!(tuple.project, "prod");
        assert_eq!(
            tuple.to_params(),
            vec!["u:alice", "*", "prod", "*", "/v3/projects", "GET"]
        );
    }

    #[test]
    fn rule_keeps_its_type() {
        let rule = PolicyRule::new("g2", vec!["u:élan".into(), "role:viewer".into()]);
        assert_eq!(rule.ptype, "g2");
        assert_eq!(rule.values[0], "u:élan");
        assert_eq!(PolicyRule::new("ü", vec![]).ptype, "ü");
    }

    #[test]
    fn filter_empty_is_wildcard() {
        let rule: Rule = vec!["alice".into(), "data1".into(), "read".into()];
        let f = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(matches_filter(&rule, 0, &f(&["alice"])));
        assert!(matches_filter(&rule, 0, &f(&["", "data1"])));
        assert!(matches_filter(&rule, 1, &f(&["data1", "read"])));
        assert!(!matches_filter(&rule, 1, &f(&["data1", "write"])));
        assert!(!matches_filter(&rule, 2, &f(&["read", "extra"])));
        assert!(matches_filter(&rule, 2, &f(&["", ""])));
    }
}
