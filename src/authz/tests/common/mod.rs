#![allow(dead_code)]

use kubefleet_authz::{EnforcerHandle, PolicyRegistry, Rule};
use std::path::PathBuf;

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).unwrap()
}

/// Registry with one file adapter and one enforcer bound to it.
pub async fn engine(policy: &str, model: &str) -> (PolicyRegistry, EnforcerHandle) {
    let registry = PolicyRegistry::default();
    let adapter = registry
        .create_adapter("file", &fixture(policy).display().to_string(), false)
        .await
        .unwrap();
    let handle = registry
        .create_enforcer(&read_fixture(model), Some(adapter))
        .await
        .unwrap();
    (registry, handle)
}

pub async fn rbac_engine() -> (PolicyRegistry, EnforcerHandle) {
    engine("rbac_policy.csv", "rbac_model.conf").await
}

pub fn rules(rows: &[&[&str]]) -> Vec<Rule> {
    rows.iter()
        .map(|row| row.iter().map(|s| s.to_string()).collect())
        .collect()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

pub fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}
