//! In-process rule store

use async_trait::async_trait;
use parking_lot::RwLock;

use super::Adapter;
use crate::error::Result;
use crate::types::{matches_filter, PolicyRule};

/// Rules kept in memory; every operation is applied immediately.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    rules: RwLock<Vec<PolicyRule>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Snapshot of the stored rules.
    pub fn rules(&self) -> Vec<PolicyRule> {
        self.rules.read().clone()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn load_rules(&self) -> Result<Vec<PolicyRule>> {
        Ok(self.rules())
    }

    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<()> {
        *self.rules.write() = rules.to_vec();
        Ok(())
    }

    async fn add_rule(&self, rule: &PolicyRule) -> Result<()> {
        let mut rules = self.rules.write();
        if !rules.contains(rule) {
            rules.push(rule.clone());
        }
        Ok(())
    }

    async fn remove_rule(&self, rule: &PolicyRule) -> Result<()> {
        self.rules.write().retain(|r| r != rule);
        Ok(())
    }

    async fn remove_filtered(&self, ptype: &str, field_index: usize, values: &[String]) -> Result<()> {
        self.rules
            .write()
            .retain(|r| !(r.ptype == ptype && matches_filter(&r.values, field_index, values)));
        Ok(())
    }
}
