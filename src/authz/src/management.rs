//! Policy management API: CRUD and queries over `p`/`g` rules by handle
//!
//! Add and remove report a `changed` flag instead of failing when the rule
//! already exists or is already absent. Filters treat empty values as
//! wildcards.

use crate::enforcer::Enforcer;
use crate::error::Result;
use crate::registry::PolicyRegistry;
use crate::types::{EnforcerHandle, Rule};

/// Fallback field positions for subject, object and action.
const SUBJECT_INDEX: usize = 0;
const OBJECT_INDEX: usize = 1;
const ACTION_INDEX: usize = 2;

/// Field holding the role in a grouping rule.
const ROLE_INDEX: usize = 1;

impl PolicyRegistry {
    pub(crate) async fn with_read<T>(&self, handle: EnforcerHandle, f: impl FnOnce(&Enforcer) -> T) -> Result<T> {
        let enforcer = self.lookup(handle)?;
        let guard = enforcer.read().await;
        Ok(f(&guard))
    }

    pub async fn get_policy(&self, handle: EnforcerHandle) -> Result<Vec<Rule>> {
        self.get_named_policy(handle, "p").await
    }

    pub async fn get_named_policy(&self, handle: EnforcerHandle, ptype: &str) -> Result<Vec<Rule>> {
        self.with_read(handle, |e| e.get_rules(ptype)).await
    }

    pub async fn get_grouping_policy(&self, handle: EnforcerHandle) -> Result<Vec<Rule>> {
        self.get_named_grouping_policy(handle, "g").await
    }

    pub async fn get_named_grouping_policy(&self, handle: EnforcerHandle, ptype: &str) -> Result<Vec<Rule>> {
        self.with_read(handle, |e| e.get_rules(ptype)).await
    }

    pub async fn get_filtered_policy(
        &self,
        handle: EnforcerHandle,
        field_index: usize,
        values: &[String],
    ) -> Result<Vec<Rule>> {
        self.get_filtered_named_policy(handle, "p", field_index, values).await
    }

    pub async fn get_filtered_named_policy(
        &self,
        handle: EnforcerHandle,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<Vec<Rule>> {
        self.with_read(handle, |e| e.get_filtered(ptype, field_index, values)).await
    }

    pub async fn get_filtered_grouping_policy(
        &self,
        handle: EnforcerHandle,
        field_index: usize,
        values: &[String],
    ) -> Result<Vec<Rule>> {
        self.get_filtered_named_grouping_policy(handle, "g", field_index, values).await
    }

    pub async fn get_filtered_named_grouping_policy(
        &self,
        handle: EnforcerHandle,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<Vec<Rule>> {
        self.with_read(handle, |e| e.get_filtered(ptype, field_index, values)).await
    }

    pub async fn has_policy(&self, handle: EnforcerHandle, rule: &[String]) -> Result<bool> {
        self.has_named_policy(handle, "p", rule).await
    }

    pub async fn has_named_policy(&self, handle: EnforcerHandle, ptype: &str, rule: &[String]) -> Result<bool> {
        self.with_read(handle, |e| e.has_rule(ptype, rule)).await
    }

    pub async fn has_grouping_policy(&self, handle: EnforcerHandle, rule: &[String]) -> Result<bool> {
        self.has_named_grouping_policy(handle, "g", rule).await
    }

    pub async fn has_named_grouping_policy(&self, handle: EnforcerHandle, ptype: &str, rule: &[String]) -> Result<bool> {
        self.with_read(handle, |e| e.has_rule(ptype, rule)).await
    }

    pub async fn add_policy(&self, handle: EnforcerHandle, rule: Rule) -> Result<bool> {
        self.add_named_policies(handle, "p", vec![rule]).await
    }

    pub async fn add_named_policy(&self, handle: EnforcerHandle, ptype: &str, rule: Rule) -> Result<bool> {
        self.add_named_policies(handle, ptype, vec![rule]).await
    }

    /// Adds every rule or none (`false` if any already exists).
    pub async fn add_policies(&self, handle: EnforcerHandle, rules: Vec<Rule>) -> Result<bool> {
        self.add_named_policies(handle, "p", rules).await
    }

    pub async fn add_named_policies(&self, handle: EnforcerHandle, ptype: &str, rules: Vec<Rule>) -> Result<bool> {
        let enforcer = self.lookup(handle)?;
        let mut guard = enforcer.write().await;
        guard.add_rules(ptype, rules).await
    }

    pub async fn add_grouping_policy(&self, handle: EnforcerHandle, rule: Rule) -> Result<bool> {
        self.add_named_policies(handle, "g", vec![rule]).await
    }

    pub async fn add_named_grouping_policy(&self, handle: EnforcerHandle, ptype: &str, rule: Rule) -> Result<bool> {
        self.add_named_policies(handle, ptype, vec![rule]).await
    }

    pub async fn add_grouping_policies(&self, handle: EnforcerHandle, rules: Vec<Rule>) -> Result<bool> {
        self.add_named_policies(handle, "g", rules).await
    }

    pub async fn remove_policy(&self, handle: EnforcerHandle, rule: Rule) -> Result<bool> {
        self.remove_named_policies(handle, "p", vec![rule]).await
    }

    pub async fn remove_named_policy(&self, handle: EnforcerHandle, ptype: &str, rule: Rule) -> Result<bool> {
        self.remove_named_policies(handle, ptype, vec![rule]).await
    }

    /// Removes every rule or none (`false` if any is missing).
    pub async fn remove_policies(&self, handle: EnforcerHandle, rules: Vec<Rule>) -> Result<bool> {
        self.remove_named_policies(handle, "p", rules).await
    }

    pub async fn remove_named_policies(&self, handle: EnforcerHandle, ptype: &str, rules: Vec<Rule>) -> Result<bool> {
        let enforcer = self.lookup(handle)?;
        let mut guard = enforcer.write().await;
        guard.remove_rules(ptype, rules).await
    }

    pub async fn remove_grouping_policy(&self, handle: EnforcerHandle, rule: Rule) -> Result<bool> {
        self.remove_named_policies(handle, "g", vec![rule]).await
    }

    pub async fn remove_named_grouping_policy(&self, handle: EnforcerHandle, ptype: &str, rule: Rule) -> Result<bool> {
        self.remove_named_policies(handle, ptype, vec![rule]).await
    }

    pub async fn remove_filtered_policy(
        &self,
        handle: EnforcerHandle,
        field_index: usize,
        values: &[String],
    ) -> Result<bool> {
        self.remove_filtered_named_policy(handle, "p", field_index, values).await
    }

    pub async fn remove_filtered_named_policy(
        &self,
        handle: EnforcerHandle,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<bool> {
        let enforcer = self.lookup(handle)?;
        let mut guard = enforcer.write().await;
        guard.remove_filtered(ptype, field_index, values).await
    }

    pub async fn remove_filtered_grouping_policy(
        &self,
        handle: EnforcerHandle,
        field_index: usize,
        values: &[String],
    ) -> Result<bool> {
        self.remove_filtered_named_policy(handle, "g", field_index, values).await
    }

    pub async fn remove_filtered_named_grouping_policy(
        &self,
        handle: EnforcerHandle,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<bool> {
        self.remove_filtered_named_policy(handle, ptype, field_index, values).await
    }

    pub async fn get_all_subjects(&self, handle: EnforcerHandle) -> Result<Vec<String>> {
        self.get_all_named_subjects(handle, "p").await
    }

    pub async fn get_all_named_subjects(&self, handle: EnforcerHandle, ptype: &str) -> Result<Vec<String>> {
        self.project_field(handle, ptype, "sub", SUBJECT_INDEX).await
    }

    pub async fn get_all_objects(&self, handle: EnforcerHandle) -> Result<Vec<String>> {
        self.get_all_named_objects(handle, "p").await
    }

    pub async fn get_all_named_objects(&self, handle: EnforcerHandle, ptype: &str) -> Result<Vec<String>> {
        self.project_field(handle, ptype, "obj", OBJECT_INDEX).await
    }

    pub async fn get_all_actions(&self, handle: EnforcerHandle) -> Result<Vec<String>> {
        self.get_all_named_actions(handle, "p").await
    }

    pub async fn get_all_named_actions(&self, handle: EnforcerHandle, ptype: &str) -> Result<Vec<String>> {
        self.project_field(handle, ptype, "act", ACTION_INDEX).await
    }

    pub async fn get_all_roles(&self, handle: EnforcerHandle) -> Result<Vec<String>> {
        self.get_all_named_roles(handle, "g").await
    }

    pub async fn get_all_named_roles(&self, handle: EnforcerHandle, ptype: &str) -> Result<Vec<String>> {
        self.with_read(handle, |e| e.values_for_field(ptype, ROLE_INDEX)).await
    }

    /// Distinct values of the field named `field` in the policy definition,
    /// or of position `fallback` when the definition has no such field.
    async fn project_field(
        &self,
        handle: EnforcerHandle,
        ptype: &str,
        field: &str,
        fallback: usize,
    ) -> Result<Vec<String>> {
        self.with_read(handle, |e| {
            let index = e
                .model()
                .policy_fields(ptype)
                .and_then(|fields| fields.iter().position(|f| f == field))
                .unwrap_or(fallback);
            e.values_for_field(ptype, index)
        })
        .await
    }
}
