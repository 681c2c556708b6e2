//! RBAC convenience API: users, roles and permissions on top of the
//! management API

use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::{AuthzError, Result};
use crate::registry::PolicyRegistry;
use crate::types::{EnforcerHandle, PolicyRule, Rule};

fn permission_rule(user: &str, permission: &[String]) -> Rule {
    std::iter::once(user.to_string())
        .chain(permission.iter().cloned())
        .collect()
}

impl PolicyRegistry {
    pub async fn add_role_for_user(&self, handle: EnforcerHandle, user: &str, role: &str) -> Result<bool> {
        self.add_grouping_policy(handle, vec![user.to_string(), role.to_string()])
            .await
    }

    pub async fn delete_role_for_user(&self, handle: EnforcerHandle, user: &str, role: &str) -> Result<bool> {
        self.remove_grouping_policy(handle, vec![user.to_string(), role.to_string()])
            .await
    }

    /// Remove every `g` row whose member is `user`; permissions granted to
    /// roles are untouched.
    pub async fn delete_roles_for_user(&self, handle: EnforcerHandle, user: &str) -> Result<bool> {
        self.remove_filtered_grouping_policy(handle, 0, &[user.to_string()])
            .await
    }

    pub async fn delete_user(&self, handle: EnforcerHandle, user: &str) -> Result<bool> {
        self.delete_roles_for_user(handle, user).await
    }

    /// Roles directly assigned through `g`.
    pub async fn get_roles_for_user(&self, handle: EnforcerHandle, user: &str) -> Result<Vec<String>> {
        self.get_named_roles_for_user(handle, "g", user).await
    }

    pub async fn get_named_roles_for_user(&self, handle: EnforcerHandle, ptype: &str, user: &str) -> Result<Vec<String>> {
        self.with_read(handle, |e| e.role_manager(ptype).map(|rm| rm.get_roles(user, None)))
            .await?
    }

    /// Roles reachable through role inheritance; stops on cycles.
    pub async fn get_implicit_roles_for_user(&self, handle: EnforcerHandle, user: &str) -> Result<Vec<String>> {
        self.get_named_implicit_roles_for_user(handle, "g", user).await
    }

    pub async fn get_named_implicit_roles_for_user(
        &self,
        handle: EnforcerHandle,
        ptype: &str,
        user: &str,
    ) -> Result<Vec<String>> {
        self.with_read(handle, |e| {
            e.role_manager(ptype)
                .map(|rm| rm.get_implicit_roles(user, None))
        })
        .await?
    }

    pub async fn get_users_for_role(&self, handle: EnforcerHandle, role: &str) -> Result<Vec<String>> {
        self.with_read(handle, |e| e.role_manager("g").map(|rm| rm.get_users(role, None)))
            .await?
    }

    pub async fn has_role_for_user(&self, handle: EnforcerHandle, user: &str, role: &str) -> Result<bool> {
        Ok(self
            .get_roles_for_user(handle, user)
            .await?
            .iter()
            .any(|r| r == role))
    }

    /// Remove `role` everywhere: as member or role in every grouping type, and
    /// as subject of `p` rows.
    ///
    /// Store removals run first. If one fails, the rows already removed from
    /// the store are restored and the in-memory rules are left untouched; the
    /// error names the failing stage.
    pub async fn delete_role(&self, handle: EnforcerHandle, role: &str) -> Result<bool> {
        let enforcer = self.lookup(handle)?;
        let mut guard = enforcer.write().await;

        let role_filter = [role.to_string()];
        let mut grouping: Vec<PolicyRule> = Vec::new();
        for ptype in guard.grouping_types() {
            let mut seen = HashSet::new();
            for field_index in [0, 1] {
                for rule in guard.get_filtered(&ptype, field_index, &role_filter) {
                    if seen.insert(rule.clone()) {
                        grouping.push(PolicyRule::new(ptype.clone(), rule));
                    }
                }
            }
        }
        let permissions: Vec<PolicyRule> = guard
            .get_filtered("p", 0, &role_filter)
            .into_iter()
            .map(|rule| PolicyRule::new("p", rule))
            .collect();

        if grouping.is_empty() && permissions.is_empty() {
            return Ok(false);
        }

        if guard.auto_save() {
            let adapter = guard.adapter();
            let mut removed: Vec<PolicyRule> = Vec::new();
            for (stage, rules) in [
                ("remove grouping rules", &grouping),
                ("remove permission rules", &permissions),
            ] {
                for rule in rules {
                    if let Err(e) = adapter.remove_rule(rule).await {
                        warn!(%handle, role, stage, error = %e, "delete_role failed, restoring removed rules");
                        guard.undo_removals(&removed).await;
                        return Err(AuthzError::at_stage(stage, e));
                    }
                    removed.push(rule.clone());
                }
            }
        }

        for rule in grouping.iter().chain(&permissions) {
            guard.forget(&rule.ptype, std::slice::from_ref(&rule.values));
        }
        info!(
            %handle,
            role,
            grouping = grouping.len(),
            permissions = permissions.len(),
            "deleted role"
        );
        Ok(true)
    }

    /// Remove every `p` row granting `permission` (matched from field 1 on).
    pub async fn delete_permission(&self, handle: EnforcerHandle, permission: &[String]) -> Result<bool> {
        self.remove_filtered_policy(handle, 1, permission).await
    }

    pub async fn add_permission_for_user(&self, handle: EnforcerHandle, user: &str, permission: &[String]) -> Result<bool> {
        self.add_policy(handle, permission_rule(user, permission)).await
    }

    pub async fn delete_permission_for_user(
        &self,
        handle: EnforcerHandle,
        user: &str,
        permission: &[String],
    ) -> Result<bool> {
        self.remove_policy(handle, permission_rule(user, permission)).await
    }

    pub async fn delete_permissions_for_user(&self, handle: EnforcerHandle, user: &str) -> Result<bool> {
        self.remove_filtered_policy(handle, 0, &[user.to_string()]).await
    }

    /// `p` rows whose subject is `user`.
    pub async fn get_permissions_for_user(&self, handle: EnforcerHandle, user: &str) -> Result<Vec<Rule>> {
        self.get_filtered_policy(handle, 0, &[user.to_string()]).await
    }

    /// `p` rows of `user` and of every role it inherits, without duplicates.
    pub async fn get_implicit_permissions_for_user(&self, handle: EnforcerHandle, user: &str) -> Result<Vec<Rule>> {
        self.with_read(handle, |e| {
            let mut subjects = vec![user.to_string()];
            subjects.extend(e.role_manager("g")?.get_implicit_roles(user, None));

            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for subject in subjects {
                for rule in e.get_filtered("p", 0, &[subject]) {
                    if seen.insert(rule.clone()) {
                        out.push(rule);
                    }
                }
            }
            Ok(out)
        })
        .await?
    }

    pub async fn has_permission_for_user(&self, handle: EnforcerHandle, user: &str, permission: &[String]) -> Result<bool> {
        self.has_policy(handle, &permission_rule(user, permission)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Adapter, MemoryAdapter};
    use async_trait::async_trait;
    use std::sync::Arc;

    const BASIC_RBAC: &str = "[request_definition]\nr = sub, obj, act\n[policy_definition]\np = sub, obj, act\n\
        [role_definition]\ng = _, _\n[policy_effect]\ne = some(where (p.eft == allow))\n\
        [matchers]\nm = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act\n";

    fn rule(ptype: &str, values: &[&str]) -> PolicyRule {
        PolicyRule::new(ptype, values.iter().map(|s| s.to_string()).collect())
    }

    fn seed() -> Vec<PolicyRule> {
        vec![
            rule("p", &["alice", "data1", "read"]),
            rule("p", &["data2_admin", "data2", "read"]),
            rule("p", &["data2_admin", "data2", "write"]),
            rule("g", &["alice", "data2_admin"]),
            rule("g", &["data2_admin", "super_admin"]),
        ]
    }

    /// Store that refuses to remove `p` rows.
    struct FailingAdapter {
        inner: MemoryAdapter,
    }

    #[async_trait]
    impl Adapter for FailingAdapter {
        async fn load_rules(&self) -> Result<Vec<PolicyRule>> {
            self.inner.load_rules().await
        }

        async fn save_policy(&self, rules: &[PolicyRule]) -> Result<()> {
            self.inner.save_policy(rules).await
        }

        async fn add_rule(&self, rule: &PolicyRule) -> Result<()> {
            self.inner.add_rule(rule).await
        }

        async fn remove_rule(&self, rule: &PolicyRule) -> Result<()> {
            if rule.ptype == "p" {
                return Err(AuthzError::Adapter("store is read-only for p".into()));
            }
            self.inner.remove_rule(rule).await
        }

        async fn remove_filtered(&self, ptype: &str, field_index: usize, values: &[String]) -> Result<()> {
            self.inner.remove_filtered(ptype, field_index, values).await
        }
    }

    async fn registry_with(adapter: Arc<dyn Adapter>) -> (PolicyRegistry, EnforcerHandle) {
        let registry = PolicyRegistry::default();
        let h = registry.create_enforcer(BASIC_RBAC, None).await.unwrap();
        // Rebind to the given store.
        let enforcer = crate::enforcer::Enforcer::new(crate::model::Model::from_text(BASIC_RBAC).unwrap(), adapter)
            .await
            .unwrap();
        *registry.lookup(h).unwrap().write().await = enforcer;
        (registry, h)
    }

    #[tokio::test]
    async fn delete_role_cascades() {
        let store = Arc::new(MemoryAdapter::with_rules(seed()));
        let (registry, h) = registry_with(store.clone()).await;
        assert!(registry.enforce(h, &["alice", "data2", "write"]).await.unwrap());

        assert!(registry.delete_role(h, "data2_admin").await.unwrap());

        assert!(!registry.enforce(h, &["alice", "data2", "write"]).await.unwrap());
        assert!(registry.enforce(h, &["alice", "data1", "read"]).await.unwrap());
        assert!(registry.get_grouping_policy(h).await.unwrap().is_empty());
        assert_eq!(store.rules(), vec![rule("p", &["alice", "data1", "read"])]);

        assert!(!registry.delete_role(h, "data2_admin").await.unwrap());
    }

    #[tokio::test]
    async fn delete_role_failure_leaves_everything_in_place() {
        let store = Arc::new(FailingAdapter {
            inner: MemoryAdapter::with_rules(seed()),
        });
        let (registry, h) = registry_with(store.clone()).await;

        let err = registry.delete_role(h, "data2_admin").await.unwrap_err();
        assert!(matches!(
            err,
            AuthzError::PartialFailure { stage: "remove permission rules", .. }
        ));

        assert!(registry.enforce(h, &["alice", "data2", "write"]).await.unwrap());
        assert_eq!(registry.get_grouping_policy(h).await.unwrap().len(), 2);

        let mut stored = store.inner.rules();
        let mut expected = seed();
        stored.sort_by(|a, b| (&a.ptype, &a.values).cmp(&(&b.ptype, &b.values)));
        expected.sort_by(|a, b| (&a.ptype, &a.values).cmp(&(&b.ptype, &b.values)));
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn roles_and_users() {
        let (registry, h) = registry_with(Arc::new(MemoryAdapter::with_rules(seed()))).await;

        assert_eq!(registry.get_roles_for_user(h, "alice").await.unwrap(), vec!["data2_admin"]);
        assert_eq!(
            registry.get_implicit_roles_for_user(h, "alice").await.unwrap(),
            vec!["data2_admin", "super_admin"]
        );
        assert_eq!(registry.get_users_for_role(h, "data2_admin").await.unwrap(), vec!["alice"]);
        assert!(registry.has_role_for_user(h, "alice", "data2_admin").await.unwrap());
        assert!(!registry.has_role_for_user(h, "alice", "super_admin").await.unwrap());

        assert!(registry.add_role_for_user(h, "bob", "data2_admin").await.unwrap());
        assert!(!registry.add_role_for_user(h, "bob", "data2_admin").await.unwrap());
        assert!(registry.delete_role_for_user(h, "bob", "data2_admin").await.unwrap());
        assert!(!registry.delete_role_for_user(h, "bob", "data2_admin").await.unwrap());
    }

    #[tokio::test]
    async fn delete_user_keeps_role_permissions() {
        let (registry, h) = registry_with(Arc::new(MemoryAdapter::with_rules(seed()))).await;

        assert!(registry.delete_user(h, "alice").await.unwrap());
        assert!(!registry.delete_roles_for_user(h, "alice").await.unwrap());
        assert_eq!(registry.get_permissions_for_user(h, "data2_admin").await.unwrap().len(), 2);
        assert!(registry.get_roles_for_user(h, "alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn permissions() {
        let (registry, h) = registry_with(Arc::new(MemoryAdapter::with_rules(seed()))).await;
        let perm = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(
            registry.get_implicit_permissions_for_user(h, "alice").await.unwrap(),
            vec![perm(&["alice", "data1", "read"]), perm(&["data2_admin", "data2", "read"]), perm(&["data2_admin", "data2", "write"])]
        );
        assert!(registry.has_permission_for_user(h, "alice", &perm(&["data1", "read"])).await.unwrap());

        assert!(registry.add_permission_for_user(h, "bob", &perm(&["data3", "read"])).await.unwrap());
        assert!(registry.enforce(h, &["bob", "data3", "read"]).await.unwrap());
        assert!(registry.delete_permission_for_user(h, "bob", &perm(&["data3", "read"])).await.unwrap());
        assert!(!registry.enforce(h, &["bob", "data3", "read"]).await.unwrap());

        assert!(registry.delete_permission(h, &perm(&["data2", "write"])).await.unwrap());
        assert!(!registry.enforce(h, &["alice", "data2", "write"]).await.unwrap());
        assert!(registry.enforce(h, &["alice", "data2", "read"]).await.unwrap());

        assert!(registry.delete_permissions_for_user(h, "data2_admin").await.unwrap());
        assert!(registry.get_permissions_for_user(h, "data2_admin").await.unwrap().is_empty());
    }
}
