//! Enforcer: one model, one adapter, the in-memory rule set and role graphs
//!
//! ```text
//! enforce(params)
//!   1. ABAC detection      Param::parse per request field
//!   2. Matcher rewrite     r.<field>.<Name> -> r.<field>.V<n>
//!   3. Context             r, g/g2 role functions, matching built-ins
//!   4. Evaluation          matcher once per p row (once with empty p if none)
//!   5. Effect              allow-override / deny-override / allow-and-deny
//! ```
//!
//! Mutations write through the adapter first and only then touch the
//! in-memory set, so a failed store call leaves the enforcer unchanged.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::abac::{self, Param};
use crate::adapter::Adapter;
use crate::cel::{self, convert, EvalContext, ProgramCache};
use crate::error::{AuthzError, Result};
use crate::model::{Effect, MatchFn, Model};
use crate::role_manager::RoleManager;
use crate::types::{matches_filter, PolicyRule, Rule};

const ALLOW: &str = "allow";
const DENY: &str = "deny";

pub struct Enforcer {
    model: Model,
    adapter: Arc<dyn Adapter>,
    /// ptype -> rules, in insertion order
    rules: BTreeMap<String, Vec<Rule>>,
    role_managers: BTreeMap<String, Arc<RoleManager>>,
    functions: Vec<(String, MatchFn)>,
    programs: ProgramCache,
    auto_save: bool,
}

impl Enforcer {
    /// Build an enforcer and load its rules from the adapter.
    pub async fn new(model: Model, adapter: Arc<dyn Adapter>) -> Result<Self> {
        let role_managers = model
            .role_definitions()
            .map(|(name, _)| (name.to_string(), Arc::new(RoleManager::default())))
            .collect();
        let mut enforcer = Self {
            model,
            adapter,
            rules: BTreeMap::new(),
            role_managers,
            functions: Vec::new(),
            programs: ProgramCache::default(),
            auto_save: true,
        };
        enforcer.load_policy().await?;
        Ok(enforcer)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn adapter(&self) -> Arc<dyn Adapter> {
        Arc::clone(&self.adapter)
    }

    /// When off, mutations only change the in-memory set.
    pub fn set_auto_save(&mut self, enabled: bool) {
        self.auto_save = enabled;
    }

    pub fn auto_save(&self) -> bool {
        self.auto_save
    }

    /// Register an extra two-argument matcher function.
    pub fn add_function(&mut self, name: impl Into<String>, f: MatchFn) {
        self.functions.push((name.into(), f));
    }

    /// Match stored member names of grouping type `ptype` as patterns.
    pub fn add_named_matching_fn(&mut self, ptype: &str, f: MatchFn) -> Result<()> {
        Arc::make_mut(self.role_manager_mut(ptype)?).set_name_matching(f);
        Ok(())
    }

    /// Match stored domains of grouping type `ptype` as patterns.
    pub fn add_named_domain_matching_fn(&mut self, ptype: &str, f: MatchFn) -> Result<()> {
        Arc::make_mut(self.role_manager_mut(ptype)?).set_domain_matching(f);
        Ok(())
    }

    pub fn role_manager(&self, ptype: &str) -> Result<&RoleManager> {
        self.role_managers
            .get(ptype)
            .map(Arc::as_ref)
            .ok_or_else(|| AuthzError::InvalidInput(format!("no role definition {ptype}")))
    }

    fn role_manager_mut(&mut self, ptype: &str) -> Result<&mut Arc<RoleManager>> {
        self.role_managers
            .get_mut(ptype)
            .ok_or_else(|| AuthzError::InvalidInput(format!("no role definition {ptype}")))
    }

    /// Replace the in-memory rules with the adapter's.
    pub async fn load_policy(&mut self) -> Result<()> {
        let loaded = self.adapter.load_rules().await?;
        self.rules.clear();
        for rule in loaded {
            if !self.model.has_ptype(&rule.ptype) {
                warn!(ptype = %rule.ptype, "skipping rule with unknown ptype");
                continue;
            }
            let set = self.rules.entry(rule.ptype).or_default();
            if !set.contains(&rule.values) {
                set.push(rule.values);
            }
        }
        self.rebuild_role_links();
        debug!(count = self.rule_count(), "loaded policy");
        Ok(())
    }

    /// Persist the whole in-memory rule set through the adapter.
    pub async fn save_policy(&self) -> Result<()> {
        self.adapter.save_policy(&self.all_rules()).await
    }

    /// Every rule with its ptype, `p` sections first.
    pub fn all_rules(&self) -> Vec<PolicyRule> {
        let mut out: Vec<PolicyRule> = Vec::with_capacity(self.rule_count());
        let (policies, groupings): (Vec<_>, Vec<_>) =
            self.rules.iter().partition(|(ptype, _)| !self.model.is_grouping(ptype));
        for (ptype, rules) in policies.into_iter().chain(groupings) {
            out.extend(rules.iter().map(|r| PolicyRule::new(ptype.clone(), r.clone())));
        }
        out
    }

    fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    fn rebuild_role_links(&mut self) {
        for (ptype, rm) in self.role_managers.iter_mut() {
            let rm = Arc::make_mut(rm);
            rm.clear();
            for rule in self.rules.get(ptype).into_iter().flatten() {
                if rule.len() >= 2 {
                    rm.add_link(&rule[0], &rule[1], rule.get(2).map(String::as_str));
                }
            }
        }
    }

    fn update_links(&mut self, ptype: &str, rules: &[Rule], add: bool) {
        let Some(rm) = self.role_managers.get_mut(ptype) else {
            return;
        };
        let rm = Arc::make_mut(rm);
        for rule in rules.iter().filter(|r| r.len() >= 2) {
            let domain = rule.get(2).map(String::as_str);
            if add {
                rm.add_link(&rule[0], &rule[1], domain);
            } else {
                rm.delete_link(&rule[0], &rule[1], domain);
            }
        }
    }

    /// Decide a request given its positional values.
    pub fn enforce<S: AsRef<str>>(&self, params: &[S]) -> Result<bool> {
        let fields = self.model.request_fields();
        if params.len() != fields.len() {
            return Err(AuthzError::InvalidInput(format!(
                "expected {} request values, got {}",
                fields.len(),
                params.len()
            )));
        }

        let mut matcher = self.model.matcher().to_string();
        let mut request = Vec::with_capacity(fields.len());
        for (field, raw) in fields.iter().zip(params) {
            let param = Param::parse(raw.as_ref())?;
            if let Param::Attributes(attrs) = &param {
                matcher = abac::rewrite_matcher(&matcher, "r", field, attrs);
            }
            request.push((field.as_str(), convert::param_to_cel(&param)));
        }

        let mut ctx = EvalContext::new();
        ctx.bind_fields("r", request);
        for (name, f) in &self.functions {
            ctx.add_match_fn(name, *f);
        }
        for (name, arity) in self.model.role_definitions() {
            if let Some(rm) = self.role_managers.get(name) {
                ctx.add_role_fn(name, Arc::clone(rm), arity);
            }
        }
        let program = self.programs.get_or_compile(&matcher)?;

        let policy_fields = self.model.policy_fields("p").unwrap_or_default();
        let eft_index = policy_fields.iter().position(|f| f == "eft");
        let effect = self.model.effect();
        let rules = self.rules.get("p").map(Vec::as_slice).unwrap_or_default();

        let mut allowed = false;
        let mut denied = false;
        if rules.is_empty() {
            ctx.bind_fields("p", policy_fields.iter().map(|f| (f.as_str(), convert::string(""))));
            allowed = cel::evaluate(&program, &ctx)?;
        }
        for rule in rules {
            ctx.bind_fields(
                "p",
                policy_fields.iter().enumerate().map(|(i, f)| {
                    (f.as_str(), convert::string(rule.get(i).map(String::as_str).unwrap_or("")))
                }),
            );
            if !cel::evaluate(&program, &ctx)? {
                continue;
            }
            let eft = eft_index
                .and_then(|i| rule.get(i))
                .map(String::as_str)
                .filter(|e| !e.is_empty())
                .unwrap_or(ALLOW);
            if eft == DENY {
                denied = true;
            } else {
                allowed = true;
            }
            let settled = match effect {
                Effect::AllowOverride => allowed,
                Effect::DenyOverride | Effect::AllowAndDeny => denied,
            };
            if settled {
                break;
            }
        }

        let decision = match effect {
            Effect::AllowOverride => allowed,
            Effect::DenyOverride => !denied,
            Effect::AllowAndDeny => allowed && !denied,
        };
        debug!(allowed = decision, rules = rules.len(), "enforced request");
        Ok(decision)
    }

    /// Rules of `ptype` in stored order.
    pub fn get_rules(&self, ptype: &str) -> Vec<Rule> {
        self.rules.get(ptype).cloned().unwrap_or_default()
    }

    pub fn get_filtered(&self, ptype: &str, field_index: usize, values: &[String]) -> Vec<Rule> {
        self.rules
            .get(ptype)
            .into_iter()
            .flatten()
            .filter(|r| matches_filter(r, field_index, values))
            .cloned()
            .collect()
    }

    pub fn has_rule(&self, ptype: &str, rule: &[String]) -> bool {
        self.rules
            .get(ptype)
            .is_some_and(|set| set.iter().any(|r| r.as_slice() == rule))
    }

    /// Distinct values of one field across all rules of `ptype`.
    pub fn values_for_field(&self, ptype: &str, field_index: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rules
            .get(ptype)
            .into_iter()
            .flatten()
            .filter_map(|r| r.get(field_index))
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect()
    }

    fn check_ptype(&self, ptype: &str) -> Result<()> {
        if self.model.has_ptype(ptype) {
            Ok(())
        } else {
            Err(AuthzError::InvalidInput(format!("model has no policy type {ptype}")))
        }
    }

    /// Add all `rules` or none: returns `false` if any already exists.
    pub async fn add_rules(&mut self, ptype: &str, rules: Vec<Rule>) -> Result<bool> {
        self.check_ptype(ptype)?;
        if rules.is_empty() || rules.iter().any(|r| r.is_empty()) {
            return Err(AuthzError::InvalidInput("empty rule".to_string()));
        }
        let unique: HashSet<&Rule> = rules.iter().collect();
        if unique.len() != rules.len() || rules.iter().any(|r| self.has_rule(ptype, r)) {
            return Ok(false);
        }

        if self.auto_save {
            let mut written: Vec<PolicyRule> = Vec::new();
            for values in &rules {
                let rule = PolicyRule::new(ptype, values.clone());
                if let Err(e) = self.adapter.add_rule(&rule).await {
                    self.undo_adds(&written).await;
                    return Err(e);
                }
                written.push(rule);
            }
        }

        self.update_links(ptype, &rules, true);
        self.rules.entry(ptype.to_string()).or_default().extend(rules);
        Ok(true)
    }

    async fn undo_adds(&self, written: &[PolicyRule]) {
        for rule in written.iter().rev() {
            if let Err(e) = self.adapter.remove_rule(rule).await {
                warn!(ptype = %rule.ptype, error = %e, "could not roll back added rule");
            }
        }
    }

    /// Remove all `rules` or none: returns `false` if any is missing.
    pub async fn remove_rules(&mut self, ptype: &str, rules: Vec<Rule>) -> Result<bool> {
        self.check_ptype(ptype)?;
        if rules.is_empty() || !rules.iter().all(|r| self.has_rule(ptype, r)) {
            return Ok(false);
        }

        if self.auto_save {
            let mut removed: Vec<PolicyRule> = Vec::new();
            for values in &rules {
                let rule = PolicyRule::new(ptype, values.clone());
                if let Err(e) = self.adapter.remove_rule(&rule).await {
                    self.undo_removals(&removed).await;
                    return Err(e);
                }
                removed.push(rule);
            }
        }

        self.forget(ptype, &rules);
        Ok(true)
    }

    /// Remove every rule of `ptype` matching the filter.
    pub async fn remove_filtered(&mut self, ptype: &str, field_index: usize, values: &[String]) -> Result<bool> {
        self.check_ptype(ptype)?;
        let matched = self.get_filtered(ptype, field_index, values);
        if matched.is_empty() {
            return Ok(false);
        }
        if self.auto_save {
            self.adapter.remove_filtered(ptype, field_index, values).await?;
        }
        self.forget(ptype, &matched);
        Ok(true)
    }

    /// Re-add rules a failed compound operation already removed from the store.
    pub(crate) async fn undo_removals(&self, removed: &[PolicyRule]) {
        for rule in removed.iter().rev() {
            if let Err(e) = self.adapter.add_rule(rule).await {
                warn!(ptype = %rule.ptype, error = %e, "could not roll back removed rule");
            }
        }
    }

    /// Drop rules from the in-memory set and role graph without touching the store.
    pub(crate) fn forget(&mut self, ptype: &str, rules: &[Rule]) {
        if let Some(set) = self.rules.get_mut(ptype) {
            set.retain(|r| !rules.contains(r));
        }
        self.update_links(ptype, rules, false);
    }

    /// Grouping types defined by the model.
    pub fn grouping_types(&self) -> Vec<String> {
        self.model.role_definitions().map(|(name, _)| name.to_string()).collect()
    }
}
