//! Role inheritance graph for one grouping type (`g`, `g2`, ...)
//!
//! Links point from a member to a role, optionally inside a domain. Lookups
//! walk the graph breadth-first with a visited set, so cyclic role graphs
//! terminate.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::model::MatchFn;

/// Domain used for two-arity grouping rules.
const NO_DOMAIN: &str = "";

/// Inheritance depth limit for [`RoleManager::has_link`].
pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone)]
pub struct RoleManager {
    /// domain -> member -> roles
    links: HashMap<String, HashMap<String, BTreeSet<String>>>,
    name_match: Option<MatchFn>,
    domain_match: Option<MatchFn>,
    max_depth: usize,
}

impl Default for RoleManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl RoleManager {
    pub fn new(max_depth: usize) -> Self {
        Self {
            links: HashMap::new(),
            name_match: None,
            domain_match: None,
            max_depth,
        }
    }

    /// Stored member names are treated as patterns for `f(name, pattern)`.
    pub fn set_name_matching(&mut self, f: MatchFn) {
        self.name_match = Some(f);
    }

    /// Stored domains are treated as patterns for `f(domain, pattern)`.
    pub fn set_domain_matching(&mut self, f: MatchFn) {
        self.domain_match = Some(f);
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }

    pub fn add_link(&mut self, member: &str, role: &str, domain: Option<&str>) {
        self.links
            .entry(domain.unwrap_or(NO_DOMAIN).to_string())
            .or_default()
            .entry(member.to_string())
            .or_default()
            .insert(role.to_string());
    }

    pub fn delete_link(&mut self, member: &str, role: &str, domain: Option<&str>) -> bool {
        let domain = domain.unwrap_or(NO_DOMAIN);
        let Some(members) = self.links.get_mut(domain) else {
            return false;
        };
        let Some(roles) = members.get_mut(member) else {
            return false;
        };
        let removed = roles.remove(role);
        if roles.is_empty() {
            members.remove(member);
        }
        if members.is_empty() {
            self.links.remove(domain);
        }
        removed
    }

    /// True if `name` inherits `role` within `max_depth` hops.
    pub fn has_link(&self, name: &str, role: &str, domain: Option<&str>) -> bool {
        if name == role || self.name_match.is_some_and(|f| f(name, role)) {
            return true;
        }
        let mut visited: HashSet<String> = HashSet::from([name.to_string()]);
        let mut frontier = vec![name.to_string()];

        for _ in 0..self.max_depth {
            let mut next = Vec::new();
            for node in &frontier {
                for parent in self.parents(node, domain) {
                    if parent == role {
                        return true;
                    }
                    if visited.insert(parent.clone()) {
                        next.push(parent);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        false
    }

    /// Roles directly assigned to `name`.
    pub fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.links
            .get(domain.unwrap_or(NO_DOMAIN))
            .and_then(|members| members.get(name))
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Members directly assigned `role`.
    pub fn get_users(&self, role: &str, domain: Option<&str>) -> Vec<String> {
        let mut users: Vec<String> = self
            .links
            .get(domain.unwrap_or(NO_DOMAIN))
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, roles)| roles.contains(role))
                    .map(|(member, _)| member.clone())
                    .collect()
            })
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Transitive closure of roles reachable from `name`, in discovery order.
    pub fn get_implicit_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::from([name.to_string()]);
        let mut queue = VecDeque::from([name.to_string()]);
        let mut roles = Vec::new();

        while let Some(current) = queue.pop_front() {
            for role in self.get_roles(&current, domain) {
                if seen.insert(role.clone()) {
                    roles.push(role.clone());
                    queue.push_back(role);
                }
            }
        }
        roles
    }

    /// Direct parents of `node`, honouring name and domain matching.
    fn parents(&self, node: &str, domain: Option<&str>) -> Vec<String> {
        let domain = domain.unwrap_or(NO_DOMAIN);
        let mut out = Vec::new();
        for (stored_domain, members) in &self.links {
            let domain_ok = stored_domain == domain
                || self.domain_match.is_some_and(|f| f(domain, stored_domain));
            if !domain_ok {
                continue;
            }
            for (member, roles) in members {
                let member_ok = member == node || self.name_match.is_some_and(|f| f(node, member));
                if member_ok {
                    out.extend(roles.iter().cloned());
                }
            }
        }
        out
    }
}
