//! Policy model: request/policy shapes, role relations, effect and matcher
//!
//! Model text uses the INI-like layout:
//!
//! ```text
//! [request_definition]
//! r = sub, obj, act
//!
//! [policy_definition]
//! p = sub, obj, act
//!
//! [role_definition]
//! g = _, _
//!
//! [policy_effect]
//! e = some(where (p.eft == allow))
//!
//! [matchers]
//! m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
//! ```

pub mod functions;

use std::collections::BTreeMap;

use crate::error::{AuthzError, Result};

pub use functions::{glob_match, key_match, key_match2, key_match_cu, regex_match, MatchFn};

/// Model shared by every fleet enforcer: subject, namespace, project,
/// organization, object and action, with object/action resolved through `g`.
pub const DOMAIN_MODEL: &str = r#"
[request_definition]
r = sub, ns, proj, org, obj, act

[policy_definition]
p = sub, ns, proj, org, obj

[role_definition]
g = _, _, _
g2 = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g2(r.sub, p.sub) && (globMatch(r.ns, p.ns) || globMatch(p.ns, r.ns)) && (globMatch(r.proj, p.proj) || globMatch(p.proj, r.proj)) && r.org == p.org && g(r.obj, p.obj, r.act)
"#;

/// How matched rules combine into a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// `some(where (p.eft == allow))`
    AllowOverride,
    /// `!some(where (p.eft == deny))`
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDeny,
}

impl Effect {
    fn parse(expr: &str) -> Result<Self> {
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "some(where(p.eft==allow))" => Ok(Self::AllowOverride),
            "!some(where(p.eft==deny))" => Ok(Self::DenyOverride),
            "some(where(p.eft==allow))&&!some(where(p.eft==deny))" => Ok(Self::AllowAndDeny),
            _ => Err(AuthzError::InvalidModel(format!("unsupported policy effect: {expr}"))),
        }
    }
}

/// A parsed model.
#[derive(Debug, Clone)]
pub struct Model {
    request: Vec<String>,
    policy: BTreeMap<String, Vec<String>>,
    roles: BTreeMap<String, usize>,
    effect: Effect,
    matcher: String,
}

impl Model {
    pub fn from_text(text: &str) -> Result<Self> {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut current: Option<String> = None;
        let mut pending = String::new();

        for raw in text.lines() {
            let line = raw.trim();
            if pending.is_empty() && (line.is_empty() || line.starts_with('#')) {
                continue;
            }
            if let Some(head) = line.strip_suffix('\\') {
                pending.push_str(head.trim_end());
                pending.push(' ');
                continue;
            }
            let line = std::mem::take(&mut pending) + line;

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(name.trim().to_string());
                continue;
            }
            let section = current
                .as_ref()
                .ok_or_else(|| AuthzError::InvalidModel(format!("line outside a section: {line}")))?;
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| AuthzError::InvalidModel(format!("expected key = value: {line}")))?;
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }

        for name in sections.keys() {
            if !matches!(
                name.as_str(),
                "request_definition" | "policy_definition" | "role_definition" | "policy_effect" | "matchers"
            ) {
                return Err(AuthzError::InvalidModel(format!("unknown section [{name}]")));
            }
        }

        let request = required(&sections, "request_definition", "r").map(split_fields)?;
        let policy: BTreeMap<String, Vec<String>> = sections
            .get("policy_definition")
            .ok_or_else(|| AuthzError::InvalidModel("missing [policy_definition]".to_string()))?
            .iter()
            .map(|(k, v)| (k.clone(), split_fields(v)))
            .collect();
        if !policy.contains_key("p") {
            return Err(AuthzError::InvalidModel("missing p in [policy_definition]".to_string()));
        }
        let roles = sections
            .get("role_definition")
            .map(|defs| {
                defs.iter()
                    .map(|(k, v)| (k.clone(), split_fields(v).len()))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();
        for (name, arity) in &roles {
            if !(2..=3).contains(arity) {
                return Err(AuthzError::InvalidModel(format!(
                    "role definition {name} must have two or three fields"
                )));
            }
        }
        let effect = Effect::parse(required(&sections, "policy_effect", "e")?)?;
        let matcher = required(&sections, "matchers", "m")?.to_string();

        Ok(Self {
            request,
            policy,
            roles,
            effect,
            matcher,
        })
    }

    /// Request field names in order.
    pub fn request_fields(&self) -> &[String] {
        &self.request
    }

    /// Field names of a policy type, `None` if the model does not define it.
    pub fn policy_fields(&self, ptype: &str) -> Option<&[String]> {
        self.policy.get(ptype).map(Vec::as_slice)
    }

    /// Grouping types and their arity.
    pub fn role_definitions(&self) -> impl Iterator<Item = (&str, usize)> {
        self.roles.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn has_ptype(&self, ptype: &str) -> bool {
        self.policy.contains_key(ptype) || self.roles.contains_key(ptype)
    }

    pub fn is_grouping(&self, ptype: &str) -> bool {
        self.roles.contains_key(ptype)
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn matcher(&self) -> &str {
        &self.matcher
    }
}

fn required<'a>(
    sections: &'a BTreeMap<String, BTreeMap<String, String>>,
    section: &str,
    key: &str,
) -> Result<&'a str> {
    sections
        .get(section)
        .and_then(|s| s.get(key))
        .map(String::as_str)
        .ok_or_else(|| AuthzError::InvalidModel(format!("missing {key} in [{section}]")))
}

fn split_fields(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_domain_model() {
        let model = Model::from_text(DOMAIN_MODEL).unwrap();
        assert_eq!(model.request_fields(), ["sub", "ns", "proj", "org", "obj", "act"]);
        assert_eq!(model.policy_fields("p").unwrap(), ["sub", "ns", "proj", "org", "obj"]);
        assert_eq!(
            model.role_definitions().collect::<Vec<_>>(),
            vec![("g", 3), ("g2", 2)]
        );
        assert_eq!(model.effect(), Effect::AllowOverride);
        assert!(model.matcher().starts_with("g2(r.sub, p.sub)"));
        assert!(model.is_grouping("g2"));
        assert!(!model.is_grouping("p"));
    }

    #[test]
    fn supports_comments_and_continuations() {
        let text = "# basic\n[request_definition]\nr = sub, obj\n[policy_definition]\np = sub, obj, eft\n\
                    [policy_effect]\ne = !some(where (p.eft == deny))\n[matchers]\nm = r.sub == p.sub \\\n  && r.obj == p.obj\n";
        let model = Model::from_text(text).unwrap();
        assert_eq!(model.effect(), Effect::DenyOverride);
        assert_eq!(model.matcher(), "r.sub == p.sub && r.obj == p.obj");
        assert_eq!(model.role_definitions().count(), 0);
    }

    #[test]
    fn rejects_broken_models() {
        assert!(Model::from_text("").is_err());
        assert!(Model::from_text("[request_definition]\nr = sub\n").is_err());
        assert!(Model::from_text("r = sub").is_err());

        let bad_effect = "[request_definition]\nr = sub\n[policy_definition]\np = sub\n\
                          [policy_effect]\ne = priority(p.eft)\n[matchers]\nm = r.sub == p.sub\n";
        assert!(matches!(Model::from_text(bad_effect), Err(AuthzError::InvalidModel(_))));
    }
}
