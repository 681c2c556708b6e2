//! ABAC attribute codec
//!
//! Request parameters travel through the enforcer as plain strings. An
//! attribute object is smuggled through the same slot as a token of the form
//! `ABAC::{json}`. At enforcement time the token is decoded into up to eleven
//! positional slots (`V0`..`V10`) and the matcher is rewritten so that
//! `r.obj.Owner` reads `r.obj.V1`.
//!
//! ```text
//! encode(obj) ──► "ABAC::{...}" ──► Param::parse ──► Attributes(AttributeList)
//!                                                        │
//!                       rewrite_matcher(m, "r", "obj") ◄─┘
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{AuthzError, Result};

/// Prefix marking a parameter as an encoded attribute object.
pub const SENTINEL: &str = "ABAC::";

/// Number of positional attribute slots.
pub const MAX_ATTRIBUTES: usize = 11;

/// Serialize `obj` into a sentinel-prefixed token.
pub fn encode<T: Serialize + ?Sized>(obj: &T) -> Result<String> {
    let value = serde_json::to_value(obj).map_err(|e| AuthzError::InvalidAbac(e.to_string()))?;
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(AuthzError::InvalidAbac(format!(
                "expected an object, got {}",
                json_kind(&other)
            )))
        }
    };
    check_len(map.len())?;
    let json = serde_json::to_string(&map).map_err(|e| AuthzError::InvalidAbac(e.to_string()))?;
    Ok(format!("{SENTINEL}{json}"))
}

/// True if `raw` carries the ABAC sentinel.
pub fn is_encoded(raw: &str) -> bool {
    raw.starts_with(SENTINEL)
}

/// Decode a sentinel-prefixed token into positional slots.
pub fn decode(token: &str) -> Result<AttributeList> {
    let payload = token
        .strip_prefix(SENTINEL)
        .ok_or_else(|| AuthzError::InvalidAbac("missing ABAC:: prefix".to_string()))?;
    let map: Map<String, Value> =
        serde_json::from_str(payload).map_err(|e| AuthzError::InvalidAbac(e.to_string()))?;
    check_len(map.len())?;

    let mut list = AttributeList::default();
    for (key, value) in &map {
        let slot = slot_name(list.values.len());
        list.values.push(render(value));
        list.name_map.insert(upper_first(key), slot);
    }
    Ok(list)
}

/// Attribute values laid out in slots plus the name → slot mapping from the
/// same decoding pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList {
    values: Vec<String>,
    name_map: BTreeMap<String, String>,
}

impl AttributeList {
    /// Value of attribute `name` (first character is case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        let slot = self.slot(name)?;
        let index: usize = slot[1..].parse().ok()?;
        self.values.get(index).map(String::as_str)
    }

    /// Slot assigned to attribute `name`, e.g. `"V3"`.
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.name_map.get(&upper_first(name)).map(String::as_str)
    }

    pub fn name_map(&self) -> &BTreeMap<String, String> {
        &self.name_map
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All eleven slots, unused ones empty.
    pub fn slots(&self) -> Vec<(String, String)> {
        (0..MAX_ATTRIBUTES)
            .map(|i| (slot_name(i), self.values.get(i).cloned().unwrap_or_default()))
            .collect()
    }

    /// Stable key for deduplicating identical slot contents.
    pub fn cache_key(&self) -> Result<String> {
        let slots: Map<String, Value> = self
            .slots()
            .into_iter()
            .map(|(slot, value)| (slot, Value::String(value)))
            .collect();
        encode(&slots)
    }
}

/// A request parameter after ABAC detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Plain(String),
    Attributes(AttributeList),
}

impl Param {
    pub fn parse(raw: &str) -> Result<Self> {
        if is_encoded(raw) {
            decode(raw).map(Param::Attributes)
        } else {
            Ok(Param::Plain(raw.to_string()))
        }
    }
}

/// Rewrite `<request_key>.<field>.<Name>` member paths to their slot names.
///
/// Only paths rooted at this parameter's own request field are touched;
/// string literals and paths rooted anywhere else are copied unchanged.
pub fn rewrite_matcher(matcher: &str, request_key: &str, field: &str, attrs: &AttributeList) -> String {
    let chars: Vec<char> = matcher.chars().collect();
    let mut out = String::with_capacity(matcher.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(chars.len());
            out.extend(&chars[start..i]);
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
            out.extend(&chars[start..i]);
        } else if is_ident_start(c) {
            let mut segments = Vec::new();
            loop {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                segments.push(chars[start..i].iter().collect::<String>());
                if i + 1 < chars.len() && chars[i] == '.' && is_ident_start(chars[i + 1]) {
                    i += 1;
                } else {
                    break;
                }
            }
            if segments.len() >= 3 && segments[0] == request_key && segments[1] == field {
                if let Some(slot) = attrs.name_map.get(&segments[2]) {
                    segments[2] = slot.clone();
                }
            }
            out.push_str(&segments.join("."));
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn check_len(len: usize) -> Result<()> {
    if len > MAX_ATTRIBUTES {
        return Err(AuthzError::InvalidAbac(format!(
            "{len} attributes exceed the limit of {MAX_ATTRIBUTES}"
        )));
    }
    Ok(())
}

fn slot_name(index: usize) -> String {
    format!("V{index}")
}

fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct TestObject {
        name: String,
        owner: String,
    }

    #[test]
    fn encode_decode_struct() {
        let token = encode(&TestObject {
            name: "data1".into(),
            owner: "alice".into(),
        })
        .unwrap();
        assert!(token.starts_with("ABAC::{"));

        let attrs = decode(&token).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("Owner"), Some("alice"));
        assert_eq!(attrs.get("owner"), Some("alice"));
        assert_eq!(attrs.slot("Name"), Some("V0"));
        assert_eq!(attrs.slot("Owner"), Some("V1"));
    }

    #[test]
    fn values_render_as_text() {
        let attrs = decode(r#"ABAC::{"age": 30, "admin": true, "note": null, "tags": ["a"]}"#).unwrap();
        assert_eq!(attrs.get("Age"), Some("30"));
        assert_eq!(attrs.get("Admin"), Some("true"));
        assert_eq!(attrs.get("Note"), Some(""));
        assert_eq!(attrs.get("Tags"), Some(r#"["a"]"#));
    }

    #[test]
    fn twelve_attributes_fail() {
        let obj: HashMap<String, i32> = (0..12).map(|i| (format!("k{i}"), i)).collect();
        assert!(matches!(encode(&obj), Err(AuthzError::InvalidAbac(_))));

        let raw = serde_json::to_string(&obj).unwrap();
        assert!(matches!(decode(&format!("ABAC::{raw}")), Err(AuthzError::InvalidAbac(_))));
    }

    #[test]
    fn non_object_rejected() {
        assert!(encode(&json!(["a", "b"])).is_err());
        assert!(decode("ABAC::not json").is_err());
        assert!(decode("{\"a\":1}").is_err());
    }

    #[test]
    fn param_detection() {
        assert_eq!(Param::parse("alice").unwrap(), Param::Plain("alice".into()));
        assert!(matches!(
            Param::parse("ABAC::{\"Owner\":\"bob\"}").unwrap(),
            Param::Attributes(_)
        ));
    }

    #[test]
    fn cache_key_is_stable_for_equal_contents() {
        let a = decode(r#"ABAC::{"Name":"data1","Owner":"alice"}"#).unwrap();
        let b = decode(r#"ABAC::{"name":"data1","owner":"alice"}"#).unwrap();
        assert_eq!(a.cache_key().unwrap(), b.cache_key().unwrap());
        assert!(a.cache_key().unwrap().starts_with(SENTINEL));

        let c = decode(r#"ABAC::{"Name":"data2","Owner":"alice"}"#).unwrap();
        assert_ne!(a.cache_key().unwrap(), c.cache_key().unwrap());
    }

    #[test]
    fn rewrite_is_scoped_to_the_decoded_parameter() {
        let attrs = decode(r#"ABAC::{"Name":"data1","Owner":"alice"}"#).unwrap();
        let matcher = "r.sub == r.obj.Owner && r2.Owner == p2.Owner && p.Owner == 'r.obj.Owner'";

        assert_eq!(
            rewrite_matcher(matcher, "r", "obj", &attrs),
            "r.sub == r.obj.V1 && r2.Owner == p2.Owner && p.Owner == 'r.obj.Owner'"
        );
    }

    #[test]
    fn rewrite_ignores_similar_identifiers() {
        let attrs = decode(r#"ABAC::{"Owner":"alice"}"#).unwrap();
        let matcher = "r.obj.OwnerId == r.sub && r.objx.Owner == r.sub && r.obj.Owner == \"x\"";

        assert_eq!(
            rewrite_matcher(matcher, "r", "obj", &attrs),
            "r.obj.OwnerId == r.sub && r.objx.Owner == r.sub && r.obj.V0 == \"x\""
        );
    }

    #[test]
    fn two_parameters_sharing_a_name_rewrite_independently() {
        let sub = decode(r#"ABAC::{"Age":"30","Owner":"carol"}"#).unwrap();
        let obj = decode(r#"ABAC::{"Owner":"alice"}"#).unwrap();
        let matcher = "r.sub.Owner == r.obj.Owner";

        let rewritten = rewrite_matcher(matcher, "r", "sub", &sub);
        let rewritten = rewrite_matcher(&rewritten, "r", "obj", &obj);
        assert_eq!(rewritten, "r.sub.V1 == r.obj.V0");
    }

    proptest! {
        #[test]
        fn prop_round_trip(obj in prop::collection::hash_map("[a-z][a-z0-9]{0,6}", "[ -~]{0,12}", 0..=MAX_ATTRIBUTES)) {
            let attrs = decode(&encode(&obj).unwrap()).unwrap();
            prop_assert_eq!(attrs.len(), obj.len());
            for (key, value) in &obj {
                prop_assert_eq!(attrs.get(key), Some(value.as_str()));
            }
        }
    }
}
