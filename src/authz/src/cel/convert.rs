//! Request and policy values as cel_interpreter types

use cel_interpreter::objects::{Key, Map, Value as CelValue};
use std::collections::HashMap;
use std::sync::Arc;

use crate::abac::{AttributeList, Param};

pub fn string(s: &str) -> CelValue {
    CelValue::String(s.to_string().into())
}

/// Build a CEL map with string keys.
pub fn string_map<'a>(fields: impl IntoIterator<Item = (&'a str, CelValue)>) -> CelValue {
    let map_data: HashMap<Key, CelValue> = fields
        .into_iter()
        .map(|(k, v)| (Key::from(k.to_string()), v))
        .collect();
    CelValue::Map(Map { map: Arc::new(map_data) })
}

/// Slots `V0..V10` of an attribute list as a CEL map.
pub fn attributes_to_cel(attrs: &AttributeList) -> CelValue {
    let slots = attrs.slots();
    string_map(slots.iter().map(|(slot, value)| (slot.as_str(), string(value))))
}

/// Request parameter as the matcher sees it.
pub fn param_to_cel(param: &Param) -> CelValue {
    match param {
        Param::Plain(s) => string(s),
        Param::Attributes(attrs) => attributes_to_cel(attrs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abac;

    #[test]
    fn plain_params_stay_strings() {
        let cel = param_to_cel(&Param::parse("alice").unwrap());
        assert!(matches!(cel, CelValue::String(s) if s.as_str() == "alice"));
    }

    #[test]
    fn test_attributes_fill_every_slot() {
        let attrs = abac::decode(r#"ABAC::{"Owner":"alice"}"#).unwrap();
        let cel = param_to_cel(&Param::Attributes(attrs));
        if let CelValue::Map(map) = cel {
            assert_eq!(map.map.len(), abac::MAX_ATTRIBUTES);
            let owner = map.map.get(&Key::from("V0".to_string())).unwrap();
            assert!(matches!(owner, CelValue::String(s) if s.as_str() == "alice"));
        } else {
            panic!("Expected Map");
        }
    }
}
