use crate::filters::is_special_key;
use crate::pagination::encode_component;
use std::collections::BTreeMap;

/// Query-string arguments of one request. The first value of a repeated key wins.
#[derive(Debug, Clone, Default)]
pub struct RequestArgs {
    raw: Vec<(String, String)>,
    values: BTreeMap<String, String>,
}

impl RequestArgs {
    pub fn parse(pairs: &[(String, String)]) -> Self {
        let mut values = BTreeMap::new();
        for (key, value) in pairs {
            values.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Self {
            raw: pairs.to_vec(),
            values,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// A control argument such as `_next`, ignoring empty values
    pub fn special(&self, key: &str) -> Option<&str> {
        debug_assert!(is_special_key(key));
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Everything that is not a control argument
    pub fn filters(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter(|(key, _)| !is_special_key(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The original query string with `key` set to `value`
    pub fn query_string_with(&self, key: &str, value: &str) -> String {
        let mut parts: Vec<String> = self
            .raw
            .iter()
            .filter(|(k, _)| k != key)
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect();
        parts.push(format!("{}={}", encode_component(key), encode_component(value)));
        format!("?{}", parts.join("&"))
    }
}
