use super::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Named parameters in binding order. Names are stored without the leading `:`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing an earlier value with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Add a parameter under the next free `p{n}` name and return that name
    pub fn push_positional(&mut self, value: impl Into<Value>) -> String {
        let name = format!("p{}", self.0.len());
        self.insert(name.clone(), value);
        name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_names_continue_the_count() {
        let mut params: Params = [("p0", "a")].into_iter().collect();
        assert_eq!(params.push_positional("b"), "p1");
        assert_eq!(params.push_positional(5i64), "p2");
        assert_eq!(params.get("p2"), Some(&Value::Integer(5)));
    }

    #[test]
    fn insert_replaces_existing() {
        let mut params = Params::new();
        params.insert("name", "first");
        params.insert("name", "second");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("name"), Some(&Value::Text("second".to_string())));
        assert_eq!(serde_json::to_string(&params).unwrap(), r#"{"name":"second"}"#);
    }
}
