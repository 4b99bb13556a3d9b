//! Captured context shared by every task of a run.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Immutable snapshot of named values, taken once before the run starts.
///
/// Cloning a `Context` clones the `Arc`, not the map: every envelope of a run
/// points at the same snapshot, and nothing can mutate it afterwards, so
/// workers read it without locking.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Arc<BTreeMap<String, Value>>,
}

impl Context {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Decode a value into `T`. `Ok(None)` when the name is absent.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, serde_json::Error> {
        self.values
            .get(name)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when both handles point at the same snapshot.
    pub fn same_snapshot(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: Arc::new(iter.into_iter().collect()),
        }
    }
}

/// Mutable staging area for a `Context`. Only `build()` produces something
/// tasks can see.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    values: BTreeMap<String, Value>,
}

impl ContextBuilder {
    pub fn value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert<V: Serialize>(
        mut self,
        name: impl Into<String>,
        value: &V,
    ) -> Result<Self, serde_json::Error> {
        self.values.insert(name.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn build(self) -> Context {
        Context {
            values: Arc::new(self.values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_captures_values() {
        let ctx = Context::builder()
            .value("region", json!("eu-west-1"))
            .insert("retries", &3u32)
            .unwrap()
            .build();

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("region"), Some(&json!("eu-west-1")));
        assert_eq!(ctx.get_as::<u32>("retries").unwrap(), Some(3));
        assert_eq!(ctx.get_as::<u32>("missing").unwrap(), None);
    }

    #[test]
    fn clones_share_one_snapshot() {
        let ctx = Context::builder().value("k", json!(1)).build();
        let other = ctx.clone();
        assert!(ctx.same_snapshot(&other));

        let rebuilt: Context = ctx.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        assert!(!ctx.same_snapshot(&rebuilt));
    }

    #[test]
    fn get_as_reports_type_mismatch() {
        let ctx = Context::builder().value("n", json!("not a number")).build();
        assert!(ctx.get_as::<u64>("n").is_err());
    }
}
