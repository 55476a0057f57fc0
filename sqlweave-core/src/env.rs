//! Variable environment for one template evaluation

use crate::Value;
use std::collections::HashMap;

/// Named parameters supplied by a caller or held by a builder
pub type Params = HashMap<String, Value>;

/// The merged set of variables visible to test expressions and placeholders.
///
/// Built once per build call and never mutated by evaluation, so the same
/// environment can be read from any number of nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `base` first, then overlay `overlay`; overlay wins on collisions.
    pub fn merged(base: &Params, overlay: &Params) -> Self {
        let mut vars = HashMap::with_capacity(base.len() + overlay.len());
        for (key, value) in base {
            vars.insert(key.clone(), value.clone());
        }
        for (key, value) in overlay {
            vars.insert(key.clone(), value.clone());
        }
        Self { vars }
    }

    /// Add or replace a variable, builder style
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Resolve a possibly dotted path such as `user.address.city`.
    ///
    /// The first segment names a variable; further segments walk into JSON
    /// objects (or array indices). Missing segments resolve to `None`.
    pub fn resolve(&self, path: &str) -> Option<Value> {
        let path = path.trim();
        let mut segments = path.split('.');
        let head = self.vars.get(segments.next()?)?;

        let mut rest = segments.peekable();
        if rest.peek().is_none() {
            return Some(head.clone());
        }

        let mut current = match head {
            Value::Json(json) => json,
            _ => return None,
        };
        for segment in rest {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(Value::from_json_scalar(current))
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
