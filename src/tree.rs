//! Parameter trees and the dotted-key operations the cache relies on.
//!
//! A parameter tree is a nested, ordered JSON object. [`flatten`] turns it
//! into a single-level map keyed by dotted paths and [`unflatten`] reverses
//! that, provided no key contains [`SEPARATOR`]. [`merge`] overlays one tree
//! on another key by key in flat form, and [`content_hash`] digests a flat
//! map into a stable cache key.
//!
//! ```
//! use hypered::tree::{flatten, merge, unflatten};
//! use serde_json::json;
//!
//! let base = json!({"a.b": 1, "a.c": 2});
//! let over = json!({"a.b": 3});
//! let merged = merge(base.as_object().unwrap(), over.as_object().unwrap());
//! assert_eq!(serde_json::Value::Object(merged), json!({"a": {"b": 3, "c": 2}}));
//!
//! let nested = json!({"model": {"layers": 4, "act": "relu"}, "lr": 0.1});
//! let flat = flatten(nested.as_object().unwrap());
//! assert_eq!(flat["model.layers"], json!(4));
//! assert_eq!(serde_json::Value::Object(unflatten(&flat)), nested);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::dynamic::DynamicProvider;
use crate::error::Result;
use crate::space::Space;
use crate::variable::Variable;

/// Separator between the segments of a flat key.
pub const SEPARATOR: char = '.';

/// A JSON object, nested or flat.
pub type JsonMap = Map<String, Value>;

/// Flattens a nested object into dotted keys.
///
/// Non-empty objects are expanded; every other value, including arrays and
/// empty objects, becomes a leaf. Key order follows a depth-first walk.
#[must_use]
pub fn flatten(tree: &JsonMap) -> JsonMap {
    let mut flat = JsonMap::new();
    flatten_into(&mut flat, None, tree);
    flat
}

fn flatten_into(flat: &mut JsonMap, prefix: Option<&str>, tree: &JsonMap) {
    for (key, value) in tree {
        let path = match prefix {
            Some(p) => format!("{p}{SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(child) if !child.is_empty() => flatten_into(flat, Some(&path), child),
            other => {
                flat.insert(path, other.clone());
            }
        }
    }
}

/// Rebuilds a nested object from dotted keys.
///
/// When a key names a path whose prefix already holds a non-object leaf,
/// the later key wins and the leaf is replaced by an object.
#[must_use]
pub fn unflatten(flat: &JsonMap) -> JsonMap {
    let mut tree = JsonMap::new();
    for (key, value) in flat {
        insert_path(&mut tree, key, value.clone());
    }
    tree
}

fn insert_path(tree: &mut JsonMap, key: &str, value: Value) {
    match key.split_once(SEPARATOR) {
        None => {
            tree.insert(key.to_owned(), value);
        }
        Some((head, rest)) => {
            let child = tree
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(JsonMap::new()));
            if !child.is_object() {
                *child = Value::Object(JsonMap::new());
            }
            if let Value::Object(map) = child {
                insert_path(map, rest, value);
            }
        }
    }
}

/// Overlays `overrides` on `base` and returns the nested result.
///
/// Both inputs are flattened first, so dotted and nested keys may be mixed.
/// A key present in both takes the value from `overrides` and keeps its
/// position from `base`.
#[must_use]
pub fn merge(base: &JsonMap, overrides: &JsonMap) -> JsonMap {
    let mut flat = flatten(base);
    for (key, value) in flatten(overrides) {
        flat.insert(key, value);
    }
    unflatten(&flat)
}

/// Looks up a dotted path in a nested object.
///
/// An empty path, or one that runs through a non-object, yields `None`.
#[must_use]
pub fn lookup<'a>(tree: &'a JsonMap, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once(SEPARATOR) {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let value = tree.get(head)?;
    match rest {
        None => Some(value),
        Some(rest) => lookup(value.as_object()?, rest),
    }
}

/// Stable hex SHA-256 digest of a parameter map.
///
/// The map is flattened and serialized with sorted keys, so the digest
/// depends only on the key/value pairs, never on insertion order.
///
/// # Errors
///
/// Returns [`Error::Serialization`](crate::Error::Serialization) if the
/// map cannot be serialized.
pub fn content_hash(params: &JsonMap) -> Result<String> {
    let flat = flatten(params);
    let sorted: BTreeMap<&str, &Value> = flat.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let serialized = serde_json::to_vec(&sorted)?;

    let mut hasher = Sha256::new();
    hasher.update(&serialized);
    Ok(hex::encode(hasher.finalize()))
}

/// One leaf of a [`ParamTree`].
#[derive(Clone, Debug)]
pub enum Leaf {
    /// A literal value passed through unchanged.
    Value(Value),
    /// A dimension to optimize.
    Variable(Variable),
    /// A value computed per evaluation from its [`Context`](crate::dynamic::Context).
    Dynamic(Arc<dyn DynamicProvider>),
}

/// A parameter tree whose leaves are literals, variables, or dynamic values.
///
/// Leaves are stored under their flat keys in declaration order. That order
/// fixes the layout of the search space and the order in which dynamic
/// values are resolved.
///
/// ```
/// use hypered::tree::ParamTree;
/// use hypered::Variable;
/// use serde_json::json;
///
/// let tree = ParamTree::new()
///     .value("epochs", json!(10))
///     .group(
///         "optimizer",
///         ParamTree::new()
///             .variable("lr", Variable::log_real(1e-4, 1e-1))
///             .value("name", json!("adam")),
///     );
///
/// assert_eq!(tree.variable_keys().collect::<Vec<_>>(), ["optimizer.lr"]);
/// assert_eq!(tree.space().unwrap().n_slots(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ParamTree {
    leaves: Vec<(String, Leaf)>,
}

impl ParamTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree of literal values from a JSON object.
    #[must_use]
    pub fn from_values(values: &JsonMap) -> Self {
        let leaves = flatten(values)
            .into_iter()
            .map(|(k, v)| (k, Leaf::Value(v)))
            .collect();
        Self { leaves }
    }

    /// Adds (or replaces) a leaf under a dotted key.
    #[must_use]
    pub fn leaf(mut self, key: impl Into<String>, leaf: Leaf) -> Self {
        self.insert(key.into(), leaf);
        self
    }

    /// Adds a literal value.
    #[must_use]
    pub fn value(self, key: impl Into<String>, value: Value) -> Self {
        self.leaf(key, Leaf::Value(value))
    }

    /// Adds a variable to optimize.
    #[must_use]
    pub fn variable(self, key: impl Into<String>, variable: Variable) -> Self {
        self.leaf(key, Leaf::Variable(variable))
    }

    /// Adds a dynamic value.
    #[must_use]
    pub fn dynamic(self, key: impl Into<String>, provider: Arc<dyn DynamicProvider>) -> Self {
        self.leaf(key, Leaf::Dynamic(provider))
    }

    /// Nests every leaf of `child` under `prefix`.
    #[must_use]
    pub fn group(mut self, prefix: &str, child: ParamTree) -> Self {
        for (key, leaf) in child.leaves {
            self.insert(format!("{prefix}{SEPARATOR}{key}"), leaf);
        }
        self
    }

    fn insert(&mut self, key: String, leaf: Leaf) {
        match self.leaves.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = leaf,
            None => self.leaves.push((key, leaf)),
        }
    }

    /// All leaves with their flat keys, in declaration order.
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &Leaf)> {
        self.leaves.iter().map(|(k, l)| (k.as_str(), l))
    }

    /// Number of leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the tree has no leaves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Flat keys of the variable leaves, in declaration order.
    pub fn variable_keys(&self) -> impl Iterator<Item = &str> {
        self.leaves.iter().filter_map(|(k, l)| match l {
            Leaf::Variable(_) => Some(k.as_str()),
            _ => None,
        })
    }

    /// Dynamic leaves with their flat keys, in declaration order.
    pub fn dynamic_leaves(&self) -> impl Iterator<Item = (&str, &Arc<dyn DynamicProvider>)> {
        self.leaves.iter().filter_map(|(k, l)| match l {
            Leaf::Dynamic(p) => Some((k.as_str(), p)),
            _ => None,
        })
    }

    /// The search space spanned by the variable leaves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoVariables`](crate::Error::NoVariables) if the tree
    /// has no variables, or the validation error of an ill-formed variable.
    pub fn space(&self) -> Result<Space> {
        let variables = self
            .leaves
            .iter()
            .filter_map(|(_, l)| match l {
                Leaf::Variable(v) => Some(v.clone()),
                _ => None,
            })
            .collect();
        Space::new(variables)
    }

    /// The flat base map: literal values as given, `null` for variable and
    /// dynamic leaves.
    #[must_use]
    pub fn base(&self) -> JsonMap {
        self.leaves
            .iter()
            .map(|(k, l)| {
                let value = match l {
                    Leaf::Value(v) => v.clone(),
                    Leaf::Variable(_) | Leaf::Dynamic(_) => Value::Null,
                };
                (k.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dynamic::RoundRobin;

    fn obj(value: Value) -> JsonMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn flatten_unflatten_round_trip() {
        let cases = [
            json!({}),
            json!({"a": 1}),
            json!({"a": {"b": {"c": [1, 2]}}, "d": "x", "e": null}),
            json!({"model": {"depth": 3, "opts": {}}, "lr": 0.01, "tags": ["a", "b"]}),
            json!({"x": {"y": {"z": {"w": true}}}, "y": {"x": false}}),
        ];
        for case in cases {
            let tree = obj(case.clone());
            assert_eq!(Value::Object(unflatten(&flatten(&tree))), case);
        }
    }

    #[test]
    fn flatten_uses_dotted_keys_in_walk_order() {
        let flat = flatten(&obj(json!({"a": {"b": 1, "c": {"d": 2}}, "e": 3})));
        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(keys, ["a.b", "a.c.d", "e"]);
    }

    #[test]
    fn merge_overrides_flat_keys() {
        let merged = merge(&obj(json!({"a.b": 1, "a.c": 2})), &obj(json!({"a.b": 3})));
        assert_eq!(Value::Object(merged), json!({"a": {"b": 3, "c": 2}}));

        let merged = merge(
            &obj(json!({"model": {"depth": 2, "width": 8}, "lr": 0.1})),
            &obj(json!({"model.width": 16, "seed": 4})),
        );
        assert_eq!(
            Value::Object(merged),
            json!({"model": {"depth": 2, "width": 16}, "lr": 0.1, "seed": 4})
        );
    }

    #[test]
    fn unflatten_lets_later_keys_replace_leaves() {
        let tree = unflatten(&obj(json!({"a": 1, "a.b": 2})));
        assert_eq!(Value::Object(tree), json!({"a": {"b": 2}}));
    }

    #[test]
    fn lookup_follows_dotted_paths() {
        let tree = obj(json!({"loss": 0.5, "metrics": {"acc": 0.9, "f1": {"macro": 0.7}}}));
        assert_eq!(lookup(&tree, "loss"), Some(&json!(0.5)));
        assert_eq!(lookup(&tree, "metrics.f1.macro"), Some(&json!(0.7)));
        assert_eq!(lookup(&tree, "metrics.missing"), None);
        assert_eq!(lookup(&tree, "loss.deeper"), None);
        assert_eq!(lookup(&tree, ""), None);
    }

    #[test]
    fn content_hash_ignores_key_order() {
        let a = content_hash(&obj(json!({"x": 1, "y": {"z": "q"}}))).unwrap();
        let b = content_hash(&obj(json!({"y.z": "q", "x": 1}))).unwrap();
        let c = content_hash(&obj(json!({"x": 2, "y": {"z": "q"}}))).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn param_tree_tracks_leaves_in_order() {
        let tree = ParamTree::from_values(&obj(json!({"data": {"path": "/tmp/d"}, "epochs": 3})))
            .variable("lr", Variable::real(0.0, 1.0))
            .dynamic("device", Arc::new(RoundRobin::new(2).unwrap()))
            .variable("act", Variable::categorical(["relu", "tanh"]))
            .value("epochs", json!(5));

        assert_eq!(tree.len(), 5);
        assert_eq!(tree.variable_keys().collect::<Vec<_>>(), ["lr", "act"]);
        assert_eq!(
            tree.dynamic_leaves().map(|(k, _)| k).collect::<Vec<_>>(),
            ["device"]
        );
        assert_eq!(tree.space().unwrap().n_slots(), 3);
        assert_eq!(
            Value::Object(tree.base()),
            json!({"data.path": "/tmp/d", "epochs": 5, "lr": null, "device": null, "act": null})
        );
    }

    #[test]
    fn tree_without_variables_has_no_space() {
        let tree = ParamTree::new().value("a", json!(1));
        assert!(matches!(tree.space(), Err(crate::Error::NoVariables)));
    }
}
