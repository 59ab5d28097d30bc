//! Override rule trees parsed from the root manifest's `overrides` field.
//!
//! A tree is stored in an arena and addressed by [`RuleId`]. The root of a
//! tree carries no key; every other rule is keyed by `name@keySpec` and holds
//! the replacement value plus the nested rules that apply inside the
//! overridden package's subtree:
//!
//! ```json
//! {
//!   "lodash": "3.10.1",
//!   "eslint@^8.0.0": { ".": "8.57.0", "minimatch": "$minimatch" }
//! }
//! ```
//!
//! Rules are looked up from a *scope* (any rule id) by walking its ancestry
//! outwards, so nested rules shadow outer ones for the same key.

use deno_semver::{Version, VersionReq};
use indexmap::IndexMap;
use lockward_core::spec::{is_any, parse_range, SpecKind};
use lockward_util::errors::{LockwardError, LockwardResult};
use serde_json::{Map, Value};

/// Identifier of a rule inside an [`OverrideTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct RuleId(pub usize);

/// One rule of an override tree.
#[derive(Debug, Clone)]
pub struct RuleNode {
    /// Package name the rule targets; `None` for a tree root.
    pub name: Option<String>,
    /// The raw key as written, e.g. `eslint@^8.0.0`.
    pub key: Option<String>,
    /// Range the rule applies to before substitution; `*` when unqualified.
    pub key_spec: Option<String>,
    key_range: Option<VersionReq>,
    /// Replacement spec, `$name` reference, or `*` for "no override".
    pub value: Option<String>,
    pub parent: Option<RuleId>,
    /// Nested rules by raw key, in manifest order.
    pub children: IndexMap<String, RuleId>,
}

impl RuleNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Arena holding every override tree of a graph session.
///
/// Trees are never mutated after insertion; re-applying a configuration
/// appends a new tree.
#[derive(Debug, Clone, Default)]
pub struct OverrideTree {
    rules: Vec<RuleNode>,
}

impl OverrideTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `overrides` object and return the new tree's root.
    pub fn add_tree(&mut self, value: &Value) -> LockwardResult<RuleId> {
        let empty = Map::new();
        let map = match value {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(LockwardError::OverrideConfig {
                    message: "\"overrides\" must be an object".to_string(),
                })
            }
        };
        let root = self.push(RuleNode {
            name: None,
            key: None,
            key_spec: None,
            key_range: None,
            value: None,
            parent: None,
            children: IndexMap::new(),
        });
        self.add_children(root, map)?;
        tracing::debug!(rules = self.rules.len(), "parsed override tree");
        Ok(root)
    }

    pub fn rule(&self, id: RuleId) -> &RuleNode {
        &self.rules[id.0]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// `id`, its parent, its grandparent, up to the tree root.
    pub fn ancestry(&self, id: RuleId) -> impl Iterator<Item = RuleId> + '_ {
        std::iter::successors(Some(id), move |&r| self.rule(r).parent)
    }

    /// Rules visible from `scope`, most specific first. For each ancestor
    /// outward: its children, then the ancestor itself. The first rule seen
    /// for a key wins.
    pub fn ruleset(&self, scope: RuleId) -> Vec<RuleId> {
        let mut seen: IndexMap<&str, RuleId> = IndexMap::new();
        for ancestor in self.ancestry(scope) {
            let rule = self.rule(ancestor);
            for (key, &kid) in &rule.children {
                seen.entry(key.as_str()).or_insert(kid);
            }
            if let Some(key) = &rule.key {
                seen.entry(key.as_str()).or_insert(ancestor);
            }
        }
        seen.into_values().collect()
    }

    /// The rule that applies to a dependency named `name` requested with
    /// `raw_spec`, or `scope` itself when none does.
    ///
    /// Callers must not apply the result to bundled or shrinkwrapped targets.
    pub fn get_edge_rule(&self, scope: RuleId, name: &str, raw_spec: &str) -> RuleId {
        let kind = SpecKind::classify(raw_spec);
        for id in self.ruleset(scope) {
            let rule = self.rule(id);
            if rule.name.as_deref() != Some(name) {
                continue;
            }
            let (Some(key_spec), Some(key_range)) = (&rule.key_spec, &rule.key_range) else {
                continue;
            };
            if is_any(key_spec) {
                return id;
            }
            if let Some(range) = kind.comparable_range() {
                if range.intersects(key_range) {
                    return id;
                }
                continue;
            }
            if kind.is_uncomparable() {
                continue;
            }
            // tags, files, folders and URLs cannot be compared; accept
            return id;
        }
        scope
    }

    /// The rule that applies to an installed package, matched on its version
    /// against either the key-spec or the replacement value.
    pub fn get_node_rule(&self, scope: RuleId, name: &str, version: &Version) -> RuleId {
        for id in self.ruleset(scope) {
            let rule = self.rule(id);
            if rule.name.as_deref() != Some(name) {
                continue;
            }
            let key_ok = rule
                .key_range
                .as_ref()
                .is_some_and(|r| r.matches(version));
            let value_ok = rule
                .value
                .as_deref()
                .and_then(|v| parse_range(v).ok())
                .is_some_and(|r| r.tag().is_none() && r.matches(version));
            if key_ok || value_ok {
                return id;
            }
        }
        scope
    }

    /// Structural equality by lineage: same key and value, pairwise equal
    /// children, and equal parents all the way up.
    pub fn is_equal(&self, a: RuleId, b: RuleId) -> bool {
        if a == b {
            return true;
        }
        if !self.subtree_equal(a, b) {
            return false;
        }
        match (self.rule(a).parent, self.rule(b).parent) {
            (None, None) => true,
            (Some(pa), Some(pb)) => self.is_equal(pa, pb),
            _ => false,
        }
    }

    /// [`is_equal`](Self::is_equal) lifted to optional references.
    pub fn same(&self, a: Option<RuleId>, b: Option<RuleId>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.is_equal(a, b),
            _ => false,
        }
    }

    fn subtree_equal(&self, a: RuleId, b: RuleId) -> bool {
        if a == b {
            return true;
        }
        let (ra, rb) = (self.rule(a), self.rule(b));
        if ra.key != rb.key || ra.value != rb.value || ra.children.len() != rb.children.len() {
            return false;
        }
        ra.children.iter().all(|(key, &ca)| {
            rb.children
                .get(key)
                .is_some_and(|&cb| self.subtree_equal(ca, cb))
        })
    }

    /// Of two trees, the one that refines the other: `b` if some ancestor
    /// of `b` equals `a`, else `a` if some ancestor of `a` equals `b`.
    /// `None` means the trees conflict.
    pub fn find_specific(&self, a: RuleId, b: RuleId) -> Option<RuleId> {
        if self.ancestry(b).any(|r| self.is_equal(r, a)) {
            return Some(b);
        }
        if self.ancestry(a).any(|r| self.is_equal(r, b)) {
            return Some(a);
        }
        tracing::debug!(
            first = %self.describe(a),
            second = %self.describe(b),
            "conflicting override sets"
        );
        None
    }

    pub fn conflicts(&self, a: RuleId, b: RuleId) -> bool {
        self.find_specific(a, b).is_none()
    }

    /// Human-readable path of a rule, e.g. `eslint@^8.0.0 > minimatch`.
    pub fn describe(&self, id: RuleId) -> String {
        let mut keys: Vec<&str> = self
            .ancestry(id)
            .filter_map(|r| self.rule(r).key.as_deref())
            .collect();
        if keys.is_empty() {
            return "<root>".to_string();
        }
        keys.reverse();
        keys.join(" > ")
    }

    fn push(&mut self, rule: RuleNode) -> RuleId {
        self.rules.push(rule);
        RuleId(self.rules.len() - 1)
    }

    fn add_children(&mut self, parent: RuleId, map: &Map<String, Value>) -> LockwardResult<()> {
        for (key, value) in map {
            if key == "." {
                continue;
            }
            let child = self.add_rule(parent, key, value)?;
            self.rules[parent.0].children.insert(key.clone(), child);
        }
        Ok(())
    }

    fn add_rule(&mut self, parent: RuleId, key: &str, value: &Value) -> LockwardResult<RuleId> {
        let (name, key_spec) = split_key(key)?;
        let key_range = parse_range(&key_spec)?;
        if let Some(tag) = key_range.tag() {
            return Err(LockwardError::OverrideConfig {
                message: format!("override key \"{key}\" qualifies by tag \"{tag}\", not by range"),
            });
        }

        let (own, nested) = match value {
            Value::String(s) => (Some(s.as_str()), None),
            Value::Object(map) => match map.get(".") {
                None => (None, Some(map)),
                Some(Value::String(s)) => (Some(s.as_str()), Some(map)),
                Some(_) => {
                    return Err(LockwardError::OverrideConfig {
                        message: format!("\".\" in override \"{key}\" must be a string"),
                    })
                }
            },
            _ => {
                return Err(LockwardError::OverrideConfig {
                    message: format!("override \"{key}\" must be a string or an object"),
                })
            }
        };
        // a missing or empty value keeps the key's own spec
        let value = match own.map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => key_spec.clone(),
        };

        let id = self.push(RuleNode {
            name: Some(name),
            key: Some(key.to_string()),
            key_spec: Some(key_spec),
            key_range: Some(key_range),
            value: Some(value),
            parent: Some(parent),
            children: IndexMap::new(),
        });
        if let Some(map) = nested {
            self.add_children(id, map)?;
        }
        Ok(id)
    }
}

/// Split `name@spec` (`@scope/name@spec` for scoped packages).
fn split_key(key: &str) -> LockwardResult<(String, String)> {
    let at = match key.strip_prefix('@') {
        Some(rest) => rest.find('@').map(|i| i + 1),
        None => key.find('@'),
    };
    let (name, spec) = match at {
        Some(i) => (&key[..i], key[i + 1..].trim()),
        None => (key, ""),
    };
    if name.is_empty() || name == "@" {
        return Err(LockwardError::OverrideConfig {
            message: format!("override without name: \"{key}\""),
        });
    }
    let spec = if spec.is_empty() { "*" } else { spec };
    Ok((name.to_string(), spec.to_string()))
}
