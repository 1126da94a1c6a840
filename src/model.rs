//! # Policy Model
//!
//! The enforcement engine owns the in-memory policy model; the adapter only
//! appends decoded rules to it on load and reads rules from it on save.
//! `Model` is that seam. `DefaultModel` is a plain ordered-map implementation
//! for callers (and tests) that do not bring their own.

use std::collections::BTreeMap;

/// Section keys persisted by a full save, in write order.
pub const PERSISTED_SECTIONS: [&str; 2] = ["p", "g"];

/// The engine-side policy model as seen by the adapter.
///
/// Rules live under a section key (`"p"`, `"g"`) and then a policy type
/// (`"p"`, `"p2"`, `"g"`, `"g2"`, ...).
pub trait Model {
    /// Appends a rule under `sec` / `ptype`.
    fn add_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>);

    /// Returns the rules stored under `sec` / `ptype`, in insertion order.
    fn get_policy(&self, sec: &str, ptype: &str) -> Vec<Vec<String>>;

    /// Returns every policy type that exists under `sec`.
    fn policy_types(&self, sec: &str) -> Vec<String>;
}

/// In-memory model: section -> policy type -> rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultModel {
    sections: BTreeMap<String, BTreeMap<String, Vec<Vec<String>>>>,
}

impl DefaultModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every rule while keeping nothing else.
    pub fn clear(&mut self) {
        self.sections.clear();
    }

    /// Total number of rules across all sections.
    pub fn rule_count(&self) -> usize {
        self.sections
            .values()
            .flat_map(|types| types.values())
            .map(Vec::len)
            .sum()
    }
}

impl Model for DefaultModel {
    fn add_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>) {
        self.sections
            .entry(sec.to_string())
            .or_default()
            .entry(ptype.to_string())
            .or_default()
            .push(rule);
    }

    fn get_policy(&self, sec: &str, ptype: &str) -> Vec<Vec<String>> {
        self.sections
            .get(sec)
            .and_then(|types| types.get(ptype))
            .cloned()
            .unwrap_or_default()
    }

    fn policy_types(&self, sec: &str) -> Vec<String> {
        self.sections
            .get(sec)
            .map(|types| types.keys().cloned().collect())
            .unwrap_or_default()
    }
}
