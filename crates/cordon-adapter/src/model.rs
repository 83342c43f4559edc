//! Policy model contract.
//!
//! The policy engine owns the in-memory rule model; the adapter only needs to
//! insert rules while loading and enumerate them while saving. [`PolicyModel`]
//! is that seam. [`MemoryModel`] is a plain implementation for callers that
//! do not bring their own engine.

use std::collections::BTreeMap;

/// One rule: the ordered fields following the ptype, e.g. `["alice", "data1", "read"]`.
pub type Rule = Vec<String>;

/// Permission rule section.
pub const SECTION_POLICY: &str = "p";
/// Role/grouping rule section.
pub const SECTION_GROUPING: &str = "g";
/// Sections persisted by the adapter, in serialization order.
pub const PERSISTED_SECTIONS: [&str; 2] = [SECTION_POLICY, SECTION_GROUPING];

/// In-memory rule model grouped by section and ptype.
pub trait PolicyModel: Send + Sync {
    /// Insert a rule under `section`/`ptype`.
    ///
    /// Returns `false` if the model declined the rule (unknown ptype,
    /// duplicate, ...). Declining is not an error.
    fn add_rule(&mut self, section: &str, ptype: &str, rule: Rule) -> bool;

    /// Ptypes present in `section`, in the model's iteration order.
    fn ptypes(&self, section: &str) -> Vec<String>;

    /// Rules stored under `section`/`ptype`, in stored order.
    fn rules(&self, section: &str, ptype: &str) -> &[Rule];
}

/// `BTreeMap`-backed model.
///
/// Ptypes iterate in lexical order, rules in insertion order. Exact duplicate
/// rules within one ptype are declined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryModel {
    sections: BTreeMap<String, BTreeMap<String, Vec<Rule>>>,
}

impl MemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every rule in every section.
    pub fn clear_policy(&mut self) {
        self.sections.clear();
    }

    /// Remove a rule; returns whether it was present.
    pub fn remove_rule(&mut self, section: &str, ptype: &str, rule: &[String]) -> bool {
        let Some(rules) = self
            .sections
            .get_mut(section)
            .and_then(|s| s.get_mut(ptype))
        else {
            return false;
        };
        match rules.iter().position(|r| r.as_slice() == rule) {
            Some(idx) => {
                rules.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn has_rule(&self, section: &str, ptype: &str, rule: &[String]) -> bool {
        self.rules(section, ptype)
            .iter()
            .any(|r| r.as_slice() == rule)
    }

    /// Total number of rules across all sections.
    pub fn len(&self) -> usize {
        self.sections
            .values()
            .flat_map(|s| s.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PolicyModel for MemoryModel {
    fn add_rule(&mut self, section: &str, ptype: &str, rule: Rule) -> bool {
        let rules = self
            .sections
            .entry(section.to_string())
            .or_default()
            .entry(ptype.to_string())
            .or_default();
        if rules.contains(&rule) {
            return false;
        }
        rules.push(rule);
        true
    }

    fn ptypes(&self, section: &str) -> Vec<String> {
        self.sections
            .get(section)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn rules(&self, section: &str, ptype: &str) -> &[Rule] {
        self.sections
            .get(section)
            .and_then(|s| s.get(ptype))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Build a rule from string slices.
pub fn rule<S: AsRef<str>>(fields: &[S]) -> Rule {
    fields.iter().map(|f| f.as_ref().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let mut m = MemoryModel::new();
        assert!(m.add_rule("p", "p", rule(&["writer", "data1", "write"])));
        assert!(m.add_rule("p", "p", rule(&["reader", "data1", "read"])));

        assert_eq!(
            m.rules("p", "p"),
            &[rule(&["writer", "data1", "write"]), rule(&["reader", "data1", "read"])]
        );
    }

    #[test]
    fn test_duplicates_declined() {
        let mut m = MemoryModel::new();
        assert!(m.add_rule("g", "g", rule(&["alice", "admin"])));
        assert!(!m.add_rule("g", "g", rule(&["alice", "admin"])));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_ptypes_sorted() {
        let mut m = MemoryModel::new();
        m.add_rule("g", "g2", rule(&["alice", "admin", "domain1"]));
        m.add_rule("g", "g", rule(&["alice", "admin"]));
        assert_eq!(m.ptypes("g"), vec!["g".to_string(), "g2".to_string()]);
        assert!(m.ptypes("p").is_empty());
    }

    #[test]
    fn test_remove_rule() {
        let mut m = MemoryModel::new();
        m.add_rule("p", "p", rule(&["alice", "data1", "read"]));
        assert!(m.remove_rule("p", "p", &rule(&["alice", "data1", "read"])));
        assert!(!m.remove_rule("p", "p", &rule(&["alice", "data1", "read"])));
        assert!(!m.has_rule("p", "p", &rule(&["alice", "data1", "read"])));
        assert!(m.is_empty());
    }

    #[test]
    fn test_clear_policy() {
        let mut m = MemoryModel::new();
        m.add_rule("p", "p", rule(&["alice", "data1", "read"]));
        m.add_rule("g", "g", rule(&["alice", "admin"]));
        m.clear_policy();
        assert!(m.is_empty());
        assert!(m.rules("g", "g").is_empty());
    }
}
