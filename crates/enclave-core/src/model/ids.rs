use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the partition every service lands in unless told otherwise
pub const DEFAULT_PARTITION_ID: &str = "default";

/// User-chosen identifier of a service within one enclave
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is empty or whitespace-only (never registrable)
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a network partition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The implicit partition holding every service not placed elsewhere
    pub fn default_partition() -> Self {
        Self(DEFAULT_PARTITION_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_PARTITION_ID
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PartitionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A set of service ids with set algebra
///
/// Backed by an ordered set, so iteration (and therefore every rendering of
/// a partition's membership) is deterministic. None of the combining methods
/// mutate their argument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceIdSet(BTreeSet<ServiceId>);

impl ServiceIdSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Insert an id; returns false if it was already present
    pub fn insert(&mut self, id: ServiceId) -> bool {
        self.0.insert(id)
    }

    /// Remove an id; returns false if it was absent
    pub fn remove(&mut self, id: &ServiceId) -> bool {
        self.0.remove(id)
    }

    pub fn contains(&self, id: &ServiceId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceId> {
        self.0.iter()
    }

    /// New set holding the members of both sets
    pub fn union(&self, other: &ServiceIdSet) -> ServiceIdSet {
        Self(self.0.union(&other.0).cloned().collect())
    }

    /// New set holding the members of `self` absent from `other`
    pub fn difference(&self, other: &ServiceIdSet) -> ServiceIdSet {
        Self(self.0.difference(&other.0).cloned().collect())
    }

    /// New set holding the members present in both sets
    pub fn intersection(&self, other: &ServiceIdSet) -> ServiceIdSet {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    /// Add every member of `other` to `self`
    pub fn extend_from(&mut self, other: &ServiceIdSet) {
        self.0.extend(other.0.iter().cloned());
    }
}

impl FromIterator<ServiceId> for ServiceIdSet {
    fn from_iter<I: IntoIterator<Item = ServiceId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for ServiceIdSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(ServiceId::from).collect())
    }
}

impl IntoIterator for ServiceIdSet {
    type Item = ServiceId;
    type IntoIter = std::collections::btree_set::IntoIter<ServiceId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ServiceIdSet {
    type Item = &'a ServiceId;
    type IntoIter = std::collections::btree_set::Iter<'a, ServiceId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_has_no_duplicates() {
        let mut set = ServiceIdSet::new();
        assert!(set.insert("a".into()));
        assert!(!set.insert("a".into()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_union_does_not_mutate_arguments() {
        let left: ServiceIdSet = ["a", "b"].into_iter().collect();
        let right: ServiceIdSet = ["b", "c"].into_iter().collect();

        let union = left.union(&right);

        assert_eq!(union.len(), 3);
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 2);
    }

    #[test]
    fn test_difference_and_equality() {
        let all: ServiceIdSet = ["a", "b", "c"].into_iter().collect();
        let some: ServiceIdSet = ["b"].into_iter().collect();

        let expected: ServiceIdSet = ["c", "a"].into_iter().collect();
        assert_eq!(all.difference(&some), expected);
        assert_ne!(all, expected);
    }

    #[test]
    fn test_blank_service_id() {
        assert!(ServiceId::new("  ").is_blank());
        assert!(!ServiceId::new("svc").is_blank());
    }
}
