//! Per-contact caches: who has been greeted, and when each contact
//! last produced message activity.

use std::collections::{BTreeMap, BTreeSet};

use meshpanel_types::{NodeIdentity, Timestamp};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GreetedSet
// ---------------------------------------------------------------------------

/// Identities that have already been greeted.
///
/// Grows monotonically; an entry is only removed to roll back a
/// greeting whose delivery failed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GreetedSet(BTreeSet<NodeIdentity>);

impl GreetedSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `identity` as greeted. Returns `false` if it already was.
    pub fn insert(&mut self, identity: NodeIdentity) -> bool {
        self.0.insert(identity)
    }

    /// Removes `identity`. Returns `true` if it was present.
    pub fn remove(&mut self, identity: &NodeIdentity) -> bool {
        self.0.remove(identity)
    }

    pub fn contains(&self, identity: &NodeIdentity) -> bool {
        self.0.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeIdentity> {
        self.0.iter()
    }
}

impl FromIterator<NodeIdentity> for GreetedSet {
    fn from_iter<I: IntoIterator<Item = NodeIdentity>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// LastActivityMap
// ---------------------------------------------------------------------------

/// Most recent message activity per contact.
///
/// Read by the cleanup sweep; fed by the host and cached across
/// restarts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LastActivityMap(BTreeMap<NodeIdentity, Timestamp>);

impl LastActivityMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records activity at `at`. An older timestamp never replaces a
    /// newer one.
    pub fn record(&mut self, identity: NodeIdentity, at: Timestamp) {
        self.0
            .entry(identity)
            .and_modify(|last| {
                if at > *last {
                    *last = at;
                }
            })
            .or_insert(at);
    }

    /// Last activity for `identity`.
    pub fn get(&self, identity: &NodeIdentity) -> Option<Timestamp> {
        self.0.get(identity).copied()
    }

    /// Drops entries older than `max_age_secs` at `now`. Returns the
    /// number removed.
    pub fn prune_older_than(&mut self, max_age_secs: f64, now: Timestamp) -> usize {
        let before = self.0.len();
        self.0.retain(|_, at| at.is_within(now, max_age_secs));
        before - self.0.len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeIdentity {
        match NodeIdentity::new(s) {
            Ok(id) => id,
            Err(e) => panic!("bad test identity {s}: {e}"),
        }
    }

    #[test]
    fn greeted_insert_reports_novelty() {
        let mut set = GreetedSet::new();
        assert!(set.insert(id("aa")));
        assert!(!set.insert(id("AA")));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&id("aa")));
        assert!(set.is_empty());
    }

    #[test]
    fn greeted_serializes_as_array() -> Result<(), Box<dyn std::error::Error>> {
        let set: GreetedSet = [id("bb"), id("aa")].into_iter().collect();
        assert_eq!(serde_json::to_string(&set)?, r#"["aa","bb"]"#);
        Ok(())
    }

    #[test]
    fn activity_keeps_newest() {
        let mut map = LastActivityMap::new();
        map.record(id("aa"), Timestamp::from_secs(50.0));
        map.record(id("aa"), Timestamp::from_secs(20.0));
        assert_eq!(map.get(&id("aa")), Some(Timestamp::from_secs(50.0)));
        map.record(id("aa"), Timestamp::from_secs(70.0));
        assert_eq!(map.get(&id("aa")), Some(Timestamp::from_secs(70.0)));
    }

    #[test]
    fn activity_prune() {
        let mut map = LastActivityMap::new();
        map.record(id("old"), Timestamp::from_secs(0.0));
        map.record(id("new"), Timestamp::from_secs(900.0));
        assert_eq!(map.prune_older_than(100.0, Timestamp::from_secs(1000.0)), 1);
        assert!(map.get(&id("old")).is_none());
        assert_eq!(map.len(), 1);
    }
}
