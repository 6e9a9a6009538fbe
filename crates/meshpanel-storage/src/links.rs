//! Symmetric adjacency table of observed direct links.
//!
//! Each undirected link is stored as two half-edges, `a → b` and
//! `b → a`. [`LinkStore::record_link`] writes one half; callers
//! that observe a link use [`LinkStore::record_pair`], which writes
//! both with the same timestamp so the halves never diverge.
//!
//! Iteration order is sorted by identity so every projection built
//! from the store is deterministic.

use std::collections::BTreeMap;

use meshpanel_types::{NodeIdentity, Timestamp};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LinkEdge
// ---------------------------------------------------------------------------

/// One direction of an observed link.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkEdge {
    /// When the link was last observed.
    #[serde(default)]
    pub last_seen: Timestamp,
    /// Number of observations.
    #[serde(default = "default_count")]
    pub count: u64,
}

fn default_count() -> u64 {
    1
}

// ---------------------------------------------------------------------------
// LinkStore
// ---------------------------------------------------------------------------

/// Half-edge table keyed `source → destination → edge`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkStore {
    links: BTreeMap<NodeIdentity, BTreeMap<NodeIdentity, LinkEdge>>,
}

impl LinkStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes the half-edge `a → b`.
    ///
    /// A new half-edge starts at count 1; an existing one has its count
    /// incremented and `last_seen` overwritten. Does **not** touch
    /// `b → a`.
    pub fn record_link(&mut self, a: &NodeIdentity, b: &NodeIdentity, at: Timestamp) {
        self.links
            .entry(a.clone())
            .or_default()
            .entry(b.clone())
            .and_modify(|edge| {
                edge.count += 1;
                edge.last_seen = at;
            })
            .or_insert(LinkEdge {
                last_seen: at,
                count: 1,
            });
    }

    /// Records both half-edges of the undirected link `a ↔ b`.
    pub fn record_pair(&mut self, a: &NodeIdentity, b: &NodeIdentity, at: Timestamp) {
        self.record_link(a, b, at);
        self.record_link(b, a, at);
    }

    /// Drops every half-edge older than `max_age_secs` at `now`.
    ///
    /// Sources left without destinations are removed. Both halves of a
    /// link carry the same `last_seen`, so they are dropped together.
    /// Returns the number of half-edges removed.
    pub fn prune_older_than(&mut self, max_age_secs: f64, now: Timestamp) -> usize {
        let mut removed = 0;
        self.links.retain(|_, destinations| {
            let before = destinations.len();
            destinations.retain(|_, edge| edge.last_seen.is_within(now, max_age_secs));
            removed += before - destinations.len();
            !destinations.is_empty()
        });
        removed
    }

    /// Returns the half-edge `a → b`, if recorded.
    pub fn get(&self, a: &NodeIdentity, b: &NodeIdentity) -> Option<&LinkEdge> {
        self.links.get(a).and_then(|d| d.get(b))
    }

    /// Iterates sources with their destinations, in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeIdentity, &BTreeMap<NodeIdentity, LinkEdge>)> {
        self.links.iter()
    }

    /// Iterates every half-edge as `(source, destination, edge)`.
    pub fn half_edges(&self) -> impl Iterator<Item = (&NodeIdentity, &NodeIdentity, &LinkEdge)> {
        self.links
            .iter()
            .flat_map(|(a, dests)| dests.iter().map(move |(b, edge)| (a, b, edge)))
    }

    /// Number of identities with at least one outgoing half-edge.
    pub fn source_count(&self) -> usize {
        self.links.len()
    }

    /// Total number of half-edges.
    pub fn half_edge_count(&self) -> usize {
        self.links.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if no links are recorded.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Returns `true` if every half-edge has a mirror with equal
    /// `count` and `last_seen`.
    pub fn is_symmetric(&self) -> bool {
        self.half_edges()
            .all(|(a, b, edge)| self.get(b, a) == Some(edge))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeIdentity {
        match NodeIdentity::new(s) {
            Ok(id) => id,
            Err(e) => panic!("bad test identity {s}: {e}"),
        }
    }

    fn ts(secs: f64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn first_observation_starts_at_one() {
        let mut store = LinkStore::new();
        store.record_link(&id("aa"), &id("bb"), ts(10.0));
        assert_eq!(
            store.get(&id("aa"), &id("bb")),
            Some(&LinkEdge { last_seen: ts(10.0), count: 1 })
        );
        assert!(store.get(&id("bb"), &id("aa")).is_none());
    }

    #[test]
    fn repeat_observation_increments_and_refreshes() {
        let mut store = LinkStore::new();
        store.record_pair(&id("aa"), &id("bb"), ts(10.0));
        store.record_pair(&id("aa"), &id("bb"), ts(20.0));
        let edge = store.get(&id("bb"), &id("aa")).copied();
        assert_eq!(edge, Some(LinkEdge { last_seen: ts(20.0), count: 2 }));
        assert!(store.is_symmetric());
    }

    #[test]
    fn single_direction_is_not_symmetric() {
        let mut store = LinkStore::new();
        store.record_link(&id("aa"), &id("bb"), ts(1.0));
        assert!(!store.is_symmetric());
    }

    #[test]
    fn prune_drops_stale_edges_and_empty_sources() {
        let mut store = LinkStore::new();
        store.record_pair(&id("aa"), &id("bb"), ts(100.0));
        store.record_pair(&id("bb"), &id("cc"), ts(900.0));

        let removed = store.prune_older_than(500.0, ts(1000.0));

        assert_eq!(removed, 2);
        assert!(store.get(&id("aa"), &id("bb")).is_none());
        assert!(store.get(&id("bb"), &id("aa")).is_none());
        assert!(store.get(&id("bb"), &id("cc")).is_some());
        assert_eq!(store.source_count(), 2);
        assert!(store.is_symmetric());
    }

    #[test]
    fn prune_keeps_edge_exactly_at_cutoff() {
        let mut store = LinkStore::new();
        store.record_pair(&id("aa"), &id("bb"), ts(500.0));
        assert_eq!(store.prune_older_than(500.0, ts(1000.0)), 0);
        assert_eq!(store.half_edge_count(), 2);
    }

    #[test]
    fn serializes_as_nested_map() -> Result<(), Box<dyn std::error::Error>> {
        let mut store = LinkStore::new();
        store.record_pair(&id("aa"), &id("bb"), ts(5.0));
        let json = serde_json::to_value(&store)?;
        assert_eq!(json["aa"]["bb"]["count"], 1);
        assert_eq!(json["bb"]["aa"]["last_seen"], 5.0);

        let back: LinkStore = serde_json::from_value(json)?;
        assert_eq!(back, store);
        Ok(())
    }

    #[test]
    fn missing_count_defaults_to_one() -> Result<(), Box<dyn std::error::Error>> {
        let store: LinkStore = serde_json::from_str(r#"{"AA": {"bb": {"last_seen": 3.0}}}"#)?;
        let edge = store.get(&id("aa"), &id("bb")).copied();
        assert_eq!(edge, Some(LinkEdge { last_seen: ts(3.0), count: 1 }));
        Ok(())
    }
}
