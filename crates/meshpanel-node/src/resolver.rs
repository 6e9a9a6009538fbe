//! Prefix → contact resolution.
//!
//! Path traces and the link store only know short identity prefixes.
//! The resolver maps a prefix to the best matching contact record that
//! has usable coordinates.
//!
//! # Disambiguation
//!
//! Among all matching records:
//!
//! 1. Repeaters win over non-repeaters.
//! 2. Then the latest `last_advert` wins (missing counts as 0).
//! 3. Then the lexicographically smallest identity wins.
//! 4. Then the record enumerated first by the host wins.
//!
//! Step 3 makes the outcome independent of host enumeration order
//! except for records with byte-identical identities.

use std::cmp::Ordering;

use meshpanel_types::{ContactRecord, NodeIdentity, ResolvedNode};

/// Anything that can resolve an identity prefix.
///
/// Export code depends on this trait, not on a concrete resolver, so a
/// caching resolver can be substituted without touching callers.
pub trait ResolveNode {
    /// Best match for `prefix`, or `None`.
    fn resolve(&self, prefix: &NodeIdentity) -> Option<ResolvedNode>;
}

/// Resolver over one snapshot of the host's contact records.
///
/// Each call scans the snapshot; nothing is cached between calls.
pub struct SnapshotResolver<'a> {
    contacts: &'a [ContactRecord],
}

impl<'a> SnapshotResolver<'a> {
    pub fn new(contacts: &'a [ContactRecord]) -> Self {
        Self { contacts }
    }
}

impl ResolveNode for SnapshotResolver<'_> {
    fn resolve(&self, prefix: &NodeIdentity) -> Option<ResolvedNode> {
        // `min_by` keeps the first of equal elements, which gives the
        // enumeration-order fallback.
        self.contacts
            .iter()
            .filter(|record| {
                record
                    .identity()
                    .is_some_and(|identity| prefix.is_prefix_of(identity.as_str()))
            })
            .filter_map(ResolvedNode::from_record)
            .min_by(preference)
    }
}

/// Orders candidates best-first.
fn preference(a: &ResolvedNode, b: &ResolvedNode) -> Ordering {
    let advert = |n: &ResolvedNode| n.last_advert.map(|t| t.as_secs()).unwrap_or(0.0);

    b.is_repeater()
        .cmp(&a.is_repeater())
        .then_with(|| advert(b).total_cmp(&advert(a)))
        .then_with(|| a.identity.cmp(&b.identity))
}
