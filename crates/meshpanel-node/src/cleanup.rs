//! Scheduled stale-contact sweep.
//!
//! Called by the event loop on a configurable interval (default: 24 h)
//! and on demand via [`NodeCommand::CleanupNow`](crate::command::NodeCommand).
//! The sweep runs off the event loop against a copy of the
//! last-activity map; it never mutates panel state.
//!
//! A contact is stale when **both** its last advertisement and its
//! last message activity are missing or older than the threshold.
//! Each stale contact gets its own remove command; a failed removal is
//! logged and the sweep moves on.

use std::time::Duration;

use meshpanel_storage::LastActivityMap;
use meshpanel_types::{ContactRecord, OutboundCommand, Result, Timestamp};

use crate::host::HostHandles;

// ---------------------------------------------------------------------------
// CleanupReport
// ---------------------------------------------------------------------------

/// Summary of a cleanup sweep.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CleanupReport {
    /// Contacts with a usable identity that were checked.
    pub examined: usize,
    /// Contacts found stale.
    pub stale: usize,
    /// Stale contacts the host confirmed removing.
    pub removed: usize,
    /// Stale contacts whose removal failed.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Staleness
// ---------------------------------------------------------------------------

/// Returns `true` if neither the advert nor the activity timestamp is
/// within `threshold_secs` of `now`.
pub fn is_stale(
    last_advert: Option<Timestamp>,
    last_activity: Option<Timestamp>,
    now: Timestamp,
    threshold_secs: f64,
) -> bool {
    let fresh = |ts: Option<Timestamp>| ts.is_some_and(|t| t.is_within(now, threshold_secs));
    !fresh(last_advert) && !fresh(last_activity)
}

/// Selects the stale contacts from `contacts`.
///
/// Records without an identity are skipped. The second value is the
/// number of records examined.
pub fn stale_contacts<'a>(
    contacts: &'a [ContactRecord],
    last_activity: &LastActivityMap,
    now: Timestamp,
    threshold_secs: f64,
) -> (Vec<&'a ContactRecord>, usize) {
    let mut examined = 0;
    let stale = contacts
        .iter()
        .filter(|record| {
            let Some(identity) = record.identity() else {
                return false;
            };
            examined += 1;
            is_stale(
                record.last_advert,
                last_activity.get(&identity),
                now,
                threshold_secs,
            )
        })
        .collect();
    (stale, examined)
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Runs one sweep against the host.
///
/// # Errors
///
/// Returns an error only if the contact list cannot be fetched.
/// Individual removal failures are counted in the report.
pub async fn run_cleanup(
    host: &HostHandles,
    last_activity: &LastActivityMap,
    now: Timestamp,
    threshold_secs: f64,
    timeout: Duration,
) -> Result<CleanupReport> {
    let contacts = host.contacts(timeout).await?;
    let (stale, examined) = stale_contacts(&contacts, last_activity, now, threshold_secs);

    let mut report = CleanupReport {
        examined,
        stale: stale.len(),
        ..CleanupReport::default()
    };

    for record in stale {
        let Some(identity) = record.identity() else {
            continue;
        };

        let command = OutboundCommand::RemoveContact {
            pubkey: identity.to_string(),
        };

        match host.dispatch(&command, timeout).await {
            Ok(()) => {
                report.removed += 1;
                tracing::info!(
                    %identity,
                    name = record.display_name(),
                    "removed stale contact"
                );
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(%e, %identity, "failed to remove stale contact");
            }
        }
    }

    tracing::debug!(
        examined = report.examined,
        stale = report.stale,
        removed = report.removed,
        failed = report.failed,
        "cleanup sweep completed"
    );

    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meshpanel_types::NodeIdentity;

    const DAY: f64 = 86_400.0;

    fn ts(secs: f64) -> Option<Timestamp> {
        Some(Timestamp::from_secs(secs))
    }

    #[test]
    fn stale_requires_both_old() {
        let now = Timestamp::from_secs(100.0 * DAY);
        let threshold = 30.0 * DAY;

        assert!(is_stale(None, None, now, threshold));
        assert!(is_stale(ts(10.0 * DAY), None, now, threshold));
        assert!(is_stale(ts(10.0 * DAY), ts(20.0 * DAY), now, threshold));

        assert!(!is_stale(ts(90.0 * DAY), None, now, threshold));
        assert!(!is_stale(None, ts(90.0 * DAY), now, threshold));
        assert!(!is_stale(ts(10.0 * DAY), ts(99.0 * DAY), now, threshold));
    }

    #[test]
    fn threshold_boundary_is_fresh() {
        let now = Timestamp::from_secs(100.0 * DAY);
        assert!(!is_stale(ts(70.0 * DAY), None, now, 30.0 * DAY));
    }

    #[test]
    fn stale_selection_uses_activity_map() {
        let now = Timestamp::from_secs(100.0 * DAY);
        let contacts = vec![
            ContactRecord {
                pubkey_prefix: Some("AA11".into()),
                last_advert: ts(1.0),
                ..ContactRecord::default()
            },
            ContactRecord {
                pubkey_prefix: Some("bb22".into()),
                last_advert: ts(1.0),
                ..ContactRecord::default()
            },
            ContactRecord::default(),
        ];

        let mut activity = LastActivityMap::new();
        match NodeIdentity::new("aa11") {
            Ok(id) => activity.record(id, Timestamp::from_secs(99.0 * DAY)),
            Err(e) => panic!("bad identity: {e}"),
        }

        let (stale, examined) = stale_contacts(&contacts, &activity, now, 30.0 * DAY);
        assert_eq!(examined, 2);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].pubkey_prefix.as_deref(), Some("bb22"));
    }
}
