//! Export engine: heatmap, nodemap, and direct-links projections.
//!
//! Each projection reads its time threshold from a host setting,
//! falling back to a configured default, and is written as a JSON
//! artifact under the artifact root:
//!
//! ```text
//! meshcore_heatmap_data.json      {threshold_hours, nodes: [{name, lat, lon, use_count}], paths: [], updated}
//! meshcore_nodemap_data.json      {threshold_hours, nodes: [{name, lat, lon, node_type, age_hours}], updated}
//! meshcore_directlinks_data.json  {threshold_hours, nodes: [...], links: [...], updated}
//! ```
//!
//! Builders are pure functions over a contact snapshot, hop records,
//! and the link store. [`run_export_cycle`] fetches the host data,
//! builds all three, then writes the artifacts and the persisted
//! snapshots on a blocking thread.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use meshpanel_storage::{LinkStore, Persistence, SaveReport, SnapshotBundle, SnapshotFile};
use meshpanel_types::config::PanelConfig;
use meshpanel_types::{
    ContactRecord, HopRecord, MeshPanelError, NodeIdentity, ResolvedNode, Result, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::host::HostHandles;
use crate::resolver::{ResolveNode, SnapshotResolver};

/// Heatmap artifact file name.
pub const HEATMAP_DATA_FILE: &str = "meshcore_heatmap_data.json";

/// Nodemap artifact file name.
pub const NODEMAP_DATA_FILE: &str = "meshcore_nodemap_data.json";

/// Direct-links artifact file name.
pub const DIRECTLINKS_DATA_FILE: &str = "meshcore_directlinks_data.json";

const SECS_PER_HOUR: f64 = 3600.0;

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Time windows, in hours, for the three projections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub heatmap_hours: f64,
    pub nodemap_hours: f64,
    pub directlinks_hours: f64,
}

impl Thresholds {
    /// The configured defaults, ignoring host settings.
    pub fn defaults(config: &PanelConfig) -> Self {
        Self {
            heatmap_hours: config.default_heatmap_hours,
            nodemap_hours: config.default_nodemap_hours,
            directlinks_hours: config.default_directlinks_hours,
        }
    }

    /// Reads the three overrides from the host.
    pub async fn fetch(host: &HostHandles, config: &PanelConfig) -> Self {
        let timeout = config.command_timeout();
        let heatmap = host.setting(&config.heatmap_threshold_setting, timeout).await;
        let nodemap = host.setting(&config.nodemap_threshold_setting, timeout).await;
        let directlinks = host
            .setting(&config.directlinks_threshold_setting, timeout)
            .await;

        Self {
            heatmap_hours: parse_threshold(heatmap.as_deref(), config.default_heatmap_hours),
            nodemap_hours: parse_threshold(nodemap.as_deref(), config.default_nodemap_hours),
            directlinks_hours: parse_threshold(
                directlinks.as_deref(),
                config.default_directlinks_hours,
            ),
        }
    }
}

/// Parses a threshold setting.
///
/// Falls back to `default` if the value is absent, not a number, not
/// finite, or not positive.
pub fn parse_threshold(raw: Option<&str>, default: f64) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|hours| hours.is_finite() && *hours > 0.0)
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Artifact formats
// ---------------------------------------------------------------------------

/// One heatmap entry: a relay and how often it appeared in recent paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeatmapNode {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub use_count: u64,
}

/// Heatmap artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeatmapData {
    pub threshold_hours: f64,
    pub nodes: Vec<HeatmapNode>,
    /// Always empty; kept for consumers that expect the key.
    pub paths: Vec<serde_json::Value>,
    pub updated: Timestamp,
}

/// One nodemap entry: a contact with a recent advertisement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodemapNode {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub node_type: String,
    pub age_hours: f64,
}

/// Nodemap artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodemapData {
    pub threshold_hours: f64,
    pub nodes: Vec<NodemapNode>,
    pub updated: Timestamp,
}

/// One direct-links node entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectLinkNode {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub node_type: String,
    pub link_count: usize,
}

/// One undirected link between two resolved nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectLink {
    pub from_pubkey: String,
    pub from_name: String,
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_pubkey: String,
    pub to_name: String,
    pub to_lat: f64,
    pub to_lon: f64,
    pub count: u64,
}

/// Direct-links artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectLinksData {
    pub threshold_hours: f64,
    pub nodes: Vec<DirectLinkNode>,
    pub links: Vec<DirectLink>,
    pub updated: Timestamp,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Counts how often each resolved relay appears in hop records whose
/// last message is within the threshold.
///
/// Nodes are keyed by resolved identity, so two prefixes resolving to
/// the same contact share one entry. Output is sorted by `use_count`
/// descending; ties keep first-appearance order.
pub fn build_heatmap(
    hops: &[HopRecord],
    resolver: &impl ResolveNode,
    threshold_hours: f64,
    now: Timestamp,
) -> HeatmapData {
    let threshold_secs = threshold_hours * SECS_PER_HOUR;
    let mut index: BTreeMap<NodeIdentity, usize> = BTreeMap::new();
    let mut nodes: Vec<HeatmapNode> = Vec::new();

    let recent = hops.iter().filter(|hop| {
        hop.last_message_time
            .is_some_and(|t| t.is_within(now, threshold_secs))
    });

    for hop in recent {
        for prefix in &hop.path_nodes {
            let Some(node) = NodeIdentity::new(prefix)
                .ok()
                .and_then(|p| resolver.resolve(&p))
            else {
                continue;
            };

            match index.get(&node.identity) {
                Some(&i) => nodes[i].use_count += 1,
                None => {
                    index.insert(node.identity, nodes.len());
                    nodes.push(HeatmapNode {
                        name: node.name,
                        lat: node.lat,
                        lon: node.lon,
                        use_count: 1,
                    });
                }
            }
        }
    }

    nodes.sort_by(|a, b| b.use_count.cmp(&a.use_count));

    HeatmapData {
        threshold_hours,
        nodes,
        paths: Vec::new(),
        updated: now,
    }
}

/// Lists every contact with an advertisement within the threshold and
/// usable coordinates, in host enumeration order.
pub fn build_nodemap(contacts: &[ContactRecord], threshold_hours: f64, now: Timestamp) -> NodemapData {
    let threshold_secs = threshold_hours * SECS_PER_HOUR;

    let nodes = contacts
        .iter()
        .filter_map(|record| {
            let advert = record.last_advert.filter(|t| t.is_within(now, threshold_secs))?;
            let (lat, lon) = record.coordinates()?;
            Some(NodemapNode {
                name: record.display_name().to_string(),
                lat,
                lon,
                node_type: record.node_type(),
                age_hours: advert.age_secs(now) / SECS_PER_HOUR,
            })
        })
        .collect();

    NodemapData {
        threshold_hours,
        nodes,
        updated: now,
    }
}

/// Projects the link store onto resolved nodes.
///
/// Half-edges outside the threshold or with an unresolvable endpoint
/// are skipped, as are edges whose endpoints resolve to the same node.
/// Links are merged by unordered pair of resolved identities, keeping
/// the highest count. A node's `link_count` is its number of distinct
/// resolved neighbours. Nodes are sorted by `link_count` descending;
/// ties keep first-appearance order.
pub fn build_directlinks(
    links: &LinkStore,
    resolver: &impl ResolveNode,
    threshold_hours: f64,
    now: Timestamp,
) -> DirectLinksData {
    let threshold_secs = threshold_hours * SECS_PER_HOUR;

    let mut node_index: BTreeMap<NodeIdentity, usize> = BTreeMap::new();
    let mut nodes: Vec<(DirectLinkNode, BTreeSet<NodeIdentity>)> = Vec::new();
    let mut link_index: BTreeMap<(NodeIdentity, NodeIdentity), usize> = BTreeMap::new();
    let mut out_links: Vec<DirectLink> = Vec::new();

    for (source, destinations) in links.iter() {
        let Some(from) = resolver.resolve(source) else {
            continue;
        };

        for (destination, edge) in destinations {
            if !edge.last_seen.is_within(now, threshold_secs) {
                continue;
            }

            let Some(to) = resolver.resolve(destination) else {
                continue;
            };

            if from.identity == to.identity {
                continue;
            }

            let slot = match node_index.get(&from.identity) {
                Some(&i) => i,
                None => {
                    node_index.insert(from.identity.clone(), nodes.len());
                    nodes.push((link_node(&from), BTreeSet::new()));
                    nodes.len() - 1
                }
            };
            nodes[slot].1.insert(to.identity.clone());

            let key = if from.identity <= to.identity {
                (from.identity.clone(), to.identity.clone())
            } else {
                (to.identity.clone(), from.identity.clone())
            };

            match link_index.get(&key) {
                Some(&i) => out_links[i].count = out_links[i].count.max(edge.count),
                None => {
                    link_index.insert(key, out_links.len());
                    out_links.push(DirectLink {
                        from_pubkey: from.identity.to_string(),
                        from_name: from.name.clone(),
                        from_lat: from.lat,
                        from_lon: from.lon,
                        to_pubkey: to.identity.to_string(),
                        to_name: to.name,
                        to_lat: to.lat,
                        to_lon: to.lon,
                        count: edge.count,
                    });
                }
            }
        }
    }

    let mut nodes: Vec<DirectLinkNode> = nodes
        .into_iter()
        .map(|(mut node, neighbours)| {
            node.link_count = neighbours.len();
            node
        })
        .collect();
    nodes.sort_by(|a, b| b.link_count.cmp(&a.link_count));

    DirectLinksData {
        threshold_hours,
        nodes,
        links: out_links,
        updated: now,
    }
}

fn link_node(node: &ResolvedNode) -> DirectLinkNode {
    DirectLinkNode {
        name: node.name.clone(),
        lat: node.lat,
        lon: node.lon,
        node_type: node.node_type.clone(),
        link_count: 0,
    }
}

/// All three projections from one host snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct Projections {
    pub heatmap: HeatmapData,
    pub nodemap: NodemapData,
    pub directlinks: DirectLinksData,
}

impl Projections {
    /// Builds every projection against one contact snapshot.
    pub fn build(
        contacts: &[ContactRecord],
        hops: &[HopRecord],
        links: &LinkStore,
        thresholds: &Thresholds,
        now: Timestamp,
    ) -> Self {
        let resolver = SnapshotResolver::new(contacts);
        Self {
            heatmap: build_heatmap(hops, &resolver, thresholds.heatmap_hours, now),
            nodemap: build_nodemap(contacts, thresholds.nodemap_hours, now),
            directlinks: build_directlinks(links, &resolver, thresholds.directlinks_hours, now),
        }
    }

    /// Writes the three artifacts under `root`. Returns the number
    /// written; failures are logged.
    pub fn write_all(&self, root: &Path) -> usize {
        [
            write_artifact(root, HEATMAP_DATA_FILE, &self.heatmap),
            write_artifact(root, NODEMAP_DATA_FILE, &self.nodemap),
            write_artifact(root, DIRECTLINKS_DATA_FILE, &self.directlinks),
        ]
        .into_iter()
        .filter(|written| *written)
        .count()
    }
}

fn write_artifact<T: Serialize>(root: &Path, file: &str, value: &T) -> bool {
    let result = SnapshotFile::save(&root.join(file), value).map_err(|e| {
        MeshPanelError::ExportError {
            reason: format!("{file}: {e}"),
        }
    });

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(%e, "failed to write artifact");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Export cycle
// ---------------------------------------------------------------------------

/// Summary of one export + save cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExportReport {
    /// Cycle timestamp (also the artifacts' `updated` value).
    pub at: Timestamp,
    /// `false` if the contact query failed and artifacts were skipped.
    pub contacts_available: bool,
    pub heatmap_nodes: usize,
    pub nodemap_nodes: usize,
    pub directlinks_nodes: usize,
    pub directlinks_links: usize,
    /// Artifacts written successfully (0..=3).
    pub artifacts_written: usize,
    /// Which snapshot files were saved.
    pub saved: SaveReport,
}

/// Where a node writes its output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    /// Directory for the three projection artifacts.
    pub artifacts: PathBuf,
    /// Directory for the persisted snapshots.
    pub snapshots: PathBuf,
}

impl OutputPaths {
    /// Uses one directory for artifacts and snapshots.
    pub fn single(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            artifacts: root.clone(),
            snapshots: root,
        }
    }
}

/// Runs one export + save cycle.
///
/// `bundle` is a copy of the panel state taken (and pruned) by the
/// event loop. If the contact query fails, artifacts are left
/// untouched but the snapshots are still saved.
pub async fn run_export_cycle(
    host: &HostHandles,
    config: &PanelConfig,
    persistence: &Persistence,
    artifact_root: &Path,
    bundle: SnapshotBundle,
    now: Timestamp,
) -> ExportReport {
    let timeout = config.command_timeout();

    let projections = match host.contacts(timeout).await {
        Ok(contacts) => {
            let hops = host.hop_records(timeout).await.unwrap_or_else(|e| {
                tracing::warn!(%e, "hop query failed, heatmap will be empty");
                Vec::new()
            });
            let thresholds = Thresholds::fetch(host, config).await;
            Some(Projections::build(&contacts, &hops, &bundle.links, &thresholds, now))
        }
        Err(e) => {
            tracing::warn!(%e, "contact query failed, skipping artifacts");
            None
        }
    };

    let mut report = ExportReport {
        at: now,
        contacts_available: projections.is_some(),
        ..ExportReport::default()
    };

    if let Some(p) = &projections {
        report.heatmap_nodes = p.heatmap.nodes.len();
        report.nodemap_nodes = p.nodemap.nodes.len();
        report.directlinks_nodes = p.directlinks.nodes.len();
        report.directlinks_links = p.directlinks.links.len();
    }

    let persistence = persistence.clone();
    let artifact_root = artifact_root.to_path_buf();

    let written = tokio::task::spawn_blocking(move || {
        let artifacts = projections
            .as_ref()
            .map(|p| p.write_all(&artifact_root))
            .unwrap_or(0);
        (artifacts, persistence.save(&bundle))
    })
    .await;

    match written {
        Ok((artifacts, saved)) => {
            report.artifacts_written = artifacts;
            report.saved = saved;
        }
        Err(e) => tracing::error!(%e, "export writer task failed"),
    }

    tracing::debug!(
        heatmap = report.heatmap_nodes,
        nodemap = report.nodemap_nodes,
        links = report.directlinks_links,
        artifacts = report.artifacts_written,
        saved = report.saved.all_saved(),
        "export cycle completed"
    );

    report
}

/// Loads a previously written artifact. Used by consumers and tests.
pub fn load_artifact<T: serde::de::DeserializeOwned>(root: &Path, file: &str) -> Result<Option<T>> {
    SnapshotFile::load(&root.join(file))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
