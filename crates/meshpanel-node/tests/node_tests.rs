//! Integration tests for the node lifecycle and event loop.
//!
//! Each test runs a real node against in-memory host doubles and its
//! own temporary output directory. Most tests pin the clock and drive
//! the node through commands; the timer tests run on paused tokio time
//! with a clock that follows it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use meshpanel_node::export::{
    load_artifact, DirectLinksData, HeatmapData, NodemapData, DIRECTLINKS_DATA_FILE,
    HEATMAP_DATA_FILE, NODEMAP_DATA_FILE,
};
use meshpanel_node::{
    Clock, CommandSink, ContactSource, HostHandles, Node, NodeCommand, NodeState, NodeStatus,
    OutputPaths, SettingsSource,
};
use meshpanel_storage::Persistence;
use meshpanel_types::config::PanelConfig;
use meshpanel_types::{
    ContactRecord, HopRecord, MeshPanelError, NodeIdentity, OutboundCommand, RawEvent, Result,
    Timestamp,
};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns a unique temporary directory for each test.
fn temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "meshpanel-node-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ));
    let _ = std::fs::create_dir_all(&dir);
    dir
}

const NOW: f64 = 1_700_000_000.0;
const DAY: f64 = 24.0 * 3600.0;

fn id(s: &str) -> NodeIdentity {
    NodeIdentity::new(s).expect("valid identity")
}

struct FixedClock(Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

/// `NOW` plus the tokio time elapsed since creation.
struct TokioClock(tokio::time::Instant);

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(NOW + self.0.elapsed().as_secs_f64())
    }
}

#[derive(Default)]
struct FakeHost {
    contacts: Mutex<Vec<ContactRecord>>,
    hops: Mutex<Vec<HopRecord>>,
    settings: Mutex<Vec<(String, String)>>,
    sent: Mutex<Vec<OutboundCommand>>,
    /// Greeting messages never complete while set.
    hang_messages: bool,
    /// Contact queries never complete while set.
    hang_contacts: bool,
    contact_queries: AtomicU32,
}

impl FakeHost {
    fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ContactSource for FakeHost {
    async fn contacts(&self) -> Result<Vec<ContactRecord>> {
        self.contact_queries.fetch_add(1, Ordering::SeqCst);
        if self.hang_contacts {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(self.contacts.lock().expect("lock").clone())
    }

    async fn hop_records(&self) -> Result<Vec<HopRecord>> {
        Ok(self.hops.lock().expect("lock").clone())
    }
}

#[async_trait]
impl SettingsSource for FakeHost {
    async fn setting(&self, name: &str) -> Option<String> {
        self.settings
            .lock()
            .expect("lock")
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl CommandSink for FakeHost {
    async fn dispatch(&self, command: &OutboundCommand) -> Result<()> {
        if self.hang_messages && matches!(command, OutboundCommand::SendChannelMessage { .. }) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.sent.lock().expect("lock").push(command.clone());
        Ok(())
    }
}

impl FakeHost {
    fn removals(&self) -> usize {
        self.sent()
            .iter()
            .filter(|c| matches!(c, OutboundCommand::RemoveContact { .. }))
            .count()
    }
}

fn handles(host: &Arc<FakeHost>) -> HostHandles {
    HostHandles::new(host.clone(), host.clone(), host.clone())
}

fn located(pubkey: &str, name: &str, node_type: &str, last_advert: Option<f64>) -> ContactRecord {
    ContactRecord {
        pubkey_prefix: Some(pubkey.into()),
        adv_name: Some(name.into()),
        node_type_str: Some(node_type.into()),
        adv_lat: Some(52.37),
        adv_lon: Some(4.89),
        last_advert: last_advert.map(Timestamp::from_secs),
        ..ContactRecord::default()
    }
}

fn test_config() -> PanelConfig {
    PanelConfig {
        my_name: "TestRepeater".into(),
        cleanup_enabled: false,
        ..PanelConfig::default()
    }
}

async fn started_node(config: PanelConfig, host: &Arc<FakeHost>, root: &PathBuf) -> Node {
    Node::new(config, handles(host), OutputPaths::single(root))
        .await
        .expect("node created")
        .with_clock(Arc::new(FixedClock(Timestamp::from_secs(NOW))))
}

async fn timed_node(config: PanelConfig, host: &Arc<FakeHost>, root: &PathBuf) -> Node {
    Node::new(config, handles(host), OutputPaths::single(root))
        .await
        .expect("node created")
        .with_clock(Arc::new(TokioClock(tokio::time::Instant::now())))
}

fn path_trace(nodes: &[&str]) -> RawEvent {
    RawEvent {
        event_type: "EventType.RX_LOG_DATA".into(),
        payload: json!({ "parsed": { "path_nodes": nodes } }),
    }
}

fn new_contact(pubkey: &str, name: &str, code: u8) -> RawEvent {
    RawEvent {
        event_type: "EventType.NEW_CONTACT".into(),
        payload: json!({ "public_key": pubkey, "adv_name": name, "type": code }),
    }
}

async fn status(commands: &mpsc::Sender<NodeCommand>) -> NodeStatus {
    let (reply, rx) = oneshot::channel();
    commands
        .send(NodeCommand::GetStatus { reply })
        .await
        .expect("node running");
    rx.await.expect("status reply")
}

/// Polls status until `done` holds; events and commands travel on
/// different channels, so ingestion is observed eventually.
async fn wait_for(commands: &mpsc::Sender<NodeCommand>, done: impl Fn(&NodeStatus) -> bool) -> NodeStatus {
    for _ in 0..500 {
        let s = status(commands).await;
        if done(&s) {
            return s;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached: {:?}", status(commands).await);
}

async fn export_now(commands: &mpsc::Sender<NodeCommand>) -> meshpanel_node::ExportReport {
    let (reply, rx) = oneshot::channel();
    commands
        .send(NodeCommand::ExportNow { reply })
        .await
        .expect("node running");
    rx.await.expect("export reply")
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[tokio::test]
async fn lifecycle_transitions_are_checked() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());
    let mut node = started_node(test_config(), &host, &root).await;

    assert_eq!(node.state(), NodeState::Initializing);
    assert!(matches!(node.shutdown(), Err(MeshPanelError::ConfigError { .. })));

    let handle = node.start().expect("first start");
    assert_eq!(node.state(), NodeState::Running);
    assert!(matches!(node.start(), Err(MeshPanelError::ConfigError { .. })));

    node.shutdown().expect("shutdown");
    node.shutdown().expect("repeated shutdown is idempotent");
    assert_eq!(node.state(), NodeState::ShuttingDown);

    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("loop exits")
        .expect("loop task ok");
}

#[tokio::test]
async fn invalid_config_rejected() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());
    let config = PanelConfig {
        export_interval_secs: 0,
        ..test_config()
    };
    let result = Node::new(config, handles(&host), OutputPaths::single(&root)).await;
    assert!(matches!(result, Err(MeshPanelError::ConfigError { .. })));
}

// ===========================================================================
// Ingestion and export
// ===========================================================================

#[tokio::test]
async fn path_traces_flow_to_artifacts_and_snapshots() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());
    *host.contacts.lock().expect("lock") = vec![
        located("aa1111111111", "Alpha", "Repeater", Some(NOW - 3600.0)),
        located("bb2222222222", "Bravo", "Repeater", Some(NOW - 7200.0)),
        located("cc3333333333", "Charlie", "Client", Some(NOW - 30.0 * DAY)),
    ];
    *host.hops.lock().expect("lock") = vec![HopRecord {
        path_nodes: vec!["aa1111111111".into(), "bb2222222222".into()],
        last_message_time: Some(Timestamp::from_secs(NOW - 60.0)),
    }];

    let mut node = started_node(test_config(), &host, &root).await;
    let commands = node.command_sender();
    let events = node.event_sender();
    let handle = node.start().expect("start");

    events
        .send(path_trace(&["aa1111111111", "bb2222222222", "cc3333333333"]))
        .await
        .expect("event accepted");
    let s = wait_for(&commands, |s| s.half_edges == 4).await;
    assert_eq!(s.link_sources, 3);
    assert_eq!(s.state, NodeState::Running);

    let report = export_now(&commands).await;
    assert!(report.contacts_available);
    assert_eq!(report.artifacts_written, 3);
    assert!(report.saved.all_saved());
    assert_eq!(report.at, Timestamp::from_secs(NOW));

    let links: DirectLinksData = load_artifact(&root, DIRECTLINKS_DATA_FILE)
        .expect("readable")
        .expect("written");
    assert_eq!(links.links.len(), 2);
    assert_eq!(links.threshold_hours, 168.0);
    assert_eq!(links.nodes[0].name, "Bravo");
    assert_eq!(links.nodes[0].link_count, 2);

    let nodemap: NodemapData = load_artifact(&root, NODEMAP_DATA_FILE)
        .expect("readable")
        .expect("written");
    let names: Vec<_> = nodemap.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Bravo"]);

    let heatmap: HeatmapData = load_artifact(&root, HEATMAP_DATA_FILE)
        .expect("readable")
        .expect("written");
    assert_eq!(heatmap.nodes.len(), 2);

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");

    let reloaded = Persistence::new(&root).load();
    assert_eq!(reloaded.links.half_edge_count(), 4);
    assert!(reloaded.links.is_symmetric());
}

#[tokio::test]
async fn threshold_setting_overrides_default() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());
    *host.contacts.lock().expect("lock") = vec![
        located("aa11", "Recent", "Client", Some(NOW - 3600.0)),
        located("bb22", "Older", "Client", Some(NOW - 20.0 * 3600.0)),
    ];
    host.settings.lock().expect("lock").push((
        "input_number.meshcore_advert_threshold_hours".into(),
        "24".into(),
    ));

    let mut node = started_node(test_config(), &host, &root).await;
    let commands = node.command_sender();
    let handle = node.start().expect("start");

    let report = export_now(&commands).await;
    assert_eq!(report.nodemap_nodes, 2);

    let nodemap: NodemapData = load_artifact(&root, NODEMAP_DATA_FILE)
        .expect("readable")
        .expect("written");
    assert_eq!(nodemap.threshold_hours, 24.0);

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");
}

// ===========================================================================
// Greeting
// ===========================================================================

#[tokio::test]
async fn new_contact_greeted_once_and_persisted() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());

    let mut node = started_node(test_config(), &host, &root).await;
    let commands = node.command_sender();
    let events = node.event_sender();
    let handle = node.start().expect("start");

    for _ in 0..3 {
        events
            .send(new_contact("ABCDEF0123456789ABCDEF", "Alice", 1))
            .await
            .expect("event accepted");
    }
    events
        .send(new_contact("99887766554433", "Relay", 2))
        .await
        .expect("event accepted");

    wait_for(&commands, |s| s.greeted == 1 && s.jobs_in_flight == 0).await;
    // Let any stray duplicate greeting surface before asserting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = host.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[0],
        OutboundCommand::SendChannelMessage {
            channel: 0,
            text: "Welcome to the mesh Alice! 👋 from TestRepeater".into(),
        }
    );
    assert!(matches!(sent[1], OutboundCommand::CreateNotification { .. }));

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");

    let reloaded = Persistence::new(&root).load();
    assert!(reloaded.greeted.contains(&id("abcdef012345")));
    assert_eq!(reloaded.greeted.len(), 1);
}

#[tokio::test]
async fn unfinished_greeting_rolled_back_at_shutdown() {
    let root = temp_dir();
    let host = Arc::new(FakeHost {
        hang_messages: true,
        ..FakeHost::default()
    });

    let mut node = started_node(test_config(), &host, &root).await;
    let commands = node.command_sender();
    let events = node.event_sender();
    let handle = node.start().expect("start");

    events
        .send(new_contact("abcdef0123456789", "Alice", 0))
        .await
        .expect("event accepted");
    wait_for(&commands, |s| s.greeted == 1 && s.jobs_in_flight == 1).await;

    node.shutdown().expect("shutdown");
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("shutdown does not wait for hung greeting")
        .expect("loop task ok");

    let reloaded = Persistence::new(&root).load();
    assert!(reloaded.greeted.is_empty());
}

#[tokio::test]
async fn greeted_set_survives_restart() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());

    {
        let mut node = started_node(test_config(), &host, &root).await;
        let commands = node.command_sender();
        let events = node.event_sender();
        let handle = node.start().expect("start");
        events
            .send(new_contact("abcdef0123456789", "Alice", 1))
            .await
            .expect("event accepted");
        wait_for(&commands, |s| s.greeted == 1 && s.jobs_in_flight == 0).await;
        commands.send(NodeCommand::Shutdown).await.expect("node running");
        handle.await.expect("loop task ok");
    }

    let mut node = started_node(test_config(), &host, &root).await;
    let commands = node.command_sender();
    let events = node.event_sender();
    let handle = node.start().expect("start");
    events
        .send(new_contact("abcdef0123456789", "Alice", 1))
        .await
        .expect("event accepted");
    // Path trace on the same channel marks that the contact event was handled.
    events.send(path_trace(&["aa", "bb"])).await.expect("event accepted");
    let s = wait_for(&commands, |s| s.half_edges == 2).await;
    assert_eq!(s.greeted, 1);
    assert_eq!(s.jobs_in_flight, 0);

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");

    // One message + one notification from the first run only.
    assert_eq!(host.sent().len(), 2);
}

// ===========================================================================
// Activity and cleanup
// ===========================================================================

#[tokio::test]
async fn cleanup_now_respects_recorded_activity() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());
    *host.contacts.lock().expect("lock") = vec![
        located("aa11", "Quiet", "Client", Some(NOW - 60.0 * DAY)),
        located("bb22", "Talker", "Client", Some(NOW - 60.0 * DAY)),
        located("cc33", "Fresh", "Client", Some(NOW - DAY)),
    ];

    let mut node = started_node(test_config(), &host, &root).await;
    let commands = node.command_sender();
    let handle = node.start().expect("start");

    commands
        .send(NodeCommand::RecordActivity {
            identity: id("BB22"),
            at: Some(Timestamp::from_secs(NOW - 2.0 * DAY)),
        })
        .await
        .expect("node running");

    let (reply, rx) = oneshot::channel();
    commands
        .send(NodeCommand::CleanupNow { reply })
        .await
        .expect("node running");
    let report = rx.await.expect("cleanup reply").expect("cleanup ran");

    assert_eq!(report.examined, 3);
    assert_eq!(report.stale, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(
        host.sent(),
        vec![OutboundCommand::RemoveContact {
            pubkey: "aa11".into()
        }]
    );

    let s = status(&commands).await;
    assert_eq!(s.tracked_activity, 1);

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");

    let reloaded = Persistence::new(&root).load();
    assert_eq!(
        reloaded.last_activity.get(&id("bb22")),
        Some(Timestamp::from_secs(NOW - 2.0 * DAY))
    );
}

#[tokio::test]
async fn activity_without_time_uses_node_clock() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());

    let mut node = started_node(test_config(), &host, &root).await;
    let commands = node.command_sender();
    let handle = node.start().expect("start");

    commands
        .send(NodeCommand::RecordActivity {
            identity: id("dd44"),
            at: None,
        })
        .await
        .expect("node running");
    wait_for(&commands, |s| s.tracked_activity == 1).await;

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");

    let reloaded = Persistence::new(&root).load();
    assert_eq!(
        reloaded.last_activity.get(&id("dd44")),
        Some(Timestamp::from_secs(NOW))
    );
}

// ===========================================================================
// Shutdown
// ===========================================================================

#[tokio::test]
async fn queued_input_is_ingested_before_final_save() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());

    let mut node = started_node(test_config(), &host, &root).await;
    let commands = node.command_sender();
    let events = node.event_sender();
    let handle = node.start().expect("start");

    for i in 0..50 {
        let a = format!("aa{i:04}");
        let b = format!("bb{i:04}");
        events
            .send(path_trace(&[a.as_str(), b.as_str()]))
            .await
            .expect("event accepted");
    }
    commands
        .send(NodeCommand::RecordActivity {
            identity: id("cc33"),
            at: None,
        })
        .await
        .expect("node running");
    let (reply, export_rx) = oneshot::channel();
    commands
        .send(NodeCommand::ExportNow { reply })
        .await
        .expect("node running");

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");

    let report = export_rx.await.expect("export answered");
    assert!(report.saved.all_saved());

    let reloaded = Persistence::new(&root).load();
    assert_eq!(reloaded.links.half_edge_count(), 100);
    assert!(reloaded.links.is_symmetric());
    assert_eq!(
        reloaded.last_activity.get(&id("cc33")),
        Some(Timestamp::from_secs(NOW))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delivered_greeting_survives_shutdown_race() {
    for _ in 0..5 {
        let root = temp_dir();
        let host = Arc::new(FakeHost::default());

        let mut node = started_node(test_config(), &host, &root).await;
        let events = node.event_sender();
        let handle = node.start().expect("start");

        events
            .send(new_contact("abcdef0123456789", "Alice", 1))
            .await
            .expect("event accepted");

        // Shut down as soon as the host has both calls, without giving
        // the loop a command round trip to collect the job first.
        for _ in 0..1000 {
            if host.sent().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(host.sent().len(), 2);

        node.shutdown().expect("shutdown");
        handle.await.expect("loop task ok");

        let reloaded = Persistence::new(&root).load();
        assert!(reloaded.greeted.contains(&id("abcdef012345")));
    }
}

// ===========================================================================
// Timers
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn export_runs_at_startup_and_every_interval() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());
    let config = PanelConfig {
        export_interval_secs: 300,
        ..test_config()
    };

    let mut node = timed_node(config, &host, &root).await;
    let commands = node.command_sender();
    let handle = node.start().expect("start");

    let s = wait_for(&commands, |s| s.last_export.is_some()).await;
    assert_eq!(s.last_export, Some(Timestamp::from_secs(NOW)));

    tokio::time::sleep(Duration::from_secs(290)).await;
    let s = status(&commands).await;
    assert_eq!(s.last_export, Some(Timestamp::from_secs(NOW)));

    tokio::time::sleep(Duration::from_secs(20)).await;
    let s = wait_for(&commands, |s| {
        s.last_export.is_some_and(|t| t.as_secs() >= NOW + 300.0)
    })
    .await;
    assert!(s.last_export.is_some_and(|t| t.as_secs() < NOW + 310.0));

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");
}

#[tokio::test(start_paused = true)]
async fn export_tick_skipped_while_cycle_in_flight() {
    let root = temp_dir();
    let host = Arc::new(FakeHost {
        hang_contacts: true,
        ..FakeHost::default()
    });
    let config = PanelConfig {
        export_interval_secs: 1,
        command_timeout_secs: 10,
        ..test_config()
    };

    let mut node = timed_node(config, &host, &root).await;
    let commands = node.command_sender();
    let handle = node.start().expect("start");

    // Five ticks pass while the startup cycle waits on the host.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let s = status(&commands).await;
    assert_eq!(s.last_export, None);
    assert_eq!(host.contact_queries.load(Ordering::SeqCst), 1);

    // The contact query times out at 10s and the cycle completes.
    tokio::time::sleep(Duration::from_secs(6)).await;
    let s = wait_for(&commands, |s| s.last_export.is_some()).await;
    assert_eq!(s.last_export, Some(Timestamp::from_secs(NOW)));
    wait_for(&commands, |_| host.contact_queries.load(Ordering::SeqCst) >= 2).await;

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");
}

#[tokio::test(start_paused = true)]
async fn cleanup_tick_fires_one_period_after_start() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());
    *host.contacts.lock().expect("lock") =
        vec![located("aa11", "Quiet", "Client", Some(NOW - 60.0 * DAY))];
    let config = PanelConfig {
        cleanup_enabled: true,
        cleanup_interval_secs: 3600,
        ..test_config()
    };

    let mut node = timed_node(config, &host, &root).await;
    let commands = node.command_sender();
    let handle = node.start().expect("start");

    tokio::time::sleep(Duration::from_secs(3590)).await;
    wait_for(&commands, |s| s.jobs_in_flight == 0).await;
    assert_eq!(host.removals(), 0);

    tokio::time::sleep(Duration::from_secs(20)).await;
    wait_for(&commands, |_| host.removals() == 1).await;
    assert_eq!(
        host.sent(),
        vec![OutboundCommand::RemoveContact {
            pubkey: "aa11".into()
        }]
    );

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");
}

#[tokio::test(start_paused = true)]
async fn disabled_cleanup_never_ticks() {
    let root = temp_dir();
    let host = Arc::new(FakeHost::default());
    *host.contacts.lock().expect("lock") =
        vec![located("aa11", "Quiet", "Client", Some(NOW - 60.0 * DAY))];
    let config = PanelConfig {
        cleanup_enabled: false,
        cleanup_interval_secs: 3600,
        ..test_config()
    };

    let mut node = timed_node(config, &host, &root).await;
    let commands = node.command_sender();
    let handle = node.start().expect("start");

    tokio::time::sleep(Duration::from_secs(2 * 3600 + 60)).await;
    wait_for(&commands, |s| {
        s.jobs_in_flight == 0 && s.last_export.is_some_and(|t| t.as_secs() >= NOW + 7200.0)
    })
    .await;
    assert_eq!(host.removals(), 0);

    node.shutdown().expect("shutdown");
    handle.await.expect("loop task ok");
}
