//! End-to-end tests for the validation pipeline.
//!
//! Each test starts a full `Coordinator` against simulated drivers (card
//! reader, beacon radio, console and broker) with shortened windows, then
//! observes what the validator did through the `PipelineEvent` stream.

use std::sync::Arc;
use std::time::Duration;

use atlas::coordinator::ChannelLines;
use atlas::core::topics::topic;
use atlas::transport::TransportMessage;
use atlas::{
    Advertisement, AtlasError, AttendanceStatus, Command, CommandOrigin, Coordinator, Drivers, FixedClock,
    IdentityRecord, IdentityStore, InMemoryBroker, MatchPolicy, NodeConfig, OperatingMode, Outcome, PipelineEvent,
    RawToken, RecordLayout, Shutdown, SimulatedRadio, SimulatedReader, TapHandle,
};
use tokio::sync::{broadcast, mpsc};

const STAMP: &str = "2024-05-01 08:00:00";
const EVENT_WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    pipeline: Coordinator,
    events: broadcast::Receiver<PipelineEvent>,
    taps: TapHandle,
    radio: SimulatedRadio,
    console: mpsc::Sender<String>,
}

impl Harness {
    fn start(config: NodeConfig, store: IdentityStore, broker: Option<&Arc<InMemoryBroker>>) -> Self {
        Self::try_start(config, store, broker).expect("pipeline should start")
    }

    fn try_start(
        config: NodeConfig,
        store: IdentityStore,
        broker: Option<&Arc<InMemoryBroker>>,
    ) -> Result<Self, AtlasError> {
        let (reader, taps) = SimulatedReader::new();
        let radio = SimulatedRadio::new();
        let (console, console_tx) = ChannelLines::new(8);

        let mut drivers = Drivers::new(Box::new(reader), Arc::new(radio.clone()))
            .with_console(Box::new(console))
            .with_clock(Arc::new(FixedClock(STAMP.into())));
        if let Some(broker) = broker {
            drivers = drivers.with_transport(Box::new(broker.client()));
        }

        let pipeline = Coordinator::start(config, store, drivers, &Shutdown::new())?;
        let events = pipeline.subscribe();
        Ok(Self { pipeline, events, taps, radio, console: console_tx })
    }

    fn tap(&self, card: &str) {
        assert!(self.taps.tap(RawToken::from_hex(card).expect("hex card")));
    }

    async fn type_line(&self, line: &str) {
        self.console.send(line.to_string()).await.expect("console open");
    }

    async fn next<F>(&mut self, what: &str, pred: F) -> PipelineEvent
    where
        F: Fn(&PipelineEvent) -> bool,
    {
        expect_event(&mut self.events, what, pred).await
    }

    async fn next_outcome(&mut self) -> (Outcome, Option<IdentityRecord>) {
        match self.next("validation", |e| matches!(e, PipelineEvent::Validated { .. })).await {
            PipelineEvent::Validated { outcome, record, .. } => (outcome, record),
            _ => unreachable!(),
        }
    }

    async fn prompt(&mut self, starts_with: &str) {
        let wanted = starts_with.to_string();
        self.next(starts_with, move |e| matches!(e, PipelineEvent::Prompt(p) if p.starts_with(&wanted)))
            .await;
    }

    async fn stored(&self, key: &str) -> Option<IdentityRecord> {
        let store = self.pipeline.context().lock_store().await.expect("store guard");
        store.get(key).expect("readable record")
    }

    async fn stored_len(&self) -> usize {
        self.pipeline.context().lock_store().await.expect("store guard").len().expect("count")
    }
}

async fn expect_event<F>(events: &mut broadcast::Receiver<PipelineEvent>, what: &str, pred: F) -> PipelineEvent
where
    F: Fn(&PipelineEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + EVENT_WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) if pred(&event) => return event,
            Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => panic!("event stream closed waiting for {what}"),
            Err(_) => panic!("timed out waiting for {what}"),
        }
    }
}

async fn expect_message(monitor: &mut broadcast::Receiver<TransportMessage>, topic: &str) -> TransportMessage {
    let deadline = tokio::time::Instant::now() + EVENT_WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, monitor.recv()).await {
            Ok(Ok(message)) if message.topic == topic => return message,
            Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(e)) => panic!("broker monitor failed: {e}"),
            Err(_) => panic!("timed out waiting for a message on {topic}"),
        }
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = tokio::time::Instant::now() + EVENT_WAIT;
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting until {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Short windows so every test finishes in well under a second
fn fast(config: NodeConfig) -> NodeConfig {
    config
        .with_scan_window(Duration::from_millis(60))
        .with_poll_interval(Duration::from_millis(5))
        .with_debounce(Duration::from_millis(20))
        .with_receive_timeout(Duration::from_millis(20))
        .with_deadlines(Duration::from_millis(400), Duration::from_millis(400), Duration::from_millis(200))
        .with_reconnect(Duration::from_millis(50), Duration::from_millis(10))
}

fn store_with(layout: RecordLayout, records: &[IdentityRecord]) -> IdentityStore {
    let mut store = IdentityStore::in_memory(layout);
    for record in records {
        store.put(record).expect("seed record");
    }
    store
}

fn dewi() -> IdentityRecord {
    IdentityRecord::new("04A1B2C3", "2106", "Dewi", "FDA50693")
}

/// Start a distributed pipeline and wait for remote sync to attach to the broker
async fn distributed(store: IdentityStore) -> (Harness, Arc<InMemoryBroker>) {
    let broker = Arc::new(InMemoryBroker::new());
    let harness = Harness::start(fast(NodeConfig::distributed()), store, Some(&broker));
    wait_until("remote sync connects", || broker.subscriber_count() >= 1).await;
    (harness, broker)
}

// =============================================================================
// Validation outcomes
// =============================================================================

#[tokio::test]
async fn accepted_taps_alternate_check_in_and_out() {
    let mut h = Harness::start(fast(NodeConfig::standalone()), store_with(RecordLayout::Combined, &[dewi()]), None);
    h.radio.add(Advertisement::service("fda50693", -60)).await;

    h.tap("04A1B2C3");
    let (first, _) = h.next_outcome().await;
    assert_eq!(
        first,
        Outcome::Accepted { scan_count: 1, status: AttendanceStatus::CheckIn, signal_strength: -60 }
    );

    h.tap("04 a1 b2 c3");
    let (second, record) = h.next_outcome().await;
    assert!(matches!(second, Outcome::Accepted { scan_count: 2, status: AttendanceStatus::CheckOut, .. }));
    assert_eq!(record.expect("record").owner_name, "Dewi");
    assert_eq!(h.stored("04A1B2C3").await.expect("record").scan_count, 2);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn missing_beacon_is_fraud_and_leaves_store_untouched() {
    let seeded = dewi().with_scan_count(4);
    let mut h = Harness::start(fast(NodeConfig::standalone()), store_with(RecordLayout::Combined, &[seeded.clone()]), None);

    h.tap("04A1B2C3");
    let (outcome, record) = h.next_outcome().await;
    assert_eq!(outcome, Outcome::RejectedFraud);
    assert_eq!(record, Some(seeded.clone()));
    assert_eq!(h.stored("04A1B2C3").await, Some(seeded));
    assert_eq!(h.radio.scans(), 1);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn beacon_below_threshold_is_fraud() {
    let mut h = Harness::start(fast(NodeConfig::standalone()), store_with(RecordLayout::Combined, &[dewi()]), None);
    // standalone threshold is -75 dBm
    h.radio.add(Advertisement::service("FDA50693", -80)).await;

    h.tap("04A1B2C3");
    assert_eq!(h.next_outcome().await.0, Outcome::RejectedFraud);
    assert_eq!(h.stored("04A1B2C3").await.expect("record").scan_count, 0);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn unregistered_card_never_starts_a_scan() {
    let mut h = Harness::start(fast(NodeConfig::standalone()), store_with(RecordLayout::Combined, &[dewi()]), None);
    h.radio.add(Advertisement::service("FDA50693", -40)).await;

    h.tap("DEADBEEF");
    let (outcome, record) = h.next_outcome().await;
    assert_eq!(outcome, Outcome::RejectedUnregistered);
    assert!(record.is_none());
    assert_eq!(h.radio.scans(), 0);
    assert_eq!(h.stored_len().await, 1);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn label_fallback_depends_on_match_policy() {
    let record = IdentityRecord::new("04A1B2C3", "2106", "Dewi", "FDA50693");

    let mut lenient = Harness::start(
        fast(NodeConfig::standalone()),
        store_with(RecordLayout::Combined, &[record.clone()]),
        None,
    );
    lenient.radio.add(Advertisement::service("ATLAS-2106", -50)).await;
    lenient.tap("04A1B2C3");
    assert!(lenient.next_outcome().await.0.is_accepted());
    lenient.pipeline.shutdown().await;

    let mut strict = Harness::start(
        fast(NodeConfig::standalone()).with_match_policy(MatchPolicy::Strict),
        store_with(RecordLayout::Combined, &[record]),
        None,
    );
    strict.radio.add(Advertisement::service("ATLAS-2106", -50)).await;
    strict.tap("04A1B2C3");
    assert_eq!(strict.next_outcome().await.0, Outcome::RejectedFraud);
    strict.pipeline.shutdown().await;
}

#[tokio::test]
async fn passive_scanning_is_configurable() {
    let mut h = Harness::start(
        fast(NodeConfig::standalone()).with_active_scan(false),
        store_with(RecordLayout::Combined, &[dewi()]),
        None,
    );
    h.radio.add(Advertisement::service("FDA50693", -60)).await;

    h.tap("04A1B2C3");
    assert!(h.next_outcome().await.0.is_accepted());
    assert_eq!(h.radio.scans(), 1);
    assert_eq!(h.radio.passive_scans(), 1);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn busy_store_guard_skips_the_token() {
    let mut h = Harness::start(
        fast(NodeConfig::standalone()).with_store_guard_timeout(Duration::from_millis(50)),
        store_with(RecordLayout::Combined, &[dewi()]),
        None,
    );

    let ctx = h.pipeline.context().clone();
    let held = ctx.lock_store().await.expect("store guard");
    h.tap("04A1B2C3");
    let skipped = h.next("skip", |e| matches!(e, PipelineEvent::Skipped { .. })).await;
    assert!(matches!(skipped, PipelineEvent::Skipped { reason } if reason.contains("store")));
    drop(held);

    assert_eq!(h.stored("04A1B2C3").await.expect("record").scan_count, 0);
    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn queued_command_runs_before_queued_token() {
    let mut h = Harness::start(
        fast(NodeConfig::standalone()).with_store_guard_timeout(Duration::from_secs(2)),
        store_with(RecordLayout::Combined, &[dewi()]),
        None,
    );

    // first token blocks the validator on the guard while the rest queue up
    let ctx = h.pipeline.context().clone();
    let held = ctx.lock_store().await.expect("store guard");
    h.tap("04A1B2C3");
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.tap("DEADBEEF");
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.pipeline.submit(Command::SetMode(OperatingMode::RegisterForward)).await.expect("submit");
    drop(held);

    let first = h.next("first validation", |e| matches!(e, PipelineEvent::Validated { .. })).await;
    assert!(matches!(first, PipelineEvent::Validated { ref key, .. } if key == "04A1B2C3"));

    let relevant = |e: &PipelineEvent| {
        matches!(e, PipelineEvent::ModeChanged(_) | PipelineEvent::Forwarded { .. } | PipelineEvent::Validated { .. })
    };
    assert_eq!(h.next("mode change", relevant).await, PipelineEvent::ModeChanged(OperatingMode::RegisterForward));
    assert_eq!(
        h.next("forward", relevant).await,
        PipelineEvent::Forwarded { key: "DEADBEEF".into(), delivered: false }
    );
    assert_eq!(h.radio.scans(), 1);

    h.pipeline.shutdown().await;
}

// =============================================================================
// Console commands
// =============================================================================

#[tokio::test]
async fn interactive_registration_collects_card_and_details() {
    let mut h = Harness::start(fast(NodeConfig::standalone()), IdentityStore::in_memory(RecordLayout::Combined), None);

    h.type_line("register").await;
    h.prompt("Tap the card").await;
    h.tap("04A1B2C3");
    h.prompt("Label for card 04 A1 B2 C3").await;
    h.type_line("2106").await;
    h.prompt("Owner name").await;
    h.type_line("Dewi").await;
    h.prompt("Beacon identifier").await;
    h.type_line("FDA50693").await;

    let registered = h.next("registration", |e| matches!(e, PipelineEvent::Registered { .. })).await;
    let PipelineEvent::Registered { record, origin } = registered else { unreachable!() };
    assert_eq!(origin, CommandOrigin::Console);
    assert_eq!(record, dewi());
    assert_eq!(h.stored("04A1B2C3").await, Some(dewi()));

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn registration_is_abandoned_without_a_card() {
    let mut h = Harness::start(fast(NodeConfig::standalone()), IdentityStore::in_memory(RecordLayout::Combined), None);

    h.pipeline.submit(Command::Register).await.expect("submit");
    let abandoned = h.next("abandon", |e| matches!(e, PipelineEvent::RegistrationAbandoned { .. })).await;
    assert!(matches!(abandoned, PipelineEvent::RegistrationAbandoned { reason } if reason.contains("no card")));
    assert_eq!(h.stored_len().await, 0);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn registration_requires_a_label() {
    let mut h = Harness::start(fast(NodeConfig::standalone()), IdentityStore::in_memory(RecordLayout::Combined), None);

    h.type_line("REGISTER").await;
    h.prompt("Tap the card").await;
    h.tap("04A1B2C3");
    h.prompt("Label for card").await;
    assert!(h.pipeline.answer("   "));

    let abandoned = h.next("abandon", |e| matches!(e, PipelineEvent::RegistrationAbandoned { .. })).await;
    assert!(matches!(abandoned, PipelineEvent::RegistrationAbandoned { reason } if reason.contains("label")));
    assert_eq!(h.stored_len().await, 0);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn registration_refuses_separator_in_owner_name() {
    let mut h = Harness::start(fast(NodeConfig::standalone()), IdentityStore::in_memory(RecordLayout::Combined), None);

    h.type_line("register").await;
    h.prompt("Tap the card").await;
    h.tap("04A1B2C3");
    h.prompt("Label for card").await;
    h.type_line("2106").await;
    h.prompt("Owner name").await;
    h.type_line("Dewi|Sari").await;
    h.prompt("Beacon identifier").await;
    h.type_line("FDA50693").await;

    let abandoned = h.next("abandon", |e| matches!(e, PipelineEvent::RegistrationAbandoned { .. })).await;
    assert!(matches!(abandoned, PipelineEvent::RegistrationAbandoned { reason } if reason.contains("owner name")));
    assert_eq!(h.stored_len().await, 0);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn clear_needs_confirmation() {
    let mut h = Harness::start(fast(NodeConfig::standalone()), store_with(RecordLayout::Combined, &[dewi()]), None);

    h.type_line("CLEAR").await;
    h.prompt("Erase every record").await;
    h.type_line("no").await;
    h.next("cancel", |e| matches!(e, PipelineEvent::ClearCancelled)).await;
    assert_eq!(h.stored_len().await, 1);

    // no answer before the deadline cancels too
    h.type_line("CLEAR").await;
    h.prompt("Erase every record").await;
    h.next("cancel", |e| matches!(e, PipelineEvent::ClearCancelled)).await;
    assert_eq!(h.stored_len().await, 1);

    h.type_line("CLEAR").await;
    h.prompt("Erase every record").await;
    h.type_line("yes").await;
    let cleared = h.next("clear", |e| matches!(e, PipelineEvent::Cleared { .. })).await;
    assert_eq!(cleared, PipelineEvent::Cleared { origin: CommandOrigin::Console });
    assert_eq!(h.stored_len().await, 0);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn list_renders_the_registration_table() {
    let second = IdentityRecord::new("0A0B0C0D", "2107", "Raka", "FDA50694").with_scan_count(3);
    let mut h = Harness::start(
        fast(NodeConfig::standalone()),
        store_with(RecordLayout::Combined, &[dewi(), second]),
        None,
    );

    h.type_line("table").await;
    let listing = h.next("listing", |e| matches!(e, PipelineEvent::Listing { .. })).await;
    let PipelineEvent::Listing { table, total } = listing else { unreachable!() };
    assert_eq!(total, 2);
    assert!(table.contains("04 A1 B2 C3"));
    assert!(table.contains("Raka"));

    h.pipeline.shutdown().await;
}

// =============================================================================
// Distributed variant
// =============================================================================

#[tokio::test]
async fn remote_enrollment_then_attendance_is_published() {
    let (mut h, broker) = distributed(IdentityStore::in_memory(RecordLayout::Split)).await;
    let mut monitor = broker.monitor();

    broker.publish("atlas/register", "04 a1 b2 c3|2106|BEACON-X");
    let registered = h.next("enrollment", |e| matches!(e, PipelineEvent::Registered { .. })).await;
    assert!(matches!(registered, PipelineEvent::Registered { origin: CommandOrigin::Remote, .. }));

    // distributed threshold is -100 dBm and matching is strict
    h.radio.add(Advertisement::service("beacon-x", -90)).await;
    h.tap("04A1B2C3");
    assert!(h.next_outcome().await.0.is_accepted());

    let attendance = expect_message(&mut monitor, "atlas/attendance").await;
    assert_eq!(attendance.payload, format!("04 A1 B2 C3|2106|-90|1|{STAMP}|1|CHECK_IN"));

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn replacement_card_enrollment_keeps_the_label_count() {
    let lost = IdentityRecord::new("0A0B0C0D", "2106", "", "BEACON-X").with_scan_count(3);
    let (mut h, broker) = distributed(store_with(RecordLayout::Split, &[lost])).await;

    broker.publish("atlas/register", "04A1B2C3|2106|BEACON-X");
    let registered = h.next("enrollment", |e| matches!(e, PipelineEvent::Registered { .. })).await;
    let PipelineEvent::Registered { record, .. } = registered else { unreachable!() };
    assert_eq!(record.scan_count, 3);
    assert_eq!(h.stored("0A0B0C0D").await.expect("record").scan_count, 3);
    assert_eq!(h.stored("04A1B2C3").await.expect("record").scan_count, 3);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn rejections_are_published_with_status() {
    let (mut h, broker) = distributed(IdentityStore::in_memory(RecordLayout::Split)).await;
    let mut monitor = broker.monitor();

    h.tap("DEADBEEF");
    assert_eq!(h.next_outcome().await.0, Outcome::RejectedUnregistered);
    let attendance = expect_message(&mut monitor, "atlas/attendance").await;
    assert_eq!(attendance.payload, format!("DE AD BE EF|Unknown|0|0|{STAMP}|0|UNREGISTERED"));

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn register_mode_forwards_cards_without_validating() {
    let seeded = IdentityRecord::new("04A1B2C3", "2106", "", "BEACON-X").with_scan_count(5);
    let (mut h, broker) = distributed(store_with(RecordLayout::Split, &[seeded.clone()])).await;
    let mut monitor = broker.monitor();

    broker.publish("atlas/mode", "register");
    h.next("mode change", |e| matches!(e, PipelineEvent::ModeChanged(OperatingMode::RegisterForward))).await;
    assert_eq!(h.pipeline.mode(), OperatingMode::RegisterForward);

    h.tap("04A1B2C3");
    let forwarded = h.next("forward", |e| matches!(e, PipelineEvent::Forwarded { .. })).await;
    assert_eq!(forwarded, PipelineEvent::Forwarded { key: "04A1B2C3".into(), delivered: true });
    assert_eq!(expect_message(&mut monitor, &format!("atlas/{}", topic::CARD)).await.payload, "04 A1 B2 C3");
    assert_eq!(h.radio.scans(), 0);
    assert_eq!(h.stored("04A1B2C3").await, Some(seeded));

    broker.publish("atlas/mode", "normal");
    h.next("mode change", |e| matches!(e, PipelineEvent::ModeChanged(OperatingMode::Normal))).await;

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn remote_clear_all_needs_no_confirmation() {
    let seeded = IdentityRecord::new("04A1B2C3", "2106", "", "BEACON-X");
    let (mut h, broker) = distributed(store_with(RecordLayout::Split, &[seeded])).await;

    broker.publish("atlas/command", "reboot");
    broker.publish("atlas/command", "clear_all");
    let cleared = h.next("clear", |e| matches!(e, PipelineEvent::Cleared { .. })).await;
    assert_eq!(cleared, PipelineEvent::Cleared { origin: CommandOrigin::Remote });
    assert_eq!(h.stored_len().await, 0);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn broker_outage_skips_publishes_but_keeps_validating() {
    let seeded = IdentityRecord::new("04A1B2C3", "2106", "", "BEACON-X");
    let (mut h, broker) = distributed(store_with(RecordLayout::Split, &[seeded])).await;
    h.radio.add(Advertisement::service("BEACON-X", -70)).await;

    broker.set_online(false);
    h.tap("04A1B2C3");
    assert!(h.next_outcome().await.0.is_accepted());
    assert_eq!(h.stored("04A1B2C3").await.expect("record").scan_count, 1);
    assert!(h.pipeline.stats().publishes_skipped >= 1);

    // back online: remote sync reconnects and resubscribes after its back-off
    broker.set_online(true);
    let deadline = tokio::time::Instant::now() + EVENT_WAIT;
    loop {
        broker.publish("atlas/mode", "register");
        let changed = tokio::time::timeout(Duration::from_millis(100), async {
            expect_event(&mut h.events, "mode change", |e| {
                matches!(e, PipelineEvent::ModeChanged(OperatingMode::RegisterForward))
            })
            .await
        })
        .await;
        if changed.is_ok() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "remote sync never reconnected");
    }

    h.pipeline.shutdown().await;
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn full_token_channel_drops_newest_events() {
    let mut h = Harness::start(
        fast(NodeConfig::standalone())
            .with_capacities(1, 1)
            .with_store_guard_timeout(Duration::from_secs(2)),
        IdentityStore::in_memory(RecordLayout::Combined),
        None,
    );

    // validator takes the first card and blocks on the guard, the second
    // fills the channel, the third waits out the enqueue bound and is dropped
    let ctx = h.pipeline.context().clone();
    let held = ctx.lock_store().await.expect("store guard");
    h.tap("01010101");
    h.tap("02020202");
    h.tap("03030303");
    wait_until("a token is dropped", || h.pipeline.stats().tokens_dropped >= 1).await;
    drop(held);

    h.next_outcome().await;
    h.next_outcome().await;
    assert_eq!(h.pipeline.stats().tokens_dropped, 1);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn distributed_without_transport_fails_startup() {
    let result = Harness::try_start(
        fast(NodeConfig::distributed()),
        IdentityStore::in_memory(RecordLayout::Split),
        None,
    );
    let err = result.err().expect("startup should fail");
    assert!(err.is_fatal());
    assert!(matches!(err, AtlasError::Startup(_)));
}

#[tokio::test]
async fn invalid_config_fails_startup() {
    let result = Harness::try_start(
        fast(NodeConfig::standalone()).with_capacities(0, 5),
        IdentityStore::in_memory(RecordLayout::Combined),
        None,
    );
    assert!(matches!(result.err(), Some(AtlasError::Startup(_))));
}

#[tokio::test]
async fn shutdown_stops_every_worker() {
    let (h, broker) = distributed(IdentityStore::in_memory(RecordLayout::Split)).await;
    tokio::time::timeout(Duration::from_secs(2), h.pipeline.shutdown())
        .await
        .expect("shutdown should finish promptly");

    // remote sync dropped its client
    wait_until("broker is released", || broker.subscriber_count() == 0).await;
    assert!(!h.taps.tap(RawToken::new(vec![1, 2, 3, 4])));
}
