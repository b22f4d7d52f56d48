//! End-to-end host/field exercises over an in-memory link
//!
//! A real field node runs on its own thread while the host stack
//! (dispatcher, reader, router) runs under tokio, the two joined by
//! the memory duplex. Covers ack matching under concurrent telemetry,
//! the shutdown/wake round trip, and resilience to wire garbage.
//!
//! Node threads are not joined: each test's final shutdown parks its
//! node on the wake line, where it idles harmlessly until the process
//! exits.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;

use biolink_field::ports::testing::{ChannelWakeLine, ManualRtc, ScriptedSensors, WakeTrigger};
use biolink_field::{DataLog, FieldConfig, FieldNode, SensorReadings};
use biolink_host::{
    router, AlertEngine, CommandLog, DispatchError, Dispatcher, Notifier, NotifyError, Router,
};
use biolink_protocol::{AckOutcome, Command, FramedLink, LinkTx, MemoryLink, MemoryTx};

struct RecordingNotifier(Mutex<Vec<String>>);

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct Harness {
    dispatcher: Dispatcher,
    alerts: Arc<Mutex<AlertEngine>>,
    notifier: Arc<RecordingNotifier>,
    wake: WakeTrigger,
    /// Extra transmit handle on the host→field wire, for injecting raw
    /// bytes past the dispatcher.
    raw_tx: MemoryTx,
    _dir: tempfile::TempDir,
}

fn reading(co2_ppm: f32) -> SensorReadings {
    SensorReadings {
        co2_ppm,
        temperature_c: 23.0,
        humidity_pct: 55.0,
        pressure_hpa: 1009.0,
        altitude_m: 5.0,
    }
}

/// Stitch a full field node to a full host stack over memory.
fn harness(co2_sequence: Vec<f32>, cycle_seconds: u32, threshold: f32) -> Harness {
    let (host, field) = MemoryLink::pair();
    let (host_tx, host_rx) = host.split();
    let (field_tx, field_rx) = field.split();
    let raw_tx = host_tx.clone();

    let dir = tempfile::tempdir().unwrap();
    let (wake_line, wake) = ChannelWakeLine::new();

    let data_log_path = dir.path().join("co2_data.csv");
    thread::spawn(move || {
        let mut sensors = ScriptedSensors::new(reading(420.0));
        for ppm in co2_sequence {
            sensors.push_reading(Ok(reading(ppm)));
        }
        let log = DataLog::open(&data_log_path).unwrap();
        let config = FieldConfig::default().with_cycle_seconds(cycle_seconds);
        let mut node = FieldNode::new(
            sensors,
            ManualRtc::new(1_700_000_000, 1),
            wake_line,
            log,
            config,
        )
        .unwrap();
        // Teardown can race the temp dir; a late storage failure here
        // is not what any of these tests assert on.
        let _ = node.run(FramedLink::new(field_rx), field_tx);
    });

    let command_log = CommandLog::open(&dir.path().join("commands_log.csv")).unwrap();
    let dispatcher = Dispatcher::new(Box::new(host_tx), command_log, Duration::from_secs(5));
    let alerts = Arc::new(Mutex::new(AlertEngine::new(threshold)));
    let notifier = Arc::new(RecordingNotifier(Mutex::new(Vec::new())));

    let frames = router::spawn_reader(FramedLink::new(host_rx));
    tokio::spawn(
        Router::new(
            dispatcher.clone(),
            alerts.clone(),
            notifier.clone() as Arc<dyn Notifier>,
        )
        .run(frames),
    );

    Harness {
        dispatcher,
        alerts,
        notifier,
        wake,
        raw_tx,
        _dir: dir,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn commands_are_acked_while_telemetry_flows() {
    // Fast cycle so telemetry is continuously interleaved with acks.
    let h = harness(Vec::new(), 1, 1000.0);

    for _ in 0..5 {
        let ack = h
            .dispatcher
            .issue(Command::Feed { grams: 100.0 })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ack.outcome, AckOutcome::Ok);
    }

    let ack = h
        .dispatcher
        .issue(Command::QueryTime)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(ack.outcome, AckOutcome::OkValue(v) if v >= 1_700_000_000.0));

    h.dispatcher.issue(Command::Shutdown).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_gates_commands_and_wake_restores_service() {
    let h = harness(Vec::new(), 3600, 1000.0);

    assert!(h
        .dispatcher
        .issue(Command::Shutdown)
        .await
        .unwrap()
        .is_none());

    // Locally rejected while asleep, never sent.
    let rejected = h.dispatcher.issue(Command::QueryData).await;
    assert!(matches!(rejected, Err(DispatchError::NodeAsleep)));

    // Only the physical line revives the node; its boot frame clears
    // the gate.
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.wake.pulse();
    wait_until(|| !h.dispatcher.node_asleep()).await;

    let ack = h
        .dispatcher
        .issue(Command::QueryData)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ack.outcome, AckOutcome::Ok);

    // A second pulse while awake is a no-op.
    h.wake.pulse();
    let ack = h
        .dispatcher
        .issue(Command::QueryTime)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(ack.outcome, AckOutcome::OkValue(_)));

    h.dispatcher.issue(Command::Shutdown).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn sustained_recovery_fires_exactly_one_notification() {
    // Arm above 1000 then hold below for three samples; the trailing
    // sub-threshold readings must not fire a second time.
    let h = harness(vec![1200.0, 900.0, 800.0, 700.0, 650.0, 640.0], 1, 1000.0);

    wait_until(|| !h.notifier.0.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    let delivered = h.notifier.0.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].contains("below 1000"));

    assert!((h.alerts.lock().unwrap().threshold() - 1000.0).abs() < f32::EPSILON);

    h.dispatcher.issue(Command::Shutdown).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn wire_garbage_never_produces_a_spurious_ack() {
    let mut h = harness(Vec::new(), 3600, 1000.0);

    // Garbage straight onto the field node's receive path, bypassing
    // the dispatcher entirely.
    h.raw_tx.write_all(b"TEL ts=oops\n").unwrap();
    h.raw_tx.write_all(b"CMD id=99 op=feed\n").unwrap();
    h.raw_tx.write_all(b"\xff\xfe not utf8\n").unwrap();

    // The one real command gets the one real ack; nothing arrived that
    // the dispatcher could not correlate.
    let ack = h
        .dispatcher
        .issue(Command::QueryTime)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(ack.outcome, AckOutcome::OkValue(_)));

    h.dispatcher.issue(Command::Shutdown).await.unwrap();
}
