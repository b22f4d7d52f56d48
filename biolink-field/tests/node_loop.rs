//! Field node loop tests over an in-memory link
//!
//! Drives the complete run loop from the host side of a memory duplex:
//! startup announcement, command/ack ordering, the shutdown → wake cycle,
//! and clean teardown when the host disappears.

use std::thread;
use std::time::{Duration, Instant};

use biolink_field::ports::testing::{ChannelWakeLine, ManualRtc, ScriptedSensors};
use biolink_field::{DataLog, FieldConfig, FieldNode, SensorReadings};
use biolink_protocol::{
    write_frame, AckOutcome, Command, CommandFrame, Event, FramedLink, Frame, MemoryLink, MemoryRx,
};

fn readings() -> SensorReadings {
    SensorReadings {
        co2_ppm: 812.0,
        temperature_c: 24.0,
        humidity_pct: 61.0,
        pressure_hpa: 1008.0,
        altitude_m: 44.0,
    }
}

/// Poll the host side until `want` more frames arrive or time runs out.
fn wait_frames(host: &mut FramedLink<MemoryRx>, want: usize) -> Vec<Frame> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut got = Vec::new();
    while got.len() < want && Instant::now() < deadline {
        got.extend(host.poll(Duration::from_millis(50)).unwrap());
    }
    assert_eq!(got.len(), want, "timed out waiting for frames, got {got:?}");
    got
}

#[test]
fn full_command_sleep_wake_cycle() {
    let (host, field) = MemoryLink::pair();
    let (field_tx, field_rx) = field.split();
    let (mut host_tx, host_rx) = host.split();
    let mut host_framed = FramedLink::new(host_rx);

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("co2_data.csv");
    let (wake, trigger) = ChannelWakeLine::new();

    let node_path = log_path.clone();
    let node_thread = thread::spawn(move || {
        let log = DataLog::open(&node_path).unwrap();
        // Long cycle so only explicit queries produce telemetry.
        let config = FieldConfig::default().with_cycle_seconds(3600);
        let mut node = FieldNode::new(
            ScriptedSensors::new(readings()),
            ManualRtc::new(1_700_000_000, 1),
            wake,
            log,
            config,
        )
        .unwrap();
        node.run(FramedLink::new(field_rx), field_tx).unwrap();
    });

    // Startup announcement.
    assert_eq!(
        wait_frames(&mut host_framed, 1)[0],
        Frame::Event(Event::Boot)
    );

    // A command is acked with its own correlation id.
    write_frame(
        &mut host_tx,
        &Frame::Command(CommandFrame {
            id: 1,
            command: Command::Feed { grams: 250.0 },
        }),
    )
    .unwrap();
    match wait_frames(&mut host_framed, 1)[0] {
        Frame::Ack(ack) => {
            assert_eq!(ack.id, 1);
            assert_eq!(ack.outcome, AckOutcome::Ok);
        }
        ref other => panic!("expected ack, got {other:?}"),
    }

    // Query: the ack must precede the triggered telemetry.
    write_frame(
        &mut host_tx,
        &Frame::Command(CommandFrame {
            id: 2,
            command: Command::QueryData,
        }),
    )
    .unwrap();
    let frames = wait_frames(&mut host_framed, 2);
    assert!(matches!(frames[0], Frame::Ack(ack) if ack.id == 2));
    assert!(matches!(frames[1], Frame::Telemetry(_)));

    // Shutdown is fire-and-forget: no ack, the node parks on the wake
    // line until the out-of-band pulse.
    write_frame(
        &mut host_tx,
        &Frame::Command(CommandFrame {
            id: 3,
            command: Command::Shutdown,
        }),
    )
    .unwrap();
    thread::sleep(Duration::from_millis(300));
    trigger.pulse();

    // Wake is announced and the node answers commands again.
    assert_eq!(
        wait_frames(&mut host_framed, 1)[0],
        Frame::Event(Event::Boot)
    );
    write_frame(
        &mut host_tx,
        &Frame::Command(CommandFrame {
            id: 4,
            command: Command::QueryTime,
        }),
    )
    .unwrap();
    assert!(matches!(
        wait_frames(&mut host_framed, 1)[0],
        Frame::Ack(ack) if ack.id == 4
    ));

    // Host side going away ends the loop cleanly.
    drop(host_tx);
    drop(host_framed);
    node_thread.join().unwrap();

    // One header despite the sleep-cycle close/reopen, rows in time order.
    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(contents.matches("timestamp").count(), 1);
    let timestamps: Vec<&str> = contents
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert!(!timestamps.is_empty());
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);
}

#[test]
fn corrupt_input_produces_no_response() {
    let (host, field) = MemoryLink::pair();
    let (field_tx, field_rx) = field.split();
    let (mut host_tx, host_rx) = host.split();
    let mut host_framed = FramedLink::new(host_rx);

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("co2_data.csv");
    let (wake, _trigger) = ChannelWakeLine::new();

    let node_thread = thread::spawn(move || {
        let log = DataLog::open(&log_path).unwrap();
        let config = FieldConfig::default().with_cycle_seconds(3600);
        let mut node = FieldNode::new(
            ScriptedSensors::new(readings()),
            ManualRtc::new(1_700_000_000, 1),
            wake,
            log,
            config,
        )
        .unwrap();
        node.run(FramedLink::new(field_rx), field_tx).unwrap();
    });

    // Swallow the boot announcement.
    wait_frames(&mut host_framed, 1);

    // Garbage in several flavors: truncated frame, wrong type, noise.
    use biolink_protocol::LinkTx as _;
    host_tx.write_all(b"CMD id=9 op=feed\n").unwrap();
    host_tx.write_all(b"CMD id=banana op=feed val=1\n").unwrap();
    host_tx.write_all(b"complete nonsense\n").unwrap();

    // No spurious ack for any of it; a real command still works.
    write_frame(
        &mut host_tx,
        &Frame::Command(CommandFrame {
            id: 10,
            command: Command::QueryTime,
        }),
    )
    .unwrap();
    let frames = wait_frames(&mut host_framed, 1);
    assert!(matches!(frames[0], Frame::Ack(ack) if ack.id == 10));

    drop(host_tx);
    drop(host_framed);
    node_thread.join().unwrap();
}
