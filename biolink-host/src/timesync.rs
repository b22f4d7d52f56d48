//! Periodic field RTC synchronization
//!
//! Pushes host wall-clock time to the field node so persisted
//! timestamps stay accurate across the field RTC's drift. Fires once
//! at startup and then on a fixed interval; a failed sync waits for
//! the next tick rather than retrying immediately.

use std::time::Duration;

use biolink_protocol::Command;

use crate::dispatch::{DispatchError, Dispatcher};

/// Interval between sync attempts.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Run the sync loop forever. The first tick fires immediately.
pub async fn run(dispatcher: Dispatcher) {
    let mut ticker = tokio::time::interval(SYNC_INTERVAL);
    loop {
        ticker.tick().await;
        sync_once(&dispatcher).await;
    }
}

/// One sync attempt; skipped while the node is known asleep.
pub async fn sync_once(dispatcher: &Dispatcher) {
    if dispatcher.node_asleep() {
        log::debug!("skipping time sync, field node asleep");
        return;
    }
    let epoch_s = chrono::Utc::now().timestamp().max(0) as u64;
    match dispatcher.issue(Command::SyncTime { epoch_s }).await {
        Ok(_) => log::info!("field RTC synced to {epoch_s}"),
        Err(DispatchError::NodeAsleep) => log::debug!("time sync raced a shutdown, skipped"),
        Err(e) => log::warn!("time sync failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_log::CommandLog;
    use biolink_protocol::{Frame, FramedLink, MemoryLink, MemoryRx};
    use std::time::{Duration, Instant};

    /// Poll until frames arrive or a short deadline passes; a frame's
    /// line and terminator may land as separate reads.
    fn drain_frames(link: &mut FramedLink<MemoryRx>) -> Vec<Frame> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut got = Vec::new();
        while got.is_empty() && Instant::now() < deadline {
            got.extend(link.poll(Duration::from_millis(50)).unwrap());
        }
        got
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_sends_current_epoch_and_respects_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let (host, field) = MemoryLink::pair();
        let (host_tx, _host_rx) = host.split();
        let (_field_tx, field_rx) = field.split();
        let mut field_side = FramedLink::new(field_rx);

        let log = CommandLog::open(&dir.path().join("commands_log.csv")).unwrap();
        let dispatcher = Dispatcher::new(Box::new(host_tx), log, Duration::from_millis(100));

        let before = chrono::Utc::now().timestamp() as u64;
        // The wait times out (nobody acks) but the frame still goes out.
        sync_once(&dispatcher).await;
        let after = chrono::Utc::now().timestamp() as u64;

        let frames = tokio::task::block_in_place(|| drain_frames(&mut field_side));
        match frames.as_slice() {
            [Frame::Command(cmd)] => match cmd.command {
                Command::SyncTime { epoch_s } => {
                    assert!(epoch_s >= before && epoch_s <= after);
                }
                ref other => panic!("expected sync_time, got {other:?}"),
            },
            other => panic!("expected one command frame, got {other:?}"),
        }

        // Nothing is sent while the node is asleep.
        let _ = dispatcher.issue(Command::Shutdown).await;
        let drained = tokio::task::block_in_place(|| drain_frames(&mut field_side));
        assert!(
            matches!(drained.as_slice(), [Frame::Command(cmd)] if cmd.command == Command::Shutdown)
        );
        sync_once(&dispatcher).await;
        let quiet = tokio::task::block_in_place(|| {
            let mut got = Vec::new();
            for _ in 0..4 {
                got.extend(field_side.poll(Duration::from_millis(50)).unwrap());
            }
            got
        });
        assert!(quiet.is_empty());
    }
}
