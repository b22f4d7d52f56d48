//! Inbound frame routing
//!
//! A dedicated reader thread blocks on the transport and feeds a
//! bounded queue; the async router drains that queue and fans frames
//! out: acks to the dispatcher, telemetry to the alert engine and the
//! operator display, boot notices to the power-state view. A command
//! wait in flight never stalls telemetry ingestion because the two
//! paths share nothing but the queue.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;

use biolink_protocol::{Event, Frame, FramedLink, LinkError, LinkRx, TelemetrySample};

use crate::alert::AlertEngine;
use crate::dispatch::{lock, Dispatcher};
use crate::notify::Notifier;

/// Bounded depth of the inbound frame queue.
const QUEUE_DEPTH: usize = 64;

/// Poll granularity of the reader thread.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Spawn the blocking reader thread over the receive half.
///
/// The thread exits when the link closes or the queue's consumer goes
/// away; either way the returned receiver terminates.
pub fn spawn_reader<R: LinkRx + 'static>(mut link: FramedLink<R>) -> mpsc::Receiver<Frame> {
    let (queue_tx, queue_rx) = mpsc::channel(QUEUE_DEPTH);
    thread::spawn(move || loop {
        match link.poll(READ_TIMEOUT) {
            Ok(frames) => {
                for frame in frames {
                    if queue_tx.blocking_send(frame).is_err() {
                        return;
                    }
                }
            }
            Err(LinkError::Closed) => {
                let stats = link.framer_stats();
                log::info!(
                    "transport closed, reader exiting ({} lines, {} oversize dropped, {} non-UTF-8 dropped)",
                    stats.lines,
                    stats.dropped_oversize,
                    stats.dropped_invalid_utf8,
                );
                return;
            }
            Err(e) => {
                log::error!("transport read failed: {e}");
                return;
            }
        }
    });
    queue_rx
}

/// Fans inbound frames out to their consumers.
pub struct Router {
    dispatcher: Dispatcher,
    alerts: Arc<Mutex<AlertEngine>>,
    notifier: Arc<dyn Notifier>,
}

impl Router {
    /// Router over the shared dispatcher, alert engine, and notifier.
    pub fn new(
        dispatcher: Dispatcher,
        alerts: Arc<Mutex<AlertEngine>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            dispatcher,
            alerts,
            notifier,
        }
    }

    /// Drain the queue until the reader side ends.
    pub async fn run(self, mut frames: mpsc::Receiver<Frame>) {
        while let Some(frame) = frames.recv().await {
            match frame {
                Frame::Ack(ack) => self.dispatcher.complete(ack),
                Frame::Telemetry(sample) => self.on_telemetry(sample).await,
                Frame::Event(Event::Boot) => self.dispatcher.mark_awake(),
                Frame::Command(cmd) => {
                    log::warn!("field node sent a command frame (id {}), ignoring", cmd.id);
                }
            }
        }
        log::info!("frame queue drained, router exiting");
    }

    async fn on_telemetry(&self, sample: TelemetrySample) {
        log::info!(
            "telemetry ts={} co2={:.0}ppm temp={:.1}C hum={:.1}% press={:.1}hPa alt={:.1}m",
            sample.timestamp,
            sample.co2_ppm,
            sample.temperature_c,
            sample.humidity_pct,
            sample.pressure_hpa,
            sample.altitude_m,
        );

        let fired = lock(&self.alerts).observe(sample.co2_ppm);
        if let Some(alert) = fired {
            // Delivery failure spends the event; the next qualifying
            // crossing will try again.
            if let Err(e) = self.notifier.notify(&alert.message()).await {
                log::error!("alert delivery failed: {e}");
            }
        }
    }
}
