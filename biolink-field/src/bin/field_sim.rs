//! Field node simulator
//!
//! Runs the full field state machine against synthetic peripherals,
//! speaking the wire protocol over stdin/stdout. Useful for exercising a
//! host without hardware: pipe it to the host binary, or drive it by
//! hand and watch the frames. Deep sleep is simulated by parking until a
//! wake marker file appears.

use std::fs;
use std::io::{self, Read as _, Write as _};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use log::info;

use biolink_field::{
    DataLog, FieldConfig, FieldNode, PeripheralError, Rtc, SensorBank, SensorReadings, WakeLine,
};
use biolink_protocol::{FramedLink, LinkError, LinkRx, LinkTx, Timestamp};

#[derive(Parser, Debug)]
#[command(name = "field-sim", about = "Simulated field node over stdin/stdout")]
struct Args {
    /// Path of the telemetry CSV log.
    #[arg(long, default_value = "co2_data.csv")]
    data_log: PathBuf,

    /// Sampling cycle length in seconds.
    #[arg(long, default_value_t = 900)]
    cycle: u32,

    /// Site altitude in meters, for CO2 compensation.
    #[arg(long, default_value_t = 0.0)]
    altitude: f32,

    /// Sea-level pressure reference in hPa.
    #[arg(long, default_value_t = 1013.25)]
    pressure_ref: f32,

    /// File whose appearance simulates a rising edge on the wake line.
    #[arg(long, default_value = "/tmp/biolink-wake")]
    wake_file: PathBuf,
}

/// Stdout as the transmit half of the link.
struct StdoutTx(io::Stdout);

impl LinkTx for StdoutTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut handle = self.0.lock();
        handle.write_all(bytes)?;
        handle.flush()?;
        Ok(())
    }
}

/// Stdin pumped through a channel so reads can time out.
struct StdinRx {
    chunks: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl StdinRx {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; 512];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self {
            chunks: rx,
            pending: Vec::new(),
        }
    }
}

impl LinkRx for StdinRx {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        if self.pending.is_empty() {
            match self.chunks.recv_timeout(timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(mpsc::RecvTimeoutError::Timeout) => return Ok(0),
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(LinkError::Closed),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Sensor bank producing a plausible drifting signal.
///
/// A small linear-congruential generator stands in for measurement
/// noise so runs are repeatable.
struct SimulatedSensors {
    lcg: u32,
    co2_base: f32,
    altitude_m: f32,
    pressure_ref_hpa: f32,
}

impl SimulatedSensors {
    fn new() -> Self {
        Self {
            lcg: 0x1234_5678,
            co2_base: 650.0,
            altitude_m: 0.0,
            pressure_ref_hpa: 1013.25,
        }
    }

    /// Uniform-ish value in [-1, 1).
    fn noise(&mut self) -> f32 {
        self.lcg = self.lcg.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.lcg >> 8) as f32 / (1u32 << 23) as f32 - 1.0
    }
}

impl SensorBank for SimulatedSensors {
    fn init(&mut self) -> Result<(), PeripheralError> {
        info!("simulated sensors online");
        Ok(())
    }

    fn read(&mut self) -> Result<SensorReadings, PeripheralError> {
        self.co2_base = (self.co2_base + self.noise() * 15.0).clamp(400.0, 5000.0);
        Ok(SensorReadings {
            co2_ppm: self.co2_base,
            temperature_c: 23.5 + self.noise() * 0.4,
            humidity_pct: 58.0 + self.noise() * 2.0,
            pressure_hpa: self.pressure_ref_hpa - 1.5 + self.noise() * 0.3,
            altitude_m: self.altitude_m + self.noise() * 0.5,
        })
    }

    fn force_recalibration(&mut self, ppm: f32) -> Result<(), PeripheralError> {
        self.co2_base = ppm;
        Ok(())
    }

    fn set_altitude_compensation(&mut self, meters: f32) -> Result<(), PeripheralError> {
        self.altitude_m = meters;
        Ok(())
    }

    fn set_pressure_reference(&mut self, hpa: f32) -> Result<(), PeripheralError> {
        self.pressure_ref_hpa = hpa;
        Ok(())
    }

    fn set_measurement_interval(&mut self, _seconds: u32) -> Result<(), PeripheralError> {
        Ok(())
    }

    fn power_down(&mut self) {
        info!("simulated sensors powered down");
    }
}

/// System clock plus a settable offset, mimicking a writable RTC.
struct SystemRtc {
    offset_s: i64,
}

impl SystemRtc {
    fn system_now() -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl Rtc for SystemRtc {
    fn now(&mut self) -> Result<Timestamp, PeripheralError> {
        Ok(Self::system_now().saturating_add_signed(self.offset_s))
    }

    fn set(&mut self, epoch_s: Timestamp) -> Result<(), PeripheralError> {
        self.offset_s = epoch_s as i64 - Self::system_now() as i64;
        Ok(())
    }
}

/// Wake line that fires when the marker file appears.
struct MarkerFileWake {
    path: PathBuf,
}

impl WakeLine for MarkerFileWake {
    fn wait_rising_edge(&mut self) {
        info!("deep sleep; create {} to wake", self.path.display());
        loop {
            if self.path.exists() {
                let _ = fs::remove_file(&self.path);
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // Stale marker from a previous run must not wake us instantly.
    let _ = fs::remove_file(&args.wake_file);

    let log = DataLog::open(&args.data_log)
        .with_context(|| format!("opening data log {}", args.data_log.display()))?;
    let config = FieldConfig::default()
        .with_cycle_seconds(args.cycle)
        .with_altitude_m(args.altitude)
        .with_pressure_ref_hpa(args.pressure_ref);

    let mut node = FieldNode::new(
        SimulatedSensors::new(),
        SystemRtc { offset_s: 0 },
        MarkerFileWake {
            path: args.wake_file,
        },
        log,
        config,
    )
    .context("starting field node")?;

    info!(
        "field simulator up, logging to {}, cycle {}s",
        args.data_log.display(),
        args.cycle
    );
    node.run(FramedLink::new(StdinRx::spawn()), StdoutTx(io::stdout()))
        .context("field node loop")?;
    info!("link closed, exiting");
    Ok(())
}
