//! The field node state machine
//!
//! One cooperative loop owns everything on the field side: sensor
//! sampling on a fixed cadence, synchronous command execution, the
//! append-only data log, and the SAMPLING ⇄ DEEP_SLEEP power states.
//!
//! Ordering guarantees upheld here:
//! - acknowledgements go out in the order commands were received;
//! - an acknowledgement always precedes any telemetry triggered by the
//!   same command or tick;
//! - deep sleep is a full blocking wait on the physical wake line, with
//!   no timeout and no serial escape hatch.

use std::time::{Duration, Instant};

use biolink_protocol::{
    write_frame, Ack, AckError, AckOutcome, Command, CommandFrame, Event, Frame, FramedLink,
    LinkError, LinkRx, LinkTx, TelemetrySample,
};

use crate::config::FieldConfig;
use crate::error::FieldError;
use crate::ports::{PeripheralError, Rtc, SensorBank, SensorReadings, WakeLine};
use crate::store::DataLog;

/// How long one loop iteration waits on the serial link before checking
/// the sampling timer.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Field node power state. Exactly one instance exists per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Normal operation: sampling, logging, answering commands.
    Sampling,
    /// Shutdown accepted; deep sleep entered on the same loop pass.
    SleepRequested,
    /// All peripherals off, parked on the wake line.
    DeepSleep,
}

/// What executing one command produced.
struct CommandEffect {
    /// Acknowledgement owed to the host. `None` only for shutdown.
    ack: Option<Ack>,
    /// Telemetry to emit after the acknowledgement (data queries).
    telemetry: Option<TelemetrySample>,
}

/// Sensor-and-storage controller for one field site.
pub struct FieldNode<S: SensorBank, R: Rtc, W: WakeLine> {
    sensors: S,
    rtc: R,
    wake: W,
    log: DataLog,
    config: FieldConfig,
    state: PowerState,
    /// Compensation values changed since last applied to the sensors.
    compensation_dirty: bool,
}

impl<S: SensorBank, R: Rtc, W: WakeLine> FieldNode<S, R, W> {
    /// Initialize peripherals and start in [`PowerState::Sampling`].
    pub fn new(
        mut sensors: S,
        rtc: R,
        wake: W,
        log: DataLog,
        config: FieldConfig,
    ) -> Result<Self, FieldError> {
        sensors.init()?;
        Ok(Self {
            sensors,
            rtc,
            wake,
            log,
            config,
            state: PowerState::Sampling,
            compensation_dirty: true,
        })
    }

    /// Current power state.
    pub fn power_state(&self) -> PowerState {
        self.state
    }

    /// Current configuration.
    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    fn apply_compensation(&mut self) -> Result<(), PeripheralError> {
        if self.compensation_dirty {
            self.sensors.set_altitude_compensation(self.config.altitude_m)?;
            self.sensors.set_pressure_reference(self.config.pressure_ref_hpa)?;
            self.sensors
                .set_measurement_interval(self.config.co2_interval_seconds)?;
            self.compensation_dirty = false;
        }
        Ok(())
    }

    fn read_stamped(&mut self) -> Result<(SensorReadings, u64), PeripheralError> {
        let readings = self.sensors.read()?;
        let timestamp = self.rtc.now()?;
        Ok((readings, timestamp))
    }

    /// Sample every sensor, persist the row, and return it for
    /// transmission. Feed/recalibration columns carry the event marker
    /// on distinguished rows.
    pub fn sample_event(
        &mut self,
        feed_amount_g: Option<f32>,
        recalibration_ppm: Option<f32>,
    ) -> Result<TelemetrySample, FieldError> {
        self.apply_compensation()?;
        let (readings, timestamp) = self.read_stamped()?;
        let sample = TelemetrySample {
            timestamp,
            co2_ppm: readings.co2_ppm,
            temperature_c: readings.temperature_c,
            humidity_pct: readings.humidity_pct,
            pressure_hpa: readings.pressure_hpa,
            altitude_m: readings.altitude_m,
            feed_amount_g,
            recalibration_ppm,
        };
        self.log.append(&sample)?;
        Ok(sample)
    }

    /// Plain periodic sample.
    pub fn sample(&mut self) -> Result<TelemetrySample, FieldError> {
        self.sample_event(None, None)
    }

    /// Execute one command synchronously.
    ///
    /// Peripheral trouble becomes an error acknowledgement; only storage
    /// failure propagates, taking the node down.
    fn handle_command(&mut self, frame: CommandFrame) -> Result<CommandEffect, FieldError> {
        let id = frame.id;
        log::info!("command received: {} (id={id})", frame.command.op());

        let outcome = match frame.command {
            Command::Feed { grams } => match self.sample_event(Some(grams), None) {
                Ok(_) => AckOutcome::Ok,
                Err(FieldError::Peripheral(e)) => AckOutcome::Error(ack_error(e)),
                Err(fatal) => return Err(fatal),
            },
            Command::Calibrate { ppm } => {
                match self
                    .sensors
                    .force_recalibration(ppm)
                    .map_err(FieldError::Peripheral)
                    .and_then(|()| self.sample_event(None, Some(ppm)))
                {
                    Ok(_) => AckOutcome::Ok,
                    Err(FieldError::Peripheral(e)) => AckOutcome::Error(ack_error(e)),
                    Err(fatal) => return Err(fatal),
                }
            }
            Command::SetThreshold { ppm } => {
                self.config.threshold_ppm = ppm;
                AckOutcome::Ok
            }
            Command::SetAltitude { meters } => {
                self.config.altitude_m = meters;
                self.compensation_dirty = true;
                AckOutcome::Ok
            }
            Command::SetPressureRef { hpa } => {
                self.config.pressure_ref_hpa = hpa;
                self.compensation_dirty = true;
                AckOutcome::Ok
            }
            Command::SetInterval { seconds } => {
                self.config.co2_interval_seconds = seconds;
                self.compensation_dirty = true;
                AckOutcome::Ok
            }
            Command::SetCycle { seconds } => {
                self.config.cycle_seconds = seconds;
                AckOutcome::Ok
            }
            Command::SyncTime { epoch_s } => match self.rtc.set(epoch_s) {
                Ok(()) => AckOutcome::Ok,
                Err(e) => AckOutcome::Error(ack_error(e)),
            },
            Command::Shutdown => {
                self.state = PowerState::SleepRequested;
                return Ok(CommandEffect {
                    ack: None,
                    telemetry: None,
                });
            }
            Command::QueryData => match self.sample() {
                Ok(sample) => {
                    return Ok(CommandEffect {
                        ack: Some(Ack {
                            id,
                            outcome: AckOutcome::Ok,
                        }),
                        telemetry: Some(sample),
                    })
                }
                Err(FieldError::Peripheral(e)) => AckOutcome::Error(ack_error(e)),
                Err(fatal) => return Err(fatal),
            },
            Command::QueryTime => match self.rtc.now() {
                Ok(epoch_s) => AckOutcome::OkValue(epoch_s as f64),
                Err(e) => AckOutcome::Error(ack_error(e)),
            },
            Command::Reset => match self.reinit_peripherals() {
                Ok(()) => AckOutcome::Ok,
                Err(e) => AckOutcome::Error(ack_error(e)),
            },
        };

        Ok(CommandEffect {
            ack: Some(Ack { id, outcome }),
            telemetry: None,
        })
    }

    fn reinit_peripherals(&mut self) -> Result<(), PeripheralError> {
        self.sensors.init()?;
        self.compensation_dirty = true;
        Ok(())
    }

    /// Flush storage, power everything down, and park on the wake line.
    ///
    /// Returns once a rising edge revives the node: peripherals are
    /// reinitialized, the log reopened, and sampling resumes.
    fn enter_deep_sleep(&mut self) -> Result<(), FieldError> {
        log::info!("entering deep sleep");
        self.log.close()?;
        self.sensors.power_down();
        self.state = PowerState::DeepSleep;

        self.wake.wait_rising_edge();

        log::info!("woken by wake line, reinitializing");
        self.reinit_peripherals()?;
        self.log.reopen()?;
        self.state = PowerState::Sampling;
        Ok(())
    }

    /// Drive the node until the host side of the link goes away.
    ///
    /// Commands are serviced before the sampling timer on every pass so
    /// acknowledgements keep their ordering guarantee.
    pub fn run<RX: LinkRx, TX: LinkTx>(
        &mut self,
        rx: FramedLink<RX>,
        tx: TX,
    ) -> Result<(), FieldError> {
        let mut rx = rx;
        let mut tx = tx;

        if send_or_closed(&mut tx, &Frame::Event(Event::Boot))? {
            return Ok(());
        }
        let mut next_tick = Instant::now() + self.cycle();

        loop {
            let frames = match rx.poll(POLL_INTERVAL) {
                Ok(frames) => frames,
                Err(LinkError::Closed) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            for frame in frames {
                let Frame::Command(cmd) = frame else {
                    log::warn!("ignoring non-command frame from host: {frame:?}");
                    continue;
                };
                let effect = self.handle_command(cmd)?;
                if let Some(ack) = effect.ack {
                    if send_or_closed(&mut tx, &Frame::Ack(ack))? {
                        return Ok(());
                    }
                }
                if let Some(sample) = effect.telemetry {
                    if send_or_closed(&mut tx, &Frame::Telemetry(sample))? {
                        return Ok(());
                    }
                }
            }

            if self.state == PowerState::SleepRequested {
                self.enter_deep_sleep()?;
                if send_or_closed(&mut tx, &Frame::Event(Event::Boot))? {
                    return Ok(());
                }
                next_tick = Instant::now() + self.cycle();
                continue;
            }

            if Instant::now() >= next_tick {
                match self.sample() {
                    Ok(sample) => {
                        if send_or_closed(&mut tx, &Frame::Telemetry(sample))? {
                            return Ok(());
                        }
                    }
                    // The node keeps sampling through sensor trouble.
                    Err(FieldError::Peripheral(e)) => log::error!("sampling tick failed: {e}"),
                    Err(fatal) => return Err(fatal),
                }
                next_tick = Instant::now() + self.cycle();
            }
        }
    }

    fn cycle(&self) -> Duration {
        Duration::from_secs(u64::from(self.config.cycle_seconds))
    }
}

/// Map a peripheral failure onto its wire token.
fn ack_error(e: PeripheralError) -> AckError {
    match e {
        PeripheralError::Sensor(_) => AckError::Sensor,
        PeripheralError::ClockWrite | PeripheralError::ClockRead => AckError::ClockWrite,
    }
}

/// Send a frame; `Ok(true)` means the host went away and the loop
/// should end quietly.
fn send_or_closed(tx: &mut impl LinkTx, frame: &Frame) -> Result<bool, FieldError> {
    match write_frame(tx, frame) {
        Ok(()) => Ok(false),
        Err(LinkError::Closed) => Ok(true),
        Err(e) => Err(e.into()),
    }
}
