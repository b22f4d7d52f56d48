//! Hardware seams for the field node
//!
//! The state machine never touches hardware directly; it goes through
//! these traits. Deployment code supplies I2C/GPIO-backed adapters, the
//! simulator supplies synthetic ones, and tests supply the doubles in
//! [`testing`] to drive the SAMPLING ⇄ DEEP_SLEEP transitions
//! deterministically without real hardware.

use thiserror::Error;

use biolink_protocol::Timestamp;

/// Peripheral access failures.
///
/// Reported to the host via error acknowledgements; never fatal to the
/// sampling loop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralError {
    /// Sensor bus access failed.
    #[error("sensor access failed: {0}")]
    Sensor(&'static str),

    /// RTC peripheral did not accept a write.
    #[error("RTC write failed")]
    ClockWrite,

    /// RTC peripheral did not answer a read.
    #[error("RTC read failed")]
    ClockRead,
}

/// One synchronous sweep of every environmental sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReadings {
    /// CO2 concentration in ppm.
    pub co2_ppm: f32,
    /// Air temperature in °C.
    pub temperature_c: f32,
    /// Relative humidity in %.
    pub humidity_pct: f32,
    /// Ambient pressure in hPa.
    pub pressure_hpa: f32,
    /// Barometric altitude in m.
    pub altitude_m: f32,
}

/// The field node's sensor complement as a single unit.
///
/// Sampling, recalibration, and compensation updates are strictly
/// sequential — there is no concurrent bus access on the field node.
pub trait SensorBank {
    /// Bring every sensor out of reset. Called at startup and after
    /// each deep-sleep wake.
    fn init(&mut self) -> Result<(), PeripheralError>;

    /// Read all sensors in one sweep.
    fn read(&mut self) -> Result<SensorReadings, PeripheralError>;

    /// Rewrite the CO2 sensor's forced recalibration reference.
    fn force_recalibration(&mut self, ppm: f32) -> Result<(), PeripheralError>;

    /// Update altitude compensation on the CO2 sensor.
    fn set_altitude_compensation(&mut self, meters: f32) -> Result<(), PeripheralError>;

    /// Update the barometer's sea-level pressure reference.
    fn set_pressure_reference(&mut self, hpa: f32) -> Result<(), PeripheralError>;

    /// Update the CO2 sensor's internal measurement interval.
    fn set_measurement_interval(&mut self, seconds: u32) -> Result<(), PeripheralError>;

    /// Drop every sensor into its lowest-power state before deep sleep.
    fn power_down(&mut self);
}

/// Battery-backed real-time clock.
pub trait Rtc {
    /// Current time as seconds since the Unix epoch.
    fn now(&mut self) -> Result<Timestamp, PeripheralError>;

    /// Overwrite the clock, typically from a host time sync.
    fn set(&mut self, epoch_s: Timestamp) -> Result<(), PeripheralError>;
}

/// The physical wake line, sensed as an interrupt.
///
/// This is the only channel capable of reviving the node from deep
/// sleep; the serial interface is unpowered in that state.
pub trait WakeLine {
    /// Block until a rising edge is observed.
    fn wait_rising_edge(&mut self);
}

/// Test doubles for the hardware seams.
pub mod testing {
    use std::sync::mpsc;

    use super::*;

    /// Sensor bank returning a programmable sequence of readings and
    /// recording every configuration call.
    pub struct ScriptedSensors {
        readings: std::collections::VecDeque<Result<SensorReadings, PeripheralError>>,
        fallback: SensorReadings,
        /// Number of `init` calls observed.
        pub init_calls: u32,
        /// Number of `power_down` calls observed.
        pub power_down_calls: u32,
        /// Recalibration references received, in order.
        pub recalibrations: Vec<f32>,
        /// Altitude compensations received, in order.
        pub altitudes: Vec<f32>,
        /// Pressure references received, in order.
        pub pressure_refs: Vec<f32>,
        /// Measurement intervals received, in order.
        pub intervals: Vec<u32>,
    }

    impl ScriptedSensors {
        /// Double that always returns `fallback` once the script runs dry.
        pub fn new(fallback: SensorReadings) -> Self {
            Self {
                readings: std::collections::VecDeque::new(),
                fallback,
                init_calls: 0,
                power_down_calls: 0,
                recalibrations: Vec::new(),
                altitudes: Vec::new(),
                pressure_refs: Vec::new(),
                intervals: Vec::new(),
            }
        }

        /// Queue one scripted read result.
        pub fn push_reading(&mut self, reading: Result<SensorReadings, PeripheralError>) {
            self.readings.push_back(reading);
        }
    }

    impl SensorBank for ScriptedSensors {
        fn init(&mut self) -> Result<(), PeripheralError> {
            self.init_calls += 1;
            Ok(())
        }

        fn read(&mut self) -> Result<SensorReadings, PeripheralError> {
            self.readings.pop_front().unwrap_or(Ok(self.fallback))
        }

        fn force_recalibration(&mut self, ppm: f32) -> Result<(), PeripheralError> {
            self.recalibrations.push(ppm);
            Ok(())
        }

        fn set_altitude_compensation(&mut self, meters: f32) -> Result<(), PeripheralError> {
            self.altitudes.push(meters);
            Ok(())
        }

        fn set_pressure_reference(&mut self, hpa: f32) -> Result<(), PeripheralError> {
            self.pressure_refs.push(hpa);
            Ok(())
        }

        fn set_measurement_interval(&mut self, seconds: u32) -> Result<(), PeripheralError> {
            self.intervals.push(seconds);
            Ok(())
        }

        fn power_down(&mut self) {
            self.power_down_calls += 1;
        }
    }

    /// RTC advancing by a fixed step per read, settable like the real one.
    pub struct ManualRtc {
        now: Timestamp,
        step: Timestamp,
        /// When true, `set` fails with `ClockWrite`.
        pub fail_writes: bool,
    }

    impl ManualRtc {
        /// Start at `epoch_s`, advancing `step` seconds per `now()` call.
        pub fn new(epoch_s: Timestamp, step: Timestamp) -> Self {
            Self {
                now: epoch_s,
                step,
                fail_writes: false,
            }
        }
    }

    impl Rtc for ManualRtc {
        fn now(&mut self) -> Result<Timestamp, PeripheralError> {
            let current = self.now;
            self.now += self.step;
            Ok(current)
        }

        fn set(&mut self, epoch_s: Timestamp) -> Result<(), PeripheralError> {
            if self.fail_writes {
                return Err(PeripheralError::ClockWrite);
            }
            self.now = epoch_s;
            Ok(())
        }
    }

    /// Wake line triggered programmatically through a channel.
    pub struct ChannelWakeLine(mpsc::Receiver<()>);

    /// Sender half used by tests to assert the wake line.
    pub struct WakeTrigger(mpsc::Sender<()>);

    impl ChannelWakeLine {
        /// Create a wake line and its trigger.
        pub fn new() -> (Self, WakeTrigger) {
            let (tx, rx) = mpsc::channel();
            (Self(rx), WakeTrigger(tx))
        }
    }

    impl WakeTrigger {
        /// Produce one rising edge. Pulsing an already-awake node is a
        /// no-op beyond the pulse itself.
        pub fn pulse(&self) {
            let _ = self.0.send(());
        }
    }

    impl WakeLine for ChannelWakeLine {
        fn wait_rising_edge(&mut self) {
            // A dropped trigger releases the wait so tests tear down
            // instead of parking forever.
            let _ = self.0.recv();
        }
    }
}
