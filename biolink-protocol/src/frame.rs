//! Frame types and the ASCII key=value codec
//!
//! Every message on the link is one of four frames:
//!
//! ```text
//! TEL ts=1725000000 co2=812.5 temp=24.1 hum=61.2 press=1008.2 alt=44.6
//! CMD id=7 op=feed val=500
//! ACK id=7 ok=1
//! EVT kind=boot
//! ```
//!
//! Telemetry flows field→host, commands host→field, acknowledgements
//! field→host in direct response to exactly one command, and events are
//! unsolicited field→host notices (currently only the post-wake boot
//! announcement).
//!
//! Floats are encoded with Rust's shortest round-trip `Display`, so an
//! encode/decode cycle reproduces every field bit-for-bit.

use core::fmt::Write as _;
use core::str::FromStr;

use crate::error::ProtocolError;
use crate::MAX_FRAME_LEN;

/// Seconds since the Unix epoch, as kept by the field node's RTC.
pub type Timestamp = u64;

/// Value linking an issued command to its eventual acknowledgement.
pub type CorrelationId = u32;

/// Bounded buffer holding one encoded frame, terminator excluded.
pub type FrameBuf = heapless::String<MAX_FRAME_LEN>;

/// One sensor sweep as sampled by the field node.
///
/// Immutable once constructed; timestamps come from the field node's own
/// clock so the persisted log stays monotonic regardless of host clock
/// behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    /// Field RTC time at the moment of sampling.
    pub timestamp: Timestamp,
    /// CO2 concentration in parts per million.
    pub co2_ppm: f32,
    /// Air temperature in degrees Celsius.
    pub temperature_c: f32,
    /// Relative humidity in percent.
    pub humidity_pct: f32,
    /// Ambient pressure in hectopascals.
    pub pressure_hpa: f32,
    /// Barometric altitude in meters.
    pub altitude_m: f32,
    /// Feed amount in grams, present only on feed event rows.
    pub feed_amount_g: Option<f32>,
    /// Forced recalibration reference in ppm, present only on
    /// recalibration event rows.
    pub recalibration_ppm: Option<f32>,
}

/// Commands the host may issue to the field node.
///
/// Payloads are kind-specific scalars; commands carry no other state and
/// are never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Log a feed event of the given amount. No sensor side effect.
    Feed {
        /// Feed amount in grams.
        grams: f32,
    },
    /// Rewrite the CO2 sensor's forced recalibration reference.
    Calibrate {
        /// Reference concentration in ppm.
        ppm: f32,
    },
    /// Update the CO2 warning threshold held in field configuration.
    SetThreshold {
        /// New threshold in ppm.
        ppm: f32,
    },
    /// Update the altitude compensation applied to the CO2 sensor.
    SetAltitude {
        /// Site altitude in meters.
        meters: f32,
    },
    /// Update the sea-level pressure reference of the barometer.
    SetPressureRef {
        /// Reference pressure in hPa.
        hpa: f32,
    },
    /// Update the CO2 sensor's internal measurement interval.
    SetInterval {
        /// Interval in seconds.
        seconds: u32,
    },
    /// Update the sampling cycle driving telemetry emission.
    SetCycle {
        /// Cycle length in seconds.
        seconds: u32,
    },
    /// Overwrite the field RTC with host wall-clock time.
    SyncTime {
        /// Host time as seconds since the Unix epoch.
        epoch_s: u64,
    },
    /// Flush storage and enter deep sleep. Fire-and-forget: no
    /// acknowledgement is owed, the serial link powers down.
    Shutdown,
    /// Sample immediately and emit a telemetry frame after the ack.
    QueryData,
    /// Report the field RTC time in the acknowledgement value.
    QueryTime,
    /// Reinitialize all peripherals without a sleep cycle.
    Reset,
}

impl Command {
    /// Wire token identifying this command kind.
    pub const fn op(&self) -> &'static str {
        match self {
            Command::Feed { .. } => "feed",
            Command::Calibrate { .. } => "calibrate",
            Command::SetThreshold { .. } => "set_threshold",
            Command::SetAltitude { .. } => "set_altitude",
            Command::SetPressureRef { .. } => "set_pressure_ref",
            Command::SetInterval { .. } => "set_interval",
            Command::SetCycle { .. } => "set_cycle",
            Command::SyncTime { .. } => "sync_time",
            Command::Shutdown => "shutdown",
            Command::QueryData => "query_data",
            Command::QueryTime => "query_time",
            Command::Reset => "reset",
        }
    }

    /// Whether the field node owes an acknowledgement for this command.
    ///
    /// Shutdown is the lone exception: the node powers its serial
    /// interface down as part of executing it.
    pub const fn expects_ack(&self) -> bool {
        !matches!(self, Command::Shutdown)
    }

    /// Payload as a plain number, for logging. Exact for every payload
    /// the protocol can express (epoch seconds stay below 2^53).
    pub fn payload(&self) -> Option<f64> {
        match *self {
            Command::Feed { grams } => Some(grams.into()),
            Command::Calibrate { ppm } => Some(ppm.into()),
            Command::SetThreshold { ppm } => Some(ppm.into()),
            Command::SetAltitude { meters } => Some(meters.into()),
            Command::SetPressureRef { hpa } => Some(hpa.into()),
            Command::SetInterval { seconds } => Some(seconds.into()),
            Command::SetCycle { seconds } => Some(seconds.into()),
            Command::SyncTime { epoch_s } => Some(epoch_s as f64),
            Command::Shutdown | Command::QueryData | Command::QueryTime | Command::Reset => None,
        }
    }
}

/// A command paired with its correlation id for transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandFrame {
    /// Correlation id, fresh per issued command.
    pub id: CorrelationId,
    /// The command itself.
    pub command: Command,
}

/// Failure reasons reported inside an error acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckError {
    /// RTC peripheral did not accept the write.
    ClockWrite,
    /// Sensor access failed while executing the command.
    Sensor,
    /// Persistent log could not be written.
    Storage,
    /// Command was syntactically valid but not executable as received.
    BadCommand,
}

impl AckError {
    /// Wire token for this failure reason.
    pub const fn token(&self) -> &'static str {
        match self {
            AckError::ClockWrite => "clock_write",
            AckError::Sensor => "sensor",
            AckError::Storage => "storage",
            AckError::BadCommand => "bad_command",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "clock_write" => AckError::ClockWrite,
            "sensor" => AckError::Sensor,
            "storage" => AckError::Storage,
            "bad_command" => AckError::BadCommand,
            _ => return None,
        })
    }
}

/// Outcome carried by an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AckOutcome {
    /// Command executed.
    Ok,
    /// Command executed and produced a value (e.g. the RTC time for a
    /// time query). `f64` is exact for everything we echo.
    OkValue(f64),
    /// Command failed; the field node keeps operating.
    Error(AckError),
}

/// Direct response to exactly one command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ack {
    /// Correlation id of the command being answered.
    pub id: CorrelationId,
    /// Execution outcome.
    pub outcome: AckOutcome,
}

/// Unsolicited field→host notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Field node (re)started, typically after a deep-sleep wake.
    Boot,
}

/// Any message that can appear on the link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    /// Field→host sensor sweep.
    Telemetry(TelemetrySample),
    /// Host→field command.
    Command(CommandFrame),
    /// Field→host command response.
    Ack(Ack),
    /// Field→host notice.
    Event(Event),
}

impl Frame {
    /// Encode into a bounded line, without the trailing terminator.
    pub fn encode(&self) -> Result<FrameBuf, ProtocolError> {
        let mut buf = FrameBuf::new();
        let result = match self {
            Frame::Telemetry(sample) => encode_telemetry(&mut buf, sample),
            Frame::Command(cmd) => encode_command(&mut buf, cmd),
            Frame::Ack(ack) => encode_ack(&mut buf, ack),
            Frame::Event(Event::Boot) => buf.write_str("EVT kind=boot"),
        };
        result.map_err(|_| ProtocolError::Oversize)?;
        Ok(buf)
    }

    /// Decode one line (terminator already stripped).
    pub fn decode(line: &str) -> Result<Frame, ProtocolError> {
        let mut tokens = line.split_ascii_whitespace();
        let tag = tokens.next().ok_or(ProtocolError::Empty)?;
        match tag {
            "TEL" => decode_telemetry(tokens),
            "CMD" => decode_command(tokens),
            "ACK" => decode_ack(tokens),
            "EVT" => decode_event(tokens),
            _ => Err(ProtocolError::UnknownTag),
        }
    }
}

fn encode_telemetry(buf: &mut FrameBuf, s: &TelemetrySample) -> core::fmt::Result {
    write!(
        buf,
        "TEL ts={} co2={} temp={} hum={} press={} alt={}",
        s.timestamp, s.co2_ppm, s.temperature_c, s.humidity_pct, s.pressure_hpa, s.altitude_m
    )?;
    if let Some(grams) = s.feed_amount_g {
        write!(buf, " feed={grams}")?;
    }
    if let Some(ppm) = s.recalibration_ppm {
        write!(buf, " recal={ppm}")?;
    }
    Ok(())
}

fn encode_command(buf: &mut FrameBuf, frame: &CommandFrame) -> core::fmt::Result {
    write!(buf, "CMD id={} op={}", frame.id, frame.command.op())?;
    match frame.command {
        Command::Feed { grams } => write!(buf, " val={grams}"),
        Command::Calibrate { ppm }
        | Command::SetThreshold { ppm } => write!(buf, " val={ppm}"),
        Command::SetAltitude { meters } => write!(buf, " val={meters}"),
        Command::SetPressureRef { hpa } => write!(buf, " val={hpa}"),
        Command::SetInterval { seconds } | Command::SetCycle { seconds } => {
            write!(buf, " val={seconds}")
        }
        Command::SyncTime { epoch_s } => write!(buf, " val={epoch_s}"),
        Command::Shutdown | Command::QueryData | Command::QueryTime | Command::Reset => Ok(()),
    }
}

fn encode_ack(buf: &mut FrameBuf, ack: &Ack) -> core::fmt::Result {
    match ack.outcome {
        AckOutcome::Ok => write!(buf, "ACK id={} ok=1", ack.id),
        AckOutcome::OkValue(value) => write!(buf, "ACK id={} ok=1 val={value}", ack.id),
        AckOutcome::Error(reason) => {
            write!(buf, "ACK id={} ok=0 err={}", ack.id, reason.token())
        }
    }
}

fn split_kv(token: &str) -> Result<(&str, &str), ProtocolError> {
    token.split_once('=').ok_or(ProtocolError::MalformedPair)
}

fn parse_num<T: FromStr>(value: &str, field: &'static str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidField(field))
}

fn parse_finite(value: &str, field: &'static str) -> Result<f32, ProtocolError> {
    let parsed: f32 = parse_num(value, field)?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(ProtocolError::InvalidField(field))
    }
}

fn require<T>(field: Option<T>, name: &'static str) -> Result<T, ProtocolError> {
    field.ok_or(ProtocolError::MissingField(name))
}

fn decode_telemetry<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Frame, ProtocolError> {
    let mut ts = None;
    let mut co2 = None;
    let mut temp = None;
    let mut hum = None;
    let mut press = None;
    let mut alt = None;
    let mut feed = None;
    let mut recal = None;

    for token in tokens {
        let (key, value) = split_kv(token)?;
        match key {
            "ts" => ts = Some(parse_num::<u64>(value, "ts")?),
            "co2" => co2 = Some(parse_finite(value, "co2")?),
            "temp" => temp = Some(parse_finite(value, "temp")?),
            "hum" => hum = Some(parse_finite(value, "hum")?),
            "press" => press = Some(parse_finite(value, "press")?),
            "alt" => alt = Some(parse_finite(value, "alt")?),
            "feed" => feed = Some(parse_finite(value, "feed")?),
            "recal" => recal = Some(parse_finite(value, "recal")?),
            // Unknown keys are tolerated for forward compatibility.
            _ => {}
        }
    }

    Ok(Frame::Telemetry(TelemetrySample {
        timestamp: require(ts, "ts")?,
        co2_ppm: require(co2, "co2")?,
        temperature_c: require(temp, "temp")?,
        humidity_pct: require(hum, "hum")?,
        pressure_hpa: require(press, "press")?,
        altitude_m: require(alt, "alt")?,
        feed_amount_g: feed,
        recalibration_ppm: recal,
    }))
}

fn decode_command<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Frame, ProtocolError> {
    let mut id = None;
    let mut op = None;
    let mut val = None;

    for token in tokens {
        let (key, value) = split_kv(token)?;
        match key {
            "id" => id = Some(parse_num::<u32>(value, "id")?),
            "op" => op = Some(value),
            "val" => val = Some(value),
            _ => {}
        }
    }

    let id = require(id, "id")?;
    let op = require(op, "op")?;

    let scalar = || -> Result<f32, ProtocolError> { parse_finite(require(val, "val")?, "val") };
    let seconds = || -> Result<u32, ProtocolError> { parse_num(require(val, "val")?, "val") };

    let command = match op {
        "feed" => Command::Feed { grams: scalar()? },
        "calibrate" => Command::Calibrate { ppm: scalar()? },
        "set_threshold" => Command::SetThreshold { ppm: scalar()? },
        "set_altitude" => Command::SetAltitude { meters: scalar()? },
        "set_pressure_ref" => Command::SetPressureRef { hpa: scalar()? },
        "set_interval" => Command::SetInterval { seconds: seconds()? },
        "set_cycle" => Command::SetCycle { seconds: seconds()? },
        "sync_time" => Command::SyncTime {
            epoch_s: parse_num(require(val, "val")?, "val")?,
        },
        "shutdown" => Command::Shutdown,
        "query_data" => Command::QueryData,
        "query_time" => Command::QueryTime,
        "reset" => Command::Reset,
        _ => return Err(ProtocolError::UnknownOp),
    };

    Ok(Frame::Command(CommandFrame { id, command }))
}

fn decode_ack<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Frame, ProtocolError> {
    let mut id = None;
    let mut ok = None;
    let mut val = None;
    let mut err = None;

    for token in tokens {
        let (key, value) = split_kv(token)?;
        match key {
            "id" => id = Some(parse_num::<u32>(value, "id")?),
            "ok" => ok = Some(value),
            "val" => val = Some(parse_num::<f64>(value, "val")?),
            "err" => err = Some(value),
            _ => {}
        }
    }

    let id = require(id, "id")?;
    let outcome = match require(ok, "ok")? {
        "1" => match val {
            Some(value) => AckOutcome::OkValue(value),
            None => AckOutcome::Ok,
        },
        "0" => {
            let token = require(err, "err")?;
            let reason = AckError::from_token(token).ok_or(ProtocolError::InvalidField("err"))?;
            AckOutcome::Error(reason)
        }
        _ => return Err(ProtocolError::InvalidField("ok")),
    };

    Ok(Frame::Ack(Ack { id, outcome }))
}

fn decode_event<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Frame, ProtocolError> {
    let mut kind = None;
    for token in tokens {
        let (key, value) = split_kv(token)?;
        if key == "kind" {
            kind = Some(value);
        }
    }
    match require(kind, "kind")? {
        "boot" => Ok(Frame::Event(Event::Boot)),
        _ => Err(ProtocolError::UnknownEvent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) -> Frame {
        let line = frame.encode().unwrap();
        Frame::decode(&line).unwrap()
    }

    #[test]
    fn telemetry_roundtrip_is_exact() {
        let sample = TelemetrySample {
            timestamp: 1_725_000_000,
            co2_ppm: 812.53,
            temperature_c: 24.17,
            humidity_pct: 61.2,
            pressure_hpa: 1008.25,
            altitude_m: 44.6,
            feed_amount_g: None,
            recalibration_ppm: None,
        };
        assert_eq!(roundtrip(Frame::Telemetry(sample)), Frame::Telemetry(sample));
    }

    #[test]
    fn telemetry_roundtrip_with_optional_columns() {
        let sample = TelemetrySample {
            timestamp: 42,
            co2_ppm: 600.0,
            temperature_c: 21.0,
            humidity_pct: 55.5,
            pressure_hpa: 1013.25,
            altitude_m: 0.0,
            feed_amount_g: Some(500.0),
            recalibration_ppm: Some(400.0),
        };
        assert_eq!(roundtrip(Frame::Telemetry(sample)), Frame::Telemetry(sample));
    }

    #[test]
    fn command_roundtrip_all_kinds() {
        let commands = [
            Command::Feed { grams: 500.0 },
            Command::Calibrate { ppm: 400.0 },
            Command::SetThreshold { ppm: 1000.0 },
            Command::SetAltitude { meters: 150.0 },
            Command::SetPressureRef { hpa: 1020.0 },
            Command::SetInterval { seconds: 10 },
            Command::SetCycle { seconds: 300 },
            Command::SyncTime { epoch_s: 1_725_000_000 },
            Command::Shutdown,
            Command::QueryData,
            Command::QueryTime,
            Command::Reset,
        ];
        for (id, command) in commands.into_iter().enumerate() {
            let frame = Frame::Command(CommandFrame {
                id: id as CorrelationId,
                command,
            });
            assert_eq!(roundtrip(frame), frame);
        }
    }

    #[test]
    fn ack_roundtrip() {
        for outcome in [
            AckOutcome::Ok,
            AckOutcome::OkValue(1_725_000_000.0),
            AckOutcome::Error(AckError::ClockWrite),
            AckOutcome::Error(AckError::Sensor),
        ] {
            let frame = Frame::Ack(Ack { id: 9, outcome });
            assert_eq!(roundtrip(frame), frame);
        }
    }

    #[test]
    fn boot_event_roundtrip() {
        assert_eq!(roundtrip(Frame::Event(Event::Boot)), Frame::Event(Event::Boot));
    }

    #[test]
    fn decode_rejects_truncated_telemetry() {
        assert_eq!(
            Frame::decode("TEL ts=5 co2=800"),
            Err(ProtocolError::MissingField("temp")),
        );
    }

    #[test]
    fn decode_rejects_wrong_field_type() {
        assert_eq!(
            Frame::decode("CMD id=1 op=feed val=abc"),
            Err(ProtocolError::InvalidField("val")),
        );
        assert_eq!(
            Frame::decode("CMD id=x op=feed val=1"),
            Err(ProtocolError::InvalidField("id")),
        );
    }

    #[test]
    fn decode_rejects_non_finite_floats() {
        assert!(Frame::decode("CMD id=1 op=feed val=NaN").is_err());
        assert!(Frame::decode("CMD id=1 op=feed val=inf").is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(Frame::decode(""), Err(ProtocolError::Empty));
        assert_eq!(Frame::decode("BOGUS x=1"), Err(ProtocolError::UnknownTag));
        assert_eq!(
            Frame::decode("CMD id=1 op=launch_missiles"),
            Err(ProtocolError::UnknownOp),
        );
        assert_eq!(
            Frame::decode("ACK id=1 ok=2"),
            Err(ProtocolError::InvalidField("ok")),
        );
    }

    #[test]
    fn decode_tolerates_unknown_keys() {
        let frame = Frame::decode("ACK id=3 ok=1 extra=field").unwrap();
        assert_eq!(
            frame,
            Frame::Ack(Ack {
                id: 3,
                outcome: AckOutcome::Ok,
            }),
        );
    }

    #[test]
    fn shutdown_is_fire_and_forget() {
        assert!(!Command::Shutdown.expects_ack());
        assert!(Command::Feed { grams: 1.0 }.expects_ack());
    }
}
