//! Out-of-band wake control
//!
//! The serial link is unpowered while the field node sleeps, so the
//! only way back is a pulse on the physical wake line. [`WakePin`] is
//! the hardware seam: deployments drive a GPIO through sysfs, the
//! simulator pairing uses a marker file, and tests observe a recording
//! double.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Pulse width, comfortably above the field node's debounce window.
pub const WAKE_PULSE: Duration = Duration::from_secs(1);

/// A drivable output line.
pub trait WakePin: Send {
    /// Assert the line.
    fn set_high(&mut self) -> io::Result<()>;
    /// Release the line.
    fn set_low(&mut self) -> io::Result<()>;
}

/// Produces wake pulses on a pin.
///
/// Idempotent from the field node's perspective: a pulse while it is
/// already awake is observed and ignored.
pub struct WakeController {
    pin: Box<dyn WakePin>,
}

impl WakeController {
    /// Controller over the given pin.
    pub fn new(pin: Box<dyn WakePin>) -> Self {
        Self { pin }
    }

    /// Assert the line for [`WAKE_PULSE`], then release it.
    pub async fn wake(&mut self) -> io::Result<()> {
        self.pin.set_high()?;
        tokio::time::sleep(WAKE_PULSE).await;
        self.pin.set_low()
    }
}

/// GPIO driven through the sysfs value file.
pub struct SysfsGpioPin {
    value_path: PathBuf,
}

impl SysfsGpioPin {
    /// Pin for the given GPIO number, exporting it if needed.
    pub fn open(gpio: u32) -> io::Result<Self> {
        let value_path = PathBuf::from(format!("/sys/class/gpio/gpio{gpio}/value"));
        if !value_path.exists() {
            fs::write("/sys/class/gpio/export", gpio.to_string())?;
        }
        fs::write(
            format!("/sys/class/gpio/gpio{gpio}/direction"),
            "out",
        )?;
        Ok(Self { value_path })
    }

    fn write_level(&self, level: &str) -> io::Result<()> {
        let mut file = fs::OpenOptions::new().write(true).open(&self.value_path)?;
        file.write_all(level.as_bytes())
    }
}

impl WakePin for SysfsGpioPin {
    fn set_high(&mut self) -> io::Result<()> {
        self.write_level("1")
    }

    fn set_low(&mut self) -> io::Result<()> {
        self.write_level("0")
    }
}

/// Marker-file pin matching the field simulator's wake wait.
///
/// High creates the file, low removes it if the simulator has not
/// already consumed it.
pub struct MarkerFilePin {
    path: PathBuf,
}

impl MarkerFilePin {
    /// Pin backed by the given marker path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl WakePin for MarkerFilePin {
    fn set_high(&mut self) -> io::Result<()> {
        fs::write(&self.path, b"1")
    }

    fn set_low(&mut self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct RecordingPin(Arc<Mutex<Vec<&'static str>>>);

    impl WakePin for RecordingPin {
        fn set_high(&mut self) -> io::Result<()> {
            self.0.lock().unwrap().push("high");
            Ok(())
        }

        fn set_low(&mut self) -> io::Result<()> {
            self.0.lock().unwrap().push("low");
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wake_pulses_high_then_low_for_the_full_width() {
        let pin = RecordingPin::default();
        let mut controller = WakeController::new(Box::new(pin.clone()));

        let start = Instant::now();
        controller.wake().await.unwrap();
        assert_eq!(*pin.0.lock().unwrap(), vec!["high", "low"]);
        // Paused time: the sleep advanced the clock without waiting.
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_wakes_just_pulse_again() {
        let pin = RecordingPin::default();
        let mut controller = WakeController::new(Box::new(pin.clone()));
        controller.wake().await.unwrap();
        controller.wake().await.unwrap();
        assert_eq!(*pin.0.lock().unwrap(), vec!["high", "low", "high", "low"]);
    }

    #[tokio::test]
    async fn marker_pin_creates_and_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wake");
        let mut pin = MarkerFilePin::new(path.clone());

        pin.set_high().unwrap();
        assert!(path.exists());
        pin.set_low().unwrap();
        assert!(!path.exists());
        // Already consumed by the peer: low is still fine.
        pin.set_low().unwrap();
    }
}
