//! CO2 threshold alerting with hysteresis
//!
//! The engine arms when a sample crosses the threshold upward and fires
//! exactly one notification after the level has held below the
//! threshold for a fixed number of consecutive samples. A single noisy
//! crossing therefore produces at most one notification, and the level
//! must re-cross upward before another can arm.

/// Consecutive sub-threshold samples required before firing.
pub const CONFIRMATION_SAMPLES: u32 = 3;

/// A fired alert, ready to be rendered for the notification channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alert {
    /// The reading that confirmed the recovery.
    pub co2_ppm: f32,
    /// Threshold in effect when the alert fired.
    pub threshold_ppm: f32,
}

impl Alert {
    /// Human-readable notification text.
    pub fn message(&self) -> String {
        format!(
            "CO2 back below {:.0} ppm after an elevated period (now {:.0} ppm)",
            self.threshold_ppm, self.co2_ppm
        )
    }
}

/// Hysteresis state machine over incoming CO2 readings.
#[derive(Debug)]
pub struct AlertEngine {
    threshold_ppm: f32,
    consecutive_below: u32,
    armed: bool,
}

impl AlertEngine {
    /// Engine starting disarmed at the given threshold.
    pub fn new(threshold_ppm: f32) -> Self {
        Self {
            threshold_ppm,
            consecutive_below: 0,
            armed: false,
        }
    }

    /// Current threshold in ppm.
    pub fn threshold(&self) -> f32 {
        self.threshold_ppm
    }

    /// Update the threshold. Armed state and the below-counter carry
    /// over unchanged.
    pub fn set_threshold(&mut self, ppm: f32) {
        self.threshold_ppm = ppm;
    }

    /// Feed one reading through the state machine.
    ///
    /// Returns the alert to deliver when this reading is the one that
    /// confirms a sustained recovery.
    pub fn observe(&mut self, co2_ppm: f32) -> Option<Alert> {
        if co2_ppm >= self.threshold_ppm {
            if !self.armed {
                log::info!(
                    "CO2 {co2_ppm:.0} ppm crossed threshold {:.0} ppm, alert armed",
                    self.threshold_ppm
                );
            }
            self.armed = true;
            self.consecutive_below = 0;
            return None;
        }

        if !self.armed {
            return None;
        }

        self.consecutive_below += 1;
        if self.consecutive_below < CONFIRMATION_SAMPLES {
            return None;
        }

        self.armed = false;
        self.consecutive_below = 0;
        Some(Alert {
            co2_ppm,
            threshold_ppm: self.threshold_ppm,
        })
    }
}
