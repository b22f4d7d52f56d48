//! Field node configuration
//!
//! Held by the state machine and mutated only by `SET_*` commands from
//! the host; changes take effect on the next sampling tick.

/// Tunable field node parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldConfig {
    /// Sampling cycle in seconds; each tick samples, logs, and emits
    /// telemetry.
    pub cycle_seconds: u32,
    /// CO2 sensor internal measurement interval in seconds.
    pub co2_interval_seconds: u32,
    /// Altitude compensation applied to the CO2 sensor, in meters.
    pub altitude_m: f32,
    /// Sea-level pressure reference for the barometer, in hPa.
    pub pressure_ref_hpa: f32,
    /// Local copy of the CO2 warning threshold, in ppm. Alert evaluation
    /// happens on the host; the field keeps the value so it survives a
    /// host restart.
    pub threshold_ppm: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            cycle_seconds: 900,
            co2_interval_seconds: 2,
            altitude_m: 0.0,
            pressure_ref_hpa: 1013.25,
            threshold_ppm: 480.0,
        }
    }
}

impl FieldConfig {
    /// Override the sampling cycle.
    pub fn with_cycle_seconds(mut self, seconds: u32) -> Self {
        self.cycle_seconds = seconds;
        self
    }

    /// Override the altitude compensation.
    pub fn with_altitude_m(mut self, meters: f32) -> Self {
        self.altitude_m = meters;
        self
    }

    /// Override the pressure reference.
    pub fn with_pressure_ref_hpa(mut self, hpa: f32) -> Self {
        self.pressure_ref_hpa = hpa;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_only_their_field() {
        let config = FieldConfig::default()
            .with_altitude_m(120.0)
            .with_pressure_ref_hpa(1020.0);
        assert_eq!(config.altitude_m, 120.0);
        assert_eq!(config.pressure_ref_hpa, 1020.0);
        assert_eq!(config.cycle_seconds, 900);
        assert_eq!(config.threshold_ppm, 480.0);
    }
}
