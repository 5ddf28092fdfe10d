use crate::automation::DECLICK_TIME_CONSTANT;
use crate::gain::Selector;
use crate::noise::NOISE_SECONDS;

pub const LEVEL_MIN_DB: f32 = 20.0;
pub const LEVEL_MAX_DB: f32 = 90.0;
pub const LEVEL_STEP_DB: f32 = 0.1;

pub const DEFAULT_DB_A: f32 = 53.0;
pub const DEFAULT_DB_B: f32 = 60.0;

/// Environment variable naming the output device.
pub const DEVICE_ENV: &str = "DB_AB_DEVICE";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_a: f32,
    pub db_b: f32,
    pub active: Selector,
    pub device: Option<String>,
    pub noise_seconds: f32,
    /// Seconds.
    pub time_constant: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_a: DEFAULT_DB_A,
            db_b: DEFAULT_DB_B,
            active: Selector::A,
            device: None,
            noise_seconds: NOISE_SECONDS,
            time_constant: DECLICK_TIME_CONSTANT,
        }
    }
}

impl Config {
    /// Levels pulled into the input range and step.
    pub fn normalized(mut self) -> Self {
        self.db_a = clamp_level(self.db_a);
        self.db_b = clamp_level(self.db_b);
        if !(self.noise_seconds > 0.0) {
            self.noise_seconds = NOISE_SECONDS;
        }
        if !(self.time_constant >= 0.0) {
            self.time_constant = DECLICK_TIME_CONSTANT;
        }
        self
    }
}

/// Clamp to [20, 90] dB and round to the nearest 0.1 dB.
pub fn clamp_level(db: f32) -> f32 {
    if db.is_nan() {
        return LEVEL_MIN_DB;
    }
    let clamped = db.clamp(LEVEL_MIN_DB, LEVEL_MAX_DB);
    // LEVEL_STEP_DB is 0.1; scale by its exact inverse
    (clamped * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.db_a, 53.0);
        assert_eq!(c.db_b, 60.0);
        assert_eq!(c.active, Selector::A);
        assert_eq!(c.noise_seconds, 2.0);
        assert_eq!(c.time_constant, 0.02);
        assert_eq!(c.device, None);
    }

    #[test]
    fn test_clamp_level() {
        assert_eq!(clamp_level(10.0), 20.0);
        assert_eq!(clamp_level(120.0), 90.0);
        assert_eq!(clamp_level(53.0), 53.0);
        assert_eq!(clamp_level(53.04), 53.0);
        assert_eq!(clamp_level(53.06), 53.1);
        assert_eq!(clamp_level(f32::NAN), 20.0);
        assert_eq!(clamp_level(f32::NEG_INFINITY), 20.0);
    }

    #[test]
    fn test_normalized_repairs_bad_values() {
        let c = Config {
            db_a: 5.0,
            db_b: 95.55,
            noise_seconds: 0.0,
            time_constant: f32::NAN,
            ..Config::default()
        }
        .normalized();
        assert_eq!(c.db_a, 20.0);
        assert_eq!(c.db_b, 90.0);
        assert_eq!(c.noise_seconds, 2.0);
        assert_eq!(c.time_constant, 0.02);
    }
}
