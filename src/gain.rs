use std::fmt;

use serde::{Deserialize, Serialize};

/// Which of the two levels is currently audible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Selector {
    A,
    B,
}

impl Selector {
    pub fn toggled(self) -> Self {
        match self {
            Selector::A => Selector::B,
            Selector::B => Selector::A,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::A => f.write_str("A"),
            Selector::B => f.write_str("B"),
        }
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    (10.0f32).powf(db / 20.0)
}

/// Linear gains for a pair of levels, normalized so the louder one is 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GainPair {
    pub gain_a: f32,
    pub gain_b: f32,
}

impl GainPair {
    pub fn select(&self, selector: Selector) -> f32 {
        match selector {
            Selector::A => self.gain_a,
            Selector::B => self.gain_b,
        }
    }
}

pub fn relative_gains(db_a: f32, db_b: f32) -> GainPair {
    let max_db = db_a.max(db_b);
    // normalize in the exponent so huge levels don't overflow to inf/inf
    if max_db.is_finite() {
        return GainPair {
            gain_a: db_to_gain(db_a - max_db),
            gain_b: db_to_gain(db_b - max_db),
        };
    }
    let mut reference = db_to_gain(max_db);
    // degenerate input (e.g. -inf or NaN levels)
    if reference == 0.0 || reference.is_nan() || reference.is_infinite() {
        reference = 1.0;
    }
    GainPair {
        gain_a: db_to_gain(db_a) / reference,
        gain_b: db_to_gain(db_b) / reference,
    }
}

pub fn delta_db(db_a: f32, db_b: f32) -> f32 {
    (db_a - db_b).abs()
}

/// Linear amplitude ratio for a level difference.
pub fn ratio(delta_db: f32) -> f32 {
    (10.0f32).powf(delta_db / 20.0)
}

/// Display values derived from the two levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Readout {
    pub db_a: f32,
    pub db_b: f32,
    pub delta_db: f32,
    pub ratio: f32,
    pub gain_a: f32,
    pub gain_b: f32,
}

impl Readout {
    pub fn new(db_a: f32, db_b: f32) -> Self {
        let gains = relative_gains(db_a, db_b);
        let delta = delta_db(db_a, db_b);
        Readout {
            db_a,
            db_b,
            delta_db: delta,
            ratio: ratio(delta),
            gain_a: gains.gain_a,
            gain_b: gains.gain_b,
        }
    }
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Δ {:.1} dB • {:.2}× • Gain A: {:.3} • Gain B: {:.3}",
            self.delta_db, self.ratio, self.gain_a, self.gain_b
        )
    }
}
