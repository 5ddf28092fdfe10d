//! Gain parameter with scheduled automation.
//!
//! The control thread writes a schedule, the render thread reads it and
//! advances the instantaneous value one sample at a time. Everything crossing
//! the thread boundary is an atomic, so neither side ever blocks.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Smoothing time constant used for A/B switches.
pub const DECLICK_TIME_CONSTANT: f32 = 0.02;

// no automation pending, value holds
const HOLD: u64 = u64::MAX;

fn pack(target: f32, time_constant: f32) -> u64 {
    ((target.to_bits() as u64) << 32) | time_constant.to_bits() as u64
}

fn unpack(packed: u64) -> (f32, f32) {
    (f32::from_bits((packed >> 32) as u32), f32::from_bits(packed as u32))
}

/// Per-sample smoothing coefficient for an exponential approach with time
/// constant `tau` seconds.
pub fn one_pole_coeff(time_constant: f32, sample_rate: u32) -> f32 {
    if time_constant <= 0.0 || sample_rate == 0 {
        return 1.0;
    }
    let dt = 1.0 / sample_rate as f32;
    1.0 - (-dt / time_constant).exp()
}

#[derive(Debug)]
pub struct GainParam {
    sample_rate: u32,
    value: AtomicU32,
    schedule: AtomicU64,
    start_frame: AtomicU64,
    generation: AtomicU64,
}

impl GainParam {
    pub fn new(initial: f32, sample_rate: u32) -> Self {
        GainParam {
            sample_rate,
            value: AtomicU32::new(initial.to_bits()),
            schedule: AtomicU64::new(HOLD),
            start_frame: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Last value produced by the render side (or the initial value).
    pub fn value(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Target of the pending automation, if any.
    pub fn target(&self) -> Option<f32> {
        match self.schedule.load(Ordering::Acquire) {
            HOLD => None,
            packed => Some(unpack(packed).0),
        }
    }

    /// Drops any pending automation. The value holds where it is.
    pub fn cancel_scheduled_values(&self, _cancel_time: f64) {
        self.schedule.store(HOLD, Ordering::Release);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Starting at `start_time` on the audio clock, approach `target`
    /// exponentially with the given time constant (seconds).
    pub fn set_target_at_time(&self, target: f32, start_time: f64, time_constant: f32) {
        let start_frame = (start_time.max(0.0) * self.sample_rate as f64).round() as u64;
        self.start_frame.store(start_frame, Ordering::Relaxed);
        self.schedule.store(pack(target, time_constant), Ordering::Release);
        self.generation.fetch_add(1, Ordering::Release);
    }
}

/// Render-side state for one [`GainParam`].
#[derive(Debug)]
pub struct GainRamp {
    current: f32,
    seen_generation: u64,
    target: Option<f32>,
    coeff: f32,
    start_frame: u64,
}

impl GainRamp {
    pub fn new(param: &GainParam) -> Self {
        GainRamp {
            current: param.value(),
            seen_generation: u64::MAX,
            target: None,
            coeff: 1.0,
            start_frame: 0,
        }
    }

    /// Advance by one sample at absolute clock position `frame`.
    pub fn step(&mut self, param: &GainParam, frame: u64) -> f32 {
        let generation = param.generation.load(Ordering::Acquire);
        if generation != self.seen_generation {
            self.seen_generation = generation;
            match param.schedule.load(Ordering::Acquire) {
                HOLD => self.target = None,
                packed => {
                    let (target, tau) = unpack(packed);
                    self.target = Some(target);
                    self.coeff = one_pole_coeff(tau, param.sample_rate);
                    self.start_frame = param.start_frame.load(Ordering::Relaxed);
                }
            }
        }

        if let Some(target) = self.target {
            if frame >= self.start_frame {
                self.current += self.coeff * (target - self.current);
            }
        }
        param.value.store(self.current.to_bits(), Ordering::Relaxed);
        self.current
    }
}
