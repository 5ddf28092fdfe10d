//! The source -> gain -> destination graph and the context traits the
//! session drives.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::automation::{GainParam, GainRamp};
use crate::noise::{LoopingSource, NoiseBuffer};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no output device available")]
    NoDevice,
    #[error("no such output device {0:?}")]
    DeviceNotFound(String),
    #[error("failed to open output stream: {0}")]
    Stream(String),
    #[error("source already stopped")]
    AlreadyStopped,
    #[error("no live gain node")]
    NotPlaying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
}

/// Frames rendered to the destination so far.
#[derive(Debug, Clone, Default)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
}

impl AudioClock {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Returns the frame index before the tick.
    pub fn tick(&self) -> u64 {
        self.frames.fetch_add(1, Ordering::Relaxed)
    }

    pub fn seconds(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / sample_rate as f64
    }
}

/// Looping noise wired through a gain node, ready to hand to a destination.
pub struct GainedNoise {
    source: LoopingSource,
    gain: Arc<GainParam>,
    ramp: GainRamp,
    clock: AudioClock,
    stopped: Arc<AtomicBool>,
}

impl GainedNoise {
    pub fn connect(buffer: NoiseBuffer, gain: Arc<GainParam>, clock: AudioClock) -> Self {
        let ramp = GainRamp::new(&gain);
        GainedNoise {
            source: LoopingSource::new(buffer),
            gain,
            ramp,
            clock,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.buffer().sample_rate()
    }

    /// Flag shared with the voice handle; set once the source is stopped.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }

    /// Render one sample at clock position `frame`.
    pub fn render(&mut self, frame: u64) -> Option<f32> {
        if self.stopped.load(Ordering::Relaxed) {
            return None;
        }
        let g = self.ramp.step(&self.gain, frame);
        Some(self.source.next_sample() * g)
    }

    pub(crate) fn clock(&self) -> &AudioClock {
        &self.clock
    }
}

/// Marks a shared stop flag, failing if it was already set.
pub(crate) fn stop_source(flag: &AtomicBool) -> Result<(), GraphError> {
    if flag.swap(true, Ordering::Relaxed) {
        return Err(GraphError::AlreadyStopped);
    }
    Ok(())
}

pub trait Voice {
    /// Stop the source. Errors if it was already stopped.
    fn stop(&mut self) -> Result<(), GraphError>;
    /// Detach from the destination. Safe to call more than once.
    fn disconnect(&mut self);
}

/// The audio processing context the session plays through.
pub trait AudioContext {
    type Voice: Voice;

    fn sample_rate(&self) -> u32;
    fn state(&self) -> ContextState;
    fn resume(&mut self) -> anyhow::Result<()>;
    fn clock(&self) -> &AudioClock;

    fn current_time(&self) -> f64 {
        self.clock().seconds(self.sample_rate())
    }

    /// Connect the chain to the destination and start the source.
    fn connect(&mut self, chain: GainedNoise) -> anyhow::Result<Self::Voice>;
}
