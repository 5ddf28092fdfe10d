//! Pull-based context that renders into memory instead of a device.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use log::debug;

use crate::graph::{stop_source, AudioClock, AudioContext, ContextState, GainedNoise, GraphError, Voice};

type Destination = Arc<Mutex<Vec<(u64, GainedNoise)>>>;

pub struct OfflineContext {
    sample_rate: u32,
    state: ContextState,
    clock: AudioClock,
    destination: Destination,
    next_id: u64,
}

impl OfflineContext {
    pub fn new(sample_rate: u32) -> Self {
        OfflineContext {
            sample_rate,
            state: ContextState::Suspended,
            clock: AudioClock::default(),
            destination: Arc::new(Mutex::new(Vec::new())),
            next_id: 0,
        }
    }

    /// Number of chains currently wired to the destination.
    pub fn connected(&self) -> usize {
        self.destination.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Number of voices ever connected.
    pub fn voices_created(&self) -> u64 {
        self.next_id
    }

    /// Mix `frames` samples from every connected chain, advancing the clock.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        let mut destination = match self.destination.lock() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        for slot in out.iter_mut() {
            let frame = self.clock.tick();
            for (_, chain) in destination.iter_mut() {
                if let Some(s) = chain.render(frame) {
                    *slot += s;
                }
            }
        }
        out
    }

    pub fn render_seconds(&mut self, seconds: f32) -> Vec<f32> {
        let frames = (seconds.max(0.0) * self.sample_rate as f32).round() as usize;
        self.render(frames)
    }
}

impl AudioContext for OfflineContext {
    type Voice = OfflineVoice;

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        self.state = ContextState::Running;
        Ok(())
    }

    fn clock(&self) -> &AudioClock {
        &self.clock
    }

    fn connect(&mut self, chain: GainedNoise) -> anyhow::Result<OfflineVoice> {
        let id = self.next_id;
        self.next_id += 1;
        let stopped = chain.stop_flag();
        self.destination
            .lock()
            .map_err(|_| anyhow::anyhow!("offline destination poisoned"))?
            .push((id, chain));
        debug!("offline voice {id} connected");
        Ok(OfflineVoice {
            id,
            stopped,
            destination: Arc::clone(&self.destination),
        })
    }
}

pub struct OfflineVoice {
    id: u64,
    stopped: Arc<AtomicBool>,
    destination: Destination,
}

impl Voice for OfflineVoice {
    fn stop(&mut self) -> Result<(), GraphError> {
        stop_source(&self.stopped)
    }

    fn disconnect(&mut self) {
        if let Ok(mut d) = self.destination.lock() {
            d.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Write mono f32 samples to a WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::GainParam;
    use crate::noise::NoiseBuffer;

    fn chain(ctx: &OfflineContext, gain: f32) -> GainedNoise {
        let buffer = NoiseBuffer::generate(0.1, ctx.sample_rate());
        let param = Arc::new(GainParam::new(gain, ctx.sample_rate()));
        GainedNoise::connect(buffer, param, ctx.clock().clone())
    }

    #[test]
    fn test_starts_suspended_and_resumes() {
        let mut ctx = OfflineContext::new(8_000);
        assert_eq!(ctx.state(), ContextState::Suspended);
        ctx.resume().unwrap();
        assert_eq!(ctx.state(), ContextState::Running);
    }

    #[test]
    fn test_render_without_voices_is_silent_and_advances_clock() {
        let mut ctx = OfflineContext::new(8_000);
        let out = ctx.render(4_000);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!((ctx.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_stop_and_disconnect() {
        let mut ctx = OfflineContext::new(8_000);
        let c = chain(&ctx, 1.0);
        let mut voice = ctx.connect(c).unwrap();
        assert_eq!(ctx.connected(), 1);
        assert!(ctx.render(100).iter().any(|&s| s != 0.0));

        voice.stop().unwrap();
        assert!(ctx.render(100).iter().all(|&s| s == 0.0));
        assert!(matches!(voice.stop(), Err(GraphError::AlreadyStopped)));

        voice.disconnect();
        voice.disconnect();
        assert_eq!(ctx.connected(), 0);
    }

    #[test]
    fn test_write_wav_roundtrip_length() {
        let path = std::env::temp_dir().join(format!("db_ab_player_test_{}.wav", std::process::id()));
        let samples = vec![0.25f32; 1_000];
        write_wav(&path, &samples, 8_000).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 1_000);
        let _ = std::fs::remove_file(&path);
    }
}
