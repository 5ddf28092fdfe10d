//! Playback lifecycle: Idle -> Playing -> Idle.

use std::sync::Arc;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::automation::{GainParam, DECLICK_TIME_CONSTANT};
use crate::gain::{relative_gains, GainPair, Selector};
use crate::graph::{AudioContext, ContextState, GainedNoise, GraphError, Voice};
use crate::noise::{NoiseBuffer, NOISE_SECONDS};

type ContextFactory<C> = Box<dyn FnMut() -> anyhow::Result<C>>;

/// Live nodes of a playing session.
struct Playback<V> {
    gain: Arc<GainParam>,
    voice: V,
}

pub struct AudioSession<C: AudioContext> {
    factory: ContextFactory<C>,
    context: Option<C>,
    playback: Option<Playback<C::Voice>>,
    db_a: f32,
    db_b: f32,
    active: Selector,
    time_constant: f32,
    noise_seconds: f32,
    rng: Option<StdRng>,
}

impl<C: AudioContext> AudioSession<C> {
    /// The context is created by `factory` on the first `start()`.
    pub fn new<F>(factory: F, db_a: f32, db_b: f32, active: Selector) -> Self
    where
        F: FnMut() -> anyhow::Result<C> + 'static,
    {
        AudioSession {
            factory: Box::new(factory),
            context: None,
            playback: None,
            db_a,
            db_b,
            active,
            time_constant: DECLICK_TIME_CONSTANT,
            noise_seconds: NOISE_SECONDS,
            rng: None,
        }
    }

    pub fn with_time_constant(mut self, seconds: f32) -> Self {
        self.time_constant = seconds;
        self
    }

    pub fn with_noise_seconds(mut self, seconds: f32) -> Self {
        self.noise_seconds = seconds;
        self
    }

    /// Draw noise from a seeded generator instead of the thread RNG.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    pub fn active(&self) -> Selector {
        self.active
    }

    pub fn levels(&self) -> (f32, f32) {
        (self.db_a, self.db_b)
    }

    pub fn gains(&self) -> GainPair {
        relative_gains(self.db_a, self.db_b)
    }

    pub fn target_gain(&self) -> f32 {
        self.gains().select(self.active)
    }

    /// Gain node of the running session, if any.
    pub fn gain_param(&self) -> Option<Arc<GainParam>> {
        self.playback.as_ref().map(|p| Arc::clone(&p.gain))
    }

    pub fn context(&self) -> Option<&C> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut C> {
        self.context.as_mut()
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.playback.is_some() {
            return Ok(());
        }
        if self.context.is_none() {
            let ctx = (self.factory)()?;
            debug!("audio context created @ {} Hz", ctx.sample_rate());
            self.context = Some(ctx);
        }
        let target = self.target_gain();
        let noise_seconds = self.noise_seconds;
        let ctx = match self.context.as_mut() {
            Some(ctx) => ctx,
            None => return Err(GraphError::NoDevice.into()),
        };
        if ctx.state() == ContextState::Suspended {
            ctx.resume()?;
        }

        let sample_rate = ctx.sample_rate();
        let gain = Arc::new(GainParam::new(target, sample_rate));
        let buffer = match self.rng.as_mut() {
            Some(rng) => NoiseBuffer::generate_with(rng, noise_seconds, sample_rate),
            None => NoiseBuffer::generate(noise_seconds, sample_rate),
        };
        let chain = GainedNoise::connect(buffer, Arc::clone(&gain), ctx.clock().clone());
        let voice = ctx.connect(chain)?;

        self.playback = Some(Playback { gain, voice });
        info!("▶ playing {} (gain {:.3})", self.active, target);
        self.apply_target();
        Ok(())
    }

    pub fn stop(&mut self) {
        let Some(mut playback) = self.playback.take() else {
            return;
        };
        if let Err(e) = playback.voice.stop() {
            debug!("stop: {e}");
        }
        playback.voice.disconnect();
        info!("■ stopped");
    }

    /// Smoothly move the live gain toward `target`. Best effort.
    pub fn retarget(&self, target: f32) -> Result<(), GraphError> {
        let playback = self.playback.as_ref().ok_or(GraphError::NotPlaying)?;
        let now = self.context.as_ref().map_or(0.0, |c| c.current_time());
        playback.gain.cancel_scheduled_values(now);
        playback.gain.set_target_at_time(target, now, self.time_constant);
        Ok(())
    }

    pub fn set_active(&mut self, active: Selector) {
        self.active = active;
        self.apply_target();
    }

    pub fn set_level(&mut self, which: Selector, db: f32) {
        match which {
            Selector::A => self.db_a = db,
            Selector::B => self.db_b = db,
        }
        self.apply_target();
    }

    pub fn set_levels(&mut self, db_a: f32, db_b: f32) {
        self.db_a = db_a;
        self.db_b = db_b;
        self.apply_target();
    }

    fn apply_target(&self) {
        if self.playback.is_none() {
            return;
        }
        let target = self.target_gain();
        if let Err(e) = self.retarget(target) {
            debug!("retarget to {target:.3} skipped: {e}");
        }
    }
}

impl<C: AudioContext> Drop for AudioSession<C> {
    fn drop(&mut self) {
        self.stop();
    }
}
