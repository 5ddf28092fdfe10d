use std::sync::Arc;

use rand::Rng;

/// Length of the looped noise buffer.
pub const NOISE_SECONDS: f32 = 2.0;

/// One mono buffer of white noise, uniform in [-1, 1).
#[derive(Debug, Clone)]
pub struct NoiseBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl NoiseBuffer {
    pub fn generate(seconds: f32, sample_rate: u32) -> Self {
        Self::generate_with(&mut rand::rng(), seconds, sample_rate)
    }

    pub fn generate_with<R: Rng>(rng: &mut R, seconds: f32, sample_rate: u32) -> Self {
        let len = (seconds.max(0.0) * sample_rate as f32) as usize;
        let samples: Vec<f32> = (0..len).map(|_| rng.random_range(-1.0f32..1.0)).collect();
        NoiseBuffer {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Buffer-backed source that repeats its buffer forever.
#[derive(Debug, Clone)]
pub struct LoopingSource {
    buffer: NoiseBuffer,
    pos: usize,
}

impl LoopingSource {
    pub fn new(buffer: NoiseBuffer) -> Self {
        LoopingSource { buffer, pos: 0 }
    }

    pub fn buffer(&self) -> &NoiseBuffer {
        &self.buffer
    }

    pub fn next_sample(&mut self) -> f32 {
        if self.buffer.is_empty() {
            return 0.0;
        }
        let s = self.buffer.samples[self.pos];
        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_buffer_length_matches_duration() {
        for sr in [22_050u32, 44_100, 48_000] {
            let buf = NoiseBuffer::generate(NOISE_SECONDS, sr);
            assert_eq!(buf.len(), 2 * sr as usize, "length at {} Hz", sr);
            assert_eq!(buf.sample_rate(), sr);
        }
    }

    #[test]
    fn test_samples_in_half_open_range() {
        let buf = NoiseBuffer::generate(NOISE_SECONDS, 48_000);
        for &s in buf.samples() {
            assert!((-1.0..1.0).contains(&s), "sample {} out of [-1, 1)", s);
        }
    }

    #[test]
    fn test_noise_is_roughly_zero_mean_and_flat() {
        let mut rng = StdRng::seed_from_u64(7);
        let buf = NoiseBuffer::generate_with(&mut rng, NOISE_SECONDS, 48_000);
        let n = buf.len() as f64;
        let mean: f64 = buf.samples().iter().map(|&s| s as f64).sum::<f64>() / n;
        let power: f64 = buf.samples().iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / n;
        assert!(mean.abs() < 0.01, "mean {}", mean);
        // uniform on [-1, 1) has variance 1/3
        assert!((power - 1.0 / 3.0).abs() < 0.01, "power {}", power);
    }

    #[test]
    fn test_fresh_buffer_each_time() {
        let a = NoiseBuffer::generate(0.1, 8_000);
        let b = NoiseBuffer::generate(0.1, 8_000);
        assert_ne!(a.samples(), b.samples());
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = NoiseBuffer::generate_with(&mut StdRng::seed_from_u64(1), 0.1, 8_000);
        let b = NoiseBuffer::generate_with(&mut StdRng::seed_from_u64(1), 0.1, 8_000);
        assert_eq!(a.samples(), b.samples());
    }

    #[test]
    fn test_looping_source_wraps() {
        let buf = NoiseBuffer::generate_with(&mut StdRng::seed_from_u64(3), 0.001, 8_000);
        assert_eq!(buf.len(), 8);
        let mut src = LoopingSource::new(buf.clone());
        let out: Vec<f32> = (0..20).map(|_| src.next_sample()).collect();
        assert_eq!(&out[0..8], buf.samples());
        assert_eq!(&out[8..16], buf.samples());
        assert_eq!(&out[16..20], &buf.samples()[0..4]);
    }

    #[test]
    fn test_empty_buffer_is_silent() {
        let mut src = LoopingSource::new(NoiseBuffer::generate(0.0, 48_000));
        assert!(src.buffer().is_empty());
        assert_eq!(src.next_sample(), 0.0);
    }
}
