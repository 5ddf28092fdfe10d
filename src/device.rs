//! Output through a real sound card.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use log::{debug, info};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source};

use crate::graph::{stop_source, AudioClock, AudioContext, ContextState, GainedNoise, GraphError, Voice};

/// Names of the host's output devices.
pub fn output_device_names() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|it| it.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

fn find_device(name: Option<&str>) -> Result<cpal::Device, GraphError> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| GraphError::Stream(e.to_string()))?
            .find(|d| d.name().map_or(false, |n| n == name))
            .ok_or_else(|| GraphError::DeviceNotFound(name.to_string())),
        None => host.default_output_device().ok_or(GraphError::NoDevice),
    }
}

pub struct DeviceContext {
    device: cpal::Device,
    device_name: String,
    sample_rate: u32,
    stream: Option<OutputStream>,
    clock: AudioClock,
}

impl DeviceContext {
    /// Picks the device and its default rate; the stream opens on `resume`.
    pub fn new(device_name: Option<&str>) -> anyhow::Result<Self> {
        let device = find_device(device_name)?;
        let config = device.default_output_config()?;
        let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
        Ok(DeviceContext {
            device,
            device_name: name,
            sample_rate: config.sample_rate().0,
            stream: None,
            clock: AudioClock::default(),
        })
    }
}

impl AudioContext for DeviceContext {
    type Voice = DeviceVoice;

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn state(&self) -> ContextState {
        if self.stream.is_some() {
            ContextState::Running
        } else {
            ContextState::Suspended
        }
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let mut stream = open_on(&self.device, |d| {
            OutputStreamBuilder::from_device(d).and_then(|b| b.open_stream())
        })?;
        stream.log_on_drop(false);
        info!("Output: {} @ {} Hz", self.device_name, self.sample_rate);
        self.stream = Some(stream);
        Ok(())
    }

    fn clock(&self) -> &AudioClock {
        &self.clock
    }

    fn connect(&mut self, chain: GainedNoise) -> anyhow::Result<DeviceVoice> {
        let stream = self.stream.as_ref().ok_or(GraphError::Stream("context suspended".into()))?;
        let stopped = chain.stop_flag();
        let sink = Sink::connect_new(stream.mixer());
        sink.append(DeviceSource { chain });
        sink.play();
        Ok(DeviceVoice {
            sink: Some(sink),
            stopped,
        })
    }
}

/// Opens a stream on a copy of `device`; the caller keeps the original so a
/// failed open can be retried and reports the real error again.
fn open_on<D: Clone, S, E: ToString>(device: &D, open: impl FnOnce(D) -> Result<S, E>) -> Result<S, GraphError> {
    open(device.clone()).map_err(|e| GraphError::Stream(e.to_string()))
}

/// Adapts the chain to rodio, ticking the audio clock as samples are pulled.
struct DeviceSource {
    chain: GainedNoise,
}

impl Iterator for DeviceSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let frame = self.chain.clock().tick();
        self.chain.render(frame)
    }
}

impl Source for DeviceSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> rodio::ChannelCount {
        1
    }

    fn sample_rate(&self) -> rodio::SampleRate {
        self.chain.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

pub struct DeviceVoice {
    sink: Option<Sink>,
    stopped: Arc<AtomicBool>,
}

impl Voice for DeviceVoice {
    fn stop(&mut self) -> Result<(), GraphError> {
        let result = stop_source(&self.stopped);
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        result
    }

    fn disconnect(&mut self) {
        if let Some(sink) = self.sink.take() {
            debug!("Audio output: detaching sink ({} sources queued)", sink.len());
            drop(sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::GainParam;
    use crate::noise::NoiseBuffer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chain(sample_rate: u32) -> GainedNoise {
        let buffer = NoiseBuffer::generate_with(&mut StdRng::seed_from_u64(5), 0.01, sample_rate);
        let gain = Arc::new(GainParam::new(0.5, sample_rate));
        GainedNoise::connect(buffer, gain, AudioClock::default())
    }

    #[test]
    fn test_source_ticks_clock_per_sample() {
        let mut source = DeviceSource { chain: chain(8_000) };
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 8_000);
        assert_eq!(source.total_duration(), None);

        for i in 0..100u64 {
            assert_eq!(source.chain.clock().frames(), i);
            let s = source.next().unwrap();
            assert!(s.abs() <= 0.5, "sample {} exceeds gain", s);
        }
        assert_eq!(source.chain.clock().frames(), 100);
    }

    #[test]
    fn test_voice_stop_ends_source() {
        let chain = chain(8_000);
        let (sink, _queue) = Sink::new();
        let mut voice = DeviceVoice {
            sink: Some(sink),
            stopped: chain.stop_flag(),
        };
        let mut source = DeviceSource { chain };
        assert!(source.next().is_some());

        voice.stop().unwrap();
        assert_eq!(source.next(), None);
        assert!(matches!(voice.stop(), Err(GraphError::AlreadyStopped)));

        voice.disconnect();
        voice.disconnect();
        assert!(voice.sink.is_none());
    }

    #[test]
    fn test_failed_open_keeps_device() {
        let device = "hw:1".to_string();
        for _ in 0..2 {
            let err = open_on(&device, |d| Err::<(), _>(format!("{d} busy"))).unwrap_err();
            assert!(
                matches!(&err, GraphError::Stream(msg) if msg == "hw:1 busy"),
                "unexpected error {:?}", err
            );
        }
        let opened = open_on(&device, |d| Ok::<_, String>(d.len())).unwrap();
        assert_eq!(opened, 4);
        assert_eq!(device, "hw:1");
    }
}
