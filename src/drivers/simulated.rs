use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use crate::drivers::{ChannelFormat, Chunk, ScopeError, SourceDescriptor, StreamCatalog, StreamInlet};
/// Synthetic stream advertised by the built-in catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedStream {
    pub name: String,
    pub channel_count: usize,
    pub channel_format: ChannelFormat,
    pub sample_rate_hz: f64,
    /// Peak amplitude of the per-channel sine.
    pub amplitude: f32,
    /// Standard deviation-ish spread of the uniform noise.
    pub noise: f32,
    /// Chance that a sample is delivered as NaN.
    pub dropout_probability: f64,
}
impl Default for SimulatedStream {
    fn default() -> Self {
        Self {
            name: "SimulatedEEG".to_owned(),
            channel_count: 8,
            channel_format: ChannelFormat::Float32,
            sample_rate_hz: 250.0,
            amplitude: 50.0,
            noise: 5.0,
            dropout_probability: 0.0005,
        }
    }
}
impl SimulatedStream {
    pub fn markers() -> Self {
        Self {
            name: "Markers".to_owned(),
            channel_count: 1,
            channel_format: ChannelFormat::String,
            sample_rate_hz: 0.0,
            ..Self::default()
        }
    }
    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            name: self.name.clone(),
            channel_count: self.channel_count,
            channel_format: self.channel_format,
            sample_rate_hz: self.sample_rate_hz,
        }
    }
}
/// Catalog that serves a fixed set of synthetic streams in real time.
pub struct SimulatedCatalog {
    streams: Vec<SimulatedStream>,
}
impl SimulatedCatalog {
    pub fn new(streams: Vec<SimulatedStream>) -> Self {
        Self { streams }
    }
}
impl StreamCatalog for SimulatedCatalog {
    fn resolve_sources(&self, _wait_time: Duration) -> Vec<SourceDescriptor> {
        self.streams.iter().map(SimulatedStream::descriptor).collect()
    }
    fn open_inlet(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Box<dyn StreamInlet + Send>, ScopeError> {
        let stream = self
            .streams
            .iter()
            .find(|s| s.name == descriptor.name)
            .ok_or_else(|| ScopeError::InletClosed(format!("unknown stream '{}'", descriptor.name)))?;
        if !stream.channel_format.is_numeric() || stream.sample_rate_hz <= 0.0 {
            return Err(ScopeError::InletClosed(format!(
                "stream '{}' cannot be simulated",
                stream.name
            )));
        }
        Ok(Box::new(SimulatedInlet::new(stream.clone(), rand::random())))
    }
}
/// Wall-clock paced generator: a sample becomes available every `1/rate` s.
pub struct SimulatedInlet {
    stream: SimulatedStream,
    rng: StdRng,
    started: Instant,
    emitted: u64,
}
impl SimulatedInlet {
    pub fn new(stream: SimulatedStream, seed: u64) -> Self {
        Self {
            stream,
            rng: StdRng::seed_from_u64(seed),
            started: Instant::now(),
            emitted: 0,
        }
    }
    fn due(&self) -> u64 {
        let produced = self.started.elapsed().as_secs_f64() * self.stream.sample_rate_hz;
        (produced as u64).saturating_sub(self.emitted)
    }
    fn next_sample(&mut self) -> (Vec<f32>, f64) {
        let t = self.emitted as f64 / self.stream.sample_rate_hz;
        let sample = (0..self.stream.channel_count)
            .map(|k| {
                if self.rng.gen_bool(self.stream.dropout_probability.clamp(0.0, 1.0)) {
                    return f32::NAN;
                }
                let freq = 2.0 + 1.5 * k as f64;
                let wave = (TAU * freq * t).sin() as f32 * self.stream.amplitude;
                let noise = if self.stream.noise > 0.0 {
                    self.rng.gen_range(-self.stream.noise..self.stream.noise)
                } else {
                    0.0
                };
                wave + noise + 10.0 * k as f32
            })
            .collect();
        self.emitted += 1;
        (sample, t)
    }
}
impl StreamInlet for SimulatedInlet {
    fn pull_chunk(&mut self, max_samples: usize, timeout: Duration) -> Result<Chunk, ScopeError> {
        let deadline = Instant::now() + timeout;
        let wanted = max_samples.max(1) as u64;
        loop {
            let due = self.due();
            if due >= wanted || Instant::now() >= deadline {
                break;
            }
            let missing = (wanted - due) as f64 / self.stream.sample_rate_hz;
            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(Duration::from_secs_f64(missing).min(remaining).max(Duration::from_micros(200)));
        }
        let take = self.due().min(max_samples as u64);
        let mut chunk = Chunk::empty();
        for _ in 0..take {
            let (sample, t) = self.next_sample();
            chunk.samples.push(sample);
            chunk.timestamps.push(t);
        }
        Ok(chunk)
    }
}
