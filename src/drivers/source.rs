#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::thread;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::drivers::ScopeError;
/// Value type a stream advertises for its channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelFormat {
    Float32,
    Double64,
    Int8,
    Int16,
    Int32,
    Int64,
    /// Marker/event streams; never plotted.
    String,
}
impl ChannelFormat {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ChannelFormat::String)
    }
}
/// Immutable description of one stream offered by a catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub channel_count: usize,
    pub channel_format: ChannelFormat,
    /// Nominal rate in Hz; 0 means irregular.
    pub sample_rate_hz: f64,
}
/// One batch of samples as pulled from an inlet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    pub samples: Vec<Vec<f32>>, // samples x channels, NaN marks a missing value
    pub timestamps: Vec<f64>,
}
impl Chunk {
    pub fn new(samples: Vec<Vec<f32>>, timestamps: Vec<f64>) -> Self {
        Self {
            samples,
            timestamps,
        }
    }
    /// Empty pull: no data arrived before the timeout.
    pub fn empty() -> Self {
        Self::default()
    }
    pub fn has_data(&self) -> bool {
        !self.timestamps.is_empty()
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn num_channels(&self) -> usize {
        self.samples.first().map(|s| s.len()).unwrap_or(0)
    }
    pub fn validate(&self, expected_channels: usize) -> Result<(), ScopeError> {
        for sample in &self.samples {
            if sample.len() != expected_channels {
                return Err(ScopeError::ChannelMismatch {
                    expected: expected_channels,
                    actual: sample.len(),
                });
            }
        }
        Ok(())
    }
}
/// Open subscription to a selected stream.
pub trait StreamInlet {
    /// Pulls up to `max_samples`, waiting at most `timeout`. An empty chunk is a
    /// no-data tick; `Err` means the inlet itself is gone.
    fn pull_chunk(&mut self, max_samples: usize, timeout: Duration) -> Result<Chunk, ScopeError>;
}
impl<I: StreamInlet + ?Sized> StreamInlet for Box<I> {
    fn pull_chunk(&mut self, max_samples: usize, timeout: Duration) -> Result<Chunk, ScopeError> {
        (**self).pull_chunk(max_samples, timeout)
    }
}
/// Discovery side of a stream network.
pub trait StreamCatalog {
    /// Blocks up to `wait_time`; may return an empty list.
    fn resolve_sources(&self, wait_time: Duration) -> Vec<SourceDescriptor>;
    fn open_inlet(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Box<dyn StreamInlet + Send>, ScopeError>;
}
/// In-memory inlet useful for tests and deterministic playback.
#[cfg(test)]
pub struct ManualInlet {
    queue: VecDeque<Chunk>,
    close_when_drained: bool,
}
#[cfg(test)]
impl ManualInlet {
    pub fn new(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        Self {
            queue: chunks.into_iter().collect(),
            close_when_drained: false,
        }
    }
    /// Report a closed inlet instead of empty ticks once the queue runs dry.
    pub fn closing(mut self) -> Self {
        self.close_when_drained = true;
        self
    }
}
#[cfg(test)]
impl StreamInlet for ManualInlet {
    fn pull_chunk(&mut self, max_samples: usize, timeout: Duration) -> Result<Chunk, ScopeError> {
        match self.queue.pop_front() {
            Some(mut chunk) => {
                chunk.samples.truncate(max_samples);
                chunk.timestamps.truncate(max_samples);
                Ok(chunk)
            }
            None if self.close_when_drained => {
                Err(ScopeError::InletClosed("playback finished".into()))
            }
            None => {
                // a drained inlet behaves like a quiet stream: wait out the timeout
                thread::sleep(timeout);
                Ok(Chunk::empty())
            }
        }
    }
}
/// Catalog over a fixed descriptor list; every inlet replays the same chunks.
#[cfg(test)]
pub struct StaticCatalog {
    descriptors: Vec<SourceDescriptor>,
    chunks: Vec<Chunk>,
}
#[cfg(test)]
impl StaticCatalog {
    pub fn new(descriptors: Vec<SourceDescriptor>, chunks: Vec<Chunk>) -> Self {
        Self {
            descriptors,
            chunks,
        }
    }
}
#[cfg(test)]
impl StreamCatalog for StaticCatalog {
    fn resolve_sources(&self, _wait_time: Duration) -> Vec<SourceDescriptor> {
        self.descriptors.clone()
    }
    fn open_inlet(
        &self,
        _descriptor: &SourceDescriptor,
    ) -> Result<Box<dyn StreamInlet + Send>, ScopeError> {
        Ok(Box::new(ManualInlet::new(self.chunks.clone())))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn empty_timestamps_mean_no_data() {
        let chunk = Chunk::new(vec![vec![1.0]], vec![]);
        assert!(!chunk.has_data());
        assert!(Chunk::new(vec![vec![1.0]], vec![0.0]).has_data());
    }
    #[test]
    fn validate_rejects_ragged_samples() {
        let chunk = Chunk::new(vec![vec![1.0, 2.0], vec![3.0]], vec![0.0, 0.1]);
        assert!(matches!(
            chunk.validate(2),
            Err(ScopeError::ChannelMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
    #[test]
    fn manual_inlet_truncates_and_then_idles() {
        let chunk = Chunk::new(vec![vec![0.0]; 5], vec![0.0; 5]);
        let mut inlet = ManualInlet::new(vec![chunk]);
        let first = inlet.pull_chunk(3, Duration::from_millis(1)).unwrap();
        assert_eq!(first.len(), 3);
        assert!(!inlet.pull_chunk(3, Duration::from_millis(1)).unwrap().has_data());
    }
    #[test]
    fn closing_inlet_reports_fault() {
        let mut inlet = ManualInlet::new(Vec::new()).closing();
        assert!(matches!(
            inlet.pull_chunk(1, Duration::from_millis(1)),
            Err(ScopeError::InletClosed(_))
        ));
    }
}
