// src/engine.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use crate::config::{ScopeConfig, SweepConfig};
use crate::drivers::{
    Downsampler, ScopeError, SourceDescriptor, StreamCatalog, StreamInlet, SweepIndex,
};
use crate::types::{PublishedChunk, ScopeMessage};

const PUBLISH_BACKOFF: Duration = Duration::from_millis(2);

/// Called after every publish so the render side wakes up.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// First stream with a numeric channel format.
pub fn select_source(sources: &[SourceDescriptor]) -> Result<usize, ScopeError> {
    sources
        .iter()
        .position(|s| s.channel_format.is_numeric())
        .ok_or(ScopeError::NoPlottableStream)
}

/// Pull parameters derived once from the selected stream.
#[derive(Clone, Debug, PartialEq)]
pub struct AcquisitionPlan {
    pub channel_count: usize,
    pub sample_rate_hz: u32,
    pub chunk_size: usize,
    pub chunks_per_screen: usize,
    pub downsampler: Option<Downsampler>,
}
impl AcquisitionPlan {
    pub fn derive(
        descriptor: &SourceDescriptor,
        sweep: &SweepConfig,
        downsample_threshold_hz: u32,
    ) -> Result<Self, ScopeError> {
        let sample_rate_hz = descriptor.sample_rate_hz.round();
        if !(sample_rate_hz >= 1.0) {
            return Err(ScopeError::IrregularSampleRate {
                name: descriptor.name.clone(),
            });
        }
        let sample_rate_hz = sample_rate_hz as u32;
        let chunks_per_screen = sweep.chunks_per_screen.max(1);
        let chunk_size = (sample_rate_hz as f64 / chunks_per_screen as f64
            * sweep.seconds_per_screen)
            .round()
            .max(1.0) as usize;
        let threshold = downsample_threshold_hz.max(1);
        let downsampler = (sample_rate_hz > threshold).then(|| {
            let factor = (sample_rate_hz as f64 / threshold as f64).round() as usize;
            Downsampler::new(chunk_size, factor)
        });
        if let Some(d) = downsampler.filter(|d| d.output_len() == 0) {
            return Err(ScopeError::InvalidConfig(format!(
                "chunk of {chunk_size} samples is shorter than the downsampling factor {} for '{}'",
                d.factor(),
                descriptor.name
            )));
        }
        Ok(Self {
            channel_count: descriptor.channel_count,
            sample_rate_hz,
            chunk_size,
            chunks_per_screen,
            downsampler,
        })
    }
    /// Samples per channel in a full published chunk.
    pub fn published_len(&self) -> usize {
        self.downsampler
            .map(|d| d.output_len())
            .unwrap_or(self.chunk_size)
    }
}

/// Producer side: pulls, downsamples, and tags chunks with their slice.
pub struct AcquisitionLoop<I: StreamInlet> {
    inlet: I,
    plan: AcquisitionPlan,
    sweep: SweepIndex,
    pull_timeout: Duration,
}
impl<I: StreamInlet> AcquisitionLoop<I> {
    pub fn new(inlet: I, plan: AcquisitionPlan, pull_timeout: Duration) -> Self {
        let sweep = SweepIndex::new(plan.chunks_per_screen);
        Self {
            inlet,
            plan,
            sweep,
            pull_timeout,
        }
    }
    #[cfg(test)]
    pub fn sweep_index(&self) -> usize {
        self.sweep.get()
    }
    /// One tick. `Ok(None)` is a no-data tick and leaves the sweep index alone.
    /// A chunk with the wrong channel count is rejected before downsampling
    /// and does not advance the index either.
    pub fn pump_once(&mut self) -> Result<Option<PublishedChunk>, ScopeError> {
        let chunk = self
            .inlet
            .pull_chunk(self.plan.chunk_size, self.pull_timeout)?;
        if !chunk.has_data() {
            return Ok(None);
        }
        chunk.validate(self.plan.channel_count)?;
        let chunk = match &self.plan.downsampler {
            Some(downsampler) => downsampler.apply(&chunk),
            None => chunk,
        };
        let published = PublishedChunk {
            sweep_index: self.sweep.get(),
            chunk,
        };
        self.sweep.advance();
        Ok(Some(published))
    }
    fn run(mut self, mut publisher: Publisher, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::Relaxed) {
            match self.pump_once() {
                Ok(None) => continue,
                Ok(Some(published)) => {
                    log::trace!(
                        "publishing {} samples at slice {}",
                        published.chunk.len(),
                        published.sweep_index
                    );
                    if !publisher.publish(ScopeMessage::Chunk(published)) {
                        break;
                    }
                }
                Err(e @ ScopeError::ChannelMismatch { .. }) => {
                    log::warn!("dropping malformed chunk: {e}");
                }
                Err(e) => {
                    log::error!("inlet failed: {e}");
                    publisher.publish(ScopeMessage::InletLost(e.to_string()));
                    break;
                }
            }
        }
        log::info!("acquisition loop stopped");
    }
}

// Bounded hand-off; a full queue blocks the producer until the GUI catches up.
struct Publisher {
    tx: SyncSender<ScopeMessage>,
    stop: Arc<AtomicBool>,
    waker: Option<Waker>,
    backpressure_logged: bool,
}
impl Publisher {
    /// `false` once the receiver is gone or a stop was requested while waiting.
    fn publish(&mut self, mut message: ScopeMessage) -> bool {
        loop {
            match self.tx.try_send(message) {
                Ok(()) => {
                    if let Some(wake) = &self.waker {
                        wake();
                    }
                    return true;
                }
                Err(TrySendError::Full(pending)) => {
                    if self.stop.load(Ordering::Relaxed) {
                        return false;
                    }
                    if !self.backpressure_logged {
                        log::warn!("render side is behind, acquisition is waiting");
                        self.backpressure_logged = true;
                    }
                    message = pending;
                    thread::sleep(PUBLISH_BACKOFF);
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::debug!("chunk receiver dropped");
                    return false;
                }
            }
        }
    }
}

/// Owner of a running acquisition thread.
pub struct AcquisitionHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    join_timeout: Duration,
    sources: Vec<SourceDescriptor>,
    selected: usize,
    plan: AcquisitionPlan,
}
impl AcquisitionHandle {
    /// Every stream seen at resolution time.
    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }
    pub fn selected_index(&self) -> usize {
        self.selected
    }
    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.sources[self.selected]
    }
    pub fn plan(&self) -> &AcquisitionPlan {
        &self.plan
    }
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }
    /// Signals the loop and waits up to the join timeout. Returns `false` if
    /// the thread had to be detached.
    pub fn shutdown(&mut self) -> bool {
        self.stop.store(true, Ordering::Relaxed);
        let Some(thread) = self.thread.take() else {
            return true;
        };
        let deadline = Instant::now() + self.join_timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "acquisition thread did not stop within {:?}, detaching",
                    self.join_timeout
                );
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        if thread.join().is_err() {
            log::error!("acquisition thread panicked");
        }
        true
    }
}
impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resolves the catalog, selects a plottable stream, opens it, and starts the
/// acquisition thread. Nothing is spawned when selection fails.
pub fn start<C: StreamCatalog + ?Sized>(
    catalog: &C,
    config: &ScopeConfig,
    waker: Option<Waker>,
) -> Result<(AcquisitionHandle, Receiver<ScopeMessage>), ScopeError> {
    let sources = catalog.resolve_sources(config.acquisition.resolve_wait());
    for skipped in sources.iter().filter(|s| !s.channel_format.is_numeric()) {
        log::debug!("skipping non-numeric stream '{}'", skipped.name);
    }
    let selected = select_source(&sources)?;
    let descriptor = sources[selected].clone();
    let plan = AcquisitionPlan::derive(
        &descriptor,
        &config.sweep,
        config.acquisition.downsample_threshold_hz,
    )?;
    let inlet = catalog.open_inlet(&descriptor)?;
    log::info!(
        "streaming '{}': {} ch @ {} Hz, chunk {} samples{}",
        descriptor.name,
        descriptor.channel_count,
        plan.sample_rate_hz,
        plan.chunk_size,
        plan.downsampler
            .map(|d| format!(", downsampled x{}", d.factor()))
            .unwrap_or_default()
    );
    let (tx, rx) = sync_channel(config.acquisition.queue_capacity.max(1));
    let stop = Arc::new(AtomicBool::new(false));
    let publisher = Publisher {
        tx,
        stop: Arc::clone(&stop),
        waker,
        backpressure_logged: false,
    };
    let acquisition = AcquisitionLoop::new(inlet, plan.clone(), config.acquisition.pull_timeout());
    let loop_stop = Arc::clone(&stop);
    let thread = thread::Builder::new()
        .name(format!("acquisition-{}", descriptor.name))
        .spawn(move || acquisition.run(publisher, loop_stop))?;
    let handle = AcquisitionHandle {
        stop,
        thread: Some(thread),
        join_timeout: config.acquisition.join_timeout(),
        sources,
        selected,
        plan,
    };
    Ok((handle, rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{ChannelFormat, Chunk, ManualInlet, StaticCatalog};
    use std::sync::atomic::AtomicUsize;

    fn descriptor(name: &str, channels: usize, format: ChannelFormat, rate: f64) -> SourceDescriptor {
        SourceDescriptor {
            name: name.to_owned(),
            channel_count: channels,
            channel_format: format,
            sample_rate_hz: rate,
        }
    }
    fn synthetic(n: usize, channels: usize) -> Chunk {
        let samples = (0..n)
            .map(|i| (0..channels).map(|k| (i + k) as f32).collect())
            .collect();
        Chunk::new(samples, (0..n).map(|i| i as f64).collect())
    }
    fn fast_config() -> ScopeConfig {
        let mut config = ScopeConfig::default();
        config.acquisition.pull_timeout_secs = 0.005;
        config.acquisition.resolve_wait_secs = 0.01;
        config
    }
    fn plan_for(rate: f64, channels: usize) -> AcquisitionPlan {
        let d = descriptor("s", channels, ChannelFormat::Float32, rate);
        AcquisitionPlan::derive(&d, &SweepConfig::default(), 1000).unwrap()
    }

    #[test]
    fn selection_skips_string_streams() {
        let sources = vec![
            descriptor("markers", 1, ChannelFormat::String, 0.0),
            descriptor("eeg", 8, ChannelFormat::Float32, 250.0),
            descriptor("emg", 2, ChannelFormat::Int16, 500.0),
        ];
        assert_eq!(select_source(&sources).unwrap(), 1);
    }
    #[test]
    fn selection_fails_without_numeric_stream() {
        let only_markers = vec![descriptor("markers", 1, ChannelFormat::String, 0.0)];
        assert!(matches!(select_source(&only_markers), Err(ScopeError::NoPlottableStream)));
        assert!(matches!(select_source(&[]), Err(ScopeError::NoPlottableStream)));
    }
    #[test]
    fn plan_for_250_hz_needs_no_downsampling() {
        let plan = plan_for(250.0, 1);
        assert_eq!(plan.sample_rate_hz, 250);
        assert_eq!(plan.chunk_size, 10);
        assert!(plan.downsampler.is_none());
    }
    #[test]
    fn plan_for_2_khz_halves_the_rate() {
        let plan = plan_for(2000.0, 1);
        assert_eq!(plan.chunk_size, 80);
        assert_eq!(plan.downsampler.map(|d| d.factor()), Some(2));
        assert_eq!(plan.published_len(), 40);
    }
    #[test]
    fn irregular_rate_is_rejected() {
        let d = descriptor("irregular", 2, ChannelFormat::Double64, 0.0);
        assert!(matches!(
            AcquisitionPlan::derive(&d, &SweepConfig::default(), 1000),
            Err(ScopeError::IrregularSampleRate { .. })
        ));
    }
    #[test]
    fn pump_publishes_unchanged_chunk_and_advances() {
        let chunk = synthetic(10, 4);
        let inlet = ManualInlet::new(vec![chunk.clone()]);
        let mut acq = AcquisitionLoop::new(inlet, plan_for(250.0, 4), Duration::from_millis(1));
        let published = acq.pump_once().unwrap().unwrap();
        assert_eq!(published.sweep_index, 0);
        assert_eq!(published.chunk, chunk);
        assert_eq!(acq.sweep_index(), 1);
    }
    #[test]
    fn empty_tick_keeps_index() {
        let mut acq = AcquisitionLoop::new(ManualInlet::new(Vec::new()), plan_for(250.0, 1), Duration::from_millis(1));
        assert!(acq.pump_once().unwrap().is_none());
        assert_eq!(acq.sweep_index(), 0);
    }
    #[test]
    fn fast_source_is_downsampled_before_publish() {
        let inlet = ManualInlet::new(vec![synthetic(80, 1)]);
        let mut acq = AcquisitionLoop::new(inlet, plan_for(2000.0, 1), Duration::from_millis(1));
        let published = acq.pump_once().unwrap().unwrap();
        assert_eq!(published.chunk.len(), 40);
        assert_eq!(published.chunk.samples[0], vec![0.5]);
    }
    #[test]
    fn sweep_index_wraps_to_zero() {
        let chunks = (0..51).map(|_| synthetic(10, 1));
        let mut acq = AcquisitionLoop::new(ManualInlet::new(chunks), plan_for(250.0, 1), Duration::from_millis(1));
        let indices: Vec<usize> = (0..51)
            .map(|_| acq.pump_once().unwrap().unwrap().sweep_index)
            .collect();
        assert_eq!(indices[49], 49);
        assert_eq!(indices[50], 0);
    }
    #[test]
    fn start_refuses_catalog_without_plottable_stream() {
        let catalog = StaticCatalog::new(
            vec![descriptor("markers", 1, ChannelFormat::String, 0.0)],
            vec![synthetic(10, 1)],
        );
        let result = start(&catalog, &fast_config(), None);
        assert!(matches!(result, Err(ScopeError::NoPlottableStream)));
    }
    #[test]
    fn started_thread_delivers_in_order_and_stops() {
        let catalog = StaticCatalog::new(
            vec![
                descriptor("markers", 1, ChannelFormat::String, 0.0),
                descriptor("eeg", 2, ChannelFormat::Float32, 250.0),
            ],
            (0..3).map(|_| synthetic(10, 2)).collect(),
        );
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let waker: Waker = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (mut handle, rx) = start(&catalog, &fast_config(), Some(waker)).unwrap();
        assert_eq!(handle.selected_index(), 1);
        assert_eq!(handle.descriptor().name, "eeg");
        assert_eq!(handle.sources().len(), 2);
        let indices: Vec<usize> = (0..3)
            .map(|_| match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                ScopeMessage::Chunk(p) => p.sweep_index,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(handle.shutdown());
        assert!(!handle.is_running());
        assert_eq!(wakes.load(Ordering::SeqCst), 3);
    }
    #[test]
    fn full_queue_blocks_without_dropping() {
        let mut config = fast_config();
        config.acquisition.queue_capacity = 1;
        let catalog = StaticCatalog::new(
            vec![descriptor("eeg", 1, ChannelFormat::Float32, 250.0)],
            (0..5).map(|_| synthetic(10, 1)).collect(),
        );
        let (mut handle, rx) = start(&catalog, &config, None).unwrap();
        thread::sleep(Duration::from_millis(50));
        let mut indices = Vec::new();
        while indices.len() < 5 {
            if let ScopeMessage::Chunk(p) = rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                indices.push(p.sweep_index);
            }
        }
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(handle.shutdown());
    }
    #[test]
    fn stop_is_honoured_while_queue_is_full() {
        let mut config = fast_config();
        config.acquisition.queue_capacity = 1;
        let catalog = StaticCatalog::new(
            vec![descriptor("eeg", 1, ChannelFormat::Float32, 250.0)],
            (0..5).map(|_| synthetic(10, 1)).collect(),
        );
        let (mut handle, _rx) = start(&catalog, &config, None).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(handle.shutdown());
    }
    #[test]
    fn inlet_fault_is_published_distinctly() {
        let inlet = ManualInlet::new(vec![synthetic(10, 1)]).closing();
        let acq = AcquisitionLoop::new(inlet, plan_for(250.0, 1), Duration::from_millis(1));
        let (tx, rx) = sync_channel(4);
        let stop = Arc::new(AtomicBool::new(false));
        let publisher = Publisher {
            tx,
            stop: Arc::clone(&stop),
            waker: None,
            backpressure_logged: false,
        };
        acq.run(publisher, stop);
        assert!(matches!(rx.recv().unwrap(), ScopeMessage::Chunk(_)));
        assert!(matches!(rx.recv().unwrap(), ScopeMessage::InletLost(_)));
    }
    #[test]
    fn ragged_chunk_is_rejected_before_downsampling() {
        let ragged = Chunk::new(vec![vec![1.0, 2.0], vec![3.0]], vec![0.0, 0.001]);
        let inlet = ManualInlet::new(vec![ragged, synthetic(80, 2)]);
        let mut acq = AcquisitionLoop::new(inlet, plan_for(2000.0, 2), Duration::from_millis(1));
        assert!(matches!(
            acq.pump_once(),
            Err(ScopeError::ChannelMismatch { expected: 2, actual: 1 })
        ));
        assert_eq!(acq.sweep_index(), 0);
        let published = acq.pump_once().unwrap().unwrap();
        assert_eq!(published.sweep_index, 0);
        assert_eq!(published.chunk.len(), 40);
    }
    #[test]
    fn malformed_chunk_does_not_end_acquisition() {
        let ragged = Chunk::new(vec![vec![1.0], vec![]], vec![0.0, 0.1]);
        let inlet = ManualInlet::new(vec![ragged, synthetic(10, 1)]).closing();
        let acq = AcquisitionLoop::new(inlet, plan_for(250.0, 1), Duration::from_millis(1));
        let (tx, rx) = sync_channel(4);
        let stop = Arc::new(AtomicBool::new(false));
        let publisher = Publisher {
            tx,
            stop: Arc::clone(&stop),
            waker: None,
            backpressure_logged: false,
        };
        acq.run(publisher, stop);
        match rx.recv().unwrap() {
            ScopeMessage::Chunk(p) => assert_eq!(p.sweep_index, 0),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.recv().unwrap(), ScopeMessage::InletLost(_)));
    }
    #[test]
    fn chunk_shorter_than_factor_is_rejected() {
        let d = descriptor("fast", 1, ChannelFormat::Float32, 2000.0);
        let sweep = SweepConfig {
            chunks_per_screen: 1000,
            seconds_per_screen: 0.5,
        };
        assert!(matches!(
            AcquisitionPlan::derive(&d, &sweep, 1000),
            Err(ScopeError::InvalidConfig(_))
        ));
    }
}
