use crate::drivers::Chunk;
/// Detrend/rescale state for every channel of the active stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelScaling {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}
impl ChannelScaling {
    pub fn channel_count(&self) -> usize {
        self.mean.len()
    }
    /// Detrend and rescale in place. NaN stays NaN.
    pub fn apply(&self, chunk: &mut Chunk) {
        for sample in &mut chunk.samples {
            for (k, value) in sample.iter_mut().enumerate() {
                if let (Some(mean), Some(scale)) = (self.mean.get(k), self.scale.get(k)) {
                    *value = (*value - mean) * scale;
                }
            }
        }
    }
    /// Multiply every scale factor by `ratio` (lane height changed).
    pub fn rescale(&mut self, ratio: f32) {
        for scale in &mut self.scale {
            *scale *= ratio;
        }
    }
}
/// Per-sweep online estimator: recomputed from the first chunk of each sweep.
#[derive(Clone, Debug)]
pub struct ScalingEstimator {
    headroom: f32,
    epsilon: f64,
    state: Option<ChannelScaling>,
}
impl ScalingEstimator {
    pub fn new(headroom: f32, epsilon: f64) -> Self {
        Self {
            headroom,
            epsilon,
            state: None,
        }
    }
    #[cfg(test)]
    pub fn current(&self) -> Option<&ChannelScaling> {
        self.state.as_ref()
    }
    pub fn current_mut(&mut self) -> Option<&mut ChannelScaling> {
        self.state.as_mut()
    }
    /// Recomputes when `sweep_index` is 0 or nothing has been computed yet,
    /// otherwise keeps the scaling of the running sweep.
    pub fn update(&mut self, sweep_index: usize, chunk: &Chunk, channel_height: f32) -> &ChannelScaling {
        let channels = chunk.num_channels();
        let due = match &self.state {
            None => true,
            Some(state) => sweep_index == 0 || state.channel_count() != channels,
        };
        let scaling = match self.state.take() {
            Some(state) if !due => state,
            _ => {
                let fresh = self.estimate(chunk, channel_height);
                log::debug!(
                    "rescaled {} channels at sweep index {}",
                    fresh.channel_count(),
                    sweep_index
                );
                fresh
            }
        };
        self.state.insert(scaling)
    }
    fn estimate(&self, chunk: &Chunk, channel_height: f32) -> ChannelScaling {
        let channels = chunk.num_channels();
        let mut mean = Vec::with_capacity(channels);
        let mut scale = Vec::with_capacity(channels);
        for k in 0..channels {
            let finite = || chunk.samples.iter().map(move |s| s[k] as f64).filter(|v| !v.is_nan());
            let count = finite().count();
            let channel_mean = if count == 0 {
                0.0
            } else {
                finite().sum::<f64>() / count as f64
            };
            let (min, max) = finite().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                let d = v - channel_mean;
                (lo.min(d), hi.max(d))
            });
            let range = if count == 0 { 0.0 } else { max - min };
            let factor = channel_height as f64 * self.headroom as f64 / (range + self.epsilon);
            mean.push(channel_mean as f32);
            scale.push(clamp_finite(factor));
        }
        ChannelScaling { mean, scale }
    }
}
fn clamp_finite(factor: f64) -> f32 {
    let narrowed = factor as f32;
    if narrowed.is_finite() && narrowed > 0.0 {
        narrowed
    } else if factor > 0.0 {
        f32::MAX
    } else {
        f32::MIN_POSITIVE
    }
}
