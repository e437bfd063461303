use crate::drivers::Chunk;
/// Block-averaging decimator for sources faster than the display needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Downsampler {
    factor: usize,
    output_len: usize,
}
impl Downsampler {
    pub fn new(chunk_size: usize, factor: usize) -> Self {
        let factor = factor.max(1);
        Self {
            factor,
            output_len: chunk_size / factor,
        }
    }
    pub fn factor(&self) -> usize {
        self.factor
    }
    pub fn output_len(&self) -> usize {
        self.output_len
    }
    /// Averages consecutive blocks of `factor` samples per channel. A short
    /// final block is divided by its real length. NaN propagates into the mean.
    pub fn apply(&self, chunk: &Chunk) -> Chunk {
        let n = chunk.len();
        let blocks = self.output_len.min((n + self.factor - 1) / self.factor);
        let channels = chunk.num_channels();
        let mut samples = Vec::with_capacity(blocks);
        let mut timestamps = Vec::with_capacity(blocks);
        for m in 0..blocks {
            let start = m * self.factor;
            let end = ((m + 1) * self.factor).min(n);
            let block = &chunk.samples[start..end];
            let len = block.len() as f64;
            let averaged: Vec<f32> = (0..channels)
                .map(|k| {
                    let sum: f64 = block.iter().map(|s| s[k] as f64).sum();
                    (sum / len) as f32
                })
                .collect();
            samples.push(averaged);
            if let Some(ts) = chunk.timestamps.get(start) {
                timestamps.push(*ts);
            }
        }
        Chunk::new(samples, timestamps)
    }
}
