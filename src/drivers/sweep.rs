/// Position of the chunk-slot being written, wrapping once per screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepIndex {
    value: usize,
    chunks_per_screen: usize,
}
impl SweepIndex {
    pub fn new(chunks_per_screen: usize) -> Self {
        Self {
            value: 0,
            chunks_per_screen: chunks_per_screen.max(1),
        }
    }
    pub fn get(&self) -> usize {
        self.value
    }
    pub fn advance(&mut self) {
        self.value = (self.value + 1) % self.chunks_per_screen;
    }
}
/// Pixel layout of one sweep: `chunks_per_screen` vertical slices, one lane
/// per channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepGeometry {
    pub width: f32,
    pub height: f32,
    pub chunks_per_screen: usize,
    pub channel_count: usize,
}
impl SweepGeometry {
    pub fn slice_width(&self) -> f32 {
        self.width / self.chunks_per_screen.max(1) as f32
    }
    pub fn channel_height(&self) -> f32 {
        self.height / self.channel_count.max(1) as f32
    }
    pub fn slice_start(&self, index: usize) -> f32 {
        index as f32 * self.slice_width()
    }
    /// Horizontal spacing of `samples` points inside one slice.
    pub fn interval(&self, samples: usize) -> f32 {
        self.slice_width() / samples.max(1) as f32
    }
    pub fn sample_x(&self, index: usize, sample: usize, samples: usize) -> f32 {
        self.slice_start(index) + sample as f32 * self.interval(samples)
    }
    /// Upward deflection from the lane midpoint.
    pub fn value_y(&self, channel: usize, value: f32) -> f32 {
        (channel as f32 + 0.5) * self.channel_height() - value
    }
}
/// Last transformed sample of the chunk drawn before the current one.
#[derive(Clone, Debug, PartialEq)]
pub struct StitchState {
    pub last: Vec<f32>,
}
/// One chunk that has already been detrended and scaled.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepSlot {
    pub values: Vec<Vec<f32>>, // samples x channels
    pub stitch_from: Option<StitchState>,
}
/// Fixed ring of chunk-slots spanning exactly one screen.
#[derive(Clone, Debug)]
pub struct SweepBuffer {
    slots: Vec<Option<SweepSlot>>,
    stitch: Option<StitchState>,
}
impl SweepBuffer {
    pub fn new(chunks_per_screen: usize) -> Self {
        Self {
            slots: vec![None; chunks_per_screen.max(1)],
            stitch: None,
        }
    }
    #[cfg(test)]
    pub fn stitch(&self) -> Option<&StitchState> {
        self.stitch.as_ref()
    }
    #[cfg(test)]
    pub fn slot(&self, index: usize) -> Option<&SweepSlot> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }
    /// Stores a transformed chunk at `index`, replacing the previous
    /// occupant, and returns the slot with its stitch origin.
    pub fn store(&mut self, index: usize, values: Vec<Vec<f32>>) -> &SweepSlot {
        let len = self.slots.len();
        let index = index % len;
        let next_stitch = values.last().map(|last| StitchState { last: last.clone() });
        let slot = SweepSlot {
            values,
            stitch_from: self.stitch.take(),
        };
        self.stitch = next_stitch;
        self.slots[index].insert(slot)
    }
    /// Multiplies every stored value by `ratio` after a lane height change.
    pub fn rescale(&mut self, ratio: f32) {
        let scale_rows = |rows: &mut Vec<f32>| rows.iter_mut().for_each(|v| *v *= ratio);
        for slot in self.slots.iter_mut().flatten() {
            slot.values.iter_mut().for_each(scale_rows);
            if let Some(stitch) = &mut slot.stitch_from {
                scale_rows(&mut stitch.last);
            }
        }
        if let Some(stitch) = &mut self.stitch {
            scale_rows(&mut stitch.last);
        }
    }
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &SweepSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|slot| (i, slot)))
    }
}
