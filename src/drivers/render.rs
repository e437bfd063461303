use eframe::egui::Color32;
use crate::drivers::scaling::ScalingEstimator;
use crate::drivers::sweep::{StitchState, SweepBuffer, SweepGeometry, SweepSlot};
use crate::drivers::ScopeError;
use crate::types::PublishedChunk;
/// One straight line on the canvas, in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}
/// Axis-aligned region that must be repainted, `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirtyRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}
impl DirtyRect {
    pub fn clamp_to(&self, width: f32, height: f32) -> Self {
        Self {
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        }
    }
}
/// Drawing target for the sweep. The renderer invalidates a region first and
/// then draws every segment that belongs to it.
pub trait RenderSurface {
    fn invalidate(&mut self, rect: DirtyRect);
    fn draw_segments(&mut self, segments: &[Segment], pen: Color32) -> Result<(), ScopeError>;
}
/// Consumer side of the sweep: scales, stitches, and redraws one slice per chunk.
pub struct SweepRenderer {
    geometry: SweepGeometry,
    scaling: ScalingEstimator,
    sweep: SweepBuffer,
    pen: Color32,
}
impl SweepRenderer {
    pub fn new(geometry: SweepGeometry, scaling: ScalingEstimator, pen: Color32) -> Self {
        Self {
            sweep: SweepBuffer::new(geometry.chunks_per_screen),
            geometry,
            scaling,
            pen,
        }
    }
    #[cfg(test)]
    pub fn geometry(&self) -> SweepGeometry {
        self.geometry
    }
    #[cfg(test)]
    pub fn scaling(&self) -> &ScalingEstimator {
        &self.scaling
    }
    #[cfg(test)]
    pub fn sweep(&self) -> &SweepBuffer {
        &self.sweep
    }
    /// Handles one published chunk and returns the region it repainted, or
    /// `None` for a chunk without samples.
    pub fn on_chunk<S: RenderSurface + ?Sized>(
        &mut self,
        published: PublishedChunk,
        surface: &mut S,
    ) -> Result<Option<DirtyRect>, ScopeError> {
        let PublishedChunk {
            sweep_index,
            mut chunk,
        } = published;
        if chunk.is_empty() {
            return Ok(None);
        }
        chunk.validate(self.geometry.channel_count)?;
        let index = sweep_index % self.geometry.chunks_per_screen.max(1);
        let channel_height = self.geometry.channel_height();
        self.scaling
            .update(index, &chunk, channel_height)
            .apply(&mut chunk);
        let rect = self.slice_region(index, chunk.len());
        surface.invalidate(rect);
        let slot = self.sweep.store(index, chunk.samples);
        draw_slot(&self.geometry, index, slot, self.pen, surface)?;
        log::trace!("drew slice {} ({} samples)", index, slot.values.len());
        Ok(Some(rect))
    }
    /// Region owned by slice `index`, extended one interval to the left so the
    /// stitch from the previous slice is included. The stitch is drawn with the
    /// same interval.
    pub fn slice_region(&self, index: usize, samples: usize) -> DirtyRect {
        let g = &self.geometry;
        DirtyRect {
            x0: g.slice_start(index) - g.interval(samples),
            y0: 0.0,
            x1: g.slice_start(index + 1),
            y1: g.height,
        }
    }
    /// Adopts a new canvas size and repaints every stored slot. Stored values
    /// are rescaled by the lane-height ratio, never re-detrended.
    pub fn resize<S: RenderSurface + ?Sized>(
        &mut self,
        width: f32,
        height: f32,
        surface: &mut S,
    ) -> Result<(), ScopeError> {
        let old_lane = self.geometry.channel_height();
        self.geometry.width = width;
        self.geometry.height = height;
        let new_lane = self.geometry.channel_height();
        if old_lane > 0.0 && new_lane > 0.0 && old_lane != new_lane {
            let ratio = new_lane / old_lane;
            self.sweep.rescale(ratio);
            if let Some(scaling) = self.scaling.current_mut() {
                scaling.rescale(ratio);
            }
        }
        self.repaint(surface)
    }
    /// Full repaint from the stored slots.
    pub fn repaint<S: RenderSurface + ?Sized>(&self, surface: &mut S) -> Result<(), ScopeError> {
        surface.invalidate(DirtyRect {
            x0: 0.0,
            y0: 0.0,
            x1: self.geometry.width,
            y1: self.geometry.height,
        });
        for (index, slot) in self.sweep.occupied() {
            draw_slot(&self.geometry, index, slot, self.pen, surface)?;
        }
        Ok(())
    }
}
fn draw_slot<S: RenderSurface + ?Sized>(
    geometry: &SweepGeometry,
    index: usize,
    slot: &SweepSlot,
    pen: Color32,
    surface: &mut S,
) -> Result<(), ScopeError> {
    let n = slot.values.len();
    let mut segments = Vec::with_capacity(geometry.channel_count * n);
    if let (Some(stitch), Some(first)) = (&slot.stitch_from, slot.values.first()) {
        segments.extend(stitch_segments(geometry, index, n, stitch, first));
    }
    for k in 0..geometry.channel_count {
        for m in 0..n.saturating_sub(1) {
            let (a, b) = (slot.values[m][k], slot.values[m + 1][k]);
            if !drawable(a) || !drawable(b) {
                continue;
            }
            segments.push(Segment {
                x0: geometry.sample_x(index, m, n),
                y0: geometry.value_y(k, a),
                x1: geometry.sample_x(index, m + 1, n),
                y1: geometry.value_y(k, b),
            });
        }
    }
    surface.draw_segments(&segments, pen)
}
/// Connecting segments from the previous chunk's last point to this slice's
/// first point, one per channel with two finite endpoints. The previous point
/// sits one interval of this chunk to the left.
fn stitch_segments<'a>(
    geometry: &'a SweepGeometry,
    index: usize,
    samples: usize,
    stitch: &'a StitchState,
    first: &'a [f32],
) -> impl Iterator<Item = Segment> + 'a {
    let x1 = geometry.slice_start(index);
    let x0 = x1 - geometry.interval(samples);
    stitch
        .last
        .iter()
        .zip(first)
        .enumerate()
        .filter(|(_, (a, b))| drawable(**a) && drawable(**b))
        .map(move |(k, (a, b))| Segment {
            x0,
            y0: geometry.value_y(k, *a),
            x1,
            y1: geometry.value_y(k, *b),
        })
}
// Gaps are NaN; overflowed scaling is treated the same way.
fn drawable(value: f32) -> bool {
    value.is_finite()
}
