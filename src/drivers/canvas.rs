use eframe::egui::{Color32, ColorImage};
use plotters::prelude::*;
use crate::drivers::render::{DirtyRect, RenderSurface, Segment};
use crate::drivers::ScopeError;
/// Pixel-aligned region pending upload to the GPU texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRegion {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}
/// RGB raster of the sweep, drawn through a plotters bitmap backend. Only
/// invalidated regions are cleared and later re-uploaded.
pub struct RasterCanvas {
    rgb: Vec<u8>,
    size: [usize; 2],
    background: Color32,
    dirty: Vec<PixelRegion>,
}
impl RasterCanvas {
    pub fn new(width: usize, height: usize, background: Color32) -> Self {
        Self {
            rgb: filled(width * height, background),
            size: [width, height],
            background,
            dirty: Vec::new(),
        }
    }
    pub fn size(&self) -> [usize; 2] {
        self.size
    }
    pub fn image(&self) -> ColorImage {
        ColorImage::from_rgb(self.size, &self.rgb)
    }
    /// Reallocates at a new size. Nothing is marked dirty; the caller either
    /// repaints or uploads the whole image.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.rgb = filled(width * height, self.background);
        self.size = [width, height];
        self.dirty.clear();
    }
    #[cfg(test)]
    pub fn pixel(&self, x: usize, y: usize) -> Option<Color32> {
        let [w, h] = self.size;
        (x < w && y < h).then(|| {
            let i = (y * w + x) * 3;
            Color32::from_rgb(self.rgb[i], self.rgb[i + 1], self.rgb[i + 2])
        })
    }
    /// Drains the regions touched since the last call.
    pub fn take_dirty(&mut self) -> Vec<PixelRegion> {
        std::mem::take(&mut self.dirty)
    }
    /// Copies one region out for a partial texture update.
    pub fn region_image(&self, region: PixelRegion) -> ColorImage {
        let stride = self.size[0] * 3;
        let mut rgb = Vec::with_capacity(region.width * region.height * 3);
        for row in region.y..region.y + region.height {
            let start = row * stride + region.x * 3;
            rgb.extend_from_slice(&self.rgb[start..start + region.width * 3]);
        }
        ColorImage::from_rgb([region.width, region.height], &rgb)
    }
    fn to_pixels(&self, rect: DirtyRect) -> Option<PixelRegion> {
        let [w, h] = self.size;
        let r = rect.clamp_to(w as f32, h as f32);
        let x0 = r.x0.floor() as usize;
        let y0 = r.y0.floor() as usize;
        let x1 = (r.x1.ceil() as usize).min(w);
        let y1 = (r.y1.ceil() as usize).min(h);
        (x1 > x0 && y1 > y0).then_some(PixelRegion {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}
impl RenderSurface for RasterCanvas {
    fn invalidate(&mut self, rect: DirtyRect) {
        let Some(region) = self.to_pixels(rect) else {
            return;
        };
        let stride = self.size[0] * 3;
        let bg = [self.background.r(), self.background.g(), self.background.b()];
        for row in region.y..region.y + region.height {
            let start = row * stride + region.x * 3;
            self.rgb[start..start + region.width * 3]
                .chunks_exact_mut(3)
                .for_each(|px| px.copy_from_slice(&bg));
        }
        self.dirty.push(region);
    }
    fn draw_segments(&mut self, segments: &[Segment], pen: Color32) -> Result<(), ScopeError> {
        let [w, h] = self.size;
        if segments.is_empty() || w == 0 || h == 0 {
            return Ok(());
        }
        let style = RGBColor(pen.r(), pen.g(), pen.b()).stroke_width(1);
        let root = BitMapBackend::with_buffer(&mut self.rgb, (w as u32, h as u32))
            .into_drawing_area();
        for segment in segments {
            if let Some(points) = backend_points(*segment, h as f32) {
                root.draw(&PathElement::new(points.to_vec(), style))?;
            }
        }
        root.present()?;
        Ok(())
    }
}
/// Integer endpoints for the bitmap backend. Endpoints far above or below the
/// canvas are pulled along the segment to a band of one canvas height on
/// either side, so the slope is kept and the coordinates stay in `i32`.
/// `None` for non-finite input or a segment entirely outside the band.
fn backend_points(segment: Segment, height: f32) -> Option<[(i32, i32); 2]> {
    let Segment { x0, y0, x1, y1 } = segment;
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (lo, hi) = (-height, 2.0 * height);
    if (y0 < lo && y1 < lo) || (y0 > hi && y1 > hi) {
        return None;
    }
    let pull = |(xa, ya): (f32, f32), (xb, yb): (f32, f32)| {
        let y = ya.clamp(lo, hi);
        let x = if y == ya { xa } else { xa + (y - ya) / (yb - ya) * (xb - xa) };
        (x.round() as i32, y.round() as i32)
    };
    Some([pull((x0, y0), (x1, y1)), pull((x1, y1), (x0, y0))])
}
fn filled(pixels: usize, color: Color32) -> Vec<u8> {
    [color.r(), color.g(), color.b()].repeat(pixels)
}
