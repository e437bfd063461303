// src/gui.rs
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use eframe::egui;
use egui::{Color32, Pos2, Rect, TextureHandle, TextureOptions};
use crate::config::ScopeConfig;
use crate::drivers::{
    RasterCanvas, ScalingEstimator, ScopeError, SimulatedCatalog, SweepGeometry, SweepRenderer,
};
use crate::engine::{self, AcquisitionHandle, Waker};
use crate::types::ScopeMessage;

type Started = Result<(AcquisitionHandle, Receiver<ScopeMessage>), ScopeError>;

pub struct ScopeApp {
    config: ScopeConfig,
    catalog: Arc<SimulatedCatalog>,

    // acquisition side
    acquisition: Option<AcquisitionHandle>,
    rx: Option<Receiver<ScopeMessage>>,
    resolver: Option<JoinHandle<Started>>,
    next_resolve: Instant,

    // render side
    renderer: Option<SweepRenderer>,
    canvas: RasterCanvas,
    texture: Option<TextureHandle>,
    chunks_drawn: u64,

    log_messages: Vec<String>,
}

impl ScopeApp {
    pub fn new(config: ScopeConfig) -> Self {
        let catalog = Arc::new(SimulatedCatalog::new(config.simulation.clone()));
        let canvas = RasterCanvas::new(1, 1, config.display.background());
        Self {
            config,
            catalog,
            acquisition: None,
            rx: None,
            resolver: None,
            next_resolve: Instant::now(),
            renderer: None,
            canvas,
            texture: None,
            chunks_drawn: 0,
            log_messages: vec!["Sweepscope ready.".to_owned()],
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 8 {
            self.log_messages.remove(0);
        }
    }

    // resolution blocks for up to resolve_wait, so it never runs on the UI thread
    fn begin_resolve(&mut self, ctx: &egui::Context) {
        let catalog = Arc::clone(&self.catalog);
        let config = self.config.clone();
        let repaint = ctx.clone();
        let waker: Waker = Arc::new(move || repaint.request_repaint());
        let notify = ctx.clone();
        let spawned = thread::Builder::new()
            .name("resolver".to_owned())
            .spawn(move || {
                let started = engine::start(catalog.as_ref(), &config, Some(waker));
                notify.request_repaint();
                started
            });
        match spawned {
            Ok(handle) => self.resolver = Some(handle),
            Err(e) => {
                log::error!("failed to spawn resolver: {e}");
                self.schedule_resolve();
            }
        }
    }

    fn poll_resolver(&mut self) {
        if !self.resolver.as_ref().map_or(false, |h| h.is_finished()) {
            return;
        }
        let Some(resolver) = self.resolver.take() else {
            return;
        };
        match resolver.join() {
            Ok(Ok((handle, rx))) => self.attach(handle, rx),
            Ok(Err(e)) => {
                log::warn!("stream selection failed: {e}");
                self.log(&e.to_string());
                self.schedule_resolve();
            }
            Err(_) => {
                log::error!("resolver thread panicked");
                self.schedule_resolve();
            }
        }
    }

    fn schedule_resolve(&mut self) {
        self.next_resolve = Instant::now() + self.config.acquisition.resolve_retry();
    }

    fn attach(&mut self, handle: AcquisitionHandle, rx: Receiver<ScopeMessage>) {
        let descriptor = handle.descriptor().clone();
        let [width, height] = self.canvas.size();
        let geometry = SweepGeometry {
            width: width as f32,
            height: height as f32,
            chunks_per_screen: handle.plan().chunks_per_screen,
            channel_count: descriptor.channel_count,
        };
        let scaling = ScalingEstimator::new(self.config.display.headroom, self.config.display.epsilon);
        let renderer = SweepRenderer::new(geometry, scaling, self.config.display.pen());
        if let Err(e) = renderer.repaint(&mut self.canvas) {
            log::warn!("initial repaint failed: {e}");
        }
        self.renderer = Some(renderer);
        self.chunks_drawn = 0;
        self.acquisition = Some(handle);
        self.rx = Some(rx);
        self.log(&format!("Streaming {}", descriptor.name));
    }

    fn detach(&mut self, reason: &str) {
        log::warn!("acquisition ended: {reason}");
        self.rx = None;
        if let Some(mut handle) = self.acquisition.take() {
            handle.shutdown();
        }
        self.log(&format!("Lost stream: {}", reason));
        self.schedule_resolve();
    }

    // strictly in publish order, nothing skipped
    fn drain_chunks(&mut self) {
        let Some(rx) = &self.rx else {
            return;
        };
        let mut lost = None;
        loop {
            match rx.try_recv() {
                Ok(ScopeMessage::Chunk(published)) => {
                    let Some(renderer) = &mut self.renderer else {
                        continue;
                    };
                    match renderer.on_chunk(published, &mut self.canvas) {
                        Ok(Some(_)) => self.chunks_drawn += 1,
                        Ok(None) => {}
                        Err(e) => log::warn!("chunk not drawn: {e}"),
                    }
                }
                Ok(ScopeMessage::InletLost(reason)) => {
                    lost = Some(reason);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    lost = Some("acquisition thread exited".to_owned());
                    break;
                }
            }
        }
        if let Some(reason) = lost {
            self.detach(&reason);
        }
    }

    // a reallocated canvas is uploaded whole, so nothing stays dirty
    fn sync_canvas_size(&mut self, size: [usize; 2]) {
        if self.canvas.size() == size {
            return;
        }
        self.canvas.resize(size[0], size[1]);
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(size[0] as f32, size[1] as f32, &mut self.canvas) {
                log::warn!("repaint after resize failed: {e}");
            }
        }
        self.canvas.take_dirty();
        self.texture = None;
    }

    // only the regions invalidated since the last frame are re-uploaded
    fn upload(&mut self, ctx: &egui::Context) -> egui::TextureId {
        let texture = match self.texture.take() {
            Some(mut texture) => {
                for region in self.canvas.take_dirty() {
                    texture.set_partial(
                        [region.x, region.y],
                        self.canvas.region_image(region),
                        TextureOptions::NEAREST,
                    );
                }
                texture
            }
            None => {
                self.canvas.take_dirty();
                ctx.load_texture("sweep", self.canvas.image(), TextureOptions::NEAREST)
            }
        };
        let id = texture.id();
        self.texture = Some(texture);
        id
    }

    fn status_panel(&self, ui: &mut egui::Ui) {
        match &self.acquisition {
            Some(handle) => {
                let d = handle.descriptor();
                let plan = handle.plan();
                ui.label(format!("Stream: {}", d.name));
                ui.label(format!("Channels: {}", d.channel_count));
                ui.label(format!("Rate: {} Hz", plan.sample_rate_hz));
                ui.label(format!("Chunk: {} samples", plan.chunk_size));
                if let Some(ds) = plan.downsampler {
                    ui.label(format!(
                        "Downsampling: x{} ({} drawn)",
                        ds.factor(),
                        plan.published_len()
                    ));
                }
                ui.label(format!("Chunks drawn: {}", self.chunks_drawn));
                ui.add_space(10.0);
                ui.label("SOURCES");
                for (i, source) in handle.sources().iter().enumerate() {
                    let marker = if i == handle.selected_index() { "▶" } else { " " };
                    ui.monospace(format!(
                        "{} {} ({:?}, {} ch)",
                        marker, source.name, source.channel_format, source.channel_count
                    ));
                }
            }
            None if self.resolver.is_some() => {
                ui.label("Resolving streams...");
            }
            None => {
                ui.label(egui::RichText::new("No plottable stream").color(Color32::YELLOW));
            }
        }
    }
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. acquisition lifecycle
        self.poll_resolver();
        if self.acquisition.is_none() && self.resolver.is_none() {
            let now = Instant::now();
            if now >= self.next_resolve {
                self.begin_resolve(ctx);
            } else {
                ctx.request_repaint_after(self.next_resolve - now);
            }
        }

        // 2. side panel
        egui::SidePanel::left("status").min_width(220.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("Sweepscope");
            ui.separator();
            self.status_panel(ui);
            ui.add_space(10.0);
            ui.separator();
            egui::ScrollArea::vertical().max_height(140.0).show(ui, |ui| {
                for m in &self.log_messages {
                    ui.monospace(m);
                }
            });
        });

        // 3. sweep canvas
        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_size();
            let ppp = ctx.pixels_per_point();
            let size = [
                (available.x * ppp).round().max(1.0) as usize,
                (available.y * ppp).round().max(1.0) as usize,
            ];
            self.sync_canvas_size(size);
            self.drain_chunks();
            let texture = self.upload(ctx);
            let (rect, _) = ui.allocate_exact_size(available, egui::Sense::hover());
            ui.painter().image(
                texture,
                rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        });
    }
}

impl Drop for ScopeApp {
    fn drop(&mut self) {
        if let Some(mut handle) = self.acquisition.take() {
            if !handle.shutdown() {
                log::warn!("acquisition thread left running at exit");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::canvas::PixelRegion;
    use crate::drivers::{ChannelFormat, Chunk, SimulatedStream};
    use crate::types::PublishedChunk;
    use std::sync::mpsc::sync_channel;

    fn app_with_canvas(width: usize, height: usize) -> ScopeApp {
        let mut app = ScopeApp::new(ScopeConfig::default());
        app.canvas.resize(width, height);
        app.canvas.take_dirty();
        app
    }

    #[test]
    fn chunks_are_drawn_in_order_and_only_their_slice_is_dirty() {
        let mut config = ScopeConfig::default();
        config.acquisition.resolve_wait_secs = 0.01;
        config.acquisition.pull_timeout_secs = 0.005;
        config.simulation = vec![SimulatedStream {
            channel_count: 2,
            channel_format: ChannelFormat::Float32,
            ..SimulatedStream::default()
        }];
        let catalog = SimulatedCatalog::new(config.simulation.clone());
        let (handle, _sim_rx) = engine::start(&catalog, &config, None).unwrap();

        let mut app = app_with_canvas(500, 200);
        let (tx, rx) = sync_channel(8);
        app.attach(handle, rx);
        app.canvas.take_dirty();
        for idx in 0..2 {
            let samples = (0..10).map(|i| vec![i as f32, -(i as f32)]).collect();
            tx.send(ScopeMessage::Chunk(PublishedChunk {
                sweep_index: idx,
                chunk: Chunk::new(samples, vec![0.0; 10]),
            }))
            .unwrap();
        }
        app.drain_chunks();
        assert_eq!(app.chunks_drawn, 2);
        let dirty = app.canvas.take_dirty();
        assert_eq!(
            dirty,
            vec![
                PixelRegion { x: 0, y: 0, width: 10, height: 200 },
                PixelRegion { x: 9, y: 0, width: 11, height: 200 },
            ]
        );
    }

    #[test]
    fn inlet_loss_detaches_and_schedules_retry() {
        let mut app = app_with_canvas(100, 100);
        let (tx, rx) = sync_channel(2);
        app.rx = Some(rx);
        tx.send(ScopeMessage::InletLost("unplugged".into())).unwrap();
        app.drain_chunks();
        assert!(app.rx.is_none());
        assert!(app.next_resolve > Instant::now());
        assert!(app.log_messages.iter().any(|m| m.contains("unplugged")));
    }

    #[test]
    fn resize_reloads_texture_without_queued_regions() {
        let mut app = app_with_canvas(10, 10);
        let geometry = SweepGeometry {
            width: 10.0,
            height: 10.0,
            chunks_per_screen: 5,
            channel_count: 1,
        };
        app.renderer = Some(SweepRenderer::new(
            geometry,
            ScalingEstimator::new(0.7, 1e-13),
            Color32::BLUE,
        ));
        app.sync_canvas_size([40, 20]);
        assert_eq!(app.canvas.size(), [40, 20]);
        assert!(app.canvas.take_dirty().is_empty());
        assert!(app.texture.is_none());
        assert_eq!(app.renderer.as_ref().map(|r| r.geometry().width), Some(40.0));
    }
}
