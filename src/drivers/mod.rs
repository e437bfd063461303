// src/drivers/mod.rs
pub mod canvas;
pub mod downsample;
pub mod error;
pub mod render;
pub mod scaling;
pub mod simulated;
pub mod source;
pub mod sweep;
pub use canvas::RasterCanvas;
pub use downsample::Downsampler;
pub use error::ScopeError;
pub use render::SweepRenderer;
pub use scaling::ScalingEstimator;
pub use simulated::{SimulatedCatalog, SimulatedStream};
pub use source::{ChannelFormat, Chunk, SourceDescriptor, StreamCatalog, StreamInlet};
#[cfg(test)]
pub use source::{ManualInlet, StaticCatalog};
pub use sweep::{SweepGeometry, SweepIndex};
