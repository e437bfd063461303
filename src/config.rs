// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use eframe::egui::Color32;
use serde::{Deserialize, Serialize};
use crate::drivers::{ScopeError, SimulatedStream};

pub const CONFIG_ENV: &str = "SWEEPSCOPE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "sweepscope.json";

/// Screen sweep layout.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub chunks_per_screen: usize,
    pub seconds_per_screen: f64,
}
impl Default for SweepConfig {
    fn default() -> Self {
        // 2 s per screen, redrawn in 50 slices
        Self {
            chunks_per_screen: 50,
            seconds_per_screen: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub resolve_wait_secs: f64,
    pub pull_timeout_secs: f64,
    /// Sources above this rate are block-averaged down to about this rate.
    pub downsample_threshold_hz: u32,
    /// Published chunks that may wait for the GUI before the producer blocks.
    pub queue_capacity: usize,
    pub join_timeout_ms: u64,
    pub resolve_retry_secs: f64,
}
impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            resolve_wait_secs: 1.0,
            pull_timeout_secs: 1.0,
            downsample_threshold_hz: 1000,
            queue_capacity: 50,
            join_timeout_ms: 2000,
            resolve_retry_secs: 2.0,
        }
    }
}
impl AcquisitionConfig {
    pub fn resolve_wait(&self) -> Duration {
        Duration::from_secs_f64(self.resolve_wait_secs)
    }
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.pull_timeout_secs)
    }
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
    pub fn resolve_retry(&self) -> Duration {
        Duration::from_secs_f64(self.resolve_retry_secs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Share of a lane the first chunk of a sweep may span.
    pub headroom: f32,
    pub epsilon: f64,
    pub trace_color: [u8; 3],
    pub background: [u8; 3],
}
impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            headroom: 0.7,
            epsilon: 1e-13,
            trace_color: [0, 0, 255],
            background: [255, 255, 255],
        }
    }
}
impl DisplayConfig {
    pub fn pen(&self) -> Color32 {
        let [r, g, b] = self.trace_color;
        Color32::from_rgb(r, g, b)
    }
    pub fn background(&self) -> Color32 {
        let [r, g, b] = self.background;
        Color32::from_rgb(r, g, b)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub sweep: SweepConfig,
    pub acquisition: AcquisitionConfig,
    pub display: DisplayConfig,
    pub simulation: Vec<SimulatedStream>,
}
impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            sweep: SweepConfig::default(),
            acquisition: AcquisitionConfig::default(),
            display: DisplayConfig::default(),
            simulation: vec![SimulatedStream::markers(), SimulatedStream::default()],
        }
    }
}
impl ScopeConfig {
    /// `$SWEEPSCOPE_CONFIG`, then `./sweepscope.json`, then built-in defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.exists().then_some(local)
            });
        match path {
            Some(path) => Self::from_file(&path),
            None => {
                log::info!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("config is not valid JSON")?;
        config.validate()?;
        Ok(config)
    }
    pub fn validate(&self) -> Result<(), ScopeError> {
        let invalid = |msg: &str| Err(ScopeError::InvalidConfig(msg.to_owned()));
        if self.sweep.chunks_per_screen == 0 {
            return invalid("chunks_per_screen must be at least 1");
        }
        if !(self.sweep.seconds_per_screen > 0.0) {
            return invalid("seconds_per_screen must be positive");
        }
        if !(self.display.headroom > 0.0 && self.display.headroom <= 1.0) {
            return invalid("headroom must be in (0, 1]");
        }
        if !(self.display.epsilon > 0.0) {
            return invalid("epsilon must be positive");
        }
        if self.acquisition.downsample_threshold_hz == 0 {
            return invalid("downsample_threshold_hz must be positive");
        }
        if self.acquisition.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1");
        }
        let a = &self.acquisition;
        if !(a.resolve_wait_secs > 0.0 && a.pull_timeout_secs > 0.0 && a.resolve_retry_secs > 0.0)
            || a.join_timeout_ms == 0
        {
            return invalid("timeouts must be positive");
        }
        Ok(())
    }
}
