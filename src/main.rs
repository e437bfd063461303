// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
mod config;
mod drivers;
mod engine;
mod gui;
mod types;
use eframe::egui;
fn main() -> eframe::Result<()> {
    env_logger::init();
    let config = match config::ScopeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e:#}");
            std::process::exit(2);
        }
    };
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1200.0, 700.0])
        .with_min_inner_size([640.0, 360.0])
        .with_title("Sweepscope");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "Sweepscope",
        options,
        Box::new(move |_cc| Box::new(gui::ScopeApp::new(config))),
    )
}
