//! Application entry point for Six String Tuner
//!
//! Sets up logging and the eframe window, builds the tuner around the
//! microphone and hands it to the app, which ticks it once per frame.

use anyhow::Result;
use eframe::egui;
use log::{debug, info, warn};

mod app;

use app::TunerApp;
use six_string_tuner::audio::{default_input_device_name, list_input_devices};
use six_string_tuner::{MicrophoneSource, Tuner, TunerConfig};

/// Names an input device to use instead of the host default.
const DEVICE_ENV: &str = "GUITAR_TUNER_DEVICE";

fn main() -> Result<()> {
    env_logger::init();

    let config = TunerConfig {
        input_device: std::env::var(DEVICE_ENV).ok(),
        ..Default::default()
    };

    match list_input_devices() {
        Ok(devices) => debug!("Input devices: {:?}", devices),
        Err(err) => warn!("Could not list input devices: {}", err),
    }
    if config.input_device.is_none() {
        match default_input_device_name() {
            Ok(name) => info!("Default input device: {}", name),
            Err(err) => warn!("{}", err),
        }
    }

    let source = MicrophoneSource::new(config.input_device.clone(), config.buffer_size * 2);
    let tuner = Tuner::new(source, config)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([320.0, 240.0])
            .with_resizable(false)
            .with_always_on_top()
            .with_decorations(true)
            .with_title_shown(false)
            .with_titlebar_buttons_shown(true)
            .with_titlebar_shown(false)
            .with_fullsize_content_view(true)
            .with_transparent(true),
        ..Default::default()
    };

    eframe::run_native(
        "Six String Tuner",
        options,
        Box::new(|_cc| Ok(Box::new(TunerApp::new(tuner)))),
    )
    .map_err(|err| anyhow::anyhow!("{err}"))?;

    Ok(())
}
