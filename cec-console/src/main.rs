//! CEC Console
//!
//! Emulates one CEC device over a virtual bus with a virtual TV (and, for
//! source devices, a virtual amplifier) and runs a scripted session against
//! it. Pass a settings file as the first argument, or put one at
//! `$XDG_CONFIG_HOME/cec-console/settings.json`.

mod error;
mod session;
mod settings;

use std::process::ExitCode;

use settings::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cec_console=info,cec_core=info,cec_protocol=info,cec_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load_from(&path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("cannot load settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Starting CEC console as {} at {}",
        settings.local_device.logical_address,
        settings.local_device.physical_address
    );

    match session::run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("session failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
