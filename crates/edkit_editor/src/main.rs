//! edkit Editor
//!
//! Headless driver for the scripting layer: loads settings, discovers
//! scripts, runs every runnable one and ticks them on the frame clock until
//! they have all finished.

use anyhow::{Context as _, Result};
use edkit_core::level::Level;
use edkit_core::time::FrameClock;
use edkit_script::{FixedInputs, LogLevel, ScriptManager};
use edkit_services::ScriptingConfig;
use std::path::PathBuf;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

/// Give up on scripts still pending after this many seconds of frames.
const MAX_RUN_SECONDS: u64 = 60;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("edkit Editor v{}", edkit_core::VERSION);

    let config_path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("EDKIT_CONFIG"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("edkit.json"));
    let config = ScriptingConfig::load(&config_path)
        .with_context(|| format!("loading settings from {}", config_path.display()))?;

    let frame_rate = config.frame_rate;
    let level = Rc::new(Level::new());
    let inputs = Rc::new(FixedInputs::new(config.input_defaults.clone()));
    let manager = ScriptManager::init_global(ScriptManager::new(config, level.clone(), inputs));

    manager.subscribe(|event| {
        let script = &event.script;
        tracing::debug!(
            script = %script.title(),
            entries = script.last_run_logs().len(),
            severity = %script.last_run_severity(),
            "script log updated"
        );
    });

    manager.reload_scripts();
    let mut started = 0;
    for script in manager.scripts() {
        if script.can_run() && script.run() {
            started += 1;
        }
    }
    tracing::info!(started, "scripts started");

    let mut clock = FrameClock::new(frame_rate);
    let max_frames = u64::from(frame_rate.max(1)) * MAX_RUN_SECONDS;
    let mut failed_frames = 0;
    while clock.frame_count() < max_frames {
        if !manager.tick_all() {
            failed_frames += 1;
        }
        manager.dispatch_events();
        clock.advance_frame();

        if manager.scripts().iter().all(|script| !script.is_running()) {
            break;
        }
        std::thread::sleep(clock.frame_duration());
    }

    for script in manager.scripts() {
        let severity = script.last_run_severity();
        if severity >= LogLevel::Warning {
            tracing::warn!(script = %script.title(), %severity, "script reported problems");
        }
        if script.is_running() {
            tracing::warn!(script = %script.title(), "script still pending, abandoning it");
        }
    }
    tracing::info!(
        frames = clock.frame_count(),
        elapsed = ?clock.total_time(),
        objects = level.snapshot().len(),
        "done"
    );

    if failed_frames > 0 {
        anyhow::bail!("{failed_frames} frame(s) had failing scripts");
    }
    Ok(())
}
