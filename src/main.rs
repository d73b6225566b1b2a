// hid-monitor - list HID devices and print hotplug events

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{debug, info};

use hid_monitor::cli::{Cli, Commands};
use hid_monitor::{Backend, DeviceInfo, Engine, EngineConfig, HidEvent, RecvTimeoutError};

/// Granularity at which the watch loop notices Ctrl+C and deadlines
const RECV_SLICE: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    let cli = Cli::parse();
    hid_monitor::logging::init(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => EngineConfig::from_env(),
    };

    match cli.command.unwrap_or(Commands::Watch {
        poll: false,
        timeout_secs: None,
        max_events: None,
    }) {
        Commands::List => {
            let engine = Engine::from_config(&config);
            let devices = engine.enumerate().context("enumerating HID devices")?;
            for device in &devices {
                print_present(device, cli.json);
            }
            if !cli.json {
                println!("{} device(s)", devices.len());
            }
            Ok(())
        }
        Commands::Watch {
            poll,
            timeout_secs,
            max_events,
        } => {
            if poll {
                config.backend = Backend::Poll;
            }
            let engine = Engine::from_config(&config);
            watch(
                &engine,
                timeout_secs.map(Duration::from_secs),
                max_events,
                cli.json,
            )
        }
    }
}

fn print_present(device: &DeviceInfo, as_json: bool) {
    if as_json {
        println!("{}", json!({ "kind": "present", "device": device }));
    } else {
        println!("present: {device}");
    }
}

fn print_event(event: &HidEvent, as_json: bool) {
    if as_json {
        println!("{}", json!(event));
    } else {
        println!("{event}");
    }
}

fn watch(
    engine: &Engine,
    timeout: Option<Duration>,
    max_events: Option<usize>,
    as_json: bool,
) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }

    // Subscribe before listing so nothing attached in between is missed
    let id = engine.start_monitor().context("starting monitor")?;
    for device in engine.list_devices() {
        print_present(&device, as_json);
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut seen = 0usize;
    let result = loop {
        if !running.load(Ordering::SeqCst) {
            debug!("Interrupted");
            break Ok(());
        }
        if max_events.is_some_and(|max| seen >= max) {
            break Ok(());
        }
        let slice = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    break Ok(());
                }
                left.min(RECV_SLICE)
            }
            None => RECV_SLICE,
        };

        match engine.recv_timeout(id, slice) {
            Ok(event) => {
                print_event(&event, as_json);
                seen += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                break Err(anyhow::anyhow!("hotplug notification source disconnected"))
            }
            Err(RecvTimeoutError::NotFound) => bail!("monitor {} vanished", id),
        }
    };

    engine.stop_monitor(id)?;
    info!(
        "Saw {} event(s), {} monitor(s) still active",
        seen,
        engine.active_monitors()
    );
    result
}
