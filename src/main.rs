//! devmon CLI
//!
//! Lists attachable devices and streams their events into a session log.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use devmon::{
    config::Config,
    directory::{self, DeviceSelector},
    funnel::funnel,
    session::MonitorSession,
    worker::{HidDriver, HookWorker, PollWorker, SerialDriver, UsbDriver, WorkerControl},
    EventSink, VERSION,
};

#[derive(Parser)]
#[command(name = "devmon")]
#[command(version = VERSION)]
#[command(about = "Local device monitor for HID, serial, USB and input hooks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attachable devices across all families
    List {
        /// Only show one family (hid, usb, or com)
        #[arg(long)]
        family: Option<String>,

        /// Only show devices whose label contains this substring
        #[arg(long)]
        filter: Option<String>,
    },

    /// Stream events from a device and/or the global input hooks
    Monitor {
        /// Device selector, e.g. hid:0, usb:1, com:/dev/ttyUSB0
        device: Option<String>,

        /// Also capture global keyboard/mouse events
        #[arg(long)]
        hooks: bool,

        /// Serial baud rate (overrides the configured default)
        #[arg(long)]
        baud: Option<u32>,

        /// Write the event CSV to this path instead of the log directory
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the plain-text log to this path instead of the log directory
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Show configuration
    Config,
}

fn main() {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { family, filter } => cmd_list(family.as_deref(), filter.as_deref()),
        Commands::Monitor {
            device,
            hooks,
            baud,
            csv,
            log,
        } => cmd_monitor(device.as_deref(), hooks, baud, csv, log),
        Commands::Config => cmd_config(),
    }
}

/// Diagnostics go to stderr so they never interleave with the event log on
/// stdout. `RUST_LOG` overrides the default level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_list(family: Option<&str>, filter: Option<&str>) {
    let entries = directory::all_devices(None);

    // Counts cover everything attached, whatever the view shows.
    let mut hid = 0usize;
    let mut usb = 0usize;
    let mut com = 0usize;
    for entry in &entries {
        match entry.family_tag() {
            "HID" => hid += 1,
            "USB" => usb += 1,
            _ => com += 1,
        }
    }

    let family = family.map(|f| f.trim().to_lowercase());
    let wanted = |tag: &str| match family.as_deref() {
        Some("serial") => tag == "COM",
        Some(f) => f.eq_ignore_ascii_case(tag),
        None => true,
    };

    let entries = match filter {
        Some(filter) => directory::filter_entries(entries, filter),
        None => entries,
    };
    for entry in entries {
        if wanted(entry.family_tag()) {
            println!(
                "[{}] {}  {}",
                entry.family_tag(),
                entry.selector(),
                entry.label()
            );
        }
    }

    println!();
    println!("Devices refreshed. HID:{hid} USB:{usb} COM:{com}");
}

fn cmd_monitor(
    device: Option<&str>,
    hooks: bool,
    baud: Option<u32>,
    csv: Option<PathBuf>,
    log: Option<PathBuf>,
) {
    let config = Config::load().unwrap_or_default();

    if device.is_none() && !hooks {
        eprintln!("Error: Nothing to monitor. Pass a device selector and/or --hooks.");
        std::process::exit(1);
    }

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let (sink, drain) = funnel();
    let mut session = MonitorSession::with_echo(drain);
    let mut workers: Vec<Box<dyn WorkerControl>> = Vec::new();

    if let Some(selection) = device {
        let selector = match DeviceSelector::parse(selection) {
            Ok(selector) => selector,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };
        let baud_rate = baud.unwrap_or(config.baud_rate);
        match build_worker(&selector, baud_rate, sink.clone()) {
            Ok((worker, label)) => {
                session.note(format!("monitoring {label}"));
                workers.push(worker);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }

    if hooks {
        if config.hooks.any_enabled() {
            session.note("global input hooks enabled");
            workers.push(Box::new(HookWorker::new(config.hooks.clone(), sink.clone())));
        } else {
            eprintln!("Warning: --hooks requested but both hook sources are disabled in config");
        }
    }

    for worker in &mut workers {
        if let Err(e) = worker.start() {
            eprintln!("Error starting {} worker: {e}", worker.family());
            std::process::exit(1);
        }
    }

    println!("Press Ctrl+C to stop");

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let tick = Duration::from_millis(config.poll_interval_ms.max(50));
    while running.load(Ordering::SeqCst) {
        session.poll();
        thread::sleep(tick);
    }

    println!("\nStopping...");
    for worker in &mut workers {
        worker.stop();
    }
    session.poll();

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let csv_path = csv.unwrap_or_else(|| config.log_dir.join(format!("events_{stamp}.csv")));
    match session.export_csv(&csv_path) {
        Ok(()) => println!("Events exported to {}", csv_path.display()),
        Err(e) => eprintln!("Warning: Could not export CSV: {e}"),
    }

    let log_path = log.unwrap_or_else(|| config.log_dir.join(format!("log_{stamp}.txt")));
    match session.save_log(&log_path) {
        Ok(()) => println!("Log saved to {}", log_path.display()),
        Err(e) => eprintln!("Warning: Could not save log: {e}"),
    }

    println!("{} log entries captured", session.entries().len());
}

/// Resolve a selector against the current device listing and wrap the match
/// in a started-but-not-yet-running worker.
fn build_worker(
    selector: &DeviceSelector,
    baud_rate: u32,
    sink: EventSink,
) -> Result<(Box<dyn WorkerControl>, String), String> {
    match selector {
        DeviceSelector::Hid(i) => {
            let devices = directory::hid_devices();
            let descriptor = devices
                .get(*i)
                .cloned()
                .ok_or_else(|| format!("no HID device at index {i} ({} available)", devices.len()))?;
            let label = descriptor.label();
            let worker = PollWorker::new(HidDriver::new(descriptor), sink);
            Ok((Box::new(worker), label))
        }
        DeviceSelector::Usb(i) => {
            let devices = directory::usb_devices();
            let descriptor = devices
                .get(*i)
                .cloned()
                .ok_or_else(|| format!("no USB device at index {i} ({} available)", devices.len()))?;
            let label = descriptor.label();
            let worker = PollWorker::new(UsbDriver::new(descriptor), sink);
            Ok((Box::new(worker), label))
        }
        DeviceSelector::Serial(name) => {
            let descriptor = devmon::SerialDescriptor {
                port_name: name.clone(),
            };
            let label = descriptor.label();
            let worker = PollWorker::new(SerialDriver::new(descriptor, baud_rate), sink);
            Ok((Box::new(worker), label))
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
