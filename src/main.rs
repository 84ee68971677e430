//! scopecore command line
//!
//! Headless front end: run a mock multi-instrument capture, inspect a saved
//! session, or re-save one in a different body format.

use anyhow::Context;
use clap::{Parser, Subcommand};
use scopecore::{
    acquisition::{Acquisition, AcquisitionMessage},
    codec::WaveformFormat,
    config::{AppConfig, AppState},
    filter::{FilterId, FilterScheduler},
    instrument::{Instrument, MockInstrument, MockPattern},
    session::{load_session, save_session, save_session_as, SessionContext},
    types::{InstrumentId, StreamDescriptor},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "scopecore", version, about = "Multi-instrument capture core")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Free-run mock instruments and print what was captured
    Demo {
        /// Number of mock instruments
        #[arg(short = 'n', long, default_value_t = 2)]
        instruments: usize,
        /// Analog channels per instrument
        #[arg(long, default_value_t = 2)]
        channels: usize,
        /// Trigger events to capture before stopping
        #[arg(short, long, default_value_t = 5)]
        cycles: usize,
        /// Samples per capture
        #[arg(long, default_value_t = 1000)]
        record_length: usize,
        /// Save the session here afterwards
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Load a session offline and describe it
    Inspect { file: PathBuf },
    /// Re-save a session with every body in one format
    Convert {
        file: PathBuf,
        #[arg(long, value_parser = parse_format)]
        format: WaveformFormat,
        /// Write here instead of overwriting
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_format(s: &str) -> Result<WaveformFormat, String> {
    s.parse().map_err(|e: scopecore::ScopeError| e.to_string())
}

fn init_logging(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().unwrap_or_else(|| OsStr::new("scopecore.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,scopecore=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref());

    let config = match &cli.config {
        Some(path) => AppConfig::load(path).with_context(|| format!("loading {:?}", path))?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Demo {
            instruments,
            channels,
            cycles,
            record_length,
            save,
        } => run_demo(config, instruments, channels, cycles, record_length, save),
        Command::Inspect { file } => inspect(config, &file),
        Command::Convert {
            file,
            format,
            output,
        } => convert(config, &file, format, output),
    }
}

fn mock_instruments(count: usize, channels: usize, record_length: usize) -> Vec<Box<dyn Instrument>> {
    (0..count)
        .map(|i| {
            let mut scope = MockInstrument::new(format!("mock{}", i), channels)
                .with_record_length(record_length)
                .with_pattern(MockPattern::Sine {
                    frequency: 1e6 * (i + 1) as f64,
                    amplitude: 1.0,
                    offset: 0.0,
                });
            if i > 0 {
                // Secondaries fire from the primary's trigger out, a little later
                scope = scope.with_trigger_delay(Some(Duration::from_millis(2)));
            } else {
                scope = scope.with_trigger_delay(Some(Duration::from_millis(20)));
            }
            Box::new(scope) as Box<dyn Instrument>
        })
        .collect()
}

/// Scale -> Threshold -> Invert on the primary's first channel, plus a
/// cross-instrument Subtract when there is a second instrument
fn build_default_filters(session: &SessionContext, instruments: usize) -> anyhow::Result<()> {
    let filters = session.filters();
    let ch0 = StreamDescriptor::instrument(InstrumentId(0), 0, 0);

    let connect = |id: FilterId, index: usize, stream: StreamDescriptor| -> anyhow::Result<()> {
        let inst = filters
            .instance(id)
            .with_context(|| format!("filter {} vanished", id))?;
        inst.lock().set_input(index, Some(stream))?;
        Ok(())
    };

    let scale = filters.create("Scale", Some("gain2"))?;
    connect(scale, 0, ch0)?;
    if let Some(inst) = filters.instance(scale) {
        inst.lock().set_parameter("gain", 2.0)?;
    }

    let threshold = filters.create("Threshold", Some("edges"))?;
    connect(threshold, 0, StreamDescriptor::filter(scale, 0))?;

    let invert = filters.create("Invert", None)?;
    connect(invert, 0, StreamDescriptor::filter(threshold, 0))?;

    if instruments > 1 {
        let diff = filters.create("Subtract", Some("skew"))?;
        connect(diff, 0, ch0)?;
        connect(diff, 1, StreamDescriptor::instrument(InstrumentId(1), 0, 0))?;
    }
    Ok(())
}

fn run_demo(
    config: AppConfig,
    instruments: usize,
    channels: usize,
    cycles: usize,
    record_length: usize,
    save: Option<PathBuf>,
) -> anyhow::Result<()> {
    let session = Arc::new(SessionContext::new(config.session.clone()));
    let scopes = mock_instruments(instruments.max(1), channels.max(1), record_length);
    session.set_instruments(scopes.iter().map(|s| s.info()).collect());
    build_default_filters(&session, scopes.len())?;

    let (acq, handle) = Acquisition::new(config, scopes, Arc::clone(&session));
    let thread = acq.spawn()?;
    handle.start();

    let deadline = Instant::now() + Duration::from_secs(10 + cycles as u64);
    let mut harvested = 0;
    while harvested < cycles && Instant::now() < deadline {
        let Some(msg) = handle.recv_timeout(Duration::from_millis(100)) else {
            continue;
        };
        match msg {
            AcquisitionMessage::Harvested { event_id, streams } => {
                harvested += 1;
                println!("event {:>4}: {} stream(s)", event_id, streams);
            }
            AcquisitionMessage::Stats {
                total_events,
                waveforms_per_second,
            } => tracing::debug!("{} events, {:.1} WFM/s", total_events, waveforms_per_second),
            AcquisitionMessage::SyncFault { waited } => {
                println!("sync fault after {:?}, re-armed", waited)
            }
            AcquisitionMessage::FilterError { filter, message } => {
                println!("filter {:?}: {}", filter, message)
            }
            AcquisitionMessage::Error(e) => println!("error: {}", e),
            AcquisitionMessage::TriggerState(state) => {
                tracing::debug!("trigger {}", state.display_name())
            }
            AcquisitionMessage::Shutdown => break,
        }
    }

    handle.shutdown();
    if thread.join().is_err() {
        anyhow::bail!("acquisition thread panicked");
    }

    if harvested < cycles {
        println!("captured {} of {} events before timing out", harvested, cycles);
    }
    for stream in session.store().streams() {
        if let Some(w) = session.store().get(&stream) {
            let s = w.summary();
            println!(
                "{:<14} {:>6} samples  min {:>8.3}  max {:>8.3}  mean {:>8.3}",
                stream.to_string(),
                s.len,
                s.min,
                s.max,
                s.mean
            );
        }
    }

    if let Some(path) = save {
        let summary = save_session(&path, &session)?;
        println!(
            "saved {} event(s), {} stream(s) to {:?}",
            summary.events, summary.streams, path
        );
        remember(&path, summary.instruments);
    }
    Ok(())
}

fn inspect(config: AppConfig, file: &Path) -> anyhow::Result<()> {
    let session = SessionContext::new(config.session);
    let report = load_session(file, &session, |fraction, status| {
        tracing::debug!("{:>3.0}% {}", fraction * 100.0, status)
    })?;

    println!("{}", file.display());
    for (i, info) in session.instruments().iter().enumerate() {
        println!(
            "  scope{} {:?}: {} {} (serial {}), {} channel(s)",
            i,
            info.nickname,
            info.vendor,
            info.name,
            info.serial,
            info.channels.len()
        );
    }

    println!("  events:");
    for event in session.history().iter() {
        let marker = if Some(event.id) == report.current_event { "*" } else { " " };
        println!(
            "   {}{:>4} t={}.{:015} {} stream(s)",
            marker,
            event.id,
            event.timestamp,
            event.femtoseconds,
            event.streams.len()
        );
    }

    println!("  streams:");
    for stream in session.store().streams() {
        if let Some(w) = session.store().get(&stream) {
            println!(
                "    {:<14} {:>8} {} samples{}",
                stream.to_string(),
                w.len(),
                w.kind(),
                if w.dense_packed() { " (dense)" } else { "" }
            );
        }
    }

    match FilterScheduler::plan(session.filters()) {
        Ok(plan) => {
            println!("  filter blocks:");
            for (level, block) in plan.blocks.iter().enumerate() {
                let names: Vec<String> = block
                    .iter()
                    .filter_map(|id| session.filters().instance(*id))
                    .map(|inst| {
                        let inst = inst.lock();
                        format!("{} ({})", inst.nickname(), inst.protocol())
                    })
                    .collect();
                println!("    {}: {}", level, names.join(", "));
            }
        }
        Err(e) => println!("  filter graph: {}", e),
    }

    if report.streams_skipped > 0 {
        println!("  {} stream(s) could not be loaded", report.streams_skipped);
    }
    remember(file, report.instruments);
    Ok(())
}

fn convert(
    config: AppConfig,
    file: &Path,
    format: WaveformFormat,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let session = SessionContext::new(config.session);
    load_session(file, &session, |_, _| {})?;

    let target = output.unwrap_or_else(|| file.to_path_buf());
    let summary = save_session_as(&target, &session, Some(format))?;
    println!(
        "wrote {} stream(s) as {} to {}",
        summary.streams,
        format,
        target.display()
    );
    remember(&target, summary.instruments);
    Ok(())
}

fn remember(path: &Path, instruments: usize) {
    let mut state = AppState::load_or_default();
    state.cleanup_missing_sessions();
    state.add_recent_session(path, instruments);
    if let Err(e) = state.save() {
        tracing::warn!("Failed to update recent sessions: {}", e);
    }
}
