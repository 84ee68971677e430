//! # scopecore: multi-instrument capture core
//!
//! Coordinates one or more triggered instruments as a single logical
//! trigger, stores the captured waveforms, re-evaluates a graph of derived
//! signals after every capture, and saves/loads whole sessions.
//!
//! ## Architecture
//!
//! - **Trigger**: arms instruments secondaries-first and detects free-run sync faults
//! - **Acquisition**: a polling thread that harvests complete events into the session
//! - **Store**: one `Arc` snapshot per stream; replacing never mutates a published waveform
//! - **Filter**: registry of derived-signal nodes, leveled into parallel blocks
//! - **Codec**: the `sparsev1` / `densev1` binary waveform bodies
//! - **Session**: data lock, history, and the on-disk session layout
//! - **Communication**: crossbeam channels between the acquisition thread and callers
//!
//! ## Configuration
//!
//! Tunables (timeouts, poll interval, history depth, save format) live in
//! [`AppConfig`] (TOML). Recently used sessions are tracked in [`AppState`],
//! stored as JSON in the platform data directory under `scopecore`.
//!
//! ## Example
//!
//! ```ignore
//! use scopecore::{
//!     acquisition::Acquisition,
//!     config::AppConfig,
//!     instrument::{Instrument, MockInstrument},
//!     session::{save_session, SessionContext},
//! };
//! use std::sync::Arc;
//!
//! let config = AppConfig::default();
//! let session = Arc::new(SessionContext::new(config.session.clone()));
//! let instruments: Vec<Box<dyn Instrument>> = vec![
//!     Box::new(MockInstrument::new("primary", 2)),
//!     Box::new(MockInstrument::new("secondary", 2)),
//! ];
//! session.set_instruments(instruments.iter().map(|i| i.info()).collect());
//!
//! let (acq, handle) = Acquisition::new(config, instruments, session.clone());
//! let thread = acq.spawn()?;
//! handle.start();
//! // ...
//! handle.shutdown();
//! thread.join().ok();
//!
//! save_session("capture.scopesession", &session)?;
//! ```

pub mod acquisition;
pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod instrument;
pub mod session;
pub mod store;
pub mod trigger;
pub mod types;

// Re-export commonly used types
pub use acquisition::{Acquisition, AcquisitionCommand, AcquisitionHandle, AcquisitionMessage};
pub use codec::WaveformFormat;
pub use config::{AppConfig, AppState};
pub use error::{Result, ScopeError};
pub use filter::{FilterId, FilterRegistry, FilterScheduler};
pub use instrument::{Instrument, InstrumentInfo};
pub use session::SessionContext;
pub use store::WaveformStore;
pub use trigger::{PollOutcome, TriggerCoordinator, TriggerKind, TriggerState};
pub use types::{StreamDescriptor, Waveform};
