//! Acquisition thread: the poll-and-harvest cycle.
//!
//! The trigger coordinator and its instruments live on one dedicated
//! polling thread. Everything else talks to it through channels:
//!
//! - [`AcquisitionCommand`] - sent to the worker (arm, stop, select history, ...)
//! - [`AcquisitionMessage`] - sent back (trigger state, harvested events, faults)
//! - [`AcquisitionHandle`] - caller side of both channels
//! - [`Acquisition`] - owns the worker until [`Acquisition::run`] or [`Acquisition::spawn`]
//!
//! # Example
//!
//! ```ignore
//! use scopecore::acquisition::Acquisition;
//! use scopecore::config::AppConfig;
//! use scopecore::session::SessionContext;
//! use std::sync::Arc;
//!
//! let session = Arc::new(SessionContext::default());
//! let (acq, handle) = Acquisition::new(AppConfig::default(), instruments, session.clone());
//! let thread = acq.spawn()?;
//!
//! handle.start();
//! for msg in handle.drain() {
//!     println!("{:?}", msg);
//! }
//! handle.shutdown();
//! thread.join().ok();
//! ```

mod worker;

pub use worker::{AcquisitionWorker, RateTracker};

use crate::config::AppConfig;
use crate::error::Result;
use crate::filter::FilterId;
use crate::instrument::Instrument;
use crate::session::SessionContext;
use crate::trigger::{TriggerCoordinator, TriggerState};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Command sent to the acquisition thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionCommand {
    /// Arm in normal (repeating) mode
    Start,
    /// Arm for one event
    StartSingle,
    /// Capture one event now
    Force,
    /// Disarm and drop pending data
    Stop,
    /// Stop and make a history event current
    SelectHistory(u64),
    /// Stop and drop all session data
    CloseSession,
    /// Stop and exit the thread
    Shutdown,
}

/// Message sent from the acquisition thread
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionMessage {
    TriggerState(TriggerState),
    /// A complete event was absorbed into the session
    Harvested { event_id: u64, streams: usize },
    /// A free-run cycle was abandoned and re-armed
    SyncFault { waited: Duration },
    /// A filter failed during the post-harvest refresh; `None` for graph errors
    FilterError {
        filter: Option<FilterId>,
        message: String,
    },
    /// Waveform rate statistics, sent after each harvest
    Stats { total_events: u64, waveforms_per_second: f64 },
    /// An instrument command failed
    Error(String),
    Shutdown,
}

/// Caller side of the acquisition channels
pub struct AcquisitionHandle {
    pub receiver: Receiver<AcquisitionMessage>,
    pub command_sender: Sender<AcquisitionCommand>,
    abort: Arc<AtomicBool>,
}

impl AcquisitionHandle {
    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<AcquisitionMessage> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<AcquisitionMessage> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<AcquisitionMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    pub fn send_command(&self, cmd: AcquisitionCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    pub fn start(&self) {
        let _ = self.command_sender.send(AcquisitionCommand::Start);
    }

    pub fn start_single(&self) {
        let _ = self.command_sender.send(AcquisitionCommand::StartSingle);
    }

    pub fn force(&self) {
        let _ = self.command_sender.send(AcquisitionCommand::Force);
    }

    /// Stop the trigger. Interrupts an arm sequence already in progress.
    pub fn stop(&self) {
        self.abort.store(true, Ordering::SeqCst);
        let _ = self.command_sender.send(AcquisitionCommand::Stop);
    }

    pub fn select_history(&self, event_id: u64) {
        self.abort.store(true, Ordering::SeqCst);
        let _ = self
            .command_sender
            .send(AcquisitionCommand::SelectHistory(event_id));
    }

    pub fn close_session(&self) {
        self.abort.store(true, Ordering::SeqCst);
        let _ = self.command_sender.send(AcquisitionCommand::CloseSession);
    }

    pub fn shutdown(&self) {
        self.abort.store(true, Ordering::SeqCst);
        let _ = self.command_sender.send(AcquisitionCommand::Shutdown);
    }
}

/// Acquisition worker not yet running
pub struct Acquisition {
    worker: AcquisitionWorker,
    running: Arc<AtomicBool>,
}

impl Acquisition {
    pub fn new(
        config: AppConfig,
        instruments: Vec<Box<dyn Instrument>>,
        session: Arc<SessionContext>,
    ) -> (Self, AcquisitionHandle) {
        let buffer = config.acquisition.channel_buffer_size.max(1);
        let (cmd_tx, cmd_rx) = bounded(buffer);
        let (msg_tx, msg_rx) = bounded(buffer);

        let coordinator = TriggerCoordinator::new(instruments, config.trigger.clone());
        let abort = coordinator.abort_handle();
        let running = Arc::new(AtomicBool::new(true));

        let worker = AcquisitionWorker::new(
            coordinator,
            session,
            config.acquisition.poll_interval,
            cmd_rx,
            msg_tx,
            Arc::clone(&running),
        );

        let handle = AcquisitionHandle {
            receiver: msg_rx,
            command_sender: cmd_tx,
            abort,
        };
        (Self { worker, running }, handle)
    }

    /// Run the poll loop on the current thread until shutdown
    pub fn run(self) {
        let mut worker = self.worker;
        worker.run();
    }

    /// Run the poll loop on a new thread
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = std::thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Flag that ends the poll loop when cleared
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}
