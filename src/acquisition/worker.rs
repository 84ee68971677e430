//! Acquisition worker loop.
//!
//! Each tick the worker drains pending commands, then asks the trigger
//! coordinator whether every online instrument has data. When they do, it
//! harvests under the session data lock, refreshes the filter graph and, in
//! free-run mode, re-arms for the next cycle. Polling happens even while
//! disarmed so stray captures are discarded.

use super::{AcquisitionCommand, AcquisitionMessage};
use crate::session::SessionContext;
use crate::trigger::{PollOutcome, TriggerCoordinator, TriggerKind, TriggerState};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Harvest times kept for the WFM/s estimate
const RATE_WINDOW: usize = 10;

/// Rolling waveform-rate estimate over the most recent harvests
#[derive(Debug, Clone, Default)]
pub struct RateTracker {
    total: u64,
    recent: VecDeque<Instant>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: Instant) {
        self.total += 1;
        if self.recent.len() == RATE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(at);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Events per second across the window; 0 until two events are seen
    pub fn waveforms_per_second(&self) -> f64 {
        match (self.recent.front(), self.recent.back()) {
            (Some(first), Some(last)) if self.recent.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f64();
                if span > 0.0 {
                    (self.recent.len() - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    /// Forget the window, keep the total
    pub fn reset_window(&mut self) {
        self.recent.clear();
    }
}

pub struct AcquisitionWorker {
    coordinator: TriggerCoordinator,
    session: Arc<SessionContext>,
    poll_interval: Duration,
    command_rx: Receiver<AcquisitionCommand>,
    message_tx: Sender<AcquisitionMessage>,
    running: Arc<AtomicBool>,
    rate: RateTracker,
    last_state: TriggerState,
}

impl AcquisitionWorker {
    pub fn new(
        coordinator: TriggerCoordinator,
        session: Arc<SessionContext>,
        poll_interval: Duration,
        command_rx: Receiver<AcquisitionCommand>,
        message_tx: Sender<AcquisitionMessage>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            coordinator,
            session,
            poll_interval,
            command_rx,
            message_tx,
            running,
            rate: RateTracker::new(),
            last_state: TriggerState::Disarmed,
        }
    }

    pub fn coordinator(&self) -> &TriggerCoordinator {
        &self.coordinator
    }

    pub fn rate(&self) -> &RateTracker {
        &self.rate
    }

    pub fn run(&mut self) {
        tracing::info!(
            "Acquisition worker started with {} instrument(s)",
            self.coordinator.instruments().len()
        );

        while self.running.load(Ordering::SeqCst) {
            self.process_commands();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.poll_once();
            std::thread::sleep(self.poll_interval);
        }

        self.coordinator.stop();
        self.publish_state();
        self.send(AcquisitionMessage::Shutdown);
        tracing::info!("Acquisition worker stopped");
    }

    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    pub fn handle_command(&mut self, cmd: AcquisitionCommand) {
        tracing::debug!("Acquisition command {:?}", cmd);
        match cmd {
            AcquisitionCommand::Start => self.arm(TriggerKind::Normal),
            AcquisitionCommand::StartSingle => self.arm(TriggerKind::Single),
            AcquisitionCommand::Force => self.arm(TriggerKind::Forced),
            AcquisitionCommand::Stop => self.stop(),
            AcquisitionCommand::SelectHistory(id) => {
                self.stop();
                self.session.select_history(id);
            }
            AcquisitionCommand::CloseSession => {
                let session = Arc::clone(&self.session);
                let _guard = session.lock();
                self.stop();
                self.session.close();
                self.rate = RateTracker::new();
            }
            AcquisitionCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
        self.publish_state();
    }

    fn arm(&mut self, kind: TriggerKind) {
        self.coordinator.clear_abort();
        self.rate.reset_window();
        if let Err(e) = self.coordinator.arm(kind) {
            tracing::error!("Arming failed: {}", e);
            self.coordinator.stop();
            self.send(AcquisitionMessage::Error(e.to_string()));
        }
    }

    fn stop(&mut self) {
        self.coordinator.stop();
        self.coordinator.clear_abort();
    }

    /// One readiness check, harvesting if every online instrument is ready
    pub fn poll_once(&mut self) {
        match self.coordinator.check_for_pending_waveforms() {
            PollOutcome::Idle | PollOutcome::Pending => {}
            PollOutcome::SyncFault { waited } => {
                self.send(AcquisitionMessage::SyncFault { waited });
            }
            PollOutcome::Ready => self.harvest(),
        }
        self.publish_state();
    }

    fn harvest(&mut self) {
        let event = {
            let _guard = self.session.lock();
            let captures = self.coordinator.harvest();
            let streams: usize = captures.iter().map(|(_, c)| c.len()).sum();
            self.session.absorb(captures).map(|id| (id, streams))
        };

        match self.session.refresh_all_filters() {
            Ok(report) => {
                for (id, e) in report.errors {
                    self.send(AcquisitionMessage::FilterError {
                        filter: Some(id),
                        message: e.to_string(),
                    });
                }
            }
            Err(e) => self.send(AcquisitionMessage::FilterError {
                filter: None,
                message: e.to_string(),
            }),
        }

        if let Some((event_id, streams)) = event {
            self.rate.record(Instant::now());
            self.send(AcquisitionMessage::Harvested { event_id, streams });
            self.send(AcquisitionMessage::Stats {
                total_events: self.rate.total(),
                waveforms_per_second: self.rate.waveforms_per_second(),
            });
        }

        if let Err(e) = self.coordinator.rearm_if_free_running() {
            tracing::error!("Free-run re-arm failed: {}", e);
            self.coordinator.stop();
            self.send(AcquisitionMessage::Error(e.to_string()));
        }
    }

    fn publish_state(&mut self) {
        let state = self.coordinator.state();
        if state != self.last_state {
            self.last_state = state;
            self.send(AcquisitionMessage::TriggerState(state));
        }
    }

    fn send(&self, msg: AcquisitionMessage) {
        if let Err(TrySendError::Full(msg)) = self.message_tx.try_send(msg) {
            tracing::trace!("Message queue full, dropping {:?}", msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerConfig;
    use crate::instrument::{Instrument, MockInstrument};
    use crossbeam_channel::bounded;

    fn worker(
        instruments: Vec<Box<dyn Instrument>>,
    ) -> (AcquisitionWorker, Sender<AcquisitionCommand>, Receiver<AcquisitionMessage>) {
        let (cmd_tx, cmd_rx) = bounded(16);
        let (msg_tx, msg_rx) = bounded(256);
        let config = TriggerConfig {
            fault_window: Duration::from_millis(50),
            ..Default::default()
        };
        let w = AcquisitionWorker::new(
            TriggerCoordinator::new(instruments, config),
            Arc::new(SessionContext::default()),
            Duration::from_millis(1),
            cmd_rx,
            msg_tx,
            Arc::new(AtomicBool::new(true)),
        );
        (w, cmd_tx, msg_rx)
    }

    #[test]
    fn test_rate_tracker() {
        let mut rate = RateTracker::new();
        let t0 = Instant::now();
        assert_eq!(rate.waveforms_per_second(), 0.0);
        for i in 0..=RATE_WINDOW as u64 + 5 {
            rate.record(t0 + Duration::from_millis(100 * i));
        }
        assert_eq!(rate.total(), RATE_WINDOW as u64 + 6);
        assert!((rate.waveforms_per_second() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_trigger_harvests_once() {
        let (mut w, _cmd, msgs) = worker(vec![Box::new(
            MockInstrument::new("scope", 2).with_record_length(8),
        )]);

        w.handle_command(AcquisitionCommand::StartSingle);
        w.poll_once();
        w.poll_once();

        let harvested: Vec<_> = msgs
            .try_iter()
            .filter(|m| matches!(m, AcquisitionMessage::Harvested { .. }))
            .collect();
        assert_eq!(
            harvested,
            vec![AcquisitionMessage::Harvested {
                event_id: 1,
                streams: 2
            }]
        );
        assert_eq!(w.coordinator().state(), TriggerState::Disarmed);
        assert_eq!(w.rate().total(), 1);
    }

    #[test]
    fn test_free_run_keeps_harvesting() {
        let (mut w, _cmd, msgs) = worker(vec![Box::new(MockInstrument::new("scope", 1))]);
        w.handle_command(AcquisitionCommand::Start);
        for _ in 0..3 {
            w.poll_once();
        }
        w.handle_command(AcquisitionCommand::Stop);

        let count = msgs
            .try_iter()
            .filter(|m| matches!(m, AcquisitionMessage::Harvested { .. }))
            .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_close_session_resets() {
        let (mut w, _cmd, _msgs) = worker(vec![Box::new(MockInstrument::new("scope", 1))]);
        w.handle_command(AcquisitionCommand::Force);
        w.poll_once();
        assert_eq!(w.session.history().len(), 1);

        w.handle_command(AcquisitionCommand::CloseSession);
        assert!(w.session.history().is_empty());
        assert!(w.session.store().is_empty());
        assert!(!w.coordinator().is_armed());
        assert_eq!(w.rate().total(), 0);
    }

    #[test]
    fn test_close_session_while_free_running() {
        let (mut w, cmd, msgs) = worker(vec![Box::new(MockInstrument::new("scope", 1))]);
        w.handle_command(AcquisitionCommand::Start);
        w.poll_once();
        w.poll_once();

        cmd.send(AcquisitionCommand::CloseSession).unwrap();
        w.process_commands();
        assert!(w.session.history().is_empty());
        assert_eq!(w.coordinator().state(), TriggerState::Disarmed);

        // A fresh session numbers its events from 1 again
        w.handle_command(AcquisitionCommand::StartSingle);
        w.poll_once();
        w.poll_once();
        let last = msgs
            .try_iter()
            .filter(|m| matches!(m, AcquisitionMessage::Harvested { .. }))
            .last();
        assert_eq!(
            last,
            Some(AcquisitionMessage::Harvested {
                event_id: 1,
                streams: 1
            })
        );
    }

    #[test]
    fn test_shutdown_ends_run() {
        let (mut w, cmd, msgs) = worker(Vec::new());
        cmd.send(AcquisitionCommand::Shutdown).unwrap();
        w.run();
        assert_eq!(msgs.try_iter().last(), Some(AcquisitionMessage::Shutdown));
    }
}
