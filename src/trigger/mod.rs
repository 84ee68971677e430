//! Trigger coordination across a set of instruments.
//!
//! The coordinator arms every online instrument as one logical trigger and
//! decides, on each poll tick, whether a complete multi-instrument event is
//! ready to harvest.
//!
//! # Arming order
//!
//! The first online instrument is the primary; its trigger output drives the
//! others. Secondaries are armed first, last index first, each one
//! single-shot and confirmed armed before moving on. The primary is armed
//! last so it cannot fire before every secondary is listening.
//!
//! # Free-run
//!
//! A normal (repeating) trigger over more than one instrument is run as a
//! loop of synchronized single-shot cycles: harvest, then re-arm everything.
//! If the primary has data and a secondary still has none after
//! `fault_window`, the cycle is abandoned, all pending data is dropped and
//! the set is re-armed.
//!
//! # States
//!
//! ```text
//!               arm(1 online)                 arm(>1 online)
//! Disarmed ────────────────► ArmedWaiting     ───────────────► ArmedMultiSyncWaiting
//!    ▲                           │                                   │      ▲
//!    │ stop / one-shot harvest   │                          fault    ▼      │ re-arm
//!    └───────────────────────────┴────────────────────────────── FaultTimeout
//! ```

use crate::config::TriggerConfig;
use crate::error::{Result, ScopeError};
use crate::instrument::{Instrument, PendingCapture};
use crate::types::InstrumentId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Requested trigger behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Repeating
    Normal,
    /// One capture
    Single,
    /// One capture, bypassing the trigger condition
    Forced,
}

impl TriggerKind {
    pub fn is_one_shot(self) -> bool {
        !matches!(self, TriggerKind::Normal)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Normal => write!(f, "normal"),
            TriggerKind::Single => write!(f, "single"),
            TriggerKind::Forced => write!(f, "forced"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    #[default]
    Disarmed,
    ArmedWaiting,
    /// Armed with more than one online instrument
    ArmedMultiSyncWaiting,
    /// A free-run cycle was abandoned; re-arming follows immediately
    FaultTimeout,
}

impl TriggerState {
    pub fn is_armed(self) -> bool {
        matches!(
            self,
            TriggerState::ArmedWaiting | TriggerState::ArmedMultiSyncWaiting
        )
    }

    pub fn display_name(self) -> &'static str {
        match self {
            TriggerState::Disarmed => "Stopped",
            TriggerState::ArmedWaiting => "Armed",
            TriggerState::ArmedMultiSyncWaiting => "Armed (sync)",
            TriggerState::FaultTimeout => "Sync fault",
        }
    }
}

/// Result of one readiness poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not armed; stray pending data was discarded
    Idle,
    /// Armed, waiting for at least one instrument
    Pending,
    /// Every online instrument has a capture (or none are online)
    Ready,
    /// Free-run cycle abandoned after a secondary lagged the primary
    SyncFault { waited: Duration },
}

pub struct TriggerCoordinator {
    instruments: Vec<Box<dyn Instrument>>,
    config: TriggerConfig,
    state: TriggerState,
    one_shot: bool,
    multi_free_run: bool,
    armed_at: Option<Instant>,
    primary_pending_since: Option<Instant>,
    abort: Arc<AtomicBool>,
}

impl TriggerCoordinator {
    pub fn new(instruments: Vec<Box<dyn Instrument>>, config: TriggerConfig) -> Self {
        Self {
            instruments,
            config,
            state: TriggerState::Disarmed,
            one_shot: false,
            multi_free_run: false,
            armed_at: None,
            primary_pending_since: None,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn instruments(&self) -> &[Box<dyn Instrument>] {
        &self.instruments
    }

    /// Replace the instrument set. Any armed trigger is stopped first.
    pub fn set_instruments(&mut self, instruments: Vec<Box<dyn Instrument>>) {
        self.stop();
        self.instruments = instruments;
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state.is_armed()
    }

    pub fn is_free_running(&self) -> bool {
        self.multi_free_run
    }

    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    pub fn armed_at(&self) -> Option<Instant> {
        self.armed_at
    }

    /// Flag that aborts an in-progress arm sequence when set
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn clear_abort(&self) {
        self.abort.store(false, Ordering::SeqCst);
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Indices of online instruments; the first is the primary
    pub fn online(&self) -> Vec<usize> {
        self.instruments
            .iter()
            .enumerate()
            .filter(|(_, inst)| !inst.is_offline())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn primary(&self) -> Option<InstrumentId> {
        self.online().first().map(|&i| InstrumentId(i as u32))
    }

    /// Arm every online instrument as one logical trigger
    pub fn arm(&mut self, kind: TriggerKind) -> Result<()> {
        let online = self.online();
        self.one_shot = kind.is_one_shot();
        self.primary_pending_since = None;

        if online.is_empty() {
            // File-only session: the poller just re-runs the filter graph
            self.multi_free_run = false;
            self.armed_at = Some(Instant::now());
            self.state = TriggerState::ArmedWaiting;
            tracing::debug!("Armed {} trigger with no online instruments", kind);
            return Ok(());
        }

        let multi = online.len() > 1;
        self.multi_free_run = multi && !self.one_shot;

        if multi {
            for &i in online.iter().rev() {
                let inst = &mut self.instruments[i];
                if inst.peek_trigger_armed() {
                    inst.stop()?;
                }
                if inst.has_pending_waveforms() {
                    tracing::warn!(
                        "Instrument {} has stale pending waveforms, discarding",
                        inst.nickname()
                    );
                }
                inst.clear_pending_waveforms();
            }
        }

        let primary = online[0];
        for &i in online.iter().rev() {
            if self.aborted() {
                tracing::info!("Arm sequence aborted");
                self.stop();
                return Ok(());
            }

            let effective = if i != primary || (multi && kind == TriggerKind::Normal) {
                TriggerKind::Single
            } else {
                kind
            };
            self.issue(i, effective)?;

            if i != primary {
                if !self.confirm_armed(i)? {
                    tracing::info!("Arm sequence aborted");
                    self.stop();
                    return Ok(());
                }
                // Anything captured before confirmation is not part of this event
                self.instruments[i].clear_pending_waveforms();
            }
        }

        self.armed_at = Some(Instant::now());
        self.state = if multi {
            TriggerState::ArmedMultiSyncWaiting
        } else {
            TriggerState::ArmedWaiting
        };
        tracing::debug!(
            "Armed {} trigger on {} instrument(s){}",
            kind,
            online.len(),
            if self.multi_free_run { " (free-run)" } else { "" }
        );
        Ok(())
    }

    fn issue(&mut self, index: usize, kind: TriggerKind) -> Result<()> {
        let inst = &mut self.instruments[index];
        let res = match kind {
            TriggerKind::Normal => inst.start(),
            TriggerKind::Single => inst.start_single_trigger(),
            TriggerKind::Forced => inst.force_trigger(),
        };
        res.map_err(|e| e.with_context(format!("Arming {} ({})", inst.nickname(), kind)))
    }

    /// Wait for a secondary to report armed, re-arming it on timeout.
    ///
    /// Returns `Ok(false)` if the sequence was aborted. After
    /// `arm_retry_limit` re-arms the wait gives up and returns `Ok(true)`;
    /// the free-run fault window recovers if the instrument never fires.
    fn confirm_armed(&mut self, index: usize) -> Result<bool> {
        let mut window_start = Instant::now();
        let mut retries = 0;

        loop {
            if self.aborted() {
                return Ok(false);
            }
            if self.instruments[index].peek_trigger_armed() {
                return Ok(true);
            }

            if window_start.elapsed() >= self.config.arm_timeout {
                let inst = &mut self.instruments[index];
                let timeout = ScopeError::ArmTimeout {
                    nickname: inst.nickname(),
                };
                if retries >= self.config.arm_retry_limit {
                    tracing::warn!("{} after {} re-arms, continuing", timeout, retries);
                    return Ok(true);
                }
                retries += 1;
                tracing::warn!("{}, re-arming (attempt {})", timeout, retries);
                inst.stop()?;
                inst.start_single_trigger()?;
                window_start = Instant::now();
            }

            std::thread::sleep(self.config.arm_poll_interval);
        }
    }

    /// Disarm everything and drop pending data. Safe to call in any state.
    pub fn stop(&mut self) {
        self.multi_free_run = false;
        self.one_shot = false;
        self.primary_pending_since = None;
        self.state = TriggerState::Disarmed;
        self.stop_and_clear_all();
    }

    fn stop_and_clear_all(&mut self) {
        for inst in self.instruments.iter_mut() {
            if let Err(e) = inst.stop() {
                tracing::warn!("Failed to stop {}: {}", inst.nickname(), e);
            }
            inst.clear_pending_waveforms();
        }
    }

    pub fn check_for_pending_waveforms(&mut self) -> PollOutcome {
        self.check_for_pending_waveforms_at(Instant::now())
    }

    /// Readiness poll with an explicit clock, for deterministic tests
    pub fn check_for_pending_waveforms_at(&mut self, now: Instant) -> PollOutcome {
        if !self.is_armed() {
            for inst in self.instruments.iter_mut() {
                inst.clear_pending_waveforms();
            }
            return PollOutcome::Idle;
        }

        let online = self.online();
        let Some(&primary) = online.first() else {
            return PollOutcome::Ready;
        };

        if self.multi_free_run
            && self.primary_pending_since.is_none()
            && self.instruments[primary].has_pending_waveforms()
        {
            self.primary_pending_since = Some(now);
        }

        let mut all_ready = true;
        for &i in &online {
            if !self.instruments[i].has_pending_waveforms() {
                all_ready = false;
                break;
            }
        }
        if all_ready {
            return PollOutcome::Ready;
        }

        if self.multi_free_run {
            if let Some(since) = self.primary_pending_since {
                let waited = now.saturating_duration_since(since);
                if waited > self.config.fault_window {
                    self.recover_from_fault(waited);
                    return PollOutcome::SyncFault { waited };
                }
            }
        }

        PollOutcome::Pending
    }

    fn recover_from_fault(&mut self, waited: Duration) {
        tracing::warn!(
            "Secondary instrument(s) did not trigger within {:?} of the primary, re-arming",
            waited
        );
        self.state = TriggerState::FaultTimeout;
        self.primary_pending_since = None;
        for &i in &self.online() {
            let inst = &mut self.instruments[i];
            if let Err(e) = inst.stop() {
                tracing::warn!("Failed to stop {}: {}", inst.nickname(), e);
            }
            inst.clear_pending_waveforms();
        }
        if let Err(e) = self.arm(TriggerKind::Normal) {
            tracing::error!("Re-arm after sync fault failed: {}", e);
            self.stop();
        }
    }

    /// Pop one pending capture from every online instrument.
    ///
    /// A one-shot trigger is disarmed afterwards. Call only after
    /// [`PollOutcome::Ready`].
    pub fn harvest(&mut self) -> Vec<(InstrumentId, PendingCapture)> {
        let mut captures = Vec::new();
        for i in self.online() {
            let inst = &mut self.instruments[i];
            match inst.pop_pending_waveform() {
                Some(capture) => captures.push((InstrumentId(i as u32), capture)),
                None => tracing::warn!("{} reported pending data but had none", inst.nickname()),
            }
        }

        self.primary_pending_since = None;
        if self.one_shot {
            self.one_shot = false;
            self.multi_free_run = false;
            self.state = TriggerState::Disarmed;
        }
        captures
    }

    /// Start the next free-run cycle, if free-running
    pub fn rearm_if_free_running(&mut self) -> Result<()> {
        if self.multi_free_run && self.is_armed() {
            self.arm(TriggerKind::Normal)?;
        }
        Ok(())
    }
}
