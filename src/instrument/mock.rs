//! Simulated instrument for demos and tests.
//!
//! A [`MockInstrument`] behaves like a triggered digitizer:
//!
//! - arming takes `arm_latency` before the armed flag reads back true
//! - once armed, a trigger event fires after `trigger_delay`
//!   (`None` means the trigger condition is never met)
//! - single-shot arming disarms after one event; normal arming re-arms
//! - a forced trigger captures immediately
//!
//! Sample data comes from a [`MockPattern`]. Every command is appended to an
//! optional shared [`CommandLog`] so tests can assert cross-instrument
//! ordering. A cloneable [`MockInstrumentHandle`] lets a test change the
//! behaviour after the instrument has been moved into a coordinator.

use super::{ChannelInfo, Instrument, InstrumentInfo, PendingCapture};
use crate::error::Result;
use crate::types::{SampleKind, Samples, Waveform, WaveformTiming, FS_PER_SECOND};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pattern for generating mock sample data
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockPattern {
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency (Hz) and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Square wave
    Square { period: f64, amplitude: f64 },
    /// Sawtooth wave
    Sawtooth { period: f64, amplitude: f64 },
    /// Triangle wave
    Triangle { period: f64, amplitude: f64 },
}

impl Default for MockPattern {
    fn default() -> Self {
        MockPattern::Sine {
            frequency: 1e6,
            amplitude: 1.0,
            offset: 0.0,
        }
    }
}

impl MockPattern {
    /// Value at `t` seconds
    pub fn value_at(&self, t: f64) -> f64 {
        match *self {
            MockPattern::Constant(v) => v,
            MockPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin(),
            MockPattern::Square { period, amplitude } => {
                if t.rem_euclid(period) < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            MockPattern::Sawtooth { period, amplitude } => amplitude * (t.rem_euclid(period) / period),
            MockPattern::Triangle { period, amplitude } => {
                let t = t.rem_euclid(period);
                let half = period / 2.0;
                if t < half {
                    amplitude * (2.0 * t / half - 1.0)
                } else {
                    amplitude * (1.0 - 2.0 * (t - half) / half)
                }
            }
        }
    }
}

/// Command received by a mock, as recorded in a [`CommandLog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentCommand {
    Start,
    StartSingle,
    Force,
    Stop,
    ClearPending,
}

/// Ordered record of commands across any number of mocks
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Arc<Mutex<Vec<(String, InstrumentCommand)>>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, nickname: &str, command: InstrumentCommand) {
        self.entries.lock().push((nickname.to_string(), command));
    }

    pub fn entries(&self) -> Vec<(String, InstrumentCommand)> {
        self.entries.lock().clone()
    }

    /// Commands received by one instrument, in order
    pub fn for_instrument(&self, nickname: &str) -> Vec<InstrumentCommand> {
        self.entries
            .lock()
            .iter()
            .filter(|(n, _)| n == nickname)
            .map(|(_, c)| *c)
            .collect()
    }

    /// Index of the first command sent to `nickname`
    pub fn first_index(&self, nickname: &str) -> Option<usize> {
        self.entries.lock().iter().position(|(n, _)| n == nickname)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[derive(Debug)]
struct MockState {
    armed: bool,
    single: bool,
    armed_since: Option<Instant>,
    fired_since_arm: bool,
    arm_latency: Duration,
    trigger_delay: Option<Duration>,
    confirms_arm: bool,
    pending: VecDeque<PendingCapture>,
    triggers: u64,
}

impl MockState {
    fn arm(&mut self, single: bool) {
        self.armed = true;
        self.single = single;
        self.armed_since = Some(Instant::now());
        self.fired_since_arm = false;
    }
}

pub struct MockInstrument {
    info: InstrumentInfo,
    pattern: MockPattern,
    record_length: usize,
    timescale: i64,
    state: Arc<Mutex<MockState>>,
    log: Option<CommandLog>,
}

impl MockInstrument {
    /// Mock with `analog_channels` analog channels named `CH1..`
    pub fn new(nickname: impl Into<String>, analog_channels: usize) -> Self {
        let nickname = nickname.into();
        let channels = (0..analog_channels)
            .map(|i| ChannelInfo::new(i, format!("CH{}", i + 1), SampleKind::Analog))
            .collect();
        Self {
            info: InstrumentInfo {
                nickname,
                name: "MockScope".to_string(),
                vendor: "scopecore".to_string(),
                serial: "0000".to_string(),
                channels,
            },
            pattern: MockPattern::default(),
            record_length: 1000,
            timescale: 1_000_000,
            state: Arc::new(Mutex::new(MockState {
                armed: false,
                single: false,
                armed_since: None,
                fired_since_arm: false,
                arm_latency: Duration::ZERO,
                trigger_delay: Some(Duration::ZERO),
                confirms_arm: true,
                pending: VecDeque::new(),
                triggers: 0,
            })),
            log: None,
        }
    }

    /// Add a digital channel after the existing ones
    pub fn with_digital_channel(mut self) -> Self {
        let index = self.info.channels.len();
        self.info.channels.push(ChannelInfo::new(
            index,
            format!("D{}", index),
            SampleKind::Digital,
        ));
        self
    }

    pub fn with_pattern(mut self, pattern: MockPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_record_length(mut self, samples: usize) -> Self {
        self.record_length = samples;
        self
    }

    /// Femtoseconds per sample
    pub fn with_timescale(mut self, timescale: i64) -> Self {
        self.timescale = timescale;
        self
    }

    pub fn with_log(mut self, log: CommandLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_arm_latency(self, latency: Duration) -> Self {
        self.state.lock().arm_latency = latency;
        self
    }

    pub fn with_trigger_delay(self, delay: Option<Duration>) -> Self {
        self.state.lock().trigger_delay = delay;
        self
    }

    pub fn handle(&self) -> MockInstrumentHandle {
        MockInstrumentHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, command: InstrumentCommand) {
        if let Some(log) = &self.log {
            log.record(&self.info.nickname, command);
        }
    }

    fn generate(&self, seq: u64) -> PendingCapture {
        let timing = WaveformTiming::new(self.timescale).stamped_now();
        let dt = self.timescale as f64 / FS_PER_SECOND as f64;
        // Shift each capture a little so consecutive events differ
        let t0 = seq as f64 * dt * 7.0;

        self.info
            .channels
            .iter()
            .fold(PendingCapture::new(), |capture, ch| {
                let times = (0..self.record_length).map(|i| t0 + i as f64 * dt);
                let samples = match ch.kind {
                    SampleKind::Analog => {
                        Samples::Analog(times.map(|t| self.pattern.value_at(t) as f32).collect())
                    }
                    SampleKind::Digital => {
                        Samples::Digital(times.map(|t| self.pattern.value_at(t) > 0.0).collect())
                    }
                };
                capture.with_stream(ch.index, 0, Waveform::dense(timing, samples))
            })
    }

    /// Fire the trigger if it is due
    fn poll(&self) {
        let now = Instant::now();
        let mut st = self.state.lock();
        let due = match (st.armed, st.armed_since, st.trigger_delay) {
            (true, Some(since), Some(delay)) => now.duration_since(since) >= delay,
            _ => false,
        };
        if !due {
            return;
        }

        let capture = self.generate(st.triggers);
        st.pending.push_back(capture);
        st.triggers += 1;
        st.fired_since_arm = true;
        if st.single {
            st.armed = false;
        } else {
            st.armed_since = Some(now);
        }
    }
}

impl Instrument for MockInstrument {
    fn info(&self) -> InstrumentInfo {
        self.info.clone()
    }

    fn nickname(&self) -> String {
        self.info.nickname.clone()
    }

    fn is_offline(&self) -> bool {
        false
    }

    fn has_pending_waveforms(&mut self) -> bool {
        self.poll();
        !self.state.lock().pending.is_empty()
    }

    fn peek_trigger_armed(&mut self) -> bool {
        self.poll();
        let st = self.state.lock();
        let settled = st
            .armed_since
            .is_some_and(|since| since.elapsed() >= st.arm_latency);
        st.confirms_arm && (st.fired_since_arm || (st.armed && settled))
    }

    fn start(&mut self) -> Result<()> {
        self.record(InstrumentCommand::Start);
        self.state.lock().arm(false);
        Ok(())
    }

    fn start_single_trigger(&mut self) -> Result<()> {
        self.record(InstrumentCommand::StartSingle);
        self.state.lock().arm(true);
        Ok(())
    }

    fn force_trigger(&mut self) -> Result<()> {
        self.record(InstrumentCommand::Force);
        let seq = self.state.lock().triggers;
        let capture = self.generate(seq);
        let mut st = self.state.lock();
        st.pending.push_back(capture);
        st.triggers += 1;
        st.armed = false;
        st.fired_since_arm = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record(InstrumentCommand::Stop);
        let mut st = self.state.lock();
        st.armed = false;
        st.armed_since = None;
        st.fired_since_arm = false;
        Ok(())
    }

    fn clear_pending_waveforms(&mut self) {
        self.record(InstrumentCommand::ClearPending);
        self.state.lock().pending.clear();
    }

    fn pop_pending_waveform(&mut self) -> Option<PendingCapture> {
        self.state.lock().pending.pop_front()
    }
}

/// Remote control for a [`MockInstrument`] owned elsewhere
#[derive(Clone)]
pub struct MockInstrumentHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockInstrumentHandle {
    pub fn set_trigger_delay(&self, delay: Option<Duration>) {
        self.state.lock().trigger_delay = delay;
    }

    pub fn set_arm_latency(&self, latency: Duration) {
        self.state.lock().arm_latency = latency;
    }

    /// When false the armed flag never reads back true
    pub fn set_confirms_arm(&self, confirms: bool) {
        self.state.lock().confirms_arm = confirms;
    }

    pub fn push_pending(&self, capture: PendingCapture) {
        self.state.lock().pending.push_back(capture);
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn trigger_count(&self) -> u64 {
        self.state.lock().triggers
    }
}
