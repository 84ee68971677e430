//! Mock construction helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use scopecore::config::{AppConfig, TriggerConfig};
use scopecore::instrument::{CommandLog, Instrument, MockInstrument, MockInstrumentHandle};
use std::time::Duration;

/// Create test channels with default size
pub fn create_test_channels<T, U>() -> (Sender<T>, Receiver<T>, Sender<U>, Receiver<U>) {
    let (tx1, rx1) = bounded(16);
    let (tx2, rx2) = bounded(16);
    (tx1, rx1, tx2, rx2)
}

/// Trigger settings short enough for tests
pub fn fast_trigger_config() -> TriggerConfig {
    TriggerConfig {
        arm_timeout: Duration::from_millis(50),
        arm_retry_limit: 2,
        arm_poll_interval: Duration::from_millis(1),
        fault_window: Duration::from_millis(40),
    }
}

pub fn fast_app_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.trigger = fast_trigger_config();
    config.acquisition.poll_interval = Duration::from_millis(1);
    config
}

/// `count` mocks named `scope0..` sharing one command log.
///
/// Secondaries fire `secondary_delay` after arming; the primary fires
/// after `primary_delay`.
pub fn mock_group(
    count: usize,
    primary_delay: Option<Duration>,
    secondary_delay: Option<Duration>,
) -> (Vec<Box<dyn Instrument>>, Vec<MockInstrumentHandle>, CommandLog) {
    let log = CommandLog::new();
    let mut instruments: Vec<Box<dyn Instrument>> = Vec::with_capacity(count);
    let mut handles = Vec::with_capacity(count);
    for i in 0..count {
        let delay = if i == 0 { primary_delay } else { secondary_delay };
        let scope = MockInstrument::new(format!("scope{}", i), 2)
            .with_record_length(16)
            .with_log(log.clone())
            .with_trigger_delay(delay);
        handles.push(scope.handle());
        instruments.push(Box::new(scope));
    }
    (instruments, handles, log)
}
