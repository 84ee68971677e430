use super::{Instrument, InstrumentInfo, PendingCapture};
use crate::error::Result;

/// Stand-in for an instrument that was saved in a session but is not
/// connected. Carries its description; never arms, never produces data.
#[derive(Debug, Clone)]
pub struct OfflineInstrument {
    info: InstrumentInfo,
}

impl OfflineInstrument {
    pub fn new(info: InstrumentInfo) -> Self {
        Self { info }
    }
}

impl Instrument for OfflineInstrument {
    fn info(&self) -> InstrumentInfo {
        self.info.clone()
    }

    fn nickname(&self) -> String {
        self.info.nickname.clone()
    }

    fn is_offline(&self) -> bool {
        true
    }

    fn has_pending_waveforms(&mut self) -> bool {
        false
    }

    fn peek_trigger_armed(&mut self) -> bool {
        false
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_single_trigger(&mut self) -> Result<()> {
        Ok(())
    }

    fn force_trigger(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear_pending_waveforms(&mut self) {}

    fn pop_pending_waveform(&mut self) -> Option<PendingCapture> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_never_has_data() {
        let mut inst = OfflineInstrument::new(InstrumentInfo {
            nickname: "saved".into(),
            ..Default::default()
        });
        assert!(inst.is_offline());
        inst.start().unwrap();
        assert!(!inst.peek_trigger_armed());
        assert!(!inst.has_pending_waveforms());
        assert!(inst.pop_pending_waveform().is_none());
        assert_eq!(inst.nickname(), "saved");
    }
}
