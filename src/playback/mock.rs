//! Test double for [`AudioOutput`] with a hand-driven clock.

use std::sync::{Arc, Mutex};

use crate::audio::SampleBlock;

use super::output::{
    AudioOutput, BlockId, OutputFactory, PlaybackError, PlaybackEvent, PlaybackEventSender,
};

#[derive(Debug, Clone)]
pub(crate) struct Scheduled {
    pub id: BlockId,
    pub start: f64,
    pub duration: f64,
    pub samples: Vec<f32>,
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub now: f64,
    pub scheduled: Vec<Scheduled>,
    pub cancelled: usize,
    pub opened: usize,
    pub live: usize,
    pub peak_live: usize,
    /// Report every block as consumed the moment it is scheduled.
    pub auto_complete: bool,
}

/// Shared view into every [`MockOutput`] created from it.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockProbe(Arc<Mutex<MockState>>);

impl MockProbe {
    pub fn auto_completing() -> Self {
        let probe = Self::default();
        probe.0.lock().unwrap().auto_complete = true;
        probe
    }

    pub fn set_now(&self, now: f64) {
        self.0.lock().unwrap().now = now;
    }

    pub fn scheduled(&self) -> Vec<Scheduled> {
        self.0.lock().unwrap().scheduled.clone()
    }

    pub fn cancelled(&self) -> usize {
        self.0.lock().unwrap().cancelled
    }

    pub fn opened(&self) -> usize {
        self.0.lock().unwrap().opened
    }

    pub fn live(&self) -> usize {
        self.0.lock().unwrap().live
    }

    pub fn peak_live(&self) -> usize {
        self.0.lock().unwrap().peak_live
    }
}

pub(crate) struct MockOutput {
    probe: MockProbe,
    events: PlaybackEventSender,
    connected: bool,
}

impl MockOutput {
    pub fn new(probe: MockProbe, events: PlaybackEventSender) -> Self {
        {
            let mut st = probe.0.lock().unwrap();
            st.opened += 1;
            st.live += 1;
            st.peak_live = st.peak_live.max(st.live);
        }
        Self {
            probe,
            events,
            connected: true,
        }
    }
}

impl AudioOutput for MockOutput {
    fn current_time(&self) -> f64 {
        self.probe.0.lock().unwrap().now
    }

    fn schedule(
        &mut self,
        id: BlockId,
        block: SampleBlock,
        start: f64,
    ) -> Result<(), PlaybackError> {
        if !self.connected {
            return Err(PlaybackError::Disconnected);
        }
        let auto_complete = {
            let mut st = self.probe.0.lock().unwrap();
            st.scheduled.push(Scheduled {
                id,
                start,
                duration: block.duration_secs(),
                samples: block.into_samples(),
            });
            st.auto_complete
        };
        if auto_complete {
            let _ = self.events.send(PlaybackEvent::BlockConsumed(id));
        }
        Ok(())
    }

    fn cancel_pending(&mut self) {
        self.probe.0.lock().unwrap().cancelled += 1;
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.probe.0.lock().unwrap().live -= 1;
        }
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.disconnect();
    }
}

pub(crate) struct MockOutputFactory {
    pub probe: MockProbe,
}

impl OutputFactory for MockOutputFactory {
    fn open(
        &self,
        _stream_rate: u32,
        events: PlaybackEventSender,
    ) -> Result<Box<dyn AudioOutput>, PlaybackError> {
        Ok(Box::new(MockOutput::new(self.probe.clone(), events)))
    }
}
