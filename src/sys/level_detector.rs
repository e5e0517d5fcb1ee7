use std::rc::Rc;

use futures::stream::LocalBoxStream;

use crate::{config::MonitorConfig, proto::DetectorEvent};

use super::MediaStream;

/// External audio level detector.
pub trait LevelDetector {
    /// `false` if level detection isn't available in this environment.
    fn is_supported(&self) -> bool {
        true
    }

    /// Starts detecting on the audio of the provided stream.
    ///
    /// Returns `None` if detection couldn't be started.
    fn attach(
        &self,
        stream: Rc<dyn MediaStream>,
        config: &MonitorConfig,
    ) -> Option<Attachment>;
}

/// Running detection started by [`LevelDetector::attach`].
pub struct Attachment {
    pub events: LocalBoxStream<'static, DetectorEvent>,
    pub handle: Box<dyn DetectorHandle>,
}

pub trait DetectorHandle {
    fn stop(&self);

    /// Releases the processing group allocated for this detection.
    fn release(&self);
}

/// Microphone gain control.
pub trait GainControl {
    /// `level` is in `0.0..=1.0`.
    fn set_gain(&self, level: f64);
}
