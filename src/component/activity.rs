//! Speaking and volume state driven by an external level detector.

use std::{cell::RefCell, rc::Rc};

use futures::StreamExt as _;
use tokio::{
    task::{spawn_local, JoinHandle},
    time,
};
use tracing::{debug, info, trace};

use crate::{
    config::MonitorConfig,
    error::ConfigError,
    proto::DetectorEvent,
    snapshot::{StreamSnapshot, UNKNOWN_VOLUME},
    sys::{DetectorHandle, GainControl, LevelDetector, MediaStream},
};

pub struct ActivityMonitor {
    snapshot: Rc<StreamSnapshot>,
    detector: Option<Rc<dyn LevelDetector>>,
    gain: Option<Rc<dyn GainControl>>,
    attached: RefCell<Option<Attached>>,
}

struct Attached {
    handle: Box<dyn DetectorHandle>,
    events: JoinHandle<()>,
    speech: Rc<Speech>,
}

impl ActivityMonitor {
    /// `gain` is only used if gain adjustment is supported for the stream.
    pub fn new(
        snapshot: Rc<StreamSnapshot>,
        detector: Option<Rc<dyn LevelDetector>>,
        gain: Option<Rc<dyn GainControl>>,
    ) -> Self {
        Self {
            snapshot,
            detector,
            gain,
            attached: RefCell::default(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.borrow().is_some()
    }

    /// Attaches the level detector to the audio of `stream`, replacing any
    /// previous attachment.
    ///
    /// Returns `false` if nothing was attached: level detection isn't
    /// available, the stream has no audio, or it's a remote stream and
    /// remote monitoring is disabled.
    pub fn start(
        &self,
        stream: Rc<dyn MediaStream>,
        config: MonitorConfig,
    ) -> Result<bool, ConfigError> {
        config.validate()?;
        self.stop();

        let detector = match &self.detector {
            Some(detector) if detector.is_supported() => detector,
            _ => return Ok(false),
        };
        if !self.snapshot.has_audio.get()
            || (self.snapshot.is_remote() && !config.monitor_remote)
        {
            return Ok(false);
        }
        let attachment = match detector.attach(stream, &config) {
            Some(attachment) => attachment,
            None => return Ok(false),
        };

        let gain = if config.adjust_mic {
            self.gain.clone()
        } else {
            None
        };
        let speech = Rc::new(Speech {
            snapshot: Rc::clone(&self.snapshot),
            gain,
            config,
            release: RefCell::default(),
        });

        let mut events = attachment.events;
        let events = spawn_local({
            let speech = Rc::clone(&speech);
            async move {
                while let Some(event) = events.next().await {
                    speech.handle(event);
                }
            }
        });

        info!(stream = self.snapshot.id(), "volume monitor attached");
        *self.attached.borrow_mut() = Some(Attached {
            handle: attachment.handle,
            events,
            speech,
        });
        Ok(true)
    }

    /// Detaches the level detector and resets `speaking` and `volume`.
    ///
    /// Repeated calls are no-ops.
    pub fn stop(&self) {
        if let Some(attached) = self.attached.borrow_mut().take() {
            attached.events.abort();
            attached.speech.cancel_release();
            attached.handle.stop();
            attached.handle.release();
            info!(stream = self.snapshot.id(), "volume monitor detached");
        }
        self.snapshot.update(&self.snapshot.speaking, false);
        self.snapshot.update(&self.snapshot.volume, UNKNOWN_VOLUME);
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        if let Some(attached) = self.attached.get_mut().take() {
            attached.events.abort();
            attached.speech.cancel_release();
            attached.handle.stop();
            attached.handle.release();
        }
    }
}

/// Debounced speaking state of a single attachment.
struct Speech {
    snapshot: Rc<StreamSnapshot>,
    gain: Option<Rc<dyn GainControl>>,
    config: MonitorConfig,
    release: RefCell<Option<JoinHandle<()>>>,
}

impl Speech {
    fn handle(self: &Rc<Self>, event: DetectorEvent) {
        match event {
            DetectorEvent::Speaking if self.config.detect_speaking => {
                self.cancel_release();
                if !self.snapshot.speaking.get() {
                    debug!(stream = self.snapshot.id(), "started speaking");
                }
                self.snapshot.update(&self.snapshot.speaking, true);
                if let Some(gain) = &self.gain {
                    if !self.snapshot.audio_muted.get() {
                        gain.set_gain(1.0);
                    }
                }
            }
            DetectorEvent::StoppedSpeaking if self.config.detect_speaking => {
                self.cancel_release();
                let hold = self.config.speaking_hold();
                let this = Rc::clone(self);
                let task = spawn_local(async move {
                    time::sleep(hold).await;
                    drop(this.release.borrow_mut().take());
                    this.stopped();
                });
                *self.release.borrow_mut() = Some(task);
            }
            DetectorEvent::Speaking | DetectorEvent::StoppedSpeaking => (),
            DetectorEvent::VolumeChange(volume) => {
                trace!(stream = self.snapshot.id(), volume, "volume change");
                self.snapshot.update(&self.snapshot.volume, volume);
            }
        }
    }

    fn stopped(&self) {
        debug!(stream = self.snapshot.id(), "stopped speaking");
        self.snapshot.update(&self.snapshot.speaking, false);
        if let Some(gain) = &self.gain {
            gain.set_gain(self.config.quiet_gain);
        }
    }

    fn cancel_release(&self) {
        if let Some(task) = self.release.borrow_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::task::LocalSet;

    use crate::{
        proto::{MediaKind, Origin},
        sys::memory::{MemoryDetector, MemoryGain, MemoryStream, MemoryTrack},
    };

    use super::*;

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    struct Setup {
        snapshot: Rc<StreamSnapshot>,
        detector: Rc<MemoryDetector>,
        gain: Rc<MemoryGain>,
        monitor: ActivityMonitor,
        stream: Rc<MemoryStream>,
    }

    fn setup(origin: Origin) -> Setup {
        let snapshot = Rc::new(StreamSnapshot::new("s".to_owned(), origin));
        snapshot.set_presence(true, false);
        let detector = MemoryDetector::new();
        let gain = MemoryGain::new();
        let monitor = ActivityMonitor::new(
            Rc::clone(&snapshot),
            Some(detector.clone()),
            Some(gain.clone()),
        );
        let stream = MemoryStream::new(
            "s",
            vec![MemoryTrack::new("a", MediaKind::Audio, "Mic")],
        );
        Setup {
            snapshot,
            detector,
            gain,
            monitor,
            stream,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn debounces_stopped_speaking() {
        LocalSet::new()
            .run_until(async {
                let s = setup(Origin::Local);
                let config = MonitorConfig {
                    adjust_mic: true,
                    ..MonitorConfig::default()
                };
                assert!(s.monitor.start(s.stream.clone(), config).unwrap());

                s.detector.emit(DetectorEvent::Speaking);
                settle().await;
                assert!(s.snapshot.speaking.get());
                assert_eq!(s.gain.levels(), vec![1.0]);

                s.detector.emit(DetectorEvent::StoppedSpeaking);
                time::sleep(Duration::from_millis(500)).await;
                assert!(s.snapshot.speaking.get());

                s.detector.emit(DetectorEvent::Speaking);
                settle().await;
                time::sleep(Duration::from_millis(800)).await;
                assert!(s.snapshot.speaking.get());

                s.detector.emit(DetectorEvent::StoppedSpeaking);
                time::sleep(Duration::from_millis(1100)).await;
                assert!(!s.snapshot.speaking.get());
                assert_eq!(s.gain.levels(), vec![1.0, 1.0, 0.5]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_gain_while_audio_muted() {
        LocalSet::new()
            .run_until(async {
                let s = setup(Origin::Local);
                let config = MonitorConfig {
                    adjust_mic: true,
                    ..MonitorConfig::default()
                };
                s.monitor.start(s.stream.clone(), config).unwrap();
                s.snapshot.update(&s.snapshot.audio_muted, true);

                s.detector.emit(DetectorEvent::Speaking);
                settle().await;
                assert!(s.snapshot.speaking.get());
                assert!(s.gain.levels().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn volume_only_without_speaking_detection() {
        LocalSet::new()
            .run_until(async {
                let s = setup(Origin::Local);
                let config = MonitorConfig {
                    detect_speaking: false,
                    ..MonitorConfig::default()
                };
                s.monitor.start(s.stream.clone(), config).unwrap();

                s.detector.emit(DetectorEvent::Speaking);
                s.detector.emit(DetectorEvent::VolumeChange(-42.5));
                settle().await;
                assert!(!s.snapshot.speaking.get());
                assert_eq!(s.snapshot.volume.get(), -42.5);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_release_and_is_idempotent() {
        LocalSet::new()
            .run_until(async {
                let s = setup(Origin::Local);
                let config = MonitorConfig {
                    adjust_mic: true,
                    ..MonitorConfig::default()
                };
                s.monitor.start(s.stream.clone(), config).unwrap();
                s.detector.emit(DetectorEvent::Speaking);
                s.detector.emit(DetectorEvent::VolumeChange(-20.0));
                s.detector.emit(DetectorEvent::StoppedSpeaking);
                settle().await;

                s.monitor.stop();
                assert!(!s.monitor.is_attached());
                assert!(!s.snapshot.speaking.get());
                assert_eq!(s.snapshot.volume.get(), UNKNOWN_VOLUME);

                s.monitor.stop();
                assert_eq!(s.detector.stopped(), 1);
                assert_eq!(s.detector.released(), 1);
                assert!(!s.snapshot.speaking.get());
                assert_eq!(s.snapshot.volume.get(), UNKNOWN_VOLUME);

                time::sleep(Duration::from_secs(2)).await;
                assert_eq!(s.gain.levels(), vec![1.0]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn skips_remote_streams_unless_configured() {
        LocalSet::new()
            .run_until(async {
                let s = setup(Origin::Remote);
                let attached = s
                    .monitor
                    .start(s.stream.clone(), MonitorConfig::default())
                    .unwrap();
                assert!(!attached);
                assert_eq!(s.detector.attached(), 0);

                let config = MonitorConfig {
                    monitor_remote: true,
                    ..MonitorConfig::default()
                };
                assert!(s.monitor.start(s.stream.clone(), config).unwrap());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_without_detection_support_or_audio() {
        LocalSet::new()
            .run_until(async {
                let snapshot =
                    Rc::new(StreamSnapshot::new("s".to_owned(), Origin::Local));
                snapshot.set_presence(true, false);
                let monitor = ActivityMonitor::new(
                    Rc::clone(&snapshot),
                    Some(MemoryDetector::unsupported()),
                    None,
                );
                let stream = MemoryStream::new("s", Vec::new());
                assert!(!monitor
                    .start(stream.clone(), MonitorConfig::default())
                    .unwrap());

                let s = setup(Origin::Local);
                s.snapshot.set_presence(false, true);
                assert!(!s
                    .monitor
                    .start(s.stream.clone(), MonitorConfig::default())
                    .unwrap());
            })
            .await;
    }
}
