//! Reactive model of a single media stream.

use std::{cell::RefCell, rc::Rc};

use futures::{stream::LocalBoxStream, StreamExt as _};
use tokio::task::{spawn_local, JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    component::{
        capability, mute::MuteSources, ActivityMonitor, MuteEngine,
        ResolutionSelector, Signal, TrackObserver,
    },
    config::{MonitorConfig, StreamConfig},
    error::ConfigError,
    proto::{MediaKind, Origin},
    snapshot::StreamSnapshot,
    sys::{
        is_live, GainControl, LevelDetector, MediaStream, MediaTrack,
        PlaybackSurfaces,
    },
};

/// External collaborators of a [`StreamState`], all optional.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub detector: Option<Rc<dyn LevelDetector>>,
    pub gain: Option<Rc<dyn GainControl>>,
    pub surfaces: Option<Rc<dyn PlaybackSurfaces>>,
}

/// Mute, activity and simulcast state of a [`MediaStream`].
///
/// Every derived value lives in the [`StreamSnapshot`] returned by
/// [`StreamState::snapshot`]. Once the stream has ended every operation is a
/// silent no-op.
pub struct StreamState {
    media: Rc<dyn MediaStream>,
    snapshot: Rc<StreamSnapshot>,
    mute: MuteEngine,
    monitor: ActivityMonitor,
    selector: Rc<ResolutionSelector>,
    observer: TrackObserver,
    signals_task: RefCell<Option<JoinHandle<()>>>,
}

impl StreamState {
    /// Starts observing the provided stream.
    ///
    /// Must be called inside a [`LocalSet`].
    ///
    /// [`LocalSet`]: tokio::task::LocalSet
    pub fn new(
        media: Rc<dyn MediaStream>,
        config: StreamConfig,
        collaborators: Collaborators,
    ) -> Rc<Self> {
        let snapshot = Rc::new(StreamSnapshot::new(media.id(), config.origin));
        let names = capability::device_names(config.origin, media.as_ref());
        snapshot.update(&snapshot.camera_name, names.camera);
        snapshot.update(&snapshot.microphone_name, names.microphone);

        let capabilities = config.capabilities;
        let gain = if capabilities.supports_gain_adjustment {
            collaborators.gain
        } else {
            None
        };
        let (observer, signals) = TrackObserver::new();
        let this = Rc::new(Self {
            mute: MuteEngine::new(
                Rc::clone(&snapshot),
                capabilities.mute_model,
                config.remote_track_enabled,
            ),
            monitor: ActivityMonitor::new(
                Rc::clone(&snapshot),
                collaborators.detector,
                gain,
            ),
            selector: ResolutionSelector::new(Rc::clone(&snapshot)),
            media,
            snapshot,
            observer,
            signals_task: RefCell::default(),
        });

        this.observer.observe(this.media.as_ref());
        this.recheck();
        if capabilities.supports_simulcast {
            if let Some(surfaces) = &collaborators.surfaces {
                this.selector
                    .populate(surfaces.as_ref(), this.media.video_tracks());
            }
        }
        Rc::clone(&this).spawn_on_signal(signals);

        if let Some(monitoring) = config.audio_monitoring {
            if let Err(e) = this.start_volume_monitor(monitoring) {
                warn!(
                    stream = this.snapshot.id(),
                    "volume monitor not started: {}",
                    e,
                );
            }
        }

        info!(
            stream = this.snapshot.id(),
            origin = ?this.snapshot.origin(),
            "stream state created",
        );
        this
    }

    pub fn snapshot(&self) -> &Rc<StreamSnapshot> {
        &self.snapshot
    }

    pub fn id(&self) -> &str {
        self.snapshot.id()
    }

    pub fn origin(&self) -> Origin {
        self.snapshot.origin()
    }

    pub fn is_ended(&self) -> bool {
        self.snapshot.is_ended()
    }

    pub fn mute_sources(&self, kind: MediaKind) -> MuteSources {
        self.mute.sources(kind)
    }

    /// Unmutes audio. With `remote` set on a remote stream only the
    /// remote-signaled mute is lifted.
    pub fn play_audio(&self, remote: bool) {
        if !self.is_ended() {
            self.mute.play(MediaKind::Audio, remote, self.media.as_ref());
        }
    }

    pub fn mute_audio(&self, remote: bool) {
        if !self.is_ended() {
            self.mute.mute(MediaKind::Audio, remote, self.media.as_ref());
        }
    }

    pub fn toggle_audio(&self) {
        if !self.is_ended() {
            self.mute.toggle(MediaKind::Audio, self.media.as_ref());
        }
    }

    pub fn play_video(&self, remote: bool) {
        if !self.is_ended() {
            self.mute.play(MediaKind::Video, remote, self.media.as_ref());
        }
    }

    pub fn mute_video(&self, remote: bool) {
        if !self.is_ended() {
            self.mute.mute(MediaKind::Video, remote, self.media.as_ref());
        }
    }

    pub fn toggle_video(&self) {
        if !self.is_ended() {
            self.mute.toggle(MediaKind::Video, self.media.as_ref());
        }
    }

    /// Selects the simulcast alternate to render at `width`.
    ///
    /// Returns the active alternate index.
    pub fn fit(&self, width: u32) -> Option<usize> {
        if self.is_ended() {
            return self.snapshot.active_alternate.get();
        }
        self.selector.fit(width)
    }

    /// Attaches the level detector.
    ///
    /// Returns `Ok(false)` if monitoring isn't possible for this stream.
    pub fn start_volume_monitor(
        &self,
        config: MonitorConfig,
    ) -> Result<bool, ConfigError> {
        if self.is_ended() {
            return Ok(false);
        }
        self.monitor.start(Rc::clone(&self.media), config)
    }

    pub fn stop_volume_monitor(&self) {
        self.monitor.stop();
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_attached()
    }

    pub fn set_focused(&self, focused: bool) {
        self.snapshot.update(&self.snapshot.focused, focused);
    }

    pub fn set_screen(&self, screen: bool) {
        self.snapshot.update(&self.snapshot.screen, screen);
    }

    pub fn set_active_speaker(&self, active: bool) {
        self.snapshot.update(&self.snapshot.active_speaker, active);
    }

    /// Associates this stream with the provided peer, or releases it.
    pub fn set_peer(&self, peer: Option<String>) {
        self.snapshot.set_peer(peer);
    }

    /// Looks up a track of the stream.
    ///
    /// `None` means the track is gone and should be treated as ended.
    pub fn get_track(&self, id: &str) -> Option<Rc<dyn MediaTrack>> {
        self.media.track_by_id(id)
    }

    /// Stream holding the video track of the active simulcast alternate and
    /// all the audio tracks.
    ///
    /// Falls back to the whole stream if nothing is selected or the selected
    /// track is gone.
    pub fn stream_for_selected_video_track(&self) -> Rc<dyn MediaStream> {
        let selected = self
            .selector
            .selected_track()
            .and_then(|track| self.get_track(&track.id()))
            .filter(|track| is_live(track.as_ref()));
        match selected {
            Some(video) => {
                let mut tracks = vec![video];
                tracks.extend(self.media.audio_tracks());
                self.media.with_tracks(tracks)
            }
            None => Rc::clone(&self.media),
        }
    }

    /// Ends this stream: detaches the activity monitor, releases playback
    /// surfaces and stops every live track.
    ///
    /// Repeated calls are no-ops.
    pub fn stop(&self) {
        if self.is_ended() {
            return;
        }
        info!(stream = self.snapshot.id(), "stopping stream");

        self.monitor.stop();
        self.selector.release();
        for track in self.media.tracks() {
            if is_live(track.as_ref()) {
                track.stop();
            }
        }
        self.observer.close();
        self.snapshot.mark_ended();
    }

    /// Spawns the listener of the [`TrackObserver`] signals.
    fn spawn_on_signal(
        self: Rc<Self>,
        mut signals: LocalBoxStream<'static, Signal>,
    ) {
        let this = Rc::downgrade(&self);
        let task = spawn_local(async move {
            while let Some(signal) = signals.next().await {
                match this.upgrade() {
                    Some(this) => this.handle(signal),
                    None => break,
                }
            }
        });
        *self.signals_task.borrow_mut() = Some(task);
    }

    fn handle(&self, signal: Signal) {
        if self.is_ended() {
            return;
        }
        match signal {
            Signal::Recheck => self.recheck(),
            Signal::TrackAdded(track) => {
                self.observer.watch(track);
                self.recheck();
            }
            Signal::TrackRemoved(id) => {
                self.observer.unwatch(&id);
                self.selector.remove_track(&id);
                self.recheck();
            }
            Signal::TrackMute(track) => {
                self.mute.on_track_mute(track.as_ref(), self.media.as_ref());
            }
            Signal::StreamMute(muted) => self.mute.on_stream_mute(muted),
            Signal::StreamEnded => self.stop(),
        }
    }

    /// Recomputes everything derived from the current tracks.
    fn recheck(&self) {
        self.snapshot.pulse_recheck();
        let presence = capability::presence(self.media.as_ref());
        debug!(
            stream = self.snapshot.id(),
            has_audio = presence.has_audio,
            has_video = presence.has_video,
            "tracks rechecked",
        );
        self.snapshot
            .set_presence(presence.has_audio, presence.has_video);
        self.mute.on_tracks_changed(self.media.as_ref());
        self.mute.publish();
    }
}

impl Drop for StreamState {
    fn drop(&mut self) {
        if let Some(task) = self.signals_task.get_mut().take() {
            task.abort();
        }
    }
}
