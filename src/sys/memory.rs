//! In-memory collaborators.
//!
//! Used by the demo binary and the tests in place of real capture devices,
//! level detectors and playback elements.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use futures::{
    channel::{mpsc, oneshot},
    future::{self, LocalBoxFuture},
    stream::LocalBoxStream,
    FutureExt as _,
};

use crate::{
    config::MonitorConfig,
    proto::{
        DetectorEvent, MediaKind, ReadyState, StreamEvent, TrackEvent, TrackId,
    },
};

use super::{
    Attachment, DetectorHandle, GainControl, LevelDetector, MediaStream,
    MediaTrack, PlaybackSurface, PlaybackSurfaces,
};

struct Subscribers<T>(RefCell<Vec<mpsc::UnboundedSender<T>>>);

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self(RefCell::new(Vec::new()))
    }
}

impl<T: Clone + 'static> Subscribers<T> {
    fn subscribe(&self) -> LocalBoxStream<'static, T> {
        let (tx, rx) = mpsc::unbounded();
        self.0.borrow_mut().push(tx);
        Box::pin(rx)
    }

    fn emit(&self, value: T) {
        self.0
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(value.clone()).is_ok());
    }
}

pub struct MemoryTrack {
    id: TrackId,
    kind: MediaKind,
    label: String,
    reports_ready_state: bool,
    ready_state: Cell<ReadyState>,
    muted: Cell<bool>,
    enabled: Cell<bool>,
    stop_calls: Cell<usize>,
    subscribers: Subscribers<TrackEvent>,
}

impl MemoryTrack {
    pub fn new(
        id: impl Into<TrackId>,
        kind: MediaKind,
        label: impl Into<String>,
    ) -> Rc<Self> {
        Self::build(id.into(), kind, label.into(), true)
    }

    /// Creates a track which doesn't expose its ready state.
    pub fn without_ready_state(
        id: impl Into<TrackId>,
        kind: MediaKind,
        label: impl Into<String>,
    ) -> Rc<Self> {
        Self::build(id.into(), kind, label.into(), false)
    }

    fn build(
        id: TrackId,
        kind: MediaKind,
        label: String,
        reports_ready_state: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            id,
            kind,
            label,
            reports_ready_state,
            ready_state: Cell::new(ReadyState::Live),
            muted: Cell::new(false),
            enabled: Cell::new(true),
            stop_calls: Cell::new(0),
            subscribers: Subscribers::default(),
        })
    }

    /// Ends this track from the outside, like an unplugged device would.
    pub fn end(&self) {
        self.ready_state.set(ReadyState::Ended);
        self.subscribers.emit(TrackEvent::Ended);
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
        self.subscribers.emit(if muted {
            TrackEvent::Mute
        } else {
            TrackEvent::Unmute
        });
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.get()
    }
}

impl MediaTrack for MemoryTrack {
    fn id(&self) -> TrackId {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn ready_state(&self) -> Option<ReadyState> {
        self.reports_ready_state.then(|| self.ready_state.get())
    }

    fn is_muted(&self) -> bool {
        self.muted.get()
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    fn stop(&self) {
        self.stop_calls.set(self.stop_calls.get() + 1);
        self.ready_state.set(ReadyState::Ended);
    }

    fn on_event(&self) -> LocalBoxStream<'static, TrackEvent> {
        self.subscribers.subscribe()
    }
}

pub struct MemoryStream {
    id: String,
    tracks: RefCell<Vec<Rc<dyn MediaTrack>>>,
    enumerates_tracks: bool,
    muted: Cell<bool>,
    subscribers: Subscribers<StreamEvent>,
}

impl MemoryStream {
    pub fn new(
        id: impl Into<String>,
        tracks: Vec<Rc<MemoryTrack>>,
    ) -> Rc<Self> {
        Self::from_tracks(id.into(), erase(tracks), true)
    }

    /// Creates a stream which can't enumerate its tracks.
    pub fn opaque(
        id: impl Into<String>,
        tracks: Vec<Rc<MemoryTrack>>,
    ) -> Rc<Self> {
        Self::from_tracks(id.into(), erase(tracks), false)
    }

    fn from_tracks(
        id: String,
        tracks: Vec<Rc<dyn MediaTrack>>,
        enumerates_tracks: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            id,
            tracks: RefCell::new(tracks),
            enumerates_tracks,
            muted: Cell::new(false),
            subscribers: Subscribers::default(),
        })
    }

    pub fn add_track(&self, track: Rc<dyn MediaTrack>) {
        self.tracks.borrow_mut().push(Rc::clone(&track));
        self.subscribers.emit(StreamEvent::AddTrack(track));
    }

    pub fn remove_track(&self, id: &str) {
        self.tracks.borrow_mut().retain(|track| track.id() != id);
        self.subscribers.emit(StreamEvent::RemoveTrack(id.to_owned()));
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
        self.subscribers.emit(if muted {
            StreamEvent::Mute
        } else {
            StreamEvent::Unmute
        });
    }

    pub fn end(&self) {
        self.subscribers.emit(StreamEvent::Ended);
    }

    fn of_kind(&self, kind: MediaKind) -> Vec<Rc<dyn MediaTrack>> {
        if !self.enumerates_tracks {
            return Vec::new();
        }
        self.tracks
            .borrow()
            .iter()
            .filter(|track| track.kind() == kind)
            .cloned()
            .collect()
    }
}

fn erase(tracks: Vec<Rc<MemoryTrack>>) -> Vec<Rc<dyn MediaTrack>> {
    tracks
        .into_iter()
        .map(|track| track as Rc<dyn MediaTrack>)
        .collect()
}

impl MediaStream for MemoryStream {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn audio_tracks(&self) -> Vec<Rc<dyn MediaTrack>> {
        self.of_kind(MediaKind::Audio)
    }

    fn video_tracks(&self) -> Vec<Rc<dyn MediaTrack>> {
        self.of_kind(MediaKind::Video)
    }

    fn enumerates_tracks(&self) -> bool {
        self.enumerates_tracks
    }

    fn is_empty(&self) -> bool {
        self.tracks.borrow().is_empty()
    }

    fn is_muted(&self) -> bool {
        self.muted.get()
    }

    fn on_event(&self) -> LocalBoxStream<'static, StreamEvent> {
        self.subscribers.subscribe()
    }

    fn with_tracks(
        &self,
        tracks: Vec<Rc<dyn MediaTrack>>,
    ) -> Rc<dyn MediaStream> {
        let id = format!("{}-{}", self.id, tracks.len());
        Self::from_tracks(id, tracks, true)
    }
}

pub struct MemoryDetector {
    supported: bool,
    subscribers: Subscribers<DetectorEvent>,
    attached: Cell<usize>,
    stopped: Rc<Cell<usize>>,
    released: Rc<Cell<usize>>,
}

impl MemoryDetector {
    pub fn new() -> Rc<Self> {
        Self::with_support(true)
    }

    /// Creates a detector for an environment without level detection.
    pub fn unsupported() -> Rc<Self> {
        Self::with_support(false)
    }

    fn with_support(supported: bool) -> Rc<Self> {
        Rc::new(Self {
            supported,
            subscribers: Subscribers::default(),
            attached: Cell::new(0),
            stopped: Rc::default(),
            released: Rc::default(),
        })
    }

    pub fn emit(&self, event: DetectorEvent) {
        self.subscribers.emit(event);
    }

    pub fn attached(&self) -> usize {
        self.attached.get()
    }

    pub fn stopped(&self) -> usize {
        self.stopped.get()
    }

    pub fn released(&self) -> usize {
        self.released.get()
    }
}

impl LevelDetector for MemoryDetector {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn attach(
        &self,
        _: Rc<dyn MediaStream>,
        _: &MonitorConfig,
    ) -> Option<Attachment> {
        if !self.supported {
            return None;
        }
        self.attached.set(self.attached.get() + 1);
        Some(Attachment {
            events: self.subscribers.subscribe(),
            handle: Box::new(MemoryDetectorHandle {
                stopped: Rc::clone(&self.stopped),
                released: Rc::clone(&self.released),
            }),
        })
    }
}

struct MemoryDetectorHandle {
    stopped: Rc<Cell<usize>>,
    released: Rc<Cell<usize>>,
}

impl DetectorHandle for MemoryDetectorHandle {
    fn stop(&self) {
        self.stopped.set(self.stopped.get() + 1);
    }

    fn release(&self) {
        self.released.set(self.released.get() + 1);
    }
}

/// Records every requested gain level.
#[derive(Default)]
pub struct MemoryGain {
    levels: RefCell<Vec<f64>>,
}

impl MemoryGain {
    pub fn new() -> Rc<Self> {
        Rc::default()
    }

    pub fn levels(&self) -> Vec<f64> {
        self.levels.borrow().clone()
    }
}

impl GainControl for MemoryGain {
    fn set_gain(&self, level: f64) {
        self.levels.borrow_mut().push(level);
    }
}

#[derive(Default)]
pub struct MemorySurfaces {
    surfaces: RefCell<Vec<Rc<MemorySurface>>>,
}

impl MemorySurfaces {
    pub fn new() -> Rc<Self> {
        Rc::default()
    }

    /// Returns the surface created for the provided track.
    pub fn surface(&self, track_id: &str) -> Option<Rc<MemorySurface>> {
        self.surfaces
            .borrow()
            .iter()
            .find(|surface| surface.track_id == track_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.surfaces.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.borrow().is_empty()
    }
}

impl PlaybackSurfaces for MemorySurfaces {
    fn attach(&self, track: Rc<dyn MediaTrack>) -> Rc<dyn PlaybackSurface> {
        let (tx, rx) = oneshot::channel();
        let surface = Rc::new(MemorySurface {
            track_id: track.id(),
            url: format!("memory://surface/{}", self.len()),
            on_metadata: RefCell::new(Some(tx)),
            metadata: RefCell::new(Some(rx)),
            released: Cell::new(0),
        });
        self.surfaces.borrow_mut().push(Rc::clone(&surface));
        surface
    }
}

pub struct MemorySurface {
    track_id: TrackId,
    url: String,
    on_metadata: RefCell<Option<oneshot::Sender<(u32, u32)>>>,
    metadata: RefCell<Option<oneshot::Receiver<(u32, u32)>>>,
    released: Cell<usize>,
}

impl MemorySurface {
    /// Reports the natural dimensions of the rendered video.
    pub fn load(&self, width: u32, height: u32) {
        if let Some(tx) = self.on_metadata.borrow_mut().take() {
            let _ = tx.send((width, height));
        }
    }

    pub fn released(&self) -> usize {
        self.released.get()
    }
}

impl PlaybackSurface for MemorySurface {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn loaded_metadata(&self) -> LocalBoxFuture<'static, Option<(u32, u32)>> {
        match self.metadata.borrow_mut().take() {
            Some(rx) => rx.map(Result::ok).boxed_local(),
            None => future::ready(None).boxed_local(),
        }
    }

    fn release(&self) {
        self.released.set(self.released.get() + 1);
        self.on_metadata.borrow_mut().take();
    }
}
