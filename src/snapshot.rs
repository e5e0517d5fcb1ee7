//! Observable state of a single media stream.

use std::cell::RefCell;

use futures::{
    channel::mpsc,
    future::{self, LocalBoxFuture},
    stream::LocalBoxStream,
    FutureExt as _,
};
use medea_reactive::ObservableCell;

use crate::proto::{Origin, Resolution};

/// Volume reported while no activity monitor is attached.
pub const UNKNOWN_VOLUME: f64 = -1000.0;

/// Names of the [`StreamSnapshot`] fields which can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    /// Synthetic field pulsed whenever the tracks of the stream should be
    /// re-examined.
    Recheck,
    HasAudio,
    HasVideo,
    IsAudioOnly,
    IsVideo,
    CameraName,
    MicrophoneName,
    AudioMuted,
    VideoMuted,
    RemoteAudioMuted,
    RemoteVideoMuted,
    Speaking,
    Volume,
    ResolutionAlternates,
    ActiveAlternate,
    SelectedVideoTrackId,
    Focused,
    Screen,
    ActiveSpeaker,
    Peer,
    IsClaimed,
    Ended,
}

/// New value of a changed field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Pulse,
    Bool(bool),
    Number(f64),
    Text(String),
    MaybeText(Option<String>),
    Index(Option<usize>),
    Alternates(Vec<Resolution>),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(v: Option<String>) -> Self {
        Self::MaybeText(v)
    }
}

impl From<Option<usize>> for FieldValue {
    fn from(v: Option<usize>) -> Self {
        Self::Index(v)
    }
}

impl From<Vec<Resolution>> for FieldValue {
    fn from(v: Vec<Resolution>) -> Self {
        Self::Alternates(v)
    }
}

/// Named observable value.
pub struct Field<T> {
    name: FieldName,
    cell: ObservableCell<T>,
}

impl<T> Field<T>
where
    T: Clone + PartialEq + 'static,
{
    fn new(name: FieldName, value: T) -> Self {
        Self {
            name,
            cell: ObservableCell::new(value),
        }
    }

    pub fn name(&self) -> FieldName {
        self.name
    }

    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Stream of this field's values, starting with the current one.
    pub fn subscribe(&self) -> LocalBoxStream<'static, T> {
        self.cell.subscribe()
    }

    /// Resolves once this field equals `value`, or with `false` if the field
    /// is dropped before that.
    pub fn when_eq(&self, value: T) -> LocalBoxFuture<'static, bool> {
        self.cell.when_eq(value).map(|res| res.is_ok()).boxed_local()
    }
}

pub struct StreamSnapshot {
    id: String,
    origin: Origin,
    recheck: Field<u64>,
    pub has_audio: Field<bool>,
    pub has_video: Field<bool>,
    pub is_audio_only: Field<bool>,
    pub is_video: Field<bool>,
    pub camera_name: Field<String>,
    pub microphone_name: Field<String>,
    pub audio_muted: Field<bool>,
    pub video_muted: Field<bool>,
    pub remote_audio_muted: Field<bool>,
    pub remote_video_muted: Field<bool>,
    pub speaking: Field<bool>,
    pub volume: Field<f64>,
    pub resolution_alternates: Field<Vec<Resolution>>,
    pub active_alternate: Field<Option<usize>>,
    pub selected_video_track_id: Field<Option<String>>,
    pub focused: Field<bool>,
    pub screen: Field<bool>,
    pub active_speaker: Field<bool>,
    pub peer: Field<Option<String>>,
    pub is_claimed: Field<bool>,
    pub ended: Field<bool>,
    subscribers: RefCell<Vec<(FieldName, mpsc::UnboundedSender<FieldValue>)>>,
}

impl StreamSnapshot {
    pub fn new(id: String, origin: Origin) -> Self {
        use FieldName as F;

        Self {
            id,
            origin,
            recheck: Field::new(F::Recheck, 0),
            has_audio: Field::new(F::HasAudio, false),
            has_video: Field::new(F::HasVideo, false),
            is_audio_only: Field::new(F::IsAudioOnly, false),
            is_video: Field::new(F::IsVideo, false),
            camera_name: Field::new(F::CameraName, String::new()),
            microphone_name: Field::new(F::MicrophoneName, String::new()),
            audio_muted: Field::new(F::AudioMuted, false),
            video_muted: Field::new(F::VideoMuted, false),
            remote_audio_muted: Field::new(F::RemoteAudioMuted, false),
            remote_video_muted: Field::new(F::RemoteVideoMuted, false),
            speaking: Field::new(F::Speaking, false),
            volume: Field::new(F::Volume, UNKNOWN_VOLUME),
            resolution_alternates: Field::new(
                F::ResolutionAlternates,
                Vec::new(),
            ),
            active_alternate: Field::new(F::ActiveAlternate, None),
            selected_video_track_id: Field::new(F::SelectedVideoTrackId, None),
            focused: Field::new(F::Focused, false),
            screen: Field::new(F::Screen, false),
            active_speaker: Field::new(F::ActiveSpeaker, false),
            peer: Field::new(F::Peer, None),
            is_claimed: Field::new(F::IsClaimed, false),
            ended: Field::new(F::Ended, false),
            subscribers: RefCell::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }

    pub fn is_remote(&self) -> bool {
        self.origin == Origin::Remote
    }

    pub fn is_ended(&self) -> bool {
        self.ended.get()
    }

    /// Subscribes to the changes of the provided field.
    ///
    /// Only real changes are emitted, the current value is not.
    pub fn on_change(
        &self,
        name: FieldName,
    ) -> LocalBoxStream<'static, FieldValue> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.borrow_mut().push((name, tx));
        Box::pin(rx)
    }

    /// Resolves once this stream has ended.
    pub fn when_ended(&self) -> LocalBoxFuture<'static, ()> {
        if self.is_ended() {
            return future::ready(()).boxed_local();
        }
        self.ended.when_eq(true).map(drop).boxed_local()
    }

    /// Sets the provided field, notifying subscribers if its value changed.
    ///
    /// No-op once the stream has ended.
    pub(crate) fn update<T>(&self, field: &Field<T>, value: T)
    where
        T: Clone + PartialEq + Into<FieldValue> + 'static,
    {
        if self.is_ended() {
            return;
        }
        self.replace(field, value);
    }

    pub(crate) fn pulse_recheck(&self) {
        if self.is_ended() {
            return;
        }
        self.recheck.cell.set(self.recheck.get().wrapping_add(1));
        self.notify(FieldName::Recheck, FieldValue::Pulse);
    }

    pub(crate) fn set_presence(&self, has_audio: bool, has_video: bool) {
        self.update(&self.has_audio, has_audio);
        self.update(&self.has_video, has_video);
        self.update(&self.is_audio_only, has_audio && !has_video);
        self.update(&self.is_video, has_video);
    }

    pub(crate) fn set_peer(&self, peer: Option<String>) {
        let is_claimed = peer.is_some();
        self.update(&self.peer, peer);
        self.update(&self.is_claimed, is_claimed);
    }

    pub(crate) fn mark_ended(&self) {
        self.replace(&self.ended, true);
    }

    fn replace<T>(&self, field: &Field<T>, value: T)
    where
        T: Clone + PartialEq + Into<FieldValue> + 'static,
    {
        if field.get() == value {
            return;
        }
        field.cell.set(value.clone());
        self.notify(field.name, value.into());
    }

    fn notify(&self, name: FieldName, value: FieldValue) {
        self.subscribers.borrow_mut().retain(|(field, tx)| {
            *field != name || tx.unbounded_send(value.clone()).is_ok()
        });
    }
}
