use futures::stream::LocalBoxStream;

use crate::proto::{MediaKind, ReadyState, TrackEvent, TrackId};

/// Single audio or video track of a [`MediaStream`].
///
/// [`MediaStream`]: super::MediaStream
pub trait MediaTrack {
    fn id(&self) -> TrackId;

    fn kind(&self) -> MediaKind;

    /// Device label of this track.
    fn label(&self) -> String;

    /// `None` if the underlying track doesn't expose its ready state.
    fn ready_state(&self) -> Option<ReadyState>;

    fn is_muted(&self) -> bool;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    fn stop(&self);

    /// Subscribes to the `ended`/`mute`/`unmute` events of this track.
    fn on_event(&self) -> LocalBoxStream<'static, TrackEvent>;
}

/// Returns `true` if the provided track hasn't ended yet.
///
/// Tracks which don't expose a ready state are assumed to be live.
pub fn is_live(track: &dyn MediaTrack) -> bool {
    track.ready_state() != Some(ReadyState::Ended)
}
