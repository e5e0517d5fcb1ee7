use std::rc::Rc;

use futures::stream::LocalBoxStream;

use crate::proto::StreamEvent;

use super::MediaTrack;

pub trait MediaStream {
    fn id(&self) -> String;

    fn audio_tracks(&self) -> Vec<Rc<dyn MediaTrack>>;

    fn video_tracks(&self) -> Vec<Rc<dyn MediaTrack>>;

    fn tracks(&self) -> Vec<Rc<dyn MediaTrack>> {
        let mut tracks = self.audio_tracks();
        tracks.extend(self.video_tracks());
        tracks
    }

    fn track_by_id(&self, id: &str) -> Option<Rc<dyn MediaTrack>> {
        self.tracks().into_iter().find(|track| track.id() == id)
    }

    /// Whether this stream is able to list its tracks.
    ///
    /// Streams which can't are handled as one opaque unit, see
    /// [`MediaStream::is_empty`] and [`MediaStream::is_muted`].
    fn enumerates_tracks(&self) -> bool {
        true
    }

    fn is_empty(&self) -> bool {
        self.tracks().is_empty()
    }

    fn is_muted(&self) -> bool {
        false
    }

    /// Subscribes to the stream-level events.
    fn on_event(&self) -> LocalBoxStream<'static, StreamEvent>;

    /// Creates a new stream holding only the provided tracks.
    fn with_tracks(
        &self,
        tracks: Vec<Rc<dyn MediaTrack>>,
    ) -> Rc<dyn MediaStream>;
}
