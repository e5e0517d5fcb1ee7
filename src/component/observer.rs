//! Translation of track and stream lifecycle events into recheck signals.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use futures::{channel::mpsc, stream::LocalBoxStream, StreamExt as _};
use tokio::task::{spawn_local, JoinHandle};
use tracing::debug;

use crate::{
    proto::{StreamEvent, TrackEvent, TrackId},
    sys::{MediaStream, MediaTrack},
};

/// Reason to re-examine the stream.
#[derive(Clone)]
pub enum Signal {
    /// Set of live tracks may have changed.
    Recheck,
    /// Provided track was muted or unmuted.
    TrackMute(Rc<dyn MediaTrack>),
    TrackAdded(Rc<dyn MediaTrack>),
    TrackRemoved(TrackId),
    /// Whole stream was muted or unmuted.
    StreamMute(bool),
    StreamEnded,
}

/// Subscribes to the events of a stream and all of its tracks.
///
/// Never touches the state itself, it only emits [`Signal`]s.
pub struct TrackObserver {
    signals: mpsc::UnboundedSender<Signal>,
    track_tasks: RefCell<HashMap<TrackId, JoinHandle<()>>>,
    stream_task: RefCell<Option<JoinHandle<()>>>,
}

impl TrackObserver {
    pub fn new() -> (Self, LocalBoxStream<'static, Signal>) {
        let (tx, rx) = mpsc::unbounded();
        let this = Self {
            signals: tx,
            track_tasks: RefCell::default(),
            stream_task: RefCell::default(),
        };
        (this, Box::pin(rx))
    }

    /// Spawns listeners for `stream` and every track it currently holds.
    pub fn observe(&self, stream: &dyn MediaStream) {
        for track in stream.tracks() {
            self.watch(track);
        }

        let mut events = stream.on_event();
        let signals = self.signals.clone();
        let task = spawn_local(async move {
            while let Some(event) = events.next().await {
                let signal = match event {
                    StreamEvent::AddTrack(track) => Signal::TrackAdded(track),
                    StreamEvent::RemoveTrack(id) => Signal::TrackRemoved(id),
                    StreamEvent::Mute => Signal::StreamMute(true),
                    StreamEvent::Unmute => Signal::StreamMute(false),
                    StreamEvent::Ended | StreamEvent::Inactive => {
                        Signal::StreamEnded
                    }
                };
                if signals.unbounded_send(signal).is_err() {
                    break;
                }
            }
        });
        if let Some(old) = self.stream_task.borrow_mut().replace(task) {
            old.abort();
        }
    }

    /// Spawns a listener for the events of the provided track.
    pub fn watch(&self, track: Rc<dyn MediaTrack>) {
        let id = track.id();
        debug!(track = %id, kind = ?track.kind(), "watching track");

        let mut events = track.on_event();
        let signals = self.signals.clone();
        let task = spawn_local(async move {
            while let Some(event) = events.next().await {
                let signal = match event {
                    TrackEvent::Ended => Signal::Recheck,
                    TrackEvent::Mute | TrackEvent::Unmute => {
                        Signal::TrackMute(Rc::clone(&track))
                    }
                };
                if signals.unbounded_send(signal).is_err() {
                    break;
                }
            }
        });
        if let Some(old) = self.track_tasks.borrow_mut().insert(id, task) {
            old.abort();
        }
    }

    pub fn unwatch(&self, id: &str) {
        if let Some(task) = self.track_tasks.borrow_mut().remove(id) {
            task.abort();
        }
    }

    pub fn is_watching(&self, id: &str) -> bool {
        self.track_tasks.borrow().contains_key(id)
    }

    /// Stops all the spawned listeners.
    pub fn close(&self) {
        for (_, task) in self.track_tasks.borrow_mut().drain() {
            task.abort();
        }
        if let Some(task) = self.stream_task.borrow_mut().take() {
            task.abort();
        }
    }
}

impl Drop for TrackObserver {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt as _;
    use tokio::{task::LocalSet, time};

    use crate::{
        proto::MediaKind,
        sys::memory::{MemoryStream, MemoryTrack},
    };

    use super::*;

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    fn drain(signals: &mut LocalBoxStream<'static, Signal>) -> Vec<Signal> {
        let mut out = Vec::new();
        while let Some(Some(signal)) = signals.next().now_or_never() {
            out.push(signal);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn emits_signals_for_track_and_stream_events() {
        LocalSet::new()
            .run_until(async {
                let audio = MemoryTrack::new("a", MediaKind::Audio, "");
                let stream = MemoryStream::new("s", vec![audio.clone()]);
                let (observer, mut signals) = TrackObserver::new();
                observer.observe(stream.as_ref());
                settle().await;

                audio.set_muted(true);
                audio.end();
                settle().await;

                let got = drain(&mut signals);
                assert_eq!(got.len(), 2);
                assert!(
                    matches!(&got[0], Signal::TrackMute(t) if t.id() == "a")
                );
                assert!(matches!(got[1], Signal::Recheck));

                let video = MemoryTrack::new("v", MediaKind::Video, "");
                stream.add_track(video.clone());
                stream.remove_track("a");
                stream.end();
                settle().await;

                let got = drain(&mut signals);
                assert_eq!(got.len(), 3);
                assert!(
                    matches!(&got[0], Signal::TrackAdded(t) if t.id() == "v")
                );
                assert!(
                    matches!(&got[1], Signal::TrackRemoved(id) if id == "a")
                );
                assert!(matches!(got[2], Signal::StreamEnded));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn unwatched_tracks_are_silent() {
        LocalSet::new()
            .run_until(async {
                let audio = MemoryTrack::new("a", MediaKind::Audio, "");
                let stream = MemoryStream::new("s", vec![audio.clone()]);
                let (observer, mut signals) = TrackObserver::new();
                observer.observe(stream.as_ref());
                assert!(observer.is_watching("a"));

                observer.unwatch("a");
                assert!(!observer.is_watching("a"));
                settle().await;

                audio.end();
                settle().await;
                assert!(drain(&mut signals).is_empty());

                observer.close();
                stream.end();
                settle().await;
                assert!(drain(&mut signals).is_empty());
            })
            .await;
    }
}
