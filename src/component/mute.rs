//! Reconciliation of the user, hardware and remote mute sources.

use std::{cell::Cell, rc::Rc};

use tracing::debug;

use crate::{
    config::{MuteModel, RemoteTrackEnabled},
    proto::{MediaKind, Origin},
    snapshot::StreamSnapshot,
    sys::{is_live, MediaStream, MediaTrack},
};

/// Independent mute sources of a single medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MuteSources {
    /// Set by the local user.
    pub local: bool,
    /// Set by the tracks themselves.
    pub hard: bool,
    /// Signaled by the remote side.
    pub remote: bool,
}

/// Combines the provided sources into the effective muted flag.
pub fn resolve(model: MuteModel, origin: Origin, sources: MuteSources) -> bool {
    match model {
        MuteModel::LocalDominant => {
            sources.local
                || match origin {
                    Origin::Local => sources.hard,
                    Origin::Remote => sources.remote,
                }
        }
        MuteModel::SimpleOr => sources.local || sources.hard || sources.remote,
    }
}

/// Video is hard muted once every live video track is, and there is at
/// least one.
fn video_hard_mute(stream: &dyn MediaStream) -> bool {
    let live: Vec<_> = stream
        .video_tracks()
        .into_iter()
        .filter(|track| is_live(track.as_ref()))
        .collect();
    !live.is_empty() && live.iter().all(|track| track.is_muted())
}

fn has_live(tracks: &[Rc<dyn MediaTrack>]) -> bool {
    tracks.iter().any(|track| is_live(track.as_ref()))
}

pub struct MuteEngine {
    snapshot: Rc<StreamSnapshot>,
    model: MuteModel,
    remote_track_enabled: RemoteTrackEnabled,
    audio: Cell<MuteSources>,
    video: Cell<MuteSources>,
}

impl MuteEngine {
    pub fn new(
        snapshot: Rc<StreamSnapshot>,
        model: MuteModel,
        remote_track_enabled: RemoteTrackEnabled,
    ) -> Self {
        Self {
            snapshot,
            model,
            remote_track_enabled,
            audio: Cell::default(),
            video: Cell::default(),
        }
    }

    pub fn sources(&self, kind: MediaKind) -> MuteSources {
        self.cell(kind).get()
    }

    pub fn play(
        &self,
        kind: MediaKind,
        remote: bool,
        stream: &dyn MediaStream,
    ) {
        self.set_muted(kind, false, remote, stream);
    }

    pub fn mute(
        &self,
        kind: MediaKind,
        remote: bool,
        stream: &dyn MediaStream,
    ) {
        self.set_muted(kind, true, remote, stream);
    }

    /// Inverts the local user mute of the provided medium.
    pub fn toggle(&self, kind: MediaKind, stream: &dyn MediaStream) {
        if self.sources(kind).local {
            self.play(kind, false, stream);
        } else {
            self.mute(kind, false, stream);
        }
    }

    /// Recomputes the hardware mute after `track` fired `mute`/`unmute`.
    ///
    /// Audio follows the firing track, video is muted only when every live
    /// video track is.
    pub fn on_track_mute(
        &self,
        track: &dyn MediaTrack,
        stream: &dyn MediaStream,
    ) {
        let kind = track.kind();
        let hard = match kind {
            MediaKind::Audio => track.is_muted(),
            MediaKind::Video => video_hard_mute(stream),
        };
        self.modify(kind, |sources| sources.hard = hard);
        self.publish();
    }

    /// Re-derives the hardware mute after the set of tracks changed.
    ///
    /// Video is recomputed over the live video tracks. Audio keeps following
    /// the last firing track and is only cleared once no live audio track is
    /// left. Streams which can't enumerate their tracks are left alone.
    pub fn on_tracks_changed(&self, stream: &dyn MediaStream) {
        if !stream.enumerates_tracks() {
            return;
        }
        if !has_live(&stream.audio_tracks()) {
            self.modify(MediaKind::Audio, |sources| sources.hard = false);
        }
        let video = video_hard_mute(stream);
        self.modify(MediaKind::Video, |sources| sources.hard = video);
    }

    /// Hardware mute of a stream which can't enumerate its tracks.
    pub fn on_stream_mute(&self, muted: bool) {
        self.modify(MediaKind::Audio, |sources| sources.hard = muted);
        self.modify(MediaKind::Video, |sources| sources.hard = muted);
        self.publish();
    }

    pub fn is_muted(&self, kind: MediaKind) -> bool {
        resolve(self.model, self.snapshot.origin(), self.sources(kind))
    }

    /// Pushes the effective flags into the snapshot.
    pub fn publish(&self) {
        let snapshot = &self.snapshot;
        snapshot.update(&snapshot.audio_muted, self.is_muted(MediaKind::Audio));
        snapshot.update(&snapshot.video_muted, self.is_muted(MediaKind::Video));
        snapshot.update(
            &snapshot.remote_audio_muted,
            self.sources(MediaKind::Audio).remote,
        );
        snapshot.update(
            &snapshot.remote_video_muted,
            self.sources(MediaKind::Video).remote,
        );
    }

    fn set_muted(
        &self,
        kind: MediaKind,
        muted: bool,
        remote: bool,
        stream: &dyn MediaStream,
    ) {
        let origin = self.snapshot.origin();
        if remote && origin == Origin::Remote {
            debug!(stream = self.snapshot.id(), ?kind, muted, "remote mute");
            self.modify(kind, |sources| sources.remote = muted);
        } else {
            debug!(stream = self.snapshot.id(), ?kind, muted, "local mute");
            self.modify(kind, |sources| sources.local = muted);
            if origin == Origin::Local
                || self.remote_track_enabled == RemoteTrackEnabled::Mirror
            {
                let tracks = match kind {
                    MediaKind::Audio => stream.audio_tracks(),
                    MediaKind::Video => stream.video_tracks(),
                };
                for track in tracks {
                    track.set_enabled(!muted);
                }
            }
        }
        self.publish();
    }

    fn modify(&self, kind: MediaKind, f: impl FnOnce(&mut MuteSources)) {
        let cell = self.cell(kind);
        let mut sources = cell.get();
        f(&mut sources);
        cell.set(sources);
    }

    fn cell(&self, kind: MediaKind) -> &Cell<MuteSources> {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::sys::memory::{MemoryStream, MemoryTrack};

    use super::*;

    fn engine(origin: Origin, mirror: RemoteTrackEnabled) -> MuteEngine {
        let snapshot = Rc::new(StreamSnapshot::new("s".to_owned(), origin));
        MuteEngine::new(snapshot, MuteModel::LocalDominant, mirror)
    }

    proptest! {
        #[test]
        fn local_mute_dominates(
            local in any::<bool>(),
            hard in any::<bool>(),
            remote in any::<bool>(),
            is_local in any::<bool>(),
        ) {
            let origin = if is_local { Origin::Local } else { Origin::Remote };
            let sources = MuteSources { local, hard, remote };

            prop_assert_eq!(
                resolve(MuteModel::LocalDominant, origin, sources),
                local || if is_local { hard } else { remote },
            );
            prop_assert_eq!(
                resolve(MuteModel::SimpleOr, origin, sources),
                local || hard || remote,
            );
        }
    }

    #[test]
    fn local_mute_toggles_local_tracks() {
        let audio = MemoryTrack::new("a", MediaKind::Audio, "Mic");
        let stream = MemoryStream::new("s", vec![audio.clone()]);
        let engine = engine(Origin::Local, RemoteTrackEnabled::Untouched);

        engine.mute(MediaKind::Audio, false, stream.as_ref());
        assert!(engine.snapshot.audio_muted.get());
        assert!(!audio.is_enabled());

        engine.toggle(MediaKind::Audio, stream.as_ref());
        assert!(!engine.snapshot.audio_muted.get());
        assert!(audio.is_enabled());
    }

    #[test]
    fn remote_flag_on_local_stream_is_a_local_mute() {
        let video = MemoryTrack::new("v", MediaKind::Video, "Cam");
        let stream = MemoryStream::new("s", vec![video.clone()]);
        let engine = engine(Origin::Local, RemoteTrackEnabled::Untouched);

        engine.mute(MediaKind::Video, true, stream.as_ref());

        assert!(engine.sources(MediaKind::Video).local);
        assert!(!engine.sources(MediaKind::Video).remote);
        assert!(!video.is_enabled());
    }

    #[test]
    fn remote_mute_leaves_tracks_alone() {
        let audio = MemoryTrack::new("a", MediaKind::Audio, "");
        let stream = MemoryStream::new("s", vec![audio.clone()]);
        let engine = engine(Origin::Remote, RemoteTrackEnabled::Untouched);

        engine.mute(MediaKind::Audio, true, stream.as_ref());
        assert!(engine.snapshot.audio_muted.get());
        assert!(engine.snapshot.remote_audio_muted.get());
        assert!(audio.is_enabled());

        engine.mute(MediaKind::Audio, false, stream.as_ref());
        engine.play(MediaKind::Audio, true, stream.as_ref());
        assert!(engine.snapshot.audio_muted.get());
        assert!(!engine.snapshot.remote_audio_muted.get());
        assert!(audio.is_enabled());
    }

    #[test]
    fn mirrors_user_mute_on_remote_tracks_when_configured() {
        let audio = MemoryTrack::new("a", MediaKind::Audio, "");
        let stream = MemoryStream::new("s", vec![audio.clone()]);
        let engine = engine(Origin::Remote, RemoteTrackEnabled::Mirror);

        engine.mute(MediaKind::Audio, false, stream.as_ref());
        assert!(!audio.is_enabled());

        engine.mute(MediaKind::Audio, true, stream.as_ref());
        engine.play(MediaKind::Audio, false, stream.as_ref());
        assert!(audio.is_enabled());
    }

    #[test]
    fn hard_video_mute_needs_every_live_track() {
        let first = MemoryTrack::new("v1", MediaKind::Video, "");
        let second = MemoryTrack::new("v2", MediaKind::Video, "");
        let stream =
            MemoryStream::new("s", vec![first.clone(), second.clone()]);
        let engine = engine(Origin::Local, RemoteTrackEnabled::Untouched);

        first.set_muted(true);
        engine.on_track_mute(first.as_ref(), stream.as_ref());
        assert!(!engine.snapshot.video_muted.get());

        second.end();
        engine.on_track_mute(first.as_ref(), stream.as_ref());
        assert!(engine.snapshot.video_muted.get());
    }

    #[test]
    fn hard_video_mute_is_rederived_when_tracks_change() {
        let cam = MemoryTrack::new("cam", MediaKind::Video, "");
        let stream = MemoryStream::new("s", vec![cam.clone()]);
        let engine = engine(Origin::Local, RemoteTrackEnabled::Untouched);

        cam.set_muted(true);
        engine.on_track_mute(cam.as_ref(), stream.as_ref());
        assert!(engine.sources(MediaKind::Video).hard);

        stream.remove_track("cam");
        engine.on_tracks_changed(stream.as_ref());
        assert!(!engine.sources(MediaKind::Video).hard);

        let other = MemoryTrack::new("other", MediaKind::Video, "");
        stream.add_track(other.clone());
        engine.on_tracks_changed(stream.as_ref());
        engine.publish();
        assert!(!engine.snapshot.video_muted.get());

        other.set_muted(true);
        engine.on_tracks_changed(stream.as_ref());
        engine.publish();
        assert!(engine.snapshot.video_muted.get());
    }

    #[test]
    fn hard_audio_mute_clears_without_live_audio() {
        let mic = MemoryTrack::new("mic", MediaKind::Audio, "");
        let stream = MemoryStream::new("s", vec![mic.clone()]);
        let engine = engine(Origin::Local, RemoteTrackEnabled::Untouched);

        mic.set_muted(true);
        engine.on_track_mute(mic.as_ref(), stream.as_ref());
        engine.on_tracks_changed(stream.as_ref());
        assert!(engine.sources(MediaKind::Audio).hard);

        mic.end();
        engine.on_tracks_changed(stream.as_ref());
        assert!(!engine.sources(MediaKind::Audio).hard);
    }

    #[test]
    fn opaque_stream_keeps_its_hard_mute() {
        let stream = MemoryStream::opaque(
            "s",
            vec![MemoryTrack::new("a", MediaKind::Audio, "")],
        );
        let engine = engine(Origin::Local, RemoteTrackEnabled::Untouched);

        engine.on_stream_mute(true);
        engine.on_tracks_changed(stream.as_ref());
        assert!(engine.sources(MediaKind::Audio).hard);
        assert!(engine.sources(MediaKind::Video).hard);
    }

    #[test]
    fn hard_audio_mute_follows_firing_track() {
        let audio = MemoryTrack::new("a", MediaKind::Audio, "");
        let stream = MemoryStream::new("s", vec![audio.clone()]);
        let engine = engine(Origin::Local, RemoteTrackEnabled::Untouched);

        audio.set_muted(true);
        engine.on_track_mute(audio.as_ref(), stream.as_ref());
        assert!(engine.snapshot.audio_muted.get());

        audio.set_muted(false);
        engine.on_track_mute(audio.as_ref(), stream.as_ref());
        assert!(!engine.snapshot.audio_muted.get());
    }

    #[test]
    fn hard_mute_is_ignored_for_remote_streams() {
        let engine = engine(Origin::Remote, RemoteTrackEnabled::Untouched);
        engine.on_stream_mute(true);
        assert!(!engine.snapshot.audio_muted.get());
        assert!(!engine.snapshot.video_muted.get());
    }
}
