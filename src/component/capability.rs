//! Liveness-aware facts about the tracks of a stream.

use std::rc::Rc;

use crate::{
    proto::Origin,
    sys::{is_live, MediaStream, MediaTrack},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    pub has_audio: bool,
    pub has_video: bool,
}

/// Computes which media are present in the current tracks of `stream`.
///
/// Streams which can't enumerate their tracks count as having both media as
/// long as they aren't empty.
pub fn presence(stream: &dyn MediaStream) -> Presence {
    if !stream.enumerates_tracks() {
        let present = !stream.is_empty();
        return Presence {
            has_audio: present,
            has_video: present,
        };
    }
    Presence {
        has_audio: any_live(&stream.audio_tracks()),
        has_video: any_live(&stream.video_tracks()),
    }
}

fn any_live(tracks: &[Rc<dyn MediaTrack>]) -> bool {
    tracks.iter().any(|track| is_live(track.as_ref()))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceNames {
    pub camera: String,
    pub microphone: String,
}

/// Captures device labels of a local stream.
///
/// Must be called before any processing replaces the original tracks, as
/// processed tracks lose their device labels.
pub fn device_names(origin: Origin, stream: &dyn MediaStream) -> DeviceNames {
    if origin != Origin::Local {
        return DeviceNames::default();
    }
    let first_label = |tracks: Vec<Rc<dyn MediaTrack>>| {
        tracks.first().map(|track| track.label()).unwrap_or_default()
    };
    DeviceNames {
        camera: first_label(stream.video_tracks()),
        microphone: first_label(stream.audio_tracks()),
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        proto::MediaKind,
        sys::memory::{MemoryStream, MemoryTrack},
    };

    use super::*;

    #[test]
    fn ended_tracks_do_not_count() {
        let audio = MemoryTrack::new("a", MediaKind::Audio, "Mic");
        let video = MemoryTrack::new("v", MediaKind::Video, "Cam");
        let stream = MemoryStream::new("s", vec![audio, video.clone()]);

        assert_eq!(
            presence(stream.as_ref()),
            Presence {
                has_audio: true,
                has_video: true,
            },
        );

        video.end();
        assert_eq!(
            presence(stream.as_ref()),
            Presence {
                has_audio: true,
                has_video: false,
            },
        );
    }

    #[test]
    fn tracks_without_ready_state_are_live() {
        let audio =
            MemoryTrack::without_ready_state("a", MediaKind::Audio, "Mic");
        audio.end();
        let stream = MemoryStream::new("s", vec![audio]);

        assert!(presence(stream.as_ref()).has_audio);
    }

    #[test]
    fn opaque_stream_counts_as_non_empty() {
        let audio = MemoryTrack::new("a", MediaKind::Audio, "Mic");
        let stream = MemoryStream::opaque("s", vec![audio]);
        assert_eq!(
            presence(stream.as_ref()),
            Presence {
                has_audio: true,
                has_video: true,
            },
        );

        let empty = MemoryStream::opaque("e", Vec::new());
        assert_eq!(presence(empty.as_ref()), Presence::default());
    }

    #[test]
    fn device_names_only_for_local_streams() {
        let stream = MemoryStream::new(
            "s",
            vec![
                MemoryTrack::new("a", MediaKind::Audio, "Built-in Mic"),
                MemoryTrack::new("v1", MediaKind::Video, "FaceTime HD"),
                MemoryTrack::new("v2", MediaKind::Video, "USB Camera"),
            ],
        );

        assert_eq!(
            device_names(Origin::Local, stream.as_ref()),
            DeviceNames {
                camera: "FaceTime HD".to_owned(),
                microphone: "Built-in Mic".to_owned(),
            },
        );
        assert_eq!(
            device_names(Origin::Remote, stream.as_ref()),
            DeviceNames::default(),
        );
    }
}
