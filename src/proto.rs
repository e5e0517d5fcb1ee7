use std::{fmt, rc::Rc};

use serde::Deserialize;

use crate::sys::MediaTrack;

pub type TrackId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Live,
    Ended,
}

/// Where the media of a stream comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Remote,
}

impl Default for Origin {
    fn default() -> Self {
        Self::Local
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEvent {
    Ended,
    Mute,
    Unmute,
}

/// Stream-level events. `Mute`/`Unmute` are only fired by streams which
/// can't enumerate their tracks.
#[derive(Clone)]
pub enum StreamEvent {
    AddTrack(Rc<dyn MediaTrack>),
    RemoveTrack(TrackId),
    Mute,
    Unmute,
    Ended,
    Inactive,
}

impl fmt::Debug for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddTrack(track) => {
                f.debug_tuple("AddTrack").field(&track.id()).finish()
            }
            Self::RemoveTrack(id) => {
                f.debug_tuple("RemoveTrack").field(id).finish()
            }
            Self::Mute => f.write_str("Mute"),
            Self::Unmute => f.write_str("Unmute"),
            Self::Ended => f.write_str("Ended"),
            Self::Inactive => f.write_str("Inactive"),
        }
    }
}

/// Simulcast alternate of a video source, known once its playback surface
/// reported natural dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub url: String,
    pub track_id: TrackId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorEvent {
    Speaking,
    StoppedSpeaking,
    VolumeChange(f64),
}
