//! Seams to the capture/transport layer and the other external
//! collaborators.

mod level_detector;
mod media_stream;
mod media_stream_track;
pub mod memory;
mod playback_surface;

pub use self::{
    level_detector::{Attachment, DetectorHandle, GainControl, LevelDetector},
    media_stream::MediaStream,
    media_stream_track::{is_live, MediaTrack},
    playback_surface::{PlaybackSurface, PlaybackSurfaces},
};
