use std::rc::Rc;

use futures::future::LocalBoxFuture;

use super::MediaTrack;

/// Creates hidden playback surfaces for single-track sub-streams.
pub trait PlaybackSurfaces {
    fn attach(&self, track: Rc<dyn MediaTrack>) -> Rc<dyn PlaybackSurface>;
}

pub trait PlaybackSurface {
    /// Object URL the sub-stream is rendered from.
    fn url(&self) -> String;

    /// Resolves with the natural `(width, height)` once known, or `None` if
    /// the surface went away before that.
    fn loaded_metadata(&self) -> LocalBoxFuture<'static, Option<(u32, u32)>>;

    /// Revokes the object URL and drops the surface.
    fn release(&self);
}
