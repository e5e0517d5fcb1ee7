//! Simulcast resolution selection.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use tokio::task::{spawn_local, JoinHandle};
use tracing::debug;

use crate::{
    proto::{Resolution, TrackId},
    snapshot::StreamSnapshot,
    sys::{MediaTrack, PlaybackSurface, PlaybackSurfaces},
};

/// Picks the alternate to render at `target` width.
///
/// `widths` must be sorted in descending order. Takes the largest alternate
/// narrower than `target` (or the narrowest one if none is), then switches
/// to its wider neighbor if downscaling that one distorts strictly less than
/// upscaling the pick.
pub fn select(widths: &[u32], target: u32) -> Option<usize> {
    let last = widths.len().checked_sub(1)?;
    let picked = widths
        .iter()
        .position(|&width| width < target)
        .unwrap_or(last);
    if picked == 0 {
        return Some(0);
    }
    let wider = picked - 1;
    if distortion(target, widths[wider]) < distortion(target, widths[picked]) {
        Some(wider)
    } else {
        Some(picked)
    }
}

/// Relative error of rendering an alternate of `width` at `target` width.
fn distortion(target: u32, width: u32) -> f64 {
    (f64::from(target) - f64::from(width)).abs() / f64::from(width)
}

struct Alternate {
    resolution: Resolution,
    track: Rc<dyn MediaTrack>,
    surface: Rc<dyn PlaybackSurface>,
}

/// Surface which hasn't reported its dimensions yet.
struct Pending {
    surface: Rc<dyn PlaybackSurface>,
    task: JoinHandle<()>,
}

pub struct ResolutionSelector {
    snapshot: Rc<StreamSnapshot>,
    alternates: RefCell<Vec<Alternate>>,
    pending: RefCell<HashMap<TrackId, Pending>>,
    released: Cell<bool>,
}

impl ResolutionSelector {
    pub fn new(snapshot: Rc<StreamSnapshot>) -> Rc<Self> {
        Rc::new(Self {
            snapshot,
            alternates: RefCell::default(),
            pending: RefCell::default(),
            released: Cell::new(false),
        })
    }

    /// Attaches a hidden playback surface to every provided video track.
    ///
    /// Alternates appear one by one, in whatever order the surfaces report
    /// their dimensions.
    pub fn populate(
        self: &Rc<Self>,
        surfaces: &dyn PlaybackSurfaces,
        tracks: Vec<Rc<dyn MediaTrack>>,
    ) {
        for track in tracks {
            let surface = surfaces.attach(Rc::clone(&track));
            let metadata = surface.loaded_metadata();
            let task = spawn_local({
                let this = Rc::downgrade(self);
                let surface = Rc::clone(&surface);
                let track = Rc::clone(&track);
                async move {
                    if let Some((width, height)) = metadata.await {
                        if let Some(this) = this.upgrade() {
                            this.insert(track, surface, width, height);
                        }
                    }
                }
            });
            let pending = Pending { surface, task };
            let old = self.pending.borrow_mut().insert(track.id(), pending);
            if let Some(old) = old {
                old.task.abort();
                old.surface.release();
            }
        }
    }

    /// Currently known alternates, widest first.
    pub fn alternates(&self) -> Vec<Resolution> {
        self.alternates
            .borrow()
            .iter()
            .map(|alt| alt.resolution.clone())
            .collect()
    }

    /// Selects the alternate fitting the provided rendering width.
    pub fn fit(&self, target: u32) -> Option<usize> {
        let widths: Vec<u32> = self
            .alternates
            .borrow()
            .iter()
            .map(|alt| alt.resolution.width)
            .collect();
        let selected = select(&widths, target);
        debug!(stream = self.snapshot.id(), target, ?selected, "fit");
        self.snapshot.update(&self.snapshot.active_alternate, selected);
        self.publish_selection();
        selected
    }

    /// Track of the active alternate.
    pub fn selected_track(&self) -> Option<Rc<dyn MediaTrack>> {
        let index = self.snapshot.active_alternate.get()?;
        self.alternates
            .borrow()
            .get(index)
            .map(|alt| Rc::clone(&alt.track))
    }

    /// Forgets the alternate of a removed track.
    ///
    /// The selection keeps following its track. If that track is the removed
    /// one, the active index is clamped into the shrunk list instead.
    pub fn remove_track(&self, id: &str) {
        if let Some(pending) = self.pending.borrow_mut().remove(id) {
            pending.task.abort();
            pending.surface.release();
        }

        let selected = self.snapshot.selected_video_track_id.get();
        let removed = {
            let mut alternates = self.alternates.borrow_mut();
            alternates
                .iter()
                .position(|alt| alt.resolution.track_id == id)
                .map(|pos| alternates.remove(pos))
        };
        if let Some(alt) = removed {
            alt.surface.release();
            let len = self.alternates.borrow().len();
            let index = selected
                .and_then(|selected| self.position(&selected))
                .or_else(|| {
                    let index = self.snapshot.active_alternate.get()?;
                    len.checked_sub(1).map(|last| index.min(last))
                });
            self.snapshot.update(&self.snapshot.active_alternate, index);
            self.publish();
        }
    }

    /// Releases every playback surface. Repeated calls are no-ops.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        for (_, pending) in self.pending.borrow_mut().drain() {
            pending.task.abort();
            pending.surface.release();
        }
        for alt in self.alternates.borrow().iter() {
            alt.surface.release();
        }
    }

    fn insert(
        &self,
        track: Rc<dyn MediaTrack>,
        surface: Rc<dyn PlaybackSurface>,
        width: u32,
        height: u32,
    ) {
        if self.released.get() {
            return;
        }
        let track_id = track.id();
        if self.pending.borrow_mut().remove(&track_id).is_none() {
            return;
        }
        if width == 0 {
            debug!(track = %track_id, "zero width alternate dropped");
            surface.release();
            return;
        }

        let resolution = Resolution {
            width,
            height,
            url: surface.url(),
            track_id,
        };
        debug!(stream = self.snapshot.id(), ?resolution, "alternate loaded");
        {
            let mut alternates = self.alternates.borrow_mut();
            alternates.push(Alternate {
                resolution,
                track,
                surface,
            });
            alternates.sort_by(|a, b| {
                b.resolution.width.cmp(&a.resolution.width)
            });
        }
        if let Some(selected) = self.snapshot.selected_video_track_id.get() {
            let index = self.position(&selected);
            self.snapshot.update(&self.snapshot.active_alternate, index);
        }
        self.publish();
    }

    fn position(&self, track_id: &str) -> Option<usize> {
        self.alternates
            .borrow()
            .iter()
            .position(|alt| alt.resolution.track_id == track_id)
    }

    fn publish(&self) {
        self.snapshot
            .update(&self.snapshot.resolution_alternates, self.alternates());
        self.publish_selection();
    }

    fn publish_selection(&self) {
        let selected = self.selected_track().map(|track| track.id());
        self.snapshot
            .update(&self.snapshot.selected_video_track_id, selected);
    }
}

impl Drop for ResolutionSelector {
    fn drop(&mut self) {
        for (_, pending) in self.pending.get_mut().drain() {
            pending.task.abort();
        }
    }
}
