pub mod activity;
pub mod capability;
pub mod mute;
pub mod observer;
pub mod simulcast;

pub use self::{
    activity::ActivityMonitor,
    mute::MuteEngine,
    observer::{Signal, TrackObserver},
    simulcast::ResolutionSelector,
};
