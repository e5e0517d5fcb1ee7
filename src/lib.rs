//! Reactive mute, activity and simulcast state of live media streams.
//!
//! [`StreamState`] observes a [`MediaStream`](sys::MediaStream) and keeps a
//! [`StreamSnapshot`] of everything derived from it up to date. Consumers read
//! the snapshot fields and subscribe to their changes instead of looking at
//! the tracks themselves.

pub mod component;
pub mod config;
pub mod error;
pub mod proto;
pub mod snapshot;
mod stream;
pub mod sys;

pub use self::{
    config::{
        Capabilities, MonitorConfig, MuteModel, RemoteTrackEnabled,
        StreamConfig,
    },
    error::ConfigError,
    snapshot::{FieldName, FieldValue, StreamSnapshot, UNKNOWN_VOLUME},
    stream::{Collaborators, StreamState},
};
