use std::time::Duration;

use serde::Deserialize;

use crate::{error::ConfigError, proto::Origin};

/// How the three mute sources of a medium are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuteModel {
    /// Local user mute wins, otherwise hardware mute for local streams and
    /// remote-signaled mute for remote ones.
    LocalDominant,

    /// Any of the sources mutes the medium.
    SimpleOr,
}

impl Default for MuteModel {
    fn default() -> Self {
        Self::LocalDominant
    }
}

/// Whether a user mute of a remote stream touches its tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteTrackEnabled {
    Untouched,
    Mirror,
}

impl Default for RemoteTrackEnabled {
    fn default() -> Self {
        Self::Untouched
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub supports_simulcast: bool,
    pub supports_gain_adjustment: bool,
    pub mute_model: MuteModel,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_simulcast: true,
            supports_gain_adjustment: true,
            mute_model: MuteModel::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub origin: Origin,
    pub capabilities: Capabilities,
    pub remote_track_enabled: RemoteTrackEnabled,
    /// Starts the activity monitor right away when set.
    pub audio_monitoring: Option<MonitorConfig>,
}

impl StreamConfig {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn remote() -> Self {
        Self {
            origin: Origin::Remote,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if let Some(monitor) = &config.audio_monitoring {
            monitor.validate()?;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub detect_speaking: bool,
    pub adjust_mic: bool,
    /// dB level above which the detector reports speech.
    pub threshold: f64,
    /// Milliseconds between two level measurements.
    pub interval: u64,
    pub smoothing: f64,
    /// Attach to remote streams too.
    pub monitor_remote: bool,
    /// Milliseconds of silence before `speaking` drops.
    pub speaking_hold: u64,
    /// Gain requested once speaking stopped.
    pub quiet_gain: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            detect_speaking: true,
            adjust_mic: false,
            threshold: -50.0,
            interval: 50,
            smoothing: 0.1,
            monitor_remote: false,
            speaking_hold: 1000,
            quiet_gain: 0.5,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold > 0.0 {
            return Err(ConfigError::Threshold(self.threshold));
        }
        if self.interval == 0 {
            return Err(ConfigError::Interval);
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(ConfigError::Smoothing(self.smoothing));
        }
        if !(0.0..=1.0).contains(&self.quiet_gain) {
            return Err(ConfigError::QuietGain(self.quiet_gain));
        }
        Ok(())
    }

    pub fn speaking_hold(&self) -> Duration {
        Duration::from_millis(self.speaking_hold)
    }
}
