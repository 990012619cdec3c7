//! Core type definitions for AdHush
//!
//! These types are shared by the probe, the suppressor and the watcher,
//! and are what the browser runtime passes back into the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Ad State
// =============================================================================

/// What the player is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdState {
    /// Regular content (or nothing at all)
    #[default]
    Content,
    /// An advertisement is on screen
    AdPlaying,
}

impl AdState {
    pub fn is_ad(self) -> bool {
        self == Self::AdPlaying
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::AdPlaying => "adPlaying",
        }
    }
}

// =============================================================================
// Indicators (bit flags, one per independent ad signal)
// =============================================================================

bitflags::bitflags! {
    /// Ad indicators observed during one evaluation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Indicators: u8 {
        /// Player carries an "ad is showing" class marker
        const AD_SHOWING = 1 << 0;
        /// A skip control is rendered
        const SKIP_CONTROL = 1 << 1;
        /// An ad overlay is rendered
        const AD_OVERLAY = 1 << 2;
        /// Rich player API reports an ad
        const PLAYER_AD_STATE = 1 << 3;
        /// Media source URL carries an ad-marketing hint
        const MEDIA_SOURCE = 1 << 4;
        /// Badge/label text mentions an ad
        const AD_LABEL = 1 << 5;
    }
}

impl Indicators {
    /// Stable names, in bit order, for display surfaces.
    pub const NAMES: [(Indicators, &'static str); 6] = [
        (Self::AD_SHOWING, "adShowing"),
        (Self::SKIP_CONTROL, "skipControl"),
        (Self::AD_OVERLAY, "adOverlay"),
        (Self::PLAYER_AD_STATE, "playerAdState"),
        (Self::MEDIA_SOURCE, "mediaSource"),
        (Self::AD_LABEL, "adLabel"),
    ];

    /// Any positive indicator is sufficient.
    pub fn ad_state(self) -> AdState {
        if self.is_empty() {
            AdState::Content
        } else {
            AdState::AdPlaying
        }
    }

    /// Every indicator with its result, positives and negatives alike.
    pub fn results(self) -> Vec<(&'static str, bool)> {
        Self::NAMES
            .iter()
            .map(|(flag, name)| (*name, self.contains(*flag)))
            .collect()
    }
}

// =============================================================================
// Triggers
// =============================================================================

/// Events raised by the media element we track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    /// `loadeddata`: new media (possibly an ad) started loading
    LoadedData,
    /// `volumechange`: somebody touched volume or mute
    VolumeChange,
}

/// Token handed out with every scheduled verification.
///
/// Carries the navigation generation it was issued in; a token from an older
/// generation is ignored when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyToken {
    pub generation: u64,
    pub delay: Duration,
}

/// Every source that can cause an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// DOM mutation on a watched scope
    Mutation,
    /// Fallback polling timer
    Timer,
    /// Settle delay after a navigation elapsed
    Navigation,
    /// Event from the tracked media element
    Media(MediaEvent),
    /// Scheduled verification fired
    Verify(VerifyToken),
    /// Enabled preference changed
    ControlSurface,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mutation => "mutation",
            Self::Timer => "timer",
            Self::Navigation => "navigation",
            Self::Media(MediaEvent::LoadedData) => "loadeddata",
            Self::Media(MediaEvent::VolumeChange) => "volumechange",
            Self::Verify(_) => "verify",
            Self::ControlSurface => "control",
        }
    }
}

// =============================================================================
// Directives
// =============================================================================

/// What the runtime must do after the engine handled a trigger.
///
/// The engine never schedules anything itself; the browser runtime (or a
/// simulator) turns these into timers and listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    /// A new media element was acquired: attach `loadeddata`/`volumechange`
    pub attach_listeners: bool,
    /// No media element yet: retry acquisition after this delay
    pub retry_acquire: Option<Duration>,
    /// Schedule a verification with this token
    pub verify: Option<VerifyToken>,
}

impl Directives {
    pub fn none() -> Self {
        Self::default()
    }
}

// =============================================================================
// Volume helpers
// =============================================================================

/// Clamp to the media element's valid volume range.
#[inline]
pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Element volume (0.0..=1.0) to the rich player's 0..=100 scale.
#[inline]
pub fn volume_to_percent(volume: f64) -> u8 {
    (clamp_volume(volume) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_indicators_are_content() {
        assert_eq!(Indicators::empty().ad_state(), AdState::Content);
        assert_eq!(Indicators::AD_LABEL.ad_state(), AdState::AdPlaying);
    }

    #[test]
    fn test_results_cover_every_flag() {
        let results = (Indicators::SKIP_CONTROL | Indicators::MEDIA_SOURCE).results();
        assert_eq!(results.len(), 6);
        assert!(results.contains(&("skipControl", true)));
        assert!(results.contains(&("mediaSource", true)));
        assert!(results.contains(&("adShowing", false)));
    }

    #[test]
    fn test_volume_percent() {
        assert_eq!(volume_to_percent(0.7), 70);
        assert_eq!(volume_to_percent(1.5), 100);
        assert_eq!(volume_to_percent(f64::NAN), 0);
    }
}
