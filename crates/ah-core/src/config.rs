//! Engine configuration
//!
//! Every selector, hint and delay the engine uses lives here so a host-page
//! markup change can be answered with a JSON override instead of a rebuild.
//! All sections default field-by-field, so partial overrides are fine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub probe: ProbeConfig,
    pub player: PlayerConfig,
    pub suppression: SuppressionPolicy,
    pub watch: WatchConfig,
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON override on top of the defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let restore = self.suppression.default_restore_volume;
        if !(restore > 0.0 && restore <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "suppression.defaultRestoreVolume",
                reason: format!("{restore} is not in (0, 1]"),
            });
        }
        if self.player.media_selectors.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "player.mediaSelectors",
                reason: "at least one selector is required".to_string(),
            });
        }
        if self.watch.fallback_interval_ms == 0 || self.watch.navigation_poll_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch",
                reason: "polling intervals must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Probe
// =============================================================================

/// Selectors and hint lists used by the signal probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProbeConfig {
    /// Present at all means an ad is showing
    pub ad_showing_selectors: Vec<String>,
    /// Must be present and rendered
    pub skip_selectors: Vec<String>,
    /// Must be present and rendered
    pub overlay_selectors: Vec<String>,
    /// Elements whose text is checked for ad words
    pub label_selectors: Vec<String>,
    /// Player roots whose label attribute is checked for ad words
    pub player_label_selectors: Vec<String>,
    pub player_label_attribute: String,
    /// Words that mark a label as an ad label (case-insensitive, whole word)
    pub label_words: Vec<String>,
    /// Substrings of a media source URL that mark ad media
    pub source_hints: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ad_showing_selectors: strings(&[
                "#movie_player.ad-showing",
                "#movie_player.ad-interrupting",
                ".html5-video-player.ad-showing",
            ]),
            skip_selectors: strings(&[
                ".ytp-ad-skip-button",
                ".ytp-ad-skip-button-container",
                ".ytp-ad-skip-button-modern",
                ".ytp-skip-ad-button",
            ]),
            overlay_selectors: strings(&[
                ".ytp-ad-player-overlay",
                ".ytp-ad-player-overlay-layout",
                ".ytp-ad-module .ytp-ad-overlay-container",
            ]),
            label_selectors: strings(&[
                ".ytp-ad-simple-ad-badge",
                ".ytp-ad-badge",
                ".ytp-ad-text",
                ".ytp-ad-preview-text",
            ]),
            player_label_selectors: strings(&["#movie_player", ".html5-video-player"]),
            player_label_attribute: "aria-label".to_string(),
            label_words: strings(&["ad", "ads", "sponsored", "advertisement"]),
            source_hints: strings(&["/pagead/", "doubleclick.net", "adformat=", "&oad=", "ctier="]),
        }
    }
}

// =============================================================================
// Player
// =============================================================================

/// Ordered acquisition strategies; the first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerConfig {
    pub media_selectors: Vec<String>,
    pub player_selectors: Vec<String>,
    pub acquire_retry_ms: u32,
}

impl PlayerConfig {
    pub fn acquire_retry(&self) -> Duration {
        Duration::from_millis(self.acquire_retry_ms as u64)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            media_selectors: strings(&[
                "#movie_player video.html5-main-video",
                ".html5-video-container video",
                "video",
            ]),
            player_selectors: strings(&["#movie_player", ".html5-video-player"]),
            acquire_retry_ms: 1000,
        }
    }
}

// =============================================================================
// Suppression
// =============================================================================

/// Retry budget and restore policy for the audio suppressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SuppressionPolicy {
    /// Verification attempts per episode before falling back to the timer
    pub max_retries: u32,
    /// First verification delay; doubles with each retry
    pub verify_delay_ms: u32,
    pub max_verify_delay_ms: u32,
    /// Used when the saved volume is zero or was never captured
    pub default_restore_volume: f64,
}

impl SuppressionPolicy {
    /// Delay before the verification following attempt number `retry`.
    pub fn verify_delay(&self, retry: u32) -> Duration {
        let base = self.verify_delay_ms as u64;
        let scaled = base.saturating_mul(1u64 << retry.min(16));
        Duration::from_millis(scaled.min(self.max_verify_delay_ms as u64))
    }
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            verify_delay_ms: 250,
            max_verify_delay_ms: 4000,
            default_restore_volume: 0.5,
        }
    }
}

// =============================================================================
// Watch
// =============================================================================

/// Observation scopes and timer cadence for the change watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchConfig {
    /// First match is observed with the full mutation filter
    pub container_selectors: Vec<String>,
    /// Attribute filter for the document-wide observer
    pub document_attribute_filter: Vec<String>,
    pub fallback_interval_ms: u32,
    pub navigation_poll_ms: u32,
    pub navigation_settle_ms: u32,
    /// Host-page event fired when an in-app navigation starts
    pub navigation_event: Option<String>,
}

impl WatchConfig {
    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms as u64)
    }

    pub fn navigation_poll(&self) -> Duration {
        Duration::from_millis(self.navigation_poll_ms as u64)
    }

    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms as u64)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            container_selectors: strings(&["#movie_player", ".html5-video-container"]),
            document_attribute_filter: strings(&["class"]),
            fallback_interval_ms: 500,
            navigation_poll_ms: 1000,
            navigation_settle_ms: 1000,
            navigation_event: Some("yt-navigate-start".to_string()),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
