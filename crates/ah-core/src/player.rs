//! Player Handle
//!
//! Locates the media element (and, when present, the richer player-control
//! surface wrapped around it), keeps hold of it, and notices when the host
//! page swaps it out from under us.

use log::debug;

use crate::config::PlayerConfig;
use crate::page::Document;

// =============================================================================
// Control surfaces
// =============================================================================

/// Which control surface an operation was attempted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// The media element's own `volume`/`muted` properties
    Element,
    /// The host player's scripting API
    RichPlayer,
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Element => f.write_str("media element"),
            Self::RichPlayer => f.write_str("player API"),
        }
    }
}

/// Error raised while mutating a control surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("{surface} rejected {operation}: {reason}")]
    Rejected {
        surface: Surface,
        operation: &'static str,
        reason: String,
    },
    #[error("{surface} does not support {operation}")]
    Unsupported {
        surface: Surface,
        operation: &'static str,
    },
}

/// The playable media element. Implementations use interior mutability, the
/// same way DOM handles do.
pub trait MediaElement {
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64) -> Result<(), ControlError>;
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool) -> Result<(), ControlError>;
    /// Source URL currently loaded, if any.
    fn source_url(&self) -> Option<String>;
    /// Still attached to the document.
    fn is_connected(&self) -> bool;
    /// Still the expected element kind (audio/video).
    fn is_media(&self) -> bool;

    /// Zero volume or the mute flag set.
    fn is_silent(&self) -> bool {
        self.muted() || self.volume() <= 0.0
    }
}

/// Optional richer player API. Each call may be missing on a given page
/// revision; implementations report that as [`ControlError::Unsupported`].
pub trait RichPlayerControl {
    fn mute(&self) -> Result<(), ControlError>;
    fn unmute(&self) -> Result<(), ControlError>;
    /// Volume on the player's 0..=100 scale.
    fn set_volume(&self, percent: u8) -> Result<(), ControlError>;
    /// `Some(true)` when the player reports an ad, `None` when it cannot say.
    fn ad_state(&self) -> Option<bool>;
}

// =============================================================================
// Playback target
// =============================================================================

/// The media element we currently track.
#[derive(Debug, Clone)]
pub struct PlaybackTarget<M, P> {
    pub media: M,
    pub player: Option<P>,
    /// Navigation generation the target was acquired in
    pub generation: u64,
}

impl<M: MediaElement, P: RichPlayerControl> PlaybackTarget<M, P> {
    pub fn is_stale(&self) -> bool {
        !self.media.is_connected() || !self.media.is_media()
    }
}

/// Outcome of an acquisition pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// A new element is now tracked
    Acquired,
    /// The tracked element is still valid
    Held,
    /// Nothing to track yet; retry later
    NotReady,
}

// =============================================================================
// Player Handle
// =============================================================================

pub struct PlayerHandle<M, P> {
    config: PlayerConfig,
    target: Option<PlaybackTarget<M, P>>,
}

impl<M: MediaElement, P: RichPlayerControl> PlayerHandle<M, P> {
    pub fn new(config: PlayerConfig) -> Self {
        Self { config, target: None }
    }

    pub fn target(&self) -> Option<&PlaybackTarget<M, P>> {
        self.target.as_ref()
    }

    /// Keep the current target if it is still valid, otherwise run the
    /// acquisition strategies in order.
    pub fn acquire<D>(&mut self, doc: &D, generation: u64) -> Acquisition
    where
        D: Document<Media = M, Player = P>,
    {
        if let Some(target) = &self.target {
            if !target.is_stale() {
                return Acquisition::Held;
            }
            debug!("Tracked media element went stale, re-acquiring");
            self.target = None;
        }

        let media = self
            .config
            .media_selectors
            .iter()
            .find_map(|selector| doc.find_media(selector).filter(|m| m.is_media()));

        let Some(media) = media else {
            return Acquisition::NotReady;
        };

        let player = self
            .config
            .player_selectors
            .iter()
            .find_map(|selector| doc.find_player(selector));

        debug!(
            "Acquired media element (rich player API: {})",
            if player.is_some() { "yes" } else { "no" }
        );
        self.target = Some(PlaybackTarget { media, player, generation });
        Acquisition::Acquired
    }

    /// Drop the target (navigation).
    pub fn release(&mut self) {
        self.target = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FakeMedia, StaticPage};

    fn handle() -> PlayerHandle<FakeMedia, crate::fixture::FakePlayer> {
        PlayerHandle::new(PlayerConfig::default())
    }

    #[test]
    fn test_not_ready_without_media() {
        let page = StaticPage::new("https://www.youtube.com/watch?v=a");
        let mut handle = handle();
        assert_eq!(handle.acquire(&page, 0), Acquisition::NotReady);
        assert!(handle.target().is_none());
    }

    #[test]
    fn test_acquire_then_hold() {
        let page = StaticPage::new("https://www.youtube.com/watch?v=a")
            .with_media("video", FakeMedia::new(0.7));
        let mut handle = handle();
        assert_eq!(handle.acquire(&page, 3), Acquisition::Acquired);
        assert_eq!(handle.target().unwrap().generation, 3);
        assert!(handle.target().unwrap().player.is_none());
        assert_eq!(handle.acquire(&page, 3), Acquisition::Held);
    }

    #[test]
    fn test_strategy_order_prefers_main_video() {
        let main = FakeMedia::new(0.9);
        let other = FakeMedia::new(0.1);
        let page = StaticPage::new("https://www.youtube.com/")
            .with_media("video", other)
            .with_media("#movie_player video.html5-main-video", main.clone());
        let mut handle = handle();
        handle.acquire(&page, 0);
        assert!(handle.target().unwrap().media.same_as(&main));
    }

    #[test]
    fn test_detached_media_is_reacquired() {
        let first = FakeMedia::new(0.7);
        let mut page = StaticPage::new("https://www.youtube.com/").with_media("video", first.clone());
        let mut handle = handle();
        handle.acquire(&page, 0);

        first.detach();
        let second = FakeMedia::new(0.4);
        page = page.with_media("video", second.clone());
        assert_eq!(handle.acquire(&page, 0), Acquisition::Acquired);
        assert!(handle.target().unwrap().media.same_as(&second));
    }

    #[test]
    fn test_wrong_element_kind_is_skipped() {
        let not_media = FakeMedia::new(0.7);
        not_media.set_kind_is_media(false);
        let page = StaticPage::new("https://www.youtube.com/").with_media("video", not_media);
        let mut handle = handle();
        assert_eq!(handle.acquire(&page, 0), Acquisition::NotReady);
    }
}
