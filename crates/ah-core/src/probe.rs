//! Signal Probe
//!
//! Decides whether an ad is on screen from several independent indicators.
//! Host-page markup for ad UI changes without notice, so no single indicator
//! is trusted: any one of them firing is enough.

use crate::config::ProbeConfig;
use crate::page::Document;
use crate::player::{MediaElement, PlaybackTarget, RichPlayerControl};
use crate::types::{AdState, Indicators};

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Probe {
    pub state: AdState,
    pub indicators: Indicators,
}

/// Evaluate the document. No side effects.
pub fn evaluate<D: Document>(
    doc: &D,
    target: Option<&PlaybackTarget<D::Media, D::Player>>,
    config: &ProbeConfig,
) -> Probe {
    let mut indicators = Indicators::empty();

    if config.ad_showing_selectors.iter().any(|s| doc.exists(s)) {
        indicators |= Indicators::AD_SHOWING;
    }

    if config.skip_selectors.iter().any(|s| doc.any_rendered(s)) {
        indicators |= Indicators::SKIP_CONTROL;
    }

    if config.overlay_selectors.iter().any(|s| doc.any_rendered(s)) {
        indicators |= Indicators::AD_OVERLAY;
    }

    if let Some(target) = target.filter(|t| !t.is_stale()) {
        let player_reports_ad = target
            .player
            .as_ref()
            .and_then(|p| p.ad_state())
            .unwrap_or(false);
        if player_reports_ad {
            indicators |= Indicators::PLAYER_AD_STATE;
        }

        if let Some(src) = target.media.source_url() {
            if has_source_hint(&src, &config.source_hints) {
                indicators |= Indicators::MEDIA_SOURCE;
            }
        }
    }

    if has_ad_label(doc, config) {
        indicators |= Indicators::AD_LABEL;
    }

    Probe {
        state: indicators.ad_state(),
        indicators,
    }
}

fn has_ad_label<D: Document>(doc: &D, config: &ProbeConfig) -> bool {
    let badge_text = config
        .label_selectors
        .iter()
        .flat_map(|s| doc.rendered_texts(s))
        .any(|text| has_label_word(&text, &config.label_words));
    if badge_text {
        return true;
    }

    // The player's own label switches to mention the ad while one plays.
    config
        .player_label_selectors
        .iter()
        .filter_map(|s| doc.attribute(s, &config.player_label_attribute))
        .any(|label| has_label_word(&label, &config.label_words))
}

/// Source URL contains any of the hints (case-insensitive).
pub fn has_source_hint(src: &str, hints: &[String]) -> bool {
    let src = src.to_ascii_lowercase();
    hints
        .iter()
        .any(|hint| !hint.is_empty() && src.contains(&hint.to_ascii_lowercase()))
}

/// Text contains any of the words as a whole word (case-insensitive).
pub fn has_label_word(text: &str, words: &[String]) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| words.iter().any(|w| token.eq_ignore_ascii_case(w)))
}

/// Whether an element with this box and computed style is actually on screen.
///
/// Templated-but-inactive ad UI is commonly kept in the DOM with
/// `display: none` or a zero-size box.
pub fn is_rendered(width: f64, height: f64, display: &str, visibility: &str) -> bool {
    width > 0.0
        && height > 0.0
        && !display.trim().eq_ignore_ascii_case("none")
        && !visibility.trim().eq_ignore_ascii_case("hidden")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{ElementFixture, FakeMedia, FakePlayer, StaticPage};

    const WATCH: &str = "https://www.youtube.com/watch?v=abc";

    fn target_for(page: &StaticPage) -> Option<PlaybackTarget<FakeMedia, FakePlayer>> {
        page.find_media("video").map(|media| PlaybackTarget {
            media,
            player: page.find_player("#movie_player"),
            generation: 0,
        })
    }

    fn run(page: &StaticPage) -> Probe {
        let target = target_for(page);
        evaluate(page, target.as_ref(), &ProbeConfig::default())
    }

    #[test]
    fn test_clean_page_is_content() {
        let page = StaticPage::new(WATCH)
            .with_element("#movie_player")
            .with_media("video", FakeMedia::new(1.0))
            .with_player("#movie_player", FakePlayer::new());
        let probe = run(&page);
        assert_eq!(probe.state, AdState::Content);
        assert!(probe.indicators.is_empty());
    }

    #[test]
    fn test_ad_showing_marker_alone() {
        let probe = run(&StaticPage::new(WATCH).with_element("#movie_player.ad-showing"));
        assert_eq!(probe.state, AdState::AdPlaying);
        assert_eq!(probe.indicators, Indicators::AD_SHOWING);
    }

    #[test]
    fn test_skip_control_alone() {
        let probe = run(&StaticPage::new(WATCH).with_element(".ytp-ad-skip-button-container"));
        assert_eq!(probe.state, AdState::AdPlaying);
        assert_eq!(probe.indicators, Indicators::SKIP_CONTROL);
    }

    #[test]
    fn test_overlay_alone() {
        let probe = run(&StaticPage::new(WATCH).with_element(".ytp-ad-player-overlay"));
        assert_eq!(probe.state, AdState::AdPlaying);
        assert_eq!(probe.indicators, Indicators::AD_OVERLAY);
    }

    #[test]
    fn test_player_api_alone() {
        let player = FakePlayer::new();
        player.set_ad_state(Some(true));
        let page = StaticPage::new(WATCH)
            .with_media("video", FakeMedia::new(1.0))
            .with_player("#movie_player", player);
        let probe = run(&page);
        assert_eq!(probe.state, AdState::AdPlaying);
        assert_eq!(probe.indicators, Indicators::PLAYER_AD_STATE);
    }

    #[test]
    fn test_media_source_alone() {
        let media = FakeMedia::new(1.0);
        media.set_source(Some("https://r1.googlevideo.com/videoplayback?ctier=L&id=1"));
        let probe = run(&StaticPage::new(WATCH).with_media("video", media));
        assert_eq!(probe.state, AdState::AdPlaying);
        assert_eq!(probe.indicators, Indicators::MEDIA_SOURCE);
    }

    #[test]
    fn test_badge_text_alone() {
        let probe = run(&StaticPage::new(WATCH).with_text(".ytp-ad-simple-ad-badge", "Ad · 0:14"));
        assert_eq!(probe.state, AdState::AdPlaying);
        assert_eq!(probe.indicators, Indicators::AD_LABEL);
    }

    #[test]
    fn test_hidden_badge_text_is_ignored() {
        let mut page = StaticPage::new(WATCH);
        page.set_elements(vec![ElementFixture {
            selector: ".ytp-ad-text".to_string(),
            rendered: false,
            text: Some("Ad".to_string()),
            attributes: Default::default(),
        }]);
        let probe = run(&page);
        assert_eq!(probe.state, AdState::Content);
        assert_eq!(probe.indicators, Indicators::empty());
    }

    #[test]
    fn test_player_label_alone() {
        let page = StaticPage::new(WATCH).with_attribute(
            "#movie_player",
            "aria-label",
            "YouTube Video Player in sponsored mode",
        );
        assert_eq!(run(&page).indicators, Indicators::AD_LABEL);
    }

    #[test]
    fn test_hidden_controls_do_not_count() {
        let page = StaticPage::new(WATCH)
            .with_hidden(".ytp-ad-skip-button")
            .with_hidden(".ytp-ad-player-overlay");
        assert_eq!(run(&page).state, AdState::Content);
    }

    #[test]
    fn test_stale_target_is_ignored() {
        let media = FakeMedia::new(1.0);
        media.set_source(Some("https://ad.doubleclick.net/x"));
        media.detach();
        let page = StaticPage::new(WATCH).with_media("video", media);
        assert_eq!(run(&page).state, AdState::Content);
    }

    #[test]
    fn test_indicators_combine() {
        let page = StaticPage::new(WATCH)
            .with_element("#movie_player.ad-showing")
            .with_element(".ytp-ad-skip-button");
        assert_eq!(
            run(&page).indicators,
            Indicators::AD_SHOWING | Indicators::SKIP_CONTROL
        );
    }

    #[test]
    fn test_label_word_is_whole_word() {
        let words = ProbeConfig::default().label_words;
        assert!(has_label_word("Ad 1 of 2", &words));
        assert!(has_label_word("SPONSORED", &words));
        assert!(!has_label_word("Loading your download", &words));
        assert!(!has_label_word("", &words));
    }

    #[test]
    fn test_is_rendered() {
        assert!(is_rendered(120.0, 40.0, "block", "visible"));
        assert!(!is_rendered(0.0, 40.0, "block", "visible"));
        assert!(!is_rendered(120.0, 40.0, "none", "visible"));
        assert!(!is_rendered(120.0, 40.0, "flex", "hidden"));
    }
}
