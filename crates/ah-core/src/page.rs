//! The host document as the engine sees it.
//!
//! Only the probe and the player handle call into a [`Document`]; everything
//! else receives the data they extract. The browser runtime implements this
//! over `web_sys`, tests and the CLI over [`crate::fixture::StaticPage`].

use crate::player::{MediaElement, RichPlayerControl};

/// Read-only queries against the live document.
pub trait Document {
    type Media: MediaElement;
    type Player: RichPlayerControl;

    /// Whether any element matches `selector`.
    fn exists(&self, selector: &str) -> bool;

    /// Whether any element matching `selector` is rendered
    /// (see [`crate::probe::is_rendered`]).
    fn any_rendered(&self, selector: &str) -> bool;

    /// Text content of every rendered element matching `selector`.
    fn rendered_texts(&self, selector: &str) -> Vec<String>;

    /// Attribute of the first element matching `selector`.
    fn attribute(&self, selector: &str, name: &str) -> Option<String>;

    /// First media element matching `selector`.
    fn find_media(&self, selector: &str) -> Option<Self::Media>;

    /// First element matching `selector` that exposes a rich player API.
    fn find_player(&self, selector: &str) -> Option<Self::Player>;

    /// Current location identifier (the page URL).
    fn location(&self) -> String;
}
