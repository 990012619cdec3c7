//! In-memory page model
//!
//! A [`Document`] implementation that needs no browser: selectors are matched
//! literally against a list of element fixtures. Used by the engine's tests
//! and by `ah-cli` to replay recorded page states.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::page::Document;
use crate::player::{ControlError, MediaElement, RichPlayerControl, Surface};

// =============================================================================
// Serialized fixtures
// =============================================================================

/// One element of a page fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementFixture {
    pub selector: String,
    #[serde(default = "default_true")]
    pub rendered: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaFixture {
    pub selector: String,
    pub volume: f64,
    pub muted: bool,
    pub src: Option<String>,
}

impl Default for MediaFixture {
    fn default() -> Self {
        Self {
            selector: "video".to_string(),
            volume: 1.0,
            muted: false,
            src: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerFixture {
    pub selector: String,
    pub ad_state: Option<bool>,
}

impl Default for PlayerFixture {
    fn default() -> Self {
        Self {
            selector: "#movie_player".to_string(),
            ad_state: None,
        }
    }
}

/// JSON form of a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageFixture {
    pub location: String,
    pub elements: Vec<ElementFixture>,
    pub media: Option<MediaFixture>,
    pub player: Option<PlayerFixture>,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Fake media element
// =============================================================================

#[derive(Debug)]
struct MediaState {
    volume: Cell<f64>,
    muted: Cell<bool>,
    connected: Cell<bool>,
    is_media: Cell<bool>,
    src: RefCell<Option<String>>,
    failing_writes: Cell<u32>,
    writes: Cell<u32>,
}

/// Shared-state fake; clones observe the same element.
#[derive(Debug, Clone)]
pub struct FakeMedia(Rc<MediaState>);

impl FakeMedia {
    pub fn new(volume: f64) -> Self {
        Self(Rc::new(MediaState {
            volume: Cell::new(volume),
            muted: Cell::new(false),
            connected: Cell::new(true),
            is_media: Cell::new(true),
            src: RefCell::new(None),
            failing_writes: Cell::new(0),
            writes: Cell::new(0),
        }))
    }

    pub fn from_fixture(fixture: &MediaFixture) -> Self {
        let media = Self::new(fixture.volume);
        media.0.muted.set(fixture.muted);
        *media.0.src.borrow_mut() = fixture.src.clone();
        media
    }

    pub fn same_as(&self, other: &FakeMedia) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Change volume the way the host page or the user would.
    pub fn external_set_volume(&self, volume: f64) {
        self.0.volume.set(volume);
    }

    pub fn external_set_muted(&self, muted: bool) {
        self.0.muted.set(muted);
    }

    pub fn set_source(&self, src: Option<&str>) {
        *self.0.src.borrow_mut() = src.map(str::to_string);
    }

    pub fn detach(&self) {
        self.0.connected.set(false);
    }

    pub fn set_kind_is_media(&self, is_media: bool) {
        self.0.is_media.set(is_media);
    }

    /// Make the next `count` writes throw.
    pub fn fail_next_writes(&self, count: u32) {
        self.0.failing_writes.set(count);
    }

    /// Successful writes so far.
    pub fn writes(&self) -> u32 {
        self.0.writes.get()
    }

    fn write(&self, operation: &'static str) -> Result<(), ControlError> {
        let failing = self.0.failing_writes.get();
        if failing > 0 {
            self.0.failing_writes.set(failing - 1);
            return Err(ControlError::Rejected {
                surface: Surface::Element,
                operation,
                reason: "injected failure".to_string(),
            });
        }
        self.0.writes.set(self.0.writes.get() + 1);
        Ok(())
    }
}

impl MediaElement for FakeMedia {
    fn volume(&self) -> f64 {
        self.0.volume.get()
    }

    fn set_volume(&self, volume: f64) -> Result<(), ControlError> {
        self.write("set volume")?;
        self.0.volume.set(volume);
        Ok(())
    }

    fn muted(&self) -> bool {
        self.0.muted.get()
    }

    fn set_muted(&self, muted: bool) -> Result<(), ControlError> {
        self.write("set muted")?;
        self.0.muted.set(muted);
        Ok(())
    }

    fn source_url(&self) -> Option<String> {
        self.0.src.borrow().clone()
    }

    fn is_connected(&self) -> bool {
        self.0.connected.get()
    }

    fn is_media(&self) -> bool {
        self.0.is_media.get()
    }
}

// =============================================================================
// Fake rich player
// =============================================================================

#[derive(Debug)]
struct PlayerState {
    muted: Cell<bool>,
    volume: Cell<u8>,
    ad_state: Cell<Option<bool>>,
    failing: Cell<bool>,
}

#[derive(Debug, Clone)]
pub struct FakePlayer(Rc<PlayerState>);

impl FakePlayer {
    pub fn new() -> Self {
        Self(Rc::new(PlayerState {
            muted: Cell::new(false),
            volume: Cell::new(100),
            ad_state: Cell::new(None),
            failing: Cell::new(false),
        }))
    }

    pub fn set_ad_state(&self, state: Option<bool>) {
        self.0.ad_state.set(state);
    }

    /// Every call throws while set.
    pub fn set_failing(&self, failing: bool) {
        self.0.failing.set(failing);
    }

    pub fn is_muted(&self) -> bool {
        self.0.muted.get()
    }

    pub fn volume(&self) -> u8 {
        self.0.volume.get()
    }

    fn call(&self, operation: &'static str) -> Result<(), ControlError> {
        if self.0.failing.get() {
            return Err(ControlError::Rejected {
                surface: Surface::RichPlayer,
                operation,
                reason: "player API threw".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FakePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl RichPlayerControl for FakePlayer {
    fn mute(&self) -> Result<(), ControlError> {
        self.call("mute")?;
        self.0.muted.set(true);
        Ok(())
    }

    fn unmute(&self) -> Result<(), ControlError> {
        self.call("unMute")?;
        self.0.muted.set(false);
        Ok(())
    }

    fn set_volume(&self, percent: u8) -> Result<(), ControlError> {
        self.call("setVolume")?;
        self.0.volume.set(percent);
        Ok(())
    }

    fn ad_state(&self) -> Option<bool> {
        self.0.ad_state.get()
    }
}

// =============================================================================
// Static page
// =============================================================================

/// A page whose selectors match literally.
#[derive(Debug, Clone, Default)]
pub struct StaticPage {
    location: String,
    elements: Vec<ElementFixture>,
    media: Vec<(String, FakeMedia)>,
    players: Vec<(String, FakePlayer)>,
}

impl StaticPage {
    pub fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            ..Self::default()
        }
    }

    pub fn from_fixture(fixture: &PageFixture) -> Self {
        let mut page = Self::new(&fixture.location);
        page.elements = fixture.elements.clone();
        if let Some(media) = &fixture.media {
            page = page.with_media(&media.selector, FakeMedia::from_fixture(media));
        }
        if let Some(player) = &fixture.player {
            let fake = FakePlayer::new();
            fake.set_ad_state(player.ad_state);
            page = page.with_player(&player.selector, fake);
        }
        page
    }

    pub fn with_element(mut self, selector: &str) -> Self {
        self.push(selector, true, None);
        self
    }

    /// Present in the DOM but not rendered.
    pub fn with_hidden(mut self, selector: &str) -> Self {
        self.push(selector, false, None);
        self
    }

    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.push(selector, true, Some(text.to_string()));
        self
    }

    pub fn with_attribute(mut self, selector: &str, name: &str, value: &str) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(name.to_string(), value.to_string());
        self.elements.push(ElementFixture {
            selector: selector.to_string(),
            rendered: true,
            text: None,
            attributes,
        });
        self
    }

    /// Replaces any media already registered under `selector`.
    pub fn with_media(mut self, selector: &str, media: FakeMedia) -> Self {
        self.media.retain(|(s, _)| s != selector);
        self.media.push((selector.to_string(), media));
        self
    }

    pub fn with_player(mut self, selector: &str, player: FakePlayer) -> Self {
        self.players.retain(|(s, _)| s != selector);
        self.players.push((selector.to_string(), player));
        self
    }

    /// Swap the element list, keeping media and players.
    pub fn set_elements(&mut self, elements: Vec<ElementFixture>) {
        self.elements = elements;
    }

    pub fn set_location(&mut self, location: &str) {
        self.location = location.to_string();
    }

    pub fn media(&self, selector: &str) -> Option<&FakeMedia> {
        self.media.iter().find(|(s, _)| s == selector).map(|(_, m)| m)
    }

    fn push(&mut self, selector: &str, rendered: bool, text: Option<String>) {
        self.elements.push(ElementFixture {
            selector: selector.to_string(),
            rendered,
            text,
            attributes: BTreeMap::new(),
        });
    }

    fn matching<'a>(&'a self, selector: &'a str) -> impl Iterator<Item = &'a ElementFixture> + 'a {
        self.elements.iter().filter(move |e| e.selector == selector)
    }
}

impl Document for StaticPage {
    type Media = FakeMedia;
    type Player = FakePlayer;

    fn exists(&self, selector: &str) -> bool {
        self.matching(selector).next().is_some()
    }

    fn any_rendered(&self, selector: &str) -> bool {
        self.matching(selector).any(|e| e.rendered)
    }

    fn rendered_texts(&self, selector: &str) -> Vec<String> {
        self.matching(selector)
            .filter(|e| e.rendered)
            .filter_map(|e| e.text.clone())
            .collect()
    }

    fn attribute(&self, selector: &str, name: &str) -> Option<String> {
        self.matching(selector).next()?.attributes.get(name).cloned()
    }

    fn find_media(&self, selector: &str) -> Option<FakeMedia> {
        self.media(selector).cloned()
    }

    fn find_player(&self, selector: &str) -> Option<FakePlayer> {
        self.players
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, p)| p.clone())
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}
