//! `web_sys` implementations of the engine's document and control traits.

use js_sys::{Function, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, HtmlMediaElement, Window};

use ah_core::player::{ControlError, MediaElement, RichPlayerControl, Surface};
use ah_core::probe::is_rendered;
use ah_core::Document;

// =============================================================================
// Document
// =============================================================================

pub struct WebDocument {
    window: Window,
    document: web_sys::Document,
}

impl WebDocument {
    pub fn new(window: Window, document: web_sys::Document) -> Self {
        Self { window, document }
    }

    pub fn document(&self) -> &web_sys::Document {
        &self.document
    }

    fn first(&self, selector: &str) -> Option<Element> {
        // An invalid selector (markup override gone wrong) matches nothing.
        self.document.query_selector(selector).ok().flatten()
    }

    fn all(&self, selector: &str) -> Vec<Element> {
        let Ok(list) = self.document.query_selector_all(selector) else {
            return Vec::new();
        };
        (0..list.length())
            .filter_map(|i| list.get(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect()
    }

    fn rendered(&self, element: &Element) -> bool {
        let rect = element.get_bounding_client_rect();
        let Ok(Some(style)) = self.window.get_computed_style(element) else {
            return false;
        };
        let display = style.get_property_value("display").unwrap_or_default();
        let visibility = style.get_property_value("visibility").unwrap_or_default();
        is_rendered(rect.width(), rect.height(), &display, &visibility)
    }
}

impl Document for WebDocument {
    type Media = WebMedia;
    type Player = WebPlayer;

    fn exists(&self, selector: &str) -> bool {
        self.first(selector).is_some()
    }

    fn any_rendered(&self, selector: &str) -> bool {
        self.all(selector).iter().any(|e| self.rendered(e))
    }

    fn rendered_texts(&self, selector: &str) -> Vec<String> {
        self.all(selector)
            .iter()
            .filter(|e| self.rendered(e))
            .filter_map(|e| e.text_content())
            .collect()
    }

    fn attribute(&self, selector: &str, name: &str) -> Option<String> {
        self.first(selector)?.get_attribute(name)
    }

    fn find_media(&self, selector: &str) -> Option<WebMedia> {
        self.first(selector)?
            .dyn_into::<HtmlMediaElement>()
            .ok()
            .map(WebMedia)
    }

    fn find_player(&self, selector: &str) -> Option<WebPlayer> {
        let element = self.first(selector)?;
        let player = WebPlayer(element);
        player.has_api().then_some(player)
    }

    fn location(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }
}

// =============================================================================
// Media element
// =============================================================================

#[derive(Clone)]
pub struct WebMedia(HtmlMediaElement);

impl WebMedia {
    pub fn element(&self) -> &HtmlMediaElement {
        &self.0
    }

    /// Property writes go through `Reflect.set` so a throwing setter comes
    /// back as an error instead of unwinding through wasm.
    fn write(&self, property: &str, value: JsValue, operation: &'static str) -> Result<(), ControlError> {
        match Reflect::set(&self.0, &JsValue::from_str(property), &value) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ControlError::Rejected {
                surface: Surface::Element,
                operation,
                reason: format!("{property} is not writable"),
            }),
            Err(e) => Err(ControlError::Rejected {
                surface: Surface::Element,
                operation,
                reason: describe(&e),
            }),
        }
    }
}

impl MediaElement for WebMedia {
    fn volume(&self) -> f64 {
        self.0.volume()
    }

    fn set_volume(&self, volume: f64) -> Result<(), ControlError> {
        self.write("volume", JsValue::from_f64(volume), "set volume")
    }

    fn muted(&self) -> bool {
        self.0.muted()
    }

    fn set_muted(&self, muted: bool) -> Result<(), ControlError> {
        self.write("muted", JsValue::from_bool(muted), "set muted")
    }

    fn source_url(&self) -> Option<String> {
        let current = self.0.current_src();
        if !current.is_empty() {
            return Some(current);
        }
        let src = self.0.src();
        (!src.is_empty()).then_some(src)
    }

    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }

    fn is_media(&self) -> bool {
        matches!(self.0.tag_name().as_str(), "VIDEO" | "AUDIO")
    }
}

// =============================================================================
// Rich player API
// =============================================================================

/// The host player element, with its scripting methods looked up on every
/// call. The page can swap them out at any time.
#[derive(Clone)]
pub struct WebPlayer(Element);

const AD_STATE_PLAYING: f64 = 1.0;

impl WebPlayer {
    fn method(&self, name: &str) -> Option<Function> {
        Reflect::get(&self.0, &JsValue::from_str(name))
            .ok()?
            .dyn_into::<Function>()
            .ok()
    }

    fn has_api(&self) -> bool {
        ["mute", "unMute", "setVolume", "getAdState"]
            .iter()
            .any(|name| self.method(name).is_some())
    }

    fn call(&self, name: &'static str, args: &[JsValue]) -> Result<JsValue, ControlError> {
        let function = self.method(name).ok_or(ControlError::Unsupported {
            surface: Surface::RichPlayer,
            operation: name,
        })?;
        let result = match args {
            [] => function.call0(&self.0),
            [arg] => function.call1(&self.0, arg),
            _ => function.apply(&self.0, &args.iter().collect::<js_sys::Array>()),
        };
        result.map_err(|e| ControlError::Rejected {
            surface: Surface::RichPlayer,
            operation: name,
            reason: describe(&e),
        })
    }
}

impl RichPlayerControl for WebPlayer {
    fn mute(&self) -> Result<(), ControlError> {
        self.call("mute", &[]).map(drop)
    }

    fn unmute(&self) -> Result<(), ControlError> {
        self.call("unMute", &[]).map(drop)
    }

    fn set_volume(&self, percent: u8) -> Result<(), ControlError> {
        self.call("setVolume", &[JsValue::from(percent)]).map(drop)
    }

    fn ad_state(&self) -> Option<bool> {
        let state = self.call("getAdState", &[]).ok()?.as_f64()?;
        Some(state == AD_STATE_PLAYING)
    }
}

fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{value:?}"))
}
