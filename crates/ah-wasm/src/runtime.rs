//! Browser wiring for the change watcher.
//!
//! Owns every observer, timer and listener, and funnels all of them into
//! [`Engine::handle`]. Callbacks hold a `Weak` to the runtime so a stopped
//! runtime is dropped even while timers are still queued.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use js_sys::Array;
use log::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{HtmlMediaElement, MutationObserver, MutationObserverInit, Window};

use ah_core::{Directives, Engine, EngineConfig, EngineSnapshot, MediaEvent, Trigger};

use crate::control;
use crate::dom::{WebDocument, WebMedia, WebPlayer};

type WebEngine = Engine<WebMedia, WebPlayer>;

struct MediaListeners {
    element: HtmlMediaElement,
    loaded: Closure<dyn FnMut()>,
    volume: Closure<dyn FnMut()>,
}

impl MediaListeners {
    fn detach(&self) {
        let _ = self
            .element
            .remove_event_listener_with_callback("loadeddata", self.loaded.as_ref().unchecked_ref());
        let _ = self
            .element
            .remove_event_listener_with_callback("volumechange", self.volume.as_ref().unchecked_ref());
    }
}

pub struct Runtime {
    window: Window,
    doc: WebDocument,
    engine: RefCell<WebEngine>,
    observer: RefCell<Option<(MutationObserver, Closure<dyn FnMut()>)>>,
    media_listeners: RefCell<Option<MediaListeners>>,
    intervals: RefCell<Vec<(i32, Closure<dyn FnMut()>)>>,
    navigation_listener: RefCell<Option<(String, Closure<dyn FnMut()>)>>,
    preference_listener: RefCell<Option<Closure<dyn FnMut(JsValue, JsValue)>>>,
    acquire_pending: Cell<bool>,
    /// Generation whose settle timer is still outstanding
    pending_settle: Cell<Option<u64>>,
}

impl Runtime {
    pub fn new(config: EngineConfig) -> Result<Rc<Self>, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("No document"))?;
        let location = window.location().href().unwrap_or_default();

        Ok(Rc::new(Self {
            doc: WebDocument::new(window.clone(), document),
            window,
            engine: RefCell::new(Engine::new(config, &location)),
            observer: RefCell::new(None),
            media_listeners: RefCell::new(None),
            intervals: RefCell::new(Vec::new()),
            navigation_listener: RefCell::new(None),
            preference_listener: RefCell::new(None),
            acquire_pending: Cell::new(false),
            pending_settle: Cell::new(None),
        }))
    }

    /// Wire everything up once the page had `delay` to build its player.
    pub fn start(self: &Rc<Self>, delay: Duration) -> Result<(), JsValue> {
        self.watch_preference()?;
        self.listen_for_navigation()?;
        self.start_intervals()?;

        let weak = Rc::downgrade(self);
        self.schedule(delay, move || {
            if let Some(rt) = weak.upgrade() {
                rt.subscribe();
                rt.dispatch(Trigger::Timer);
            }
        });
        Ok(())
    }

    /// Tear down every observer, timer and listener.
    pub fn stop(&self) {
        match self.engine.try_borrow_mut() {
            Ok(mut engine) => engine.stand_down(),
            Err(_) => warn!("Engine busy during teardown, audio left as is"),
        }
        self.disconnect_observer();
        self.detach_media_listeners();
        self.pending_settle.set(None);
        for (handle, _closure) in self.intervals.borrow_mut().drain(..) {
            self.window.clear_interval_with_handle(handle);
        }
        if let Some((event, closure)) = self.navigation_listener.borrow_mut().take() {
            let _ = self
                .window
                .remove_event_listener_with_callback(&event, closure.as_ref().unchecked_ref());
        }
        if let Some(listener) = self.preference_listener.borrow_mut().take() {
            if let Err(e) = control::unwatch_enabled(&listener) {
                warn!("Failed to remove preference listener: {e:?}");
            }
        }
    }

    pub fn snapshot(&self) -> Option<EngineSnapshot> {
        self.engine.try_borrow().ok().map(|e| e.snapshot())
    }

    pub fn set_enabled(self: &Rc<Self>, enabled: bool) {
        let directives = match self.engine.try_borrow_mut() {
            Ok(mut engine) => engine.set_enabled(&self.doc, enabled),
            Err(_) => {
                warn!("Engine busy, preference change deferred");
                let weak = Rc::downgrade(self);
                self.schedule(Duration::ZERO, move || {
                    if let Some(rt) = weak.upgrade() {
                        rt.set_enabled(enabled);
                    }
                });
                return;
            }
        };
        self.apply(directives);
    }

    /// Single evaluation path for every trigger source.
    pub fn dispatch(self: &Rc<Self>, trigger: Trigger) {
        let directives = match self.engine.try_borrow_mut() {
            Ok(mut engine) => engine.handle(&self.doc, trigger),
            Err(_) => {
                debug!("Engine busy, skipping {} evaluation", trigger.as_str());
                return;
            }
        };
        self.apply(directives);
    }

    fn apply(self: &Rc<Self>, directives: Directives) {
        if directives.attach_listeners {
            self.attach_media_listeners();
        }

        if let Some(delay) = directives.retry_acquire {
            if !self.acquire_pending.replace(true) {
                let weak = Rc::downgrade(self);
                self.schedule(delay, move || {
                    if let Some(rt) = weak.upgrade() {
                        rt.acquire_pending.set(false);
                        rt.dispatch(Trigger::Timer);
                    }
                });
            }
        }

        if let Some(token) = directives.verify {
            let weak = Rc::downgrade(self);
            self.schedule(token.delay, move || {
                if let Some(rt) = weak.upgrade() {
                    rt.dispatch(Trigger::Verify(token));
                }
            });
        }
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    fn poll_navigation(self: &Rc<Self>) {
        let settle = match self.engine.try_borrow_mut() {
            Ok(mut engine) => engine
                .poll_navigation(&self.doc)
                .then(|| (engine.generation(), engine.config().watch.navigation_settle())),
            Err(_) => return,
        };
        if let Some((generation, delay)) = settle {
            self.after_navigation(generation, delay);
        }
    }

    fn navigation_started(self: &Rc<Self>) {
        let (generation, delay) = match self.engine.try_borrow_mut() {
            Ok(mut engine) => {
                engine.navigation_started(&self.doc);
                (engine.generation(), engine.config().watch.navigation_settle())
            }
            Err(_) => return,
        };
        self.after_navigation(generation, delay);
    }

    /// Drop page-bound subscriptions and come back once the new page settled.
    fn after_navigation(self: &Rc<Self>, generation: u64, settle: Duration) {
        self.disconnect_observer();
        self.detach_media_listeners();
        self.pending_settle.set(Some(generation));

        let weak = Rc::downgrade(self);
        self.schedule(settle, move || {
            let Some(rt) = weak.upgrade() else {
                return;
            };
            // A later navigation superseded this one.
            if rt.pending_settle.get() != Some(generation) {
                return;
            }
            rt.pending_settle.set(None);
            rt.subscribe();
            rt.dispatch(Trigger::Navigation);
        });
    }

    fn listen_for_navigation(self: &Rc<Self>) -> Result<(), JsValue> {
        let Some(event) = self.engine.borrow().config().watch.navigation_event.clone() else {
            return Ok(());
        };
        let weak = Rc::downgrade(self);
        let closure = Closure::<dyn FnMut()>::new(move || {
            if let Some(rt) = weak.upgrade() {
                rt.navigation_started();
            }
        });
        self.window
            .add_event_listener_with_callback(&event, closure.as_ref().unchecked_ref())?;
        *self.navigation_listener.borrow_mut() = Some((event, closure));
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Observe the player container with the full filter, and the whole
    /// document with a class-only filter for overlays injected elsewhere.
    fn subscribe(self: &Rc<Self>) {
        self.disconnect_observer();

        let weak = Rc::downgrade(self);
        let callback = Closure::<dyn FnMut()>::new(move || {
            if let Some(rt) = weak.upgrade() {
                rt.dispatch(Trigger::Mutation);
            }
        });
        let observer = match MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(e) => {
                warn!("MutationObserver unavailable: {e:?}");
                return;
            }
        };

        let watch = self.engine.borrow().config().watch.clone();
        let document = self.doc.document();

        let container = watch
            .container_selectors
            .iter()
            .find_map(|s| document.query_selector(s).ok().flatten());
        if let Some(container) = container {
            let options = MutationObserverInit::new();
            options.set_child_list(true);
            options.set_subtree(true);
            options.set_attributes(true);
            if let Err(e) = observer.observe_with_options(&container, &options) {
                warn!("Failed to observe player container: {e:?}");
            }
        } else {
            debug!("Player container not found yet, relying on document observer");
        }

        if let Some(body) = document.body() {
            let filter: Array = watch
                .document_attribute_filter
                .iter()
                .map(|name| JsValue::from_str(name))
                .collect();
            let options = MutationObserverInit::new();
            options.set_child_list(true);
            options.set_subtree(true);
            options.set_attributes(true);
            options.set_attribute_filter(&filter);
            if let Err(e) = observer.observe_with_options(&body, &options) {
                warn!("Failed to observe document body: {e:?}");
            }
        }

        *self.observer.borrow_mut() = Some((observer, callback));
    }

    /// Media listeners are left alone; they follow the target, not the
    /// observers.
    fn disconnect_observer(&self) {
        if let Some((observer, _callback)) = self.observer.borrow_mut().take() {
            observer.disconnect();
        }
    }

    fn detach_media_listeners(&self) {
        if let Some(listeners) = self.media_listeners.borrow_mut().take() {
            listeners.detach();
        }
    }

    fn attach_media_listeners(self: &Rc<Self>) {
        let element = {
            let Ok(engine) = self.engine.try_borrow() else {
                return;
            };
            match engine.target() {
                Some(target) => target.media.element().clone(),
                None => return,
            }
        };

        self.detach_media_listeners();

        let loaded = self.trigger_closure(Trigger::Media(MediaEvent::LoadedData));
        let volume = self.trigger_closure(Trigger::Media(MediaEvent::VolumeChange));
        let attached = element
            .add_event_listener_with_callback("loadeddata", loaded.as_ref().unchecked_ref())
            .and_then(|()| {
                element.add_event_listener_with_callback("volumechange", volume.as_ref().unchecked_ref())
            });
        if let Err(e) = attached {
            warn!("Failed to attach media listeners: {e:?}");
        }

        *self.media_listeners.borrow_mut() = Some(MediaListeners { element, loaded, volume });
    }

    // -------------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------------

    fn start_intervals(self: &Rc<Self>) -> Result<(), JsValue> {
        let watch = self.engine.borrow().config().watch.clone();

        let fallback = self.trigger_closure(Trigger::Timer);
        self.every(watch.fallback_interval(), fallback)?;

        let weak = Rc::downgrade(self);
        let poll = Closure::<dyn FnMut()>::new(move || {
            if let Some(rt) = weak.upgrade() {
                rt.poll_navigation();
            }
        });
        self.every(watch.navigation_poll(), poll)
    }

    fn every(&self, period: Duration, closure: Closure<dyn FnMut()>) -> Result<(), JsValue> {
        let handle = self.window.set_interval_with_callback_and_timeout_and_arguments_0(
            closure.as_ref().unchecked_ref(),
            millis(period),
        )?;
        self.intervals.borrow_mut().push((handle, closure));
        Ok(())
    }

    /// One-shot timer. Failure to schedule is logged, never fatal.
    fn schedule(&self, delay: Duration, f: impl FnOnce() + 'static) {
        let callback = Closure::once_into_js(f);
        if let Err(e) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis(delay))
        {
            warn!("Failed to schedule timer: {e:?}");
        }
    }

    fn trigger_closure(self: &Rc<Self>, trigger: Trigger) -> Closure<dyn FnMut()> {
        let weak: Weak<Self> = Rc::downgrade(self);
        Closure::<dyn FnMut()>::new(move || {
            if let Some(rt) = weak.upgrade() {
                rt.dispatch(trigger);
            }
        })
    }

    fn watch_preference(self: &Rc<Self>) -> Result<(), JsValue> {
        let weak = Rc::downgrade(self);
        control::read_enabled(move |enabled| {
            if let Some(rt) = weak.upgrade() {
                rt.set_enabled(enabled);
            }
        })?;

        let weak = Rc::downgrade(self);
        let listener = control::watch_enabled(move |enabled| {
            if let Some(rt) = weak.upgrade() {
                rt.set_enabled(enabled);
            }
        })?;
        *self.preference_listener.borrow_mut() = listener;
        Ok(())
    }
}

fn millis(duration: Duration) -> i32 {
    duration.as_millis().min(i32::MAX as u128) as i32
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use wasm_bindgen_test::*;
    use web_sys::Element;

    use super::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn mount(html: &str) -> Element {
        let document = web_sys::window().unwrap().document().unwrap();
        let root = document.create_element("div").unwrap();
        root.set_inner_html(html);
        document.body().unwrap().append_child(&root).unwrap();
        root
    }

    fn video(root: &Element) -> HtmlMediaElement {
        root.query_selector("video").unwrap().unwrap().dyn_into().unwrap()
    }

    #[wasm_bindgen_test]
    fn media_listeners_survive_resubscribe() {
        let root = mount("<video></video>");
        let rt = Runtime::new(EngineConfig::default()).unwrap();

        rt.dispatch(Trigger::Timer);
        assert!(rt.media_listeners.borrow().is_some());

        rt.subscribe();
        rt.dispatch(Trigger::Timer);
        assert!(rt.observer.borrow().is_some());
        assert!(rt.media_listeners.borrow().is_some());

        rt.stop();
        assert!(rt.media_listeners.borrow().is_none());
        root.remove();
    }

    #[wasm_bindgen_test]
    fn stop_gives_audio_back() {
        let root = mount(r#"<div id="movie_player" class="ad-showing"><video></video></div>"#);
        let element = video(&root);
        element.set_volume(0.6);
        let rt = Runtime::new(EngineConfig::default()).unwrap();

        rt.dispatch(Trigger::Mutation);
        assert!(element.muted());
        assert_eq!(element.volume(), 0.0);

        rt.stop();
        assert!(!element.muted());
        assert_eq!(element.volume(), 0.6);
        root.remove();
    }

    #[wasm_bindgen_test]
    fn navigation_always_schedules_settle() {
        let root = mount("<video></video>");
        let rt = Runtime::new(EngineConfig::default()).unwrap();
        rt.dispatch(Trigger::Timer);

        rt.navigation_started();
        assert_eq!(rt.pending_settle.get(), Some(1));
        assert!(rt.media_listeners.borrow().is_none());

        rt.stop();
        assert_eq!(rt.pending_settle.get(), None);
        root.remove();
    }
}
