//! Enabled/disabled preference, stored by the popup in `chrome.storage.sync`.
//!
//! Everything here is optional: outside an extension context (tests, a plain
//! page loading the bundle) there is no `chrome` global and the engine simply
//! stays enabled.

use js_sys::{Array, Function, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

pub const ENABLED_KEY: &str = "extensionEnabled";

/// A missing preference means enabled; only an explicit `false` disables.
pub fn is_enabled_value(value: &JsValue) -> bool {
    value.as_bool() != Some(false)
}

fn lookup(root: &JsValue, path: &[&str]) -> Option<JsValue> {
    let mut current = root.clone();
    for key in path {
        current = Reflect::get(&current, &JsValue::from_str(key)).ok()?;
        if current.is_undefined() || current.is_null() {
            return None;
        }
    }
    Some(current)
}

/// Read the stored preference once.
pub fn read_enabled(on_value: impl FnOnce(bool) + 'static) -> Result<(), JsValue> {
    let Some(sync) = lookup(&js_sys::global(), &["chrome", "storage", "sync"]) else {
        return Ok(());
    };
    let get: Function = Reflect::get(&sync, &JsValue::from_str("get"))?.dyn_into()?;

    let keys = Array::of1(&JsValue::from_str(ENABLED_KEY));
    let callback = Closure::once_into_js(move |data: JsValue| {
        let value = Reflect::get(&data, &JsValue::from_str(ENABLED_KEY)).unwrap_or(JsValue::UNDEFINED);
        on_value(is_enabled_value(&value));
    });
    get.call2(&sync, &keys, &callback)?;
    Ok(())
}

/// Subscribe to preference changes. The returned closure must be kept alive
/// for as long as the listener should fire.
pub fn watch_enabled(
    on_change: impl Fn(bool) + 'static,
) -> Result<Option<Closure<dyn FnMut(JsValue, JsValue)>>, JsValue> {
    let Some(on_changed) = lookup(&js_sys::global(), &["chrome", "storage", "onChanged"]) else {
        return Ok(None);
    };
    let add: Function = Reflect::get(&on_changed, &JsValue::from_str("addListener"))?.dyn_into()?;

    let listener = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |changes: JsValue, area: JsValue| {
        if area.as_string().as_deref() != Some("sync") {
            return;
        }
        if let Some(change) = lookup(&changes, &[ENABLED_KEY]) {
            let value = Reflect::get(&change, &JsValue::from_str("newValue")).unwrap_or(JsValue::UNDEFINED);
            on_change(is_enabled_value(&value));
        }
    });
    add.call1(&on_changed, listener.as_ref().unchecked_ref())?;
    Ok(Some(listener))
}

/// Undo [`watch_enabled`]. The closure may be dropped afterwards.
pub fn unwatch_enabled(listener: &Closure<dyn FnMut(JsValue, JsValue)>) -> Result<(), JsValue> {
    let Some(on_changed) = lookup(&js_sys::global(), &["chrome", "storage", "onChanged"]) else {
        return Ok(());
    };
    let remove: Function = Reflect::get(&on_changed, &JsValue::from_str("removeListener"))?.dyn_into()?;
    remove.call1(&on_changed, listener.as_ref().unchecked_ref())?;
    Ok(())
}
