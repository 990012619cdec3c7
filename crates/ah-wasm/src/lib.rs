//! WebAssembly content script for AdHush
//!
//! The extension's loader calls [`start`] once per page; everything else is
//! driven by DOM observers and timers owned by the runtime.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use log::{error, info, LevelFilter};
use wasm_bindgen::prelude::*;

use ah_core::EngineConfig;

pub mod control;
pub mod dom;
mod logger;
mod runtime;

use runtime::Runtime;

/// Delay before the first evaluation when the page is already loaded.
const READY_START_DELAY: Duration = Duration::from_millis(500);

thread_local! {
    static RUNTIME: RefCell<Option<Rc<Runtime>>> = const { RefCell::new(None) };
}

#[wasm_bindgen]
pub fn start(config_json: Option<String>, debug: Option<bool>) -> Result<(), JsValue> {
    logger::init(if debug.unwrap_or(false) { LevelFilter::Debug } else { LevelFilter::Info });

    if is_running() {
        return Err(JsValue::from_str("Already started. Reload the page to restart."));
    }

    let config = match config_json.as_deref() {
        Some(text) => EngineConfig::from_json(text).unwrap_or_else(|e| {
            error!("Ignoring config override: {e}");
            EngineConfig::default()
        }),
        None => EngineConfig::default(),
    };

    let delay = start_delay(&config)?;
    let runtime = Runtime::new(config)?;
    runtime.start(delay)?;
    RUNTIME.with(|slot| *slot.borrow_mut() = Some(runtime));

    info!("Ad audio suppression loaded");
    Ok(())
}

#[wasm_bindgen]
pub fn stop() {
    if let Some(runtime) = RUNTIME.with(|slot| slot.borrow_mut().take()) {
        runtime.stop();
    }
}

#[wasm_bindgen]
pub fn is_running() -> bool {
    RUNTIME.with(|slot| slot.borrow().is_some())
}

/// Control surface hook for loaders that manage the preference themselves.
#[wasm_bindgen]
pub fn set_enabled(enabled: bool) {
    if let Some(runtime) = RUNTIME.with(|slot| slot.borrow().clone()) {
        runtime.set_enabled(enabled);
    }
}

/// Read-only state for debug displays.
#[wasm_bindgen]
pub fn snapshot() -> JsValue {
    let result = js_sys::Object::new();
    let Some(snapshot) = RUNTIME.with(|slot| slot.borrow().as_ref().and_then(|rt| rt.snapshot())) else {
        let _ = js_sys::Reflect::set(&result, &"running".into(), &JsValue::from(false));
        return result.into();
    };

    let _ = js_sys::Reflect::set(&result, &"running".into(), &JsValue::from(true));
    let _ = js_sys::Reflect::set(&result, &"adState".into(), &JsValue::from_str(snapshot.ad_state.as_str()));
    let _ = js_sys::Reflect::set(&result, &"isSuppressing".into(), &JsValue::from(snapshot.is_suppressing));
    let _ = js_sys::Reflect::set(&result, &"retryCount".into(), &JsValue::from(snapshot.retry_count));
    let _ = js_sys::Reflect::set(&result, &"enabled".into(), &JsValue::from(snapshot.enabled));
    let _ = js_sys::Reflect::set(&result, &"hasTarget".into(), &JsValue::from(snapshot.has_target));
    let _ = js_sys::Reflect::set(&result, &"generation".into(), &JsValue::from(snapshot.generation as f64));
    if let Some(volume) = snapshot.saved_volume {
        let _ = js_sys::Reflect::set(&result, &"savedVolume".into(), &JsValue::from(volume));
    }

    let indicators = js_sys::Object::new();
    for indicator in &snapshot.indicators {
        let _ = js_sys::Reflect::set(&indicators, &indicator.name.into(), &JsValue::from(indicator.found));
    }
    let _ = js_sys::Reflect::set(&result, &"indicators".into(), &indicators);

    result.into()
}

#[wasm_bindgen]
pub fn default_config() -> String {
    EngineConfig::default().to_json_pretty()
}

/// Give a page that is still loading the full settle delay, one that is
/// already interactive a shorter one.
fn start_delay(config: &EngineConfig) -> Result<Duration, JsValue> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("No document"))?;
    Ok(match document.ready_state().as_str() {
        "complete" | "interactive" => READY_START_DELAY,
        _ => config.watch.navigation_settle(),
    })
}
