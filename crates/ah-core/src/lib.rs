//! AdHush Core Library
//!
//! This crate provides the ad detection and audio suppression engine for the
//! AdHush content script. It has no DOM dependency: the browser runtime
//! (`ah-wasm`) implements [`page::Document`] over `web_sys`, and the engine
//! tells it what to schedule through [`types::Directives`].
//!
//! # Architecture
//!
//! Every trigger (DOM mutation, fallback timer, navigation, media event,
//! verification timer, preference change) goes through [`Engine::handle`],
//! which re-validates the tracked player, probes the document for ad
//! indicators and drives the two-state audio suppressor.
//!
//! # Modules
//!
//! - `probe`: Signal Probe, stateless ad detection
//! - `player`: Player Handle, media element and rich player acquisition
//! - `suppressor`: Audio Suppressor state machine and retry policy
//! - `watcher`: Navigation epoch for the change watcher
//! - `engine`: Ties the above together behind one evaluation entry point
//! - `config`: JSON-overridable selectors, hints and delays
//! - `fixture`: In-memory page used by tests and the CLI
//! - `types`: Shared type definitions

pub mod config;
pub mod engine;
pub mod fixture;
pub mod page;
pub mod player;
pub mod probe;
pub mod suppressor;
pub mod types;
pub mod watcher;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineSnapshot};
pub use page::Document;
pub use player::{ControlError, MediaElement, RichPlayerControl, Surface};
pub use types::{AdState, Directives, Indicators, MediaEvent, Trigger, VerifyToken};
