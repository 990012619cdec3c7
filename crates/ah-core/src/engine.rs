//! Evaluation engine
//!
//! One entry point for every trigger: acquire (or re-validate) the target,
//! probe the document, drive the suppressor, and tell the runtime what to
//! schedule next. The runtime owns the clock; the engine owns the state.

use log::debug;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::page::Document;
use crate::player::{Acquisition, MediaElement, PlaybackTarget, PlayerHandle, RichPlayerControl};
use crate::probe::{evaluate, Probe};
use crate::suppressor::{AudioSuppressor, Step, SuppressionRecord};
use crate::types::{AdState, Directives, MediaEvent, Trigger, VerifyToken};
use crate::watcher::NavigationEpoch;

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorResult {
    pub name: &'static str,
    pub found: bool,
}

/// Read-only view for debug surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub ad_state: AdState,
    pub is_suppressing: bool,
    pub saved_volume: Option<f64>,
    pub retry_count: u32,
    pub generation: u64,
    pub enabled: bool,
    pub has_target: bool,
    pub indicators: Vec<IndicatorResult>,
}

// =============================================================================
// Engine
// =============================================================================

pub struct Engine<M, P> {
    config: EngineConfig,
    player: PlayerHandle<M, P>,
    suppressor: AudioSuppressor,
    epoch: NavigationEpoch,
    /// Last state the suppressor acted on
    previous: AdState,
    last_probe: Probe,
    enabled: bool,
}

impl<M: MediaElement, P: RichPlayerControl> Engine<M, P> {
    pub fn new(config: EngineConfig, location: &str) -> Self {
        Self {
            player: PlayerHandle::new(config.player.clone()),
            suppressor: AudioSuppressor::new(config.suppression.clone()),
            epoch: NavigationEpoch::new(location),
            previous: AdState::Content,
            last_probe: Probe::default(),
            enabled: true,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.epoch.generation
    }

    pub fn record(&self) -> &SuppressionRecord {
        self.suppressor.record()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn last_probe(&self) -> Probe {
        self.last_probe
    }

    pub fn target(&self) -> Option<&PlaybackTarget<M, P>> {
        self.player.target()
    }

    /// Evaluate the page in response to `trigger`.
    pub fn handle<D>(&mut self, doc: &D, trigger: Trigger) -> Directives
    where
        D: Document<Media = M, Player = P>,
    {
        if let Trigger::Verify(token) = trigger {
            if !self.epoch.is_current(token.generation) {
                debug!("Dropping verification from generation {}", token.generation);
                return Directives::none();
            }
        }

        let mut directives = Directives::none();
        match self.player.acquire(doc, self.epoch.generation) {
            Acquisition::Acquired => directives.attach_listeners = true,
            Acquisition::Held => {}
            Acquisition::NotReady => {
                self.last_probe = evaluate(doc, None, &self.config.probe);
                directives.retry_acquire = Some(self.config.player.acquire_retry());
                return directives;
            }
        }

        let Some(target) = self.player.target() else {
            return directives;
        };

        let probe = evaluate(doc, Some(target), &self.config.probe);
        self.last_probe = probe;

        if !self.enabled {
            return directives;
        }

        if probe.state != self.previous {
            debug!(
                "Ad state {} -> {} via {}",
                self.previous.as_str(),
                probe.state.as_str(),
                trigger.as_str()
            );
        }

        let step = if probe.state != self.previous {
            self.suppressor.on_ad_state_change(self.previous, probe.state, target)
        } else {
            match trigger {
                Trigger::Verify(_) => self.suppressor.verify(probe.state, target),
                Trigger::Media(MediaEvent::VolumeChange) => {
                    self.suppressor.on_volume_change(probe.state, target)
                }
                _ => self.suppressor.on_ad_state_change(self.previous, probe.state, target),
            }
        };
        self.previous = probe.state;

        directives.verify = self.verify_token(step);
        directives
    }

    /// Apply the user's enabled preference. Disabling mid-episode gives the
    /// audio back right away.
    pub fn set_enabled<D>(&mut self, doc: &D, enabled: bool) -> Directives
    where
        D: Document<Media = M, Player = P>,
    {
        if self.enabled == enabled {
            return Directives::none();
        }
        self.enabled = enabled;
        self.previous = AdState::Content;

        if enabled {
            debug!("Enabled, re-evaluating");
            return self.handle(doc, Trigger::ControlSurface);
        }

        debug!("Disabled, standing down");
        self.suppressor.stand_down(self.player.target());
        Directives::none()
    }

    /// Compare the polled location with the last one. On change, all per-page
    /// state is reset and `true` is returned so the runtime can re-subscribe
    /// after the settle delay.
    pub fn poll_navigation<D>(&mut self, doc: &D) -> bool
    where
        D: Document<Media = M, Player = P>,
    {
        if !self.epoch.observe(&doc.location()) {
            return false;
        }
        self.reset_page_state();
        true
    }

    /// The host page announced a navigation.
    pub fn navigation_started<D>(&mut self, doc: &D)
    where
        D: Document<Media = M, Player = P>,
    {
        self.epoch.advance(&doc.location());
        self.reset_page_state();
    }

    /// Give the audio back before the runtime is torn down.
    pub fn stand_down(&mut self) {
        self.suppressor.stand_down(self.player.target());
        self.previous = AdState::Content;
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let record = self.suppressor.record();
        EngineSnapshot {
            ad_state: self.last_probe.state,
            is_suppressing: record.is_suppressing,
            saved_volume: record.saved_volume,
            retry_count: record.retry_count,
            generation: self.epoch.generation,
            enabled: self.enabled,
            has_target: self.player.target().is_some(),
            indicators: self
                .last_probe
                .indicators
                .results()
                .into_iter()
                .map(|(name, found)| IndicatorResult { name, found })
                .collect(),
        }
    }

    fn reset_page_state(&mut self) {
        // The host often reuses the same element across pages; never leave it muted.
        self.suppressor.stand_down(self.player.target());
        self.suppressor.reset();
        self.player.release();
        self.previous = AdState::Content;
        self.last_probe = Probe::default();
    }

    fn verify_token(&self, step: Step) -> Option<VerifyToken> {
        step.verify_after.map(|delay| VerifyToken {
            generation: self.epoch.generation,
            delay,
        })
    }
}
