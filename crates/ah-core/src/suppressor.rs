//! Audio Suppressor
//!
//! Two-state machine (`Idle`, `Suppressing`) driven by ad-state edges. Owns
//! the single [`SuppressionRecord`]; nothing else mutates it.
//!
//! Every suppression attempt is followed by a verification. The host page is
//! free to reset volume behind our back, so a failed verification re-applies
//! the mute with a growing delay, up to the retry budget. Past the budget the
//! regular evaluation timer keeps re-applying; suppression is never abandoned
//! while the ad is still on screen.

use std::time::Duration;

use log::{debug, info, warn};

use crate::config::SuppressionPolicy;
use crate::player::{ControlError, MediaElement, PlaybackTarget, RichPlayerControl};
use crate::types::{clamp_volume, volume_to_percent, AdState};

// =============================================================================
// Suppression Record
// =============================================================================

/// State of the current suppression episode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SuppressionRecord {
    pub is_suppressing: bool,
    /// Volume captured when the episode began; consumed when it ends
    pub saved_volume: Option<f64>,
    pub retry_count: u32,
}

impl SuppressionRecord {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// Steps
// =============================================================================

/// What a transition did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do
    None,
    /// Entered `Suppressing`
    Muted,
    /// Re-applied suppression after a failed check
    Reapplied { retry: u32 },
    /// Left `Suppressing`
    Restored,
}

/// Result of a transition: what happened, and when to verify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub verify_after: Option<Duration>,
}

impl Step {
    pub fn idle() -> Self {
        Self {
            action: Action::None,
            verify_after: None,
        }
    }
}

// =============================================================================
// Audio Suppressor
// =============================================================================

pub struct AudioSuppressor {
    policy: SuppressionPolicy,
    record: SuppressionRecord,
    /// Exhaustion already reported in this episode
    budget_warned: bool,
}

impl AudioSuppressor {
    pub fn new(policy: SuppressionPolicy) -> Self {
        Self {
            policy,
            record: SuppressionRecord::default(),
            budget_warned: false,
        }
    }

    pub fn record(&self) -> &SuppressionRecord {
        &self.record
    }

    pub fn is_suppressing(&self) -> bool {
        self.record.is_suppressing
    }

    /// Drive the state machine with one evaluation result.
    pub fn on_ad_state_change<M, P>(
        &mut self,
        previous: AdState,
        current: AdState,
        target: &PlaybackTarget<M, P>,
    ) -> Step
    where
        M: MediaElement,
        P: RichPlayerControl,
    {
        match (self.record.is_suppressing, previous, current) {
            (false, AdState::Content, AdState::AdPlaying) => self.begin(target),
            (true, _, AdState::AdPlaying) => {
                if fully_suppressed(target) {
                    Step::idle()
                } else {
                    self.reapply(target)
                }
            }
            (true, _, AdState::Content) => self.end(target),
            _ => Step::idle(),
        }
    }

    /// Scheduled check after a suppression attempt.
    pub fn verify<M, P>(&mut self, current: AdState, target: &PlaybackTarget<M, P>) -> Step
    where
        M: MediaElement,
        P: RichPlayerControl,
    {
        if !self.record.is_suppressing || !current.is_ad() {
            return Step::idle();
        }
        if fully_suppressed(target) {
            debug!("Suppression verified (retry {})", self.record.retry_count);
            return Step::idle();
        }
        if target.media.is_silent() {
            debug!("Suppression only partly held, re-applying");
        }
        self.reapply(target)
    }

    /// The media element reported a volume change.
    pub fn on_volume_change<M, P>(&mut self, current: AdState, target: &PlaybackTarget<M, P>) -> Step
    where
        M: MediaElement,
        P: RichPlayerControl,
    {
        if !self.record.is_suppressing || !current.is_ad() {
            return Step::idle();
        }
        if target.media.volume() > 0.0 || !target.media.muted() {
            debug!("Volume reasserted during ad, suppressing again");
            return self.reapply(target);
        }
        Step::idle()
    }

    /// Give audio back immediately (disabled, or leaving the page).
    pub fn stand_down<M, P>(&mut self, target: Option<&PlaybackTarget<M, P>>) -> Step
    where
        M: MediaElement,
        P: RichPlayerControl,
    {
        if !self.record.is_suppressing {
            return Step::idle();
        }
        match target.filter(|t| !t.is_stale()) {
            Some(target) => self.end(target),
            None => {
                self.reset();
                Step {
                    action: Action::Restored,
                    verify_after: None,
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.record.reset();
        self.budget_warned = false;
    }

    fn begin<M, P>(&mut self, target: &PlaybackTarget<M, P>) -> Step
    where
        M: MediaElement,
        P: RichPlayerControl,
    {
        if self.record.saved_volume.is_none() {
            self.record.saved_volume = Some(target.media.volume());
        }
        self.record.is_suppressing = true;
        self.record.retry_count = 0;
        self.budget_warned = false;

        info!(
            "Ad detected, muting (saved volume {:.2})",
            self.record.saved_volume.unwrap_or_default()
        );
        apply_suppression(target);

        Step {
            action: Action::Muted,
            verify_after: Some(self.policy.verify_delay(0)),
        }
    }

    fn reapply<M, P>(&mut self, target: &PlaybackTarget<M, P>) -> Step
    where
        M: MediaElement,
        P: RichPlayerControl,
    {
        let exhausted = self.record.retry_count >= self.policy.max_retries;
        if !exhausted {
            self.record.retry_count += 1;
        }
        let retry = self.record.retry_count;

        apply_suppression(target);

        if exhausted {
            // Budget spent: no extra timer, the evaluation loop keeps trying.
            if self.budget_warned {
                debug!("Re-applied suppression past the retry budget");
            } else {
                warn!("Suppression retry budget exhausted ({retry}), relying on evaluation timer");
                self.budget_warned = true;
            }
            return Step {
                action: Action::Reapplied { retry },
                verify_after: None,
            };
        }

        debug!("Re-applied suppression (retry {retry})");
        Step {
            action: Action::Reapplied { retry },
            verify_after: Some(self.policy.verify_delay(retry)),
        }
    }

    fn end<M, P>(&mut self, target: &PlaybackTarget<M, P>) -> Step
    where
        M: MediaElement,
        P: RichPlayerControl,
    {
        let volume = match self.record.saved_volume {
            Some(saved) if saved > 0.0 => clamp_volume(saved),
            _ => self.policy.default_restore_volume,
        };

        info!("Ad ended, restoring volume {volume:.2}");
        apply_restore(target, volume);
        self.reset();

        Step {
            action: Action::Restored,
            verify_after: None,
        }
    }
}

/// Zero volume and the mute flag both set.
fn fully_suppressed<M: MediaElement, P>(target: &PlaybackTarget<M, P>) -> bool {
    target.media.volume() <= 0.0 && target.media.muted()
}

/// Mute every surface. Each surface is attempted even if another failed,
/// since the host page may override either one independently.
fn apply_suppression<M, P>(target: &PlaybackTarget<M, P>)
where
    M: MediaElement,
    P: RichPlayerControl,
{
    log_failure(target.media.set_volume(0.0));
    log_failure(target.media.set_muted(true));

    if let Some(player) = &target.player {
        log_failure(player.mute());
        log_failure(player.set_volume(0));
    }
}

fn apply_restore<M, P>(target: &PlaybackTarget<M, P>, volume: f64)
where
    M: MediaElement,
    P: RichPlayerControl,
{
    log_failure(target.media.set_volume(volume));
    log_failure(target.media.set_muted(false));

    if let Some(player) = &target.player {
        log_failure(player.unmute());
        log_failure(player.set_volume(volume_to_percent(volume)));
    }
}

fn log_failure(result: Result<(), ControlError>) {
    match result {
        Ok(()) => {}
        Err(ControlError::Unsupported { surface, operation }) => {
            debug!("{surface} has no {operation}, skipping");
        }
        Err(e) => warn!("Control surface failure: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FakeMedia, FakePlayer};

    use crate::types::AdState::{AdPlaying, Content};

    fn target(volume: f64) -> PlaybackTarget<FakeMedia, FakePlayer> {
        PlaybackTarget {
            media: FakeMedia::new(volume),
            player: Some(FakePlayer::new()),
            generation: 0,
        }
    }

    fn suppressor() -> AudioSuppressor {
        AudioSuppressor::new(SuppressionPolicy::default())
    }

    #[test]
    fn test_mute_only_on_rising_edge() {
        let target = target(0.7);
        let mut s = suppressor();
        let states = [Content, AdPlaying, AdPlaying, AdPlaying, Content, Content];

        let mut mutes = 0;
        let mut previous = Content;
        for current in states {
            if s.on_ad_state_change(previous, current, &target).action == Action::Muted {
                mutes += 1;
            }
            previous = current;
        }
        assert_eq!(mutes, 1);
    }

    #[test]
    fn test_held_ad_is_not_remuted() {
        let target = target(0.7);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        let writes = target.media.writes();

        let step = s.on_ad_state_change(AdPlaying, AdPlaying, &target);
        assert_eq!(step, Step::idle());
        assert_eq!(target.media.writes(), writes);
    }

    #[test]
    fn test_ad_to_ad_while_idle_is_noop() {
        let target = target(0.7);
        let mut s = suppressor();
        assert_eq!(s.on_ad_state_change(AdPlaying, AdPlaying, &target), Step::idle());
        assert!(!s.is_suppressing());
    }

    #[test]
    fn test_mutes_every_surface() {
        let target = target(0.7);
        let mut s = suppressor();
        let step = s.on_ad_state_change(Content, AdPlaying, &target);

        assert_eq!(step.action, Action::Muted);
        assert_eq!(step.verify_after, Some(Duration::from_millis(250)));
        assert_eq!(target.media.volume(), 0.0);
        assert!(target.media.muted());
        let player = target.player.as_ref().unwrap();
        assert!(player.is_muted());
        assert_eq!(player.volume(), 0);
        assert_eq!(s.record().saved_volume, Some(0.7));
    }

    #[test]
    fn test_volume_round_trip() {
        let target = target(0.7);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        let step = s.on_ad_state_change(AdPlaying, Content, &target);

        assert_eq!(step.action, Action::Restored);
        assert_eq!(target.media.volume(), 0.7);
        assert!(!target.media.muted());
        let player = target.player.as_ref().unwrap();
        assert!(!player.is_muted());
        assert_eq!(player.volume(), 70);
        assert_eq!(*s.record(), SuppressionRecord::default());
    }

    #[test]
    fn test_zero_volume_restores_default() {
        let target = target(0.0);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        s.on_ad_state_change(AdPlaying, Content, &target);
        assert_eq!(target.media.volume(), 0.5);
        assert!(!target.media.muted());
    }

    #[test]
    fn test_saved_volume_captured_once_per_episode() {
        let target = target(0.6);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        target.media.external_set_volume(0.9);
        s.on_ad_state_change(AdPlaying, AdPlaying, &target);
        assert_eq!(s.record().saved_volume, Some(0.6));
    }

    #[test]
    fn test_external_override_is_resuppressed() {
        let target = target(0.7);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);

        target.media.external_set_volume(0.8);
        let step = s.on_volume_change(AdPlaying, &target);
        assert_eq!(step.action, Action::Reapplied { retry: 1 });
        assert_eq!(target.media.volume(), 0.0);
        assert!(target.media.muted());
    }

    #[test]
    fn test_own_volume_change_is_ignored() {
        let target = target(0.7);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        assert_eq!(s.on_volume_change(AdPlaying, &target), Step::idle());
        assert_eq!(s.record().retry_count, 0);
    }

    #[test]
    fn test_verify_passes_when_silent() {
        let target = target(0.7);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        assert_eq!(s.verify(AdPlaying, &target), Step::idle());
    }

    #[test]
    fn test_failed_attempt_is_retried() {
        let target = target(0.7);
        target.media.fail_next_writes(2);
        let mut s = suppressor();

        let step = s.on_ad_state_change(Content, AdPlaying, &target);
        assert_eq!(step.action, Action::Muted);
        assert_eq!(target.media.volume(), 0.7);

        let step = s.verify(AdPlaying, &target);
        assert_eq!(step.action, Action::Reapplied { retry: 1 });
        assert_eq!(step.verify_after, Some(Duration::from_millis(500)));
        assert!(target.media.is_silent());
    }

    #[test]
    fn test_retry_budget_is_bounded_but_never_abandoned() {
        let target = target(0.7);
        target.media.fail_next_writes(u32::MAX);
        let player = target.player.as_ref().unwrap();
        player.set_failing(true);
        let mut s = suppressor();

        let mut step = s.on_ad_state_change(Content, AdPlaying, &target);
        let mut verifications = 0;
        while step.verify_after.is_some() {
            step = s.verify(AdPlaying, &target);
            verifications += 1;
            assert!(s.record().retry_count <= 5);
        }
        assert_eq!(verifications, 6);
        assert_eq!(s.record().retry_count, 5);
        assert!(s.is_suppressing());

        // The evaluation loop keeps re-applying once the budget is spent.
        target.media.fail_next_writes(0);
        player.set_failing(false);
        let step = s.on_ad_state_change(AdPlaying, AdPlaying, &target);
        assert_eq!(step.action, Action::Reapplied { retry: 5 });
        assert!(target.media.is_silent());
    }

    #[test]
    fn test_retry_count_resets_after_episode() {
        let target = target(0.7);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        target.media.external_set_volume(0.3);
        s.on_volume_change(AdPlaying, &target);
        assert_eq!(s.record().retry_count, 1);

        s.on_ad_state_change(AdPlaying, Content, &target);
        assert_eq!(s.record().retry_count, 0);
    }

    #[test]
    fn test_player_failure_does_not_block_element() {
        let target = target(0.7);
        target.player.as_ref().unwrap().set_failing(true);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        assert!(target.media.is_silent());
    }

    #[test]
    fn test_stand_down_restores() {
        let target = target(0.4);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        let step = s.stand_down(Some(&target));
        assert_eq!(step.action, Action::Restored);
        assert_eq!(target.media.volume(), 0.4);
        assert!(!s.is_suppressing());
    }

    #[test]
    fn test_stand_down_with_stale_target_clears_record() {
        let target = target(0.4);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);
        target.media.detach();
        s.stand_down(Some(&target));
        assert_eq!(*s.record(), SuppressionRecord::default());
    }

    #[test]
    fn test_verify_resuppresses_volume_raised_while_muted() {
        let target = target(0.7);
        let mut s = suppressor();
        s.on_ad_state_change(Content, AdPlaying, &target);

        target.media.external_set_volume(0.8);
        assert!(target.media.muted());
        let step = s.verify(AdPlaying, &target);
        assert_eq!(step.action, Action::Reapplied { retry: 1 });
        assert_eq!(target.media.volume(), 0.0);
    }

    #[test]
    fn test_exhaustion_reported_once_per_episode() {
        let target = target(0.7);
        target.media.fail_next_writes(u32::MAX);
        let mut s = suppressor();

        let mut step = s.on_ad_state_change(Content, AdPlaying, &target);
        while step.verify_after.is_some() {
            step = s.verify(AdPlaying, &target);
        }
        assert!(s.budget_warned);
        s.on_ad_state_change(AdPlaying, AdPlaying, &target);
        assert!(s.budget_warned);

        target.media.fail_next_writes(0);
        s.on_ad_state_change(AdPlaying, Content, &target);
        assert!(!s.budget_warned);
    }
}
