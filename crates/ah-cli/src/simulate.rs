//! Scenario replay: scripted page states fed through the engine with
//! verification timers fired immediately.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use ah_core::fixture::{
    ElementFixture, FakeMedia, FakePlayer, MediaFixture, PageFixture, PlayerFixture, StaticPage,
};
use ah_core::{AdState, Document, Engine, EngineConfig, MediaElement, MediaEvent, Trigger, VerifyToken};

/// Upper bound on chained verifications per trigger.
const MAX_VERIFICATIONS: usize = 32;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub location: String,
    #[serde(default)]
    pub media: MediaFixture,
    #[serde(default)]
    pub player: Option<PlayerFixture>,
    pub steps: Vec<ScenarioStep>,
}

/// One point in time. `elements` replaces the page's element list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScenarioStep {
    pub label: Option<String>,
    pub location: Option<String>,
    pub elements: Vec<ElementFixture>,
    pub media_src: Option<String>,
    pub player_ad_state: Option<bool>,
    /// Volume set by the page or the user before evaluation
    pub set_volume: Option<f64>,
    pub set_muted: Option<bool>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub label: String,
    pub navigated: bool,
    pub ad_state: AdState,
    pub volume: f64,
    pub muted: bool,
    pub is_suppressing: bool,
    pub saved_volume: Option<f64>,
    pub retry_count: u32,
    pub verifications: usize,
}

pub fn load_scenario(path: &Path) -> Result<Scenario, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid scenario '{}': {}", path.display(), e))
}

pub fn run_scenario(scenario: &Scenario, config: EngineConfig) -> Result<Vec<StepReport>, String> {
    let mut page = StaticPage::from_fixture(&PageFixture {
        location: scenario.location.clone(),
        elements: Vec::new(),
        media: Some(scenario.media.clone()),
        player: scenario.player.clone(),
    });
    let media: FakeMedia = page
        .media(&scenario.media.selector)
        .cloned()
        .ok_or_else(|| "Scenario media could not be created".to_string())?;
    let player = scenario
        .player
        .as_ref()
        .and_then(|p| page.find_player(&p.selector));

    let mut engine: Engine<FakeMedia, FakePlayer> = Engine::new(config, &scenario.location);
    let mut reports = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        let mut pending = Vec::new();
        let mut navigated = false;

        if let Some(location) = &step.location {
            page.set_location(location);
            if engine.poll_navigation(&page) {
                navigated = true;
            }
        }

        page.set_elements(step.elements.clone());
        if let Some(src) = &step.media_src {
            media.set_source(Some(src.as_str()).filter(|s| !s.is_empty()));
        }
        if let (Some(player), Some(state)) = (&player, step.player_ad_state) {
            player.set_ad_state(Some(state));
        }

        if let Some(enabled) = step.enabled {
            pending.extend(engine.set_enabled(&page, enabled).verify);
        }

        let trigger = if navigated { Trigger::Navigation } else { Trigger::Mutation };
        pending.extend(engine.handle(&page, trigger).verify);

        if step.set_volume.is_some() || step.set_muted.is_some() {
            if let Some(volume) = step.set_volume {
                media.external_set_volume(volume);
            }
            if let Some(muted) = step.set_muted {
                media.external_set_muted(muted);
            }
            pending.extend(engine.handle(&page, Trigger::Media(MediaEvent::VolumeChange)).verify);
        }

        let verifications = drain_verifications(&mut engine, &page, pending);

        let record = *engine.record();
        reports.push(StepReport {
            label: step.label.clone().unwrap_or_else(|| format!("step {}", index + 1)),
            navigated,
            ad_state: engine.last_probe().state,
            volume: media.volume(),
            muted: media.muted(),
            is_suppressing: record.is_suppressing,
            saved_volume: record.saved_volume,
            retry_count: record.retry_count,
            verifications,
        });
    }

    Ok(reports)
}

fn drain_verifications(
    engine: &mut Engine<FakeMedia, FakePlayer>,
    page: &StaticPage,
    mut pending: Vec<VerifyToken>,
) -> usize {
    let mut fired = 0;
    while let Some(token) = pending.pop() {
        if fired == MAX_VERIFICATIONS {
            break;
        }
        fired += 1;
        pending.extend(engine.handle(page, Trigger::Verify(token)).verify);
    }
    fired
}

pub fn print_reports(reports: &[StepReport]) {
    println!(
        "{:<24} {:<10} {:>6} {:>6} {:>11} {:>6} {:>7}",
        "STEP", "STATE", "VOLUME", "MUTED", "SUPPRESSING", "SAVED", "RETRIES"
    );
    for report in reports {
        let label = if report.navigated {
            format!("{} (nav)", report.label)
        } else {
            report.label.clone()
        };
        println!(
            "{:<24} {:<10} {:>6.2} {:>6} {:>11} {:>6} {:>7}",
            label,
            report.ad_state.as_str(),
            report.volume,
            report.muted,
            report.is_suppressing,
            report
                .saved_volume
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            report.retry_count,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(json: &str) -> Scenario {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_ad_break_mutes_and_restores() {
        let scenario = scenario(
            r##"{
                "location": "https://www.youtube.com/watch?v=a",
                "media": {"volume": 0.7},
                "steps": [
                    {"label": "content"},
                    {"label": "ad", "elements": [{"selector": "#movie_player.ad-showing"}]},
                    {"label": "fight", "elements": [{"selector": "#movie_player.ad-showing"}], "setVolume": 0.8},
                    {"label": "back"}
                ]
            }"##,
        );
        let reports = run_scenario(&scenario, EngineConfig::default()).unwrap();

        assert_eq!(reports[0].ad_state, AdState::Content);
        assert_eq!(reports[1].volume, 0.0);
        assert!(reports[1].is_suppressing);
        assert_eq!(reports[1].verifications, 1);
        assert_eq!(reports[2].volume, 0.0);
        assert_eq!(reports[2].saved_volume, Some(0.7));
        assert_eq!(reports[3].volume, 0.7);
        assert!(!reports[3].muted);
        assert_eq!(reports[3].retry_count, 0);
    }

    #[test]
    fn test_navigation_mid_ad_starts_over() {
        let scenario = scenario(
            r##"{
                "location": "https://www.youtube.com/watch?v=a",
                "media": {"volume": 0.7},
                "steps": [
                    {"elements": [{"selector": ".ytp-ad-skip-button"}]},
                    {"location": "https://www.youtube.com/watch?v=b", "setVolume": 0.3},
                    {"elements": [{"selector": ".ytp-ad-skip-button"}]}
                ]
            }"##,
        );
        let reports = run_scenario(&scenario, EngineConfig::default()).unwrap();

        assert!(reports[1].navigated);
        assert!(!reports[1].is_suppressing);
        assert_eq!(reports[1].volume, 0.3);
        assert_eq!(reports[2].saved_volume, Some(0.3));
    }

    #[test]
    fn test_player_api_ad_state() {
        let scenario = scenario(
            r##"{
                "location": "https://www.youtube.com/watch?v=a",
                "media": {"volume": 0.5},
                "player": {"selector": "#movie_player"},
                "steps": [
                    {"playerAdState": true},
                    {"playerAdState": false}
                ]
            }"##,
        );
        let reports = run_scenario(&scenario, EngineConfig::default()).unwrap();
        assert_eq!(reports[0].ad_state, AdState::AdPlaying);
        assert_eq!(reports[0].volume, 0.0);
        assert_eq!(reports[1].volume, 0.5);
    }

    #[test]
    fn test_disabled_step_leaves_audio_alone() {
        let scenario = scenario(
            r##"{
                "location": "https://www.youtube.com/watch?v=a",
                "media": {"volume": 0.9},
                "steps": [
                    {"enabled": false, "elements": [{"selector": "#movie_player.ad-showing"}]},
                    {"enabled": true, "elements": [{"selector": "#movie_player.ad-showing"}]}
                ]
            }"##,
        );
        let reports = run_scenario(&scenario, EngineConfig::default()).unwrap();
        assert_eq!(reports[0].volume, 0.9);
        assert_eq!(reports[1].volume, 0.0);
    }

    #[test]
    fn test_bundled_scenario() {
        let scenario = scenario(include_str!("../fixtures/scenario.json"));
        let reports = run_scenario(&scenario, EngineConfig::default()).unwrap();
        let by_label = |label: &str| reports.iter().find(|r| r.label == label).unwrap();

        assert_eq!(by_label("pre-roll").volume, 0.0);
        assert_eq!(by_label("host unmutes").volume, 0.0);
        assert!(by_label("host unmutes").muted);
        assert_eq!(by_label("host unmutes").retry_count, 1);
        assert_eq!(by_label("content again").volume, 0.7);

        let next = by_label("next video ad");
        assert!(next.navigated);
        assert!(next.is_suppressing);
        assert_eq!(next.saved_volume, Some(0.7));

        assert_eq!(by_label("disabled").volume, 0.7);
        assert!(!by_label("re-enabled").is_suppressing);
    }
}
