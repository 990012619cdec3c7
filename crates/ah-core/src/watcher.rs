//! Change Watcher policy
//!
//! The browser wiring (observers, timers, listeners) lives in `ah-wasm`; this
//! module holds the part that needs no DOM: noticing that the host page
//! navigated, and the epoch that invalidates timers scheduled before it.

use log::info;

/// Identifies "this page view".
///
/// `generation` is bumped on every navigation; anything scheduled under an
/// older generation must be dropped when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NavigationEpoch {
    pub generation: u64,
    pub location: String,
}

impl NavigationEpoch {
    pub fn new(location: &str) -> Self {
        Self {
            generation: 0,
            location: location.to_string(),
        }
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Compare against a freshly polled location. Returns `true` (and advances
    /// the epoch) when it differs from the last one seen.
    pub fn observe(&mut self, location: &str) -> bool {
        if self.location == location {
            return false;
        }
        info!("Navigation detected: {} -> {}", self.location, location);
        self.advance(location);
        true
    }

    /// Unconditionally start a new epoch (first-class navigation event).
    pub fn advance(&mut self, location: &str) {
        self.generation = self.generation.wrapping_add(1);
        self.location = location.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_location_is_not_navigation() {
        let mut epoch = NavigationEpoch::new("https://www.youtube.com/watch?v=a");
        assert!(!epoch.observe("https://www.youtube.com/watch?v=a"));
        assert_eq!(epoch.generation, 0);
    }

    #[test]
    fn test_location_change_advances() {
        let mut epoch = NavigationEpoch::new("https://www.youtube.com/watch?v=a");
        assert!(epoch.observe("https://www.youtube.com/watch?v=b"));
        assert_eq!(epoch.generation, 1);
        assert!(!epoch.is_current(0));
        assert!(epoch.is_current(1));
        assert!(!epoch.observe("https://www.youtube.com/watch?v=b"));
    }

    #[test]
    fn test_explicit_advance_without_location_change() {
        let mut epoch = NavigationEpoch::new("https://www.youtube.com/");
        epoch.advance("https://www.youtube.com/");
        assert_eq!(epoch.generation, 1);
    }
}
