//! Hysteresis filter over a noisy condition stream
//!
//! A value only counts as stable once it has persisted unchanged for a
//! minimum duration, or once something has held for enough consecutive
//! ticks. Reaching stability opens a short quick-trigger window in
//! which callers may act without waiting again.

use serde::{Deserialize, Serialize};

/// Debounce tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceSettings {
    /// Time a value must persist unchanged (ms)
    pub stable_duration_ms: u64,
    /// Consecutive non-empty ticks that also count as stable
    pub met_threshold: u32,
    /// Quick-trigger window opened on stability (ms)
    pub quick_window_ms: u64,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            stable_duration_ms: 1500,
            met_threshold: 3,
            quick_window_ms: 3000,
        }
    }
}

/// Hysteresis state for one condition stream
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    settings: DebounceSettings,
    current: Option<T>,
    changed_at_ms: Option<u64>,
    met_count: u32,
    quick_since_ms: Option<u64>,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DebounceSettings::default())
    }
}

impl<T> Debouncer<T> {
    pub fn new(settings: DebounceSettings) -> Self {
        Self {
            settings,
            current: None,
            changed_at_ms: None,
            met_count: 0,
            quick_since_ms: None,
        }
    }

    /// Clear all hysteresis state, closing the quick window
    pub fn reset(&mut self) {
        self.current = None;
        self.changed_at_ms = None;
        self.met_count = 0;
        self.quick_since_ms = None;
    }

    pub fn settings(&self) -> DebounceSettings {
        self.settings
    }

    /// Consecutive ticks with a value present
    pub fn met_count(&self) -> u32 {
        self.met_count
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Time left before the current value counts as stable by duration
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.changed_at_ms {
            Some(since) => self
                .settings
                .stable_duration_ms
                .saturating_sub(now_ms.saturating_sub(since)),
            None => self.settings.stable_duration_ms,
        }
    }

    /// Whether the quick-trigger window is open, closing it once expired
    pub fn quick_trigger_active(&mut self, now_ms: u64) -> bool {
        match self.quick_since_ms {
            Some(start) if now_ms.saturating_sub(start) <= self.settings.quick_window_ms => true,
            Some(_) => {
                self.quick_since_ms = None;
                false
            }
            None => false,
        }
    }
}

impl<T: PartialEq + Clone> Debouncer<T> {
    /// Feed this tick's value (`None` when nothing holds) and report stability
    pub fn observe(&mut self, value: Option<&T>, now_ms: u64) -> bool {
        let Some(value) = value else {
            self.reset();
            return false;
        };

        self.met_count = self.met_count.saturating_add(1);
        if self.current.as_ref() != Some(value) {
            self.current = Some(value.clone());
            self.changed_at_ms = Some(now_ms);
        }

        let since = *self.changed_at_ms.get_or_insert(now_ms);
        let held = now_ms.saturating_sub(since);
        if held >= self.settings.stable_duration_ms || self.met_count >= self.settings.met_threshold {
            self.quick_since_ms = Some(now_ms);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_not_stable() {
        let mut deb = Debouncer::default();
        assert!(!deb.observe(Some(&1), 0));
        assert_eq!(deb.met_count(), 1);
    }

    #[test]
    fn test_stable_after_duration() {
        let mut deb = Debouncer::new(DebounceSettings {
            met_threshold: 100,
            ..Default::default()
        });
        deb.observe(Some(&"slow lead"), 0);
        assert!(!deb.observe(Some(&"slow lead"), 1000));
        assert_eq!(deb.remaining_ms(1000), 500);
        assert!(deb.observe(Some(&"slow lead"), 1500));
        assert!(deb.quick_trigger_active(1600));
    }

    #[test]
    fn test_stable_after_three_ticks() {
        let mut deb = Debouncer::default();
        assert!(!deb.observe(Some(&"slow lead"), 0));
        assert!(!deb.observe(Some(&"slow lead"), 100));
        assert!(deb.observe(Some(&"slow lead"), 200));
        assert_eq!(deb.met_count(), 3);
        assert_eq!(deb.remaining_ms(200), 1300);
        assert!(deb.quick_trigger_active(200));
    }

    #[test]
    fn test_changing_value_keeps_count() {
        let mut deb = Debouncer::default();
        deb.observe(Some(&1), 0);
        deb.observe(Some(&2), 100);
        assert!(deb.observe(Some(&1), 200));
        assert_eq!(deb.current(), Some(&1));
    }

    #[test]
    fn test_gap_restarts_count() {
        let mut deb = Debouncer::default();
        deb.observe(Some(&1), 0);
        deb.observe(Some(&1), 100);
        deb.observe(None, 200);
        assert!(!deb.observe(Some(&1), 300));
        assert!(!deb.observe(Some(&1), 400));
        assert_eq!(deb.met_count(), 2);
        assert!(deb.observe(Some(&1), 500));
    }

    #[test]
    fn test_empty_resets() {
        let mut deb = Debouncer::default();
        deb.observe(Some(&1), 0);
        deb.observe(Some(&1), 2000);
        assert!(deb.quick_trigger_active(2000));

        assert!(!deb.observe(None, 2100));
        assert_eq!(deb.met_count(), 0);
        assert!(!deb.quick_trigger_active(2100));
        assert!(deb.current().is_none());
    }

    #[test]
    fn test_quick_window_expires() {
        let mut deb = Debouncer::default();
        deb.observe(Some(&1), 0);
        deb.observe(Some(&1), 1500);
        assert!(deb.quick_trigger_active(4500));
        assert!(!deb.quick_trigger_active(4501));
        // stays closed until stability is reached again
        assert!(!deb.quick_trigger_active(4502));
    }
}
