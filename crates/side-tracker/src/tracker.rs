//! Side vehicle tracker

use crate::filter::LowPassFilter;
use overtake_model::{Direction, LeadVehicle, RadarCandidate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Tracker tuning
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Filter time constant (s)
    pub time_constant_s: f64,
    /// Expected tick period (s)
    pub dt_s: f64,
    /// Drop vehicles unseen for longer than this (ms)
    pub stale_after_ms: u64,
    /// Distance quantum for identities (m)
    pub distance_quantum: f64,
    /// Speed quantum for identities (km/h)
    pub speed_quantum: f64,
    /// Quality a track must exceed to be trusted
    pub min_quality: u8,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            time_constant_s: 0.2,
            dt_s: 0.1,
            stale_after_ms: 1000,
            distance_quantum: 5.0,
            speed_quantum: 10.0,
            min_quality: 20,
        }
    }
}

/// Quantized identity; collisions are tolerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VehicleKey {
    distance_bucket: i64,
    speed_bucket: i64,
    slot: usize,
}

#[derive(Debug, Clone, Copy)]
struct TrackedVehicle {
    candidate: RadarCandidate,
    last_seen_ms: u64,
    track_count: u32,
}

/// Filtered output for one side
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SideTrack {
    pub distance: f64,
    pub speed: f64,
    pub relative_speed: f64,
    pub vehicle_count: usize,
    /// 0..=100, grows by 10 per tick the same identity persists
    pub track_quality: u8,
}

impl SideTrack {
    /// Whether callers should prefer this track over the raw radar lead
    pub fn is_reliable(&self, min_quality: u8) -> bool {
        self.distance > 0.0 && self.track_quality > min_quality
    }

    pub fn as_lead(&self) -> LeadVehicle {
        LeadVehicle {
            distance: self.distance,
            speed: self.speed,
            relative_speed: self.relative_speed,
        }
    }
}

/// Tracks the closest vehicle in one neighbouring lane
#[derive(Debug)]
pub struct SideVehicleTracker {
    side: Direction,
    config: TrackerConfig,
    vehicles: HashMap<VehicleKey, TrackedVehicle>,
    closest: Option<VehicleKey>,
    distance_filter: LowPassFilter,
    speed_filter: LowPassFilter,
    relative_speed_filter: LowPassFilter,
}

impl SideVehicleTracker {
    pub fn new(side: Direction, config: TrackerConfig) -> Self {
        let filter = LowPassFilter::new(config.time_constant_s, config.dt_s);
        Self {
            side,
            config,
            vehicles: HashMap::new(),
            closest: None,
            distance_filter: filter.clone(),
            speed_filter: filter.clone(),
            relative_speed_filter: filter,
        }
    }

    pub fn side(&self) -> Direction {
        self.side
    }

    pub fn min_quality(&self) -> u8 {
        self.config.min_quality
    }

    fn key_for(&self, candidate: &RadarCandidate, slot: usize) -> VehicleKey {
        VehicleKey {
            distance_bucket: (candidate.distance / self.config.distance_quantum).round() as i64,
            speed_bucket: (candidate.speed / self.config.speed_quantum).round() as i64,
            slot,
        }
    }

    /// Associate this tick's candidates and refresh the filtered output
    pub fn update(&mut self, candidates: &[RadarCandidate], now_ms: u64) -> SideTrack {
        let live: Vec<(usize, &RadarCandidate)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.tracked && c.distance > 0.0)
            .collect();

        if live.is_empty() {
            let stale_after = self.config.stale_after_ms;
            self.vehicles
                .retain(|_, v| now_ms.saturating_sub(v.last_seen_ms) <= stale_after);
            if self.vehicles.is_empty() {
                if self.closest.take().is_some() {
                    debug!("{} side track lost", self.side);
                }
                self.distance_filter.reset();
                self.speed_filter.reset();
                self.relative_speed_filter.reset();
            } else {
                self.select_closest();
            }
            return self.output();
        }

        let mut next = HashMap::with_capacity(live.len());
        for (slot, candidate) in live {
            let key = self.key_for(candidate, slot);
            let previous = self.vehicles.get(&key).map_or(0, |v| v.track_count);
            next.insert(
                key,
                TrackedVehicle {
                    candidate: *candidate,
                    last_seen_ms: now_ms,
                    track_count: previous.saturating_add(1),
                },
            );
        }
        self.vehicles = next;
        self.select_closest();

        if let Some(vehicle) = self.closest.and_then(|key| self.vehicles.get(&key)) {
            let candidate = vehicle.candidate;
            self.distance_filter.update(candidate.distance);
            self.speed_filter.update(candidate.speed);
            self.relative_speed_filter.update(candidate.relative_speed);
        }

        self.output()
    }

    fn select_closest(&mut self) {
        self.closest = self
            .vehicles
            .iter()
            .min_by(|a, b| a.1.candidate.distance.total_cmp(&b.1.candidate.distance))
            .map(|(key, _)| *key);
    }

    /// Current filtered output
    pub fn output(&self) -> SideTrack {
        let Some(vehicle) = self.closest.and_then(|key| self.vehicles.get(&key)) else {
            return SideTrack::default();
        };
        SideTrack {
            distance: self.distance_filter.value().max(0.0),
            speed: self.speed_filter.value(),
            relative_speed: self.relative_speed_filter.value(),
            vehicle_count: self.vehicles.len(),
            track_quality: vehicle.track_count.saturating_mul(10).min(100) as u8,
        }
    }

    /// Filtered lead if reliable, else the single-frame radar reading
    pub fn resolve_lead(&self, raw: LeadVehicle) -> LeadVehicle {
        let track = self.output();
        if track.is_reliable(self.config.min_quality) {
            track.as_lead()
        } else {
            raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(distance: f64, speed: f64) -> RadarCandidate {
        RadarCandidate {
            tracked: true,
            distance,
            speed,
            relative_speed: speed - 100.0,
        }
    }

    #[test]
    fn test_quality_grows_while_identity_persists() {
        let mut tracker = SideVehicleTracker::new(Direction::Left, TrackerConfig::default());
        let mut track = SideTrack::default();
        for tick in 0..3 {
            track = tracker.update(&[candidate(40.0, 90.0)], tick * 100);
        }
        assert_eq!(track.track_quality, 30);
        assert_eq!(track.vehicle_count, 1);
        assert!(track.is_reliable(20));
    }

    #[test]
    fn test_new_identity_restarts_quality() {
        let mut tracker = SideVehicleTracker::new(Direction::Right, TrackerConfig::default());
        tracker.update(&[candidate(40.0, 90.0)], 0);
        tracker.update(&[candidate(40.0, 90.0)], 100);
        // jumped two distance buckets
        let track = tracker.update(&[candidate(52.0, 90.0)], 200);
        assert_eq!(track.track_quality, 10);
        assert!(!track.is_reliable(20));
    }

    #[test]
    fn test_closest_candidate_selected() {
        let mut tracker = SideVehicleTracker::new(Direction::Left, TrackerConfig::default());
        let track = tracker.update(&[candidate(70.0, 110.0), candidate(25.0, 80.0)], 0);
        assert_eq!(track.distance, 25.0);
        assert_eq!(track.speed, 80.0);
        assert_eq!(track.vehicle_count, 2);
    }

    #[test]
    fn test_untracked_candidates_ignored() {
        let mut tracker = SideVehicleTracker::new(Direction::Left, TrackerConfig::default());
        let ghost = RadarCandidate {
            tracked: false,
            ..candidate(30.0, 80.0)
        };
        let track = tracker.update(&[ghost], 0);
        assert_eq!(track, SideTrack::default());
    }

    #[test]
    fn test_closing_vehicle_followed_within_a_second() {
        let mut tracker = SideVehicleTracker::new(Direction::Left, TrackerConfig::default());
        // seeded with the first reading, no ramp up from zero
        let first = tracker.update(&[candidate(40.0, 90.0)], 0);
        assert_eq!(first.distance, 40.0);

        let next = tracker.update(&[candidate(30.0, 90.0)], 100);
        assert!((next.distance - (40.0 - 10.0 / 3.0)).abs() < 1e-9);

        let mut track = next;
        for tick in 2..12 {
            track = tracker.update(&[candidate(30.0, 90.0)], tick * 100);
        }
        assert!((track.distance - 30.0).abs() < 0.5);
    }

    #[test]
    fn test_stale_vehicles_dropped() {
        let mut tracker = SideVehicleTracker::new(Direction::Left, TrackerConfig::default());
        tracker.update(&[candidate(40.0, 90.0)], 0);

        let held = tracker.update(&[], 900);
        assert_eq!(held.distance, 40.0);

        let lost = tracker.update(&[], 1101);
        assert_eq!(lost.distance, 0.0);
        assert_eq!(lost.track_quality, 0);
    }

    #[test]
    fn test_resolve_lead_falls_back_to_raw() {
        let mut tracker = SideVehicleTracker::new(Direction::Left, TrackerConfig::default());
        tracker.update(&[candidate(40.0, 90.0)], 0);
        let raw = LeadVehicle {
            distance: 41.0,
            speed: 91.0,
            relative_speed: -9.0,
        };
        assert_eq!(tracker.resolve_lead(raw), raw);

        tracker.update(&[candidate(40.0, 90.0)], 100);
        tracker.update(&[candidate(40.0, 90.0)], 200);
        assert_eq!(tracker.resolve_lead(raw).distance, 40.0);
    }
}
