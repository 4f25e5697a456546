//! Lane count and lane index estimation from road-edge geometry

use overtake_model::{LaneCountMode, RoadType, VehicleSnapshot};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

const HISTORY_SIZE: usize = 10;
const DEFAULT_LANE_WIDTH: f64 = 3.2;

/// Smooths lane count and lane index estimates over a bounded history
#[derive(Debug, Clone, Default)]
pub struct LaneEstimator {
    count_history: VecDeque<f64>,
    lane_history: VecDeque<u8>,
}

fn push_bounded<T>(history: &mut VecDeque<T>, value: T) {
    history.push_back(value);
    if history.len() > HISTORY_SIZE {
        history.pop_front();
    }
}

fn average_lane_width(snapshot: &VehicleSnapshot) -> f64 {
    let width = (snapshot.left.lane_width + snapshot.right.lane_width) / 2.0;
    if width > 0.0 {
        width
    } else {
        DEFAULT_LANE_WIDTH
    }
}

impl LaneEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lane count for the current road, 2..=5
    pub fn estimate_lane_count(
        &mut self,
        snapshot: &VehicleSnapshot,
        mode: LaneCountMode,
        manual_count: u8,
    ) -> u8 {
        if mode == LaneCountMode::Manual {
            return manual_count.clamp(2, 5);
        }

        let road_width = snapshot.left.edge_distance + snapshot.right.edge_distance;
        if road_width <= 0.0 {
            let fallback = match snapshot.road_type {
                RoadType::Highway => 3,
                RoadType::Normal => 2,
            };
            debug!("No road-edge geometry, assuming {} lanes", fallback);
            return fallback;
        }

        let estimated = road_width / average_lane_width(snapshot);
        push_bounded(&mut self.count_history, estimated);
        let smoothed = self.count_history.iter().sum::<f64>() / self.count_history.len() as f64;

        let count = (smoothed.round() as i64).clamp(2, 5) as u8;
        let count = match snapshot.road_type {
            RoadType::Highway => count.clamp(2, 4),
            RoadType::Normal => count.clamp(2, 3),
        };
        debug!("Estimated {:.1} lanes -> {}", estimated, count);
        count
    }

    /// Smoothed lane index candidate, `None` when geometry is missing or
    /// the history does not agree on a value
    pub fn estimate_lane(&mut self, snapshot: &VehicleSnapshot, lane_count: u8) -> Option<u8> {
        let left = snapshot.left.edge_distance;
        let right = snapshot.right.edge_distance;
        if left <= 0.0 || right <= 0.0 || lane_count == 0 {
            return None;
        }

        let position = left / (left + right);
        let raw = 1 + (position * f64::from(lane_count - 1)).round() as i64;
        let raw = raw.clamp(1, i64::from(lane_count)) as u8;
        push_bounded(&mut self.lane_history, raw);

        if self.lane_history.len() < 3 {
            return Some(raw);
        }

        let mut recent = self.lane_history.iter().rev().take(3);
        let latest = recent.next().copied();
        if recent.all(|lane| Some(*lane) == latest) {
            return latest;
        }

        let mut counts: HashMap<u8, usize> = HashMap::new();
        for lane in &self.lane_history {
            *counts.entry(*lane).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .filter(|(_, count)| *count as f64 > self.lane_history.len() as f64 * 0.6)
            .map(|(lane, _)| lane)
    }

    pub fn clear_lane_history(&mut self) {
        self.lane_history.clear();
    }

    pub fn lane_history_len(&self) -> usize {
        self.lane_history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(left_edge: f64, right_edge: f64, road: RoadType) -> VehicleSnapshot {
        let mut snap = VehicleSnapshot {
            road_type: road,
            ..Default::default()
        };
        snap.left.edge_distance = left_edge;
        snap.right.edge_distance = right_edge;
        snap.left.lane_width = 3.2;
        snap.right.lane_width = 3.2;
        snap
    }

    #[test]
    fn test_lane_count_from_road_width() {
        let mut est = LaneEstimator::new();
        let snap = geometry(4.8, 4.8, RoadType::Highway);
        assert_eq!(est.estimate_lane_count(&snap, LaneCountMode::Auto, 3), 3);
    }

    #[test]
    fn test_lane_count_road_type_clamp() {
        let mut est = LaneEstimator::new();
        let snap = geometry(8.0, 8.0, RoadType::Normal);
        assert_eq!(est.estimate_lane_count(&snap, LaneCountMode::Auto, 3), 3);

        let mut est = LaneEstimator::new();
        let snap = geometry(8.0, 8.0, RoadType::Highway);
        assert_eq!(est.estimate_lane_count(&snap, LaneCountMode::Auto, 3), 4);
    }

    #[test]
    fn test_lane_count_defaults_without_geometry() {
        let mut est = LaneEstimator::new();
        let highway = geometry(0.0, 0.0, RoadType::Highway);
        let normal = geometry(0.0, 0.0, RoadType::Normal);
        assert_eq!(est.estimate_lane_count(&highway, LaneCountMode::Auto, 3), 3);
        assert_eq!(est.estimate_lane_count(&normal, LaneCountMode::Auto, 3), 2);
        assert_eq!(est.estimate_lane_count(&normal, LaneCountMode::Manual, 4), 4);
    }

    #[test]
    fn test_lane_index_position() {
        let mut est = LaneEstimator::new();
        // left edge close: leftmost lane
        assert_eq!(est.estimate_lane(&geometry(1.5, 8.0, RoadType::Highway), 3), Some(1));
        est.clear_lane_history();
        assert_eq!(est.estimate_lane(&geometry(4.8, 4.8, RoadType::Highway), 3), Some(2));
        est.clear_lane_history();
        assert_eq!(est.estimate_lane(&geometry(8.0, 1.5, RoadType::Highway), 3), Some(3));
    }

    #[test]
    fn test_single_outlier_is_smoothed() {
        let mut est = LaneEstimator::new();
        let middle = geometry(4.8, 4.8, RoadType::Highway);
        let left = geometry(1.5, 8.0, RoadType::Highway);
        for _ in 0..6 {
            est.estimate_lane(&middle, 3);
        }
        // 6 of 7 readings agree on lane 2
        assert_eq!(est.estimate_lane(&left, 3), Some(2));
    }

    #[test]
    fn test_no_consensus_yields_nothing() {
        let mut est = LaneEstimator::new();
        let middle = geometry(4.8, 4.8, RoadType::Highway);
        let left = geometry(1.5, 8.0, RoadType::Highway);
        est.estimate_lane(&middle, 3);
        est.estimate_lane(&middle, 3);
        est.estimate_lane(&left, 3);
        est.estimate_lane(&left, 3);
        // history 2,2,1,1,2: last three disagree and no value holds >60%
        assert_eq!(est.estimate_lane(&middle, 3), None);
    }

    #[test]
    fn test_missing_edges_give_no_candidate() {
        let mut est = LaneEstimator::new();
        assert_eq!(est.estimate_lane(&geometry(0.0, 5.0, RoadType::Normal), 2), None);
        assert_eq!(est.lane_history_len(), 0);
    }
}
