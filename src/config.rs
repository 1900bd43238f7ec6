use serde::{Deserialize, Serialize};

use crate::domain::Day;

/// An inclusive day range, used for the leader trailing-week cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRange {
    pub start: Day,
    pub end: Day,
}

impl DayRange {
    pub fn new(start: Day, end: Day) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, day: Day) -> bool {
        self.start <= day && day <= self.end
    }
}

/// Externally configurable multipliers for the soft-constraint terms.
///
/// Each weight scales a fixed step table (see `penalty`); the defaults
/// reproduce the production tuning: a soft-blackout hit outweighs any single
/// leader-spread unit, and wrong-capability usage costs five units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PenaltyWeights {
    pub leader_spread: i64,
    pub extra_time_multi: i64,
    pub soft_blackout: i64,
    pub room_surplus: i64,
    pub wrong_capability: i64,
    pub slot_congestion: i64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            leader_spread: 1,
            extra_time_multi: 1,
            soft_blackout: 10,
            room_surplus: 1,
            wrong_capability: 5,
            slot_congestion: 1,
        }
    }
}

/// Numeric configuration for one solve: rolling-window caps, the leader
/// trailing-week range, the solution cap `K`, an optional wall-clock budget,
/// and the penalty weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolverConfig {
    /// Max exams per student in any contiguous 2-day window.
    pub window2_cap: u32,
    /// Max exams per student in any contiguous 5-day window.
    pub window5_cap: u32,
    /// Trailing day range in which each leader may have at most one exam.
    pub final_week: DayRange,
    /// Stop enumerating after this many feasible solutions.
    pub solution_cap: usize,
    /// Optional wall-clock budget in seconds for the whole enumeration.
    pub time_limit: Option<f64>,
    pub weights: PenaltyWeights,
}

impl Default for SolverConfig {
    fn default() -> Self {
        // defaults match the three-week exam period the system was built for
        Self {
            window2_cap: 3,
            window5_cap: 4,
            final_week: DayRange::new(15, 20),
            solution_cap: 5,
            time_limit: None,
            weights: PenaltyWeights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_range_is_inclusive() {
        let range = DayRange::new(15, 20);
        assert!(!range.contains(14));
        assert!(range.contains(15));
        assert!(range.contains(20));
        assert!(!range.contains(21));
    }

    #[test]
    fn default_weights_keep_soft_blackout_above_spread_unit() {
        let weights = PenaltyWeights::default();
        assert!(weights.soft_blackout > weights.leader_spread);
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let cfg: SolverConfig = serde_json::from_str(r#"{"solutionCap": 2}"#).unwrap();
        assert_eq!(cfg.solution_cap, 2);
        assert_eq!(cfg.window2_cap, 3);
        assert_eq!(cfg.weights, PenaltyWeights::default());
    }
}
