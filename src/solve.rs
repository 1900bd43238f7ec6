//! Solver orchestration: repeatedly solves the ILP model, excluding each
//! found schedule from the next run, until the solution cap, the deadline or
//! the feasible region runs out.
//!
//! Enumeration is exposed as [`ScheduleEnumeration`], a lazy, finite,
//! fused iterator over scored schedules. It is restartable only via a fresh
//! [`solve`] call; cancellation policy (cap, deadline) lives here, decoupled
//! from the solver library's own mechanics.
//!
//! Every collected schedule is cross-checked by the independent verifier
//! before it is accepted: a hard violation in solver output means the
//! constraint encoding is unsound and is surfaced as an error, loudly.
//!
//! Determinism: HiGHS runs single-threaded with a fixed seed, model rows are
//! emitted in ordered-map order, and the final ranking sorts by (penalty,
//! schedule). Two runs on identical input return identical reports.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::SolverConfig;
use crate::domain::{Schedule, ScoredSchedule, TimetableInput};
use crate::error::SolveError;
use crate::model::{SolutionCut, TimetableModel};
use crate::penalty;
use crate::validate;
use crate::verify;

/// How an enumeration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolveStatus {
    /// The hard constraints admit no schedule at all. Terminal; relaxation
    /// is a caller policy, never applied here.
    Infeasible,
    /// The feasible region ran dry before the solution cap was reached.
    Exhausted,
    /// The solution cap was reached and the search stopped early.
    Capped,
    /// The caller's deadline passed; everything collected so far is returned.
    TimedOut,
}

/// The ranked outcome of one enumeration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveReport {
    pub status: SolveStatus,
    /// Feasible schedules sorted by penalty ascending; empty iff infeasible
    /// (or the deadline fired before the first solve finished).
    pub schedules: Vec<ScoredSchedule>,
    pub elapsed_secs: f64,
}

impl SolveReport {
    /// The cheapest schedule, if any was found.
    pub fn best(&self) -> Option<&ScoredSchedule> {
        self.schedules.first()
    }
}

/// A lazy, finite stream of verified, scored schedules in enumeration order
/// (not yet ranked; ranking happens once the stream is drained).
///
/// Each `next` call is one full solver run plus a verification pass. The
/// stream fuses once a stopping condition fires; [`status`](Self::status)
/// then says which one it was. A stream cannot be rewound, only recreated.
pub struct ScheduleEnumeration<'a> {
    input: &'a TimetableInput,
    cfg: &'a SolverConfig,
    cuts: Vec<SolutionCut>,
    produced: usize,
    finished: Option<SolveStatus>,
    started: Instant,
    deadline: Option<Duration>,
}

impl<'a> ScheduleEnumeration<'a> {
    fn new(input: &'a TimetableInput, cfg: &'a SolverConfig) -> Self {
        Self {
            input,
            cfg,
            cuts: Vec::new(),
            produced: 0,
            finished: None,
            started: Instant::now(),
            deadline: cfg.time_limit.map(Duration::from_secs_f64),
        }
    }

    /// Why the stream stopped; `None` while schedules may still come.
    pub fn status(&self) -> Option<SolveStatus> {
        self.finished
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn stop(&mut self, status: SolveStatus) {
        self.finished = Some(status);
    }

    /// The status when the solver itself runs dry.
    fn dry(&self) -> SolveStatus {
        if self.produced == 0 { SolveStatus::Infeasible } else { SolveStatus::Exhausted }
    }

    /// Verifies and scores one solver-produced schedule, and excludes it
    /// from every later run.
    fn accept(&mut self, schedule: Schedule) -> Result<ScoredSchedule, SolveError> {
        let hard: Vec<_> = verify::verify(self.input, self.cfg, &schedule)
            .into_iter()
            .filter(|v| v.is_hard())
            .collect();
        if !hard.is_empty() {
            error!(
                "solver produced a schedule the verifier rejects ({} hard violation(s)); \
                 the constraint encoding is unsound",
                hard.len()
            );
            return Err(SolveError::UnsoundSchedule(hard));
        }

        let penalty = penalty::evaluate(self.input, &self.cfg.weights, &schedule).total();
        self.produced += 1;
        info!("solution {} found with penalty {penalty}", self.produced);
        self.cuts.push(SolutionCut::from_schedule(&schedule));
        Ok(ScoredSchedule { schedule, penalty })
    }
}

impl Iterator for ScheduleEnumeration<'_> {
    type Item = Result<ScoredSchedule, SolveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished.is_some() {
            return None;
        }
        if self.produced >= self.cfg.solution_cap {
            info!(
                "solution cap of {} reached, stopping the search",
                self.cfg.solution_cap
            );
            self.stop(SolveStatus::Capped);
            return None;
        }
        if self.deadline.is_some_and(|d| self.started.elapsed() >= d) {
            info!(
                "deadline reached after {} solution(s); returning what was collected",
                self.produced
            );
            self.stop(SolveStatus::TimedOut);
            return None;
        }

        let model = match TimetableModel::build(self.input, self.cfg, &self.cuts) {
            Ok(model) => model,
            Err(infeasible) => {
                warn!("model is structurally infeasible: {}", infeasible.reason);
                self.stop(self.dry());
                return None;
            }
        };
        let schedule = match model.solve_once() {
            Ok(Some(schedule)) => schedule,
            Ok(None) => {
                self.stop(self.dry());
                return None;
            }
            Err(e) => {
                self.stop(self.dry());
                return Some(Err(e));
            }
        };

        Some(self.accept(schedule))
    }
}

/// Enumerates up to `cfg.solution_cap` feasible schedules, scored and ranked.
pub fn solve(
    input: &TimetableInput,
    cfg: &SolverConfig,
) -> Result<SolveReport, SolveError> {
    validate::check_input(input, cfg).map_err(SolveError::InvalidInput)?;

    let mut stream = ScheduleEnumeration::new(input, cfg);
    let mut collected = Vec::with_capacity(cfg.solution_cap);
    for item in &mut stream {
        collected.push(item?);
    }
    collected.sort();

    // the stream always records a status before fusing
    let status = stream.status().unwrap_or(SolveStatus::Exhausted);
    let elapsed = stream.elapsed();
    info!(
        "enumeration finished with {} solution(s) in {:.2?}",
        collected.len(),
        elapsed
    );
    Ok(SolveReport {
        status,
        schedules: collected,
        elapsed_secs: elapsed.as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExamAssignment, Slot};
    use std::collections::BTreeMap;

    fn scored(day: u32, penalty: i64) -> ScoredSchedule {
        ScoredSchedule {
            schedule: BTreeMap::from([(
                1,
                ExamAssignment { day, slot: Slot::Morning, rooms: [1].into_iter().collect() },
            )]),
            penalty,
        }
    }

    #[test]
    fn best_is_the_cheapest_schedule() {
        let report = SolveReport {
            status: SolveStatus::Capped,
            schedules: vec![scored(0, 2), scored(1, 7)],
            elapsed_secs: 0.1,
        };
        assert_eq!(report.best().map(|s| s.penalty), Some(2));
    }

    #[test]
    fn status_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&SolveStatus::TimedOut).unwrap(),
            "\"timedOut\""
        );
    }
}
