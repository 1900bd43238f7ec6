//! Penalty scheme: the weighted soft-constraint terms that form the
//! objective, plus an arithmetic evaluator that scores any finished schedule
//! without going near the solver.
//!
//! Both halves share the same step tables, so the objective the solver
//! minimizes and the penalty the orchestration reports always agree.

use good_lp::{Expression, Variable, constraint};
use itertools::Itertools;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PenaltyWeights;
use crate::domain::{
    Accommodation, Day, DaySlot, ExamId, ExamKind, RoomCapability, RoomId, Schedule,
    TimetableInput,
};
use crate::model::ModelContext;

/// Gaps of 4+ days between a leader's exams are safe.
const SAFE_LEADER_GAP: u32 = 4;
/// Cost steps for gaps 0..=3; gap 0 costs the maximum.
const LEADER_GAP_COST: [i64; 4] = [5, 4, 3, 1];

/// Up to 2 rooms per exam is free; beyond that, logistics degrade fast.
const ROOM_SURPLUS_THRESHOLD: usize = 3;
/// Incremental cost at each room-count threshold (3, 4, 5, 6+); the
/// cumulative totals are 4, 6, 9, 15.
const ROOM_SURPLUS_STEP: [(usize, i64); 4] = [(3, 4), (4, 2), (5, 3), (6, 6)];

/// Invigilation gets strained at 3 exams in one slot and unmanageable at 4.
const CONGESTION_AT_THREE: i64 = 5;
const CONGESTION_AT_FOUR: i64 = 100;

pub fn leader_gap_cost(gap: u32) -> i64 {
    if gap < SAFE_LEADER_GAP { LEADER_GAP_COST[gap as usize] } else { 0 }
}

pub fn room_surplus_cost(rooms: usize) -> i64 {
    ROOM_SURPLUS_STEP
        .iter()
        .filter(|&&(threshold, _)| rooms >= threshold)
        .map(|&(_, increment)| increment)
        .sum()
}

pub fn congestion_cost(exams_in_slot: usize) -> i64 {
    match exams_in_slot {
        0..=2 => 0,
        3 => CONGESTION_AT_THREE,
        _ => CONGESTION_AT_FOUR,
    }
}

/// Whether assigning `room` to `exam` wastes a scarce capability: a computer
/// room on a non-computer exam, or an accommodated-only room on an exam with
/// no accommodated candidates.
fn is_wasteful_assignment(
    kind: ExamKind,
    accommodated_demand: u32,
    capabilities: &std::collections::BTreeSet<RoomCapability>,
) -> bool {
    if kind != ExamKind::ComputerBased && capabilities.contains(&RoomCapability::Computer) {
        return true;
    }
    accommodated_demand == 0
        && capabilities.contains(&RoomCapability::AccommodatedSeating)
        && !capabilities.contains(&RoomCapability::StandardSeating)
}

/// Adds every soft-constraint term to the model's objective.
///
/// Penalty variables are linked to the placement/room variables with lower
/// bounds only; minimization makes each land exactly on its step value.
pub(crate) fn attach_penalties(ctx: &mut ModelContext<'_>) {
    let weights = ctx.cfg.weights;
    attach_leader_spread(ctx, weights.leader_spread);
    attach_extra_time(ctx, weights.extra_time_multi);
    attach_soft_blackout(ctx, weights.soft_blackout);
    attach_room_surplus(ctx, weights.room_surplus);
    attach_wrong_capability(ctx, weights.wrong_capability);
    attach_slot_congestion(ctx, weights.slot_congestion);
}

fn attach_leader_spread(ctx: &mut ModelContext<'_>, weight: i64) {
    if weight == 0 {
        return;
    }
    let pairs: Vec<(ExamId, ExamId)> = ctx.input.leader_pairs().into_iter().collect();
    for (a, b) in pairs {
        // one row per close day-pair; the penalty variable must sit above
        // whichever row fires
        let days_a = ctx.candidate_days(a);
        let days_b = ctx.candidate_days(b);
        let mut rows: Vec<(Day, Day, i64)> = Vec::new();
        for &day_a in &days_a {
            for &day_b in &days_b {
                let cost = weight * leader_gap_cost(day_a.abs_diff(day_b));
                if cost > 0 {
                    rows.push((day_a, day_b, cost));
                }
            }
        }
        if rows.is_empty() {
            continue;
        }
        let penalty = ctx.add_penalty_var();
        for (day_a, day_b, cost) in rows {
            let on_a = ctx.day_expr(a, day_a);
            let on_b = ctx.day_expr(b, day_b);
            // penalty >= cost * (on_a + on_b - 1)
            ctx.add_constraint(constraint!(
                cost as f64 * (on_a + on_b) - penalty <= cost as f64
            ));
        }
        ctx.add_objective(Expression::from(penalty));
    }
}

fn attach_extra_time(ctx: &mut ModelContext<'_>, weight: i64) {
    if weight == 0 {
        return;
    }
    let num_days = ctx.input.calendar.num_days;
    let rosters: Vec<Vec<ExamId>> = ctx
        .input
        .students
        .iter()
        .sorted_by_key(|s| s.id)
        .filter(|s| s.accommodation == Accommodation::Extended25)
        .map(|s| s.exams.iter().copied().sorted().dedup().collect())
        .collect();
    for roster in rosters {
        if roster.len() < 2 {
            continue;
        }
        for day in 0..num_days {
            let reachable = roster
                .iter()
                .filter(|&&e| ctx.candidate_days(e).contains(&day))
                .count();
            if reachable < 2 {
                continue;
            }
            let crowded = ctx.add_binary();
            let count = roster
                .iter()
                .map(|&e| ctx.day_expr(e, day))
                .fold(Expression::from(0.0), |acc, e| acc + e);
            // count >= 2 forces the indicator up
            ctx.add_constraint(constraint!(
                count - (reachable - 1) as f64 * crowded <= 1
            ));
            ctx.add_objective(weight as f64 * crowded);
        }
    }
}

fn attach_soft_blackout(ctx: &mut ModelContext<'_>, weight: i64) {
    if weight == 0 {
        return;
    }
    let discouraged: Vec<Variable> = ctx
        .slot_vars
        .iter()
        .filter(|&(&(_, day, slot), _)| {
            ctx.input.calendar.is_soft_blackout(DaySlot::new(day, slot))
        })
        .map(|(_, &var)| var)
        .collect();
    trace!("{} placement variables fall on soft blackouts", discouraged.len());
    for var in discouraged {
        ctx.add_objective(weight as f64 * var);
    }
}

fn attach_room_surplus(ctx: &mut ModelContext<'_>, weight: i64) {
    if weight == 0 {
        return;
    }
    let room_counts: Vec<(ExamId, usize)> = ctx
        .exam_rooms
        .iter()
        .map(|(&exam, rooms)| (exam, rooms.len()))
        .collect();
    for (exam, available) in room_counts {
        if available < ROOM_SURPLUS_THRESHOLD {
            continue;
        }
        for (threshold, increment) in ROOM_SURPLUS_STEP {
            if available < threshold {
                break;
            }
            let over = ctx.add_binary();
            let used = ctx.rooms_expr(exam);
            // used >= threshold forces the indicator up
            ctx.add_constraint(constraint!(
                used - (available - threshold + 1) as f64 * over <= (threshold - 1) as f64
            ));
            ctx.add_objective(weight as f64 * increment as f64 * over);
        }
    }
}

fn attach_wrong_capability(ctx: &mut ModelContext<'_>, weight: i64) {
    if weight == 0 {
        return;
    }
    let exam_map = ctx.input.exam_map();
    let room_map = ctx.input.room_map();
    let wasteful: Vec<(ExamId, RoomId)> = ctx
        .exam_rooms
        .iter()
        .flat_map(|(&exam, rooms)| rooms.iter().map(move |&room| (exam, room)))
        .filter(|&(exam, room)| {
            let demand = ctx.demand.get(&exam).copied().unwrap_or_default();
            is_wasteful_assignment(
                exam_map[&exam].kind,
                demand.accommodated,
                &room_map[&room].capabilities,
            )
        })
        .collect();
    for (exam, room) in wasteful {
        let var = ctx.room_vars[&(exam, room)];
        ctx.add_objective(weight as f64 * var);
    }
}

fn attach_slot_congestion(ctx: &mut ModelContext<'_>, weight: i64) {
    if weight == 0 {
        return;
    }
    // group placement variables by (day, slot)
    let mut per_slot: BTreeMap<DaySlot, Vec<Variable>> = BTreeMap::new();
    for (&(_, day, slot), &var) in ctx.slot_vars.iter() {
        per_slot.entry(DaySlot::new(day, slot)).or_default().push(var);
    }
    for (_, vars) in per_slot {
        let reachable = vars.len();
        if reachable < 3 {
            continue;
        }
        let count: Expression = vars.into_iter().sum();
        let at_three = ctx.add_binary();
        ctx.add_constraint(constraint!(
            count.clone() - (reachable - 2) as f64 * at_three <= 2
        ));
        ctx.add_objective(weight as f64 * CONGESTION_AT_THREE as f64 * at_three);
        if reachable >= 4 {
            let at_four = ctx.add_binary();
            ctx.add_constraint(constraint!(
                count - (reachable - 3) as f64 * at_four <= 3
            ));
            let remainder = CONGESTION_AT_FOUR - CONGESTION_AT_THREE;
            ctx.add_objective(weight as f64 * remainder as f64 * at_four);
        }
    }
}

/// Per-term totals for one scored schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyBreakdown {
    pub leader_spread: i64,
    pub extra_time_multi: i64,
    pub soft_blackout: i64,
    pub room_surplus: i64,
    pub wrong_capability: i64,
    pub slot_congestion: i64,
}

impl PenaltyBreakdown {
    pub fn total(&self) -> i64 {
        self.leader_spread
            + self.extra_time_multi
            + self.soft_blackout
            + self.room_surplus
            + self.wrong_capability
            + self.slot_congestion
    }
}

/// Scores a concrete schedule by plain arithmetic over the same step tables
/// the objective uses. Exams missing from a partial schedule contribute
/// nothing; the verifier reports them separately.
pub fn evaluate(
    input: &TimetableInput,
    weights: &PenaltyWeights,
    schedule: &Schedule,
) -> PenaltyBreakdown {
    let mut out = PenaltyBreakdown::default();
    let exam_map = input.exam_map();
    let room_map = input.room_map();
    let demand = input.seat_demand();

    for (a, b) in input.leader_pairs() {
        if let (Some(at_a), Some(at_b)) = (schedule.get(&a), schedule.get(&b)) {
            out.leader_spread +=
                weights.leader_spread * leader_gap_cost(at_a.day.abs_diff(at_b.day));
        }
    }

    for student in &input.students {
        if student.accommodation != Accommodation::Extended25 {
            continue;
        }
        let mut per_day: BTreeMap<Day, usize> = BTreeMap::new();
        for exam in student.exams.iter().sorted().dedup() {
            if let Some(assignment) = schedule.get(exam) {
                *per_day.entry(assignment.day).or_default() += 1;
            }
        }
        for (_, exams) in per_day {
            if exams >= 2 {
                out.extra_time_multi += weights.extra_time_multi;
            }
        }
    }

    for (exam, assignment) in schedule {
        if input.calendar.is_soft_blackout(assignment.at()) {
            out.soft_blackout += weights.soft_blackout;
        }
        out.room_surplus += weights.room_surplus * room_surplus_cost(assignment.rooms.len());
        let Some(domain_exam) = exam_map.get(exam) else { continue };
        let accommodated = demand.get(exam).map(|d| d.accommodated).unwrap_or(0);
        for room in &assignment.rooms {
            let Some(domain_room) = room_map.get(room) else { continue };
            if is_wasteful_assignment(domain_exam.kind, accommodated, &domain_room.capabilities)
            {
                out.wrong_capability += weights.wrong_capability;
            }
        }
    }

    let mut per_slot: BTreeMap<DaySlot, usize> = BTreeMap::new();
    for (_, assignment) in schedule {
        *per_slot.entry(assignment.at()).or_default() += 1;
    }
    for (_, count) in per_slot {
        out.slot_congestion += weights.slot_congestion * congestion_cost(count);
    }

    out
}
