//! Constraint model builder: translates a domain snapshot plus configuration
//! into a good_lp ILP model.
//!
//! Decision variables, all binary:
//! - `x[exam, day, slot]`: the exam sits at that (day, slot);
//! - `y[exam, room]`: the exam uses that room;
//! - `z[exam, room, day, slot]`: occupancy link for room mutual exclusion.
//!
//! Hard blackouts, fixed pins and computer-room restrictions are discharged
//! by candidate pre-filtering: variables that would violate them are never
//! created. An exam whose candidate set comes out empty makes the model
//! structurally infeasible, which is reported as an outcome, never retried.

use good_lp::{
    Constraint, Expression, ProblemVariables, Solution, SolverModel, Variable, constraint,
    default_solver, variable,
};
use itertools::Itertools;
use log::{info, trace, warn};
use std::collections::BTreeMap;

use crate::config::SolverConfig;
use crate::domain::{
    Accommodation, Day, DaySlot, ExamAssignment, ExamId, ExamKind, Room, RoomCapability,
    RoomId, Schedule, SeatDemand, Slot, TimetableInput,
};
use crate::error::SolveError;
use crate::penalty;

pub type SlotKey = (ExamId, Day, Slot);
pub type RoomKey = (ExamId, RoomId);

/// The model cannot be satisfied for a structural reason that is visible
/// before (or instead of) running the solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Infeasibility {
    pub reason: String,
}

impl Infeasibility {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// The support of one already-found solution, excluded from later solves so
/// the enumeration moves on to the next-best schedule.
#[derive(Debug, Clone)]
pub struct SolutionCut {
    slot_keys: Vec<SlotKey>,
    room_keys: Vec<RoomKey>,
}

impl SolutionCut {
    pub fn from_schedule(schedule: &Schedule) -> Self {
        let mut slot_keys = Vec::new();
        let mut room_keys = Vec::new();
        for (&exam, assignment) in schedule {
            slot_keys.push((exam, assignment.day, assignment.slot));
            for &room in &assignment.rooms {
                room_keys.push((exam, room));
            }
        }
        Self { slot_keys, room_keys }
    }
}

/// Mutable model state threaded through the builder and the penalty scheme:
/// the variable maps plus the constraint and objective accumulators.
/// No state outlives one solve.
pub(crate) struct ModelContext<'a> {
    pub(crate) input: &'a TimetableInput,
    pub(crate) cfg: &'a SolverConfig,
    pub(crate) demand: BTreeMap<ExamId, SeatDemand>,
    /// Candidate (day, slot) pairs per exam, pre-filtered.
    pub(crate) exam_slots: BTreeMap<ExamId, Vec<DaySlot>>,
    /// Candidate rooms per exam, pre-filtered.
    pub(crate) exam_rooms: BTreeMap<ExamId, Vec<RoomId>>,
    pub(crate) slot_vars: BTreeMap<SlotKey, Variable>,
    pub(crate) room_vars: BTreeMap<RoomKey, Variable>,
    vars: ProblemVariables,
    constraints: Vec<Constraint>,
    objective: Expression,
}

impl std::fmt::Debug for ModelContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `ProblemVariables` does not implement `Debug`, so it is omitted.
        f.debug_struct("ModelContext")
            .field("cfg", &self.cfg)
            .field("demand", &self.demand)
            .field("exam_slots", &self.exam_slots)
            .field("exam_rooms", &self.exam_rooms)
            .field("slot_vars", &self.slot_vars)
            .field("room_vars", &self.room_vars)
            .field("constraints", &self.constraints)
            .field("objective", &self.objective)
            .finish_non_exhaustive()
    }
}

impl<'a> ModelContext<'a> {
    fn new(input: &'a TimetableInput, cfg: &'a SolverConfig) -> Result<Self, Infeasibility> {
        let demand = input.seat_demand();

        // pre-filter candidate slots and rooms; implicitly handles the
        // fixed-pin, hard-blackout and computer-room hard constraints
        let mut exam_slots = BTreeMap::new();
        let mut exam_rooms = BTreeMap::new();
        for exam in input.exams.iter().sorted_by_key(|e| e.id) {
            let slots: Vec<DaySlot> = match exam.fixed_slot {
                Some(pin) => input
                    .calendar
                    .day_slots()
                    .filter(|&at| at == pin && !input.calendar.is_blackout(at))
                    .collect(),
                None => input
                    .calendar
                    .day_slots()
                    .filter(|&at| !input.calendar.is_blackout(at))
                    .collect(),
            };
            if slots.is_empty() {
                return Err(Infeasibility::new(format!(
                    "exam {} has no feasible (day, slot) after blackout filtering",
                    exam.id
                )));
            }

            let rooms: Vec<RoomId> = input
                .rooms
                .iter()
                .sorted_by_key(|r| r.id)
                .filter(|r| !r.capabilities.is_empty())
                .filter(|r| {
                    exam.kind != ExamKind::ComputerBased
                        || r.capabilities.contains(&RoomCapability::Computer)
                })
                .map(|r| r.id)
                .collect();
            if rooms.is_empty() {
                return Err(Infeasibility::new(format!(
                    "exam {} has no candidate rooms",
                    exam.id
                )));
            }

            // aggregate seat check: if even the union of candidate rooms
            // cannot cover the demand, no solver run will either
            let need = demand.get(&exam.id).copied().unwrap_or_default();
            let cap_of = |pred: &dyn Fn(&Room) -> bool| -> u32 {
                input
                    .rooms
                    .iter()
                    .filter(|&r| rooms.contains(&r.id) && pred(r))
                    .map(|r| r.capacity)
                    .sum()
            };
            let accommodated_cap =
                cap_of(&|r| r.capabilities.contains(&RoomCapability::AccommodatedSeating));
            let standard_cap =
                cap_of(&|r| r.capabilities.contains(&RoomCapability::StandardSeating));
            let total_cap = cap_of(&|_| true);
            if accommodated_cap < need.accommodated
                || standard_cap < need.standard
                || total_cap < need.total()
            {
                return Err(Infeasibility::new(format!(
                    "exam {} demands {} accommodated + {} standard seats, more than its candidate rooms hold",
                    exam.id, need.accommodated, need.standard
                )));
            }

            exam_slots.insert(exam.id, slots);
            exam_rooms.insert(exam.id, rooms);
        }

        let mut vars = ProblemVariables::new();
        let mut slot_vars = BTreeMap::new();
        let mut room_vars = BTreeMap::new();
        for (&exam, slots) in &exam_slots {
            for &at in slots {
                slot_vars.insert((exam, at.day, at.slot), vars.add(variable().binary()));
            }
        }
        for (&exam, rooms) in &exam_rooms {
            for &room in rooms {
                room_vars.insert((exam, room), vars.add(variable().binary()));
            }
        }
        trace!(
            "created {} slot variables and {} room variables for {} exams",
            slot_vars.len(),
            room_vars.len(),
            input.exams.len()
        );

        Ok(Self {
            input,
            cfg,
            demand,
            exam_slots,
            exam_rooms,
            slot_vars,
            room_vars,
            vars,
            constraints: Vec::new(),
            objective: Expression::from(0.0),
        })
    }

    pub(crate) fn add_binary(&mut self) -> Variable {
        self.vars.add(variable().binary())
    }

    /// A continuous variable bounded below at zero; penalty lower bounds plus
    /// minimization make it land exactly on the intended step value.
    pub(crate) fn add_penalty_var(&mut self) -> Variable {
        self.vars.add(variable().min(0.0))
    }

    pub(crate) fn add_constraint(&mut self, c: Constraint) {
        self.constraints.push(c);
    }

    pub(crate) fn add_objective(&mut self, term: Expression) {
        self.objective += term;
    }

    /// Sum of the exam's slot variables on one day: 1 iff it sits that day.
    pub(crate) fn day_expr(&self, exam: ExamId, day: Day) -> Expression {
        Slot::ALL
            .iter()
            .filter_map(|&slot| self.slot_vars.get(&(exam, day, slot)))
            .copied()
            .sum()
    }

    /// Distinct candidate days of one exam, ascending.
    pub(crate) fn candidate_days(&self, exam: ExamId) -> Vec<Day> {
        self.exam_slots[&exam].iter().map(|at| at.day).dedup().collect()
    }

    /// Number of rooms assigned to one exam, as an expression.
    pub(crate) fn rooms_expr(&self, exam: ExamId) -> Expression {
        self.exam_rooms[&exam]
            .iter()
            .map(|&r| self.room_vars[&(exam, r)])
            .sum()
    }

    /// Number of roster exams that could sit somewhere in `days`; the
    /// ceiling any window count can reach, used to skip trivial rows.
    fn reachable_in(&self, roster: &[ExamId], days: std::ops::RangeInclusive<Day>) -> usize {
        roster
            .iter()
            .filter(|&&e| self.exam_slots[&e].iter().any(|at| days.contains(&at.day)))
            .count()
    }

    fn window_expr(&self, roster: &[ExamId], days: std::ops::RangeInclusive<Day>) -> Expression {
        roster
            .iter()
            .flat_map(|&e| {
                self.exam_slots[&e]
                    .iter()
                    .filter(|at| days.contains(&at.day))
                    .map(move |at| self.slot_vars[&(e, at.day, at.slot)])
            })
            .sum()
    }

    fn exam_placement_constraints(&mut self) {
        // every exam takes exactly one of its candidate slots
        for (&exam, slots) in &self.exam_slots {
            let scheduled_once: Expression = slots
                .iter()
                .map(|at| self.slot_vars[&(exam, at.day, at.slot)])
                .sum();
            self.constraints.push(constraint!(scheduled_once == 1));
        }

        let students = self
            .input
            .students
            .iter()
            .sorted_by_key(|s| s.id)
            .collect::<Vec<_>>();
        let exam_map = self.input.exam_map();

        // no student sits two exams in the same (day, slot)
        for student in &students {
            for at in self.input.calendar.day_slots() {
                let here: Vec<Variable> = student
                    .exams
                    .iter()
                    .filter_map(|&e| self.slot_vars.get(&(e, at.day, at.slot)))
                    .copied()
                    .collect();
                if here.len() >= 2 {
                    let occupied: Expression = here.into_iter().sum();
                    self.constraints.push(constraint!(occupied <= 1));
                }
            }
        }

        // core isolation: a core exam never shares a day with any other exam
        // of the same student
        for student in &students {
            let roster = student.exams.iter().sorted().dedup().collect::<Vec<_>>();
            for (i, &&a) in roster.iter().enumerate() {
                for &&b in &roster[i + 1..] {
                    if !exam_map[&a].is_core && !exam_map[&b].is_core {
                        continue;
                    }
                    let a_days = self.candidate_days(a);
                    let b_days = self.candidate_days(b);
                    for &day in a_days.iter().filter(|d| b_days.contains(*d)) {
                        let a_day = self.day_expr(a, day);
                        let b_day = self.day_expr(b, day);
                        self.constraints.push(constraint!(a_day + b_day <= 1));
                    }
                }
            }
        }

        // rolling density: 2-day and 5-day sliding windows per student
        let num_days = self.input.calendar.num_days;
        let w2 = self.cfg.window2_cap;
        let w5 = self.cfg.window5_cap;
        for student in &students {
            for start in 0..num_days.saturating_sub(1) {
                let window = start..=start + 1;
                if self.reachable_in(&student.exams, window.clone()) > w2 as usize {
                    let count = self.window_expr(&student.exams, window);
                    self.constraints.push(constraint!(count <= w2 as f64));
                }
            }
            for start in 0..num_days.saturating_sub(4) {
                let window = start..=start + 4;
                if self.reachable_in(&student.exams, window.clone()) > w5 as usize {
                    let count = self.window_expr(&student.exams, window);
                    self.constraints.push(constraint!(count <= w5 as f64));
                }
            }
        }

        // at most one exam per leader in the trailing week
        let week = self.cfg.final_week;
        for leader in self.input.leaders.iter().sorted_by_key(|l| l.id) {
            let led = leader.exams.iter().sorted().dedup().copied().collect::<Vec<_>>();
            if self.reachable_in(&led, week.start..=week.end) > 1 {
                let count = self.window_expr(&led, week.start..=week.end);
                self.constraints.push(constraint!(count <= 1));
            }
        }

        // extended-time 50% students: hard one-exam-per-day limit
        for student in &students {
            if student.accommodation != Accommodation::Extended50 {
                continue;
            }
            for day in 0..num_days {
                if self.reachable_in(&student.exams, day..=day) > 1 {
                    let on_day: Expression = student
                        .exams
                        .iter()
                        .map(|&e| self.day_expr(e, day))
                        .sum();
                    self.constraints.push(constraint!(on_day <= 1));
                }
            }
        }
    }

    fn room_constraints(&mut self) {
        let room_map = self.input.room_map();

        for (&exam, rooms) in &self.exam_rooms {
            let need = self.demand.get(&exam).copied().unwrap_or_default();
            let room_vars = &self.room_vars;

            let assigned: Expression =
                rooms.iter().map(|&r| room_vars[&(exam, r)]).sum();
            self.constraints.push(constraint!(assigned >= 1));

            let capacity_over = |pred: &dyn Fn(RoomId) -> bool| -> Expression {
                rooms
                    .iter()
                    .filter(|&&r| pred(r))
                    .map(|&r| room_map[&r].capacity as f64 * room_vars[&(exam, r)])
                    .sum()
            };

            if need.accommodated > 0 {
                let cover = capacity_over(&|r| {
                    room_map[&r].capabilities.contains(&RoomCapability::AccommodatedSeating)
                });
                self.constraints.push(constraint!(cover >= need.accommodated as f64));
            }
            if need.standard > 0 {
                let cover = capacity_over(&|r| {
                    room_map[&r].capabilities.contains(&RoomCapability::StandardSeating)
                });
                self.constraints.push(constraint!(cover >= need.standard as f64));
            }
            // capacity is shared, not partitioned: the assigned rooms must
            // also hold the whole cohort at once
            if need.total() > 0 {
                let cover = capacity_over(&|_| true);
                self.constraints.push(constraint!(cover >= need.total() as f64));
            }
        }

        // room mutual exclusion via occupancy links: z >= x + y - 1, and at
        // most one z per (room, day, slot)
        let mut occupants: BTreeMap<(RoomId, Day, Slot), Vec<(Variable, Variable)>> =
            BTreeMap::new();
        for (&exam, rooms) in &self.exam_rooms {
            for &at in &self.exam_slots[&exam] {
                let x = self.slot_vars[&(exam, at.day, at.slot)];
                for &room in rooms {
                    let y = self.room_vars[&(exam, room)];
                    occupants.entry((room, at.day, at.slot)).or_default().push((x, y));
                }
            }
        }
        for ((_room, _day, _slot), pairs) in occupants {
            if pairs.len() < 2 {
                continue;
            }
            let mut links = Vec::with_capacity(pairs.len());
            for (x, y) in pairs {
                let z = self.vars.add(variable().binary());
                self.constraints.push(constraint!(z >= x + y - 1));
                links.push(z);
            }
            let occupied: Expression = links.into_iter().sum();
            self.constraints.push(constraint!(occupied <= 1));
        }
    }

    /// Forbids re-finding an already-collected solution: its chosen slot and
    /// room variables cannot all be 1 again.
    fn exclude(&mut self, cut: &SolutionCut) {
        let mut support = Vec::new();
        support.extend(cut.slot_keys.iter().filter_map(|k| self.slot_vars.get(k)));
        support.extend(cut.room_keys.iter().filter_map(|k| self.room_vars.get(k)));
        let size = support.len();
        if size == 0 {
            return;
        }
        let chosen: Expression = support.into_iter().copied().sum();
        self.constraints.push(constraint!(chosen <= (size - 1) as f64));
    }

    fn finish(self) -> TimetableModel {
        TimetableModel {
            vars: self.vars,
            slot_vars: self.slot_vars,
            room_vars: self.room_vars,
            constraints: self.constraints,
            objective: self.objective,
        }
    }
}

/// One fully-built ILP model, ready for a single solver run.
pub struct TimetableModel {
    vars: ProblemVariables,
    slot_vars: BTreeMap<SlotKey, Variable>,
    room_vars: BTreeMap<RoomKey, Variable>,
    constraints: Vec<Constraint>,
    objective: Expression,
}

impl TimetableModel {
    /// Builds the decision-variable model with all hard constraints, the
    /// penalty objective, and any exclusion cuts from earlier solutions.
    pub fn build(
        input: &TimetableInput,
        cfg: &SolverConfig,
        cuts: &[SolutionCut],
    ) -> Result<Self, Infeasibility> {
        info!(
            "setting up ILP model with {} exams, {} rooms, {} days and {} cut(s)",
            input.exams.len(),
            input.rooms.len(),
            input.calendar.num_days,
            cuts.len()
        );
        let mut ctx = ModelContext::new(input, cfg)?;
        ctx.exam_placement_constraints();
        ctx.room_constraints();
        penalty::attach_penalties(&mut ctx);
        for cut in cuts {
            ctx.exclude(cut);
        }
        trace!("model carries {} constraint rows", ctx.constraints.len());
        Ok(ctx.finish())
    }

    /// Runs HiGHS once and extracts the chosen schedule.
    ///
    /// `Ok(None)` means the hard constraints admit no (further) assignment.
    /// The backend is pinned to one thread and a fixed seed so identical
    /// input yields an identical schedule.
    pub fn solve_once(self) -> Result<Option<Schedule>, SolveError> {
        let mut model = self
            .vars
            .minimise(self.objective)
            .using(default_solver)
            .set_option("threads", 1)
            .set_option("random_seed", 1234)
            .set_option("log_to_console", "false");
        for c in self.constraints {
            model.add_constraint(c);
        }

        let solution = match model.solve() {
            Ok(s) => s,
            Err(good_lp::ResolutionError::Infeasible) => {
                warn!("solver reports the hard constraints are infeasible");
                return Ok(None);
            }
            Err(e) => return Err(SolveError::Backend(e.to_string())),
        };

        let mut schedule = Schedule::new();
        for (&(exam, day, slot), var) in &self.slot_vars {
            if solution.value(*var) > 0.9 {
                schedule.insert(
                    exam,
                    ExamAssignment { day, slot, rooms: Default::default() },
                );
            }
        }
        for (&(exam, room), var) in &self.room_vars {
            if solution.value(*var) > 0.9 {
                if let Some(assignment) = schedule.get_mut(&exam) {
                    assignment.rooms.insert(room);
                }
            }
        }
        Ok(Some(schedule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Calendar, Exam, ModuleLeader, Student};
    use std::collections::BTreeSet;

    fn room(id: RoomId, caps: &[RoomCapability], capacity: u32) -> Room {
        Room { id, capabilities: caps.iter().copied().collect(), capacity }
    }

    fn input_with(exams: Vec<Exam>, students: Vec<Student>, calendar: Calendar) -> TimetableInput {
        TimetableInput {
            exams,
            students,
            leaders: vec![ModuleLeader { id: 1, exams: vec![] }],
            rooms: vec![
                room(1, &[RoomCapability::StandardSeating], 100),
                room(2, &[RoomCapability::AccommodatedSeating], 20),
                room(3, &[RoomCapability::Computer], 30),
            ],
            calendar,
        }
    }

    fn plain_exam(id: ExamId) -> Exam {
        Exam { id, kind: ExamKind::Standard, is_core: false, fixed_slot: None }
    }

    fn open_calendar(num_days: u32) -> Calendar {
        Calendar { num_days, blackouts: BTreeSet::new(), soft_blackouts: BTreeSet::new() }
    }

    #[test]
    fn candidates_respect_blackouts_and_pins() {
        let mut calendar = open_calendar(2);
        calendar.blackouts.insert(DaySlot::new(0, Slot::Morning));
        let mut pinned = plain_exam(1);
        pinned.fixed_slot = Some(DaySlot::new(1, Slot::Afternoon));
        let input = input_with(vec![pinned, plain_exam(2)], vec![], calendar);

        let cfg = SolverConfig::default();
        let ctx = ModelContext::new(&input, &cfg).unwrap();
        assert_eq!(ctx.exam_slots[&1], vec![DaySlot::new(1, Slot::Afternoon)]);
        // three open slots remain for the unpinned exam
        assert_eq!(ctx.exam_slots[&2].len(), 3);
        assert!(!ctx.exam_slots[&2].contains(&DaySlot::new(0, Slot::Morning)));
    }

    #[test]
    fn pin_into_blackout_is_structurally_infeasible() {
        let mut calendar = open_calendar(2);
        calendar.blackouts.insert(DaySlot::new(0, Slot::Morning));
        let mut pinned = plain_exam(1);
        pinned.fixed_slot = Some(DaySlot::new(0, Slot::Morning));
        let input = input_with(vec![pinned], vec![], calendar);

        let err = ModelContext::new(&input, &SolverConfig::default()).unwrap_err();
        assert!(err.reason.contains("exam 1"));
    }

    #[test]
    fn computer_exam_only_gets_computer_rooms() {
        let mut exam = plain_exam(1);
        exam.kind = ExamKind::ComputerBased;
        let input = input_with(vec![exam], vec![], open_calendar(1));

        let cfg = SolverConfig::default();
        let ctx = ModelContext::new(&input, &cfg).unwrap();
        assert_eq!(ctx.exam_rooms[&1], vec![3]);
    }

    #[test]
    fn overflowing_seat_demand_is_structurally_infeasible() {
        let students = (0..200)
            .map(|id| Student {
                id,
                accommodation: Accommodation::None,
                exams: vec![1],
            })
            .collect();
        let input = input_with(vec![plain_exam(1)], students, open_calendar(1));

        let err = ModelContext::new(&input, &SolverConfig::default()).unwrap_err();
        assert!(err.reason.contains("seats"));
    }

    #[test]
    fn cut_keys_cover_slots_and_rooms() {
        let schedule = Schedule::from([(
            7,
            ExamAssignment {
                day: 2,
                slot: Slot::Morning,
                rooms: BTreeSet::from([4, 9]),
            },
        )]);
        let cut = SolutionCut::from_schedule(&schedule);
        assert_eq!(cut.slot_keys, vec![(7, 2, Slot::Morning)]);
        assert_eq!(cut.room_keys, vec![(7, 4), (7, 9)]);
    }
}
