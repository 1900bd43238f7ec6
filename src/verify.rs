//! Independent schedule verification.
//!
//! Given a domain snapshot and any finished schedule (solver output or an
//! externally edited timetable), this module re-derives every hard violation
//! and soft warning by direct counting over the schedule. It deliberately
//! shares nothing with the constraint encoding in `model`: the point is a
//! second, structurally different implementation of the rule set, used to
//! sanity-check solver output and to audit hand-modified timetables.
//!
//! Verification never mutates its inputs and has no side effects beyond the
//! returned list.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::SolverConfig;
use crate::domain::{
    Accommodation, Day, DaySlot, ExamAssignment, ExamId, ExamKind, LeaderId,
    RoomCapability, RoomId, Schedule, Slot, Student, StudentId, TimetableInput,
};

/// Hard failures block a timetable; soft findings are advisory warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Hard,
    Soft,
}

/// Which rule a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    // hard
    Unscheduled,
    UnknownExam,
    UnknownRoom,
    OutsideCalendar,
    Clash,
    CoreIsolation,
    FixedPin,
    Blackout,
    WindowDensity,
    LeaderFinalWeek,
    ExtraTimeExclusive,
    MissingRoom,
    Capacity,
    ComputerRoom,
    DoubleBooked,
    // soft
    ExtraTimeMulti,
    SoftBlackout,
    RoomSurplus,
    WrongCapability,
    SlotCongestion,
    LeaderSpread,
}

/// An entity involved in a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum EntityRef {
    Exam(ExamId),
    Student(StudentId),
    Leader(LeaderId),
    Room(RoomId),
}

/// One verification finding: severity, rule, message, involved entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub severity: Severity,
    pub rule: Rule,
    pub message: String,
    pub entities: Vec<EntityRef>,
}

impl Violation {
    fn hard(rule: Rule, message: impl Into<String>, entities: Vec<EntityRef>) -> Self {
        Self { severity: Severity::Hard, rule, message: message.into(), entities }
    }

    fn soft(rule: Rule, message: impl Into<String>, entities: Vec<EntityRef>) -> Self {
        Self { severity: Severity::Soft, rule, message: message.into(), entities }
    }

    pub fn is_hard(&self) -> bool {
        self.severity == Severity::Hard
    }
}

/// Re-derives every hard violation and soft warning of a schedule.
///
/// The schedule may be partial or externally authored: exams present in the
/// snapshot but absent from the schedule are hard violations, as are
/// references to unknown exams or rooms. Output order is deterministic:
/// hard rule families first, in rule order, entities ascending within each.
pub fn verify(
    input: &TimetableInput,
    cfg: &SolverConfig,
    schedule: &Schedule,
) -> Vec<Violation> {
    let mut out = Vec::new();
    check_coverage(input, schedule, &mut out);
    check_clashes(input, schedule, &mut out);
    check_core_isolation(input, schedule, &mut out);
    check_fixed_pins(input, schedule, &mut out);
    check_blackouts(input, schedule, &mut out);
    check_window_density(input, cfg, schedule, &mut out);
    check_leader_final_week(input, cfg, schedule, &mut out);
    check_extra_time_exclusive(input, schedule, &mut out);
    check_rooms(input, schedule, &mut out);
    check_double_booking(input, schedule, &mut out);

    check_extra_time_multi(input, schedule, &mut out);
    check_soft_blackouts(input, schedule, &mut out);
    check_room_surplus(schedule, &mut out);
    check_wrong_capability(input, schedule, &mut out);
    check_slot_congestion(schedule, &mut out);
    check_leader_spread(input, schedule, &mut out);
    out
}

/// Scheduled roster of one student: only exams that are actually placed.
fn placed_roster<'a>(
    student_exams: &[ExamId],
    schedule: &'a Schedule,
) -> Vec<(ExamId, &'a ExamAssignment)> {
    student_exams
        .iter()
        .sorted()
        .dedup()
        .filter_map(|&e| schedule.get(&e).map(|a| (e, a)))
        .collect()
}

fn sorted_students(input: &TimetableInput) -> Vec<&Student> {
    input.students.iter().sorted_by_key(|s| s.id).collect()
}

fn check_coverage(input: &TimetableInput, schedule: &Schedule, out: &mut Vec<Violation>) {
    let exam_map = input.exam_map();
    for exam in input.exams.iter().map(|e| e.id).sorted() {
        if !schedule.contains_key(&exam) {
            out.push(Violation::hard(
                Rule::Unscheduled,
                format!("exam {exam} is not scheduled in the timetable"),
                vec![EntityRef::Exam(exam)],
            ));
        }
    }
    for &exam in schedule.keys() {
        if !exam_map.contains_key(&exam) {
            out.push(Violation::hard(
                Rule::UnknownExam,
                format!("schedule places exam {exam}, which the snapshot does not know"),
                vec![EntityRef::Exam(exam)],
            ));
        }
    }
}

fn check_clashes(input: &TimetableInput, schedule: &Schedule, out: &mut Vec<Violation>) {
    for student in sorted_students(input) {
        let placed = placed_roster(&student.exams, schedule);
        for (i, &(exam_a, at_a)) in placed.iter().enumerate() {
            for &(exam_b, at_b) in &placed[i + 1..] {
                if at_a.day == at_b.day && at_a.slot == at_b.slot {
                    out.push(Violation::hard(
                        Rule::Clash,
                        format!(
                            "student {} has exams {} and {} at the same time (day {}, {})",
                            student.id, exam_a, exam_b, at_a.day, at_a.slot
                        ),
                        vec![
                            EntityRef::Student(student.id),
                            EntityRef::Exam(exam_a),
                            EntityRef::Exam(exam_b),
                        ],
                    ));
                }
            }
        }
    }
}

fn check_core_isolation(input: &TimetableInput, schedule: &Schedule, out: &mut Vec<Violation>) {
    let exam_map = input.exam_map();
    for student in sorted_students(input) {
        let placed = placed_roster(&student.exams, schedule);
        for (i, &(exam_a, at_a)) in placed.iter().enumerate() {
            for &(exam_b, at_b) in &placed[i + 1..] {
                let a_core = exam_map.get(&exam_a).is_some_and(|e| e.is_core);
                let b_core = exam_map.get(&exam_b).is_some_and(|e| e.is_core);
                if (a_core || b_core) && at_a.day == at_b.day {
                    let core = if a_core { exam_a } else { exam_b };
                    let other = if a_core { exam_b } else { exam_a };
                    out.push(Violation::hard(
                        Rule::CoreIsolation,
                        format!(
                            "student {} has core exam {} sharing day {} with exam {}",
                            student.id, core, at_a.day, other
                        ),
                        vec![
                            EntityRef::Student(student.id),
                            EntityRef::Exam(core),
                            EntityRef::Exam(other),
                        ],
                    ));
                }
            }
        }
    }
}

fn check_fixed_pins(input: &TimetableInput, schedule: &Schedule, out: &mut Vec<Violation>) {
    for exam in input.exams.iter().sorted_by_key(|e| e.id) {
        let (Some(pin), Some(at)) = (exam.fixed_slot, schedule.get(&exam.id)) else {
            continue;
        };
        if at.at() != pin {
            out.push(Violation::hard(
                Rule::FixedPin,
                format!(
                    "exam {} is pinned to {pin} but scheduled at {}",
                    exam.id,
                    at.at()
                ),
                vec![EntityRef::Exam(exam.id)],
            ));
        }
    }
}

fn check_blackouts(input: &TimetableInput, schedule: &Schedule, out: &mut Vec<Violation>) {
    for (&exam, at) in schedule {
        if at.day >= input.calendar.num_days {
            out.push(Violation::hard(
                Rule::OutsideCalendar,
                format!(
                    "exam {exam} is scheduled on day {}, outside the {}-day calendar",
                    at.day, input.calendar.num_days
                ),
                vec![EntityRef::Exam(exam)],
            ));
        } else if input.calendar.is_blackout(at.at()) {
            out.push(Violation::hard(
                Rule::Blackout,
                format!("exam {exam} is scheduled in the blackout {}", at.at()),
                vec![EntityRef::Exam(exam)],
            ));
        }
    }
}

fn check_window_density(
    input: &TimetableInput,
    cfg: &SolverConfig,
    schedule: &Schedule,
    out: &mut Vec<Violation>,
) {
    let num_days = input.calendar.num_days;
    for student in sorted_students(input) {
        let mut per_day: BTreeMap<Day, u32> = BTreeMap::new();
        for (_, at) in placed_roster(&student.exams, schedule) {
            *per_day.entry(at.day).or_default() += 1;
        }
        for (span, cap, rule_len) in [(2u32, cfg.window2_cap, "2"), (5, cfg.window5_cap, "5")]
        {
            for start in 0..num_days.saturating_sub(span - 1) {
                let total: u32 =
                    (start..start + span).map(|d| per_day.get(&d).copied().unwrap_or(0)).sum();
                if total > cap {
                    out.push(Violation::hard(
                        Rule::WindowDensity,
                        format!(
                            "student {} sits {} exams across days {}..={}, above the {}-day cap of {}",
                            student.id,
                            total,
                            start,
                            start + span - 1,
                            rule_len,
                            cap
                        ),
                        vec![EntityRef::Student(student.id)],
                    ));
                }
            }
        }
    }
}

fn check_leader_final_week(
    input: &TimetableInput,
    cfg: &SolverConfig,
    schedule: &Schedule,
    out: &mut Vec<Violation>,
) {
    for leader in input.leaders.iter().sorted_by_key(|l| l.id) {
        let in_week: Vec<ExamId> = leader
            .exams
            .iter()
            .sorted()
            .dedup()
            .filter(|&&e| {
                schedule.get(&e).is_some_and(|at| cfg.final_week.contains(at.day))
            })
            .copied()
            .collect();
        if in_week.len() > 1 {
            let mut entities = vec![EntityRef::Leader(leader.id)];
            entities.extend(in_week.iter().map(|&e| EntityRef::Exam(e)));
            out.push(Violation::hard(
                Rule::LeaderFinalWeek,
                format!(
                    "leader {} has {} exams in the final week (days {}..={}): {:?}",
                    leader.id,
                    in_week.len(),
                    cfg.final_week.start,
                    cfg.final_week.end,
                    in_week
                ),
                entities,
            ));
        }
    }
}

fn check_extra_time_exclusive(
    input: &TimetableInput,
    schedule: &Schedule,
    out: &mut Vec<Violation>,
) {
    for student in sorted_students(input) {
        if student.accommodation != Accommodation::Extended50 {
            continue;
        }
        let mut per_day: BTreeMap<Day, u32> = BTreeMap::new();
        for (_, at) in placed_roster(&student.exams, schedule) {
            *per_day.entry(at.day).or_default() += 1;
        }
        for (day, count) in per_day {
            if count > 1 {
                out.push(Violation::hard(
                    Rule::ExtraTimeExclusive,
                    format!(
                        "student {} with 50% extra time has {count} exams on day {day}",
                        student.id
                    ),
                    vec![EntityRef::Student(student.id)],
                ));
            }
        }
    }
}

fn check_rooms(input: &TimetableInput, schedule: &Schedule, out: &mut Vec<Violation>) {
    let exam_map = input.exam_map();
    let room_map = input.room_map();
    let demand = input.seat_demand();

    for (&exam, at) in schedule {
        if at.rooms.is_empty() {
            out.push(Violation::hard(
                Rule::MissingRoom,
                format!("exam {exam} has no assigned room"),
                vec![EntityRef::Exam(exam)],
            ));
            continue;
        }
        let mut known = Vec::new();
        for &room in &at.rooms {
            match room_map.get(&room) {
                Some(r) => known.push(*r),
                None => out.push(Violation::hard(
                    Rule::UnknownRoom,
                    format!("exam {exam} is assigned unknown room {room}"),
                    vec![EntityRef::Exam(exam), EntityRef::Room(room)],
                )),
            }
        }

        let Some(need) = demand.get(&exam) else { continue };
        let accommodated_cap: u32 = known
            .iter()
            .filter(|r| r.capabilities.contains(&RoomCapability::AccommodatedSeating))
            .map(|r| r.capacity)
            .sum();
        let standard_cap: u32 = known
            .iter()
            .filter(|r| r.capabilities.contains(&RoomCapability::StandardSeating))
            .map(|r| r.capacity)
            .sum();
        let total_cap: u32 = known.iter().map(|r| r.capacity).sum();
        if accommodated_cap < need.accommodated {
            out.push(Violation::hard(
                Rule::Capacity,
                format!(
                    "exam {exam} has insufficient accommodated capacity: needed {}, assigned {}",
                    need.accommodated, accommodated_cap
                ),
                vec![EntityRef::Exam(exam)],
            ));
        }
        if standard_cap < need.standard {
            out.push(Violation::hard(
                Rule::Capacity,
                format!(
                    "exam {exam} has insufficient standard capacity: needed {}, assigned {}",
                    need.standard, standard_cap
                ),
                vec![EntityRef::Exam(exam)],
            ));
        }
        if total_cap < need.total() {
            out.push(Violation::hard(
                Rule::Capacity,
                format!(
                    "exam {exam} seats {} students in rooms holding {total_cap} overall",
                    need.total()
                ),
                vec![EntityRef::Exam(exam)],
            ));
        }

        if exam_map.get(&exam).is_some_and(|e| e.kind == ExamKind::ComputerBased) {
            for room in &known {
                if !room.capabilities.contains(&RoomCapability::Computer) {
                    out.push(Violation::hard(
                        Rule::ComputerRoom,
                        format!(
                            "computer-based exam {exam} is assigned non-computer room {}",
                            room.id
                        ),
                        vec![EntityRef::Exam(exam), EntityRef::Room(room.id)],
                    ));
                }
            }
        }
    }
}

fn check_double_booking(input: &TimetableInput, schedule: &Schedule, out: &mut Vec<Violation>) {
    let room_map = input.room_map();
    let mut bookings: BTreeMap<(RoomId, Day, Slot), Vec<ExamId>> = BTreeMap::new();
    for (&exam, at) in schedule {
        for &room in &at.rooms {
            if room_map.contains_key(&room) {
                bookings.entry((room, at.day, at.slot)).or_default().push(exam);
            }
        }
    }
    for ((room, day, slot), exams) in bookings {
        if exams.len() > 1 {
            let mut entities = vec![EntityRef::Room(room)];
            entities.extend(exams.iter().map(|&e| EntityRef::Exam(e)));
            out.push(Violation::hard(
                Rule::DoubleBooked,
                format!("room {room} is double-booked on day {day} {slot} by exams {exams:?}"),
                entities,
            ));
        }
    }
}

fn check_extra_time_multi(
    input: &TimetableInput,
    schedule: &Schedule,
    out: &mut Vec<Violation>,
) {
    for student in sorted_students(input) {
        if student.accommodation != Accommodation::Extended25 {
            continue;
        }
        let mut per_day: BTreeMap<Day, u32> = BTreeMap::new();
        for (_, at) in placed_roster(&student.exams, schedule) {
            *per_day.entry(at.day).or_default() += 1;
        }
        for (day, count) in per_day {
            if count > 1 {
                out.push(Violation::soft(
                    Rule::ExtraTimeMulti,
                    format!(
                        "student {} with 25% extra time has {count} exams on day {day}",
                        student.id
                    ),
                    vec![EntityRef::Student(student.id)],
                ));
            }
        }
    }
}

fn check_soft_blackouts(input: &TimetableInput, schedule: &Schedule, out: &mut Vec<Violation>) {
    for (&exam, at) in schedule {
        if at.day < input.calendar.num_days && input.calendar.is_soft_blackout(at.at()) {
            out.push(Violation::soft(
                Rule::SoftBlackout,
                format!("exam {exam} sits in the discouraged slot {}", at.at()),
                vec![EntityRef::Exam(exam)],
            ));
        }
    }
}

fn check_room_surplus(schedule: &Schedule, out: &mut Vec<Violation>) {
    for (&exam, at) in schedule {
        if at.rooms.len() >= 3 {
            out.push(Violation::soft(
                Rule::RoomSurplus,
                format!("exam {exam} is spread over {} rooms", at.rooms.len()),
                vec![EntityRef::Exam(exam)],
            ));
        }
    }
}

fn check_wrong_capability(
    input: &TimetableInput,
    schedule: &Schedule,
    out: &mut Vec<Violation>,
) {
    let exam_map = input.exam_map();
    let room_map = input.room_map();
    let demand = input.seat_demand();
    for (&exam, at) in schedule {
        let Some(domain_exam) = exam_map.get(&exam) else { continue };
        let accommodated =
            demand.get(&exam).map(|d| d.accommodated).unwrap_or(0);
        for &room in &at.rooms {
            let Some(domain_room) = room_map.get(&room) else { continue };
            let caps = &domain_room.capabilities;
            if domain_exam.kind != ExamKind::ComputerBased
                && caps.contains(&RoomCapability::Computer)
            {
                out.push(Violation::soft(
                    Rule::WrongCapability,
                    format!("exam {exam} occupies computer room {room} without being computer-based"),
                    vec![EntityRef::Exam(exam), EntityRef::Room(room)],
                ));
            } else if accommodated == 0
                && caps.contains(&RoomCapability::AccommodatedSeating)
                && !caps.contains(&RoomCapability::StandardSeating)
            {
                out.push(Violation::soft(
                    Rule::WrongCapability,
                    format!(
                        "exam {exam} occupies accommodated-seating room {room} with no accommodated candidates"
                    ),
                    vec![EntityRef::Exam(exam), EntityRef::Room(room)],
                ));
            }
        }
    }
}

fn check_slot_congestion(schedule: &Schedule, out: &mut Vec<Violation>) {
    let mut per_slot: BTreeMap<DaySlot, Vec<ExamId>> = BTreeMap::new();
    for (&exam, at) in schedule {
        per_slot.entry(at.at()).or_default().push(exam);
    }
    for (at, exams) in per_slot {
        if exams.len() >= 4 {
            out.push(Violation::soft(
                Rule::SlotCongestion,
                format!("{at} hosts {} exams, an invigilation overload: {exams:?}", exams.len()),
                exams.iter().map(|&e| EntityRef::Exam(e)).collect(),
            ));
        } else if exams.len() == 3 {
            out.push(Violation::soft(
                Rule::SlotCongestion,
                format!("{at} hosts 3 exams: {exams:?}"),
                exams.iter().map(|&e| EntityRef::Exam(e)).collect(),
            ));
        }
    }
}

fn check_leader_spread(input: &TimetableInput, schedule: &Schedule, out: &mut Vec<Violation>) {
    for (a, b) in input.leader_pairs() {
        let (Some(at_a), Some(at_b)) = (schedule.get(&a), schedule.get(&b)) else {
            continue;
        };
        let gap = at_a.day.abs_diff(at_b.day);
        if gap < 4 {
            out.push(Violation::soft(
                Rule::LeaderSpread,
                format!("co-led exams {a} and {b} sit only {gap} day(s) apart"),
                vec![EntityRef::Exam(a), EntityRef::Exam(b)],
            ));
        }
    }
}
