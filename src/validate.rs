//! Fail-fast structural checks on the domain snapshot and configuration.
//!
//! Everything here runs before a single decision variable exists. A snapshot
//! that references a missing exam, carries an empty roster, or comes with a
//! nonsense configuration is rejected outright rather than surfacing later as
//! a confusing infeasibility.

use std::collections::BTreeSet;

use crate::config::SolverConfig;
use crate::domain::TimetableInput;

/// A single structural problem with the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputError {
    pub kind: InputErrorKind,
    pub message: String,
}

/// Categories of structural input problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorKind {
    /// Two entities share the same id.
    DuplicateId,
    /// A roster or leader mapping references an exam that doesn't exist.
    UnknownExam,
    /// A student is enrolled in nothing.
    EmptyRoster,
    /// There are no exams to schedule, or no rooms to seat them in.
    EmptySnapshot,
    /// The calendar has no days, or a pin/blackout points outside it.
    BadCalendar,
    /// A configuration knob is out of its sensible range.
    BadConfig,
}

impl InputError {
    pub fn new(kind: InputErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Validates the snapshot and configuration.
///
/// Returns every detected problem at once rather than stopping at the first,
/// so a caller can fix a whole batch of ingestion mistakes in one round.
pub fn check_input(
    input: &TimetableInput,
    cfg: &SolverConfig,
) -> Result<(), Vec<InputError>> {
    let mut errors = Vec::new();

    if input.exams.is_empty() {
        errors.push(InputError::new(
            InputErrorKind::EmptySnapshot,
            "snapshot contains no exams",
        ));
    }
    if input.rooms.is_empty() {
        errors.push(InputError::new(
            InputErrorKind::EmptySnapshot,
            "snapshot contains no rooms",
        ));
    }

    // duplicate ids
    let mut exam_ids = BTreeSet::new();
    for exam in &input.exams {
        if !exam_ids.insert(exam.id) {
            errors.push(InputError::new(
                InputErrorKind::DuplicateId,
                format!("duplicate exam id {}", exam.id),
            ));
        }
    }
    let mut student_ids = BTreeSet::new();
    for student in &input.students {
        if !student_ids.insert(student.id) {
            errors.push(InputError::new(
                InputErrorKind::DuplicateId,
                format!("duplicate student id {}", student.id),
            ));
        }
    }
    let mut room_ids = BTreeSet::new();
    for room in &input.rooms {
        if !room_ids.insert(room.id) {
            errors.push(InputError::new(
                InputErrorKind::DuplicateId,
                format!("duplicate room id {}", room.id),
            ));
        }
    }
    let mut leader_ids = BTreeSet::new();
    for leader in &input.leaders {
        if !leader_ids.insert(leader.id) {
            errors.push(InputError::new(
                InputErrorKind::DuplicateId,
                format!("duplicate leader id {}", leader.id),
            ));
        }
    }

    // dangling references and empty rosters
    for student in &input.students {
        if student.exams.is_empty() {
            errors.push(InputError::new(
                InputErrorKind::EmptyRoster,
                format!("student {} has no exams", student.id),
            ));
        }
        for exam in &student.exams {
            if !exam_ids.contains(exam) {
                errors.push(InputError::new(
                    InputErrorKind::UnknownExam,
                    format!("student {} references unknown exam {}", student.id, exam),
                ));
            }
        }
    }
    for leader in &input.leaders {
        for exam in &leader.exams {
            if !exam_ids.contains(exam) {
                errors.push(InputError::new(
                    InputErrorKind::UnknownExam,
                    format!("leader {} references unknown exam {}", leader.id, exam),
                ));
            }
        }
    }

    // calendar sanity
    let num_days = input.calendar.num_days;
    if num_days == 0 {
        errors.push(InputError::new(
            InputErrorKind::BadCalendar,
            "calendar has zero days",
        ));
    }
    for at in &input.calendar.blackouts {
        if at.day >= num_days {
            errors.push(InputError::new(
                InputErrorKind::BadCalendar,
                format!("hard blackout {at} lies outside the {num_days}-day calendar"),
            ));
        }
    }
    for at in &input.calendar.soft_blackouts {
        if at.day >= num_days {
            errors.push(InputError::new(
                InputErrorKind::BadCalendar,
                format!("soft blackout {at} lies outside the {num_days}-day calendar"),
            ));
        }
    }
    for exam in &input.exams {
        if let Some(pin) = exam.fixed_slot {
            if pin.day >= num_days {
                errors.push(InputError::new(
                    InputErrorKind::BadCalendar,
                    format!("exam {} is pinned to {pin}, outside the calendar", exam.id),
                ));
            }
        }
    }

    // configuration sanity
    if cfg.window2_cap == 0 || cfg.window5_cap == 0 {
        errors.push(InputError::new(
            InputErrorKind::BadConfig,
            "rolling-window caps must be at least 1",
        ));
    }
    if cfg.solution_cap == 0 {
        errors.push(InputError::new(
            InputErrorKind::BadConfig,
            "solution cap must be at least 1",
        ));
    }
    if cfg.final_week.start > cfg.final_week.end {
        errors.push(InputError::new(
            InputErrorKind::BadConfig,
            format!(
                "final-week range {}..={} is inverted",
                cfg.final_week.start, cfg.final_week.end
            ),
        ));
    }
    if let Some(limit) = cfg.time_limit {
        if !limit.is_finite() || limit <= 0.0 {
            errors.push(InputError::new(
                InputErrorKind::BadConfig,
                "time limit must be a positive number of seconds",
            ));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Accommodation, Calendar, DaySlot, Exam, ExamKind, ModuleLeader, Room, Slot,
        Student, TimetableInput,
    };
    use std::collections::BTreeSet;

    fn sample_input() -> TimetableInput {
        TimetableInput {
            exams: vec![
                Exam { id: 1, kind: ExamKind::Standard, is_core: false, fixed_slot: None },
                Exam { id: 2, kind: ExamKind::Standard, is_core: false, fixed_slot: None },
            ],
            students: vec![Student {
                id: 10,
                accommodation: Accommodation::None,
                exams: vec![1, 2],
            }],
            leaders: vec![ModuleLeader { id: 20, exams: vec![1] }],
            rooms: vec![Room {
                id: 30,
                capabilities: BTreeSet::from([crate::domain::RoomCapability::StandardSeating]),
                capacity: 50,
            }],
            calendar: Calendar {
                num_days: 5,
                blackouts: BTreeSet::new(),
                soft_blackouts: BTreeSet::new(),
            },
        }
    }

    #[test]
    fn valid_input_passes() {
        assert!(check_input(&sample_input(), &SolverConfig::default()).is_ok());
    }

    #[test]
    fn duplicate_exam_id_is_rejected() {
        let mut input = sample_input();
        input.exams.push(Exam {
            id: 1,
            kind: ExamKind::Standard,
            is_core: false,
            fixed_slot: None,
        });
        let errors = check_input(&input, &SolverConfig::default()).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == InputErrorKind::DuplicateId));
    }

    #[test]
    fn unknown_exam_reference_is_rejected() {
        let mut input = sample_input();
        input.students[0].exams.push(99);
        let errors = check_input(&input, &SolverConfig::default()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == InputErrorKind::UnknownExam && e.message.contains("99")));
    }

    #[test]
    fn unknown_leader_exam_is_rejected() {
        let mut input = sample_input();
        input.leaders[0].exams.push(42);
        let errors = check_input(&input, &SolverConfig::default()).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == InputErrorKind::UnknownExam));
    }

    #[test]
    fn empty_roster_is_rejected() {
        let mut input = sample_input();
        input.students[0].exams.clear();
        let errors = check_input(&input, &SolverConfig::default()).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == InputErrorKind::EmptyRoster));
    }

    #[test]
    fn out_of_calendar_pin_is_rejected() {
        let mut input = sample_input();
        input.exams[0].fixed_slot = Some(DaySlot::new(7, Slot::Morning));
        let errors = check_input(&input, &SolverConfig::default()).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == InputErrorKind::BadCalendar));
    }

    #[test]
    fn out_of_calendar_blackout_is_rejected() {
        let mut input = sample_input();
        input.calendar.blackouts.insert(DaySlot::new(9, Slot::Afternoon));
        let errors = check_input(&input, &SolverConfig::default()).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == InputErrorKind::BadCalendar));
    }

    #[test]
    fn zero_solution_cap_is_rejected() {
        let cfg = SolverConfig { solution_cap: 0, ..SolverConfig::default() };
        let errors = check_input(&sample_input(), &cfg).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == InputErrorKind::BadConfig));
    }

    #[test]
    fn multiple_problems_are_reported_together() {
        let mut input = sample_input();
        input.students[0].exams = vec![99];
        input.calendar.num_days = 0;
        let errors = check_input(&input, &SolverConfig::default()).unwrap_err();
        assert!(errors.len() >= 2);
    }
}
