//! End-to-end properties of the solve/verify round trip on small instances.

use std::collections::BTreeSet;

use exam_timetabler::config::{DayRange, SolverConfig};
use exam_timetabler::domain::{
    Accommodation, Calendar, DaySlot, Exam, ExamKind, ModuleLeader, Room,
    RoomCapability, RoomId, Slot, Student, TimetableInput,
};
use exam_timetabler::solve::{SolveStatus, solve};
use exam_timetabler::verify::verify;

fn exam(id: u32) -> Exam {
    Exam { id, kind: ExamKind::Standard, is_core: false, fixed_slot: None }
}

fn hall(id: RoomId, capacity: u32) -> Room {
    Room {
        id,
        capabilities: BTreeSet::from([RoomCapability::StandardSeating]),
        capacity,
    }
}

fn open_calendar(num_days: u32) -> Calendar {
    Calendar {
        num_days,
        blackouts: BTreeSet::new(),
        soft_blackouts: BTreeSet::new(),
    }
}

/// Student A sits Math(1)+Physics(2), B sits Physics(2)+Chemistry(3),
/// C sits Math(1); two days of two slots.
fn worked_example() -> TimetableInput {
    TimetableInput {
        exams: vec![exam(1), exam(2), exam(3)],
        students: vec![
            Student { id: 100, accommodation: Accommodation::None, exams: vec![1, 2] },
            Student { id: 101, accommodation: Accommodation::None, exams: vec![2, 3] },
            Student { id: 102, accommodation: Accommodation::None, exams: vec![1] },
        ],
        leaders: vec![],
        rooms: vec![hall(1, 50), hall(2, 50), hall(3, 50)],
        calendar: open_calendar(2),
    }
}

fn small_config() -> SolverConfig {
    SolverConfig { window2_cap: 2, solution_cap: 3, ..SolverConfig::default() }
}

#[test]
fn worked_example_is_feasible_and_clash_free() {
    let input = worked_example();
    let cfg = small_config();
    let report = solve(&input, &cfg).unwrap();

    assert!(matches!(report.status, SolveStatus::Capped | SolveStatus::Exhausted));
    assert!(!report.schedules.is_empty());
    for scored in &report.schedules {
        let math = &scored.schedule[&1];
        let physics = &scored.schedule[&2];
        assert!(
            math.day != physics.day || math.slot != physics.slot,
            "student 100 clashes in {scored:?}"
        );
    }
}

#[test]
fn solver_output_verifies_clean() {
    let input = worked_example();
    let cfg = small_config();
    let report = solve(&input, &cfg).unwrap();

    let best = report.best().expect("a feasible schedule");
    let violations = verify(&input, &cfg, &best.schedule);
    assert!(
        violations.iter().all(|v| !v.is_hard()),
        "solver output has hard violations: {violations:?}"
    );
}

#[test]
fn identical_runs_return_identical_rankings() {
    let input = worked_example();
    let cfg = small_config();

    let first = solve(&input, &cfg).unwrap();
    let second = solve(&input, &cfg).unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.schedules, second.schedules);
}

#[test]
fn extended50_student_with_same_day_pins_is_infeasible() {
    let mut input = worked_example();
    input.exams[0].fixed_slot = Some(DaySlot::new(0, Slot::Morning));
    input.exams[1].fixed_slot = Some(DaySlot::new(0, Slot::Afternoon));
    input.students[0].accommodation = Accommodation::Extended50;

    let report = solve(&input, &small_config()).unwrap();
    assert_eq!(report.status, SolveStatus::Infeasible);
    assert!(report.schedules.is_empty());
}

#[test]
fn fixed_pins_are_honored_in_every_solution() {
    let mut input = worked_example();
    input.exams[2].fixed_slot = Some(DaySlot::new(1, Slot::Afternoon));

    let report = solve(&input, &small_config()).unwrap();
    assert!(!report.schedules.is_empty());
    for scored in &report.schedules {
        assert_eq!(scored.schedule[&3].at(), DaySlot::new(1, Slot::Afternoon));
    }
}

#[test]
fn rooms_are_never_double_booked() {
    let input = worked_example();
    let report = solve(&input, &small_config()).unwrap();

    for scored in &report.schedules {
        let mut seen = BTreeSet::new();
        for assignment in scored.schedule.values() {
            for &room in &assignment.rooms {
                assert!(
                    seen.insert((room, assignment.day, assignment.slot)),
                    "room {room} double-booked in {scored:?}"
                );
            }
        }
    }
}

#[test]
fn enumeration_stops_at_the_cap_and_sorts_ascending() {
    let input = TimetableInput {
        exams: vec![exam(1)],
        students: vec![Student {
            id: 100,
            accommodation: Accommodation::None,
            exams: vec![1],
        }],
        leaders: vec![],
        rooms: vec![hall(1, 50)],
        calendar: open_calendar(2),
    };
    let cfg = SolverConfig { solution_cap: 2, ..SolverConfig::default() };

    let report = solve(&input, &cfg).unwrap();
    assert_eq!(report.status, SolveStatus::Capped);
    assert_eq!(report.schedules.len(), 2);
    assert!(report.schedules[0].penalty <= report.schedules[1].penalty);
}

#[test]
fn leader_exams_spread_out_when_days_allow() {
    let input = TimetableInput {
        exams: vec![exam(1), exam(2)],
        students: vec![
            Student { id: 100, accommodation: Accommodation::None, exams: vec![1] },
            Student { id: 101, accommodation: Accommodation::None, exams: vec![2] },
        ],
        leaders: vec![ModuleLeader { id: 5, exams: vec![1, 2] }],
        rooms: vec![hall(1, 50)],
        calendar: open_calendar(6),
    };
    let cfg = SolverConfig { solution_cap: 1, ..SolverConfig::default() };

    let report = solve(&input, &cfg).unwrap();
    let best = report.best().expect("a feasible schedule");
    let gap = best.schedule[&1].day.abs_diff(best.schedule[&2].day);
    assert!(gap >= 4, "leader's exams only {gap} day(s) apart in the best schedule");
    assert_eq!(best.penalty, 0);
}

#[test]
fn deadline_of_zero_returns_timed_out_with_nothing() {
    let input = worked_example();
    let cfg = SolverConfig { time_limit: Some(1e-9), ..small_config() };

    let report = solve(&input, &cfg).unwrap();
    assert_eq!(report.status, SolveStatus::TimedOut);
    assert!(report.schedules.is_empty());
}

#[test]
fn soft_blackouts_steer_the_best_schedule() {
    // one exam, two days; three of the four slots are discouraged
    let input = TimetableInput {
        exams: vec![exam(1)],
        students: vec![Student::new(100, vec![1])],
        leaders: vec![],
        rooms: vec![hall(1, 50)],
        calendar: Calendar::new(2)
            .with_soft_blackout(DaySlot::new(0, Slot::Morning))
            .with_soft_blackout(DaySlot::new(0, Slot::Afternoon))
            .with_soft_blackout(DaySlot::new(1, Slot::Morning)),
    };
    let cfg = SolverConfig { solution_cap: 4, ..SolverConfig::default() };

    let report = solve(&input, &cfg).unwrap();
    assert_eq!(report.status, SolveStatus::Capped);
    assert_eq!(report.schedules.len(), 4);

    let best = report.best().unwrap();
    assert_eq!(best.schedule[&1].at(), DaySlot::new(1, Slot::Afternoon));
    assert_eq!(best.penalty, 0);
    // every other placement pays the soft-blackout rate
    for scored in &report.schedules[1..] {
        assert_eq!(scored.penalty, cfg.weights.soft_blackout);
    }
}

#[test]
fn full_period_scenario_solves_and_verifies() {
    // a scaled-down three-week period: weekends blacked out, a pinned exam,
    // a computer exam, extra-time students, a leader with two exams
    let mut calendar = Calendar::new(14);
    for day in [5u32, 6, 12, 13] {
        calendar = calendar
            .with_blackout(DaySlot::new(day, Slot::Morning))
            .with_blackout(DaySlot::new(day, Slot::Afternoon));
    }
    calendar = calendar.with_soft_blackout(DaySlot::new(8, Slot::Morning));

    let input = TimetableInput {
        exams: vec![
            Exam::standard(1).core(),
            Exam::standard(2),
            Exam::computer_based(3),
            Exam::standard(4).pinned(DaySlot::new(1, Slot::Afternoon)),
            Exam::standard(5),
        ],
        students: vec![
            Student::new(100, vec![1, 2, 3]),
            Student::new(101, vec![2, 4]).with_accommodation(Accommodation::Extended25),
            Student::new(102, vec![1, 5]).with_accommodation(Accommodation::Extended50),
            Student::new(103, vec![3, 4, 5]),
        ],
        leaders: vec![
            ModuleLeader { id: 1, exams: vec![1, 2] },
            ModuleLeader { id: 2, exams: vec![3] },
        ],
        rooms: vec![
            Room::new(1, 80).with_capability(RoomCapability::StandardSeating),
            Room::new(2, 10).with_capability(RoomCapability::AccommodatedSeating),
            Room::new(3, 25)
                .with_capability(RoomCapability::Computer)
                .with_capability(RoomCapability::StandardSeating)
                .with_capability(RoomCapability::AccommodatedSeating),
        ],
        calendar,
    };
    let cfg = SolverConfig {
        solution_cap: 2,
        final_week: DayRange::new(10, 13),
        ..SolverConfig::default()
    };

    let report = solve(&input, &cfg).unwrap();
    assert!(!report.schedules.is_empty());
    for scored in &report.schedules {
        let violations = verify(&input, &cfg, &scored.schedule);
        assert!(
            violations.iter().all(|v| !v.is_hard()),
            "hard violations in solver output: {violations:?}"
        );
        assert_eq!(scored.schedule[&4].at(), DaySlot::new(1, Slot::Afternoon));
    }
}

#[test]
fn computer_exams_land_in_computer_rooms() {
    let mut input = worked_example();
    input.exams[1].kind = ExamKind::ComputerBased;
    input.rooms.push(Room {
        id: 4,
        capabilities: BTreeSet::from([
            RoomCapability::Computer,
            RoomCapability::StandardSeating,
        ]),
        capacity: 40,
    });

    let report = solve(&input, &small_config()).unwrap();
    assert!(!report.schedules.is_empty());
    for scored in &report.schedules {
        assert_eq!(
            scored.schedule[&2].rooms.iter().collect::<Vec<_>>(),
            vec![&4],
            "computer exam must use the computer room"
        );
    }
}
