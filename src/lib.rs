//! Exam timetabling core: a constraint model over (day, slot, room-set)
//! assignments, a weighted penalty scheme, bounded enumeration of ranked
//! feasible schedules, and an independent verifier for auditing any
//! timetable, whether solver-produced or hand-edited.
//!
//! Spreadsheet parsing, name matching and workbook export are collaborator
//! concerns; they talk to this crate through [`solve::solve`] and
//! [`verify::verify`] (or the JSON routes in [`server`]).

pub mod config;
pub mod domain;
pub mod error;
pub mod model;
pub mod penalty;
pub mod server;
pub mod solve;
pub mod validate;
pub mod verify;

pub use config::{PenaltyWeights, SolverConfig};
pub use domain::{Schedule, ScoredSchedule, TimetableInput};
pub use error::SolveError;
pub use solve::{ScheduleEnumeration, SolveReport, SolveStatus, solve};
pub use verify::{Severity, Violation, verify};
