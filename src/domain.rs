use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// Type aliases for clarity
pub type ExamId = u32;
pub type StudentId = u32;
pub type LeaderId = u32;
pub type RoomId = u32;
pub type Day = u32;

/// Half-day examination slot. Every calendar day has exactly two.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Slot {
    Morning,
    Afternoon,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Morning, Slot::Afternoon];
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Morning => write!(f, "morning"),
            Slot::Afternoon => write!(f, "afternoon"),
        }
    }
}

/// A (day, slot) pair; the key type for pins and blackouts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct DaySlot {
    pub day: Day,
    pub slot: Slot,
}

impl DaySlot {
    pub fn new(day: Day, slot: Slot) -> Self {
        Self { day, slot }
    }
}

impl fmt::Display for DaySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} {}", self.day, self.slot)
    }
}

/// How an exam is sat. Decided once at ingestion, never re-parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExamKind {
    Standard,
    ComputerBased,
}

/// What a room can host. A room with no capabilities cannot host anything.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum RoomCapability {
    Computer,
    StandardSeating,
    AccommodatedSeating,
}

/// Extra-time accommodation level for a student.
///
/// `Extended50` students are hard-limited to one exam per day;
/// `Extended25` students get the same limit as a soft preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Accommodation {
    None,
    Extended25,
    Extended50,
}

impl Accommodation {
    /// Whether the student needs accommodated seating at all.
    pub fn needs_accommodated_seating(self) -> bool {
        !matches!(self, Accommodation::None)
    }
}

/// An examination to be placed on the calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: ExamId,
    pub kind: ExamKind,
    /// Core exams may not share a day with any other exam of a student who
    /// takes them.
    #[serde(default)]
    pub is_core: bool,
    /// A pinned exam's (day, slot) is immutable input, not a solver decision.
    #[serde(default)]
    pub fixed_slot: Option<DaySlot>,
}

impl Exam {
    pub fn standard(id: ExamId) -> Self {
        Self { id, kind: ExamKind::Standard, is_core: false, fixed_slot: None }
    }

    pub fn computer_based(id: ExamId) -> Self {
        Self { kind: ExamKind::ComputerBased, ..Self::standard(id) }
    }

    pub fn core(mut self) -> Self {
        self.is_core = true;
        self
    }

    pub fn pinned(mut self, at: DaySlot) -> Self {
        self.fixed_slot = Some(at);
        self
    }
}

/// A student with their enrolled exams. The per-exam roster is derived from
/// these, never stored on the exam itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub accommodation: Accommodation,
    pub exams: Vec<ExamId>,
}

impl Student {
    pub fn new(id: StudentId, exams: Vec<ExamId>) -> Self {
        Self { id, accommodation: Accommodation::None, exams }
    }

    pub fn with_accommodation(mut self, accommodation: Accommodation) -> Self {
        self.accommodation = accommodation;
        self
    }
}

/// A module leader and the exams they are responsible for.
///
/// The mapping is produced upstream by a confidence-thresholded name
/// resolver; the core only ever sees the resolved exam ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleLeader {
    pub id: LeaderId,
    pub exams: Vec<ExamId>,
}

/// A physical room with a capacity and a set of capability tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub capabilities: BTreeSet<RoomCapability>,
    pub capacity: u32,
}

impl Room {
    pub fn new(id: RoomId, capacity: u32) -> Self {
        Self { id, capabilities: BTreeSet::new(), capacity }
    }

    pub fn with_capability(mut self, capability: RoomCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }
}

/// The examination period: `num_days` days of two slots each, with hard and
/// soft blackout sets derived externally (weekends, holidays, term edges).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub num_days: u32,
    #[serde(default)]
    pub blackouts: BTreeSet<DaySlot>,
    #[serde(default)]
    pub soft_blackouts: BTreeSet<DaySlot>,
}

impl Calendar {
    pub fn new(num_days: u32) -> Self {
        Self {
            num_days,
            blackouts: BTreeSet::new(),
            soft_blackouts: BTreeSet::new(),
        }
    }

    pub fn with_blackout(mut self, at: DaySlot) -> Self {
        self.blackouts.insert(at);
        self
    }

    pub fn with_soft_blackout(mut self, at: DaySlot) -> Self {
        self.soft_blackouts.insert(at);
        self
    }

    pub fn is_blackout(&self, at: DaySlot) -> bool {
        self.blackouts.contains(&at)
    }

    pub fn is_soft_blackout(&self, at: DaySlot) -> bool {
        self.soft_blackouts.contains(&at)
    }

    /// All (day, slot) pairs of the period in order, blackouts included.
    pub fn day_slots(&self) -> impl Iterator<Item = DaySlot> + '_ {
        (0..self.num_days)
            .flat_map(|day| Slot::ALL.into_iter().map(move |slot| DaySlot { day, slot }))
    }
}

/// Per-exam seat demand, split the way rooms are tagged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeatDemand {
    pub accommodated: u32,
    pub standard: u32,
}

impl SeatDemand {
    pub fn total(&self) -> u32 {
        self.accommodated + self.standard
    }
}

/// The complete domain snapshot consumed by the core. Built once per run
/// from external input and read-only to every downstream component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableInput {
    pub exams: Vec<Exam>,
    pub students: Vec<Student>,
    pub leaders: Vec<ModuleLeader>,
    pub rooms: Vec<Room>,
    pub calendar: Calendar,
}

impl TimetableInput {
    pub fn exam_map(&self) -> BTreeMap<ExamId, &Exam> {
        self.exams.iter().map(|e| (e.id, e)).collect()
    }

    pub fn room_map(&self) -> BTreeMap<RoomId, &Room> {
        self.rooms.iter().map(|r| (r.id, r)).collect()
    }

    /// Seat demand per exam, derived from the student list.
    pub fn seat_demand(&self) -> BTreeMap<ExamId, SeatDemand> {
        let mut demand: BTreeMap<ExamId, SeatDemand> =
            self.exams.iter().map(|e| (e.id, SeatDemand::default())).collect();
        for student in &self.students {
            for exam in &student.exams {
                if let Some(entry) = demand.get_mut(exam) {
                    if student.accommodation.needs_accommodated_seating() {
                        entry.accommodated += 1;
                    } else {
                        entry.standard += 1;
                    }
                }
            }
        }
        demand
    }

    /// Unordered exam pairs that share at least one leader, deduplicated
    /// across leaders (a pair co-led by two people is still one pair).
    pub fn leader_pairs(&self) -> BTreeSet<(ExamId, ExamId)> {
        let mut pairs = BTreeSet::new();
        for leader in &self.leaders {
            for (i, &a) in leader.exams.iter().enumerate() {
                for &b in &leader.exams[i + 1..] {
                    if a != b {
                        pairs.insert((a.min(b), a.max(b)));
                    }
                }
            }
        }
        pairs
    }
}

/// Where one exam ended up: a (day, slot) and the non-empty room set.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ExamAssignment {
    pub day: Day,
    pub slot: Slot,
    pub rooms: BTreeSet<RoomId>,
}

impl ExamAssignment {
    pub fn at(&self) -> DaySlot {
        DaySlot { day: self.day, slot: self.slot }
    }
}

/// A finished timetable: exam id to assignment. May be partial when
/// externally authored; the verifier reports missing exams.
pub type Schedule = BTreeMap<ExamId, ExamAssignment>;

/// One enumerated solution paired with its total weighted penalty.
///
/// Ordered by penalty ascending, ties broken by the schedule map itself so
/// ranked output is reproducible run to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSchedule {
    pub schedule: Schedule,
    pub penalty: i64,
}

impl Ord for ScoredSchedule {
    fn cmp(&self, other: &Self) -> Ordering {
        self.penalty
            .cmp(&other.penalty)
            .then_with(|| self.schedule.cmp(&other.schedule))
    }
}

impl PartialOrd for ScoredSchedule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
