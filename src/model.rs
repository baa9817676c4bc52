use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_ms() as f64 / HOUR_MS as f64
    }

    pub fn duration_days(&self) -> f64 {
        self.duration_ms() as f64 / DAY_MS as f64
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Intersection of two spans, `None` when they do not overlap.
    pub fn intersect(&self, other: &Span) -> Option<Span> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(Span::new(start, end))
        } else {
            None
        }
    }
}

// ── Lifecycle enums ──────────────────────────────────────────────

/// Lifecycle state of a demand. The first six variants form the linear
/// workflow; `Archived` is an orthogonal terminal state reachable from any
/// non-terminal status and leavable only through an explicit restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DemandStatus {
    Intake,
    Qualification,
    Queued,
    InExecution,
    Validation,
    Completed,
    Archived,
}

impl DemandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DemandStatus::Completed | DemandStatus::Archived)
    }

    /// Execution or validation — work someone is actively holding.
    pub fn is_active(self) -> bool {
        matches!(self, DemandStatus::InExecution | DemandStatus::Validation)
    }

    /// Queued or active — the statuses that count toward allocated load.
    pub fn carries_load(self) -> bool {
        matches!(
            self,
            DemandStatus::Queued | DemandStatus::InExecution | DemandStatus::Validation
        )
    }

    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for DemandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DemandStatus::Intake => "intake",
            DemandStatus::Qualification => "qualification",
            DemandStatus::Queued => "queued",
            DemandStatus::InExecution => "in execution",
            DemandStatus::Validation => "validation",
            DemandStatus::Completed => "completed",
            DemandStatus::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// What shape of work a demand is: a structural deliverable (process,
/// platform, framework) or a one-off task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemandKind {
    System,
    Task,
}

/// Words that mark a demand as a structural "system" deliverable.
const SYSTEM_KEYWORDS: &[&str] = &[
    "system",
    "framework",
    "model",
    "methodology",
    "governance",
    "process",
    "flow",
    "pipeline",
    "standard",
    "simulator",
    "tool",
    "platform",
    "dashboard",
    "template",
    "manual",
    "guide",
    "documentation",
    "architecture",
    "strategy",
    "roadmap",
];

impl DemandKind {
    /// Keyword classifier used when the caller does not pick a kind.
    pub fn classify(title: &str, description: &str) -> Self {
        let text = format!("{title} {description}").to_lowercase();
        if SYSTEM_KEYWORDS.iter().any(|k| text.contains(k)) {
            DemandKind::System
        } else {
            DemandKind::Task
        }
    }
}

// ── Audit logs ───────────────────────────────────────────────────

/// One applied workflow transition. Append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEntry {
    pub from: DemandStatus,
    pub to: DemandStatus,
    pub at: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryKind {
    Creation,
    Edit,
    Cancellation,
    Completion,
    Prioritization,
    Restoration,
}

/// Human-readable audit record. Append-only, stored in insertion order;
/// newest-first presentation is a display concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: Ms,
    pub kind: HistoryKind,
    pub detail: String,
    pub actor: String,
}

// ── Demand ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub id: Ulid,
    pub title: String,
    pub description: String,
    /// Category name, resolved against the configured `Category` list when
    /// an SLA rule is looked up.
    pub category: String,
    pub kind: DemandKind,
    pub complexity: Complexity,
    /// Effort estimate in hours.
    pub effort_hours: u32,
    pub person_id: Ulid,
    pub coordination_id: Ulid,
    pub requester_name: String,
    pub requester_area_id: Ulid,
    pub status: DemandStatus,
    pub is_priority: bool,
    pub agreed_deadline: Option<Ms>,
    pub created_at: Ms,
    /// Stamped on the first entry into `InExecution`, never cleared.
    pub started_at: Option<Ms>,
    /// Set iff status is `Completed`.
    pub finished_at: Option<Ms>,
    pub delivery_summary: Option<String>,
    pub delay_justification: Option<String>,
    pub cancellation_reason: Option<String>,
    pub workflow_log: Vec<WorkflowEntry>,
    pub history: Vec<HistoryEntry>,
    /// Timestamp of the most recent entry into each status.
    pub status_timestamps: BTreeMap<DemandStatus, Ms>,
}

impl Demand {
    /// Where this demand's interval starts: actual execution start when
    /// known, creation time otherwise.
    pub fn effective_start(&self) -> Ms {
        self.started_at.unwrap_or(self.created_at)
    }

    /// Planned wall-clock duration: one day per 8h of effort, at least one day.
    pub fn planned_duration_ms(&self) -> Ms {
        ((self.effort_hours as f64 / 8.0).max(1.0) * DAY_MS as f64) as Ms
    }

    /// Naive load interval: effective start plus planned duration, ignoring
    /// any other work the assignee holds. Intervals of different demands of
    /// the same person may overlap here — that is what makes this a load
    /// measure rather than a schedule.
    pub fn load_span(&self) -> Span {
        let start = self.effective_start();
        Span::new(start, start + self.planned_duration_ms())
    }
}

// ── Reference entities (read-only to the engine) ─────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: Ulid,
    pub name: String,
    pub role: String,
    pub coordination_id: Ulid,
    pub email: String,
}

/// An executing team. Distinct from the requesting `Area`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordination {
    pub id: Ulid,
    pub name: String,
    pub description: String,
}

/// An organizational unit that originates requests but does not execute them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub id: Ulid,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Ulid,
    pub name: String,
}

/// Time budget for one (category, complexity) pair. At most one rule per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaConfig {
    pub id: Ulid,
    pub category_id: Ulid,
    pub complexity: Complexity,
    pub sla_hours: u32,
}

// ── Mutation inputs ──────────────────────────────────────────────

/// Input for creating a demand. Id, status, and audit fields are assigned
/// by the engine.
#[derive(Debug, Clone)]
pub struct NewDemand {
    pub title: String,
    pub description: String,
    pub category: String,
    /// `None` means: classify from title + description.
    pub kind: Option<DemandKind>,
    pub complexity: Complexity,
    pub effort_hours: u32,
    pub person_id: Ulid,
    pub coordination_id: Ulid,
    pub requester_name: String,
    pub requester_area_id: Ulid,
    pub agreed_deadline: Option<Ms>,
}

/// Full replacement of a demand's descriptive and relational fields.
/// Lifecycle fields (status, stamps, logs) are preserved by the engine.
#[derive(Debug, Clone)]
pub struct DemandEdit {
    pub title: String,
    pub description: String,
    pub category: String,
    pub kind: DemandKind,
    pub complexity: Complexity,
    pub effort_hours: u32,
    pub person_id: Ulid,
    pub coordination_id: Ulid,
    pub requester_name: String,
    pub requester_area_id: Ulid,
    pub agreed_deadline: Option<Ms>,
}

// ── Query result types ───────────────────────────────────────────

/// One bar on a person's timeline. `projected` marks synthetic intervals
/// produced by the FIFO simulation, as opposed to actual/active work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledDemand {
    pub demand_id: Ulid,
    pub span: Span,
    pub projected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonSchedule {
    pub person_id: Ulid,
    pub entries: Vec<ScheduledDemand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Normal,
    High,
    Overloaded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonAllocation {
    pub person_id: Ulid,
    pub name: String,
    pub coordination: String,
    pub capacity_hours: f64,
    pub allocated_hours: f64,
    pub available_hours: f64,
    pub utilization_pct: u32,
    pub status: LoadStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamAllocation {
    pub coordination_id: Ulid,
    pub name: String,
    pub capacity_hours: f64,
    pub allocated_hours: f64,
    pub utilization_pct: u32,
    pub status: LoadStatus,
}

/// Occupancy classification for heatmap cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBand {
    Empty,
    Low,
    Optimal,
    High,
    Overloaded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonSeries {
    pub person_id: Ulid,
    pub name: String,
    pub hours: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinationSeries {
    pub coordination_id: Ulid,
    pub name: String,
    pub hours: Vec<f64>,
    pub people: Vec<PersonSeries>,
}

/// Weekly load per person, rolled up per coordination, with a grand-total
/// row across all teams.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub weeks: Vec<Span>,
    pub coordinations: Vec<CoordinationSeries>,
    pub totals: Vec<f64>,
}

/// A demand flagged by the delay report: delivered late, or still executing
/// past its effort budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LateDelivery {
    pub demand: Demand,
    /// True when flagged by the at-risk heuristic rather than a recorded
    /// late delivery.
    pub projected: bool,
}

/// Month bucket keyed by completion (or archive) date.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub finished: u32,
    pub archived: u32,
    pub late: u32,
    pub late_pct: f64,
    pub avg_lead_time_days: f64,
    pub avg_cycle_time_days: f64,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert_eq!(Span::new(0, DAY_MS).duration_days(), 1.0);
        assert_eq!(Span::new(0, HOUR_MS).duration_hours(), 1.0);
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_intersect() {
        let a = Span::new(100, 200);
        assert_eq!(a.intersect(&Span::new(150, 250)), Some(Span::new(150, 200)));
        assert_eq!(a.intersect(&Span::new(0, 400)), Some(a));
        assert_eq!(a.intersect(&Span::new(200, 300)), None);
    }

    #[test]
    fn status_helpers() {
        assert!(DemandStatus::Completed.is_terminal());
        assert!(DemandStatus::Archived.is_terminal());
        assert!(DemandStatus::InExecution.is_active());
        assert!(!DemandStatus::Queued.is_active());
        assert!(DemandStatus::Queued.carries_load());
        assert!(!DemandStatus::Intake.carries_load());
        assert!(DemandStatus::Intake.is_open());
    }

    #[test]
    fn classify_by_keyword() {
        assert_eq!(
            DemandKind::classify("New reporting dashboard", ""),
            DemandKind::System
        );
        assert_eq!(
            DemandKind::classify("Fix typo", "correct the label in the export"),
            DemandKind::Task
        );
        // match is case-insensitive and may come from the description
        assert_eq!(
            DemandKind::classify("Quarterly review", "define the GOVERNANCE cadence"),
            DemandKind::System
        );
    }

    #[test]
    fn planned_duration_floors_at_one_day() {
        let mut d = demand_fixture();
        d.effort_hours = 2;
        assert_eq!(d.planned_duration_ms(), DAY_MS);
        d.effort_hours = 0;
        assert_eq!(d.planned_duration_ms(), DAY_MS);
        d.effort_hours = 40;
        assert_eq!(d.planned_duration_ms(), 5 * DAY_MS);
        d.effort_hours = 12;
        assert_eq!(d.planned_duration_ms(), DAY_MS + DAY_MS / 2);
    }

    #[test]
    fn effective_start_prefers_execution_start() {
        let mut d = demand_fixture();
        assert_eq!(d.effective_start(), d.created_at);
        d.started_at = Some(d.created_at + 2 * DAY_MS);
        assert_eq!(d.effective_start(), d.created_at + 2 * DAY_MS);
    }

    #[test]
    fn demand_roundtrips_with_logs() {
        let mut d = demand_fixture();
        d.workflow_log.push(WorkflowEntry {
            from: DemandStatus::Intake,
            to: DemandStatus::Queued,
            at: 1_000,
        });
        d.history.push(HistoryEntry {
            at: 1_000,
            kind: HistoryKind::Creation,
            detail: "created".into(),
            actor: "ana".into(),
        });
        d.status_timestamps.insert(DemandStatus::Queued, 1_000);

        let json = serde_json::to_string(&d).unwrap();
        let back: Demand = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }

    pub(crate) fn demand_fixture() -> Demand {
        Demand {
            id: Ulid::new(),
            title: "Fixture".into(),
            description: String::new(),
            category: "General".into(),
            kind: DemandKind::Task,
            complexity: Complexity::Low,
            effort_hours: 8,
            person_id: Ulid::new(),
            coordination_id: Ulid::new(),
            requester_name: String::new(),
            requester_area_id: Ulid::new(),
            status: DemandStatus::Intake,
            is_priority: false,
            agreed_deadline: None,
            created_at: 0,
            started_at: None,
            finished_at: None,
            delivery_summary: None,
            delay_justification: None,
            cancellation_reason: None,
            workflow_log: Vec::new(),
            history: Vec::new(),
            status_timestamps: BTreeMap::new(),
        }
    }
}
