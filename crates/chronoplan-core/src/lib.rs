//! # chronoplan-core
//!
//! Core domain model for the chronoplan scheduling engine.
//!
//! This crate provides:
//! - Domain types: `Activity`, `Dependency`, `Resource`, `Calendar`, custom fields
//! - Working-time arithmetic (see [`calendar`])
//! - Pure validation (see [`validate`])
//! - Error and warning types shared by the solver and engine crates
//!
//! ## Example
//!
//! ```rust
//! use chronoplan_core::{Activity, Dependency, DependencyKind, Resource};
//! use chrono::NaiveDate;
//!
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let design = Activity::new("design")
//!     .name("Design")
//!     .schedule(start, start)
//!     .duration(5)
//!     .assign("dev", 100.0);
//! let build = Activity::new("build")
//!     .schedule(start, start)
//!     .duration(10);
//! let link = Dependency::new("d1", "design", "build").kind(DependencyKind::FinishToStart);
//! let dev = Resource::new("dev").name("Developer");
//! # let _ = (design, build, link, dev);
//! ```

use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod calendar;
pub mod validate;

pub use calendar::{Calendar, CalendarException, TimeRange};

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for an activity
pub type ActivityId = String;

/// Unique identifier for a dependency link
pub type DependencyId = String;

/// Unique identifier for a resource
pub type ResourceId = String;

/// Unique identifier for a calendar
pub type CalendarId = String;

/// Unique identifier for a baseline
pub type BaselineId = String;

/// Unique identifier for a scenario
pub type ScenarioId = String;

/// Unique identifier for a custom field
pub type FieldId = String;

/// Activities keyed by id, preserving insertion order
pub type ActivityMap = IndexMap<ActivityId, Activity>;

/// Resources keyed by id, preserving insertion order
pub type ResourceMap = IndexMap<ResourceId, Resource>;

/// Calendars keyed by id, preserving insertion order
pub type CalendarMap = IndexMap<CalendarId, Calendar>;

// ============================================================================
// Activity
// ============================================================================

/// A schedulable unit of work.
///
/// Scheduled `start` and `end` are inclusive calendar dates. The timing
/// fields (`early_start` .. `is_critical`) are written by the solver and
/// overwritten on every run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique identifier
    pub id: ActivityId,
    /// Human-readable name
    pub name: String,
    /// Leaf task, summary or milestone
    pub kind: ActivityKind,
    /// Scheduled start date (inclusive)
    pub start: NaiveDate,
    /// Scheduled finish date (inclusive)
    pub end: NaiveDate,
    /// Duration in working days; derived from the scheduled span when absent
    pub duration: Option<i64>,
    /// Completion percentage (0-100)
    pub progress: f32,
    /// Tracking status
    pub status: ActivityStatus,
    /// Scheduling priority
    pub priority: Priority,
    /// Optional date constraint
    pub constraint: Option<DateConstraint>,
    /// Calendar override (project default applies when absent)
    pub calendar: Option<CalendarId>,
    /// Effort in work-hours
    pub work_hours: Option<f64>,
    /// Direct cost
    pub cost: Option<Decimal>,
    /// Budgeted cost (BAC for earned-value purposes)
    pub budgeted_cost: Option<Decimal>,
    /// Summary activity this one belongs to
    pub parent: Option<ActivityId>,
    /// Resource assignments (allocation as a percentage, 0-100)
    pub assignments: Vec<Assignment>,
    /// Early start, written by the solver
    pub early_start: Option<NaiveDate>,
    /// Early finish, written by the solver
    pub early_finish: Option<NaiveDate>,
    /// Late start, written by the solver
    pub late_start: Option<NaiveDate>,
    /// Late finish, written by the solver
    pub late_finish: Option<NaiveDate>,
    /// Total slack in working days, written by the solver
    pub total_slack: Option<i64>,
    /// Free slack in working days, written by the solver
    pub free_slack: Option<i64>,
    /// On the critical path (slack <= 0)
    pub is_critical: bool,
    /// Baseline mirror fields, populated by `apply_baseline`
    pub baseline: Option<BaselineFields>,
    /// Custom-field values keyed by field id
    pub custom_values: BTreeMap<FieldId, CustomValue>,
}

impl Activity {
    /// Create a new leaf task with the given id
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        Self {
            name: id.clone(),
            id,
            kind: ActivityKind::Task,
            start: day,
            end: day,
            duration: None,
            progress: 0.0,
            status: ActivityStatus::NotStarted,
            priority: Priority::Medium,
            constraint: None,
            calendar: None,
            work_hours: None,
            cost: None,
            budgeted_cost: None,
            parent: None,
            assignments: Vec::new(),
            early_start: None,
            early_finish: None,
            late_start: None,
            late_finish: None,
            total_slack: None,
            free_slack: None,
            is_critical: false,
            baseline: None,
            custom_values: BTreeMap::new(),
        }
    }

    /// Set the activity name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the scheduled span (inclusive dates)
    pub fn schedule(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Set the duration in working days
    pub fn duration(mut self, days: i64) -> Self {
        self.duration = Some(days);
        self
    }

    /// Mark as a milestone (zero duration, start == end)
    pub fn milestone(mut self) -> Self {
        self.kind = ActivityKind::Milestone;
        self.duration = Some(0);
        self.end = self.start;
        self
    }

    /// Mark as a summary activity
    pub fn summary(mut self) -> Self {
        self.kind = ActivityKind::Summary;
        self
    }

    /// Set the parent summary
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set the priority
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the tracking status
    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the completion percentage
    pub fn progress(mut self, pct: f32) -> Self {
        self.progress = pct;
        self
    }

    /// Attach a date constraint
    pub fn constraint(mut self, kind: ConstraintKind, date: NaiveDate) -> Self {
        self.constraint = Some(DateConstraint { kind, date });
        self
    }

    /// Override the calendar
    pub fn calendar(mut self, calendar: impl Into<String>) -> Self {
        self.calendar = Some(calendar.into());
        self
    }

    /// Set the effort in work-hours
    pub fn work_hours(mut self, hours: f64) -> Self {
        self.work_hours = Some(hours);
        self
    }

    /// Set the direct cost
    pub fn cost(mut self, cost: Decimal) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Set the budgeted cost
    pub fn budgeted_cost(mut self, cost: Decimal) -> Self {
        self.budgeted_cost = Some(cost);
        self
    }

    /// Assign a resource at the given allocation percentage (100 = full time)
    pub fn assign(mut self, resource: impl Into<String>, allocation: f32) -> Self {
        self.assignments.push(Assignment {
            resource_id: resource.into(),
            allocation,
        });
        self
    }

    /// Check whether this is a summary activity
    pub fn is_summary(&self) -> bool {
        self.kind == ActivityKind::Summary
    }

    /// Check whether this is a milestone
    pub fn is_milestone(&self) -> bool {
        self.kind == ActivityKind::Milestone
    }

    /// Duration in working days: the explicit value when present, otherwise
    /// the working-day count of the scheduled span under `calendar`.
    /// Milestones are always zero.
    pub fn duration_days(&self, calendar: &Calendar) -> i64 {
        if self.kind == ActivityKind::Milestone {
            return 0;
        }
        self.duration
            .unwrap_or_else(|| calendar.working_days_between(self.start, self.end))
    }

    /// Completion percentage clamped to 0-100
    pub fn effective_progress(&self) -> f32 {
        self.progress.clamp(0.0, 100.0)
    }
}

/// Resource assignment on an activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Assigned resource
    pub resource_id: ResourceId,
    /// Allocation percentage (100 = full time)
    pub allocation: f32,
}

/// Activity classification
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    /// Ordinary leaf task
    #[default]
    Task,
    /// Container whose dates roll up from its children
    Summary,
    /// Zero-duration marker
    Milestone,
}

/// Tracking status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Cancelled,
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityStatus::NotStarted => write!(f, "Not Started"),
            ActivityStatus::InProgress => write!(f, "In Progress"),
            ActivityStatus::Completed => write!(f, "Completed"),
            ActivityStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Scheduling priority, highest first
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Numeric rank, lower schedules first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

/// Date constraint on an activity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateConstraint {
    pub kind: ConstraintKind,
    pub date: NaiveDate,
}

/// Supported constraint kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintKind {
    /// Must start on the given date
    MustStartOn,
    /// Must finish on the given date
    MustFinishOn,
    /// Cannot start before the given date
    StartNoEarlierThan,
    /// Cannot finish before the given date
    FinishNoEarlierThan,
    /// Must start by the given date
    StartNoLaterThan,
    /// Must finish by the given date
    FinishNoLaterThan,
}

// ============================================================================
// Dependency
// ============================================================================

/// Precedence link between two activities
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Unique identifier
    pub id: DependencyId,
    /// Predecessor activity id
    pub predecessor: ActivityId,
    /// Successor activity id
    pub successor: ActivityId,
    /// Link type
    pub kind: DependencyKind,
    /// Lag in working days (negative for lead time)
    pub lag: i64,
}

impl Dependency {
    /// Create a finish-to-start dependency with zero lag
    pub fn new(
        id: impl Into<String>,
        predecessor: impl Into<String>,
        successor: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            predecessor: predecessor.into(),
            successor: successor.into(),
            kind: DependencyKind::FinishToStart,
            lag: 0,
        }
    }

    /// Set the link type
    pub fn kind(mut self, kind: DependencyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the lag in working days
    pub fn lag(mut self, lag: i64) -> Self {
        self.lag = lag;
        self
    }
}

/// Types of precedence links
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Successor starts after predecessor finishes
    #[default]
    #[serde(rename = "FS")]
    FinishToStart,
    /// Successor starts with predecessor's start
    #[serde(rename = "SS")]
    StartToStart,
    /// Successor finishes with predecessor's finish
    #[serde(rename = "FF")]
    FinishToFinish,
    /// Successor finishes relative to predecessor's start
    #[serde(rename = "SF")]
    StartToFinish,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKind::FinishToStart => write!(f, "FS"),
            DependencyKind::StartToStart => write!(f, "SS"),
            DependencyKind::FinishToFinish => write!(f, "FF"),
            DependencyKind::StartToFinish => write!(f, "SF"),
        }
    }
}

// ============================================================================
// Resource
// ============================================================================

/// A person, equipment or material that can be assigned to activities
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique identifier
    pub id: ResourceId,
    /// Human-readable name
    pub name: String,
    /// Resource classification
    pub kind: ResourceKind,
    /// Cost per work-hour
    pub cost_per_hour: Decimal,
    /// Availability percentage (100 = full time)
    pub availability: f32,
    /// Contact details
    pub contact: Option<String>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl Resource {
    /// Create a new person resource with full availability
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: ResourceKind::Person,
            cost_per_hour: Decimal::ZERO,
            availability: 100.0,
            contact: None,
            notes: None,
        }
    }

    /// Set the resource name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the resource kind
    pub fn kind(mut self, kind: ResourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the hourly cost rate
    pub fn cost_per_hour(mut self, rate: Decimal) -> Self {
        self.cost_per_hour = rate;
        self
    }

    /// Set the availability percentage
    pub fn availability(mut self, pct: f32) -> Self {
        self.availability = pct;
        self
    }

    /// Set the contact details
    pub fn contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    /// Set free-form notes
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Resource classification
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    #[default]
    Person,
    Equipment,
    Material,
}

// ============================================================================
// Baseline mirror fields
// ============================================================================

/// Baseline values mirrored onto an activity by `apply_baseline`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineFields {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub duration: Option<i64>,
    pub work: Option<f64>,
    pub cost: Option<Decimal>,
    pub progress: f32,
}

// ============================================================================
// Custom fields
// ============================================================================

/// Definition of a user-defined activity attribute
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    /// Unique identifier
    pub id: FieldId,
    /// Human-readable name
    pub name: String,
    /// Value type
    pub kind: CustomFieldKind,
    /// Allowed values for dropdown fields
    pub options: Vec<String>,
}

impl CustomField {
    /// Create a new field definition
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: CustomFieldKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            options: Vec::new(),
        }
    }

    /// Set the dropdown options
    pub fn options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }
}

/// Value types for custom fields
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CustomFieldKind {
    Text,
    Number,
    Date,
    Flag,
    Dropdown,
    Duration,
    Cost,
}

/// A typed custom-field value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum CustomValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Flag(bool),
    Dropdown(String),
    Duration(i64),
    Cost(Decimal),
}

impl CustomValue {
    /// Check whether this value matches the given field kind
    pub fn matches(&self, kind: CustomFieldKind) -> bool {
        matches!(
            (self, kind),
            (CustomValue::Text(_), CustomFieldKind::Text)
                | (CustomValue::Number(_), CustomFieldKind::Number)
                | (CustomValue::Date(_), CustomFieldKind::Date)
                | (CustomValue::Flag(_), CustomFieldKind::Flag)
                | (CustomValue::Dropdown(_), CustomFieldKind::Dropdown)
                | (CustomValue::Duration(_), CustomFieldKind::Duration)
                | (CustomValue::Cost(_), CustomFieldKind::Cost)
        )
    }
}

// ============================================================================
// Errors and warnings
// ============================================================================

/// Engine error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Field-level validation failures
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The dependency graph contains a cycle; carries the offending path
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<ActivityId>),

    /// A referenced entity does not exist
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A structural invariant would be broken
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    /// Shorthand for a missing-entity error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Non-fatal diagnostic attached to an operation report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Warning {
    /// A resource exceeds 100% total allocation over a day range
    Overallocation {
        resource: ResourceId,
        start: NaiveDate,
        end: NaiveDate,
        peak: f32,
    },
    /// A calendar with no working time; treated as every-day-working
    DegenerateCalendar { calendar: CalendarId },
    /// A pinned constraint conflicts with dependency-driven dates
    ConstraintConflict { activity: ActivityId, detail: String },
    /// Leveling could not place the activity within the search horizon
    LevelingHorizon { activity: ActivityId },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::Overallocation {
                resource,
                start,
                end,
                peak,
            } => write!(
                f,
                "resource '{}' over-allocated {} to {} (peak {:.0}%)",
                resource, start, end, peak
            ),
            Warning::DegenerateCalendar { calendar } => {
                write!(f, "calendar '{}' has no working time", calendar)
            }
            Warning::ConstraintConflict { activity, detail } => {
                write!(f, "constraint conflict on '{}': {}", activity, detail)
            }
            Warning::LevelingHorizon { activity } => write!(
                f,
                "no conflict-free slot for '{}' within the leveling horizon",
                activity
            ),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
