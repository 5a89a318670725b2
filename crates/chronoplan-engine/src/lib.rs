//! # chronoplan-engine
//!
//! The project-state facade of the chronoplan scheduling engine.
//!
//! [`ProjectState`] owns every collection (activities, dependencies,
//! resources, calendars, baselines, scenarios, custom fields) and exposes
//! the operations a planner front-end calls. Every mutation is
//! transactional at the operation level: inputs are validated first, the
//! state changes only on success, and `updated_at` is stamped. Deletion
//! cascades and default-flag uniqueness are enforced here, not by callers.
//!
//! Scheduling itself lives in `chronoplan-solver`; this crate wires the
//! solver results back into the owned state.
//!
//! ## Example
//!
//! ```rust
//! use chronoplan_engine::ProjectState;
//! use chronoplan_core::{Activity, DependencyKind};
//! use chrono::NaiveDate;
//!
//! let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let mut project = ProjectState::new("Website relaunch", monday);
//! project
//!     .add_activity(Activity::new("design").schedule(monday, monday).duration(5))
//!     .unwrap();
//! project
//!     .add_activity(Activity::new("build").schedule(monday, monday).duration(10))
//!     .unwrap();
//! project
//!     .add_dependency("design", "build", DependencyKind::FinishToStart, 0)
//!     .unwrap();
//!
//! let report = project.recalculate_dates().unwrap();
//! assert_eq!(report.critical_path.len(), 2);
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use chronoplan_core::validate::{find_cycle, validate_activity, validate_plan, validate_resource};
use chronoplan_core::{
    Activity, ActivityId, ActivityStatus, Assignment, BaselineId, Calendar, CalendarId,
    CustomField, CustomValue, DateConstraint, Dependency, DependencyId, DependencyKind,
    EngineError, FieldId, Priority, Resource, ResourceId, ScenarioId, Warning,
};
use chronoplan_solver::{cpm, evm, leveling, DependencyGraph, EvmMetrics, LevelingOutcome};

pub mod baseline;
pub mod scenario;

pub use baseline::{Baseline, VarianceReport, VarianceStatus};
pub use scenario::{PlanSnapshot, Scenario};

// ============================================================================
// Operation results
// ============================================================================

/// Result of `recalculate_dates`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReport {
    /// Critical activity ids in topological order
    pub critical_path: Vec<ActivityId>,
    /// Earliest early start across the plan
    pub project_start: NaiveDate,
    /// Latest early finish across the plan
    pub project_finish: NaiveDate,
    /// Validator and solver warnings collected during the run
    pub warnings: Vec<Warning>,
}

/// Aggregate health numbers for dashboards
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatistics {
    pub total_activities: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
    pub cancelled: usize,
    pub milestones: usize,
    /// Duration-weighted completion percentage
    pub overall_progress: u8,
    pub total_cost: Decimal,
    pub total_work_hours: f64,
    pub project_start: NaiveDate,
    pub project_finish: NaiveDate,
    pub critical_activities: usize,
}

/// Partial update for an activity. `None` leaves the field alone; the
/// nested options clear optional fields when set to `Some(None)`.
#[derive(Clone, Debug, Default)]
pub struct ActivityPatch {
    pub name: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub duration: Option<Option<i64>>,
    pub progress: Option<f32>,
    pub status: Option<ActivityStatus>,
    pub priority: Option<Priority>,
    pub constraint: Option<Option<DateConstraint>>,
    pub calendar: Option<Option<CalendarId>>,
    pub work_hours: Option<Option<f64>>,
    pub cost: Option<Option<Decimal>>,
    pub budgeted_cost: Option<Option<Decimal>>,
    pub parent: Option<Option<ActivityId>>,
    pub assignments: Option<Vec<Assignment>>,
}

// ============================================================================
// ProjectState
// ============================================================================

/// The aggregate owning the whole plan.
///
/// Serializes to a tree-shaped record with ISO-8601 dates and stable string
/// enum tags; `export_state`/`import_state` round-trip that form with no
/// data loss.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    /// Project name
    pub name: String,
    /// Anchor start date
    pub start: NaiveDate,
    /// Computed finish (refreshed by `recalculate_dates`)
    pub end: NaiveDate,
    /// Activities in insertion order
    pub activities: IndexMap<ActivityId, Activity>,
    /// Dependency links in insertion order
    pub dependencies: Vec<Dependency>,
    /// Resources in insertion order
    pub resources: IndexMap<ResourceId, Resource>,
    /// Calendars in insertion order
    pub calendars: IndexMap<CalendarId, Calendar>,
    /// Id of the default calendar
    pub default_calendar: CalendarId,
    /// Baselines in capture order
    pub baselines: IndexMap<BaselineId, Baseline>,
    /// Scenarios in creation order
    pub scenarios: IndexMap<ScenarioId, Scenario>,
    /// Custom-field definitions
    pub custom_fields: IndexMap<FieldId, CustomField>,
    /// Critical path from the last solver run
    pub critical_path: Vec<ActivityId>,
    /// Active scenario, if any
    pub active_scenario: Option<ScenarioId>,
    /// Parked live data while a scenario is active
    pub live_data: Option<PlanSnapshot>,
    /// Stamp of the last successful mutation
    pub updated_at: DateTime<Utc>,
}

impl ProjectState {
    /// Create an empty project anchored at `start`, with the standard
    /// Mon-Fri calendar installed as the default.
    pub fn new(name: impl Into<String>, start: NaiveDate) -> Self {
        let calendar = Calendar::default();
        let mut calendars = IndexMap::new();
        let default_calendar = calendar.id.clone();
        calendars.insert(calendar.id.clone(), calendar);
        Self {
            name: name.into(),
            start,
            end: start,
            activities: IndexMap::new(),
            dependencies: Vec::new(),
            resources: IndexMap::new(),
            calendars,
            default_calendar,
            baselines: IndexMap::new(),
            scenarios: IndexMap::new(),
            custom_fields: IndexMap::new(),
            critical_path: Vec::new(),
            active_scenario: None,
            live_data: None,
            updated_at: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ========================================================================
    // Activities
    // ========================================================================

    /// Add an activity. Fails on duplicate id, invalid fields, or dangling
    /// parent/calendar references.
    pub fn add_activity(&mut self, activity: Activity) -> Result<(), EngineError> {
        if self.activities.contains_key(&activity.id) {
            return Err(EngineError::InvariantViolation(format!(
                "activity '{}' already exists",
                activity.id
            )));
        }
        let errors = validate_activity(&activity);
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }
        self.check_activity_references(&activity)?;

        self.activities.insert(activity.id.clone(), activity);
        self.touch();
        Ok(())
    }

    /// Apply a partial update to an activity.
    pub fn update_activity(&mut self, id: &str, patch: ActivityPatch) -> Result<(), EngineError> {
        let Some(current) = self.activities.get(id) else {
            return Err(EngineError::not_found("activity", id));
        };

        let mut updated = current.clone();
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(start) = patch.start {
            updated.start = start;
        }
        if let Some(end) = patch.end {
            updated.end = end;
        }
        if let Some(duration) = patch.duration {
            updated.duration = duration;
        }
        if let Some(progress) = patch.progress {
            updated.progress = progress;
        }
        if let Some(status) = patch.status {
            updated.status = status;
        }
        if let Some(priority) = patch.priority {
            updated.priority = priority;
        }
        if let Some(constraint) = patch.constraint {
            updated.constraint = constraint;
        }
        if let Some(calendar) = patch.calendar {
            updated.calendar = calendar;
        }
        if let Some(work_hours) = patch.work_hours {
            updated.work_hours = work_hours;
        }
        if let Some(cost) = patch.cost {
            updated.cost = cost;
        }
        if let Some(budgeted_cost) = patch.budgeted_cost {
            updated.budgeted_cost = budgeted_cost;
        }
        if let Some(parent) = patch.parent {
            updated.parent = parent;
        }
        if let Some(assignments) = patch.assignments {
            updated.assignments = assignments;
        }

        let errors = validate_activity(&updated);
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }
        self.check_activity_references(&updated)?;

        self.activities[id] = updated;
        self.touch();
        Ok(())
    }

    /// Delete an activity. Cascades to dependencies touching it and clears
    /// the parent link of its children; assignments and custom-field values
    /// live on the activity and die with it.
    pub fn remove_activity(&mut self, id: &str) -> Result<(), EngineError> {
        if self.activities.shift_remove(id).is_none() {
            return Err(EngineError::not_found("activity", id));
        }
        self.dependencies
            .retain(|d| d.predecessor != id && d.successor != id);
        for activity in self.activities.values_mut() {
            if activity.parent.as_deref() == Some(id) {
                activity.parent = None;
            }
        }
        self.critical_path.retain(|c| c != id);
        self.touch();
        Ok(())
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.get(id)
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }

    fn check_activity_references(&self, activity: &Activity) -> Result<(), EngineError> {
        if let Some(parent) = &activity.parent {
            if parent == &activity.id {
                return Err(EngineError::Validation(vec![format!(
                    "activity '{}' cannot be its own parent",
                    activity.id
                )]));
            }
            if !self.activities.contains_key(parent) {
                return Err(EngineError::not_found("activity", parent.clone()));
            }
        }
        if let Some(calendar) = &activity.calendar {
            if !self.calendars.contains_key(calendar) {
                return Err(EngineError::not_found("calendar", calendar.clone()));
            }
        }
        for assignment in &activity.assignments {
            if !self.resources.contains_key(&assignment.resource_id) {
                return Err(EngineError::not_found(
                    "resource",
                    assignment.resource_id.clone(),
                ));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Add a validated dependency and return its generated id. Refuses
    /// self-loops, dangling endpoints and anything that would close a cycle.
    pub fn add_dependency(
        &mut self,
        predecessor: &str,
        successor: &str,
        kind: DependencyKind,
        lag: i64,
    ) -> Result<DependencyId, EngineError> {
        if !self.activities.contains_key(predecessor) {
            return Err(EngineError::not_found("activity", predecessor));
        }
        if !self.activities.contains_key(successor) {
            return Err(EngineError::not_found("activity", successor));
        }
        if predecessor == successor {
            return Err(EngineError::Validation(vec![format!(
                "activity '{}' cannot depend on itself",
                predecessor
            )]));
        }

        let graph = DependencyGraph::build(&self.activities, &self.dependencies);
        if let Some(path) = graph.would_create_cycle(predecessor, successor) {
            return Err(EngineError::Cycle(path));
        }

        let id = Uuid::new_v4().to_string();
        self.dependencies.push(
            Dependency::new(id.clone(), predecessor, successor)
                .kind(kind)
                .lag(lag),
        );
        self.touch();
        Ok(id)
    }

    pub fn remove_dependency(&mut self, id: &str) -> Result<(), EngineError> {
        let before = self.dependencies.len();
        self.dependencies.retain(|d| d.id != id);
        if self.dependencies.len() == before {
            return Err(EngineError::not_found("dependency", id));
        }
        self.touch();
        Ok(())
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// All dependencies touching the given activity, either side.
    pub fn dependencies_for(&self, id: &str) -> Vec<&Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.predecessor == id || d.successor == id)
            .collect()
    }

    // ========================================================================
    // Resources
    // ========================================================================

    pub fn add_resource(&mut self, resource: Resource) -> Result<(), EngineError> {
        if self.resources.contains_key(&resource.id) {
            return Err(EngineError::InvariantViolation(format!(
                "resource '{}' already exists",
                resource.id
            )));
        }
        let errors = validate_resource(&resource);
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }
        self.resources.insert(resource.id.clone(), resource);
        self.touch();
        Ok(())
    }

    /// Replace a resource definition, keyed by its id.
    pub fn update_resource(&mut self, resource: Resource) -> Result<(), EngineError> {
        if !self.resources.contains_key(&resource.id) {
            return Err(EngineError::not_found("resource", resource.id.clone()));
        }
        let errors = validate_resource(&resource);
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }
        let id = resource.id.clone();
        self.resources[&id] = resource;
        self.touch();
        Ok(())
    }

    /// Delete a resource and strip its assignments off every activity.
    pub fn remove_resource(&mut self, id: &str) -> Result<(), EngineError> {
        if self.resources.shift_remove(id).is_none() {
            return Err(EngineError::not_found("resource", id));
        }
        for activity in self.activities.values_mut() {
            activity.assignments.retain(|a| a.resource_id != id);
        }
        self.touch();
        Ok(())
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    // ========================================================================
    // Calendars
    // ========================================================================

    pub fn add_calendar(&mut self, calendar: Calendar) -> Result<(), EngineError> {
        if self.calendars.contains_key(&calendar.id) {
            return Err(EngineError::InvariantViolation(format!(
                "calendar '{}' already exists",
                calendar.id
            )));
        }
        let make_default = calendar.is_default;
        let id = calendar.id.clone();
        self.calendars.insert(id.clone(), calendar);
        if make_default {
            self.promote_default_calendar(&id);
        }
        self.touch();
        Ok(())
    }

    pub fn update_calendar(&mut self, calendar: Calendar) -> Result<(), EngineError> {
        if !self.calendars.contains_key(&calendar.id) {
            return Err(EngineError::not_found("calendar", calendar.id.clone()));
        }
        let make_default = calendar.is_default;
        let id = calendar.id.clone();
        self.calendars[&id] = calendar;
        if make_default {
            self.promote_default_calendar(&id);
        } else {
            // The default calendar cannot silently lose its flag
            let default_id = self.default_calendar.clone();
            if let Some(default) = self.calendars.get_mut(&default_id) {
                default.is_default = true;
            }
        }
        self.touch();
        Ok(())
    }

    /// Delete a calendar and re-point its users to the default. The last
    /// calendar cannot be deleted; deleting the default promotes the first
    /// remaining calendar.
    pub fn remove_calendar(&mut self, id: &str) -> Result<(), EngineError> {
        if !self.calendars.contains_key(id) {
            return Err(EngineError::not_found("calendar", id));
        }
        if self.calendars.len() == 1 {
            return Err(EngineError::InvariantViolation(
                "cannot delete the last calendar".into(),
            ));
        }
        self.calendars.shift_remove(id);

        if self.default_calendar == id {
            let next = self
                .calendars
                .keys()
                .next()
                .expect("another calendar remains")
                .clone();
            self.promote_default_calendar(&next);
        }
        let default_id = self.default_calendar.clone();
        for activity in self.activities.values_mut() {
            if activity.calendar.as_deref() == Some(id) {
                activity.calendar = Some(default_id.clone());
            }
        }
        self.touch();
        Ok(())
    }

    pub fn set_default_calendar(&mut self, id: &str) -> Result<(), EngineError> {
        if !self.calendars.contains_key(id) {
            return Err(EngineError::not_found("calendar", id));
        }
        self.promote_default_calendar(id);
        self.touch();
        Ok(())
    }

    /// Swap in a whole new calendar set. Activities pointing at calendars
    /// that no longer exist fall back to the project default.
    pub fn replace_calendars(&mut self, calendars: Vec<Calendar>) -> Result<(), EngineError> {
        if calendars.is_empty() {
            return Err(EngineError::InvariantViolation(
                "a project needs at least one calendar".into(),
            ));
        }
        let default_id = calendars
            .iter()
            .find(|c| c.is_default)
            .unwrap_or(&calendars[0])
            .id
            .clone();

        let mut map = IndexMap::new();
        for calendar in calendars {
            if map.contains_key(&calendar.id) {
                return Err(EngineError::Validation(vec![format!(
                    "duplicate calendar id '{}'",
                    calendar.id
                )]));
            }
            map.insert(calendar.id.clone(), calendar);
        }

        self.calendars = map;
        self.promote_default_calendar(&default_id);
        for activity in self.activities.values_mut() {
            if let Some(calendar) = &activity.calendar {
                if !self.calendars.contains_key(calendar) {
                    activity.calendar = None;
                }
            }
        }
        self.touch();
        Ok(())
    }

    pub fn calendars(&self) -> impl Iterator<Item = &Calendar> {
        self.calendars.values()
    }

    fn promote_default_calendar(&mut self, id: &str) {
        for calendar in self.calendars.values_mut() {
            calendar.is_default = calendar.id == id;
        }
        self.default_calendar = id.to_string();
    }

    // ========================================================================
    // Baselines
    // ========================================================================

    /// Snapshot the current plan. The first baseline saved becomes the
    /// default one. Returns the generated baseline id.
    pub fn save_baseline(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<BaselineId, EngineError> {
        let id = Uuid::new_v4().to_string();
        let mut baseline = Baseline::capture(
            id.clone(),
            name,
            description,
            &self.activities,
            self.start,
            self.end,
        );
        baseline.is_default = self.baselines.values().all(|b| !b.is_default);
        self.baselines.insert(id.clone(), baseline);
        self.touch();
        Ok(id)
    }

    /// Copy a baseline's snapshot values onto each activity's baseline
    /// fields. Activities without a snapshot are left untouched.
    pub fn apply_baseline(&mut self, id: &str) -> Result<(), EngineError> {
        let Some(baseline) = self.baselines.get(id) else {
            return Err(EngineError::not_found("baseline", id));
        };
        let fields: Vec<(ActivityId, chronoplan_core::BaselineFields)> = baseline
            .tasks
            .values()
            .map(|snapshot| (snapshot.id.clone(), snapshot.as_fields()))
            .collect();
        for (activity_id, mirror) in fields {
            if let Some(activity) = self.activities.get_mut(&activity_id) {
                activity.baseline = Some(mirror);
            }
        }
        self.touch();
        Ok(())
    }

    /// Delete a baseline. Deleting the default one leaves no default.
    pub fn remove_baseline(&mut self, id: &str) -> Result<(), EngineError> {
        if self.baselines.shift_remove(id).is_none() {
            return Err(EngineError::not_found("baseline", id));
        }
        self.touch();
        Ok(())
    }

    pub fn baselines(&self) -> impl Iterator<Item = &Baseline> {
        self.baselines.values()
    }

    /// Variance of the current plan against a baseline.
    pub fn baseline_variance(&self, id: &str) -> Result<VarianceReport, EngineError> {
        let Some(baseline) = self.baselines.get(id) else {
            return Err(EngineError::not_found("baseline", id));
        };
        Ok(baseline::compare_to_baseline(
            baseline,
            &self.activities,
            self.start,
            self.end,
        ))
    }

    // ========================================================================
    // Scenarios
    // ========================================================================

    fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            activities: self.activities.clone(),
            dependencies: self.dependencies.clone(),
            resources: self.resources.clone(),
            project_start: self.start,
            project_end: self.end,
        }
    }

    fn load_snapshot(&mut self, snapshot: PlanSnapshot) {
        self.activities = snapshot.activities;
        self.dependencies = snapshot.dependencies;
        self.resources = snapshot.resources;
        self.start = snapshot.project_start;
        self.end = snapshot.project_end;
    }

    /// Capture the current plan as a new scenario (not activated).
    /// Returns the generated scenario id.
    pub fn create_scenario(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<ScenarioId, EngineError> {
        let id = Uuid::new_v4().to_string();
        let scenario = Scenario::new(id.clone(), name, description, self.snapshot());
        self.scenarios.insert(id.clone(), scenario);
        self.touch();
        Ok(id)
    }

    /// Swap a scenario in as the working state, parking the live data.
    pub fn activate_scenario(&mut self, id: &str) -> Result<(), EngineError> {
        if let Some(active) = &self.active_scenario {
            return Err(EngineError::InvariantViolation(format!(
                "scenario '{}' is already active",
                active
            )));
        }
        let Some(scenario) = self.scenarios.get(id) else {
            return Err(EngineError::not_found("scenario", id));
        };
        let contents = scenario.data.clone();
        self.live_data = Some(self.snapshot());
        self.load_snapshot(contents);
        self.active_scenario = Some(id.to_string());
        debug!(scenario = %id, "scenario activated");
        self.touch();
        Ok(())
    }

    /// Write the working state back into the active scenario and restore
    /// the parked live data.
    pub fn deactivate_scenario(&mut self) -> Result<(), EngineError> {
        let Some(active) = self.active_scenario.take() else {
            return Err(EngineError::InvariantViolation(
                "no scenario is active".into(),
            ));
        };
        let edited = self.snapshot();
        if let Some(scenario) = self.scenarios.get_mut(&active) {
            scenario.data = edited;
        }
        let live = self.live_data.take().ok_or_else(|| {
            EngineError::InvariantViolation("live data missing for active scenario".into())
        })?;
        self.load_snapshot(live);
        debug!(scenario = %active, "scenario deactivated");
        self.touch();
        Ok(())
    }

    /// Delete a scenario; refused while it is active.
    pub fn remove_scenario(&mut self, id: &str) -> Result<(), EngineError> {
        if self.active_scenario.as_deref() == Some(id) {
            return Err(EngineError::InvariantViolation(format!(
                "scenario '{}' is active and cannot be deleted",
                id
            )));
        }
        if self.scenarios.shift_remove(id).is_none() {
            return Err(EngineError::not_found("scenario", id));
        }
        self.touch();
        Ok(())
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values()
    }

    // ========================================================================
    // Custom fields
    // ========================================================================

    pub fn add_custom_field(&mut self, field: CustomField) -> Result<(), EngineError> {
        if self.custom_fields.contains_key(&field.id) {
            return Err(EngineError::InvariantViolation(format!(
                "custom field '{}' already exists",
                field.id
            )));
        }
        self.custom_fields.insert(field.id.clone(), field);
        self.touch();
        Ok(())
    }

    pub fn update_custom_field(&mut self, field: CustomField) -> Result<(), EngineError> {
        if !self.custom_fields.contains_key(&field.id) {
            return Err(EngineError::not_found("custom field", field.id.clone()));
        }
        let id = field.id.clone();
        self.custom_fields[&id] = field;
        self.touch();
        Ok(())
    }

    /// Delete a field definition and cascade its values off every activity.
    pub fn remove_custom_field(&mut self, id: &str) -> Result<(), EngineError> {
        if self.custom_fields.shift_remove(id).is_none() {
            return Err(EngineError::not_found("custom field", id));
        }
        for activity in self.activities.values_mut() {
            activity.custom_values.remove(id);
        }
        self.touch();
        Ok(())
    }

    /// Set a custom-field value on an activity; the value must match the
    /// field's declared kind.
    pub fn set_custom_value(
        &mut self,
        activity_id: &str,
        field_id: &str,
        value: CustomValue,
    ) -> Result<(), EngineError> {
        let Some(field) = self.custom_fields.get(field_id) else {
            return Err(EngineError::not_found("custom field", field_id));
        };
        if !value.matches(field.kind) {
            return Err(EngineError::Validation(vec![format!(
                "value for field '{}' does not match its {:?} kind",
                field_id, field.kind
            )]));
        }
        let Some(activity) = self.activities.get_mut(activity_id) else {
            return Err(EngineError::not_found("activity", activity_id));
        };
        activity.custom_values.insert(field_id.to_string(), value);
        self.touch();
        Ok(())
    }

    pub fn custom_fields(&self) -> impl Iterator<Item = &CustomField> {
        self.custom_fields.values()
    }

    // ========================================================================
    // Computations
    // ========================================================================

    /// Validate the plan, run both CPM passes, write the timing fields back
    /// onto the activities and refresh the stored critical path.
    pub fn recalculate_dates(&mut self) -> Result<ScheduleReport, EngineError> {
        if let Some(path) = find_cycle(&self.activities, &self.dependencies) {
            return Err(EngineError::Cycle(path));
        }
        let validation = validate_plan(
            &self.activities,
            &self.dependencies,
            &self.resources,
            &self.calendars,
            &self.default_calendar,
        );
        if !validation.is_ok() {
            return Err(EngineError::Validation(validation.errors));
        }

        let outcome = cpm::recalculate(
            &mut self.activities,
            &self.dependencies,
            &self.calendars,
            &self.default_calendar,
            self.start,
        )?;

        self.critical_path = outcome.critical_path.clone();
        self.end = outcome.project_finish;
        self.touch();

        let mut warnings = validation.warnings;
        warnings.extend(outcome.warnings);
        Ok(ScheduleReport {
            critical_path: outcome.critical_path,
            project_start: outcome.project_start,
            project_finish: outcome.project_finish,
            warnings,
        })
    }

    /// Run the resource leveler over the current plan and return its change
    /// log. Slack and the critical path are stale afterwards until the next
    /// `recalculate_dates`.
    pub fn level_resources(&mut self) -> LevelingOutcome {
        let outcome = leveling::level_resources(
            &mut self.activities,
            &self.calendars,
            &self.default_calendar,
        );
        if let Some(finish) = self.activities.values().map(|a| a.end).max() {
            self.end = self.end.max(finish);
        }
        self.touch();
        outcome
    }

    /// Earned value for one activity at the status date.
    pub fn task_evm(&self, id: &str, status_date: NaiveDate) -> Result<EvmMetrics, EngineError> {
        let Some(activity) = self.activities.get(id) else {
            return Err(EngineError::not_found("activity", id));
        };
        Ok(evm::activity_evm(activity, status_date))
    }

    /// Project-level earned value at the status date.
    pub fn project_evm(&self, status_date: NaiveDate) -> EvmMetrics {
        evm::project_evm(&self.activities, status_date)
    }

    /// Aggregate counts and totals for dashboards.
    pub fn project_statistics(&self) -> ProjectStatistics {
        let mut stats = ProjectStatistics {
            total_activities: 0,
            completed: 0,
            in_progress: 0,
            not_started: 0,
            cancelled: 0,
            milestones: 0,
            overall_progress: 0,
            total_cost: Decimal::ZERO,
            total_work_hours: 0.0,
            project_start: self.start,
            project_finish: self.end,
            critical_activities: self.critical_path.len(),
        };

        let mut weighted = 0.0f64;
        let mut weight_total = 0.0f64;
        let mut span: Option<(NaiveDate, NaiveDate)> = None;

        for activity in self.activities.values() {
            if activity.is_summary() {
                continue;
            }
            stats.total_activities += 1;
            match activity.status {
                ActivityStatus::Completed => stats.completed += 1,
                ActivityStatus::InProgress => stats.in_progress += 1,
                ActivityStatus::NotStarted => stats.not_started += 1,
                ActivityStatus::Cancelled => stats.cancelled += 1,
            }
            if activity.is_milestone() {
                stats.milestones += 1;
            }
            stats.total_cost += activity.cost.unwrap_or(Decimal::ZERO);
            stats.total_work_hours += activity.work_hours.unwrap_or(0.0);

            let weight = activity
                .duration
                .unwrap_or_else(|| (activity.end - activity.start).num_days() + 1)
                .max(0) as f64;
            weighted += f64::from(activity.effective_progress()) * weight;
            weight_total += weight;

            span = match span {
                Some((s, e)) => Some((s.min(activity.start), e.max(activity.end))),
                None => Some((activity.start, activity.end)),
            };
        }

        if weight_total > 0.0 {
            stats.overall_progress = (weighted / weight_total).round() as u8;
        }
        if let Some((start, finish)) = span {
            stats.project_start = start;
            stats.project_finish = finish;
        }
        stats
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Deep copy of the whole state, ready for the caller to serialize.
    pub fn export_state(&self) -> ProjectState {
        self.clone()
    }

    /// Adopt a previously exported state after checking its structural
    /// invariants.
    pub fn import_state(state: ProjectState) -> Result<ProjectState, EngineError> {
        if !state.calendars.contains_key(&state.default_calendar) {
            return Err(EngineError::InvariantViolation(format!(
                "default calendar '{}' is missing",
                state.default_calendar
            )));
        }
        if state.active_scenario.is_some() != state.live_data.is_some() {
            return Err(EngineError::InvariantViolation(
                "active scenario and live data must be set together".into(),
            ));
        }
        if let Some(active) = &state.active_scenario {
            if !state.scenarios.contains_key(active) {
                return Err(EngineError::not_found("scenario", active.clone()));
            }
        }
        if state.baselines.values().filter(|b| b.is_default).count() > 1 {
            return Err(EngineError::InvariantViolation(
                "more than one default baseline".into(),
            ));
        }
        if state.calendars.values().filter(|c| c.is_default).count() > 1 {
            return Err(EngineError::InvariantViolation(
                "more than one default calendar".into(),
            ));
        }
        Ok(state)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn project() -> ProjectState {
        ProjectState::new("Test", date(2024, 1, 1))
    }

    #[test]
    fn new_project_has_a_default_calendar() {
        let project = project();
        assert_eq!(project.calendars.len(), 1);
        assert_eq!(project.default_calendar, "standard");
        assert!(project.calendars["standard"].is_default);
    }

    #[test]
    fn duplicate_activity_is_refused() {
        let mut project = project();
        project.add_activity(Activity::new("a")).unwrap();
        let err = project.add_activity(Activity::new("a")).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn invalid_activity_leaves_state_unchanged() {
        let mut project = project();
        let bad = Activity::new("a").schedule(date(2024, 1, 5), date(2024, 1, 1));
        let before = project.updated_at;
        assert!(matches!(
            project.add_activity(bad),
            Err(EngineError::Validation(_))
        ));
        assert!(project.activities.is_empty());
        assert_eq!(project.updated_at, before);
    }

    #[test]
    fn update_activity_patches_selected_fields() {
        let mut project = project();
        project
            .add_activity(Activity::new("a").schedule(date(2024, 1, 1), date(2024, 1, 5)))
            .unwrap();

        project
            .update_activity(
                "a",
                ActivityPatch {
                    name: Some("Renamed".into()),
                    progress: Some(40.0),
                    duration: Some(Some(4)),
                    ..Default::default()
                },
            )
            .unwrap();

        let a = project.activity("a").unwrap();
        assert_eq!(a.name, "Renamed");
        assert_eq!(a.progress, 40.0);
        assert_eq!(a.duration, Some(4));
        // Untouched fields survive
        assert_eq!(a.start, date(2024, 1, 1));
    }

    #[test]
    fn update_rejecting_bad_patch_keeps_old_value() {
        let mut project = project();
        project
            .add_activity(Activity::new("a").schedule(date(2024, 1, 1), date(2024, 1, 5)))
            .unwrap();

        let err = project
            .update_activity(
                "a",
                ActivityPatch {
                    progress: Some(150.0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(project.activity("a").unwrap().progress, 0.0);
    }

    #[test]
    fn removing_an_activity_cascades_to_dependencies() {
        let mut project = project();
        project.add_activity(Activity::new("a")).unwrap();
        project.add_activity(Activity::new("b")).unwrap();
        project.add_activity(Activity::new("c")).unwrap();
        project
            .add_dependency("a", "b", DependencyKind::FinishToStart, 0)
            .unwrap();
        project
            .add_dependency("b", "c", DependencyKind::FinishToStart, 0)
            .unwrap();

        project.remove_activity("b").unwrap();
        assert!(project.dependencies().is_empty());
        assert!(project.activity("b").is_none());
    }

    #[test]
    fn removing_a_summary_clears_children_parents() {
        let mut project = project();
        project.add_activity(Activity::new("phase").summary()).unwrap();
        project
            .add_activity(Activity::new("a").parent("phase"))
            .unwrap();

        project.remove_activity("phase").unwrap();
        assert_eq!(project.activity("a").unwrap().parent, None);
    }

    #[test]
    fn dependency_cycle_is_refused_with_path() {
        let mut project = project();
        project.add_activity(Activity::new("a")).unwrap();
        project.add_activity(Activity::new("b")).unwrap();
        project
            .add_dependency("a", "b", DependencyKind::FinishToStart, 0)
            .unwrap();

        let err = project
            .add_dependency("b", "a", DependencyKind::FinishToStart, 0)
            .unwrap_err();
        match err {
            EngineError::Cycle(path) => assert!(path.len() >= 2),
            other => panic!("expected cycle, got {:?}", other),
        }
        // The failed add left no edge behind
        assert_eq!(project.dependencies().len(), 1);
    }

    #[test]
    fn dependencies_for_returns_both_sides() {
        let mut project = project();
        project.add_activity(Activity::new("a")).unwrap();
        project.add_activity(Activity::new("b")).unwrap();
        project.add_activity(Activity::new("c")).unwrap();
        project
            .add_dependency("a", "b", DependencyKind::FinishToStart, 0)
            .unwrap();
        project
            .add_dependency("b", "c", DependencyKind::StartToStart, 1)
            .unwrap();

        assert_eq!(project.dependencies_for("b").len(), 2);
        assert_eq!(project.dependencies_for("a").len(), 1);
    }

    #[test]
    fn removing_a_resource_strips_assignments() {
        let mut project = project();
        project.add_resource(Resource::new("dev")).unwrap();
        project
            .add_activity(Activity::new("a").assign("dev", 100.0))
            .unwrap();

        project.remove_resource("dev").unwrap();
        assert!(project.activity("a").unwrap().assignments.is_empty());
    }

    #[test]
    fn assignment_to_unknown_resource_is_refused() {
        let mut project = project();
        let err = project
            .add_activity(Activity::new("a").assign("ghost", 50.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "resource", .. }));
    }

    #[test]
    fn default_calendar_is_unique() {
        let mut project = project();
        let mut night = Calendar::new("night");
        night.is_default = true;
        project.add_calendar(night).unwrap();

        assert_eq!(project.default_calendar, "night");
        let defaults: Vec<_> = project.calendars().filter(|c| c.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, "night");
    }

    #[test]
    fn last_calendar_cannot_be_deleted() {
        let mut project = project();
        let err = project.remove_calendar("standard").unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn deleting_a_calendar_repoints_activities() {
        let mut project = project();
        project.add_calendar(Calendar::new("night")).unwrap();
        project
            .add_activity(Activity::new("a").calendar("night"))
            .unwrap();

        project.remove_calendar("night").unwrap();
        assert_eq!(
            project.activity("a").unwrap().calendar.as_deref(),
            Some("standard")
        );
    }

    #[test]
    fn deleting_the_default_calendar_promotes_another() {
        let mut project = project();
        project.add_calendar(Calendar::new("night")).unwrap();
        project.remove_calendar("standard").unwrap();

        assert_eq!(project.default_calendar, "night");
        assert!(project.calendars["night"].is_default);
    }

    #[test]
    fn replace_calendars_clears_dangling_references() {
        let mut project = project();
        project.add_calendar(Calendar::new("night")).unwrap();
        project
            .add_activity(Activity::new("a").calendar("night"))
            .unwrap();

        project
            .replace_calendars(vec![Calendar::new("fresh")])
            .unwrap();
        assert_eq!(project.default_calendar, "fresh");
        assert_eq!(project.activity("a").unwrap().calendar, None);
    }

    #[test]
    fn first_baseline_becomes_default() {
        let mut project = project();
        project.add_activity(Activity::new("a")).unwrap();
        let first = project.save_baseline("original", None).unwrap();
        let second = project.save_baseline("rebase", None).unwrap();

        assert!(project.baselines[&first].is_default);
        assert!(!project.baselines[&second].is_default);

        // Deleting the default leaves no default
        project.remove_baseline(&first).unwrap();
        assert!(project.baselines().all(|b| !b.is_default));
    }

    #[test]
    fn apply_baseline_mirrors_snapshot_fields() {
        let mut project = project();
        project
            .add_activity(
                Activity::new("a")
                    .schedule(date(2024, 1, 1), date(2024, 1, 5))
                    .duration(5)
                    .progress(10.0),
            )
            .unwrap();
        let id = project.save_baseline("original", None).unwrap();

        // Slip the schedule, then apply the baseline
        project
            .update_activity(
                "a",
                ActivityPatch {
                    start: Some(date(2024, 2, 1)),
                    end: Some(date(2024, 2, 7)),
                    ..Default::default()
                },
            )
            .unwrap();
        project.apply_baseline(&id).unwrap();

        let mirror = project.activity("a").unwrap().baseline.as_ref().unwrap();
        assert_eq!(mirror.start, date(2024, 1, 1));
        assert_eq!(mirror.end, date(2024, 1, 5));
        assert_eq!(mirror.duration, Some(5));
        assert_eq!(mirror.progress, 10.0);
        // Current dates stay where the update put them
        assert_eq!(project.activity("a").unwrap().start, date(2024, 2, 1));
    }

    #[test]
    fn custom_field_value_type_is_enforced() {
        let mut project = project();
        project.add_activity(Activity::new("a")).unwrap();
        project
            .add_custom_field(CustomField::new(
                "phase",
                "Phase",
                chronoplan_core::CustomFieldKind::Text,
            ))
            .unwrap();

        project
            .set_custom_value("a", "phase", CustomValue::Text("discovery".into()))
            .unwrap();
        let err = project
            .set_custom_value("a", "phase", CustomValue::Number(3.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn removing_a_custom_field_cascades_values() {
        let mut project = project();
        project.add_activity(Activity::new("a")).unwrap();
        project
            .add_custom_field(CustomField::new(
                "phase",
                "Phase",
                chronoplan_core::CustomFieldKind::Text,
            ))
            .unwrap();
        project
            .set_custom_value("a", "phase", CustomValue::Text("discovery".into()))
            .unwrap();

        project.remove_custom_field("phase").unwrap();
        assert!(project.activity("a").unwrap().custom_values.is_empty());
    }

    #[test]
    fn recalculate_refuses_invalid_plans() {
        let mut project = project();
        let mut bad = Activity::new("a");
        bad.progress = 300.0;
        project.activities.insert("a".into(), bad);

        assert!(matches!(
            project.recalculate_dates(),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn recalculate_surfaces_smuggled_cycles() {
        // Even edges that bypassed add_dependency (e.g. an edited import)
        // are refused with the offending path.
        let mut project = project();
        project.add_activity(Activity::new("a")).unwrap();
        project.add_activity(Activity::new("b")).unwrap();
        project.dependencies.push(Dependency::new("d1", "a", "b"));
        project.dependencies.push(Dependency::new("d2", "b", "a"));

        assert!(matches!(
            project.recalculate_dates(),
            Err(EngineError::Cycle(_))
        ));
    }

    #[test]
    fn statistics_count_statuses_and_weight_progress() {
        let mut project = project();
        project
            .add_activity(
                Activity::new("a")
                    .schedule(date(2024, 1, 1), date(2024, 1, 5))
                    .duration(5)
                    .progress(100.0)
                    .status(ActivityStatus::Completed),
            )
            .unwrap();
        project
            .add_activity(
                Activity::new("b")
                    .schedule(date(2024, 1, 8), date(2024, 1, 12))
                    .duration(5)
                    .progress(50.0)
                    .status(ActivityStatus::InProgress),
            )
            .unwrap();
        project
            .add_activity(
                Activity::new("m")
                    .schedule(date(2024, 1, 12), date(2024, 1, 12))
                    .milestone(),
            )
            .unwrap();

        let stats = project.project_statistics();
        assert_eq!(stats.total_activities, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.not_started, 1);
        assert_eq!(stats.milestones, 1);
        // (100*5 + 50*5 + 0*0) / 10 = 75
        assert_eq!(stats.overall_progress, 75);
        assert_eq!(stats.project_start, date(2024, 1, 1));
        assert_eq!(stats.project_finish, date(2024, 1, 12));
    }

    #[test]
    fn import_rejects_inconsistent_scenario_state() {
        let mut exported = project().export_state();
        exported.active_scenario = Some("ghost".into());

        assert!(matches!(
            ProjectState::import_state(exported),
            Err(EngineError::InvariantViolation(_))
        ));
    }

    #[test]
    fn import_rejects_missing_default_calendar() {
        let mut exported = project().export_state();
        exported.default_calendar = "ghost".into();

        assert!(matches!(
            ProjectState::import_state(exported),
            Err(EngineError::InvariantViolation(_))
        ));
    }
}
