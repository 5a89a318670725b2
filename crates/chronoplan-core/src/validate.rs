//! Pure validation checks.
//!
//! Everything here is side-effect free: activity and dependency checks
//! return plain message lists, plan-level validation returns a report of
//! errors plus non-fatal warnings (resource over-allocation, degenerate
//! calendars). The engine decides what to do with the report; nothing in
//! this module mutates state.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;

use crate::calendar::calendar_for;
use crate::{
    Activity, ActivityId, ActivityKind, ActivityMap, CalendarId, CalendarMap, Dependency,
    Resource, ResourceId, ResourceMap, Warning,
};

/// Allocation ceiling per resource and day, in percent
pub const ALLOCATION_LIMIT: f32 = 100.0;

/// Outcome of a plan-level validation pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    /// Hard errors; any entry blocks scheduling
    pub errors: Vec<String>,
    /// Non-fatal diagnostics
    pub warnings: Vec<Warning>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Field-level checks for a single activity
pub fn validate_activity(activity: &Activity) -> Vec<String> {
    let mut errors = Vec::new();

    if activity.id.trim().is_empty() {
        errors.push("activity id must not be empty".to_string());
    }
    if activity.name.trim().is_empty() {
        errors.push(format!("activity '{}' has an empty name", activity.id));
    }
    if activity.start > activity.end {
        errors.push(format!(
            "activity '{}' starts {} after its end {}",
            activity.id, activity.start, activity.end
        ));
    }
    if activity.kind == ActivityKind::Milestone && activity.start != activity.end {
        errors.push(format!(
            "milestone '{}' must start and end on the same date",
            activity.id
        ));
    }
    if !(0.0..=100.0).contains(&activity.progress) {
        errors.push(format!(
            "activity '{}' progress {} outside 0-100",
            activity.id, activity.progress
        ));
    }
    if let Some(duration) = activity.duration {
        if duration < 0 {
            errors.push(format!(
                "activity '{}' has negative duration {}",
                activity.id, duration
            ));
        }
    }
    for assignment in &activity.assignments {
        if !(0.0..=100.0).contains(&assignment.allocation) {
            errors.push(format!(
                "activity '{}' allocates {}% of resource '{}' (allowed 0-100)",
                activity.id, assignment.allocation, assignment.resource_id
            ));
        }
    }

    errors
}

/// Endpoint checks for a single dependency
pub fn validate_dependency(dependency: &Dependency, activities: &ActivityMap) -> Vec<String> {
    let mut errors = Vec::new();

    if dependency.predecessor == dependency.successor {
        errors.push(format!(
            "dependency '{}' links activity '{}' to itself",
            dependency.id, dependency.predecessor
        ));
    }
    if !activities.contains_key(&dependency.predecessor) {
        errors.push(format!(
            "dependency '{}' references unknown predecessor '{}'",
            dependency.id, dependency.predecessor
        ));
    }
    if !activities.contains_key(&dependency.successor) {
        errors.push(format!(
            "dependency '{}' references unknown successor '{}'",
            dependency.id, dependency.successor
        ));
    }

    errors
}

/// Field-level checks for a resource
pub fn validate_resource(resource: &Resource) -> Vec<String> {
    let mut errors = Vec::new();

    if resource.id.trim().is_empty() {
        errors.push("resource id must not be empty".to_string());
    }
    if resource.name.trim().is_empty() {
        errors.push(format!("resource '{}' has an empty name", resource.id));
    }
    if !(0.0..=100.0).contains(&resource.availability) {
        errors.push(format!(
            "resource '{}' availability {} outside 0-100",
            resource.id, resource.availability
        ));
    }

    errors
}

/// Validate the whole plan: activity and dependency fields, graph
/// acyclicity, calendar sanity, and resource allocation levels.
pub fn validate_plan(
    activities: &ActivityMap,
    dependencies: &[Dependency],
    resources: &ResourceMap,
    calendars: &CalendarMap,
    default_calendar: &CalendarId,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for activity in activities.values() {
        report.errors.extend(validate_activity(activity));
    }
    for dependency in dependencies {
        report
            .errors
            .extend(validate_dependency(dependency, activities));
    }

    if let Some(cycle) = find_cycle(activities, dependencies) {
        report
            .errors
            .push(format!("dependency cycle: {}", cycle.join(" -> ")));
    }

    for calendar in calendars.values() {
        if !calendar.has_working_time() {
            report.warnings.push(Warning::DegenerateCalendar {
                calendar: calendar.id.clone(),
            });
        }
    }

    report
        .warnings
        .extend(overallocation_warnings(activities, resources, calendars, default_calendar));

    report
}

/// DFS cycle detector over the dependency edges.
/// Returns the offending path, closed on the repeated activity.
pub fn find_cycle(activities: &ActivityMap, dependencies: &[Dependency]) -> Option<Vec<ActivityId>> {
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for dep in dependencies {
        successors
            .entry(dep.predecessor.as_str())
            .or_default()
            .push(dep.successor.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: Vec<&str> = Vec::new();

    fn walk<'a>(
        node: &'a str,
        successors: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        on_stack: &mut Vec<&'a str>,
    ) -> Option<Vec<ActivityId>> {
        if let Some(pos) = on_stack.iter().position(|&n| n == node) {
            let mut cycle: Vec<ActivityId> =
                on_stack[pos..].iter().map(|s| (*s).to_string()).collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if visited.contains(node) {
            return None;
        }
        on_stack.push(node);
        if let Some(next) = successors.get(node) {
            for succ in next {
                if let Some(cycle) = walk(succ, successors, visited, on_stack) {
                    return Some(cycle);
                }
            }
        }
        on_stack.pop();
        visited.insert(node);
        None
    }

    for id in activities.keys() {
        if let Some(cycle) = walk(id.as_str(), &successors, &mut visited, &mut on_stack) {
            return Some(cycle);
        }
    }
    None
}

/// Sum allocations per resource and working day, and report contiguous
/// over-allocated ranges as warnings.
pub fn overallocation_warnings(
    activities: &ActivityMap,
    resources: &ResourceMap,
    calendars: &CalendarMap,
    default_calendar: &CalendarId,
) -> Vec<Warning> {
    let mut usage: HashMap<&ResourceId, BTreeMap<NaiveDate, f32>> = HashMap::new();

    for activity in activities.values() {
        if activity.is_summary() || activity.assignments.is_empty() {
            continue;
        }
        let Some(calendar) = calendar_for(activity, calendars, default_calendar) else {
            continue;
        };
        for assignment in &activity.assignments {
            if !resources.contains_key(&assignment.resource_id) {
                continue;
            }
            let days = usage.entry(&assignment.resource_id).or_default();
            let mut date = activity.start;
            while date <= activity.end {
                if calendar.is_working_day(date) {
                    *days.entry(date).or_insert(0.0) += assignment.allocation;
                }
                date = match date.succ_opt() {
                    Some(d) => d,
                    None => break,
                };
            }
        }
    }

    let mut warnings = Vec::new();
    let mut resource_ids: Vec<&&ResourceId> = usage.keys().collect();
    resource_ids.sort();

    for resource_id in resource_ids {
        let days = &usage[*resource_id];
        let mut current: Option<(NaiveDate, NaiveDate, f32)> = None;
        for (&date, &total) in days {
            if total > ALLOCATION_LIMIT + f32::EPSILON {
                match &mut current {
                    Some((_, end, peak)) if end.succ_opt() == Some(date) => {
                        *end = date;
                        *peak = peak.max(total);
                    }
                    _ => {
                        if let Some((start, end, peak)) = current.take() {
                            warnings.push(Warning::Overallocation {
                                resource: (*resource_id).clone(),
                                start,
                                end,
                                peak,
                            });
                        }
                        current = Some((date, date, total));
                    }
                }
            } else if let Some((start, end, peak)) = current.take() {
                warnings.push(Warning::Overallocation {
                    resource: (*resource_id).clone(),
                    start,
                    end,
                    peak,
                });
            }
        }
        if let Some((start, end, peak)) = current {
            warnings.push(Warning::Overallocation {
                resource: (*resource_id).clone(),
                start,
                end,
                peak,
            });
        }
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================
