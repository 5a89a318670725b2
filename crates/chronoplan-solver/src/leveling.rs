//! Resource leveling.
//!
//! Greedy, priority-ordered placement: activities are visited from critical
//! down to low priority (ties by current start, then insertion order) and
//! each one is pushed to the earliest working day where no assigned
//! resource would exceed 100% total allocation against the activities
//! already placed. Completed activities are frozen at their current dates
//! but still consume capacity.
//!
//! Leveling runs after CPM and only rewrites start/end; callers re-run the
//! solver afterwards if they want fresh slack and critical-path data.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chronoplan_core::calendar::calendar_for;
use chronoplan_core::validate::ALLOCATION_LIMIT;
use chronoplan_core::{
    Activity, ActivityId, ActivityMap, ActivityStatus, Calendar, CalendarId, CalendarMap,
    ResourceId, Warning,
};

/// How far past an activity's current start the leveler searches for a
/// conflict-free slot before giving up (calendar days).
pub const LEVELING_HORIZON_DAYS: i64 = 730;

/// One activity re-dated by the leveler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelingChange {
    pub activity: ActivityId,
    pub original_start: NaiveDate,
    pub original_end: NaiveDate,
    pub new_start: NaiveDate,
    pub new_end: NaiveDate,
    pub reason: String,
}

/// Result of a leveling run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelingOutcome {
    /// Activities that moved, in placement order
    pub changes: Vec<LevelingChange>,
    /// Activities that could not be placed within the horizon
    pub warnings: Vec<Warning>,
}

/// Per-resource allocation already claimed by placed activities
type UsageMap = HashMap<ResourceId, HashMap<NaiveDate, f32>>;

/// Level the plan in place and return the change log.
pub fn level_resources(
    activities: &mut ActivityMap,
    calendars: &CalendarMap,
    default_calendar: &CalendarId,
) -> LevelingOutcome {
    let mut outcome = LevelingOutcome::default();
    let mut usage: UsageMap = HashMap::new();

    let mut candidates: Vec<ActivityId> = activities
        .values()
        .filter(|a| !a.is_summary())
        .map(|a| a.id.clone())
        .collect();
    candidates.sort_by_key(|id| {
        let activity = &activities[id.as_str()];
        (
            activity.priority.rank(),
            activity.start,
            activities.get_index_of(id.as_str()).unwrap_or(usize::MAX),
        )
    });

    let fallback = Calendar::default();
    for id in candidates {
        let activity = &activities[id.as_str()];
        let calendar = calendar_for(activity, calendars, default_calendar).unwrap_or(&fallback);
        let duration = activity.duration_days(calendar);
        let assignments: Vec<(ResourceId, f32)> = activity
            .assignments
            .iter()
            .map(|a| (a.resource_id.clone(), a.allocation))
            .collect();
        let original_start = activity.start;
        let original_end = activity.end;

        // Completed work is history; freeze it where it is.
        if activity.status == ActivityStatus::Completed {
            occupy(&mut usage, calendar, original_start, duration, &assignments);
            continue;
        }

        let horizon = original_start + ChronoDuration::days(LEVELING_HORIZON_DAYS);
        let mut slot = calendar.next_working_day(original_start);
        let placed = loop {
            if slot > horizon {
                break None;
            }
            if fits(&usage, calendar, slot, duration, &assignments) {
                break Some(slot);
            }
            slot = calendar.add_working_days(slot, 1);
        };

        let Some(new_start) = placed else {
            // Nothing within the horizon; leave the activity alone and
            // record the failure.
            warn!(activity = %id, "no conflict-free slot within the leveling horizon");
            occupy(&mut usage, calendar, original_start, duration, &assignments);
            outcome
                .warnings
                .push(Warning::LevelingHorizon { activity: id.clone() });
            continue;
        };

        occupy(&mut usage, calendar, new_start, duration, &assignments);
        let new_end = calendar.end_from_start(new_start, duration);

        if new_start != original_start || new_end != original_end {
            debug!(activity = %id, %original_start, %new_start, "leveling moved activity");
            outcome.changes.push(LevelingChange {
                activity: id.clone(),
                original_start,
                original_end,
                new_start,
                new_end,
                reason: "resource over-allocation".to_string(),
            });
            let activity = activities.get_mut(id.as_str()).expect("candidate exists");
            activity.start = new_start;
            activity.end = new_end;
        }
    }

    outcome
}

/// Whether the activity fits at `start` without pushing any assigned
/// resource above the allocation limit.
fn fits(
    usage: &UsageMap,
    calendar: &Calendar,
    start: NaiveDate,
    duration: i64,
    assignments: &[(ResourceId, f32)],
) -> bool {
    let mut date = start;
    let mut remaining = duration;
    while remaining > 0 {
        if calendar.is_working_day(date) || !calendar.has_working_time() {
            for (resource, allocation) in assignments {
                let claimed = usage
                    .get(resource)
                    .and_then(|days| days.get(&date))
                    .copied()
                    .unwrap_or(0.0);
                if claimed + allocation > ALLOCATION_LIMIT + f32::EPSILON {
                    return false;
                }
            }
            remaining -= 1;
        }
        date = match date.succ_opt() {
            Some(d) => d,
            None => return false,
        };
    }
    true
}

/// Claim capacity for an activity placed at `start`.
fn occupy(
    usage: &mut UsageMap,
    calendar: &Calendar,
    start: NaiveDate,
    duration: i64,
    assignments: &[(ResourceId, f32)],
) {
    let mut date = start;
    let mut remaining = duration;
    while remaining > 0 {
        if calendar.is_working_day(date) || !calendar.has_working_time() {
            for (resource, allocation) in assignments {
                *usage
                    .entry(resource.clone())
                    .or_default()
                    .entry(date)
                    .or_insert(0.0) += allocation;
            }
            remaining -= 1;
        }
        date = match date.succ_opt() {
            Some(d) => d,
            None => return,
        };
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chronoplan_core::{Calendar, Priority};
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn plan(tasks: Vec<Activity>) -> ActivityMap {
        let mut map = ActivityMap::new();
        for task in tasks {
            map.insert(task.id.clone(), task);
        }
        map
    }

    fn standard() -> (CalendarMap, CalendarId) {
        let mut calendars = CalendarMap::new();
        calendars.insert("standard".into(), Calendar::default());
        (calendars, "standard".into())
    }

    #[test]
    fn lower_priority_task_is_delayed() {
        let monday = date(2024, 1, 1);
        let friday = date(2024, 1, 5);
        let mut activities = plan(vec![
            Activity::new("urgent")
                .schedule(monday, friday)
                .duration(5)
                .priority(Priority::High)
                .assign("dev", 100.0),
            Activity::new("routine")
                .schedule(monday, friday)
                .duration(5)
                .priority(Priority::Medium)
                .assign("dev", 100.0),
        ]);
        let (calendars, default_id) = standard();
        let outcome = level_resources(&mut activities, &calendars, &default_id);

        // High priority keeps its dates
        assert_eq!(activities["urgent"].start, monday);
        assert_eq!(activities["urgent"].end, friday);
        // Medium slides to the next working day after the high one ends
        assert_eq!(activities["routine"].start, date(2024, 1, 8));
        assert_eq!(activities["routine"].end, date(2024, 1, 12));

        assert_eq!(outcome.changes.len(), 1);
        let change = &outcome.changes[0];
        assert_eq!(change.activity, "routine");
        assert_eq!(change.original_start, monday);
        assert_eq!(change.new_start, date(2024, 1, 8));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn partial_allocations_can_share_a_day() {
        let monday = date(2024, 1, 1);
        let friday = date(2024, 1, 5);
        let mut activities = plan(vec![
            Activity::new("a")
                .schedule(monday, friday)
                .duration(5)
                .assign("dev", 60.0),
            Activity::new("b")
                .schedule(monday, friday)
                .duration(5)
                .assign("dev", 40.0),
        ]);
        let (calendars, default_id) = standard();
        let outcome = level_resources(&mut activities, &calendars, &default_id);

        // 60 + 40 = 100, nothing to resolve
        assert!(outcome.changes.is_empty());
        assert_eq!(activities["a"].start, monday);
        assert_eq!(activities["b"].start, monday);
    }

    #[test]
    fn completed_activities_are_frozen() {
        let monday = date(2024, 1, 1);
        let friday = date(2024, 1, 5);
        let mut activities = plan(vec![
            // Lower priority but completed: must not move
            Activity::new("done")
                .schedule(monday, friday)
                .duration(5)
                .priority(Priority::Low)
                .status(ActivityStatus::Completed)
                .assign("dev", 100.0),
            Activity::new("pending")
                .schedule(monday, friday)
                .duration(5)
                .priority(Priority::Critical)
                .assign("dev", 100.0),
        ]);
        let (calendars, default_id) = standard();
        let outcome = level_resources(&mut activities, &calendars, &default_id);

        assert_eq!(activities["done"].start, monday);
        assert_eq!(activities["done"].end, friday);
        // The critical task is placed first and keeps Monday; the completed
        // low one is frozen regardless, so it is the frozen record that
        // overlaps. Completed work never shows up in the change log.
        assert!(outcome.changes.iter().all(|c| c.activity != "done"));
    }

    #[test]
    fn priority_order_beats_insertion_order() {
        let monday = date(2024, 1, 1);
        let friday = date(2024, 1, 5);
        let mut activities = plan(vec![
            Activity::new("second")
                .schedule(monday, friday)
                .duration(5)
                .priority(Priority::Low)
                .assign("dev", 100.0),
            Activity::new("first")
                .schedule(monday, friday)
                .duration(5)
                .priority(Priority::Critical)
                .assign("dev", 100.0),
        ]);
        let (calendars, default_id) = standard();
        level_resources(&mut activities, &calendars, &default_id);

        // Critical wins the slot even though it was inserted later
        assert_eq!(activities["first"].start, monday);
        assert_eq!(activities["second"].start, date(2024, 1, 8));
    }

    #[test]
    fn no_day_exceeds_the_limit_after_leveling() {
        let monday = date(2024, 1, 1);
        let mut activities = plan(vec![
            Activity::new("a")
                .schedule(monday, date(2024, 1, 3))
                .duration(3)
                .assign("dev", 70.0),
            Activity::new("b")
                .schedule(monday, date(2024, 1, 3))
                .duration(3)
                .assign("dev", 70.0),
            Activity::new("c")
                .schedule(monday, date(2024, 1, 3))
                .duration(3)
                .assign("dev", 70.0),
        ]);
        let (calendars, default_id) = standard();
        level_resources(&mut activities, &calendars, &default_id);

        // Rebuild usage from the leveled plan and check the cap
        let calendar = Calendar::default();
        let mut usage: HashMap<NaiveDate, f32> = HashMap::new();
        for activity in activities.values() {
            let mut d = activity.start;
            while d <= activity.end {
                if calendar.is_working_day(d) {
                    *usage.entry(d).or_insert(0.0) += activity.assignments[0].allocation;
                }
                d = d.succ_opt().unwrap();
            }
        }
        for (day, total) in usage {
            assert!(total <= ALLOCATION_LIMIT, "{} over-allocated: {}", day, total);
        }
    }

    #[test]
    fn weekend_start_snaps_to_working_day() {
        let saturday = date(2024, 1, 6);
        let mut activities = plan(vec![Activity::new("a")
            .schedule(saturday, saturday)
            .duration(2)
            .assign("dev", 100.0)]);
        let (calendars, default_id) = standard();
        let outcome = level_resources(&mut activities, &calendars, &default_id);

        assert_eq!(activities["a"].start, date(2024, 1, 8));
        assert_eq!(activities["a"].end, date(2024, 1, 9));
        assert_eq!(outcome.changes.len(), 1);
    }

    #[test]
    fn horizon_exhaustion_reports_warning() {
        let monday = date(2024, 1, 1);
        // A completed marathon blocks the resource far past the horizon
        let mut activities = plan(vec![
            Activity::new("blocker")
                .schedule(monday, date(2027, 1, 1))
                .status(ActivityStatus::Completed)
                .priority(Priority::Critical)
                .assign("dev", 100.0),
            Activity::new("stuck")
                .schedule(monday, date(2024, 1, 5))
                .duration(5)
                .priority(Priority::Low)
                .assign("dev", 100.0),
        ]);
        let (calendars, default_id) = standard();
        let outcome = level_resources(&mut activities, &calendars, &default_id);

        // Falls back to the original start with a diagnostic
        assert_eq!(activities["stuck"].start, monday);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::LevelingHorizon { activity } if activity == "stuck")));
    }
}
