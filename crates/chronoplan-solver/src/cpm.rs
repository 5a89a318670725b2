//! Critical Path Method over working-time calendars.
//!
//! Two passes in topological order over the schedulable activities:
//!
//! 1. Forward pass: early start / early finish. An activity with no
//!    predecessors keeps its stored start. FS and SS links bound the
//!    successor's start; FF and SF links bound its finish. Date constraints
//!    are folded in between: MSO/MFO pin, SNET/FNET floor, SNLT/FNLT wait
//!    for the backward pass.
//! 2. Backward pass: late finish / late start, mirrored bounds, ceiling
//!    constraints applied.
//!
//! Slack is the signed working-day offset from early start to late start
//! under the activity's calendar; an activity is critical when slack <= 0.
//! A pinned constraint that conflicts with its predecessors wins and the
//! activity is flagged critical, never silently ignored.
//!
//! Summary activities are not scheduled; their dates roll up from their
//! children after both passes.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::debug;

use chronoplan_core::calendar::calendar_for;
use chronoplan_core::{
    Activity, ActivityId, ActivityMap, Calendar, CalendarId, CalendarMap, ConstraintKind,
    DateConstraint, Dependency, DependencyKind, EngineError, Warning,
};

use crate::graph::DependencyGraph;

/// Result of a solver run
#[derive(Debug, Clone, PartialEq)]
pub struct CpmOutcome {
    /// Critical activity ids in topological order
    pub critical_path: Vec<ActivityId>,
    /// Earliest early start across the plan
    pub project_start: NaiveDate,
    /// Latest early finish across the plan
    pub project_finish: NaiveDate,
    /// Constraint conflicts and other non-fatal findings
    pub warnings: Vec<Warning>,
}

struct Node<'a> {
    duration: i64,
    start: NaiveDate,
    constraint: Option<DateConstraint>,
    calendar: &'a Calendar,
}

/// Run both CPM passes and write the timing fields back onto the
/// activities. Refuses to run on a cyclic graph.
pub fn recalculate(
    activities: &mut ActivityMap,
    dependencies: &[Dependency],
    calendars: &CalendarMap,
    default_calendar: &CalendarId,
    project_start: NaiveDate,
) -> Result<CpmOutcome, EngineError> {
    let graph = DependencyGraph::build(activities, dependencies);
    let order = graph.topo_order()?;

    let fallback = Calendar::default();
    let nodes: HashMap<ActivityId, Node> = activities
        .values()
        .filter(|a| !a.is_summary())
        .map(|a| {
            let calendar = calendar_for(a, calendars, default_calendar).unwrap_or(&fallback);
            (
                a.id.clone(),
                Node {
                    duration: a.duration_days(calendar),
                    start: a.start,
                    constraint: a.constraint,
                    calendar,
                },
            )
        })
        .collect();

    let mut warnings = Vec::new();
    let mut conflicted: HashSet<ActivityId> = HashSet::new();

    // ════════════════════════════════════════════════════════════════════
    // Forward pass
    // ════════════════════════════════════════════════════════════════════

    let mut early_start: HashMap<ActivityId, NaiveDate> = HashMap::new();
    let mut early_finish: HashMap<ActivityId, NaiveDate> = HashMap::new();

    for id in &order {
        let node = &nodes[id];
        let duration = node.duration;

        // Lower bounds from predecessors, computed with each predecessor's
        // own calendar. FS/SS bound the start; FF/SF bound the finish.
        let mut start_bound: Option<NaiveDate> = None;
        let mut finish_bound: Option<NaiveDate> = None;
        for edge in graph.predecessors(id) {
            let pred = &nodes[&edge.predecessor];
            let pred_es = early_start[&edge.predecessor];
            let pred_ef = early_finish[&edge.predecessor];
            match edge.kind {
                DependencyKind::FinishToStart => {
                    let bound = pred.calendar.add_working_days(pred_ef, edge.lag + 1);
                    start_bound = Some(start_bound.map_or(bound, |b| b.max(bound)));
                }
                DependencyKind::StartToStart => {
                    let bound = pred.calendar.add_working_days(pred_es, edge.lag);
                    start_bound = Some(start_bound.map_or(bound, |b| b.max(bound)));
                }
                DependencyKind::FinishToFinish => {
                    let bound = pred.calendar.add_working_days(pred_ef, edge.lag);
                    finish_bound = Some(finish_bound.map_or(bound, |b| b.max(bound)));
                }
                DependencyKind::StartToFinish => {
                    let bound = pred.calendar.add_working_days(pred_es, edge.lag);
                    finish_bound = Some(finish_bound.map_or(bound, |b| b.max(bound)));
                }
            }
        }

        let mut es = start_bound.unwrap_or(node.start);
        let mut ef: Option<NaiveDate> = None;

        match node.constraint {
            Some(DateConstraint {
                kind: ConstraintKind::MustStartOn,
                date,
            }) => {
                if start_bound.is_some_and(|floor| date < floor) {
                    conflicted.insert(id.clone());
                    warnings.push(Warning::ConstraintConflict {
                        activity: id.clone(),
                        detail: format!(
                            "must-start-on {} precedes the dependency-driven start {}",
                            date,
                            start_bound.expect("bound present")
                        ),
                    });
                }
                es = date;
            }
            Some(DateConstraint {
                kind: ConstraintKind::MustFinishOn,
                date,
            }) => {
                let pinned_start = node.calendar.start_from_end(date, duration);
                if start_bound.is_some_and(|floor| pinned_start < floor) {
                    conflicted.insert(id.clone());
                    warnings.push(Warning::ConstraintConflict {
                        activity: id.clone(),
                        detail: format!(
                            "must-finish-on {} precedes the dependency-driven start {}",
                            date,
                            start_bound.expect("bound present")
                        ),
                    });
                }
                ef = Some(date);
                es = pinned_start;
            }
            Some(DateConstraint {
                kind: ConstraintKind::StartNoEarlierThan,
                date,
            }) => {
                es = es.max(date);
            }
            Some(DateConstraint {
                kind: ConstraintKind::FinishNoEarlierThan,
                date,
            }) => {
                let tentative = node.calendar.end_from_start(es, duration);
                if tentative < date {
                    ef = Some(date);
                    es = node.calendar.start_from_end(date, duration);
                }
            }
            _ => {}
        }

        let mut ef = ef.unwrap_or_else(|| node.calendar.end_from_start(es, duration));

        // Fold in the finish bounds last; a raised finish drags the start
        // with it so the duration is preserved.
        if let Some(bound) = finish_bound {
            if bound > ef {
                ef = bound;
                es = node.calendar.start_from_end(ef, duration);
            }
        }

        early_start.insert(id.clone(), es);
        early_finish.insert(id.clone(), ef);
    }

    let computed_finish = early_finish.values().max().copied();
    let computed_start = early_start.values().min().copied();
    let project_finish = computed_finish.unwrap_or(project_start);
    let project_start = computed_start.unwrap_or(project_start);

    // ════════════════════════════════════════════════════════════════════
    // Backward pass
    // ════════════════════════════════════════════════════════════════════

    let mut late_start: HashMap<ActivityId, NaiveDate> = HashMap::new();
    let mut late_finish: HashMap<ActivityId, NaiveDate> = HashMap::new();

    for id in order.iter().rev() {
        let node = &nodes[id];
        let duration = node.duration;
        let calendar = node.calendar;

        let successors = graph.successors(id);
        let mut lf = if successors.is_empty() {
            project_finish.max(early_finish[id])
        } else {
            let mut bound: Option<NaiveDate> = None;
            for edge in successors {
                let succ_ls = late_start[&edge.successor];
                let succ_lf = late_finish[&edge.successor];
                let candidate = match edge.kind {
                    DependencyKind::FinishToStart => {
                        calendar.add_working_days(succ_ls, -(edge.lag + 1))
                    }
                    DependencyKind::StartToStart => {
                        let ls_bound = calendar.add_working_days(succ_ls, -edge.lag);
                        calendar.end_from_start(ls_bound, duration)
                    }
                    DependencyKind::FinishToFinish => {
                        calendar.add_working_days(succ_lf, -edge.lag)
                    }
                    DependencyKind::StartToFinish => {
                        calendar.add_working_days(succ_lf, -edge.lag)
                    }
                };
                bound = Some(bound.map_or(candidate, |b| b.min(candidate)));
            }
            bound.unwrap_or(project_finish)
        };

        let ls = match node.constraint {
            Some(DateConstraint {
                kind: ConstraintKind::MustStartOn,
                date,
            }) => {
                lf = calendar.end_from_start(date, duration);
                date
            }
            Some(DateConstraint {
                kind: ConstraintKind::MustFinishOn,
                date,
            }) => {
                lf = date;
                calendar.start_from_end(lf, duration)
            }
            Some(DateConstraint {
                kind: ConstraintKind::FinishNoLaterThan,
                date,
            }) => {
                lf = lf.min(date);
                calendar.start_from_end(lf, duration)
            }
            Some(DateConstraint {
                kind: ConstraintKind::StartNoLaterThan,
                date,
            }) => {
                let mut ls = calendar.start_from_end(lf, duration);
                if date < ls {
                    ls = date;
                    lf = calendar.end_from_start(ls, duration);
                }
                ls
            }
            _ => calendar.start_from_end(lf, duration),
        };

        late_start.insert(id.clone(), ls);
        late_finish.insert(id.clone(), lf);
    }

    // ════════════════════════════════════════════════════════════════════
    // Slack, critical path, write-back
    // ════════════════════════════════════════════════════════════════════

    let mut critical_path = Vec::new();
    for id in &order {
        let node = &nodes[id];
        let es = early_start[id];
        let ls = late_start[id];
        let slack = node.calendar.working_day_offset(es, ls);

        // Free slack: room before the earliest successor start
        let free_slack = {
            let succ_starts: Vec<i64> = graph
                .successors(id)
                .iter()
                .map(|e| {
                    node.calendar
                        .working_day_offset(early_finish[id], early_start[&e.successor])
                        - 1
                })
                .collect();
            succ_starts.into_iter().min().map_or(slack, |s| s.max(0))
        };

        let is_critical = slack <= 0 || conflicted.contains(id);
        if is_critical {
            critical_path.push(id.clone());
        }

        let activity = activities.get_mut(id).expect("scheduled activity exists");
        activity.early_start = Some(es);
        activity.early_finish = Some(early_finish[id]);
        activity.late_start = Some(ls);
        activity.late_finish = Some(late_finish[id]);
        activity.total_slack = Some(slack);
        activity.free_slack = Some(free_slack);
        activity.is_critical = is_critical;
        activity.start = es;
        activity.end = early_finish[id];
    }

    roll_up_summaries(activities, calendars, default_calendar);

    debug!(
        activities = order.len(),
        critical = critical_path.len(),
        finish = %project_finish,
        "CPM passes complete"
    );

    Ok(CpmOutcome {
        critical_path,
        project_start,
        project_finish,
        warnings,
    })
}

/// Derive summary spans from their children, deepest summaries first.
fn roll_up_summaries(
    activities: &mut ActivityMap,
    calendars: &CalendarMap,
    default_calendar: &CalendarId,
) {
    let mut summary_depth: Vec<(ActivityId, usize)> = activities
        .values()
        .filter(|a| a.is_summary())
        .map(|a| (a.id.clone(), depth_of(a, activities)))
        .collect();
    summary_depth.sort_by(|a, b| b.1.cmp(&a.1));

    let fallback = Calendar::default();
    for (summary_id, _) in summary_depth {
        let mut span: Option<(NaiveDate, NaiveDate)> = None;
        let mut early: Option<(NaiveDate, NaiveDate)> = None;
        let mut late: Option<(NaiveDate, NaiveDate)> = None;

        for child in activities.values() {
            if child.parent.as_deref() != Some(summary_id.as_str()) {
                continue;
            }
            span = merge_span(span, Some((child.start, child.end)));
            early = merge_span(early, child.early_start.zip(child.early_finish));
            late = merge_span(late, child.late_start.zip(child.late_finish));
        }

        let Some(summary) = activities.get_mut(&summary_id) else {
            continue;
        };
        if let Some((start, end)) = span {
            summary.start = start;
            summary.end = end;
        }
        summary.early_start = early.map(|(s, _)| s);
        summary.early_finish = early.map(|(_, f)| f);
        summary.late_start = late.map(|(s, _)| s);
        summary.late_finish = late.map(|(_, f)| f);

        let summary = activities.get(&summary_id).expect("summary exists");
        let calendar = calendar_for(summary, calendars, default_calendar).unwrap_or(&fallback);
        let slack = summary
            .early_start
            .zip(summary.late_start)
            .map(|(es, ls)| calendar.working_day_offset(es, ls));
        let critical = slack.is_some_and(|s| s <= 0);
        let summary = activities.get_mut(&summary_id).expect("summary exists");
        summary.total_slack = slack;
        summary.free_slack = slack;
        summary.is_critical = critical;
    }
}

fn merge_span(
    acc: Option<(NaiveDate, NaiveDate)>,
    next: Option<(NaiveDate, NaiveDate)>,
) -> Option<(NaiveDate, NaiveDate)> {
    match (acc, next) {
        (Some((s1, e1)), Some((s2, e2))) => Some((s1.min(s2), e1.max(e2))),
        (None, next) => next,
        (acc, None) => acc,
    }
}

fn depth_of(activity: &Activity, activities: &ActivityMap) -> usize {
    let mut depth = 0;
    let mut current = activity.parent.as_deref();
    while let Some(parent) = current {
        depth += 1;
        current = activities.get(parent).and_then(|a| a.parent.as_deref());
        if depth > activities.len() {
            break; // broken parent chain, bail out
        }
    }
    depth
}

// ============================================================================
// Tests
// ============================================================================
