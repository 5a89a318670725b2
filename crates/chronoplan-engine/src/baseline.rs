//! Baseline snapshots and variance against them.
//!
//! A baseline freezes, for every activity, the scheduled dates, duration,
//! work, cost and progress at the moment of capture, plus the project span
//! and total cost. Baselines are immutable once saved: they can only be
//! deleted and recreated. Variance compares the current plan against a
//! baseline in whole days, classifying each activity as ahead, delayed or
//! on schedule, with added/removed bookkeeping for plan churn.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use chronoplan_core::{ActivityId, ActivityMap, BaselineFields, BaselineId};

/// Per-activity values frozen at capture time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub id: ActivityId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub duration: Option<i64>,
    pub work: Option<f64>,
    pub cost: Option<Decimal>,
    pub progress: f32,
}

impl BaselineSnapshot {
    /// Mirror fields written onto an activity by `apply_baseline`
    pub fn as_fields(&self) -> BaselineFields {
        BaselineFields {
            start: self.start,
            end: self.end,
            duration: self.duration,
            work: self.work,
            cost: self.cost,
            progress: self.progress,
        }
    }
}

/// A named, immutable snapshot of the plan
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Unique baseline identifier
    pub id: BaselineId,
    /// Display name
    pub name: String,
    /// Human-readable description
    pub description: Option<String>,
    /// UTC timestamp of the capture
    pub saved: DateTime<Utc>,
    /// At most one baseline carries the default flag
    pub is_default: bool,
    /// Activity snapshots, sorted by activity id
    pub tasks: BTreeMap<ActivityId, BaselineSnapshot>,
    /// Project start at capture
    pub project_start: NaiveDate,
    /// Project finish at capture
    pub project_finish: NaiveDate,
    /// Sum of activity costs at capture
    pub total_cost: Decimal,
}

impl Baseline {
    /// Capture the current plan under the given name.
    pub fn capture(
        id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        activities: &ActivityMap,
        project_start: NaiveDate,
        project_finish: NaiveDate,
    ) -> Self {
        let mut tasks = BTreeMap::new();
        let mut total_cost = Decimal::ZERO;
        for activity in activities.values() {
            total_cost += activity.cost.unwrap_or(Decimal::ZERO);
            tasks.insert(
                activity.id.clone(),
                BaselineSnapshot {
                    id: activity.id.clone(),
                    start: activity.start,
                    end: activity.end,
                    duration: activity.duration,
                    work: activity.work_hours,
                    cost: activity.cost,
                    progress: activity.progress,
                },
            );
        }
        Self {
            id: id.into(),
            name: name.into(),
            description,
            saved: Utc::now(),
            is_default: false,
            tasks,
            project_start,
            project_finish,
            total_cost,
        }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Classification of an activity against the baseline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VarianceStatus {
    /// Finish matches the baseline
    OnSchedule,
    /// Finish is later than baselined
    Delayed,
    /// Finish is earlier than baselined
    Ahead,
    /// Activity did not exist at capture
    Added,
    /// Activity existed at capture but is gone
    Removed,
}

impl std::fmt::Display for VarianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            VarianceStatus::OnSchedule => "on schedule",
            VarianceStatus::Delayed => "delayed",
            VarianceStatus::Ahead => "ahead",
            VarianceStatus::Added => "added",
            VarianceStatus::Removed => "removed",
        };
        write!(f, "{}", tag)
    }
}

/// Variance of one activity against a baseline, in whole days
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityVariance {
    pub activity: ActivityId,
    pub baseline_start: Option<NaiveDate>,
    pub baseline_finish: Option<NaiveDate>,
    pub current_start: Option<NaiveDate>,
    pub current_finish: Option<NaiveDate>,
    /// Current minus baselined start, calendar days
    pub start_variance_days: Option<i64>,
    /// Current minus baselined finish, calendar days
    pub finish_variance_days: Option<i64>,
    /// Current minus baselined duration, working days
    pub duration_variance_days: Option<i64>,
    /// Current minus baselined cost
    pub cost_variance: Option<Decimal>,
    /// Current minus baselined progress, percent points
    pub progress_variance: Option<f32>,
    pub status: VarianceStatus,
}

/// Aggregated variance counts and project-level deltas
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarianceSummary {
    pub compared: usize,
    pub on_schedule: usize,
    pub delayed: usize,
    pub ahead: usize,
    pub added: usize,
    pub removed: usize,
    pub baseline_project_finish: NaiveDate,
    pub current_project_finish: NaiveDate,
    /// Project start slip in calendar days
    pub project_start_variance_days: i64,
    /// Project finish slip in calendar days
    pub project_finish_variance_days: i64,
    /// Current total cost minus baselined total cost
    pub total_cost_variance: Decimal,
}

/// Result of comparing the current plan against a baseline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarianceReport {
    pub baseline_id: BaselineId,
    pub baseline_name: String,
    pub baseline_saved: DateTime<Utc>,
    pub tasks: Vec<ActivityVariance>,
    pub summary: VarianceSummary,
}

/// Compare the current activities against a baseline. Activities are
/// matched by id; the output is sorted by activity id for deterministic
/// reporting.
pub fn compare_to_baseline(
    baseline: &Baseline,
    activities: &ActivityMap,
    project_start: NaiveDate,
    project_finish: NaiveDate,
) -> VarianceReport {
    let mut variances = Vec::new();

    for activity in activities.values() {
        match baseline.tasks.get(&activity.id) {
            Some(snapshot) => {
                let finish_delta = (activity.end - snapshot.end).num_days();
                let status = match finish_delta.cmp(&0) {
                    std::cmp::Ordering::Greater => VarianceStatus::Delayed,
                    std::cmp::Ordering::Less => VarianceStatus::Ahead,
                    std::cmp::Ordering::Equal => VarianceStatus::OnSchedule,
                };
                variances.push(ActivityVariance {
                    activity: activity.id.clone(),
                    baseline_start: Some(snapshot.start),
                    baseline_finish: Some(snapshot.end),
                    current_start: Some(activity.start),
                    current_finish: Some(activity.end),
                    start_variance_days: Some((activity.start - snapshot.start).num_days()),
                    finish_variance_days: Some(finish_delta),
                    duration_variance_days: activity
                        .duration
                        .zip(snapshot.duration)
                        .map(|(current, baselined)| current - baselined),
                    cost_variance: match (activity.cost, snapshot.cost) {
                        (None, None) => None,
                        (current, baselined) => Some(
                            current.unwrap_or(Decimal::ZERO) - baselined.unwrap_or(Decimal::ZERO),
                        ),
                    },
                    progress_variance: Some(activity.progress - snapshot.progress),
                    status,
                });
            }
            None => {
                variances.push(ActivityVariance {
                    activity: activity.id.clone(),
                    baseline_start: None,
                    baseline_finish: None,
                    current_start: Some(activity.start),
                    current_finish: Some(activity.end),
                    start_variance_days: None,
                    finish_variance_days: None,
                    duration_variance_days: None,
                    cost_variance: None,
                    progress_variance: None,
                    status: VarianceStatus::Added,
                });
            }
        }
    }

    for (id, snapshot) in &baseline.tasks {
        if !activities.contains_key(id) {
            variances.push(ActivityVariance {
                activity: id.clone(),
                baseline_start: Some(snapshot.start),
                baseline_finish: Some(snapshot.end),
                current_start: None,
                current_finish: None,
                start_variance_days: None,
                finish_variance_days: None,
                duration_variance_days: None,
                cost_variance: None,
                progress_variance: None,
                status: VarianceStatus::Removed,
            });
        }
    }

    variances.sort_by(|a, b| a.activity.cmp(&b.activity));

    let current_total_cost: Decimal = activities
        .values()
        .map(|a| a.cost.unwrap_or(Decimal::ZERO))
        .sum();

    let mut summary = VarianceSummary {
        compared: 0,
        on_schedule: 0,
        delayed: 0,
        ahead: 0,
        added: 0,
        removed: 0,
        baseline_project_finish: baseline.project_finish,
        current_project_finish: project_finish,
        project_start_variance_days: (project_start - baseline.project_start).num_days(),
        project_finish_variance_days: (project_finish - baseline.project_finish).num_days(),
        total_cost_variance: current_total_cost - baseline.total_cost,
    };
    for variance in &variances {
        match variance.status {
            VarianceStatus::OnSchedule => {
                summary.compared += 1;
                summary.on_schedule += 1;
            }
            VarianceStatus::Delayed => {
                summary.compared += 1;
                summary.delayed += 1;
            }
            VarianceStatus::Ahead => {
                summary.compared += 1;
                summary.ahead += 1;
            }
            VarianceStatus::Added => summary.added += 1,
            VarianceStatus::Removed => summary.removed += 1,
        }
    }

    VarianceReport {
        baseline_id: baseline.id.clone(),
        baseline_name: baseline.name.clone(),
        baseline_saved: baseline.saved,
        tasks: variances,
        summary,
    }
}

// ============================================================================
// Tests
// ============================================================================
