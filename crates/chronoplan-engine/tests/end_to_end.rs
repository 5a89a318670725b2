//! Full-facade walkthroughs: schedule, constrain, level, branch.

use chrono::NaiveDate;
use chronoplan_core::{Activity, ConstraintKind, DependencyKind, Priority, Resource};
use chronoplan_engine::{ActivityPatch, ProjectState};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn weekend_skip() {
    let friday = date(2024, 1, 5);
    let mut project = ProjectState::new("Weekend", friday);
    project
        .add_activity(Activity::new("a").schedule(friday, friday).duration(2))
        .unwrap();

    project.recalculate_dates().unwrap();
    assert_eq!(project.activity("a").unwrap().end, date(2024, 1, 8));
}

#[test]
fn fs_chain() {
    let monday = date(2024, 1, 1);
    let mut project = ProjectState::new("Chain", monday);
    project
        .add_activity(Activity::new("a").schedule(monday, monday).duration(2))
        .unwrap();
    project
        .add_activity(Activity::new("b").schedule(monday, monday).duration(2))
        .unwrap();
    project
        .add_dependency("a", "b", DependencyKind::FinishToStart, 0)
        .unwrap();

    project.recalculate_dates().unwrap();

    assert_eq!(
        project.activity("a").unwrap().early_finish,
        Some(date(2024, 1, 2))
    );
    assert_eq!(
        project.activity("b").unwrap().early_start,
        Some(date(2024, 1, 3))
    );
    assert_eq!(
        project.activity("b").unwrap().early_finish,
        Some(date(2024, 1, 4))
    );
}

#[test]
fn critical_path_selection() {
    let monday = date(2024, 1, 1);
    let mut project = ProjectState::new("Critical", monday);
    project
        .add_activity(Activity::new("t1").schedule(monday, monday).duration(2))
        .unwrap();
    project
        .add_activity(Activity::new("t2").schedule(monday, monday).duration(2))
        .unwrap();
    project
        .add_activity(Activity::new("t3").schedule(monday, monday).duration(1))
        .unwrap();
    project
        .add_dependency("t1", "t2", DependencyKind::FinishToStart, 0)
        .unwrap();
    project
        .add_dependency("t3", "t2", DependencyKind::FinishToStart, 0)
        .unwrap();

    let report = project.recalculate_dates().unwrap();
    assert!(report.critical_path.contains(&"t1".to_string()));
    assert!(report.critical_path.contains(&"t2".to_string()));
    assert!(!report.critical_path.contains(&"t3".to_string()));
    assert_eq!(project.critical_path, report.critical_path);
}

#[test]
fn must_start_on_overrides_early_predecessors() {
    let mut project = ProjectState::new("Pinned", date(2023, 1, 1));
    project
        .add_activity(
            Activity::new("a")
                .schedule(date(2023, 1, 1), date(2023, 1, 1))
                .duration(2)
                .constraint(ConstraintKind::MustStartOn, date(2023, 1, 10)),
        )
        .unwrap();

    project.recalculate_dates().unwrap();
    assert_eq!(
        project.activity("a").unwrap().early_start,
        Some(date(2023, 1, 10))
    );
}

#[test]
fn leveling_defers_the_lower_priority() {
    let monday = date(2024, 1, 1);
    let friday = date(2024, 1, 5);
    let mut project = ProjectState::new("Leveling", monday);
    project.add_resource(Resource::new("r")).unwrap();
    project
        .add_activity(
            Activity::new("important")
                .schedule(monday, friday)
                .duration(5)
                .priority(Priority::High)
                .assign("r", 100.0),
        )
        .unwrap();
    project
        .add_activity(
            Activity::new("routine")
                .schedule(monday, friday)
                .duration(5)
                .priority(Priority::Medium)
                .assign("r", 100.0),
        )
        .unwrap();

    // Recalculation reports the over-allocation without fixing it
    let report = project.recalculate_dates().unwrap();
    assert!(!report.warnings.is_empty());

    let outcome = project.level_resources();
    assert_eq!(outcome.changes.len(), 1);
    assert_eq!(project.activity("important").unwrap().start, monday);
    assert_eq!(project.activity("routine").unwrap().start, date(2024, 1, 8));
    assert_eq!(project.activity("routine").unwrap().end, date(2024, 1, 12));

    // Leveled plan is clean on the next recalculation
    let report = project.recalculate_dates().unwrap();
    assert!(report.warnings.is_empty());
}

#[test]
fn scenario_roundtrip_keeps_live_state() {
    let monday = date(2024, 1, 1);
    let mut project = ProjectState::new("Branching", monday);
    project
        .add_activity(Activity::new("x").schedule(monday, date(2024, 1, 5)))
        .unwrap();

    let scenario = project.create_scenario("crash", None).unwrap();
    project.activate_scenario(&scenario).unwrap();
    project
        .update_activity(
            "x",
            ActivityPatch {
                start: Some(date(2024, 2, 1)),
                end: Some(date(2024, 2, 5)),
                ..Default::default()
            },
        )
        .unwrap();
    project.deactivate_scenario().unwrap();

    // Live task x is untouched
    assert_eq!(project.activity("x").unwrap().start, monday);
    // The scenario recorded the edit
    let stored = project.scenarios().next().unwrap();
    assert_eq!(stored.data.activities["x"].start, date(2024, 2, 1));
}
