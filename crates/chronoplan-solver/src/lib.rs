//! # chronoplan-solver
//!
//! Scheduling computations for chronoplan:
//!
//! - [`graph`]: dependency adjacency, cycle detection, topological order
//! - [`cpm`]: forward/backward Critical Path Method passes over calendars
//! - [`leveling`]: greedy priority-ordered resource leveling
//! - [`evm`]: earned-value metrics (PV/EV/AC and derived indices)
//!
//! The solver reads and writes the plain domain types from
//! `chronoplan-core`; the engine crate owns the state and calls in here.
//!
//! ## Example
//!
//! ```rust
//! use chronoplan_core::{Activity, ActivityMap, Calendar, CalendarMap, Dependency};
//! use chronoplan_solver::cpm;
//! use chrono::NaiveDate;
//!
//! let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let mut activities = ActivityMap::new();
//! activities.insert(
//!     "a".into(),
//!     Activity::new("a").schedule(monday, monday).duration(2),
//! );
//! activities.insert(
//!     "b".into(),
//!     Activity::new("b").schedule(monday, monday).duration(2),
//! );
//! let dependencies = vec![Dependency::new("d1", "a", "b")];
//!
//! let mut calendars = CalendarMap::new();
//! calendars.insert("standard".into(), Calendar::default());
//!
//! let outcome = cpm::recalculate(
//!     &mut activities,
//!     &dependencies,
//!     &calendars,
//!     &"standard".to_string(),
//!     monday,
//! )
//! .unwrap();
//! assert_eq!(outcome.critical_path, vec!["a".to_string(), "b".to_string()]);
//! ```

pub mod cpm;
pub mod evm;
pub mod graph;
pub mod leveling;

pub use cpm::{recalculate, CpmOutcome};
pub use evm::{activity_evm, project_evm, EvmMetrics};
pub use graph::{DependencyGraph, GraphEdge};
pub use leveling::{level_resources, LevelingChange, LevelingOutcome, LEVELING_HORIZON_DAYS};
