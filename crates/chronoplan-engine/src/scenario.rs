//! What-if scenarios.
//!
//! A scenario owns a deep copy of the schedulable state: activities,
//! dependencies, resources and the project span. Activation swaps the
//! scenario contents into the working state after parking the live data;
//! deactivation writes the working state back into the scenario (so edits
//! persist) and restores the parked live data. Only the `ProjectState`
//! knows which scenario is active; scenarios never point back at it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use chronoplan_core::{ActivityMap, Dependency, ResourceMap, ScenarioId};

/// Deep copy of the schedulable state, used both for scenario contents and
/// for the parked live data while a scenario is active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub activities: ActivityMap,
    pub dependencies: Vec<Dependency>,
    pub resources: ResourceMap,
    pub project_start: NaiveDate,
    pub project_end: NaiveDate,
}

/// A named what-if branch of the plan
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique identifier
    pub id: ScenarioId,
    /// Display name
    pub name: String,
    /// Human-readable description
    pub description: Option<String>,
    /// UTC timestamp of creation
    pub created: DateTime<Utc>,
    /// Scenario contents; mutable only while the scenario is active
    pub data: PlanSnapshot,
}

impl Scenario {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        data: PlanSnapshot,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description,
            created: Utc::now(),
            data,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
