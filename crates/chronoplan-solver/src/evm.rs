//! Earned-value metrics.
//!
//! Planned value is prorated over the activity's baseline window (falling
//! back to the current schedule when no baseline was applied) using plain
//! calendar-day fractions. Actual cost is approximated as
//! `cost * progress / 100` in the absence of true actuals; earned value is
//! `BAC * progress / 100`. All currency figures are `Decimal`.

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use chronoplan_core::{Activity, ActivityMap};

/// Earned-value figures for one activity or a whole project
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvmMetrics {
    /// Budget at completion
    pub bac: Decimal,
    /// Planned value at the status date
    pub pv: Decimal,
    /// Earned value
    pub ev: Decimal,
    /// Actual cost (approximated from progress)
    pub ac: Decimal,
    /// Schedule variance (EV - PV)
    pub sv: Decimal,
    /// Cost variance (EV - AC)
    pub cv: Decimal,
    /// Schedule performance index (1 when PV is zero)
    pub spi: Decimal,
    /// Cost performance index (1 when AC is zero)
    pub cpi: Decimal,
    /// Estimate at completion
    pub eac: Decimal,
    /// Variance at completion (BAC - EAC)
    pub vac: Decimal,
}

impl EvmMetrics {
    fn from_totals(bac: Decimal, pv: Decimal, ev: Decimal, ac: Decimal) -> Self {
        let spi = if pv.is_zero() { Decimal::ONE } else { ev / pv };
        let cpi = if ac.is_zero() { Decimal::ONE } else { ev / ac };
        let eac = if cpi.is_zero() { bac } else { bac / cpi };
        Self {
            bac,
            pv,
            ev,
            ac,
            sv: ev - pv,
            cv: ev - ac,
            spi,
            cpi,
            eac,
            vac: bac - eac,
        }
    }
}

/// Earned value for a single activity at the given status date.
pub fn activity_evm(activity: &Activity, status_date: NaiveDate) -> EvmMetrics {
    let bac = activity
        .budgeted_cost
        .or(activity.cost)
        .unwrap_or(Decimal::ZERO);

    let window_start = activity
        .baseline
        .as_ref()
        .map_or(activity.start, |b| b.start);
    let window_end = activity.baseline.as_ref().map_or(activity.end, |b| b.end);

    let progress = Decimal::from_f32(activity.effective_progress())
        .unwrap_or_default()
        / Decimal::from(100);

    let pv = bac * planned_fraction(window_start, window_end, status_date);
    let ev = bac * progress;
    let ac = activity.cost.unwrap_or(Decimal::ZERO) * progress;

    EvmMetrics::from_totals(bac, pv, ev, ac)
}

/// Project earned value: PV/EV/AC/BAC summed over the schedulable
/// activities, ratios recomputed from the totals.
pub fn project_evm(activities: &ActivityMap, status_date: NaiveDate) -> EvmMetrics {
    let mut bac = Decimal::ZERO;
    let mut pv = Decimal::ZERO;
    let mut ev = Decimal::ZERO;
    let mut ac = Decimal::ZERO;

    for activity in activities.values() {
        if activity.is_summary() {
            continue; // summaries would double-count their children
        }
        let metrics = activity_evm(activity, status_date);
        bac += metrics.bac;
        pv += metrics.pv;
        ev += metrics.ev;
        ac += metrics.ac;
    }

    EvmMetrics::from_totals(bac, pv, ev, ac)
}

/// Fraction of the planning window elapsed at the status date, in plain
/// calendar days, clamped to [0, 1].
fn planned_fraction(start: NaiveDate, end: NaiveDate, status_date: NaiveDate) -> Decimal {
    if status_date < start {
        return Decimal::ZERO;
    }
    if status_date > end {
        return Decimal::ONE;
    }
    let elapsed = (status_date - start).num_days() + 1;
    let total = (end - start).num_days() + 1;
    let fraction = Decimal::from(elapsed) / Decimal::from(total);
    fraction.clamp(Decimal::ZERO, Decimal::ONE)
}

// ============================================================================
// Tests
// ============================================================================
