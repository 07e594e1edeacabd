//! Reshapes raw KPI rows into uniform, time-aligned chart series.
//!
//! The gate assignment is the authoritative active-entity set: recipes the
//! backend returned rows for but which are no longer assigned are dropped,
//! and assigned recipes with no rows yet (data lag) are synthesized as
//! all-zero series. Every series has exactly one value per timeline bucket.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::kpi::{GateAssignment, MetricKind, MetricRows, PieSlice};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySeries {
    pub recipe: String,
    /// One value per timeline bucket, zero-filled.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub entities: Vec<EntitySeries>,
    /// Cross-recipe total; omitted when no recipe is active.
    pub total: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Normalized {
    /// Shared bucket timestamps, ascending, deduplicated.
    pub timeline: Vec<i64>,
    pub series: HashMap<MetricKind, MetricSeries>,
    pub pie: Vec<PieSlice>,
}

pub fn normalize(
    rows: &MetricRows,
    assignment: &[GateAssignment],
    pie_rows: &[PieSlice],
) -> Normalized {
    let active = crate::kpi::active_recipes(assignment);
    let timeline = build_timeline(rows);

    let mut series = HashMap::new();
    for kind in MetricKind::ALL {
        let table = rows.get(&kind);
        let scale = if kind.is_grams() { 0.001 } else { 1.0 };

        let entities = active
            .iter()
            .map(|recipe| EntitySeries {
                recipe: recipe.clone(),
                values: fill(
                    &timeline,
                    table.and_then(|t| t.per_entity.get(recipe)).map(|v| v.as_slice()),
                    scale,
                ),
            })
            .collect();

        let total = if active.is_empty() {
            None
        } else {
            Some(fill(&timeline, table.map(|t| t.total.as_slice()), scale))
        };

        series.insert(kind, MetricSeries { entities, total });
    }

    let pie = pie_rows
        .iter()
        .filter(|slice| active.iter().any(|r| r == &slice.recipe))
        .cloned()
        .collect();

    Normalized { timeline, series, pie }
}

/// Union of the total-stream timestamps across metrics. The backend emits
/// combined rows on one clock, so in practice every metric contributes the
/// same set; the union keeps a lagging metric from truncating the axis.
fn build_timeline(rows: &MetricRows) -> Vec<i64> {
    let mut ts: BTreeSet<i64> = BTreeSet::new();
    for table in rows.values() {
        ts.extend(table.total.iter().map(|(t, _)| *t));
    }
    ts.into_iter().collect()
}

/// Align raw points onto the timeline; missing buckets become zero, never a
/// gap, so series length always equals timeline length.
fn fill(timeline: &[i64], raw: Option<&[(i64, f64)]>, scale: f64) -> Vec<f64> {
    let by_ts: HashMap<i64, f64> = raw
        .map(|points| points.iter().map(|(t, v)| (*t, *v)).collect())
        .unwrap_or_default();
    timeline.iter().map(|t| by_ts.get(t).copied().unwrap_or(0.0) * scale).collect()
}
