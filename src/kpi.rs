//! Interface to the external KPI service.
//!
//! The backend owns the relational schema and the aggregation queries; this
//! module only defines the row shapes the engine consumes and the query
//! surface it needs. `HttpKpiService` is the production implementation; the
//! trait seam exists so the engine loop can be driven by a mock in tests.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Gate 0 is the reject chute; it never carries a recipe assignment.
pub const REJECT_GATE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Filled batch equivalents per minute.
    BatchesMin,
    GiveawayPct,
    PiecesProcessed,
    WeightProcessed,
    RejectsMin,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::BatchesMin,
        MetricKind::GiveawayPct,
        MetricKind::PiecesProcessed,
        MetricKind::WeightProcessed,
        MetricKind::RejectsMin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::BatchesMin => "batches_min",
            MetricKind::GiveawayPct => "giveaway_pct",
            MetricKind::PiecesProcessed => "pieces_processed",
            MetricKind::WeightProcessed => "weight_processed_g",
            MetricKind::RejectsMin => "rejects_per_min",
        }
    }

    /// Grams-denominated metrics are converted to kilograms by the
    /// normalizer before they reach the chart layer.
    pub fn is_grams(&self) -> bool {
        matches!(self, MetricKind::WeightProcessed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateAssignment {
    pub gate: u32,
    pub recipe: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub ts_ms: i64,
    pub weight_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieSlice {
    pub recipe: String,
    pub batch_count: f64,
    pub giveaway_g: f64,
    pub giveaway_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateOverlay {
    pub gate: u32,
    pub pieces: u64,
    pub grams: f64,
}

/// One metric's raw rows for a window: per-recipe bucketed values plus the
/// backend's cross-recipe total stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricTable {
    #[serde(default)]
    pub per_entity: HashMap<String, Vec<(i64, f64)>>,
    #[serde(default)]
    pub total: Vec<(i64, f64)>,
}

pub type MetricRows = HashMap<MetricKind, MetricTable>;

#[async_trait]
pub trait KpiService: Send + Sync {
    /// First and last timestamp of the replay dataset, epoch ms.
    async fn dataset_bounds(&self) -> Result<(i64, i64)>;

    /// Gate → recipe assignments in force at `ts_ms`.
    async fn assignments_at(&self, ts_ms: i64) -> Result<Vec<GateAssignment>>;

    async fn windowed_metrics(&self, from_ms: i64, to_ms: i64, bucket_ms: i64)
        -> Result<MetricRows>;

    async fn scatter_weights(&self, from_ms: i64, to_ms: i64) -> Result<Vec<ScatterPoint>>;

    async fn pie_breakdown(&self, from_ms: i64, to_ms: i64) -> Result<Vec<PieSlice>>;

    async fn gate_overlay(&self, at_ms: i64, lookback_secs: i64) -> Result<Vec<GateOverlay>>;
}

/// REST client against the dashboard backend.
pub struct HttpKpiService {
    client: reqwest::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct BoundsResp {
    start_ms: i64,
    end_ms: i64,
}

impl HttpKpiService {
    pub fn new(base: String) -> Self {
        Self { client: reqwest::Client::new(), base }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path_and_query);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("kpi backend {}: {} {}", url, status, body));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl KpiService for HttpKpiService {
    async fn dataset_bounds(&self) -> Result<(i64, i64)> {
        let b: BoundsResp = self.get_json("/api/kpi/bounds").await?;
        if b.end_ms < b.start_ms {
            return Err(anyhow!("backend returned inverted bounds"));
        }
        Ok((b.start_ms, b.end_ms))
    }

    async fn assignments_at(&self, ts_ms: i64) -> Result<Vec<GateAssignment>> {
        self.get_json(&format!("/api/kpi/assignments?at={}", ts_ms)).await
    }

    async fn windowed_metrics(
        &self,
        from_ms: i64,
        to_ms: i64,
        bucket_ms: i64,
    ) -> Result<MetricRows> {
        let metrics = MetricKind::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let raw: HashMap<String, MetricTable> = self
            .get_json(&format!(
                "/api/kpi/minute?metrics={}&from={}&to={}&bucket={}",
                metrics, from_ms, to_ms, bucket_ms
            ))
            .await?;
        let mut rows = MetricRows::new();
        for kind in MetricKind::ALL {
            if let Some(table) = raw.get(kind.as_str()) {
                rows.insert(kind, table.clone());
            }
        }
        Ok(rows)
    }

    async fn scatter_weights(&self, from_ms: i64, to_ms: i64) -> Result<Vec<ScatterPoint>> {
        self.get_json(&format!("/api/kpi/scatter?from={}&to={}", from_ms, to_ms)).await
    }

    async fn pie_breakdown(&self, from_ms: i64, to_ms: i64) -> Result<Vec<PieSlice>> {
        self.get_json(&format!("/api/kpi/pie?from={}&to={}", from_ms, to_ms)).await
    }

    async fn gate_overlay(&self, at_ms: i64, lookback_secs: i64) -> Result<Vec<GateOverlay>> {
        self.get_json(&format!("/api/kpi/gates?at={}&lookback={}", at_ms, lookback_secs)).await
    }
}

/// Active recipes in gate order, deduplicated, reject gate excluded. This is
/// the authoritative active-entity set for coloring and normalization.
pub fn active_recipes(assignment: &[GateAssignment]) -> Vec<String> {
    let mut sorted: Vec<&GateAssignment> = assignment
        .iter()
        .filter(|a| a.gate != REJECT_GATE && !a.recipe.is_empty())
        .collect();
    sorted.sort_by_key(|a| a.gate);
    let mut out: Vec<String> = Vec::new();
    for a in sorted {
        if !out.iter().any(|r| r == &a.recipe) {
            out.push(a.recipe.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_recipes_gate_order_dedup() {
        let assignment = vec![
            GateAssignment { gate: 3, recipe: "R_b".into() },
            GateAssignment { gate: 1, recipe: "R_a".into() },
            GateAssignment { gate: 2, recipe: "R_a".into() },
            GateAssignment { gate: 0, recipe: "reject".into() },
            GateAssignment { gate: 4, recipe: "".into() },
        ];
        assert_eq!(active_recipes(&assignment), vec!["R_a".to_string(), "R_b".to_string()]);
    }

    #[test]
    fn test_metric_names_match_backend_rows() {
        assert_eq!(MetricKind::BatchesMin.as_str(), "batches_min");
        assert_eq!(MetricKind::WeightProcessed.as_str(), "weight_processed_g");
        assert!(MetricKind::WeightProcessed.is_grams());
        assert!(!MetricKind::GiveawayPct.is_grams());
    }
}
