//! Outlier-preserving reduction of the piece-weight scatter stream.
//!
//! The scatter query has unbounded cardinality; the chart layer can only
//! usefully draw a few hundred points. Plain stride sampling would swallow
//! exactly the pieces an operator cares about (the over/underweight ones),
//! so a fifth of the budget is reserved for the weight extremes.

use crate::kpi::ScatterPoint;

/// Fraction of the budget reserved for weight extremes.
const OUTLIER_SHARE: f64 = 0.2;

pub fn downsample(points: &[ScatterPoint], max_points: usize) -> Vec<ScatterPoint> {
    if points.len() <= max_points {
        let mut out = points.to_vec();
        out.sort_by_key(|p| p.ts_ms);
        return out;
    }
    if max_points == 0 {
        return Vec::new();
    }

    let mut by_weight = points.to_vec();
    by_weight.sort_by(|a, b| a.weight_g.total_cmp(&b.weight_g));

    let outlier_count = ((max_points as f64 * OUTLIER_SHARE) as usize).min(by_weight.len());
    let low_count = outlier_count / 2;
    let high_count = outlier_count - low_count;

    let mut out: Vec<ScatterPoint> = Vec::with_capacity(max_points);
    out.extend_from_slice(&by_weight[..low_count]);
    out.extend_from_slice(&by_weight[by_weight.len() - high_count..]);

    // The middle population never overlaps the outlier slices.
    let middle = &by_weight[low_count..by_weight.len() - high_count];
    let target = max_points - outlier_count;
    if target > 0 && !middle.is_empty() {
        let stride = (middle.len() / target).max(1);
        for (i, p) in middle.iter().enumerate() {
            if i % stride == 0 && out.len() < max_points {
                out.push(*p);
            }
        }
    }

    out.sort_by_key(|p| p.ts_ms);
    out
}
