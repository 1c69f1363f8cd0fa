//! Per-point summaries of a finished result, for quick inspection.
//!
//! Measurement itself never computes these; the raw samples stay the
//! source of truth.

use serde::Serialize;
use serde_json::Value;

use crate::schema::MeasurementResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    /// `None` for an empty sample set.
    pub fn of(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            mean: fsum(samples) / samples.len() as f64,
            min,
            max,
        })
    }
}

/// Neumaier-compensated sum.
fn fsum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut c = 0.0;
    for &v in values {
        let t = sum + v;
        if f64::abs(sum) >= f64::abs(v) {
            c += (sum - t) + v;
        } else {
            c += (v - t) + sum;
        }
        sum = t;
    }
    sum + c
}

#[derive(Debug, Clone, Serialize)]
pub struct PointSummary {
    pub index: usize,
    pub input: Value,
    pub base: Option<Summary>,
    pub total: Option<Summary>,
    /// Mean of total minus mean of base: the marginal cost of the flagged path.
    pub delta_mean: Option<f64>,
}

pub fn summarize(result: &MeasurementResult) -> Vec<PointSummary> {
    result
        .data
        .iter()
        .map(|p| {
            let base = Summary::of(&p.base_times);
            let total = Summary::of(&p.total_times);
            let delta_mean = match (base, total) {
                (Some(b), Some(t)) => Some(t.mean - b.mean),
                _ => None,
            };
            PointSummary {
                index: p.index,
                input: p.input.clone(),
                base,
                total,
                delta_mean,
            }
        })
        .collect()
}

/// Fixed-width text table, one row per point.
pub fn render_table(result: &MeasurementResult) -> String {
    fn cell(s: Option<Summary>) -> String {
        match s {
            Some(s) => format!("{:>9.4} {:>9.4} {:>9.4}", s.mean, s.min, s.max),
            None => format!("{:>9} {:>9} {:>9}", "-", "-", "-"),
        }
    }

    let mut out = format!("{}\n", result.target);
    out.push_str(&format!(
        "{:>5} {:>12} | {:>9} {:>9} {:>9} | {:>9} {:>9} {:>9} | {:>9}\n",
        "idx", "input", "base", "min", "max", "total", "min", "max", "delta"
    ));
    for p in summarize(result) {
        let delta = p
            .delta_mean
            .map(|d| format!("{d:>9.4}"))
            .unwrap_or_else(|| format!("{:>9}", "-"));
        out.push_str(&format!(
            "{:>5} {:>12} | {} | {} | {}\n",
            p.index,
            p.input.to_string(),
            cell(p.base),
            cell(p.total),
            delta
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MeasurementPoint;
    use serde_json::json;

    fn result() -> MeasurementResult {
        MeasurementResult {
            target: "tuple_get".to_string(),
            range: vec![json!(1), json!(2)],
            data: vec![
                MeasurementPoint {
                    index: 0,
                    input: json!(1),
                    base_times: vec![1.0, 2.0, 3.0],
                    total_times: vec![2.0, 3.0, 4.0],
                },
                MeasurementPoint {
                    index: 1,
                    input: json!(2),
                    base_times: vec![],
                    total_times: vec![5.0],
                },
            ],
        }
    }

    #[test]
    fn test_summary_stats() {
        let s = Summary::of(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!(s.mean, 2.0);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 3.0);
        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn test_fsum_compensates() {
        let values = [1e16, 1.0, -1e16];
        assert_eq!(fsum(&values), 1.0);
    }

    #[test]
    fn test_summarize_delta() {
        let rows = summarize(&result());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].delta_mean, Some(1.0));
        assert_eq!(rows[1].delta_mean, None);
    }

    #[test]
    fn test_render_table_has_row_per_point() {
        let table = render_table(&result());
        assert!(table.starts_with("tuple_get\n"));
        assert_eq!(table.lines().count(), 4);
    }
}
