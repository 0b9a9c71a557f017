// Score aggregation
// Combines per-predictor scores into one normalized directional score

use crate::predictors::ScoreGroup;

/// Last-row score of one predictor
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorScore {
    /// Score name, e.g. `high_10_gb`
    pub name: String,
    pub group: ScoreGroup,
    /// NaN when the predictor had no opinion
    pub value: f64,
}

/// Group means and the resulting normalized score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedScore {
    pub high: f64,
    pub low: f64,
    /// `None` when the score is undefined
    pub score: Option<f64>,
}

/// Mean of the non-NaN values; NaN when there are none
pub fn mean_ignoring_nan(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Map the two group means onto [-1, 1]: `high / (high + low) * 2 - 1`
///
/// Undefined when either mean is NaN or they sum to zero.
pub fn normalize(high: f64, low: f64) -> Option<f64> {
    if high.is_nan() || low.is_nan() {
        return None;
    }
    let total = high + low;
    if total == 0.0 {
        return None;
    }
    let score = (high / total) * 2.0 - 1.0;
    if score.is_finite() {
        Some(score.clamp(-1.0, 1.0))
    } else {
        None
    }
}

pub fn aggregate(scores: &[PredictorScore]) -> AggregatedScore {
    let group_mean = |group: ScoreGroup| {
        mean_ignoring_nan(scores.iter().filter(|s| s.group == group).map(|s| s.value))
    };
    let high = group_mean(ScoreGroup::High);
    let low = group_mean(ScoreGroup::Low);

    AggregatedScore {
        high,
        low,
        score: normalize(high, low),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(name: &str, group: ScoreGroup, value: f64) -> PredictorScore {
        PredictorScore {
            name: name.to_string(),
            group,
            value,
        }
    }

    #[test]
    fn test_normalize() {
        let s = normalize(0.9, 0.3).unwrap();
        assert!((s - 0.5).abs() < 1e-12);
        assert!((normalize(0.3, 0.9).unwrap() + 0.5).abs() < 1e-12);
        assert_eq!(normalize(0.5, 0.5), Some(0.0));
        assert_eq!(normalize(1.0, 0.0), Some(1.0));
    }

    #[test]
    fn test_normalize_undefined() {
        assert_eq!(normalize(0.0, 0.0), None);
        assert_eq!(normalize(f64::NAN, 0.3), None);
        assert_eq!(normalize(0.3, f64::NAN), None);
        assert_eq!(normalize(0.5, -0.5), None);
    }

    #[test]
    fn test_normalize_clamped() {
        // Negative model outputs can push the ratio out of range
        assert_eq!(normalize(2.0, -1.0), Some(1.0));
        assert_eq!(normalize(-1.0, 2.0), Some(-1.0));
    }

    #[test]
    fn test_aggregate_skips_nan_and_ungrouped() {
        let scores = vec![
            score("high_10_gb", ScoreGroup::High, 0.8),
            score("high_10_nn", ScoreGroup::High, 1.0),
            score("high_10_lc", ScoreGroup::High, f64::NAN),
            score("low_10_gb", ScoreGroup::Low, 0.3),
            score("mid_lc", ScoreGroup::Ungrouped, 100.0),
        ];
        let agg = aggregate(&scores);
        assert!((agg.high - 0.9).abs() < 1e-12);
        assert!((agg.low - 0.3).abs() < 1e-12);
        assert!((agg.score.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_missing_group() {
        let scores = vec![score("high_10_gb", ScoreGroup::High, 0.8)];
        let agg = aggregate(&scores);
        assert!(agg.low.is_nan());
        assert_eq!(agg.score, None);
    }
}
