//! Distance metrics used to build neighbor graphs.

use std::fmt;
use std::str::FromStr;

use vitzarr_core::{Result, VitzarrError};

/// Supported distance metrics for neighbor search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
    Cosine,
}

impl DistanceMetric {
    /// Lowercase name, as recorded alongside a neighbor graph.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = VitzarrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "manhattan" | "cityblock" | "l1" => Ok(DistanceMetric::Manhattan),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(VitzarrError::InvalidInput(format!(
                "unknown distance metric '{other}'"
            ))),
        }
    }
}

/// Euclidean (L2) distance between two vectors.
pub fn euclidean(a: &[f64], b: &[f64]) -> Result<f64> {
    validate_pair(a, b)?;
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    Ok(sum.sqrt())
}

/// Manhattan (L1) distance between two vectors.
pub fn manhattan(a: &[f64], b: &[f64]) -> Result<f64> {
    validate_pair(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum())
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 if either vector is the zero vector.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    validate_pair(a, b)?;
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / denom)
}

/// Cosine distance: `1.0 - cosine_similarity(a, b)`.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> Result<f64> {
    Ok(1.0 - cosine_similarity(a, b)?)
}

/// Compute distance between two vectors using the given metric.
pub fn compute_distance(a: &[f64], b: &[f64], metric: DistanceMetric) -> Result<f64> {
    match metric {
        DistanceMetric::Euclidean => euclidean(a, b),
        DistanceMetric::Manhattan => manhattan(a, b),
        DistanceMetric::Cosine => cosine_distance(a, b),
    }
}

fn validate_pair(a: &[f64], b: &[f64]) -> Result<()> {
    if a.is_empty() {
        return Err(VitzarrError::InvalidInput("empty vectors".into()));
    }
    if a.len() != b.len() {
        return Err(VitzarrError::InvalidInput(format!(
            "length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_known() {
        let d = euclidean(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn euclidean_empty_error() {
        assert!(euclidean(&[], &[]).is_err());
    }

    #[test]
    fn length_mismatch_error() {
        assert!(manhattan(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn manhattan_known() {
        let d = manhattan(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 7.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_orthogonal_and_zero() {
        let d = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((d - 1.0).abs() < 1e-12);
        let s = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        assert_eq!(s, 0.0);
    }

    #[test]
    fn metric_parse_and_name() {
        assert_eq!("Euclidean".parse::<DistanceMetric>().unwrap(), DistanceMetric::Euclidean);
        assert_eq!("l1".parse::<DistanceMetric>().unwrap(), DistanceMetric::Manhattan);
        assert_eq!(DistanceMetric::Cosine.to_string(), "cosine");
        assert!("chebyshev".parse::<DistanceMetric>().is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn pair(max_len: usize) -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
        (1..=max_len).prop_flat_map(|n| {
            (
                proptest::collection::vec(-1e3..1e3f64, n),
                proptest::collection::vec(-1e3..1e3f64, n),
            )
        })
    }

    proptest! {
        #[test]
        fn metrics_symmetric_and_nonnegative((a, b) in pair(16)) {
            for metric in [DistanceMetric::Euclidean, DistanceMetric::Manhattan] {
                let ab = compute_distance(&a, &b, metric).unwrap();
                let ba = compute_distance(&b, &a, metric).unwrap();
                prop_assert!(ab >= 0.0);
                prop_assert!((ab - ba).abs() < 1e-9);
            }
        }

        #[test]
        fn euclidean_bounded_by_manhattan((a, b) in pair(16)) {
            let l2 = euclidean(&a, &b).unwrap();
            let l1 = manhattan(&a, &b).unwrap();
            prop_assert!(l2 <= l1 + 1e-9);
        }
    }
}
