//! Per-sample feature normalization.

use crate::error::SolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalization applied to each sample before it enters a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    #[default]
    None,
    #[serde(alias = "L1")]
    L1,
    #[serde(alias = "L2")]
    L2,
}

impl Normalization {
    /// Rescale `features` in place. Zero-norm samples are left untouched.
    pub fn apply(self, features: &mut [(u32, f32)]) {
        let norm = match self {
            Self::None => return,
            Self::L1 => features.iter().map(|&(_, v)| f64::from(v).abs()).sum::<f64>(),
            Self::L2 => features
                .iter()
                .map(|&(_, v)| f64::from(v).powi(2))
                .sum::<f64>()
                .sqrt(),
        };
        if norm == 0.0 || !norm.is_finite() {
            return;
        }
        for (_, v) in features.iter_mut() {
            *v = (f64::from(*v) / norm) as f32;
        }
    }
}

impl FromStr for Normalization {
    type Err = SolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "l1" => Ok(Self::L1),
            "l2" => Ok(Self::L2),
            other => Err(SolError::config(format!(
                "unknown normalization '{other}' (expected none, L1 or L2)"
            ))),
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::L1 => "L1",
            Self::L2 => "L2",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(features: &[(u32, f32)]) -> Vec<f32> {
        features.iter().map(|&(_, v)| v).collect()
    }

    #[test]
    fn test_l2() {
        let mut x = vec![(1, 3.0), (2, 4.0)];
        Normalization::L2.apply(&mut x);
        let v = values(&x);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l1() {
        let mut x = vec![(1, -1.0), (4, 3.0)];
        Normalization::L1.apply(&mut x);
        assert_eq!(values(&x), vec![-0.25, 0.75]);
    }

    #[test]
    fn test_zero_vector_passes_through() {
        let mut x = vec![(1, 0.0), (2, 0.0)];
        Normalization::L2.apply(&mut x);
        assert_eq!(values(&x), vec![0.0, 0.0]);

        let mut empty: Vec<(u32, f32)> = Vec::new();
        Normalization::L1.apply(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_none_is_identity() {
        let mut x = vec![(1, 3.0), (2, 4.0)];
        Normalization::None.apply(&mut x);
        assert_eq!(values(&x), vec![3.0, 4.0]);
    }

    #[test]
    fn test_parse() {
        assert_eq!("L2".parse::<Normalization>().unwrap(), Normalization::L2);
        assert_eq!("none".parse::<Normalization>().unwrap(), Normalization::None);
        assert!("max".parse::<Normalization>().is_err());
    }
}
