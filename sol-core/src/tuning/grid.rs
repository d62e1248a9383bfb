//! Grid expansion of parameter ranges into candidate hyperparameter sets.

use crate::error::SolError;
use crate::tuning::params::{HyperparamSet, MAX_GRID_SIZE, ParamRangeSpec};
use std::collections::HashSet;

/// Parse textual `name=start:step:end` specs, rejecting duplicates.
pub fn parse_ranges<S: AsRef<str>>(items: &[S]) -> Result<Vec<ParamRangeSpec>, SolError> {
    let mut specs = Vec::with_capacity(items.len());
    for item in items {
        specs.push(item.as_ref().parse::<ParamRangeSpec>()?);
    }
    check_unique(&specs)?;
    Ok(specs)
}

fn check_unique(specs: &[ParamRangeSpec]) -> Result<(), SolError> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(SolError::invalid_range(
                &spec.name,
                "parameter appears in more than one range",
            ));
        }
    }
    Ok(())
}

/// Number of candidates the specs expand to, rejected above [`MAX_GRID_SIZE`].
pub fn grid_size(specs: &[ParamRangeSpec]) -> Result<usize, SolError> {
    let mut total: usize = 1;
    for spec in specs {
        total = total
            .checked_mul(spec.count()?)
            .filter(|&n| n <= MAX_GRID_SIZE)
            .ok_or_else(|| {
                SolError::invalid_range(
                    &spec.name,
                    format!("grid would hold more than {MAX_GRID_SIZE} candidates"),
                )
            })?;
    }
    Ok(total)
}

/// Cartesian product of every range, each set also carrying `overrides`.
///
/// The first spec varies slowest. A parameter that is both ranged and overridden
/// takes the ranged value here; the override applies again at final training.
pub fn expand_grid(
    specs: &[ParamRangeSpec],
    overrides: &HyperparamSet,
) -> Result<Vec<HyperparamSet>, SolError> {
    check_unique(specs)?;
    grid_size(specs)?;

    let mut configs = vec![overrides.clone()];
    for spec in specs {
        let values = spec.rendered_values()?;
        let mut next = Vec::with_capacity(configs.len() * values.len());
        for config in &configs {
            for value in &values {
                next.push(config.clone().with(spec.name.clone(), value.clone()));
            }
        }
        configs = next;
    }

    tracing::debug!(
        ranges = specs.len(),
        candidates = configs.len(),
        "Expanded parameter grid"
    );
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_product_size_and_distinct() {
        let specs = parse_ranges(&["eta=0.1:0.1:0.3", "r=1:1:2"]).unwrap();
        let grid = expand_grid(&specs, &HyperparamSet::new()).unwrap();
        assert_eq!(grid.len(), 6);
        for (i, a) in grid.iter().enumerate() {
            for b in &grid[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_enumeration_order() {
        let specs = parse_ranges(&["a=1:1:2", "b=10:10:20"]).unwrap();
        let grid = expand_grid(&specs, &HyperparamSet::new()).unwrap();
        let rendered: Vec<String> = grid.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["a=1 b=10", "a=1 b=20", "a=2 b=10", "a=2 b=20"]
        );
    }

    #[test]
    fn test_overrides_on_every_set() {
        let specs = parse_ranges(&["eta=0.5:0.5:1"]).unwrap();
        let overrides = HyperparamSet::new().with("power_t", "0.25");
        let grid = expand_grid(&specs, &overrides).unwrap();
        assert_eq!(grid.len(), 2);
        assert!(grid.iter().all(|s| s.get("power_t") == Some("0.25")));
    }

    #[test]
    fn test_no_ranges_yields_overrides_only() {
        let overrides = HyperparamSet::new().with("r", "2");
        let grid = expand_grid(&[], &overrides).unwrap();
        assert_eq!(grid, vec![overrides]);
    }

    #[test]
    fn test_grid_product_capped() {
        let specs = parse_ranges(&["a=1:1:200", "b=1:1:100"]).unwrap();
        assert_eq!(grid_size(&specs[..1]).unwrap(), 200);
        let err = expand_grid(&specs, &HyperparamSet::new()).unwrap_err();
        assert!(matches!(err, SolError::InvalidRange { ref param, .. } if param == "b"));
    }

    #[test]
    fn test_small_magnitude_grid_is_distinct() {
        let specs = parse_ranges(&["lambda=1e-10:1e-10:3e-10"]).unwrap();
        let grid = expand_grid(&specs, &HyperparamSet::new()).unwrap();
        assert_eq!(grid.len(), 3);
        assert_ne!(grid[0], grid[1]);
        assert_ne!(grid[1], grid[2]);
    }

    #[test]
    fn test_duplicate_range_rejected() {
        let err = parse_ranges(&["eta=0.1:0.1:0.3", "eta=1:1:2"]).unwrap_err();
        assert!(matches!(err, SolError::InvalidRange { .. }));
    }
}
