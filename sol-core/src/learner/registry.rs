//! Built-in learner factory.

use crate::error::SolError;
use crate::learner::linear::{LinearLearner, UpdateRule};
use crate::learner::{Learner, LearnerFactory};
use crate::tuning::params::HyperparamSet;

/// Factory for the linear learners shipped with sol.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLearners;

impl BuiltinLearners {
    pub fn algorithms() -> &'static [&'static str] {
        &UpdateRule::NAMES
    }
}

impl LearnerFactory for BuiltinLearners {
    fn create(
        &self,
        algorithm: &str,
        class_count: usize,
        params: &HyperparamSet,
    ) -> Result<Box<dyn Learner>, SolError> {
        let rule = UpdateRule::from_params(algorithm, params)?;
        Ok(Box::new(LinearLearner::new(rule, class_count)))
    }
}
