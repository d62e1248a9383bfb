//! Online linear classifiers: perceptron, OGD on the hinge loss, and AROW.
//!
//! Weight index 0 is the bias, fed an implicit feature value of 1. Weight vectors
//! grow to the largest feature index seen. Two-class problems keep one vector with
//! targets in {-1, +1}; multiclass problems keep one vector per class and update the
//! true class against the strongest wrong class.

use crate::data::dataset::Sample;
use crate::data::feeder::Batch;
use crate::error::SolError;
use crate::learner::Learner;
use crate::tuning::params::HyperparamSet;
use serde::{Deserialize, Serialize};

/// Update rule and its hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum UpdateRule {
    Perceptron,
    Ogd { eta: f32, power_t: f32 },
    Arow { r: f32 },
}

impl UpdateRule {
    pub const NAMES: [&'static str; 3] = ["perceptron", "ogd", "arow"];

    /// Resolve `algorithm` and coerce its string parameters.
    pub fn from_params(algorithm: &str, params: &HyperparamSet) -> Result<Self, SolError> {
        let (rule, known): (Self, &[&str]) = match algorithm {
            "perceptron" => (Self::Perceptron, &[]),
            "ogd" => (
                Self::Ogd {
                    eta: read_param(params, "eta", 1.0, |v| v > 0.0, "must be positive")?,
                    power_t: read_param(params, "power_t", 0.5, |v| v >= 0.0, "must be >= 0")?,
                },
                &["eta", "power_t"],
            ),
            "arow" => (
                Self::Arow {
                    r: read_param(params, "r", 1.0, |v| v > 0.0, "must be positive")?,
                },
                &["r"],
            ),
            other => {
                return Err(SolError::training(format!(
                    "unknown algorithm '{other}' (available: {})",
                    Self::NAMES.join(", ")
                )));
            }
        };

        if let Some((name, _)) = params.iter().find(|(name, _)| !known.contains(name)) {
            return Err(SolError::training(format!(
                "unknown parameter '{name}' for algorithm '{algorithm}'"
            )));
        }
        Ok(rule)
    }
}

fn read_param(
    params: &HyperparamSet,
    name: &str,
    default: f32,
    valid: impl Fn(f32) -> bool,
    requirement: &str,
) -> Result<f32, SolError> {
    let Some(raw) = params.get(name) else {
        return Ok(default);
    };
    let value: f32 = raw
        .parse()
        .map_err(|_| SolError::training(format!("parameter {name}='{raw}' is not a number")))?;
    if !value.is_finite() || !valid(value) {
        return Err(SolError::training(format!(
            "parameter {name}={raw} {requirement}"
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LinearState {
    weights: Vec<Vec<f32>>,
    #[serde(default)]
    sigmas: Vec<Vec<f32>>,
    updates: u64,
}

#[derive(Debug, Clone)]
pub struct LinearLearner {
    rule: UpdateRule,
    class_count: usize,
    state: LinearState,
}

impl LinearLearner {
    pub fn new(rule: UpdateRule, class_count: usize) -> Self {
        let vectors = if class_count <= 2 { 1 } else { class_count };
        let sigmas = match rule {
            UpdateRule::Arow { .. } => vec![vec![1.0]; vectors],
            _ => Vec::new(),
        };
        Self {
            rule,
            class_count,
            state: LinearState {
                weights: vec![vec![0.0]; vectors],
                sigmas,
                updates: 0,
            },
        }
    }

    pub fn rule(&self) -> UpdateRule {
        self.rule
    }

    fn is_binary(&self) -> bool {
        self.state.weights.len() == 1
    }

    fn ensure_dim(&mut self, sample: &Sample) {
        let Some(max_index) = sample.features.iter().map(|&(i, _)| i).max() else {
            return;
        };
        let dim = max_index as usize + 1;
        for w in &mut self.state.weights {
            if w.len() < dim {
                w.resize(dim, 0.0);
            }
        }
        for s in &mut self.state.sigmas {
            if s.len() < dim {
                s.resize(dim, 1.0);
            }
        }
    }

    fn score(w: &[f32], sample: &Sample) -> f32 {
        with_bias(sample)
            .filter_map(|(i, v)| w.get(i as usize).map(|wi| wi * v))
            .sum()
    }

    fn scores(&self, sample: &Sample) -> Vec<f32> {
        self.state
            .weights
            .iter()
            .map(|w| Self::score(w, sample))
            .collect()
    }

    fn predict(&self, sample: &Sample) -> usize {
        let scores = self.scores(sample);
        if self.is_binary() {
            return usize::from(scores[0] > 0.0);
        }
        let mut best = 0;
        for (c, &s) in scores.iter().enumerate() {
            if s > scores[best] {
                best = c;
            }
        }
        best
    }

    /// Strongest class other than `label`.
    fn rival(scores: &[f32], label: usize) -> usize {
        let mut rival = if label == 0 { 1 } else { 0 };
        for (c, &s) in scores.iter().enumerate() {
            if c != label && s > scores[rival] {
                rival = c;
            }
        }
        rival
    }

    fn iterate(&mut self, sample: &Sample) -> bool {
        self.ensure_dim(sample);
        let predicted = self.predict(sample);
        let mistake = predicted != sample.label;
        self.state.updates += 1;

        if self.is_binary() {
            let y = if sample.label == 1 { 1.0 } else { -1.0 };
            let margin = y * Self::score(&self.state.weights[0], sample);
            self.update_binary(sample, y, margin, mistake);
        } else {
            let scores = self.scores(sample);
            let label = sample.label.min(scores.len() - 1);
            let rival = Self::rival(&scores, label);
            let margin = scores[label] - scores[rival];
            self.update_pair(sample, label, rival, predicted, margin, mistake);
        }
        mistake
    }

    fn update_binary(&mut self, sample: &Sample, y: f32, margin: f32, mistake: bool) {
        let w = &mut self.state.weights[0];
        match self.rule {
            UpdateRule::Perceptron => {
                if mistake {
                    axpy(w, sample, y);
                }
            }
            UpdateRule::Ogd { eta, power_t } => {
                if margin < 1.0 {
                    let step = eta / (self.state.updates as f32).powf(power_t);
                    axpy(w, sample, step * y);
                }
            }
            UpdateRule::Arow { r } => {
                if margin < 1.0 {
                    let sigma = &mut self.state.sigmas[0];
                    let confidence = confidence(sigma, sample);
                    let beta = 1.0 / (confidence + r);
                    let alpha = (1.0 - margin) * beta;
                    arow_step(w, sigma, sample, alpha * y, beta);
                }
            }
        }
    }

    fn update_pair(
        &mut self,
        sample: &Sample,
        label: usize,
        rival: usize,
        predicted: usize,
        margin: f32,
        mistake: bool,
    ) {
        match self.rule {
            UpdateRule::Perceptron => {
                if mistake {
                    axpy(&mut self.state.weights[label], sample, 1.0);
                    axpy(&mut self.state.weights[predicted], sample, -1.0);
                }
            }
            UpdateRule::Ogd { eta, power_t } => {
                if margin < 1.0 {
                    let step = eta / (self.state.updates as f32).powf(power_t);
                    axpy(&mut self.state.weights[label], sample, step);
                    axpy(&mut self.state.weights[rival], sample, -step);
                }
            }
            UpdateRule::Arow { r } => {
                if margin < 1.0 {
                    let confidence = confidence(&self.state.sigmas[label], sample)
                        + confidence(&self.state.sigmas[rival], sample);
                    let beta = 1.0 / (confidence + r);
                    let alpha = (1.0 - margin) * beta;
                    let state = &mut self.state;
                    arow_step(
                        &mut state.weights[label],
                        &mut state.sigmas[label],
                        sample,
                        alpha,
                        beta,
                    );
                    arow_step(
                        &mut state.weights[rival],
                        &mut state.sigmas[rival],
                        sample,
                        -alpha,
                        beta,
                    );
                }
            }
        }
    }
}

fn with_bias(sample: &Sample) -> impl Iterator<Item = (u32, f32)> + '_ {
    std::iter::once((0, 1.0)).chain(sample.features.iter().copied())
}

fn axpy(w: &mut [f32], sample: &Sample, scale: f32) {
    for (i, v) in with_bias(sample) {
        if let Some(wi) = w.get_mut(i as usize) {
            *wi += scale * v;
        }
    }
}

fn confidence(sigma: &[f32], sample: &Sample) -> f32 {
    with_bias(sample)
        .filter_map(|(i, v)| sigma.get(i as usize).map(|s| s * v * v))
        .sum()
}

fn arow_step(w: &mut [f32], sigma: &mut [f32], sample: &Sample, scale: f32, beta: f32) {
    for (i, v) in with_bias(sample) {
        let i = i as usize;
        if let (Some(wi), Some(si)) = (w.get_mut(i), sigma.get_mut(i)) {
            *wi += scale * *si * v;
            *si -= beta * *si * *si * v * v;
        }
    }
}

impl Learner for LinearLearner {
    fn train_batch(&mut self, batch: &Batch) -> Result<usize, SolError> {
        let mut mistakes = 0;
        for sample in &batch.samples {
            if sample.label >= self.class_count.max(1) {
                return Err(SolError::training(format!(
                    "label {} outside {} classes",
                    sample.label, self.class_count
                )));
            }
            mistakes += usize::from(self.iterate(sample));
        }
        if self.state.weights.iter().flatten().any(|w| !w.is_finite()) {
            return Err(SolError::training("weights diverged to a non-finite value"));
        }
        Ok(mistakes)
    }

    fn evaluate_batch(&self, batch: &Batch) -> Result<usize, SolError> {
        Ok(batch
            .samples
            .iter()
            .filter(|s| self.predict(s) != s.label)
            .count())
    }

    fn sparsity(&self) -> f64 {
        let total: usize = self.state.weights.iter().map(Vec::len).sum();
        if total == 0 {
            return 0.0;
        }
        let zeros = self
            .state
            .weights
            .iter()
            .flatten()
            .filter(|&&w| w == 0.0)
            .count();
        zeros as f64 / total as f64
    }

    fn export_state(&self) -> Result<serde_json::Value, SolError> {
        Ok(serde_json::to_value(&self.state)?)
    }

    fn import_state(&mut self, state: serde_json::Value) -> Result<(), SolError> {
        let state: LinearState = serde_json::from_value(state)?;
        if state.weights.len() != self.state.weights.len() {
            return Err(SolError::training(format!(
                "model holds {} weight vectors, expected {}",
                state.weights.len(),
                self.state.weights.len()
            )));
        }
        if matches!(self.rule, UpdateRule::Arow { .. })
            && (state.sigmas.len() != state.weights.len()
                || state
                    .sigmas
                    .iter()
                    .zip(&state.weights)
                    .any(|(s, w)| s.len() != w.len()))
        {
            return Err(SolError::training("model confidence vectors do not match its weights"));
        }
        self.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: usize, features: &[(u32, f32)]) -> Sample {
        Sample {
            label,
            features: features.to_vec(),
        }
    }

    fn batch(samples: Vec<Sample>) -> Batch {
        Batch { pass: 0, samples }
    }

    /// Class 1 when feature 1 is positive, class 0 otherwise.
    fn separable() -> Batch {
        batch(
            (0..40)
                .map(|i| {
                    let x = if i % 2 == 0 { 1.0 } else { -1.0 };
                    sample(usize::from(x > 0.0), &[(1, x), (2, 0.1)])
                })
                .collect(),
        )
    }

    fn learns_separable(rule: UpdateRule) {
        let mut learner = LinearLearner::new(rule, 2);
        let data = separable();
        for _ in 0..3 {
            learner.train_batch(&data).unwrap();
        }
        assert_eq!(learner.evaluate_batch(&data).unwrap(), 0, "{rule:?}");
    }

    #[test]
    fn test_all_rules_learn_separable_data() {
        learns_separable(UpdateRule::Perceptron);
        learns_separable(UpdateRule::Ogd {
            eta: 1.0,
            power_t: 0.5,
        });
        learns_separable(UpdateRule::Arow { r: 1.0 });
    }

    #[test]
    fn test_multiclass() {
        let data = batch(
            (0..60)
                .map(|i| {
                    let c = i % 3;
                    sample(c, &[(c as u32 + 1, 1.0)])
                })
                .collect(),
        );
        for rule in [
            UpdateRule::Perceptron,
            UpdateRule::Ogd {
                eta: 0.5,
                power_t: 0.0,
            },
            UpdateRule::Arow { r: 0.5 },
        ] {
            let mut learner = LinearLearner::new(rule, 3);
            for _ in 0..3 {
                learner.train_batch(&data).unwrap();
            }
            assert_eq!(learner.evaluate_batch(&data).unwrap(), 0, "{rule:?}");
        }
    }

    #[test]
    fn test_evaluate_does_not_update() {
        let mut learner = LinearLearner::new(UpdateRule::Perceptron, 2);
        let data = separable();
        learner.evaluate_batch(&data).unwrap();
        assert_eq!(learner.sparsity(), 1.0);
        learner.train_batch(&data).unwrap();
        assert!(learner.sparsity() < 1.0);
    }

    #[test]
    fn test_params_parsing() {
        let params = HyperparamSet::new().with("eta", "0.25");
        assert_eq!(
            UpdateRule::from_params("ogd", &params).unwrap(),
            UpdateRule::Ogd {
                eta: 0.25,
                power_t: 0.5
            }
        );
        assert!(UpdateRule::from_params("ogd", &HyperparamSet::new().with("eta", "-1")).is_err());
        assert!(UpdateRule::from_params("ogd", &HyperparamSet::new().with("eta", "x")).is_err());
        assert!(UpdateRule::from_params("arow", &HyperparamSet::new().with("eta", "1")).is_err());
        assert!(UpdateRule::from_params("svm", &HyperparamSet::new()).is_err());
    }

    #[test]
    fn test_state_round_trip() {
        let mut learner = LinearLearner::new(UpdateRule::Arow { r: 1.0 }, 2);
        learner.train_batch(&separable()).unwrap();
        let state = learner.export_state().unwrap();

        let mut restored = LinearLearner::new(UpdateRule::Arow { r: 1.0 }, 2);
        restored.import_state(state).unwrap();
        assert_eq!(restored.evaluate_batch(&separable()).unwrap(), 0);

        let mut wrong = LinearLearner::new(UpdateRule::Arow { r: 1.0 }, 3);
        assert!(wrong.import_state(learner.export_state().unwrap()).is_err());
    }

    #[test]
    fn test_label_out_of_range() {
        let mut learner = LinearLearner::new(UpdateRule::Perceptron, 2);
        assert!(learner.train_batch(&batch(vec![sample(5, &[(1, 1.0)])])).is_err());
    }
}
