//! Surrogate models for sequential model-based search

use rand::rngs::StdRng;
use rand::Rng;

use super::space::{ParameterDomain, ParameterValue, SearchSpace};

/// The ask/tell surface of a surrogate model.
///
/// `ask` proposes one vector consistent with the space's bounds and types;
/// `tell` feeds back a finite evaluated objective. The search loop never
/// calls `tell` for infinite objectives.
pub trait Surrogate {
    fn ask(&mut self, space: &SearchSpace, rng: &mut StdRng) -> Vec<ParameterValue>;
    fn tell(&mut self, vector: &[ParameterValue], objective: f64);
}

/// Tree-structured Parzen Estimator surrogate.
///
/// Splits observed trials into good and bad sets at the `gamma` quantile
/// and proposes values that maximize the density ratio between them. The
/// first `n_startup` proposals are random.
pub struct TpeSurrogate {
    gamma: f64,
    n_startup: usize,
    kde_bandwidth: f64,
    observations: Vec<(Vec<ParameterValue>, f64)>,
}

impl TpeSurrogate {
    pub fn new() -> Self {
        Self { gamma: 0.25, n_startup: 10, kde_bandwidth: 1.0, observations: Vec::new() }
    }

    /// Set the good/bad split quantile
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 0.99);
        self
    }

    /// Set the number of random startup proposals
    pub fn with_startup(mut self, n: usize) -> Self {
        self.n_startup = n.max(1);
        self
    }

    /// Number of observations told so far
    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    fn split(&self) -> (Vec<&(Vec<ParameterValue>, f64)>, Vec<&(Vec<ParameterValue>, f64)>) {
        let mut sorted: Vec<_> = self.observations.iter().collect();
        sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let n_good = ((sorted.len() as f64) * self.gamma).ceil() as usize;
        let n_good = n_good.max(1).min(sorted.len() - 1);
        let (good, bad) = sorted.split_at(n_good);
        (good.to_vec(), bad.to_vec())
    }

    fn sample_dimension(
        &self,
        index: usize,
        domain: &ParameterDomain,
        good: &[&(Vec<ParameterValue>, f64)],
        bad: &[&(Vec<ParameterValue>, f64)],
        rng: &mut StdRng,
    ) -> ParameterValue {
        match domain {
            ParameterDomain::Continuous { low, high, log_scale } => {
                let project = |v: f64| if *log_scale { v.max(f64::MIN_POSITIVE).ln() } else { v };
                let good_values: Vec<f64> = good
                    .iter()
                    .filter_map(|(v, _)| v[index].as_float())
                    .map(project)
                    .collect();
                let bad_values: Vec<f64> =
                    bad.iter().filter_map(|(v, _)| v[index].as_float()).map(project).collect();

                let (lo, hi) = if *log_scale {
                    (low.max(f64::MIN_POSITIVE).ln(), high.max(f64::MIN_POSITIVE).ln())
                } else {
                    (*low, *high)
                };

                let value = sample_ei_ratio_continuous(
                    &good_values,
                    &bad_values,
                    lo,
                    hi,
                    self.kde_bandwidth,
                    rng,
                );
                let value = if *log_scale { value.exp() } else { value };
                ParameterValue::Float(value.clamp(*low, *high))
            }
            ParameterDomain::Integer { low, high } => {
                let good_values: Vec<i64> =
                    good.iter().filter_map(|(v, _)| v[index].as_int()).collect();
                let bad_values: Vec<i64> =
                    bad.iter().filter_map(|(v, _)| v[index].as_int()).collect();
                ParameterValue::Int(sample_ei_ratio_discrete(
                    &good_values,
                    &bad_values,
                    *low,
                    *high,
                    rng,
                ))
            }
            ParameterDomain::Categorical { choices } => {
                let good_counts = count_categorical(index, good, choices);
                let bad_counts = count_categorical(index, bad, choices);

                // Laplace-smoothed density ratio per choice
                let mut weights: Vec<f64> = (0..choices.len())
                    .map(|i| (good_counts[i] + 1) as f64 / (bad_counts[i] + 1) as f64)
                    .collect();
                let total: f64 = weights.iter().sum();
                for w in &mut weights {
                    *w /= total;
                }

                let r: f64 = rng.random();
                let mut cumsum = 0.0;
                for (i, &w) in weights.iter().enumerate() {
                    cumsum += w;
                    if r < cumsum {
                        return ParameterValue::Categorical(choices[i].clone());
                    }
                }
                ParameterValue::Categorical(
                    choices.last().expect("choices are non-empty per validate").clone(),
                )
            }
        }
    }
}

impl Default for TpeSurrogate {
    fn default() -> Self {
        Self::new()
    }
}

impl Surrogate for TpeSurrogate {
    fn ask(&mut self, space: &SearchSpace, rng: &mut StdRng) -> Vec<ParameterValue> {
        if self.observations.len() < self.n_startup.max(2) {
            return space.sample_random(rng);
        }

        let (good, bad) = self.split();
        space
            .iter()
            .enumerate()
            .map(|(i, (_, domain))| self.sample_dimension(i, domain, &good, &bad, rng))
            .collect()
    }

    fn tell(&mut self, vector: &[ParameterValue], objective: f64) {
        self.observations.push((vector.to_vec(), objective));
    }
}

/// Sample a continuous value maximizing the good/bad KDE ratio
fn sample_ei_ratio_continuous(
    good_values: &[f64],
    bad_values: &[f64],
    low: f64,
    high: f64,
    kde_bandwidth: f64,
    rng: &mut StdRng,
) -> f64 {
    if good_values.is_empty() {
        return low + rng.random::<f64>() * (high - low);
    }

    let n_candidates = 24;
    let mut best_value = low;
    let mut best_ei = f64::NEG_INFINITY;

    let bandwidth = kde_bandwidth * (high - low) / 10.0;

    for _ in 0..n_candidates {
        // Perturb a random good observation with Gaussian noise
        let idx = (rng.random::<f64>() * good_values.len() as f64).floor() as usize;
        let base = good_values[idx.min(good_values.len() - 1)];
        let u1: f64 = rng.random::<f64>().max(1e-10);
        let u2: f64 = rng.random::<f64>();
        let noise = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * bandwidth;
        let candidate = (base + noise).clamp(low, high);

        let l_score = kde_score(candidate, good_values, bandwidth);
        let g_score = kde_score(candidate, bad_values, bandwidth);
        let ei = l_score / (g_score + 1e-10);

        if ei > best_ei {
            best_ei = ei;
            best_value = candidate;
        }
    }

    best_value
}

fn kde_score(x: f64, values: &[f64], bandwidth: f64) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    values
        .iter()
        .map(|&v| (-(x - v).powi(2) / (2.0 * bandwidth.powi(2))).exp())
        .sum::<f64>()
        / values.len() as f64
}

/// Sample an integer value weighted by Laplace-smoothed count ratios
fn sample_ei_ratio_discrete(
    good_values: &[i64],
    bad_values: &[i64],
    low: i64,
    high: i64,
    rng: &mut StdRng,
) -> i64 {
    let range = (high - low + 1) as usize;
    if good_values.is_empty() {
        let offset = (rng.random::<f64>() * range as f64).floor() as i64;
        return (low + offset).min(high);
    }

    let mut good_counts = vec![1.0; range];
    let mut bad_counts = vec![1.0; range];
    for &v in good_values {
        good_counts[(v - low) as usize] += 1.0;
    }
    for &v in bad_values {
        bad_counts[(v - low) as usize] += 1.0;
    }

    let mut weights: Vec<f64> =
        good_counts.iter().zip(bad_counts.iter()).map(|(l, g)| l / g).collect();
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }

    let r: f64 = rng.random();
    let mut cumsum = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumsum += w;
        if r < cumsum {
            return low + i as i64;
        }
    }
    high
}

fn count_categorical(
    index: usize,
    observations: &[&(Vec<ParameterValue>, f64)],
    choices: &[String],
) -> Vec<usize> {
    let mut counts = vec![0usize; choices.len()];
    for (vector, _) in observations {
        if let Some(s) = vector[index].as_str() {
            if let Some(pos) = choices.iter().position(|c| c == s) {
                counts[pos] += 1;
            }
        }
    }
    counts
}
