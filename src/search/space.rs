//! Hyperparameter search space

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Parameter value (sampled from a domain)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Categorical(String),
}

impl ParameterValue {
    /// Get as float (converts int to float if needed)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            ParameterValue::Categorical(_) => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) => Some(*v as i64),
            ParameterValue::Categorical(_) => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Categorical(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{v}"),
            ParameterValue::Int(v) => write!(f, "{v}"),
            ParameterValue::Categorical(s) => write!(f, "{s}"),
        }
    }
}

/// Domain of one search dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParameterDomain {
    /// Continuous range [low, high], optionally sampled in log space
    Continuous { low: f64, high: f64, log_scale: bool },
    /// Integer range [low, high], inclusive
    Integer { low: i64, high: i64 },
    /// Categorical choices
    Categorical { choices: Vec<String> },
}

impl ParameterDomain {
    /// Sample a random value from this domain
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self {
            ParameterDomain::Continuous { low, high, log_scale } => {
                let value = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (log_low + rng.random::<f64>() * (log_high - log_low)).exp()
                } else {
                    low + rng.random::<f64>() * (high - low)
                };
                ParameterValue::Float(value)
            }
            ParameterDomain::Integer { low, high } => {
                let range = (*high - *low + 1) as usize;
                let offset = (rng.random::<f64>() * range as f64).floor() as i64;
                ParameterValue::Int((*low + offset).min(*high))
            }
            ParameterDomain::Categorical { choices } => {
                let idx = (rng.random::<f64>() * choices.len() as f64).floor() as usize;
                ParameterValue::Categorical(choices[idx.min(choices.len() - 1)].clone())
            }
        }
    }

    /// Check if a value is valid for this domain
    pub fn is_valid(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (ParameterDomain::Continuous { low, high, .. }, ParameterValue::Float(v)) => {
                *v >= *low && *v <= *high
            }
            (ParameterDomain::Integer { low, high }, ParameterValue::Int(v)) => {
                *v >= *low && *v <= *high
            }
            (ParameterDomain::Categorical { choices }, ParameterValue::Categorical(s)) => {
                choices.contains(s)
            }
            _ => false,
        }
    }

    /// Parse a logged text value back into this domain's value type
    pub fn parse(&self, text: &str) -> Result<ParameterValue> {
        let value = match self {
            ParameterDomain::Continuous { .. } => ParameterValue::Float(
                text.parse()
                    .map_err(|_| Error::Persistence(format!("bad float '{text}' in trial log")))?,
            ),
            ParameterDomain::Integer { .. } => ParameterValue::Int(
                text.parse()
                    .map_err(|_| Error::Persistence(format!("bad integer '{text}' in trial log")))?,
            ),
            ParameterDomain::Categorical { .. } => ParameterValue::Categorical(text.to_string()),
        };
        if !self.is_valid(&value) {
            return Err(Error::Persistence(format!("logged value '{text}' is out of bounds")));
        }
        Ok(value)
    }

    fn check(&self, name: &str) -> Result<()> {
        match self {
            ParameterDomain::Continuous { low, high, log_scale } => {
                if !low.is_finite() || !high.is_finite() || low >= high {
                    return Err(Error::Config(format!(
                        "dimension '{name}': bounds [{low}, {high}] are malformed"
                    )));
                }
                if *log_scale && *low <= 0.0 {
                    return Err(Error::Config(format!(
                        "dimension '{name}': log scale requires a positive lower bound"
                    )));
                }
            }
            ParameterDomain::Integer { low, high } => {
                if low > high {
                    return Err(Error::Config(format!(
                        "dimension '{name}': bounds [{low}, {high}] are malformed"
                    )));
                }
            }
            ParameterDomain::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(Error::Config(format!("dimension '{name}' has no choices")));
                }
                if choices.iter().any(|c| c.contains(',') || c.is_empty()) {
                    return Err(Error::Config(format!(
                        "dimension '{name}': choices must be non-empty and comma-free"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Ordered list of search dimensions, fixed for the lifetime of one search
/// run. The order defines the layout of proposal vectors and of the trial
/// log's columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    dims: Vec<(String, ParameterDomain)>,
}

impl SearchSpace {
    /// Create an empty search space
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dimension
    pub fn add(&mut self, name: &str, domain: ParameterDomain) {
        self.dims.push((name.to_string(), domain));
    }

    /// Number of dimensions
    pub fn len(&self) -> usize {
        self.dims.len()
    }

    /// Whether the space has no dimensions
    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Dimension names in order
    pub fn names(&self) -> Vec<&str> {
        self.dims.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Iterate dimensions in order
    pub fn iter(&self) -> impl Iterator<Item = &(String, ParameterDomain)> {
        self.dims.iter()
    }

    /// Domain of the dimension at `index`
    pub fn domain(&self, index: usize) -> &ParameterDomain {
        &self.dims[index].1
    }

    /// Reject malformed bounds, duplicate names, and empty spaces
    pub fn validate(&self) -> Result<()> {
        if self.dims.is_empty() {
            return Err(Error::Config("search space has no dimensions".to_string()));
        }
        for (i, (name, domain)) in self.dims.iter().enumerate() {
            if self.dims[..i].iter().any(|(n, _)| n == name) {
                return Err(Error::Config(format!("duplicate search dimension '{name}'")));
            }
            domain.check(name)?;
        }
        Ok(())
    }

    /// Sample one random vector, in dimension order
    pub fn sample_random<R: Rng>(&self, rng: &mut R) -> Vec<ParameterValue> {
        self.dims.iter().map(|(_, domain)| domain.sample(rng)).collect()
    }

    /// Check a vector against the space's bounds and types
    pub fn contains(&self, vector: &[ParameterValue]) -> bool {
        vector.len() == self.dims.len()
            && self.dims.iter().zip(vector).all(|((_, d), v)| d.is_valid(v))
    }
}
