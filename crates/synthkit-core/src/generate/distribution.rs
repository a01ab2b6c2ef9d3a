//! Statistical sampling for numeric columns with a `distribution`.
//!
//! Beta samples live in [0, 1] and are scaled into the column's range. Normal
//! and exponential samples are clamped into whatever bounds the column has.

use rand::rngs::StdRng;
use rand_distr::{Beta, Distribution, Exp, Normal};

use crate::schema::types::DistributionConfig;

/// A ready-to-sample distribution, built once per column.
#[derive(Debug, Clone)]
pub enum Sampler {
    Normal(Normal<f64>),
    Exponential(Exp<f64>),
    Beta(Beta<f64>),
}

impl Sampler {
    pub fn new(config: &DistributionConfig) -> std::result::Result<Self, String> {
        match *config {
            DistributionConfig::Normal { mean, stddev } => Normal::new(mean, stddev)
                .map(Sampler::Normal)
                .map_err(|e| format!("invalid normal distribution: {}", e)),
            DistributionConfig::Exponential { rate } => Exp::new(rate)
                .map(Sampler::Exponential)
                .map_err(|e| format!("invalid exponential distribution: {}", e)),
            DistributionConfig::Beta { alpha, beta } => Beta::new(alpha, beta)
                .map(Sampler::Beta)
                .map_err(|e| format!("invalid beta distribution: {}", e)),
        }
    }

    /// Draw one value and fit it into `[min, max]`. Missing bounds leave that
    /// side open, except for beta which needs a finite interval: with no
    /// bounds it uses [0, 1], with one bound a unit interval on the open side.
    pub fn sample(&self, rng: &mut StdRng, min: Option<f64>, max: Option<f64>) -> f64 {
        match self {
            Sampler::Beta(d) => {
                let (lo, hi) = beta_interval(min, max);
                lo + d.sample(rng) * (hi - lo)
            }
            Sampler::Normal(d) => clamp(d.sample(rng), min, max),
            Sampler::Exponential(d) => clamp(d.sample(rng), min, max),
        }
    }
}

fn beta_interval(min: Option<f64>, max: Option<f64>) -> (f64, f64) {
    match (min, max) {
        (Some(lo), Some(hi)) => (lo, hi.max(lo)),
        (Some(lo), None) => (lo, lo + 1.0),
        (None, Some(hi)) => (hi - 1.0, hi),
        (None, None) => (0.0, 1.0),
    }
}

pub fn clamp(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let value = match min {
        Some(lo) if value < lo => lo,
        _ => value,
    };
    match max {
        Some(hi) if value > hi => hi,
        _ => value,
    }
}
