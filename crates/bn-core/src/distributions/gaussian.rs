use crate::rng::BnRng;
use bn_error::{BnResult, bn_err};
use rand_distr::{Distribution as _, Normal};
use std::f64::consts::PI;

const MIN_VARIANCE: f64 = 0.01;

/// How variance is shared across rows when fitting a table of Gaussians
/// to per-row observations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VariancePolicy {
    /// Each row keeps its own maximum-likelihood variance.
    Untied,
    /// Every row takes the largest per-row variance.
    TiedToMax,
    /// Every row takes the pooled variance `Σ(ni-1)σi² / Σ(ni-1)`.
    TiedPooled,
}

#[derive(Clone, Copy, Debug)]
pub struct Gaussian {
    mean: f64,
    variance: f64,
}

impl Gaussian {
    pub fn new(mean: f64, variance: f64) -> BnResult<Self> {
        if !variance.is_finite() || variance <= 0.0 {
            return Err(bn_err!(InvalidModel: "gaussian variance must be positive, got {}", variance));
        }
        Ok(Gaussian {
            mean,
            variance: variance.max(MIN_VARIANCE),
        })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn density(&self, x: f64) -> f64 {
        let diff = x - self.mean;
        (-(diff * diff) / (2.0 * self.variance)).exp() / (2.0 * PI * self.variance).sqrt()
    }

    pub fn sample(&self, rng: &mut BnRng) -> f64 {
        let normal = Normal::new(self.mean, self.variance.sqrt()).expect("validated variance");
        normal.sample(rng.inner())
    }

    /// Apply a pooling/tying policy across a batch of per-row (mean, variance,
    /// sample-count) maximum-likelihood fits, returning the variance each row
    /// should use afterwards.
    pub fn tie_variances(rows: &[(f64, usize)], policy: VariancePolicy) -> Vec<f64> {
        match policy {
            VariancePolicy::Untied => rows.iter().map(|(v, _)| v.max(MIN_VARIANCE)).collect(),
            VariancePolicy::TiedToMax => {
                let max_v = rows.iter().map(|(v, _)| *v).fold(0.0, f64::max).max(MIN_VARIANCE);
                vec![max_v; rows.len()]
            }
            VariancePolicy::TiedPooled => {
                let (num, den) = rows.iter().fold((0.0, 0.0), |(num, den), (v, n)| {
                    let w = (*n as f64 - 1.0).max(0.0);
                    (num + w * v, den + w)
                });
                let pooled = if den > 0.0 { (num / den).max(MIN_VARIANCE) } else { MIN_VARIANCE };
                vec![pooled; rows.len()]
            }
        }
    }

    /// Line-oriented text form: `gaussian:mean,variance`.
    pub fn as_text(&self) -> String {
        format!("gaussian:{},{}", self.mean, self.variance)
    }

    /// Parse [`as_text`](Self::as_text)'s output back into a `Gaussian`.
    pub fn from_text(text: &str) -> BnResult<Self> {
        let body = text
            .strip_prefix("gaussian:")
            .ok_or_else(|| bn_err!(InvalidModel: "expected a 'gaussian:' text record, got '{}'", text))?;
        let mut parts = body.split(',');
        let mean = parts
            .next()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| bn_err!(InvalidModel: "malformed gaussian mean in '{}'", text))?;
        let variance = parts
            .next()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| bn_err!(InvalidModel: "malformed gaussian variance in '{}'", text))?;
        Gaussian::new(mean, variance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_peaks_at_mean() {
        let g = Gaussian::new(0.0, 1.0).unwrap();
        assert!(g.density(0.0) > g.density(1.0));
        assert!(g.density(1.0) > g.density(2.0));
    }

    #[test]
    fn variance_is_floored() {
        let g = Gaussian::new(0.0, 0.0001).unwrap();
        assert!((g.variance() - MIN_VARIANCE).abs() < 1e-12);
    }

    #[test]
    fn pooled_variance_matches_formula() {
        let rows = vec![(1.0, 3usize), (2.0, 5usize)];
        let pooled = Gaussian::tie_variances(&rows, VariancePolicy::TiedPooled);
        let expected = (2.0 * 1.0 + 4.0 * 2.0) / (2.0 + 4.0);
        assert!((pooled[0] - expected).abs() < 1e-9);
        assert_eq!(pooled[0], pooled[1]);
    }

    #[test]
    fn text_round_trips() {
        let g = Gaussian::new(1.5, 2.5).unwrap();
        let parsed = Gaussian::from_text(&g.as_text()).unwrap();
        assert!((g.mean() - parsed.mean()).abs() < 1e-9);
        assert!((g.variance() - parsed.variance()).abs() < 1e-9);
    }
}
