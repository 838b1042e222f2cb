use crate::distributions::gamma::Gamma;
use crate::rng::BnRng;
use crate::variable::Variable;
use bn_error::{BnResult, bn_err};

const GRADIENT_TOL: f64 = 9.5367431640625e-07; // 2^-20
const LEARN_RATE_TOL: f64 = 0.0009765625; // 2^-10
const MAX_ITERS: usize = 200;

fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result + x.ln() - 0.5 * inv
        - inv2 * (1.0 / 12.0 - inv2 * (1.0 / 120.0 - inv2 / 252.0))
}

fn trigamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result + inv * (1.0 + inv * (0.5 + inv * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 / 42.0))))
}

/// A Dirichlet distribution over the probability simplex on an enumerable
/// variable's domain.
#[derive(Clone, Debug)]
pub struct Dirichlet {
    variable: Variable,
    alpha: Vec<f64>,
}

impl Dirichlet {
    pub fn new(variable: Variable, alpha: Vec<f64>) -> BnResult<Self> {
        if !variable.is_enumerable() {
            return Err(bn_err!(InvalidDomain: "dirichlet variable '{}' is not enumerable", variable.name()));
        }
        if alpha.len() != variable.cardinality() {
            return Err(bn_err!(InvalidDomain: "dirichlet alpha length {} != domain size {}", alpha.len(), variable.cardinality()));
        }
        if alpha.iter().any(|a| !a.is_finite() || *a <= 0.0) {
            return Err(bn_err!(InvalidModel: "dirichlet alpha components must be positive"));
        }
        Ok(Dirichlet { variable, alpha })
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn density(&self, p: &[f64]) -> BnResult<f64> {
        if p.len() != self.alpha.len() {
            return Err(bn_err!(InvalidDomain: "dirichlet point dimension {} != {}", p.len(), self.alpha.len()));
        }
        let sum: f64 = p.iter().sum();
        if (sum - 1.0).abs() > 1e-6 || p.iter().any(|x| *x < 0.0) {
            return Ok(0.0);
        }
        let alpha_sum: f64 = self.alpha.iter().sum();
        let log_norm = ln_gamma(alpha_sum) - self.alpha.iter().map(|a| ln_gamma(*a)).sum::<f64>();
        let log_kernel: f64 = self
            .alpha
            .iter()
            .zip(p.iter())
            .map(|(a, x)| (a - 1.0) * x.max(1e-300).ln())
            .sum();
        Ok((log_norm + log_kernel).exp())
    }

    /// Draw by sampling independent Gamma(α_i, 1) and normalising.
    pub fn sample(&self, rng: &mut BnRng) -> Vec<f64> {
        let draws: Vec<f64> = self
            .alpha
            .iter()
            .map(|a| Gamma::new(*a, 1.0).unwrap().sample(rng))
            .collect();
        let total: f64 = draws.iter().sum::<f64>().max(1e-300);
        draws.into_iter().map(|d| d / total).collect()
    }

    /// Maximum-likelihood estimate of α from a batch of observed
    /// probability vectors (each a point on the simplex), by damped Newton
    /// on the digamma-matched sufficient statistic (mean log-probability
    /// per component). Converges when the gradient's l2-norm drops below
    /// 2^-20 or the step's effective learning rate drops below 2^-10.
    pub fn fit(variable: Variable, observations: &[Vec<f64>]) -> BnResult<Self> {
        let k = variable.cardinality();
        if observations.is_empty() {
            return Err(bn_err!(InvalidModel: "dirichlet MLE needs at least one observation"));
        }
        for obs in observations {
            if obs.len() != k {
                return Err(bn_err!(InvalidDomain: "observation dimension {} != domain size {}", obs.len(), k));
            }
        }

        let n = observations.len() as f64;
        let mean_log_p: Vec<f64> = (0..k)
            .map(|i| observations.iter().map(|o| o[i].max(1e-300).ln()).sum::<f64>() / n)
            .collect();

        // Initialise via a crude method-of-moments-free heuristic: alpha_k = 1.
        let mut alpha = vec![1.0f64; k];

        for _ in 0..MAX_ITERS {
            let alpha_sum: f64 = alpha.iter().sum();
            let psi_sum = digamma(alpha_sum);
            let grad: Vec<f64> = (0..k)
                .map(|i| n * (psi_sum - digamma(alpha[i]) + mean_log_p[i]))
                .collect();

            let grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if grad_norm < GRADIENT_TOL {
                break;
            }

            let q: Vec<f64> = alpha.iter().map(|a| -n * trigamma(*a)).collect();
            let z = n * trigamma(alpha_sum);

            let sum_g_over_q: f64 = grad.iter().zip(q.iter()).map(|(g, qi)| g / qi).sum();
            let sum_inv_q: f64 = q.iter().map(|qi| 1.0 / qi).sum();
            let b = sum_g_over_q / (1.0 / z + sum_inv_q);

            let mut max_step_ratio = 0.0f64;
            for i in 0..k {
                let delta = (grad[i] - b) / q[i];
                let mut next = alpha[i] - delta;
                if next <= 0.0 {
                    // Newton overshoot past the feasible region: damp by half.
                    next = alpha[i] / 2.0;
                }
                max_step_ratio = max_step_ratio.max((next - alpha[i]).abs() / alpha[i]);
                alpha[i] = next;
            }
            if max_step_ratio < LEARN_RATE_TOL {
                break;
            }
        }

        Dirichlet::new(variable, alpha)
    }
}

fn ln_gamma(x: f64) -> f64 {
    // Re-derive locally to avoid a cross-module private dependency; same
    // Lanczos approximation as the Gamma distribution's density.
    const COEFFS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    if x < 0.5 {
        (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut a = COEFFS[0];
        let t = x + 7.5;
        for (i, c) in COEFFS.iter().enumerate().skip(1) {
            a += c / (x + i as f64);
        }
        0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Domain;
    use std::sync::Arc;

    fn var3() -> Variable {
        Variable::enumerable("p", Arc::new(Domain::range("p", 3)))
    }

    #[test]
    fn sample_mean_matches_alpha_over_sum() {
        let d = Dirichlet::new(var3(), vec![2.0, 3.0, 5.0]).unwrap();
        let mut rng = BnRng::seeded(11);
        let n = 20_000;
        let mut acc = vec![0.0; 3];
        for _ in 0..n {
            let s = d.sample(&mut rng);
            for i in 0..3 {
                acc[i] += s[i];
            }
        }
        let total_alpha: f64 = d.alpha().iter().sum();
        for i in 0..3 {
            let mean = acc[i] / n as f64;
            let expected = d.alpha()[i] / total_alpha;
            assert!((mean - expected).abs() < 0.02, "component {i}: {mean} vs {expected}");
        }
    }

    #[test]
    fn fit_recovers_generating_alpha_in_the_large_sample_limit() {
        let true_alpha = vec![4.0, 2.0, 6.0];
        let truth = Dirichlet::new(var3(), true_alpha.clone()).unwrap();
        let mut rng = BnRng::seeded(99);
        let obs: Vec<Vec<f64>> = (0..5000).map(|_| truth.sample(&mut rng)).collect();
        let fitted = Dirichlet::fit(var3(), &obs).unwrap();
        for (a, b) in fitted.alpha().iter().zip(true_alpha.iter()) {
            assert!((a - b).abs() / b < 0.2, "fitted {a} vs true {b}");
        }
    }

    #[test]
    fn rejects_mismatched_dimension() {
        assert!(Dirichlet::new(var3(), vec![1.0, 1.0]).is_err());
    }
}
