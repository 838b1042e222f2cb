use crate::rng::BnRng;
use bn_error::{BnResult, bn_err};
use rand_distr::{Distribution as _, Gamma as GammaDist};

/// Lanczos approximation to `ln(Γ(x))`, g=7, n=9 coefficients.
fn ln_gamma(x: f64) -> f64 {
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
        // reflection formula
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

/// Gamma(shape k, scale θ), parametrised as in the common scale form
/// (mean = kθ, variance = kθ²).
#[derive(Clone, Copy, Debug)]
pub struct Gamma {
    shape: f64,
    scale: f64,
}

impl Gamma {
    pub fn new(shape: f64, scale: f64) -> BnResult<Self> {
        if !(shape.is_finite() && shape > 0.0) {
            return Err(bn_err!(InvalidModel: "gamma shape must be positive, got {}", shape));
        }
        if !(scale.is_finite() && scale > 0.0) {
            return Err(bn_err!(InvalidModel: "gamma scale must be positive, got {}", scale));
        }
        Ok(Gamma { shape, scale })
    }

    pub fn shape(&self) -> f64 {
        self.shape
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn density(&self, x: f64) -> BnResult<f64> {
        if x < 0.0 {
            return Ok(0.0);
        }
        if x == 0.0 {
            return Ok(if self.shape < 1.0 { f64::INFINITY } else if self.shape == 1.0 { 1.0 / self.scale } else { 0.0 });
        }
        let log_density = (self.shape - 1.0) * x.ln() - x / self.scale
            - self.shape * self.scale.ln()
            - ln_gamma(self.shape);
        Ok(log_density.exp())
    }

    pub fn sample(&self, rng: &mut BnRng) -> f64 {
        let dist = GammaDist::new(self.shape, self.scale).expect("validated shape/scale");
        dist.sample(rng.inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_is_nonnegative_and_finite_away_from_zero() {
        let g = Gamma::new(2.0, 1.0).unwrap();
        assert!(g.density(1.0).unwrap() > 0.0);
        assert!(g.density(1.0).unwrap().is_finite());
        assert_eq!(g.density(-1.0).unwrap(), 0.0);
    }

    #[test]
    fn exponential_special_case_matches_closed_form() {
        // Gamma(1, theta) is Exponential(1/theta): density(x) = exp(-x/theta)/theta
        let g = Gamma::new(1.0, 2.0).unwrap();
        let expected = (-1.5f64 / 2.0).exp() / 2.0;
        assert!((g.density(1.5).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn rejects_nonpositive_params() {
        assert!(Gamma::new(0.0, 1.0).is_err());
        assert!(Gamma::new(1.0, -1.0).is_err());
    }
}
