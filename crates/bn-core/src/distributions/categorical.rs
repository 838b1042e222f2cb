use crate::rng::BnRng;
use crate::variable::Variable;
use bn_error::{BnResult, bn_err};
use rand::Rng;

/// A normalised probability vector over an enumerable variable's domain.
#[derive(Clone, Debug)]
pub struct Categorical {
    variable: Variable,
    p: Vec<f64>,
}

impl Categorical {
    /// Build a categorical from raw (not necessarily normalised) weights,
    /// one per domain value.
    pub fn new(variable: Variable, weights: Vec<f64>) -> BnResult<Self> {
        if !variable.is_enumerable() {
            return Err(bn_err!(InvalidDomain: "categorical variable '{}' is not enumerable", variable.name()));
        }
        if weights.len() != variable.cardinality() {
            return Err(bn_err!(InvalidDomain: "categorical weight count {} != domain size {} for '{}'", weights.len(), variable.cardinality(), variable.name()));
        }
        let mut c = Categorical { variable, p: weights };
        c.normalise()?;
        Ok(c)
    }

    /// Uniform distribution over the variable's domain.
    pub fn uniform(variable: Variable) -> BnResult<Self> {
        let k = variable.cardinality();
        Categorical::new(variable, vec![1.0 / k as f64; k])
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    pub fn probs(&self) -> &[f64] {
        &self.p
    }

    pub fn get(&self, index: usize) -> BnResult<f64> {
        self.p
            .get(index)
            .copied()
            .ok_or_else(|| bn_err!(InvalidDomain: "index {} out of range for '{}'", index, self.variable.name()))
    }

    pub fn set(&mut self, index: usize, p: f64) -> BnResult<()> {
        if index >= self.p.len() {
            return Err(bn_err!(InvalidDomain: "index {} out of range for '{}'", index, self.variable.name()));
        }
        self.p[index] = p;
        Ok(())
    }

    /// Rescale in place so probabilities are non-negative and sum to 1.
    pub fn normalise(&mut self) -> BnResult<()> {
        let sum: f64 = self.p.iter().sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(bn_err!(InvalidModel: "categorical '{}' has non-positive total weight {}", self.variable.name(), sum));
        }
        for p in &mut self.p {
            if *p < 0.0 {
                return Err(bn_err!(InvalidModel: "categorical '{}' has negative weight {}", self.variable.name(), p));
            }
            *p /= sum;
        }
        Ok(())
    }

    pub fn sample(&self, rng: &mut BnRng) -> usize {
        let u: f64 = rng.inner().random::<f64>();
        let mut acc = 0.0;
        for (i, p) in self.p.iter().enumerate() {
            acc += p;
            if u < acc {
                return i;
            }
        }
        self.p.len() - 1
    }

    /// Line-oriented text form: `categorical:p0,p1,...`.
    pub fn as_text(&self) -> String {
        let values: Vec<String> = self.p.iter().map(|p| p.to_string()).collect();
        format!("categorical:{}", values.join(","))
    }

    /// Parse [`as_text`](Self::as_text)'s output back into a `Categorical`
    /// over `variable`.
    pub fn from_text(variable: Variable, text: &str) -> BnResult<Self> {
        let body = text
            .strip_prefix("categorical:")
            .ok_or_else(|| bn_err!(InvalidModel: "expected a 'categorical:' text record, got '{}'", text))?;
        let weights: Result<Vec<f64>, _> = body.split(',').map(|s| s.trim().parse::<f64>()).collect();
        let weights = weights.map_err(|_| bn_err!(InvalidModel: "malformed categorical weights in '{}'", text))?;
        Categorical::new(variable, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Domain;
    use std::sync::Arc;

    #[test]
    fn normalise_sums_to_one() {
        let v = Variable::enumerable("x", Arc::new(Domain::range("x", 3)));
        let c = Categorical::new(v, vec![1.0, 2.0, 3.0]).unwrap();
        let total: f64 = c.probs().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((c.get(2).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_total_weight_is_invalid() {
        let v = Variable::enumerable("x", Arc::new(Domain::range("x", 2)));
        assert!(Categorical::new(v, vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn sample_is_within_domain() {
        let v = Variable::enumerable("x", Arc::new(Domain::range("x", 4)));
        let c = Categorical::uniform(v).unwrap();
        let mut rng = BnRng::seeded(7);
        for _ in 0..50 {
            assert!(c.sample(&mut rng) < 4);
        }
    }

    #[test]
    fn text_round_trips() {
        let v = Variable::enumerable("x", Arc::new(Domain::range("x", 3)));
        let c = Categorical::new(v.clone(), vec![1.0, 2.0, 3.0]).unwrap();
        let text = c.as_text();
        let parsed = Categorical::from_text(v, &text).unwrap();
        for i in 0..3 {
            assert!((c.get(i).unwrap() - parsed.get(i).unwrap()).abs() < 1e-9);
        }
    }
}
