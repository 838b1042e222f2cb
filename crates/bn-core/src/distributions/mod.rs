//! Leaf probability objects: categorical, Gaussian, Gamma, Dirichlet, and
//! mixtures of any of the above.
//!
//! Polymorphism is a tagged variant (`Dist`) rather than a trait object,
//! since the inference driver needs to pattern-match on the concrete kind
//! (e.g. to build a JDF mixture or to read off Gaussian parameters) far
//! more often than it needs dynamic dispatch.

mod categorical;
mod dirichlet;
mod gamma;
mod gaussian;
mod mixture;

pub use categorical::Categorical;
pub use dirichlet::Dirichlet;
pub use gamma::Gamma;
pub use gaussian::{Gaussian, VariancePolicy};
pub use mixture::Mixture;

use crate::rng::BnRng;
use crate::variable::Variable;
use bn_error::BnResult;

/// A concrete leaf distribution. Variants share a `get`/`sample` capability
/// set; `Mixture` is guaranteed flat (no `Mixture` ever appears inside
/// another `Mixture`'s components) by construction.
#[derive(Clone, Debug)]
pub enum Dist {
    Categorical(Categorical),
    Gaussian(Gaussian),
    Gamma(Gamma),
    Dirichlet(Dirichlet),
    Mixture(Mixture),
}

impl Dist {
    /// Mass (categorical) or density (continuous) at `value`.
    ///
    /// `value` is an enumerable-domain index for `Categorical`, a scalar
    /// for `Gaussian`/`Gamma`, and a probability vector for `Dirichlet`.
    pub fn get(&self, value: &Value) -> BnResult<f64> {
        match self {
            Dist::Categorical(c) => c.get(value.as_index()?),
            Dist::Gaussian(g) => Ok(g.density(value.as_scalar()?)),
            Dist::Gamma(g) => g.density(value.as_scalar()?),
            Dist::Dirichlet(d) => d.density(value.as_vector()?),
            Dist::Mixture(m) => m.get(value),
        }
    }

    pub fn sample(&self, rng: &mut BnRng) -> Value {
        match self {
            Dist::Categorical(c) => Value::Index(c.sample(rng)),
            Dist::Gaussian(g) => Value::Scalar(g.sample(rng)),
            Dist::Gamma(g) => Value::Scalar(g.sample(rng)),
            Dist::Dirichlet(d) => Value::Vector(d.sample(rng)),
            Dist::Mixture(m) => m.sample(rng),
        }
    }

    pub fn variable(&self) -> Option<&Variable> {
        match self {
            Dist::Categorical(c) => Some(c.variable()),
            Dist::Gaussian(_) | Dist::Gamma(_) | Dist::Dirichlet(_) => None,
            Dist::Mixture(m) => m.variable(),
        }
    }

    /// Minimal line-oriented text form for a single node's distribution.
    /// Only the two node-level CPT kinds (`Categorical`, `Gaussian`) round
    /// trip through text; the remaining kinds are reachable only as JDF
    /// payloads, never as a persisted node by themselves.
    pub fn as_text(&self) -> BnResult<String> {
        match self {
            Dist::Categorical(c) => Ok(c.as_text()),
            Dist::Gaussian(g) => Ok(g.as_text()),
            other => Err(bn_error::bn_err!(InvalidModel: "distribution kind {:?} has no text form", other)),
        }
    }

    /// Parse [`as_text`](Self::as_text)'s output. `variable` is only
    /// consulted for `Categorical` (its domain size validates the parsed
    /// weight count).
    pub fn from_text(variable: &Variable, text: &str) -> BnResult<Self> {
        if text.starts_with("categorical:") {
            Ok(Dist::Categorical(Categorical::from_text(variable.clone(), text)?))
        } else if text.starts_with("gaussian:") {
            Ok(Dist::Gaussian(Gaussian::from_text(text)?))
        } else {
            Err(bn_error::bn_err!(InvalidModel: "unrecognised distribution text record '{}'", text))
        }
    }
}

/// A value a [`Dist`] can be evaluated at or can produce by sampling.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Index(usize),
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    pub fn as_index(&self) -> BnResult<usize> {
        match self {
            Value::Index(i) => Ok(*i),
            _ => Err(bn_error::bn_err!(InvalidDomain: "expected an enumerable index value")),
        }
    }

    pub fn as_scalar(&self) -> BnResult<f64> {
        match self {
            Value::Scalar(x) => Ok(*x),
            _ => Err(bn_error::bn_err!(InvalidDomain: "expected a scalar value")),
        }
    }

    pub fn as_vector(&self) -> BnResult<&[f64]> {
        match self {
            Value::Vector(v) => Ok(v),
            _ => Err(bn_error::bn_err!(InvalidDomain: "expected a probability-vector value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Domain;
    use std::sync::Arc;

    #[test]
    fn categorical_round_trips_through_text() {
        let v = Variable::enumerable("x", Arc::new(Domain::boolean("x")));
        let dist = Dist::Categorical(Categorical::new(v.clone(), vec![0.3, 0.7]).unwrap());
        let text = dist.as_text().unwrap();
        let parsed = Dist::from_text(&v, &text).unwrap();
        assert!((dist.get(&Value::Index(1)).unwrap() - parsed.get(&Value::Index(1)).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn gamma_has_no_text_form() {
        let dist = Dist::Gamma(Gamma::new(2.0, 1.0).unwrap());
        assert!(dist.as_text().is_err());
    }
}
