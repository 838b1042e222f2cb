use super::{Dist, Value};
use crate::rng::BnRng;
use crate::variable::Variable;
use rand::Rng;
use std::sync::Arc;

struct Component {
    dist: Arc<Dist>,
    weight: f64,
}

impl Clone for Component {
    fn clone(&self) -> Self {
        Component {
            dist: self.dist.clone(),
            weight: self.weight,
        }
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component").field("weight", &self.weight).finish()
    }
}

/// A weighted mixture of distributions. Guaranteed flat: constructing a
/// mixture over a component that is itself a `Dist::Mixture` absorbs that
/// component's own components (weighted by the outer weight) instead of
/// nesting, so `Dist::Mixture` never contains another `Dist::Mixture`.
#[derive(Clone, Debug, Default)]
pub struct Mixture {
    components: Vec<Component>,
}

impl Mixture {
    pub fn new() -> Self {
        Mixture { components: Vec::new() }
    }

    /// A single-component mixture, flattening immediately if `dist` is
    /// itself a mixture.
    pub fn of(dist: Arc<Dist>, weight: f64) -> Self {
        let mut m = Mixture::new();
        m.insert(dist, weight);
        m
    }

    /// Add one more weighted component, flattening if it is itself a mixture.
    pub fn add(&mut self, dist: Arc<Dist>, weight: f64) {
        self.insert(dist, weight);
    }

    fn insert(&mut self, dist: Arc<Dist>, weight: f64) {
        if let Dist::Mixture(inner) = dist.as_ref() {
            for c in &inner.components {
                self.insert(c.dist.clone(), c.weight * weight);
            }
            return;
        }
        if let Some(existing) = self.components.iter_mut().find(|c| Arc::ptr_eq(&c.dist, &dist)) {
            existing.weight += weight;
        } else {
            self.components.push(Component { dist, weight });
        }
    }

    /// Merge another mixture's components into this one, summing weights
    /// for components that are the same underlying distribution instance.
    pub fn merge(mut self, other: Mixture) -> Self {
        for c in other.components {
            self.insert(c.dist, c.weight);
        }
        self
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }

    fn total_weight(&self) -> f64 {
        self.components.iter().map(|c| c.weight).sum()
    }

    pub fn get(&self, value: &Value) -> bn_error::BnResult<f64> {
        let total = self.total_weight();
        if total <= 0.0 {
            return Ok(0.0);
        }
        let mut acc = 0.0;
        for c in &self.components {
            acc += c.weight * c.dist.get(value)?;
        }
        Ok(acc / total)
    }

    pub fn sample(&self, rng: &mut BnRng) -> Value {
        let total = self.total_weight().max(1e-300);
        let u: f64 = rng.inner().random::<f64>() * total;
        let mut acc = 0.0;
        for c in &self.components {
            acc += c.weight;
            if u < acc {
                return c.dist.sample(rng);
            }
        }
        self.components.last().expect("non-empty mixture").dist.sample(rng)
    }

    /// The shared enumerable variable, if every component agrees on one.
    pub fn variable(&self) -> Option<&Variable> {
        let mut iter = self.components.iter();
        let first = iter.next()?.dist.variable()?;
        for c in iter {
            if c.dist.variable()? != first {
                return None;
            }
        }
        Some(first)
    }
}

impl std::ops::Add for Mixture {
    type Output = Mixture;
    fn add(self, rhs: Mixture) -> Mixture {
        self.merge(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Gaussian;

    fn g(mean: f64) -> Arc<Dist> {
        Arc::new(Dist::Gaussian(Gaussian::new(mean, 1.0).unwrap()))
    }

    #[test]
    fn flattens_on_nested_insertion() {
        let g1 = g(0.0);
        let g2 = g(1.0);
        let g3 = g(2.0);

        let m1 = Mixture::of(g1.clone(), 1.0) + Mixture::of(g2.clone(), 2.5);
        let m1_dist = Arc::new(Dist::Mixture(m1));

        let m2 = Mixture::of(m1_dist, 1.0) + Mixture::of(g1, 0.5) + Mixture::of(g3, 2.0);

        assert_eq!(m2.component_count(), 3);
        let mut weights = m2.weights();
        weights.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(weights, vec![1.5, 2.0, 2.5]);
    }

    #[test]
    fn no_mixture_of_mixture_in_components() {
        let inner = Mixture::of(g(0.0), 1.0);
        let inner_dist = Arc::new(Dist::Mixture(inner));
        let outer = Mixture::of(inner_dist, 3.0);
        for c in &outer.components {
            assert!(!matches!(c.dist.as_ref(), Dist::Mixture(_)));
        }
    }
}
