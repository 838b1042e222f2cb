//! Joint density fragment: a per-cell mapping from non-enumerable variables
//! to their conditional distribution, with mixture composition used when
//! several source cells collapse into one destination cell.

use crate::distributions::{Dist, Mixture};
use crate::variable::Variable;
use bn_error::{BnResult, bn_err};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct Jdf {
    map: BTreeMap<Variable, Arc<Dist>>,
}

impl Jdf {
    pub fn new() -> Self {
        Jdf { map: BTreeMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn scope(&self) -> impl Iterator<Item = &Variable> {
        self.map.keys()
    }

    pub fn get(&self, var: &Variable) -> Option<&Arc<Dist>> {
        self.map.get(var)
    }

    pub fn insert(&mut self, var: Variable, dist: Arc<Dist>) -> BnResult<()> {
        if !var.is_continuous() {
            return Err(bn_err!(InvalidDomain: "JDF variable '{}' must be non-enumerable", var.name()));
        }
        self.map.insert(var, dist);
        Ok(())
    }

    pub fn single(var: Variable, dist: Arc<Dist>) -> BnResult<Self> {
        let mut j = Jdf::new();
        j.insert(var, dist)?;
        Ok(j)
    }

    /// Weight-normalised mixture of a set of source JDFs (cells that
    /// collapsed into one destination cell during sum-marginalisation or
    /// a product). Sources with non-positive weight contribute nothing;
    /// a variable present in only some sources is mixed only over those.
    pub fn mix(sources: &[(f64, &Jdf)]) -> Jdf {
        let mut acc: BTreeMap<Variable, Mixture> = BTreeMap::new();
        for (w, jdf) in sources {
            if *w <= 0.0 {
                continue;
            }
            for (var, dist) in jdf.map.iter() {
                acc.entry(var.clone())
                    .or_insert_with(Mixture::new)
                    .add(dist.clone(), *w);
            }
        }
        Jdf {
            map: acc
                .into_iter()
                .map(|(v, m)| (v, Arc::new(Dist::Mixture(m))))
                .collect(),
        }
    }

    /// Product of two JDFs over disjoint (or overlapping-by-identity)
    /// scopes: a variable present in both must carry the same distribution
    /// instance (two conditional density tables can never both emit a
    /// fragment for the same continuous variable without one of them
    /// restricting first), so this simply unions the two maps.
    pub fn union(&self, other: &Jdf) -> BnResult<Jdf> {
        let mut merged = self.map.clone();
        for (var, dist) in &other.map {
            if merged.contains_key(var) {
                return Err(bn_err!(InvalidModel: "JDF variable '{}' defined by two factors being multiplied", var.name()));
            }
            merged.insert(var.clone(), dist.clone());
        }
        Ok(Jdf { map: merged })
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
    fn mix_skips_zero_weight_sources() {
        let v = Variable::continuous("x");
        let j1 = Jdf::single(v.clone(), g(0.0)).unwrap();
        let j2 = Jdf::single(v.clone(), g(5.0)).unwrap();
        let mixed = Jdf::mix(&[(1.0, &j1), (0.0, &j2)]);
        let dist = mixed.get(&v).unwrap();
        if let Dist::Mixture(m) = dist.as_ref() {
            assert_eq!(m.component_count(), 1);
        } else {
            panic!("expected mixture");
        }
    }

    #[test]
    fn union_rejects_overlapping_scope() {
        let v = Variable::continuous("x");
        let j1 = Jdf::single(v.clone(), g(0.0)).unwrap();
        let j2 = Jdf::single(v, g(1.0)).unwrap();
        assert!(j1.union(&j2).is_err());
    }
}
