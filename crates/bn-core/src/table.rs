//! Dense rectangular tables keyed by a tuple of enumerable values.
//!
//! `Table<T>` is the storage primitive shared by conditional tables, count
//! tables, and factor cells: index = Σ kᵢ · strideᵢ, with the first
//! variable varying fastest (row-major, stride[0] = 1).

use crate::variable::Variable;
use bn_error::{BnResult, bn_err};

fn strides_of(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    let mut acc = 1usize;
    for (i, &d) in dims.iter().enumerate() {
        strides[i] = acc;
        acc = acc.saturating_mul(d.max(1));
    }
    strides
}

/// Dense map from `Dom(V1) x ... x Dom(Vn)` to a payload `T`, with a
/// presence bit per cell (`None` = absent).
#[derive(Clone, Debug)]
pub struct Table<T> {
    vars: Vec<Variable>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    cells: Vec<Option<T>>,
}

impl<T> Table<T> {
    /// Build an empty (all-absent) table over `vars`, in the given order.
    /// Every variable must be enumerable.
    pub fn new(vars: Vec<Variable>) -> BnResult<Self> {
        for v in &vars {
            if !v.is_enumerable() {
                return Err(bn_err!(InvalidDomain: "table variable '{}' has no enumerable domain", v.name()));
            }
        }
        let dims: Vec<usize> = vars.iter().map(Variable::cardinality).collect();
        let strides = strides_of(&dims);
        let size = dims.iter().product::<usize>().max(1);
        Ok(Table {
            vars,
            dims,
            strides,
            cells: (0..size).map(|_| None).collect(),
        })
    }

    pub fn vars(&self) -> &[Variable] {
        &self.vars
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Flatten a fully-specified key (one value index per variable, in
    /// table order) into a linear cell index.
    pub fn index(&self, key: &[usize]) -> BnResult<usize> {
        if key.len() != self.vars.len() {
            return Err(bn_err!(InvalidDomain: "key length {} != table arity {}", key.len(), self.vars.len()));
        }
        let mut idx = 0usize;
        for (i, &k) in key.iter().enumerate() {
            if k >= self.dims[i].max(1) {
                return Err(bn_err!(InvalidDomain: "value {} out of range for variable '{}' (domain size {})", k, self.vars[i].name(), self.dims[i]));
            }
            idx += k * self.strides[i];
        }
        Ok(idx)
    }

    /// Inverse of [`Table::index`]: recover the per-variable key from a
    /// linear cell index.
    pub fn key(&self, index: usize) -> Vec<usize> {
        let mut key = vec![0usize; self.vars.len()];
        for i in (0..self.vars.len()).rev() {
            let d = self.dims[i].max(1);
            key[i] = (index / self.strides[i]) % d;
        }
        key
    }

    pub fn get_value(&self, index: usize) -> Option<&T> {
        self.cells.get(index).and_then(Option::as_ref)
    }

    pub fn get_value_mut(&mut self, index: usize) -> Option<&mut T> {
        self.cells.get_mut(index).and_then(Option::as_mut)
    }

    pub fn set_value(&mut self, index: usize, value: T) -> BnResult<()> {
        let slot = self
            .cells
            .get_mut(index)
            .ok_or_else(|| bn_err!(InvalidDomain: "invalid key: index {} out of range", index))?;
        *slot = Some(value);
        Ok(())
    }

    pub fn get(&self, key: &[usize]) -> BnResult<Option<&T>> {
        Ok(self.get_value(self.index(key)?))
    }

    pub fn set(&mut self, key: &[usize], value: T) -> BnResult<()> {
        let idx = self.index(key)?;
        self.set_value(idx, value)
    }

    /// All linearised indices whose non-wildcard positions of `partial_key`
    /// match, walking strides rather than scanning all cells.
    /// `partial_key[i] = None` means "wildcard" at variable position `i`.
    pub fn indices_matching(&self, partial_key: &[Option<usize>]) -> BnResult<Vec<usize>> {
        if partial_key.len() != self.vars.len() {
            return Err(bn_err!(InvalidDomain: "partial key length {} != table arity {}", partial_key.len(), self.vars.len()));
        }

        let mut fixed_base = 0usize;
        let mut free_axes = Vec::new();
        for (i, k) in partial_key.iter().enumerate() {
            match k {
                Some(v) => {
                    if *v >= self.dims[i].max(1) {
                        return Err(bn_err!(InvalidDomain: "value {} out of range for variable '{}'", v, self.vars[i].name()));
                    }
                    fixed_base += v * self.strides[i];
                }
                None => free_axes.push(i),
            }
        }

        if free_axes.is_empty() {
            return Ok(vec![fixed_base]);
        }

        let free_dims: Vec<usize> = free_axes.iter().map(|&i| self.dims[i].max(1)).collect();
        let total: usize = free_dims.iter().product();
        let mut out = Vec::with_capacity(total);
        let mut counters = vec![0usize; free_axes.len()];
        for _ in 0..total {
            let mut idx = fixed_base;
            for (k, &axis) in free_axes.iter().enumerate() {
                idx += counters[k] * self.strides[axis];
            }
            out.push(idx);

            for k in 0..counters.len() {
                counters[k] += 1;
                if counters[k] < free_dims[k] {
                    break;
                }
                counters[k] = 0;
            }
        }
        Ok(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|v| (i, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Domain;
    use std::sync::Arc;

    fn vars() -> Vec<Variable> {
        vec![
            Variable::enumerable("a", Arc::new(Domain::range("a", 2))),
            Variable::enumerable("b", Arc::new(Domain::range("b", 3))),
        ]
    }

    #[test]
    fn index_key_roundtrip() {
        let t: Table<f64> = Table::new(vars()).unwrap();
        for idx in 0..t.size() {
            let key = t.key(idx);
            assert_eq!(t.index(&key).unwrap(), idx);
        }
    }

    #[test]
    fn set_get() {
        let mut t: Table<f64> = Table::new(vars()).unwrap();
        t.set(&[1, 2], 0.5).unwrap();
        assert_eq!(*t.get(&[1, 2]).unwrap().unwrap(), 0.5);
        assert!(t.get(&[0, 0]).unwrap().is_none());
    }

    #[test]
    fn indices_matching_wildcard() {
        let t: Table<f64> = Table::new(vars()).unwrap();
        // a=1, b=wildcard -> 3 matches
        let matches = t.indices_matching(&[Some(1), None]).unwrap();
        assert_eq!(matches.len(), 3);
        for idx in matches {
            let key = t.key(idx);
            assert_eq!(key[0], 1);
        }
    }

    #[test]
    fn out_of_range_is_invalid_domain() {
        let t: Table<f64> = Table::new(vars()).unwrap();
        assert!(t.get(&[5, 0]).is_err());
    }
}
