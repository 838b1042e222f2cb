//! Factors: a table over a set of enumerable "key" variables whose cells
//! carry a non-negative weight, an optional joint density fragment over
//! non-enumerable variables, and an optional assignment trace used to read
//! off a most-probable-explanation after max-marginalisation.

pub mod jdf;
mod product;

pub use jdf::Jdf;
pub use product::{JoinStrategy, build_product_tree};

use crate::table::Table;
use crate::variable::Variable;
use bn_error::{BnResult, bn_err};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An ordered set of (variable, domain-index) assignments, accumulated by
/// products and consumed by `max_out` / MPE read-off. Dropped on `sum_out`
/// (meaningless once cells have been mixed).
pub type Trace = BTreeMap<Variable, usize>;

#[derive(Clone, Debug)]
pub struct Cell {
    pub weight: f64,
    pub jdf: Option<Jdf>,
    pub trace: Option<Trace>,
}

impl Cell {
    pub fn zero() -> Self {
        Cell {
            weight: 0.0,
            jdf: None,
            trace: None,
        }
    }

    pub fn new(weight: f64) -> BnResult<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(bn_err!(InvalidModel: "factor cell weight must be finite and non-negative, got {}", weight));
        }
        Ok(Cell {
            weight,
            jdf: None,
            trace: None,
        })
    }

    pub fn with_jdf(mut self, jdf: Jdf) -> Self {
        self.jdf = Some(jdf);
        self
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = Some(trace);
        self
    }
}

/// A factor over key variables `E(F)` with cells carrying weight (+ JDF +
/// trace). `E(F)` is kept sorted by canonical index, the universal sort
/// key every algebra operation relies on.
#[derive(Clone, Debug)]
pub struct Factor {
    table: Table<Cell>,
}

impl Factor {
    /// Build a factor from explicit per-cell weights, one per point of
    /// `Dom(key_vars[0]) x ... x Dom(key_vars[n-1])` in that order. Key
    /// variables are re-sorted by canonical index; `weights` must already
    /// be laid out in the *sorted* order's stride convention.
    pub fn from_weights(mut key_vars: Vec<Variable>, weights: Vec<f64>) -> BnResult<Self> {
        key_vars.sort();
        let mut table = Table::new(key_vars)?;
        if weights.len() != table.size() {
            return Err(bn_err!(InvalidModel: "factor weight count {} != table size {}", weights.len(), table.size()));
        }
        for (i, w) in weights.into_iter().enumerate() {
            table.set_value(i, Cell::new(w)?)?;
        }
        Ok(Factor { table })
    }

    pub fn from_cells(mut key_vars: Vec<Variable>, cells: Vec<Cell>) -> BnResult<Self> {
        key_vars.sort();
        let mut table = Table::new(key_vars)?;
        if cells.len() != table.size() {
            return Err(bn_err!(InvalidModel: "factor cell count {} != table size {}", cells.len(), table.size()));
        }
        for (i, c) in cells.into_iter().enumerate() {
            table.set_value(i, c)?;
        }
        Ok(Factor { table })
    }

    /// The atomic (no key variables, single scalar-weight cell) factor —
    /// the identity element returned when all variables are summed out of
    /// a scalar factor, or the base case of an empty product.
    pub fn atomic(weight: f64) -> BnResult<Self> {
        Factor::from_weights(Vec::new(), vec![weight])
    }

    pub fn scope(&self) -> &[Variable] {
        self.table.vars()
    }

    pub fn size(&self) -> usize {
        self.table.size()
    }

    pub fn cell(&self, index: usize) -> &Cell {
        self.table
            .get_value(index)
            .expect("factor cells are always fully populated")
    }

    pub fn key_of(&self, index: usize) -> Vec<usize> {
        self.table.key(index)
    }

    pub fn index_of(&self, key: &[usize]) -> BnResult<usize> {
        self.table.index(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Cell)> {
        (0..self.size()).map(|i| (i, self.cell(i)))
    }

    /// Union, across all cells, of the non-enumerable variables carried in
    /// some cell's JDF.
    pub fn continuous_scope(&self) -> Vec<Variable> {
        let mut vars: Vec<Variable> = self
            .iter()
            .flat_map(|(_, c)| c.jdf.iter().flat_map(|j| j.scope().cloned()))
            .collect();
        vars.sort();
        vars.dedup();
        vars
    }

    pub fn product(&self, other: &Factor) -> BnResult<Factor> {
        product::product(self, other, None)
    }

    /// Remove `vars` from the key scope, summing weights of source cells
    /// that project to the same destination key and mixing their JDFs.
    /// Trace is dropped (meaningless after mixing). Returns an atomic
    /// factor if every key variable is removed.
    pub fn sum_out(&self, vars: &[Variable]) -> BnResult<Factor> {
        let removed: Vec<&Variable> = vars.iter().collect();
        let keep: Vec<Variable> = self
            .scope()
            .iter()
            .filter(|v| !removed.contains(v))
            .cloned()
            .collect();

        if keep.is_empty() {
            let total: f64 = self.iter().map(|(_, c)| c.weight).sum();
            let sources: Vec<(f64, &Jdf)> = self
                .iter()
                .filter(|(_, c)| c.weight > 0.0)
                .filter_map(|(_, c)| c.jdf.as_ref().map(|j| (c.weight, j)))
                .collect();
            let jdf = if sources.is_empty() { None } else { Some(Jdf::mix(&sources)) };
            let mut cell = Cell::new(total)?;
            cell.jdf = jdf;
            return Factor::from_cells(Vec::new(), vec![cell]);
        }

        let keep_table: Table<()> = Table::new(keep.clone())?;
        let mut out_weights = vec![0.0f64; keep_table.size()];
        let mut out_sources: Vec<Vec<(f64, usize)>> = vec![Vec::new(); keep_table.size()];

        for (src_idx, cell) in self.iter() {
            let src_key = self.key_of(src_idx);
            let dest_key: Vec<usize> = keep
                .iter()
                .map(|v| {
                    let pos = self.scope().iter().position(|sv| sv == v).unwrap();
                    src_key[pos]
                })
                .collect();
            let dest_idx = keep_table.index(&dest_key)?;
            out_weights[dest_idx] += cell.weight;
            if cell.weight > 0.0 {
                out_sources[dest_idx].push((cell.weight, src_idx));
            }
        }

        let mut cells = Vec::with_capacity(keep_table.size());
        for (dest_idx, weight) in out_weights.into_iter().enumerate() {
            let mut cell = Cell::new(weight)?;
            let jdf_sources: Vec<(f64, &Jdf)> = out_sources[dest_idx]
                .iter()
                .filter_map(|(w, src_idx)| self.cell(*src_idx).jdf.as_ref().map(|j| (*w, j)))
                .collect();
            if !jdf_sources.is_empty() {
                cell.jdf = Some(Jdf::mix(&jdf_sources));
            }
            cells.push(cell);
        }

        Factor::from_cells(keep, cells)
    }

    /// Remove `vars` from the key scope, keeping for each destination cell
    /// the *maximum*-weight source cell and extending its trace with the
    /// eliminated variables' winning assignment. Ties break toward the
    /// lowest linearised source index.
    pub fn max_out(&self, vars: &[Variable]) -> BnResult<Factor> {
        let removed: Vec<&Variable> = vars.iter().collect();
        let keep: Vec<Variable> = self
            .scope()
            .iter()
            .filter(|v| !removed.contains(v))
            .cloned()
            .collect();

        if keep.is_empty() {
            let mut best_idx = 0usize;
            let mut best_weight = f64::NEG_INFINITY;
            for (idx, cell) in self.iter() {
                if cell.weight > best_weight {
                    best_weight = cell.weight;
                    best_idx = idx;
                }
            }
            let winner = self.cell(best_idx);
            let mut trace = winner.trace.clone().unwrap_or_default();
            let key = self.key_of(best_idx);
            for (v, k) in self.scope().iter().zip(key.iter()) {
                if removed.contains(&v) {
                    trace.insert(v.clone(), *k);
                }
            }
            let mut cell = Cell::new(best_weight.max(0.0))?;
            cell.jdf = winner.jdf.clone();
            cell.trace = Some(trace);
            return Factor::from_cells(Vec::new(), vec![cell]);
        }

        let keep_table: Table<()> = Table::new(keep.clone())?;
        let mut best: Vec<Option<(f64, usize)>> = vec![None; keep_table.size()];

        for (src_idx, cell) in self.iter() {
            let src_key = self.key_of(src_idx);
            let dest_key: Vec<usize> = keep
                .iter()
                .map(|v| {
                    let pos = self.scope().iter().position(|sv| sv == v).unwrap();
                    src_key[pos]
                })
                .collect();
            let dest_idx = keep_table.index(&dest_key)?;
            match &best[dest_idx] {
                Some((w, _)) if *w >= cell.weight => {}
                _ => best[dest_idx] = Some((cell.weight, src_idx)),
            }
        }

        let mut cells = Vec::with_capacity(keep_table.size());
        for slot in best {
            let (weight, src_idx) = slot.expect("every destination cell has at least one source");
            let winner = self.cell(src_idx);
            let mut trace = winner.trace.clone().unwrap_or_default();
            let src_key = self.key_of(src_idx);
            for (v, k) in self.scope().iter().zip(src_key.iter()) {
                if removed.contains(&v) {
                    trace.insert(v.clone(), *k);
                }
            }
            let mut cell = Cell::new(weight)?;
            cell.jdf = winner.jdf.clone();
            cell.trace = Some(trace);
            cells.push(cell);
        }

        Factor::from_cells(keep, cells)
    }

    /// Restrict to the subspace where `var` takes `value`, dropping `var`
    /// from the key scope (used to apply evidence). Unlike `sum_out`, no
    /// mixing happens — this simply discards the non-matching slice.
    pub fn restrict(&self, var: &Variable, value: usize) -> BnResult<Factor> {
        let pos = self
            .scope()
            .iter()
            .position(|v| v == var)
            .ok_or_else(|| bn_err!(InvalidDomain: "variable '{}' not in factor scope", var.name()))?;

        let keep: Vec<Variable> = self
            .scope()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .map(|(_, v)| v.clone())
            .collect();

        if keep.is_empty() {
            let mut key = vec![0usize; self.scope().len()];
            key[pos] = value;
            let idx = self.index_of(&key)?;
            return Factor::from_cells(Vec::new(), vec![self.cell(idx).clone()]);
        }

        let keep_table: Table<()> = Table::new(keep.clone())?;
        let mut cells = vec![Cell::zero(); keep_table.size()];
        for dest_idx in 0..keep_table.size() {
            let dest_key = keep_table.key(dest_idx);
            let mut src_key = vec![0usize; self.scope().len()];
            let mut k = 0;
            for (i, _) in self.scope().iter().enumerate() {
                if i == pos {
                    src_key[i] = value;
                } else {
                    src_key[i] = dest_key[k];
                    k += 1;
                }
            }
            let src_idx = self.index_of(&src_key)?;
            cells[dest_idx] = self.cell(src_idx).clone();
        }
        Factor::from_cells(keep, cells)
    }

    /// Rescale every weight so the total sums to 1. `EvidenceImpossible`
    /// if the total is zero (or non-finite).
    pub fn normalise(&mut self) -> BnResult<()> {
        let total: f64 = self.iter().map(|(_, c)| c.weight).sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(bn_err!(EvidenceImpossible: "factor total weight is {} (zero or non-finite)", total));
        }
        for idx in 0..self.size() {
            let w = self.cell(idx).weight / total;
            self.table.get_value_mut(idx).expect("present").weight = w;
        }
        Ok(())
    }

    pub fn total_weight(&self) -> f64 {
        self.iter().map(|(_, c)| c.weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Domain;
    use std::sync::Arc;

    fn bool_var(name: &str) -> Variable {
        Variable::enumerable(name, Arc::new(Domain::boolean(name)))
    }

    #[test]
    fn sum_out_all_vars_gives_atomic_factor() {
        let a = bool_var("a");
        let f = Factor::from_weights(vec![a.clone()], vec![0.3, 0.7]).unwrap();
        let out = f.sum_out(std::slice::from_ref(&a)).unwrap();
        assert!(out.scope().is_empty());
        assert!((out.cell(0).weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sum_out_commutes() {
        let a = bool_var("a");
        let b = bool_var("b");
        let f = Factor::from_weights(vec![a.clone(), b.clone()], vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let ab = f.sum_out(std::slice::from_ref(&a)).unwrap().sum_out(std::slice::from_ref(&b)).unwrap();
        let ba = f.sum_out(std::slice::from_ref(&b)).unwrap().sum_out(std::slice::from_ref(&a)).unwrap();
        assert!((ab.cell(0).weight - ba.cell(0).weight).abs() < 1e-9);
    }

    #[test]
    fn max_out_keeps_highest_weight_and_trace() {
        let a = bool_var("a");
        let f = Factor::from_weights(vec![a.clone()], vec![0.3, 0.7]).unwrap();
        let out = f.max_out(std::slice::from_ref(&a)).unwrap();
        assert!((out.cell(0).weight - 0.7).abs() < 1e-9);
        assert_eq!(*out.cell(0).trace.as_ref().unwrap().get(&a).unwrap(), 1);
    }

    #[test]
    fn normalise_divides_by_total_and_rejects_zero() {
        let a = bool_var("a");
        let mut f = Factor::from_weights(vec![a.clone()], vec![2.0, 2.0]).unwrap();
        f.normalise().unwrap();
        assert!((f.cell(0).weight - 0.5).abs() < 1e-9);

        let mut zero = Factor::from_weights(vec![a], vec![0.0, 0.0]).unwrap();
        assert!(zero.normalise().is_err());
    }

    #[test]
    fn restrict_fixes_evidence_and_drops_variable() {
        let a = bool_var("a");
        let b = bool_var("b");
        let f = Factor::from_weights(vec![a.clone(), b.clone()], vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let restricted = f.restrict(&a, 1).unwrap();
        assert_eq!(restricted.scope(), &[b]);
        assert!((restricted.cell(0).weight - 0.2).abs() < 1e-9);
        assert!((restricted.cell(1).weight - 0.4).abs() < 1e-9);
    }
}
