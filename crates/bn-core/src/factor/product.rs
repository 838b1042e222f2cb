//! Factor product, including the product-tree builder used by the
//! inference driver to order a set of factors before elimination.

use super::{Cell, Factor};
use crate::table::Table;
use crate::variable::Variable;
use bn_error::BnResult;
use std::time::Instant;

/// Two ways of computing the source cell pair for each destination cell of
/// a product. Both are correct; `StrideWalk` precomputes per-variable
/// stride contributions once and decomposes the destination's linear index
/// directly, while `FullScan` reconstructs the full per-variable key for
/// every destination cell before looking it up. `StrideWalk` wins when the
/// two factors' combined scope is large relative to either input (the
/// common case); `FullScan` can win when one input is tiny and its lookup
/// overhead dominates instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JoinStrategy {
    StrideWalk,
    FullScan,
}

struct AxisMap {
    /// For each axis of the result's scope, the stride to add into the
    /// source factor's linear index if that axis is in the source's scope.
    contributions: Vec<(usize, usize)>,
}

fn axis_map(source: &Factor, result_vars: &[Variable]) -> AxisMap {
    let mut contributions = Vec::new();
    for (src_pos, var) in source.scope().iter().enumerate() {
        if let Some(result_axis) = result_vars.iter().position(|v| v == var) {
            let stride = source_stride(source, src_pos);
            contributions.push((result_axis, stride));
        }
    }
    AxisMap { contributions }
}

fn source_stride(source: &Factor, pos: usize) -> usize {
    // Re-derive the stride for variable at `pos` in `source`'s own table:
    // row-major, first variable fastest.
    let dims: Vec<usize> = source.scope().iter().map(|v| v.cardinality().max(1)).collect();
    let mut stride = 1usize;
    for d in dims.iter().take(pos) {
        stride *= d;
    }
    stride
}

fn stride_walk_index(dest_idx: usize, result_dims: &[usize], map: &AxisMap) -> usize {
    let mut result_stride = 1usize;
    let mut strides = vec![0usize; result_dims.len()];
    for (i, d) in result_dims.iter().enumerate() {
        strides[i] = result_stride;
        result_stride *= d.max(1);
    }
    let mut idx = 0usize;
    for &(axis, contribution) in &map.contributions {
        let value = (dest_idx / strides[axis]) % result_dims[axis].max(1);
        idx += value * contribution;
    }
    idx
}

fn full_scan_index(source: &Factor, result_vars: &[Variable], dest_key: &[usize]) -> BnResult<usize> {
    let key: Vec<usize> = source
        .scope()
        .iter()
        .map(|v| {
            let pos = result_vars.iter().position(|rv| rv == v).expect("scope subset of result");
            dest_key[pos]
        })
        .collect();
    source.index_of(&key)
}

fn combine_cell(a: &Cell, b: &Cell) -> BnResult<Cell> {
    let weight = a.weight * b.weight;
    let jdf = match (&a.jdf, &b.jdf) {
        (None, None) => None,
        (Some(j), None) | (None, Some(j)) => Some(j.clone()),
        (Some(ja), Some(jb)) => Some(ja.union(jb)?),
    };
    let trace = match (&a.trace, &b.trace) {
        (None, None) => None,
        (Some(t), None) | (None, Some(t)) => Some(t.clone()),
        (Some(ta), Some(tb)) => {
            let mut merged = ta.clone();
            merged.extend(tb.clone());
            Some(merged)
        }
    };
    let mut cell = Cell::new(weight)?;
    cell.jdf = jdf;
    cell.trace = trace;
    Ok(cell)
}

fn choose_strategy(a: &Factor, b: &Factor, result_vars: &[Variable], result_dims: &[usize]) -> JoinStrategy {
    const TRIAL_CELLS: usize = 64;
    let size = result_dims.iter().product::<usize>().max(1);
    if size <= TRIAL_CELLS {
        return JoinStrategy::StrideWalk;
    }

    let map_a = axis_map(a, result_vars);
    let map_b = axis_map(b, result_vars);

    let trial = TRIAL_CELLS.min(size);
    let start = Instant::now();
    for dest_idx in 0..trial {
        std::hint::black_box(stride_walk_index(dest_idx, result_dims, &map_a));
        std::hint::black_box(stride_walk_index(dest_idx, result_dims, &map_b));
    }
    let stride_elapsed = start.elapsed();

    let result_table_keys: Vec<Vec<usize>> = {
        let result_table: Table<()> = Table::new(result_vars.to_vec()).expect("valid result scope");
        (0..trial).map(|i| result_table.key(i)).collect()
    };
    let start = Instant::now();
    for key in &result_table_keys {
        let _ = std::hint::black_box(full_scan_index(a, result_vars, key));
        let _ = std::hint::black_box(full_scan_index(b, result_vars, key));
    }
    let scan_elapsed = start.elapsed();

    if stride_elapsed <= scan_elapsed {
        JoinStrategy::StrideWalk
    } else {
        JoinStrategy::FullScan
    }
}

pub fn product(a: &Factor, b: &Factor, strategy_hint: Option<JoinStrategy>) -> BnResult<Factor> {
    let mut result_vars: Vec<Variable> = a.scope().iter().chain(b.scope()).cloned().collect();
    result_vars.sort();
    result_vars.dedup();

    let result_dims: Vec<usize> = result_vars.iter().map(|v| v.cardinality().max(1)).collect();
    let size = result_dims.iter().product::<usize>().max(1);

    let strategy = strategy_hint.unwrap_or_else(|| choose_strategy(a, b, &result_vars, &result_dims));

    let mut cells = Vec::with_capacity(size);
    match strategy {
        JoinStrategy::StrideWalk => {
            let map_a = axis_map(a, &result_vars);
            let map_b = axis_map(b, &result_vars);
            for dest_idx in 0..size {
                let a_idx = stride_walk_index(dest_idx, &result_dims, &map_a);
                let b_idx = stride_walk_index(dest_idx, &result_dims, &map_b);
                cells.push(combine_cell(a.cell(a_idx), b.cell(b_idx))?);
            }
        }
        JoinStrategy::FullScan => {
            let result_table: Table<()> = Table::new(result_vars.clone())?;
            for dest_idx in 0..size {
                let key = result_table.key(dest_idx);
                let a_idx = full_scan_index(a, &result_vars, &key)?;
                let b_idx = full_scan_index(b, &result_vars, &key)?;
                cells.push(combine_cell(a.cell(a_idx), b.cell(b_idx))?);
            }
        }
    }

    Factor::from_cells(result_vars, cells)
}

/// Build a single factor from `factors` by repeatedly multiplying the pair
/// whose joined scope has the smallest resulting cell count, i.e. a greedy
/// min-joined-complexity pairing rather than a fixed left-to-right fold.
pub fn build_product_tree(factors: Vec<Factor>) -> BnResult<Factor> {
    let mut pool = factors;
    if pool.is_empty() {
        return Factor::atomic(1.0);
    }
    while pool.len() > 1 {
        let mut best_pair = (0, 1);
        let mut best_size = usize::MAX;
        for i in 0..pool.len() {
            for j in (i + 1)..pool.len() {
                let joined_size = joined_cell_count(&pool[i], &pool[j]);
                if joined_size < best_size {
                    best_size = joined_size;
                    best_pair = (i, j);
                }
            }
        }
        let (i, j) = best_pair;
        let b = pool.remove(j);
        let a = pool.remove(i);
        pool.push(product(&a, &b, None)?);
    }
    Ok(pool.into_iter().next().expect("non-empty pool"))
}

fn joined_cell_count(a: &Factor, b: &Factor) -> usize {
    let mut vars: Vec<Variable> = a.scope().iter().chain(b.scope()).cloned().collect();
    vars.sort();
    vars.dedup();
    vars.iter().map(|v| v.cardinality().max(1)).product()
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
    fn product_is_commutative() {
        let a = bool_var("a");
        let b = bool_var("b");
        let fa = Factor::from_weights(vec![a.clone()], vec![0.2, 0.8]).unwrap();
        let fb = Factor::from_weights(vec![b.clone()], vec![0.5, 0.5]).unwrap();

        let ab = product(&fa, &fb, None).unwrap();
        let ba = product(&fb, &fa, None).unwrap();

        for (idx, cell) in ab.iter() {
            let key = ab.key_of(idx);
            let matching_idx = ba
                .scope()
                .iter()
                .map(|v| key[ab.scope().iter().position(|x| x == v).unwrap()])
                .collect::<Vec<_>>();
            let other = ba.cell(ba.index_of(&matching_idx).unwrap());
            assert!((cell.weight - other.weight).abs() < 1e-12);
        }
    }

    #[test]
    fn stride_walk_and_full_scan_agree() {
        let a = bool_var("a");
        let b = bool_var("b");
        let fa = Factor::from_weights(vec![a], vec![0.3, 0.7]).unwrap();
        let fb = Factor::from_weights(vec![b], vec![0.1, 0.9]).unwrap();

        let stride = product(&fa, &fb, Some(JoinStrategy::StrideWalk)).unwrap();
        let scan = product(&fa, &fb, Some(JoinStrategy::FullScan)).unwrap();

        for idx in 0..stride.size() {
            assert!((stride.cell(idx).weight - scan.cell(idx).weight).abs() < 1e-12);
        }
    }

    #[test]
    fn build_product_tree_matches_left_fold_on_weights() {
        let a = bool_var("a");
        let b = bool_var("b");
        let c = bool_var("c");
        let fa = Factor::from_weights(vec![a], vec![0.2, 0.8]).unwrap();
        let fb = Factor::from_weights(vec![b], vec![0.5, 0.5]).unwrap();
        let fc = Factor::from_weights(vec![c], vec![0.3, 0.7]).unwrap();

        let tree = build_product_tree(vec![fa.clone(), fb.clone(), fc.clone()]).unwrap();
        let fold = product(&product(&fa, &fb, None).unwrap(), &fc, None).unwrap();

        assert!((tree.total_weight() - fold.total_weight()).abs() < 1e-9);
    }
}
