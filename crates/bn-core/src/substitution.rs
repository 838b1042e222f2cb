//! Ancestral sequence reconstruction: for each alignment column
//! independently, build a tree-shaped network over the substitution
//! alphabet, instantiate leaves to the observed symbols, run joint-MPE,
//! and collect the per-ancestor winning symbol. Columns are independent
//! and are batched across a thread pool when the `rayon` feature is on.

use crate::inference;
use crate::network::{Evidence, NetworkBuilder, NodeDistribution};
use crate::rate_matrix::RateMatrix;
use crate::variable::{Domain, Variable};
use crate::cancellation::CancellationToken;
use bn_error::{BnResult, bn_err};
use std::collections::HashMap;
use std::sync::Arc;

/// A rooted phylogenetic tree: node 0 is the root. Every other node has a
/// parent index (earlier in the array, so the array is already a valid
/// topological order) and the branch length leading to it.
#[derive(Clone, Debug)]
pub struct Tree {
    pub labels: Vec<String>,
    pub parent: Vec<Option<usize>>,
    pub branch_length: Vec<f64>,
    pub is_leaf: Vec<bool>,
}

impl Tree {
    pub fn validate(&self) -> BnResult<()> {
        let n = self.labels.len();
        if self.parent.len() != n || self.branch_length.len() != n || self.is_leaf.len() != n {
            return Err(bn_err!(InvalidModel: "tree arrays have mismatched lengths"));
        }
        for (i, p) in self.parent.iter().enumerate() {
            match p {
                Some(pi) if *pi >= i => {
                    return Err(bn_err!(InvalidModel: "tree node {} lists a parent at or after its own position", i));
                }
                None if i != 0 => {
                    return Err(bn_err!(InvalidModel: "only the root (index 0) may have no parent"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn leaf_indices(&self) -> Vec<usize> {
        (0..self.labels.len()).filter(|&i| self.is_leaf[i]).collect()
    }

    pub fn internal_indices(&self) -> Vec<usize> {
        (0..self.labels.len()).filter(|&i| !self.is_leaf[i]).collect()
    }
}

/// How an alignment gap at a leaf is handled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GapHandling {
    /// The leaf is simply left unevidenced (marginalised over).
    Missing,
    /// The leaf's incoming edge uses the catalogue's `Gap` model instead of
    /// the primary substitution model.
    SeparateModel,
}

/// `alignment[column][leaf_position]`: `Some(symbol_index)` into the
/// model's alphabet, or `None` for a gap. `leaf_position` indexes into
/// `tree.leaf_indices()` in order.
pub type Alignment = Vec<Vec<Option<usize>>>;

fn build_column_network(
    tree: &Tree,
    column: &[Option<usize>],
    model: &RateMatrix,
    gap_model: Option<&RateMatrix>,
    gap_handling: GapHandling,
) -> BnResult<(NetworkBuilder, Vec<Variable>)> {
    tree.validate()?;
    let k = model.alphabet().len();
    let domain = Arc::new(Domain::new(model.alphabet()[0].clone() + "-alphabet", model.alphabet().to_vec()));

    let vars: Vec<Variable> = (0..tree.labels.len())
        .map(|i| Variable::enumerable(tree.labels[i].clone(), domain.clone()))
        .collect();

    let mut builder = NetworkBuilder::new();

    let mut root_table = crate::table::Table::new(vec![])?;
    root_table.set(
        &[],
        crate::distributions::Categorical::new(vars[0].clone(), model.stationary().to_vec())?,
    )?;
    builder.add_node(vars[0].clone(), vec![], NodeDistribution::CategoricalCpt(root_table))?;

    let leaf_positions: HashMap<usize, usize> = tree
        .leaf_indices()
        .into_iter()
        .enumerate()
        .map(|(pos, idx)| (idx, pos))
        .collect();

    for i in 1..vars.len() {
        let parent_idx = tree.parent[i].expect("validated: only root has no parent");
        let is_gap_leaf = tree.is_leaf[i]
            && gap_handling == GapHandling::SeparateModel
            && leaf_positions
                .get(&i)
                .and_then(|&pos| column.get(pos).copied())
                .flatten()
                .is_none();
        let edge_model = if is_gap_leaf {
            rebuild_kernel(gap_model.ok_or_else(|| {
                bn_err!(InvalidModel: "gap handling is SeparateModel but no gap model was supplied")
            })?)?
        } else {
            rebuild_kernel(model)?
        };
        builder.add_node(
            vars[i].clone(),
            vec![vars[parent_idx].clone()],
            NodeDistribution::Substitution {
                model: Arc::new(edge_model),
                branch_length: tree.branch_length[i],
            },
        )?;
    }

    for (leaf_pos, &node_idx) in tree.leaf_indices().iter().enumerate() {
        if let Some(symbol) = column.get(leaf_pos).copied().flatten() {
            if symbol >= k {
                return Err(bn_err!(InvalidDomain: "column symbol {} out of range for alphabet size {}", symbol, k));
            }
            builder.set_evidence(vars[node_idx].clone(), Evidence::Index(symbol));
        }
        // a gap with no evidence is simply left unevidenced, regardless of
        // `gap_handling` (SeparateModel only changes which kernel sits on
        // that leaf's incoming edge, not whether evidence is set)
    }

    let internal_vars: Vec<Variable> = tree.internal_indices().iter().map(|&i| vars[i].clone()).collect();
    Ok((builder, internal_vars))
}

/// Rate matrices aren't `Clone` (they own a lock-protected cache), so each
/// edge gets its own kernel rebuilt from the same catalogue data rather
/// than sharing one `RateMatrix` instance across edges.
fn rebuild_kernel(model: &RateMatrix) -> BnResult<RateMatrix> {
    RateMatrix::from_exchangeability(
        model.alphabet().to_vec(),
        model.stationary().to_vec(),
        reconstruct_symmetric_exchangeability(model),
    )
}

/// Recover a symmetric exchangeability matrix consistent with `model`'s
/// (already row-sum-zero, rate-normalised) `Q`, so a fresh kernel can be
/// rebuilt per edge: `s[i][j] = q[i][j] / pi[j]` for `i != j`.
fn reconstruct_symmetric_exchangeability(model: &RateMatrix) -> Vec<Vec<f64>> {
    let n = model.alphabet().len();
    let pi = model.stationary();
    let q = model.q();
    (0..n)
        .map(|i| {
            (0..n)
                .map(|j| if i == j { 0.0 } else { q[(i, j)] / pi[j] })
                .collect()
        })
        .collect()
}

/// Reconstruct ancestral symbols for every column of `alignment` against
/// `tree` and `model`, returning one symbol-index vector per internal
/// node's position in `tree.internal_indices()` order, per column.
pub fn reconstruct(
    tree: &Tree,
    alignment: &Alignment,
    model: &RateMatrix,
    gap_handling: GapHandling,
    gap_model: Option<&RateMatrix>,
    cancellation: &CancellationToken,
) -> BnResult<Vec<Vec<usize>>> {
    tree.validate()?;

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        alignment
            .par_iter()
            .map(|column| {
                cancellation.check()?;
                reconstruct_column(tree, column, model, gap_handling, gap_model, cancellation)
            })
            .collect()
    }

    #[cfg(not(feature = "rayon"))]
    {
        alignment
            .iter()
            .map(|column| {
                cancellation.check()?;
                reconstruct_column(tree, column, model, gap_handling, gap_model, cancellation)
            })
            .collect()
    }
}

fn reconstruct_column(
    tree: &Tree,
    column: &[Option<usize>],
    model: &RateMatrix,
    gap_handling: GapHandling,
    gap_model: Option<&RateMatrix>,
    cancellation: &CancellationToken,
) -> BnResult<Vec<usize>> {
    let (builder, internal_vars) = build_column_network(tree, column, model, gap_model, gap_handling)?;
    let net = builder.compile()?;
    let (trace, _weight) = inference::mpe(&net, &internal_vars, cancellation)?;
    internal_vars
        .iter()
        .map(|v| {
            trace
                .get(v)
                .copied()
                .ok_or_else(|| bn_err!(IncompleteNetwork: "MPE trace missing ancestor '{}'", v.name()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_matrix;

    fn two_taxon_tree() -> Tree {
        Tree {
            labels: vec!["root".into(), "a".into(), "b".into()],
            parent: vec![None, Some(0), Some(0)],
            branch_length: vec![0.0, 0.1, 0.1],
            is_leaf: vec![false, true, true],
        }
    }

    #[test]
    fn reconstructs_root_as_shared_leaf_symbol() {
        let model = rate_matrix::named_model("JTT").unwrap();
        let tree = two_taxon_tree();
        let token = CancellationToken::new();
        let alignment: Alignment = vec![vec![Some(0), Some(0)]];
        let result = reconstruct(&tree, &alignment, &model, GapHandling::Missing, None, &token).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 1);
        assert_eq!(result[0][0], 0);
    }

    #[test]
    fn missing_leaf_still_reconstructs() {
        let model = rate_matrix::named_model("JTT").unwrap();
        let tree = two_taxon_tree();
        let token = CancellationToken::new();
        let alignment: Alignment = vec![vec![Some(1), None]];
        let result = reconstruct(&tree, &alignment, &model, GapHandling::Missing, None, &token).unwrap();
        assert_eq!(result.len(), 1);
    }
}
