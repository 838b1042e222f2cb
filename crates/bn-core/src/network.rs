//! Network construction: nodes hold a conditional distribution keyed by
//! their enumerable parents; `compile` validates the graph and produces
//! the canonical topological ordering the inference driver eliminates in.

use crate::distributions::{Categorical, Dirichlet, Gaussian, Value};
use crate::factor::Factor;
use crate::rate_matrix::RateMatrix;
use crate::table::Table;
use crate::variable::Variable;
use bn_error::{BnResult, bn_err};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// An observed value pinned onto a variable.
#[derive(Clone, Debug)]
pub enum Evidence {
    Index(usize),
    Value(Value),
}

/// The conditional distribution a node carries, keyed by its parents'
/// enumerable values (one table cell per parent assignment).
#[derive(Clone)]
pub enum NodeDistribution {
    /// `self` is enumerable; table maps parent assignment -> Categorical
    /// over `self`'s domain.
    CategoricalCpt(Table<Categorical>),
    /// `self` is continuous; table maps parent assignment -> Gaussian
    /// carried in the emitted factor's JDF.
    GaussianTable(Table<Gaussian>),
    /// `self` is continuous (vector-valued); table maps parent assignment
    /// -> Dirichlet carried in the emitted factor's JDF.
    DirichletTable(Table<Dirichlet>),
    /// `self` and the (single) parent share an alphabet; the conditional
    /// table is derived from a rate-matrix kernel at a fixed branch length.
    Substitution { model: Arc<RateMatrix>, branch_length: f64 },
}

#[derive(Clone)]
struct Node {
    variable: Variable,
    parents: Vec<Variable>,
    distribution: NodeDistribution,
}

/// Builds a [`Network`] incrementally: add nodes, pin evidence, then
/// `compile()` once the graph is complete.
#[derive(Default)]
pub struct NetworkBuilder {
    nodes: Vec<Node>,
    evidence: HashMap<Variable, Evidence>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        NetworkBuilder::default()
    }

    pub fn add_node(&mut self, variable: Variable, parents: Vec<Variable>, distribution: NodeDistribution) -> BnResult<()> {
        if self.nodes.iter().any(|n| n.variable == variable) {
            return Err(bn_err!(InvalidModel: "node '{}' already added", variable.name()));
        }
        for p in &parents {
            if !p.is_enumerable() {
                return Err(bn_err!(InvalidModel: "parent '{}' of '{}' must be enumerable", p.name(), variable.name()));
            }
        }
        self.nodes.push(Node {
            variable,
            parents,
            distribution,
        });
        Ok(())
    }

    pub fn set_evidence(&mut self, variable: Variable, value: Evidence) {
        self.evidence.insert(variable, value);
    }

    pub fn clear_evidence(&mut self) {
        self.evidence.clear();
    }

    /// Validate the graph is a DAG over the declared parent edges and
    /// compute a canonical (parents-before-children) ordering.
    pub fn compile(self) -> BnResult<Network> {
        let by_var: HashMap<Variable, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.variable.clone(), i))
            .collect();

        for node in &self.nodes {
            for p in &node.parents {
                if !by_var.contains_key(p) {
                    return Err(bn_err!(IncompleteNetwork: "parent '{}' of '{}' has no node", p.name(), node.variable.name()));
                }
            }
        }

        let order = topological_order(&self.nodes, &by_var)?;

        Ok(Network {
            nodes: self.nodes,
            by_var,
            order,
            evidence: self.evidence,
        })
    }
}

fn topological_order(nodes: &[Node], by_var: &HashMap<Variable, usize>) -> BnResult<Vec<usize>> {
    let n = nodes.len();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree: Vec<usize> = vec![0; n];

    for (i, node) in nodes.iter().enumerate() {
        for p in &node.parents {
            let pi = by_var[p];
            children[pi].push(i);
            indegree[i] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut queue_vec: Vec<usize> = queue.iter().copied().collect();
    queue_vec.sort_by_key(|&i| nodes[i].variable.canonical_index());
    queue = queue_vec.into_iter().collect();

    let mut order = Vec::with_capacity(n);
    while let Some(i) = queue.pop_front() {
        order.push(i);
        let mut newly_ready = Vec::new();
        for &c in &children[i] {
            indegree[c] -= 1;
            if indegree[c] == 0 {
                newly_ready.push(c);
            }
        }
        newly_ready.sort_by_key(|&c| nodes[c].variable.canonical_index());
        for c in newly_ready {
            queue.push_back(c);
        }
    }

    if order.len() != n {
        return Err(bn_err!(IncompleteNetwork: "network graph has a cycle"));
    }
    Ok(order)
}

/// A compiled network: nodes in canonical (topological) order, each able
/// to emit its factor under the network's current evidence.
pub struct Network {
    nodes: Vec<Node>,
    by_var: HashMap<Variable, usize>,
    order: Vec<usize>,
    evidence: HashMap<Variable, Evidence>,
}

impl Network {
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.order.iter().map(|&i| &self.nodes[i].variable)
    }

    pub fn parents_of(&self, var: &Variable) -> BnResult<&[Variable]> {
        let i = *self
            .by_var
            .get(var)
            .ok_or_else(|| bn_err!(IncompleteNetwork: "no such variable '{}'", var.name()))?;
        Ok(&self.nodes[i].parents)
    }

    pub fn evidence(&self) -> &HashMap<Variable, Evidence> {
        &self.evidence
    }

    pub fn canonical_order(&self) -> impl Iterator<Item = &Variable> {
        self.order.iter().map(|&i| &self.nodes[i].variable)
    }

    /// Variables reachable from `targets` by an active trail given the
    /// network's current evidence (Koller & Friedman, Algorithm 3.1,
    /// `Reachable`): narrower than a plain ancestor closure whenever a
    /// trail is blocked by an unobserved chain/fork or an inactive
    /// v-structure. The returned set is `targets`' Bayes-ball-reachable
    /// non-evidence ancestors, union the evidence variables themselves
    /// (their factors are still needed to weight the posterior).
    pub fn relevant_variables(&self, targets: &[Variable]) -> Vec<Variable> {
        let evidence: HashSet<Variable> = self.evidence.keys().cloned().collect();
        // Phase I: ancestors of the evidence, used below to decide whether
        // a v-structure is unblocked.
        let ancestors_of_evidence = self.ancestor_closure(evidence.iter().cloned());

        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        enum Direction {
            Up,
            Down,
        }

        let mut queue: VecDeque<(Variable, Direction)> =
            targets.iter().cloned().map(|v| (v, Direction::Up)).collect();
        let mut visited: HashSet<(Variable, Direction)> = HashSet::new();
        let mut reachable: HashSet<Variable> = HashSet::new();

        while let Some((y, d)) = queue.pop_front() {
            if !visited.insert((y.clone(), d)) {
                continue;
            }
            if !evidence.contains(&y) {
                reachable.insert(y.clone());
            }
            let parents = self.parents_of(&y).map(|p| p.to_vec()).unwrap_or_default();
            match d {
                Direction::Up => {
                    // Arrived from a child: an unobserved node passes the
                    // trail on upward (chain/fork) and downward (fork).
                    if !evidence.contains(&y) {
                        for p in &parents {
                            queue.push_back((p.clone(), Direction::Up));
                        }
                        for c in self.children_of(&y) {
                            queue.push_back((c, Direction::Down));
                        }
                    }
                }
                Direction::Down => {
                    // Arrived from a parent: an unobserved node passes the
                    // trail on downward (chain); a collider only passes it
                    // on upward if it or a descendant is evidenced.
                    if !evidence.contains(&y) {
                        for c in self.children_of(&y) {
                            queue.push_back((c, Direction::Down));
                        }
                    }
                    if ancestors_of_evidence.contains(&y) {
                        for p in &parents {
                            queue.push_back((p.clone(), Direction::Up));
                        }
                    }
                }
            }
        }

        reachable.into_iter().chain(evidence).collect()
    }

    /// Transitive parent closure of `seeds`, including the seeds themselves.
    fn ancestor_closure(&self, seeds: impl IntoIterator<Item = Variable>) -> HashSet<Variable> {
        let mut seen: HashSet<Variable> = HashSet::new();
        let mut stack: Vec<Variable> = seeds.into_iter().collect();
        while let Some(v) = stack.pop() {
            if !seen.insert(v.clone()) {
                continue;
            }
            if let Ok(parents) = self.parents_of(&v) {
                for p in parents {
                    stack.push(p.clone());
                }
            }
        }
        seen
    }

    fn children_of(&self, var: &Variable) -> Vec<Variable> {
        self.nodes
            .iter()
            .filter(|n| n.parents.contains(var))
            .map(|n| n.variable.clone())
            .collect()
    }

    /// Emit the factor for `var` under the network's current evidence.
    /// Any parent of `var` that is neither in `relevant` nor evidenced is
    /// summed out of the returned factor (its own prior is folded in via
    /// [`Network::collapse_to_single`] first), so an irrelevant-parent
    /// dimension never leaks into the elimination order.
    pub fn emit_factor(&self, var: &Variable, relevant: &HashSet<Variable>) -> BnResult<Factor> {
        let factor = self.emit_factor_raw(var)?;
        let i = *self
            .by_var
            .get(var)
            .ok_or_else(|| bn_err!(IncompleteNetwork: "no such variable '{}'", var.name()))?;
        let node = &self.nodes[i];
        self.marginalise_irrelevant_parents(factor, node, relevant)
    }

    fn marginalise_irrelevant_parents(&self, mut factor: Factor, node: &Node, relevant: &HashSet<Variable>) -> BnResult<Factor> {
        for p in &node.parents {
            if !relevant.contains(p) && !self.evidence.contains_key(p) {
                let prior = self.collapse_to_single(p)?;
                factor = factor.product(&prior)?;
                factor = factor.sum_out(std::slice::from_ref(p))?;
            }
        }
        Ok(factor)
    }

    /// Collapse `var`'s own ancestral subgraph (its parents, their
    /// parents, ...) down to a single-variable factor over `{var}` by
    /// eliminating every one of its ancestors. Used to fold an
    /// irrelevant-and-unevidenced parent's prior into a child's factor
    /// without adding that parent (or its own ancestors) to the outer
    /// elimination order.
    fn collapse_to_single(&self, var: &Variable) -> BnResult<Factor> {
        let sub = self.ancestor_closure(std::iter::once(var.clone()));
        let factors: Vec<Factor> = sub.iter().map(|v| self.emit_factor_raw(v)).collect::<BnResult<_>>()?;
        let joined = crate::factor::build_product_tree(factors)?;
        let to_sum: Vec<Variable> = sub.iter().filter(|v| *v != var).cloned().collect();
        joined.sum_out(&to_sum)
    }

    /// Emit `var`'s factor exactly as its CPT and the network's evidence
    /// dictate, with no irrelevant-parent marginalisation. Used directly
    /// by Gibbs sampling (which needs every parent dimension intact to
    /// build an exact Markov-blanket conditional) and as the base case for
    /// [`Network::emit_factor`] and [`Network::collapse_to_single`].
    pub(crate) fn emit_factor_raw(&self, var: &Variable) -> BnResult<Factor> {
        let i = *self
            .by_var
            .get(var)
            .ok_or_else(|| bn_err!(IncompleteNetwork: "no such variable '{}'", var.name()))?;
        let node = &self.nodes[i];

        match &node.distribution {
            NodeDistribution::CategoricalCpt(table) => self.emit_categorical(node, table),
            NodeDistribution::GaussianTable(table) => self.emit_gaussian(node, table),
            NodeDistribution::DirichletTable(table) => self.emit_dirichlet(node, table),
            NodeDistribution::Substitution { model, branch_length } => {
                self.emit_substitution(node, model, *branch_length)
            }
        }
    }

    fn emit_categorical(&self, node: &Node, table: &Table<Categorical>) -> BnResult<Factor> {
        let mut key_vars = node.parents.clone();
        key_vars.push(node.variable.clone());

        let full: Table<()> = Table::new(key_vars.clone())?;
        let mut weights = vec![0.0; full.size()];
        for idx in 0..full.size() {
            let key = full.key(idx);
            let (parent_key, self_value) = key.split_at(node.parents.len());
            let cat = table
                .get(parent_key)?
                .ok_or_else(|| bn_err!(IncompleteNetwork: "no CPT row for '{}' at given parent values", node.variable.name()))?;
            weights[idx] = cat.get(self_value[0])?;
        }

        let factor = Factor::from_weights(key_vars, weights)?;
        self.apply_evidence(factor, node)
    }

    fn emit_gaussian(&self, node: &Node, table: &Table<Gaussian>) -> BnResult<Factor> {
        if node.parents.is_empty() && !self.evidence.contains_key(&node.variable) {
            return Err(bn_err!(Unfactorisable: "gaussian node '{}' has no enumerable parents and is not evidenced", node.variable.name()));
        }

        let parents_table: Table<()> = Table::new(node.parents.clone())?;
        let mut cells = Vec::with_capacity(parents_table.size());
        for idx in 0..parents_table.size() {
            let key = parents_table.key(idx);
            let g = table
                .get(&key)?
                .ok_or_else(|| bn_err!(IncompleteNetwork: "no gaussian row for '{}' at given parent values", node.variable.name()))?;

            if let Some(Evidence::Value(Value::Scalar(x))) = self.evidence.get(&node.variable) {
                cells.push(crate::factor::Cell::new(g.density(*x))?);
            } else {
                let jdf = crate::factor::Jdf::single(node.variable.clone(), Arc::new(crate::distributions::Dist::Gaussian(*g)))?;
                cells.push(crate::factor::Cell::new(1.0)?.with_jdf(jdf));
            }
        }
        Factor::from_cells(node.parents.clone(), cells)
    }

    fn emit_dirichlet(&self, node: &Node, table: &Table<Dirichlet>) -> BnResult<Factor> {
        if node.parents.is_empty() && !self.evidence.contains_key(&node.variable) {
            return Err(bn_err!(Unfactorisable: "dirichlet node '{}' has no enumerable parents and is not evidenced", node.variable.name()));
        }

        let parents_table: Table<()> = Table::new(node.parents.clone())?;
        let mut cells = Vec::with_capacity(parents_table.size());
        for idx in 0..parents_table.size() {
            let key = parents_table.key(idx);
            let d = table
                .get(&key)?
                .ok_or_else(|| bn_err!(IncompleteNetwork: "no dirichlet row for '{}' at given parent values", node.variable.name()))?;

            if let Some(Evidence::Value(Value::Vector(v))) = self.evidence.get(&node.variable) {
                cells.push(crate::factor::Cell::new(d.density(v)?)?);
            } else {
                let jdf = crate::factor::Jdf::single(node.variable.clone(), Arc::new(crate::distributions::Dist::Dirichlet(d.clone())))?;
                cells.push(crate::factor::Cell::new(1.0)?.with_jdf(jdf));
            }
        }
        Factor::from_cells(node.parents.clone(), cells)
    }

    fn emit_substitution(&self, node: &Node, model: &RateMatrix, branch_length: f64) -> BnResult<Factor> {
        if node.parents.len() != 1 {
            return Err(bn_err!(InvalidModel: "substitution node '{}' must have exactly one parent", node.variable.name()));
        }
        let parent = &node.parents[0];
        let probs = model.probs(branch_length)?;

        let mut key_vars = node.parents.clone();
        key_vars.push(node.variable.clone());
        let full: Table<()> = Table::new(key_vars.clone())?;
        let mut weights = vec![0.0; full.size()];
        for idx in 0..full.size() {
            let key = full.key(idx);
            weights[idx] = probs[(key[0], key[1])];
        }
        let factor = Factor::from_weights(key_vars, weights)?;
        let _ = parent;
        self.apply_evidence(factor, node)
    }

    fn apply_evidence(&self, mut factor: Factor, node: &Node) -> BnResult<Factor> {
        if let Some(Evidence::Index(v)) = self.evidence.get(&node.variable) {
            factor = factor.restrict(&node.variable, *v)?;
        }
        for p in &node.parents {
            if let Some(Evidence::Index(v)) = self.evidence.get(p) {
                if factor.scope().contains(p) {
                    factor = factor.restrict(p, *v)?;
                }
            }
        }
        Ok(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Domain;

    #[test]
    fn compile_detects_cycle() {
        let a = Variable::enumerable("a", Arc::new(Domain::boolean("a")));
        let b = Variable::enumerable("b", Arc::new(Domain::boolean("b")));
        let mut builder = NetworkBuilder::new();
        builder
            .add_node(a.clone(), vec![b.clone()], NodeDistribution::CategoricalCpt(Table::new(vec![b.clone()]).unwrap()))
            .unwrap();
        builder
            .add_node(b, vec![a], NodeDistribution::CategoricalCpt(Table::new(vec![]).unwrap()))
            .unwrap();
        assert!(builder.compile().is_err());
    }

    #[test]
    fn compile_orders_parents_before_children() {
        let rain = Variable::enumerable("rain", Arc::new(Domain::boolean("rain")));
        let sprinkler = Variable::enumerable("sprinkler", Arc::new(Domain::boolean("sprinkler")));
        let mut builder = NetworkBuilder::new();

        let mut rain_table = Table::new(vec![]).unwrap();
        rain_table.set(&[], Categorical::new(rain.clone(), vec![0.8, 0.2]).unwrap()).unwrap();
        builder.add_node(rain.clone(), vec![], NodeDistribution::CategoricalCpt(rain_table)).unwrap();

        let mut sprinkler_table = Table::new(vec![rain.clone()]).unwrap();
        sprinkler_table.set(&[0], Categorical::new(sprinkler.clone(), vec![0.6, 0.4]).unwrap()).unwrap();
        sprinkler_table.set(&[1], Categorical::new(sprinkler.clone(), vec![0.99, 0.01]).unwrap()).unwrap();
        builder
            .add_node(sprinkler.clone(), vec![rain.clone()], NodeDistribution::CategoricalCpt(sprinkler_table))
            .unwrap();

        let net = builder.compile().unwrap();
        let order: Vec<&Variable> = net.canonical_order().collect();
        let rain_pos = order.iter().position(|v| **v == rain).unwrap();
        let sprinkler_pos = order.iter().position(|v| **v == sprinkler).unwrap();
        assert!(rain_pos < sprinkler_pos);
    }
}
