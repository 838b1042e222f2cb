//! Compiles a network into a sequence of factors, orders elimination by a
//! min-fill heuristic, and answers marginal / joint-MPE / log-likelihood
//! queries (Koller & Friedman's Sum-Product-VE, generalised to carry JDFs
//! and traces through every step).

use crate::cancellation::CancellationToken;
use crate::factor::{Factor, Trace, build_product_tree};
use crate::network::Network;
use crate::variable::Variable;
use bn_error::{BnResult, bn_err};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Variables whose distributions can affect the posterior of the query:
/// the query targets' Bayes-ball-reachable ancestors, union evidence.
/// (`Network::relevant_variables` already does the reachability walk;
/// this just renames it at the call site.)
fn relevant_variables(net: &Network, targets: &[Variable]) -> Vec<Variable> {
    net.relevant_variables(targets)
}

fn collect_factors(net: &Network, relevant: &[Variable]) -> BnResult<Vec<Factor>> {
    let relevant_set: HashSet<Variable> = relevant.iter().cloned().collect();
    relevant.iter().map(|v| net.emit_factor(v, &relevant_set)).collect()
}

/// Min-fill elimination ordering over `to_eliminate`, given the initial
/// factor scopes as the starting interaction graph. Ties break toward the
/// lowest canonical index.
fn elimination_order(factors: &[Factor], to_eliminate: &[Variable]) -> Vec<Variable> {
    let mut remaining: HashSet<Variable> = to_eliminate.iter().cloned().collect();
    let mut neighbours: HashMap<Variable, HashSet<Variable>> = HashMap::new();

    for f in factors {
        for a in f.scope() {
            for b in f.scope() {
                if a != b {
                    neighbours.entry(a.clone()).or_default().insert(b.clone());
                }
            }
        }
    }

    let mut order = Vec::with_capacity(to_eliminate.len());
    while !remaining.is_empty() {
        let mut best: Option<(usize, Variable)> = None;
        let mut candidates: Vec<&Variable> = remaining.iter().collect();
        candidates.sort_by_key(|v| v.canonical_index());

        for v in candidates {
            let empty = HashSet::new();
            let nbrs: Vec<&Variable> = neighbours.get(v).unwrap_or(&empty).iter().collect();
            let mut fill = 0usize;
            for i in 0..nbrs.len() {
                for j in (i + 1)..nbrs.len() {
                    let already = neighbours.get(nbrs[i]).map(|s| s.contains(nbrs[j])).unwrap_or(false);
                    if !already {
                        fill += 1;
                    }
                }
            }
            if best.as_ref().map(|(f, _)| fill < *f).unwrap_or(true) {
                best = Some((fill, v.clone()));
            }
        }

        let (_, chosen) = best.expect("remaining set is non-empty");

        let empty = HashSet::new();
        let nbrs: Vec<Variable> = neighbours.get(&chosen).unwrap_or(&empty).iter().cloned().collect();
        for i in 0..nbrs.len() {
            for j in (i + 1)..nbrs.len() {
                neighbours.entry(nbrs[i].clone()).or_default().insert(nbrs[j].clone());
                neighbours.entry(nbrs[j].clone()).or_default().insert(nbrs[i].clone());
            }
        }
        for n in &nbrs {
            if let Some(s) = neighbours.get_mut(n) {
                s.remove(&chosen);
            }
        }
        neighbours.remove(&chosen);

        remaining.remove(&chosen);
        order.push(chosen);
    }
    order
}

enum Elim {
    Sum,
    Max,
}

fn run_elimination(mut factors: Vec<Factor>, order: &[Variable], elim: Elim, cancellation: &CancellationToken) -> BnResult<Factor> {
    for v in order {
        cancellation.check()?;
        let (containing, rest): (Vec<Factor>, Vec<Factor>) =
            factors.into_iter().partition(|f| f.scope().contains(v));
        factors = rest;

        if containing.is_empty() {
            continue;
        }
        trace!(variable = v.name(), count = containing.len(), "eliminating variable");
        let joined = build_product_tree(containing)?;
        let reduced = match elim {
            Elim::Sum => joined.sum_out(std::slice::from_ref(v))?,
            Elim::Max => joined.max_out(std::slice::from_ref(v))?,
        };
        factors.push(reduced);
    }
    build_product_tree(factors)
}

/// Marginal distribution over `targets`, given the network's current
/// evidence, normalised to sum to 1. `cancellation` is checked between
/// every eliminated variable so a long-running query can be aborted.
pub fn marginal(net: &Network, targets: &[Variable], cancellation: &CancellationToken) -> BnResult<Factor> {
    let relevant = relevant_variables(net, targets);
    let factors = collect_factors(net, &relevant)?;

    let target_set: HashSet<Variable> = targets.iter().cloned().collect();
    let to_eliminate: Vec<Variable> = relevant
        .into_iter()
        .filter(|v| !target_set.contains(v) && !net.evidence().contains_key(v))
        .collect();

    let order = elimination_order(&factors, &to_eliminate);
    debug!(?targets, steps = order.len(), "running marginal query");
    let mut result = run_elimination(factors, &order, Elim::Sum, cancellation)?;
    result.normalise()?;
    Ok(result)
}

/// Joint most-probable-explanation assignment over `targets`, as a map
/// from variable to its winning domain index, plus the (unnormalised)
/// joint weight of that assignment.
pub fn mpe(net: &Network, targets: &[Variable], cancellation: &CancellationToken) -> BnResult<(Trace, f64)> {
    let relevant = relevant_variables(net, targets);
    let factors = collect_factors(net, &relevant)?;

    let target_set: HashSet<Variable> = targets.iter().cloned().collect();
    let to_eliminate: Vec<Variable> = relevant
        .into_iter()
        .filter(|v| !net.evidence().contains_key(v))
        .collect();
    // MPE eliminates every non-evidence variable by max, targets included,
    // and reads the winning assignment off the trace.
    let mut order = elimination_order(&factors, &to_eliminate);
    order.retain(|v| !target_set.contains(v));
    order.extend(target_set.iter().cloned());

    debug!(?targets, steps = order.len(), "running MPE query");
    let result = run_elimination(factors, &order, Elim::Max, cancellation)?;
    if result.scope().len() != 0 {
        return Err(bn_err!(IncompleteNetwork: "MPE elimination left a non-atomic factor"));
    }
    let cell = result.cell(0);
    let trace = cell.trace.clone().unwrap_or_default();
    Ok((trace, cell.weight))
}

/// Log-likelihood of the network's current evidence: eliminate every
/// relevant non-evidence variable by sum, with no free targets.
pub fn log_likelihood(net: &Network, cancellation: &CancellationToken) -> BnResult<f64> {
    let relevant = relevant_variables(net, &[]);
    let factors = collect_factors(net, &relevant)?;
    let to_eliminate: Vec<Variable> = relevant
        .into_iter()
        .filter(|v| !net.evidence().contains_key(v))
        .collect();
    let order = elimination_order(&factors, &to_eliminate);
    debug!(steps = order.len(), "running log-likelihood query");
    let result = run_elimination(factors, &order, Elim::Sum, cancellation)?;
    if result.scope().len() != 0 {
        return Err(bn_err!(IncompleteNetwork: "log-likelihood elimination left a non-atomic factor"));
    }
    let weight = result.cell(0).weight;
    if weight <= 0.0 {
        return Err(bn_err!(EvidenceImpossible: "evidence has zero probability"));
    }
    Ok(weight.ln())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Categorical;
    use crate::network::{Evidence, NetworkBuilder, NodeDistribution};
    use crate::table::Table;
    use crate::variable::Domain;
    use std::sync::Arc;

    fn burglary_network() -> Network {
        let burglary = Variable::enumerable("burglary", Arc::new(Domain::boolean("burglary")));
        let alarm = Variable::enumerable("alarm", Arc::new(Domain::boolean("alarm")));

        let mut builder = NetworkBuilder::new();

        let mut b_table = Table::new(vec![]).unwrap();
        b_table.set(&[], Categorical::new(burglary.clone(), vec![0.999, 0.001]).unwrap()).unwrap();
        builder.add_node(burglary.clone(), vec![], NodeDistribution::CategoricalCpt(b_table)).unwrap();

        let mut a_table = Table::new(vec![burglary.clone()]).unwrap();
        a_table.set(&[0], Categorical::new(alarm.clone(), vec![0.999, 0.001]).unwrap()).unwrap();
        a_table.set(&[1], Categorical::new(alarm.clone(), vec![0.06, 0.94]).unwrap()).unwrap();
        builder
            .add_node(alarm.clone(), vec![burglary.clone()], NodeDistribution::CategoricalCpt(a_table))
            .unwrap();

        builder.compile().unwrap()
    }

    #[test]
    fn marginal_of_burglary_prior_matches_cpt() {
        let net = burglary_network();
        let burglary = net.canonical_order().next().unwrap().clone();
        let token = crate::cancellation::CancellationToken::new();
        let m = marginal(&net, std::slice::from_ref(&burglary), &token).unwrap();
        assert!((m.cell(0).weight - 0.999).abs() < 1e-9);
        assert!((m.cell(1).weight - 0.001).abs() < 1e-9);
    }

    #[test]
    fn mpe_on_alarm_evidence_prefers_no_burglary() {
        let burglary = Variable::enumerable("burglary", Arc::new(Domain::boolean("burglary")));
        let alarm = Variable::enumerable("alarm", Arc::new(Domain::boolean("alarm")));

        let mut builder = NetworkBuilder::new();
        let mut b_table = Table::new(vec![]).unwrap();
        b_table.set(&[], Categorical::new(burglary.clone(), vec![0.999, 0.001]).unwrap()).unwrap();
        builder.add_node(burglary.clone(), vec![], NodeDistribution::CategoricalCpt(b_table)).unwrap();
        let mut a_table = Table::new(vec![burglary.clone()]).unwrap();
        a_table.set(&[0], Categorical::new(alarm.clone(), vec![0.999, 0.001]).unwrap()).unwrap();
        a_table.set(&[1], Categorical::new(alarm.clone(), vec![0.06, 0.94]).unwrap()).unwrap();
        builder
            .add_node(alarm.clone(), vec![burglary.clone()], NodeDistribution::CategoricalCpt(a_table))
            .unwrap();
        builder.set_evidence(alarm.clone(), Evidence::Index(0));
        let net = builder.compile().unwrap();

        let token = crate::cancellation::CancellationToken::new();
        let (trace, _weight) = mpe(&net, std::slice::from_ref(&burglary), &token).unwrap();
        assert_eq!(*trace.get(&burglary).unwrap(), 0);
    }
}
