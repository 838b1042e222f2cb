use bn_core::distributions::{Categorical, Dirichlet, Gaussian, Value};
use bn_core::factor::Factor;
use bn_core::network::{Evidence, Network, NetworkBuilder, NodeDistribution};
use bn_core::rate_matrix;
use bn_core::rng::BnRng;
use bn_core::table::Table;
use bn_core::variable::{Domain, Variable};
use bn_core::{inference, substitution};
use rand::Rng;
use std::sync::Arc;

fn boolean_var(name: &str) -> Variable {
    Variable::enumerable(name, Arc::new(Domain::boolean(name)))
}

/// The classic Russell & Norvig burglary network, extended with
/// `JohnCalls`/`MaryCalls` so evidence on both children pins the same
/// posterior the textbook example reports.
fn burglary_network(evidence_john: bool, evidence_mary: bool) -> Network {
    let burglary = boolean_var("burglary");
    let earthquake = boolean_var("earthquake");
    let alarm = boolean_var("alarm");
    let john = boolean_var("john_calls");
    let mary = boolean_var("mary_calls");

    let mut builder = NetworkBuilder::new();

    let mut b = Table::new(vec![]).unwrap();
    b.set(&[], Categorical::new(burglary.clone(), vec![0.999, 0.001]).unwrap()).unwrap();
    builder.add_node(burglary.clone(), vec![], NodeDistribution::CategoricalCpt(b)).unwrap();

    let mut e = Table::new(vec![]).unwrap();
    e.set(&[], Categorical::new(earthquake.clone(), vec![0.998, 0.002]).unwrap()).unwrap();
    builder.add_node(earthquake.clone(), vec![], NodeDistribution::CategoricalCpt(e)).unwrap();

    let mut a = Table::new(vec![burglary.clone(), earthquake.clone()]).unwrap();
    a.set(&[0, 0], Categorical::new(alarm.clone(), vec![0.999, 0.001]).unwrap()).unwrap();
    a.set(&[1, 0], Categorical::new(alarm.clone(), vec![0.06, 0.94]).unwrap()).unwrap();
    a.set(&[0, 1], Categorical::new(alarm.clone(), vec![0.71, 0.29]).unwrap()).unwrap();
    a.set(&[1, 1], Categorical::new(alarm.clone(), vec![0.05, 0.95]).unwrap()).unwrap();
    builder
        .add_node(alarm.clone(), vec![burglary.clone(), earthquake.clone()], NodeDistribution::CategoricalCpt(a))
        .unwrap();

    let mut j = Table::new(vec![alarm.clone()]).unwrap();
    j.set(&[0], Categorical::new(john.clone(), vec![0.95, 0.05]).unwrap()).unwrap();
    j.set(&[1], Categorical::new(john.clone(), vec![0.10, 0.90]).unwrap()).unwrap();
    builder.add_node(john.clone(), vec![alarm.clone()], NodeDistribution::CategoricalCpt(j)).unwrap();

    let mut m = Table::new(vec![alarm.clone()]).unwrap();
    m.set(&[0], Categorical::new(mary.clone(), vec![0.99, 0.01]).unwrap()).unwrap();
    m.set(&[1], Categorical::new(mary.clone(), vec![0.30, 0.70]).unwrap()).unwrap();
    builder.add_node(mary.clone(), vec![alarm.clone()], NodeDistribution::CategoricalCpt(m)).unwrap();

    builder.set_evidence(john.clone(), Evidence::Index(evidence_john as usize));
    builder.set_evidence(mary.clone(), Evidence::Index(evidence_mary as usize));

    builder.compile().unwrap()
}

#[test]
fn scenario_1_burglary_posterior_matches_russell_norvig() {
    let net = burglary_network(true, true);
    let burglary = net.variables().find(|v| v.name() == "burglary").unwrap().clone();
    let token = bn_core::cancellation::CancellationToken::new();
    let posterior = inference::marginal(&net, std::slice::from_ref(&burglary), &token).unwrap();
    assert!((posterior.cell(1).weight - 0.2841).abs() < 1e-3);
}

#[test]
fn scenario_2_lg_short_branch_is_diagonally_dominant() {
    let model = rate_matrix::named_model("LG").unwrap();
    let probs = model.probs(0.1).unwrap();
    for i in 0..model.alphabet().len() {
        assert!(probs[(i, i)] > 0.8, "row {i} self-transition {} too low", probs[(i, i)]);
    }
}

#[test]
fn scenario_3_dirichlet_sampling_mean_matches_alpha_over_sum() {
    let x = Variable::enumerable("mix", Arc::new(Domain::range("mix", 3)));
    let alpha = vec![2.0, 3.0, 5.0];
    let dir = Dirichlet::new(x, alpha.clone()).unwrap();
    let mut rng = BnRng::seeded(11);

    // A reduced-but-meaningful sample count (10^4 instead of 10^6) keeps
    // this test fast; the tolerance is widened accordingly.
    let n = 10_000;
    let mut sums = vec![0.0; alpha.len()];
    for _ in 0..n {
        let sample = dir.sample(&mut rng);
        for (i, s) in sample.iter().enumerate() {
            sums[i] += s;
        }
    }
    let total: f64 = alpha.iter().sum();
    for (i, sum) in sums.iter().enumerate() {
        let empirical_mean = sum / n as f64;
        let expected = alpha[i] / total;
        assert!((empirical_mean - expected).abs() < 0.03, "component {i}: {empirical_mean} vs {expected}");
    }
}

#[test]
fn scenario_5_product_tree_matches_linear_fold() {
    let vars: Vec<Variable> = (0..10).map(|i| Variable::enumerable(format!("v{i}"), Arc::new(Domain::boolean(format!("v{i}"))))).collect();

    for seed in 0..20u64 {
        let mut rng = BnRng::seeded(seed);
        let mut factors = Vec::with_capacity(8);
        for _ in 0..8 {
            let scope_size = 1 + (seed as usize + factors.len()) % 3;
            let mut scope: Vec<Variable> = vars.iter().take(scope_size).cloned().collect();
            scope.sort_by_key(|v| v.canonical_index());
            let size = 1usize << scope.len();
            let weights: Vec<f64> = (0..size)
                .map(|_| 0.1 + rng.inner().random::<f64>())
                .collect();
            factors.push(Factor::from_weights(scope, weights).unwrap());
        }

        let linear = factors
            .iter()
            .skip(1)
            .try_fold(factors[0].clone(), |acc, f| acc.product(f))
            .unwrap();
        let tree = bn_core::factor::build_product_tree(factors).unwrap();

        assert_eq!(linear.scope().len(), tree.scope().len());
        for idx in 0..linear.size() {
            let key = linear.key_of(idx);
            let other_idx = tree.index_of(&key).unwrap();
            let ratio = linear.cell(idx).weight / tree.cell(other_idx).weight;
            assert!((0.999..=1.001).contains(&ratio), "seed {seed}: ratio {ratio} out of tolerance");
        }
    }
}

#[test]
fn scenario_6_mpe_on_hybrid_gaussian_switch_prefers_matching_component() {
    let switch = boolean_var("switch");
    let x = Variable::continuous("x");

    let mut builder = NetworkBuilder::new();
    let mut s_table = Table::new(vec![]).unwrap();
    s_table.set(&[], Categorical::uniform(switch.clone()).unwrap()).unwrap();
    builder.add_node(switch.clone(), vec![], NodeDistribution::CategoricalCpt(s_table)).unwrap();

    let mut g_table: Table<Gaussian> = Table::new(vec![switch.clone()]).unwrap();
    g_table.set(&[0], Gaussian::new(0.0, 1.0).unwrap()).unwrap();
    g_table.set(&[1], Gaussian::new(5.0, 1.0).unwrap()).unwrap();
    builder.add_node(x.clone(), vec![switch.clone()], NodeDistribution::GaussianTable(g_table)).unwrap();

    builder.set_evidence(x.clone(), Evidence::Value(Value::Scalar(0.1)));
    let net = builder.compile().unwrap();

    let token = bn_core::cancellation::CancellationToken::new();
    let (trace, _weight) = inference::mpe(&net, std::slice::from_ref(&switch), &token).unwrap();
    assert_eq!(*trace.get(&switch).unwrap(), 0);

    let density_at_winner = Gaussian::new(0.0, 1.0).unwrap().density(0.1);
    let density_at_other = Gaussian::new(5.0, 1.0).unwrap().density(0.1);
    assert!(density_at_winner > density_at_other);
}

#[test]
fn ancestral_reconstruction_recovers_shared_root_symbol() {
    let model = rate_matrix::named_model("JTT").unwrap();
    let tree = substitution::Tree {
        labels: vec!["root".into(), "a".into(), "b".into(), "c".into()],
        parent: vec![None, Some(0), Some(0), Some(0)],
        branch_length: vec![0.0, 0.05, 0.05, 0.05],
        is_leaf: vec![false, true, true, true],
    };
    let alignment: substitution::Alignment = vec![vec![Some(2), Some(2), Some(2)]];
    let token = bn_core::cancellation::CancellationToken::new();
    let result = substitution::reconstruct(&tree, &alignment, &model, substitution::GapHandling::Missing, None, &token).unwrap();
    assert_eq!(result[0][0], 2);
}

#[test]
fn factor_weights_stay_non_negative_and_finite_under_sum_and_product() {
    let vars: Vec<Variable> = (0..4).map(|i| Variable::enumerable(format!("w{i}"), Arc::new(Domain::boolean(format!("w{i}"))))).collect();
    let a = Factor::from_weights(vec![vars[0].clone(), vars[1].clone()], vec![0.1, 0.4, 0.2, 0.3]).unwrap();
    let b = Factor::from_weights(vec![vars[1].clone(), vars[2].clone()], vec![0.6, 0.1, 0.25, 0.05]).unwrap();
    let joined = a.product(&b).unwrap();
    for (_, cell) in joined.iter() {
        assert!(cell.weight >= 0.0 && cell.weight.is_finite());
    }
    let summed = joined.sum_out(std::slice::from_ref(&vars[1])).unwrap();
    for (_, cell) in summed.iter() {
        assert!(cell.weight >= 0.0 && cell.weight.is_finite());
    }
}
