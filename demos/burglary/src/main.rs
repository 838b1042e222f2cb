use bn::*;
use std::sync::Arc;

fn main() {
    init_logging();

    let burglary = Variable::enumerable("burglary", Arc::new(Domain::boolean("burglary")));
    let earthquake = Variable::enumerable("earthquake", Arc::new(Domain::boolean("earthquake")));
    let alarm = Variable::enumerable("alarm", Arc::new(Domain::boolean("alarm")));

    let mut builder = NetworkBuilder::new();

    let mut b_table = Table::new(vec![]).unwrap();
    b_table.set(&[], Categorical::new(burglary.clone(), vec![0.999, 0.001]).unwrap()).unwrap();
    builder.add_node(burglary.clone(), vec![], NodeDistribution::CategoricalCpt(b_table)).unwrap();

    let mut e_table = Table::new(vec![]).unwrap();
    e_table.set(&[], Categorical::new(earthquake.clone(), vec![0.998, 0.002]).unwrap()).unwrap();
    builder.add_node(earthquake.clone(), vec![], NodeDistribution::CategoricalCpt(e_table)).unwrap();

    let mut a_table = Table::new(vec![burglary.clone(), earthquake.clone()]).unwrap();
    a_table.set(&[0, 0], Categorical::new(alarm.clone(), vec![0.999, 0.001]).unwrap()).unwrap();
    a_table.set(&[1, 0], Categorical::new(alarm.clone(), vec![0.06, 0.94]).unwrap()).unwrap();
    a_table.set(&[0, 1], Categorical::new(alarm.clone(), vec![0.71, 0.29]).unwrap()).unwrap();
    a_table.set(&[1, 1], Categorical::new(alarm.clone(), vec![0.05, 0.95]).unwrap()).unwrap();
    builder
        .add_node(alarm.clone(), vec![burglary.clone(), earthquake.clone()], NodeDistribution::CategoricalCpt(a_table))
        .unwrap();

    builder.set_evidence(alarm.clone(), Evidence::Index(1));
    let net = builder.compile().unwrap();
    let cancellation = CancellationToken::new();

    let posterior = marginal(&net, &[burglary.clone()], &cancellation).unwrap();
    println!(
        "P(burglary | alarm=true) = [no: {:.4}, yes: {:.4}]",
        posterior.cell(0).weight,
        posterior.cell(1).weight,
    );

    let (trace, weight) = mpe(&net, &[burglary.clone(), earthquake.clone()], &cancellation).unwrap();
    println!(
        "MPE given alarm=true: burglary={}, earthquake={} (weight {:.6})",
        trace[&burglary], trace[&earthquake], weight,
    );
}
