use criterion::{black_box, criterion_group, criterion_main, Criterion};

use trellis_crf::example::{IndexedExample, SparseVector};
use trellis_crf::forward_backward::ForwardBackward;
use trellis_crf::objective::LogLikelihoodObjective;
use trellis_crf::state_space::StateSpace;
use trellis_crf::weights::CrfWeightsEncoder;

fn random_values(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
        })
        .collect()
}

/// A BIO-style space: start/stop plus `k` inner states, fully connected.
fn dense_space(k: usize) -> StateSpace<String> {
    let mut states = vec!["<s>".to_string(), "</s>".to_string()];
    for i in 0..k {
        states.push(format!("S{i}"));
    }
    let inner: Vec<String> = states[2..].to_vec();
    let mut pairs = Vec::new();
    for s in &inner {
        pairs.push(("<s>".to_string(), s.clone()));
        pairs.push((s.clone(), "</s>".to_string()));
        for t in &inner {
            pairs.push((s.clone(), t.clone()));
        }
    }
    StateSpace::new(states, &"<s>".to_string(), &"</s>".to_string(), &pairs).unwrap()
}

fn bench_forward_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_backward");

    for &k in &[5usize, 15] {
        let ss = dense_space(k);
        let t = ss.num_transitions();
        let rows = 40;
        let values = random_values(rows * t, 42);
        let pot: Vec<Vec<f64>> = values.chunks(t).map(|chunk| chunk.to_vec()).collect();
        let fb = ForwardBackward::new(&ss);

        group.bench_function(format!("{k}_states_len_40"), |b| {
            b.iter(|| fb.compute(black_box(&pot)))
        });
    }

    group.finish();
}

fn bench_objective(c: &mut Criterion) {
    let mut group = c.benchmark_group("objective");

    let k = 8;
    let ss = dense_space(k);
    let inner_first = 2; // first non-sentinel state index
    let len = 30;
    let num_node_preds = 200;
    let num_edge_preds = 50;

    let mut gold = vec![ss.start_state_index()];
    for i in 0..len - 2 {
        gold.push(inner_first + (i % k));
    }
    gold.push(ss.stop_state_index());

    // ~5 active predicates per position.
    let nodes: Vec<SparseVector> = (0..len)
        .map(|i| {
            let pairs: Vec<(usize, f64)> =
                (0..5).map(|j| ((i * 17 + j * 31) % num_node_preds, 1.0)).collect();
            let mut sorted = pairs;
            sorted.sort_unstable_by_key(|&(p, _)| p);
            sorted.dedup_by_key(|&mut (p, _)| p);
            SparseVector::new(sorted).unwrap()
        })
        .collect();
    let edges: Vec<SparseVector> = (0..len - 1)
        .map(|i| SparseVector::new(vec![((i * 7) % num_edge_preds, 1.0)]).unwrap())
        .collect();
    let example = IndexedExample::labeled(nodes, edges, gold).unwrap();

    let encoder = CrfWeightsEncoder::new(ss, num_node_preds, num_edge_preds);
    let params = random_values(encoder.num_weights(), 7);
    let objective = LogLikelihoodObjective::new(&encoder);

    group.bench_function("evaluate_len_30", |b| {
        b.iter(|| {
            let mut grad = vec![0.0; encoder.num_weights()];
            objective.evaluate(black_box(&example), black_box(&params), &mut grad)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_forward_backward, bench_objective);
criterion_main!(benches);
