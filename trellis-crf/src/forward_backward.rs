//! Log-domain forward-backward message passing over a constrained chain.
//!
//! One [`compute`](ForwardBackward::compute) call consumes a log-potential
//! matrix and produces everything downstream consumers need in a single
//! coherent bundle: the Viterbi best path, the log partition, and node/edge
//! marginals. All sums over path scores are log-sum-exp, so potentials of
//! negative infinity (illegal or forbidden transitions) are absorbing and
//! never produce NaN.
//!
//! Runtime is O(L * T) with O(L * max(S, T)) scratch, for sequence length L,
//! S states, and T transitions.

use trellis_core::logspace::log_sum_exp;
use trellis_core::{Result, TrellisError};

use crate::state_space::StateSpace;

/// Tolerance beyond which a marginal row is renormalized.
const ROW_SUM_DRIFT: f64 = 1e-9;

/// The outputs of one forward-backward pass. Immutable once computed.
#[derive(Debug, Clone)]
pub struct ForwardBackwardResult {
    viterbi: Vec<usize>,
    log_z: f64,
    node_marginals: Vec<Vec<f64>>,
    edge_marginals: Vec<Vec<f64>>,
}

impl ForwardBackwardResult {
    /// The highest-scoring legal state sequence, start and stop included.
    pub fn viterbi(&self) -> &[usize] {
        &self.viterbi
    }

    /// The log partition: log of the summed exp-scores of all legal paths.
    pub fn log_z(&self) -> f64 {
        self.log_z
    }

    /// `node_marginals()[i][s]`: probability that position `i` is in state
    /// `s`. Rows sum to 1.
    pub fn node_marginals(&self) -> &[Vec<f64>] {
        &self.node_marginals
    }

    /// `edge_marginals()[i][t]`: probability that transition `t` occupies
    /// the boundary `i -> i + 1`. Rows sum to 1; illegal transitions are 0.
    pub fn edge_marginals(&self) -> &[Vec<f64>] {
        &self.edge_marginals
    }
}

/// The message-passing kernel, borrowing the shared state space.
#[derive(Debug, Clone, Copy)]
pub struct ForwardBackward<'a, S> {
    state_space: &'a StateSpace<S>,
}

impl<'a, S> ForwardBackward<'a, S> {
    /// Create a kernel over `state_space`.
    pub fn new(state_space: &'a StateSpace<S>) -> Self {
        Self { state_space }
    }

    /// Run forward-backward and Viterbi over a log-potential matrix.
    ///
    /// `potentials[i][t]` is the log score of transition `t` occupying the
    /// boundary between positions `i` and `i + 1`; entries for transitions
    /// that may not occupy that boundary must be negative infinity.
    ///
    /// # Errors
    ///
    /// - `DimensionMismatch` if the matrix is empty or a row length differs
    ///   from the transition count
    /// - `Numeric` if any entry is NaN or positive infinity
    /// - `InfeasibleExample` if no legal path has finite score
    pub fn compute(&self, potentials: &[Vec<f64>]) -> Result<ForwardBackwardResult> {
        let num_states = self.state_space.num_states();
        let num_transitions = self.state_space.num_transitions();
        let start = self.state_space.start_state_index();
        let stop = self.state_space.stop_state_index();

        if potentials.is_empty() {
            return Err(TrellisError::DimensionMismatch(
                "potential matrix has no rows; need sequence length >= 2".into(),
            ));
        }
        for (i, row) in potentials.iter().enumerate() {
            if row.len() != num_transitions {
                return Err(TrellisError::DimensionMismatch(format!(
                    "potential row {i} has length {}, expected {num_transitions}",
                    row.len()
                )));
            }
            for (t, &p) in row.iter().enumerate() {
                if p.is_nan() || p == f64::INFINITY {
                    return Err(TrellisError::Numeric(format!(
                        "potential [{i}][{t}] is {p}; only finite values and -inf are allowed"
                    )));
                }
            }
        }

        let len = potentials.len() + 1;
        let transitions = self.state_space.transitions();

        // Forward messages.
        let mut alpha = vec![vec![f64::NEG_INFINITY; num_states]; len];
        alpha[0][start] = 0.0;
        for i in 0..len - 1 {
            for t in transitions {
                let v = alpha[i][t.from_state] + potentials[i][t.self_index];
                alpha[i + 1][t.to_state] = log_sum_exp(alpha[i + 1][t.to_state], v);
            }
        }

        // Backward messages.
        let mut beta = vec![vec![f64::NEG_INFINITY; num_states]; len];
        beta[len - 1][stop] = 0.0;
        for i in (0..len - 1).rev() {
            for t in transitions {
                let v = potentials[i][t.self_index] + beta[i + 1][t.to_state];
                beta[i][t.from_state] = log_sum_exp(beta[i][t.from_state], v);
            }
        }

        // The canonical log partition comes from the forward pass; the
        // backward value agrees only up to floating-point noise.
        let log_z = alpha[len - 1][stop];
        if log_z.is_nan() {
            return Err(TrellisError::Numeric("log partition is NaN".into()));
        }
        if log_z == f64::NEG_INFINITY {
            return Err(TrellisError::InfeasibleExample);
        }

        // Node marginals.
        let mut node_marginals = vec![vec![0.0; num_states]; len];
        for i in 0..len {
            for s in 0..num_states {
                node_marginals[i][s] = (alpha[i][s] + beta[i][s] - log_z).exp();
            }
            renormalize_row(&mut node_marginals[i]);
        }

        // Edge marginals. exp(-inf) = 0 keeps illegal transitions at
        // exactly zero.
        let mut edge_marginals = vec![vec![0.0; num_transitions]; len - 1];
        for i in 0..len - 1 {
            for t in transitions {
                edge_marginals[i][t.self_index] = (alpha[i][t.from_state]
                    + potentials[i][t.self_index]
                    + beta[i + 1][t.to_state]
                    - log_z)
                    .exp();
            }
            renormalize_row(&mut edge_marginals[i]);
        }

        let viterbi = self.viterbi_path(potentials, len)?;

        Ok(ForwardBackwardResult {
            viterbi,
            log_z,
            node_marginals,
            edge_marginals,
        })
    }

    /// Max-plus traversal with backpointers. Ties break toward the lower
    /// predecessor state index.
    fn viterbi_path(&self, potentials: &[Vec<f64>], len: usize) -> Result<Vec<usize>> {
        let num_states = self.state_space.num_states();
        let start = self.state_space.start_state_index();
        let stop = self.state_space.stop_state_index();
        let transitions = self.state_space.transitions();

        let mut delta = vec![vec![f64::NEG_INFINITY; num_states]; len];
        let mut backpointer = vec![vec![usize::MAX; num_states]; len];
        delta[0][start] = 0.0;

        for i in 0..len - 1 {
            for t in transitions {
                let v = delta[i][t.from_state] + potentials[i][t.self_index];
                if v == f64::NEG_INFINITY {
                    continue;
                }
                let cur = delta[i + 1][t.to_state];
                let better = v > cur
                    || (v == cur && t.from_state < backpointer[i + 1][t.to_state]);
                if better {
                    delta[i + 1][t.to_state] = v;
                    backpointer[i + 1][t.to_state] = t.from_state;
                }
            }
        }

        if delta[len - 1][stop] == f64::NEG_INFINITY {
            return Err(TrellisError::InfeasibleExample);
        }

        let mut path = vec![0; len];
        path[len - 1] = stop;
        for i in (1..len).rev() {
            path[i - 1] = backpointer[i][path[i]];
        }
        debug_assert_eq!(path[0], start);
        Ok(path)
    }

    /// Two-pass max-token decoding.
    ///
    /// Runs forward-backward once, converts the edge marginals back to
    /// log-space (natural log, with 0 mapped to negative infinity), and
    /// re-runs the max-plus pass on those. The returned path maximizes the
    /// product of per-boundary marginals consistent with the state graph,
    /// which can differ from the joint-score Viterbi path.
    ///
    /// # Errors
    ///
    /// As [`compute`](Self::compute).
    pub fn max_token_path(&self, potentials: &[Vec<f64>]) -> Result<Vec<usize>> {
        let first = self.compute(potentials)?;
        let log_marginals: Vec<Vec<f64>> = first
            .edge_marginals
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&p| if p > 0.0 { p.ln() } else { f64::NEG_INFINITY })
                    .collect()
            })
            .collect();
        Ok(self.compute(&log_marginals)?.viterbi)
    }
}

/// Rescale a probability row to sum to 1 if it drifted past tolerance.
fn renormalize_row(row: &mut [f64]) {
    let sum: f64 = row.iter().sum();
    if sum > 0.0 && (sum - 1.0).abs() > ROW_SUM_DRIFT {
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_space::StateSpace;
    use proptest::prelude::*;

    const TOL: f64 = 1e-9;

    /// States {<s>, </s>, A} with the single chain <s> -> A -> ... -> A -> </s>.
    fn single_chain() -> StateSpace<&'static str> {
        StateSpace::new(
            vec!["<s>", "</s>", "A"],
            &"<s>",
            &"</s>",
            &[("<s>", "A"), ("A", "A"), ("A", "</s>")],
        )
        .unwrap()
    }

    /// States {<s>, </s>, A, B} with two disjoint length-3 paths.
    fn two_path() -> StateSpace<&'static str> {
        StateSpace::new(
            vec!["<s>", "</s>", "A", "B"],
            &"<s>",
            &"</s>",
            &[("<s>", "A"), ("<s>", "B"), ("A", "</s>"), ("B", "</s>")],
        )
        .unwrap()
    }

    /// Fully connected inner states {A, B} for property tests.
    fn dense_space() -> StateSpace<&'static str> {
        StateSpace::new(
            vec!["<s>", "</s>", "A", "B"],
            &"<s>",
            &"</s>",
            &[
                ("<s>", "A"),
                ("<s>", "B"),
                ("A", "A"),
                ("A", "B"),
                ("B", "A"),
                ("B", "B"),
                ("A", "</s>"),
                ("B", "</s>"),
            ],
        )
        .unwrap()
    }

    /// Potential matrix of `rows` rows where every legal transition scores 0.
    fn zero_potentials<S>(ss: &StateSpace<S>, rows: usize) -> Vec<Vec<f64>> {
        vec![vec![0.0; ss.num_transitions()]; rows]
    }

    /// Enumerate all legal paths of length `len` and return the maximum
    /// total potential.
    fn brute_force_best<S>(ss: &StateSpace<S>, pot: &[Vec<f64>], len: usize) -> f64 {
        fn go<S>(
            ss: &StateSpace<S>,
            pot: &[Vec<f64>],
            len: usize,
            position: usize,
            state: usize,
            score: f64,
            best: &mut f64,
        ) {
            if position == len - 1 {
                if state == ss.stop_state_index() && score > *best {
                    *best = score;
                }
                return;
            }
            for t in ss.transitions_from(state) {
                let step = pot[position][t.self_index];
                if step > f64::NEG_INFINITY {
                    go(ss, pot, len, position + 1, t.to_state, score + step, best);
                }
            }
        }
        let mut best = f64::NEG_INFINITY;
        go(ss, pot, len, 0, ss.start_state_index(), 0.0, &mut best);
        best
    }

    fn path_score<S>(ss: &StateSpace<S>, pot: &[Vec<f64>], path: &[usize]) -> f64 {
        path.windows(2)
            .enumerate()
            .map(|(i, w)| {
                let t = ss.transition_for(w[0], w[1]).expect("path uses legal transitions");
                pot[i][t.self_index]
            })
            .sum()
    }

    // -----------------------------------------------------------------------
    // Scenario: unique path chain
    // -----------------------------------------------------------------------

    #[test]
    fn unique_path_has_log_z_zero_and_certain_marginals() {
        let ss = single_chain();
        let pot = zero_potentials(&ss, 3); // L = 4
        let fb = ForwardBackward::new(&ss);
        let result = fb.compute(&pot).unwrap();

        // Exactly one legal path of score 0: logZ = log(e^0) = 0.
        assert!((result.log_z() - 0.0).abs() < TOL);

        let a = ss.states().index_of(&"A").unwrap();
        assert!((result.node_marginals()[1][a] - 1.0).abs() < TOL);
        assert!((result.node_marginals()[2][a] - 1.0).abs() < TOL);

        let expected = vec![
            ss.start_state_index(),
            a,
            a,
            ss.stop_state_index(),
        ];
        assert_eq!(result.viterbi(), &expected[..]);
    }

    // -----------------------------------------------------------------------
    // Scenario: two ambiguous paths
    // -----------------------------------------------------------------------

    #[test]
    fn two_path_partition_and_marginals() {
        let ss = two_path();
        let fb = ForwardBackward::new(&ss);
        let a = ss.states().index_of(&"A").unwrap();
        let b = ss.states().index_of(&"B").unwrap();

        let t_sa = ss.transition_for(ss.start_state_index(), a).unwrap().self_index;
        let t_sb = ss.transition_for(ss.start_state_index(), b).unwrap().self_index;

        let mut pot = vec![vec![f64::NEG_INFINITY; ss.num_transitions()]; 2];
        pot[0][t_sa] = 1.0;
        pot[0][t_sb] = 0.5;
        pot[1][ss.transition_for(a, ss.stop_state_index()).unwrap().self_index] = 0.0;
        pot[1][ss.transition_for(b, ss.stop_state_index()).unwrap().self_index] = 0.0;

        let result = fb.compute(&pot).unwrap();

        let expected_log_z = (1.0_f64.exp() + 0.5_f64.exp()).ln();
        assert!((result.log_z() - expected_log_z).abs() < TOL);

        let expected_a = 1.0_f64.exp() / (1.0_f64.exp() + 0.5_f64.exp());
        assert!((result.node_marginals()[1][a] - expected_a).abs() < TOL);
        assert!((result.node_marginals()[1][b] - (1.0 - expected_a)).abs() < 1e-12);

        assert_eq!(result.viterbi()[1], a);
    }

    // -----------------------------------------------------------------------
    // Scenario: -inf potentials on a reachable graph
    // -----------------------------------------------------------------------

    #[test]
    fn neg_inf_potential_zeroes_marginal_without_nan() {
        let ss = two_path();
        let fb = ForwardBackward::new(&ss);
        let b = ss.states().index_of(&"B").unwrap();
        let t_sb = ss.transition_for(ss.start_state_index(), b).unwrap().self_index;

        let mut pot = zero_potentials(&ss, 2);
        pot[0][t_sb] = f64::NEG_INFINITY; // forbid the B branch

        let result = fb.compute(&pot).unwrap();
        assert!(result.log_z().is_finite());
        assert_eq!(result.edge_marginals()[0][t_sb], 0.0);
        assert_eq!(result.node_marginals()[1][b], 0.0);
        for row in result.node_marginals() {
            assert!(row.iter().all(|v| !v.is_nan()));
        }
    }

    // -----------------------------------------------------------------------
    // Failure modes
    // -----------------------------------------------------------------------

    #[test]
    fn all_blocked_is_infeasible() {
        let ss = two_path();
        let fb = ForwardBackward::new(&ss);
        let pot = vec![vec![f64::NEG_INFINITY; ss.num_transitions()]; 2];
        let err = fb.compute(&pot).unwrap_err();
        assert!(matches!(err, TrellisError::InfeasibleExample), "got {err:?}");
    }

    #[test]
    fn nan_and_pos_inf_potentials_rejected() {
        let ss = two_path();
        let fb = ForwardBackward::new(&ss);

        let mut pot = zero_potentials(&ss, 2);
        pot[1][0] = f64::NAN;
        assert!(matches!(fb.compute(&pot).unwrap_err(), TrellisError::Numeric(_)));

        let mut pot = zero_potentials(&ss, 2);
        pot[0][1] = f64::INFINITY;
        assert!(matches!(fb.compute(&pot).unwrap_err(), TrellisError::Numeric(_)));
    }

    #[test]
    fn bad_shapes_rejected() {
        let ss = two_path();
        let fb = ForwardBackward::new(&ss);

        assert!(matches!(
            fb.compute(&[]).unwrap_err(),
            TrellisError::DimensionMismatch(_)
        ));

        let ragged = vec![vec![0.0; ss.num_transitions()], vec![0.0; 2]];
        assert!(matches!(
            fb.compute(&ragged).unwrap_err(),
            TrellisError::DimensionMismatch(_)
        ));
    }

    // -----------------------------------------------------------------------
    // Viterbi tie-breaking
    // -----------------------------------------------------------------------

    #[test]
    fn viterbi_tie_breaks_toward_lower_state_index() {
        // Declare the B transitions first so declaration order and state
        // order disagree.
        let ss = StateSpace::new(
            vec!["<s>", "</s>", "A", "B"],
            &"<s>",
            &"</s>",
            &[("<s>", "B"), ("<s>", "A"), ("B", "</s>"), ("A", "</s>")],
        )
        .unwrap();
        let fb = ForwardBackward::new(&ss);
        let result = fb.compute(&zero_potentials(&ss, 2)).unwrap();

        let a = ss.states().index_of(&"A").unwrap();
        assert_eq!(result.viterbi()[1], a);
    }

    // -----------------------------------------------------------------------
    // Invariants on a dense graph
    // -----------------------------------------------------------------------

    #[test]
    fn marginal_rows_sum_to_one() {
        let ss = dense_space();
        let fb = ForwardBackward::new(&ss);

        // Deterministic pseudo-random finite potentials.
        let mut state = 0x9e3779b97f4a7c15u64;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 6.0 - 3.0
        };
        let pot: Vec<Vec<f64>> = (0..4)
            .map(|_| (0..ss.num_transitions()).map(|_| next()).collect())
            .collect();

        let result = fb.compute(&pot).unwrap();
        for row in result.node_marginals() {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < TOL, "node row sums to {sum}");
        }
        for row in result.edge_marginals() {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < TOL, "edge row sums to {sum}");
        }
    }

    #[test]
    fn edge_marginals_consistent_with_node_marginals() {
        let ss = dense_space();
        let fb = ForwardBackward::new(&ss);
        let mut pot = zero_potentials(&ss, 3);
        pot[0][0] = 0.7;
        pot[1][3] = -1.2;
        pot[2][6] = 0.4;

        let result = fb.compute(&pot).unwrap();
        let len = pot.len() + 1;
        for i in 0..len - 1 {
            for s in 0..ss.num_states() {
                let out_sum: f64 = ss
                    .transitions_from(s)
                    .map(|t| result.edge_marginals()[i][t.self_index])
                    .sum();
                assert!(
                    (out_sum - result.node_marginals()[i][s]).abs() < TOL,
                    "outgoing mass at ({i}, {s})"
                );
                let in_sum: f64 = ss
                    .transitions_to(s)
                    .map(|t| result.edge_marginals()[i][t.self_index])
                    .sum();
                assert!(
                    (in_sum - result.node_marginals()[i + 1][s]).abs() < TOL,
                    "incoming mass at ({i}, {s})"
                );
            }
        }
    }

    #[test]
    fn gold_path_score_bounded_by_log_z() {
        let ss = dense_space();
        let fb = ForwardBackward::new(&ss);
        let mut pot = zero_potentials(&ss, 3);
        pot[1][2] = 2.5;

        let result = fb.compute(&pot).unwrap();
        let score = path_score(&ss, &pot, result.viterbi());
        assert!(score <= result.log_z() + TOL);
    }

    proptest! {
        #[test]
        fn random_potentials_satisfy_invariants(
            values in proptest::collection::vec(-4.0f64..4.0, 4 * 8),
        ) {
            let ss = dense_space();
            let fb = ForwardBackward::new(&ss);
            let t = ss.num_transitions();
            let pot: Vec<Vec<f64>> =
                values.chunks(t).map(|chunk| chunk.to_vec()).collect();
            let len = pot.len() + 1;

            let result = fb.compute(&pot).unwrap();

            // Rows normalize.
            for row in result.node_marginals() {
                let sum: f64 = row.iter().sum();
                prop_assert!((sum - 1.0).abs() < 1e-9);
            }
            for row in result.edge_marginals() {
                let sum: f64 = row.iter().sum();
                prop_assert!((sum - 1.0).abs() < 1e-9);
            }

            // Viterbi is optimal among all legal paths.
            let best = brute_force_best(&ss, &pot, len);
            let viterbi_score = path_score(&ss, &pot, result.viterbi());
            prop_assert!((viterbi_score - best).abs() < 1e-9);

            // No path outscores the partition.
            prop_assert!(best <= result.log_z() + 1e-9);
        }
    }

    // -----------------------------------------------------------------------
    // Max-token decoding
    // -----------------------------------------------------------------------

    #[test]
    fn max_token_matches_viterbi_on_unambiguous_chain() {
        let ss = single_chain();
        let fb = ForwardBackward::new(&ss);
        let pot = zero_potentials(&ss, 3);
        let viterbi = fb.compute(&pot).unwrap().viterbi().to_vec();
        let max_token = fb.max_token_path(&pot).unwrap();
        assert_eq!(viterbi, max_token);
    }
}
