//! Per-example log-likelihood and its gradient.
//!
//! The conditional log-likelihood of a labeled example decomposes into a
//! gold (numerator) part and an expected (denominator) part:
//!
//! - the gold part is the summed log-potential along the gold path, and its
//!   gradient contribution adds each observed feature activation once;
//! - the expected part is the log partition, and its gradient contribution
//!   subtracts each activation weighted by the model's current node or edge
//!   marginal.
//!
//! The returned value is log-likelihood, to be maximized. Callers that
//! minimize must negate both the value and the gradient.
//!
//! Accumulation order is fixed (positions ascending, activations in sparse
//! order, states and transitions in index order), so identical inputs produce
//! bit-identical outputs on a given platform.

use std::fmt::Debug;

use trellis_core::parallel::map_reduce;
use trellis_core::{Result, TrellisError};

use crate::example::IndexedExample;
use crate::forward_backward::ForwardBackward;
use crate::weights::CrfWeightsEncoder;

/// Evaluates per-example loss and gradient against a shared weights encoder.
#[derive(Debug, Clone, Copy)]
pub struct LogLikelihoodObjective<'a, S> {
    encoder: &'a CrfWeightsEncoder<S>,
}

impl<'a, S: Debug> LogLikelihoodObjective<'a, S> {
    /// Create an objective over `encoder`'s state space and weight layout.
    pub fn new(encoder: &'a CrfWeightsEncoder<S>) -> Self {
        Self { encoder }
    }

    /// Evaluate one labeled example: returns its log-likelihood contribution
    /// and accumulates the gradient into `grad`.
    ///
    /// `grad` must have [`num_weights`](CrfWeightsEncoder::num_weights)
    /// entries and is added to, not overwritten, so per-worker buffers can be
    /// reused across examples.
    ///
    /// # Errors
    ///
    /// - `UnlabeledExample` if the example has no gold labels
    /// - `IllegalGoldPath` if the gold sequence is not wrapped in the
    ///   start/stop sentinels or uses a transition absent from the state space
    /// - `DimensionMismatch` if `grad` or the parameter vector disagree with
    ///   the encoder, or a gold label is not a valid state index
    /// - any error of the forward-backward pass
    pub fn evaluate(
        &self,
        example: &IndexedExample,
        params: &[f64],
        grad: &mut [f64],
    ) -> Result<f64> {
        let gold = example.gold_labels().ok_or(TrellisError::UnlabeledExample)?;
        if grad.len() != self.encoder.num_weights() {
            return Err(TrellisError::DimensionMismatch(format!(
                "gradient buffer has {} entries, encoder needs {}",
                grad.len(),
                self.encoder.num_weights()
            )));
        }

        let state_space = self.encoder.state_space();
        if let Some(&bad) = gold.iter().find(|&&s| s >= state_space.num_states()) {
            return Err(TrellisError::DimensionMismatch(format!(
                "gold label {bad} is not a state index (num states {})",
                state_space.num_states()
            )));
        }
        if gold[0] != state_space.start_state_index()
            || gold[gold.len() - 1] != state_space.stop_state_index()
        {
            return Err(TrellisError::IllegalGoldPath(
                "gold sequence is not wrapped in the start/stop sentinels".into(),
            ));
        }

        let potentials = self.encoder.fill_potentials(params, example)?;
        let fb = ForwardBackward::new(state_space);
        let result = fb.compute(&potentials)?;

        // Gold (numerator) contribution.
        let mut log_num = 0.0;
        for i in 0..gold.len() - 1 {
            let (from, to) = (gold[i], gold[i + 1]);
            let transition = state_space.transition_for(from, to).ok_or_else(|| {
                let states = state_space.states().as_slice();
                TrellisError::IllegalGoldPath(format!(
                    "no transition {:?} -> {:?} at position {i}",
                    states[from], states[to]
                ))
            })?;
            log_num += potentials[i][transition.self_index];
            for (predicate, value) in example.node_predicates(i).iter() {
                grad[self.encoder.node_weight_index(predicate, from)] += value;
            }
            for (predicate, value) in example.edge_predicates(i).iter() {
                grad[self.encoder.edge_weight_index(predicate, transition.self_index)] += value;
            }
        }

        // Expected (denominator) contribution.
        let log_den = result.log_z();
        let node_marginals = result.node_marginals();
        let edge_marginals = result.edge_marginals();
        let num_states = state_space.num_states();
        let num_transitions = state_space.num_transitions();
        for i in 0..example.sequence_length() - 1 {
            for (predicate, value) in example.node_predicates(i).iter() {
                for s in 0..num_states {
                    grad[self.encoder.node_weight_index(predicate, s)] -=
                        value * node_marginals[i][s];
                }
            }
            for (predicate, value) in example.edge_predicates(i).iter() {
                for t in 0..num_transitions {
                    grad[self.encoder.edge_weight_index(predicate, t)] -=
                        value * edge_marginals[i][t];
                }
            }
        }

        debug_assert!(
            log_num <= log_den + 1e-6,
            "gold path outscores the partition: {log_num} > {log_den}"
        );
        Ok(log_num - log_den)
    }

    /// Evaluate a batch of labeled examples, returning the summed
    /// log-likelihood and a freshly allocated gradient.
    ///
    /// Fans out over [`map_reduce`] with per-worker gradient buffers; with
    /// the `parallel` feature disabled this is a sequential loop. The first
    /// error encountered aborts the batch.
    pub fn evaluate_batch(&self, examples: &[IndexedExample], params: &[f64]) -> Result<(f64, Vec<f64>)>
    where
        S: Sync,
    {
        struct Acc {
            loss: f64,
            grad: Vec<f64>,
            error: Option<TrellisError>,
        }

        let num_weights = self.encoder.num_weights();
        let acc = map_reduce(
            examples,
            || Acc {
                loss: 0.0,
                grad: vec![0.0; num_weights],
                error: None,
            },
            |acc, example| {
                if acc.error.is_some() {
                    return;
                }
                match self.evaluate(example, params, &mut acc.grad) {
                    Ok(loss) => acc.loss += loss,
                    Err(e) => acc.error = Some(e),
                }
            },
            |total, partial| {
                if total.error.is_none() {
                    if let Some(e) = partial.error {
                        total.error = Some(e);
                        return;
                    }
                    total.loss += partial.loss;
                    for (t, p) in total.grad.iter_mut().zip(partial.grad) {
                        *t += p;
                    }
                }
            },
        );

        match acc.error {
            Some(e) => Err(e),
            None => Ok((acc.loss, acc.grad)),
        }
    }
}
