//! Mapping between feature space and the flat parameter vector.
//!
//! A weight exists for every (node predicate, state) pair and every
//! (edge predicate, transition) pair. The parameter vector is laid out as the
//! node block followed by the edge block:
//!
//! ```text
//! node weight (p, s):  p * num_states      + s
//! edge weight (p, t):  node_block + p * num_transitions + t
//! ```
//!
//! [`fill_potentials`](CrfWeightsEncoder::fill_potentials) combines the two
//! blocks into the per-boundary log-potential matrix the forward-backward
//! kernel consumes: the potential of transition `t = (s -> s')` at boundary
//! `i` is the node score of position `i` in state `s` plus the edge score of
//! the boundary under `t`.

use trellis_core::{Result, TrellisError};

use crate::example::IndexedExample;
use crate::state_space::StateSpace;

/// Encodes (predicate, state/transition) pairs as flat weight indices and
/// materializes log-potential matrices under a parameter vector.
#[derive(Debug, Clone)]
pub struct CrfWeightsEncoder<S> {
    state_space: StateSpace<S>,
    num_node_predicates: usize,
    num_edge_predicates: usize,
}

impl<S> CrfWeightsEncoder<S> {
    /// Create an encoder for the given state space and predicate vocabulary
    /// sizes.
    pub fn new(
        state_space: StateSpace<S>,
        num_node_predicates: usize,
        num_edge_predicates: usize,
    ) -> Self {
        Self {
            state_space,
            num_node_predicates,
            num_edge_predicates,
        }
    }

    /// The state space this encoder scores against.
    pub fn state_space(&self) -> &StateSpace<S> {
        &self.state_space
    }

    /// Size of the node predicate vocabulary.
    pub fn num_node_predicates(&self) -> usize {
        self.num_node_predicates
    }

    /// Size of the edge predicate vocabulary.
    pub fn num_edge_predicates(&self) -> usize {
        self.num_edge_predicates
    }

    /// Total parameter vector length (node block plus edge block).
    pub fn num_weights(&self) -> usize {
        self.num_node_predicates * self.state_space.num_states()
            + self.num_edge_predicates * self.state_space.num_transitions()
    }

    /// Weight index of node predicate `predicate` firing in `state`.
    #[inline]
    pub fn node_weight_index(&self, predicate: usize, state: usize) -> usize {
        predicate * self.state_space.num_states() + state
    }

    /// Weight index of edge predicate `predicate` firing on `transition`.
    #[inline]
    pub fn edge_weight_index(&self, predicate: usize, transition: usize) -> usize {
        self.num_node_predicates * self.state_space.num_states()
            + predicate * self.state_space.num_transitions()
            + transition
    }

    /// Materialize the `(L - 1) x num_transitions` log-potential matrix for
    /// `example` under `params`. Entries for illegal transitions are negative
    /// infinity.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `params` does not have
    /// [`num_weights`](Self::num_weights) entries or the example references a
    /// predicate outside the declared vocabularies.
    pub fn fill_potentials(&self, params: &[f64], example: &IndexedExample) -> Result<Vec<Vec<f64>>> {
        if params.len() != self.num_weights() {
            return Err(TrellisError::DimensionMismatch(format!(
                "parameter vector has {} entries, encoder needs {}",
                params.len(),
                self.num_weights()
            )));
        }
        if let Some(max) = example.max_node_predicate() {
            if max >= self.num_node_predicates {
                return Err(TrellisError::DimensionMismatch(format!(
                    "node predicate {max} out of range for vocabulary of {}",
                    self.num_node_predicates
                )));
            }
        }
        if let Some(max) = example.max_edge_predicate() {
            if max >= self.num_edge_predicates {
                return Err(TrellisError::DimensionMismatch(format!(
                    "edge predicate {max} out of range for vocabulary of {}",
                    self.num_edge_predicates
                )));
            }
        }

        let num_states = self.state_space.num_states();
        let num_transitions = self.state_space.num_transitions();
        let len = example.sequence_length();

        let mut potentials = vec![vec![f64::NEG_INFINITY; num_transitions]; len - 1];
        let mut node_scores = vec![0.0; num_states];
        let mut edge_scores = vec![0.0; num_transitions];

        for i in 0..len - 1 {
            node_scores.fill(0.0);
            for (predicate, value) in example.node_predicates(i).iter() {
                for s in 0..num_states {
                    node_scores[s] += value * params[self.node_weight_index(predicate, s)];
                }
            }
            edge_scores.fill(0.0);
            for (predicate, value) in example.edge_predicates(i).iter() {
                for t in 0..num_transitions {
                    edge_scores[t] += value * params[self.edge_weight_index(predicate, t)];
                }
            }
            for t in self.state_space.transitions() {
                potentials[i][t.self_index] = node_scores[t.from_state] + edge_scores[t.self_index];
            }
        }
        Ok(potentials)
    }
}
