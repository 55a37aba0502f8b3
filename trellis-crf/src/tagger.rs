//! Sequence tagging: thin composition of encoding, potentials, and decoding.
//!
//! A [`CrfModel`] owns a trained parameter vector together with the encoders
//! that give it meaning, and answers "what is the best label sequence for
//! this input" in one of two modes: joint-score Viterbi, or max-token
//! decoding over edge marginals.

use trellis_core::{Result, TrellisError};

use crate::example::IndexedExample;
use crate::forward_backward::ForwardBackward;
use crate::weights::CrfWeightsEncoder;

/// How [`CrfModel::best_guess`] picks the output sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InferenceMode {
    /// The single highest-scoring legal path.
    #[default]
    Viterbi,
    /// The legal path maximizing the product of per-boundary edge marginals.
    MaxToken,
}

/// Turns a raw observation sequence into an [`IndexedExample`].
///
/// Feature extraction lives outside the engine; this is the seam it plugs
/// into. Implementations must wrap the sequence in the start/stop sentinel
/// positions expected by the state space.
pub trait FeatureEncoder<O> {
    /// Compile `input` into indexed predicate activations.
    fn indexed_example(&self, input: &[O]) -> Result<IndexedExample>;
}

/// A trained linear-chain CRF ready for inference.
#[derive(Debug, Clone)]
pub struct CrfModel<S, E> {
    feature_encoder: E,
    weights_encoder: CrfWeightsEncoder<S>,
    weights: Vec<f64>,
    inference_mode: InferenceMode,
}

impl<S, E> CrfModel<S, E> {
    /// Assemble a model from its parts.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `weights` does not match the encoder's
    /// [`num_weights`](CrfWeightsEncoder::num_weights).
    pub fn new(
        feature_encoder: E,
        weights_encoder: CrfWeightsEncoder<S>,
        weights: Vec<f64>,
    ) -> Result<Self> {
        if weights.len() != weights_encoder.num_weights() {
            return Err(TrellisError::DimensionMismatch(format!(
                "weight vector has {} entries, encoder needs {}",
                weights.len(),
                weights_encoder.num_weights()
            )));
        }
        Ok(Self {
            feature_encoder,
            weights_encoder,
            weights,
            inference_mode: InferenceMode::default(),
        })
    }

    /// Switch between Viterbi and max-token decoding.
    pub fn set_inference_mode(&mut self, mode: InferenceMode) {
        self.inference_mode = mode;
    }

    /// The current decoding mode.
    pub fn inference_mode(&self) -> InferenceMode {
        self.inference_mode
    }

    /// The weights encoder backing this model.
    pub fn weights_encoder(&self) -> &CrfWeightsEncoder<S> {
        &self.weights_encoder
    }

    /// Decode a pre-indexed example into state indices, start and stop
    /// sentinels included.
    ///
    /// # Errors
    ///
    /// Any error of potential filling or the forward-backward pass.
    pub fn decode(&self, example: &IndexedExample) -> Result<Vec<usize>> {
        let potentials = self.weights_encoder.fill_potentials(&self.weights, example)?;
        let fb = ForwardBackward::new(self.weights_encoder.state_space());
        match self.inference_mode {
            InferenceMode::Viterbi => Ok(fb.compute(&potentials)?.viterbi().to_vec()),
            InferenceMode::MaxToken => fb.max_token_path(&potentials),
        }
    }
}

impl<S: Clone, E> CrfModel<S, E> {
    /// Tag an observation sequence, returning state values with the start
    /// and stop sentinels included. Callers that want only the inner labels
    /// strip the first and last element.
    ///
    /// # Errors
    ///
    /// Any error of the feature encoder, potential filling, or decoding.
    pub fn best_guess<O>(&self, input: &[O]) -> Result<Vec<S>>
    where
        E: FeatureEncoder<O>,
    {
        let example = self.feature_encoder.indexed_example(input)?;
        let path = self.decode(&example)?;
        let states = self.weights_encoder.state_space().states();
        path.iter()
            .map(|&s| {
                states.get(s).cloned().ok_or_else(|| {
                    TrellisError::Numeric(format!("decoded state index {s} out of range"))
                })
            })
            .collect()
    }
}
