//! Linear-chain conditional random field engine.
//!
//! `trellis-crf` implements the numeric core of CRF sequence labeling over a
//! constrained state graph:
//!
//! - **State graphs** — [`StateSpace`] with start/stop sentinels and O(1)
//!   transition lookup
//! - **Indexed examples** — [`IndexedExample`] with sparse node and edge
//!   predicate activations
//! - **Inference** — [`ForwardBackward`]: Viterbi, log partition, and
//!   node/edge marginals in one numerically stable log-domain pass
//! - **Training** — [`LogLikelihoodObjective`]: per-example loss and sparse
//!   gradient from gold and expected feature counts
//! - **Tagging** — [`CrfModel`] with Viterbi or max-token decoding
//!
//! All computations are log-domain with log-sum-exp stabilization, so
//! forbidden transitions (potential negative infinity) are absorbing and
//! never produce NaN.

pub mod example;
pub mod forward_backward;
pub mod objective;
pub mod state_space;
pub mod tagger;
pub mod weights;

pub use example::{IndexedExample, SparseVector};
pub use forward_backward::{ForwardBackward, ForwardBackwardResult};
pub use objective::LogLikelihoodObjective;
pub use state_space::{StateSpace, Transition};
pub use tagger::{CrfModel, FeatureEncoder, InferenceMode};
pub use weights::CrfWeightsEncoder;
