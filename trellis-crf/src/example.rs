//! Observation sequences compiled into sparse predicate activations.
//!
//! Feature extraction (out of scope here) turns a raw observation sequence
//! into an [`IndexedExample`]: for every position a sparse set of node
//! predicate activations, for every boundary between adjacent positions a
//! sparse set of edge predicate activations, and (for training data) the gold
//! label indices. All identifiers are dense integers so the numeric kernels
//! never touch domain types.

use trellis_core::{Result, TrellisError};

/// A sparse vector of `(index, value)` activations with strictly ascending
/// indices.
///
/// Iteration is restartable for free (it is slice iteration), which the
/// objective relies on when it traverses the same activations multiple times
/// within one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SparseVector {
    pairs: Vec<(usize, f64)>,
}

impl SparseVector {
    /// An empty activation set.
    pub fn empty() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Build from `(index, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `Config` if indices are not strictly ascending (which also
    /// rules out duplicates) or any value is non-finite.
    pub fn new(pairs: Vec<(usize, f64)>) -> Result<Self> {
        for window in pairs.windows(2) {
            if window[1].0 <= window[0].0 {
                return Err(TrellisError::Config(format!(
                    "sparse indices must be strictly ascending: {} then {}",
                    window[0].0, window[1].0
                )));
            }
        }
        if let Some(&(i, v)) = pairs.iter().find(|&&(_, v)| !v.is_finite()) {
            return Err(TrellisError::Numeric(format!(
                "sparse value at index {i} is not finite: {v}"
            )));
        }
        Ok(Self { pairs })
    }

    /// Iterate over `(index, value)` pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.pairs.iter().copied()
    }

    /// Number of non-zero activations.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no activations.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Largest activation index, or `None` when empty.
    pub fn max_index(&self) -> Option<usize> {
        self.pairs.last().map(|&(i, _)| i)
    }
}

/// An observation sequence with its features already indexed.
///
/// A sequence of length `L` (sentinel positions included) carries `L` node
/// activation sets, `L - 1` edge activation sets, and optionally `L` gold
/// label indices. Node activations at the final position never contribute to
/// chain scores: that position is always the stop sentinel.
#[derive(Debug, Clone)]
pub struct IndexedExample {
    node_predicates: Vec<SparseVector>,
    edge_predicates: Vec<SparseVector>,
    gold_labels: Option<Vec<usize>>,
}

impl IndexedExample {
    /// Build an unlabeled example (inference input).
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the sequence is shorter than 2 or the
    /// edge activation count is not one less than the node activation count.
    pub fn unlabeled(
        node_predicates: Vec<SparseVector>,
        edge_predicates: Vec<SparseVector>,
    ) -> Result<Self> {
        Self::validate_shape(&node_predicates, &edge_predicates)?;
        Ok(Self {
            node_predicates,
            edge_predicates,
            gold_labels: None,
        })
    }

    /// Build a labeled example (training input).
    ///
    /// # Errors
    ///
    /// As [`unlabeled`](Self::unlabeled), plus `DimensionMismatch` if the
    /// gold label count differs from the sequence length.
    pub fn labeled(
        node_predicates: Vec<SparseVector>,
        edge_predicates: Vec<SparseVector>,
        gold_labels: Vec<usize>,
    ) -> Result<Self> {
        Self::validate_shape(&node_predicates, &edge_predicates)?;
        if gold_labels.len() != node_predicates.len() {
            return Err(TrellisError::DimensionMismatch(format!(
                "{} gold labels for sequence of length {}",
                gold_labels.len(),
                node_predicates.len()
            )));
        }
        Ok(Self {
            node_predicates,
            edge_predicates,
            gold_labels: Some(gold_labels),
        })
    }

    fn validate_shape(nodes: &[SparseVector], edges: &[SparseVector]) -> Result<()> {
        if nodes.len() < 2 {
            return Err(TrellisError::DimensionMismatch(format!(
                "sequence length {} is below the minimum of 2",
                nodes.len()
            )));
        }
        if edges.len() != nodes.len() - 1 {
            return Err(TrellisError::DimensionMismatch(format!(
                "{} edge activation sets for sequence of length {}, expected {}",
                edges.len(),
                nodes.len(),
                nodes.len() - 1
            )));
        }
        Ok(())
    }

    /// Sequence length `L`, sentinel positions included.
    pub fn sequence_length(&self) -> usize {
        self.node_predicates.len()
    }

    /// Node predicate activations at `position`.
    pub fn node_predicates(&self, position: usize) -> &SparseVector {
        &self.node_predicates[position]
    }

    /// Edge predicate activations on the boundary `position -> position + 1`.
    pub fn edge_predicates(&self, position: usize) -> &SparseVector {
        &self.edge_predicates[position]
    }

    /// Gold label indices, if this example is labeled.
    pub fn gold_labels(&self) -> Option<&[usize]> {
        self.gold_labels.as_deref()
    }

    /// Whether gold labels are present.
    pub fn is_labeled(&self) -> bool {
        self.gold_labels.is_some()
    }

    /// Largest node predicate index used anywhere in the example.
    pub fn max_node_predicate(&self) -> Option<usize> {
        self.node_predicates.iter().filter_map(SparseVector::max_index).max()
    }

    /// Largest edge predicate index used anywhere in the example.
    pub fn max_edge_predicate(&self) -> Option<usize> {
        self.edge_predicates.iter().filter_map(SparseVector::max_index).max()
    }
}
