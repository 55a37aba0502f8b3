//! The legal transition graph over label states.
//!
//! A [`StateSpace`] is a directed graph whose nodes are label states
//! (including distinguished start and stop sentinels) and whose edges are the
//! transitions a path may use. Transitions carry a dense `self_index`
//! assigned in declaration order, so downstream numeric code can store
//! per-transition quantities in flat arrays and look an edge up by
//! `(from, to)` in constant time.
//!
//! State spaces are built once, validated eagerly, and shared read-only by
//! every example afterwards.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use trellis_core::{Indexer, Result, TrellisError};

/// A directed edge between two states.
///
/// `self_index` is the transition's position in the dense transition range
/// `[0, num_transitions)`, distinct from the state indices it connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transition {
    /// Index of the source state.
    pub from_state: usize,
    /// Index of the target state.
    pub to_state: usize,
    /// Dense index of this transition among all transitions.
    pub self_index: usize,
}

/// A finite state graph with start/stop sentinels and O(1) edge lookup.
#[derive(Debug, Clone)]
pub struct StateSpace<S> {
    states: Indexer<S>,
    transitions: Vec<Transition>,
    by_pair: HashMap<(usize, usize), usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    start_state: usize,
    stop_state: usize,
}

impl<S: Eq + Hash + Clone + Debug> StateSpace<S> {
    /// Build a state space from an explicit state list and allowed
    /// `(from, to)` transition pairs.
    ///
    /// Transition pairs receive dense `self_index` values in declaration
    /// order. Every legal path must start at `start` and end at `stop`, so
    /// edges into the start state or out of the stop state are rejected.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `states` contains a duplicate, `start` or `stop`
    /// is not among the states, a pair references an unknown state, a pair is
    /// declared twice, or a pair enters `start` / leaves `stop`.
    pub fn new(states: Vec<S>, start: &S, stop: &S, pairs: &[(S, S)]) -> Result<Self> {
        let num_declared = states.len();
        let states = Indexer::from_elements(states);
        if states.len() != num_declared {
            return Err(TrellisError::Config(format!(
                "duplicate states: {num_declared} declared, {} distinct",
                states.len()
            )));
        }

        let start_state = states
            .index_of(start)
            .ok_or_else(|| TrellisError::Config(format!("start state {start:?} not among states")))?;
        let stop_state = states
            .index_of(stop)
            .ok_or_else(|| TrellisError::Config(format!("stop state {stop:?} not among states")))?;
        if start_state == stop_state {
            return Err(TrellisError::Config(
                "start and stop must be distinct states".into(),
            ));
        }

        let mut transitions = Vec::with_capacity(pairs.len());
        let mut by_pair = HashMap::with_capacity(pairs.len());
        let mut outgoing = vec![Vec::new(); states.len()];
        let mut incoming = vec![Vec::new(); states.len()];

        for (from, to) in pairs {
            let from_state = states
                .index_of(from)
                .ok_or_else(|| TrellisError::Config(format!("transition from unknown state {from:?}")))?;
            let to_state = states
                .index_of(to)
                .ok_or_else(|| TrellisError::Config(format!("transition to unknown state {to:?}")))?;
            if to_state == start_state {
                return Err(TrellisError::Config(format!(
                    "transition {from:?} -> {to:?} enters the start state"
                )));
            }
            if from_state == stop_state {
                return Err(TrellisError::Config(format!(
                    "transition {from:?} -> {to:?} leaves the stop state"
                )));
            }
            let self_index = transitions.len();
            if by_pair.insert((from_state, to_state), self_index).is_some() {
                return Err(TrellisError::Config(format!(
                    "transition {from:?} -> {to:?} declared twice"
                )));
            }
            transitions.push(Transition {
                from_state,
                to_state,
                self_index,
            });
            outgoing[from_state].push(self_index);
            incoming[to_state].push(self_index);
        }

        Ok(Self {
            states,
            transitions,
            by_pair,
            outgoing,
            incoming,
            start_state,
            stop_state,
        })
    }

    /// Build a state space from labeled training sequences.
    ///
    /// Every distinct label becomes a state (start first, stop second, then
    /// labels in order of first appearance) and every adjacent pair observed
    /// in any sequence becomes an allowed transition, deduplicated.
    ///
    /// Sequences must already carry the sentinels: first label `start`, last
    /// label `stop`, length at least 2.
    ///
    /// # Errors
    ///
    /// Returns `Config` if any sequence is shorter than 2 or is not wrapped
    /// in the start/stop sentinels.
    pub fn from_sequences(sequences: &[Vec<S>], start: S, stop: S) -> Result<Self> {
        let mut states = vec![start.clone(), stop.clone()];
        let mut seen_states: HashSet<S> = states.iter().cloned().collect();
        let mut pairs: Vec<(S, S)> = Vec::new();
        let mut seen_pairs: HashSet<(S, S)> = HashSet::new();

        for (i, seq) in sequences.iter().enumerate() {
            if seq.len() < 2 {
                return Err(TrellisError::Config(format!(
                    "sequence {i} has length {}, need at least 2",
                    seq.len()
                )));
            }
            if seq[0] != start || seq[seq.len() - 1] != stop {
                return Err(TrellisError::Config(format!(
                    "sequence {i} is not wrapped in start/stop sentinels"
                )));
            }
            for label in seq {
                if seen_states.insert(label.clone()) {
                    states.push(label.clone());
                }
            }
            for window in seq.windows(2) {
                let pair = (window[0].clone(), window[1].clone());
                if seen_pairs.insert(pair.clone()) {
                    pairs.push(pair);
                }
            }
        }

        Self::new(states, &start, &stop, &pairs)
    }
}

impl<S> StateSpace<S> {
    /// The state indexer.
    pub fn states(&self) -> &Indexer<S> {
        &self.states
    }

    /// Number of states, including the start/stop sentinels.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// All transitions in `self_index` order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Number of transitions.
    pub fn num_transitions(&self) -> usize {
        self.transitions.len()
    }

    /// The transition `(from, to)`, or `None` if that edge is illegal.
    pub fn transition_for(&self, from: usize, to: usize) -> Option<&Transition> {
        self.by_pair.get(&(from, to)).map(|&i| &self.transitions[i])
    }

    /// Index of the designated start state.
    pub fn start_state_index(&self) -> usize {
        self.start_state
    }

    /// Index of the designated stop state.
    pub fn stop_state_index(&self) -> usize {
        self.stop_state
    }

    /// Transitions leaving `state`, in `self_index` order.
    pub fn transitions_from(&self, state: usize) -> impl Iterator<Item = &Transition> {
        self.outgoing[state].iter().map(move |&i| &self.transitions[i])
    }

    /// Transitions entering `state`, in `self_index` order.
    pub fn transitions_to(&self, state: usize) -> impl Iterator<Item = &Transition> {
        self.incoming[state].iter().map(move |&i| &self.transitions[i])
    }
}
