//! Generic table-driven state machine.
//!
//! The machine maps `(state, input kind)` to a [`Transition`]. A transition is a
//! pure function of the input returning the next state and an ordered list of
//! side effects. Side effects run on the caller, in order, *before* the next
//! state is committed, so every effect still sees the state the input arrived in.
//!
//! The machine knows nothing about playback: states and input kinds are any
//! [`Ordinal`] enumeration and effects act on an explicit context `C` passed to
//! [`StateMachine::consume`].

use std::fmt;

/// Closed enumeration with a dense zero-based index.
pub trait Ordinal: Copy + fmt::Debug {
    /// Number of distinct values.
    const COUNT: usize;
    /// Index in `0..COUNT`.
    fn ordinal(self) -> usize;
}

/// Input delivered to the machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Input<K, P> {
    pub kind: K,
    pub payload: P,
}

impl<K, P> Input<K, P> {
    pub fn new(kind: K, payload: P) -> Self {
        Self { kind, payload }
    }
}

/// Deferred action run as part of a transition. Receives the context and the
/// state the machine is in while the effect runs.
pub type SideEffect<S, C> = Box<dyn FnOnce(&mut C, S) + Send>;

/// Transition function: input in, next state and effects out.
pub type Transition<S, K, P, C> =
    Box<dyn Fn(&Input<K, P>) -> (S, Vec<SideEffect<S, C>>) + Send + Sync>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError<S: fmt::Debug, K: fmt::Debug> {
    #[error("illegal input {input:?} in state {state:?}")]
    IllegalInput { state: S, input: K },
}

pub struct StateMachine<S, K, P, C> {
    current: S,
    transitions: Vec<Vec<Option<Transition<S, K, P, C>>>>,
}

impl<S, K, P, C> StateMachine<S, K, P, C>
where
    S: Ordinal,
    K: Ordinal,
{
    /// Creates a machine in `initial` with no transitions registered.
    pub fn new(initial: S) -> Self {
        let transitions = (0..S::COUNT)
            .map(|_| (0..K::COUNT).map(|_| None).collect())
            .collect();
        Self { current: initial, transitions }
    }

    pub fn current(&self) -> S {
        self.current
    }

    /// Registers the transition for `(state, kind)`, replacing any earlier one.
    pub fn add_transition(&mut self, state: S, kind: K, transition: Transition<S, K, P, C>) {
        tracing::trace!(?state, ?kind, "adding transition");
        if let Some(slot) = self
            .transitions
            .get_mut(state.ordinal())
            .and_then(|row| row.get_mut(kind.ordinal()))
        {
            *slot = Some(transition);
        }
    }

    /// Feeds one input through the machine and returns the committed state.
    ///
    /// With no transition registered for the current state the input is
    /// rejected and nothing changes. Otherwise every side effect runs in the
    /// order the transition returned them, and only then is the next state
    /// committed.
    pub fn consume(&mut self, input: &Input<K, P>, ctx: &mut C) -> Result<S, MachineError<S, K>> {
        let state = self.current;
        let Some(transition) = self.lookup(state, input.kind) else {
            return Err(MachineError::IllegalInput { state, input: input.kind });
        };

        let (next, effects) = transition(input);
        tracing::trace!(from = ?state, to = ?next, kind = ?input.kind, effects = effects.len(), "transition");
        for (i, effect) in effects.into_iter().enumerate() {
            tracing::trace!(index = i, "running side effect");
            effect(ctx, self.current);
        }
        self.current = next;
        Ok(next)
    }

    /// Overwrites the current state without running any transition.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn set(&mut self, state: S) {
        self.current = state;
    }

    fn lookup(&self, state: S, kind: K) -> Option<&Transition<S, K, P, C>> {
        self.transitions
            .get(state.ordinal())
            .and_then(|row| row.get(kind.ordinal()))
            .and_then(Option::as_ref)
    }
}

impl<S: fmt::Debug, K, P, C> fmt::Debug for StateMachine<S, K, P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine").field("current", &self.current).finish_non_exhaustive()
    }
}
