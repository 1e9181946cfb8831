// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Protocol model: processes, states, weighted transitions, guards.
//!
//! A [`Protocol`] is the static description of N actor state machines. It
//! is assembled mnemonic-first through [`ProtocolBuilder`], validated once
//! by [`ProtocolBuilder::build`], and immutable afterwards; the compiler
//! and every runner thread share it read-only.

use std::fmt;

use thiserror::Error;

use crate::adapter::EffectFn;
use crate::guard::Guard;
use crate::ident::{ProcessId, StateId, TransitionId};

/// Errors detected while assembling or validating a protocol model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Two processes share a mnemonic.
    #[error("duplicate process mnemonic: {0}")]
    DuplicateProcess(&'static str),
    /// Two states of one process share a mnemonic.
    #[error("duplicate state mnemonic in process {process}: {state}")]
    DuplicateState {
        /// Owning process mnemonic.
        process: &'static str,
        /// Offending state mnemonic.
        state: &'static str,
    },
    /// A process id does not belong to this builder.
    #[error("unknown process id: {0}")]
    UnknownProcess(ProcessId),
    /// A state id does not belong to the named process.
    #[error("unknown state id {state} in process {process}")]
    UnknownState {
        /// Owning process.
        process: ProcessId,
        /// Offending state id.
        state: StateId,
    },
    /// A transition declared weight zero; the modulo draw cannot select it.
    #[error("zero-weight transition in process {0}")]
    ZeroWeight(ProcessId),
    /// The weights of one state's outgoing transitions overflow `u32`.
    #[error("weight sum overflow at {process}/{state}")]
    WeightOverflow {
        /// Owning process.
        process: ProcessId,
        /// State whose outgoing weights overflow.
        state: StateId,
    },
    /// A process declares no states.
    #[error("process {0} has no states")]
    EmptyProcess(&'static str),
    /// A state has no outgoing transitions; the runner loop would stall.
    #[error("terminal state {process}/{state}: every state needs an outgoing transition")]
    TerminalState {
        /// Owning process.
        process: ProcessId,
        /// Terminal state.
        state: StateId,
    },
    /// A state is unreachable from its process's initial state.
    #[error("unreachable state {process}/{state}")]
    UnreachableState {
        /// Owning process.
        process: ProcessId,
        /// Unreachable state.
        state: StateId,
    },
    /// A guard constrains the transition's own process.
    #[error("guard on {0} constrains its own process")]
    SelfGuard(ProcessId),
}

/// One state of a process.
#[derive(Debug)]
pub struct StateSpec {
    mnemonic: &'static str,
    outgoing: Vec<TransitionId>,
    weight_sum: u32,
}

impl StateSpec {
    /// Human-readable name, unique within the owning process.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    /// Outgoing transitions in declaration order.
    #[must_use]
    pub fn outgoing(&self) -> &[TransitionId] {
        &self.outgoing
    }

    /// Sum of outgoing transition weights; the modulo draw's divisor.
    #[must_use]
    pub fn weight_sum(&self) -> u32 {
        self.weight_sum
    }
}

/// One process (actor) of the model.
#[derive(Debug)]
pub struct ProcessSpec {
    mnemonic: &'static str,
    states: Vec<StateSpec>,
    initial: StateId,
}

impl ProcessSpec {
    /// Human-readable name, unique within the model.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    /// States in declaration order.
    #[must_use]
    pub fn states(&self) -> &[StateSpec] {
        &self.states
    }

    /// Initial state (first declared unless overridden).
    #[must_use]
    pub fn initial(&self) -> StateId {
        self.initial
    }
}

/// One transition of the model.
pub struct TransitionSpec {
    id: TransitionId,
    process: ProcessId,
    source: StateId,
    target: StateId,
    weight: u32,
    guard: Option<Guard>,
    effect: Option<EffectFn>,
    label: &'static str,
}

impl TransitionSpec {
    /// Owning process.
    #[must_use]
    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// Source state.
    #[must_use]
    pub fn source(&self) -> StateId {
        self.source
    }

    /// Target state.
    #[must_use]
    pub fn target(&self) -> StateId {
        self.target
    }

    /// Selection weight (≥ 1).
    #[must_use]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Guard, if the transition is guarded.
    #[must_use]
    pub fn guard(&self) -> Option<&Guard> {
        self.guard.as_ref()
    }

    /// Side-effect hook, if any.
    #[must_use]
    pub fn effect(&self) -> Option<EffectFn> {
        self.effect
    }

    /// Label for logs and reports; may be empty.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Transition id.
    #[must_use]
    pub fn id(&self) -> TransitionId {
        self.id
    }
}

impl fmt::Debug for TransitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionSpec")
            .field("id", &self.id)
            .field("process", &self.process)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("weight", &self.weight)
            .field("guard", &self.guard)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Declaration of a transition, fed to [`ProtocolBuilder::declare`].
///
/// Descriptor struct with chainable setters; the common unguarded,
/// weight-1 case is just `TransitionDecl::new(p, from, to)`.
pub struct TransitionDecl {
    /// Owning process.
    pub process: ProcessId,
    /// Source state.
    pub source: StateId,
    /// Target state.
    pub target: StateId,
    /// Selection weight; defaults to 1.
    pub weight: u32,
    /// Optional guard.
    pub guard: Option<Guard>,
    /// Optional side-effect hook.
    pub effect: Option<EffectFn>,
    /// Label for logs and reports.
    pub label: &'static str,
}

impl TransitionDecl {
    /// Starts a weight-1, unguarded, effect-free declaration.
    #[must_use]
    pub fn new(process: ProcessId, source: StateId, target: StateId) -> Self {
        Self {
            process,
            source,
            target,
            weight: 1,
            guard: None,
            effect: None,
            label: "",
        }
    }

    /// Sets the selection weight.
    #[must_use]
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Attaches a guard.
    #[must_use]
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Attaches a side-effect hook.
    #[must_use]
    pub fn effect(mut self, effect: EffectFn) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }
}

/// Mnemonic-first builder for [`Protocol`].
#[derive(Default)]
pub struct ProtocolBuilder {
    processes: Vec<ProcessSpec>,
    transitions: Vec<TransitionSpec>,
}

impl ProtocolBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a process; its first declared state becomes the initial
    /// state unless [`Self::initial`] overrides it.
    pub fn process(&mut self, mnemonic: &'static str) -> Result<ProcessId, ModelError> {
        if self.processes.iter().any(|p| p.mnemonic == mnemonic) {
            return Err(ModelError::DuplicateProcess(mnemonic));
        }
        let id = ProcessId(u16::try_from(self.processes.len()).unwrap_or(u16::MAX));
        self.processes.push(ProcessSpec {
            mnemonic,
            states: Vec::new(),
            initial: StateId(0),
        });
        Ok(id)
    }

    /// Declares a state of `process`.
    pub fn state(&mut self, process: ProcessId, mnemonic: &'static str) -> Result<StateId, ModelError> {
        let spec = self
            .processes
            .get_mut(process.index())
            .ok_or(ModelError::UnknownProcess(process))?;
        if spec.states.iter().any(|s| s.mnemonic == mnemonic) {
            return Err(ModelError::DuplicateState {
                process: spec.mnemonic,
                state: mnemonic,
            });
        }
        let id = StateId(u16::try_from(spec.states.len()).unwrap_or(u16::MAX));
        spec.states.push(StateSpec {
            mnemonic,
            outgoing: Vec::new(),
            weight_sum: 0,
        });
        Ok(id)
    }

    /// Overrides the initial state of `process`.
    pub fn initial(&mut self, process: ProcessId, state: StateId) -> Result<(), ModelError> {
        let spec = self
            .processes
            .get_mut(process.index())
            .ok_or(ModelError::UnknownProcess(process))?;
        if state.index() >= spec.states.len() {
            return Err(ModelError::UnknownState { process, state });
        }
        spec.initial = state;
        Ok(())
    }

    /// Declares an unguarded weight-1 transition; shorthand for
    /// [`Self::declare`] with a plain [`TransitionDecl`].
    pub fn transition(
        &mut self,
        process: ProcessId,
        source: StateId,
        target: StateId,
    ) -> Result<TransitionId, ModelError> {
        self.declare(TransitionDecl::new(process, source, target))
    }

    /// Declares a transition.
    pub fn declare(&mut self, decl: TransitionDecl) -> Result<TransitionId, ModelError> {
        let process = decl.process;
        let spec = self
            .processes
            .get(process.index())
            .ok_or(ModelError::UnknownProcess(process))?;
        for state in [decl.source, decl.target] {
            if state.index() >= spec.states.len() {
                return Err(ModelError::UnknownState { process, state });
            }
        }
        if decl.weight == 0 {
            return Err(ModelError::ZeroWeight(process));
        }
        if let Some(guard) = &decl.guard {
            for (watched, allowed) in guard.constraints() {
                if watched == process {
                    return Err(ModelError::SelfGuard(process));
                }
                let watched_spec = self
                    .processes
                    .get(watched.index())
                    .ok_or(ModelError::UnknownProcess(watched))?;
                for state in allowed.iter() {
                    if state.index() >= watched_spec.states.len() {
                        return Err(ModelError::UnknownState {
                            process: watched,
                            state,
                        });
                    }
                }
            }
        }

        let id = TransitionId(u32::try_from(self.transitions.len()).unwrap_or(u32::MAX));
        self.transitions.push(TransitionSpec {
            id,
            process,
            source: decl.source,
            target: decl.target,
            weight: decl.weight,
            guard: decl.guard,
            effect: decl.effect,
            label: decl.label,
        });
        // Outgoing lists and weight sums are wired in build(), once.
        Ok(id)
    }

    /// Validates the model and freezes it.
    pub fn build(mut self) -> Result<Protocol, ModelError> {
        for (t_index, transition) in self.transitions.iter().enumerate() {
            let spec = &mut self.processes[transition.process.index()];
            let state = &mut spec.states[transition.source.index()];
            state.outgoing.push(TransitionId(
                u32::try_from(t_index).unwrap_or(u32::MAX),
            ));
            state.weight_sum = state.weight_sum.checked_add(transition.weight).ok_or(
                ModelError::WeightOverflow {
                    process: transition.process,
                    state: transition.source,
                },
            )?;
        }

        for (p_index, spec) in self.processes.iter().enumerate() {
            let process = ProcessId(u16::try_from(p_index).unwrap_or(u16::MAX));
            if spec.states.is_empty() {
                return Err(ModelError::EmptyProcess(spec.mnemonic));
            }
            for (s_index, state) in spec.states.iter().enumerate() {
                if state.outgoing.is_empty() {
                    return Err(ModelError::TerminalState {
                        process,
                        state: StateId(u16::try_from(s_index).unwrap_or(u16::MAX)),
                    });
                }
            }
            self.check_reachability(process, spec)?;
        }

        Ok(Protocol {
            processes: self.processes,
            transitions: self.transitions,
        })
    }

    fn check_reachability(&self, process: ProcessId, spec: &ProcessSpec) -> Result<(), ModelError> {
        let mut visited = vec![false; spec.states.len()];
        let mut pending = vec![spec.initial];
        while let Some(state) = pending.pop() {
            if std::mem::replace(&mut visited[state.index()], true) {
                continue;
            }
            for &transition in &spec.states[state.index()].outgoing {
                pending.push(self.transitions[transition.index()].target);
            }
        }
        if let Some(unreached) = visited.iter().position(|seen| !seen) {
            return Err(ModelError::UnreachableState {
                process,
                state: StateId(u16::try_from(unreached).unwrap_or(u16::MAX)),
            });
        }
        Ok(())
    }
}

/// Validated, immutable protocol model.
#[derive(Debug)]
pub struct Protocol {
    processes: Vec<ProcessSpec>,
    transitions: Vec<TransitionSpec>,
}

impl Protocol {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ProtocolBuilder {
        ProtocolBuilder::new()
    }

    /// Number of processes.
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Process lookup.
    #[must_use]
    pub fn process(&self, id: ProcessId) -> &ProcessSpec {
        &self.processes[id.index()]
    }

    /// Iterates processes in id order.
    pub fn processes(&self) -> impl Iterator<Item = (ProcessId, &ProcessSpec)> + '_ {
        self.processes
            .iter()
            .enumerate()
            .map(|(i, spec)| (ProcessId(u16::try_from(i).unwrap_or(u16::MAX)), spec))
    }

    /// Transition lookup.
    #[must_use]
    pub fn transition(&self, id: TransitionId) -> &TransitionSpec {
        &self.transitions[id.index()]
    }

    /// Iterates all transitions in id order.
    pub fn transitions(&self) -> impl Iterator<Item = &TransitionSpec> + '_ {
        self.transitions.iter()
    }

    /// Number of transitions.
    #[must_use]
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }
}
