//! Table-driven state machine instance.

use std::fmt::Debug;

use super::table::{FsmConfig, StateDef, Transition};
use crate::error::FsmError;

/// A running instance of a state table
///
/// Not internally synchronized: exactly one logical thread drives an instance.
/// Wrap it in a mutex when events arrive from elsewhere.
pub struct Fsm<S, E, C> {
    name: String,
    states: Vec<StateDef<S, C>>,
    transitions: Vec<Transition<S, E, C>>,
    current: S,
    prev: Option<S>,
    running: bool,
    context: C,
}

impl<S, E, C> Fsm<S, E, C>
where
    S: Copy + PartialEq + Debug,
    E: Copy + PartialEq + Debug,
{
    /// Build a stopped machine from its tables
    ///
    /// No hook runs until [`Fsm::start`].
    pub fn new(config: FsmConfig<S, E, C>) -> Result<Self, FsmError> {
        if config.states.is_empty() {
            return Err(FsmError::InvalidArg {
                fsm: config.name,
                reason: "state table is empty".to_string(),
            });
        }

        tracing::debug!(
            "[{}] FSM created: {} states, {} transitions, initial {:?}",
            config.name,
            config.states.len(),
            config.transitions.len(),
            config.initial_state
        );

        Ok(Self {
            name: config.name,
            states: config.states,
            transitions: config.transitions,
            current: config.initial_state,
            prev: None,
            running: false,
            context: config.context,
        })
    }

    fn find_state(&self, id: S) -> Option<usize> {
        self.states.iter().position(|s| s.id == id)
    }

    fn invalid_arg(&self, reason: String) -> FsmError {
        FsmError::InvalidArg {
            fsm: self.name.clone(),
            reason,
        }
    }

    fn invalid_state(&self, reason: &str) -> FsmError {
        FsmError::InvalidState {
            fsm: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Enter the initial state
    pub fn start(&mut self) -> Result<(), FsmError> {
        if self.running {
            return Err(self.invalid_state("already running"));
        }
        let Some(idx) = self.find_state(self.current) else {
            tracing::error!("[{}] Invalid initial state: {:?}", self.name, self.current);
            return Err(self.invalid_arg(format!("initial state {:?} not in table", self.current)));
        };

        self.running = true;
        tracing::info!("[{}] FSM started in {}", self.name, self.states[idx].name);
        if let Some(hook) = &self.states[idx].on_enter {
            hook(&mut self.context);
        }
        Ok(())
    }

    /// Leave the current state and stop accepting events
    pub fn stop(&mut self) -> Result<(), FsmError> {
        if !self.running {
            return Err(self.invalid_state("not running"));
        }
        if let Some(idx) = self.find_state(self.current) {
            if let Some(hook) = &self.states[idx].on_exit {
                hook(&mut self.context);
            }
        }
        self.running = false;
        tracing::info!("[{}] FSM stopped", self.name);
        Ok(())
    }

    /// Feed one event through the transition table
    ///
    /// The first rule (in declaration order) whose event matches and whose
    /// source is the current state or the wildcard wins. `NotFound` means the
    /// event is not relevant in this state.
    ///
    /// A matching rule whose target is not in the state table is skipped
    /// before any callback runs and the instance is left as it was. That case
    /// returns `InvalidArg` so it can be caught in tests; it is already logged
    /// at error level here, so a caller dispatching bus traffic can treat it
    /// like `NotFound`.
    pub fn process_event(&mut self, event: E) -> Result<(), FsmError> {
        if !self.running {
            tracing::warn!("[{}] Event {:?} rejected: FSM not running", self.name, event);
            return Err(self.invalid_state("not running"));
        }

        let current = self.current;
        let Some(t_idx) = self
            .transitions
            .iter()
            .position(|t| t.event == event && t.from.matches(&current))
        else {
            tracing::trace!(
                "[{}] No transition for {:?} in {:?}",
                self.name,
                event,
                current
            );
            return Err(FsmError::NotFound {
                fsm: self.name.clone(),
                event: format!("{:?}", event),
                state: self.state_name().to_string(),
            });
        };

        let transition = &self.transitions[t_idx];
        if let Some(guard) = &transition.guard {
            if !guard(&self.context, event) {
                tracing::debug!("[{}] Guard rejected {:?}", self.name, event);
                return Err(FsmError::NotAllowed {
                    fsm: self.name.clone(),
                    event: format!("{:?}", event),
                });
            }
        }

        let target = transition.to;
        let Some(to_idx) = self.find_state(target) else {
            tracing::error!("[{}] Transition target {:?} not in table", self.name, target);
            return Err(self.invalid_arg(format!("target state {:?} not in table", target)));
        };
        let from_idx = self.find_state(current);

        if let Some(idx) = from_idx {
            if let Some(hook) = &self.states[idx].on_exit {
                hook(&mut self.context);
            }
        }
        if let Some(action) = &self.transitions[t_idx].action {
            action(&mut self.context, event);
        }

        self.prev = Some(current);
        self.current = target;
        tracing::info!(
            "[{}] {} -> {} on {:?}",
            self.name,
            from_idx.map_or("?", |i| self.states[i].name.as_str()),
            self.states[to_idx].name,
            event
        );

        if let Some(hook) = &self.states[to_idx].on_enter {
            hook(&mut self.context);
        }
        Ok(())
    }

    /// Force the machine into `state`, bypassing the transition table
    ///
    /// Exit and entry hooks run only while the machine is running.
    pub fn set_state(&mut self, state: S) -> Result<(), FsmError> {
        let Some(to_idx) = self.find_state(state) else {
            return Err(self.invalid_arg(format!("state {:?} not in table", state)));
        };

        if self.running {
            if let Some(idx) = self.find_state(self.current) {
                if let Some(hook) = &self.states[idx].on_exit {
                    hook(&mut self.context);
                }
            }
        }

        self.prev = Some(self.current);
        self.current = state;
        tracing::debug!("[{}] Forced state {}", self.name, self.states[to_idx].name);

        if self.running {
            if let Some(hook) = &self.states[to_idx].on_enter {
                hook(&mut self.context);
            }
        }
        Ok(())
    }

    /// Run the current state's periodic hook, if running
    pub fn run(&mut self) {
        if !self.running {
            return;
        }
        if let Some(idx) = self.find_state(self.current) {
            if let Some(hook) = &self.states[idx].on_run {
                hook(&mut self.context);
            }
        }
    }

    pub fn state(&self) -> S {
        self.current
    }

    /// Name of the current state, `"UNKNOWN"` if it is not in the table
    pub fn state_name(&self) -> &str {
        self.find_state(self.current)
            .map_or("UNKNOWN", |i| self.states[i].name.as_str())
    }

    pub fn is_in_state(&self, state: S) -> bool {
        self.current == state
    }

    /// State before the last transition, `None` before the first one
    pub fn previous_state(&self) -> Option<S> {
        self.prev
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }
}

impl<S: Debug, E, C> Debug for Fsm<S, E, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fsm")
            .field("name", &self.name)
            .field("current", &self.current)
            .field("prev", &self.prev)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}
