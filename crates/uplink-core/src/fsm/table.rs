//! State and transition tables.

use std::fmt;

/// Hook run on state entry, exit, or periodic run
pub type StateHook<C> = Box<dyn Fn(&mut C) + Send + Sync>;

/// Predicate that may veto a transition
pub type Guard<C, E> = Box<dyn Fn(&C, E) -> bool + Send + Sync>;

/// Side effect run between the old state's exit and the new state's entry
pub type Action<C, E> = Box<dyn Fn(&mut C, E) + Send + Sync>;

/// One row of the state table
pub struct StateDef<S, C> {
    pub id: S,
    pub name: String,
    pub on_enter: Option<StateHook<C>>,
    pub on_exit: Option<StateHook<C>>,
    pub on_run: Option<StateHook<C>>,
}

impl<S, C> StateDef<S, C> {
    /// State without hooks
    pub fn new(id: S, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            on_enter: None,
            on_exit: None,
            on_run: None,
        }
    }

    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        self.on_enter = Some(Box::new(hook));
        self
    }

    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        self.on_exit = Some(Box::new(hook));
        self
    }

    pub fn on_run<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        self.on_run = Some(Box::new(hook));
        self
    }
}

impl<S: fmt::Debug, C> fmt::Debug for StateDef<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .field("on_run", &self.on_run.is_some())
            .finish()
    }
}

/// Source side of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromState<S> {
    /// Matches whatever state the machine is in.
    Any,
    /// Matches one specific state.
    State(S),
}

impl<S: PartialEq> FromState<S> {
    pub fn matches(&self, current: &S) -> bool {
        match self {
            FromState::Any => true,
            FromState::State(s) => s == current,
        }
    }
}

/// One row of the transition table
pub struct Transition<S, E, C> {
    pub from: FromState<S>,
    pub event: E,
    pub to: S,
    pub guard: Option<Guard<C, E>>,
    pub action: Option<Action<C, E>>,
}

impl<S, E, C> Transition<S, E, C> {
    /// `from --event--> to`
    pub fn new(from: S, event: E, to: S) -> Self {
        Self {
            from: FromState::State(from),
            event,
            to,
            guard: None,
            action: None,
        }
    }

    /// Wildcard rule taken from any state
    pub fn any(event: E, to: S) -> Self {
        Self {
            from: FromState::Any,
            event,
            to,
            guard: None,
            action: None,
        }
    }

    pub fn guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&C, E) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Box::new(guard));
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut C, E) + Send + Sync + 'static,
    {
        self.action = Some(Box::new(action));
        self
    }
}

impl<S: fmt::Debug, E: fmt::Debug, C> fmt::Debug for Transition<S, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("event", &self.event)
            .field("to", &self.to)
            .field("guard", &self.guard.is_some())
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Everything needed to build a machine
pub struct FsmConfig<S, E, C> {
    pub name: String,
    pub states: Vec<StateDef<S, C>>,
    pub transitions: Vec<Transition<S, E, C>>,
    pub initial_state: S,
    /// User data handed to every hook, guard and action.
    pub context: C,
}

impl<S, E, C> FsmConfig<S, E, C> {
    /// Empty tables starting in `initial_state`
    pub fn new(name: impl Into<String>, initial_state: S, context: C) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            transitions: Vec::new(),
            initial_state,
            context,
        }
    }

    pub fn state(mut self, state: StateDef<S, C>) -> Self {
        self.states.push(state);
        self
    }

    /// Append a transition; declaration order is lookup order
    pub fn transition(mut self, transition: Transition<S, E, C>) -> Self {
        self.transitions.push(transition);
        self
    }
}
