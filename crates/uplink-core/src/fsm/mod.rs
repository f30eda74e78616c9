//! # Finite State Machine Engine
//!
//! Generic table-driven state machines. A machine is described by a state
//! table (entry/exit/run hooks per state) and a transition table
//! (`from --event--> to`, with optional guard and action). Lookup is
//! first-match-wins in declaration order, so a wildcard rule declared before
//! a specific one shadows it.
//!
//! Callback order on a transition: old state's `on_exit`, the transition's
//! `action`, then the new state's `on_enter`.

mod machine;
mod table;

pub use machine::Fsm;
pub use table::{Action, FromState, FsmConfig, Guard, StateDef, StateHook, Transition};
