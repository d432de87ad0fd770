// src/control/mod.rs
//
// Signal control layer. The emergency priority controller consumes
// intersection snapshots and, while active, overrides whatever the
// normal controller would do; everything else passes through.

pub mod emergency;
pub mod events;
pub mod phases;

pub use emergency::{EmergencyPriorityController, EmergencyState, SignalCommand};
pub use events::{TransitionLog, TransitionRecord};
pub use phases::PhaseType;
