//! Flow Definitions and Step Machine

pub mod definitions;
pub mod machine;

pub use definitions::{step_index, step_kind, steps, total_steps, StepKind};
pub use machine::{validate_step, StepStateMachine};
