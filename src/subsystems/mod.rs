//! Long-lived subsystem tasks.

pub mod mutation;
pub mod runtime;
