//! Persisted portfolio snapshot: the input the plan pipeline reads from.

pub mod handlers;
pub mod store;
