//! The generation pipeline: canonicalize → start → work → poll.

pub mod canonical;
pub mod client;
pub mod coerce;
pub mod document;
pub mod handlers;
pub mod hints;
pub mod jobs;
pub mod poller;
pub mod prompts;
pub mod starter;
pub mod validate;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
