//! Trade plan generation service.
//!
//! Turns a portfolio snapshot into a structured plan document by delegating to an
//! LLM provider, behind an idempotent job store so an unchanged snapshot never
//! pays for a second generation.

pub mod config;
pub mod db;
pub mod errors;
pub mod llm_client;
pub mod plan;
pub mod portfolio;
pub mod routes;
pub mod state;
