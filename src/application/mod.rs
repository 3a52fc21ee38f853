//! Application services: the todo orchestrator and the adapter contracts it
//! depends on.

pub mod cache;
pub mod error;
pub mod repos;
pub mod todos;
