//! Todo HTTP API over Postgres with a cache-aside read path.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
