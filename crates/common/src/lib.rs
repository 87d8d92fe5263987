//! Shared types, error plumbing, and utilities used across all tavolo crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{new_id, now_ms},
};
