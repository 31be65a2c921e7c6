//! Data models for the showcase backend.
//!
//! Field names serialize as camelCase to match the website's payload contract.

mod blog;
mod payload;
mod repo;

pub use blog::*;
pub use payload::*;
pub use repo::*;
