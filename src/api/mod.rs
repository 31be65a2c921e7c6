//! REST API module.
//!
//! `GET /api/github` always answers 200 with the best payload available; the reaction
//! endpoints are the only ones that report client errors.

mod github;
mod reactions;

pub use github::*;
pub use reactions::*;
