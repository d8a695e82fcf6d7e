//! Shared types for the Codex usage monitor workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
