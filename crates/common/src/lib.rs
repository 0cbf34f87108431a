//! Common types for the GitHub metadata crawler

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
