//! engine-core: Shared infrastructure for the freelancer engine crates.
pub mod config;
pub mod error;
pub mod observability;

pub use anyhow;
pub use serde;
pub use tracing;
pub use validator;
