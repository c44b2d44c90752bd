pub mod artifact;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod face;
pub mod index;
mod metrics;
pub mod pipeline;
pub mod server;

pub use config::Opts;
pub use error::{FaceError, Result};
