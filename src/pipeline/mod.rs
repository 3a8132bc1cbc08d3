//! End-to-end pipeline driver.

mod runner;

pub use runner::{Pipeline, PipelineError, PipelineReport};
