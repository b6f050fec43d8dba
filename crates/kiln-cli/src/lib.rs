//! Library half of the `kiln` binary: the end-to-end pipeline

pub mod pipeline;

pub use pipeline::{Packaging, Pipeline, PipelineOptions, PipelineReport};
