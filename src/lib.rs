pub mod aggregate;
pub mod align;
pub mod config;
pub mod data_models;
pub mod errors;
pub mod parsers;
pub mod pipeline;
pub mod stats;
pub mod timestamp;

pub use pipeline::{AnalysisPipeline, AnalysisReport};

#[cfg(test)]
mod tests;
