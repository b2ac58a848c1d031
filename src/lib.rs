//! Chartgate: Safety-Gated Chart Generation
//!
//! Turns free-form text into a rendered chart. A plotting script is obtained from a
//! model collaborator (or a deterministic fallback), checked by a pattern gate, and run
//! in a bounded child interpreter. Successful results are cached by request content.

pub mod cache;
pub mod cli;
pub mod config;
pub mod deps;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod safety;
pub mod sandbox;

pub use error::{ApiError, StorageError};
pub use pipeline::{ChartPipeline, ChartRequest, ChartResult, PipelineError};
