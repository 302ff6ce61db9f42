//! Listing classification.
//!
//! Defines the `Classifier` trait and provides an OpenRouter-backed
//! implementation that asks a chat model for a structured
//! `Classification` of the listing text.

pub mod openrouter;

use async_trait::async_trait;

use crate::types::{Classification, DealScoutError};

pub use openrouter::OpenRouterClassifier;

/// Converts raw listing text into a structured classification.
///
/// Failures are reported as `Err`, never panics; the pipeline treats any
/// error as "classification unavailable".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, listing_text: &str) -> Result<Classification, DealScoutError>;
}
