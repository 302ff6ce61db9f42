//! Listing intake.
//!
//! Defines the `ListingSource` trait that yields bounded batches of raw
//! listing alerts, plus a file-backed inbox implementation. Delivery is
//! at-least-once: listings are dropped from a source only after the run
//! that recorded them has committed.

pub mod inbox;

use async_trait::async_trait;

use crate::types::{DealScoutError, RawListing};

pub use inbox::InboxSource;

/// Upstream supplier of raw listings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Up to `max` pending listings, in delivery order.
    async fn fetch_batch(&self, max: usize) -> Result<Vec<RawListing>, DealScoutError>;

    /// Called once the listings with these URLs are committed to the
    /// store. Until then a source keeps them pending and may hand them out
    /// again.
    async fn acknowledge(&self, _listing_urls: &[String]) -> Result<(), DealScoutError> {
        Ok(())
    }
}
