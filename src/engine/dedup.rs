//! Deduplicator: drops listings whose dedup key is already known.

use std::collections::HashSet;
use tracing::debug;

use crate::types::RawListing;

/// Keep only listings whose `listing_url` is not in `seen`, preserving
/// delivery order. Repeats within the batch are dropped after their
/// first occurrence.
pub fn filter_unseen(batch: Vec<RawListing>, seen: &HashSet<String>) -> Vec<RawListing> {
    let total = batch.len();
    let mut batch_keys = HashSet::new();

    let fresh: Vec<RawListing> = batch
        .into_iter()
        .filter(|l| !seen.contains(&l.listing_url) && batch_keys.insert(l.listing_url.clone()))
        .collect();

    debug!(total, fresh = fresh.len(), "Deduplicated listing batch");
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(url: &str) -> RawListing {
        RawListing {
            title: url.to_uppercase(),
            asking_price: None,
            listing_url: url.to_string(),
            source: "facebook".to_string(),
            location: None,
        }
    }

    fn urls(listings: &[RawListing]) -> Vec<&str> {
        listings.iter().map(|l| l.listing_url.as_str()).collect()
    }

    #[test]
    fn test_filters_seen_and_preserves_order() {
        let seen: HashSet<String> = ["b".to_string()].into_iter().collect();
        let batch = vec![listing("c"), listing("b"), listing("a"), listing("d")];
        let fresh = filter_unseen(batch, &seen);
        assert_eq!(urls(&fresh), vec!["c", "a", "d"]);
    }

    #[test]
    fn test_drops_in_batch_repeats() {
        let batch = vec![listing("a"), listing("b"), listing("a")];
        let fresh = filter_unseen(batch, &HashSet::new());
        assert_eq!(urls(&fresh), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_batch() {
        assert!(filter_unseen(Vec::new(), &HashSet::new()).is_empty());
    }
}
