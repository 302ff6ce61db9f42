//! Core engine: intake pipeline, review sweep, order reconciliation and
//! profit reporting.

pub mod accountant;
pub mod dedup;
pub mod distance;
pub mod pipeline;
pub mod reconcile;
pub mod review;

use std::future::Future;
use std::time::Duration;

use crate::types::DealScoutError;

/// Run an external call under a deadline. Expiry becomes a recoverable
/// `Timeout` error for that call.
pub async fn bounded<T, F>(service: &str, limit: Duration, call: F) -> Result<T, DealScoutError>
where
    F: Future<Output = Result<T, DealScoutError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DealScoutError::Timeout {
            service: service.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let ok = bounded("x", Duration::from_secs(1), async { Ok::<_, DealScoutError>(5) }).await;
        assert_eq!(ok.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, DealScoutError>(())
        };
        let err = bounded("pricing", Duration::from_secs(30), slow).await.unwrap_err();
        assert!(matches!(err, DealScoutError::Timeout { secs: 30, .. }));
        assert!(err.is_transient());
    }
}
