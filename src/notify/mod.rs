//! Push notifications.
//!
//! Defines the `Notifier` trait (one message to one device token), the
//! message builders for deal and needs-review alerts, and `dispatch`,
//! which fans a message out to every registered token.

pub mod fcm;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::DealScoutError;

pub use fcm::FcmNotifier;

/// Maximum characters of the listing title used as a push body.
const BODY_MAX_CHARS: usize = 100;

/// A push notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    /// "$N Profit Opportunity" alert for a profitable deal.
    pub fn deal(deal_id: i64, listing_title: &str, estimated_profit: Decimal) -> Self {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "deal".to_string());
        data.insert("deal_id".to_string(), deal_id.to_string());
        data.insert("profit".to_string(), format!("{:.2}", estimated_profit.round_dp(2)));

        Self {
            title: format!("${} Profit Opportunity", estimated_profit.round_dp(0).normalize()),
            body: listing_title.chars().take(BODY_MAX_CHARS).collect(),
            data,
        }
    }

    /// Reminder that deals are waiting for condition input.
    pub fn needs_review(count: usize) -> Self {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "needs_review".to_string());
        data.insert("count".to_string(), count.to_string());

        Self {
            title: "Items Need Review".to_string(),
            body: format!(
                "You have {count} item{} waiting for condition input",
                if count == 1 { "" } else { "s" }
            ),
            data,
        }
    }
}

/// Delivers one message to one device token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DealScoutError>;
}

/// Per-token delivery counts for one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub failed: usize,
}

impl DispatchOutcome {
    pub fn any_sent(&self) -> bool {
        self.sent > 0
    }
}

/// Send `message` to every token. A failing or timed-out token is logged
/// and does not stop delivery to the rest.
pub async fn dispatch(
    notifier: &dyn Notifier,
    tokens: &[String],
    message: &PushMessage,
    call_timeout: Duration,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for token in tokens {
        let result = match tokio::time::timeout(call_timeout, notifier.send(token, message)).await {
            Ok(r) => r,
            Err(_) => Err(DealScoutError::Timeout {
                service: "notifier".to_string(),
                secs: call_timeout.as_secs(),
            }),
        };

        match result {
            Ok(()) => outcome.sent += 1,
            Err(e) => {
                warn!(token = %redact(token), error = %e, "Push delivery failed");
                outcome.failed += 1;
            }
        }
    }

    debug!(title = %message.title, sent = outcome.sent, failed = outcome.failed, "Push fan-out complete");
    outcome
}

/// Log-safe token prefix.
fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deal_message_format() {
        let msg = PushMessage::deal(42, "Sony PS5 Disc Edition", dec!(74.50));
        assert_eq!(msg.title, "$74 Profit Opportunity");
        assert_eq!(msg.body, "Sony PS5 Disc Edition");
        assert_eq!(msg.data["type"], "deal");
        assert_eq!(msg.data["deal_id"], "42");
        assert_eq!(msg.data["profit"], "74.50");
    }

    #[test]
    fn test_deal_message_truncates_body() {
        let title = "x".repeat(250);
        let msg = PushMessage::deal(1, &title, dec!(120));
        assert_eq!(msg.body.chars().count(), 100);
        assert_eq!(msg.title, "$120 Profit Opportunity");
        assert_eq!(msg.data["profit"], "120.00");
    }

    #[test]
    fn test_needs_review_message() {
        let one = PushMessage::needs_review(1);
        assert_eq!(one.body, "You have 1 item waiting for condition input");
        let many = PushMessage::needs_review(3);
        assert_eq!(many.title, "Items Need Review");
        assert_eq!(many.body, "You have 3 items waiting for condition input");
        assert_eq!(many.data["type"], "needs_review");
        assert_eq!(many.data["count"], "3");
    }

    #[tokio::test]
    async fn test_dispatch_continues_after_failure() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .with(eq("bad"), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Err(DealScoutError::transient("notifier", "unregistered")));
        notifier
            .expect_send()
            .with(eq("good"), mockall::predicate::always())
            .times(2)
            .returning(|_, _| Ok(()));

        let tokens = vec!["good".to_string(), "bad".to_string(), "good".to_string()];
        let outcome = dispatch(
            &notifier,
            &tokens,
            &PushMessage::needs_review(2),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(outcome, DispatchOutcome { sent: 2, failed: 1 });
        assert!(outcome.any_sent());
    }

    #[tokio::test]
    async fn test_dispatch_no_tokens() {
        let notifier = MockNotifier::new();
        let outcome = dispatch(&notifier, &[], &PushMessage::needs_review(1), Duration::from_secs(1)).await;
        assert_eq!(outcome, DispatchOutcome::default());
        assert!(!outcome.any_sent());
    }
}
