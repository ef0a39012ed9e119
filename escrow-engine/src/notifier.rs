//! Event Notifier - Boundary sink for lifecycle and agreement events
//!
//! Downstream collaborators (notification delivery, social mirroring)
//! consume these events. Delivery is fire-and-forget: the order manager
//! logs a sink failure and moves on, so core mutation never blocks on
//! delivery success.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::{Beneficiary, Choice, OrderState};

/// Events emitted to the notification boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotifierEvent {
    OrderCreated {
        order_id: Uuid,
        requester: String,
        amount: Decimal,
    },
    BidPlaced {
        order_id: Uuid,
        bid_id: Uuid,
        bidder: String,
    },
    BidWithdrawn {
        order_id: Uuid,
        bid_id: Uuid,
        bidder: String,
    },
    TraderSelected {
        order_id: Uuid,
        trader: String,
    },
    CustodyFunded {
        order_id: Uuid,
        amount: Decimal,
    },
    FiatAttested {
        order_id: Uuid,
        attestor: String,
    },
    ChoiceDeclared {
        order_id: Uuid,
        party: String,
        choice: Choice,
    },
    AgreementExecuted {
        order_id: Uuid,
        beneficiary: Beneficiary,
        recipient: String,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    OrderAborted {
        order_id: Uuid,
        reason: String,
        refunded: Decimal,
    },
    LifecycleTransition {
        order_id: Uuid,
        from: OrderState,
        to: OrderState,
    },
}

/// Sink for lifecycle/agreement transition events
#[async_trait]
pub trait EventNotifier: Send + Sync {
    /// Deliver one event. Failures are the sink's problem; callers log
    /// and continue.
    async fn publish(&self, event: &NotifierEvent) -> anyhow::Result<()>;
}

/// Default notifier: structured log lines via `tracing`
pub struct TracingNotifier;

#[async_trait]
impl EventNotifier for TracingNotifier {
    async fn publish(&self, event: &NotifierEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        info!(target: "escrow_events", %payload, "event published");
        Ok(())
    }
}

/// Notifier that drops everything; useful in tests
pub struct NullNotifier;

#[async_trait]
impl EventNotifier for NullNotifier {
    async fn publish(&self, _event: &NotifierEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracing_notifier_serializes_events() {
        let notifier = TracingNotifier;
        let event = NotifierEvent::AgreementExecuted {
            order_id: Uuid::new_v4(),
            beneficiary: Beneficiary::Trader,
            recipient: "bob".to_string(),
            amount: Decimal::new(100, 0),
            timestamp: Utc::now(),
        };
        notifier.publish(&event).await.unwrap();
    }

    #[test]
    fn events_round_trip_as_tagged_json() {
        let event = NotifierEvent::CustodyFunded {
            order_id: Uuid::new_v4(),
            amount: Decimal::new(50, 0),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "custody_funded");
    }
}
