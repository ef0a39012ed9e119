//! Escrow Node - High-level API for the escrow system
//!
//! Wires the custody ledger, agreement engine, bid board, and order
//! manager together behind one handle and re-exposes the order
//! lifecycle operations.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    agreement::AgreementEngine,
    bid_board::BidBoard,
    ledger::CustodyLedger,
    models::{
        AgreementState, Bid, Choice, CustodyRecord, EscrowEvent, ExecutionOutcome, Order,
        OrderState,
    },
    notifier::{EventNotifier, TracingNotifier},
    order_manager::{
        CreateOrderRequest, OrderManager, OrderManagerConfig, PlaceBidRequest, SelectTraderRequest,
    },
    EscrowResult,
};

/// Configuration for the escrow node
#[derive(Debug, Clone, Default)]
pub struct EscrowNodeConfig {
    /// Order manager configuration
    pub order_config: OrderManagerConfig,
}

/// Main escrow node that coordinates all components
pub struct EscrowNode {
    manager: Arc<OrderManager>,
    ledger: Arc<CustodyLedger>,
    bid_board: Arc<BidBoard>,
}

/// Point-in-time statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStats {
    pub total_orders: usize,
    pub open_orders: usize,
    pub in_escrow: usize,
    pub completed: usize,
    pub failed: usize,
    pub live_bids: usize,
    pub total_in_custody: Decimal,
}

impl EscrowNode {
    /// Create a node with the default tracing-backed notifier
    pub fn new(config: EscrowNodeConfig) -> Self {
        Self::with_notifier(config, Arc::new(TracingNotifier))
    }

    /// Create a node with a caller-provided event notifier
    pub fn with_notifier(config: EscrowNodeConfig, notifier: Arc<dyn EventNotifier>) -> Self {
        let ledger = Arc::new(CustodyLedger::new());
        let agreement = Arc::new(AgreementEngine::new(Arc::clone(&ledger)));
        let bid_board = Arc::new(BidBoard::new());
        let manager = Arc::new(OrderManager::new(
            config.order_config,
            Arc::clone(&bid_board),
            agreement,
            Arc::clone(&ledger),
            notifier,
        ));

        info!("escrow node initialized");

        Self {
            manager,
            ledger,
            bid_board,
        }
    }

    /// Submit a new escrow request
    pub async fn create_order(&self, requester: &str, amount: Decimal) -> EscrowResult<Order> {
        self.manager
            .create_order(CreateOrderRequest {
                requester: requester.to_string(),
                amount,
            })
            .await
    }

    /// Place a bid on an open order
    pub async fn place_bid(
        &self,
        order_id: Uuid,
        bidder: &str,
        message: Option<String>,
    ) -> EscrowResult<Bid> {
        self.manager
            .place_bid(PlaceBidRequest {
                order_id,
                bidder: bidder.to_string(),
                message,
            })
            .await
    }

    /// Withdraw a previously placed bid
    pub async fn withdraw_bid(&self, bid_id: Uuid, bidder: &str) -> EscrowResult<()> {
        self.manager.withdraw_bid(bid_id, bidder).await
    }

    /// Bids on an order, submission time ascending
    pub async fn list_bids(&self, order_id: Uuid) -> Vec<Bid> {
        self.manager.list_bids(order_id).await
    }

    /// Select the winning bid and assign the trader
    pub async fn select_trader(
        &self,
        order_id: Uuid,
        bid_id: Uuid,
        requester: &str,
    ) -> EscrowResult<Order> {
        self.manager
            .select_trader(SelectTraderRequest {
                order_id,
                bid_id,
                requester: requester.to_string(),
            })
            .await
    }

    /// Report an observed custody deposit for an order
    pub async fn custody_funded(&self, order_id: Uuid, observed: Decimal) -> EscrowResult<Order> {
        self.manager.custody_funded(order_id, observed).await
    }

    /// Attest the off-custody fiat leg for an order
    pub async fn fiat_attested(&self, order_id: Uuid, attestor: &str) -> EscrowResult<Order> {
        self.manager.fiat_attested(order_id, attestor).await
    }

    /// Declare or revise a party's choice for an order under custody
    pub async fn declare_choice(
        &self,
        order_id: Uuid,
        party: &str,
        choice: Choice,
    ) -> EscrowResult<ExecutionOutcome> {
        self.manager.declare_choice(order_id, party, choice).await
    }

    /// Abort an order to the Failed state, refunding any custody
    pub async fn abort_order(&self, order_id: Uuid, reason: &str) -> EscrowResult<Order> {
        self.manager.abort(order_id, reason).await
    }

    /// Get an order by id
    pub async fn get_order(&self, order_id: Uuid) -> EscrowResult<Order> {
        self.manager.get_order(order_id).await
    }

    /// All orders involving a party
    pub async fn orders_for(&self, party: &str) -> Vec<Order> {
        self.manager.orders_for(party).await
    }

    /// Agreement state for an order
    pub async fn agreement(&self, order_id: Uuid) -> Option<AgreementState> {
        self.manager.agreement(order_id).await
    }

    /// Custody record for an order
    pub async fn custody(&self, order_id: Uuid) -> Option<CustodyRecord> {
        self.manager.custody(order_id).await
    }

    /// Cumulative funds released to a party
    pub async fn payout(&self, party: &str) -> Decimal {
        self.ledger.payout(party).await
    }

    /// Audit trail for an order
    pub async fn order_events(&self, order_id: Uuid) -> Vec<EscrowEvent> {
        self.manager.order_events(order_id).await
    }

    /// Verify the ledger-wide conservation invariant
    pub async fn verify_conservation(&self) -> EscrowResult<()> {
        self.ledger.verify_conservation().await
    }

    /// Point-in-time node statistics
    pub async fn stats(&self) -> NodeStats {
        NodeStats {
            total_orders: self.manager.order_count().await,
            open_orders: self.manager.count_by_state(OrderState::OpenRequest).await
                + self.manager.count_by_state(OrderState::Bidding).await,
            in_escrow: self.manager.count_by_state(OrderState::UsdtInEscrow).await
                + self
                    .manager
                    .count_by_state(OrderState::AwaitingFiatConfirmation)
                    .await,
            completed: self.manager.count_by_state(OrderState::Completed).await,
            failed: self.manager.count_by_state(OrderState::Failed).await,
            live_bids: self.bid_board.len().await,
            total_in_custody: self.ledger.total_in_custody().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[tokio::test]
    async fn stats_track_order_buckets() {
        let node = EscrowNode::new(EscrowNodeConfig::default());

        let order = node.create_order("alice", amt(100)).await.unwrap();
        node.place_bid(order.id, "bob", None).await.unwrap();

        let stats = node.stats().await;
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.open_orders, 1);
        assert_eq!(stats.live_bids, 1);
        assert_eq!(stats.total_in_custody, amt(0));
    }
}
