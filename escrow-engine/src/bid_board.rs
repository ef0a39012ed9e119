//! Bid Board - Competing offers to fulfill an open order
//!
//! Tracks bids per order in submission order, enforces the
//! one-bid-per-party and no-self-bid invariants, and exposes the
//! winning-bid selection that seeds the agreement's counterparty.
//! Lifecycle transitions stay with the order manager; this board only
//! validates and stores.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::models::{Bid, Order};
use crate::EscrowResult;

/// In-memory bid store, submission-ordered per order
pub struct BidBoard {
    bids: RwLock<HashMap<Uuid, Vec<Bid>>>,
}

impl BidBoard {
    /// Create an empty board
    pub fn new() -> Self {
        Self {
            bids: RwLock::new(HashMap::new()),
        }
    }

    /// Submit a bid against an order. At most one bid per
    /// (order, bidder); the requester may not bid on their own order.
    pub async fn submit(
        &self,
        order: &Order,
        bidder: &str,
        message: Option<String>,
    ) -> EscrowResult<Bid> {
        if !order.state.accepts_bids() {
            return Err(EscrowError::invalid_state(
                order.state.to_string(),
                "submit bid".to_string(),
            ));
        }
        if bidder == order.requester {
            return Err(EscrowError::SelfBid);
        }

        let mut bids = self.bids.write().await;
        let order_bids = bids.entry(order.id).or_default();
        if order_bids.iter().any(|b| b.bidder == bidder) {
            return Err(EscrowError::duplicate_bid(
                order.id.to_string(),
                bidder.to_string(),
            ));
        }

        let bid = Bid::new(order.id, bidder.to_string(), message);
        order_bids.push(bid.clone());

        info!(order_id = %order.id, bidder = %bidder, bid_id = %bid.id, "bid submitted");

        Ok(bid)
    }

    /// Withdraw a bid. Removes it only if authored by `bidder`;
    /// otherwise fails with `NotFound`.
    pub async fn withdraw(&self, bid_id: Uuid, bidder: &str) -> EscrowResult<Bid> {
        let mut bids = self.bids.write().await;
        for order_bids in bids.values_mut() {
            if let Some(pos) = order_bids
                .iter()
                .position(|b| b.id == bid_id && b.bidder == bidder)
            {
                let bid = order_bids.remove(pos);
                info!(order_id = %bid.order_id, bidder = %bidder, bid_id = %bid_id, "bid withdrawn");
                return Ok(bid);
            }
        }
        Err(EscrowError::not_found(format!(
            "bid {bid_id} authored by {bidder}"
        )))
    }

    /// Bids for an order, ordered by submission time ascending. Stable,
    /// repeatable read.
    pub async fn list(&self, order_id: Uuid) -> Vec<Bid> {
        self.bids
            .read()
            .await
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Look up a bid by id
    pub async fn get(&self, bid_id: Uuid) -> Option<Bid> {
        self.bids
            .read()
            .await
            .values()
            .flatten()
            .find(|b| b.id == bid_id)
            .cloned()
    }

    /// Select the winning bid for an order. Only the order's requester
    /// may select, only once, and only from the order's own bids.
    /// Returns the winning bid; the caller assigns the trader and
    /// advances the lifecycle.
    pub async fn select(
        &self,
        order: &Order,
        bid_id: Uuid,
        requester: &str,
    ) -> EscrowResult<Bid> {
        if requester != order.requester {
            return Err(EscrowError::unauthorized(format!(
                "{requester} is not the requester of order {}",
                order.id
            )));
        }
        if order.trader.is_some() {
            return Err(EscrowError::AlreadySelected(order.id.to_string()));
        }
        if !order.state.can_select() {
            return Err(EscrowError::invalid_state(
                order.state.to_string(),
                "select trader".to_string(),
            ));
        }

        let bids = self.bids.read().await;
        let bid = bids
            .get(&order.id)
            .and_then(|order_bids| order_bids.iter().find(|b| b.id == bid_id))
            .cloned()
            .ok_or_else(|| {
                EscrowError::not_found(format!("bid {bid_id} on order {}", order.id))
            })?;

        info!(order_id = %order.id, bid_id = %bid_id, trader = %bid.bidder, "bid selected");

        Ok(bid)
    }

    /// Total number of live bids across all orders
    pub async fn len(&self) -> usize {
        self.bids.read().await.values().map(Vec::len).sum()
    }

    /// Whether the board holds no bids
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for BidBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderState;
    use rust_decimal::Decimal;

    fn open_order() -> Order {
        Order::new("alice".to_string(), Decimal::new(100, 0))
    }

    #[tokio::test]
    async fn submit_and_list_in_submission_order() {
        let board = BidBoard::new();
        let order = open_order();

        let first = board.submit(&order, "bob", None).await.unwrap();
        let second = board
            .submit(&order, "carol", Some("fast settlement".to_string()))
            .await
            .unwrap();

        let listed = board.list(order.id).await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test]
    async fn duplicate_bid_rejected() {
        let board = BidBoard::new();
        let order = open_order();
        board.submit(&order, "bob", None).await.unwrap();
        let err = board.submit(&order, "bob", None).await.unwrap_err();
        assert!(matches!(err, EscrowError::DuplicateBid { .. }));
    }

    #[tokio::test]
    async fn self_bid_rejected() {
        let board = BidBoard::new();
        let order = open_order();
        let err = board.submit(&order, "alice", None).await.unwrap_err();
        assert!(matches!(err, EscrowError::SelfBid));
    }

    #[tokio::test]
    async fn bids_rejected_outside_bidding_states() {
        let board = BidBoard::new();
        let mut order = open_order();
        order.state = OrderState::SelectedTrader;
        let err = board.submit(&order, "bob", None).await.unwrap_err();
        assert!(matches!(err, EscrowError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn withdraw_is_author_only() {
        let board = BidBoard::new();
        let order = open_order();
        let bid = board.submit(&order, "bob", None).await.unwrap();

        let err = board.withdraw(bid.id, "carol").await.unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(_)));
        assert_eq!(board.list(order.id).await.len(), 1);

        board.withdraw(bid.id, "bob").await.unwrap();
        assert!(board.list(order.id).await.is_empty());
    }

    #[tokio::test]
    async fn select_requires_requester() {
        let board = BidBoard::new();
        let mut order = open_order();
        order.state = OrderState::Bidding;
        let bid = board.submit(&order, "bob", None).await.unwrap();

        let err = board.select(&order, bid.id, "bob").await.unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized(_)));

        let selected = board.select(&order, bid.id, "alice").await.unwrap();
        assert_eq!(selected.bidder, "bob");
    }

    #[tokio::test]
    async fn select_twice_is_rejected() {
        let board = BidBoard::new();
        let mut order = open_order();
        order.state = OrderState::Bidding;
        let bid = board.submit(&order, "bob", None).await.unwrap();
        board.select(&order, bid.id, "alice").await.unwrap();

        // Simulate the manager having assigned the trader
        order.trader = Some("bob".to_string());
        order.state = OrderState::SelectedTrader;
        let err = board.select(&order, bid.id, "alice").await.unwrap_err();
        assert!(matches!(err, EscrowError::AlreadySelected(_)));
    }

    #[tokio::test]
    async fn select_foreign_bid_is_not_found() {
        let board = BidBoard::new();
        let mut order = open_order();
        order.state = OrderState::Bidding;
        board.submit(&order, "bob", None).await.unwrap();

        let mut other = open_order();
        other.state = OrderState::Bidding;
        let foreign = board.submit(&other, "carol", None).await.unwrap();

        let err = board.select(&order, foreign.id, "alice").await.unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(_)));
    }
}
