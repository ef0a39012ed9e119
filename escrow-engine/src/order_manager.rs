//! Order Manager - Coordinates the order lifecycle and state transitions
//!
//! This module drives an order from an open request through competitive
//! bidding, trader selection, custody funding, and settlement to a
//! terminal state. It owns the mapping from lifecycle state to the
//! operations currently permitted, and serializes all mutation on a
//! given order behind a per-order lock so the off-chain lifecycle can
//! never diverge from the custody decision.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    agreement::AgreementEngine,
    bid_board::BidBoard,
    error::EscrowError,
    ledger::CustodyLedger,
    models::{
        AgreementState, Bid, Choice, CustodyRecord, EscrowEvent, ExecutionOutcome, Order,
        OrderState,
    },
    notifier::{EventNotifier, NotifierEvent},
    EscrowResult,
};

/// Configuration for the order manager
#[derive(Debug, Clone)]
pub struct OrderManagerConfig {
    /// Maximum custodied amount per order
    pub max_order_amount: Decimal,
    /// Maximum length of an optional bid message
    pub max_bid_message_len: usize,
}

impl Default for OrderManagerConfig {
    fn default() -> Self {
        Self {
            max_order_amount: Decimal::new(1_000_000, 0),
            max_bid_message_len: 512,
        }
    }
}

/// Order creation request
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub requester: String,
    pub amount: Decimal,
}

/// Bid submission request
#[derive(Debug, Clone)]
pub struct PlaceBidRequest {
    pub order_id: Uuid,
    pub bidder: String,
    pub message: Option<String>,
}

/// Trader selection request
#[derive(Debug, Clone)]
pub struct SelectTraderRequest {
    pub order_id: Uuid,
    pub bid_id: Uuid,
    pub requester: String,
}

/// Main coordinator owning orders and the per-order serialization locks
pub struct OrderManager {
    config: OrderManagerConfig,
    /// In-memory order storage
    orders: RwLock<HashMap<Uuid, Order>>,
    /// Per-order mutation locks; all state-changing operations on one
    /// order id are mutually exclusive
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Append-only audit trail
    events: RwLock<Vec<EscrowEvent>>,
    bid_board: Arc<BidBoard>,
    agreement: Arc<AgreementEngine>,
    ledger: Arc<CustodyLedger>,
    notifier: Arc<dyn EventNotifier>,
}

impl OrderManager {
    /// Create a new order manager wired to its collaborators
    pub fn new(
        config: OrderManagerConfig,
        bid_board: Arc<BidBoard>,
        agreement: Arc<AgreementEngine>,
        ledger: Arc<CustodyLedger>,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            config,
            orders: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            bid_board,
            agreement,
            ledger,
            notifier,
        }
    }

    /// Submit a new escrow request
    pub async fn create_order(&self, request: CreateOrderRequest) -> EscrowResult<Order> {
        if request.requester.trim().is_empty() {
            return Err(EscrowError::validation("Requester cannot be empty"));
        }
        if request.amount <= Decimal::ZERO {
            return Err(EscrowError::NegativeAmount(request.amount));
        }
        if request.amount > self.config.max_order_amount {
            return Err(EscrowError::validation(format!(
                "Amount {} exceeds maximum {}",
                request.amount, self.config.max_order_amount
            )));
        }

        let order = Order::new(request.requester.clone(), request.amount);
        self.orders.write().await.insert(order.id, order.clone());

        info!(order_id = %order.id, requester = %order.requester, amount = %order.amount, "order created");

        self.record_event("order.created", order.id, Some(&order.requester), Some(order.amount), None)
            .await;
        self.notify(NotifierEvent::OrderCreated {
            order_id: order.id,
            requester: order.requester.clone(),
            amount: order.amount,
        })
        .await;

        Ok(order)
    }

    /// Place a bid on an open order. The first bid moves the order from
    /// OpenRequest to Bidding.
    pub async fn place_bid(&self, request: PlaceBidRequest) -> EscrowResult<Bid> {
        if let Some(ref message) = request.message {
            if message.len() > self.config.max_bid_message_len {
                return Err(EscrowError::validation(format!(
                    "Bid message exceeds {} bytes",
                    self.config.max_bid_message_len
                )));
            }
        }

        let lock = self.order_lock(request.order_id).await?;
        let _guard = lock.lock().await;

        let order = self.load_order(request.order_id).await?;
        let bid = self
            .bid_board
            .submit(&order, &request.bidder, request.message)
            .await?;

        if order.state == OrderState::OpenRequest {
            self.transition(order, OrderState::Bidding).await?;
        }

        self.record_event("bid.placed", request.order_id, Some(&request.bidder), None, None)
            .await;
        self.notify(NotifierEvent::BidPlaced {
            order_id: request.order_id,
            bid_id: bid.id,
            bidder: bid.bidder.clone(),
        })
        .await;

        Ok(bid)
    }

    /// Withdraw a bid; only its author may, and only while the order
    /// still accepts bids.
    pub async fn withdraw_bid(&self, bid_id: Uuid, bidder: &str) -> EscrowResult<()> {
        let bid = self
            .bid_board
            .get(bid_id)
            .await
            .ok_or_else(|| EscrowError::not_found(format!("bid {bid_id}")))?;

        let lock = self.order_lock(bid.order_id).await?;
        let _guard = lock.lock().await;

        let order = self.load_order(bid.order_id).await?;
        if !order.state.accepts_bids() {
            return Err(EscrowError::invalid_state(
                order.state.to_string(),
                "withdraw bid".to_string(),
            ));
        }

        let bid = self.bid_board.withdraw(bid_id, bidder).await?;

        self.record_event("bid.withdrawn", bid.order_id, Some(bidder), None, None)
            .await;
        self.notify(NotifierEvent::BidWithdrawn {
            order_id: bid.order_id,
            bid_id,
            bidder: bidder.to_string(),
        })
        .await;

        Ok(())
    }

    /// Bids on an order, submission time ascending
    pub async fn list_bids(&self, order_id: Uuid) -> Vec<Bid> {
        self.bid_board.list(order_id).await
    }

    /// Select the winning bid. The only path that sets the order's
    /// trader and advances the lifecycle to SelectedTrader.
    pub async fn select_trader(&self, request: SelectTraderRequest) -> EscrowResult<Order> {
        let lock = self.order_lock(request.order_id).await?;
        let _guard = lock.lock().await;

        let order = self.load_order(request.order_id).await?;
        let winning = self
            .bid_board
            .select(&order, request.bid_id, &request.requester)
            .await?;

        let mut order = order;
        order.trader = Some(winning.bidder.clone());
        order.selected_at = Some(Utc::now());
        let order = self.transition(order, OrderState::SelectedTrader).await?;

        info!(order_id = %order.id, trader = %winning.bidder, "trader selected");

        self.record_event("trader.selected", order.id, Some(&winning.bidder), None, None)
            .await;
        self.notify(NotifierEvent::TraderSelected {
            order_id: order.id,
            trader: winning.bidder.clone(),
        })
        .await;

        Ok(order)
    }

    /// Inbound boundary event: a custody deposit was observed for the
    /// order. Deposits accumulate; the lifecycle advances to
    /// UsdtInEscrow only once the full stated amount is held, partial
    /// totals are reported as `InsufficientDeposit` with the deposit
    /// retained.
    pub async fn custody_funded(&self, order_id: Uuid, observed: Decimal) -> EscrowResult<Order> {
        let lock = self.order_lock(order_id).await?;
        let _guard = lock.lock().await;

        let order = self.load_order(order_id).await?;
        if order.state.is_terminal() {
            return Err(EscrowError::terminal_state(
                order_id.to_string(),
                order.state.to_string(),
            ));
        }
        if order.state != OrderState::SelectedTrader {
            return Err(EscrowError::invalid_state(
                order.state.to_string(),
                "custody deposit".to_string(),
            ));
        }

        let held = self.ledger.balance(order_id).await;
        if held + observed > order.amount {
            return Err(EscrowError::validation(format!(
                "Deposit of {observed} would exceed the order amount {} (already held: {held})",
                order.amount
            )));
        }

        let record = self.ledger.deposit(order_id, observed).await?;
        if record.balance < order.amount {
            return Err(EscrowError::InsufficientDeposit {
                expected: order.amount,
                observed: record.balance,
            });
        }

        let mut order = self.transition(order, OrderState::UsdtInEscrow).await?;
        order.funded_at = Some(Utc::now());
        order.updated_at = Utc::now();
        self.orders.write().await.insert(order.id, order.clone());

        self.agreement.activate(&order).await?;

        info!(order_id = %order_id, amount = %order.amount, "custody fully funded, agreement active");

        self.record_event("custody.funded", order_id, None, Some(order.amount), None)
            .await;
        self.notify(NotifierEvent::CustodyFunded {
            order_id,
            amount: order.amount,
        })
        .await;

        Ok(order)
    }

    /// Inbound boundary event: either party attests the off-custody
    /// fiat leg. A lifecycle marker only; moves no funds.
    pub async fn fiat_attested(&self, order_id: Uuid, attestor: &str) -> EscrowResult<Order> {
        let lock = self.order_lock(order_id).await?;
        let _guard = lock.lock().await;

        let order = self.load_order(order_id).await?;
        if order.role_of(attestor).is_none() {
            return Err(EscrowError::unauthorized(format!(
                "{attestor} is not a party to order {order_id}"
            )));
        }
        if order.state != OrderState::UsdtInEscrow {
            return Err(EscrowError::invalid_state(
                order.state.to_string(),
                "fiat attestation".to_string(),
            ));
        }

        let order = self
            .transition(order, OrderState::AwaitingFiatConfirmation)
            .await?;

        self.record_event("fiat.attested", order_id, Some(attestor), None, None)
            .await;
        self.notify(NotifierEvent::FiatAttested {
            order_id,
            attestor: attestor.to_string(),
        })
        .await;

        Ok(order)
    }

    /// Declare or revise a party's choice. If both declared choices
    /// match, custody is released exactly once in this call and the
    /// order completes in the same critical section.
    pub async fn declare_choice(
        &self,
        order_id: Uuid,
        party: &str,
        choice: Choice,
    ) -> EscrowResult<ExecutionOutcome> {
        let lock = self.order_lock(order_id).await?;
        let _guard = lock.lock().await;

        let order = self.load_order(order_id).await?;
        if order.state.is_terminal() {
            // A completed order implies an executed agreement; report
            // the more specific failure for replayed signatures.
            if self.agreement.is_executed(order_id).await {
                return Err(EscrowError::AlreadyExecuted(order_id.to_string()));
            }
            return Err(EscrowError::terminal_state(
                order_id.to_string(),
                order.state.to_string(),
            ));
        }
        if !order.state.custody_active() {
            return Err(EscrowError::invalid_state(
                order.state.to_string(),
                "declare choice".to_string(),
            ));
        }

        // The engine only binds choices while the full stated amount
        // is held; report the shortfall before touching the agreement.
        let held = self.ledger.balance(order_id).await;
        if held != order.amount {
            return Err(EscrowError::InsufficientCustody {
                required: order.amount,
                available: held,
            });
        }

        let outcome = self.agreement.declare_choice(&order, party, choice).await?;

        self.record_event("choice.declared", order_id, Some(party), None, None)
            .await;
        self.notify(NotifierEvent::ChoiceDeclared {
            order_id,
            party: party.to_string(),
            choice,
        })
        .await;

        if let ExecutionOutcome::Executed {
            beneficiary,
            ref recipient,
            amount,
        } = outcome
        {
            let mut order = self.transition(order, OrderState::Completed).await?;
            order.completed_at = Some(Utc::now());
            order.updated_at = Utc::now();
            self.orders.write().await.insert(order.id, order.clone());

            self.record_event(
                "agreement.executed",
                order_id,
                Some(recipient),
                Some(amount),
                Some(serde_json::json!({ "beneficiary": beneficiary })),
            )
            .await;
            self.notify(NotifierEvent::AgreementExecuted {
                order_id,
                beneficiary,
                recipient: recipient.clone(),
                amount,
                timestamp: Utc::now(),
            })
            .await;
        }

        Ok(outcome)
    }

    /// Abort an order to the Failed state (custody timeout, dispute,
    /// cancellation). Rejected once the agreement executed; any custody
    /// balance is refunded to the requester so no terminal order
    /// strands funds.
    pub async fn abort(&self, order_id: Uuid, reason: &str) -> EscrowResult<Order> {
        let lock = self.order_lock(order_id).await?;
        let _guard = lock.lock().await;

        let order = self.load_order(order_id).await?;
        if order.state.is_terminal() {
            return Err(EscrowError::terminal_state(
                order_id.to_string(),
                order.state.to_string(),
            ));
        }
        if self.agreement.is_executed(order_id).await {
            return Err(EscrowError::AlreadyExecuted(order_id.to_string()));
        }

        let held = self.ledger.balance(order_id).await;
        if held > Decimal::ZERO {
            self.ledger.refund(order_id, &order.requester, held).await?;
        }

        let mut order = self.transition(order, OrderState::Failed).await?;
        order.failed_reason = Some(reason.to_string());
        order.updated_at = Utc::now();
        self.orders.write().await.insert(order.id, order.clone());

        warn!(order_id = %order_id, reason = %reason, refunded = %held, "order aborted");

        self.record_event(
            "order.aborted",
            order_id,
            None,
            Some(held),
            Some(serde_json::json!({ "reason": reason })),
        )
        .await;
        self.notify(NotifierEvent::OrderAborted {
            order_id,
            reason: reason.to_string(),
            refunded: held,
        })
        .await;

        Ok(order)
    }

    /// Get an order by id
    pub async fn get_order(&self, order_id: Uuid) -> EscrowResult<Order> {
        self.load_order(order_id).await
    }

    /// All orders where the party is requester or trader
    pub async fn orders_for(&self, party: &str) -> Vec<Order> {
        self.orders
            .read()
            .await
            .values()
            .filter(|order| order.role_of(party).is_some())
            .cloned()
            .collect()
    }

    /// Agreement state for an order, if custody was ever funded
    pub async fn agreement(&self, order_id: Uuid) -> Option<AgreementState> {
        self.agreement.state(order_id).await
    }

    /// Custody record for an order, if a deposit was ever observed
    pub async fn custody(&self, order_id: Uuid) -> Option<CustodyRecord> {
        self.ledger.record(order_id).await
    }

    /// Audit trail for an order
    pub async fn order_events(&self, order_id: Uuid) -> Vec<EscrowEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Number of orders in each of a few interesting buckets
    pub async fn count_by_state(&self, state: OrderState) -> usize {
        self.orders
            .read()
            .await
            .values()
            .filter(|order| order.state == state)
            .count()
    }

    /// Total number of orders
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    async fn load_order(&self, order_id: Uuid) -> EscrowResult<Order> {
        self.orders
            .read()
            .await
            .get(&order_id)
            .cloned()
            .ok_or_else(|| EscrowError::not_found(format!("order {order_id}")))
    }

    /// Validate, apply, store, and announce a lifecycle transition
    async fn transition(&self, mut order: Order, to: OrderState) -> EscrowResult<Order> {
        order.validate_transition(to)?;
        let from = order.state;
        order.state = to;
        order.updated_at = Utc::now();
        self.orders.write().await.insert(order.id, order.clone());

        // Terminal orders take no further mutation; drop their lock
        if to.is_terminal() {
            self.locks.lock().await.remove(&order.id);
        }

        info!(order_id = %order.id, %from, %to, "lifecycle transition");

        self.notify(NotifierEvent::LifecycleTransition {
            order_id: order.id,
            from,
            to,
        })
        .await;

        Ok(order)
    }

    /// Per-order serialization lock. Registered only for known orders
    /// and evicted once the order reaches a terminal state, so the
    /// registry stays bounded by the live order set.
    async fn order_lock(&self, order_id: Uuid) -> EscrowResult<Arc<Mutex<()>>> {
        if !self.orders.read().await.contains_key(&order_id) {
            return Err(EscrowError::not_found(format!("order {order_id}")));
        }
        let mut locks = self.locks.lock().await;
        Ok(Arc::clone(locks.entry(order_id).or_default()))
    }

    /// Append an audit event
    async fn record_event(
        &self,
        event_type: &str,
        order_id: Uuid,
        actor: Option<&str>,
        amount: Option<Decimal>,
        metadata: Option<serde_json::Value>,
    ) {
        let event = EscrowEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            order_id,
            actor: actor.map(str::to_string),
            amount,
            metadata,
            created_at: Utc::now(),
        };
        self.events.write().await.push(event);
    }

    /// Fire-and-forget event delivery; sink failures never block mutation
    async fn notify(&self, event: NotifierEvent) {
        if let Err(err) = self.notifier.publish(&event).await {
            warn!(error = %err, "event notifier delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NullNotifier;

    fn amt(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn manager() -> (Arc<OrderManager>, Arc<CustodyLedger>) {
        let ledger = Arc::new(CustodyLedger::new());
        let agreement = Arc::new(AgreementEngine::new(Arc::clone(&ledger)));
        let manager = OrderManager::new(
            OrderManagerConfig::default(),
            Arc::new(BidBoard::new()),
            agreement,
            Arc::clone(&ledger),
            Arc::new(NullNotifier),
        );
        (Arc::new(manager), ledger)
    }

    async fn order_in_escrow(manager: &OrderManager) -> Order {
        let order = manager
            .create_order(CreateOrderRequest {
                requester: "alice".to_string(),
                amount: amt(100),
            })
            .await
            .unwrap();
        let bid = manager
            .place_bid(PlaceBidRequest {
                order_id: order.id,
                bidder: "bob".to_string(),
                message: None,
            })
            .await
            .unwrap();
        manager
            .select_trader(SelectTraderRequest {
                order_id: order.id,
                bid_id: bid.id,
                requester: "alice".to_string(),
            })
            .await
            .unwrap();
        manager.custody_funded(order.id, amt(100)).await.unwrap()
    }

    #[tokio::test]
    async fn create_order_validates_amount() {
        let (manager, _) = manager();
        let err = manager
            .create_order(CreateOrderRequest {
                requester: "alice".to_string(),
                amount: amt(0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::NegativeAmount(_)));

        let err = manager
            .create_order(CreateOrderRequest {
                requester: "alice".to_string(),
                amount: amt(2_000_000),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Validation(_)));
    }

    #[tokio::test]
    async fn first_bid_moves_order_to_bidding() {
        let (manager, _) = manager();
        let order = manager
            .create_order(CreateOrderRequest {
                requester: "alice".to_string(),
                amount: amt(100),
            })
            .await
            .unwrap();
        assert_eq!(order.state, OrderState::OpenRequest);

        manager
            .place_bid(PlaceBidRequest {
                order_id: order.id,
                bidder: "bob".to_string(),
                message: None,
            })
            .await
            .unwrap();

        let order = manager.get_order(order.id).await.unwrap();
        assert_eq!(order.state, OrderState::Bidding);
    }

    #[tokio::test]
    async fn partial_deposits_accumulate_without_transition() {
        let (manager, _) = manager();
        let order = manager
            .create_order(CreateOrderRequest {
                requester: "alice".to_string(),
                amount: amt(100),
            })
            .await
            .unwrap();
        let bid = manager
            .place_bid(PlaceBidRequest {
                order_id: order.id,
                bidder: "bob".to_string(),
                message: None,
            })
            .await
            .unwrap();
        manager
            .select_trader(SelectTraderRequest {
                order_id: order.id,
                bid_id: bid.id,
                requester: "alice".to_string(),
            })
            .await
            .unwrap();

        let err = manager.custody_funded(order.id, amt(40)).await.unwrap_err();
        assert!(matches!(
            err,
            EscrowError::InsufficientDeposit { observed, .. } if observed == amt(40)
        ));
        let order_now = manager.get_order(order.id).await.unwrap();
        assert_eq!(order_now.state, OrderState::SelectedTrader);

        // Second deposit completes the funding
        let order_now = manager.custody_funded(order.id, amt(60)).await.unwrap();
        assert_eq!(order_now.state, OrderState::UsdtInEscrow);
        assert!(manager.agreement(order.id).await.is_some());
    }

    #[tokio::test]
    async fn over_deposit_is_rejected() {
        let (manager, ledger) = manager();
        let order = manager
            .create_order(CreateOrderRequest {
                requester: "alice".to_string(),
                amount: amt(100),
            })
            .await
            .unwrap();
        let bid = manager
            .place_bid(PlaceBidRequest {
                order_id: order.id,
                bidder: "bob".to_string(),
                message: None,
            })
            .await
            .unwrap();
        manager
            .select_trader(SelectTraderRequest {
                order_id: order.id,
                bid_id: bid.id,
                requester: "alice".to_string(),
            })
            .await
            .unwrap();

        let err = manager.custody_funded(order.id, amt(150)).await.unwrap_err();
        assert!(matches!(err, EscrowError::Validation(_)));
        assert_eq!(ledger.balance(order.id).await, amt(0));
    }

    #[tokio::test]
    async fn fiat_attestation_marks_the_order() {
        let (manager, _) = manager();
        let order = order_in_escrow(&manager).await;

        let err = manager.fiat_attested(order.id, "mallory").await.unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized(_)));

        let order = manager.fiat_attested(order.id, "bob").await.unwrap();
        assert_eq!(order.state, OrderState::AwaitingFiatConfirmation);

        // Attestation is a one-way marker
        let err = manager.fiat_attested(order.id, "alice").await.unwrap_err();
        assert!(matches!(err, EscrowError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn matched_choices_complete_the_order() {
        let (manager, ledger) = manager();
        let order = order_in_escrow(&manager).await;

        let outcome = manager
            .declare_choice(order.id, "alice", Choice::ToTrader)
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Pending);

        let outcome = manager
            .declare_choice(order.id, "bob", Choice::ToTrader)
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Executed { .. }));

        let order = manager.get_order(order.id).await.unwrap();
        assert_eq!(order.state, OrderState::Completed);
        assert_eq!(ledger.payout("bob").await, amt(100));
        ledger.verify_conservation().await.unwrap();

        // Replay after completion
        let err = manager
            .declare_choice(order.id, "alice", Choice::ToTrader)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::AlreadyExecuted(_)));
    }

    #[tokio::test]
    async fn abort_refunds_custody_to_requester() {
        let (manager, ledger) = manager();
        let order = order_in_escrow(&manager).await;

        let order = manager.abort(order.id, "custody timeout").await.unwrap();
        assert_eq!(order.state, OrderState::Failed);
        assert_eq!(order.failed_reason.as_deref(), Some("custody timeout"));
        assert_eq!(ledger.payout("alice").await, amt(100));
        assert_eq!(ledger.balance(order.id).await, amt(0));
        ledger.verify_conservation().await.unwrap();
    }

    #[tokio::test]
    async fn abort_after_execution_is_rejected() {
        let (manager, ledger) = manager();
        let order = order_in_escrow(&manager).await;

        manager
            .declare_choice(order.id, "alice", Choice::ToTrader)
            .await
            .unwrap();
        manager
            .declare_choice(order.id, "bob", Choice::ToTrader)
            .await
            .unwrap();

        let err = manager.abort(order.id, "too late").await.unwrap_err();
        assert!(matches!(
            err,
            EscrowError::AlreadyExecuted(_) | EscrowError::TerminalState { .. }
        ));
        assert_eq!(ledger.payout("bob").await, amt(100));
        assert_eq!(ledger.payout("alice").await, amt(0));
    }

    #[tokio::test]
    async fn operations_on_unknown_orders_are_not_found() {
        let (manager, _) = manager();
        let ghost = Uuid::new_v4();

        let err = manager
            .place_bid(PlaceBidRequest {
                order_id: ghost,
                bidder: "bob".to_string(),
                message: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(_)));

        let err = manager.custody_funded(ghost, amt(100)).await.unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(_)));

        let err = manager
            .declare_choice(ghost, "alice", Choice::ToTrader)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(_)));

        let err = manager.abort(ghost, "no such order").await.unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(_)));
    }

    #[tokio::test]
    async fn bids_cannot_be_withdrawn_after_selection() {
        let (manager, _) = manager();
        let order = manager
            .create_order(CreateOrderRequest {
                requester: "alice".to_string(),
                amount: amt(100),
            })
            .await
            .unwrap();
        let bid = manager
            .place_bid(PlaceBidRequest {
                order_id: order.id,
                bidder: "bob".to_string(),
                message: None,
            })
            .await
            .unwrap();
        let losing = manager
            .place_bid(PlaceBidRequest {
                order_id: order.id,
                bidder: "carol".to_string(),
                message: None,
            })
            .await
            .unwrap();
        manager
            .select_trader(SelectTraderRequest {
                order_id: order.id,
                bid_id: bid.id,
                requester: "alice".to_string(),
            })
            .await
            .unwrap();

        // Remaining bids are historical, non-actionable
        let err = manager.withdraw_bid(losing.id, "carol").await.unwrap_err();
        assert!(matches!(err, EscrowError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn audit_trail_covers_the_lifecycle() {
        let (manager, _) = manager();
        let order = order_in_escrow(&manager).await;
        manager
            .declare_choice(order.id, "alice", Choice::ToTrader)
            .await
            .unwrap();
        manager
            .declare_choice(order.id, "bob", Choice::ToTrader)
            .await
            .unwrap();

        let events = manager.order_events(order.id).await;
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        for expected in [
            "order.created",
            "bid.placed",
            "trader.selected",
            "custody.funded",
            "choice.declared",
            "agreement.executed",
        ] {
            assert!(kinds.contains(&expected), "missing audit event {expected}");
        }
    }
}
