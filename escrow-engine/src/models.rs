//! Core data models for the escrow system
//!
//! This module contains the order lifecycle state machine, bidding and
//! agreement records, custody accounting types, and the audit event
//! definition shared by all components.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EscrowError;
use crate::EscrowResult;

/// Order lifecycle state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Request posted, no bids yet
    OpenRequest,
    /// At least one bid received
    Bidding,
    /// Requester picked a trader; awaiting custody deposit
    SelectedTrader,
    /// Custody fully funded; agreement engine active
    UsdtInEscrow,
    /// Off-custody fiat leg attested by a party
    AwaitingFiatConfirmation,
    /// Agreement executed, funds released
    Completed,
    /// Aborted (timeout, dispute, cancellation)
    Failed,
}

impl OrderState {
    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this state accepts bid submission/withdrawal
    pub fn accepts_bids(&self) -> bool {
        matches!(self, Self::OpenRequest | Self::Bidding)
    }

    /// Check if this state allows trader selection
    pub fn can_select(&self) -> bool {
        matches!(self, Self::Bidding)
    }

    /// Check if the agreement engine may operate in this state
    pub fn custody_active(&self) -> bool {
        matches!(self, Self::UsdtInEscrow | Self::AwaitingFiatConfirmation)
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OpenRequest => "OPEN_REQUEST",
            Self::Bidding => "BIDDING",
            Self::SelectedTrader => "SELECTED_TRADER",
            Self::UsdtInEscrow => "USDT_IN_ESCROW",
            Self::AwaitingFiatConfirmation => "AWAITING_FIAT_CONFIRMATION",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A party's declared disposition of the custodied funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    /// No declaration yet
    None,
    /// Refund the custodied amount to the requester
    ToRequester,
    /// Release the custodied amount to the trader
    ToTrader,
}

impl Choice {
    /// The beneficiary role this choice names, if any
    pub fn beneficiary(&self) -> Option<Beneficiary> {
        match self {
            Self::None => None,
            Self::ToRequester => Some(Beneficiary::Requester),
            Self::ToTrader => Some(Beneficiary::Trader),
        }
    }
}

/// Recipient role of a custody release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Beneficiary {
    Requester,
    Trader,
}

impl std::fmt::Display for Beneficiary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requester => f.write_str("requester"),
            Self::Trader => f.write_str("trader"),
        }
    }
}

/// Order model representing one escrow negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// The party requesting the trade; immutable
    pub requester: String,
    /// Set exactly once, by trader selection
    pub trader: Option<String>,
    /// Custodied amount; immutable once custody is funded
    pub amount: Decimal,
    pub state: OrderState,
    /// Reason recorded when the order is aborted
    pub failed_reason: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub selected_at: Option<DateTime<Utc>>,
    pub funded_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a new order in the OpenRequest state
    pub fn new(requester: String, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester,
            trader: None,
            amount,
            state: OrderState::OpenRequest,
            failed_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            selected_at: None,
            funded_at: None,
            completed_at: None,
        }
    }

    /// Resolve which role a party id plays on this order, if any
    pub fn role_of(&self, party: &str) -> Option<Beneficiary> {
        if self.requester == party {
            Some(Beneficiary::Requester)
        } else if self.trader.as_deref() == Some(party) {
            Some(Beneficiary::Trader)
        } else {
            None
        }
    }

    /// Resolve a beneficiary role to the party id holding it
    pub fn party_for(&self, role: Beneficiary) -> Option<&str> {
        match role {
            Beneficiary::Requester => Some(self.requester.as_str()),
            Beneficiary::Trader => self.trader.as_deref(),
        }
    }

    /// Validate a state transition against the allowed-transition table
    pub fn validate_transition(&self, to_state: OrderState) -> EscrowResult<()> {
        if self.state.is_terminal() {
            return Err(EscrowError::terminal_state(
                self.id.to_string(),
                self.state.to_string(),
            ));
        }

        let valid = match (&self.state, &to_state) {
            (OrderState::OpenRequest, OrderState::Bidding) => true,
            (OrderState::Bidding, OrderState::SelectedTrader) => true,
            (OrderState::SelectedTrader, OrderState::UsdtInEscrow) => true,
            (OrderState::UsdtInEscrow, OrderState::AwaitingFiatConfirmation) => true,
            // Execution may fire before the fiat marker is set
            (OrderState::UsdtInEscrow, OrderState::Completed) => true,
            (OrderState::AwaitingFiatConfirmation, OrderState::Completed) => true,
            // Abort edge: every non-terminal state may fail
            (_, OrderState::Failed) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(EscrowError::invalid_state(
                self.state.to_string(),
                format!("transition to {to_state}"),
            ))
        }
    }
}

/// Bid model: a trader's offer to fulfill an open order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub order_id: Uuid,
    pub bidder: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Bid {
    /// Create a new bid against an order
    pub fn new(order_id: Uuid, bidder: String, message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            bidder,
            message,
            created_at: Utc::now(),
        }
    }
}

/// The custody decision record attached to a funded order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementState {
    pub order_id: Uuid,

    pub requester_choice: Choice,
    pub requester_signed: bool,
    pub trader_choice: Choice,
    pub trader_signed: bool,

    /// Monotonic: set exactly once, never cleared
    pub executed: bool,
    pub executed_recipient: Option<Beneficiary>,
    pub executed_amount: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgreementState {
    /// Create a fresh agreement with neither party signed
    pub fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            requester_choice: Choice::None,
            requester_signed: false,
            trader_choice: Choice::None,
            trader_signed: false,
            executed: false,
            executed_recipient: None,
            executed_amount: None,
            executed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Record (or revise) a party's choice and mark the party signed
    pub fn record(&mut self, role: Beneficiary, choice: Choice) {
        match role {
            Beneficiary::Requester => {
                self.requester_choice = choice;
                self.requester_signed = true;
            }
            Beneficiary::Trader => {
                self.trader_choice = choice;
                self.trader_signed = true;
            }
        }
        self.updated_at = Utc::now();
    }

    /// The agreed beneficiary, if both parties are signed and their
    /// choices name the same recipient. It is the shared choice value,
    /// not either party's role, that names the beneficiary.
    pub fn matched(&self) -> Option<Beneficiary> {
        if self.requester_signed
            && self.trader_signed
            && self.requester_choice == self.trader_choice
        {
            self.requester_choice.beneficiary()
        } else {
            None
        }
    }
}

/// The amount held against an order inside the custody ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub order_id: Uuid,
    /// Current held balance; zero after release
    pub balance: Decimal,
    pub total_deposited: Decimal,
    pub total_released: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustodyRecord {
    /// Create an empty custody record for an order
    pub fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            balance: Decimal::ZERO,
            total_deposited: Decimal::ZERO,
            total_released: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Result of a choice declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    /// Choice recorded; no agreement yet, no fund movement
    Pending,
    /// Both choices matched and the release fired in this call
    Executed {
        beneficiary: Beneficiary,
        recipient: String,
        amount: Decimal,
    },
}

/// Escrow event for the per-order audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowEvent {
    pub id: Uuid,
    pub event_type: String,
    pub order_id: Uuid,
    pub actor: Option<String>,
    pub amount: Option<Decimal>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new("alice".to_string(), Decimal::new(100, 0))
    }

    #[test]
    fn happy_path_transitions_are_valid() {
        let mut o = order();
        for next in [
            OrderState::Bidding,
            OrderState::SelectedTrader,
            OrderState::UsdtInEscrow,
            OrderState::AwaitingFiatConfirmation,
            OrderState::Completed,
        ] {
            o.validate_transition(next).unwrap();
            o.state = next;
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        let o = order();
        assert!(o.validate_transition(OrderState::SelectedTrader).is_err());
        assert!(o.validate_transition(OrderState::UsdtInEscrow).is_err());
        assert!(o.validate_transition(OrderState::Completed).is_err());
    }

    #[test]
    fn execution_may_complete_before_fiat_marker() {
        let mut o = order();
        o.state = OrderState::UsdtInEscrow;
        o.validate_transition(OrderState::Completed).unwrap();
    }

    #[test]
    fn every_non_terminal_state_can_fail() {
        for state in [
            OrderState::OpenRequest,
            OrderState::Bidding,
            OrderState::SelectedTrader,
            OrderState::UsdtInEscrow,
            OrderState::AwaitingFiatConfirmation,
        ] {
            let mut o = order();
            o.state = state;
            o.validate_transition(OrderState::Failed).unwrap();
        }
    }

    #[test]
    fn terminal_states_reject_all_transitions() {
        for state in [OrderState::Completed, OrderState::Failed] {
            let mut o = order();
            o.state = state;
            let err = o.validate_transition(OrderState::Bidding).unwrap_err();
            assert!(matches!(err, EscrowError::TerminalState { .. }));
        }
    }

    #[test]
    fn agreement_matches_on_equal_signed_choices() {
        let mut a = AgreementState::new(Uuid::new_v4());
        assert_eq!(a.matched(), None);

        a.record(Beneficiary::Requester, Choice::ToTrader);
        assert_eq!(a.matched(), None, "one signature is not a match");

        a.record(Beneficiary::Trader, Choice::ToTrader);
        assert_eq!(a.matched(), Some(Beneficiary::Trader));
    }

    #[test]
    fn divergent_choices_do_not_match() {
        let mut a = AgreementState::new(Uuid::new_v4());
        a.record(Beneficiary::Requester, Choice::ToRequester);
        a.record(Beneficiary::Trader, Choice::ToTrader);
        assert_eq!(a.matched(), None);
    }

    #[test]
    fn revision_overwrites_prior_choice() {
        let mut a = AgreementState::new(Uuid::new_v4());
        a.record(Beneficiary::Requester, Choice::ToTrader);
        a.record(Beneficiary::Requester, Choice::ToRequester);
        a.record(Beneficiary::Trader, Choice::ToRequester);
        assert_eq!(a.matched(), Some(Beneficiary::Requester));
    }

    #[test]
    fn shared_choice_value_names_the_beneficiary() {
        // Both parties choose ToRequester: funds go back to the
        // requester regardless of who signed first.
        let mut a = AgreementState::new(Uuid::new_v4());
        a.record(Beneficiary::Trader, Choice::ToRequester);
        a.record(Beneficiary::Requester, Choice::ToRequester);
        assert_eq!(a.matched(), Some(Beneficiary::Requester));
    }

    #[test]
    fn role_resolution() {
        let mut o = order();
        o.trader = Some("bob".to_string());
        assert_eq!(o.role_of("alice"), Some(Beneficiary::Requester));
        assert_eq!(o.role_of("bob"), Some(Beneficiary::Trader));
        assert_eq!(o.role_of("mallory"), None);
        assert_eq!(o.party_for(Beneficiary::Trader), Some("bob"));
    }
}
