//! Error types for the escrow system
//!
//! Every operation surfaces failures as a typed `EscrowError` variant.
//! None of these crash the process; the only condition treated as a
//! corruption alarm is a broken custody conservation invariant, which
//! halts further mutation on the affected order.

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for escrow operations
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Operation not permitted in the order's current lifecycle state
    #[error("Invalid state: {operation} not permitted while order is {state}")]
    InvalidState { state: String, operation: String },

    /// Caller is not the expected party for this operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A bidder may hold at most one bid per order
    #[error("Duplicate bid: {bidder} already has a bid on order {order_id}")]
    DuplicateBid { order_id: String, bidder: String },

    /// The order's own requester may not bid on it
    #[error("Self bid: requester cannot bid on their own order")]
    SelfBid,

    /// A trader was already selected for this order
    #[error("Trader already selected for order {0}")]
    AlreadySelected(String),

    /// The agreement already executed; no further choice mutation or
    /// ledger action is possible
    #[error("Agreement already executed for order {0}")]
    AlreadyExecuted(String),

    /// The order is in a terminal state (Completed or Failed)
    #[error("Order {order_id} is terminal ({state})")]
    TerminalState { order_id: String, state: String },

    /// Custody balance is lower than the requested release amount
    #[error("Insufficient custody: balance {available} < required {required}")]
    InsufficientCustody {
        required: Decimal,
        available: Decimal,
    },

    /// Deposit observed but the custody balance is still below the
    /// order's stated amount
    #[error("Insufficient deposit: {observed} of {expected} funded")]
    InsufficientDeposit { expected: Decimal, observed: Decimal },

    /// Amounts must be strictly positive
    #[error("Negative or zero amount: {0}")]
    NegativeAmount(Decimal),

    /// A party declared Choice::None, which is not a valid declaration
    #[error("Invalid choice: a declared choice must name a beneficiary")]
    InvalidChoice,

    /// Conservation invariant broken in the custody ledger. Mutation on
    /// the affected order is halted.
    #[error("Custody conservation violated: {reason}")]
    ConservationViolation { reason: String },

    /// Request validation errors (limits, empty fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Create an invalid-state error
    pub fn invalid_state<S: Into<String>>(state: S, operation: S) -> Self {
        Self::InvalidState {
            state: state.into(),
            operation: operation.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a duplicate-bid error
    pub fn duplicate_bid<S: Into<String>>(order_id: S, bidder: S) -> Self {
        Self::DuplicateBid {
            order_id: order_id.into(),
            bidder: bidder.into(),
        }
    }

    /// Create a terminal-state error
    pub fn terminal_state<S: Into<String>>(order_id: S, state: S) -> Self {
        Self::TerminalState {
            order_id: order_id.into(),
            state: state.into(),
        }
    }

    /// Create a conservation-violation error
    pub fn conservation<S: Into<String>>(reason: S) -> Self {
        Self::ConservationViolation {
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
