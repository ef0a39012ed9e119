//! P2P USDT escrow backend
//!
//! Two independent parties - a requester and a trader - agree, without
//! a trusted third party, on the disposition of a custodied amount:
//! release to the trader or refund to the requester. The crate
//! implements:
//! - the order lifecycle state machine (open request, bidding, trader
//!   selection, custody, settlement)
//! - the bid board for competing offers
//! - the two-party agreement engine that releases custody exactly once
//!   the instant both declared choices match
//! - a conservation-checked custody ledger

pub mod agreement;
pub mod bid_board;
pub mod error;
pub mod ledger;
pub mod models;
pub mod node;
pub mod notifier;
pub mod order_manager;

use error::EscrowError;

/// Result type alias for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
