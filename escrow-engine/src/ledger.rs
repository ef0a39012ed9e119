//! Custody Ledger - Conservation-checked balance custody per order
//!
//! Holds the fungible balance under custody for each order and exposes
//! the deposit/release/refund primitives. The ledger never materializes
//! or destroys value: the sum of all custody balances always equals
//! total deposits minus total releases. A violation of that invariant
//! halts further mutation on the affected order and surfaces loudly.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::EscrowError;
use crate::models::{Beneficiary, CustodyRecord};
use crate::EscrowResult;

struct LedgerInner {
    /// Custody record per order id
    records: HashMap<Uuid, CustodyRecord>,
    /// Cumulative released funds per recipient party
    payouts: HashMap<String, Decimal>,
    /// Total deposits since genesis
    total_deposited: Decimal,
    /// Total releases since genesis
    total_released: Decimal,
    /// Orders frozen after a conservation alarm
    halted: HashSet<Uuid>,
}

/// Conservation-checked custody store
pub struct CustodyLedger {
    inner: RwLock<LedgerInner>,
}

impl CustodyLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                records: HashMap::new(),
                payouts: HashMap::new(),
                total_deposited: Decimal::ZERO,
                total_released: Decimal::ZERO,
                halted: HashSet::new(),
            }),
        }
    }

    /// Credit a deposit to an order's custody record. Additive: repeated
    /// deposits accumulate until the order's stated amount is reached.
    pub async fn deposit(&self, order_id: Uuid, amount: Decimal) -> EscrowResult<CustodyRecord> {
        if amount <= Decimal::ZERO {
            return Err(EscrowError::NegativeAmount(amount));
        }

        let mut inner = self.inner.write().await;
        if inner.halted.contains(&order_id) {
            return Err(EscrowError::conservation(format!(
                "order {order_id} is halted"
            )));
        }

        let record = inner
            .records
            .entry(order_id)
            .or_insert_with(|| CustodyRecord::new(order_id));
        record.balance += amount;
        record.total_deposited += amount;
        record.updated_at = chrono::Utc::now();
        let snapshot = record.clone();
        inner.total_deposited += amount;

        info!(
            order_id = %order_id,
            amount = %amount,
            balance = %snapshot.balance,
            "custody deposit credited"
        );

        Ok(snapshot)
    }

    /// Release custodied funds to a recipient, zeroing the record. This
    /// is the single mutating primitive callable by the agreement
    /// engine. A balance lower than the requested amount would break
    /// conservation and halts the order.
    pub async fn release(
        &self,
        order_id: Uuid,
        recipient: &str,
        role: Beneficiary,
        amount: Decimal,
    ) -> EscrowResult<()> {
        let mut inner = self.inner.write().await;
        if inner.halted.contains(&order_id) {
            return Err(EscrowError::conservation(format!(
                "order {order_id} is halted"
            )));
        }

        let balance = match inner.records.get(&order_id) {
            Some(record) => record.balance,
            None => {
                return Err(EscrowError::not_found(format!(
                    "custody record for order {order_id}"
                )))
            }
        };

        if balance < amount {
            // Balance would go negative: consistency corruption, not a
            // recoverable caller error. Freeze the order.
            inner.halted.insert(order_id);
            error!(
                order_id = %order_id,
                balance = %balance,
                amount = %amount,
                "custody balance below release amount; halting order"
            );
            return Err(EscrowError::InsufficientCustody {
                required: amount,
                available: balance,
            });
        }

        let record = inner
            .records
            .get_mut(&order_id)
            .ok_or_else(|| EscrowError::not_found(format!("custody record for order {order_id}")))?;
        record.balance = Decimal::ZERO;
        record.total_released += amount;
        record.updated_at = chrono::Utc::now();

        inner.total_released += amount;
        *inner
            .payouts
            .entry(recipient.to_string())
            .or_insert(Decimal::ZERO) += amount;

        info!(
            order_id = %order_id,
            recipient = %recipient,
            role = %role,
            amount = %amount,
            "custody released"
        );

        Self::check_conservation(&mut inner)
    }

    /// Refund custodied funds to the requester. Same primitive as
    /// `release` with the requester as recipient.
    pub async fn refund(
        &self,
        order_id: Uuid,
        requester: &str,
        amount: Decimal,
    ) -> EscrowResult<()> {
        self.release(order_id, requester, Beneficiary::Requester, amount)
            .await
    }

    /// Current custody balance for an order (zero if no record exists)
    pub async fn balance(&self, order_id: Uuid) -> Decimal {
        self.inner
            .read()
            .await
            .records
            .get(&order_id)
            .map(|r| r.balance)
            .unwrap_or(Decimal::ZERO)
    }

    /// Custody record for an order
    pub async fn record(&self, order_id: Uuid) -> Option<CustodyRecord> {
        self.inner.read().await.records.get(&order_id).cloned()
    }

    /// Cumulative funds released to a party
    pub async fn payout(&self, party: &str) -> Decimal {
        self.inner
            .read()
            .await
            .payouts
            .get(party)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Whether an order is frozen after a conservation alarm
    pub async fn is_halted(&self, order_id: Uuid) -> bool {
        self.inner.read().await.halted.contains(&order_id)
    }

    /// Total custody currently under management
    pub async fn total_in_custody(&self) -> Decimal {
        self.inner
            .read()
            .await
            .records
            .values()
            .map(|r| r.balance)
            .sum()
    }

    /// Verify the conservation invariant across all records:
    /// sum of balances == total deposits - total releases
    pub async fn verify_conservation(&self) -> EscrowResult<()> {
        let mut inner = self.inner.write().await;
        Self::check_conservation(&mut inner)
    }

    fn check_conservation(inner: &mut LedgerInner) -> EscrowResult<()> {
        let held: Decimal = inner.records.values().map(|r| r.balance).sum();
        let expected = inner.total_deposited - inner.total_released;
        if held != expected {
            error!(
                held = %held,
                expected = %expected,
                "custody conservation invariant broken"
            );
            return Err(EscrowError::conservation(format!(
                "held {held} != deposits - releases {expected}"
            )));
        }
        Ok(())
    }
}

impl Default for CustodyLedger {
    fn default() -> Self {
        Self::new()
    }
}
