//! Agreement Engine - Two-party commit over a funded order
//!
//! Each side of an order declares (and may revise) an intended
//! disposition of the custodied funds. The instant both declared
//! choices match, the engine releases custody exactly once. Matching,
//! the ledger release, and the `executed` marker all happen inside one
//! write-lock critical section, so concurrent or repeated declarations
//! can never double-release or strand funds.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::ledger::CustodyLedger;
use crate::models::{AgreementState, Choice, ExecutionOutcome, Order};
use crate::EscrowResult;

/// Two-party commit engine driving the custody decision
pub struct AgreementEngine {
    /// Agreement state per order id
    agreements: RwLock<HashMap<Uuid, AgreementState>>,
    /// Custody ledger; `release` is the only mutation the engine performs
    ledger: Arc<CustodyLedger>,
}

impl AgreementEngine {
    /// Create an engine backed by the given custody ledger
    pub fn new(ledger: Arc<CustodyLedger>) -> Self {
        Self {
            agreements: RwLock::new(HashMap::new()),
            ledger,
        }
    }

    /// Attach an agreement to a freshly funded order. Idempotent: an
    /// existing agreement is left untouched.
    pub async fn activate(&self, order: &Order) -> EscrowResult<AgreementState> {
        if order.trader.is_none() {
            return Err(EscrowError::internal(format!(
                "order {} funded without a selected trader",
                order.id
            )));
        }

        let mut agreements = self.agreements.write().await;
        let agreement = agreements
            .entry(order.id)
            .or_insert_with(|| AgreementState::new(order.id));
        Ok(agreement.clone())
    }

    /// Record a party's declared choice and evaluate matching.
    ///
    /// The order must be in a custody-active state with the full stated
    /// amount held; declarations over partial custody are refused before
    /// anything is recorded. Revision is allowed: calling again for the
    /// same party before execution overwrites the prior choice and
    /// re-evaluates. After both parties are signed with equal choices,
    /// custody is released to the shared beneficiary as part of the
    /// same call. Any call after execution fails with `AlreadyExecuted`
    /// and performs no ledger action.
    pub async fn declare_choice(
        &self,
        order: &Order,
        party: &str,
        choice: Choice,
    ) -> EscrowResult<ExecutionOutcome> {
        if choice == Choice::None {
            return Err(EscrowError::InvalidChoice);
        }
        if !order.state.custody_active() {
            return Err(EscrowError::invalid_state(
                order.state.to_string(),
                "declare choice".to_string(),
            ));
        }

        let role = order
            .role_of(party)
            .ok_or_else(|| EscrowError::unauthorized(format!("{party} is not a party to order {}", order.id)))?;

        // The write lock spans record -> match -> release -> mark, so
        // two concurrent declarations serialize here and only one can
        // observe an unexecuted match.
        let mut agreements = self.agreements.write().await;
        let agreement = agreements.get_mut(&order.id).ok_or_else(|| {
            EscrowError::not_found(format!("agreement for order {}", order.id))
        })?;

        if agreement.executed {
            return Err(EscrowError::AlreadyExecuted(order.id.to_string()));
        }

        // The engine only binds choices while the full stated amount
        // is under custody; a release over partial custody would halt
        // the ledger.
        let held = self.ledger.balance(order.id).await;
        if held != order.amount {
            return Err(EscrowError::InsufficientCustody {
                required: order.amount,
                available: held,
            });
        }

        agreement.record(role, choice);
        info!(
            order_id = %order.id,
            party = %party,
            role = %role,
            choice = ?choice,
            "choice declared"
        );

        let Some(beneficiary) = agreement.matched() else {
            return Ok(ExecutionOutcome::Pending);
        };

        let recipient = order
            .party_for(beneficiary)
            .ok_or_else(|| EscrowError::internal("matched beneficiary has no party id"))?
            .to_string();

        self.ledger
            .release(order.id, &recipient, beneficiary, order.amount)
            .await?;

        // Marked only after the funds moved. The write lock is still
        // held, so no replay can slip in between; a release failure
        // leaves the agreement unexecuted and retryable.
        agreement.executed = true;
        agreement.executed_recipient = Some(beneficiary);
        agreement.executed_amount = Some(order.amount);
        agreement.executed_at = Some(Utc::now());
        agreement.updated_at = Utc::now();

        info!(
            order_id = %order.id,
            beneficiary = %beneficiary,
            recipient = %recipient,
            amount = %order.amount,
            "agreement executed, custody released"
        );

        Ok(ExecutionOutcome::Executed {
            beneficiary,
            recipient,
            amount: order.amount,
        })
    }

    /// Agreement state for an order, if one exists
    pub async fn state(&self, order_id: Uuid) -> Option<AgreementState> {
        self.agreements.read().await.get(&order_id).cloned()
    }

    /// Whether the order's agreement already executed
    pub async fn is_executed(&self, order_id: Uuid) -> bool {
        self.agreements
            .read()
            .await
            .get(&order_id)
            .map(|a| a.executed)
            .unwrap_or(false)
    }
}
