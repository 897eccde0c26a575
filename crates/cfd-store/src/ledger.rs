//! Account balances and position records.
//!
//! Balance mutation is the sole shared mutable resource in the system, so
//! every open/close performs its read-modify-write while holding that
//! user's balance entry. There is no global lock; the atomicity unit is
//! the individual map entry.
//!
//! Lock discipline: `open_position` holds the balance entry while
//! inserting the position (the two effects commit together).
//! `close_position` flips the position status first, releases that entry,
//! then credits the balance; the conditional status flip already decided
//! the single winner, so no path ever holds a position entry while
//! waiting on a balance entry.

use crate::error::{StoreError, StoreResult};
use cfd_core::{has_sufficient_balance, Position, PositionStatus, Scaled};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// In-memory account and position store.
#[derive(Default)]
pub struct Ledger {
    accounts: DashMap<Uuid, Scaled>,
    positions: DashMap<Uuid, Position>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision an account with a starting balance. Existing balances are
    /// left untouched.
    pub fn create_account(&self, user_id: Uuid, starting_balance: Scaled) {
        self.accounts.entry(user_id).or_insert(starting_balance);
    }

    pub fn balance(&self, user_id: Uuid) -> Option<Scaled> {
        self.accounts.get(&user_id).map(|b| *b)
    }

    /// Commit a freshly created position and debit its margin, as one
    /// atomic unit scoped to the user's balance entry.
    ///
    /// Returns the updated balance. Fails with `InsufficientFunds` before
    /// any mutation when the margin cannot be reserved.
    pub fn open_position(&self, position: &Position) -> StoreResult<Scaled> {
        let mut balance = self
            .accounts
            .get_mut(&position.user_id)
            .ok_or(StoreError::UnknownAccount(position.user_id))?;

        if !has_sufficient_balance(*balance, position.margin) {
            return Err(StoreError::InsufficientFunds {
                required: position.margin,
                available: *balance,
            });
        }

        self.positions.insert(position.id, position.clone());
        *balance = *balance - position.margin;

        debug!(
            position_id = %position.id,
            user_id = %position.user_id,
            margin = %position.margin,
            balance = %*balance,
            "Position opened, margin reserved"
        );
        Ok(*balance)
    }

    /// Close a position and credit `margin + pnl` back to the balance.
    ///
    /// The close is conditioned on `status == Open` at mutation time:
    /// of two concurrent closers exactly one succeeds, the other gets
    /// `AlreadyClosed` and the balance is credited once.
    pub fn close_position(&self, position_id: Uuid, pnl: Scaled) -> StoreResult<(Position, Scaled)> {
        let (user_id, credit, closed) = {
            let mut entry = self
                .positions
                .get_mut(&position_id)
                .ok_or(StoreError::NotFound(position_id))?;

            if entry.status == PositionStatus::Closed {
                return Err(StoreError::AlreadyClosed(position_id));
            }

            entry.status = PositionStatus::Closed;
            entry.final_pnl = Some(pnl);
            (entry.user_id, entry.margin + pnl, entry.clone())
        };

        let mut balance = self
            .accounts
            .get_mut(&user_id)
            .ok_or(StoreError::UnknownAccount(user_id))?;
        *balance = *balance + credit;

        debug!(
            position_id = %position_id,
            pnl = %pnl,
            credit = %credit,
            balance = %*balance,
            "Position closed, margin returned"
        );
        Ok((closed, *balance))
    }

    pub fn get_position(&self, position_id: Uuid) -> Option<Position> {
        self.positions.get(&position_id).map(|p| p.clone())
    }

    /// Snapshot of all OPEN positions on an asset. Not transactional with
    /// later closes; callers must tolerate `AlreadyClosed`.
    pub fn open_positions_for(&self, asset: &str) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open && p.asset == asset)
            .map(|p| p.clone())
            .collect()
    }

    pub fn open_position_count(&self) -> usize {
        self.positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .count()
    }
}
