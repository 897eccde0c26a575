//! Leveraged position model.

use crate::fixed::Scaled;
use crate::types::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status. A position is mutated exactly once: `Open -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A leveraged CFD position.
///
/// Created at open with the margin already reserved from the balance, and
/// retained as an audit record after close (never deleted). `stop_loss` /
/// `take_profit` of zero mean "unset".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub user_id: Uuid,
    pub side: Side,
    pub asset: String,
    pub leverage: u32,
    pub entry_price: Scaled,
    pub qty: Scaled,
    pub margin: Scaled,
    pub stop_loss: Scaled,
    pub take_profit: Scaled,
    pub status: PositionStatus,
    pub final_pnl: Option<Scaled>,
    pub created_at: DateTime<Utc>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        side: Side,
        asset: String,
        leverage: u32,
        entry_price: Scaled,
        qty: Scaled,
        margin: Scaled,
        stop_loss: Scaled,
        take_profit: Scaled,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            side,
            asset,
            leverage,
            entry_price,
            qty,
            margin,
            stop_loss,
            take_profit,
            status: PositionStatus::Open,
            final_pnl: None,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn has_stop_loss(&self) -> bool {
        !self.stop_loss.is_zero()
    }

    pub fn has_take_profit(&self) -> bool {
        !self.take_profit.is_zero()
    }
}
