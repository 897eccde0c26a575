//! Position open/close transactions.
//!
//! Entry/exit pricing is intentionally asymmetric: LONG opens at ask and
//! exits at bid, SHORT opens at bid and exits at ask. That spread between
//! open and close is the house edge and must be preserved exactly.

use crate::error::{OrderError, OrderResult};
use cfd_broker::QuoteBus;
use cfd_core::{
    long_pnl, margin_for, position_amount, short_pnl, CloseReason, LiveQuote, Position, Scaled,
    Side,
};
use cfd_store::Ledger;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Open request as consumed from the external request layer.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub user_id: Uuid,
    pub side: Side,
    pub asset: String,
    pub leverage: u32,
    pub qty: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Result of a successful open: the created position and updated balance.
#[derive(Debug, Clone)]
pub struct OpenReceipt {
    pub position: Position,
    pub balance: Scaled,
}

/// Result of a successful close: the closed position, updated balance and
/// realized PnL.
#[derive(Debug, Clone)]
pub struct CloseReceipt {
    pub position: Position,
    pub balance: Scaled,
    pub pnl: Scaled,
}

/// Opens and closes positions against the ledger at live quoted prices.
pub struct OrderManager {
    ledger: Arc<Ledger>,
    quotes: Arc<QuoteBus>,
}

impl OrderManager {
    pub fn new(ledger: Arc<Ledger>, quotes: Arc<QuoteBus>) -> Self {
        Self { ledger, quotes }
    }

    /// Open a position: validate, price the entry, reserve margin.
    ///
    /// The position create and the margin debit commit together or not at
    /// all. All validation happens before any mutation.
    pub fn open(&self, req: OpenRequest) -> OrderResult<OpenReceipt> {
        if !(1..=100).contains(&req.leverage) {
            return Err(OrderError::InvalidLeverage(req.leverage));
        }

        let qty = Scaled::try_from_decimal(req.qty)?;
        if !qty.is_positive() {
            return Err(OrderError::InvalidQuantity(req.qty.to_string()));
        }

        let quote = self
            .quotes
            .latest(&req.asset)
            .ok_or_else(|| OrderError::PriceUnavailable(req.asset.clone()))?;

        // LONG buys at ask, SHORT sells at bid
        let entry_price = match req.side {
            Side::Long => quote.ask_price,
            Side::Short => quote.bid_price,
        };
        if !entry_price.is_positive() {
            return Err(OrderError::InvalidPrice(entry_price.to_string()));
        }

        let amount = position_amount(qty, entry_price);
        let margin = margin_for(amount, req.leverage)?;

        let stop_loss = req
            .stop_loss
            .map(Scaled::try_from_decimal)
            .transpose()?
            .unwrap_or(Scaled::ZERO);
        let take_profit = req
            .take_profit
            .map(Scaled::try_from_decimal)
            .transpose()?
            .unwrap_or(Scaled::ZERO);

        let position = Position::new(
            req.user_id,
            req.side,
            req.asset,
            req.leverage,
            entry_price,
            qty,
            margin,
            stop_loss,
            take_profit,
        );

        let balance = self.ledger.open_position(&position)?;

        info!(
            position_id = %position.id,
            user_id = %position.user_id,
            side = %position.side,
            asset = %position.asset,
            leverage = position.leverage,
            entry_price = %entry_price,
            margin = %margin,
            "Order opened"
        );
        Ok(OpenReceipt { position, balance })
    }

    /// Close a position at the latest quote (user-initiated path).
    pub fn close(&self, position_id: Uuid, reason: CloseReason) -> OrderResult<CloseReceipt> {
        let position = self
            .ledger
            .get_position(position_id)
            .ok_or(OrderError::NotFound(position_id))?;
        let quote = self
            .quotes
            .latest(&position.asset)
            .ok_or_else(|| OrderError::PriceUnavailable(position.asset.clone()))?;
        self.close_at(position_id, &quote, reason)
    }

    /// Close a position at a specific quote (the liquidation engine passes
    /// the tick that fired the trigger).
    ///
    /// First writer wins: a concurrent close makes this fail with
    /// `AlreadyClosed` and no balance effect.
    pub fn close_at(
        &self,
        position_id: Uuid,
        quote: &LiveQuote,
        reason: CloseReason,
    ) -> OrderResult<CloseReceipt> {
        let position = self
            .ledger
            .get_position(position_id)
            .ok_or(OrderError::NotFound(position_id))?;

        // LONG exits at bid (you sell), SHORT exits at ask (you buy back)
        let exit_price = match position.side {
            Side::Long => quote.bid_price,
            Side::Short => quote.ask_price,
        };

        let pnl = match position.side {
            Side::Long => long_pnl(position.entry_price, exit_price, position.qty),
            Side::Short => short_pnl(position.entry_price, exit_price, position.qty),
        };

        let (closed, balance) = self.ledger.close_position(position_id, pnl)?;

        info!(
            position_id = %position_id,
            reason = %reason,
            exit_price = %exit_price,
            pnl = %pnl,
            balance = %balance,
            "Order closed"
        );
        Ok(CloseReceipt {
            position: closed,
            balance,
            pnl,
        })
    }
}
