//! Trigger evaluation and the quote-driven liquidation loop.
//!
//! Trigger priority is fixed: MARGIN_CALL, then STOP_LOSS, then
//! TAKE_PROFIT, first match wins. The loss-side checks require a strictly
//! negative PnL and take-profit a strictly positive one; thresholds
//! themselves are inclusive. The open-position snapshot is not
//! transactional with the close, so `AlreadyClosed` from a concurrent
//! manual close is an expected per-position outcome, not a loop failure.

use cfd_broker::QuoteBus;
use cfd_core::{long_pnl, short_pnl, CloseReason, LiveQuote, Position, Scaled, Side};
use cfd_orders::OrderManager;
use cfd_store::Ledger;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Liquidation level: 90% of the reserved margin.
fn margin_call_level(margin: Scaled) -> Scaled {
    Scaled((i128::from(margin.0) * 90 / 100) as i64)
}

/// Classify a position against a quote. Returns the close reason when a
/// threshold fires, `None` otherwise. Pure, no side effects.
pub fn evaluate(position: &Position, quote: &LiveQuote) -> Option<CloseReason> {
    // Mark at the exit side: LONG would sell into the bid, SHORT would
    // buy back at the ask
    let current_price = match position.side {
        Side::Long => quote.bid_price,
        Side::Short => quote.ask_price,
    };

    let pnl = match position.side {
        Side::Long => long_pnl(position.entry_price, current_price, position.qty),
        Side::Short => short_pnl(position.entry_price, current_price, position.qty),
    };

    if pnl < Scaled::ZERO {
        let loss = -pnl;
        if loss >= margin_call_level(position.margin) {
            return Some(CloseReason::MarginCall);
        }
        if position.has_stop_loss() && loss >= position.stop_loss {
            return Some(CloseReason::StopLoss);
        }
    } else if pnl > Scaled::ZERO && position.has_take_profit() && pnl >= position.take_profit {
        return Some(CloseReason::TakeProfit);
    }

    None
}

/// Quote-driven forced-close loop.
pub struct LiquidationEngine {
    ledger: Arc<Ledger>,
    orders: Arc<OrderManager>,
}

impl LiquidationEngine {
    pub fn new(ledger: Arc<Ledger>, orders: Arc<OrderManager>) -> Self {
        Self { ledger, orders }
    }

    /// Evaluate every open position on the quoted asset, closing those
    /// whose trigger fired. Each position is handled independently.
    pub fn evaluate_tick(&self, quote: &LiveQuote) {
        for position in self.ledger.open_positions_for(&quote.symbol) {
            let Some(reason) = evaluate(&position, quote) else {
                continue;
            };

            match self.orders.close_at(position.id, quote, reason) {
                Ok(receipt) => info!(
                    position_id = %position.id,
                    user_id = %position.user_id,
                    reason = %reason,
                    pnl = %receipt.pnl,
                    balance = %receipt.balance,
                    "Position liquidated"
                ),
                Err(e) => warn!(
                    position_id = %position.id,
                    reason = %reason,
                    ?e,
                    "Forced close failed"
                ),
            }
        }
    }

    /// Run until shutdown, evaluating each published quote.
    pub async fn run(&self, quotes: Arc<QuoteBus>, shutdown: CancellationToken) {
        let mut rx = quotes.subscribe();
        info!("Liquidation engine started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Liquidation engine shutting down");
                    return;
                }
                message = rx.recv() => match message {
                    Ok(message) => self.evaluate_tick(&message.quote),
                    Err(RecvError::Lagged(skipped)) => {
                        // Stale ticks are superseded anyway; the next quote
                        // re-evaluates from current state
                        warn!(skipped, "Engine lagged behind the quote bus");
                    }
                    Err(RecvError::Closed) => {
                        info!("Quote bus closed, liquidation engine stopping");
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfd_core::PositionStatus;
    use cfd_orders::{OpenRequest, OrderError};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    const SCALE: i64 = 100_000_000;

    fn position(side: Side, entry: i64, margin: i64, stop_loss: i64, take_profit: i64) -> Position {
        Position::new(
            Uuid::new_v4(),
            side,
            "BTCUSDT".to_string(),
            10,
            Scaled(entry * SCALE),
            Scaled(SCALE),
            Scaled(margin * SCALE),
            Scaled(stop_loss * SCALE),
            Scaled(take_profit * SCALE),
        )
    }

    fn quote(bid: i64, ask: i64) -> LiveQuote {
        LiveQuote {
            symbol: "BTCUSDT".to_string(),
            original_price: Scaled((bid + ask) / 2 * SCALE),
            bid_price: Scaled(bid * SCALE),
            ask_price: Scaled(ask * SCALE),
            timestamp_ms: 1,
        }
    }

    #[test]
    fn test_margin_call_boundary_is_inclusive() {
        // margin 3000, level 2700; entry 30000, qty 1
        let pos = position(Side::Long, 30_000, 3_000, 0, 0);

        // Loss of exactly 2700
        assert_eq!(
            evaluate(&pos, &quote(27_300, 27_350)),
            Some(CloseReason::MarginCall)
        );

        // One scaled unit short of the level
        let mut shy = quote(27_300, 27_350);
        shy.bid_price = Scaled(27_300 * SCALE + 1);
        assert_eq!(evaluate(&pos, &shy), None);
    }

    #[test]
    fn test_margin_call_beats_stop_loss() {
        // Both thresholds satisfied at a 2700 loss
        let pos = position(Side::Long, 30_000, 3_000, 500, 0);
        assert_eq!(
            evaluate(&pos, &quote(27_300, 27_350)),
            Some(CloseReason::MarginCall)
        );
    }

    #[test]
    fn test_stop_loss_requires_threshold_set() {
        let with_stop = position(Side::Long, 30_000, 3_000, 500, 0);
        let without = position(Side::Long, 30_000, 3_000, 0, 0);
        let q = quote(29_500, 29_550);

        assert_eq!(evaluate(&with_stop, &q), Some(CloseReason::StopLoss));
        assert_eq!(evaluate(&without, &q), None);
    }

    #[test]
    fn test_take_profit_fires_only_on_positive_pnl() {
        let pos = position(Side::Long, 30_000, 3_000, 0, 1_000);

        assert_eq!(
            evaluate(&pos, &quote(31_000, 31_050)),
            Some(CloseReason::TakeProfit)
        );
        // Flat and losing ticks never fire take-profit
        assert_eq!(evaluate(&pos, &quote(30_000, 30_050)), None);
        assert_eq!(evaluate(&pos, &quote(29_800, 29_850)), None);
    }

    #[test]
    fn test_short_marks_against_ask() {
        // SHORT entry 30000; ask rising to 30500 is a 500 loss
        let pos = position(Side::Short, 30_000, 3_000, 400, 0);
        assert_eq!(
            evaluate(&pos, &quote(30_450, 30_500)),
            Some(CloseReason::StopLoss)
        );
        // Falling ask is profit, no loss-side trigger
        assert_eq!(evaluate(&pos, &quote(29_000, 29_050)), None);
    }

    #[test]
    fn test_zero_pnl_triggers_nothing() {
        let pos = position(Side::Long, 30_000, 3_000, 500, 500);
        assert_eq!(evaluate(&pos, &quote(30_000, 30_050)), None);
    }

    struct Fixture {
        engine: LiquidationEngine,
        ledger: Arc<Ledger>,
        quotes: Arc<QuoteBus>,
        user: Uuid,
    }

    fn fixture(balance: i64) -> Fixture {
        let ledger = Arc::new(Ledger::new());
        let quotes = Arc::new(QuoteBus::new(16));
        let orders = Arc::new(OrderManager::new(ledger.clone(), quotes.clone()));
        let user = Uuid::new_v4();
        ledger.create_account(user, Scaled(balance * SCALE));
        Fixture {
            engine: LiquidationEngine::new(ledger.clone(), orders),
            ledger,
            quotes,
            user,
        }
    }

    fn open(fix: &Fixture, side: Side, stop_loss: Option<i64>) -> Position {
        let orders = OrderManager::new(fix.ledger.clone(), fix.quotes.clone());
        orders
            .open(OpenRequest {
                user_id: fix.user,
                side,
                asset: "BTCUSDT".to_string(),
                leverage: 10,
                qty: dec!(1),
                stop_loss: stop_loss.map(rust_decimal::Decimal::from),
                take_profit: None,
            })
            .unwrap()
            .position
    }

    #[test]
    fn test_tick_force_closes_and_credits_balance() {
        let fix = fixture(10_000);
        fix.quotes.publish(quote(30_000, 30_000));
        let pos = open(&fix, Side::Long, None);
        assert_eq!(pos.margin, Scaled(3_000 * SCALE));

        // -9% move: loss 2700 = 90% of margin
        fix.engine.evaluate_tick(&quote(27_300, 27_350));

        let closed = fix.ledger.get_position(pos.id).unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.final_pnl, Some(Scaled(-2_700 * SCALE)));
        // 7000 remaining + (3000 margin - 2700 loss)
        assert_eq!(fix.ledger.balance(fix.user).unwrap(), Scaled(7_300 * SCALE));
    }

    #[test]
    fn test_one_failed_close_does_not_stop_the_tick() {
        let fix = fixture(10_000);
        fix.quotes.publish(quote(30_000, 30_000));
        let first = open(&fix, Side::Long, Some(100));
        let second = open(&fix, Side::Long, Some(100));

        // Close the first out from under the engine
        let orders = OrderManager::new(fix.ledger.clone(), fix.quotes.clone());
        let err = fix.ledger.close_position(first.id, Scaled::ZERO);
        assert!(err.is_ok());
        assert!(matches!(
            orders.close_at(first.id, &quote(29_800, 29_850), CloseReason::Manual),
            Err(OrderError::AlreadyClosed(_))
        ));

        fix.engine.evaluate_tick(&quote(29_800, 29_850));
        let closed = fix.ledger.get_position(second.id).unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
    }

    #[test]
    fn test_tick_for_other_symbol_is_ignored() {
        let fix = fixture(10_000);
        fix.quotes.publish(quote(30_000, 30_000));
        let pos = open(&fix, Side::Long, Some(1));

        let mut other = quote(1, 2);
        other.symbol = "ETHUSDT".to_string();
        fix.engine.evaluate_tick(&other);

        assert!(fix.ledger.get_position(pos.id).unwrap().is_open());
    }
}
