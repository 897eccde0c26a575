//! Cross-component flows: open, liquidate, persist.

use cfd_broker::{QuoteBus, TradeStream};
use cfd_core::{CloseReason, LiveQuote, PositionStatus, Scaled, Side};
use cfd_engine::LiquidationEngine;
use cfd_feed::Ingestor;
use cfd_orders::{OpenRequest, OrderManager};
use cfd_persister::{BatchPersister, PersisterConfig};
use cfd_store::{Ledger, TradeStore};
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

const SCALE: i64 = 100_000_000;

fn quote(bid: i64, ask: i64) -> LiveQuote {
    LiveQuote {
        symbol: "BTCUSDT".to_string(),
        original_price: Scaled((bid + ask) / 2 * SCALE),
        bid_price: Scaled(bid * SCALE),
        ask_price: Scaled(ask * SCALE),
        timestamp_ms: 1,
    }
}

struct Sim {
    quotes: Arc<QuoteBus>,
    ledger: Arc<Ledger>,
    orders: Arc<OrderManager>,
    engine: LiquidationEngine,
    user: Uuid,
}

fn sim(balance: i64) -> Sim {
    let quotes = Arc::new(QuoteBus::new(16));
    let ledger = Arc::new(Ledger::new());
    let orders = Arc::new(OrderManager::new(ledger.clone(), quotes.clone()));
    let engine = LiquidationEngine::new(ledger.clone(), orders.clone());
    let user = Uuid::new_v4();
    ledger.create_account(user, Scaled(balance * SCALE));
    Sim {
        quotes,
        ledger,
        orders,
        engine,
        user,
    }
}

#[test]
fn test_margin_call_flow_end_to_end() {
    let sim = sim(10_000);

    // Entry at ask 30000, 10x, qty 1: margin 3000
    sim.quotes.publish(quote(29_940, 30_000));
    let receipt = sim
        .orders
        .open(OpenRequest {
            user_id: sim.user,
            side: Side::Long,
            asset: "BTCUSDT".to_string(),
            leverage: 10,
            qty: dec!(1),
            stop_loss: None,
            take_profit: None,
        })
        .unwrap();
    assert_eq!(receipt.position.margin, Scaled(3_000 * SCALE));
    assert_eq!(receipt.balance, Scaled(7_000 * SCALE));

    // -9% move: loss 2700 = exactly 90% of margin
    let crash = quote(27_300, 27_360);
    sim.quotes.publish(crash.clone());
    sim.engine.evaluate_tick(&crash);

    let closed = sim.ledger.get_position(receipt.position.id).unwrap();
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.final_pnl, Some(Scaled(-2_700 * SCALE)));
    // Margin released minus the loss: 7000 + 300
    assert_eq!(
        sim.ledger.balance(sim.user).unwrap(),
        Scaled(7_300 * SCALE)
    );
}

#[test]
fn test_manual_close_beats_engine_tick() {
    let sim = sim(10_000);
    sim.quotes.publish(quote(29_940, 30_000));
    let receipt = sim
        .orders
        .open(OpenRequest {
            user_id: sim.user,
            side: Side::Long,
            asset: "BTCUSDT".to_string(),
            leverage: 10,
            qty: dec!(1),
            stop_loss: Some(dec!(100)),
            take_profit: None,
        })
        .unwrap();

    let drop = quote(29_800, 29_860);
    sim.quotes.publish(drop.clone());
    sim.orders
        .close(receipt.position.id, CloseReason::Manual)
        .unwrap();
    let balance_after_manual = sim.ledger.balance(sim.user).unwrap();

    // The engine sees the same tick; the position is already gone and the
    // balance must not move again
    sim.engine.evaluate_tick(&drop);
    assert_eq!(sim.ledger.balance(sim.user).unwrap(), balance_after_manual);
}

#[tokio::test]
async fn test_feed_frame_reaches_store_and_quote_bus() {
    let quotes = Arc::new(QuoteBus::new(16));
    let stream = Arc::new(TradeStream::new("trades"));
    let trades = Arc::new(TradeStore::new());
    let ingestor = Ingestor::new(quotes.clone(), stream.clone());

    let mut persister = BatchPersister::new(
        stream.clone(),
        trades.clone(),
        PersisterConfig {
            batch_size: 1,
            block_ms: 10,
            ..Default::default()
        },
    );
    persister.init().unwrap();

    ingestor.handle_frame(
        r#"{"e":"trade","s":"BTCUSDT","p":"30000","q":"0.5","T":1700000000000,"t":42}"#,
    );

    // Quote path: spread-adjusted prices on the bus
    let live = quotes.latest("BTCUSDT").unwrap();
    assert_eq!(live.bid_price, Scaled(29_970 * SCALE));
    assert_eq!(live.ask_price, Scaled(30_030 * SCALE));

    // Durable path: entry read, persisted and acknowledged
    persister.poll_once().await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(stream.pending_count("trade-uploaders").unwrap(), 0);

    // Replaying the same frame dedupes on (symbol, timestamp, seq)
    ingestor.handle_frame(
        r#"{"e":"trade","s":"BTCUSDT","p":"30000","q":"0.5","T":1700000000000,"t":42}"#,
    );
    persister.poll_once().await.unwrap();
    assert_eq!(trades.len(), 1);
}
