//! Main application orchestration.
//!
//! Wires the components together and runs each as an independent task:
//! - feed connection (upstream WebSocket, reconnecting)
//! - ingestor (spread injection, quote publish, stream append)
//! - batch persister (durable stream consumer)
//! - liquidation engine (quote-driven forced closes)
//! - realtime server (listener fan-out)
//!
//! All tasks share one `CancellationToken`; Ctrl-C cancels it and the
//! application waits for every task to drain before exiting.

use crate::config::AppConfig;
use crate::error::AppResult;
use cfd_broker::{QuoteBus, TradeStream};
use cfd_core::Scaled;
use cfd_engine::LiquidationEngine;
use cfd_feed::{FeedConnection, Ingestor};
use cfd_orders::OrderManager;
use cfd_persister::BatchPersister;
use cfd_realtime::run_server;
use cfd_store::{Ledger, TradeStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main application.
pub struct Application {
    config: AppConfig,
    quotes: Arc<QuoteBus>,
    stream: Arc<TradeStream>,
    ledger: Arc<Ledger>,
    trades: Arc<TradeStore>,
    orders: Arc<OrderManager>,
}

impl Application {
    /// Build the component graph and provision configured accounts.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let quotes = Arc::new(QuoteBus::new(config.realtime.broadcast_capacity));
        let stream = Arc::new(TradeStream::new(config.stream.name.clone()));
        let ledger = Arc::new(Ledger::new());
        let trades = if config.persistence.data_dir.is_empty() {
            Arc::new(TradeStore::new())
        } else {
            Arc::new(TradeStore::with_log(&config.persistence.data_dir))
        };
        let orders = Arc::new(OrderManager::new(ledger.clone(), quotes.clone()));

        let starting_balance = Scaled::try_from_decimal(config.accounts.starting_balance)?;
        for user_id in &config.accounts.user_ids {
            ledger.create_account(*user_id, starting_balance);
            info!(%user_id, balance = %starting_balance, "Account provisioned");
        }

        Ok(Self {
            config,
            quotes,
            stream,
            ledger,
            trades,
            orders,
        })
    }

    /// Order manager for the external request layer.
    pub fn orders(&self) -> Arc<OrderManager> {
        self.orders.clone()
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    /// Run all components until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let (message_tx, message_rx) = mpsc::channel::<String>(1000);

        let feed = FeedConnection::new((&self.config.feed).into(), message_tx, shutdown.clone());
        let feed_handle = tokio::spawn(async move {
            if let Err(e) = feed.run().await {
                error!(?e, "Feed connection failed");
            }
        });

        let ingestor = Ingestor::new(self.quotes.clone(), self.stream.clone());
        let ingestor_shutdown = shutdown.clone();
        let ingestor_handle = tokio::spawn(async move {
            ingestor.run(message_rx, ingestor_shutdown).await;
        });

        let persister = BatchPersister::new(
            self.stream.clone(),
            self.trades.clone(),
            (&self.config.stream).into(),
        );
        let persister_handle = tokio::spawn(persister.run(shutdown.clone()));

        let engine = LiquidationEngine::new(self.ledger.clone(), self.orders.clone());
        let engine_quotes = self.quotes.clone();
        let engine_shutdown = shutdown.clone();
        let engine_handle = tokio::spawn(async move {
            engine.run(engine_quotes, engine_shutdown).await;
        });

        let realtime_handle = tokio::spawn(run_server(
            self.quotes.clone(),
            self.config.realtime_config(),
            shutdown.clone(),
        ));

        info!(
            symbols = ?self.config.feed.symbols,
            realtime_port = self.config.realtime.port,
            "All components started"
        );

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        shutdown.cancel();

        let _ = feed_handle.await;
        let _ = ingestor_handle.await;
        match persister_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(?e, "Persister exited with error"),
            Err(e) => error!(?e, "Persister task panicked"),
        }
        let _ = engine_handle.await;
        match realtime_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(?e, "Realtime server exited with error"),
            Err(e) => error!(?e, "Realtime server task panicked"),
        }

        info!("Shutdown complete");
        Ok(())
    }
}
