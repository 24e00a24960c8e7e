//! Server setup and lifecycle management

use std::future::Future;
use std::sync::Arc;

use ode_feed::LiveFeed;
use ode_ledger::Ledger;
use ode_runner::{AutonomousRunner, Producer, SimulatedObserver, WebObserver};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api::{create_router, AppState};
use crate::config::{DaemonConfig, ProducerKind};
use crate::error::{DaemonError, DaemonResult};

/// Build the producer selected in the configuration.
pub fn build_producer(config: &DaemonConfig) -> DaemonResult<Arc<dyn Producer>> {
    let settings = &config.producer;
    let producer: Arc<dyn Producer> = match settings.kind {
        ProducerKind::Simulated => Arc::new(SimulatedObserver::new(settings.query.clone())),
        ProducerKind::Web => {
            let url = settings.url.clone().ok_or_else(|| {
                DaemonError::Config("producer.url is required for the web producer".into())
            })?;
            Arc::new(WebObserver::new(
                url,
                settings.query.clone(),
                config.runner.producer_timeout(),
            )?)
        }
    };
    Ok(producer)
}

/// ODE daemon server
pub struct Server {
    config: DaemonConfig,
    ledger: Arc<Ledger>,
    feed: Arc<LiveFeed>,
    runner: Option<AutonomousRunner>,
}

impl Server {
    /// Open the ledger and wire up the feed and, if enabled, the runner.
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate()?;

        let ledger = Arc::new(Ledger::open(config.ledger.to_ledger_config())?);
        let feed = Arc::new(LiveFeed::new(ledger.clone(), config.feed.to_feed_config()));

        let runner = if config.server.run_runner {
            let producer = build_producer(&config)?;
            Some(AutonomousRunner::new(
                config.runner.clone(),
                ledger.clone(),
                producer,
            )?)
        } else {
            tracing::info!("Autonomous runner disabled");
            None
        };

        Ok(Self {
            config,
            ledger,
            feed,
            runner,
        })
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    /// Bind the configured address and serve until Ctrl+C or SIGTERM.
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("ODE daemon listening on {}", addr);

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `signal` resolves, then stop the runner and
    /// the feed and wait for both.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> DaemonResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);

        let runner_status = self.runner.as_ref().map(|runner| runner.status());
        let state = AppState::new(self.ledger.clone(), self.feed.clone(), runner_status);
        let app = create_router(state, self.config.server.enable_cors);

        let runner_task = self.runner.map(|mut runner| {
            let stop = shutdown_rx.clone();
            tokio::spawn(async move { runner.run(stop).await })
        });

        let feed = self.feed.clone();
        let stop = shutdown_rx.clone();
        let feed_task = tokio::spawn(async move { feed.run(stop).await });

        let trigger = shutdown_tx.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                trigger.send_replace(true);
            })
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("ODE daemon shutting down");
        shutdown_tx.send_replace(true);

        if let Some(task) = runner_task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Runner task failed");
            }
        }
        if let Err(e) = feed_task.await {
            tracing::error!(error = %e, "Feed task failed");
        }

        served
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
