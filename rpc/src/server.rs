//! Axum-based HTTP server.

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use tally_aggregate::{PollAggregator, PopularPolls};
use tally_ledger::VoteLedger;
use tally_store::ObjectStore;

use crate::error::RpcError;
use crate::handlers;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<VoteLedger>,
    pub aggregator: Arc<PollAggregator>,
    pub popular: Arc<PopularPolls>,
    pub store: Arc<dyn ObjectStore>,
}

impl AppState {
    /// Wire the standard pipeline over one store.
    pub fn new(
        ledger: VoteLedger,
        aggregator: PollAggregator,
        popular: PopularPolls,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            ledger: Arc::new(ledger),
            aggregator: Arc::new(aggregator),
            popular: Arc::new(popular),
            store,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/vote", get(handlers::submit_vote))
        .route("/poll", get(handlers::poll_results))
        .route("/popular", get(handlers::popular_polls))
        .route("/recent", get(handlers::recent_votes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The HTTP server: binds a port and serves the router.
pub struct RpcServer {
    port: u16,
}

impl RpcServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Start serving. Runs until the process shuts down.
    pub async fn start(&self, state: AppState) -> Result<(), RpcError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Server(e.to_string()))?;
        info!(%addr, "rpc server listening");
        axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| RpcError::Server(e.to_string()))
    }
}
