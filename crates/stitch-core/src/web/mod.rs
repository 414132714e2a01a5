//! HTTP ingestion endpoint.
//!
//! The server speaks plain HTTP; put a TLS terminator in front of it when
//! chunks cross untrusted networks.
//!
//! ## API Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | POST | /upload | Ingest one chunk |
//! | POST, PUT | /update | Append the body to an assembled file |
//! | POST, DELETE | /delete | Delete an assembled file |
//! | GET | /files/{name} | Download an assembled file |
//! | GET | /transfers/{id} | Transfer summary |
//! | POST | /transfers/{id}/assemble | Retry a failed assembly write |
//! | GET | /status | Server counters |

pub mod error;
pub mod handlers;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol;

/// Build the router.
///
/// Request bodies larger than `max_body_bytes` are refused with `413`.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(protocol::UPLOAD_PATH, post(handlers::upload))
        .route(
            protocol::UPDATE_PATH,
            post(handlers::update).put(handlers::update),
        )
        .route(
            protocol::DELETE_PATH,
            post(handlers::delete).delete(handlers::delete),
        )
        .route("/files/{name}", get(handlers::get_file))
        .route("/transfers/{id}", get(handlers::get_transfer))
        .route("/transfers/{id}/assemble", post(handlers::retry_assembly))
        .route(protocol::STATUS_PATH, get(handlers::get_status))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

/// The web server instance.
#[derive(Debug)]
pub struct WebServer {
    config: ServerConfig,
    state: AppState,
}

impl WebServer {
    /// Create a new web server with the given configuration.
    #[must_use]
    pub const fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the bind address for the server.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        if self.config.localhost_only {
            SocketAddr::from(([127, 0, 0, 1], self.config.port))
        } else {
            SocketAddr::from(([0, 0, 0, 0], self.config.port))
        }
    }

    /// Bind the listening socket.
    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.bind_addr()).await?)
    }

    /// Serve requests on `listener` until `shutdown` resolves.
    ///
    /// In-flight requests are allowed to finish.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let app = router(self.state, self.config.max_chunk_bytes);

        tracing::info!(%addr, "Listening for chunks");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Web server stopped");
        Ok(())
    }
}
