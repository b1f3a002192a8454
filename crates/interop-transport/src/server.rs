//! HTTP transport server using Axum.
//!
//! Handles verb routing, the shared-secret gate, body limits, and the
//! request/response cycle of one RPC invocation per `POST /`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::post,
};
use interop_protocol::{
    AuthConfig, BridgeError, Invocation, InvocationResult, RpcFailure, RpcRequest, RpcSuccess,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::assets::{self, AssetConfig};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3333;

/// Default cap on an RPC request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Trait implemented by the dispatcher to handle incoming invocations.
/// The transport calls this for every authorized, well-formed request.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle_invocation(
        &self,
        invocation: Invocation,
    ) -> impl std::future::Future<Output = InvocationResult> + Send;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Shared secret required on every RPC request
    pub auth: Option<AuthConfig>,
    /// Enable permissive CORS
    pub enable_cors: bool,
    /// Largest accepted RPC body
    pub max_body_bytes: usize,
    /// Static content
    pub assets: AssetConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            hostname: "127.0.0.1".into(),
            auth: None,
            enable_cors: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            assets: AssetConfig::default(),
        }
    }
}

/// Shared state for the transport server.
struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    config: TransportConfig,
}

/// Build the HTTP router for `handler`.
pub fn router<H: RequestHandler>(config: TransportConfig, handler: Arc<H>) -> Router {
    let enable_cors = config.enable_cors;
    let state = Arc::new(AppState { handler, config });

    let app = Router::new()
        .route(
            "/",
            post(rpc_handler::<H>)
                .get(asset_handler::<H>)
                .fallback(method_not_allowed),
        )
        .fallback(fallback_handler::<H>)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            info_span!(
                "request",
                id = %uuid::Uuid::new_v4(),
                method = %request.method(),
                path = %request.uri().path(),
            )
        }));

    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// The transport server; serves until stopped.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given request handler.
    pub async fn start<H: RequestHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, TransportError> {
        Self::start_shared(config, Arc::new(handler)).await
    }

    /// Start the transport server with a handler shared with other owners.
    pub async fn start_shared<H: RequestHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        // Parse and bind address
        let address = format!("{}:{}", config.hostname, config.port);
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| TransportError::InvalidAddress(address))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let actual_port = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?
            .port();

        info!("Interop transport listening on http://{}:{}/", config.hostname, actual_port);

        // Spawn server task
        let app = router(config, handler);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server, letting in-flight requests finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Interop transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn rpc_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    request: Request,
) -> Response {
    // Auth is checked before the body is read
    if let Some(auth) = &state.config.auth {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if !auth.authorize(presented) {
            warn!("Rejected unauthorized RPC request");
            return failure(&BridgeError::Unauthorized);
        }
    }

    let invocation = match read_invocation(request.into_body(), state.config.max_body_bytes).await {
        Ok(invocation) => invocation,
        Err(e) => {
            warn!("{e}");
            return failure(&e);
        }
    };

    // Dispatch
    let target = invocation.target();
    let result = state
        .handler
        .handle_invocation(invocation)
        .instrument(info_span!("invoke", %target))
        .await;

    match result {
        Ok(value) => (StatusCode::OK, Json(RpcSuccess::new(value))).into_response(),
        Err(e) => failure(&e),
    }
}

async fn read_invocation(body: Body, limit: usize) -> Result<Invocation, BridgeError> {
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| BridgeError::malformed(format!("Failed to read request body: {e}")))?;
    debug!("RPC body: {} bytes", bytes.len());
    RpcRequest::from_slice(&bytes)?.into_invocation()
}

async fn asset_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    request: Request,
) -> Response {
    assets::serve(&state.config.assets, request.uri().path()).await
}

async fn fallback_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    request: Request,
) -> Response {
    if request.method() == Method::GET || request.method() == Method::HEAD {
        assets::serve(&state.config.assets, request.uri().path()).await
    } else {
        method_not_allowed().await
    }
}

async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response()
}

fn failure(error: &BridgeError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(RpcFailure::from(error))).into_response()
}
