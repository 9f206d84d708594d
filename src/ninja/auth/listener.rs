//! One-shot local endpoint receiving the authorization redirect.

use std::{future::IntoFuture, net::SocketAddr, sync::Arc};

use axum::{
    extract::{RawQuery, State},
    http::header,
    response::IntoResponse,
    routing::any,
    Router,
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};
use tracing::{debug, info};

/// Path the authorization server redirects the browser to.
pub const CALLBACK_PATH: &str = "/oauth";

const CONFIRMATION_BODY: &str = "You can safely close this window.";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("redirect listener failed: {0}")]
    Serve(#[source] std::io::Error),
    #[error("redirect listener stopped before receiving a callback")]
    Closed,
}

/// Query parameters of the redirect, as echoed back by the authorization server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationResult {
    pub code: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl AuthorizationResult {
    /// Lenient parse of a raw query string. Unknown keys are ignored and the first
    /// value wins when a key repeats.
    pub fn from_query(query: &str) -> Self {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
        let mut result = Self::default();
        for (key, value) in pairs {
            let field = match key.as_str() {
                "code" => &mut result.code,
                "scope" => &mut result.scope,
                "state" => &mut result.state,
                "error" => &mut result.error,
                "error_description" => &mut result.error_description,
                _ => continue,
            };
            field.get_or_insert(value);
        }
        result
    }
}

type ResultSlot = Arc<Mutex<Option<oneshot::Sender<AuthorizationResult>>>>;

/// A bound socket waiting for exactly one redirect.
///
/// The socket lives as long as this value or the future returned by
/// [`RedirectListener::wait_for_callback`], whichever holds it. Dropping either
/// releases the port.
#[derive(Debug)]
pub struct RedirectListener {
    listener: TcpListener,
    host: String,
    local_addr: SocketAddr,
}

impl RedirectListener {
    /// Bind `host:port`. Port 0 picks a free port.
    pub async fn bind(host: &str, port: u16) -> Result<Self, Error> {
        let bind_error = |source| Error::Bind {
            addr: format!("{host}:{port}"),
            source,
        };
        let listener = TcpListener::bind((host, port)).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        debug!(message = "Redirect listener bound", %local_addr);

        Ok(Self {
            listener,
            host: host.to_owned(),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URI to register as `redirect_uri`, using the configured host name and the bound port.
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.host,
            self.local_addr.port(),
            CALLBACK_PATH
        )
    }

    /// Serve until the first request to [`CALLBACK_PATH`] arrives, then stop listening.
    ///
    /// Resolves with that request's query parameters. Waits forever if nobody calls back.
    pub async fn wait_for_callback(self) -> Result<AuthorizationResult, Error> {
        let (result_tx, result_rx) = oneshot::channel();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(result_tx)));

        let app = Router::new()
            .route(CALLBACK_PATH, any(handle_callback))
            .with_state(slot);

        info!(message = "Waiting for authorization redirect", local_addr = %self.local_addr);

        let server = axum::serve(self.listener, app).into_future();

        // Returning drops `server` and with it the listening socket. Connections
        // already accepted finish on their own tasks.
        tokio::select! {
            result = result_rx => result.map_err(|_| Error::Closed),
            served = server => {
                served.map_err(Error::Serve)?;
                Err(Error::Closed)
            }
        }
    }
}

async fn handle_callback(
    State(slot): State<ResultSlot>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    if let Some(result_tx) = slot.lock().await.take() {
        let result = AuthorizationResult::from_query(query.as_deref().unwrap_or_default());
        debug!(
            message = "Received authorization redirect",
            has_code = result.code.is_some(),
            has_error = result.error.is_some(),
        );
        let _ = result_tx.send(result);
    }
    ([(header::CONNECTION, "close")], CONFIRMATION_BODY)
}
