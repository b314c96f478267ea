// Axum pull handler: answers peers' fragment requests from the local store.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::BytesMut;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::Encoder;
use tracing::{debug, error, info};

use crate::config::PULL_ROUTE;
use crate::engine::stats::StatsCollector;
use crate::peer::codec::{PullItem, PullItemCodec, PullRequest};
use crate::store::traits::{FragmentStore, FragmentStoreExt};

/// Stateless per-request pull handler over a fragment store.
#[derive(Clone)]
pub struct PullService {
    store: Arc<dyn FragmentStore>,
    stats: Option<Arc<StatsCollector>>,
}

impl PullService {
    pub fn new(store: Arc<dyn FragmentStore>) -> Self {
        Self { store, stats: None }
    }

    /// Count bytes served into `stats`.
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Items for the requested keys the store holds, in request order. Keys
    /// without a value are skipped. A store error ends the stream after
    /// yielding the error.
    pub fn pull(&self, request: PullRequest) -> impl Stream<Item = Result<PullItem>> + Send + 'static {
        let store = Arc::clone(&self.store);
        stream::unfold(
            (request.fragment_keys.into_iter(), store, false),
            |(mut keys, store, failed)| async move {
                if failed {
                    return None;
                }
                while let Some(key) = keys.next() {
                    match store.get_fragment(key) {
                        Ok(Some(value)) => {
                            let item = PullItem {
                                fragment_key: key,
                                fragment_value: value,
                            };
                            return Some((Ok(item), (keys, store, false)));
                        }
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), (keys, store, true))),
                    }
                }
                None
            },
        )
    }

    pub fn router(self) -> Router {
        Router::new()
            .route(PULL_ROUTE, post(pull_handler))
            .with_state(Arc::new(self))
    }
}

/// POST /pull: stream framed `(key, value)` items back to the caller.
async fn pull_handler(
    State(service): State<Arc<PullService>>,
    Json(request): Json<PullRequest>,
) -> Response {
    debug!("pull request keys={:?}", request.fragment_keys);

    let stats = service.stats.clone();
    let mut codec = PullItemCodec::default();
    let body = service.pull(request).map(move |item| {
        let item = item.inspect_err(|e| error!("pull store read failed: {:#}", e))?;
        let mut buf = BytesMut::new();
        codec.encode(item, &mut buf)?;
        if let Some(stats) = &stats {
            stats.record_served(buf.len() as u64);
        }
        Ok::<_, anyhow::Error>(buf.freeze())
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(body),
    )
        .into_response()
}

/// Running pull endpoint. Dropping the handle (or calling `shutdown`) stops
/// accepting new calls.
pub struct PullServer {
    addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl PullServer {
    /// Bind `bind_addr` (use port 0 for an ephemeral port) and start serving.
    pub async fn start(bind_addr: &str, service: PullService) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = service.router();

        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!("pull server exited: {}", e);
            }
        });

        info!("pull service listening on {}", addr);
        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address to publish in member lists.
    pub fn peer_address(&self) -> String {
        self.addr.to_string()
    }

    /// Shutdown the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
