//! Batched tile downloads.
//!
//! Callers enqueue whole batches (one pan/zoom worth of tiles); a single
//! worker task drains the queue, holding the connectivity gate open across
//! consecutive batches and releasing it when the queue runs dry. Batches
//! are fetched concurrently, serialised down to one request at a time on a
//! Bluetooth uplink. `shutdown` posts a sentinel behind the queued batches;
//! the worker finishes them, releases the uplink and exits.
//!
//! A connect or DNS failure is treated as "there is no internet here":
//! the whole fetch pipeline is blocked for a window instead of hammering a
//! dead link once per tile. Individual failed tiles from an otherwise
//! healthy batch are retried once.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::TileConfig;
use crate::net::gate::{ConnectivityGate, GateStatus};
use crate::tiles::cache::{TileCache, TileState};
use crate::tiles::LayerConfig;

const GATE_CALLER: &str = "tiles";

#[derive(Debug, Clone)]
pub struct TileRequest {
    pub layer: LayerConfig,
    pub z: u8,
    pub x: i64,
    pub y: i64,
}

/// Outcome of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Enqueued { tiles: usize },
    Dropped { reason: &'static str },
}

enum FetchOutcome {
    Stored,
    NotFound,
    /// This tile failed but the link works.
    SoftFail,
    /// Connect/DNS level failure, the link itself is down.
    HardFail,
}

struct Batch {
    tiles: Vec<TileRequest>,
    retried: bool,
}

enum Message {
    Batch(Batch),
    Shutdown,
}

#[derive(Clone)]
pub struct TileFetcher {
    tx: mpsc::UnboundedSender<Message>,
    cache: TileCache,
    gate: Arc<ConnectivityGate>,
}

impl TileFetcher {
    /// Spawn the download worker and return the enqueue handle.
    pub fn spawn(cfg: TileConfig, cache: TileCache, gate: Arc<ConnectivityGate>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let fetcher = Self {
            tx: tx.clone(),
            cache: cache.clone(),
            gate: gate.clone(),
        };
        tokio::spawn(worker(cfg, cache, gate, tx, rx));
        fetcher
    }

    /// Queue every tile of the batch that is not already cached or being
    /// fetched.
    pub fn enqueue(&self, tiles: Vec<TileRequest>) -> Enqueue {
        if self.gate.is_blocked() {
            return Enqueue::Dropped {
                reason: "fetch window blocked",
            };
        }
        let claimed: Vec<TileRequest> = tiles
            .into_iter()
            .filter(|t| self.cache.mark_in_flight(&t.layer, t.z, t.x, t.y))
            .collect();
        if claimed.is_empty() {
            return Enqueue::Dropped {
                reason: "nothing to fetch",
            };
        }
        let count = claimed.len();
        match self.tx.send(Message::Batch(Batch {
            tiles: claimed,
            retried: false,
        })) {
            Ok(()) => Enqueue::Enqueued { tiles: count },
            Err(_) => Enqueue::Dropped {
                reason: "queue closed",
            },
        }
    }

    /// Cache state of one tile, for callers tracking their requests.
    pub fn status(&self, layer: &LayerConfig, z: u8, x: i64, y: i64) -> TileState {
        self.cache.state(layer, z, x, y)
    }

    /// Stop the worker. Batches queued before the call are still fetched;
    /// the worker then releases the uplink and exits.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }

    /// Tiles around `(z, x, y)` worth warming: the four children one zoom
    /// in and the parent one zoom out, within the layer's zoom bounds.
    pub fn prefetch_halo(layer: &LayerConfig, z: u8, x: i64, y: i64) -> Vec<TileRequest> {
        let mut out = Vec::new();
        if z + 1 <= layer.max_zoom {
            for (cx, cy) in [
                (2 * x, 2 * y),
                (2 * x + 1, 2 * y),
                (2 * x, 2 * y + 1),
                (2 * x + 1, 2 * y + 1),
            ] {
                out.push(TileRequest {
                    layer: layer.clone(),
                    z: z + 1,
                    x: cx,
                    y: cy,
                });
            }
        }
        if z > 1 && z - 1 >= layer.min_zoom {
            out.push(TileRequest {
                layer: layer.clone(),
                z: z - 1,
                x: x / 2,
                y: y / 2,
            });
        }
        out
    }
}

async fn worker(
    cfg: TileConfig,
    cache: TileCache,
    gate: Arc<ConnectivityGate>,
    tx: mpsc::UnboundedSender<Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    let client = Client::new();
    while let Some(msg) = rx.recv().await {
        let batch = match msg {
            Message::Batch(batch) => batch,
            Message::Shutdown => break,
        };
        run_batch(&cfg, &client, &cache, &gate, &tx, batch).await;
        // the last batch out lowers the uplink, whatever its outcome
        if rx.is_empty() {
            gate.close(GATE_CALLER);
        }
    }
    gate.close(GATE_CALLER);
}

async fn run_batch(
    cfg: &TileConfig,
    client: &Client,
    cache: &TileCache,
    gate: &ConnectivityGate,
    tx: &mpsc::UnboundedSender<Message>,
    batch: Batch,
) {
    match gate.open(GATE_CALLER) {
        GateStatus::Success => {}
        status => {
            warn!(?status, tiles = batch.tiles.len(), "batch dropped, no uplink");
            for t in &batch.tiles {
                cache.mark_error(&t.layer, t.z, t.x, t.y);
            }
            return;
        }
    }
    let concurrency = if gate.is_bluetooth() {
        cfg.batch_concurrency_bt.max(1)
    } else {
        cfg.batch_concurrency.max(1)
    };

    let results: Vec<(TileRequest, FetchOutcome)> = stream::iter(batch.tiles)
        .map(|t| {
            let client = client.clone();
            let cache = cache.clone();
            async move {
                let outcome = fetch_one(&client, &cache, &t).await;
                (t, outcome)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut failures = Vec::new();
    let mut hard_failure = false;
    for (t, outcome) in results {
        match outcome {
            FetchOutcome::Stored | FetchOutcome::NotFound => {}
            FetchOutcome::SoftFail => failures.push(t),
            FetchOutcome::HardFail => {
                hard_failure = true;
                failures.push(t);
            }
        }
    }
    if hard_failure {
        for t in &failures {
            cache.mark_error(&t.layer, t.z, t.x, t.y);
        }
        gate.arm_block(Duration::from_secs(cfg.fetch_block_window_secs));
    } else if !failures.is_empty() {
        if batch.retried {
            for t in &failures {
                cache.mark_error(&t.layer, t.z, t.x, t.y);
            }
            warn!(tiles = failures.len(), "tiles failed twice, giving up");
        } else {
            debug!(tiles = failures.len(), "requeueing failed tiles");
            let _ = tx.send(Message::Batch(Batch {
                tiles: failures,
                retried: true,
            }));
        }
    }
}

async fn fetch_one(client: &Client, cache: &TileCache, t: &TileRequest) -> FetchOutcome {
    let url = t.layer.tile_url(t.z, t.x, t.y);
    let mut req = client.get(&url);
    if let Some(referer) = &t.layer.referer {
        req = req.header(reqwest::header::REFERER, referer);
    }
    if let Some(ua) = &t.layer.user_agent {
        req = req.header(reqwest::header::USER_AGENT, ua);
    }
    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            cache.mark_error(&t.layer, t.z, t.x, t.y);
            return if e.is_connect() || e.is_timeout() {
                warn!(url, error = %e, "uplink looks down");
                FetchOutcome::HardFail
            } else {
                FetchOutcome::SoftFail
            };
        }
    };
    if !resp.status().is_success() {
        debug!(url, status = %resp.status(), "tile not available");
        if cache.store_not_found(&t.layer, t.z, t.x, t.y).is_err() {
            cache.mark_error(&t.layer, t.z, t.x, t.y);
        }
        return FetchOutcome::NotFound;
    }
    match resp.bytes().await {
        Ok(bytes) => match cache.store(&t.layer, t.z, t.x, t.y, &bytes) {
            Ok(()) => FetchOutcome::Stored,
            Err(e) => {
                warn!(url, error = %e, "tile store failed");
                cache.mark_error(&t.layer, t.z, t.x, t.y);
                FetchOutcome::SoftFail
            }
        },
        Err(_) => {
            cache.mark_error(&t.layer, t.z, t.x, t.y);
            FetchOutcome::SoftFail
        }
    }
}
