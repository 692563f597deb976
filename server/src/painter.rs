use common::{Pixel, PixelStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::board::Board;
use crate::error::PlaceError;
use crate::journal::{Journal, PlacementEvent};
use crate::map_cache::MapView;
use crate::validator::Rejection;

const COMMAND_BUFFER: usize = 256;

/// Result of one point of a stroke.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrokeStep {
    pub pixel: Pixel,
    /// New map version if accepted.
    pub version: Option<u64>,
    pub rejection: Option<&'static str>,
}

enum Command {
    Place {
        pixel: Pixel,
        reply: oneshot::Sender<Result<MapView, PlaceError>>,
    },
    Stroke {
        from: Pixel,
        to: Pixel,
        reply: oneshot::Sender<Result<Vec<StrokeStep>, PlaceError>>,
    },
    Rebuild {
        reply: oneshot::Sender<Result<MapView, PlaceError>>,
    },
}

/// Where accepted placements are announced.
#[derive(Clone)]
pub struct Feed {
    pub journal: Journal,
    pub broadcast_tx: broadcast::Sender<String>,
}

/// Handle to the single task that owns the board.
///
/// Commands run one at a time to completion inside that task, so a caller
/// that goes away mid-request cannot leave a placement half applied.
#[derive(Clone)]
pub struct Painter {
    tx: mpsc::Sender<Command>,
    view: watch::Receiver<Arc<MapView>>,
}

impl Painter {
    pub fn spawn<S: PixelStore>(board: Board<S>, feed: Feed) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view) = watch::channel(Arc::new(board.view()));
        let handle = tokio::spawn(run(board, rx, view_tx, feed));
        (Self { tx, view }, handle)
    }

    /// Latest published map; never waits on the painter.
    pub fn current(&self) -> Arc<MapView> {
        self.view.borrow().clone()
    }

    pub async fn place(&self, pixel: Pixel) -> Result<MapView, PlaceError> {
        self.request(|reply| Command::Place { pixel, reply }).await?
    }

    pub async fn stroke(&self, from: Pixel, to: Pixel) -> Result<Vec<StrokeStep>, PlaceError> {
        self.request(|reply| Command::Stroke { from, to, reply }).await?
    }

    pub async fn rebuild(&self) -> Result<MapView, PlaceError> {
        self.request(|reply| Command::Rebuild { reply }).await?
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, PlaceError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| PlaceError::PainterClosed)?;
        response.await.map_err(|_| PlaceError::PainterClosed)
    }
}

async fn run<S: PixelStore>(
    mut board: Board<S>,
    mut rx: mpsc::Receiver<Command>,
    view_tx: watch::Sender<Arc<MapView>>,
    feed: Feed,
) {
    tracing::info!("Painter started at version {}", board.view().version);

    while let Some(command) = rx.recv().await {
        match command {
            Command::Place { pixel, reply } => {
                let result = board.place(pixel).await;
                match &result {
                    Ok(view) => publish(&view_tx, &feed, pixel, view).await,
                    Err(PlaceError::Rejected(reason)) => {
                        tracing::debug!("Rejected {}:{} {}: {}", pixel.x, pixel.y, pixel.color, reason)
                    }
                    Err(e) => tracing::warn!("Placement at {}:{} failed: {}", pixel.x, pixel.y, e),
                }
                let _ = reply.send(result);
            }
            Command::Stroke { from, to, reply } => {
                let result = stroke(&mut board, &view_tx, &feed, from, to).await;
                let _ = reply.send(result);
            }
            Command::Rebuild { reply } => {
                let result = board.rebuild().await.map_err(PlaceError::from);
                match &result {
                    Ok(view) => {
                        view_tx.send_replace(Arc::new(view.clone()));
                        let notice = serde_json::json!({ "type": "rebuilt", "version": view.version });
                        let _ = feed.broadcast_tx.send(notice.to_string());
                    }
                    Err(e) => tracing::error!("Map rebuild failed: {}", e),
                }
                let _ = reply.send(result);
            }
        }
    }

    tracing::info!("Painter stopped");
}

/// Place each point of the shortest path in order. Rejected points are
/// reported and skipped; a service error ends the stroke. An off-map
/// endpoint rejects the whole stroke before anything is painted.
async fn stroke<S: PixelStore>(
    board: &mut Board<S>,
    view_tx: &watch::Sender<Arc<MapView>>,
    feed: &Feed,
    from: Pixel,
    to: Pixel,
) -> Result<Vec<StrokeStep>, PlaceError> {
    let torus = board.settings().torus;
    if let Some(end) = [from, to].into_iter().find(|p| !torus.contains(p.x, p.y)) {
        return Err(Rejection::OutOfBounds { x: end.x, y: end.y }.into());
    }
    let path = torus.shortest_path(from, to);
    let mut steps = Vec::with_capacity(path.len());
    for pixel in path {
        let step = match board.place(pixel).await {
            Ok(view) => {
                publish(view_tx, feed, pixel, &view).await;
                StrokeStep {
                    pixel,
                    version: Some(view.version),
                    rejection: None,
                }
            }
            Err(PlaceError::Rejected(reason)) => StrokeStep {
                pixel,
                version: None,
                rejection: Some(Rejection::code(&reason)),
            },
            Err(e) => {
                tracing::warn!("Stroke stopped at {}:{}: {}", pixel.x, pixel.y, e);
                return Err(e);
            }
        };
        steps.push(step);
    }
    Ok(steps)
}

async fn publish(view_tx: &watch::Sender<Arc<MapView>>, feed: &Feed, pixel: Pixel, view: &MapView) {
    view_tx.send_replace(Arc::new(view.clone()));

    let event = PlacementEvent {
        version: view.version,
        x: pixel.x,
        y: pixel.y,
        color: pixel.color,
        last_update: view.last_update,
    };
    match serde_json::to_string(&event) {
        Ok(json) => {
            // No subscribers is fine.
            let _ = feed.broadcast_tx.send(json);
        }
        Err(e) => tracing::error!("Failed to serialize placement event: {}", e),
    }
    feed.journal.push(event).await;
}
