use common::{Color, Coordinate, PixelStore, Torus};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::snapshot::Snapshot;

/// How often (in resolved cells) load progress is logged.
const PROGRESS_EVERY: usize = 65_536;

/// Counters from a bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub found: usize,
    pub missing: usize,
    pub failed: usize,
}

/// Fetch every cell from the store, at most `concurrency` lookups in flight.
///
/// Cells that are missing, unreadable or malformed come back as SEA, so the
/// snapshot always covers the whole map.
pub async fn load_all<S: PixelStore>(store: &S, torus: Torus, concurrency: usize) -> (Snapshot, LoadStats) {
    let total = torus.area();
    let mut snapshot = Snapshot::filled(torus, Color::SEA);
    let mut stats = LoadStats::default();
    let mut resolved = 0usize;

    let admission = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    tracing::info!("Loading {} map cells (concurrency {})", total, concurrency);

    for y in 0..torus.height {
        for x in 0..torus.width {
            // Never closed.
            let Ok(permit) = admission.clone().acquire_owned().await else {
                break;
            };
            let store = store.clone();
            let coord = Coordinate::new(x, y);
            tasks.spawn(async move {
                let result = store.get(coord).await;
                drop(permit);
                (coord, result)
            });

            while let Some(joined) = tasks.try_join_next() {
                record(&mut snapshot, &mut stats, joined);
                resolved += 1;
                log_progress(resolved, total);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        record(&mut snapshot, &mut stats, joined);
        resolved += 1;
        log_progress(resolved, total);
    }

    tracing::info!(
        "Map cells loaded: {} found, {} missing, {} failed",
        stats.found,
        stats.missing,
        stats.failed
    );
    (snapshot, stats)
}

type Lookup = (Coordinate, common::StoreResult<Option<Color>>);

fn record(snapshot: &mut Snapshot, stats: &mut LoadStats, joined: Result<Lookup, tokio::task::JoinError>) {
    match joined {
        Ok((coord, Ok(Some(color)))) => {
            snapshot.set(coord, color);
            stats.found += 1;
        }
        Ok((_, Ok(None))) => stats.missing += 1,
        Ok((coord, Err(e))) => {
            tracing::warn!("Lookup of {}:{} failed, treating as sea: {}", coord.x, coord.y, e);
            stats.failed += 1;
        }
        Err(e) => {
            tracing::error!("Lookup task aborted, cell left as sea: {}", e);
            stats.failed += 1;
        }
    }
}

fn log_progress(resolved: usize, total: usize) {
    if resolved % PROGRESS_EVERY == 0 || resolved == total {
        tracing::debug!("Loading map cells... {}/{}", resolved, total);
    }
}
