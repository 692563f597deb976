use common::{Color, Pixel, PixelStore, Torus};

use crate::error::{CacheError, PlaceError};
use crate::loader;
use crate::map_cache::{Loaded, MapCache, MapView};
use crate::snapshot::Snapshot;
use crate::validator;

#[derive(Debug, Clone, Copy)]
pub struct BoardSettings {
    pub torus: Torus,
    pub scale: u32,
    pub sea_range: u32,
    pub load_concurrency: usize,
}

/// The canvas state: durable store, in-memory snapshot and rendered map.
///
/// Not synchronized. A single owner (the painter task) drives every mutation.
pub struct Board<S> {
    store: S,
    settings: BoardSettings,
    snapshot: Snapshot,
    cache: MapCache,
}

impl<S: PixelStore> Board<S> {
    /// Load every cell, then reuse the persisted map or render a new one.
    pub async fn bootstrap(store: S, settings: BoardSettings, force_rebuild: bool) -> Result<Self, CacheError> {
        let (snapshot, _) = loader::load_all(&store, settings.torus, settings.load_concurrency).await;

        let cache = match MapCache::load(&store, settings.torus, settings.scale).await? {
            Loaded::Ready(cache) if !force_rebuild => cache,
            Loaded::Ready(stale) => Self::render(&store, &snapshot, settings.scale, stale.version()).await?,
            Loaded::NeedsBuild { version } => Self::render(&store, &snapshot, settings.scale, version).await?,
        };

        tracing::info!(
            "Canvas ready: {} cells ({} sea) at version {}",
            snapshot.len(),
            snapshot.count(Color::SEA),
            cache.version()
        );
        Ok(Self {
            store,
            settings,
            snapshot,
            cache,
        })
    }

    async fn render(store: &S, snapshot: &Snapshot, scale: u32, version: u64) -> Result<MapCache, CacheError> {
        let cache = MapCache::build(snapshot, scale, version)?;
        cache.persist(store).await?;
        Ok(cache)
    }

    pub fn view(&self) -> MapView {
        self.cache.view()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn settings(&self) -> BoardSettings {
        self.settings
    }

    /// Validate, write the cell, then advance the map.
    ///
    /// Either the store write and the version bump both take effect or
    /// neither does, short of a crash between the two writes.
    pub async fn place(&mut self, pixel: Pixel) -> Result<MapView, PlaceError> {
        validator::validate(&self.snapshot, self.settings.sea_range, &pixel)?;
        let coord = pixel.coord();
        let previous = self
            .snapshot
            .get(coord)
            .ok_or(validator::Rejection::OutOfBounds { x: pixel.x, y: pixel.y })?;

        self.store
            .set(coord, pixel.color)
            .await
            .map_err(PlaceError::Store)?;

        match self.cache.apply_update(&self.store, pixel).await {
            Ok(view) => {
                self.snapshot.set(coord, pixel.color);
                tracing::debug!("Painted {}:{} {} (version {})", pixel.x, pixel.y, pixel.color, view.version);
                Ok(view)
            }
            Err(e) => {
                if let Err(restore) = self.store.set(coord, previous).await {
                    // The store is now one placement ahead of the map; a rebuild reconciles it.
                    tracing::error!(
                        "Failed to roll back {}:{} to {} after cache failure: {}",
                        pixel.x,
                        pixel.y,
                        previous,
                        restore
                    );
                }
                Err(PlaceError::Cache(e))
            }
        }
    }

    /// Reload every cell from the store and re-render, keeping the version.
    pub async fn rebuild(&mut self) -> Result<MapView, CacheError> {
        let (snapshot, stats) = loader::load_all(&self.store, self.settings.torus, self.settings.load_concurrency).await;
        let cache = Self::render(&self.store, &snapshot, self.settings.scale, self.cache.version()).await?;
        tracing::info!("Rebuilt map at version {} ({} cells found)", cache.version(), stats.found);
        self.snapshot = snapshot;
        self.cache = cache;
        Ok(self.view())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::{Coordinate, MapCacheBlob, MemoryStore};

    pub(crate) const MAP: Torus = Torus::new(24, 16);
    pub(crate) const RED: Color = Color::new(230, 20, 20);

    pub(crate) fn settings() -> BoardSettings {
        BoardSettings {
            torus: MAP,
            scale: 2,
            sea_range: 3,
            load_concurrency: 8,
        }
    }

    /// Land everywhere except a sea strip along x = 0, one red claim at (5, 5).
    pub(crate) async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        for y in 0..MAP.height {
            for x in 0..MAP.width {
                let color = if x == 0 { Color::SEA } else { Color::LAND };
                store.set(Coordinate::new(x, y), color).await.unwrap();
            }
        }
        store.set(Coordinate::new(5, 5), RED).await.unwrap();
        store
    }

    #[tokio::test]
    async fn cold_start_builds_and_persists() {
        let store = seeded_store().await;
        let board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();
        assert_eq!(board.view().version, 0);
        assert_eq!(board.snapshot().get(Coordinate::new(5, 5)), Some(RED));
        assert!(store.map_cache().is_some());
    }

    #[tokio::test]
    async fn accepted_placements_advance_version() {
        let store = seeded_store().await;
        let mut board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();

        let mut versions = Vec::new();
        for y in 6..10 {
            versions.push(board.place(Pixel::new(5, y, RED)).await.unwrap().version);
        }
        assert_eq!(versions, vec![1, 2, 3, 4]);
        assert_eq!(store.color_at(Coordinate::new(5, 9)), Some(RED));
        assert_eq!(board.snapshot().get(Coordinate::new(5, 9)), Some(RED));
    }

    #[tokio::test]
    async fn rejections_leave_no_trace() {
        let store = seeded_store().await;
        let mut board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();
        let blue = Color::new(0, 0, 255);

        for _ in 0..2 {
            let err = board.place(Pixel::new(5, 8, blue)).await.unwrap_err();
            assert!(matches!(err, PlaceError::Rejected(validator::Rejection::NoAdjacency)));
        }
        let err = board.place(Pixel::new(5, 5, RED)).await.unwrap_err();
        assert!(matches!(err, PlaceError::Rejected(validator::Rejection::ColorUnchanged)));

        assert_eq!(board.view().version, 0);
        assert_eq!(store.color_at(Coordinate::new(5, 8)), Some(Color::LAND));
    }

    #[tokio::test]
    async fn failed_pixel_write_does_not_advance() {
        let store = seeded_store().await;
        let mut board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();

        store.set_fail_pixel_writes(true);
        let err = board.place(Pixel::new(5, 6, RED)).await.unwrap_err();
        assert!(matches!(err, PlaceError::Store(_)));
        assert_eq!(board.view().version, 0);
        assert_eq!(board.snapshot().get(Coordinate::new(5, 6)), Some(Color::LAND));

        store.set_fail_pixel_writes(false);
        assert_eq!(board.place(Pixel::new(5, 6, RED)).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn failed_cache_write_rolls_back_pixel() {
        let store = seeded_store().await;
        let mut board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();

        store.set_fail_cache_writes(true);
        let err = board.place(Pixel::new(5, 6, RED)).await.unwrap_err();
        assert!(matches!(err, PlaceError::Cache(_)));
        assert_eq!(store.color_at(Coordinate::new(5, 6)), Some(Color::LAND));
        assert_eq!(board.snapshot().get(Coordinate::new(5, 6)), Some(Color::LAND));
        assert_eq!(board.view().version, 0);
    }

    #[tokio::test]
    async fn warm_start_keeps_version() {
        let store = seeded_store().await;
        {
            let mut board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();
            board.place(Pixel::new(5, 6, RED)).await.unwrap();
            board.place(Pixel::new(5, 7, RED)).await.unwrap();
        }
        let board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();
        assert_eq!(board.view().version, 2);
        assert_eq!(board.snapshot().get(Coordinate::new(5, 7)), Some(RED));
    }

    #[tokio::test]
    async fn corrupt_cache_self_heals() {
        let store = seeded_store().await;
        store.save_map_cache(b"garbage".to_vec()).await.unwrap();

        let board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();
        let blob = MapCacheBlob::from_json(&store.map_cache().unwrap()).unwrap();
        assert_eq!(blob.version, 0);
        assert_eq!(blob.image.as_deref(), Some(board.view().png.as_slice()));
    }

    #[tokio::test]
    async fn rebuild_reconciles_stale_map() {
        let store = seeded_store().await;
        let mut board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();
        board.place(Pixel::new(5, 6, RED)).await.unwrap();

        // A write that reached the store but never the map.
        store.set(Coordinate::new(5, 7), RED).await.unwrap();
        let view = board.rebuild().await.unwrap();

        assert_eq!(view.version, 1);
        assert_eq!(board.snapshot().get(Coordinate::new(5, 7)), Some(RED));
        let image = image::load_from_memory(&view.png).unwrap().into_rgb8();
        assert_eq!(image.get_pixel(5 * 2, 7 * 2).0, RED.rgb());
    }

    #[tokio::test]
    async fn forced_rebuild_ignores_warm_cache() {
        let store = seeded_store().await;
        {
            let mut board = Board::bootstrap(store.clone(), settings(), false).await.unwrap();
            board.place(Pixel::new(5, 6, RED)).await.unwrap();
        }
        store.set(Coordinate::new(5, 7), RED).await.unwrap();

        let board = Board::bootstrap(store.clone(), settings(), true).await.unwrap();
        assert_eq!(board.view().version, 1);
        let image = image::load_from_memory(&board.view().png).unwrap().into_rgb8();
        assert_eq!(image.get_pixel(5 * 2, 7 * 2).0, RED.rgb());
    }
}
