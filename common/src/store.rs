use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::valkey;
use crate::{Color, ColorError, Coordinate};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("valkey: {0}")]
    Valkey(#[from] redis::RedisError),

    #[error("malformed color at {key}: {source}")]
    MalformedColor { key: String, source: ColorError },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable mapping from cell to color, plus the one reserved map-cache blob.
///
/// Every operation is an independent point operation; nothing here spans
/// keys atomically.
pub trait PixelStore: Clone + Send + Sync + 'static {
    /// `None` means the cell was never written.
    fn get(&self, coord: Coordinate) -> impl Future<Output = StoreResult<Option<Color>>> + Send;

    fn set(&self, coord: Coordinate, color: Color) -> impl Future<Output = StoreResult<()>> + Send;

    fn exists(&self, coord: Coordinate) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Bulk write for seeding. Not atomic: a failure may leave a prefix written.
    fn set_many(&self, pixels: Vec<(Coordinate, Color)>) -> impl Future<Output = StoreResult<()>> + Send {
        let store = self.clone();
        async move {
            for (coord, color) in pixels {
                store.set(coord, color).await?;
            }
            Ok(())
        }
    }

    fn load_map_cache(&self) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send;

    fn save_map_cache(&self, blob: Vec<u8>) -> impl Future<Output = StoreResult<()>> + Send;
}

fn decode_color(key: String, raw: Option<String>) -> StoreResult<Option<Color>> {
    raw.map(|value| Color::parse(&value).map_err(|source| StoreError::MalformedColor { key, source }))
        .transpose()
}

/// Valkey-backed store. Cloning shares the multiplexed connection.
#[derive(Clone)]
pub struct ValkeyStore {
    con: redis::aio::MultiplexedConnection,
}

impl ValkeyStore {
    pub fn new(con: redis::aio::MultiplexedConnection) -> Self {
        Self { con }
    }

    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self::new(client.get_multiplexed_async_connection().await?))
    }
}

impl PixelStore for ValkeyStore {
    fn get(&self, coord: Coordinate) -> impl Future<Output = StoreResult<Option<Color>>> + Send {
        let mut con = self.con.clone();
        async move {
            let key = valkey::pixel_key(coord);
            let raw: Option<String> = con.get(&key).await?;
            decode_color(key, raw)
        }
    }

    fn set(&self, coord: Coordinate, color: Color) -> impl Future<Output = StoreResult<()>> + Send {
        let mut con = self.con.clone();
        async move {
            let _: () = con.set(valkey::pixel_key(coord), color.to_string()).await?;
            Ok(())
        }
    }

    fn exists(&self, coord: Coordinate) -> impl Future<Output = StoreResult<bool>> + Send {
        let mut con = self.con.clone();
        async move { Ok(con.exists(valkey::pixel_key(coord)).await?) }
    }

    /// One pipeline per call.
    fn set_many(&self, pixels: Vec<(Coordinate, Color)>) -> impl Future<Output = StoreResult<()>> + Send {
        let mut con = self.con.clone();
        async move {
            if pixels.is_empty() {
                return Ok(());
            }
            let mut pipe = redis::pipe();
            for (coord, color) in &pixels {
                pipe.set(valkey::pixel_key(*coord), color.to_string()).ignore();
            }
            let _: () = pipe.query_async(&mut con).await?;
            Ok(())
        }
    }

    fn load_map_cache(&self) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        let mut con = self.con.clone();
        async move { Ok(con.get(valkey::MAP_CACHE).await?) }
    }

    fn save_map_cache(&self, blob: Vec<u8>) -> impl Future<Output = StoreResult<()>> + Send {
        let mut con = self.con.clone();
        async move {
            let _: () = con.set(valkey::MAP_CACHE, blob).await?;
            Ok(())
        }
    }
}

#[derive(Default)]
struct MemoryInner {
    values: HashMap<String, Vec<u8>>,
    failing_reads: HashSet<Coordinate>,
    fail_pixel_writes: bool,
    fail_cache_writes: bool,
}

/// In-process store using the same key layout as Valkey, with switchable
/// failures for exercising the error paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a raw value under a cell key, bypassing color encoding.
    pub fn insert_raw(&self, coord: Coordinate, value: &str) {
        self.lock()
            .values
            .insert(valkey::pixel_key(coord), value.as_bytes().to_vec());
    }

    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_reads_at(&self, coord: Coordinate) {
        self.lock().failing_reads.insert(coord);
    }

    pub fn set_fail_pixel_writes(&self, fail: bool) {
        self.lock().fail_pixel_writes = fail;
    }

    pub fn set_fail_cache_writes(&self, fail: bool) {
        self.lock().fail_cache_writes = fail;
    }

    /// Synchronous read for assertions.
    pub fn color_at(&self, coord: Coordinate) -> Option<Color> {
        let raw = self.lock().values.get(&valkey::pixel_key(coord)).cloned()?;
        Color::parse(&String::from_utf8_lossy(&raw)).ok()
    }

    pub fn map_cache(&self) -> Option<Vec<u8>> {
        self.lock().values.get(valkey::MAP_CACHE).cloned()
    }
}

impl PixelStore for MemoryStore {
    fn get(&self, coord: Coordinate) -> impl Future<Output = StoreResult<Option<Color>>> + Send {
        let store = self.clone();
        async move {
            let inner = store.lock();
            if inner.failing_reads.contains(&coord) {
                return Err(StoreError::Unavailable(format!("read of {} failed", valkey::pixel_key(coord))));
            }
            let key = valkey::pixel_key(coord);
            let raw = inner
                .values
                .get(&key)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
            decode_color(key, raw)
        }
    }

    fn set(&self, coord: Coordinate, color: Color) -> impl Future<Output = StoreResult<()>> + Send {
        let store = self.clone();
        async move {
            let mut inner = store.lock();
            if inner.fail_pixel_writes {
                return Err(StoreError::Unavailable("pixel write failed".into()));
            }
            inner
                .values
                .insert(valkey::pixel_key(coord), color.to_string().into_bytes());
            Ok(())
        }
    }

    fn exists(&self, coord: Coordinate) -> impl Future<Output = StoreResult<bool>> + Send {
        let store = self.clone();
        async move { Ok(store.lock().values.contains_key(&valkey::pixel_key(coord))) }
    }

    fn load_map_cache(&self) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        let store = self.clone();
        async move { Ok(store.map_cache()) }
    }

    fn save_map_cache(&self, blob: Vec<u8>) -> impl Future<Output = StoreResult<()>> + Send {
        let store = self.clone();
        async move {
            let mut inner = store.lock();
            if inner.fail_cache_writes {
                return Err(StoreError::Unavailable("map cache write failed".into()));
            }
            inner.values.insert(valkey::MAP_CACHE.to_string(), blob);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_point_operations() {
        let store = MemoryStore::new();
        let at = Coordinate::new(3, 4);
        assert_eq!(store.get(at).await.unwrap(), None);
        assert!(!store.exists(at).await.unwrap());

        store.set(at, Color::LAND).await.unwrap();
        assert_eq!(store.get(at).await.unwrap(), Some(Color::LAND));
        assert!(store.exists(at).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn stored_colors_are_canonical() {
        let store = MemoryStore::new();
        let at = Coordinate::new(0, 0);
        store.insert_raw(at, "#6ABE30");
        assert_eq!(store.get(at).await.unwrap(), Some(Color::LAND));

        store.set(at, Color::new(0xAA, 0xBB, 0xCC)).await.unwrap();
        let raw = store.lock().values.get("0:0").cloned().unwrap();
        assert_eq!(raw, b"#aabbcc");
    }

    #[tokio::test]
    async fn malformed_values_are_reported() {
        let store = MemoryStore::new();
        store.insert_raw(Coordinate::new(1, 1), "purple");
        let err = store.get(Coordinate::new(1, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::MalformedColor { ref key, .. } if key == "1:1"));
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MemoryStore::new();
        let at = Coordinate::new(9, 9);
        store.fail_reads_at(at);
        assert!(store.get(at).await.is_err());
        assert!(store.get(Coordinate::new(9, 8)).await.is_ok());

        store.set_fail_pixel_writes(true);
        assert!(store.set(at, Color::LAND).await.is_err());
        assert!(store.is_empty());

        store.set_fail_cache_writes(true);
        assert!(store.save_map_cache(b"{}".to_vec()).await.is_err());
        store.set_fail_cache_writes(false);
        store.save_map_cache(b"{}".to_vec()).await.unwrap();
        assert_eq!(store.load_map_cache().await.unwrap(), Some(b"{}".to_vec()));
    }
}
