pub mod color;
pub mod geometry;
pub mod map_blob;
pub mod store;
pub mod valkey;

pub use color::{Color, ColorError};
pub use geometry::{Coordinate, Pixel, Torus};
pub use map_blob::MapCacheBlob;
pub use store::{MemoryStore, PixelStore, StoreError, StoreResult, ValkeyStore};
