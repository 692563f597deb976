use crate::Coordinate;

/// Valkey key holding the serialized map cache (JSON, see `MapCacheBlob`).
pub const MAP_CACHE: &str = "map";

/// Build the Valkey key for a single cell.
pub fn pixel_key(coord: Coordinate) -> String {
    format!("{}:{}", coord.x, coord.y)
}
