use anyhow::Context;
use std::str::FromStr;

/// Largest rendered map side, in physical pixels.
const MAX_RENDERED_SIDE: u64 = 16_384;

#[derive(Debug)]
pub struct Config {
    pub valkey_url: String,
    pub listen_addr: String,
    pub map_width: i32,
    pub map_height: i32,
    /// Physical pixels per cell side in the rendered map.
    pub pixel_scale: u32,
    pub sea_range: u32,
    /// Upper bound on outstanding store lookups during a bulk load.
    pub load_concurrency: usize,
    /// Number of recent placements kept for WebSocket catch-up.
    pub journal_capacity: usize,
    pub rebuild_on_start: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let config = Self {
            valkey_url: lookup("VALKEY_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            listen_addr: lookup("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            map_width: parse_or(&lookup, "MAP_WIDTH", 1024)?,
            map_height: parse_or(&lookup, "MAP_HEIGHT", 512)?,
            pixel_scale: parse_or(&lookup, "PIXEL_SCALE", 2)?,
            sea_range: parse_or(&lookup, "SEA_RANGE", 8)?,
            load_concurrency: parse_or(&lookup, "LOAD_CONCURRENCY", 1000)?,
            journal_capacity: parse_or(&lookup, "JOURNAL_CAPACITY", 4096)?,
            rebuild_on_start: parse_or(&lookup, "REBUILD_ON_START", false)?,
        };

        anyhow::ensure!(
            config.map_width > 0 && config.map_height > 0,
            "map extent must be positive, got {}x{}",
            config.map_width,
            config.map_height
        );
        anyhow::ensure!(config.pixel_scale > 0, "PIXEL_SCALE must be at least 1");
        let rendered = (
            config.map_width as u64 * config.pixel_scale as u64,
            config.map_height as u64 * config.pixel_scale as u64,
        );
        anyhow::ensure!(
            rendered.0 <= MAX_RENDERED_SIDE && rendered.1 <= MAX_RENDERED_SIDE,
            "rendered map {}x{} exceeds {MAX_RENDERED_SIDE} pixels per side; lower PIXEL_SCALE",
            rendered.0,
            rendered.1
        );
        anyhow::ensure!(config.load_concurrency > 0, "LOAD_CONCURRENCY must be at least 1");
        Ok(config)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
