use common::StoreError;

use crate::validator::Rejection;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("map image: {0}")]
    Image(#[from] image::ImageError),

    #[error("map encoder task: {0}")]
    Encoder(#[from] tokio::task::JoinError),

    #[error("map cache blob: {0}")]
    Blob(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The pixel write failed; nothing was committed.
    #[error("pixel store unavailable: {0}")]
    Store(StoreError),

    /// The map cache could not be updated; the pixel write was rolled back.
    #[error("map cache update failed: {0}")]
    Cache(#[from] CacheError),

    #[error("painter is not running")]
    PainterClosed,
}

impl PlaceError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}
