use chrono::{DateTime, Utc};
use common::{Color, Coordinate, MapCacheBlob, Pixel, PixelStore, StoreError, Torus};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

use crate::error::CacheError;
use crate::snapshot::Snapshot;

/// What readers see: the encoded map and its metadata.
#[derive(Debug, Clone)]
pub struct MapView {
    pub png: Arc<Vec<u8>>,
    pub version: u64,
    pub last_update: DateTime<Utc>,
    pub torus: Torus,
    pub scale: u32,
}

/// The rendered map. Each cell is a `scale`×`scale` block of the bitmap.
///
/// The decoded canvas stays in memory so a placement only repaints its own
/// block; the PNG is re-encoded from it.
pub struct MapCache {
    canvas: RgbImage,
    torus: Torus,
    scale: u32,
    png: Arc<Vec<u8>>,
    version: u64,
    last_update: DateTime<Utc>,
}

/// Outcome of reading the persisted blob.
pub enum Loaded {
    Ready(MapCache),
    /// No usable bitmap. `version` is carried over when the blob was readable.
    NeedsBuild { version: u64 },
}

fn encode_png(canvas: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Encode a copy of `canvas` on the blocking pool, off the async workers.
async fn encode_png_blocking(canvas: &RgbImage) -> Result<Vec<u8>, CacheError> {
    let canvas = canvas.clone();
    Ok(tokio::task::spawn_blocking(move || encode_png(&canvas)).await??)
}

impl MapCache {
    /// Render every cell of `snapshot`.
    pub fn build(snapshot: &Snapshot, scale: u32, version: u64) -> Result<Self, CacheError> {
        let torus = snapshot.torus();
        let mut canvas = RgbImage::new(torus.width as u32 * scale, torus.height as u32 * scale);
        for (coord, color) in snapshot.iter() {
            paint_block(&mut canvas, scale, coord, color);
        }
        let png = encode_png(&canvas)?;
        tracing::info!(
            "Rendered {}x{} map at version {}",
            canvas.width(),
            canvas.height(),
            version
        );
        Ok(Self {
            canvas,
            torus,
            scale,
            png: Arc::new(png),
            version,
            last_update: Utc::now(),
        })
    }

    /// Read the persisted blob. A corrupt or mismatched blob is reported as
    /// `NeedsBuild` rather than an error.
    pub async fn load<S: PixelStore>(store: &S, torus: Torus, scale: u32) -> Result<Loaded, StoreError> {
        let Some(raw) = store.load_map_cache().await? else {
            tracing::info!("Map cache key not found");
            return Ok(Loaded::NeedsBuild { version: 0 });
        };

        let blob = match MapCacheBlob::from_json(&raw) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!("Map cache blob is corrupt, rebuilding: {}", e);
                return Ok(Loaded::NeedsBuild { version: 0 });
            }
        };

        let Some(png) = blob.image else {
            tracing::info!("Map cache was cleared at version {}", blob.version);
            return Ok(Loaded::NeedsBuild { version: blob.version });
        };

        let canvas = match image::load_from_memory_with_format(&png, ImageFormat::Png) {
            Ok(decoded) => decoded.into_rgb8(),
            Err(e) => {
                tracing::warn!("Map cache image does not decode, rebuilding: {}", e);
                return Ok(Loaded::NeedsBuild { version: blob.version });
            }
        };

        let expected = (torus.width as u32 * scale, torus.height as u32 * scale);
        if canvas.dimensions() != expected {
            tracing::warn!(
                "Map cache image is {:?}, expected {:?}; rebuilding",
                canvas.dimensions(),
                expected
            );
            return Ok(Loaded::NeedsBuild { version: blob.version });
        }

        tracing::info!("Loaded map from cache at version {}", blob.version);
        Ok(Loaded::Ready(Self {
            canvas,
            torus,
            scale,
            png: Arc::new(png),
            version: blob.version,
            last_update: blob.last_update,
        }))
    }

    pub async fn persist<S: PixelStore>(&self, store: &S) -> Result<(), CacheError> {
        let blob = MapCacheBlob {
            image: Some(self.png.as_ref().clone()),
            version: self.version,
            last_update: self.last_update,
        };
        store.save_map_cache(blob.to_json()?).await?;
        Ok(())
    }

    /// Repaint one cell's block, bump the version and persist.
    ///
    /// On failure the block, version and encoded image are restored, so the
    /// cache is exactly as it was before the call.
    pub async fn apply_update<S: PixelStore>(&mut self, store: &S, pixel: Pixel) -> Result<MapView, CacheError> {
        let coord = pixel.coord();
        let previous = self.block_color(coord);
        let prior = (self.png.clone(), self.version, self.last_update);

        paint_block(&mut self.canvas, self.scale, coord, pixel.color);
        self.version += 1;
        self.last_update = Utc::now();

        let committed = match encode_png_blocking(&self.canvas).await {
            Ok(png) => {
                self.png = Arc::new(png);
                self.persist(store).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = committed {
            paint_block(&mut self.canvas, self.scale, coord, previous);
            (self.png, self.version, self.last_update) = prior;
            return Err(e);
        }
        Ok(self.view())
    }

    pub fn view(&self) -> MapView {
        MapView {
            png: self.png.clone(),
            version: self.version,
            last_update: self.last_update,
            torus: self.torus,
            scale: self.scale,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    #[cfg(test)]
    pub fn canvas(&self) -> &RgbImage {
        &self.canvas
    }

    fn block_color(&self, coord: Coordinate) -> Color {
        let Rgb([r, g, b]) = *self
            .canvas
            .get_pixel(coord.x as u32 * self.scale, coord.y as u32 * self.scale);
        Color::new(r, g, b)
    }
}

fn paint_block(canvas: &mut RgbImage, scale: u32, coord: Coordinate, color: Color) {
    let rgb = Rgb(color.rgb());
    let (left, top) = (coord.x as u32 * scale, coord.y as u32 * scale);
    for dy in 0..scale {
        for dx in 0..scale {
            canvas.put_pixel(left + dx, top + dy, rgb);
        }
    }
}
