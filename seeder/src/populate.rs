use anyhow::Context;
use common::{Color, Coordinate, PixelStore, Torus};
use image::RgbImage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PopulateStats {
    pub written: usize,
    pub skipped_existing: usize,
    pub interrupted: bool,
}

pub fn read_reference(path: &Path) -> anyhow::Result<RgbImage> {
    let image = image::open(path).with_context(|| format!("open reference image '{}'", path.display()))?;
    Ok(image.into_rgb8())
}

/// The sea and land cells of a reference image, column by column, plus the
/// number of pixels of any other color.
pub fn seed_cells(reference: &RgbImage, torus: Torus) -> anyhow::Result<(Vec<(Coordinate, Color)>, usize)> {
    let expected = (torus.width as u32, torus.height as u32);
    anyhow::ensure!(
        reference.dimensions() == expected,
        "image dimensions must be {}x{}, but got {}x{}",
        expected.0,
        expected.1,
        reference.width(),
        reference.height()
    );

    let mut cells = Vec::new();
    let mut ignored = 0;
    for x in 0..torus.width {
        for y in 0..torus.height {
            let [r, g, b] = reference.get_pixel(x as u32, y as u32).0;
            let color = Color::new(r, g, b);
            if color == Color::SEA || color == Color::LAND {
                cells.push((Coordinate::new(x, y), color));
            } else {
                ignored += 1;
            }
        }
    }
    Ok((cells, ignored))
}

/// Write `cells` in batches, stopping between batches once `stop` is set.
pub async fn populate<S: PixelStore>(
    store: &S,
    cells: Vec<(Coordinate, Color)>,
    batch_size: usize,
    skip_existing: bool,
    stop: &AtomicBool,
) -> anyhow::Result<PopulateStats> {
    let mut stats = PopulateStats::default();
    let total = cells.len();

    for chunk in cells.chunks(batch_size.max(1)) {
        if stop.load(Ordering::SeqCst) {
            stats.interrupted = true;
            break;
        }

        let mut batch = Vec::with_capacity(chunk.len());
        for &(coord, color) in chunk {
            if skip_existing && store.exists(coord).await? {
                stats.skipped_existing += 1;
                continue;
            }
            batch.push((coord, color));
        }

        let written = batch.len();
        store
            .set_many(batch)
            .await
            .context("write seed batch")?;
        stats.written += written;

        tracing::info!(
            "Seeded {}/{} cells ({} already present)",
            stats.written + stats.skipped_existing,
            total,
            stats.skipped_existing
        );
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MemoryStore;
    use image::Rgb;

    const MAP: Torus = Torus::new(6, 4);

    fn reference() -> RgbImage {
        RgbImage::from_fn(6, 4, |x, y| match (x, y) {
            (0, _) => Rgb(Color::SEA.rgb()),
            (5, 3) => Rgb([1, 2, 3]),
            _ => Rgb(Color::LAND.rgb()),
        })
    }

    #[test]
    fn keeps_only_sea_and_land() {
        let (cells, ignored) = seed_cells(&reference(), MAP).unwrap();
        assert_eq!(cells.len(), 23);
        assert_eq!(ignored, 1);
        assert_eq!(cells[0], (Coordinate::new(0, 0), Color::SEA));
        assert!(!cells.iter().any(|(c, _)| *c == Coordinate::new(5, 3)));
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let err = seed_cells(&RgbImage::new(5, 4), MAP).unwrap_err();
        assert!(err.to_string().contains("6x4"));
    }

    #[tokio::test]
    async fn writes_every_cell() {
        let store = MemoryStore::new();
        let (cells, _) = seed_cells(&reference(), MAP).unwrap();
        let stop = AtomicBool::new(false);

        let stats = populate(&store, cells, 5, false, &stop).await.unwrap();

        assert_eq!(stats.written, 23);
        assert!(!stats.interrupted);
        assert_eq!(store.color_at(Coordinate::new(0, 2)), Some(Color::SEA));
        assert_eq!(store.color_at(Coordinate::new(3, 1)), Some(Color::LAND));
        assert_eq!(store.color_at(Coordinate::new(5, 3)), None);
    }

    #[tokio::test]
    async fn skip_existing_keeps_painted_cells() {
        let store = MemoryStore::new();
        let red = Color::new(255, 0, 0);
        store.set(Coordinate::new(2, 2), red).await.unwrap();
        let (cells, _) = seed_cells(&reference(), MAP).unwrap();

        let stats = populate(&store, cells, 100, true, &AtomicBool::new(false))
            .await
            .unwrap();

        assert_eq!(stats.skipped_existing, 1);
        assert_eq!(stats.written, 22);
        assert_eq!(store.color_at(Coordinate::new(2, 2)), Some(red));
    }

    #[tokio::test]
    async fn stops_when_signalled() {
        let store = MemoryStore::new();
        let (cells, _) = seed_cells(&reference(), MAP).unwrap();
        let stats = populate(&store, cells, 5, false, &AtomicBool::new(true))
            .await
            .unwrap();
        assert!(stats.interrupted);
        assert!(store.is_empty());
    }
}
