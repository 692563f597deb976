use common::{Color, Coordinate, Pixel, Torus};

/// Read access to cell colors for validation.
///
/// `color_at` returns `None` for cells that are not tracked, which for a fully
/// loaded snapshot means off the map.
pub trait CellView {
    fn torus(&self) -> Torus;
    fn color_at(&self, coord: Coordinate) -> Option<Color>;
}

/// Why a placement was refused. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("pixel {x}:{y} is outside the map")]
    OutOfBounds { x: i32, y: i32 },

    #[error("cannot paint or unpaint sea")]
    SeaImmutable,

    #[error("color unchanged")]
    ColorUnchanged,

    #[error("must be adjacent to an existing pixel of the same color")]
    NoAdjacency,

    #[error("no pixel of the same color within {range} of the coast")]
    SeaRangeExceeded { range: u32 },

    #[error("neighbor state unavailable")]
    NeighborUnavailable,
}

impl Rejection {
    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfBounds { .. } => "out-of-bounds",
            Self::SeaImmutable => "sea-immutable",
            Self::ColorUnchanged => "color-unchanged",
            Self::NoAdjacency => "no-adjacency",
            Self::SeaRangeExceeded { .. } => "sea-range-exceeded",
            Self::NeighborUnavailable => "neighbor-unavailable",
        }
    }
}

/// Decide whether `pixel` may be painted on `view`.
///
/// Checks run cheapest first; the disk scan over `sea_range` only happens when
/// the target borders open sea and no neighbor already has the color.
pub fn validate(view: &impl CellView, sea_range: u32, pixel: &Pixel) -> Result<(), Rejection> {
    let torus = view.torus();
    let target = pixel.coord();
    let out_of_bounds = Rejection::OutOfBounds {
        x: pixel.x,
        y: pixel.y,
    };
    if !torus.contains(target.x, target.y) {
        return Err(out_of_bounds);
    }
    let current = view.color_at(target).ok_or(out_of_bounds)?;

    if current.is_sea() || pixel.color.is_sea() {
        return Err(Rejection::SeaImmutable);
    }
    if current == pixel.color {
        return Err(Rejection::ColorUnchanged);
    }

    let mut resolved = 0;
    let mut borders_sea = false;
    let mut beachhead: Option<bool> = None;
    for neighbor in torus.neighbors(target) {
        let Some(color) = view.color_at(neighbor) else {
            continue;
        };
        resolved += 1;
        if color == pixel.color {
            return Ok(());
        }
        if color.is_sea() {
            borders_sea = true;
            let found = *beachhead.get_or_insert_with(|| has_claim_within(view, target, sea_range, pixel.color));
            if found {
                return Ok(());
            }
        }
    }

    Err(if resolved == 0 {
        Rejection::NeighborUnavailable
    } else if borders_sea {
        Rejection::SeaRangeExceeded { range: sea_range }
    } else {
        Rejection::NoAdjacency
    })
}

fn has_claim_within(view: &impl CellView, center: Coordinate, range: u32, color: Color) -> bool {
    view.torus()
        .circle_fill(center, range)
        .into_iter()
        .any(|c| c != center && view.color_at(c) == Some(color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use std::collections::HashMap;

    const MAP: Torus = Torus::new(64, 32);
    const RED: Color = Color::new(220, 30, 30);
    const BLUE: Color = Color::new(30, 30, 220);

    fn land() -> Snapshot {
        Snapshot::filled(MAP, Color::LAND)
    }

    fn paint(snapshot: &mut Snapshot, x: i32, y: i32, color: Color) {
        snapshot.set(Coordinate::new(x, y), color);
    }

    #[test]
    fn contiguous_growth_scenario() {
        let mut snapshot = land();
        paint(&mut snapshot, 5, 5, RED);

        assert_eq!(validate(&snapshot, 4, &Pixel::new(5, 6, RED)), Ok(()));
        assert_eq!(validate(&snapshot, 4, &Pixel::new(6, 6, RED)), Ok(()));
        assert_eq!(
            validate(&snapshot, 4, &Pixel::new(5, 8, BLUE)),
            Err(Rejection::NoAdjacency)
        );
        assert_eq!(
            validate(&snapshot, 4, &Pixel::new(5, 7, RED)),
            Err(Rejection::NoAdjacency)
        );
        assert_eq!(
            validate(&snapshot, 4, &Pixel::new(5, 5, RED)),
            Err(Rejection::ColorUnchanged)
        );
    }

    #[test]
    fn land_color_grows_into_claims() {
        let mut snapshot = land();
        paint(&mut snapshot, 5, 5, RED);
        assert_eq!(validate(&snapshot, 4, &Pixel::new(5, 5, Color::LAND)), Ok(()));
    }

    #[test]
    fn sea_is_immutable() {
        let mut snapshot = land();
        paint(&mut snapshot, 10, 10, Color::SEA);
        paint(&mut snapshot, 11, 10, RED);
        assert_eq!(
            validate(&snapshot, 4, &Pixel::new(10, 10, RED)),
            Err(Rejection::SeaImmutable)
        );
        assert_eq!(
            validate(&snapshot, 4, &Pixel::new(11, 10, Color::SEA)),
            Err(Rejection::SeaImmutable)
        );
    }

    #[test]
    fn out_of_bounds() {
        let snapshot = land();
        for (x, y) in [(-1, 0), (0, -1), (64, 0), (0, 32)] {
            assert_eq!(
                validate(&snapshot, 4, &Pixel::new(x, y, RED)),
                Err(Rejection::OutOfBounds { x, y })
            );
        }
    }

    #[test]
    fn adjacency_wraps_around_edges() {
        let mut snapshot = land();
        paint(&mut snapshot, 63, 31, RED);
        assert_eq!(validate(&snapshot, 0, &Pixel::new(0, 0, RED)), Ok(()));
    }

    #[test]
    fn sea_range_boundary() {
        let range = 4;
        let target = Pixel::new(20, 10, RED);

        let mut within = land();
        paint(&mut within, 20, 9, Color::SEA);
        paint(&mut within, 20 + range as i32, 10, RED);
        assert_eq!(validate(&within, range, &target), Ok(()));

        let mut beyond = land();
        paint(&mut beyond, 20, 9, Color::SEA);
        paint(&mut beyond, 21 + range as i32, 10, RED);
        assert_eq!(
            validate(&beyond, range, &target),
            Err(Rejection::SeaRangeExceeded { range })
        );
    }

    #[test]
    fn sea_range_wraps() {
        let mut snapshot = land();
        paint(&mut snapshot, 1, 0, Color::SEA);
        paint(&mut snapshot, 0, 29, RED);
        assert_eq!(validate(&snapshot, 3, &Pixel::new(0, 0, RED)), Ok(()));
    }

    #[test]
    fn rejection_is_stable() {
        let mut snapshot = land();
        paint(&mut snapshot, 30, 15, Color::SEA);
        let before = snapshot.clone();
        let attempt = Pixel::new(30, 16, BLUE);
        let first = validate(&snapshot, 4, &attempt);
        let second = validate(&snapshot, 4, &attempt);
        assert_eq!(first, Err(Rejection::SeaRangeExceeded { range: 4 }));
        assert_eq!(first, second);
        assert_eq!(snapshot, before);
    }

    struct Partial(HashMap<Coordinate, Color>);

    impl CellView for Partial {
        fn torus(&self) -> Torus {
            MAP
        }

        fn color_at(&self, coord: Coordinate) -> Option<Color> {
            self.0.get(&coord).copied()
        }
    }

    #[test]
    fn unresolved_neighbors() {
        let view = Partial(HashMap::from([(Coordinate::new(8, 8), Color::LAND)]));
        assert_eq!(
            validate(&view, 4, &Pixel::new(8, 8, RED)),
            Err(Rejection::NeighborUnavailable)
        );
        assert_eq!(
            validate(&view, 4, &Pixel::new(9, 9, RED)),
            Err(Rejection::OutOfBounds { x: 9, y: 9 })
        );
    }

    #[test]
    fn codes() {
        assert_eq!(Rejection::NoAdjacency.code(), "no-adjacency");
        assert_eq!(Rejection::SeaRangeExceeded { range: 1 }.code(), "sea-range-exceeded");
        assert_eq!(Rejection::ColorUnchanged.to_string(), "color unchanged");
    }
}
