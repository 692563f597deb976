use serde::{Deserialize, Serialize};

use crate::Color;

/// A grid coordinate. Only coordinates produced by [`Torus::normalize`] are
/// guaranteed to lie inside the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A colored cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    pub x: i32,
    pub y: i32,
    pub color: Color,
}

impl Pixel {
    pub const fn new(x: i32, y: i32, color: Color) -> Self {
        Self { x, y, color }
    }

    pub fn coord(&self) -> Coordinate {
        Coordinate::new(self.x, self.y)
    }
}

/// Map extent. The left/right and top/bottom edges are contiguous, so every
/// neighbor and distance computation wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Torus {
    pub width: i32,
    pub height: i32,
}

const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl Torus {
    /// Both extents must be positive.
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        (0..self.width).contains(&x) && (0..self.height).contains(&y)
    }

    pub fn normalize(&self, x: i32, y: i32) -> Coordinate {
        Coordinate::new(x.rem_euclid(self.width), y.rem_euclid(self.height))
    }

    /// Row-major index of an in-bounds coordinate.
    pub fn index(&self, coord: Coordinate) -> Option<usize> {
        self.contains(coord.x, coord.y)
            .then(|| coord.y as usize * self.width as usize + coord.x as usize)
    }

    /// The 8 surrounding cells, wrapped.
    pub fn neighbors(&self, center: Coordinate) -> impl Iterator<Item = Coordinate> + '_ {
        NEIGHBOR_OFFSETS
            .iter()
            .map(move |(dx, dy)| self.normalize(center.x + dx, center.y + dy))
    }

    /// Every cell of the disk of `radius` around `center`, using the midpoint
    /// circle walk with a horizontal span per visited scanline. Cells on the
    /// `y = 0` and `x = y` diagonals are emitted more than once.
    pub fn circle_fill(&self, center: Coordinate, radius: u32) -> Vec<Coordinate> {
        let mut cells = Vec::new();
        for (x, y) in midpoint_octant(radius as i32) {
            self.span(&mut cells, center, x, y);
            self.span(&mut cells, center, x, -y);
            self.span(&mut cells, center, y, x);
            self.span(&mut cells, center, y, -x);
        }
        cells
    }

    /// Only the boundary of the disk, eight symmetric points per step.
    pub fn circle_perimeter(&self, center: Coordinate, radius: u32) -> Vec<Coordinate> {
        let mut cells = Vec::new();
        for (x, y) in midpoint_octant(radius as i32) {
            for (px, py) in [
                (x, y),
                (-x, y),
                (x, -y),
                (-x, -y),
                (y, x),
                (-y, x),
                (y, -x),
                (-y, -x),
            ] {
                cells.push(self.normalize(center.x + px, center.y + py));
            }
        }
        cells
    }

    fn span(&self, cells: &mut Vec<Coordinate>, center: Coordinate, half_width: i32, dy: i32) {
        for dx in -half_width..=half_width {
            cells.push(self.normalize(center.x + dx, center.y + dy));
        }
    }

    /// Rasterizes a line from `start` to `end` along the shorter way around
    /// the torus on each axis. Both endpoints are included; every point but
    /// the last carries `start`'s color, the last carries `end`'s.
    pub fn shortest_path(&self, start: Pixel, end: Pixel) -> Vec<Pixel> {
        let dx = wrap_delta(end.x - start.x, self.width);
        let dy = wrap_delta(end.y - start.y, self.height);

        let (x0, y0) = (start.x, start.y);
        let (x1, y1) = (x0 + dx, y0 + dy);
        let adx = dx.abs();
        let ady = dy.abs();
        let sx = if dx >= 0 { 1 } else { -1 };
        let sy = if dy >= 0 { 1 } else { -1 };
        let mut err = adx - ady;
        let (mut x, mut y) = (x0, y0);

        let mut path = Vec::with_capacity(adx.max(ady) as usize + 1);
        loop {
            let c = self.normalize(x, y);
            if x == x1 && y == y1 {
                path.push(Pixel::new(c.x, c.y, end.color));
                break;
            }
            path.push(Pixel::new(c.x, c.y, start.color));

            let e2 = 2 * err;
            if e2 > -ady {
                err -= ady;
                x += sx;
            }
            if e2 < adx {
                err += adx;
                y += sy;
            }
        }
        path
    }
}

/// Signed offset in `(-extent/2, extent/2]` equivalent to `delta` modulo `extent`.
fn wrap_delta(delta: i32, extent: i32) -> i32 {
    let delta = delta.rem_euclid(extent);
    if delta > extent / 2 {
        delta - extent
    } else {
        delta
    }
}

/// One octant of the midpoint circle walk: `(x, y)` with `x >= y >= 0`.
fn midpoint_octant(radius: i32) -> Vec<(i32, i32)> {
    let mut steps = Vec::new();
    let (mut x, mut y) = (radius.max(0), 0);
    let mut err = 1 - x;
    while x >= y {
        steps.push((x, y));
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
    steps
}
