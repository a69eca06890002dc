use geo_traits::CoordTrait;

/// A labeled two-dimensional point stored in a [`KdTree`][crate::kdtree::KdTree].
///
/// The `id` is an opaque payload, commonly an index into the caller's own array. It is returned
/// from searches and never interpreted by the index, so it does not need to be unique.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// The x coordinate
    pub x: f64,
    /// The y coordinate
    pub y: f64,
    /// The caller-supplied identifier
    pub id: i64,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f64, y: f64, id: i64) -> Self {
        Self { x, y, id }
    }

    /// The coordinate along `axis`: 0 for x, 1 for y.
    #[inline]
    pub fn coord(&self, axis: usize) -> f64 {
        if axis == 0 {
            self.x
        } else {
            self.y
        }
    }

    /// Squared Euclidean distance from this point to `(qx, qy)`.
    #[inline]
    pub fn sq_dist(&self, qx: f64, qy: f64) -> f64 {
        sq_dist(self.x, self.y, qx, qy)
    }
}

impl From<(f64, f64, i64)> for Point {
    fn from((x, y, id): (f64, f64, i64)) -> Self {
        Self::new(x, y, id)
    }
}

impl CoordTrait for Point {
    type T = f64;

    fn dim(&self) -> geo_traits::Dimensions {
        geo_traits::Dimensions::Xy
    }

    fn x(&self) -> Self::T {
        self.x
    }

    fn y(&self) -> Self::T {
        self.y
    }

    fn nth_or_panic(&self, n: usize) -> Self::T {
        match n {
            0 => self.x,
            1 => self.y,
            _ => panic!("Invalid index of coord"),
        }
    }
}

#[inline]
pub(crate) fn sq_dist(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let dx = ax - bx;
    let dy = ay - by;
    dx * dx + dy * dy
}
