use crate::foundation::core::Point;

/// Ordered set of 2-D points standing for the ink mass of one picture.
///
/// Coordinates are in density-field pixels: `x` runs along columns, `y` along rows, and a point
/// sampled from pixel `(row, col)` lies inside `[col, col + 1) x [row, row + 1)`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PointCloud {
    points: Vec<Point>,
}

impl PointCloud {
    /// Wrap an ordered list of points.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Return `true` when the cloud holds no point.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Borrow the points in storage order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

impl From<Vec<Point>> for PointCloud {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}
