//! Polygon rasterization into per-pixel membership masks.
//!
//! A pixel `(col, row)` samples the lattice point `(col, row)`. It belongs to
//! the region when that point lies strictly inside the polygon under the
//! even-odd rule, or on one of its edges. Edge points are always inside.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::boundary::{Boundary, BoundarySet};
use crate::error::{Error, Result};
use crate::types::{ImageSize, Landmarks, Pixel, Point};

/// Tolerance for treating a lattice point as lying on an edge.
const EDGE_EPSILON: f64 = 1e-9;

/// Marker values written into a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskValues {
    pub inside: u8,
    pub outside: u8,
}

impl Default for MaskValues {
    fn default() -> Self {
        Self {
            inside: 255,
            outside: 0,
        }
    }
}

/// A per-pixel membership grid matching the photograph's dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMask {
    data: Vec<u8>,
    size: ImageSize,
    values: MaskValues,
}

impl RasterMask {
    /// An all-outside mask.
    pub fn new(size: ImageSize, values: MaskValues) -> Self {
        Self {
            data: vec![values.outside; size.pixel_count()],
            size,
            values,
        }
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn values(&self) -> MaskValues {
        self.values
    }

    /// Raw marker value at `(x, y)`. Out-of-bounds pixels read as outside.
    pub fn get(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.size.width as i64 || y >= self.size.height as i64 {
            return self.values.outside;
        }
        self.data[y as usize * self.size.width as usize + x as usize]
    }

    pub fn contains(&self, pixel: Pixel) -> bool {
        self.get(pixel.x as i64, pixel.y as i64) == self.values.inside
    }

    fn set(&mut self, x: u32, y: u32, inside: bool) {
        let idx = y as usize * self.size.width as usize + x as usize;
        self.data[idx] = if inside {
            self.values.inside
        } else {
            self.values.outside
        };
    }

    pub fn count_inside(&self) -> usize {
        self.data.iter().filter(|&&v| v == self.values.inside).count()
    }

    /// Set every pixel that is inside `other` to outside.
    pub fn subtract(&mut self, other: &RasterMask) -> Result<()> {
        if other.size != self.size {
            return Err(Error::MeshMismatch(format!(
                "cannot subtract a {}x{} mask from a {}x{} mask",
                other.size.width, other.size.height, self.size.width, self.size.height
            )));
        }
        let outside = self.values.outside;
        for (dst, &src) in self.data.iter_mut().zip(&other.data) {
            if src == other.values.inside {
                *dst = outside;
            }
        }
        Ok(())
    }

    /// Scan-fill a closed polygon given in pixel coordinates.
    pub fn fill_polygon(&mut self, polygon: &[Point]) {
        if polygon.len() < 3 || self.size.width == 0 || self.size.height == 0 {
            return;
        }

        let max_col = self.size.width as i64 - 1;
        let max_row = self.size.height as i64 - 1;
        let min_y = polygon.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = polygon.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        let row_start = ((min_y - EDGE_EPSILON).ceil() as i64).max(0);
        let row_end = ((max_y + EDGE_EPSILON).floor() as i64).min(max_row);

        let n = polygon.len();
        let mut crossings = Vec::with_capacity(n);

        for row in row_start..=row_end {
            let y = row as f64;
            crossings.clear();

            for i in 0..n {
                let a = polygon[i];
                let b = polygon[(i + 1) % n];

                // Edge points, including whole horizontal edges.
                if (a.y - b.y).abs() <= EDGE_EPSILON {
                    if (a.y - y).abs() <= EDGE_EPSILON {
                        self.fill_span(row, a.x.min(b.x), a.x.max(b.x), max_col);
                    }
                } else if y >= a.y.min(b.y) - EDGE_EPSILON && y <= a.y.max(b.y) + EDGE_EPSILON {
                    let x = a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y);
                    let col = x.round();
                    if (x - col).abs() <= EDGE_EPSILON {
                        self.fill_span(row, col, col, max_col);
                    }
                }

                // Half-open crossing rule so shared vertices count once.
                if (a.y <= y && y < b.y) || (b.y <= y && y < a.y) {
                    crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }

            crossings.sort_by(|a, b| a.total_cmp(b));
            for pair in crossings.chunks_exact(2) {
                self.fill_span(row, pair[0], pair[1], max_col);
            }
        }
    }

    /// Mark the lattice columns within `[x0, x1]` on `row`, clipped to the image.
    fn fill_span(&mut self, row: i64, x0: f64, x1: f64, max_col: i64) {
        let start = ((x0 - EDGE_EPSILON).ceil() as i64).max(0);
        let end = ((x1 + EDGE_EPSILON).floor() as i64).min(max_col);
        for col in start..=end {
            self.set(col as u32, row as u32, true);
        }
    }

    /// Pixels inside the region, in row-major order.
    pub fn inside_pixels(&self) -> Vec<Pixel> {
        let w = self.size.width as usize;
        self.data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == self.values.inside)
            .map(|(i, _)| Pixel::new((i % w) as u32, (i / w) as u32))
            .collect()
    }
}

/// Rasterize a pixel-space polygon into a fresh mask.
pub fn rasterize_polygon(polygon: &[Point], size: ImageSize, values: MaskValues) -> RasterMask {
    let mut mask = RasterMask::new(size, values);
    mask.fill_polygon(polygon);
    mask
}

/// Rasterize a named region: a primary polygon minus chunk polygons.
///
/// Fails with `EmptyRegion` when the primary polygon covers no pixel or the
/// chunks remove every pixel.
pub fn rasterize_region(
    name: &str,
    primary: &[Point],
    chunks: &[Vec<Point>],
    size: ImageSize,
    values: MaskValues,
) -> Result<RasterMask> {
    let clipped = primary.iter().any(|p| {
        p.x < 0.0 || p.y < 0.0 || p.x > size.width as f64 || p.y > size.height as f64
    });
    if clipped {
        warn!(boundary = name, "boundary extends past the image and was clipped");
    }

    let mut mask = rasterize_polygon(primary, size, values);
    let inside = mask.count_inside();
    debug!(boundary = name, inside, "rasterized boundary");
    if inside == 0 {
        return Err(Error::EmptyRegion(name.to_string()));
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let chunk_mask = rasterize_polygon(chunk, size, values);
        mask.subtract(&chunk_mask)?;
        debug!(boundary = name, chunk = i, remaining = mask.count_inside(), "subtracted chunk");
    }
    if !chunks.is_empty() && mask.count_inside() == 0 {
        return Err(Error::EmptyRegion(name.to_string()));
    }
    Ok(mask)
}

/// Rasterize one boundary against detected landmarks.
///
/// Fails with `IndexOutOfRange` when the boundary references a missing
/// landmark and with `EmptyRegion` when the polygon covers no pixel.
pub fn rasterize_boundary(
    boundary: &Boundary,
    landmarks: &Landmarks,
    size: ImageSize,
    values: MaskValues,
) -> Result<RasterMask> {
    let polygon = boundary.to_polygon(landmarks, size)?;
    rasterize_region(boundary.name(), &polygon, &[], size, values)
}

/// Rasterize a composite region: the primary boundary minus every chunk.
pub fn rasterize_set(
    set: &BoundarySet,
    landmarks: &Landmarks,
    size: ImageSize,
    values: MaskValues,
) -> Result<RasterMask> {
    let primary = set.primary.to_polygon(landmarks, size)?;
    let chunks = set
        .chunks
        .iter()
        .map(|c| c.to_polygon(landmarks, size))
        .collect::<Result<Vec<_>>>()?;
    rasterize_region(set.name(), &primary, &chunks, size, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Landmark;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    #[test]
    fn unit_square_includes_its_corners() {
        let mask = rasterize_polygon(&square(1.0, 1.0, 2.0, 2.0), ImageSize::new(4, 4), MaskValues::default());
        assert_eq!(
            mask.inside_pixels(),
            vec![Pixel::new(1, 1), Pixel::new(2, 1), Pixel::new(1, 2), Pixel::new(2, 2)]
        );
    }

    #[test]
    fn filled_square_counts_lattice_points() {
        let mask = rasterize_polygon(&square(2.0, 3.0, 7.0, 5.0), ImageSize::new(10, 10), MaskValues::default());
        // 6 columns x 3 rows of lattice points, edges inclusive.
        assert_eq!(mask.count_inside(), 18);
        assert!(mask.contains(Pixel::new(2, 3)));
        assert!(mask.contains(Pixel::new(7, 5)));
        assert!(!mask.contains(Pixel::new(8, 5)));
        assert!(!mask.contains(Pixel::new(4, 6)));
    }

    #[test]
    fn triangle_edges_are_inclusive() {
        let tri = vec![Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(0.0, 4.0)];
        let mask = rasterize_polygon(&tri, ImageSize::new(6, 6), MaskValues::default());
        // Hypotenuse lattice points x + y == 4 are on the edge.
        assert!(mask.contains(Pixel::new(2, 2)));
        assert!(mask.contains(Pixel::new(1, 3)));
        assert!(mask.contains(Pixel::new(0, 4)));
        assert!(!mask.contains(Pixel::new(3, 2)));
        // 5 + 4 + 3 + 2 + 1 lattice points
        assert_eq!(mask.count_inside(), 15);
    }

    #[test]
    fn concave_polygon_leaves_notch_empty() {
        // A "U" shape open at the top between x=2 and x=4.
        let u = vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 3.0),
            Point::new(4.0, 3.0),
            Point::new(4.0, 0.0),
            Point::new(6.0, 0.0),
            Point::new(6.0, 5.0),
            Point::new(0.0, 5.0),
        ];
        let mask = rasterize_polygon(&u, ImageSize::new(8, 8), MaskValues::default());
        assert!(mask.contains(Pixel::new(1, 1)));
        assert!(mask.contains(Pixel::new(5, 1)));
        assert!(!mask.contains(Pixel::new(3, 1)));
        assert!(mask.contains(Pixel::new(3, 3)));
        assert!(mask.contains(Pixel::new(3, 4)));
    }

    #[test]
    fn polygon_is_clipped_to_image() {
        let mask = rasterize_polygon(&square(-5.0, -5.0, 20.0, 20.0), ImageSize::new(3, 2), MaskValues::default());
        assert_eq!(mask.count_inside(), 6);
    }

    #[test]
    fn custom_mask_values_are_respected() {
        let values = MaskValues { inside: 7, outside: 3 };
        let mask = rasterize_polygon(&square(0.0, 0.0, 1.0, 1.0), ImageSize::new(3, 3), values);
        assert_eq!(mask.get(0, 0), 7);
        assert_eq!(mask.get(2, 2), 3);
        assert_eq!(mask.get(-1, 0), 3);
        assert_eq!(mask.count_inside(), 4);
    }

    #[test]
    fn degenerate_boundary_is_an_empty_region() {
        // Collinear points strictly between lattice rows.
        let landmarks = Landmarks::new(vec![
            Landmark::new(0.11, 0.15, 0.0),
            Landmark::new(0.51, 0.15, 0.0),
            Landmark::new(0.81, 0.15, 0.0),
        ]);
        let b = Boundary::new("flat", vec![0, 1, 2]).unwrap();
        let err = rasterize_boundary(&b, &landmarks, ImageSize::new(10, 10), MaskValues::default())
            .unwrap_err();
        assert!(matches!(err, Error::EmptyRegion(name) if name == "flat"));
    }

    #[test]
    fn chunks_are_subtracted() {
        let landmarks = Landmarks::new(vec![
            Landmark::new(0.0, 0.0, 0.0),
            Landmark::new(0.9, 0.0, 0.0),
            Landmark::new(0.9, 0.9, 0.0),
            Landmark::new(0.0, 0.9, 0.0),
            Landmark::new(0.0, 0.0, 0.0),
            Landmark::new(0.4, 0.0, 0.0),
            Landmark::new(0.4, 0.9, 0.0),
            Landmark::new(0.0, 0.9, 0.0),
        ]);
        let size = ImageSize::new(10, 10);
        let primary = Boundary::new("outer", vec![0, 1, 2, 3]).unwrap();
        let chunk = Boundary::new("left", vec![4, 5, 6, 7]).unwrap();

        let whole = rasterize_boundary(&primary, &landmarks, size, MaskValues::default()).unwrap();
        assert_eq!(whole.count_inside(), 100);

        let set = BoundarySet::new(primary, vec![chunk]);
        let carved = rasterize_set(&set, &landmarks, size, MaskValues::default()).unwrap();
        // Columns 0..=4 removed, 5..=9 remain.
        assert_eq!(carved.count_inside(), 50);
        assert!(!carved.contains(Pixel::new(4, 4)));
        assert!(carved.contains(Pixel::new(5, 4)));
    }

    #[test]
    fn fully_carved_region_is_empty() {
        let landmarks = Landmarks::new(vec![
            Landmark::new(0.2, 0.2, 0.0),
            Landmark::new(0.5, 0.2, 0.0),
            Landmark::new(0.5, 0.5, 0.0),
            Landmark::new(0.2, 0.5, 0.0),
        ]);
        let b = Boundary::new("inner", vec![0, 1, 2, 3]).unwrap();
        let set = BoundarySet::new(b.clone(), vec![b]);
        let err = rasterize_set(&set, &landmarks, ImageSize::new(10, 10), MaskValues::default())
            .unwrap_err();
        assert!(matches!(err, Error::EmptyRegion(_)));
    }
}
