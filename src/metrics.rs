//! Region statistics for an extraction run.
//!
//! Areas are in square pixels; ratios are percentages.

use serde::Serialize;

use crate::types::Point;

/// Sizes of the extracted region at each stage of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionMetrics {
    /// Area enclosed by the primary boundary polygon.
    pub boundary_area: f64,

    /// Pixels inside the final mask (after chunk subtraction).
    pub mask_pixels: usize,

    /// Total pixels in the photograph.
    pub image_pixels: usize,

    pub texcoords_total: usize,
    pub texcoords_retained: usize,

    pub faces_total: usize,
    pub faces_kept: usize,

    /// Mesh lines skipped while parsing.
    pub malformed_lines: usize,
}

impl RegionMetrics {
    /// Mask as percentage of the photograph
    pub fn mask_of_image_ratio(&self) -> f64 {
        ratio(self.mask_pixels as f64, self.image_pixels as f64)
    }

    /// Mask pixels relative to the polygon's continuous area.
    ///
    /// Close to 100 for a plain boundary; lower when chunks were removed.
    pub fn fill_ratio(&self) -> f64 {
        ratio(self.mask_pixels as f64, self.boundary_area)
    }

    /// Retained texture coordinates as percentage of all texture coordinates
    pub fn retained_ratio(&self) -> f64 {
        ratio(self.texcoords_retained as f64, self.texcoords_total as f64)
    }

    /// Kept faces as percentage of all faces
    pub fn face_retention_ratio(&self) -> f64 {
        ratio(self.faces_kept as f64, self.faces_total as f64)
    }

    pub fn faces_dropped(&self) -> usize {
        self.faces_total - self.faces_kept
    }
}

/// Calculate the area of a polygon using the shoelace formula.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let mut area = 0.0;
    let n = points.len();

    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }

    (area / 2.0).abs()
}

/// Calculate percentage ratio, handling division by zero.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        (numerator / denominator) * 100.0
    } else {
        0.0
    }
}
