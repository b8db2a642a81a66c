//! Texture-coordinate membership against a raster mask.

use std::collections::BTreeSet;

use tracing::debug;

use crate::raster::RasterMask;
use crate::types::Point;

/// Indices of texture coordinates that land inside the mask, ascending.
pub type RetainedSet = BTreeSet<usize>;

/// Classify every texture coordinate against `mask`.
///
/// Each `(u, v)` is scaled by the mask's pixel dimensions and rounded to the
/// nearest pixel, halves away from zero. Coordinates that round outside the
/// image are excluded.
pub fn classify_texcoords(mask: &RasterMask, texcoords: &[Point]) -> RetainedSet {
    let size = mask.size();
    let retained: RetainedSet = texcoords
        .iter()
        .enumerate()
        .filter_map(|(idx, uv)| {
            let pixel = size.nearest_pixel(*uv)?;
            mask.contains(pixel).then_some(idx)
        })
        .collect();

    debug!(
        total = texcoords.len(),
        retained = retained.len(),
        "classified texture coordinates"
    );
    retained
}
