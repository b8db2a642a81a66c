//! Facial contours defined as closed loops of landmark indices.
//!
//! Contours are static configuration. A contour root directory holds one
//! index file per primary boundary and, optionally, a directory of chunk
//! boundaries per primary:
//!
//! ```text
//! contours/
//!   consistent/outer.txt
//!   consistent/custom.txt
//!   inconsistent/custom/brow.txt
//!   inconsistent/custom/lip.txt
//! ```
//!
//! Index files hold one integer per line; blank lines and `#` comments are
//! skipped.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ImageSize, Landmarks, Pixel, Point};

pub const CONSISTENT_DIR: &str = "consistent";
pub const INCONSISTENT_DIR: &str = "inconsistent";

/// Names of the primary boundaries shipped with the contour table.
pub const BOUNDARY_NAMES: [&str; 4] = ["outer", "middle", "inner", "custom"];

/// A named closed loop of landmark indices.
///
/// Edges join consecutive indices and wrap from last to first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    name: String,
    indices: Vec<usize>,
}

impl Boundary {
    /// Create a boundary, checking that it forms a valid loop.
    pub fn new(name: impl Into<String>, indices: Vec<usize>) -> Result<Self> {
        let name = name.into();
        if indices.len() < 3 {
            return Err(Error::InvalidBoundary {
                name,
                reason: format!("needs at least 3 indices, found {}", indices.len()),
            });
        }
        let n = indices.len();
        for i in 0..n {
            let j = (i + 1) % n;
            if indices[i] == indices[j] {
                return Err(Error::InvalidBoundary {
                    name,
                    reason: format!(
                        "index {} repeats at consecutive positions {} and {}",
                        indices[i], i, j
                    ),
                });
            }
        }
        Ok(Self { name, indices })
    }

    /// Read a boundary from an index file. The name is the file stem.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let indices = read_index_file(path)?;
        Self::new(name, indices)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Resolve the loop to a pixel-space polygon using detected landmarks.
    pub fn to_polygon(&self, landmarks: &Landmarks, size: ImageSize) -> Result<Vec<Point>> {
        self.indices
            .iter()
            .map(|&index| {
                landmarks
                    .pixel_position(index, size)
                    .ok_or_else(|| Error::IndexOutOfRange {
                        boundary: self.name.clone(),
                        index,
                        len: landmarks.len(),
                    })
            })
            .collect()
    }
}

/// A primary boundary with chunk boundaries carved out of its region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundarySet {
    pub primary: Boundary,
    pub chunks: Vec<Boundary>,
}

impl BoundarySet {
    pub fn new(primary: Boundary, chunks: Vec<Boundary>) -> Self {
        Self { primary, chunks }
    }

    pub fn single(primary: Boundary) -> Self {
        Self::new(primary, Vec::new())
    }

    pub fn name(&self) -> &str {
        self.primary.name()
    }
}

/// A region outline in one of the forms the pipeline accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryShape {
    /// Ordered polygon vertices in pixel space.
    Polygon(Vec<Point>),
    /// Unordered outline pixels, such as a traced contour.
    RawPointSet(Vec<Pixel>),
}

impl BoundaryShape {
    /// Normalize to an ordered polygon.
    ///
    /// Raw point sets are deduplicated and ordered by angle around their
    /// centroid, which recovers the outline of any star-shaped region.
    pub fn into_polygon(self) -> Vec<Point> {
        match self {
            BoundaryShape::Polygon(points) => points,
            BoundaryShape::RawPointSet(mut pixels) => {
                pixels.sort_unstable();
                pixels.dedup();
                if pixels.is_empty() {
                    return Vec::new();
                }
                let n = pixels.len() as f64;
                let (sx, sy) = pixels
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
                let center = Point::new(sx / n, sy / n);

                let mut points: Vec<Point> = pixels
                    .into_iter()
                    .map(|p| Point::new(p.x as f64, p.y as f64))
                    .collect();
                points.sort_by(|a, b| {
                    let ka = (a.y - center.y).atan2(a.x - center.x);
                    let kb = (b.y - center.y).atan2(b.x - center.x);
                    ka.total_cmp(&kb)
                        .then_with(|| a.distance_squared(&center).total_cmp(&b.distance_squared(&center)))
                });
                points
            }
        }
    }
}

/// Read one integer per line from an index file.
pub fn read_index_file<P: AsRef<Path>>(path: P) -> Result<Vec<usize>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut indices = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let index = line.parse::<usize>().map_err(|_| Error::InvalidBoundary {
            name: path.display().to_string(),
            reason: format!("line {}: '{}' is not a vertex index", i + 1, line),
        })?;
        indices.push(index);
    }
    Ok(indices)
}

/// The on-disk table of named contours.
#[derive(Debug, Clone)]
pub struct ContourTable {
    root: PathBuf,
}

impl ContourTable {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the primary boundary called `name`.
    pub fn boundary(&self, name: &str) -> Result<Boundary> {
        let path = self.root.join(CONSISTENT_DIR).join(format!("{}.txt", name));
        if !path.exists() {
            return Err(Error::InvalidBoundary {
                name: name.to_string(),
                reason: format!("no contour file at {}", path.display()),
            });
        }
        Boundary::load(path)
    }

    /// Load every chunk boundary grouped under `name`, in file-name order.
    ///
    /// A missing chunk directory means the boundary has no chunks.
    pub fn chunks(&self, name: &str) -> Result<Vec<Boundary>> {
        let dir = self.root.join(INCONSISTENT_DIR).join(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "txt") {
                paths.push(path);
            }
        }
        paths.sort();

        paths.iter().map(Boundary::load).collect()
    }

    /// Build the boundary set for `name`, with its chunks when requested.
    pub fn boundary_set(&self, name: &str, with_chunks: bool) -> Result<BoundarySet> {
        let primary = self.boundary(name)?;
        let chunks = if with_chunks {
            self.chunks(name)?
        } else {
            Vec::new()
        };
        debug!(
            boundary = name,
            indices = primary.len(),
            chunks = chunks.len(),
            "loaded boundary set"
        );
        Ok(BoundarySet::new(primary, chunks))
    }
}
