//! Correspondence between semantic face points and mesh vertices.
//!
//! Each anchor names a landmark (nose tip, eye corners, ...). Its marker
//! position in the photograph is converted to texture space and matched to
//! the nearest texture coordinate; the vertex sharing that index gives the
//! 3D position. Boundary filtering plays no part here.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use image::RgbImage;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mesh::Vertex;
use crate::types::{ImageSize, Landmarks, Pixel, Point, Point3};

const KMEANS_MAX_ITERATIONS: usize = 100;

/// A named landmark used as a measurement anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor {
    pub name: String,
    pub landmark: usize,
}

impl Anchor {
    pub fn new(name: impl Into<String>, landmark: usize) -> Self {
        Self {
            name: name.into(),
            landmark,
        }
    }
}

/// Nose tip and inner eye corners of the face-mesh topology.
pub fn default_keypoints() -> Vec<Anchor> {
    vec![
        Anchor::new("nosetip", 1),
        Anchor::new("left_eye", 173),
        Anchor::new("right_eye", 398),
    ]
}

/// Read `name index` pairs, one per line.
pub fn load_anchors<P: AsRef<Path>>(path: P) -> Result<Vec<Anchor>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut anchors = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid = |reason: String| Error::InvalidPointFile {
            path: path.to_path_buf(),
            line: i + 1,
            reason,
        };
        let mut parts = line.split_whitespace();
        let (Some(name), Some(index), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid(format!("expected 'name index', found '{}'", line)));
        };
        let landmark = index
            .parse::<usize>()
            .map_err(|_| invalid(format!("'{}' is not a landmark index", index)))?;
        anchors.push(Anchor::new(name, landmark));
    }
    Ok(anchors)
}

/// Where marker positions come from.
#[derive(Debug, Clone, Copy)]
pub enum MarkerSource<'a> {
    /// Use each anchor's landmark position directly.
    Direct,
    /// Find markers drawn in `color` on a rendered copy of the photograph.
    Rendered { image: &'a RgbImage, color: [u8; 3] },
}

/// A resolved anchor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeypointRecord {
    pub name: String,
    pub landmark: usize,
    pub texture_index: usize,
    pub uv: Point,
    pub position: Point3,
}

/// Index of the point nearest `target`; ties go to the lowest index.
pub fn nearest_index(points: &[Point], target: Point) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in points.iter().enumerate() {
        let d = p.distance_squared(&target);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the 3D point nearest `target`; ties go to the lowest index.
pub fn nearest_index_3d<I>(points: I, target: Point3) -> Option<usize>
where
    I: IntoIterator<Item = Point3>,
{
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in points.into_iter().enumerate() {
        let d = p.distance_squared(&target);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

fn anchor_pixel(anchor: &Anchor, landmarks: &Landmarks, size: ImageSize) -> Result<Point> {
    landmarks
        .pixel_position(anchor.landmark, size)
        .ok_or_else(|| Error::IndexOutOfRange {
            boundary: anchor.name.clone(),
            index: anchor.landmark,
            len: landmarks.len(),
        })
}

/// Marker centroids in pixel space, one per anchor, in anchor order.
pub fn marker_centroids(
    anchors: &[Anchor],
    landmarks: &Landmarks,
    size: ImageSize,
    source: MarkerSource<'_>,
) -> Result<Vec<Point>> {
    let expected: Vec<Point> = anchors
        .iter()
        .map(|a| anchor_pixel(a, landmarks, size))
        .collect::<Result<_>>()?;

    match source {
        MarkerSource::Direct => Ok(expected),
        MarkerSource::Rendered { image, color } => {
            if image.width() != size.width || image.height() != size.height {
                return Err(Error::MeshMismatch(format!(
                    "marker image is {}x{}, photograph is {}x{}",
                    image.width(),
                    image.height(),
                    size.width,
                    size.height
                )));
            }
            let pixels = colored_pixels(image, color);
            if pixels.len() < anchors.len() {
                return Err(Error::DetectionFailure(format!(
                    "{} marker pixels of colour {:?} for {} anchors",
                    pixels.len(),
                    color,
                    anchors.len()
                )));
            }

            let components = connected_components(&pixels, size);
            let centroids: Vec<Point> = if components.len() == anchors.len() {
                components.iter().map(|c| centroid(c)).collect()
            } else {
                debug!(
                    components = components.len(),
                    anchors = anchors.len(),
                    "markers overlap, clustering with k-means"
                );
                kmeans(&pixels, anchors.len())
            };
            // Markers are located to the nearest whole pixel.
            let centroids: Vec<Point> = centroids
                .into_iter()
                .map(|c| Point::new(c.x.round(), c.y.round()))
                .collect();
            Ok(assign_to_anchors(&centroids, &expected))
        }
    }
}

/// Resolve anchors to texture indices and 3D positions.
pub fn resolve_keypoints(
    anchors: &[Anchor],
    landmarks: &Landmarks,
    size: ImageSize,
    source: MarkerSource<'_>,
    texcoords: &[Point],
    vertices: &[Vertex],
) -> Result<Vec<KeypointRecord>> {
    if texcoords.is_empty() {
        return Err(Error::MeshMismatch("mesh has no texture coordinates".into()));
    }
    let centroids = marker_centroids(anchors, landmarks, size, source)?;

    anchors
        .iter()
        .zip(centroids)
        .map(|(anchor, centroid)| {
            let uv = size.normalize_point(centroid);
            let texture_index = nearest_index(texcoords, uv)
                .ok_or_else(|| Error::MeshMismatch("mesh has no texture coordinates".into()))?;
            let vertex = vertices.get(texture_index).ok_or_else(|| {
                Error::MeshMismatch(format!(
                    "texture index {} has no paired vertex ({} vertices)",
                    texture_index,
                    vertices.len()
                ))
            })?;
            debug!(anchor = %anchor.name, texture_index, "resolved keypoint");
            Ok(KeypointRecord {
                name: anchor.name.clone(),
                landmark: anchor.landmark,
                texture_index,
                uv,
                position: vertex.position,
            })
        })
        .collect()
}

/// Pixels exactly matching `color`, in row-major order.
fn colored_pixels(image: &RgbImage, color: [u8; 3]) -> Vec<Pixel> {
    image
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0 == color)
        .map(|(x, y, _)| Pixel::new(x, y))
        .collect()
}

/// 8-connected components, ordered by their first pixel in row-major order.
fn connected_components(pixels: &[Pixel], size: ImageSize) -> Vec<Vec<Pixel>> {
    let w = size.width as usize;
    let mut label: Vec<Option<usize>> = vec![None; size.pixel_count()];
    let mut member = vec![false; size.pixel_count()];
    for p in pixels {
        member[p.y as usize * w + p.x as usize] = true;
    }

    let mut components = Vec::new();
    let mut queue = VecDeque::new();
    for &start in pixels {
        let start_idx = start.y as usize * w + start.x as usize;
        if label[start_idx].is_some() {
            continue;
        }
        let id = components.len();
        let mut component = Vec::new();
        label[start_idx] = Some(id);
        queue.push_back(start);

        while let Some(p) = queue.pop_front() {
            component.push(p);
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = p.x as i64 + dx;
                    let ny = p.y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= size.width as i64 || ny >= size.height as i64 {
                        continue;
                    }
                    let idx = ny as usize * w + nx as usize;
                    if member[idx] && label[idx].is_none() {
                        label[idx] = Some(id);
                        queue.push_back(Pixel::new(nx as u32, ny as u32));
                    }
                }
            }
        }
        components.push(component);
    }
    components
}

fn centroid(pixels: &[Pixel]) -> Point {
    let n = pixels.len() as f64;
    let (sx, sy) = pixels
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    Point::new(sx / n, sy / n)
}

/// Lloyd's k-means seeded with evenly spaced pixels in row-major order.
fn kmeans(pixels: &[Pixel], k: usize) -> Vec<Point> {
    if k == 0 || pixels.is_empty() {
        return Vec::new();
    }
    let points: Vec<Point> = pixels
        .iter()
        .map(|p| Point::new(p.x as f64, p.y as f64))
        .collect();
    let n = points.len();
    let mut centers: Vec<Point> = (0..k).map(|i| points[(2 * i + 1) * n / (2 * k)]).collect();
    let mut assignment = vec![usize::MAX; n];

    for _ in 0..KMEANS_MAX_ITERATIONS {
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let nearest = nearest_index(&centers, *p).unwrap_or(0);
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![(0.0, 0.0, 0usize); k];
        for (p, &c) in points.iter().zip(&assignment) {
            sums[c].0 += p.x;
            sums[c].1 += p.y;
            sums[c].2 += 1;
        }
        for (center, (sx, sy, count)) in centers.iter_mut().zip(sums) {
            // Empty clusters keep their previous center.
            if count > 0 {
                *center = Point::new(sx / count as f64, sy / count as f64);
            }
        }
    }
    centers
}

/// Greedily give each anchor, in order, the nearest unclaimed centroid.
fn assign_to_anchors(centroids: &[Point], expected: &[Point]) -> Vec<Point> {
    let mut claimed = vec![false; centroids.len()];
    expected
        .iter()
        .map(|target| {
            let mut best: Option<(usize, f64)> = None;
            for (i, c) in centroids.iter().enumerate() {
                if claimed[i] {
                    continue;
                }
                let d = c.distance_squared(target);
                if best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((i, d));
                }
            }
            match best {
                Some((i, _)) => {
                    claimed[i] = true;
                    centroids[i]
                }
                None => *target,
            }
        })
        .collect()
}
