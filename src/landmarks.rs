//! Access to the external face-landmark model.
//!
//! The model itself lives outside this crate. Anything that can turn an image
//! into an ordered list of normalized landmarks implements
//! [`LandmarkProvider`]; [`LandmarkFile`] serves detector output that was
//! computed ahead of time.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Landmark, Landmarks};

/// Landmark count of the refined MediaPipe face mesh.
pub const FACE_MESH_LANDMARKS: usize = 478;

/// A face-landmark detector.
///
/// Returns `Ok(None)` when no face is found. Implementations must be usable
/// from several extraction threads at once.
pub trait LandmarkProvider: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Option<Landmarks>>;
}

impl<F> LandmarkProvider for F
where
    F: Fn(&RgbImage) -> Result<Option<Landmarks>> + Send + Sync,
{
    fn detect(&self, image: &RgbImage) -> Result<Option<Landmarks>> {
        self(image)
    }
}

/// Run `provider` and insist on a face with the expected landmark count.
pub fn detect_landmarks<P: LandmarkProvider + ?Sized>(
    provider: &P,
    image: &RgbImage,
    label: &str,
    expected: Option<usize>,
) -> Result<Landmarks> {
    let landmarks = provider
        .detect(image)?
        .filter(|l| !l.is_empty())
        .ok_or_else(|| Error::DetectionFailure(label.to_string()))?;

    if let Some(expected) = expected {
        if landmarks.len() != expected {
            return Err(Error::LandmarkCardinality {
                expected,
                found: landmarks.len(),
            });
        }
    }
    debug!(image = label, count = landmarks.len(), "landmarks detected");
    Ok(landmarks)
}

/// Landmarks precomputed by the detector and stored on disk.
///
/// Accepts either a JSON array of `{"x", "y", "z"}` objects or plain text with
/// one `x y [z]` triple per line. An empty file means no face was found.
#[derive(Debug, Clone)]
pub struct LandmarkFile {
    path: PathBuf,
}

impl LandmarkFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Landmarks> {
        let text = fs::read_to_string(&self.path)?;
        parse_landmarks(&text, &self.path)
    }
}

impl LandmarkProvider for LandmarkFile {
    fn detect(&self, _image: &RgbImage) -> Result<Option<Landmarks>> {
        let landmarks = self.read()?;
        Ok((!landmarks.is_empty()).then_some(landmarks))
    }
}

/// Parse landmark text in either supported layout.
pub fn parse_landmarks(text: &str, path: &Path) -> Result<Landmarks> {
    if text.trim_start().starts_with('[') {
        let points: Vec<Landmark> = serde_json::from_str(text)?;
        return Ok(Landmarks::new(points));
    }

    let mut points = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values: Vec<f64> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::InvalidPointFile {
                path: path.to_path_buf(),
                line: i + 1,
                reason: e.to_string(),
            })?;
        match values.as_slice() {
            [x, y] => points.push(Landmark::new(*x, *y, 0.0)),
            [x, y, z] => points.push(Landmark::new(*x, *y, *z)),
            _ => {
                return Err(Error::InvalidPointFile {
                    path: path.to_path_buf(),
                    line: i + 1,
                    reason: format!("expected 2 or 3 values, found {}", values.len()),
                })
            }
        }
    }
    Ok(Landmarks::new(points))
}
