use serde::{Deserialize, Serialize};

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// A 3D point, used for mesh vertex positions and resolved keypoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Round every component to `decimals` places.
    pub fn rounded(&self, decimals: i32) -> Self {
        let scale = 10f64.powi(decimals);
        Self {
            x: (self.x * scale).round() / scale,
            y: (self.y * scale).round() / scale,
            z: (self.z * scale).round() / scale,
        }
    }
}

/// An integer pixel position: column `x`, row `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
}

impl Pixel {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Pixel dimensions of the source photograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Convert a point from normalized [0,1] coordinates to pixel coordinates.
    pub fn denormalize_point(&self, p: Point) -> Point {
        Point::new(p.x * self.width as f64, p.y * self.height as f64)
    }

    /// Convert a point from pixel coordinates to normalized [0,1] coordinates.
    pub fn normalize_point(&self, p: Point) -> Point {
        Point::new(p.x / self.width as f64, p.y / self.height as f64)
    }

    /// Round a normalized point to its nearest pixel.
    ///
    /// Halves round away from zero. Returns `None` when the rounded position
    /// falls outside the image or the input is not finite.
    pub fn nearest_pixel(&self, p: Point) -> Option<Pixel> {
        let scaled = self.denormalize_point(p);
        if !scaled.x.is_finite() || !scaled.y.is_finite() {
            return None;
        }
        let col = scaled.x.round();
        let row = scaled.y.round();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some(Pixel::new(col as u32, row as u32))
    }
}

/// A single normalized landmark as produced by the face-landmark model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The image-plane component of the landmark.
    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// The ordered landmark list for one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    pub points: Vec<Landmark>,
}

impl Landmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Landmark> {
        self.points.get(idx)
    }

    /// Pixel position of landmark `idx` in an image of the given size.
    pub fn pixel_position(&self, idx: usize, size: ImageSize) -> Option<Point> {
        self.get(idx).map(|l| size.denormalize_point(l.xy()))
    }
}

impl std::ops::Index<usize> for Landmarks {
    type Output = Landmark;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}
