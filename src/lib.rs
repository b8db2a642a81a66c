//! # face-submesh
//!
//! Extract a facial sub-mesh bounded by a landmark contour.
//!
//! Given a photograph, the landmarks a face-mesh detector found on it and a
//! textured 3D mesh of the same face, this crate cuts the mesh down to the
//! region enclosed by a named contour and writes a mesh whose vertex, texture
//! and face indices are consistent again.
//!
//! ## Pipeline Overview
//!
//! 1. Detect landmarks on the photograph (any [`LandmarkProvider`])
//! 2. Join the contour's landmark indices into a closed pixel polygon
//! 3. Scan-fill the polygon into a [`RasterMask`], minus any chunk regions
//! 4. Keep every texture coordinate whose pixel lies inside the mask
//! 5. Map the kept indices onto `1..=N` in ascending order
//! 6. Keep faces whose three corners survived and rewrite them
//! 7. Write the mesh plus keypoint and metric-point files as one group
//!
//! Keypoints (nose tip, eye corners, ...) are resolved independently of the
//! contour, by nearest texture coordinate to each anchor landmark.
//!
//! ## Quick Start
//!
//! ```rust
//! use face_submesh::{
//!     Boundary, BoundarySet, Extraction, Landmark, Landmarks, Mesh, PipelineConfig, Result,
//! };
//! use image::RgbImage;
//!
//! let (mesh, report) = Mesh::parse(
//!     "v 0 0 0\nv 1 0 0\nv 1 1 0\n\
//!      vt 0.4 0.4\nvt 0.6 0.4\nvt 0.6 0.6\n\
//!      f 1/1 2/2 3/3\n",
//! );
//!
//! let config = PipelineConfig { landmark_count: None, ..PipelineConfig::default() };
//! let mut run = Extraction::from_parts(
//!     "face.png", "face.obj", RgbImage::new(100, 100), mesh, report, &config,
//! )?;
//!
//! // Stand-in for a real detector
//! let detector = |_: &RgbImage| -> Result<Option<Landmarks>> {
//!     Ok(Some(Landmarks::new(vec![
//!         Landmark::new(0.2, 0.2, 0.0),
//!         Landmark::new(0.8, 0.2, 0.0),
//!         Landmark::new(0.5, 0.9, 0.0),
//!     ])))
//! };
//!
//! run.compute_landmarks(&detector)?;
//! run.compute_boundary(&BoundarySet::single(Boundary::new("custom", vec![0, 1, 2])?))?;
//! run.compute_mask()?;
//! run.classify()?;
//! run.remap()?;
//! let kept = run.filter()?;
//! assert_eq!(kept.faces, vec![[1, 2, 3]]);
//! # Ok::<(), face_submesh::Error>(())
//! ```
//!
//! ## Contour Files
//!
//! Boundaries live in a [`ContourTable`] directory:
//!
//! ```text
//! contours/consistent/<name>.txt          one landmark index per line
//! contours/inconsistent/<name>/*.txt      chunks cut out of <name>
//! ```

mod boundary;
mod classify;
mod config;
mod decimate;
mod error;
mod filter;
mod keypoints;
mod landmarks;
mod mesh;
mod metrics;
mod pipeline;
mod raster;
mod remap;
mod serialize;
mod types;

pub use boundary::{
    read_index_file, Boundary, BoundaryShape, BoundarySet, ContourTable, BOUNDARY_NAMES,
    CONSISTENT_DIR, INCONSISTENT_DIR,
};
pub use classify::{classify_texcoords, RetainedSet};
pub use config::{PipelineConfig, DEFAULT_TRIM_Z};
pub use decimate::{
    collapsed_path, decimate_and_reresolve, reresolve_keypoints, Decimator, ReresolvedKeypoint,
    COLLAPSED_DIR,
};
pub use error::{Error, Result};
pub use filter::{filter_faces, retained_faces, FilteredFaces};
pub use keypoints::{
    default_keypoints, load_anchors, marker_centroids, nearest_index, nearest_index_3d,
    resolve_keypoints, Anchor, KeypointRecord, MarkerSource,
};
pub use landmarks::{
    detect_landmarks, parse_landmarks, LandmarkFile, LandmarkProvider, FACE_MESH_LANDMARKS,
};
pub use mesh::{center_positions, trim_depth, Face, MalformedLine, Mesh, ParseReport, Vertex};
pub use metrics::{polygon_area, RegionMetrics};
pub use pipeline::{
    check_distinct_outputs, run_extraction, Extraction, ExtractionJob, ExtractionSummary, Stage,
};
pub use raster::{
    rasterize_boundary, rasterize_polygon, rasterize_region, rasterize_set, MaskValues, RasterMask,
};
pub use remap::{remap, IndexMapping, Remapped};
pub use serialize::{mesh_to_string, points_to_string, write_all_or_nothing, OutputPaths, SubMesh};
pub use types::{ImageSize, Landmark, Landmarks, Pixel, Point, Point3};
