//! Per-run extraction session.
//!
//! An [`Extraction`] owns one photograph, one mesh and everything derived
//! from them. Stages run strictly in order:
//!
//! ```text
//! Loaded -> LandmarksComputed -> BoundaryComputed -> MaskComputed
//!        -> Classified -> Remapped -> Filtered -> Serialized
//! ```
//!
//! Calling a stage out of order fails with [`Error::InvalidStage`]. A failed
//! stage leaves the session where it was and nothing is written.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::boundary::{BoundarySet, BoundaryShape};
use crate::classify::{classify_texcoords, RetainedSet};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::filter::{filter_faces, FilteredFaces};
use crate::keypoints::{self, Anchor, KeypointRecord, MarkerSource};
use crate::landmarks::{detect_landmarks, LandmarkProvider};
use crate::mesh::{Mesh, ParseReport};
use crate::metrics::{polygon_area, RegionMetrics};
use crate::raster::{rasterize_region, RasterMask};
use crate::remap::{IndexMapping, Remapped};
use crate::serialize::{mesh_to_string, points_to_string, write_all_or_nothing, OutputPaths, SubMesh};
use crate::types::{ImageSize, Landmarks, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Stage {
    Loaded,
    LandmarksComputed,
    BoundaryComputed,
    MaskComputed,
    Classified,
    Remapped,
    Filtered,
    Serialized,
}

impl Stage {
    /// The stage a session must be at before `self` may run.
    pub fn previous(self) -> Stage {
        match self {
            Stage::Loaded | Stage::LandmarksComputed => Stage::Loaded,
            Stage::BoundaryComputed => Stage::LandmarksComputed,
            Stage::MaskComputed => Stage::BoundaryComputed,
            Stage::Classified => Stage::MaskComputed,
            Stage::Remapped => Stage::Classified,
            Stage::Filtered => Stage::Remapped,
            Stage::Serialized => Stage::Filtered,
        }
    }
}

/// Pixel-space outline of the region being extracted.
#[derive(Debug, Clone, PartialEq)]
struct Region {
    name: String,
    primary: Vec<Point>,
    chunks: Vec<Vec<Point>>,
}

/// One photograph and mesh moving through the extraction stages.
#[derive(Debug, Clone)]
pub struct Extraction {
    label: String,
    input: PathBuf,
    image: RgbImage,
    size: ImageSize,
    mesh: Mesh,
    report: ParseReport,
    config: PipelineConfig,
    stage: Stage,

    landmarks: Option<Landmarks>,
    region: Option<Region>,
    mask: Option<RasterMask>,
    retained: RetainedSet,
    remapped: Option<Remapped>,
    filtered: Option<FilteredFaces>,
    keypoints: Vec<KeypointRecord>,
    metric_points: Vec<KeypointRecord>,
}

impl Extraction {
    /// Open the photograph and parse the mesh.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        image_path: P,
        mesh_path: Q,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let image_path = image_path.as_ref();
        let mesh_path = mesh_path.as_ref();
        let image = image::open(image_path)?.to_rgb8();
        let (mesh, report) = Mesh::load(mesh_path)?;
        Self::from_parts(image_path.display().to_string(), mesh_path, image, mesh, report, config)
    }

    /// Start a session from data already in memory.
    ///
    /// Vertex positions are centered and depth-trimmed here, as configured, so
    /// keypoints and written vertices share one coordinate frame.
    pub fn from_parts(
        label: impl Into<String>,
        input: impl Into<PathBuf>,
        image: RgbImage,
        mut mesh: Mesh,
        report: ParseReport,
        config: &PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        if config.center {
            let offset = mesh.center();
            debug!(x = offset.x, y = offset.y, z = offset.z, "centered mesh");
        }
        if config.trim_z < 1.0 {
            mesh.trim_depth(config.trim_z);
        }

        let size = ImageSize::new(image.width(), image.height());
        Ok(Self {
            label: label.into(),
            input: input.into(),
            image,
            size,
            mesh,
            report,
            config: config.clone(),
            stage: Stage::Loaded,
            landmarks: None,
            region: None,
            mask: None,
            retained: RetainedSet::new(),
            remapped: None,
            filtered: None,
            keypoints: Vec::new(),
            metric_points: Vec::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn parse_report(&self) -> &ParseReport {
        &self.report
    }

    pub fn landmarks(&self) -> Option<&Landmarks> {
        self.landmarks.as_ref()
    }

    pub fn retained(&self) -> &RetainedSet {
        &self.retained
    }

    pub fn mapping(&self) -> Option<&IndexMapping> {
        self.remapped.as_ref().map(|r| &r.mapping)
    }

    pub fn filtered(&self) -> Option<&FilteredFaces> {
        self.filtered.as_ref()
    }

    pub fn keypoints(&self) -> &[KeypointRecord] {
        &self.keypoints
    }

    pub fn metric_points(&self) -> &[KeypointRecord] {
        &self.metric_points
    }

    /// Name of the region, once a boundary has been computed.
    pub fn boundary_name(&self) -> Option<&str> {
        self.region.as_ref().map(|r| r.name.as_str())
    }

    fn check(&self, requested: Stage) -> Result<()> {
        let expected = requested.previous();
        if self.stage != expected {
            return Err(self.stage_error(requested));
        }
        Ok(())
    }

    fn stage_error(&self, requested: Stage) -> Error {
        Error::InvalidStage {
            requested,
            expected: requested.previous(),
            current: self.stage,
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!(input = %self.label, from = ?self.stage, to = ?stage, "stage complete");
        self.stage = stage;
    }

    /// Run the landmark provider on the photograph.
    pub fn compute_landmarks<P: LandmarkProvider + ?Sized>(&mut self, provider: &P) -> Result<&Landmarks> {
        self.check(Stage::LandmarksComputed)?;
        let landmarks = detect_landmarks(provider, &self.image, &self.label, self.config.landmark_count)?;
        self.landmarks = Some(landmarks);
        self.enter(Stage::LandmarksComputed);
        self.landmarks
            .as_ref()
            .ok_or_else(|| self.stage_error(Stage::LandmarksComputed))
    }

    /// Resolve the boundary set against the detected landmarks.
    pub fn compute_boundary(&mut self, set: &BoundarySet) -> Result<()> {
        self.check(Stage::BoundaryComputed)?;
        let landmarks = self
            .landmarks
            .as_ref()
            .ok_or_else(|| self.stage_error(Stage::BoundaryComputed))?;

        let primary = set.primary.to_polygon(landmarks, self.size)?;
        let chunks = set
            .chunks
            .iter()
            .map(|c| c.to_polygon(landmarks, self.size))
            .collect::<Result<Vec<_>>>()?;

        self.region = Some(Region {
            name: set.name().to_string(),
            primary,
            chunks,
        });
        self.enter(Stage::BoundaryComputed);
        Ok(())
    }

    /// Use an outline obtained without landmark indices, such as a traced contour.
    pub fn compute_boundary_shape(&mut self, name: &str, shape: BoundaryShape) -> Result<()> {
        self.check(Stage::BoundaryComputed)?;
        let primary = shape.into_polygon();
        if primary.len() < 3 {
            return Err(Error::InvalidBoundary {
                name: name.to_string(),
                reason: format!("outline has {} distinct points, need at least 3", primary.len()),
            });
        }
        self.region = Some(Region {
            name: name.to_string(),
            primary,
            chunks: Vec::new(),
        });
        self.enter(Stage::BoundaryComputed);
        Ok(())
    }

    /// Fill the region, minus its chunks, into a mask.
    pub fn compute_mask(&mut self) -> Result<&RasterMask> {
        self.check(Stage::MaskComputed)?;
        let region = self
            .region
            .as_ref()
            .ok_or_else(|| self.stage_error(Stage::MaskComputed))?;
        let mask = rasterize_region(&region.name, &region.primary, &region.chunks, self.size, self.config.mask)?;
        self.mask = Some(mask);
        self.enter(Stage::MaskComputed);
        self.mask.as_ref().ok_or_else(|| self.stage_error(Stage::MaskComputed))
    }

    /// Find the texture coordinates inside the mask.
    pub fn classify(&mut self) -> Result<&RetainedSet> {
        self.check(Stage::Classified)?;
        let mask = self
            .mask
            .as_ref()
            .ok_or_else(|| self.stage_error(Stage::Classified))?;
        let retained = classify_texcoords(mask, &self.mesh.texcoords);
        if retained.is_empty() {
            let name = self.boundary_name().unwrap_or_default().to_string();
            return Err(Error::EmptyRegion(name));
        }
        self.retained = retained;
        self.enter(Stage::Classified);
        Ok(&self.retained)
    }

    /// Build the index mapping and reorder the vertex and texture arrays.
    pub fn remap(&mut self) -> Result<&IndexMapping> {
        self.check(Stage::Remapped)?;
        let remapped = crate::remap::remap(&self.retained, &self.mesh.vertices, &self.mesh.texcoords)?;
        self.remapped = Some(remapped);
        self.enter(Stage::Remapped);
        self.mapping().ok_or_else(|| self.stage_error(Stage::Remapped))
    }

    /// Drop faces leaving the region and rewrite the rest.
    pub fn filter(&mut self) -> Result<&FilteredFaces> {
        self.check(Stage::Filtered)?;
        let mapping = self
            .mapping()
            .ok_or_else(|| self.stage_error(Stage::Filtered))?;
        let filtered = filter_faces(&self.mesh.faces, &self.retained, mapping)?;
        self.filtered = Some(filtered);
        self.enter(Stage::Filtered);
        self.filtered
            .as_ref()
            .ok_or_else(|| self.stage_error(Stage::Filtered))
    }

    /// Resolve keypoint and metric-point anchors on the full mesh.
    ///
    /// Needs landmarks but no region, so it may run at any stage between
    /// `LandmarksComputed` and `Filtered`. Keypoints use `markers` when given;
    /// metric points always use the landmark positions.
    pub fn resolve_keypoints(
        &mut self,
        anchors: &[Anchor],
        metric_anchors: &[Anchor],
        markers: Option<&RgbImage>,
    ) -> Result<()> {
        if self.stage < Stage::LandmarksComputed || self.stage == Stage::Serialized {
            return Err(Error::InvalidStage {
                requested: Stage::LandmarksComputed,
                expected: Stage::LandmarksComputed,
                current: self.stage,
            });
        }
        let landmarks = self
            .landmarks
            .as_ref()
            .ok_or_else(|| self.stage_error(Stage::BoundaryComputed))?;

        let source = match markers {
            Some(image) => MarkerSource::Rendered {
                image,
                color: self.config.marker_color,
            },
            None => MarkerSource::Direct,
        };
        let resolve = |anchors: &[Anchor], source| {
            if anchors.is_empty() {
                return Ok(Vec::new());
            }
            keypoints::resolve_keypoints(
                anchors,
                landmarks,
                self.size,
                source,
                &self.mesh.texcoords,
                &self.mesh.vertices,
            )
        };
        let keypoints = resolve(anchors, source)?;
        let metric_points = resolve(metric_anchors, MarkerSource::Direct)?;

        debug!(
            input = %self.label,
            keypoints = keypoints.len(),
            metric_points = metric_points.len(),
            "resolved keypoints"
        );
        self.keypoints = keypoints;
        self.metric_points = metric_points;
        Ok(())
    }

    /// The filtered mesh in output order.
    pub fn sub_mesh(&self) -> Option<SubMesh> {
        let remapped = self.remapped.as_ref()?;
        let filtered = self.filtered.as_ref()?;
        Some(SubMesh {
            vertices: remapped.vertices.clone(),
            texcoords: remapped.texcoords.clone(),
            faces: filtered.faces.clone(),
        })
    }

    /// Rendered artifacts for `paths`, without touching the filesystem.
    pub fn artifacts(&self, paths: &OutputPaths) -> Result<Vec<(PathBuf, String)>> {
        self.check(Stage::Serialized)?;
        let mesh = self
            .sub_mesh()
            .ok_or_else(|| self.stage_error(Stage::Serialized))?;
        Ok(vec![
            (paths.mesh.clone(), mesh_to_string(&mesh)),
            (paths.keypoints.clone(), points_to_string(&self.keypoints)),
            (paths.metrics.clone(), points_to_string(&self.metric_points)),
        ])
    }

    /// Write the mesh, keypoint and metric-point files as one group.
    pub fn serialize(&mut self, paths: &OutputPaths) -> Result<()> {
        let files = self.artifacts(paths)?;
        write_all_or_nothing(&files)?;
        self.enter(Stage::Serialized);
        Ok(())
    }

    pub fn metrics(&self) -> RegionMetrics {
        RegionMetrics {
            boundary_area: self
                .region
                .as_ref()
                .map_or(0.0, |r| polygon_area(&r.primary)),
            mask_pixels: self.mask.as_ref().map_or(0, |m| m.count_inside()),
            image_pixels: self.size.pixel_count(),
            texcoords_total: self.mesh.texcoords.len(),
            texcoords_retained: self.retained.len(),
            faces_total: self.mesh.faces.len(),
            faces_kept: self.filtered.as_ref().map_or(0, |f| f.len()),
            malformed_lines: self.report.malformed_count(),
        }
    }

    pub fn summary(&self, outputs: Option<&OutputPaths>) -> ExtractionSummary {
        ExtractionSummary {
            input: self.label.clone(),
            boundary: self.boundary_name().unwrap_or_default().to_string(),
            stage: self.stage,
            metrics: self.metrics(),
            keypoints: self.keypoints.clone(),
            metric_points: self.metric_points.clone(),
            outputs: outputs.cloned(),
        }
    }
}

/// What one extraction produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub input: String,
    pub boundary: String,
    pub stage: Stage,
    pub metrics: RegionMetrics,
    pub keypoints: Vec<KeypointRecord>,
    pub metric_points: Vec<KeypointRecord>,
    pub outputs: Option<OutputPaths>,
}

/// Everything needed to extract one input under one or more boundaries.
#[derive(Debug, Clone)]
pub struct ExtractionJob<'a> {
    pub image: PathBuf,
    pub mesh: PathBuf,
    pub boundaries: &'a [BoundarySet],
    pub keypoints: &'a [Anchor],
    pub metric_points: &'a [Anchor],
    pub markers: Option<&'a RgbImage>,
    pub output: PathBuf,
}

impl ExtractionJob<'_> {
    /// Output locations, one per boundary, in boundary order.
    pub fn output_paths(&self) -> Vec<OutputPaths> {
        self.boundaries
            .iter()
            .map(|set| OutputPaths::new(&self.output, set.name(), &self.mesh))
            .collect()
    }
}

/// Fail if any two extractions across `jobs` would write the same file.
///
/// Output names depend only on the boundary and the mesh stem, so two meshes
/// named `face.obj` in different directories collide under one output root.
pub fn check_distinct_outputs(jobs: &[&ExtractionJob<'_>]) -> Result<()> {
    let mut seen = HashSet::new();
    for paths in jobs.iter().flat_map(|job| job.output_paths()) {
        for path in [paths.mesh, paths.keypoints, paths.metrics] {
            if !seen.insert(path.clone()) {
                return Err(Error::InvalidConfig(format!(
                    "more than one extraction writes {}",
                    path.display()
                )));
            }
        }
    }
    Ok(())
}

/// Load, detect once, then extract and write every boundary of `job`.
///
/// Artifacts for all boundaries are written as a single group, so a failure
/// in any boundary leaves no output at all.
pub fn run_extraction<P: LandmarkProvider + ?Sized>(
    job: &ExtractionJob<'_>,
    provider: &P,
    config: &PipelineConfig,
) -> Result<Vec<ExtractionSummary>> {
    check_distinct_outputs(&[job])?;
    let mut base = Extraction::load(&job.image, &job.mesh, config)?;
    base.compute_landmarks(provider)?;
    base.resolve_keypoints(job.keypoints, job.metric_points, job.markers)?;

    let mut runs = Vec::with_capacity(job.boundaries.len());
    for (set, paths) in job.boundaries.iter().zip(job.output_paths()) {
        let mut run = base.clone();
        run.compute_boundary(set)?;
        run.compute_mask()?;
        run.classify()?;
        run.remap()?;
        run.filter()?;
        runs.push((run, paths));
    }

    let mut files = Vec::new();
    for (run, paths) in &runs {
        files.extend(run.artifacts(paths)?);
    }
    write_all_or_nothing(&files)?;

    Ok(runs
        .into_iter()
        .map(|(mut run, paths)| {
            run.enter(Stage::Serialized);
            let summary = run.summary(Some(&paths));
            info!(
                input = %summary.input,
                boundary = %summary.boundary,
                retained = summary.metrics.texcoords_retained,
                faces = summary.metrics.faces_kept,
                dropped = summary.metrics.faces_dropped(),
                "extracted sub-mesh"
            );
            summary
        })
        .collect())
}
