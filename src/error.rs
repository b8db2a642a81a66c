use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No face detected in {0}")]
    DetectionFailure(String),

    #[error("Landmark provider returned {found} landmarks, expected {expected}")]
    LandmarkCardinality { expected: usize, found: usize },

    #[error("Boundary '{boundary}' references landmark {index}, but only {len} landmarks exist")]
    IndexOutOfRange {
        boundary: String,
        index: usize,
        len: usize,
    },

    #[error("Invalid boundary '{name}': {reason}")]
    InvalidBoundary { name: String, reason: String },

    #[error("Boundary '{0}' encloses no pixels or texture coordinates")]
    EmptyRegion(String),

    #[error("Face {face} references vertex {index} which has no remapped index")]
    DanglingFaceReference { face: usize, index: usize },

    #[error("Malformed mesh line {line}: {reason}")]
    MalformedMeshLine { line: usize, reason: String },

    #[error("Mesh mismatch: {0}")]
    MeshMismatch(String),

    #[error("Pipeline stage {requested:?} requires {expected:?}, but the run is at {current:?}")]
    InvalidStage {
        requested: Stage,
        expected: Stage,
        current: Stage,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid point file {path:?} line {line}: {reason}")]
    InvalidPointFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
