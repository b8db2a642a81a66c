//! Interface to external mesh decimation.
//!
//! Decimation re-indexes the mesh in ways the pipeline cannot follow, so
//! keypoints found on the full-resolution mesh are re-resolved against the
//! decimated vertex positions by nearest neighbour.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::keypoints::{nearest_index_3d, KeypointRecord};
use crate::mesh::Mesh;
use crate::types::Point3;

/// Directory, next to the input's parent, receiving decimated meshes.
pub const COLLAPSED_DIR: &str = "collapsed";

/// A quadric-edge-collapse (or similar) decimator.
pub trait Decimator: Send + Sync {
    /// Reduce the mesh at `path` to roughly `target_faces` faces.
    fn decimate(&self, path: &Path, target_faces: usize) -> Result<Mesh>;
}

/// Where a decimated copy of `mesh_path` is written: `<parent>/collapsed/<name>`.
pub fn collapsed_path(mesh_path: &Path) -> PathBuf {
    let parent = mesh_path.parent().unwrap_or_else(|| Path::new(""));
    let name = mesh_path.file_name().unwrap_or_default();
    parent.join(COLLAPSED_DIR).join(name)
}

/// A keypoint after decimation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReresolvedKeypoint {
    pub name: String,
    pub vertex_index: usize,
    pub position: Point3,
    /// Euclidean distance moved from the full-resolution position.
    pub drift: f64,
}

/// Snap each keypoint to the nearest vertex of the decimated mesh.
pub fn reresolve_keypoints(
    keypoints: &[KeypointRecord],
    decimated: &Mesh,
) -> Result<Vec<ReresolvedKeypoint>> {
    if decimated.vertices.is_empty() {
        return Err(Error::MeshMismatch("decimated mesh has no vertices".into()));
    }

    let resolved: Vec<ReresolvedKeypoint> = keypoints
        .iter()
        .filter_map(|kp| {
            let idx = nearest_index_3d(decimated.positions(), kp.position)?;
            let position = decimated.vertices[idx].position;
            Some(ReresolvedKeypoint {
                name: kp.name.clone(),
                vertex_index: idx,
                position,
                drift: position.distance_squared(&kp.position).sqrt(),
            })
        })
        .collect();

    debug!(count = resolved.len(), "re-resolved keypoints after decimation");
    Ok(resolved)
}

/// Decimate `mesh_path` and re-resolve `keypoints` on the result.
pub fn decimate_and_reresolve<D: Decimator + ?Sized>(
    decimator: &D,
    mesh_path: &Path,
    target_faces: usize,
    keypoints: &[KeypointRecord],
) -> Result<(Mesh, Vec<ReresolvedKeypoint>)> {
    let decimated = decimator.decimate(mesh_path, target_faces)?;
    let resolved = reresolve_keypoints(keypoints, &decimated)?;
    Ok((decimated, resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Face, Vertex};
    use crate::types::Point;

    struct KeepEveryOther;

    impl Decimator for KeepEveryOther {
        fn decimate(&self, _path: &Path, _target_faces: usize) -> Result<Mesh> {
            let vertices = (0..5).map(|i| Vertex::new(2.0 * i as f64, 0.0, 0.0)).collect();
            Ok(Mesh::new(vertices, Vec::new(), vec![Face::new(0, 1, 2)]))
        }
    }

    fn record(name: &str, x: f64) -> KeypointRecord {
        KeypointRecord {
            name: name.into(),
            landmark: 0,
            texture_index: 0,
            uv: Point::zero(),
            position: Point3::new(x, 0.0, 0.0),
        }
    }

    #[test]
    fn collapsed_path_sits_beside_input() {
        let p = collapsed_path(Path::new("data/boundary/source.obj"));
        assert_eq!(p, PathBuf::from("data/boundary/collapsed/source.obj"));
    }

    #[test]
    fn keypoints_snap_to_nearest_decimated_vertex() {
        let keypoints = vec![record("nosetip", 3.2), record("left_eye", 5.0), record("chin", 40.0)];
        let (_, resolved) =
            decimate_and_reresolve(&KeepEveryOther, Path::new("face.obj"), 1000, &keypoints).unwrap();

        assert_eq!(resolved[0].vertex_index, 2);
        assert!((resolved[0].drift - 0.8).abs() < 1e-9);
        // 5.0 is equidistant from 4.0 and 6.0; the lower index wins.
        assert_eq!(resolved[1].vertex_index, 2);
        assert_eq!(resolved[2].vertex_index, 4);
        assert_eq!(resolved[2].position, Point3::new(8.0, 0.0, 0.0));
    }

    #[test]
    fn empty_decimated_mesh_is_rejected() {
        let err = reresolve_keypoints(&[record("nosetip", 0.0)], &Mesh::default()).unwrap_err();
        assert!(matches!(err, Error::MeshMismatch(_)));
    }
}
