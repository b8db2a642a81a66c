//! Text output of extracted meshes and keypoints.
//!
//! All artifacts of one run are written as a group: each goes to a hidden
//! temporary sibling first and is renamed into place only after every write
//! succeeded.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::keypoints::KeypointRecord;
use crate::mesh::Vertex;
use crate::types::Point;

/// Decimal places kept for keypoint positions.
const POINT_DECIMALS: i32 = 5;

/// Output locations for one (boundary, input) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub mesh: PathBuf,
    pub keypoints: PathBuf,
    pub metrics: PathBuf,
}

impl OutputPaths {
    /// `<root>/<boundary>/<stem>.obj` plus `_keypoints.txt` and `_metrics.txt` siblings.
    pub fn new(root: &Path, boundary: &str, input: &Path) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mesh".to_string());
        let dir = root.join(boundary);
        Self {
            mesh: dir.join(format!("{}.obj", stem)),
            keypoints: dir.join(format!("{}_keypoints.txt", stem)),
            metrics: dir.join(format!("{}_metrics.txt", stem)),
        }
    }
}

/// The filtered mesh in output order, faces already 1-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMesh {
    pub vertices: Vec<Vertex>,
    pub texcoords: Vec<Point>,
    pub faces: Vec<[usize; 3]>,
}

/// Render a sub-mesh: vertex lines, then texture lines, then faces.
pub fn mesh_to_string(mesh: &SubMesh) -> String {
    let mut out = String::new();
    for v in &mesh.vertices {
        let _ = write!(out, "v {} {} {}", v.position.x, v.position.y, v.position.z);
        for e in &v.extra {
            let _ = write!(out, " {}", e);
        }
        out.push('\n');
    }
    for t in &mesh.texcoords {
        let _ = writeln!(out, "vt {} {}", t.x, t.y);
    }
    for [a, b, c] in &mesh.faces {
        let _ = writeln!(out, "f {a}/{a} {b}/{b} {c}/{c}");
    }
    out
}

/// Render `name x y z` lines.
pub fn points_to_string(records: &[KeypointRecord]) -> String {
    let mut out = String::new();
    for r in records {
        let p = r.position.rounded(POINT_DECIMALS);
        let _ = writeln!(out, "{} {} {} {}", r.name, p.x, p.y, p.z);
    }
    out
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}", name, suffix))
}

/// Write every `(path, contents)` pair, or none of them.
///
/// Existing files at the destinations are moved aside while the group is
/// committed. If any rename fails, the files already committed are removed
/// and the previous contents are put back.
pub fn write_all_or_nothing(files: &[(PathBuf, String)]) -> Result<()> {
    let mut temps: Vec<PathBuf> = Vec::with_capacity(files.len());

    let staged = files.iter().try_for_each(|(path, contents)| -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = sibling(path, "tmp");
        fs::write(&temp, contents)?;
        temps.push(temp);
        Ok(())
    });
    if let Err(e) = staged {
        discard(&temps);
        return Err(e);
    }

    let mut committed: Vec<(&Path, Option<PathBuf>)> = Vec::with_capacity(files.len());
    for (i, ((path, _), temp)) in files.iter().zip(&temps).enumerate() {
        match commit(temp, path) {
            Ok(backup) => {
                debug!(path = %path.display(), "wrote artifact");
                committed.push((path.as_path(), backup));
            }
            Err(e) => {
                discard(&temps[i..]);
                roll_back(&committed);
                return Err(e);
            }
        }
    }

    for backup in committed.iter().filter_map(|(_, b)| b.as_ref()) {
        discard(std::slice::from_ref(backup));
    }
    Ok(())
}

/// Rename `temp` onto `path`, returning the backup of whatever file was there.
fn commit(temp: &Path, path: &Path) -> Result<Option<PathBuf>> {
    let backup = if path.is_file() {
        let backup = sibling(path, "bak");
        fs::rename(path, &backup)?;
        Some(backup)
    } else {
        None
    };
    if let Err(e) = fs::rename(temp, path) {
        if let Some(backup) = &backup {
            roll_back(&[(path, Some(backup.clone()))]);
        }
        return Err(e.into());
    }
    Ok(backup)
}

/// Undo committed renames, newest first.
fn roll_back(committed: &[(&Path, Option<PathBuf>)]) {
    for (path, backup) in committed.iter().rev() {
        let undone = match backup {
            Some(backup) => fs::rename(backup, path),
            None => fs::remove_file(path),
        };
        if let Err(e) = undone {
            warn!(path = %path.display(), error = %e, "failed to roll back artifact");
        }
    }
}

fn discard(temps: &[PathBuf]) {
    for temp in temps {
        if let Err(e) = fs::remove_file(temp) {
            warn!(path = %temp.display(), error = %e, "failed to remove temporary file");
        }
    }
}
